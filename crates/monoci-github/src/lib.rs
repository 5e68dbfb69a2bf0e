//! monoci GitHub Actions adapter
//!
//! Resolves the last green commit of a workflow, dispatches
//! `repository_dispatch` builds and follows their runs through the REST API.

pub mod api;
pub mod env;
pub mod gateway;

pub use env::GitHubActionEnv;
pub use gateway::{outcome_from_conclusion, GitHubActionsGateway};
