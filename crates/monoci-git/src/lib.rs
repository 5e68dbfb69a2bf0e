//! monoci Git adapter
//!
//! Implements [`monoci_core::VcsGateway`] on top of the `git` CLI, including
//! repair of shallow CI checkouts that lack the last green commit.

pub mod diff;
pub mod gateway;

pub use diff::{changed_paths, parse_name_status, TreeChange};
pub use gateway::GitGateway;
