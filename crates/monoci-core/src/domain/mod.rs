//! Domain types shared by the change detector and the orchestrator.

pub mod build;
pub mod commit;

pub use build::{BuildId, BuildInfo, BuildOutcome, BuildRequest, RequestState};
pub use commit::CommitHash;
