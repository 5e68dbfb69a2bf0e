//! Gateway traits for the version-control and pipeline collaborators.
//!
//! - `VcsGateway`: commit diffs and shallow-clone repair on a local working copy
//! - `PipelineGateway`: last-green lookup, trigger, poll and cancel on a CI provider
//!
//! One adapter per provider implements these; scripted fakes live in `fakes`.

use async_trait::async_trait;

use crate::domain::{BuildId, BuildOutcome, CommitHash};
use crate::error::Result;

/// Version-control backend for a local working copy.
#[async_trait]
pub trait VcsGateway: Send + Sync {
    /// Paths changed between two commits, one per changed file.
    ///
    /// Deleted and modified entries contribute their source path, inserted
    /// entries their destination path. An empty `from` diffs from the
    /// repository root state.
    async fn diff_name_only(&self, from: &CommitHash, to: &CommitHash) -> Result<Vec<String>>;

    /// Make sure `target` is reachable locally, repairing shallow clones if needed.
    ///
    /// Fails with `CiError::NoCommit` (see `CiError::is_no_commit`) when the
    /// commit is still absent after repair.
    async fn ensure_commit_from_tip(&self, target: &CommitHash) -> Result<()>;
}

/// Remote CI provider.
#[async_trait]
pub trait PipelineGateway: Send + Sync {
    /// Head commit of the newest successful run of `pipeline_id` on the current
    /// branch. Empty when there is none.
    async fn last_successful_commit(&self, pipeline_id: &str) -> Result<CommitHash>;

    /// Commit being built, as given by the run-time environment.
    fn current_commit(&self) -> CommitHash;

    /// Start a build for `subject`. `None` when the provider started nothing.
    async fn trigger_build(&self, subject: &str) -> Result<Option<BuildId>>;

    /// Status of a build. `None` while it is still running.
    async fn build_status(&self, build_id: &BuildId) -> Result<Option<BuildOutcome>>;

    /// Cancel a running build.
    async fn kill_build(&self, build_id: &BuildId) -> Result<()>;
}
