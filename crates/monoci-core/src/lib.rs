//! monoci Core
//!
//! Change-aware build orchestration for monorepos:
//! - Detects which project paths changed since the last successful pipeline run
//! - Triggers one remote build per changed project (or one joined build)
//! - Polls builds to completion under a global deadline and cancels stragglers
//!
//! Providers plug in through the [`VcsGateway`] and [`PipelineGateway`] traits.

pub mod changes;
pub mod config;
pub mod domain;
pub mod error;
pub mod fakes;
pub mod gateway;
pub mod obs;
pub mod orchestrator;
pub mod output;
pub mod telemetry;

pub use changes::{
    filter_paths_with_changes, join_project_names, project_name, project_names, subjects_for,
    ChangeDetector,
};
pub use config::{BuildConfig, DEFAULT_MAX_DURATION, DEFAULT_POLL_INTERVAL};
pub use domain::{BuildId, BuildInfo, BuildOutcome, BuildRequest, CommitHash, RequestState};
pub use error::{CiError, Result, ResultExt};
pub use gateway::{PipelineGateway, VcsGateway};
pub use orchestrator::{BuildOrchestrator, RunOutcome};
pub use output::{render_event, BuildEvent, BuildOutput, ConsolePresenter, JsonPresenter};
pub use telemetry::init_tracing;

/// monoci version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
