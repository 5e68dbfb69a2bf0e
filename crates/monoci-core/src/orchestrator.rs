//! Build orchestration: trigger, poll, time out and kill remote builds.
//!
//! A run is a single control flow. The only concurrency is the race between
//! the poll ticker and the run deadline, resolved at one `select!` point.

use std::sync::Arc;

use tokio::time::MissedTickBehavior;
use tracing::Instrument;

use crate::changes::{subjects_for, ChangeDetector};
use crate::config::BuildConfig;
use crate::domain::{BuildInfo, BuildOutcome, BuildRequest};
use crate::error::CiError;
use crate::gateway::{PipelineGateway, VcsGateway};
use crate::obs;
use crate::output::{BuildEvent, BuildOutput};

/// How a run ended. The event stream carries the details.
#[derive(Debug)]
pub enum RunOutcome {
    /// Every triggered build succeeded or was skipped (vacuously true when none were triggered).
    Succeeded,

    /// A build failed; sibling builds were left running.
    Failed(BuildInfo),

    /// The deadline expired with builds still pending.
    TimedOut {
        killed: Vec<BuildInfo>,
        kill_failures: Vec<BuildInfo>,
    },

    /// An unrecoverable gateway error stopped the run.
    Aborted(CiError),
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RunOutcome::Succeeded)
    }
}

/// Drives one build per changed project to completion.
pub struct BuildOrchestrator {
    detector: ChangeDetector,
    pipeline: Arc<dyn PipelineGateway>,
    output: Arc<dyn BuildOutput>,
    config: BuildConfig,
}

impl BuildOrchestrator {
    pub fn new(
        pipeline: Arc<dyn PipelineGateway>,
        vcs: Arc<dyn VcsGateway>,
        output: Arc<dyn BuildOutput>,
        config: BuildConfig,
    ) -> Self {
        Self {
            detector: ChangeDetector::new(pipeline.clone(), vcs),
            pipeline,
            output,
            config,
        }
    }

    pub fn detector(&self) -> &ChangeDetector {
        &self.detector
    }

    pub fn config(&self) -> &BuildConfig {
        &self.config
    }

    /// Build every candidate path changed since the last green run of `pipeline_id`.
    ///
    /// With `join` set, all changed projects go into one `|a|b|` subject and a
    /// single build.
    pub async fn run(&self, paths: &[String], pipeline_id: &str, join: bool) -> RunOutcome {
        self.run_inner(paths, pipeline_id, join)
            .instrument(obs::run_span(pipeline_id, join))
            .await
    }

    async fn run_inner(&self, paths: &[String], pipeline_id: &str, join: bool) -> RunOutcome {
        obs::emit_run_started(pipeline_id, paths.len());

        let changed = match self.detector.list_changes(paths, pipeline_id).await {
            Ok(changed) => changed,
            Err(e) => {
                return self.abort(e.context(format!(
                    "can't list paths with changes for workflow ID \"{pipeline_id}\""
                )))
            }
        };
        let subjects = subjects_for(&changed, join);
        obs::emit_changes_listed(changed.len(), subjects.len());

        let mut requests = Vec::new();
        for subject in &subjects {
            let build_id = match self.pipeline.trigger_build(subject).await {
                Ok(build_id) => build_id.filter(|id| !id.as_str().is_empty()),
                Err(e) => {
                    return self.abort(
                        e.context(format!("can't trigger build for project \"{subject}\"")),
                    )
                }
            };
            match build_id {
                Some(build_id) => {
                    self.emit(BuildEvent::BuildTriggered {
                        subject: subject.clone(),
                        build_id: build_id.clone(),
                    });
                    requests.push(BuildRequest::new(subject.clone(), build_id));
                }
                None => self.emit(BuildEvent::NoBuildTriggered {
                    subject: subject.clone(),
                }),
            }
        }

        if requests.is_empty() {
            self.emit(BuildEvent::AllSucceeded { subjects });
            return RunOutcome::Succeeded;
        }

        self.poll_until_done(subjects, requests).await
    }

    async fn poll_until_done(
        &self,
        subjects: Vec<String>,
        mut requests: Vec<BuildRequest>,
    ) -> RunOutcome {
        let mut ticker = tokio::time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick completes immediately; polling starts right away.
        ticker.tick().await;
        let deadline = tokio::time::sleep(self.config.max_duration);
        tokio::pin!(deadline);

        let mut waiting: Vec<BuildInfo>;
        loop {
            waiting = Vec::new();
            for request in requests.iter_mut().filter(|r| r.is_pending()) {
                let outcome = match self.pipeline.build_status(request.build_id()).await {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        return self.abort(e.context(format!(
                            "can't get build status for build ID \"{}\"",
                            request.build_id()
                        )))
                    }
                };
                match outcome {
                    Some(BuildOutcome::Success) => {
                        request.finish(BuildOutcome::Success);
                    }
                    Some(BuildOutcome::Skipped) => {
                        request.finish(BuildOutcome::Skipped);
                        self.emit(BuildEvent::BuildSkipped {
                            subject: request.subject().to_string(),
                        });
                    }
                    Some(BuildOutcome::Failed) => {
                        request.finish(BuildOutcome::Failed);
                        self.emit(BuildEvent::BuildFailed {
                            subject: request.subject().to_string(),
                            build_id: request.build_id().clone(),
                        });
                        return RunOutcome::Failed(request.info());
                    }
                    None => waiting.push(request.info()),
                }
            }

            if waiting.is_empty() {
                self.emit(BuildEvent::AllSucceeded { subjects });
                return RunOutcome::Succeeded;
            }
            self.emit(BuildEvent::WaitingFor {
                builds: waiting.clone(),
            });

            tokio::select! {
                biased;
                _ = &mut deadline => break,
                _ = ticker.tick() => {}
            }
        }

        self.kill_pending(&mut requests, waiting).await
    }

    async fn kill_pending(
        &self,
        requests: &mut [BuildRequest],
        waiting: Vec<BuildInfo>,
    ) -> RunOutcome {
        self.emit(BuildEvent::Timeout {
            max_duration: self.config.max_duration,
        });
        self.emit(BuildEvent::KillingBuilds { builds: waiting });

        let mut killed = Vec::new();
        let mut kill_failures = Vec::new();
        for request in requests.iter_mut().filter(|r| r.is_pending()) {
            match self.pipeline.kill_build(request.build_id()).await {
                Ok(()) => {
                    request.kill();
                    killed.push(request.info());
                }
                Err(e) => {
                    // Keep going: every pending build gets a cancellation attempt.
                    let err = e.context(format!("can't kill build ID \"{}\"", request.build_id()));
                    self.emit(BuildEvent::KillBuildError {
                        subject: request.subject().to_string(),
                        error: err.to_string(),
                    });
                    kill_failures.push(request.info());
                }
            }
        }

        self.emit(BuildEvent::AllKilled);
        RunOutcome::TimedOut {
            killed,
            kill_failures,
        }
    }

    fn abort(&self, error: CiError) -> RunOutcome {
        self.emit(BuildEvent::Abort {
            error: error.to_string(),
        });
        RunOutcome::Aborted(error)
    }

    fn emit(&self, event: BuildEvent) {
        obs::emit_build_event(&event);
        self.output.emit(&event);
    }
}
