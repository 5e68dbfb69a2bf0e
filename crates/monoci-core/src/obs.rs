//! Structured observability hooks for build runs.
//!
//! This module provides:
//! - A run-scoped tracing span via [`run_span`], attached with `Instrument`
//! - Emission of every `BuildEvent` as a structured log line
//!
//! Verbosity follows `RUST_LOG`; JSON output is selected by the binary.

use tracing::{error, info, warn};

use crate::output::BuildEvent;

/// Span tagging every log line of one orchestrated run.
///
/// # Example
///
/// ```ignore
/// orchestrate().instrument(run_span("main.yml", false)).await;
/// ```
pub fn run_span(pipeline_id: &str, join: bool) -> tracing::Span {
    tracing::info_span!("monoci.run", pipeline_id = %pipeline_id, join = join)
}

/// Emit event: run started for a set of candidate paths.
pub fn emit_run_started(pipeline_id: &str, candidates: usize) {
    info!(event = "run.started", pipeline_id = %pipeline_id, candidates = candidates);
}

/// Emit event: changed paths resolved into build subjects.
pub fn emit_changes_listed(changed: usize, subjects: usize) {
    info!(event = "run.changes_listed", changed = changed, subjects = subjects);
}

/// Log a build event at a level matching its severity.
pub fn emit_build_event(event: &BuildEvent) {
    let name = event.name();
    match event {
        BuildEvent::BuildTriggered { subject, build_id } => {
            info!(event = name, subject = %subject, build_id = %build_id);
        }
        BuildEvent::NoBuildTriggered { subject } | BuildEvent::BuildSkipped { subject } => {
            warn!(event = name, subject = %subject);
        }
        BuildEvent::BuildFailed { subject, build_id } => {
            error!(event = name, subject = %subject, build_id = %build_id);
        }
        BuildEvent::WaitingFor { builds } | BuildEvent::KillingBuilds { builds } => {
            info!(event = name, pending = builds.len());
        }
        BuildEvent::AllSucceeded { subjects } => {
            info!(event = name, subjects = subjects.len());
        }
        BuildEvent::Timeout { max_duration } => {
            warn!(event = name, max_duration_ms = max_duration.as_millis() as u64);
        }
        BuildEvent::KillBuildError { subject, error } => {
            warn!(event = name, subject = %subject, error = %error);
        }
        BuildEvent::AllKilled => {
            info!(event = name);
        }
        BuildEvent::Abort { error } => {
            error!(event = name, error = %error);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::BuildId;

    #[derive(Clone, Default)]
    struct Capture(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Capture {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn capture_logs(f: impl FnOnce()) -> String {
        let capture = Capture::default();
        let writer = capture.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::DEBUG)
            .finish();
        tracing::subscriber::with_default(subscriber, f);
        let bytes = capture.0.lock().unwrap().clone();
        String::from_utf8(bytes).unwrap()
    }

    #[test]
    fn test_emit_inside_run_span() {
        let logs = capture_logs(|| {
            let _entered = run_span("main.yml", false).entered();
            emit_run_started("main.yml", 2);
            emit_build_event(&BuildEvent::AllKilled);
        });

        let started = logs.lines().find(|l| l.contains("run.started")).unwrap();
        assert!(started.contains("monoci.run"), "{started}");
        assert!(started.contains("candidates=2"), "{started}");
        assert!(logs.lines().any(|l| l.contains("run.killed")), "{logs}");
    }

    #[test]
    fn test_build_event_levels_follow_severity() {
        let logs = capture_logs(|| {
            emit_build_event(&BuildEvent::BuildFailed {
                subject: "app1".to_string(),
                build_id: BuildId::new("111"),
            });
            emit_build_event(&BuildEvent::KillBuildError {
                subject: "app2".to_string(),
                error: "HTTP 409".to_string(),
            });
        });

        let failed = logs.lines().find(|l| l.contains("build.failed")).unwrap();
        assert!(failed.contains("ERROR"), "{failed}");
        assert!(failed.contains("build_id=111"), "{failed}");
        let kill = logs.lines().find(|l| l.contains("build.kill_error")).unwrap();
        assert!(kill.contains("WARN"), "{kill}");
    }
}
