//! Build progress events and the sinks that present them.
//!
//! The orchestrator reports everything through [`BuildOutput::emit`]; sinks
//! have no way to influence the run.

use std::io::Write;
use std::sync::Mutex;
use std::time::Duration;

use serde::{Deserialize, Serialize, Serializer};
use tracing::warn;

use crate::domain::{BuildId, BuildInfo};

/// Progress and outcome events, in emission order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum BuildEvent {
    BuildTriggered { subject: String, build_id: BuildId },
    NoBuildTriggered { subject: String },
    BuildFailed { subject: String, build_id: BuildId },
    BuildSkipped { subject: String },
    WaitingFor { builds: Vec<BuildInfo> },
    AllSucceeded { subjects: Vec<String> },
    Timeout {
        #[serde(serialize_with = "as_secs", deserialize_with = "from_secs")]
        max_duration: Duration,
    },
    KillingBuilds { builds: Vec<BuildInfo> },
    KillBuildError { subject: String, error: String },
    AllKilled,
    /// Unrecoverable failure; always the last event of a run.
    Abort { error: String },
}

impl BuildEvent {
    /// Event name used in structured logs.
    pub fn name(&self) -> &'static str {
        match self {
            BuildEvent::BuildTriggered { .. } => "build.triggered",
            BuildEvent::NoBuildTriggered { .. } => "build.not_triggered",
            BuildEvent::BuildFailed { .. } => "build.failed",
            BuildEvent::BuildSkipped { .. } => "build.skipped",
            BuildEvent::WaitingFor { .. } => "build.waiting",
            BuildEvent::AllSucceeded { .. } => "run.succeeded",
            BuildEvent::Timeout { .. } => "run.timeout",
            BuildEvent::KillingBuilds { .. } => "run.killing",
            BuildEvent::KillBuildError { .. } => "build.kill_error",
            BuildEvent::AllKilled => "run.killed",
            BuildEvent::Abort { .. } => "run.aborted",
        }
    }
}

fn as_secs<S: Serializer>(d: &Duration, s: S) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64())
}

fn from_secs<'de, D>(d: D) -> std::result::Result<Duration, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let secs = f64::deserialize(d)?;
    Ok(Duration::from_secs_f64(secs))
}

/// Receiver of build events.
pub trait BuildOutput: Send + Sync {
    fn emit(&self, event: &BuildEvent);
}

/// Human-readable one-line-per-event presenter.
pub struct ConsolePresenter<W: Write + Send> {
    writer: Mutex<W>,
}

impl<W: Write + Send> ConsolePresenter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn println(&self, line: &str) {
        let mut writer = self
            .writer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Err(e) = writeln!(writer, "{line}") {
            warn!(error = %e, "Failed to write build output");
        }
    }
}

/// Render an event the way the console presenter prints it.
pub fn render_event(event: &BuildEvent) -> String {
    match event {
        BuildEvent::BuildTriggered { subject, build_id } => {
            format!("Build triggered for project '{subject}' with number '{build_id}'")
        }
        BuildEvent::NoBuildTriggered { subject } => format!(
            "WARN: No build triggered for project '{subject}'. \
             Please check if pipeline is defined in your build tool."
        ),
        BuildEvent::BuildFailed { subject, build_id } => {
            format!("Build failed for project '{subject}({build_id})'")
        }
        BuildEvent::BuildSkipped { subject } => format!(
            "WARN: Build was skipped for project '{subject}'. \
             Please check if pipeline is defined in your build tool."
        ),
        BuildEvent::WaitingFor { builds } => {
            format!("Waiting for build {}...", render_builds(builds))
        }
        BuildEvent::AllSucceeded { subjects } => {
            format!("Build successful for all projects: {}", subjects.join(" "))
        }
        BuildEvent::Timeout { max_duration } => format!(
            "Timeout! Some builds were not finished within {} seconds.",
            max_duration.as_secs()
        ),
        BuildEvent::KillingBuilds { builds } => {
            format!("Killing not finished builds: {}...", render_builds(builds))
        }
        BuildEvent::KillBuildError { subject, error } => {
            format!("Killing build '{subject}' error: {error}...")
        }
        BuildEvent::AllKilled => "All not finished builds were killed".to_string(),
        BuildEvent::Abort { error } => format!("ERROR: {error}"),
    }
}

fn render_builds(builds: &[BuildInfo]) -> String {
    builds
        .iter()
        .map(|b| format!("{}({})", b.subject, b.build_id))
        .collect::<Vec<_>>()
        .join(" ")
}

impl<W: Write + Send> BuildOutput for ConsolePresenter<W> {
    fn emit(&self, event: &BuildEvent) {
        self.println(&render_event(event));
    }
}

/// Newline-delimited JSON presenter.
pub struct JsonPresenter<W: Write + Send> {
    writer: Mutex<W>,
}

impl<W: Write + Send> JsonPresenter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<W: Write + Send> BuildOutput for JsonPresenter<W> {
    fn emit(&self, event: &BuildEvent) {
        let line = match serde_json::to_string(event) {
            Ok(line) => line,
            Err(e) => {
                warn!(error = %e, "Failed to serialize build event");
                return;
            }
        };
        let mut writer = self
            .writer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Err(e) = writeln!(writer, "{line}") {
            warn!(error = %e, "Failed to write build output");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(subject: &str, id: &str) -> BuildInfo {
        BuildInfo {
            subject: subject.to_string(),
            build_id: BuildId::new(id),
        }
    }

    #[test]
    fn test_console_lines() {
        let presenter = ConsolePresenter::new(Vec::new());
        presenter.emit(&BuildEvent::BuildTriggered {
            subject: "app1".to_string(),
            build_id: BuildId::new("111"),
        });
        presenter.emit(&BuildEvent::WaitingFor {
            builds: vec![info("app1", "111"), info("app2", "222")],
        });
        presenter.emit(&BuildEvent::AllKilled);

        let out = String::from_utf8(presenter.into_inner()).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(
            lines,
            vec![
                "Build triggered for project 'app1' with number '111'",
                "Waiting for build app1(111) app2(222)...",
                "All not finished builds were killed",
            ]
        );
    }

    #[test]
    fn test_timeout_renders_whole_seconds() {
        let line = render_event(&BuildEvent::Timeout {
            max_duration: Duration::from_millis(900_500),
        });
        assert_eq!(line, "Timeout! Some builds were not finished within 900 seconds.");
    }

    #[test]
    fn test_json_presenter_tags_events() {
        let presenter = JsonPresenter::new(Vec::new());
        presenter.emit(&BuildEvent::BuildSkipped {
            subject: "app3".to_string(),
        });
        presenter.emit(&BuildEvent::Timeout {
            max_duration: Duration::from_millis(1500),
        });

        let out = String::from_utf8(presenter.into_inner()).unwrap();
        let values: Vec<serde_json::Value> = out
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(values[0]["event"], "build_skipped");
        assert_eq!(values[0]["subject"], "app3");
        assert_eq!(values[1]["event"], "timeout");
        assert_eq!(values[1]["max_duration"], 1.5);
    }
}
