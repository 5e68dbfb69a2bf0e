//! Build requests and their lifecycle.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::CiError;

/// Opaque build identifier assigned by the pipeline provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BuildId(pub String);

impl BuildId {
    pub fn new(id: impl Into<String>) -> Self {
        BuildId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for BuildId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Terminal outcome reported by a build status poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildOutcome {
    Success,
    Skipped,
    Failed,
}

impl BuildOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            BuildOutcome::Success => "success",
            BuildOutcome::Skipped => "skipped",
            BuildOutcome::Failed => "failed",
        }
    }
}

impl FromStr for BuildOutcome {
    type Err = CiError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "success" => Ok(BuildOutcome::Success),
            "skipped" => Ok(BuildOutcome::Skipped),
            "failed" => Ok(BuildOutcome::Failed),
            other => Err(CiError::UnknownOutcome {
                outcome: other.to_string(),
            }),
        }
    }
}

impl std::fmt::Display for BuildOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of a single build request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestState {
    Pending,
    Finished(BuildOutcome),
    Killed,
}

impl RequestState {
    pub fn is_pending(&self) -> bool {
        matches!(self, RequestState::Pending)
    }
}

/// Subject/build-ID pair as reported to the output sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildInfo {
    pub subject: String,
    pub build_id: BuildId,
}

/// A triggered build tracked by the orchestrator.
///
/// State moves out of `Pending` at most once; terminal states are final.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildRequest {
    subject: String,
    build_id: BuildId,
    state: RequestState,
}

impl BuildRequest {
    pub fn new(subject: impl Into<String>, build_id: BuildId) -> Self {
        Self {
            subject: subject.into(),
            build_id,
            state: RequestState::Pending,
        }
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn build_id(&self) -> &BuildId {
        &self.build_id
    }

    pub fn state(&self) -> RequestState {
        self.state
    }

    pub fn is_pending(&self) -> bool {
        self.state.is_pending()
    }

    /// Record a polled outcome. Returns `false` when the request was already terminal.
    pub fn finish(&mut self, outcome: BuildOutcome) -> bool {
        self.transition(RequestState::Finished(outcome))
    }

    /// Record a deadline cancellation. Returns `false` when the request was already terminal.
    pub fn kill(&mut self) -> bool {
        self.transition(RequestState::Killed)
    }

    pub fn info(&self) -> BuildInfo {
        BuildInfo {
            subject: self.subject.clone(),
            build_id: self.build_id.clone(),
        }
    }

    fn transition(&mut self, next: RequestState) -> bool {
        if !self.state.is_pending() {
            return false;
        }
        self.state = next;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_from_str() {
        assert_eq!("success".parse::<BuildOutcome>().unwrap(), BuildOutcome::Success);
        assert_eq!("skipped".parse::<BuildOutcome>().unwrap(), BuildOutcome::Skipped);
        assert_eq!("failed".parse::<BuildOutcome>().unwrap(), BuildOutcome::Failed);
    }

    #[test]
    fn test_unknown_outcome_is_error() {
        let err = "neutral".parse::<BuildOutcome>().unwrap_err();
        assert!(matches!(err, CiError::UnknownOutcome { ref outcome } if outcome == "neutral"));
    }

    #[test]
    fn test_request_transitions_once() {
        let mut req = BuildRequest::new("app1", BuildId::new("111"));
        assert!(req.is_pending());
        assert!(req.finish(BuildOutcome::Skipped));
        assert_eq!(req.state(), RequestState::Finished(BuildOutcome::Skipped));

        assert!(!req.finish(BuildOutcome::Failed));
        assert!(!req.kill());
        assert_eq!(req.state(), RequestState::Finished(BuildOutcome::Skipped));
    }

    #[test]
    fn test_killed_is_terminal() {
        let mut req = BuildRequest::new("app2", BuildId::new("222"));
        assert!(req.kill());
        assert!(!req.finish(BuildOutcome::Success));
        assert_eq!(req.state(), RequestState::Killed);
    }
}
