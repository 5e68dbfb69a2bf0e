//! Scripted in-memory gateways and a recording sink (testing only)
//!
//! `ScriptedPipeline` and `ScriptedVcs` answer from pre-programmed scripts and
//! log every call; `RecordingOutput` keeps every emitted event.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::domain::{BuildId, BuildOutcome, CommitHash};
use crate::error::{CiError, Result};
use crate::gateway::{PipelineGateway, VcsGateway};
use crate::output::{BuildEvent, BuildOutput};

// ---------------------------------------------------------------------------
// ScriptedPipeline
// ---------------------------------------------------------------------------

/// Scripted answer to a trigger call.
#[derive(Debug, Clone)]
pub enum TriggerScript {
    Started(String),
    NotStarted,
    Error(String),
}

/// Scripted answer to a status poll.
#[derive(Debug, Clone)]
pub enum StatusScript {
    Running,
    Done(BuildOutcome),
    /// Provider returned an outcome outside the known vocabulary.
    Unknown(String),
    Error(String),
}

#[derive(Debug, Default)]
struct PipelineScript {
    last_commit: Option<CommitHash>,
    last_commit_error: Option<String>,
    triggers: HashMap<String, TriggerScript>,
    // The final entry of each queue repeats once the queue is drained.
    statuses: HashMap<String, VecDeque<StatusScript>>,
    kill_errors: HashSet<String>,
}

#[derive(Debug, Default)]
struct PipelineCalls {
    last_successful: Vec<String>,
    triggered: Vec<String>,
    polled: Vec<String>,
    killed: Vec<String>,
}

/// In-memory pipeline gateway driven by scripts.
#[derive(Debug, Default)]
pub struct ScriptedPipeline {
    current: CommitHash,
    script: Mutex<PipelineScript>,
    calls: Mutex<PipelineCalls>,
}

impl ScriptedPipeline {
    pub fn new(last: impl Into<CommitHash>, current: impl Into<CommitHash>) -> Self {
        let pipeline = Self {
            current: current.into(),
            ..Self::default()
        };
        pipeline.script.lock().unwrap().last_commit = Some(last.into());
        pipeline
    }

    pub fn fail_last_successful(self, message: &str) -> Self {
        self.script.lock().unwrap().last_commit_error = Some(message.to_string());
        self
    }

    pub fn trigger(self, subject: &str, script: TriggerScript) -> Self {
        self.script
            .lock()
            .unwrap()
            .triggers
            .insert(subject.to_string(), script);
        self
    }

    /// Shorthand for a trigger that starts build `build_id`.
    pub fn started(self, subject: &str, build_id: &str) -> Self {
        self.trigger(subject, TriggerScript::Started(build_id.to_string()))
    }

    pub fn statuses(self, build_id: &str, scripts: Vec<StatusScript>) -> Self {
        self.script
            .lock()
            .unwrap()
            .statuses
            .insert(build_id.to_string(), scripts.into_iter().collect());
        self
    }

    pub fn fail_kill(self, build_id: &str) -> Self {
        self.script
            .lock()
            .unwrap()
            .kill_errors
            .insert(build_id.to_string());
        self
    }

    pub fn last_successful_calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().last_successful.clone()
    }

    pub fn triggered(&self) -> Vec<String> {
        self.calls.lock().unwrap().triggered.clone()
    }

    pub fn polled(&self) -> Vec<String> {
        self.calls.lock().unwrap().polled.clone()
    }

    pub fn poll_count(&self, build_id: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .polled
            .iter()
            .filter(|id| id.as_str() == build_id)
            .count()
    }

    pub fn killed(&self) -> Vec<String> {
        self.calls.lock().unwrap().killed.clone()
    }
}

#[async_trait]
impl PipelineGateway for ScriptedPipeline {
    async fn last_successful_commit(&self, pipeline_id: &str) -> Result<CommitHash> {
        self.calls
            .lock()
            .unwrap()
            .last_successful
            .push(pipeline_id.to_string());
        let script = self.script.lock().unwrap();
        if let Some(message) = &script.last_commit_error {
            return Err(CiError::Pipeline(message.clone()));
        }
        Ok(script.last_commit.clone().unwrap_or_default())
    }

    fn current_commit(&self) -> CommitHash {
        self.current.clone()
    }

    async fn trigger_build(&self, subject: &str) -> Result<Option<BuildId>> {
        self.calls.lock().unwrap().triggered.push(subject.to_string());
        let script = self.script.lock().unwrap();
        match script.triggers.get(subject) {
            Some(TriggerScript::Started(id)) => Ok(Some(BuildId::new(id.clone()))),
            Some(TriggerScript::NotStarted) | None => Ok(None),
            Some(TriggerScript::Error(message)) => Err(CiError::Pipeline(message.clone())),
        }
    }

    async fn build_status(&self, build_id: &BuildId) -> Result<Option<BuildOutcome>> {
        self.calls
            .lock()
            .unwrap()
            .polled
            .push(build_id.as_str().to_string());
        let mut script = self.script.lock().unwrap();
        let next = match script.statuses.get_mut(build_id.as_str()) {
            Some(queue) if queue.len() > 1 => queue.pop_front(),
            Some(queue) => queue.front().cloned(),
            None => None,
        };
        match next.unwrap_or(StatusScript::Running) {
            StatusScript::Running => Ok(None),
            StatusScript::Done(outcome) => Ok(Some(outcome)),
            StatusScript::Unknown(raw) => raw.parse::<BuildOutcome>().map(Some),
            StatusScript::Error(message) => Err(CiError::Pipeline(message)),
        }
    }

    async fn kill_build(&self, build_id: &BuildId) -> Result<()> {
        self.calls
            .lock()
            .unwrap()
            .killed
            .push(build_id.as_str().to_string());
        if self.script.lock().unwrap().kill_errors.contains(build_id.as_str()) {
            return Err(CiError::Pipeline(format!("cancel rejected for {build_id}")));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// ScriptedVcs
// ---------------------------------------------------------------------------

/// In-memory version-control gateway with a fixed change set.
#[derive(Debug, Default)]
pub struct ScriptedVcs {
    changes: Vec<String>,
    diff_error: Option<String>,
    missing_commits: HashSet<CommitHash>,
    ensure_calls: Mutex<Vec<CommitHash>>,
    diff_calls: Mutex<Vec<(CommitHash, CommitHash)>>,
}

impl ScriptedVcs {
    pub fn with_changes(changes: &[&str]) -> Self {
        Self {
            changes: changes.iter().map(|c| c.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn fail_diff(mut self, message: &str) -> Self {
        self.diff_error = Some(message.to_string());
        self
    }

    /// Commit that stays unavailable even after repair.
    pub fn missing_commit(mut self, sha: &str) -> Self {
        self.missing_commits.insert(CommitHash::new(sha));
        self
    }

    pub fn ensure_calls(&self) -> Vec<CommitHash> {
        self.ensure_calls.lock().unwrap().clone()
    }

    pub fn diff_calls(&self) -> Vec<(CommitHash, CommitHash)> {
        self.diff_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl VcsGateway for ScriptedVcs {
    async fn diff_name_only(&self, from: &CommitHash, to: &CommitHash) -> Result<Vec<String>> {
        self.diff_calls
            .lock()
            .unwrap()
            .push((from.clone(), to.clone()));
        if let Some(message) = &self.diff_error {
            return Err(CiError::Git(message.clone()));
        }
        Ok(self.changes.clone())
    }

    async fn ensure_commit_from_tip(&self, target: &CommitHash) -> Result<()> {
        self.ensure_calls.lock().unwrap().push(target.clone());
        if self.missing_commits.contains(target) {
            return Err(CiError::NoCommit {
                sha: target.to_string(),
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// RecordingOutput
// ---------------------------------------------------------------------------

/// Output sink that keeps every event in memory.
#[derive(Debug, Default)]
pub struct RecordingOutput {
    events: Mutex<Vec<BuildEvent>>,
}

impl RecordingOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<BuildEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Event names in emission order, handy for sequence assertions.
    pub fn names(&self) -> Vec<&'static str> {
        self.events.lock().unwrap().iter().map(|e| e.name()).collect()
    }
}

impl BuildOutput for RecordingOutput {
    fn emit(&self, event: &BuildEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}
