//! Subset of the GitHub REST payloads used by the Actions gateway.

use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use monoci_core::{CiError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize)]
pub struct WorkflowRuns {
    #[serde(default)]
    pub total_count: u64,
    #[serde(default)]
    pub workflow_runs: Vec<WorkflowRun>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkflowRun {
    pub id: u64,
    #[serde(default)]
    pub run_number: u64,
    #[serde(default)]
    pub head_sha: String,
    pub status: Option<String>,
    pub conclusion: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub jobs_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkflowJobs {
    #[serde(default)]
    pub jobs: Vec<WorkflowJob>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkflowJob {
    pub id: u64,
    #[serde(default)]
    pub name: String,
}

/// Body of `POST /repos/{owner}/{repo}/dispatches`.
#[derive(Debug, Clone, Serialize)]
pub struct DispatchRequest {
    pub event_type: String,
    pub client_payload: serde_json::Value,
}

impl DispatchRequest {
    /// Dispatch asking the workflow to build `job`.
    pub fn for_job(event_type: impl Into<String>, job: &str) -> Self {
        Self {
            event_type: event_type.into(),
            client_payload: serde_json::json!({ "job": job }),
        }
    }
}

/// Extract the run id from a `.../repos/{owner}/{repo}/actions/runs/{id}/jobs` URL.
pub fn run_id_from_jobs_url(url: &str) -> Result<u64> {
    static JOBS_URL: OnceLock<Regex> = OnceLock::new();
    let re = JOBS_URL.get_or_init(|| {
        Regex::new(concat!(
            r"^https?://[^/ ]+(?:/[^/ ]+)*",
            r"/repos/[^/ ]+/[^/ ]+/actions/runs/(?P<id>\d+)/jobs$",
        ))
        .expect("jobs URL pattern compiles")
    });
    let id = re
        .captures(url)
        .and_then(|caps| caps.name("id"))
        .ok_or_else(|| CiError::Http(format!("invalid job url: {url}")))?;
    id.as_str()
        .parse()
        .map_err(|_| CiError::InvalidBuildId(id.as_str().to_string()))
}
