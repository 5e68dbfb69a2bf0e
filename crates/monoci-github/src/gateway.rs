//! GitHub Actions implementation of [`PipelineGateway`].

use std::time::Duration;

use async_trait::async_trait;
use chrono::{SubsecRound, Utc};
use monoci_core::{BuildId, BuildOutcome, CiError, CommitHash, PipelineGateway, Result};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use crate::api::{run_id_from_jobs_url, DispatchRequest, WorkflowJobs, WorkflowRun, WorkflowRuns};
use crate::env::GitHubActionEnv;

/// Attempts made to find the run started by a dispatch.
pub const DISPATCH_LOOKUP_ATTEMPTS: u32 = 5;
pub const DISPATCH_LOOKUP_DELAY: Duration = Duration::from_secs(1);

const API_VERSION: &str = "2022-11-28";

/// Pipeline gateway for GitHub Actions workflows.
pub struct GitHubActionsGateway {
    env: GitHubActionEnv,
    http: reqwest::Client,
    lookup_attempts: u32,
    lookup_delay: Duration,
}

impl GitHubActionsGateway {
    pub fn new(env: GitHubActionEnv) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
        headers.insert("X-GitHub-Api-Version", HeaderValue::from_static(API_VERSION));
        let mut auth = HeaderValue::from_str(&format!("Bearer {}", env.token))
            .map_err(|e| CiError::Config(format!("invalid GitHub token: {e}")))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);

        let http = reqwest::Client::builder()
            .user_agent(concat!("monoci/", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .build()
            .map_err(|e| CiError::Http(format!("can't build HTTP client: {e}")))?;

        Ok(Self {
            env,
            http,
            lookup_attempts: DISPATCH_LOOKUP_ATTEMPTS,
            lookup_delay: DISPATCH_LOOKUP_DELAY,
        })
    }

    /// Build from the process environment, validating required variables.
    pub fn from_env() -> Result<Self> {
        let env = GitHubActionEnv::from_env();
        env.validate()?;
        Self::new(env)
    }

    /// Override how long a trigger waits for its run to show up.
    pub fn with_dispatch_lookup(mut self, attempts: u32, delay: Duration) -> Self {
        self.lookup_attempts = attempts;
        self.lookup_delay = delay;
        self
    }

    pub fn env(&self) -> &GitHubActionEnv {
        &self.env
    }

    fn repo_url(&self, path: &str) -> String {
        format!(
            "{}/repos/{}/{}{}",
            self.env.api_url.trim_end_matches('/'),
            self.env.owner(),
            self.env.repository(),
            path
        )
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http.request(method, self.repo_url(path))
    }

    /// Jobs of `run`, following the API's `jobs_url` when it is given.
    fn jobs_request(&self, run: &WorkflowRun) -> RequestBuilder {
        match run.jobs_url.as_deref() {
            Some(url) => self.http.get(url),
            None => self.request(Method::GET, &format!("/actions/runs/{}/jobs", run.id)),
        }
    }

    async fn send(&self, request: RequestBuilder, what: &str) -> Result<Response> {
        request
            .send()
            .await
            .map_err(|e| CiError::Http(format!("{what}: {e}")))
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        what: &str,
    ) -> Result<T> {
        let response = self.send(request, what).await?;
        let response = ensure_success(response, what).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| CiError::Http(format!("{what}: invalid response body: {e}")))
    }

    /// Id of the first run created since `since` with a job mentioning `subject`.
    async fn find_dispatched_run(
        &self,
        subject: &str,
        since: chrono::DateTime<Utc>,
    ) -> Result<Option<u64>> {
        for attempt in 1..=self.lookup_attempts {
            let runs: WorkflowRuns = self
                .get_json(
                    self.request(Method::GET, "/actions/runs")
                        .query(&[("event", "repository_dispatch")]),
                    "can't list workflow runs for a repository",
                )
                .await?;

            for run in runs.workflow_runs.iter().filter(|r| is_new_run(r, since)) {
                let jobs: WorkflowJobs = self
                    .get_json(
                        self.jobs_request(run),
                        &format!("can't list jobs of a workflow run, ID {}", run.id),
                    )
                    .await?;
                if jobs.jobs.iter().any(|job| job.name.contains(subject)) {
                    return match run.jobs_url.as_deref() {
                        Some(url) => run_id_from_jobs_url(url).map(Some),
                        None => Ok(Some(run.id)),
                    };
                }
            }

            debug!(subject, attempt, "Dispatched run not visible yet");
            if attempt < self.lookup_attempts {
                tokio::time::sleep(self.lookup_delay).await;
            }
        }
        Ok(None)
    }
}

#[async_trait]
impl PipelineGateway for GitHubActionsGateway {
    async fn last_successful_commit(&self, pipeline_id: &str) -> Result<CommitHash> {
        let mut request =
            self.request(Method::GET, &format!("/actions/workflows/{pipeline_id}/runs"));
        // Runs started by a tag carry no branch; don't filter on one.
        if !self.env.is_tag() {
            request = request.query(&[("branch", self.env.branch())]);
        }
        let mut runs: WorkflowRuns = self
            .get_json(
                request,
                &format!("can't list workflow runs by workflow ID, {pipeline_id}"),
            )
            .await?;

        runs.workflow_runs.sort_by(|a, b| b.run_number.cmp(&a.run_number));
        let last = runs
            .workflow_runs
            .iter()
            .find(|run| run.conclusion.as_deref() == Some("success"))
            .map(|run| CommitHash::new(run.head_sha.as_str()))
            .unwrap_or_default();
        debug!(pipeline_id, commit = %last, "Resolved last successful commit");
        Ok(last)
    }

    fn current_commit(&self) -> CommitHash {
        CommitHash::new(self.env.sha.as_str())
    }

    async fn trigger_build(&self, subject: &str) -> Result<Option<BuildId>> {
        let event_type = self
            .env
            .event_type
            .clone()
            .unwrap_or_else(|| format!("build-{subject}"));
        // Run timestamps have whole-second precision.
        let since = Utc::now().trunc_subsecs(0);

        let response = self
            .send(
                self.request(Method::POST, "/dispatches")
                    .json(&DispatchRequest::for_job(event_type.as_str(), subject)),
                "can't dispatch event",
            )
            .await?;
        ensure_success(response, "can't dispatch event").await?;
        info!(subject, event_type = %event_type, "Dispatched repository event");

        let run_id = self.find_dispatched_run(subject, since).await?;
        Ok(run_id.map(|id| BuildId::new(id.to_string())))
    }

    async fn build_status(&self, build_id: &BuildId) -> Result<Option<BuildOutcome>> {
        let run_id = parse_run_id(build_id)?;
        let run: WorkflowRun = self
            .get_json(
                self.request(Method::GET, &format!("/actions/runs/{run_id}")),
                &format!("can't get a workflow run, ID {run_id}"),
            )
            .await?;
        debug!(run_id, status = ?run.status, conclusion = ?run.conclusion, "Polled workflow run");
        Ok(outcome_from_conclusion(run.conclusion.as_deref()))
    }

    async fn kill_build(&self, build_id: &BuildId) -> Result<()> {
        let run_id = parse_run_id(build_id)?;
        let what = format!("can't cancel a workflow run, ID {run_id}");
        let response = self
            .send(
                self.request(Method::POST, &format!("/actions/runs/{run_id}/cancel")),
                &what,
            )
            .await?;
        if response.status() == StatusCode::ACCEPTED {
            return Ok(());
        }
        Err(CiError::Http(format!("{what}: HTTP {}", response.status())))
    }
}

/// Map a run conclusion onto the closed outcome set; anything else means still running.
pub fn outcome_from_conclusion(conclusion: Option<&str>) -> Option<BuildOutcome> {
    match conclusion? {
        "success" => Some(BuildOutcome::Success),
        "failure" | "cancelled" => Some(BuildOutcome::Failed),
        "skipped" => Some(BuildOutcome::Skipped),
        _ => None,
    }
}

fn parse_run_id(build_id: &BuildId) -> Result<u64> {
    build_id
        .as_str()
        .parse()
        .map_err(|_| CiError::InvalidBuildId(build_id.to_string()))
}

fn is_new_run(run: &WorkflowRun, since: chrono::DateTime<Utc>) -> bool {
    run.created_at.is_some_and(|created| created >= since)
}

async fn ensure_success(response: Response, what: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(CiError::Http(format!("{what}: HTTP {status}: {}", body.trim())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conclusions_map_to_outcomes() {
        assert_eq!(outcome_from_conclusion(Some("success")), Some(BuildOutcome::Success));
        assert_eq!(outcome_from_conclusion(Some("failure")), Some(BuildOutcome::Failed));
        assert_eq!(outcome_from_conclusion(Some("cancelled")), Some(BuildOutcome::Failed));
        assert_eq!(outcome_from_conclusion(Some("skipped")), Some(BuildOutcome::Skipped));
        assert_eq!(outcome_from_conclusion(Some("neutral")), None);
        assert_eq!(outcome_from_conclusion(None), None);
    }

    #[test]
    fn build_id_must_be_numeric() {
        assert_eq!(parse_run_id(&BuildId::new("123")).unwrap(), 123);
        let err = parse_run_id(&BuildId::new("run-1")).unwrap_err();
        assert!(matches!(err, CiError::InvalidBuildId(ref id) if id == "run-1"));
    }

    #[test]
    fn runs_without_timestamp_are_never_new() {
        let run: WorkflowRun = serde_json::from_str(r#"{"id": 1}"#).unwrap();
        assert!(!is_new_run(&run, Utc::now()));
    }
}
