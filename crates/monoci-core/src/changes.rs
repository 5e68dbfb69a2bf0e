//! Change detection: which candidate paths changed since the last green build.

use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use crate::error::{Result, ResultExt};
use crate::gateway::{PipelineGateway, VcsGateway};

const JOIN_PREFIX: &str = "|";
const JOIN_SEPARATOR: &str = "|";
const JOIN_POSTFIX: &str = "|";

/// Filters candidate project paths down to those touched since the last
/// successful pipeline run.
///
/// Holds no state between calls; identical gateway answers give identical output.
#[derive(Clone)]
pub struct ChangeDetector {
    pipeline: Arc<dyn PipelineGateway>,
    vcs: Arc<dyn VcsGateway>,
}

impl ChangeDetector {
    pub fn new(pipeline: Arc<dyn PipelineGateway>, vcs: Arc<dyn VcsGateway>) -> Self {
        Self { pipeline, vcs }
    }

    /// Candidate paths with at least one changed file below them, in input order.
    pub async fn list_changes(&self, paths: &[String], pipeline_id: &str) -> Result<Vec<String>> {
        let last = self
            .pipeline
            .last_successful_commit(pipeline_id)
            .await
            .with_context(|| {
                format!("can't get last successful commit for workflow ID \"{pipeline_id}\"")
            })?;
        let current = self.pipeline.current_commit();
        debug!(last = %last, current = %current, "Comparing commits");

        // The local clone may be shallow, so the last green commit is not
        // guaranteed to exist yet.
        self.vcs
            .ensure_commit_from_tip(&last)
            .await
            .with_context(|| format!("can't ensure commit \"{last}\" is available locally"))?;

        let changes = self
            .vcs
            .diff_name_only(&last, &current)
            .await
            .with_context(|| format!("can't list changes between \"{last}\" and \"{current}\""))?;
        debug!(changed_files = changes.len(), "Computed change set");

        Ok(filter_paths_with_changes(paths, &changes))
    }

    /// Project names of the changed candidate paths.
    pub async fn list_projects(&self, paths: &[String], pipeline_id: &str) -> Result<Vec<String>> {
        let changed = self.list_changes(paths, pipeline_id).await.with_context(|| {
            format!("can't list paths with changes for workflow ID \"{pipeline_id}\"")
        })?;
        Ok(project_names(&changed))
    }

    /// Project names of the changed candidate paths as one joined subject.
    pub async fn list_projects_joined(
        &self,
        paths: &[String],
        pipeline_id: &str,
    ) -> Result<String> {
        let names = self.list_projects(paths, pipeline_id).await?;
        Ok(join_project_names(&names))
    }
}

/// Keep each path that is a prefix of at least one changed file.
pub fn filter_paths_with_changes(paths: &[String], changes: &[String]) -> Vec<String> {
    paths
        .iter()
        .filter(|path| changes.iter().any(|change| change.starts_with(path.as_str())))
        .cloned()
        .collect()
}

/// Base name of a project path (`services/app1` -> `app1`).
pub fn project_name(path: &str) -> String {
    match Path::new(path).file_name() {
        Some(name) => name.to_string_lossy().into_owned(),
        None => {
            let trimmed = path.trim_end_matches('/');
            if trimmed.is_empty() {
                path.to_string()
            } else {
                trimmed.to_string()
            }
        }
    }
}

pub fn project_names(paths: &[String]) -> Vec<String> {
    paths.iter().map(|p| project_name(p)).collect()
}

/// `|name1|name2|...|`
pub fn join_project_names(names: &[String]) -> String {
    format!(
        "{}{}{}",
        JOIN_PREFIX,
        names.join(JOIN_SEPARATOR),
        JOIN_POSTFIX
    )
}

/// Build subjects for a set of changed paths.
///
/// One subject per project, or a single joined subject when `join` is set.
/// No changed paths means no subjects in either mode.
pub fn subjects_for(paths: &[String], join: bool) -> Vec<String> {
    let names = project_names(paths);
    if join && !names.is_empty() {
        vec![join_project_names(&names)]
    } else {
        names
    }
}
