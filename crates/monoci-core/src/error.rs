//! Error taxonomy for monoci gateways and orchestration.

/// monoci errors.
#[derive(Debug, thiserror::Error)]
pub enum CiError {
    #[error("git error: {0}")]
    Git(String),

    /// The commit could not be made available locally, even after shallow repair.
    #[error("no commit found: {sha}")]
    NoCommit { sha: String },

    #[error("http error: {0}")]
    Http(String),

    #[error("pipeline error: {0}")]
    Pipeline(String),

    /// The pipeline gateway reported an outcome outside the known vocabulary.
    #[error("unknown build outcome: {outcome:?}")]
    UnknownOutcome { outcome: String },

    #[error("invalid build ID: {0}")]
    InvalidBuildId(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<CiError>,
    },
}

impl CiError {
    /// Wrap this error with a human-readable context line.
    pub fn context(self, context: impl Into<String>) -> Self {
        CiError::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Whether the root cause is a missing commit, regardless of wrapping.
    pub fn is_no_commit(&self) -> bool {
        matches!(self.root_cause(), CiError::NoCommit { .. })
    }

    /// Innermost error below all `Context` layers.
    pub fn root_cause(&self) -> &CiError {
        let mut current = self;
        while let CiError::Context { source, .. } = current {
            current = source;
        }
        current
    }
}

/// Result type for monoci operations.
pub type Result<T> = std::result::Result<T, CiError>;

/// Attach context to the error side of a [`Result`].
pub trait ResultExt<T> {
    fn context(self, context: impl Into<String>) -> Result<T>;

    fn with_context<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.context(context))
    }

    fn with_context<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>,
    {
        self.map_err(|e| e.context(f()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_display_chains_messages() {
        let err = CiError::Pipeline("boom".to_string())
            .context("can't trigger build for project \"app1\"");
        assert_eq!(
            err.to_string(),
            "can't trigger build for project \"app1\": pipeline error: boom"
        );
    }

    #[test]
    fn test_is_no_commit_sees_through_context() {
        let err = CiError::NoCommit {
            sha: "abc123".to_string(),
        }
        .context("commit \"abc123\" not found")
        .context("can't list paths with changes");
        assert!(err.is_no_commit());
        assert!(err.to_string().contains("abc123"));
    }

    #[test]
    fn test_is_no_commit_false_for_other_kinds() {
        let err = CiError::Git("fatal: not a git repository".to_string()).context("open");
        assert!(!err.is_no_commit());
        assert!(matches!(err.root_cause(), CiError::Git(_)));
    }

    #[test]
    fn test_result_ext_with_context() {
        let res: Result<()> = Err(CiError::Http("503".to_string()));
        let err = res.with_context(|| format!("can't kill build ID \"{}\"", 42)).unwrap_err();
        assert!(err.to_string().starts_with("can't kill build ID \"42\""));
    }
}
