//! GitHub Actions runner environment.

use std::fmt;

use monoci_core::{CiError, Result};

pub const GITHUB_TOKEN: &str = "GITHUB_TOKEN";
pub const GITHUB_REF: &str = "GITHUB_REF";
pub const GITHUB_SHA: &str = "GITHUB_SHA";
pub const GITHUB_REPOSITORY: &str = "GITHUB_REPOSITORY";
pub const GITHUB_EVENT_TYPE: &str = "GITHUB_EVENT_TYPE";
pub const GITHUB_API_URL: &str = "GITHUB_API_URL";

pub const DEFAULT_API_URL: &str = "https://api.github.com";

/// Variables exported by the Actions runner, plus the optional dispatch
/// event type override.
#[derive(Clone, Default)]
pub struct GitHubActionEnv {
    pub token: String,
    /// Full ref, e.g. `refs/heads/main` or `refs/tags/v1.0`.
    pub git_ref: String,
    pub sha: String,
    /// `owner/repo`
    pub full_name: String,
    pub event_type: Option<String>,
    pub api_url: String,
}

impl GitHubActionEnv {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());
        Self {
            token: get(GITHUB_TOKEN).unwrap_or_default(),
            git_ref: get(GITHUB_REF).unwrap_or_default(),
            sha: get(GITHUB_SHA).unwrap_or_default(),
            full_name: get(GITHUB_REPOSITORY).unwrap_or_default(),
            event_type: get(GITHUB_EVENT_TYPE),
            api_url: get(GITHUB_API_URL).unwrap_or_else(|| DEFAULT_API_URL.to_string()),
        }
    }

    /// Fail listing every missing required variable at once.
    pub fn validate(&self) -> Result<()> {
        let required = [
            (GITHUB_TOKEN, &self.token),
            (GITHUB_REF, &self.git_ref),
            (GITHUB_SHA, &self.sha),
            (GITHUB_REPOSITORY, &self.full_name),
        ];
        let missing: Vec<String> = required
            .iter()
            .filter(|(_, value)| value.is_empty())
            .map(|(name, _)| format!("\"{name}\""))
            .collect();
        if !missing.is_empty() {
            return Err(CiError::Config(format!(
                "required environment variable(s) {} not set",
                missing.join(", ")
            )));
        }
        if self.owner().is_empty() || self.repository().is_empty() {
            return Err(CiError::Config(format!(
                "{GITHUB_REPOSITORY} must look like \"owner/repo\", got \"{}\"",
                self.full_name
            )));
        }
        Ok(())
    }

    /// Last `/`-separated segment of the ref.
    pub fn branch(&self) -> &str {
        self.git_ref.rsplit('/').next().unwrap_or_default()
    }

    pub fn is_tag(&self) -> bool {
        self.git_ref.starts_with("refs/tags")
    }

    pub fn owner(&self) -> &str {
        self.split_repository().0
    }

    pub fn repository(&self) -> &str {
        self.split_repository().1
    }

    fn split_repository(&self) -> (&str, &str) {
        match self.full_name.rsplit_once('/') {
            Some((prefix, repo)) => (prefix.rsplit('/').next().unwrap_or_default(), repo),
            None => ("", ""),
        }
    }
}

impl fmt::Debug for GitHubActionEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GitHubActionEnv")
            .field("token", &if self.token.is_empty() { "" } else { "***" })
            .field("git_ref", &self.git_ref)
            .field("sha", &self.sha)
            .field("full_name", &self.full_name)
            .field("event_type", &self.event_type)
            .field("api_url", &self.api_url)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> GitHubActionEnv {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        GitHubActionEnv::from_lookup(|key| vars.get(key).cloned())
    }

    fn complete() -> GitHubActionEnv {
        env_of(&[
            (GITHUB_TOKEN, "token"),
            (GITHUB_REF, "refs/heads/feature/login"),
            (GITHUB_SHA, "456"),
            (GITHUB_REPOSITORY, "stevedores-org/monorepo"),
        ])
    }

    #[test]
    fn complete_env_validates() {
        let env = complete();
        env.validate().unwrap();
        assert_eq!(env.api_url, DEFAULT_API_URL);
        assert_eq!(env.event_type, None);
    }

    #[test]
    fn lists_every_missing_variable() {
        let err = env_of(&[(GITHUB_SHA, "456")]).validate().unwrap_err();
        assert_eq!(
            err.to_string(),
            "configuration error: required environment variable(s) \"GITHUB_TOKEN\", \
             \"GITHUB_REF\", \"GITHUB_REPOSITORY\" not set"
        );
    }

    #[test]
    fn empty_values_count_as_missing() {
        let env = env_of(&[
            (GITHUB_TOKEN, ""),
            (GITHUB_REF, "refs/heads/main"),
            (GITHUB_SHA, "456"),
            (GITHUB_REPOSITORY, "o/r"),
            (GITHUB_EVENT_TYPE, ""),
        ]);
        assert!(env.validate().unwrap_err().to_string().contains("\"GITHUB_TOKEN\""));
        assert_eq!(env.event_type, None);
    }

    #[test]
    fn malformed_repository_is_rejected() {
        let mut env = complete();
        env.full_name = "monorepo".to_string();
        assert!(env.validate().unwrap_err().to_string().contains("owner/repo"));
    }

    #[test]
    fn branch_is_last_ref_segment() {
        assert_eq!(complete().branch(), "login");
        let mut env = complete();
        env.git_ref = "refs/tags/v1.2.0".to_string();
        assert_eq!(env.branch(), "v1.2.0");
        assert!(env.is_tag());
        assert!(!complete().is_tag());
    }

    #[test]
    fn owner_and_repository_split() {
        let env = complete();
        assert_eq!(env.owner(), "stevedores-org");
        assert_eq!(env.repository(), "monorepo");

        let unset = GitHubActionEnv::default();
        assert_eq!(unset.owner(), "");
        assert_eq!(unset.repository(), "");
    }

    #[test]
    fn debug_hides_token() {
        let rendered = format!("{:?}", complete());
        assert!(!rendered.contains("\"token\""));
        assert!(rendered.contains("***"));
    }
}
