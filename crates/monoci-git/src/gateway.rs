//! Version-control gateway backed by the `git` command line.

use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};

use async_trait::async_trait;
use monoci_core::{CiError, CommitHash, Result, ResultExt, VcsGateway};
use tokio::process::Command;
use tracing::{debug, info};

use crate::diff::{changed_paths, parse_name_status};

const DEFAULT_REMOTE: &str = "origin";

/// Git gateway rooted at a work tree.
///
/// Every call shells out to `git` in the work directory, so a repaired
/// `.git` directory is picked up without reopening.
#[derive(Debug, Clone)]
pub struct GitGateway {
    work_dir: PathBuf,
}

impl GitGateway {
    /// Open the repository containing `dir`.
    ///
    /// The gateway is rooted at the absolute top level of the work tree, so
    /// `dir` may be relative or any directory inside the checkout.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let start = Self {
            work_dir: dir.into(),
        };
        let top_level = start
            .git(&["rev-parse", "--show-toplevel"])
            .await
            .with_context(|| {
                format!("can't open a repository at {}", start.work_dir.display())
            })?;
        let top_level = top_level.trim_end_matches(['\r', '\n']);
        if top_level.is_empty() {
            return Err(CiError::Git(format!(
                "can't open a repository at {}: no work tree",
                start.work_dir.display()
            )));
        }
        Ok(Self {
            work_dir: PathBuf::from(top_level),
        })
    }

    /// Absolute top level of the work tree.
    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// Whether `sha` names a commit present in the local object store.
    ///
    /// Only full object names are considered; abbreviations never match.
    pub async fn has_commit(&self, sha: &CommitHash) -> Result<bool> {
        if !is_full_object_name(sha.as_str()) {
            return Ok(false);
        }
        let object = format!("{sha}^{{commit}}");
        let output = self.raw(&["cat-file", "-e", &object]).await?;
        Ok(output.status.success())
    }

    pub async fn is_shallow(&self) -> Result<bool> {
        let out = self.git(&["rev-parse", "--is-shallow-repository"]).await?;
        Ok(out.trim() == "true")
    }

    pub async fn remote_url(&self, remote: &str) -> Result<String> {
        let out = self.git(&["remote", "get-url", remote]).await?;
        let url = out.trim().to_string();
        if url.is_empty() {
            return Err(CiError::Git(format!("remote \"{remote}\" has no URL")));
        }
        Ok(url)
    }

    /// Every file path tracked in the tree of `commit`.
    pub async fn files_name_only(&self, commit: &CommitHash) -> Result<Vec<String>> {
        let out = self
            .git(&["ls-tree", "-r", "-z", "--name-only", commit.as_str()])
            .await
            .with_context(|| format!("can't list files of commit \"{commit}\""))?;
        Ok(out
            .split('\0')
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect())
    }

    /// Replace a shallow `.git` with a full bare clone of its origin.
    async fn unshallow_by_reclone(&self) -> Result<()> {
        let url = self
            .remote_url(DEFAULT_REMOTE)
            .await
            .with_context(|| format!("can't get remote \"{DEFAULT_REMOTE}\""))?;
        let dot_git = self.work_dir.join(".git");
        info!(url = %url, path = %dot_git.display(), "Re-cloning shallow repository");

        tokio::fs::remove_dir_all(&dot_git)
            .await
            .map_err(CiError::from)
            .with_context(|| format!("can't delete .git at \"{}\"", dot_git.display()))?;

        let target = dot_git.to_string_lossy().into_owned();
        self.git(&["clone", "--bare", "--quiet", &url, &target])
            .await
            .with_context(|| format!("can't clone .git for URL \"{url}\""))?;
        self.git(&["config", "--bool", "core.bare", "false"]).await?;
        Ok(())
    }

    async fn fetch(&self) -> Result<()> {
        info!(remote = DEFAULT_REMOTE, "Fetching from remote");
        self.git(&["fetch", "--quiet", DEFAULT_REMOTE])
            .await
            .context("can't fetch")?;
        Ok(())
    }

    /// Run git and return stdout, failing on a non-zero exit.
    async fn git(&self, args: &[&str]) -> Result<String> {
        let output = self.raw(args).await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CiError::Git(format!(
                "git {} failed: {}",
                args.join(" "),
                stderr.trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn raw(&self, args: &[&str]) -> Result<Output> {
        debug!(args = ?args, "Running git");
        Command::new("git")
            .args(args)
            .current_dir(&self.work_dir)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| CiError::Git(format!("failed to run git: {e}")))
    }
}

#[async_trait]
impl VcsGateway for GitGateway {
    async fn diff_name_only(&self, from: &CommitHash, to: &CommitHash) -> Result<Vec<String>> {
        // No previous green build: every file at `to` counts as changed.
        if from.is_empty() {
            return self.files_name_only(to).await;
        }
        let out = self
            .git(&[
                "diff-tree",
                "-r",
                "-z",
                "--name-status",
                "--no-renames",
                from.as_str(),
                to.as_str(),
            ])
            .await
            .context("can't get diff changes between trees")?;
        let changes = parse_name_status(&out)?;
        Ok(changed_paths(&changes))
    }

    async fn ensure_commit_from_tip(&self, target: &CommitHash) -> Result<()> {
        if target.is_empty() {
            return Ok(());
        }
        let present = self
            .has_commit(target)
            .await
            .with_context(|| format!("can't check is there a commit \"{target}\""))?;
        if present {
            return Ok(());
        }

        let shallow = self
            .is_shallow()
            .await
            .context("can't check whether the repository is shallow")?;
        if shallow {
            self.unshallow_by_reclone().await?;
        } else {
            self.fetch().await?;
        }

        let present = self
            .has_commit(target)
            .await
            .with_context(|| format!("can't check is there a commit \"{target}\""))?;
        if !present {
            return Err(CiError::NoCommit {
                sha: target.to_string(),
            });
        }
        Ok(())
    }
}

fn is_full_object_name(sha: &str) -> bool {
    matches!(sha.len(), 40 | 64) && sha.chars().all(|c| c.is_ascii_hexdigit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_object_names() {
        assert!(is_full_object_name("64bd0efceae7f8abfd675a2eaadcf3b5aa04e2b1"));
        assert!(!is_full_object_name("64bd0efceae7f8abfd675"));
        assert!(!is_full_object_name("HEAD"));
        assert!(!is_full_object_name("zzbd0efceae7f8abfd675a2eaadcf3b5aa04e2b1"));
    }

    #[tokio::test]
    async fn open_fails_outside_repo() {
        let dir = tempfile::tempdir().unwrap();
        let err = GitGateway::open(dir.path()).await.unwrap_err();
        assert!(err.to_string().contains("can't open a repository"));
    }
}
