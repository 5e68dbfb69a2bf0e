//! Tree change parsing for `git diff-tree --name-status -z` output.

use monoci_core::{CiError, Result};

/// One entry of a tree-to-tree diff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeChange {
    /// Path exists only in the destination tree.
    Insert { to: String },
    /// Path exists only in the source tree.
    Delete { from: String },
    /// Path exists in both trees with different content or mode.
    Modify { from: String, to: String },
}

impl TreeChange {
    /// The path a change contributes to the changed-paths list.
    ///
    /// Inserts report the destination name; deletes and modifications report
    /// the source name.
    pub fn path(&self) -> &str {
        match self {
            TreeChange::Insert { to } => to,
            TreeChange::Delete { from } | TreeChange::Modify { from, .. } => from,
        }
    }
}

/// Parse NUL-separated `<status>\0<path>\0` pairs.
///
/// Renames and copies are expected to be disabled (`--no-renames`), so every
/// record carries exactly one path.
pub fn parse_name_status(raw: &str) -> Result<Vec<TreeChange>> {
    let mut fields = raw.split('\0').filter(|f| !f.is_empty());
    let mut changes = Vec::new();

    while let Some(status) = fields.next() {
        let path = fields
            .next()
            .ok_or_else(|| CiError::Git(format!("diff record {status:?} has no path")))?
            .to_string();
        let change = match status.chars().next() {
            Some('A') => TreeChange::Insert { to: path },
            Some('D') => TreeChange::Delete { from: path },
            // Type changes (file <-> symlink) count as modifications.
            Some('M') | Some('T') => TreeChange::Modify {
                from: path.clone(),
                to: path,
            },
            _ => {
                return Err(CiError::Git(format!(
                    "unexpected diff status {status:?} for {path:?}"
                )))
            }
        };
        changes.push(change);
    }

    Ok(changes)
}

/// Contributing path of every change, in diff order.
pub fn changed_paths(changes: &[TreeChange]) -> Vec<String> {
    changes.iter().map(|c| c.path().to_string()).collect()
}
