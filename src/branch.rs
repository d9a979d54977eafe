//! Branch references and remote-branch resolution.
//!
//! Branches are persisted with a kind prefix (`local/<name>` or
//! `remote/<remote>/<name>`) so that a local branch and a remote-tracking
//! branch with the same short name stay distinct.

use std::collections::HashSet;
use std::fmt;
use std::path::Path;

use git2::BranchType;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::git;

/// Prefix that marks a branch argument as already remote-qualified.
pub const REMOTE_PREFIX: &str = "origin/";

const LISTING_REMOTE_PREFIX: &str = "remotes/origin/";

/// A selectable branch of a project.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BranchRef {
    Local { name: String },
    Remote { remote: String, name: String },
}

impl BranchRef {
    pub fn local(name: impl Into<String>) -> Self {
        BranchRef::Local { name: name.into() }
    }

    pub fn remote(remote: impl Into<String>, name: impl Into<String>) -> Self {
        BranchRef::Remote {
            remote: remote.into(),
            name: name.into(),
        }
    }

    /// Short branch name without remote.
    pub fn name(&self) -> &str {
        match self {
            BranchRef::Local { name } | BranchRef::Remote { name, .. } => name,
        }
    }

    /// Persisted selection key.
    pub fn key(&self) -> String {
        match self {
            BranchRef::Local { name } => format!("local/{name}"),
            BranchRef::Remote { remote, name } => format!("remote/{remote}/{name}"),
        }
    }

    /// Inverse of [`BranchRef::key`].
    pub fn parse_key(raw: &str) -> Option<Self> {
        if let Some(name) = raw.strip_prefix("local/") {
            return non_empty(name).map(BranchRef::local);
        }
        let rest = raw.strip_prefix("remote/")?;
        let (remote, name) = rest.split_once('/')?;
        Some(BranchRef::remote(non_empty(remote)?, non_empty(name)?))
    }

    /// Revision argument handed to `git log`.
    pub fn log_target(&self) -> String {
        match self {
            BranchRef::Local { name } => name.clone(),
            BranchRef::Remote { remote, name } => format!("{remote}/{name}"),
        }
    }
}

impl fmt::Display for BranchRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BranchRef::Local { name } => write!(f, "{name} (local only)"),
            BranchRef::Remote { remote, name } => write!(f, "{remote}/{name}"),
        }
    }
}

fn non_empty(value: &str) -> Option<&str> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

/// Rewrite `requested` to `origin/<requested>` when `git branch -a` output
/// lists a matching remote-tracking branch.
///
/// Names that already carry the `origin/` prefix are returned unchanged.
pub fn resolve_branch(requested: &str, listing: &str) -> String {
    if requested.starts_with(REMOTE_PREFIX) {
        return requested.to_string();
    }

    let wanted = format!("{LISTING_REMOTE_PREFIX}{requested}");
    let tracked = listing
        .lines()
        .filter_map(listing_entry)
        .any(|entry| entry == wanted);
    if tracked {
        format!("{REMOTE_PREFIX}{requested}")
    } else {
        requested.to_string()
    }
}

/// Branch name from one `git branch -a` line (`* main`).
///
/// Symbolic refs such as `remotes/origin/HEAD -> origin/main` are not
/// branches and yield `None`.
fn listing_entry(line: &str) -> Option<&str> {
    let entry = line.trim_start();
    let entry = entry
        .strip_prefix("* ")
        .or_else(|| entry.strip_prefix("+ "))
        .unwrap_or(entry);
    if entry.contains(" -> ") {
        return None;
    }
    Some(entry.trim())
}

/// List the selectable branches of the repository at `path`.
///
/// Remote-tracking branches come first (excluding `HEAD`), followed by
/// local branches whose short name is not already present on a remote.
pub fn list_branches(path: &Path) -> Result<Vec<BranchRef>> {
    let repo = git::discover_repo(path)?;

    let remotes: Vec<String> = repo
        .remotes()?
        .iter()
        .flatten()
        .map(str::to_string)
        .collect();

    let mut branches = Vec::new();
    let mut remote_short_names = HashSet::new();

    for entry in repo.branches(Some(BranchType::Remote))? {
        let (branch, _) = entry?;
        let Some(full_name) = branch.name()? else {
            continue;
        };
        let Some((remote, name)) = split_remote(&remotes, full_name) else {
            continue;
        };
        if name == "HEAD" {
            continue;
        }
        remote_short_names.insert(name.to_string());
        branches.push(BranchRef::remote(remote, name));
    }

    for entry in repo.branches(Some(BranchType::Local))? {
        let (branch, _) = entry?;
        let Some(name) = branch.name()? else {
            continue;
        };
        if !remote_short_names.contains(name) {
            branches.push(BranchRef::local(name));
        }
    }

    Ok(branches)
}

/// Split `origin/feature/x` into (`origin`, `feature/x`) using the known remote names.
fn split_remote<'a>(remotes: &[String], full_name: &'a str) -> Option<(String, &'a str)> {
    remotes
        .iter()
        .filter_map(|remote| {
            full_name
                .strip_prefix(remote.as_str())
                .and_then(|rest| rest.strip_prefix('/'))
                .map(|name| (remote.clone(), name))
        })
        .max_by_key(|(remote, _)| remote.len())
}
