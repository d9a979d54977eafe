//! Units of log-collection work and their execution.
//!
//! A [`LogTask`] is one (project, branch, author, window) query. Executing a
//! task never fails outright: every problem is folded into a
//! [`TaskResult::Failure`] carrying a human-readable message.

use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::branch::{resolve_branch, REMOTE_PREFIX};
use crate::git::{self, GitInvoker, InvocationError};
use crate::log_parser::{parse_log, CommitRecord};
use crate::period::TimeWindow;

/// Identifies one bucket of collected commits.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GroupKey {
    pub project: String,
    pub branch: String,
    pub author: String,
}

impl GroupKey {
    pub fn new(
        project: impl Into<String>,
        branch: impl Into<String>,
        author: impl Into<String>,
    ) -> Self {
        Self {
            project: project.into(),
            branch: branch.into(),
            author: author.into(),
        }
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.project, self.branch, self.author)
    }
}

/// One log query. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogTask {
    pub project: String,
    pub repo_path: PathBuf,
    pub branch: String,
    pub author: String,
    pub window: TimeWindow,
}

impl LogTask {
    /// Group key under the branch name as requested (before resolution).
    pub fn key(&self) -> GroupKey {
        GroupKey::new(&self.project, &self.branch, &self.author)
    }
}

/// Outcome of exactly one [`LogTask`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskResult {
    Success {
        key: GroupKey,
        records: Vec<CommitRecord>,
    },
    Failure {
        key: GroupKey,
        message: String,
    },
}

impl TaskResult {
    pub fn key(&self) -> &GroupKey {
        match self {
            TaskResult::Success { key, .. } | TaskResult::Failure { key, .. } => key,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, TaskResult::Success { .. })
    }
}

/// Run one task: resolve the branch, query the log, parse the output.
///
/// `cancel` is checked before every process spawn. The success key carries
/// the branch as actually queried, so `main` and `origin/main` selections
/// that resolve to the same ref land in the same group.
pub fn run_task(invoker: &dyn GitInvoker, task: &LogTask, cancel: &AtomicBool) -> TaskResult {
    let branch = match resolved_branch(invoker, task, cancel) {
        Ok(branch) => branch,
        Err(err) => return failure(task, &task.branch, &err),
    };

    if cancel.load(Ordering::SeqCst) {
        return failure(task, &branch, &InvocationError::Cancelled);
    }

    let args = git::log_args(&task.author, &task.window, &branch);
    match invoker.run(&task.repo_path, &args) {
        Ok(raw) => {
            let records = parse_log(&raw);
            debug!(
                project = %task.project,
                branch = %branch,
                author = %task.author,
                commits = records.len(),
                "log collected"
            );
            TaskResult::Success {
                key: GroupKey::new(&task.project, branch, &task.author),
                records,
            }
        }
        Err(err) => failure(task, &branch, &err),
    }
}

fn resolved_branch(
    invoker: &dyn GitInvoker,
    task: &LogTask,
    cancel: &AtomicBool,
) -> Result<String, InvocationError> {
    if task.branch.starts_with(REMOTE_PREFIX) {
        return Ok(task.branch.clone());
    }
    if cancel.load(Ordering::SeqCst) {
        return Err(InvocationError::Cancelled);
    }

    match invoker.run(&task.repo_path, &git::branch_listing_args()) {
        Ok(listing) => Ok(resolve_branch(&task.branch, &listing)),
        Err(err) => {
            // Fall back to the name as given; the log query reports the real problem.
            debug!(project = %task.project, branch = %task.branch, error = %err, "branch listing failed");
            Ok(task.branch.clone())
        }
    }
}

fn failure(task: &LogTask, branch: &str, err: &InvocationError) -> TaskResult {
    TaskResult::Failure {
        key: GroupKey::new(&task.project, branch, &task.author),
        message: format!("{} branch {} failed: {err}", task.project, branch),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::sync::Mutex;

    use chrono::NaiveDate;

    /// Replays canned responses keyed by the git subcommand.
    struct ScriptedGit {
        listing: std::result::Result<String, InvocationError>,
        log: std::result::Result<String, InvocationError>,
        calls: Mutex<Vec<Vec<String>>>,
    }

    impl ScriptedGit {
        fn new(
            listing: std::result::Result<&str, InvocationError>,
            log: std::result::Result<&str, InvocationError>,
        ) -> Self {
            Self {
                listing: listing.map(str::to_string),
                log: log.map(str::to_string),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<Vec<String>> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl GitInvoker for ScriptedGit {
        fn run(&self, _repo: &Path, args: &[String]) -> std::result::Result<String, InvocationError> {
            self.calls.lock().unwrap().push(args.to_vec());
            match args[0].as_str() {
                "branch" => self.listing.clone(),
                _ => self.log.clone(),
            }
        }
    }

    fn task(branch: &str) -> LogTask {
        let day = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        LogTask {
            project: "demo".to_string(),
            repo_path: PathBuf::from("/repo"),
            branch: branch.to_string(),
            author: "alice".to_string(),
            window: TimeWindow::from_dates(day, day).unwrap(),
        }
    }

    #[test]
    fn bare_branch_is_resolved_before_log() {
        let git = ScriptedGit::new(
            Ok("* main\n  remotes/origin/main\n"),
            Ok("a1\u{1f}2024-05-01 10:00:00 +0000\u{1f}feat\u{1e}"),
        );
        let result = run_task(&git, &task("main"), &AtomicBool::new(false));

        let calls = git.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0], vec!["branch", "-a"]);
        assert_eq!(calls[1].last().map(String::as_str), Some("origin/main"));

        match result {
            TaskResult::Success { key, records } => {
                assert_eq!(key, GroupKey::new("demo", "origin/main", "alice"));
                assert_eq!(records.len(), 1);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn qualified_branch_skips_listing() {
        let git = ScriptedGit::new(Ok(""), Ok(""));
        let result = run_task(&git, &task("origin/dev"), &AtomicBool::new(false));
        assert_eq!(git.calls().len(), 1);
        assert!(result.is_success());
    }

    #[test]
    fn listing_failure_falls_back_to_requested_name() {
        let git = ScriptedGit::new(
            Err(InvocationError::Failed {
                status: Some(128),
                stderr: "fatal".to_string(),
            }),
            Ok(""),
        );
        let result = run_task(&git, &task("wip"), &AtomicBool::new(false));
        assert_eq!(result.key().branch, "wip");
        assert!(result.is_success());
    }

    #[test]
    fn log_failure_becomes_failure_result() {
        let git = ScriptedGit::new(
            Ok(""),
            Err(InvocationError::Failed {
                status: Some(128),
                stderr: "fatal: bad revision 'wip'".to_string(),
            }),
        );
        match run_task(&git, &task("wip"), &AtomicBool::new(false)) {
            TaskResult::Failure { message, .. } => {
                assert!(message.contains("demo"));
                assert!(message.contains("wip"));
                assert!(message.contains("bad revision"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn cancelled_task_spawns_nothing() {
        let git = ScriptedGit::new(Ok(""), Ok(""));
        let result = run_task(&git, &task("main"), &AtomicBool::new(true));
        assert!(git.calls().is_empty());
        match result {
            TaskResult::Failure { message, .. } => assert!(message.contains("cancelled")),
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
