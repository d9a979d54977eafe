#![allow(dead_code)]

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use assert_cmd::Command;
use git2::{IndexAddOption, Oid, Repository, Signature, Time};
use tempfile::TempDir;
use worklog::collect::{CollectObserver, Progress};
use worklog::git::{GitInvoker, InvocationError};
use worklog::log_parser::CommitRecord;
use worklog::task::GroupKey;

/// 2024-05-01 12:00:00 UTC
pub const COMMIT_TIME: i64 = 1_714_564_800;

/// `worklog` binary with its config and settings isolated under `home`.
pub fn worklog_cmd(home: &Path) -> Command {
    let mut cmd = Command::cargo_bin("worklog").expect("binary");
    cmd.env("WORKLOG_HOME", home)
        .env_remove("WORKLOG_CONFIG")
        .env_remove("RUST_LOG");
    cmd
}

pub struct TestRepo {
    dir: TempDir,
    path: PathBuf,
    repo: Repository,
}

impl TestRepo {
    /// Repository in a directory named `name` (the registered project name).
    pub fn init_named(name: &str) -> Result<Self, git2::Error> {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        let path = dir.path().join(name);
        let repo = Repository::init(&path)?;
        Ok(Self { dir, path, repo })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write_file(&self, rel_path: &str, contents: &str) -> std::io::Result<PathBuf> {
        let path = self.path.join(rel_path);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, contents)?;
        Ok(path)
    }

    /// Commit everything as `author` at `COMMIT_TIME + offset_secs`.
    pub fn commit_as(
        &self,
        author: &str,
        rel_path: &str,
        contents: &str,
        message: &str,
        offset_secs: i64,
    ) -> Result<Oid, Box<dyn std::error::Error>> {
        self.write_file(rel_path, contents)?;

        let mut index = self.repo.index()?;
        index.add_all(["*"].iter(), IndexAddOption::DEFAULT, None)?;
        index.write()?;

        let tree_id = index.write_tree()?;
        let tree = self.repo.find_tree(tree_id)?;
        let email = format!("{}@example.com", author.to_lowercase());
        let sig = Signature::new(author, &email, &Time::new(COMMIT_TIME + offset_secs, 0))?;

        let parent = self
            .repo
            .head()
            .ok()
            .and_then(|head| head.target())
            .and_then(|oid| self.repo.find_commit(oid).ok());

        let oid = match parent {
            Some(parent) => self
                .repo
                .commit(Some("HEAD"), &sig, &sig, message, &tree, &[&parent])?,
            None => self
                .repo
                .commit(Some("HEAD"), &sig, &sig, message, &tree, &[])?,
        };
        Ok(oid)
    }

    pub fn create_branch(&self, name: &str) -> Result<(), git2::Error> {
        let commit = self.repo.head()?.peel_to_commit()?;
        self.repo.branch(name, &commit, false)?;
        Ok(())
    }

    pub fn checkout_branch(&self, name: &str) -> Result<(), git2::Error> {
        let refname = format!("refs/heads/{name}");
        self.repo.set_head(&refname)?;
        self.repo.checkout_head(Some(git2::build::CheckoutBuilder::new().force()))?;
        Ok(())
    }

    /// Name of the branch HEAD points at (`master` or `main` depending on git defaults).
    pub fn head_branch(&self) -> Result<String, git2::Error> {
        let head = self.repo.head()?;
        Ok(head.shorthand().unwrap_or("HEAD").to_string())
    }

    /// Add remote `remote` and a remote-tracking ref `<remote>/<branch>` at HEAD.
    pub fn add_remote_tracking(&self, remote: &str, branch: &str) -> Result<(), git2::Error> {
        if self.repo.find_remote(remote).is_err() {
            self.repo
                .remote(remote, &format!("https://example.invalid/{remote}.git"))?;
        }
        let head = self.repo.head()?.peel_to_commit()?;
        self.repo.reference(
            &format!("refs/remotes/{remote}/{branch}"),
            head.id(),
            true,
            "test remote-tracking ref",
        )?;
        Ok(())
    }

    pub fn repo(&self) -> &Repository {
        &self.repo
    }
}

/// Log output in the `%h<US>%ad<US>%s<RS>` format.
pub fn log_output(records: &[(&str, &str, &str)]) -> String {
    records
        .iter()
        .map(|(hash, date, subject)| format!("{hash}\u{1f}{date}\u{1f}{subject}\u{1e}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Scripted git double keyed by (branch, author) of each `git log` call.
pub struct ScriptedGit {
    listing: String,
    logs: HashMap<(String, String), Result<String, InvocationError>>,
    delay: Duration,
    panic_on_branch: Option<String>,
    calls: AtomicUsize,
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl ScriptedGit {
    pub fn new() -> Self {
        Self {
            listing: String::new(),
            logs: HashMap::new(),
            delay: Duration::ZERO,
            panic_on_branch: None,
            calls: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    pub fn with_listing(mut self, listing: &str) -> Self {
        self.listing = listing.to_string();
        self
    }

    pub fn with_log(mut self, branch: &str, author: &str, output: &str) -> Self {
        self.logs
            .insert((branch.to_string(), author.to_string()), Ok(output.to_string()));
        self
    }

    pub fn with_failure(mut self, branch: &str, author: &str, stderr: &str) -> Self {
        self.logs.insert(
            (branch.to_string(), author.to_string()),
            Err(InvocationError::Failed {
                status: Some(128),
                stderr: stderr.to_string(),
            }),
        );
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn panicking_on(mut self, branch: &str) -> Self {
        self.panic_on_branch = Some(branch.to_string());
        self
    }

    /// Total invocations, listing calls included.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneous invocations seen.
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

impl GitInvoker for ScriptedGit {
    fn run(&self, _repo: &Path, args: &[String]) -> Result<String, InvocationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        self.active.fetch_sub(1, Ordering::SeqCst);

        if args.first().map(String::as_str) == Some("branch") {
            return Ok(self.listing.clone());
        }

        let author = args
            .iter()
            .find_map(|arg| arg.strip_prefix("--author="))
            .unwrap_or_default()
            .to_string();
        let branch = args.last().cloned().unwrap_or_default();

        if self.panic_on_branch.as_deref() == Some(branch.as_str()) {
            panic!("scripted panic on {branch}");
        }

        self.logs
            .get(&(branch, author))
            .cloned()
            .unwrap_or_else(|| Ok(String::new()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    Log(GroupKey, Vec<CommitRecord>),
    Error(String),
    Progress(Progress),
    Finished,
}

/// Records every collector notification in arrival order.
#[derive(Default)]
pub struct RecordingObserver {
    seen: Mutex<Vec<Notification>>,
}

impl RecordingObserver {
    pub fn notifications(&self) -> Vec<Notification> {
        self.seen.lock().unwrap().clone()
    }

    pub fn finished_count(&self) -> usize {
        self.notifications()
            .iter()
            .filter(|n| matches!(n, Notification::Finished))
            .count()
    }

    pub fn progress(&self) -> Vec<Progress> {
        self.notifications()
            .into_iter()
            .filter_map(|n| match n {
                Notification::Progress(p) => Some(p),
                _ => None,
            })
            .collect()
    }

    pub fn errors(&self) -> Vec<String> {
        self.notifications()
            .into_iter()
            .filter_map(|n| match n {
                Notification::Error(message) => Some(message),
                _ => None,
            })
            .collect()
    }

    fn push(&self, notification: Notification) {
        self.seen.lock().unwrap().push(notification);
    }
}

impl CollectObserver for RecordingObserver {
    fn on_log_collected(&self, key: &GroupKey, records: &[CommitRecord]) {
        self.push(Notification::Log(key.clone(), records.to_vec()));
    }

    fn on_error(&self, message: &str) {
        self.push(Notification::Error(message.to_string()));
    }

    fn on_progress(&self, progress: Progress) {
        self.push(Notification::Progress(progress));
    }

    fn on_finished(&self) {
        self.push(Notification::Finished);
    }
}
