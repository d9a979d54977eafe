//! Multi-repository log collection runs.
//!
//! A [`Collector`] expands a selection into one [`LogTask`] per
//! (project, branch, author), hands the batch to the [`Scheduler`], and
//! folds results into [`GroupedLogs`] as they arrive from worker threads.
//!
//! Every run produces, in order: one `on_log_collected` or `on_error` per
//! task, each followed by `on_progress`, and finally exactly one
//! `on_finished`. Notifications are queued in the order the run state
//! changes and delivered on a single dispatcher thread, so observers see
//! them totally ordered and may call back into the collector. A run with
//! no tasks emits only `on_finished`.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, SendError, Sender};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;

use serde::{Serialize, Serializer};
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::git::GitInvoker;
use crate::log_parser::CommitRecord;
use crate::period::TimeWindow;
use crate::scheduler::{panic_message, Scheduler};
use crate::task::{run_task, GroupKey, LogTask, TaskResult};

// =============================================================================
// Selection
// =============================================================================

/// A project as seen by one run: where it lives and which branches to read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Project {
    pub name: String,
    pub path: PathBuf,
    pub branches: Vec<String>,
}

/// Projects keyed by name, in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProjectMap {
    projects: Vec<Project>,
}

impl ProjectMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the project with the same name (keeping its position).
    pub fn insert(&mut self, project: Project) {
        match self.projects.iter_mut().find(|p| p.name == project.name) {
            Some(existing) => *existing = project,
            None => self.projects.push(project),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Project> {
        self.projects.iter().find(|p| p.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Project> {
        self.projects.iter()
    }

    pub fn len(&self) -> usize {
        self.projects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.projects.is_empty()
    }

    pub fn branch_count(&self) -> usize {
        self.projects.iter().map(|p| p.branches.len()).sum()
    }
}

impl FromIterator<Project> for ProjectMap {
    fn from_iter<I: IntoIterator<Item = Project>>(iter: I) -> Self {
        let mut map = ProjectMap::new();
        for project in iter {
            map.insert(project);
        }
        map
    }
}

/// Check a selection before starting a run.
///
/// [`Collector::start`] tolerates empty selections; callers that want to
/// tell the user *why* nothing would run use this first.
pub fn validate_selection(projects: &ProjectMap, authors: &[String]) -> Result<()> {
    if normalize_authors(authors).is_empty() {
        return Err(Error::ZeroSelection("no authors selected".to_string()));
    }
    if projects.branch_count() == 0 {
        return Err(Error::ZeroSelection(
            "no projects or branches selected".to_string(),
        ));
    }
    Ok(())
}

/// Trimmed, non-empty, first-occurrence-deduplicated authors.
fn normalize_authors(authors: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for author in authors {
        let author = author.trim();
        if !author.is_empty() && !out.iter().any(|seen| seen == author) {
            out.push(author.to_string());
        }
    }
    out
}

/// One task per project × branch × author.
pub fn expand_tasks(projects: &ProjectMap, authors: &[String], window: &TimeWindow) -> Vec<LogTask> {
    let authors = normalize_authors(authors);
    let mut tasks = Vec::new();
    for project in projects.iter() {
        for branch in &project.branches {
            for author in &authors {
                tasks.push(LogTask {
                    project: project.name.clone(),
                    repo_path: project.path.clone(),
                    branch: branch.clone(),
                    author: author.clone(),
                    window: window.clone(),
                });
            }
        }
    }
    tasks
}

// =============================================================================
// Results
// =============================================================================

/// Commit records per group, in first-insertion order of the groups.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupedLogs {
    order: Vec<GroupKey>,
    groups: HashMap<GroupKey, Vec<CommitRecord>>,
}

impl GroupedLogs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append records under `key`; repeated keys concatenate.
    pub fn append(&mut self, key: GroupKey, records: Vec<CommitRecord>) {
        match self.groups.get_mut(&key) {
            Some(existing) => existing.extend(records),
            None => {
                self.order.push(key.clone());
                self.groups.insert(key, records);
            }
        }
    }

    pub fn get(&self, key: &GroupKey) -> Option<&[CommitRecord]> {
        self.groups.get(key).map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&GroupKey, &[CommitRecord])> {
        self.order
            .iter()
            .filter_map(|key| self.groups.get(key).map(|records| (key, records.as_slice())))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn commit_count(&self) -> usize {
        self.groups.values().map(Vec::len).sum()
    }

    pub fn clear(&mut self) {
        self.order.clear();
        self.groups.clear();
    }
}

impl Serialize for GroupedLogs {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        #[derive(Serialize)]
        struct Group<'a> {
            #[serde(flatten)]
            key: &'a GroupKey,
            commits: &'a [CommitRecord],
        }

        serializer.collect_seq(self.iter().map(|(key, commits)| Group { key, commits }))
    }
}

/// Completed versus total tasks of the current run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Progress {
    pub completed: usize,
    pub total: usize,
}

impl Progress {
    pub fn is_complete(&self) -> bool {
        self.completed == self.total
    }
}

/// Receives run notifications. Calls may come from any worker thread.
pub trait CollectObserver: Send + Sync {
    fn on_log_collected(&self, _key: &GroupKey, _records: &[CommitRecord]) {}
    fn on_error(&self, _message: &str) {}
    fn on_progress(&self, _progress: Progress) {}
    fn on_finished(&self) {}
}

/// Forwards every notification to each inner observer in order.
#[derive(Default)]
pub struct ObserverSet {
    observers: Vec<Arc<dyn CollectObserver>>,
}

impl ObserverSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, observer: Arc<dyn CollectObserver>) -> Self {
        self.observers.push(observer);
        self
    }
}

impl CollectObserver for ObserverSet {
    fn on_log_collected(&self, key: &GroupKey, records: &[CommitRecord]) {
        for observer in &self.observers {
            observer.on_log_collected(key, records);
        }
    }

    fn on_error(&self, message: &str) {
        for observer in &self.observers {
            observer.on_error(message);
        }
    }

    fn on_progress(&self, progress: Progress) {
        for observer in &self.observers {
            observer.on_progress(progress);
        }
    }

    fn on_finished(&self) {
        for observer in &self.observers {
            observer.on_finished();
        }
    }
}

/// Final state of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub logs: GroupedLogs,
    pub errors: Vec<String>,
    pub progress: Progress,
}

// =============================================================================
// Collector
// =============================================================================

/// Mutable state of one run.
#[derive(Default)]
struct RunState {
    running: bool,
    /// Set once `on_finished` has been handed to the observer.
    delivered: bool,
    logs: GroupedLogs,
    errors: Vec<String>,
    progress: Progress,
}

impl RunState {
    fn summary(&self) -> RunSummary {
        RunSummary {
            logs: self.logs.clone(),
            errors: self.errors.clone(),
            progress: self.progress,
        }
    }
}

/// One run, shared by its handle, its in-flight tasks and the collector.
struct Run {
    state: Mutex<RunState>,
    delivered: Condvar,
}

impl Run {
    fn new(total: usize) -> Self {
        Self {
            state: Mutex::new(RunState {
                running: total > 0,
                progress: Progress {
                    completed: 0,
                    total,
                },
                ..RunState::default()
            }),
            delivered: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RunState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn mark_delivered(&self) {
        self.lock().delivered = true;
        self.delivered.notify_all();
    }
}

/// A notification waiting for the dispatcher thread.
enum Notice {
    Log(GroupKey, Vec<CommitRecord>),
    Error(String),
    Progress(Progress),
    Finished(Arc<Run>),
}

/// Fold one task result into `run` and queue its notifications.
///
/// Notices are queued while the run lock is held, so their order matches
/// the order of state changes across all workers.
fn record(run: &Arc<Run>, notices: &Sender<Notice>, result: TaskResult) {
    let mut state = run.lock();
    if !state.running {
        warn!(key = %result.key(), "dropping result from a finished run");
        return;
    }

    match result {
        TaskResult::Success { key, records } => {
            queue(notices, Notice::Log(key.clone(), records.clone()));
            state.logs.append(key, records);
        }
        TaskResult::Failure { key, message } => {
            warn!(key = %key, error = %message, "log task failed");
            queue(notices, Notice::Error(message.clone()));
            state.errors.push(message);
        }
    }

    state.progress.completed += 1;
    queue(notices, Notice::Progress(state.progress));

    if state.progress.is_complete() {
        state.running = false;
        info!(
            tasks = state.progress.total,
            groups = state.logs.len(),
            errors = state.errors.len(),
            "collection finished"
        );
        queue(notices, Notice::Finished(Arc::clone(run)));
    }
}

fn queue(notices: &Sender<Notice>, notice: Notice) {
    if let Err(SendError(notice)) = notices.send(notice) {
        // Dispatcher gone: nobody observes, but waiters must still wake.
        if let Notice::Finished(run) = notice {
            run.mark_delivered();
        }
    }
}

/// Deliver notices in order, with no collector lock held.
///
/// Observers may call back into the collector. A panicking observer is
/// logged and does not stop later notices.
fn dispatch(observer: Arc<dyn CollectObserver>, notices: Receiver<Notice>) {
    for notice in notices {
        let delivered = panic::catch_unwind(AssertUnwindSafe(|| match &notice {
            Notice::Log(key, records) => observer.on_log_collected(key, records),
            Notice::Error(message) => observer.on_error(message),
            Notice::Progress(progress) => observer.on_progress(*progress),
            Notice::Finished(_) => observer.on_finished(),
        }));
        if let Err(payload) = delivered {
            error!(panic = %panic_message(payload.as_ref()), "observer panicked");
        }
        if let Notice::Finished(run) = notice {
            run.mark_delivered();
        }
    }
}

/// Runs collections, one at a time.
///
/// Observer callbacks arrive on a dedicated dispatcher thread, never on a
/// worker, and never while collector state is locked.
pub struct Collector {
    invoker: Arc<dyn GitInvoker>,
    scheduler: Scheduler,
    current: Mutex<Option<Arc<Run>>>,
    notices: Sender<Notice>,
}

impl Collector {
    pub fn new(
        invoker: Arc<dyn GitInvoker>,
        scheduler: Scheduler,
        observer: Arc<dyn CollectObserver>,
    ) -> Result<Self> {
        let (notices, receiver) = mpsc::channel();
        thread::Builder::new()
            .name("worklog-observer".to_string())
            .spawn(move || dispatch(observer, receiver))?;

        Ok(Self {
            invoker,
            scheduler,
            current: Mutex::new(None),
            notices,
        })
    }

    /// Start a run over `projects` × branches × `authors`.
    ///
    /// Fails with [`Error::RunInProgress`] while a previous run is still
    /// draining. An empty expansion finishes immediately.
    pub fn start(
        &self,
        projects: &ProjectMap,
        authors: &[String],
        window: &TimeWindow,
    ) -> Result<RunHandle> {
        let tasks = expand_tasks(projects, authors, window);
        let cancel = Arc::new(AtomicBool::new(false));
        let run = Arc::new(Run::new(tasks.len()));

        {
            let mut current = self.lock_current();
            if current.as_ref().is_some_and(|previous| previous.lock().running) {
                return Err(Error::RunInProgress);
            }
            *current = Some(Arc::clone(&run));
        }

        let handle = RunHandle {
            run: Arc::clone(&run),
            cancel: Arc::clone(&cancel),
        };

        if tasks.is_empty() {
            debug!("nothing selected; finishing immediately");
            queue(&self.notices, Notice::Finished(run));
            return Ok(handle);
        }

        info!(
            tasks = tasks.len(),
            workers = self.scheduler.max_concurrency(),
            window = %window,
            "starting collection"
        );

        let invoker = Arc::clone(&self.invoker);
        let notices = self.notices.clone();
        self.scheduler.submit_batch(
            tasks,
            move |task| run_task(invoker.as_ref(), task, &cancel),
            move |result| record(&run, &notices, result),
        );

        Ok(handle)
    }

    pub fn is_running(&self) -> bool {
        self.lock_current()
            .as_ref()
            .is_some_and(|run| run.lock().running)
    }

    /// Copy of the latest (possibly partial) run state.
    pub fn snapshot(&self) -> RunSummary {
        self.lock_current()
            .as_ref()
            .map(|run| run.lock().summary())
            .unwrap_or_default()
    }

    fn lock_current(&self) -> MutexGuard<'_, Option<Arc<Run>>> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Handle to one started run.
pub struct RunHandle {
    run: Arc<Run>,
    cancel: Arc<AtomicBool>,
}

impl RunHandle {
    /// Block until this run's `on_finished` has been delivered and return
    /// its results. Must not be called from an observer callback.
    pub fn wait(&self) -> RunSummary {
        let mut state = self.run.lock();
        while !state.delivered {
            state = self
                .run
                .delivered
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
        state.summary()
    }

    /// Ask tasks that have not spawned git yet to fail fast as cancelled.
    /// The run still drains and finishes normally.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    /// Whether every task of this run has reported.
    pub fn is_finished(&self) -> bool {
        !self.run.lock().running
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(id: &str) -> CommitRecord {
        CommitRecord::new(id, "2024-05-01 10:00:00 +0000", format!("msg {id}"))
    }

    #[test]
    fn grouped_logs_concatenate_repeated_keys() {
        let mut logs = GroupedLogs::new();
        let a = GroupKey::new("p", "main", "alice");
        let b = GroupKey::new("p", "dev", "alice");
        logs.append(a.clone(), vec![rec("1")]);
        logs.append(b.clone(), vec![rec("2")]);
        logs.append(a.clone(), vec![rec("3")]);

        let order: Vec<&GroupKey> = logs.iter().map(|(key, _)| key).collect();
        assert_eq!(order, vec![&a, &b]);
        assert_eq!(logs.get(&a).unwrap().len(), 2);
        assert_eq!(logs.commit_count(), 3);
    }

    #[test]
    fn expansion_is_cartesian_and_dedups_authors() {
        let window = crate::period::TimeWindow::parse_dates("2024-01-01", "2024-01-31").unwrap();
        let projects: ProjectMap = vec![
            Project {
                name: "a".to_string(),
                path: PathBuf::from("/a"),
                branches: vec!["main".to_string(), "dev".to_string()],
            },
            Project {
                name: "b".to_string(),
                path: PathBuf::from("/b"),
                branches: vec![],
            },
        ]
        .into_iter()
        .collect();
        let authors = vec![
            "alice".to_string(),
            " bob ".to_string(),
            "alice".to_string(),
            "  ".to_string(),
        ];

        let tasks = expand_tasks(&projects, &authors, &window);
        let keys: Vec<String> = tasks.iter().map(|t| t.key().to_string()).collect();
        assert_eq!(
            keys,
            vec!["a:main:alice", "a:main:bob", "a:dev:alice", "a:dev:bob"]
        );
    }

    #[test]
    fn validate_selection_names_what_is_missing() {
        let projects: ProjectMap = vec![Project {
            name: "a".to_string(),
            path: PathBuf::from("/a"),
            branches: vec!["main".to_string()],
        }]
        .into_iter()
        .collect();

        let err = validate_selection(&projects, &[]).unwrap_err();
        assert!(err.to_string().contains("no authors"));

        let err = validate_selection(&ProjectMap::new(), &["alice".to_string()]).unwrap_err();
        assert!(err.to_string().contains("no projects"));

        assert!(validate_selection(&projects, &["alice".to_string()]).is_ok());
    }

    #[test]
    fn project_map_insert_replaces_in_place() {
        let mut map = ProjectMap::new();
        for (name, path) in [("a", "/a"), ("b", "/b"), ("a", "/a2")] {
            map.insert(Project {
                name: name.to_string(),
                path: PathBuf::from(path),
                branches: vec![],
            });
        }
        let names: Vec<&str> = map.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(map.get("a").unwrap().path, PathBuf::from("/a2"));
    }

    #[test]
    fn grouped_logs_serialize_in_order() {
        let mut logs = GroupedLogs::new();
        logs.append(GroupKey::new("p", "main", "alice"), vec![rec("1")]);
        let json = serde_json::to_value(&logs).unwrap();
        assert_eq!(json[0]["project"], "p");
        assert_eq!(json[0]["branch"], "main");
        assert_eq!(json[0]["commits"][0]["commit"], "1");
    }
}
