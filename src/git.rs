//! Git process invocation and repository discovery.
//!
//! Log collection shells out to the `git` binary so that the user's own
//! configuration (mailmap, credential helpers, date handling) applies.
//! Repository discovery for the project registry goes through libgit2.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use git2::{ErrorCode, Repository};
use thiserror::Error;
use tracing::debug;

use crate::error::{Error, Result};
use crate::period::TimeWindow;

/// Separates commit-id, date and subject within one record (ASCII unit separator).
pub const FIELD_SEPARATOR: char = '\u{1f}';

/// Separates records (ASCII record separator).
pub const RECORD_SEPARATOR: char = '\u{1e}';

/// `git log` pretty format producing `hash US date US subject RS` records.
pub const LOG_PRETTY_FORMAT: &str = "--pretty=format:%h%x1f%ad%x1f%s%x1e";

/// Default wall-clock budget for one git invocation.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Failure of a single external git invocation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvocationError {
    #[error("failed to start {program} in {}: {message}", .path.display())]
    Spawn {
        program: String,
        path: PathBuf,
        message: String,
    },

    #[error("git {command} timed out after {}s", .timeout.as_secs_f32())]
    TimedOut { command: String, timeout: Duration },

    #[error("{stderr}")]
    Failed { status: Option<i32>, stderr: String },

    #[error("cancelled before start")]
    Cancelled,
}

/// Runs a git command in a repository and returns its standard output.
///
/// Implementations must be safe to call from many worker threads at once.
pub trait GitInvoker: Send + Sync {
    fn run(&self, repo: &Path, args: &[String]) -> std::result::Result<String, InvocationError>;
}

/// Invokes the real `git` executable.
#[derive(Debug, Clone)]
pub struct GitCli {
    program: String,
    timeout: Duration,
}

impl GitCli {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl Default for GitCli {
    fn default() -> Self {
        Self::new("git", DEFAULT_TIMEOUT)
    }
}

impl GitInvoker for GitCli {
    fn run(&self, repo: &Path, args: &[String]) -> std::result::Result<String, InvocationError> {
        let command_label = args.first().cloned().unwrap_or_default();
        debug!(repo = %repo.display(), command = %command_label, "spawning git");

        let mut cmd = Command::new(&self.program);
        cmd.args(args)
            .current_dir(repo)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        hide_console_window(&mut cmd);

        let mut child = cmd.spawn().map_err(|err| InvocationError::Spawn {
            program: self.program.clone(),
            path: repo.to_path_buf(),
            message: err.to_string(),
        })?;

        // Drain both pipes concurrently so a chatty child cannot block on a full pipe.
        let stdout_reader = child.stdout.take().map(drain);
        let stderr_reader = child.stderr.take().map(drain);

        let started = Instant::now();
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) if started.elapsed() >= self.timeout => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(InvocationError::TimedOut {
                        command: command_label,
                        timeout: self.timeout,
                    });
                }
                Ok(None) => thread::sleep(WAIT_POLL_INTERVAL),
                Err(err) => {
                    let _ = child.kill();
                    return Err(InvocationError::Spawn {
                        program: self.program.clone(),
                        path: repo.to_path_buf(),
                        message: err.to_string(),
                    });
                }
            }
        };

        let stdout = collect(stdout_reader);
        let stderr = collect(stderr_reader);

        if !status.success() {
            return Err(InvocationError::Failed {
                status: status.code(),
                stderr: String::from_utf8_lossy(&stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&stdout).into_owned())
    }
}

fn drain<R: Read + Send + 'static>(mut pipe: R) -> thread::JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        buf
    })
}

fn collect(reader: Option<thread::JoinHandle<Vec<u8>>>) -> Vec<u8> {
    reader
        .map(|handle| handle.join().unwrap_or_default())
        .unwrap_or_default()
}

#[cfg(windows)]
fn hide_console_window(cmd: &mut Command) {
    use std::os::windows::process::CommandExt;
    const CREATE_NO_WINDOW: u32 = 0x0800_0000;
    cmd.creation_flags(CREATE_NO_WINDOW);
}

#[cfg(not(windows))]
fn hide_console_window(_cmd: &mut Command) {}

/// Arguments for listing local and remote-tracking branches.
pub fn branch_listing_args() -> Vec<String> {
    vec!["branch".to_string(), "-a".to_string()]
}

/// Arguments for one author's log on one branch within a time window.
pub fn log_args(author: &str, window: &TimeWindow, branch: &str) -> Vec<String> {
    vec![
        "log".to_string(),
        format!("--author={author}"),
        format!("--since={}", window.since_arg()),
        format!("--until={}", window.until_arg()),
        LOG_PRETTY_FORMAT.to_string(),
        "--date=iso".to_string(),
        branch.to_string(),
    ]
}

// =============================================================================
// Repository discovery
// =============================================================================

/// Discover a git repository from a starting path.
pub fn discover_repo(start: &Path) -> Result<Repository> {
    Repository::discover(start).map_err(|err| {
        if err.code() == ErrorCode::NotFound {
            Error::NotARepo(start.to_path_buf())
        } else {
            Error::Git(err)
        }
    })
}
