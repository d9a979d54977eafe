//! Bounded-concurrency worker pool for log tasks.
//!
//! The pool holds a fixed number of worker threads; a batch may contain any
//! number of tasks and the excess waits in the pool's queue. Each task runs
//! exactly once and always yields a [`TaskResult`]: a panic inside the task
//! is caught at the task boundary and reported as a failure.

use std::any::Any;
use std::num::NonZeroUsize;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::{debug, error};

use crate::error::{Error, Result};
use crate::task::{LogTask, TaskResult};

/// Runs batches of [`LogTask`]s with at most `max_concurrency` in flight.
pub struct Scheduler {
    pool: ThreadPool,
    max_concurrency: usize,
}

impl Scheduler {
    /// Build a pool. `None` uses the machine's available parallelism.
    pub fn new(max_concurrency: Option<usize>) -> Result<Self> {
        let max_concurrency = max_concurrency
            .unwrap_or_else(default_concurrency)
            .max(1);

        let pool = ThreadPoolBuilder::new()
            .num_threads(max_concurrency)
            .thread_name(|idx| format!("worklog-worker-{idx}"))
            .panic_handler(|payload| {
                error!(panic = %panic_message(payload.as_ref()), "result handler panicked");
            })
            .build()
            .map_err(|err| Error::OperationFailed(format!("failed to start worker pool: {err}")))?;

        Ok(Self {
            pool,
            max_concurrency,
        })
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// Queue every task; `execute` runs on a worker and `on_result` receives
    /// its outcome on the same worker. Returns immediately.
    pub fn submit_batch<E, S>(&self, tasks: Vec<LogTask>, execute: E, on_result: S)
    where
        E: Fn(&LogTask) -> TaskResult + Send + Sync + 'static,
        S: Fn(TaskResult) + Send + Sync + 'static,
    {
        debug!(tasks = tasks.len(), workers = self.max_concurrency, "submitting batch");

        let execute = Arc::new(execute);
        let on_result = Arc::new(on_result);

        for task in tasks {
            let execute = Arc::clone(&execute);
            let on_result = Arc::clone(&on_result);
            self.pool.spawn(move || {
                let result = match panic::catch_unwind(AssertUnwindSafe(|| execute(&task))) {
                    Ok(result) => result,
                    Err(payload) => TaskResult::Failure {
                        key: task.key(),
                        message: format!(
                            "[{}:{}] task panicked: {}",
                            task.project,
                            task.branch,
                            panic_message(payload.as_ref())
                        ),
                    },
                };
                on_result(result);
            });
        }
    }
}

fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1)
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
