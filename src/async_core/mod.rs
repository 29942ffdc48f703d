//! Concurrency building blocks of the pipeline: queues, one-shot result channels, executors and
//! suspendable jobs.

use std::sync::Arc;

mod future;
mod job;
mod local_context;
mod offscreen_context;
mod queue;
mod task_counter;
mod thread_pool;

pub use future::{AsyncError, Future, Promise, channel, package_task};
pub use job::{Awaitable, Job, RescheduleTo, UntilAllReady, reschedule_to, until_all_ready};
pub use local_context::LocalContext;
pub use offscreen_context::{HeadlessContext, OffscreenContext, SecondaryContext};
pub use queue::{StopSource, StopToken, ThreadsafeQueue};
pub use task_counter::{TaskCounter, TaskCounterHandle, TaskGuard};
pub use thread_pool::ThreadPool;

pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Something that eventually runs submitted tasks, on whatever thread(s) it owns.
pub trait Executor: Send + Sync {
    fn emplace_task(&self, task: Task);
}

pub type ExecutorHandle = Arc<dyn Executor>;

/// Runs tasks right away on the submitting thread.
pub struct InlineExecutor;

impl Executor for InlineExecutor {
    fn emplace_task(&self, task: Task) {
        task()
    }
}

/// Submits `f` to `executor` and returns a future for its return value.
pub fn submit<F, R>(executor: &dyn Executor, f: F) -> Future<R>
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    let (task, future) = package_task(f);
    executor.emplace_task(task);
    future
}

/// Runs a raw task without letting a panic unwind into the executor's own loop.
pub(crate) fn run_task_logged(task: Task, executor_name: &str) {
    if let Err(payload) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(task)) {
        log::error!(
            "Task on {} panicked: {}",
            executor_name,
            future::panic_message(payload.as_ref())
        );
    }
}
