use std::sync::Arc;
use std::time::Duration;

use log::debug;

use crate::async_core::{
    AsyncError, ExecutorHandle, Job, LocalContext, OffscreenContext, TaskCounter, TaskCounterHandle, ThreadPool,
};
use crate::database::ResourceDatabase;

/// Cloneable, thread-safe view of a [`Runtime`], handed to whatever launches jobs.
#[derive(Clone)]
pub struct RuntimeHandles {
    pub thread_pool: ExecutorHandle,
    pub local_context: ExecutorHandle,
    pub offscreen_context: ExecutorHandle,
    pub task_counter: TaskCounterHandle,
}

/// The executors behind the asset pipeline, owned by the thread that owns the resource database.
/// That thread has to call [`Runtime::update`] regularly, or use [`Runtime::block_on`].
pub struct Runtime {
    // Dropped in declaration order.
    local_context: LocalContext,
    task_counter: TaskCounter,
    offscreen_context: OffscreenContext,
    thread_pool: ThreadPool,
    database: Arc<ResourceDatabase>,
}

impl Runtime {
    pub fn new(database: Arc<ResourceDatabase>, num_threads: usize) -> anyhow::Result<Self> {
        let thread_pool = ThreadPool::new(num_threads, "Import Worker");
        let offscreen_context = OffscreenContext::headless()?;
        let task_counter = TaskCounter::new();
        let local_context = LocalContext::with_task_counter(task_counter.handle());

        Ok(Runtime {
            local_context,
            task_counter,
            offscreen_context,
            thread_pool,
            database,
        })
    }

    pub fn database(&self) -> &Arc<ResourceDatabase> {
        &self.database
    }

    pub fn thread_pool(&self) -> &ThreadPool {
        &self.thread_pool
    }

    pub fn local_context(&self) -> &LocalContext {
        &self.local_context
    }

    pub fn offscreen_context(&self) -> &OffscreenContext {
        &self.offscreen_context
    }

    pub fn task_counter(&self) -> &TaskCounter {
        &self.task_counter
    }

    pub fn handles(&self) -> RuntimeHandles {
        RuntimeHandles {
            thread_pool: self.thread_pool.executor(),
            local_context: self.local_context.executor(),
            offscreen_context: self.offscreen_context.executor(),
            task_counter: self.task_counter.handle(),
        }
    }

    /// Runs the continuations queued for the owner thread and the deferred removals of the database.
    /// Returns the number of continuations that ran.
    pub fn update(&self) -> usize {
        let executed = self.local_context.pump();
        let removed = self.database.update();
        if removed > 0 {
            debug!("Processed {} deferred removals", removed);
        }
        executed
    }

    /// Waits for `job` while keeping the owner side responsive.
    pub fn block_on<T>(&self, job: Job<T>) -> Result<T, AsyncError> {
        while !job.is_ready() {
            if self.update() == 0 {
                job.wait_timeout(Duration::from_millis(1));
            }
        }
        job.get_result()
    }

    /// Runs every job in flight to completion, then stops the offscreen context and the thread pool.
    pub fn shutdown(&mut self) {
        while self.task_counter.any_tasks_in_flight() || self.local_context.num_pending() > 0 {
            if self.local_context.flush_strong() == 0 {
                std::thread::sleep(Duration::from_millis(1));
            }
        }
        self.database.update();

        self.offscreen_context.shutdown();
        self.thread_pool.shutdown();
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        self.shutdown();
    }
}
