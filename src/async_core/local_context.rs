use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use log::warn;

use crate::async_core::future::package_task;
use crate::async_core::queue::ThreadsafeQueue;
use crate::async_core::task_counter::TaskCounterHandle;
use crate::async_core::{Executor, ExecutorHandle, Future, Task, run_task_logged};

const EXECUTOR_NAME: &str = "local context";

struct LocalQueue {
    tasks: ThreadsafeQueue<Task>,
    /// Cleared when the owning context is dropped.
    accepting: AtomicBool,
}

impl LocalQueue {
    fn new() -> Self {
        Self {
            tasks: ThreadsafeQueue::new(),
            accepting: AtomicBool::new(true),
        }
    }

    fn drop_pending(&self) -> usize {
        self.tasks.take_all().len()
    }
}

impl Executor for LocalQueue {
    fn emplace_task(&self, task: Task) {
        if !self.accepting.load(Ordering::SeqCst) {
            warn!("The local context is gone, dropping a task");
            return;
        }

        self.tasks.push(task);

        // The context was dropped between the check and the push.
        if !self.accepting.load(Ordering::SeqCst) {
            self.drop_pending();
        }
    }
}

/// Continuations that have to run on the thread owning this context. Other threads submit through
/// [`LocalContext::executor`], the owner runs them by pumping.
///
/// Dropping the context keeps pumping until its queue is empty and, if attached, the task counter
/// reports no more work in flight.
pub struct LocalContext {
    queue: Arc<LocalQueue>,
    counter: Option<TaskCounterHandle>,
    // Pinned to the owner thread.
    _not_send: PhantomData<*const ()>,
}

impl Default for LocalContext {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalContext {
    pub fn new() -> Self {
        Self {
            queue: Arc::new(LocalQueue::new()),
            counter: None,
            _not_send: PhantomData,
        }
    }

    pub fn with_task_counter(counter: TaskCounterHandle) -> Self {
        Self {
            queue: Arc::new(LocalQueue::new()),
            counter: Some(counter),
            _not_send: PhantomData,
        }
    }

    pub fn executor(&self) -> ExecutorHandle {
        self.queue.clone()
    }

    pub fn emplace<F, R>(&self, f: F) -> Future<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let (task, future) = package_task(f);
        self.queue.emplace_task(task);
        future
    }

    pub fn num_pending(&self) -> usize {
        self.queue.tasks.len()
    }

    /// Runs the tasks queued at the time of the call. Tasks those enqueue wait for the next pump.
    pub fn pump(&self) -> usize {
        let queued = self.queue.tasks.len();
        let mut executed = 0;
        while executed < queued {
            let Some(task) = self.queue.tasks.try_pop() else {
                break;
            };
            run_task_logged(task, EXECUTOR_NAME);
            executed += 1;
        }
        executed
    }

    /// Runs tasks until the queue is observed empty, including ones enqueued in the meantime.
    pub fn flush_strong(&self) -> usize {
        let mut executed = 0;
        while let Some(task) = self.queue.tasks.try_pop() {
            run_task_logged(task, EXECUTOR_NAME);
            executed += 1;
        }
        executed
    }

    /// Like [`Self::flush_strong`], but stops as soon as a producer holds the queue lock.
    pub fn flush_nonblocking(&self) -> usize {
        let mut executed = 0;
        while let Some(task) = self.queue.tasks.try_lock_and_try_pop() {
            run_task_logged(task, EXECUTOR_NAME);
            executed += 1;
        }
        executed
    }

    fn tasks_in_flight(&self) -> bool {
        self.counter
            .as_ref()
            .is_some_and(|counter| counter.any_tasks_in_flight())
    }

    /// Alternates flushing and sleeping until the queue is empty and no task is in flight.
    pub fn drain_all_tasks(&self, sleep: Duration) {
        loop {
            self.flush_strong();
            if !self.tasks_in_flight() && self.queue.tasks.is_empty() {
                break;
            }
            std::thread::sleep(sleep);
        }
    }
}

impl Drop for LocalContext {
    fn drop(&mut self) {
        self.drain_all_tasks(Duration::from_millis(10));

        self.queue.accepting.store(false, Ordering::SeqCst);
        let dropped = self.queue.drop_pending();
        if dropped > 0 {
            warn!("Local context dropped {} tasks submitted while it went away", dropped);
        }
    }
}
