use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;

use anyhow::Context;
use log::{debug, error, warn};

use crate::async_core::future::{AsyncError, channel, panic_message};
use crate::async_core::queue::{StopSource, ThreadsafeQueue};
use crate::async_core::{Executor, ExecutorHandle, Future, Task};

/// A graphics context that shares its objects with the main one and can be bound to the calling
/// thread.
pub trait SecondaryContext {
    fn make_current(&mut self) -> anyhow::Result<()>;
}

/// Context for setups without a GPU; binding it is a no-op.
#[derive(Debug, Default)]
pub struct HeadlessContext;

impl SecondaryContext for HeadlessContext {
    fn make_current(&mut self) -> anyhow::Result<()> {
        Ok(())
    }
}

type ContextTask = Box<dyn FnOnce(&mut dyn SecondaryContext) + Send + 'static>;

struct ContextQueue {
    tasks: ThreadsafeQueue<ContextTask>,
    /// Cleared once the context thread has been joined.
    accepting: AtomicBool,
}

impl ContextQueue {
    fn new() -> Self {
        Self {
            tasks: ThreadsafeQueue::new(),
            accepting: AtomicBool::new(true),
        }
    }

    /// Requests arriving after shutdown are dropped, which breaks their promises.
    fn push(&self, task: ContextTask) {
        if !self.accepting.load(Ordering::SeqCst) {
            warn!("The offscreen context is shut down, dropping a request");
            return;
        }

        self.tasks.push(task);

        // Shutdown swept the queue between the check and the push.
        if !self.accepting.load(Ordering::SeqCst) {
            self.drop_pending();
        }
    }

    fn drop_pending(&self) -> usize {
        self.tasks.take_all().len()
    }
}

impl Executor for ContextQueue {
    fn emplace_task(&self, task: Task) {
        self.push(Box::new(move |_context: &mut dyn SecondaryContext| task()));
    }
}

/// A dedicated thread owning a [`SecondaryContext`]. Requests run one at a time with the context
/// current.
pub struct OffscreenContext {
    queue: Arc<ContextQueue>,
    stop: StopSource,
    thread: Option<JoinHandle<()>>,
}

impl OffscreenContext {
    /// Spawns the context thread and returns once `create_context` succeeded on it.
    pub fn new<F>(create_context: F) -> anyhow::Result<Self>
    where
        F: FnOnce() -> anyhow::Result<Box<dyn SecondaryContext>> + Send + 'static,
    {
        let queue = Arc::new(ContextQueue::new());
        let stop = StopSource::new();
        let (ready_promise, ready) = channel::<()>();

        let thread = {
            let queue = queue.clone();
            let token = stop.token();
            std::thread::Builder::new()
                .name("Offscreen Context".into())
                .spawn(move || {
                    let mut context = match create_context() {
                        Ok(context) => context,
                        Err(err) => {
                            ready_promise.set_error(AsyncError::Failed(err));
                            return;
                        }
                    };
                    ready_promise.set_value(());

                    while let Some(task) = queue.tasks.wait_and_pop_until_stopped(&token) {
                        run_with_context(context.as_mut(), task);
                    }

                    while let Some(task) = queue.tasks.try_pop() {
                        run_with_context(context.as_mut(), task);
                    }
                })
                .context("Spawning the offscreen context thread")?
        };

        ready.get().context("Creating the secondary context")?;
        debug!("Offscreen context started");

        Ok(Self {
            queue,
            stop,
            thread: Some(thread),
        })
    }

    pub fn headless() -> anyhow::Result<Self> {
        Self::new(|| Ok(Box::new(HeadlessContext) as Box<dyn SecondaryContext>))
    }

    pub fn executor(&self) -> ExecutorHandle {
        self.queue.clone()
    }

    /// Runs `f` on the context thread with the context current.
    pub fn emplace_request<F, R>(&self, f: F) -> Future<R>
    where
        F: FnOnce(&mut dyn SecondaryContext) -> R + Send + 'static,
        R: Send + 'static,
    {
        let (promise, future) = channel();
        self.queue.push(Box::new(move |context: &mut dyn SecondaryContext| {
            match panic::catch_unwind(AssertUnwindSafe(|| f(context))) {
                Ok(value) => promise.set_value(value),
                Err(payload) => promise.set_error(AsyncError::Panicked(panic_message(payload.as_ref()))),
            }
        }));
        future
    }

    /// Runs the remaining requests and joins the thread.
    pub fn shutdown(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };

        self.stop.request_stop();
        self.queue.tasks.notify_waiters();
        if thread.join().is_err() {
            warn!("The offscreen context thread terminated abnormally");
        }

        self.queue.accepting.store(false, Ordering::SeqCst);
        let dropped = self.queue.drop_pending();
        if dropped > 0 {
            warn!("Offscreen context dropped {} requests submitted during shutdown", dropped);
        }
        debug!("Offscreen context stopped");
    }
}

impl Drop for OffscreenContext {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_with_context(context: &mut dyn SecondaryContext, task: ContextTask) {
    if let Err(err) = context.make_current() {
        // Dropping the task breaks its promise.
        error!("Failed to make the secondary context current: {:#}", err);
        return;
    }

    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| task(context))) {
        error!(
            "Task on the offscreen context panicked: {}",
            panic_message(payload.as_ref())
        );
    }
}
