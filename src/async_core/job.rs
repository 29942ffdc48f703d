use std::cell::RefCell;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll, Wake, Waker};
use std::time::Duration;

use arc_swap::ArcSwap;

use crate::async_core::future::{AsyncError, Future, channel, panic_message};
use crate::async_core::{ExecutorHandle, InlineExecutor};

type BoxedBody = Pin<Box<dyn std::future::Future<Output = ()> + Send + 'static>>;

// Scheduling states of a job task.
const IDLE: u8 = 0;
const SCHEDULED: u8 = 1;
const POLLING: u8 = 2;
const NOTIFIED: u8 = 3;
const DONE: u8 = 4;

/// The type erased, pollable part of a [`Job`]. Whenever it is woken it gets submitted to the
/// executor stored in `executor`, which [`reschedule_to`] swaps out.
struct JobTask {
    state: AtomicU8,
    body: Mutex<Option<BoxedBody>>,
    executor: ArcSwap<ExecutorHandle>,
}

thread_local! {
    static CURRENT_JOB: RefCell<Option<Arc<JobTask>>> = const { RefCell::new(None) };
}

/// Makes `task` the current job of this thread, restoring the previous one on drop.
struct CurrentJobScope {
    previous: Option<Arc<JobTask>>,
}

impl CurrentJobScope {
    fn enter(task: &Arc<JobTask>) -> Self {
        let previous = CURRENT_JOB.with(|current| current.replace(Some(task.clone())));
        Self { previous }
    }
}

impl Drop for CurrentJobScope {
    fn drop(&mut self) {
        let previous = self.previous.take();
        CURRENT_JOB.with(|current| *current.borrow_mut() = previous);
    }
}

impl JobTask {
    fn schedule(self: &Arc<Self>) {
        let executor = self.executor.load_full();
        let task = self.clone();
        executor.emplace_task(Box::new(move || task.run()));
    }

    fn run(self: &Arc<Self>) {
        self.state.store(POLLING, Ordering::SeqCst);

        let waker = Waker::from(self.clone());
        let mut cx = Context::from_waker(&waker);
        let mut body = self.body.lock().expect("Job body lock");
        let Some(future) = body.as_mut() else {
            self.state.store(DONE, Ordering::SeqCst);
            return;
        };

        let poll = {
            let _scope = CurrentJobScope::enter(self);
            future.as_mut().poll(&mut cx)
        };

        match poll {
            Poll::Ready(()) => {
                *body = None;
                self.state.store(DONE, Ordering::SeqCst);
            }
            Poll::Pending => {
                drop(body);
                if self
                    .state
                    .compare_exchange(POLLING, IDLE, Ordering::SeqCst, Ordering::SeqCst)
                    .is_err()
                {
                    // Woken while polling (this includes rescheduling), so go again.
                    self.state.store(SCHEDULED, Ordering::SeqCst);
                    self.schedule();
                }
            }
        }
    }
}

impl Wake for JobTask {
    fn wake(self: Arc<Self>) {
        self.wake_by_ref();
    }

    fn wake_by_ref(self: &Arc<Self>) {
        loop {
            match self.state.load(Ordering::SeqCst) {
                IDLE => {
                    if self
                        .state
                        .compare_exchange(IDLE, SCHEDULED, Ordering::SeqCst, Ordering::SeqCst)
                        .is_ok()
                    {
                        self.schedule();
                        return;
                    }
                }
                POLLING => {
                    if self
                        .state
                        .compare_exchange(POLLING, NOTIFIED, Ordering::SeqCst, Ordering::SeqCst)
                        .is_ok()
                    {
                        return;
                    }
                }
                _ => return,
            }
        }
    }
}

/// A suspendable computation producing a `T`. It starts running on the spawning thread and only
/// moves elsewhere when its body awaits [`reschedule_to`].
pub struct Job<T> {
    result: Future<T>,
}

impl<T: Send + 'static> Job<T> {
    pub fn spawn<F>(body: F) -> Job<T>
    where
        F: std::future::Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        let (promise, result) = channel();
        let mut body = Box::pin(body);

        let wrapped: BoxedBody = Box::pin(async move {
            let outcome = std::future::poll_fn(|cx| {
                match panic::catch_unwind(AssertUnwindSafe(|| body.as_mut().poll(cx))) {
                    Ok(Poll::Ready(result)) => Poll::Ready(Ok(result)),
                    Ok(Poll::Pending) => Poll::Pending,
                    Err(payload) => Poll::Ready(Err(panic_message(payload.as_ref()))),
                }
            })
            .await;

            match outcome {
                Ok(Ok(value)) => promise.set_value(value),
                Ok(Err(err)) => promise.set_error(AsyncError::Failed(err)),
                Err(message) => promise.set_error(AsyncError::Panicked(message)),
            }
        });

        let inline: ExecutorHandle = Arc::new(InlineExecutor);
        let task = Arc::new(JobTask {
            state: AtomicU8::new(SCHEDULED),
            body: Mutex::new(Some(wrapped)),
            executor: ArcSwap::from_pointee(inline),
        });
        task.run();

        Job { result }
    }

    /// A job that is already complete.
    pub fn ready(value: T) -> Job<T> {
        let (promise, result) = channel();
        promise.set_value(value);
        Job { result }
    }
}

impl<T> Job<T> {
    pub fn is_ready(&self) -> bool {
        self.result.is_ready()
    }

    /// Blocks the calling thread. Don't call this on a thread that has to run the job's
    /// continuations, prefer [`crate::runtime::Runtime::block_on`] there.
    pub fn wait(&self) {
        self.result.wait()
    }

    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        self.result.wait_timeout(timeout)
    }

    pub fn get_result(self) -> Result<T, AsyncError> {
        self.result.get()
    }
}

impl<T> std::future::Future for Job<T> {
    type Output = Result<T, AsyncError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.result).poll(cx)
    }
}

/// Something whose readiness can be awaited without consuming its result.
pub trait Awaitable {
    fn poll_ready(&self, cx: &mut Context<'_>) -> Poll<()>;
}

impl<T> Awaitable for Future<T> {
    fn poll_ready(&self, cx: &mut Context<'_>) -> Poll<()> {
        Future::poll_ready(self, cx)
    }
}

impl<T> Awaitable for Job<T> {
    fn poll_ready(&self, cx: &mut Context<'_>) -> Poll<()> {
        self.result.poll_ready(cx)
    }
}

pub struct UntilAllReady<'a, A> {
    items: &'a [A],
    next: usize,
}

impl<A: Awaitable> std::future::Future for UntilAllReady<'_, A> {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        let items = self.items;
        while self.next < items.len() {
            if items[self.next].poll_ready(cx).is_pending() {
                return Poll::Pending;
            }
            self.next += 1;
        }
        Poll::Ready(())
    }
}

/// Resolves once every item is ready. The results stay in place, take them afterwards.
pub fn until_all_ready<A: Awaitable>(items: &[A]) -> UntilAllReady<'_, A> {
    UntilAllReady { items, next: 0 }
}

pub struct RescheduleTo {
    executor: Option<ExecutorHandle>,
}

impl std::future::Future for RescheduleTo {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        let Some(executor) = self.executor.take() else {
            return Poll::Ready(());
        };

        let current = CURRENT_JOB.with(|current| current.borrow().clone());
        match current {
            Some(task) => {
                // Picked up by JobTask::run once this poll returns.
                task.executor.store(Arc::new(executor));
                cx.waker().wake_by_ref();
            }
            None => {
                let waker = cx.waker().clone();
                executor.emplace_task(Box::new(move || waker.wake()));
            }
        }
        Poll::Pending
    }
}

/// Suspends the current job and resumes it on `executor`. Every later wake-up of the job is
/// delivered there as well, until the next reschedule.
pub fn reschedule_to(executor: &ExecutorHandle) -> RescheduleTo {
    RescheduleTo {
        executor: Some(executor.clone()),
    }
}
