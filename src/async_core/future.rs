use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::task::{Context, Poll, Waker};
use std::time::Duration;

use thiserror::Error;

use crate::async_core::Task;

#[derive(Error, Debug)]
pub enum AsyncError {
    /// The producing side was dropped before it delivered a result.
    #[error("Broken promise: the producer went away without setting a result")]
    BrokenPromise,

    #[error(transparent)]
    Failed(#[from] anyhow::Error),

    #[error("Task panicked: {0}")]
    Panicked(String),
}

impl AsyncError {
    pub fn is_broken_promise(&self) -> bool {
        matches!(self, AsyncError::BrokenPromise)
    }
}

enum Slot<T> {
    Empty,
    Ready(Result<T, AsyncError>),
    Taken,
}

struct SharedState<T> {
    slot: Slot<T>,
    wakers: Vec<Waker>,
}

struct Shared<T> {
    state: Mutex<SharedState<T>>,
    ready: Condvar,
}

impl<T> Shared<T> {
    fn lock(&self) -> MutexGuard<'_, SharedState<T>> {
        self.state.lock().expect("Result channel lock")
    }

    fn set(&self, result: Result<T, AsyncError>) {
        let wakers = {
            let mut state = self.lock();
            debug_assert!(matches!(state.slot, Slot::Empty), "result channel set twice");
            state.slot = Slot::Ready(result);
            std::mem::take(&mut state.wakers)
        };

        self.ready.notify_all();
        wakers.into_iter().for_each(Waker::wake);
    }
}

/// Producing half of a one-shot result channel. Consumed by setting a result; dropping it unset
/// resolves the channel with [`AsyncError::BrokenPromise`].
pub struct Promise<T> {
    shared: Option<Arc<Shared<T>>>,
}

/// Consuming half of a one-shot result channel. Can be waited on from a plain thread or awaited
/// from a job.
pub struct Future<T> {
    shared: Arc<Shared<T>>,
}

pub fn channel<T>() -> (Promise<T>, Future<T>) {
    let shared = Arc::new(Shared {
        state: Mutex::new(SharedState {
            slot: Slot::Empty,
            wakers: Vec::new(),
        }),
        ready: Condvar::new(),
    });

    (
        Promise {
            shared: Some(shared.clone()),
        },
        Future { shared },
    )
}

impl<T> Promise<T> {
    pub fn set_result(mut self, result: Result<T, AsyncError>) {
        if let Some(shared) = self.shared.take() {
            shared.set(result);
        }
    }

    pub fn set_value(self, value: T) {
        self.set_result(Ok(value));
    }

    pub fn set_error(self, error: AsyncError) {
        self.set_result(Err(error));
    }
}

impl<T> Drop for Promise<T> {
    fn drop(&mut self) {
        if let Some(shared) = self.shared.take() {
            shared.set(Err(AsyncError::BrokenPromise));
        }
    }
}

impl<T> Future<T> {
    pub fn is_ready(&self) -> bool {
        !matches!(self.shared.lock().slot, Slot::Empty)
    }

    pub fn wait(&self) {
        let mut state = self.shared.lock();
        while matches!(state.slot, Slot::Empty) {
            state = self.shared.ready.wait(state).expect("Result channel lock");
        }
    }

    /// Returns whether the result became available within `timeout`.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let state = self.shared.lock();
        let (state, _) = self
            .shared
            .ready
            .wait_timeout_while(state, timeout, |state| matches!(state.slot, Slot::Empty))
            .expect("Result channel lock");
        !matches!(state.slot, Slot::Empty)
    }

    /// Blocks until ready and hands out the result. Consumes the future, so the result can only be
    /// taken once.
    pub fn get(self) -> Result<T, AsyncError> {
        self.wait();
        self.take()
    }

    fn take(&self) -> Result<T, AsyncError> {
        let mut state = self.shared.lock();
        match std::mem::replace(&mut state.slot, Slot::Taken) {
            Slot::Ready(result) => result,
            Slot::Empty | Slot::Taken => panic!("Result channel read before it was ready or after it was taken"),
        }
    }

    /// Registers `cx`'s waker unless the result is already there. Doesn't consume the result.
    pub fn poll_ready(&self, cx: &mut Context<'_>) -> Poll<()> {
        let mut state = self.shared.lock();
        if !matches!(state.slot, Slot::Empty) {
            return Poll::Ready(());
        }

        if !state.wakers.iter().any(|waker| waker.will_wake(cx.waker())) {
            state.wakers.push(cx.waker().clone());
        }
        Poll::Pending
    }
}

impl<T> std::future::Future for Future<T> {
    type Output = Result<T, AsyncError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.poll_ready(cx) {
            Poll::Ready(()) => Poll::Ready(self.take()),
            Poll::Pending => Poll::Pending,
        }
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Wraps `f` into a type erased task that resolves the returned future, capturing panics.
pub fn package_task<F, R>(f: F) -> (Task, Future<R>)
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    let (promise, future) = channel();
    let task: Task = Box::new(move || match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(value) => promise.set_value(value),
        Err(payload) => promise.set_error(AsyncError::Panicked(panic_message(payload.as_ref()))),
    });
    (task, future)
}
