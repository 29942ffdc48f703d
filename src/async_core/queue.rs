use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, TryLockError};

/// Owning side of a cooperative cancellation flag.
#[derive(Debug, Default)]
pub struct StopSource {
    flag: Arc<AtomicBool>,
}

#[derive(Debug, Clone)]
pub struct StopToken {
    flag: Arc<AtomicBool>,
}

impl StopSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn token(&self) -> StopToken {
        StopToken {
            flag: self.flag.clone(),
        }
    }

    /// Returns true only for the call that actually flipped the flag.
    pub fn request_stop(&self) -> bool {
        !self.flag.swap(true, Ordering::SeqCst)
    }

    pub fn stop_requested(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

impl StopToken {
    pub fn stop_requested(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Unbounded MPMC FIFO guarded by a single mutex.
pub struct ThreadsafeQueue<T> {
    items: Mutex<VecDeque<T>>,
    available: Condvar,
}

impl<T> Default for ThreadsafeQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ThreadsafeQueue<T> {
    pub fn new() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            available: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<T>> {
        self.items.lock().expect("Queue lock")
    }

    pub fn push(&self, item: T) {
        self.lock().push_back(item);
        self.available.notify_one();
    }

    /// Pushes only if the lock is uncontended, handing the item back otherwise.
    pub fn try_push(&self, item: T) -> Result<(), T> {
        match self.items.try_lock() {
            Ok(mut items) => {
                items.push_back(item);
                drop(items);
                self.available.notify_one();
                Ok(())
            }
            Err(TryLockError::WouldBlock) => Err(item),
            Err(TryLockError::Poisoned(_)) => panic!("Queue lock poisoned"),
        }
    }

    pub fn try_pop(&self) -> Option<T> {
        self.lock().pop_front()
    }

    /// Like [`Self::try_pop`], but gives up immediately when another thread holds the lock.
    pub fn try_lock_and_try_pop(&self) -> Option<T> {
        match self.items.try_lock() {
            Ok(mut items) => items.pop_front(),
            Err(TryLockError::WouldBlock) => None,
            Err(TryLockError::Poisoned(_)) => panic!("Queue lock poisoned"),
        }
    }

    pub fn wait_and_pop(&self) -> T {
        let mut items = self.lock();
        loop {
            if let Some(item) = items.pop_front() {
                return item;
            }
            items = self.available.wait(items).expect("Queue lock");
        }
    }

    /// Blocks until an item arrives or `stop` is requested, returning `None` in the latter case.
    /// Whoever requests the stop has to call [`Self::notify_waiters`] afterwards.
    pub fn wait_and_pop_until_stopped(&self, stop: &StopToken) -> Option<T> {
        let mut items = self.lock();
        loop {
            if let Some(item) = items.pop_front() {
                return Some(item);
            }

            if stop.stop_requested() {
                return None;
            }

            items = self.available.wait(items).expect("Queue lock");
        }
    }

    /// Wakes every blocked waiter so it can re-check its stop token. Takes the lock first, so a waiter
    /// that checked the token just before can't miss the notification.
    pub fn notify_waiters(&self) {
        let _items = self.lock();
        self.available.notify_all();
    }

    /// Empties the queue, handing back everything it held in FIFO order.
    pub fn take_all(&self) -> Vec<T> {
        std::mem::take(&mut *self.lock()).into()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
