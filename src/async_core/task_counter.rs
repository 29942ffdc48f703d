use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

#[derive(Default)]
struct CounterState {
    in_flight: Mutex<usize>,
    idle: Condvar,
}

/// Counts asynchronous operations that still reference an owner object. Dropping the counter blocks
/// until every [`TaskGuard`] has been released.
#[derive(Default)]
pub struct TaskCounter {
    state: Arc<CounterState>,
}

/// Cloneable access to a [`TaskCounter`] for code that launches work but doesn't own the counter.
#[derive(Clone)]
pub struct TaskCounterHandle {
    state: Arc<CounterState>,
}

/// Scope-bound token of one in-flight operation.
pub struct TaskGuard {
    state: Arc<CounterState>,
}

impl CounterState {
    fn obtain(self: &Arc<Self>) -> TaskGuard {
        *self.in_flight.lock().expect("Task counter lock") += 1;
        TaskGuard { state: self.clone() }
    }

    fn count(&self) -> usize {
        *self.in_flight.lock().expect("Task counter lock")
    }
}

impl TaskCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handle(&self) -> TaskCounterHandle {
        TaskCounterHandle {
            state: self.state.clone(),
        }
    }

    pub fn obtain_task_guard(&self) -> TaskGuard {
        self.state.obtain()
    }

    pub fn in_flight(&self) -> usize {
        self.state.count()
    }

    pub fn any_tasks_in_flight(&self) -> bool {
        self.in_flight() != 0
    }

    pub fn wait_until_idle(&self) {
        let in_flight = self.state.in_flight.lock().expect("Task counter lock");
        let _idle = self
            .state
            .idle
            .wait_while(in_flight, |count| *count != 0)
            .expect("Task counter lock");
    }

    /// Returns whether the counter reached zero within `timeout`.
    pub fn wait_until_idle_timeout(&self, timeout: Duration) -> bool {
        let in_flight = self.state.in_flight.lock().expect("Task counter lock");
        let (count, _) = self
            .state
            .idle
            .wait_timeout_while(in_flight, timeout, |count| *count != 0)
            .expect("Task counter lock");
        *count == 0
    }
}

impl Drop for TaskCounter {
    fn drop(&mut self) {
        if self.any_tasks_in_flight() {
            log::debug!("Waiting for {} in-flight tasks before teardown", self.in_flight());
        }
        self.wait_until_idle();
    }
}

impl TaskCounterHandle {
    pub fn obtain_task_guard(&self) -> TaskGuard {
        self.state.obtain()
    }

    pub fn any_tasks_in_flight(&self) -> bool {
        self.state.count() != 0
    }
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        let mut in_flight = self.state.in_flight.lock().expect("Task counter lock");
        *in_flight -= 1;
        if *in_flight == 0 {
            self.state.idle.notify_all();
        }
    }
}
