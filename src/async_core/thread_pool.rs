use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread::JoinHandle;

use log::{debug, trace, warn};

use crate::async_core::future::package_task;
use crate::async_core::queue::{StopSource, StopToken, ThreadsafeQueue};
use crate::async_core::{Executor, ExecutorHandle, Future, Task, run_task_logged};

struct PoolShared {
    name: String,
    queues: Vec<ThreadsafeQueue<Task>>,
    last_emplaced_idx: AtomicUsize,
    /// How many rounds over all queues a submitter tries before it settles for a blocking push.
    emplace_loops: usize,
    accepting: AtomicBool,
}

impl PoolShared {
    fn try_fetch_or_steal(&self, own_idx: usize) -> Option<Task> {
        let num_queues = self.queues.len();
        (0..num_queues)
            .map(|offset| (own_idx + offset) % num_queues)
            .find_map(|idx| self.queues[idx].try_lock_and_try_pop())
    }

    fn worker_loop(&self, own_idx: usize, stop: StopToken) {
        let thread_name = std::thread::current().name().unwrap_or("pool worker").to_string();

        while !stop.stop_requested() {
            if let Some(task) = self.try_fetch_or_steal(own_idx) {
                run_task_logged(task, &thread_name);
                continue;
            }

            if let Some(task) = self.queues[own_idx].wait_and_pop_until_stopped(&stop) {
                run_task_logged(task, &thread_name);
            }
        }

        // No more stealing, but everything that already landed in our own queue still runs.
        let mut drained = 0usize;
        while let Some(task) = self.queues[own_idx].try_pop() {
            run_task_logged(task, &thread_name);
            drained += 1;
        }
        trace!("{} exits after draining {} tasks", thread_name, drained);
    }

    fn drop_leftovers(&self) -> usize {
        self.queues.iter().map(|queue| queue.take_all().len()).sum()
    }

    fn push_task(&self, task: Task) {
        let num_queues = self.queues.len();
        let start = self.last_emplaced_idx.load(Ordering::Relaxed);
        let mut task = task;

        for attempt in 0..num_queues * self.emplace_loops {
            let idx = (start + attempt) % num_queues;
            match self.queues[idx].try_push(task) {
                Ok(()) => {
                    self.last_emplaced_idx.store(idx + 1, Ordering::Relaxed);
                    return;
                }
                Err(returned) => task = returned,
            }
        }

        self.queues[start % num_queues].push(task);
    }
}

impl Executor for PoolShared {
    fn emplace_task(&self, task: Task) {
        if !self.accepting.load(Ordering::SeqCst) {
            warn!("Thread pool {} is shut down, dropping a task", self.name);
            return;
        }

        self.push_task(task);

        // Shutdown swept the queues between the check and the push.
        if !self.accepting.load(Ordering::SeqCst) {
            self.drop_leftovers();
        }
    }
}

/// Fixed size work-stealing pool with one queue per worker.
pub struct ThreadPool {
    shared: Arc<PoolShared>,
    stop: StopSource,
    threads: Vec<JoinHandle<()>>,
}

impl ThreadPool {
    pub fn new(num_threads: usize, name: &str) -> Self {
        let num_threads = num_threads.max(1);
        let shared = Arc::new(PoolShared {
            name: name.to_string(),
            queues: (0..num_threads).map(|_| ThreadsafeQueue::new()).collect(),
            last_emplaced_idx: AtomicUsize::new(0),
            emplace_loops: (512 / num_threads).clamp(1, 64),
            accepting: AtomicBool::new(true),
        });

        let stop = StopSource::new();
        let started = Arc::new(Barrier::new(num_threads + 1));
        let threads = (0..num_threads)
            .map(|idx| {
                let shared = shared.clone();
                let token = stop.token();
                let started = started.clone();
                std::thread::Builder::new()
                    .name(format!("#{} {}", idx, name))
                    .spawn(move || {
                        started.wait();
                        shared.worker_loop(idx, token);
                    })
                    .expect("Spawning a thread pool worker succeeds")
            })
            .collect();

        started.wait();
        debug!("Thread pool {} started with {} workers", name, num_threads);

        Self {
            shared,
            stop,
            threads,
        }
    }

    /// Sized to the machine's available parallelism.
    pub fn with_default_size(name: &str) -> Self {
        let num_threads = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4);
        Self::new(num_threads, name)
    }

    pub fn num_threads(&self) -> usize {
        self.shared.queues.len()
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn executor(&self) -> ExecutorHandle {
        self.shared.clone()
    }

    pub fn emplace<F, R>(&self, f: F) -> Future<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let (task, future) = package_task(f);
        self.shared.emplace_task(task);
        future
    }

    /// Stops stealing, lets every worker drain its own queue and joins them. Tasks submitted after
    /// this point are dropped, which breaks their promises.
    pub fn shutdown(&mut self) {
        if !self.stop.request_stop() {
            return;
        }

        for queue in &self.shared.queues {
            queue.notify_waiters();
        }

        for thread in self.threads.drain(..) {
            if thread.join().is_err() {
                warn!("A worker of thread pool {} terminated abnormally", self.shared.name);
            }
        }

        self.shared.accepting.store(false, Ordering::SeqCst);

        // Whatever workers pushed to already exited peers while draining.
        let dropped = self.shared.drop_leftovers();
        if dropped > 0 {
            warn!(
                "Thread pool {} dropped {} tasks submitted during shutdown",
                self.shared.name, dropped
            );
        }

        debug!("Thread pool {} stopped", self.shared.name);
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}
