//! Fixed size worker pool used for asset decoding
//!
//! Jobs are queued on a crossbeam channel shared by all workers. Every job
//! submitted through [`ThreadPool::add_task`] returns a [`Task`] handle which
//! can be waited on from any thread.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;

use crossbeam::channel::{unbounded, Receiver, Sender};
use once_cell::sync::Lazy;
use parking_lot::{Condvar, Mutex};

type Job = Box<dyn FnOnce() + Send + 'static>;

enum TaskState<T> {
    Pending,
    Done(Option<T>),
    Panicked,
}

/// Handle to a job running on a [`ThreadPool`]
pub struct Task<T> {
    state: Mutex<TaskState<T>>,
    finished: Condvar,
}

impl<T> Task<T> {
    fn new() -> Self {
        Self {
            state: Mutex::new(TaskState::Pending),
            finished: Condvar::new(),
        }
    }

    fn complete(&self, state: TaskState<T>) {
        let mut guard = self.state.lock();
        *guard = state;
        self.finished.notify_all();
    }

    /// Block until the job has run
    pub fn wait(&self) {
        let mut guard = self.state.lock();
        while matches!(*guard, TaskState::Pending) {
            self.finished.wait(&mut guard);
        }
    }

    /// Whether the job has run (or panicked)
    pub fn is_done(&self) -> bool {
        !matches!(*self.state.lock(), TaskState::Pending)
    }

    /// Whether the job panicked
    pub fn panicked(&self) -> bool {
        matches!(*self.state.lock(), TaskState::Panicked)
    }

    /// Wait for the job and move its result out.
    ///
    /// Returns `None` if the job panicked or the result was already taken.
    pub fn take(&self) -> Option<T> {
        self.wait();
        match &mut *self.state.lock() {
            TaskState::Done(result) => result.take(),
            _ => None,
        }
    }
}

/// Fixed size pool of worker threads
pub struct ThreadPool {
    workers: Vec<Worker>,
    sender: Option<Sender<Job>>,
}

static GLOBAL_POOL: Lazy<Arc<ThreadPool>> = Lazy::new(|| {
    let threads = thread::available_parallelism().map_or(4, std::num::NonZeroUsize::get);
    Arc::new(ThreadPool::new(threads))
});

impl ThreadPool {
    /// Spawn `size` workers (at least one)
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        let (sender, receiver) = unbounded::<Job>();

        let workers = (0..size)
            .filter_map(|id| match Worker::spawn(id, receiver.clone()) {
                Ok(worker) => Some(worker),
                Err(e) => {
                    log::error!("Failed to spawn pool worker {}: {}", id, e);
                    None
                }
            })
            .collect::<Vec<_>>();

        Self::with_workers(workers, sender)
    }

    /// Without workers the queue is closed so tasks complete as panicked
    fn with_workers(workers: Vec<Worker>, sender: Sender<Job>) -> Self {
        if workers.is_empty() {
            log::error!("Thread pool has no workers, tasks will fail");
            return Self { workers, sender: None };
        }
        log::debug!("Thread pool started with {} workers", workers.len());
        Self {
            workers,
            sender: Some(sender),
        }
    }

    /// The process wide pool, sized to the available parallelism
    pub fn global() -> Arc<Self> {
        Arc::clone(&GLOBAL_POOL)
    }

    /// Number of worker threads
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Queue `job` and return a handle to its completion
    pub fn add_task<T, F>(&self, job: F) -> Arc<Task<T>>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        let task = Arc::new(Task::new());
        let handle = Arc::clone(&task);

        let wrapped: Job = Box::new(move || {
            match panic::catch_unwind(AssertUnwindSafe(job)) {
                Ok(value) => handle.complete(TaskState::Done(Some(value))),
                Err(_) => {
                    log::error!("Pool task panicked");
                    handle.complete(TaskState::Panicked);
                }
            }
        });

        let queued = self
            .sender
            .as_ref()
            .map(|sender| sender.send(wrapped));

        match queued {
            Some(Ok(())) => {}
            // Workers are gone; never leave a waiter hanging.
            Some(Err(_)) | None => task.complete(TaskState::Panicked),
        }

        task
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        // Closing the channel lets every worker drain the queue and exit.
        self.sender.take();
        for worker in self.workers.drain(..) {
            if worker.thread.join().is_err() {
                log::warn!("Pool worker {} exited abnormally", worker.id);
            }
        }
    }
}

struct Worker {
    id: usize,
    thread: thread::JoinHandle<()>,
}

impl Worker {
    fn spawn(id: usize, receiver: Receiver<Job>) -> std::io::Result<Self> {
        let thread = thread::Builder::new()
            .name(format!("mana-worker-{id}"))
            .spawn(move || {
                while let Ok(job) = receiver.recv() {
                    job();
                }
            })?;

        Ok(Self { id, thread })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_task_returns_value() {
        let pool = ThreadPool::new(2);
        let task = pool.add_task(|| 21 * 2);
        assert_eq!(task.take(), Some(42));
        assert!(task.is_done());
        assert_eq!(task.take(), None);
    }

    #[test]
    fn test_all_tasks_run() {
        let pool = ThreadPool::new(3);
        let counter = Arc::new(AtomicUsize::new(0));
        let tasks: Vec<_> = (0..32)
            .map(|_| {
                let counter = Arc::clone(&counter);
                pool.add_task(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                })
            })
            .collect();

        for task in &tasks {
            task.wait();
        }
        assert_eq!(counter.load(Ordering::SeqCst), 32);
    }

    #[test]
    fn test_panicking_task_does_not_hang_waiters() {
        let pool = ThreadPool::new(1);
        let task = pool.add_task(|| -> u32 { panic!("decode exploded") });
        task.wait();
        assert!(task.panicked());
        assert_eq!(task.take(), None);

        // The worker survives the panic.
        let next = pool.add_task(|| 7);
        assert_eq!(next.take(), Some(7));
    }

    #[test]
    fn test_zero_size_pool_gets_one_worker() {
        let pool = ThreadPool::new(0);
        assert_eq!(pool.worker_count(), 1);
    }

    #[test]
    fn test_pool_without_workers_fails_tasks() {
        let (sender, _receiver) = unbounded::<Job>();
        let pool = ThreadPool::with_workers(Vec::new(), sender);
        assert_eq!(pool.worker_count(), 0);

        let task = pool.add_task(|| 7);
        assert!(task.is_done());
        assert!(task.panicked());
        assert_eq!(task.take(), None);
    }

    #[test]
    fn test_global_pool_is_shared() {
        assert!(Arc::ptr_eq(&ThreadPool::global(), &ThreadPool::global()));
    }
}
