use crossbeam_channel::{unbounded, Sender};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::LazyLock;
use std::thread::{available_parallelism, JoinHandle};

type Job = Box<dyn FnOnce() + Send + 'static>;

static SHARED_POOL: LazyLock<TaskPool> =
    LazyLock::new(|| TaskPool::new("degate-worker", get_cpu_count()));

/// Returns the number of available CPU cores, defaulting to 1 when detection fails.
pub fn get_cpu_count() -> usize {
    available_parallelism()
        .map(|p| p.get())
        .unwrap_or_else(|err| {
            log::warn!("Failed to detect available parallelism: {}. Defaulting to single thread.", err);
            1
        })
}

/// The process-wide worker pool, created on first use.
pub fn shared_pool() -> &'static TaskPool {
    &SHARED_POOL
}

/// Runs `op` on the process-wide worker pool.
#[inline]
pub fn async_task<OP>(op: OP)
where
    OP: FnOnce() + Send + 'static,
{
    SHARED_POOL.spawn(op);
}

/// A fixed set of worker threads draining a shared job queue.
///
/// Jobs run in submission order per worker but complete in any order
/// across workers. A panicking job is logged and does not take its worker
/// down. Dropping the pool closes the queue; workers finish the jobs
/// already queued and exit.
pub struct TaskPool {
    name: String,
    sender: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
}

impl TaskPool {
    /// Starts a pool of `threads` workers (at least one).
    pub fn new(name: &str, threads: usize) -> TaskPool {
        let (sender, receiver) = unbounded::<Job>();
        let threads = threads.max(1);
        let mut workers = Vec::with_capacity(threads);

        for index in 0..threads {
            let receiver = receiver.clone();
            let thread_name = format!("{}-{}", name, index);
            let spawned = std::thread::Builder::new()
                .name(thread_name.clone())
                .spawn(move || {
                    while let Ok(job) = receiver.recv() {
                        if catch_unwind(AssertUnwindSafe(job)).is_err() {
                            log::error!("Task panicked on worker {}", thread_name);
                        }
                    }
                });
            match spawned {
                Ok(handle) => workers.push(handle),
                Err(err) => log::error!("Failed to start worker {} of pool {}: {}", index, name, err),
            }
        }

        TaskPool {
            name: name.to_string(),
            sender: Some(sender),
            workers,
        }
    }

    /// Queues `op` for execution on one of the workers.
    pub fn spawn<OP>(&self, op: OP)
    where
        OP: FnOnce() + Send + 'static,
    {
        let sent = match &self.sender {
            Some(sender) if !self.workers.is_empty() => sender.send(Box::new(op)).is_ok(),
            _ => false,
        };
        if !sent {
            log::error!("Task pool {} is not running, task dropped", self.name);
        }
    }

    /// Number of worker threads.
    pub fn threads(&self) -> usize {
        self.workers.len()
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for TaskPool {
    fn drop(&mut self) {
        // closing the channel lets every worker leave its recv loop
        self.sender.take();
        let current = std::thread::current().id();
        for handle in self.workers.drain(..) {
            // the last owner may be a job running on one of our own workers
            if handle.thread().id() == current {
                continue;
            }
            if handle.join().is_err() {
                log::error!("Worker of pool {} terminated abnormally", self.name);
            }
        }
    }
}
