//! Priority work queue feeding a fixed worker pool
//!
//! Jobs carry an `i32` priority; numerically higher priorities drain
//! first and jobs of equal priority run in submission order. Every
//! submit pushes onto a shared heap and spawns one task on a rayon pool;
//! that task pops whichever job is at the top of the heap when it gets a
//! thread, so the pool always picks the highest pending priority.

use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};
use rayon::{ThreadPool, ThreadPoolBuildError, ThreadPoolBuilder};

type Work = Box<dyn FnOnce() + Send + 'static>;

struct Job {
    priority: i32,
    seq: u64,
    work: Work,
}

impl PartialEq for Job {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl Eq for Job {}

impl PartialOrd for Job {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for Job {
    // Max-heap: higher priority first, then lower sequence number first
    fn cmp(&self, other: &Self) -> CmpOrdering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

#[derive(Default)]
struct QueueState {
    heap: BinaryHeap<Job>,
    next_seq: u64,
    /// Jobs submitted and not yet finished (queued or running)
    outstanding: usize,
    shutdown: bool,
}

struct Shared {
    state: Mutex<QueueState>,
    /// Signalled when `outstanding` drops to zero
    idle: Condvar,
}

/// Cloneable handle used to submit work from inside running jobs.
#[derive(Clone)]
pub struct ExecutorHandle {
    shared: Arc<Shared>,
    pool: Arc<ThreadPool>,
}

impl ExecutorHandle {
    /// Queue `work` at `priority`.
    ///
    /// Once shutdown has begun the work is handed back untouched so the
    /// caller can release whatever it owns.
    pub fn submit<F>(&self, priority: i32, work: F) -> Result<(), F>
    where
        F: FnOnce() + Send + 'static,
    {
        {
            let mut state = self.shared.state.lock();
            if state.shutdown {
                return Err(work);
            }
            let seq = state.next_seq;
            state.next_seq += 1;
            state.outstanding += 1;
            state.heap.push(Job {
                priority,
                seq,
                work: Box::new(work),
            });
        }
        let shared = Arc::clone(&self.shared);
        self.pool.spawn(move || run_next(&shared));
        Ok(())
    }

    /// Number of queued jobs not yet picked up by a worker
    pub fn pending(&self) -> usize {
        self.shared.state.lock().heap.len()
    }

    /// True when nothing is queued or running
    pub fn is_idle(&self) -> bool {
        self.shared.state.lock().outstanding == 0
    }

    /// Block until nothing is queued or running.
    pub fn wait_idle(&self) {
        let mut state = self.shared.state.lock();
        while state.outstanding > 0 {
            self.shared.idle.wait(&mut state);
        }
    }
}

/// Rayon pool draining a shared priority queue.
///
/// Dropping the executor rejects new work and waits for every queued job
/// to finish.
pub struct PriorityExecutor {
    handle: ExecutorHandle,
}

impl PriorityExecutor {
    pub fn new(worker_threads: usize, thread_name_prefix: &str) -> Result<Self, ThreadPoolBuildError> {
        let count = worker_threads.max(1);
        let prefix = thread_name_prefix.to_string();
        let pool = ThreadPoolBuilder::new()
            .num_threads(count)
            .thread_name(move |i| format!("{}-{}", prefix, i))
            .build()?;
        log::debug!("Started {} pipeline workers", count);

        Ok(Self {
            handle: ExecutorHandle {
                shared: Arc::new(Shared {
                    state: Mutex::new(QueueState::default()),
                    idle: Condvar::new(),
                }),
                pool: Arc::new(pool),
            },
        })
    }

    pub fn handle(&self) -> ExecutorHandle {
        self.handle.clone()
    }

    pub fn submit<F>(&self, priority: i32, work: F) -> Result<(), F>
    where
        F: FnOnce() + Send + 'static,
    {
        self.handle.submit(priority, work)
    }

    pub fn wait_idle(&self) {
        self.handle.wait_idle();
    }

    pub fn worker_count(&self) -> usize {
        self.handle.pool.current_num_threads()
    }
}

impl Drop for PriorityExecutor {
    fn drop(&mut self) {
        self.handle.shared.state.lock().shutdown = true;
        self.handle.wait_idle();
    }
}

/// Body of every pool task: run the highest-priority job
fn run_next(shared: &Shared) {
    let Some(job) = shared.state.lock().heap.pop() else {
        return;
    };

    // A panicking job must not skip the outstanding count
    if panic::catch_unwind(AssertUnwindSafe(job.work)).is_err() {
        log::error!("Pipeline job panicked (priority {})", job.priority);
    }

    let mut state = shared.state.lock();
    state.outstanding -= 1;
    if state.outstanding == 0 {
        shared.idle.notify_all();
    }
}
