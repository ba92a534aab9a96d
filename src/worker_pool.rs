// src/worker_pool.rs
//! Bounded worker pool for per-frame cull batches.
//!
//! - Fixed thread count (minimum 2), bounded job queue.
//! - Saturation policy: execute on the submitting thread. Work is never
//!   silently dropped.
//! - Workers survive panicking jobs and never block process shutdown;
//!   `shutdown` drains within a grace period, then detaches and logs.
//! - A pool that was shut down re-initializes lazily on the next submit.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use parking_lot::{Condvar, Mutex};

/// Bounded queue depth; beyond this, submitters run jobs themselves.
const QUEUE_CAPACITY: usize = 1024;

const MIN_THREADS: usize = 2;

type Job = Box<dyn FnOnce() + Send + 'static>;

struct PoolCore {
    tx: Sender<Job>,
    exits: Arc<ExitTracker>,
    size: usize,
}

/// Counts worker exits so shutdown can wait with a deadline.
struct ExitTracker {
    exited: Mutex<usize>,
    cond: Condvar,
}

impl ExitTracker {
    fn new() -> Self {
        Self {
            exited: Mutex::new(0),
            cond: Condvar::new(),
        }
    }

    fn record_exit(&self) {
        let mut exited = self.exited.lock();
        *exited += 1;
        self.cond.notify_all();
    }

    /// Wait until `total` workers exited; false on timeout.
    fn wait_all(&self, total: usize, timeout: Duration) -> bool {
        let mut exited = self.exited.lock();
        self.cond
            .wait_while_for(&mut exited, |exited| *exited < total, timeout);
        *exited >= total
    }
}

/// Fixed-size concurrent executor with backpressure.
pub struct WorkerPool {
    core: Mutex<Option<PoolCore>>,
    size: AtomicUsize,
}

impl WorkerPool {
    /// Create a pool with `threads` workers (clamped to at least 2),
    /// spawned immediately.
    pub fn new(threads: usize) -> Self {
        let size = threads.max(MIN_THREADS);
        let pool = Self {
            core: Mutex::new(Some(Self::spawn_core(size))),
            size: AtomicUsize::new(size),
        };
        log::info!("initialized worker pool with {} threads", size);
        pool
    }

    fn spawn_core(size: usize) -> PoolCore {
        let (tx, rx) = bounded::<Job>(QUEUE_CAPACITY);
        let exits = Arc::new(ExitTracker::new());

        for i in 0..size {
            let rx: Receiver<Job> = rx.clone();
            let exits = exits.clone();
            let worker_exits = exits.clone();
            let builder = thread::Builder::new().name(format!("permafrost-worker-{i}"));
            let spawned = builder.spawn(move || {
                while let Ok(job) = rx.recv() {
                    if catch_unwind(AssertUnwindSafe(job)).is_err() {
                        log::error!("worker job panicked; worker continues");
                    }
                }
                worker_exits.record_exit();
            });
            if let Err(e) = spawned {
                log::error!("failed to spawn worker thread {i}: {e}");
                exits.record_exit();
            }
        }

        PoolCore { tx, exits, size }
    }

    /// Submit a job. When the queue is full (or the pool is mid-restart)
    /// the job runs on the calling thread instead of being dropped.
    pub fn execute<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let job: Job = Box::new(job);

        let sent = {
            let mut guard = self.core.lock();
            let core = guard
                .get_or_insert_with(|| Self::spawn_core(self.size.load(Ordering::Relaxed)));
            core.tx.try_send(job)
        };

        // Backpressure: run on the submitting thread, outside the pool
        // lock so the job itself may submit.
        if let Err(TrySendError::Full(job) | TrySendError::Disconnected(job)) = sent {
            job();
        }
    }

    /// Number of worker threads the pool is configured for.
    pub fn thread_count(&self) -> usize {
        self.size.load(Ordering::Relaxed)
    }

    /// Shut the pool down: stop accepting queued work, let workers drain,
    /// and wait up to `grace`. Workers still running afterwards are
    /// detached and logged; they cannot corrupt anything because every
    /// structure they write is concurrent.
    pub fn shutdown(&self, grace: Duration) {
        let core = self.core.lock().take();
        let Some(core) = core else {
            return;
        };

        log::info!("shutting down worker pool...");
        drop(core.tx);
        if !core.exits.wait_all(core.size, grace) {
            log::error!(
                "worker pool did not terminate within {:?}; detaching workers",
                grace
            );
        }
    }

    /// Change the worker count. The current workers drain and exit; the
    /// next submit spawns a fresh pool at the new size.
    pub fn resize(&self, threads: usize, grace: Duration) {
        self.size.store(threads.max(MIN_THREADS), Ordering::Relaxed);
        self.shutdown(grace);
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        // Daemon-style: close the queue but do not block on the workers.
        let _ = self.core.lock().take();
    }
}

// ============================================================================
// Frame completion latch
// ============================================================================

/// Countdown barrier for one frame's batches, waitable with a deadline.
pub struct FrameLatch {
    remaining: Mutex<usize>,
    cond: Condvar,
}

impl FrameLatch {
    pub fn new(count: usize) -> Self {
        Self {
            remaining: Mutex::new(count),
            cond: Condvar::new(),
        }
    }

    /// One batch finished (or aborted).
    pub fn arrive(&self) {
        let mut remaining = self.remaining.lock();
        *remaining = remaining.saturating_sub(1);
        if *remaining == 0 {
            self.cond.notify_all();
        }
    }

    /// Wait until every batch arrived or the timeout elapses. Returns true
    /// when the frame completed in time.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let mut remaining = self.remaining.lock();
        if *remaining == 0 {
            return true;
        }
        self.cond
            .wait_while_for(&mut remaining, |remaining| *remaining > 0, timeout);
        *remaining == 0
    }

    /// Guard that arrives when dropped, covering panic unwinds in a batch.
    pub fn guard(self: &Arc<Self>) -> LatchGuard {
        LatchGuard(self.clone())
    }
}

pub struct LatchGuard(Arc<FrameLatch>);

impl Drop for LatchGuard {
    fn drop(&mut self) {
        self.0.arrive();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Instant;

    fn wait_for_count(counter: &AtomicUsize, expected: usize, deadline: Duration) {
        let start = Instant::now();
        while counter.load(Ordering::SeqCst) < expected {
            assert!(
                start.elapsed() < deadline,
                "only {} of {expected} jobs ran",
                counter.load(Ordering::SeqCst)
            );
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn runs_every_submitted_job() {
        let pool = WorkerPool::new(4);
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..200 {
            let counter = counter.clone();
            pool.execute(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }

        wait_for_count(&counter, 200, Duration::from_secs(5));
    }

    #[test]
    fn saturation_runs_on_the_submitting_thread() {
        let pool = WorkerPool::new(2);
        let counter = Arc::new(AtomicUsize::new(0));
        let (gate_tx, gate_rx) = bounded::<()>(0);

        // Park both workers.
        for _ in 0..2 {
            let gate_rx = gate_rx.clone();
            pool.execute(move || {
                let _ = gate_rx.recv();
            });
        }
        thread::sleep(Duration::from_millis(20));

        // Fill the queue completely, then overflow it.
        let total = QUEUE_CAPACITY + 8;
        for _ in 0..total {
            let counter = counter.clone();
            pool.execute(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }

        // The overflow jobs already ran inline while the workers were
        // still parked.
        assert!(counter.load(Ordering::SeqCst) >= 8);

        drop(gate_tx);
        wait_for_count(&counter, total, Duration::from_secs(5));
    }

    #[test]
    fn reinitializes_lazily_after_shutdown() {
        let pool = WorkerPool::new(2);
        pool.shutdown(Duration::from_secs(1));

        let counter = Arc::new(AtomicUsize::new(0));
        let counter2 = counter.clone();
        pool.execute(move || {
            counter2.fetch_add(1, Ordering::SeqCst);
        });

        wait_for_count(&counter, 1, Duration::from_secs(5));
    }

    #[test]
    fn panicking_job_does_not_poison_the_pool() {
        let pool = WorkerPool::new(2);
        pool.execute(|| panic!("job blew up"));

        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..20 {
            let counter = counter.clone();
            pool.execute(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
        wait_for_count(&counter, 20, Duration::from_secs(5));
    }

    #[test]
    fn resize_takes_effect_on_next_submit() {
        let pool = WorkerPool::new(2);
        pool.resize(5, Duration::from_secs(1));
        assert_eq!(pool.thread_count(), 5);

        let counter = Arc::new(AtomicUsize::new(0));
        let counter2 = counter.clone();
        pool.execute(move || {
            counter2.fetch_add(1, Ordering::SeqCst);
        });
        wait_for_count(&counter, 1, Duration::from_secs(5));
    }

    #[test]
    fn latch_completes_and_times_out() {
        let latch = Arc::new(FrameLatch::new(2));
        assert!(!latch.wait_timeout(Duration::from_millis(10)));

        latch.arrive();
        let waiter = {
            let latch = latch.clone();
            thread::spawn(move || latch.wait_timeout(Duration::from_secs(2)))
        };
        thread::sleep(Duration::from_millis(10));
        latch.arrive();
        assert!(waiter.join().unwrap());
        // Already complete: returns immediately.
        assert!(latch.wait_timeout(Duration::from_millis(1)));
    }

    #[test]
    fn latch_guard_arrives_on_drop() {
        let latch = Arc::new(FrameLatch::new(1));
        {
            let _guard = latch.guard();
        }
        assert!(latch.wait_timeout(Duration::from_millis(1)));
    }
}
