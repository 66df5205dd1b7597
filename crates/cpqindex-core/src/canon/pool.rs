//! # Labeling Pool
//!
//! A bounded worker pool that runs canonical labeling requests off the
//! construction thread.
//!
//! Each submission returns a [`LabelingTask`] handle at once. The handle
//! can be polled, waited on (with or without a timeout) and cancelled.
//! Requests share no mutable state: each one owns its adjacency, its color
//! encoding and a private result slot.
//!
//! Cancellation is cooperative. A request that has not started yet is
//! skipped by its worker; one already running sees the flag at the next
//! search node, if the labeler polls it.

use super::labeler::CanonicalLabeler;
use crate::primitives::{
    DEFAULT_LABELING_THREADS, LABELING_QUEUE_PER_WORKER, WORKER_POLL_INTERVAL_MS,
    WORKER_STACK_SIZE,
};
use crate::IndexError;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

// =============================================================================
// CONFIGURATION
// =============================================================================

/// Configuration for a labeling pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelingPoolConfig {
    /// Number of worker threads.
    pub threads: usize,
    /// Pending requests allowed before `submit` blocks.
    pub queue_depth: usize,
    /// Stack size per worker.
    pub stack_size: usize,
    /// Worker thread name prefix.
    pub name_prefix: String,
}

impl LabelingPoolConfig {
    /// A pool with `threads` workers; `0` means one per logical CPU.
    #[must_use]
    pub fn with_threads(threads: usize) -> Self {
        let threads = if threads == 0 { num_cpus::get() } else { threads };
        Self {
            threads,
            queue_depth: threads.saturating_mul(LABELING_QUEUE_PER_WORKER),
            stack_size: WORKER_STACK_SIZE,
            name_prefix: "cpqindex-label".to_string(),
        }
    }
}

impl Default for LabelingPoolConfig {
    fn default() -> Self {
        Self::with_threads(DEFAULT_LABELING_THREADS)
    }
}

// =============================================================================
// METRICS
// =============================================================================

/// Counters for pool activity.
#[derive(Debug, Default)]
pub struct PoolMetrics {
    /// Requests accepted by `submit`.
    pub submitted: AtomicU64,
    /// Requests a worker finished, successfully or not.
    pub completed: AtomicU64,
    /// Requests skipped because they were cancelled before starting.
    pub skipped: AtomicU64,
    /// Total labeling time (microseconds).
    pub total_time_us: AtomicU64,
}

impl PoolMetrics {
    fn record(&self, duration: Duration) {
        self.completed.fetch_add(1, Ordering::Relaxed);
        let us = u64::try_from(duration.as_micros()).unwrap_or(u64::MAX);
        self.total_time_us.fetch_add(us, Ordering::Relaxed);
    }
}

// =============================================================================
// TASK HANDLE
// =============================================================================

/// Result slot shared by a task handle and the worker that fills it.
#[derive(Default)]
struct Slot {
    result: Mutex<Option<Result<Vec<u32>, IndexError>>>,
    ready: Condvar,
    cancelled: AtomicBool,
}

impl Slot {
    fn complete(&self, result: Result<Vec<u32>, IndexError>) {
        *self.result.lock() = Some(result);
        self.ready.notify_all();
    }
}

/// Handle to one pending labeling request.
pub struct LabelingTask {
    slot: Arc<Slot>,
}

impl LabelingTask {
    /// True once a worker has stored a result (or a cancellation).
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.slot.result.lock().is_some()
    }

    /// Ask for the request to be abandoned. Best effort.
    pub fn cancel(&self) {
        self.slot.cancelled.store(true, Ordering::Relaxed);
    }

    /// True if `cancel` was called.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.slot.cancelled.load(Ordering::Relaxed)
    }

    /// Block until the result is available.
    pub fn wait(self) -> Result<Vec<u32>, IndexError> {
        let mut result = self.slot.result.lock();
        loop {
            if let Some(result) = result.take() {
                return result;
            }
            self.slot.ready.wait(&mut result);
        }
    }

    /// Block for at most `timeout`.
    ///
    /// On expiry returns `IndexError::OracleTimeout` and leaves the request
    /// running; the handle stays usable for another wait or a cancel.
    pub fn wait_timeout(&self, timeout: Duration) -> Result<Vec<u32>, IndexError> {
        let deadline = Instant::now() + timeout;
        let mut result = self.slot.result.lock();
        loop {
            if let Some(result) = result.take() {
                return result;
            }
            if self.slot.ready.wait_until(&mut result, deadline).timed_out() {
                return match result.take() {
                    Some(result) => result,
                    None => Err(IndexError::OracleTimeout(timeout)),
                };
            }
        }
    }
}

struct Job {
    adjacency: Vec<Vec<u32>>,
    colors: Vec<i32>,
    slot: Arc<Slot>,
    answered: bool,
}

impl Job {
    fn answer(mut self, result: Result<Vec<u32>, IndexError>) {
        self.slot.complete(result);
        self.answered = true;
    }
}

impl Drop for Job {
    fn drop(&mut self) {
        // dropped unanswered: the pool shut down with this job still queued
        if !self.answered {
            self.slot.complete(Err(IndexError::PoolShutdown));
        }
    }
}

// =============================================================================
// POOL
// =============================================================================

/// Bounded pool of labeling workers.
pub struct LabelingPool {
    config: LabelingPoolConfig,
    sender: Option<Sender<Job>>,
    metrics: Arc<PoolMetrics>,
    shutdown: Arc<(Mutex<bool>, Condvar)>,
    workers: Vec<JoinHandle<()>>,
}

impl LabelingPool {
    /// Spawn the workers.
    ///
    /// Returns `IndexError::InvalidArgument` for zero threads and
    /// `IndexError::Io` if a thread cannot be spawned.
    pub fn new(
        config: LabelingPoolConfig,
        labeler: Arc<dyn CanonicalLabeler>,
    ) -> Result<Self, IndexError> {
        if config.threads == 0 {
            return Err(IndexError::InvalidArgument(
                "labeling pool needs at least one thread".to_string(),
            ));
        }

        let (sender, receiver) = bounded(config.queue_depth.max(1));
        let metrics = Arc::new(PoolMetrics::default());
        let shutdown = Arc::new((Mutex::new(false), Condvar::new()));

        let mut pool = Self {
            config,
            sender: Some(sender),
            metrics,
            shutdown,
            workers: Vec::new(),
        };

        for i in 0..pool.config.threads {
            let receiver = receiver.clone();
            let metrics = pool.metrics.clone();
            let shutdown = pool.shutdown.clone();
            let labeler = labeler.clone();

            // on error, dropping `pool` stops the workers spawned so far
            let handle = thread::Builder::new()
                .name(format!("{}-{}", pool.config.name_prefix, i))
                .stack_size(pool.config.stack_size)
                .spawn(move || Self::worker_loop(receiver, labeler, metrics, shutdown))?;
            pool.workers.push(handle);
        }

        Ok(pool)
    }

    fn worker_loop(
        receiver: Receiver<Job>,
        labeler: Arc<dyn CanonicalLabeler>,
        metrics: Arc<PoolMetrics>,
        shutdown: Arc<(Mutex<bool>, Condvar)>,
    ) {
        loop {
            {
                let (lock, _) = &*shutdown;
                if *lock.lock() {
                    break;
                }
            }

            match receiver.recv_timeout(Duration::from_millis(WORKER_POLL_INTERVAL_MS)) {
                Ok(job) => {
                    if job.slot.cancelled.load(Ordering::Relaxed) {
                        metrics.skipped.fetch_add(1, Ordering::Relaxed);
                        job.answer(Err(IndexError::OracleCancelled));
                        continue;
                    }

                    let start = Instant::now();
                    let result = labeler.canonical_labeling(
                        &job.adjacency,
                        &job.colors,
                        &job.slot.cancelled,
                    );
                    metrics.record(start.elapsed());
                    job.answer(result);
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
    }

    /// Queue a labeling request. Blocks while the queue is full.
    pub fn submit(
        &self,
        adjacency: Vec<Vec<u32>>,
        colors: Vec<i32>,
    ) -> Result<LabelingTask, IndexError> {
        let sender = self.sender.as_ref().ok_or(IndexError::PoolShutdown)?;
        let slot = Arc::new(Slot::default());
        sender
            .send(Job {
                adjacency,
                colors,
                slot: slot.clone(),
                answered: false,
            })
            .map_err(|_| IndexError::PoolShutdown)?;
        self.metrics.submitted.fetch_add(1, Ordering::Relaxed);
        Ok(LabelingTask { slot })
    }

    /// Number of workers.
    #[must_use]
    pub fn threads(&self) -> usize {
        self.config.threads
    }

    /// Pool counters.
    #[must_use]
    pub fn metrics(&self) -> &PoolMetrics {
        &self.metrics
    }

    /// Stop accepting work and let the workers exit.
    ///
    /// Requests still queued are dropped; their handles report
    /// `IndexError::PoolShutdown` instead of blocking forever.
    pub fn shutdown(&mut self) {
        let (lock, cvar) = &*self.shutdown;
        *lock.lock() = true;
        cvar.notify_all();
        self.sender = None;
    }
}

impl Drop for LabelingPool {
    fn drop(&mut self) {
        self.shutdown();
        for worker in self.workers.drain(..) {
            // a worker that panicked has nothing left to clean up
            let _ = worker.join();
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
