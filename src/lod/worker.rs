//! Background block fetching
//!
//! [`FetchPool`] owns a fixed set of worker threads that materialize LOD
//! blocks off the UI thread. The UI thread submits missing block keys
//! tagged with the viewport generation and drains finished results once
//! per frame.
//!
//! # Staleness
//!
//! - Submitting for a newer generation removes every job still queued
//!   for older generations.
//! - A result is fresh only if the latest generation asked for its block
//!   and no invalidation happened since the job was queued. Anything else
//!   is dropped on arrival and never triggers a redraw.

use super::{BlockKey, LodCache};
use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// How long an idle worker waits before re-checking the running flag
const IDLE_POLL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy)]
struct FetchJob {
    key: BlockKey,
    epoch: u64,
}

#[derive(Debug, Clone, PartialEq)]
enum FetchStatus {
    Loaded,
    Unavailable(String),
    /// Cache was invalidated before the job started
    Skipped,
}

/// Generation that wants a block and the epoch its job was queued at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct InFlight {
    generation: u64,
    epoch: u64,
}

#[derive(Debug, Clone)]
struct FetchResult {
    key: BlockKey,
    epoch: u64,
    status: FetchStatus,
}

/// Summary of one [`FetchPool::drain`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchBatch {
    /// Fresh blocks now resident in the cache
    pub loaded: usize,
    /// Fresh blocks whose read failed
    pub unavailable: usize,
    /// Results dropped on arrival
    pub stale: usize,
    /// Whether anything fresh arrived that changes the picture
    pub redraw: bool,
}

/// Fixed-size pool of block fetch workers
pub struct FetchPool {
    cache: Arc<LodCache>,
    job_tx: Option<Sender<FetchJob>>,
    /// Kept to pull queued jobs back out when they go stale
    job_rx: Receiver<FetchJob>,
    result_rx: Receiver<FetchResult>,
    running: Arc<AtomicBool>,
    workers: Vec<JoinHandle<()>>,
    in_flight: HashMap<BlockKey, InFlight>,
    generation: u64,
}

impl FetchPool {
    /// Start `workers` threads sharing a job queue of `queue_depth` entries
    pub fn new(cache: Arc<LodCache>, workers: usize, queue_depth: usize) -> Self {
        let (job_tx, job_rx) = bounded::<FetchJob>(queue_depth.max(1));
        let (result_tx, result_rx) = unbounded();
        let running = Arc::new(AtomicBool::new(true));

        let count = workers.max(1);
        let mut handles = Vec::with_capacity(count);
        for index in 0..count {
            let cache = cache.clone();
            let jobs = job_rx.clone();
            let results = result_tx.clone();
            let running = running.clone();
            let spawned = std::thread::Builder::new()
                .name(format!("lod-fetch-{}", index))
                .spawn(move || worker_loop(cache, jobs, results, running));
            match spawned {
                Ok(handle) => handles.push(handle),
                Err(e) => tracing::warn!("Failed to spawn fetch worker {}: {}", index, e),
            }
        }
        tracing::info!("Fetch pool started with {} workers", handles.len());

        Self {
            cache,
            job_tx: Some(job_tx),
            job_rx,
            result_rx,
            running,
            workers: handles,
            in_flight: HashMap::new(),
            generation: 0,
        }
    }

    /// Latest generation seen by [`FetchPool::submit`]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Blocks queued or being built
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Queue missing blocks for a viewport generation
    ///
    /// Blocks already in flight are not queued twice, unless the cache was
    /// invalidated since their job was queued. When the queue is full the
    /// remaining keys are left for the next frame. Returns the number of
    /// jobs queued.
    pub fn submit(&mut self, keys: &[BlockKey], generation: u64) -> usize {
        if generation > self.generation {
            self.generation = generation;
            self.cancel_queued();
        }
        let Some(job_tx) = &self.job_tx else {
            return 0;
        };

        let epoch = self.cache.epoch();
        let mut queued = 0;
        for &key in keys {
            if let Some(entry) = self.in_flight.get_mut(&key) {
                if entry.epoch == epoch {
                    entry.generation = generation;
                    continue;
                }
            }
            match job_tx.try_send(FetchJob { key, epoch }) {
                Ok(()) => {
                    self.in_flight.insert(key, InFlight { generation, epoch });
                    queued += 1;
                }
                Err(TrySendError::Full(_)) => {
                    tracing::debug!("Fetch queue full, deferring {} blocks", keys.len() - queued);
                    break;
                }
                Err(TrySendError::Disconnected(_)) => {
                    tracing::warn!("Fetch workers are gone, dropping block requests");
                    break;
                }
            }
        }
        queued
    }

    /// Remove queued jobs that no worker has picked up yet
    fn cancel_queued(&mut self) -> usize {
        let mut cancelled = 0;
        while let Ok(job) = self.job_rx.try_recv() {
            self.in_flight.remove(&job.key);
            cancelled += 1;
        }
        if cancelled > 0 {
            tracing::debug!("Dropped {} stale fetch jobs", cancelled);
        }
        cancelled
    }

    /// Collect finished results without blocking
    pub fn drain(&mut self) -> FetchBatch {
        let mut batch = FetchBatch::default();
        let epoch = self.cache.epoch();

        while let Ok(result) = self.result_rx.try_recv() {
            // A result from a superseded job leaves the newer entry in place
            let fresh = match self.in_flight.get(&result.key) {
                Some(entry) if entry.epoch == result.epoch => {
                    let wanted = entry.generation;
                    self.in_flight.remove(&result.key);
                    wanted == self.generation && result.epoch == epoch
                }
                _ => false,
            };
            match result.status {
                FetchStatus::Loaded if fresh => {
                    batch.loaded += 1;
                    // Nothing to show if the cache could not keep it
                    batch.redraw |= self.cache.is_resident(&result.key);
                }
                FetchStatus::Unavailable(_) if fresh => {
                    batch.unavailable += 1;
                    batch.redraw = true;
                }
                _ => batch.stale += 1,
            }
        }

        if batch.stale > 0 {
            tracing::debug!("Dropped {} stale fetch results", batch.stale);
        }
        batch
    }

    /// Block until every in-flight job has reported back, then drain
    pub fn wait_idle(&mut self, timeout: Duration) -> FetchBatch {
        let deadline = std::time::Instant::now() + timeout;
        let mut total = FetchBatch::default();
        loop {
            let batch = self.drain();
            total.loaded += batch.loaded;
            total.unavailable += batch.unavailable;
            total.stale += batch.stale;
            total.redraw |= batch.redraw;
            if self.in_flight.is_empty() || std::time::Instant::now() >= deadline {
                return total;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
    }
}

impl Drop for FetchPool {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        self.job_tx.take();
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                tracing::warn!("Fetch worker panicked");
            }
        }
        tracing::info!("Fetch pool stopped");
    }
}

fn worker_loop(
    cache: Arc<LodCache>,
    jobs: Receiver<FetchJob>,
    results: Sender<FetchResult>,
    running: Arc<AtomicBool>,
) {
    while running.load(Ordering::SeqCst) {
        let job = match jobs.recv_timeout(IDLE_POLL) {
            Ok(job) => job,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };

        let status = if cache.epoch() != job.epoch {
            FetchStatus::Skipped
        } else {
            match cache.materialize(job.key) {
                Ok(_) => FetchStatus::Loaded,
                Err(e) => FetchStatus::Unavailable(e.to_string()),
            }
        };

        let result = FetchResult {
            key: job.key,
            epoch: job.epoch,
            status,
        };
        if results.send(result).is_err() {
            break;
        }
    }
}
