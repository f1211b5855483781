//! Worker thread logic for parallel chunk processing
//!
//! Each worker:
//! - Pulls chunks from the shared task channel
//! - Runs the chunk processor on each one
//! - Sends one report per chunk back to the coordinator
//! - Stops taking new work once the halt flag is raised
//!
//! A panic inside the processor raises the halt flag before the thread
//! unwinds, so `Worker::join` reports it to the coordinator.

use crate::chunker::Chunk;
use crate::error::{ChunkError, WorkerError};
use crate::processor::{ChunkOutcome, ChunkProcessor};
use crossbeam_channel::{Receiver, Sender};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error};

/// Outcome of one chunk, tagged with the worker that ran it
#[derive(Debug)]
pub struct ChunkReport {
    pub worker: usize,
    pub index: usize,
    pub files: usize,
    pub outcome: Result<ChunkOutcome, ChunkError>,
}

/// Statistics collected by a worker
#[derive(Debug, Default)]
pub struct WorkerStats {
    /// Chunks processed and committed
    pub chunks_processed: AtomicU64,

    /// Chunks found already complete
    pub chunks_skipped: AtomicU64,

    /// Chunks that failed
    pub chunks_failed: AtomicU64,

    /// Good files written
    pub good_files: AtomicU64,
}

impl WorkerStats {
    fn record(&self, outcome: &Result<ChunkOutcome, ChunkError>) {
        match outcome {
            Ok(ChunkOutcome::Completed { counts, .. }) => {
                self.chunks_processed.fetch_add(1, Ordering::Relaxed);
                self.good_files.fetch_add(counts.good, Ordering::Relaxed);
            }
            Ok(ChunkOutcome::AlreadyComplete { .. }) => {
                self.chunks_skipped.fetch_add(1, Ordering::Relaxed);
            }
            Err(_) => {
                self.chunks_failed.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

/// A worker thread that processes chunks
pub struct Worker {
    /// Worker ID
    id: usize,

    /// Thread handle
    handle: Option<JoinHandle<()>>,

    /// Worker statistics
    stats: Arc<WorkerStats>,
}

impl Worker {
    /// Spawn a new worker thread
    pub fn spawn(
        id: usize,
        processor: Arc<ChunkProcessor>,
        tasks: Receiver<Chunk>,
        reports: Sender<ChunkReport>,
        halt: Arc<AtomicBool>,
    ) -> Result<Self, WorkerError> {
        let stats = Arc::new(WorkerStats::default());
        let stats_clone = Arc::clone(&stats);

        let handle = thread::Builder::new()
            .name(format!("shard-{}", id))
            .spawn(move || worker_loop(id, processor, tasks, reports, halt, stats_clone))
            .map_err(|e| WorkerError::SpawnFailed {
                id,
                reason: e.to_string(),
            })?;

        Ok(Self {
            id,
            handle: Some(handle),
            stats,
        })
    }

    /// Get worker ID
    pub fn id(&self) -> usize {
        self.id
    }

    /// Get worker statistics
    pub fn stats(&self) -> &WorkerStats {
        &self.stats
    }

    /// Wait for the worker to finish
    pub fn join(mut self) -> Result<(), WorkerError> {
        match self.handle.take() {
            Some(handle) => handle.join().map_err(|payload| WorkerError::Panicked {
                id: self.id,
                message: panic_message(payload.as_ref()),
            }),
            None => Ok(()),
        }
    }
}

pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "Worker thread panicked".into())
}

/// Main worker loop
fn worker_loop(
    id: usize,
    processor: Arc<ChunkProcessor>,
    tasks: Receiver<Chunk>,
    reports: Sender<ChunkReport>,
    halt: Arc<AtomicBool>,
    stats: Arc<WorkerStats>,
) {
    debug!(worker = id, "Worker started");

    while let Ok(chunk) = tasks.recv() {
        if halt.load(Ordering::Relaxed) {
            debug!(worker = id, chunk = chunk.index, "Halted, leaving chunk for the next run");
            continue;
        }

        let outcome = match panic::catch_unwind(AssertUnwindSafe(|| processor.process(&chunk))) {
            Ok(outcome) => outcome,
            Err(payload) => {
                halt.store(true, Ordering::SeqCst);
                stats.chunks_failed.fetch_add(1, Ordering::Relaxed);
                error!(
                    worker = id,
                    chunk = chunk.index,
                    message = %panic_message(payload.as_ref()),
                    "Worker panicked while processing chunk"
                );
                panic::resume_unwind(payload);
            }
        };
        if let Err(e) = &outcome {
            error!(worker = id, chunk = chunk.index, error = %e, "Chunk failed");
            halt.store(true, Ordering::SeqCst);
        }
        stats.record(&outcome);

        let report = ChunkReport {
            worker: id,
            index: chunk.index,
            files: chunk.len(),
            outcome,
        };
        if reports.send(report).is_err() {
            // Coordinator is gone
            break;
        }
    }

    debug!(
        worker = id,
        processed = stats.chunks_processed.load(Ordering::Relaxed),
        skipped = stats.chunks_skipped.load(Ordering::Relaxed),
        good = stats.good_files.load(Ordering::Relaxed),
        "Worker finished"
    );
}

/// Aggregate (processed, skipped, failed, good) across workers
pub fn aggregate_stats(workers: &[Worker]) -> (u64, u64, u64, u64) {
    workers.iter().fold((0, 0, 0, 0), |acc, w| {
        let s = w.stats();
        (
            acc.0 + s.chunks_processed.load(Ordering::Relaxed),
            acc.1 + s.chunks_skipped.load(Ordering::Relaxed),
            acc.2 + s.chunks_failed.load(Ordering::Relaxed),
            acc.3 + s.good_files.load(Ordering::Relaxed),
        )
    })
}
