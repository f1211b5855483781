//! Job coordinator - orchestrates one conversion run
//!
//! The coordinator is responsible for:
//! - Discovering input files and cutting them into chunks
//! - Preparing the output and log directories before any worker starts
//! - Dispatching chunks to the worker pool
//! - Aggregating per-chunk results in completion order
//! - Stopping dispatch on failure or shutdown
//! - Persisting the run summary

use crate::chunker::{chunk_files, Chunk};
use crate::config::{check_distinct_dirs, JobConfig};
use crate::discovery::discover_inputs;
use crate::driver::worker::{aggregate_stats, panic_message, ChunkReport, Worker};
use crate::encoder::Encoder;
use crate::error::{ChunkError, LedgerError, Result, ShardError, WorkerError};
use crate::ledger::{FsLedger, ShardLayout};
use crate::normalize::Normalizer;
use crate::processor::{ChunkOutcome, ChunkProcessor};
use chrono::{DateTime, Utc};
use crossbeam_channel::{bounded, unbounded, SendTimeoutError, Sender};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Name of the run summary written to the log directory
pub const RUN_SUMMARY_FILE: &str = "last_run.json";

/// How long the dispatcher blocks on a full queue before rechecking flags
const DISPATCH_POLL: Duration = Duration::from_millis(50);

/// Result of a conversion run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSummary {
    /// Input files discovered
    pub total_files: u64,

    /// Chunks the input was divided into
    pub total_chunks: u64,

    /// Chunks processed and committed by this run
    pub chunks_processed: u64,

    /// Chunks already complete from an earlier run
    pub chunks_skipped: u64,

    /// Good files written by this run
    pub good_files: u64,

    /// Good files recorded by earlier runs for skipped chunks
    pub resumed_good_files: u64,

    /// Files skipped as unreadable
    pub skipped_files: u64,

    /// Chunks that failed
    pub failed_chunks: u64,

    /// Wall time of the run
    pub duration: Duration,

    /// Whether every chunk is now complete
    pub completed: bool,
}

impl JobSummary {
    /// Good files across this run and the runs it resumed
    pub fn total_good_files(&self) -> u64 {
        self.good_files + self.resumed_good_files
    }

    /// Chunks that still need a run
    pub fn remaining_chunks(&self) -> u64 {
        self.total_chunks
            .saturating_sub(self.chunks_processed + self.chunks_skipped)
    }

    fn absorb(&mut self, outcome: &ChunkOutcome) {
        match outcome {
            ChunkOutcome::Completed {
                counts,
                skipped_files,
            } => {
                self.chunks_processed += 1;
                self.good_files += counts.good;
                self.skipped_files += skipped_files;
            }
            ChunkOutcome::AlreadyComplete { recorded } => {
                self.chunks_skipped += 1;
                self.resumed_good_files += recorded.map(|c| c.good).unwrap_or(0);
            }
        }
    }
}

/// Persisted record of a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub job_name: String,
    pub input_root: PathBuf,
    pub output_dir: PathBuf,
    pub chunk_size: usize,
    pub workers: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub summary: JobSummary,
}

impl RunRecord {
    /// Load the record of the last run from a log directory
    pub fn load(log_dir: &Path) -> std::result::Result<Self, LedgerError> {
        let path = log_dir.join(RUN_SUMMARY_FILE);
        let body = fs::read(&path).map_err(|e| LedgerError::io(&path, e))?;
        serde_json::from_slice(&body).map_err(|e| LedgerError::io(&path, io::Error::from(e)))
    }

    fn store(&self, log_dir: &Path) -> std::result::Result<(), LedgerError> {
        let path = log_dir.join(RUN_SUMMARY_FILE);
        let body =
            serde_json::to_vec_pretty(self).map_err(|e| LedgerError::io(&path, io::Error::from(e)))?;
        fs::write(&path, body).map_err(|e| LedgerError::io(&path, e))
    }
}

/// Progress information for display
#[derive(Debug, Clone)]
pub struct JobProgress {
    /// Chunks reported so far (processed, skipped, or failed)
    pub chunks_done: u64,

    /// Chunks in the job
    pub total_chunks: u64,

    /// Chunks found already complete
    pub chunks_skipped: u64,

    /// Input files covered by reported chunks
    pub files_done: u64,

    /// Good files written by this run
    pub good_files: u64,

    /// Elapsed time
    pub elapsed: Duration,
}

impl JobProgress {
    /// Calculate files per second rate
    pub fn files_per_second(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.files_done as f64 / secs
        } else {
            0.0
        }
    }
}

/// Drives one conversion job across a pool of worker threads
pub struct JobDriver {
    /// Configuration
    config: Arc<JobConfig>,

    /// Shared encoder
    encoder: Arc<dyn Encoder>,

    /// Shared normalizer
    normalizer: Arc<dyn Normalizer>,

    /// Shutdown signal
    shutdown: Arc<AtomicBool>,
}

impl JobDriver {
    /// Create a new job driver
    pub fn new(
        config: JobConfig,
        encoder: Arc<dyn Encoder>,
        normalizer: Arc<dyn Normalizer>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            encoder,
            normalizer,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Get a clone of the shutdown flag (for signal handlers)
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// Run the job
    pub fn run(&self) -> Result<JobSummary> {
        self.run_with_progress(|_| {})
    }

    /// Run the job, calling `on_progress` after every chunk report
    pub fn run_with_progress<F>(&self, mut on_progress: F) -> Result<JobSummary>
    where
        F: FnMut(&JobProgress),
    {
        let config = &self.config;
        let start_time = Instant::now();
        let started_at = Utc::now();

        let files = discover_inputs(
            &config.input_root,
            &config.extension,
            &config.exclude_patterns,
        )?;
        let total_files = files.len();

        check_distinct_dirs(&config.output_dir, &config.log_dir)?;
        let layout = ShardLayout::new(&config.output_dir, &config.log_dir, &config.job_name);
        let ledger = Arc::new(FsLedger::open(layout.clone())?);

        let chunks = chunk_files(files, config.chunk_size)?;
        let total_chunks = chunks.len();
        info!(
            files = total_files,
            chunks = total_chunks,
            "Got {} files, divided into {} chunks",
            total_files,
            total_chunks
        );

        let processor = Arc::new(
            ChunkProcessor::new(
                Arc::clone(&self.encoder),
                Arc::clone(&self.normalizer),
                ledger,
                layout,
            )
            .min_tokens(config.min_tokens)
            .bad_file_policy(config.bad_files),
        );

        let mut summary = JobSummary {
            total_files: total_files as u64,
            total_chunks: total_chunks as u64,
            ..Default::default()
        };
        let mut progress = JobProgress {
            chunks_done: 0,
            total_chunks: total_chunks as u64,
            chunks_skipped: 0,
            files_done: 0,
            good_files: 0,
            elapsed: Duration::ZERO,
        };
        on_progress(&progress);

        // Raised on the first chunk failure or on shutdown; stops dispatch
        let halt = Arc::new(AtomicBool::new(false));
        let worker_count = config.worker_count.min(total_chunks);
        let (task_tx, task_rx) = bounded::<Chunk>(config.worker_count * 2);
        let (report_tx, report_rx) = unbounded::<ChunkReport>();

        let mut workers = Vec::with_capacity(worker_count);
        for id in 0..worker_count {
            match Worker::spawn(
                id,
                Arc::clone(&processor),
                task_rx.clone(),
                report_tx.clone(),
                Arc::clone(&halt),
            ) {
                Ok(worker) => workers.push(worker),
                Err(e) => {
                    // Let the already running workers drain and exit
                    drop(task_tx);
                    if let Err(join_err) = join_workers(workers) {
                        warn!(error = %join_err, "Worker failed while aborting spawn");
                    }
                    return Err(e.into());
                }
            }
        }
        drop(task_rx);
        drop(report_tx);
        info!(count = workers.len(), "Workers spawned");

        let dispatcher = {
            let shutdown = Arc::clone(&self.shutdown);
            let halt = Arc::clone(&halt);
            thread::Builder::new()
                .name("shard-dispatch".into())
                .spawn(move || dispatch(chunks, task_tx, &shutdown, &halt))
                .map_err(|e| WorkerError::SpawnFailed {
                    id: worker_count,
                    reason: e.to_string(),
                })?
        };

        let mut first_error: Option<ChunkError> = None;
        for report in report_rx.iter() {
            progress.chunks_done += 1;
            progress.files_done += report.files as u64;

            match report.outcome {
                Ok(outcome) => {
                    debug!(worker = report.worker, chunk = report.index, ?outcome, "Chunk reported");
                    summary.absorb(&outcome);
                }
                Err(e) => {
                    summary.failed_chunks += 1;
                    if first_error.is_none() {
                        warn!(chunk = e.index(), "Stopping dispatch after chunk failure");
                        first_error = Some(e);
                    } else {
                        warn!(chunk = e.index(), error = %e, "Additional chunk failure");
                    }
                }
            }

            progress.chunks_skipped = summary.chunks_skipped;
            progress.good_files = summary.good_files;
            progress.elapsed = start_time.elapsed();
            on_progress(&progress);
        }

        let dispatched = dispatcher
            .join()
            .map_err(|payload| WorkerError::DispatcherPanicked {
                message: panic_message(payload.as_ref()),
            })?;
        let (processed, skipped, failed, good) = aggregate_stats(&workers);
        debug!(dispatched, processed, skipped, failed, good, "Dispatch finished");
        // Includes chunks lost to a panic, which never send a report
        summary.failed_chunks = failed;

        // A chunk failure takes precedence over a worker panic
        let failure = match (first_error, join_workers(workers)) {
            (Some(e), _) => Some(ShardError::Chunk(e)),
            (None, Err(e)) => Some(ShardError::Worker(e)),
            (None, Ok(())) => None,
        };

        summary.duration = start_time.elapsed();

        let interrupted = self.shutdown.load(Ordering::SeqCst);
        summary.completed = failure.is_none() && !interrupted && summary.remaining_chunks() == 0;
        if interrupted {
            warn!(
                remaining = summary.remaining_chunks(),
                "Interrupted, unfinished chunks will run on the next invocation"
            );
        }

        let record = RunRecord {
            job_name: config.job_name.clone(),
            input_root: config.input_root.clone(),
            output_dir: config.output_dir.clone(),
            chunk_size: config.chunk_size,
            workers: config.worker_count,
            started_at,
            finished_at: Utc::now(),
            summary: summary.clone(),
        };
        let stored = record.store(&config.log_dir);

        if let Some(e) = failure {
            if let Err(store_err) = stored {
                warn!(error = %store_err, "Failed to record the failed run");
            }
            return Err(e);
        }
        stored?;

        info!(
            good = summary.good_files,
            resumed_good = summary.resumed_good_files,
            total = summary.total_files,
            duration_secs = summary.duration.as_secs_f64(),
            "Done! {}/{} good files",
            summary.total_good_files(),
            summary.total_files
        );

        Ok(summary)
    }
}

/// Feed chunks to the workers until done, halted, or shut down
///
/// Returns the number of chunks handed to the queue.
fn dispatch(
    chunks: Vec<Chunk>,
    tasks: Sender<Chunk>,
    shutdown: &AtomicBool,
    halt: &AtomicBool,
) -> usize {
    let mut sent = 0;

    'chunks: for chunk in chunks {
        let mut pending = chunk;
        loop {
            if shutdown.load(Ordering::Relaxed) {
                info!("Shutdown signal received");
                halt.store(true, Ordering::SeqCst);
                break 'chunks;
            }
            if halt.load(Ordering::Relaxed) {
                break 'chunks;
            }

            match tasks.send_timeout(pending, DISPATCH_POLL) {
                Ok(()) => {
                    sent += 1;
                    break;
                }
                Err(SendTimeoutError::Timeout(chunk)) => pending = chunk,
                Err(SendTimeoutError::Disconnected(_)) => break 'chunks,
            }
        }
    }

    sent
}

/// Join all worker threads, returning the first failure
fn join_workers(workers: Vec<Worker>) -> std::result::Result<(), WorkerError> {
    let mut first = None;
    for worker in workers {
        let id = worker.id();
        if let Err(e) = worker.join() {
            warn!(worker = id, error = %e, "Worker failed to join cleanly");
            first.get_or_insert(e);
        }
    }
    first.map_or(Ok(()), Err)
}
