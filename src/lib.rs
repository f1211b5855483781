//! text-sharder - Parallel, resumable text-to-TFRecord converter
//!
//! Converts a large corpus of plain-text documents into tokenized record
//! files for language-model training. Input files are cut into fixed-size
//! chunks; each chunk becomes one `.tfrecords` file, produced by a pool of
//! worker threads.
//!
//! # Features
//!
//! - **Resumable**: every finished chunk leaves a completion marker in the
//!   log directory. Re-running the same command skips marked chunks and
//!   redoes the rest from scratch.
//!
//! - **Parallel**: chunks are independent and run on a fixed pool of
//!   threads sharing one tokenizer.
//!
//! - **Filtered**: documents that encode to fewer than 25 tokens, or only
//!   to token 0, are dropped.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                    Input directory                        │
//! └────────────────────────────┬─────────────────────────────┘
//!                              │ discovery (sorted)
//!                              ▼
//!                    ┌──────────────────┐
//!                    │     Chunker      │  k files per chunk
//!                    └─────────┬────────┘
//!                              │
//!                              ▼
//! ┌──────────────────────────────────────────────────────────┐
//! │                     Worker Threads                        │
//! │  ┌──────────┐  ┌──────────┐            ┌──────────┐      │
//! │  │ shard-0  │  │ shard-1  │    ...     │ shard-N  │      │
//! │  └────┬─────┘  └────┬─────┘            └────┬─────┘      │
//! │       │ read → normalize → encode → filter  │            │
//! └───────┼─────────────┼───────────────────────┼────────────┘
//!         ▼             ▼                       ▼
//!   out/<name>_<i>.tfrecords          logs/<name>_<i>.tfrecords (marker)
//!                                     logs/good_files.log
//! ```
//!
//! # Example
//!
//! ```bash
//! # Convert with a local tokenizer
//! text-sharder --base-dir corpus/ --encoder-path gpt2/ --files-per 10000
//!
//! # Verify the output
//! text-sharder inspect out/openwebtext-newspaper_0.tfrecords
//! ```

pub mod chunker;
pub mod config;
pub mod discovery;
pub mod driver;
pub mod encoder;
pub mod error;
pub mod ledger;
pub mod normalize;
pub mod processor;
pub mod progress;
pub mod record;

pub use chunker::{chunk_files, Chunk};
pub use config::{CliArgs, JobConfig};
pub use driver::{JobDriver, JobSummary};
pub use encoder::{Encoder, HfEncoder};
pub use error::{Result, ShardError};
pub use ledger::{ChunkCounts, CompletionLedger, FsLedger, ShardLayout};
pub use normalize::{Normalizer, Passthrough, TextCleaner};
pub use processor::{BadFilePolicy, ChunkOutcome, ChunkProcessor};
