//! Error types for text-sharder
//!
//! This module defines the error hierarchy for the conversion pipeline:
//! - Configuration errors, reported before any work begins
//! - Encoder loading and encoding errors
//! - Completion ledger (marker / summary log) errors
//! - Per-chunk processing errors
//! - Worker thread errors
//!
//! Library code returns these structured types; the binary wraps them with
//! `anyhow` context for display.

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for text-sharder
#[derive(Error, Debug)]
pub enum ShardError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Encoder errors
    #[error("Encoder error: {0}")]
    Encoder(#[from] EncoderError),

    /// Completion ledger errors
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// A chunk failed to process
    #[error("Chunk error: {0}")]
    Chunk(#[from] ChunkError),

    /// Worker/concurrency errors
    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),
}

/// Configuration and CLI errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Chunk size must be positive
    #[error("Invalid chunk size {size}: must be at least 1")]
    InvalidChunkSize { size: usize },

    /// Invalid worker count
    #[error("Invalid worker count {count}: must be between 1 and {max}")]
    InvalidWorkerCount { count: usize, max: usize },

    /// Input root missing or not a directory
    #[error("Input root '{path}' does not exist or is not a directory")]
    MissingInputRoot { path: PathBuf },

    /// The input tree could not be listed completely
    #[error("Failed to list input under '{path}': {reason}")]
    Discovery { path: PathBuf, reason: String },

    /// Markers and artifacts share file names, so the directories must differ
    #[error("Output directory '{path}' is also the log directory")]
    SharedOutputAndLogDir { path: PathBuf },

    /// Invalid exclude pattern
    #[error("Invalid exclude pattern '{pattern}': {reason}")]
    InvalidExcludePattern { pattern: String, reason: String },

    /// Minimum token threshold must be positive
    #[error("Invalid minimum token count {count}: must be at least 1")]
    InvalidMinTokens { count: usize },

    /// Job name is used verbatim in file names
    #[error("Invalid job name '{name}': {reason}")]
    InvalidJobName { name: String, reason: String },

    /// Missing required configuration
    #[error("Missing required configuration: {0}")]
    MissingRequired(String),
}

/// Encoder loading and encoding errors
#[derive(Error, Debug)]
pub enum EncoderError {
    /// Failed to load the encoder resource
    #[error("Failed to load encoder from '{path}': {reason}")]
    Load { path: PathBuf, reason: String },

    /// Encoding a document failed
    #[error("Encoding failed: {0}")]
    Encode(String),
}

/// Completion ledger errors
#[derive(Error, Debug)]
pub enum LedgerError {
    /// Filesystem operation on a marker, artifact, or the summary log failed
    #[error("Ledger I/O on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl LedgerError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        LedgerError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Record framing and decoding errors
#[derive(Error, Debug)]
pub enum RecordError {
    /// Input ended inside a record frame
    #[error("Truncated record while reading {field}")]
    Truncated { field: &'static str },

    /// Frame checksum did not match
    #[error("Checksum mismatch on record {field}: expected {expected:#010x}, found {found:#010x}")]
    Checksum {
        field: &'static str,
        expected: u32,
        found: u32,
    },

    /// Payload is not a well-formed Example message
    #[error("Malformed record payload: {0}")]
    Malformed(String),

    /// Underlying reader failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that abort the processing of a single chunk
#[derive(Error, Debug)]
pub enum ChunkError {
    /// Source file could not be read
    #[error("Chunk {index}: failed to read '{path}': {source}")]
    Read {
        index: usize,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Source file is not valid UTF-8
    #[error("Chunk {index}: '{path}' is not valid UTF-8")]
    Decode { index: usize, path: PathBuf },

    /// Encoder rejected a document
    #[error("Chunk {index}: failed to encode '{path}': {reason}")]
    Encode {
        index: usize,
        path: PathBuf,
        reason: String,
    },

    /// Output artifact could not be written
    #[error("Chunk {index}: failed to write artifact '{path}': {source}")]
    Write {
        index: usize,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Ledger check or commit failed
    #[error("Chunk {index}: {source}")]
    Ledger {
        index: usize,
        #[source]
        source: LedgerError,
    },
}

impl ChunkError {
    /// Chunk index this error belongs to
    pub fn index(&self) -> usize {
        match self {
            ChunkError::Read { index, .. }
            | ChunkError::Decode { index, .. }
            | ChunkError::Encode { index, .. }
            | ChunkError::Write { index, .. }
            | ChunkError::Ledger { index, .. } => *index,
        }
    }

    /// Check if this error is tied to a single source file
    ///
    /// Only these may be skipped under `BadFilePolicy::SkipFile`.
    pub fn is_per_file(&self) -> bool {
        matches!(
            self,
            ChunkError::Read { .. } | ChunkError::Decode { .. } | ChunkError::Encode { .. }
        )
    }
}

/// Worker thread errors
#[derive(Error, Debug)]
pub enum WorkerError {
    /// Worker panicked
    #[error("Worker {id} panicked: {message}")]
    Panicked { id: usize, message: String },

    /// Worker thread could not be spawned
    #[error("Failed to spawn worker {id}: {reason}")]
    SpawnFailed { id: usize, reason: String },

    /// Dispatcher thread panicked
    #[error("Dispatcher panicked: {message}")]
    DispatcherPanicked { message: String },
}

/// Result type alias for ShardError
pub type Result<T> = std::result::Result<T, ShardError>;

/// Result type alias for RecordError
pub type RecordResult<T> = std::result::Result<T, RecordError>;

/// Result type alias for LedgerError
pub type LedgerResult<T> = std::result::Result<T, LedgerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_error_per_file() {
        let decode = ChunkError::Decode {
            index: 3,
            path: "/data/a.txt".into(),
        };
        assert!(decode.is_per_file());
        assert_eq!(decode.index(), 3);

        let write = ChunkError::Write {
            index: 7,
            path: "/out/x_7.tfrecords".into(),
            source: std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
        };
        assert!(!write.is_per_file());
        assert_eq!(write.index(), 7);
    }

    #[test]
    fn test_error_conversion() {
        let cfg = ConfigError::InvalidChunkSize { size: 0 };
        let err: ShardError = cfg.into();
        assert!(matches!(err, ShardError::Config(_)));
        assert!(err.to_string().contains("chunk size 0"));

        let err: ShardError = ConfigError::SharedOutputAndLogDir {
            path: "shards".into(),
        }
        .into();
        assert!(matches!(err, ShardError::Config(_)));
        assert!(err.to_string().contains("'shards' is also the log directory"));
    }
}
