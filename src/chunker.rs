//! Contiguous partitioning of the input file list
//!
//! A [`Chunk`] is the unit of work, output, and completion tracking. Its
//! index is assigned by position, so it is stable across runs as long as the
//! input list and its ordering are.

use crate::error::ConfigError;
use std::path::PathBuf;

/// A contiguous slice of the input file list, processed as one unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Position of this chunk in the partition (0-based)
    pub index: usize,

    /// Input files, in input order
    pub files: Vec<PathBuf>,
}

impl Chunk {
    /// Number of input files in the chunk
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Check if the chunk holds no files
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Split `files` into chunks of `chunk_size`, the last one possibly shorter
///
/// Produces `ceil(N / chunk_size)` chunks; an empty input yields no chunks.
pub fn chunk_files(files: Vec<PathBuf>, chunk_size: usize) -> Result<Vec<Chunk>, ConfigError> {
    if chunk_size == 0 {
        return Err(ConfigError::InvalidChunkSize { size: chunk_size });
    }

    let mut chunks = Vec::with_capacity(files.len().div_ceil(chunk_size));
    let mut iter = files.into_iter().peekable();
    let mut index = 0;

    while iter.peek().is_some() {
        let files: Vec<PathBuf> = iter.by_ref().take(chunk_size).collect();
        chunks.push(Chunk { index, files });
        index += 1;
    }

    Ok(chunks)
}
