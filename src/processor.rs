//! Chunk processor
//!
//! Turns one [`Chunk`] into one output artifact plus one completion marker:
//!
//! 1. Skip the chunk if the ledger already has it.
//! 2. Delete any artifact left without a marker by an interrupted run.
//! 3. Read, normalize, and encode each file in order; drop degenerate
//!    documents; write the rest as records.
//! 4. Flush and fsync the artifact, then commit the chunk to the ledger.
//!
//! A read, decode, or encode failure aborts the chunk by default: the
//! partial artifact is removed and no marker is written, so the next run
//! retries the whole chunk.

use crate::chunker::Chunk;
use crate::encoder::Encoder;
use crate::error::ChunkError;
use crate::ledger::{ChunkCounts, CompletionLedger, ShardLayout};
use crate::normalize::Normalizer;
use crate::record::{Record, RecordSink, TfRecordWriter};
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, trace, warn};

/// Documents with fewer tokens than this are dropped
pub const DEFAULT_MIN_TOKENS: usize = 25;

/// What to do when a single source file cannot be read, decoded, or encoded
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BadFilePolicy {
    /// Fail the whole chunk; it is retried from scratch on the next run
    #[default]
    AbortChunk,
    /// Log the file, count it against the chunk total, and continue
    SkipFile,
}

/// Result of processing one chunk
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkOutcome {
    /// Committed by an earlier run; nothing was done
    AlreadyComplete {
        /// Counts from the marker body, if readable
        recorded: Option<ChunkCounts>,
    },

    /// Processed and committed by this run
    Completed {
        counts: ChunkCounts,
        /// Files skipped under `BadFilePolicy::SkipFile`
        skipped_files: u64,
    },
}

impl ChunkOutcome {
    /// Good files contributed by this run
    pub fn new_good(&self) -> u64 {
        match self {
            ChunkOutcome::AlreadyComplete { .. } => 0,
            ChunkOutcome::Completed { counts, .. } => counts.good,
        }
    }
}

/// Per-chunk document tally
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChunkTally {
    /// Documents written as records
    pub good: u64,
    /// Degenerate documents dropped
    pub filtered: u64,
    /// Unreadable documents skipped
    pub skipped: u64,
}

/// True when a token sequence is too short or entirely zero
pub fn is_degenerate(token_ids: &[u32], min_tokens: usize) -> bool {
    token_ids.len() < min_tokens || token_ids.iter().all(|&t| t == 0)
}

/// Identifier token for a document: its file name up to the first `.`
pub fn document_id(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy())
        .and_then(|name| name.split('.').next().map(str::to_string))
        .unwrap_or_default()
}

/// Processes chunks against shared encoder, normalizer, and ledger handles
pub struct ChunkProcessor {
    encoder: Arc<dyn Encoder>,
    normalizer: Arc<dyn Normalizer>,
    ledger: Arc<dyn CompletionLedger>,
    layout: ShardLayout,
    min_tokens: usize,
    bad_files: BadFilePolicy,
}

impl ChunkProcessor {
    pub fn new(
        encoder: Arc<dyn Encoder>,
        normalizer: Arc<dyn Normalizer>,
        ledger: Arc<dyn CompletionLedger>,
        layout: ShardLayout,
    ) -> Self {
        Self {
            encoder,
            normalizer,
            ledger,
            layout,
            min_tokens: DEFAULT_MIN_TOKENS,
            bad_files: BadFilePolicy::default(),
        }
    }

    /// Set the minimum token count for a document to be kept
    pub fn min_tokens(mut self, min_tokens: usize) -> Self {
        self.min_tokens = min_tokens;
        self
    }

    /// Set the policy for unreadable files
    pub fn bad_file_policy(mut self, policy: BadFilePolicy) -> Self {
        self.bad_files = policy;
        self
    }

    pub fn layout(&self) -> &ShardLayout {
        &self.layout
    }

    /// Process one chunk to completion
    pub fn process(&self, chunk: &Chunk) -> Result<ChunkOutcome, ChunkError> {
        let index = chunk.index;
        let ledger_err = |source| ChunkError::Ledger { index, source };

        if self.ledger.is_complete(index).map_err(ledger_err)? {
            debug!(chunk = index, "Chunk already complete, skipping");
            return Ok(ChunkOutcome::AlreadyComplete {
                recorded: self.ledger.recorded_counts(index),
            });
        }

        let start = Instant::now();
        let artifact = self.layout.artifact_path(index);
        let write_err = |source| ChunkError::Write {
            index,
            path: artifact.clone(),
            source,
        };

        if self.ledger.has_artifact(index).map_err(ledger_err)? {
            warn!(
                chunk = index,
                path = %artifact.display(),
                "Removing unfinished artifact from an interrupted run"
            );
            fs::remove_file(&artifact).map_err(write_err)?;
        }

        let file = File::create(&artifact).map_err(write_err)?;
        let mut writer = TfRecordWriter::new(BufWriter::new(file));

        let tally = match self.encode_chunk(chunk, &mut writer) {
            Ok(tally) => tally,
            Err(e) => {
                drop(writer);
                discard(&artifact);
                return Err(e);
            }
        };

        let bytes = writer.bytes_written();
        let sealed = writer
            .finish()
            .and_then(|buffered| buffered.into_inner().map_err(|e| e.into_error()))
            .and_then(|file| file.sync_all());
        if let Err(source) = sealed {
            discard(&artifact);
            return Err(write_err(source));
        }

        let counts = ChunkCounts::new(tally.good, chunk.len() as u64);
        self.ledger.commit(index, counts).map_err(ledger_err)?;

        debug!(
            chunk = index,
            good = tally.good,
            total = counts.total,
            filtered = tally.filtered,
            skipped = tally.skipped,
            bytes = bytes,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Chunk complete"
        );

        Ok(ChunkOutcome::Completed {
            counts,
            skipped_files: tally.skipped,
        })
    }

    /// Encode every file of `chunk` into `sink`, in order
    pub fn encode_chunk<S: RecordSink>(
        &self,
        chunk: &Chunk,
        sink: &mut S,
    ) -> Result<ChunkTally, ChunkError> {
        let mut tally = ChunkTally::default();

        for path in &chunk.files {
            match self.encode_file(chunk.index, path) {
                Ok(Some(record)) => {
                    sink.write_record(&record)
                        .map_err(|source| ChunkError::Write {
                            index: chunk.index,
                            path: self.layout.artifact_path(chunk.index),
                            source,
                        })?;
                    tally.good += 1;
                }
                Ok(None) => tally.filtered += 1,
                Err(e) if e.is_per_file() && self.bad_files == BadFilePolicy::SkipFile => {
                    warn!(chunk = chunk.index, error = %e, "Skipping unreadable file");
                    tally.skipped += 1;
                }
                Err(e) => return Err(e),
            }
        }

        Ok(tally)
    }

    /// Read, normalize, and encode one file; `None` if it is degenerate
    fn encode_file(&self, index: usize, path: &Path) -> Result<Option<Record>, ChunkError> {
        let to_path = || PathBuf::from(path);

        let bytes = fs::read(path).map_err(|source| ChunkError::Read {
            index,
            path: to_path(),
            source,
        })?;
        let text = String::from_utf8(bytes).map_err(|_| ChunkError::Decode {
            index,
            path: to_path(),
        })?;

        let normalized = self.normalizer.normalize(&text);
        let token_ids = self
            .encoder
            .encode(&normalized)
            .map_err(|e| ChunkError::Encode {
                index,
                path: to_path(),
                reason: e.to_string(),
            })?;

        if is_degenerate(&token_ids, self.min_tokens) {
            trace!(path = %path.display(), tokens = token_ids.len(), "Dropping degenerate document");
            return Ok(None);
        }

        Ok(Some(Record::new(&document_id(path), &token_ids)))
    }
}

/// Best-effort removal of a partial artifact
fn discard(artifact: &Path) {
    if let Err(e) = fs::remove_file(artifact) {
        warn!(path = %artifact.display(), error = %e, "Failed to remove partial artifact");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EncoderError;
    use crate::ledger::FsLedger;
    use crate::normalize::Passthrough;
    use crate::record::read_artifact;
    use tempfile::{tempdir, TempDir};

    /// One token per whitespace-separated word; numeric words map to their value
    struct WordEncoder;

    impl Encoder for WordEncoder {
        fn encode(&self, text: &str) -> Result<Vec<u32>, EncoderError> {
            if text.contains("POISON") {
                return Err(EncoderError::Encode("poisoned input".into()));
            }
            Ok(text
                .split_whitespace()
                .map(|w| w.parse().unwrap_or(1))
                .collect())
        }
    }

    struct Fixture {
        dir: TempDir,
        ledger: Arc<FsLedger>,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempdir().unwrap();
            fs::create_dir_all(dir.path().join("in")).unwrap();
            let layout = ShardLayout::new(
                &dir.path().join("out"),
                &dir.path().join("logs"),
                "test",
            );
            let ledger = Arc::new(FsLedger::open(layout).unwrap());
            Self { dir, ledger }
        }

        fn processor(&self) -> ChunkProcessor {
            ChunkProcessor::new(
                Arc::new(WordEncoder),
                Arc::new(Passthrough),
                self.ledger.clone(),
                self.ledger.layout().clone(),
            )
        }

        fn doc(&self, name: &str, words: usize, value: u32) -> PathBuf {
            let path = self.dir.path().join("in").join(name);
            let body = vec![value.to_string(); words].join(" ");
            fs::write(&path, body).unwrap();
            path
        }
    }

    #[test]
    fn test_degenerate_rules() {
        assert!(is_degenerate(&[5; 24], 25));
        assert!(!is_degenerate(&[5; 25], 25));
        assert!(is_degenerate(&[0; 40], 25));
        let mut mostly_zero = vec![0u32; 40];
        mostly_zero[39] = 1;
        assert!(!is_degenerate(&mostly_zero, 25));
    }

    #[test]
    fn test_document_id() {
        assert_eq!(document_id(Path::new("/data/ab12cd.txt")), "ab12cd");
        assert_eq!(document_id(Path::new("x/0a1b-2c.data.txt")), "0a1b-2c");
        assert_eq!(document_id(Path::new("noext")), "noext");
    }

    #[test]
    fn test_filtering_example() {
        let fx = Fixture::new();
        let chunk = Chunk {
            index: 0,
            files: vec![
                fx.doc("thirty.txt", 30, 7),
                fx.doc("ten.txt", 10, 7),
                fx.doc("forty.txt", 40, 7),
            ],
        };

        let outcome = fx.processor().process(&chunk).unwrap();
        assert_eq!(
            outcome,
            ChunkOutcome::Completed {
                counts: ChunkCounts::new(2, 3),
                skipped_files: 0,
            }
        );

        let records = read_artifact(&fx.ledger.layout().artifact_path(0)).unwrap();
        let ids: Vec<String> = records.iter().map(Record::id_str).collect();
        assert_eq!(ids, vec!["thirty", "forty"]);
        assert_eq!(records[0].tokens.len(), 30);
        assert_eq!(records[1].tokens.len(), 40);
        assert_eq!(fx.ledger.recorded_counts(0), Some(ChunkCounts::new(2, 3)));
    }

    #[test]
    fn test_all_zero_document_filtered() {
        let fx = Fixture::new();
        let chunk = Chunk {
            index: 1,
            files: vec![fx.doc("zeros.txt", 50, 0), fx.doc("ok.txt", 25, 3)],
        };

        let mut sink: Vec<Record> = Vec::new();
        let tally = fx.processor().encode_chunk(&chunk, &mut sink).unwrap();
        assert_eq!(
            tally,
            ChunkTally {
                good: 1,
                filtered: 1,
                skipped: 0
            }
        );
        assert_eq!(sink.records_written(), 1);
        assert_eq!(sink[0].id_str(), "ok");
    }

    #[test]
    fn test_min_tokens_override() {
        let fx = Fixture::new();
        let chunk = Chunk {
            index: 0,
            files: vec![fx.doc("short.txt", 5, 2)],
        };

        let mut sink: Vec<Record> = Vec::new();
        let tally = fx
            .processor()
            .min_tokens(5)
            .encode_chunk(&chunk, &mut sink)
            .unwrap();
        assert_eq!(tally.good, 1);
    }

    #[test]
    fn test_completed_chunk_is_skipped() {
        let fx = Fixture::new();
        let chunk = Chunk {
            index: 2,
            files: vec![fx.doc("a.txt", 30, 1)],
        };
        let processor = fx.processor();

        processor.process(&chunk).unwrap();
        let artifact = fx.ledger.layout().artifact_path(2);
        let first = fs::read(&artifact).unwrap();

        let outcome = processor.process(&chunk).unwrap();
        assert_eq!(
            outcome,
            ChunkOutcome::AlreadyComplete {
                recorded: Some(ChunkCounts::new(1, 1))
            }
        );
        assert_eq!(outcome.new_good(), 0);
        assert_eq!(fs::read(&artifact).unwrap(), first);

        let summary = fs::read_to_string(fx.ledger.layout().summary_log_path()).unwrap();
        assert_eq!(summary.lines().count(), 1);
    }

    #[test]
    fn test_stale_artifact_replaced() {
        let fx = Fixture::new();
        let chunk = Chunk {
            index: 0,
            files: vec![fx.doc("a.txt", 30, 9)],
        };
        let artifact = fx.ledger.layout().artifact_path(0);
        fs::write(&artifact, b"half-written garbage").unwrap();

        fx.processor().process(&chunk).unwrap();

        let records = read_artifact(&artifact).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id_str(), "a");
    }

    #[test]
    fn test_bad_file_aborts_chunk() {
        let fx = Fixture::new();
        let bad = fx.dir.path().join("in").join("bad.txt");
        fs::write(&bad, [0xff, 0xfe, 0x00, 0x41]).unwrap();
        let chunk = Chunk {
            index: 3,
            files: vec![fx.doc("good.txt", 30, 1), bad],
        };

        let err = fx.processor().process(&chunk).unwrap_err();
        assert!(matches!(err, ChunkError::Decode { index: 3, .. }));
        assert!(!fx.ledger.layout().artifact_path(3).exists());
        assert!(!fx.ledger.is_complete(3).unwrap());
    }

    #[test]
    fn test_bad_file_skipped_when_allowed() {
        let fx = Fixture::new();
        let poisoned = fx.dir.path().join("in").join("poison.txt");
        fs::write(&poisoned, "POISON").unwrap();
        let chunk = Chunk {
            index: 0,
            files: vec![poisoned, fx.doc("good.txt", 30, 1)],
        };

        let outcome = fx
            .processor()
            .bad_file_policy(BadFilePolicy::SkipFile)
            .process(&chunk)
            .unwrap();
        assert_eq!(
            outcome,
            ChunkOutcome::Completed {
                counts: ChunkCounts::new(1, 2),
                skipped_files: 1,
            }
        );
    }

    #[test]
    fn test_missing_file_aborts_chunk() {
        let fx = Fixture::new();
        let chunk = Chunk {
            index: 0,
            files: vec![fx.dir.path().join("in").join("missing.txt")],
        };
        let err = fx.processor().process(&chunk).unwrap_err();
        assert!(matches!(err, ChunkError::Read { .. }));
    }
}
