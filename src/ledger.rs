//! Completion ledger
//!
//! Tracks which chunks are fully processed, keyed by chunk index. The
//! filesystem backend keeps one marker file per completed chunk in the log
//! directory plus a shared, append-only summary log:
//!
//! ```text
//! <log_dir>/<name>_<i>.tfrecords   marker, body "<good>/<total>"
//! <log_dir>/good_files.log         "<i>: <good>/<total>" per completed chunk
//! ```
//!
//! Only marker existence drives resumption. Marker bodies and the summary
//! log are diagnostics.

use crate::error::{LedgerError, LedgerResult};
use crate::record::ARTIFACT_EXTENSION;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::debug;

/// Name of the shared summary log inside the log directory
pub const SUMMARY_LOG: &str = "good_files.log";

/// Surviving and total file counts for one chunk
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkCounts {
    pub good: u64,
    pub total: u64,
}

impl ChunkCounts {
    pub fn new(good: u64, total: u64) -> Self {
        Self { good, total }
    }
}

impl fmt::Display for ChunkCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.good, self.total)
    }
}

impl FromStr for ChunkCounts {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (good, total) = s
            .split_once('/')
            .ok_or_else(|| format!("expected '<good>/<total>', got '{s}'"))?;
        let good = good.trim().parse().map_err(|_| format!("bad good count '{good}'"))?;
        let total = total.trim().parse().map_err(|_| format!("bad total count '{total}'"))?;
        Ok(Self { good, total })
    }
}

/// Deterministic naming of artifacts and markers
#[derive(Debug, Clone)]
pub struct ShardLayout {
    pub output_dir: PathBuf,
    pub log_dir: PathBuf,
    pub job_name: String,
}

impl ShardLayout {
    pub fn new(output_dir: &Path, log_dir: &Path, job_name: &str) -> Self {
        Self {
            output_dir: output_dir.to_path_buf(),
            log_dir: log_dir.to_path_buf(),
            job_name: job_name.to_string(),
        }
    }

    /// `<name>_<i>.tfrecords`
    pub fn artifact_name(&self, index: usize) -> String {
        format!("{}_{}.{}", self.job_name, index, ARTIFACT_EXTENSION)
    }

    pub fn artifact_path(&self, index: usize) -> PathBuf {
        self.output_dir.join(self.artifact_name(index))
    }

    pub fn marker_path(&self, index: usize) -> PathBuf {
        self.log_dir.join(self.artifact_name(index))
    }

    pub fn summary_log_path(&self) -> PathBuf {
        self.log_dir.join(SUMMARY_LOG)
    }
}

/// Idempotency-key store for chunk completion
///
/// Implementations must tolerate concurrent calls for distinct indices.
pub trait CompletionLedger: Send + Sync {
    /// Whether chunk `index` has been committed
    fn is_complete(&self, index: usize) -> LedgerResult<bool>;

    /// Whether an artifact for chunk `index` exists, committed or not
    fn has_artifact(&self, index: usize) -> LedgerResult<bool>;

    /// Write the completion marker for chunk `index`
    fn write_marker(&self, index: usize, counts: ChunkCounts) -> LedgerResult<()>;

    /// Append one line for chunk `index` to the summary log
    fn append_summary(&self, index: usize, counts: ChunkCounts) -> LedgerResult<()>;

    /// Durably record chunk `index` as complete: marker first, then summary
    fn commit(&self, index: usize, counts: ChunkCounts) -> LedgerResult<()> {
        self.write_marker(index, counts)?;
        self.append_summary(index, counts)
    }

    /// Counts recorded at commit time, if readable
    fn recorded_counts(&self, index: usize) -> Option<ChunkCounts>;
}

/// Filesystem-backed ledger
pub struct FsLedger {
    layout: ShardLayout,
    summary_lock: Mutex<()>,
}

impl FsLedger {
    /// Open the ledger, creating the log and output directories if needed
    pub fn open(layout: ShardLayout) -> LedgerResult<Self> {
        for dir in [&layout.log_dir, &layout.output_dir] {
            if !dir.exists() {
                fs::create_dir_all(dir).map_err(|e| LedgerError::io(dir, e))?;
                debug!(path = %dir.display(), "Created directory");
            }
        }
        Ok(Self {
            layout,
            summary_lock: Mutex::new(()),
        })
    }

    pub fn layout(&self) -> &ShardLayout {
        &self.layout
    }
}

impl CompletionLedger for FsLedger {
    fn is_complete(&self, index: usize) -> LedgerResult<bool> {
        let marker = self.layout.marker_path(index);
        marker.try_exists().map_err(|e| LedgerError::io(&marker, e))
    }

    fn has_artifact(&self, index: usize) -> LedgerResult<bool> {
        let artifact = self.layout.artifact_path(index);
        artifact.try_exists().map_err(|e| LedgerError::io(&artifact, e))
    }

    /// Write the marker for chunk `index`
    ///
    /// The body goes to a temporary file first and is renamed into place,
    /// so a marker is never observed half-written.
    fn write_marker(&self, index: usize, counts: ChunkCounts) -> LedgerResult<()> {
        let marker = self.layout.marker_path(index);
        let tmp = marker.with_extension(format!("{ARTIFACT_EXTENSION}.tmp"));

        let mut file = fs::File::create(&tmp).map_err(|e| LedgerError::io(&tmp, e))?;
        file.write_all(counts.to_string().as_bytes())
            .and_then(|_| file.sync_all())
            .map_err(|e| LedgerError::io(&tmp, e))?;
        drop(file);

        fs::rename(&tmp, &marker).map_err(|e| LedgerError::io(&marker, e))
    }

    /// Append `"<i>: <good>/<total>"` to the summary log
    fn append_summary(&self, index: usize, counts: ChunkCounts) -> LedgerResult<()> {
        let path = self.layout.summary_log_path();
        let line = format!("{index}: {counts}\n");

        let _guard = self.summary_lock.lock();
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| LedgerError::io(&path, e))?;
        // One write per line keeps lines whole under O_APPEND
        file.write_all(line.as_bytes())
            .map_err(|e| LedgerError::io(&path, e))
    }

    fn recorded_counts(&self, index: usize) -> Option<ChunkCounts> {
        fs::read_to_string(self.layout.marker_path(index))
            .ok()
            .and_then(|body| body.trim().parse().ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use tempfile::tempdir;

    fn ledger(root: &Path) -> FsLedger {
        FsLedger::open(ShardLayout::new(
            &root.join("out"),
            &root.join("logs"),
            "openwebtext",
        ))
        .unwrap()
    }

    #[test]
    fn test_layout_names() {
        let layout = ShardLayout::new(Path::new("/o"), Path::new("/l"), "job");
        assert_eq!(layout.artifact_name(12), "job_12.tfrecords");
        assert_eq!(layout.artifact_path(3), PathBuf::from("/o/job_3.tfrecords"));
        assert_eq!(layout.marker_path(3), PathBuf::from("/l/job_3.tfrecords"));
        assert_eq!(layout.summary_log_path(), PathBuf::from("/l/good_files.log"));
    }

    #[test]
    fn test_open_creates_directories() {
        let dir = tempdir().unwrap();
        let ledger = ledger(dir.path());
        assert!(ledger.layout().log_dir.is_dir());
        assert!(ledger.layout().output_dir.is_dir());
    }

    #[test]
    fn test_commit_writes_marker_and_summary() {
        let dir = tempdir().unwrap();
        let ledger = ledger(dir.path());

        assert!(!ledger.is_complete(4).unwrap());
        ledger.commit(4, ChunkCounts::new(2, 3)).unwrap();
        assert!(ledger.is_complete(4).unwrap());

        let marker = fs::read_to_string(ledger.layout().marker_path(4)).unwrap();
        assert_eq!(marker, "2/3");
        assert_eq!(ledger.recorded_counts(4), Some(ChunkCounts::new(2, 3)));

        let summary = fs::read_to_string(ledger.layout().summary_log_path()).unwrap();
        assert_eq!(summary, "4: 2/3\n");

        // No temporary marker left behind
        let leftovers: Vec<_> = fs::read_dir(&ledger.layout().log_dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_marker_existence_is_the_signal() {
        let dir = tempdir().unwrap();
        let ledger = ledger(dir.path());

        fs::write(ledger.layout().marker_path(0), "garbage").unwrap();
        assert!(ledger.is_complete(0).unwrap());
        assert_eq!(ledger.recorded_counts(0), None);
    }

    #[test]
    fn test_concurrent_summary_appends() {
        let dir = tempdir().unwrap();
        let ledger = Arc::new(ledger(dir.path()));

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let ledger = Arc::clone(&ledger);
                thread::spawn(move || {
                    for i in 0..25 {
                        let index = t * 25 + i;
                        ledger
                            .append_summary(index, ChunkCounts::new(index as u64, 1000))
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let summary = fs::read_to_string(ledger.layout().summary_log_path()).unwrap();
        let mut indices: Vec<usize> = summary
            .lines()
            .map(|line| {
                let (index, counts) = line.split_once(": ").unwrap();
                let counts: ChunkCounts = counts.parse().unwrap();
                let index: usize = index.parse().unwrap();
                assert_eq!(counts, ChunkCounts::new(index as u64, 1000));
                index
            })
            .collect();
        indices.sort_unstable();
        assert_eq!(indices, (0..200).collect::<Vec<_>>());
    }

    #[test]
    fn test_counts_parse() {
        assert_eq!("7 / 9".parse::<ChunkCounts>().unwrap(), ChunkCounts::new(7, 9));
        assert!("7-9".parse::<ChunkCounts>().is_err());
    }
}
