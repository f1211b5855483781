//! Configuration types for text-sharder
//!
//! This module defines:
//! - CLI argument parsing using clap derive macros
//! - Runtime job configuration with validation

use crate::error::ConfigError;
use crate::processor::{BadFilePolicy, DEFAULT_MIN_TOKENS};
use clap::Parser;
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};

/// Maximum reasonable worker count
const MAX_WORKERS: usize = 512;

/// Default number of files per output artifact
pub const DEFAULT_FILES_PER_CHUNK: usize = 175_000;

/// Default output name prefix
pub const DEFAULT_JOB_NAME: &str = "openwebtext-newspaper";

/// Convert a corpus of text files into tokenized TFRecord shards
#[derive(Parser, Debug, Clone)]
#[command(
    name = "text-sharder",
    version,
    about = "Convert a corpus of text files into tokenized TFRecord shards",
    long_about = "Splits the input files into fixed-size chunks and converts each chunk into one \
                  TFRecord file of tokenized documents, using a pool of worker threads.\n\n\
                  Completed chunks are marked in the log directory. Re-running the same command \
                  after an interruption only processes the chunks that did not finish.",
    after_help = "EXAMPLES:\n    \
        text-sharder --base-dir corpus/ --encoder-path gpt2/ --output-dir out --log-dir logs\n    \
        text-sharder --base-dir corpus/ --files-per 10000 --processes 32 --name owt\n    \
        text-sharder inspect out/owt_0.tfrecords out/owt_1.tfrecords",
    args_conflicts_with_subcommands = true,
    subcommand_negates_reqs = true
)]
pub struct CliArgs {
    /// Subcommand (inspect)
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Directory containing the input text files (searched recursively)
    #[arg(long, required = true, value_name = "DIR")]
    pub base_dir: Option<PathBuf>,

    /// Number of input files per output file
    #[arg(long, default_value_t = DEFAULT_FILES_PER_CHUNK, value_name = "NUM")]
    pub files_per: usize,

    /// Output file prefix; files are named <NAME>_<i>.tfrecords
    #[arg(long, default_value = DEFAULT_JOB_NAME, value_name = "NAME")]
    pub name: String,

    /// Output directory for record files
    #[arg(long, default_value = "out", value_name = "DIR")]
    pub output_dir: PathBuf,

    /// Directory for completion markers and the summary log
    #[arg(long, default_value = "logs", value_name = "DIR")]
    pub log_dir: PathBuf,

    /// Number of worker threads
    #[arg(
        short = 'w',
        long,
        default_value_t = default_workers(),
        value_name = "NUM"
    )]
    pub processes: usize,

    /// Path to tokenizer.json, or a directory containing it
    #[arg(long, default_value = "encoder", value_name = "PATH")]
    pub encoder_path: PathBuf,

    /// Extension of input files
    #[arg(long, default_value = "txt", value_name = "EXT")]
    pub extension: String,

    /// Documents encoding to fewer tokens are dropped
    #[arg(long, default_value_t = DEFAULT_MIN_TOKENS, value_name = "NUM")]
    pub min_tokens: usize,

    /// Exclude input paths matching pattern (can be repeated)
    #[arg(long = "exclude", value_name = "PATTERN", action = clap::ArgAction::Append)]
    pub exclude_patterns: Vec<String>,

    /// Skip unreadable files instead of failing their chunk
    #[arg(long)]
    pub skip_bad_files: bool,

    /// Encode raw text without cleanup or NFKC normalization
    #[arg(long)]
    pub no_normalize: bool,

    /// Quiet mode - suppress progress output
    #[arg(short = 'q', long)]
    pub quiet: bool,

    /// Verbose output (per-chunk logging)
    #[arg(short = 'v', long)]
    pub verbose: bool,
}

/// Subcommands
#[derive(clap::Subcommand, Debug, Clone)]
pub enum Command {
    /// Verify record files and print per-file record counts
    Inspect {
        /// Record files to read
        #[arg(value_name = "FILE", required = true)]
        files: Vec<PathBuf>,

        /// Also print each record's identifier and token count
        #[arg(long)]
        records: bool,
    },
}

fn default_workers() -> usize {
    // Encoding is CPU bound
    num_cpus::get()
}

/// Validated job configuration
#[derive(Debug, Clone)]
pub struct JobConfig {
    /// Root of the input tree
    pub input_root: PathBuf,

    /// Input files per chunk
    pub chunk_size: usize,

    /// Output name prefix
    pub job_name: String,

    /// Directory for output artifacts
    pub output_dir: PathBuf,

    /// Directory for markers and the summary log
    pub log_dir: PathBuf,

    /// Number of worker threads
    pub worker_count: usize,

    /// Encoder resource
    pub encoder_path: PathBuf,

    /// Input file extension, without the dot
    pub extension: String,

    /// Minimum tokens for a document to be kept
    pub min_tokens: usize,

    /// Compiled exclude patterns
    pub exclude_patterns: Vec<Regex>,

    /// Handling of unreadable input files
    pub bad_files: BadFilePolicy,

    /// Apply text cleanup before encoding
    pub normalize: bool,

    /// Show progress bar
    pub show_progress: bool,

    /// Verbose logging
    pub verbose: bool,
}

impl JobConfig {
    /// Configuration with defaults for everything but the locations
    pub fn new(input_root: PathBuf, output_dir: PathBuf, log_dir: PathBuf, job_name: &str) -> Self {
        Self {
            input_root,
            chunk_size: DEFAULT_FILES_PER_CHUNK,
            job_name: job_name.to_string(),
            output_dir,
            log_dir,
            worker_count: default_workers(),
            encoder_path: PathBuf::from("encoder"),
            extension: "txt".to_string(),
            min_tokens: DEFAULT_MIN_TOKENS,
            exclude_patterns: Vec::new(),
            bad_files: BadFilePolicy::AbortChunk,
            normalize: true,
            show_progress: false,
            verbose: false,
        }
    }

    /// Create configuration from CLI arguments
    pub fn from_args(args: CliArgs) -> Result<Self, ConfigError> {
        let input_root = args
            .base_dir
            .ok_or_else(|| ConfigError::MissingRequired("--base-dir".into()))?;

        let exclude_patterns = args
            .exclude_patterns
            .iter()
            .map(|p| {
                Regex::new(p).map_err(|e| ConfigError::InvalidExcludePattern {
                    pattern: p.clone(),
                    reason: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let config = Self {
            input_root,
            chunk_size: args.files_per,
            job_name: args.name,
            output_dir: args.output_dir,
            log_dir: args.log_dir,
            worker_count: args.processes,
            encoder_path: args.encoder_path,
            extension: args.extension.trim_start_matches('.').to_string(),
            min_tokens: args.min_tokens,
            exclude_patterns,
            bad_files: if args.skip_bad_files {
                BadFilePolicy::SkipFile
            } else {
                BadFilePolicy::AbortChunk
            },
            normalize: !args.no_normalize,
            show_progress: !args.quiet,
            verbose: args.verbose,
        };

        config.validate()?;
        Ok(config)
    }

    /// Check every setting that can be checked before work begins
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_size == 0 {
            return Err(ConfigError::InvalidChunkSize {
                size: self.chunk_size,
            });
        }

        if self.worker_count == 0 || self.worker_count > MAX_WORKERS {
            return Err(ConfigError::InvalidWorkerCount {
                count: self.worker_count,
                max: MAX_WORKERS,
            });
        }

        if self.min_tokens == 0 {
            return Err(ConfigError::InvalidMinTokens {
                count: self.min_tokens,
            });
        }

        if self.job_name.is_empty() {
            return Err(ConfigError::InvalidJobName {
                name: self.job_name.clone(),
                reason: "must not be empty".into(),
            });
        }
        if self.job_name.contains(['/', '\\']) {
            return Err(ConfigError::InvalidJobName {
                name: self.job_name.clone(),
                reason: "must not contain path separators".into(),
            });
        }

        if !self.input_root.is_dir() {
            return Err(ConfigError::MissingInputRoot {
                path: self.input_root.clone(),
            });
        }

        check_distinct_dirs(&self.output_dir, &self.log_dir)
    }
}

/// Reject an output directory that resolves to the log directory
pub fn check_distinct_dirs(output_dir: &Path, log_dir: &Path) -> Result<(), ConfigError> {
    if resolve_dir(output_dir) == resolve_dir(log_dir) {
        return Err(ConfigError::SharedOutputAndLogDir {
            path: output_dir.to_path_buf(),
        });
    }
    Ok(())
}

/// Canonical form when the directory exists, absolute form otherwise
fn resolve_dir(path: &Path) -> PathBuf {
    fs::canonicalize(path)
        .or_else(|_| std::path::absolute(path))
        .unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn parse(extra: &[&str]) -> CliArgs {
        let mut argv = vec!["text-sharder"];
        argv.extend_from_slice(extra);
        CliArgs::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_defaults() {
        let args = parse(&["--base-dir", "/corpus"]);
        assert_eq!(args.files_per, 175_000);
        assert_eq!(args.name, "openwebtext-newspaper");
        assert_eq!(args.output_dir, PathBuf::from("out"));
        assert_eq!(args.log_dir, PathBuf::from("logs"));
        assert_eq!(args.min_tokens, 25);
        assert!(args.command.is_none());
    }

    #[test]
    fn test_base_dir_required() {
        assert!(CliArgs::try_parse_from(["text-sharder"]).is_err());
    }

    #[test]
    fn test_inspect_subcommand() {
        let args = parse(&["inspect", "a.tfrecords", "b.tfrecords"]);
        match args.command {
            Some(Command::Inspect { files, records }) => {
                assert_eq!(files.len(), 2);
                assert!(!records);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_from_args_validates() {
        let dir = tempdir().unwrap();
        let root = dir.path().to_str().unwrap();

        let config = JobConfig::from_args(parse(&[
            "--base-dir",
            root,
            "--files-per",
            "10",
            "--extension",
            ".md",
            "--skip-bad-files",
            "--exclude",
            r"\.snapshot",
        ]))
        .unwrap();
        assert_eq!(config.chunk_size, 10);
        assert_eq!(config.extension, "md");
        assert_eq!(config.bad_files, BadFilePolicy::SkipFile);
        assert_eq!(config.exclude_patterns.len(), 1);

        let err = JobConfig::from_args(parse(&["--base-dir", root, "--files-per", "0"]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidChunkSize { size: 0 }));

        let err = JobConfig::from_args(parse(&["--base-dir", root, "-w", "0"])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidWorkerCount { count: 0, .. }));

        let err =
            JobConfig::from_args(parse(&["--base-dir", root, "--exclude", "("])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidExcludePattern { .. }));

        let err = JobConfig::from_args(parse(&["--base-dir", root, "--name", "a/b"])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidJobName { .. }));
    }

    #[test]
    fn test_missing_input_root() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("absent");
        let err = JobConfig::from_args(parse(&["--base-dir", missing.to_str().unwrap()]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::MissingInputRoot { .. }));
    }

    #[test]
    fn test_output_dir_must_differ_from_log_dir() {
        let dir = tempdir().unwrap();
        let root = dir.path().to_str().unwrap();

        let err = JobConfig::from_args(parse(&[
            "--base-dir",
            root,
            "--output-dir",
            "shards",
            "--log-dir",
            "shards",
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::SharedOutputAndLogDir { .. }));

        let shared = dir.path().join("shared");
        fs::create_dir_all(&shared).unwrap();
        let err = check_distinct_dirs(&shared, &shared.join(".")).unwrap_err();
        assert!(matches!(err, ConfigError::SharedOutputAndLogDir { .. }));

        assert!(check_distinct_dirs(&dir.path().join("out"), &dir.path().join("logs")).is_ok());
    }
}
