//! text-sharder - Parallel, resumable text-to-TFRecord converter
//!
//! Entry point for the CLI application.

use anyhow::{Context, Result};
use clap::Parser;
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use text_sharder::config::{CliArgs, Command, JobConfig};
use text_sharder::driver::JobDriver;
use text_sharder::encoder::{Encoder, HfEncoder};
use text_sharder::ledger::ShardLayout;
use text_sharder::normalize::{Normalizer, Passthrough, TextCleaner};
use text_sharder::progress::{format_number, print_header, print_summary, ProgressReporter};
use text_sharder::record::{decode_example, TfRecordReader};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    // Parse CLI arguments
    let args = CliArgs::parse();

    // Setup logging
    setup_logging(args.verbose)?;

    if let Some(Command::Inspect { files, records }) = &args.command {
        return inspect(files, *records);
    }

    // Validate and create config
    let config = JobConfig::from_args(args).context("Invalid configuration")?;

    if config.show_progress {
        print_header(
            &config.input_root.display().to_string(),
            config.worker_count,
            config.chunk_size,
            &config.output_dir.display().to_string(),
        );
    }

    convert(config)
}

/// Run the conversion job
fn convert(config: JobConfig) -> Result<()> {
    let encoder: Arc<dyn Encoder> = Arc::new(
        HfEncoder::from_path(&config.encoder_path).context("Failed to load encoder")?,
    );
    let normalizer: Arc<dyn Normalizer> = if config.normalize {
        Arc::new(TextCleaner)
    } else {
        Arc::new(Passthrough)
    };

    let layout = ShardLayout::new(&config.output_dir, &config.log_dir, &config.job_name);
    let show_progress = config.show_progress;
    let output_dir = config.output_dir.display().to_string();
    let driver = JobDriver::new(config, encoder, normalizer);

    // Setup signal handler for graceful shutdown
    let shutdown_flag = driver.shutdown_flag();
    ctrlc::set_handler(move || {
        if shutdown_flag.load(Ordering::Relaxed) {
            eprintln!("\nForce shutdown!");
            std::process::exit(130);
        }
        eprintln!("\nShutting down after in-flight chunks... (press Ctrl+C again to force)");
        shutdown_flag.store(true, Ordering::SeqCst);
    })
    .context("Failed to set signal handler")?;

    let progress = show_progress.then(ProgressReporter::new);
    if let Some(ref p) = progress {
        p.set_status("Discovering input files...");
    }

    let result = driver.run_with_progress(|update| {
        if let Some(ref p) = progress {
            p.update(update);
        }
    });

    let summary = match result {
        Ok(summary) => summary,
        Err(e) => {
            if let Some(ref p) = progress {
                p.finish_and_clear();
            }
            return Err(e).context("Conversion failed");
        }
    };

    if let Some(ref p) = progress {
        if summary.completed {
            p.finish("Conversion completed");
        } else {
            p.finish("Conversion interrupted");
        }
    }

    let output_bytes = (0..summary.total_chunks as usize)
        .filter_map(|i| layout.artifact_path(i).metadata().ok())
        .map(|meta| meta.len())
        .sum();
    print_summary(&summary, &output_dir, Some(output_bytes));

    if !summary.completed {
        info!(
            remaining = summary.remaining_chunks(),
            "Conversion was interrupted before completion"
        );
    }

    Ok(())
}

/// Verify record files and print their record counts
fn inspect(files: &[PathBuf], show_records: bool) -> Result<()> {
    let mut total_records = 0u64;

    for path in files {
        let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;

        let mut records = 0u64;
        let mut tokens = 0u64;
        for frame in TfRecordReader::new(BufReader::new(file)) {
            let frame = frame.with_context(|| format!("Corrupt record file {}", path.display()))?;
            let record = decode_example(&frame)
                .with_context(|| format!("Bad record {} in {}", records, path.display()))?;

            if show_records {
                println!("  {}\t{} tokens", record.id_str(), record.tokens.len());
            }
            records += 1;
            tokens += record.tokens.len() as u64;
        }

        println!(
            "{}: {} records, {} tokens",
            path.display(),
            format_number(records),
            format_number(tokens)
        );
        total_records += records;
    }

    if files.len() > 1 {
        println!("total: {} records", format_number(total_records));
    }
    Ok(())
}

fn setup_logging(verbose: bool) -> Result<()> {
    let filter = if verbose {
        EnvFilter::new("text_sharder=debug,warn")
    } else {
        EnvFilter::new("text_sharder=info,warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    Ok(())
}
