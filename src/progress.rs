//! Progress reporting for conversion runs
//!
//! Provides a chunk progress bar using indicatif and the human-readable
//! header and summary printed around a run.

use crate::driver::{JobProgress, JobSummary};
use console::style;
use humansize::{format_size, BINARY};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Progress reporter that displays chunk status
pub struct ProgressReporter {
    /// Progress bar
    bar: ProgressBar,
}

impl ProgressReporter {
    /// Create a new progress reporter; the length is set on the first update
    pub fn new() -> Self {
        let bar = ProgressBar::new(0);

        let template = "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} chunks {msg}";
        let bar_style = ProgressStyle::default_bar()
            .template(template)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> ")
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏");
        bar.set_style(bar_style);
        bar.enable_steady_tick(Duration::from_millis(100));

        Self { bar }
    }

    /// Update the progress display
    pub fn update(&self, progress: &JobProgress) {
        self.bar.set_length(progress.total_chunks);
        self.bar.set_position(progress.chunks_done);

        let mut msg = format!(
            "| Files: {} | Good: {} | Rate: {:.0}/s",
            format_number(progress.files_done),
            format_number(progress.good_files),
            progress.files_per_second(),
        );
        if progress.chunks_skipped > 0 {
            msg.push_str(&format!(
                " | Resumed: {}",
                format_number(progress.chunks_skipped)
            ));
        }

        self.bar.set_message(msg);
    }

    /// Set a status message
    pub fn set_status(&self, status: &str) {
        self.bar.set_message(status.to_string());
    }

    /// Finish the progress display with a final message
    pub fn finish(&self, message: &str) {
        self.bar.finish_with_message(message.to_string());
    }

    /// Finish and clear the progress display
    pub fn finish_and_clear(&self) {
        self.bar.finish_and_clear();
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

/// Format a number with thousands separators
pub fn format_number(n: u64) -> String {
    let s = n.to_string();
    let bytes: Vec<_> = s.bytes().rev().collect();

    let chunks: Vec<String> = bytes
        .chunks(3)
        .map(|chunk| chunk.iter().rev().map(|&b| b as char).collect::<String>())
        .collect();

    chunks.into_iter().rev().collect::<Vec<_>>().join(",")
}

/// Percentage of `part` in `whole`, 0 when `whole` is 0
fn percent(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 * 100.0 / whole as f64
    }
}

/// Print a summary of the run
pub fn print_summary(summary: &JobSummary, output_dir: &str, output_bytes: Option<u64>) {
    let duration_secs = summary.duration.as_secs_f64();
    let rate = if duration_secs > 0.0 {
        summary.total_files as f64 / duration_secs
    } else {
        0.0
    };

    println!();
    if summary.completed {
        println!("{}", style("Conversion Complete").green().bold());
    } else {
        println!("{}", style("Conversion Interrupted").yellow().bold());
    }
    println!("{}", style("─".repeat(50)).dim());
    println!(
        "  {} {}",
        style("Files:").bold(),
        format_number(summary.total_files)
    );
    println!(
        "  {} {}",
        style("Chunks:").bold(),
        format_number(summary.total_chunks)
    );
    println!(
        "  {} {} / {} ({:.1}%)",
        style("Good files:").bold(),
        format_number(summary.total_good_files()),
        format_number(summary.total_files),
        percent(summary.total_good_files(), summary.total_files)
    );
    if summary.chunks_skipped > 0 {
        println!(
            "  {} {} chunks ({} good files from earlier runs)",
            style("Resumed:").bold(),
            format_number(summary.chunks_skipped),
            format_number(summary.resumed_good_files)
        );
    }
    if summary.skipped_files > 0 {
        println!(
            "  {} {}",
            style("Unreadable:").yellow().bold(),
            format_number(summary.skipped_files)
        );
    }
    if summary.remaining_chunks() > 0 {
        println!(
            "  {} {} chunks",
            style("Remaining:").yellow().bold(),
            format_number(summary.remaining_chunks())
        );
    }
    println!(
        "  {} {:.1}s ({:.0} files/sec)",
        style("Duration:").bold(),
        duration_secs,
        rate
    );
    match output_bytes {
        Some(size) => println!(
            "  {} {} ({})",
            style("Output:").bold(),
            output_dir,
            format_size(size, BINARY)
        ),
        None => println!("  {} {}", style("Output:").bold(), output_dir),
    }
    println!();
}

/// Print a header at the start of the run
pub fn print_header(input: &str, workers: usize, files_per: usize, output: &str) {
    println!();
    println!(
        "{} {}",
        style("text-sharder").cyan().bold(),
        env!("CARGO_PKG_VERSION")
    );
    println!("{}", style("─".repeat(50)).dim());
    println!("  {} {}", style("Source:").bold(), input);
    println!("  {} {}", style("Workers:").bold(), workers);
    println!(
        "  {} {}",
        style("Files/chunk:").bold(),
        format_number(files_per as u64)
    );
    println!("  {} {}", style("Output:").bold(), output);
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(175000), "175,000");
        assert_eq!(format_number(1234567890), "1,234,567,890");
    }

    #[test]
    fn test_percent() {
        assert_eq!(percent(0, 0), 0.0);
        assert!((percent(2, 3) - 66.67).abs() < 0.01);
    }
}
