//! Job driver
//!
//! Discovers inputs, cuts them into chunks, and runs the chunk processor
//! over a fixed pool of threads:
//!
//! ```text
//!                 ┌──────────────┐
//!   chunks ──────▶│  dispatcher  │  stops on failure or Ctrl-C
//!                 └──────┬───────┘
//!                        │ bounded queue
//!          ┌─────────────┼─────────────┐
//!          ▼             ▼             ▼
//!     ┌─────────┐   ┌─────────┐   ┌─────────┐
//!     │ shard-0 │   │ shard-1 │   │ shard-N │
//!     └────┬────┘   └────┬────┘   └────┬────┘
//!          └─────────────┼─────────────┘
//!                        ▼ reports, completion order
//!                 ┌──────────────┐
//!                 │ coordinator  │──▶ JobSummary, last_run.json
//!                 └──────────────┘
//! ```

mod coordinator;
mod worker;

pub use coordinator::{JobDriver, JobProgress, JobSummary, RunRecord, RUN_SUMMARY_FILE};
pub use worker::{ChunkReport, WorkerStats};
