//! Configuration parsing for the listsync demo.
//!
//! Supports:
//! - CLI arguments via clap
//! - Environment variable overrides
//! - Defaults matching the reference workload (3000 records, 6 rounds of 500)

use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use crate::scheduler::WorkloadConfig;
use crate::storage::StoreConfig;

/// Listsync: a live record list under a concurrent bulk-update workload.
#[derive(Parser, Debug, Clone)]
#[command(name = "listsync")]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// Data directory for the SQLite database
    #[arg(short, long, env = "LISTSYNC_DATA_DIR", default_value = "./data")]
    pub data_dir: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "RUST_LOG", default_value = "info")]
    pub log_level: String,

    /// Emit logs as JSON
    #[arg(long, env = "LISTSYNC_LOG_JSON")]
    pub log_json: bool,

    /// Size of the write channel (backpressure control)
    #[arg(long, env = "LISTSYNC_WRITE_CHANNEL_SIZE", default_value_t = 1000)]
    pub write_channel_size: usize,

    /// Size of the reader connection pool
    #[arg(long, env = "LISTSYNC_READER_POOL_SIZE", default_value_t = 10)]
    pub reader_pool_size: u32,

    /// Number of records created when the store is empty
    #[arg(long, env = "LISTSYNC_SEED_COUNT", default_value_t = 3000)]
    pub seed_count: usize,

    /// Number of update rounds
    #[arg(long, env = "LISTSYNC_ROUNDS", default_value_t = 6)]
    pub rounds: u32,

    /// Records updated per round
    #[arg(long, env = "LISTSYNC_BATCH_SIZE", default_value_t = 500)]
    pub batch_size: usize,

    /// Delay before the first round, in milliseconds
    #[arg(long, env = "LISTSYNC_INITIAL_DELAY_MS", default_value_t = 5000)]
    pub initial_delay_ms: u64,

    /// Pause between rounds, in milliseconds
    #[arg(long, env = "LISTSYNC_ROUND_PAUSE_MS", default_value_t = 2000)]
    pub round_pause_ms: u64,

    /// Number of records printed from the final view
    #[arg(long, env = "LISTSYNC_PREVIEW_LINES", default_value_t = 21)]
    pub preview_lines: usize,

    /// Print the preview as JSON lines
    #[arg(long)]
    pub json: bool,

    /// OpenTelemetry collector endpoint for metrics export (optional)
    #[arg(long, env = "OTEL_EXPORTER_OTLP_ENDPOINT")]
    pub otel_endpoint: Option<String>,
}

impl Config {
    /// Parse configuration from CLI arguments and environment.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("listsync.db")
    }

    pub fn store_config(&self) -> StoreConfig {
        StoreConfig {
            write_channel_size: self.write_channel_size,
            reader_pool_size: self.reader_pool_size,
        }
    }

    pub fn workload_config(&self) -> WorkloadConfig {
        WorkloadConfig {
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            rounds: self.rounds,
            batch_size: self.batch_size,
            round_pause: Duration::from_millis(self.round_pause_ms),
        }
    }

    /// Create a configuration for tests: small data set, no waiting.
    pub fn test_config(data_dir: PathBuf) -> Self {
        Self {
            data_dir,
            log_level: "debug".into(),
            seed_count: 100,
            rounds: 2,
            batch_size: 50,
            initial_delay_ms: 0,
            round_pause_ms: 0,
            preview_lines: 5,
            reader_pool_size: 2,
            write_channel_size: 16,
            ..Self::default()
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            log_level: "info".into(),
            log_json: false,
            write_channel_size: 1000,
            reader_pool_size: 10,
            seed_count: 3000,
            rounds: 6,
            batch_size: 500,
            initial_delay_ms: 5000,
            round_pause_ms: 2000,
            preview_lines: 21,
            json: false,
            otel_endpoint: None,
        }
    }
}
