//! Listsync demo: a live record list under a concurrent bulk-update workload.
//!
//! # Usage
//!
//! ```bash
//! listsync --data-dir ./data --seed-count 3000 --rounds 6 --batch-size 500
//! ```
//!
//! Environment variables can also be used:
//! - `LISTSYNC_DATA_DIR`: Data directory for SQLite
//! - `LISTSYNC_ROUNDS`: Number of update rounds
//! - `RUST_LOG`: Log level (trace, debug, info, warn, error)

use listsync::config::Config;
use listsync::demo::run_demo;
use listsync::observability::metrics::init_metrics_with_endpoint;
use listsync::observability::tracing::init_tracing;
use std::fs;
use tokio::sync::watch;

/// Print startup banner with version and configuration.
fn print_banner(config: &Config) {
    let version = env!("CARGO_PKG_VERSION");
    eprintln!(
        r#"
  Listsync v{}

  Configuration:
    Data Dir:   {}
    Seed:       {} records
    Workload:   {} rounds x {} records, {} ms apart
    Log Level:  {}

  Press Ctrl+C to cancel the workload.
"#,
        version,
        config.data_dir.display(),
        config.seed_count,
        config.rounds,
        config.batch_size,
        config.round_pause_ms,
        config.log_level
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse configuration from CLI arguments and environment
    let config = Config::parse_args();

    init_tracing(&config.log_level, config.log_json);
    init_metrics_with_endpoint(config.otel_endpoint.as_deref());

    fs::create_dir_all(&config.data_dir)?;

    print_banner(&config);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Spawn signal handler task
    let shutdown_tx_clone = shutdown_tx.clone();
    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            let mut sigterm =
                signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");

            tokio::select! {
                _ = ctrl_c => {
                    tracing::info!("Received SIGINT (Ctrl+C), initiating shutdown...");
                }
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM, initiating shutdown...");
                }
            }
        }

        #[cfg(not(unix))]
        {
            ctrl_c.await.expect("failed to listen for ctrl+c");
            tracing::info!("Received Ctrl+C, initiating shutdown...");
        }

        let _ = shutdown_tx_clone.send(true);
    });

    let report = run_demo(config, shutdown_rx).await?;

    tracing::info!(
        rounds = report.rounds_completed,
        touched = report.records_touched,
        "Listsync finished"
    );
    Ok(())
}
