//! Demo setup and lifecycle.
//!
//! Wires the pieces the way the list application uses them:
//! - Seeds the store if it is empty
//! - Keeps a read session live on its own task
//! - Runs the scheduled update workload on another
//! - Prints the head of the final view

use anyhow::Context;
use std::io::Write;
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::clock::SystemClock;
use crate::config::Config;
use crate::observability::metrics::record_record_count;
use crate::record::{Filter, Record};
use crate::scheduler::{Scheduler, WorkloadOutcome, WorkloadReport};
use crate::session::{ReadSession, WriteSession};
use crate::storage::{RecordStore, SeedOutcome};

/// Run the demo until the workload ends or shutdown is signalled.
///
/// # Arguments
///
/// * `config` - Demo configuration
/// * `shutdown_rx` - Receiver for shutdown signal
pub async fn run_demo(
    config: Config,
    mut shutdown_rx: watch::Receiver<bool>,
) -> anyhow::Result<WorkloadReport> {
    let (store, writer) = RecordStore::open(config.db_path(), &config.store_config())
        .context("failed to open record store")?;

    // Populate if empty
    let mut seeder = WriteSession::new(store.clone());
    match seeder.seed_if_empty(config.seed_count).await? {
        SeedOutcome::Seeded { created, .. } => tracing::info!(created, "Seeded record store"),
        SeedOutcome::AlreadyPopulated { existing } => {
            tracing::info!(existing, "Record store already populated");
        }
    }
    record_record_count(store.count(&Filter::all())?);

    // Live view on its own task
    let mut reader = ReadSession::open(store.clone())?;
    reader.on_change(|session, notice| {
        session.refresh()?;
        let view = session.current_view();
        tracing::debug!(
            version = notice.version,
            changed = notice.changed,
            sections = view.sections.len(),
            records = view.len(),
            "View updated"
        );
        Ok(())
    });
    let observer_cancel = CancellationToken::new();
    let observer = reader.observe(observer_cancel.clone());

    // Scheduled workload
    let scheduler = Scheduler::new(
        WriteSession::new(store.clone()),
        config.workload_config(),
        Arc::new(SystemClock),
    );
    let task = scheduler.spawn();
    let mut progress = task.progress();

    let shutdown = async {
        // A dropped sender means nobody can ask for shutdown any more.
        if shutdown_rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    };
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            () = &mut shutdown => {
                tracing::info!("Shutdown signal received, cancelling workload");
                task.cancel();
                break;
            }
            changed = progress.changed() => {
                if changed.is_err() {
                    break;
                }
                let rounds = *progress.borrow_and_update();
                tracing::debug!(rounds, "Workload progress");
            }
        }
    }

    let report = task.join().await;
    match &report.outcome {
        WorkloadOutcome::Completed => tracing::info!(
            rounds = report.rounds_completed,
            touched = report.records_touched,
            "Workload completed"
        ),
        WorkloadOutcome::Cancelled => tracing::info!(
            rounds = report.rounds_completed,
            "Workload cancelled"
        ),
        WorkloadOutcome::Aborted { round, error } => tracing::error!(
            round,
            error = %error,
            "Workload aborted"
        ),
    }

    observer_cancel.cancel();
    let mut reader = observer.await.context("observer task failed")?;
    reader.refresh()?;

    let lines: Vec<&Record> = reader
        .current_view()
        .records()
        .take(config.preview_lines)
        .collect();
    print_preview(&lines, config.json)?;

    tracing::info!("Shutting down writer thread");
    store.close().await?;
    writer.join()?;

    Ok(report)
}

/// Print `identifier - updated_at` lines, or one JSON object per record.
fn print_preview(records: &[&Record], json: bool) -> anyhow::Result<()> {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    for record in records {
        if json {
            serde_json::to_writer(&mut out, record)?;
            writeln!(out)?;
        } else {
            writeln!(out, "{} - {}", record.identifier(), record.updated_at())?;
        }
    }
    Ok(())
}
