//! Periodic bulk-update workload.
//!
//! After an initial delay the scheduler runs a fixed number of rounds, each
//! one `touch_range` over the next window of `batch_size` records, pausing
//! between rounds. Cancellation is only observed between rounds: a batch
//! that has started always commits or fails as a whole.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::clock::Clock;
use crate::error::StoreError;
use crate::observability::metrics::record_workload_round;
use crate::session::WriteSession;

/// Shape of the scheduled workload.
#[derive(Debug, Clone, Copy)]
pub struct WorkloadConfig {
    /// Wait before the first round
    pub initial_delay: Duration,
    /// Number of rounds to run
    pub rounds: u32,
    /// Records touched per round
    pub batch_size: usize,
    /// Wait between consecutive rounds
    pub round_pause: Duration,
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(5),
            rounds: 6,
            batch_size: 500,
            round_pause: Duration::from_secs(2),
        }
    }
}

/// How a workload ended.
#[derive(Debug)]
pub enum WorkloadOutcome {
    Completed,
    Cancelled,
    /// A round failed; later rounds were skipped.
    Aborted { round: u32, error: StoreError },
}

/// Summary returned when the workload task ends.
#[derive(Debug)]
pub struct WorkloadReport {
    pub rounds_completed: u32,
    pub records_touched: usize,
    pub outcome: WorkloadOutcome,
}

/// Runs the workload against a write session it owns.
pub struct Scheduler {
    session: WriteSession,
    config: WorkloadConfig,
    clock: Arc<dyn Clock>,
}

/// Handle to a running workload.
pub struct ScheduledTask {
    cancel: CancellationToken,
    progress: watch::Receiver<u32>,
    handle: JoinHandle<WorkloadReport>,
}

impl ScheduledTask {
    /// Stop before the next round. A round already running finishes.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Receiver of the number of completed rounds.
    pub fn progress(&self) -> watch::Receiver<u32> {
        self.progress.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the workload to end.
    pub async fn join(self) -> WorkloadReport {
        match self.handle.await {
            Ok(report) => report,
            Err(e) => {
                tracing::error!(error = %e, "Workload task failed");
                WorkloadReport {
                    rounds_completed: *self.progress.borrow(),
                    records_touched: 0,
                    outcome: WorkloadOutcome::Aborted {
                        round: *self.progress.borrow(),
                        error: StoreError::Io(format!("workload task failed: {e}")),
                    },
                }
            }
        }
    }
}

impl Scheduler {
    pub fn new(session: WriteSession, config: WorkloadConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            session,
            config,
            clock,
        }
    }

    /// Start the workload on a new task.
    pub fn spawn(self) -> ScheduledTask {
        self.spawn_with_token(CancellationToken::new())
    }

    /// Start the workload, stopping when `cancel` (or a parent token) fires.
    pub fn spawn_with_token(self, cancel: CancellationToken) -> ScheduledTask {
        let (progress_tx, progress) = watch::channel(0);
        let token = cancel.clone();
        let handle = tokio::spawn(async move { self.run(token, progress_tx).await });
        ScheduledTask {
            cancel,
            progress,
            handle,
        }
    }

    /// Run every round on the current task.
    pub async fn run(
        mut self,
        cancel: CancellationToken,
        progress: watch::Sender<u32>,
    ) -> WorkloadReport {
        let mut report = WorkloadReport {
            rounds_completed: 0,
            records_touched: 0,
            outcome: WorkloadOutcome::Completed,
        };

        if !self.wait(self.config.initial_delay, &cancel).await {
            report.outcome = WorkloadOutcome::Cancelled;
            return report;
        }

        tracing::info!(
            rounds = self.config.rounds,
            batch_size = self.config.batch_size,
            "Workload started"
        );

        for round in 0..self.config.rounds {
            if round > 0 && !self.wait(self.config.round_pause, &cancel).await {
                report.outcome = WorkloadOutcome::Cancelled;
                break;
            }
            if cancel.is_cancelled() {
                report.outcome = WorkloadOutcome::Cancelled;
                break;
            }

            let offset = round as usize * self.config.batch_size;
            match self.session.touch_range(offset, self.config.batch_size).await {
                Ok(receipt) => {
                    report.rounds_completed += 1;
                    report.records_touched += receipt.updated;
                    record_workload_round(receipt.updated);
                    progress.send_replace(report.rounds_completed);
                    tracing::info!(
                        round,
                        offset,
                        updated = receipt.updated,
                        version = receipt.version,
                        "Workload round committed"
                    );
                }
                Err(error) => {
                    tracing::error!(round, offset, error = %error, "Workload round failed, stopping");
                    report.outcome = WorkloadOutcome::Aborted { round, error };
                    break;
                }
            }
        }

        if matches!(report.outcome, WorkloadOutcome::Cancelled) {
            tracing::info!(rounds_completed = report.rounds_completed, "Workload cancelled");
        }
        report
    }

    /// Sleep unless cancelled first. Returns `false` on cancellation.
    async fn wait(&self, duration: Duration, cancel: &CancellationToken) -> bool {
        if duration.is_zero() {
            return !cancel.is_cancelled();
        }
        tokio::select! {
            biased;
            () = cancel.cancelled() => false,
            () = self.clock.sleep(duration) => true,
        }
    }
}
