//! Scheduled withdrawal sweeper
//!
//! Periodically settles scheduled withdrawals whose time has come. Each due
//! withdrawal is processed independently; a failure on one never stops the
//! rest of the run. Nothing is returned to a caller: outcomes live on the
//! withdrawal records and in the logs.

use super::clock::Clock;
use super::orchestrator::{SettlementOutcome, WithdrawalOrchestrator};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Per-run counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepSummary {
    pub due: usize,
    pub settled: usize,
    pub failed: usize,
    pub skipped: usize,
}

pub struct ScheduledWithdrawalSweeper {
    orchestrator: Arc<WithdrawalOrchestrator>,
    interval: Duration,
}

impl ScheduledWithdrawalSweeper {
    pub fn new(orchestrator: Arc<WithdrawalOrchestrator>, interval: Duration) -> Self {
        Self {
            orchestrator,
            interval,
        }
    }

    /// Process every withdrawal due at the current business time
    pub async fn process_due_scheduled(&self) {
        let summary = self.sweep().await;
        if summary.due > 0 {
            info!(
                due = summary.due,
                processed = summary.settled,
                failed = summary.failed,
                skipped = summary.skipped,
                "Scheduled withdrawal sweep finished"
            );
        }
    }

    /// One sweep, returning its counters
    pub async fn sweep(&self) -> SweepSummary {
        let now = self.orchestrator.clock().now();
        let due = match self.orchestrator.store().find_due_scheduled(now).await {
            Ok(due) => due,
            Err(e) => {
                error!(error = %e, "Failed to query due scheduled withdrawals");
                return SweepSummary::default();
            }
        };

        let mut summary = SweepSummary {
            due: due.len(),
            ..SweepSummary::default()
        };
        if due.is_empty() {
            return summary;
        }

        info!(
            count = due.len(),
            now = %self.orchestrator.business_time().format(now),
            "Processing due scheduled withdrawals"
        );

        for view in &due {
            match self.orchestrator.process_scheduled(view).await {
                Ok(SettlementOutcome::Settled) => summary.settled += 1,
                Ok(SettlementOutcome::Skipped) => summary.skipped += 1,
                Ok(SettlementOutcome::Rejected { .. } | SettlementOutcome::Failed { .. }) => {
                    summary.failed += 1
                }
                Err(e) => {
                    warn!(
                        withdrawal_id = %view.withdrawal.id,
                        error = %e,
                        "Scheduled withdrawal processed with error"
                    );
                    summary.failed += 1;
                }
            }
        }

        summary
    }

    /// Sweep every `interval` until `shutdown` is cancelled.
    ///
    /// The first sweep runs immediately. A sweep that overruns the interval
    /// delays the next tick instead of bursting.
    pub async fn run(&self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(interval_secs = self.interval.as_secs(), "Scheduled withdrawal sweeper started");
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => self.process_due_scheduled().await,
            }
        }
        info!("Scheduled withdrawal sweeper stopped");
    }
}

impl std::fmt::Debug for ScheduledWithdrawalSweeper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScheduledWithdrawalSweeper")
            .field("interval", &self.interval)
            .finish()
    }
}
