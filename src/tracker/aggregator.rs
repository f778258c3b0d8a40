//! Periodic progress reporting and completion gate evaluation.

use super::DownloadTracker;
use crate::types::{Event, FinishReason, GateState};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// What a gate evaluation decided
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum TickOutcome {
    /// Keep the session running
    Continue,
    /// The session was torn down (or was already gone)
    Finished,
}

/// Spawn the aggregator task for one session
///
/// The task ticks every `report_interval`. Each terminal download transition wakes
/// it early for an immediate evaluation and restarts the interval.
pub(crate) fn spawn_aggregator(
    handle: &tokio::runtime::Handle,
    tracker: DownloadTracker,
    generation: u64,
    cancel_token: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    handle.spawn(async move {
        let period = tracker.config.report_interval;
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let wake = tracker.wake.clone();

        loop {
            let outcome = tokio::select! {
                _ = interval.tick() => tracker.evaluate(generation),
                _ = wake.notified() => {
                    interval.reset();
                    tracker.evaluate(generation)
                }
                _ = cancel_token.cancelled() => break,
            };

            if outcome == TickOutcome::Finished {
                break;
            }
        }

        tracing::debug!(generation, "Progress aggregator stopped");
    })
}

impl DownloadTracker {
    /// Emit one progress report and act on the completion gate
    pub(crate) fn evaluate(&self, generation: u64) -> TickOutcome {
        let (files, gate) = {
            let mut session = self.lock_session();
            if !session.is_current(generation) {
                return TickOutcome::Finished;
            }
            if session.records.is_empty() {
                return TickOutcome::Continue;
            }
            let files = session.snapshot();
            session.reset_intervals();
            let gate = session.evaluate_gate(&self.registry, self.config.abort_policy);
            (files, gate)
        };

        tracing::debug!(files = files.len(), gate = ?gate, "Progress snapshot");
        self.emit(Event::Progress { files });

        match gate {
            GateState::Failed { urls } => {
                tracing::error!(failed = ?urls, "Some files have encountered an error");
                for url in &urls {
                    self.report_error(url);
                }
                let url = urls.into_iter().next().unwrap_or_default();
                let name = self
                    .lock_session()
                    .records
                    .get(&url)
                    .map(|record| record.name.clone())
                    .unwrap_or_default();
                self.finish_session(generation, FinishReason::Failed { url, name });
                TickOutcome::Finished
            }
            GateState::Open => {
                tracing::info!("All tracked files have finished downloading");
                self.finish_session(generation, FinishReason::AllLoaded);
                TickOutcome::Finished
            }
            GateState::Waiting { missing } => {
                tracing::debug!(missing = ?missing, "Waiting for all tracked files to appear");
                TickOutcome::Continue
            }
            GateState::Downloading { in_progress } => {
                tracing::debug!(in_progress, "Tracked files still downloading");
                TickOutcome::Continue
            }
        }
    }
}
