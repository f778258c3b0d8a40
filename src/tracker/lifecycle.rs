//! Session start, teardown and completion waiting.

use super::DownloadTracker;
use super::aggregator;
use crate::error::{DownloadFailure, Error, FailureKind, Result};
use crate::network_quality;
use crate::types::{DownloadStatus, Event, FinishReason, SessionOutcome};
use std::sync::PoisonError;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

impl DownloadTracker {
    /// Start a tracking session
    ///
    /// Wrapped retrievers begin instrumenting tracked URLs and the progress
    /// aggregator starts ticking. Calling this while a session is running does
    /// nothing.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoRuntime`] when called outside a tokio runtime.
    pub fn start_tracking(&self) -> Result<()> {
        let handle = tokio::runtime::Handle::try_current()
            .map_err(|e| Error::NoRuntime(e.to_string()))?;

        let cancel_token = CancellationToken::new();
        let generation = {
            let mut session = self.lock_session();
            if session.active {
                tracing::debug!(generation = session.generation, "Tracking already active");
                return Ok(());
            }
            session.begin(Instant::now(), cancel_token.clone())
        };

        self.completion_tx.send_replace(None);

        tracing::info!(
            generation,
            tracked = ?self
                .registry
                .specs()
                .iter()
                .map(|spec| spec.name.as_str())
                .collect::<Vec<_>>(),
            interval_secs = self.config.report_interval.as_secs(),
            "Download tracking started"
        );

        aggregator::spawn_aggregator(&handle, self.clone(), generation, cancel_token);
        Ok(())
    }

    /// Stop the running session
    ///
    /// Emits the final report and makes every wrapped retriever a pass-through
    /// again. Transfers already in flight keep running; they just stop updating
    /// the tracker. Calling this with no session running does nothing.
    pub fn stop_tracking(&self) {
        let generation = self.lock_session().generation;
        self.finish_session(generation, FinishReason::Stopped);
    }

    /// Whether a session is running
    pub fn is_active(&self) -> bool {
        self.lock_session().active
    }

    /// Wait until the running session finishes and return its final report
    ///
    /// If no session is running, returns the report of the last finished session
    /// immediately, or waits for the next session to finish if there was none.
    pub async fn wait_for_completion(&self) -> Option<SessionOutcome> {
        let mut rx = self.completion_tx.subscribe();
        rx.wait_for(Option::is_some)
            .await
            .ok()
            .and_then(|outcome| outcome.clone())
    }

    /// Tear down session `generation`
    ///
    /// Returns false if that session is not the running one. Only the first
    /// caller for a session gets past the generation check, so the final report
    /// is emitted exactly once.
    pub(crate) fn finish_session(&self, generation: u64, reason: FinishReason) -> bool {
        let (flushed, stats, files, cancel_token) = {
            let mut session = self.lock_session();
            if !session.is_current(generation) {
                return false;
            }
            session.active = false;

            let now = Instant::now();
            let gate = session.evaluate_gate(&self.registry, self.config.abort_policy);

            let unfinished: Vec<String> = session
                .records_in_order()
                .filter(|record| record.status == DownloadStatus::InProgress)
                .map(|record| record.url.clone())
                .collect();
            for url in &unfinished {
                if let Some(record) = session.records.get_mut(url) {
                    let failure = DownloadFailure {
                        kind: FailureKind::Incomplete,
                        message: format!(
                            "tracking stopped after {} bytes",
                            record.loaded_bytes
                        ),
                    };
                    record.mark_error(failure, now);
                }
            }

            let flushed = session.claim_outstanding();
            let stats = self.build_session_stats(&session, gate, now);
            let files = session.snapshot();
            session.clear();
            (flushed, stats, files, session.cancel.take())
        };

        if let Some(token) = cancel_token {
            token.cancel();
        }

        self.publish_claimed(flushed);

        let hints = self
            .connection_hints
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let network = network_quality::assess(stats.average_speed_bps, hints.as_ref());

        let outcome = SessionOutcome {
            success: reason == FinishReason::AllLoaded,
            reason,
            stats,
            files,
            network,
            finished_at: chrono::Utc::now(),
        };

        tracing::info!(
            generation,
            success = outcome.success,
            reason = ?outcome.reason,
            files = outcome.files.len(),
            bytes = outcome.stats.loaded_bytes,
            speed_bps = outcome.stats.average_speed_bps,
            network = %outcome.network.label,
            "Download tracking stopped"
        );
        for recommendation in &outcome.network.recommendations {
            tracing::info!(recommendation = %recommendation, "Network recommendation");
        }

        self.emit(Event::SessionFinished {
            outcome: Box::new(outcome.clone()),
        });
        self.completion_tx.send_replace(Some(outcome));
        true
    }
}
