//! Exactly-once per-resource reports and event fan-out.

use super::DownloadTracker;
use super::session::SessionState;
use crate::types::{DownloadStatus, Event, FileStats, ReportOutcome};
use std::sync::PoisonError;

impl SessionState {
    /// Claim the success report for `url`
    ///
    /// Returns the event to emit, or why nothing should be emitted.
    pub(crate) fn claim_success(&mut self, url: &str) -> Result<Event, ReportOutcome> {
        let record = self.records.get(url).ok_or(ReportOutcome::Unknown)?;
        if !self.reported_successes.insert(url.to_string()) {
            return Err(ReportOutcome::Duplicate);
        }
        Ok(Event::FileCompleted {
            file: FileStats::from_record(record),
        })
    }

    /// Claim the failure report for `url`
    pub(crate) fn claim_error(&mut self, url: &str) -> Result<Event, ReportOutcome> {
        let record = self.records.get(url).ok_or(ReportOutcome::Unknown)?;
        if !self.reported_errors.insert(url.to_string()) {
            return Err(ReportOutcome::Duplicate);
        }
        Ok(Event::FileFailed {
            file: FileStats::from_record(record),
        })
    }

    /// Claim reports for every terminal record not yet reported
    pub(crate) fn claim_outstanding(&mut self) -> Vec<Event> {
        let pending: Vec<(String, DownloadStatus)> = self
            .records_in_order()
            .map(|record| (record.url.clone(), record.status))
            .collect();

        pending
            .into_iter()
            .filter_map(|(url, status)| match status {
                DownloadStatus::Loaded => self.claim_success(&url).ok(),
                DownloadStatus::Error => self.claim_error(&url).ok(),
                DownloadStatus::InProgress => None,
            })
            .collect()
    }
}

impl DownloadTracker {
    /// Report a resource's success once
    ///
    /// Later calls for the same URL are silent no-ops until the session is torn down.
    pub(crate) fn report_success(&self, url: &str) -> ReportOutcome {
        let claimed = self.lock_session().claim_success(url);
        self.publish_report(url, claimed)
    }

    /// Report a resource's failure once
    pub(crate) fn report_error(&self, url: &str) -> ReportOutcome {
        let claimed = self.lock_session().claim_error(url);
        self.publish_report(url, claimed)
    }

    /// Emit a claimed report, or trace the suppressed one
    pub(crate) fn publish_report(
        &self,
        url: &str,
        claimed: Result<Event, ReportOutcome>,
    ) -> ReportOutcome {
        match claimed {
            Ok(event) => {
                self.log_report(&event);
                self.emit(event);
                ReportOutcome::Reported
            }
            Err(outcome) => {
                tracing::trace!(url = %url, outcome = ?outcome, "Report suppressed");
                outcome
            }
        }
    }

    /// Emit reports already claimed under the session lock
    pub(crate) fn publish_claimed(&self, events: Vec<Event>) {
        for event in events {
            self.log_report(&event);
            self.emit(event);
        }
    }

    fn log_report(&self, event: &Event) {
        match event {
            Event::FileCompleted { file } => {
                tracing::info!(
                    url = %file.url,
                    name = %file.name,
                    bytes = file.loaded_bytes,
                    elapsed_secs = file.elapsed_secs,
                    speed_bps = file.average_speed_bps,
                    "Finished downloading file"
                );
            }
            Event::FileFailed { file } => {
                tracing::error!(
                    url = %file.url,
                    name = %file.name,
                    bytes = file.loaded_bytes,
                    error = %file.failure.as_ref().map(|f| f.to_string()).unwrap_or_default(),
                    "Error downloading file"
                );
            }
            _ => {}
        }
    }

    /// Deliver an event to every sink and to broadcast subscribers
    ///
    /// Must be called without the session lock held.
    pub(crate) fn emit(&self, event: Event) {
        let sinks = self
            .sinks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if !sinks.is_empty() {
            let properties = event.properties();
            for sink in &sinks {
                sink.emit(event.name(), &properties);
            }
        }

        // No subscribers is fine
        self.event_tx.send(event).ok();
    }
}
