//! Shared per-session state.

use crate::config::AbortPolicy;
use crate::record::DownloadRecord;
use crate::registry::TrackedFileRegistry;
use crate::types::{DownloadStatus, FileStats, GateState};
use std::collections::{HashMap, HashSet};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Everything a tracking session mutates
///
/// Guarded by one `std::sync::Mutex`; every critical section is short and never
/// awaits. Records are kept in observation order so snapshots are stable.
#[derive(Debug, Default)]
pub(crate) struct SessionState {
    /// Whether the interceptor is instrumenting requests
    pub(crate) active: bool,
    /// Incremented on every start; in-flight streams compare against it
    pub(crate) generation: u64,
    /// When the current (or last) session started
    pub(crate) started_at: Option<Instant>,
    /// URL -> record
    pub(crate) records: HashMap<String, DownloadRecord>,
    /// URLs in the order they were first observed
    pub(crate) order: Vec<String>,
    /// URLs whose success has been reported
    pub(crate) reported_successes: HashSet<String>,
    /// URLs whose failure has been reported
    pub(crate) reported_errors: HashSet<String>,
    /// Aggregator cancellation for the current session
    pub(crate) cancel: Option<CancellationToken>,
}

impl SessionState {
    /// Whether `generation` is the running session
    pub(crate) fn is_current(&self, generation: u64) -> bool {
        self.active && self.generation == generation
    }

    /// Begin a new session, returning its generation
    pub(crate) fn begin(&mut self, now: Instant, cancel: CancellationToken) -> u64 {
        self.clear();
        self.generation += 1;
        self.active = true;
        self.started_at = Some(now);
        self.cancel = Some(cancel);
        self.generation
    }

    /// Drop every record and dedup entry
    pub(crate) fn clear(&mut self) {
        self.records.clear();
        self.order.clear();
        self.reported_successes.clear();
        self.reported_errors.clear();
    }

    /// Get the record for `url`, creating it with `create` when absent
    pub(crate) fn record_or_insert_with(
        &mut self,
        url: &str,
        create: impl FnOnce() -> DownloadRecord,
    ) -> &mut DownloadRecord {
        if !self.records.contains_key(url) {
            self.order.push(url.to_string());
        }
        self.records.entry(url.to_string()).or_insert_with(create)
    }

    /// Records in observation order
    pub(crate) fn records_in_order(&self) -> impl Iterator<Item = &DownloadRecord> {
        self.order.iter().filter_map(|url| self.records.get(url))
    }

    /// Snapshot every record in observation order
    pub(crate) fn snapshot(&self) -> Vec<FileStats> {
        self.records_in_order().map(FileStats::from_record).collect()
    }

    /// Reset the per-interval counters of every record
    pub(crate) fn reset_intervals(&mut self) {
        for record in self.records.values_mut() {
            record.take_interval();
        }
    }

    /// Evaluate the completion gate
    ///
    /// Failures are checked first, then presence of every critical resource, then
    /// whether everything observed has loaded. Under [`AbortPolicy::CriticalOnly`]
    /// failed optional resources neither abort the session nor hold the gate.
    pub(crate) fn evaluate_gate(
        &self,
        registry: &TrackedFileRegistry,
        policy: AbortPolicy,
    ) -> GateState {
        let aborts = |record: &DownloadRecord| {
            record.status == DownloadStatus::Error
                && (policy == AbortPolicy::AnyError || record.critical)
        };

        let failed: Vec<String> = self
            .records_in_order()
            .filter(|record| aborts(*record))
            .map(|record| record.url.clone())
            .collect();
        if !failed.is_empty() {
            return GateState::Failed { urls: failed };
        }

        let missing: Vec<String> = registry
            .missing_critical(self.order.iter().map(String::as_str))
            .into_iter()
            .map(|spec| spec.name.clone())
            .collect();
        if !missing.is_empty() {
            return GateState::Waiting { missing };
        }

        let in_progress = self
            .records
            .values()
            .filter(|record| record.status == DownloadStatus::InProgress)
            .count();
        if in_progress > 0 {
            return GateState::Downloading { in_progress };
        }

        GateState::Open
    }
}
