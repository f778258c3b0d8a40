//! Session and per-file statistics.

use super::DownloadTracker;
use super::session::SessionState;
use crate::types::{DownloadStatus, FileStats, GateState, SessionStats};
use crate::utils::bytes_per_second;
use tokio::time::Instant;

impl DownloadTracker {
    /// Aggregate statistics for the running session
    ///
    /// Outside a session the counters are empty; the last session's numbers are
    /// available from its [`SessionOutcome`](crate::SessionOutcome).
    pub fn get_stats(&self) -> SessionStats {
        let session = self.lock_session();
        let gate = session.evaluate_gate(&self.registry, self.config.abort_policy);
        self.build_session_stats(&session, gate, Instant::now())
    }

    /// Per-file statistics for the running session, in observation order
    pub fn get_detailed_stats(&self) -> Vec<FileStats> {
        self.lock_session().snapshot()
    }

    /// Current state of the completion gate
    pub fn gate_state(&self) -> GateState {
        self.lock_session()
            .evaluate_gate(&self.registry, self.config.abort_policy)
    }

    pub(crate) fn build_session_stats(
        &self,
        session: &SessionState,
        gate: GateState,
        now: Instant,
    ) -> SessionStats {
        let mut completed = 0;
        let mut failed = 0;
        let mut in_progress = 0;
        let mut loaded_bytes = 0u64;
        let mut total_bytes = Some(0u64);
        let mut stall_count = 0u32;

        for record in session.records.values() {
            match record.status {
                DownloadStatus::Loaded => completed += 1,
                DownloadStatus::Error => failed += 1,
                DownloadStatus::InProgress => in_progress += 1,
            }
            loaded_bytes += record.loaded_bytes;
            total_bytes = total_bytes.zip(record.total_size).map(|(sum, size)| sum + size);
            stall_count += record.stall_count;
        }

        if session.records.is_empty() {
            total_bytes = None;
        }

        let overall_percent = total_bytes
            .filter(|&total| total > 0)
            .map(|total| loaded_bytes as f64 / total as f64 * 100.0);

        let elapsed = session
            .started_at
            .map(|start| now.saturating_duration_since(start))
            .unwrap_or_default();

        SessionStats {
            active: session.active,
            tracked_files: session.records.len(),
            completed,
            failed,
            in_progress,
            total_bytes,
            loaded_bytes,
            overall_percent,
            elapsed_secs: elapsed.as_secs_f64(),
            average_speed_bps: bytes_per_second(loaded_bytes, elapsed).round() as u64,
            stall_count,
            gate,
        }
    }
}
