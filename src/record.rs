//! Per-resource download state.
//!
//! A [`DownloadRecord`] is created the first time a tracked URL is observed and is
//! only mutated by the stream instrumenter and the transport error handler. All
//! counters move forward only, so interleaved chunk callbacks and aggregator ticks
//! never observe a value going backwards.

use crate::error::DownloadFailure;
use crate::types::DownloadStatus;
use crate::utils::bytes_per_second;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;

/// Number of instantaneous speed samples kept for variance estimation
pub const SPEED_HISTORY_LEN: usize = 10;

/// What a single chunk did to the record
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ChunkOutcome {
    /// Gap since the previous chunk, when it exceeded the stall threshold
    pub stalled_for: Option<Duration>,
}

/// Mutable state of one observed resource
#[derive(Clone, Debug)]
pub struct DownloadRecord {
    /// Resource URL as requested
    pub url: String,
    /// Friendly name from the matching tracked file spec
    pub name: String,
    /// Whether the resource holds the completion gate
    pub critical: bool,
    /// Declared size in bytes (None when unknown or non-positive)
    pub total_size: Option<u64>,
    /// Bytes delivered so far
    pub loaded_bytes: u64,
    /// Number of chunks delivered so far
    pub chunk_count: u64,
    /// Current status
    pub status: DownloadStatus,
    /// Failure details once the record is in [`DownloadStatus::Error`]
    pub failure: Option<DownloadFailure>,
    /// When the record was created
    pub start_time: Instant,
    /// When the last chunk (or terminal event) was observed
    pub last_update_time: Instant,
    /// Time between creation and the last update
    pub elapsed: Duration,
    /// loaded_bytes / elapsed, in bytes per second
    pub average_speed: f64,
    /// Highest instantaneous speed seen, in bytes per second
    pub peak_speed: f64,
    /// Lowest instantaneous speed seen, in bytes per second
    pub min_speed: Option<f64>,
    /// Last [`SPEED_HISTORY_LEN`] instantaneous speed samples
    pub speed_history: VecDeque<f64>,
    /// Number of inter-chunk gaps that exceeded the stall threshold
    pub stall_count: u32,
    /// Bytes delivered since the last aggregator tick
    pub interval_bytes: u64,
    /// Transfer time accumulated since the last aggregator tick
    pub interval_time: Duration,
}

impl DownloadRecord {
    /// Create an in-progress record
    ///
    /// A declared size of zero is treated as unknown.
    pub fn new(
        url: impl Into<String>,
        name: impl Into<String>,
        critical: bool,
        total_size: Option<u64>,
        now: Instant,
    ) -> Self {
        Self {
            url: url.into(),
            name: name.into(),
            critical,
            total_size: total_size.filter(|&size| size > 0),
            loaded_bytes: 0,
            chunk_count: 0,
            status: DownloadStatus::InProgress,
            failure: None,
            start_time: now,
            last_update_time: now,
            elapsed: Duration::ZERO,
            average_speed: 0.0,
            peak_speed: 0.0,
            min_speed: None,
            speed_history: VecDeque::with_capacity(SPEED_HISTORY_LEN),
            stall_count: 0,
            interval_bytes: 0,
            interval_time: Duration::ZERO,
        }
    }

    /// Account for one delivered chunk
    ///
    /// Chunks arriving after the record reached a terminal status are ignored.
    pub fn record_chunk(
        &mut self,
        len: usize,
        now: Instant,
        stall_threshold: Duration,
    ) -> ChunkOutcome {
        if self.status.is_terminal() {
            return ChunkOutcome::default();
        }

        let gap = now.saturating_duration_since(self.last_update_time);
        let mut outcome = ChunkOutcome::default();
        if !stall_threshold.is_zero() && gap > stall_threshold {
            self.stall_count += 1;
            outcome.stalled_for = Some(gap);
        }

        let len = len as u64;
        self.loaded_bytes += len;
        self.chunk_count += 1;
        self.interval_bytes += len;
        self.interval_time += gap;

        let gap_secs = gap.as_secs_f64();
        if gap_secs > 0.0 {
            let instant_speed = len as f64 / gap_secs;
            self.peak_speed = self.peak_speed.max(instant_speed);
            self.min_speed = Some(match self.min_speed {
                Some(min) => min.min(instant_speed),
                None => instant_speed,
            });
            if self.speed_history.len() == SPEED_HISTORY_LEN {
                self.speed_history.pop_front();
            }
            self.speed_history.push_back(instant_speed);
        }

        self.touch(now);
        outcome
    }

    /// Transition to [`DownloadStatus::Loaded`]
    ///
    /// Returns false if the record was already terminal.
    pub fn mark_loaded(&mut self, now: Instant) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = DownloadStatus::Loaded;
        self.touch(now);
        true
    }

    /// Transition to [`DownloadStatus::Error`], keeping the bytes already counted
    ///
    /// Returns false if the record was already terminal.
    pub fn mark_error(&mut self, failure: DownloadFailure, now: Instant) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = DownloadStatus::Error;
        self.failure = Some(failure);
        self.touch(now);
        true
    }

    /// Progress percentage, or None when the declared size is unknown
    pub fn percent(&self) -> Option<f64> {
        self.total_size
            .map(|total| self.loaded_bytes as f64 / total as f64 * 100.0)
    }

    /// Population variance of the speed history (None with fewer than two samples)
    pub fn speed_variance(&self) -> Option<f64> {
        if self.speed_history.len() < 2 {
            return None;
        }
        let n = self.speed_history.len() as f64;
        let mean = self.speed_history.iter().sum::<f64>() / n;
        let variance = self
            .speed_history
            .iter()
            .map(|speed| (speed - mean).powi(2))
            .sum::<f64>()
            / n;
        Some(variance)
    }

    /// Coefficient of variation of the speed history (stddev / mean)
    ///
    /// Values near zero mean a steady transfer; values above 1.0 mean the speed
    /// swings by more than its own average.
    pub fn speed_variation(&self) -> Option<f64> {
        let variance = self.speed_variance()?;
        let mean = self.speed_history.iter().sum::<f64>() / self.speed_history.len() as f64;
        if mean > 0.0 {
            Some(variance.sqrt() / mean)
        } else {
            None
        }
    }

    /// Take and reset the per-interval counters
    pub fn take_interval(&mut self) -> (u64, Duration) {
        let taken = (self.interval_bytes, self.interval_time);
        self.interval_bytes = 0;
        self.interval_time = Duration::ZERO;
        taken
    }

    fn touch(&mut self, now: Instant) {
        self.last_update_time = now;
        self.elapsed = now.saturating_duration_since(self.start_time);
        self.average_speed = bytes_per_second(self.loaded_bytes, self.elapsed);
    }
}
