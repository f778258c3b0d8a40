//! Core types for fetch-tracker: statuses, statistics and events

use crate::error::DownloadFailure;
use crate::network_quality::NetworkAssessment;
use crate::record::DownloadRecord;
use crate::utils::{format_mib, format_percent, format_seconds, format_size, format_speed};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Download status of a tracked resource
///
/// `Loaded` and `Error` are terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadStatus {
    /// Bytes are still arriving
    InProgress,
    /// The body stream ended normally
    Loaded,
    /// Retrieval or the body stream failed
    Error,
}

impl DownloadStatus {
    /// Whether no further transitions are possible
    pub fn is_terminal(self) -> bool {
        !matches!(self, DownloadStatus::InProgress)
    }
}

/// Result of a per-resource report attempt
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReportOutcome {
    /// The event was emitted
    Reported,
    /// The resource was already reported; nothing was emitted
    Duplicate,
    /// No record exists for the URL
    Unknown,
}

/// State of the completion gate
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum GateState {
    /// Some critical resources have not been observed yet
    Waiting {
        /// Names of the critical resources not observed yet
        missing: Vec<String>,
    },
    /// Every critical resource is present but some downloads are still running
    Downloading {
        /// Number of records still in progress
        in_progress: usize,
    },
    /// Every critical resource is present and every record is loaded
    Open,
    /// A failure aborted the session
    Failed {
        /// URLs of the failed resources that abort the session
        urls: Vec<String>,
    },
}

/// Point-in-time statistics for one tracked resource
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FileStats {
    /// Resource URL
    pub url: String,
    /// Friendly name
    pub name: String,
    /// Whether the resource holds the completion gate
    pub critical: bool,
    /// Current status
    pub status: DownloadStatus,
    /// Declared size in bytes, if known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_size: Option<u64>,
    /// Bytes delivered so far
    pub loaded_bytes: u64,
    /// Progress percentage, if the size is known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub percent: Option<f64>,
    /// Progress label: percentage with two decimals, or "Unknown"
    pub progress: String,
    /// Seconds between the first observation and the last update
    pub elapsed_secs: f64,
    /// Average speed in bytes per second
    pub average_speed_bps: u64,
    /// Peak instantaneous speed in bytes per second
    pub peak_speed_bps: u64,
    /// Lowest instantaneous speed in bytes per second
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_speed_bps: Option<u64>,
    /// Bytes delivered since the last progress report
    pub interval_bytes: u64,
    /// Speed over the current reporting interval in bytes per second
    pub interval_speed_bps: u64,
    /// Number of detected stalls
    pub stall_count: u32,
    /// Coefficient of variation of recent speed samples
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed_variation: Option<f64>,
    /// Failure details, when the status is `Error`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<DownloadFailure>,
}

impl FileStats {
    /// Snapshot a record
    pub fn from_record(record: &DownloadRecord) -> Self {
        let percent = record.percent();
        Self {
            url: record.url.clone(),
            name: record.name.clone(),
            critical: record.critical,
            status: record.status,
            total_size: record.total_size,
            loaded_bytes: record.loaded_bytes,
            percent,
            progress: format_percent(percent),
            elapsed_secs: record.elapsed.as_secs_f64(),
            average_speed_bps: record.average_speed.round() as u64,
            peak_speed_bps: record.peak_speed.round() as u64,
            min_speed_bps: record.min_speed.map(|speed| speed.round() as u64),
            interval_bytes: record.interval_bytes,
            interval_speed_bps: crate::utils::bytes_per_second(
                record.interval_bytes,
                record.interval_time,
            )
            .round() as u64,
            stall_count: record.stall_count,
            speed_variation: record.speed_variation(),
            failure: record.failure.clone(),
        }
    }

    fn insert_summary(&self, props: &mut Map<String, Value>) {
        props.insert("Resource".into(), Value::from(self.url.clone()));
        props.insert("Name".into(), Value::from(self.name.clone()));
        props.insert("Full_size".into(), Value::from(format_size(self.total_size)));
        props.insert("Downloaded".into(), Value::from(format_mib(self.loaded_bytes)));
        props.insert(
            "Speed".into(),
            Value::from(format_speed(self.average_speed_bps as f64)),
        );
        props.insert("Time".into(), Value::from(format_secs(self.elapsed_secs)));
    }
}

fn format_secs(secs: f64) -> String {
    format_seconds(std::time::Duration::from_secs_f64(secs.max(0.0)))
}

/// Aggregate statistics for the current session
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionStats {
    /// Whether a session is currently tracking
    pub active: bool,
    /// Number of observed tracked resources
    pub tracked_files: usize,
    /// Resources that finished loading
    pub completed: usize,
    /// Resources that failed
    pub failed: usize,
    /// Resources still downloading
    pub in_progress: usize,
    /// Sum of declared sizes; None if any observed size is unknown
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_bytes: Option<u64>,
    /// Sum of delivered bytes
    pub loaded_bytes: u64,
    /// Overall progress percentage, if every size is known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overall_percent: Option<f64>,
    /// Seconds since the session started
    pub elapsed_secs: f64,
    /// Delivered bytes divided by session time, in bytes per second
    pub average_speed_bps: u64,
    /// Total number of detected stalls
    pub stall_count: u32,
    /// Current gate state
    pub gate: GateState,
}

/// Why a session finished
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum FinishReason {
    /// Every critical resource was observed and every record loaded
    AllLoaded,
    /// A failed resource aborted the session
    Failed {
        /// URL of the first failed resource
        url: String,
        /// Friendly name of the first failed resource
        name: String,
    },
    /// The host stopped tracking before the gate opened
    Stopped,
}

impl FinishReason {
    /// Short label used in analytics properties
    pub fn label(&self) -> &'static str {
        match self {
            FinishReason::AllLoaded => "all_loaded",
            FinishReason::Failed { .. } => "failed",
            FinishReason::Stopped => "stopped",
        }
    }
}

/// Final report of a tracking session
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionOutcome {
    /// Whether the gate opened without a fatal failure
    pub success: bool,
    /// Why the session finished
    pub reason: FinishReason,
    /// Aggregate statistics at teardown
    pub stats: SessionStats,
    /// Per-resource statistics at teardown
    pub files: Vec<FileStats>,
    /// Network quality assessment
    pub network: NetworkAssessment,
    /// Wall-clock time the session was torn down
    pub finished_at: DateTime<Utc>,
}

/// Event emitted by the tracker
///
/// Events are delivered to every registered [`EventSink`](crate::EventSink) under
/// their analytics [`name`](Event::name) and to broadcast subscribers as values.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A tracked resource started downloading
    DownloadStarted {
        /// Resource URL
        url: String,
        /// Friendly name
        name: String,
        /// Declared size in bytes, if known
        #[serde(skip_serializing_if = "Option::is_none")]
        total_size: Option<u64>,
    },

    /// Periodic aggregate progress
    Progress {
        /// Snapshot of every tracked resource
        files: Vec<FileStats>,
    },

    /// A tracked resource finished loading
    FileCompleted {
        /// Final statistics of the resource
        file: FileStats,
    },

    /// A tracked resource failed
    FileFailed {
        /// Statistics of the resource at the time of failure
        file: FileStats,
    },

    /// A gap between chunks exceeded the stall threshold
    Stalled {
        /// Resource URL
        url: String,
        /// Friendly name
        name: String,
        /// Length of the gap in milliseconds
        stalled_for_ms: u64,
        /// Stalls detected so far on this resource
        stall_count: u32,
    },

    /// The session was torn down
    SessionFinished {
        /// Final report
        outcome: Box<SessionOutcome>,
    },
}

impl Event {
    /// Analytics event name
    pub fn name(&self) -> &'static str {
        match self {
            Event::DownloadStarted { .. } => "Client_Download_Started",
            Event::Progress { .. } => "Client_Download",
            Event::FileCompleted { .. } => "Client_Download_Full",
            Event::FileFailed { .. } => "Client_Download_Error",
            Event::Stalled { .. } => "Client_Download_Stall",
            Event::SessionFinished { .. } => "Client_Download_Full_All",
        }
    }

    /// Flat analytics properties
    pub fn properties(&self) -> Map<String, Value> {
        let mut props = Map::new();
        match self {
            Event::DownloadStarted {
                url,
                name,
                total_size,
            } => {
                props.insert("Resource".into(), Value::from(url.clone()));
                props.insert("Name".into(), Value::from(name.clone()));
                props.insert("Full_size".into(), Value::from(format_size(*total_size)));
            }
            Event::Progress { files } => {
                for file in files {
                    props.insert(
                        format!("Full_size_{}", file.name),
                        Value::from(format_size(file.total_size)),
                    );
                    props.insert(
                        format!("Downloaded_{}", file.name),
                        Value::from(format_mib(file.loaded_bytes)),
                    );
                    props.insert(
                        format!("Progress_{}", file.name),
                        Value::from(file.progress.clone()),
                    );
                    props.insert(
                        format!("Time_{}", file.name),
                        Value::from(format_secs(file.elapsed_secs)),
                    );
                    props.insert(
                        format!("Speed_{}", file.name),
                        Value::from(format_speed(file.average_speed_bps as f64)),
                    );
                }
            }
            Event::FileCompleted { file } => file.insert_summary(&mut props),
            Event::FileFailed { file } => {
                file.insert_summary(&mut props);
                if let Some(failure) = &file.failure {
                    props.insert("Error".into(), Value::from(failure.to_string()));
                }
            }
            Event::Stalled {
                url,
                name,
                stalled_for_ms,
                stall_count,
            } => {
                props.insert("Resource".into(), Value::from(url.clone()));
                props.insert("Name".into(), Value::from(name.clone()));
                props.insert("Stall_ms".into(), Value::from(*stalled_for_ms));
                props.insert("Stall_count".into(), Value::from(*stall_count));
            }
            Event::SessionFinished { outcome } => {
                let stats = &outcome.stats;
                props.insert("Success".into(), Value::from(outcome.success));
                props.insert("Reason".into(), Value::from(outcome.reason.label()));
                props.insert("Files".into(), Value::from(outcome.files.len()));
                props.insert("Full_size".into(), Value::from(format_size(stats.total_bytes)));
                props.insert("Downloaded".into(), Value::from(format_mib(stats.loaded_bytes)));
                props.insert(
                    "Speed".into(),
                    Value::from(format_speed(stats.average_speed_bps as f64)),
                );
                props.insert("Time".into(), Value::from(format_secs(stats.elapsed_secs)));
                props.insert(
                    "Network_quality".into(),
                    Value::from(outcome.network.label.as_str()),
                );
                props.insert("Network_score".into(), Value::from(outcome.network.score));
                props.insert(
                    "Finished_at".into(),
                    Value::from(outcome.finished_at.to_rfc3339()),
                );
            }
        }
        props
    }
}
