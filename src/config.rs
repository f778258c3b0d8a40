//! Configuration types for fetch-tracker

use crate::error::{Error, Result};
use crate::network_quality::ConnectionHints;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

/// A resource the tracker should instrument
///
/// Matching is done on the URL path with the query string and fragment removed,
/// so `https://cdn.example.com/Build/game.data.br?v=42` matches the suffix `.data.br`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedFileSpec {
    /// URL suffix to match (e.g. ".data.br")
    pub suffix: String,

    /// Friendly name used in events and stats (e.g. "DataFile")
    pub name: String,

    /// Whether the completion gate requires this resource (default: true)
    #[serde(default = "default_true")]
    pub critical: bool,
}

impl TrackedFileSpec {
    /// Create a critical tracked file spec
    pub fn new(suffix: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            suffix: suffix.into(),
            name: name.into(),
            critical: true,
        }
    }

    /// Create a tracked file spec that does not hold the completion gate
    pub fn optional(suffix: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            critical: false,
            ..Self::new(suffix, name)
        }
    }
}

/// Which failed resources abort the whole tracking session
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbortPolicy {
    /// Any resource in error aborts the session, critical or not
    #[default]
    AnyError,
    /// Only a critical resource in error aborts the session; failed optional
    /// resources are reported and then ignored by the gate
    CriticalOnly,
}

/// Main configuration for [`DownloadTracker`](crate::DownloadTracker)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// Resources to instrument (default: `.data.br` as DataFile, `.wasm.br` as WasmFile)
    #[serde(default = "default_tracked_files")]
    pub tracked_files: Vec<TrackedFileSpec>,

    /// Interval between aggregate progress reports, in seconds (default: 10)
    #[serde(
        default = "default_report_interval",
        rename = "report_interval_seconds",
        with = "duration_secs_serde"
    )]
    pub report_interval: Duration,

    /// Gap between chunks after which a stall is counted, in milliseconds (default: 5000)
    ///
    /// Stalls are diagnostic only and never change a download's status.
    #[serde(
        default = "default_stall_threshold",
        rename = "stall_threshold_ms",
        with = "duration_millis_serde"
    )]
    pub stall_threshold: Duration,

    /// Which failures abort the session (default: any error)
    #[serde(default)]
    pub abort_policy: AbortPolicy,

    /// Connection hints reported by the host, used for the final network assessment
    #[serde(default)]
    pub connection_hints: Option<ConnectionHints>,

    /// Capacity of the broadcast event channel (default: 256)
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            tracked_files: default_tracked_files(),
            report_interval: default_report_interval(),
            stall_threshold: default_stall_threshold(),
            abort_policy: AbortPolicy::default(),
            connection_hints: None,
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

impl TrackerConfig {
    /// Parse a configuration from JSON, applying defaults for missing fields
    ///
    /// The result is validated before being returned.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: TrackerConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the configuration for values the tracker cannot work with
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for spec in &self.tracked_files {
            if spec.suffix.trim().is_empty() {
                return Err(Error::config(
                    "tracked_files",
                    format!("tracked file '{}' has an empty suffix", spec.name),
                ));
            }
            if spec.name.trim().is_empty() {
                return Err(Error::config(
                    "tracked_files",
                    format!("tracked file with suffix '{}' has an empty name", spec.suffix),
                ));
            }
            if !seen.insert(spec.suffix.as_str()) {
                return Err(Error::config(
                    "tracked_files",
                    format!("suffix '{}' is listed more than once", spec.suffix),
                ));
            }
        }

        if self.report_interval.is_zero() {
            return Err(Error::config(
                "report_interval_seconds",
                "report interval must be greater than zero",
            ));
        }

        if self.event_channel_capacity == 0 {
            return Err(Error::config(
                "event_channel_capacity",
                "event channel capacity must be greater than zero",
            ));
        }

        Ok(())
    }
}

fn default_tracked_files() -> Vec<TrackedFileSpec> {
    vec![
        TrackedFileSpec::new(".data.br", "DataFile"),
        TrackedFileSpec::new(".wasm.br", "WasmFile"),
    ]
}

fn default_report_interval() -> Duration {
    Duration::from_secs(10)
}

fn default_stall_threshold() -> Duration {
    Duration::from_millis(5000)
}

fn default_event_channel_capacity() -> usize {
    256
}

fn default_true() -> bool {
    true
}

// Duration serialization helper (whole seconds)
mod duration_secs_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// Duration serialization helper (milliseconds)
mod duration_millis_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
