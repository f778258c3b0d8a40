//! # fetch-tracker
//!
//! Download progress instrumentation and completion gating for async HTTP retrieval.
//!
//! ## Design Philosophy
//!
//! fetch-tracker is designed to be:
//! - **Transparent** - Bytes, headers and errors reach the caller unchanged
//! - **Single-pass** - Bodies are counted as they stream, never buffered
//! - **Exactly-once** - Every tracked resource is reported once, however many paths notice it finishing
//! - **Event-driven** - Hosts register analytics sinks or subscribe to events, no polling required
//!
//! ## Quick Start
//!
//! ```no_run
//! use fetch_tracker::{DownloadTracker, ReqwestRetriever, Retriever, RequestOptions, TrackerConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let tracker = DownloadTracker::new(TrackerConfig::default())?
//!         .with_sink(|name: &str, props: &serde_json::Map<String, serde_json::Value>| {
//!             println!("{name}: {props:?}");
//!         });
//!
//!     let retriever = tracker.wrap(ReqwestRetriever::new()?);
//!     tracker.start_tracking()?;
//!
//!     let options = RequestOptions::default();
//!     let data = retriever.retrieve("https://cdn.example.com/Build/game.data.br", &options);
//!     let wasm = retriever.retrieve("https://cdn.example.com/Build/game.wasm.br", &options);
//!     let (data, wasm) = tokio::try_join!(data, wasm)?;
//!     tokio::try_join!(data.bytes(), wasm.bytes())?;
//!
//!     if let Some(outcome) = tracker.wait_for_completion().await {
//!         println!("success: {}, network: {}", outcome.success, outcome.network.label);
//!     }
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// Network quality assessment
pub mod network_quality;
/// Per-resource download state
pub mod record;
/// Tracked file registry
pub mod registry;
/// The retrieval primitive and its reqwest implementation
pub mod retrieval;
/// Analytics event sinks
pub mod sink;
/// Download tracker implementation (decomposed into focused submodules)
pub mod tracker;
/// Core types and events
pub mod types;
/// Formatting helpers
pub mod utils;

// Re-export commonly used types
pub use config::{AbortPolicy, TrackedFileSpec, TrackerConfig};
pub use error::{DownloadFailure, Error, FailureKind, Result};
pub use network_quality::{
    ConnectionHints, EffectiveConnectionType, NetworkAssessment, QualityLabel,
};
pub use retrieval::{Body, ReqwestRetriever, RequestOptions, Response, Retriever};
pub use sink::{EventSink, LogSink, MemorySink};
pub use tracker::{DownloadTracker, InstrumentedStream, TrackingRetriever};
pub use types::{
    DownloadStatus, Event, FileStats, FinishReason, GateState, ReportOutcome, SessionOutcome,
    SessionStats,
};
