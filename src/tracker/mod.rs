//! Download tracker implementation split into focused submodules.
//!
//! The `DownloadTracker` struct and its methods are organized by concern:
//! - [`session`] - Shared per-session state and the completion gate
//! - [`reporting`] - Exactly-once reports and event fan-out
//! - [`instrument`] - Counting pass-through over response bodies
//! - [`interceptor`] - The decorating retriever
//! - [`aggregator`] - Periodic progress reports and gate evaluation
//! - [`lifecycle`] - Session start, teardown and completion waiting
//! - [`stats`] - Session and per-file statistics

mod aggregator;
mod instrument;
mod interceptor;
mod lifecycle;
mod reporting;
mod session;
mod stats;

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

pub use instrument::InstrumentedStream;
pub use interceptor::TrackingRetriever;

use crate::config::TrackerConfig;
use crate::error::Result;
use crate::network_quality::ConnectionHints;
use crate::registry::TrackedFileRegistry;
use crate::retrieval::Retriever;
use crate::sink::EventSink;
use crate::types::{Event, SessionOutcome};
use session::SessionState;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use tokio::sync::{Notify, broadcast, watch};

/// Download progress tracker (cloneable - all fields are Arc-wrapped)
///
/// Create one per host, [`wrap`](DownloadTracker::wrap) the retriever the host uses
/// for its downloads, then call [`start_tracking`](DownloadTracker::start_tracking).
/// Outside a session every wrapped retriever is a pure pass-through.
#[derive(Clone)]
pub struct DownloadTracker {
    /// Static configuration
    pub(crate) config: Arc<TrackerConfig>,
    /// Suffix table built from the configuration
    pub(crate) registry: Arc<TrackedFileRegistry>,
    /// Shared session state (short, non-awaiting critical sections only)
    pub(crate) session: Arc<Mutex<SessionState>>,
    /// Event broadcast channel sender (multiple subscribers supported)
    pub(crate) event_tx: broadcast::Sender<Event>,
    /// Registered analytics sinks
    pub(crate) sinks: Arc<RwLock<Vec<Arc<dyn EventSink>>>>,
    /// Last session outcome, None while a session is running
    pub(crate) completion_tx: Arc<watch::Sender<Option<SessionOutcome>>>,
    /// Wakes the aggregator for an immediate evaluation
    pub(crate) wake: Arc<Notify>,
    /// Connection hints for the final network assessment
    pub(crate) connection_hints: Arc<Mutex<Option<ConnectionHints>>>,
}

impl DownloadTracker {
    /// Create a tracker from a validated configuration
    pub fn new(config: TrackerConfig) -> Result<Self> {
        config.validate()?;

        let (event_tx, _rx) = broadcast::channel(config.event_channel_capacity);
        let (completion_tx, _rx) = watch::channel(None);
        let registry = TrackedFileRegistry::new(config.tracked_files.clone());
        let connection_hints = config.connection_hints.clone();

        Ok(Self {
            config: Arc::new(config),
            registry: Arc::new(registry),
            session: Arc::new(Mutex::new(SessionState::default())),
            event_tx,
            sinks: Arc::new(RwLock::new(Vec::new())),
            completion_tx: Arc::new(completion_tx),
            wake: Arc::new(Notify::new()),
            connection_hints: Arc::new(Mutex::new(connection_hints)),
        })
    }

    /// Decorate a retriever so tracked downloads are instrumented
    pub fn wrap<R: Retriever>(&self, retriever: R) -> TrackingRetriever<R> {
        TrackingRetriever::new(retriever, self.clone())
    }

    /// Subscribe to tracker events
    ///
    /// Slow subscribers may miss events once the channel capacity is exceeded.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Register an analytics sink
    pub fn add_sink(&self, sink: impl EventSink + 'static) {
        self.sinks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(sink));
    }

    /// Register an analytics sink already shared elsewhere
    pub fn add_shared_sink(&self, sink: Arc<dyn EventSink>) {
        self.sinks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(sink);
    }

    /// Builder-style [`add_sink`](DownloadTracker::add_sink)
    pub fn with_sink(self, sink: impl EventSink + 'static) -> Self {
        self.add_sink(sink);
        self
    }

    /// Replace the connection hints used for the final network assessment
    pub fn set_connection_hints(&self, hints: Option<ConnectionHints>) {
        *self
            .connection_hints
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = hints;
    }

    /// The configuration this tracker was built with
    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// The tracked file registry
    pub fn registry(&self) -> &TrackedFileRegistry {
        &self.registry
    }

    pub(crate) fn lock_session(&self) -> MutexGuard<'_, SessionState> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for DownloadTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadTracker")
            .field("config", &self.config)
            .field("active", &self.is_active())
            .finish_non_exhaustive()
    }
}
