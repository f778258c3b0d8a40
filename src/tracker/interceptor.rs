//! The decorating retriever.

use super::DownloadTracker;
use super::instrument::InstrumentedStream;
use crate::error::{DownloadFailure, FailureKind};
use crate::record::DownloadRecord;
use crate::retrieval::{RequestOptions, Response, Retriever};
use crate::types::Event;
use async_trait::async_trait;
use tokio::time::Instant;

/// A tracked request, resolved against the running session
#[derive(Clone, Debug)]
pub(crate) struct TrackedRequest {
    pub(crate) name: String,
    pub(crate) critical: bool,
    pub(crate) generation: u64,
}

/// Retriever decorator that instruments tracked downloads
///
/// Has the same error type as the wrapped retriever, and hands every error back
/// unchanged. Untracked URLs, and every URL while no session is running, go
/// straight to the wrapped retriever.
///
/// A tracked URL answered with a non-success status, or without a body, is
/// passed through too and never gets a record. If that URL is critical the gate
/// stays in [`GateState::Waiting`](crate::GateState::Waiting), so hosts should
/// bound [`wait_for_completion`](DownloadTracker::wait_for_completion) with a
/// timeout and call [`stop_tracking`](DownloadTracker::stop_tracking) when it expires.
pub struct TrackingRetriever<R> {
    inner: R,
    tracker: DownloadTracker,
}

impl<R> TrackingRetriever<R> {
    pub(crate) fn new(inner: R, tracker: DownloadTracker) -> Self {
        Self { inner, tracker }
    }

    /// The wrapped retriever
    pub fn inner(&self) -> &R {
        &self.inner
    }

    /// The tracker this retriever reports to
    pub fn tracker(&self) -> &DownloadTracker {
        &self.tracker
    }

    /// Unwrap, returning the original retriever
    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: std::fmt::Debug> std::fmt::Debug for TrackingRetriever<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackingRetriever")
            .field("inner", &self.inner)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl<R: Retriever> Retriever for TrackingRetriever<R> {
    type Error = R::Error;

    async fn retrieve(
        &self,
        url: &str,
        options: &RequestOptions,
    ) -> Result<Response<Self::Error>, Self::Error> {
        let Some(tracked) = self.tracker.classify_active(url) else {
            return self.inner.retrieve(url, options).await;
        };

        tracing::debug!(url = %url, name = %tracked.name, "Downloading tracked file");

        let mut response = match self.inner.retrieve(url, options).await {
            Ok(response) => response,
            Err(error) => {
                self.tracker.on_transport_error(url, &tracked, &error);
                return Err(error);
            }
        };

        if !response.ok() {
            tracing::warn!(
                url = %url,
                name = %tracked.name,
                status = %response.status(),
                "Tracked file returned a non-success status, not instrumenting"
            );
            return Ok(response);
        }

        let Some(body) = response.take_body() else {
            tracing::warn!(url = %url, name = %tracked.name, "Tracked file has no body, not instrumenting");
            return Ok(response);
        };

        if self
            .tracker
            .begin_download(url, &tracked, response.content_length())
        {
            let instrumented =
                InstrumentedStream::new(body, url.to_string(), tracked.generation, self.tracker.clone());
            response.set_body(Box::pin(instrumented));
        } else {
            response.set_body(body);
        }

        Ok(response)
    }
}

impl DownloadTracker {
    /// Classify `url` against the running session
    pub(crate) fn classify_active(&self, url: &str) -> Option<TrackedRequest> {
        let session = self.lock_session();
        if !session.active {
            return None;
        }
        self.registry.classify(url).map(|hit| TrackedRequest {
            name: hit.name().to_string(),
            critical: hit.critical(),
            generation: session.generation,
        })
    }

    /// Create (or reuse) the record for an instrumented response
    ///
    /// Returns false if the session ended while the request was in flight.
    pub(crate) fn begin_download(
        &self,
        url: &str,
        tracked: &TrackedRequest,
        content_length: Option<u64>,
    ) -> bool {
        let started = {
            let mut session = self.lock_session();
            if !session.is_current(tracked.generation) {
                return false;
            }
            let now = Instant::now();
            let record = session.record_or_insert_with(url, || {
                DownloadRecord::new(url, &tracked.name, tracked.critical, content_length, now)
            });
            Event::DownloadStarted {
                url: url.to_string(),
                name: record.name.clone(),
                total_size: record.total_size,
            }
        };

        tracing::info!(
            url = %url,
            name = %tracked.name,
            total_size = ?content_length,
            "Tracking download"
        );
        self.emit(started);
        true
    }

    /// Record a transport failure for a tracked URL
    pub(crate) fn on_transport_error(
        &self,
        url: &str,
        tracked: &TrackedRequest,
        error: &dyn std::fmt::Display,
    ) {
        let claimed = {
            let mut session = self.lock_session();
            if !session.is_current(tracked.generation) {
                return;
            }
            let now = Instant::now();
            let record = session.record_or_insert_with(url, || {
                DownloadRecord::new(url, &tracked.name, tracked.critical, None, now)
            });
            let failure = DownloadFailure::new(FailureKind::Transport, error);
            if !record.mark_error(failure, now) {
                return;
            }
            session.claim_error(url)
        };

        self.publish_report(url, claimed);
        self.wake.notify_one();
    }
}
