//! Counting pass-through over a response body.

use super::DownloadTracker;
use crate::error::{DownloadFailure, FailureKind};
use crate::retrieval::Body;
use crate::types::Event;
use bytes::Bytes;
use futures::Stream;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::time::Instant;

/// Speed variation above which a finished download is logged as unstable
const UNSTABLE_SPEED_VARIATION: f64 = 1.0;

/// A response body that updates its download record as chunks pass through
///
/// Chunks are forwarded unchanged and never buffered. The stream belongs to the
/// session that created it: once that session is torn down it keeps delivering
/// bytes but stops touching tracker state.
pub struct InstrumentedStream<E> {
    inner: Body<E>,
    url: String,
    generation: u64,
    tracker: DownloadTracker,
    finished: bool,
}

impl<E> InstrumentedStream<E> {
    pub(crate) fn new(inner: Body<E>, url: String, generation: u64, tracker: DownloadTracker) -> Self {
        Self {
            inner,
            url,
            generation,
            tracker,
            finished: false,
        }
    }
}

impl<E: std::fmt::Display> Stream for InstrumentedStream<E> {
    type Item = Result<Bytes, E>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        match this.inner.as_mut().poll_next(cx) {
            Poll::Ready(Some(Ok(chunk))) => {
                if !this.finished {
                    this.tracker.on_chunk(&this.url, this.generation, chunk.len());
                }
                Poll::Ready(Some(Ok(chunk)))
            }
            Poll::Ready(Some(Err(error))) => {
                if !this.finished {
                    this.finished = true;
                    this.tracker
                        .on_stream_error(&this.url, this.generation, &error);
                }
                Poll::Ready(Some(Err(error)))
            }
            Poll::Ready(None) => {
                if !this.finished {
                    this.finished = true;
                    this.tracker.on_stream_end(&this.url, this.generation);
                }
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl DownloadTracker {
    pub(crate) fn on_chunk(&self, url: &str, generation: u64, len: usize) {
        let stall = {
            let mut session = self.lock_session();
            if !session.is_current(generation) {
                return;
            }
            let Some(record) = session.records.get_mut(url) else {
                return;
            };
            let outcome = record.record_chunk(len, Instant::now(), self.config.stall_threshold);
            outcome.stalled_for.map(|gap| Event::Stalled {
                url: record.url.clone(),
                name: record.name.clone(),
                stalled_for_ms: gap.as_millis() as u64,
                stall_count: record.stall_count,
            })
        };

        if let Some(event) = stall {
            if let Event::Stalled {
                name,
                stalled_for_ms,
                stall_count,
                ..
            } = &event
            {
                tracing::warn!(
                    url = %url,
                    name = %name,
                    stalled_for_ms,
                    stall_count,
                    "Download stalled"
                );
            }
            self.emit(event);
        }
    }

    pub(crate) fn on_stream_end(&self, url: &str, generation: u64) {
        let claimed = {
            let mut session = self.lock_session();
            if !session.is_current(generation) {
                return;
            }
            let Some(record) = session.records.get_mut(url) else {
                return;
            };
            if !record.mark_loaded(Instant::now()) {
                return;
            }
            if let Some(variation) = record.speed_variation()
                && variation > UNSTABLE_SPEED_VARIATION
            {
                tracing::warn!(
                    url = %url,
                    name = %record.name,
                    variation,
                    "Download speed was unstable"
                );
            }
            session.claim_success(url)
        };

        self.publish_report(url, claimed);
        self.wake.notify_one();
    }

    pub(crate) fn on_stream_error(
        &self,
        url: &str,
        generation: u64,
        error: &dyn std::fmt::Display,
    ) {
        let claimed = {
            let mut session = self.lock_session();
            if !session.is_current(generation) {
                return;
            }
            let Some(record) = session.records.get_mut(url) else {
                return;
            };
            let failure = DownloadFailure::new(FailureKind::StreamRead, error);
            if !record.mark_error(failure, Instant::now()) {
                return;
            }
            session.claim_error(url)
        };

        self.publish_report(url, claimed);
        self.wake.notify_one();
    }
}
