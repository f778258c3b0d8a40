//! Session-level tests driven by a scripted in-memory retriever.


use crate::config::{TrackedFileSpec, TrackerConfig};
use crate::retrieval::{Body, RequestOptions, Response, Retriever};
use crate::sink::MemorySink;
use crate::tracker::DownloadTracker;
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use futures::stream;
use reqwest::StatusCode;
use reqwest::header::{CONTENT_LENGTH, HeaderMap, HeaderValue};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

pub(crate) const DATA_URL: &str = "https://cdn.test/Build/game.data.br?v=1";
pub(crate) const WASM_URL: &str = "https://cdn.test/Build/game.wasm.br";
pub(crate) const SYMBOLS_URL: &str = "https://cdn.test/Build/game.symbols.json";
pub(crate) const PAGE_URL: &str = "https://cdn.test/index.html";

/// Error type of the scripted retriever
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("mock error: {0}")]
pub(crate) struct MockError(pub(crate) String);

/// How the scripted retriever answers one URL
#[derive(Clone, Debug)]
pub(crate) enum MockRoute {
    /// A 200 response whose body yields `chunks`, one every `delay`
    Body {
        chunks: Vec<usize>,
        delay: Duration,
        declared: Option<u64>,
        /// Yield a read error after this many chunks
        fail_after: Option<usize>,
    },
    /// A response with the given status and a short body
    Status(StatusCode),
    /// The retrieval itself fails
    TransportError(String),
}

impl MockRoute {
    pub(crate) fn body(chunks: Vec<usize>, delay: Duration) -> Self {
        let declared = Some(chunks.iter().sum::<usize>() as u64);
        MockRoute::Body {
            chunks,
            delay,
            declared,
            fail_after: None,
        }
    }

    pub(crate) fn undeclared(chunks: Vec<usize>, delay: Duration) -> Self {
        MockRoute::Body {
            chunks,
            delay,
            declared: None,
            fail_after: None,
        }
    }

    pub(crate) fn failing(chunks: Vec<usize>, delay: Duration, fail_after: usize) -> Self {
        let declared = Some(chunks.iter().sum::<usize>() as u64);
        MockRoute::Body {
            chunks,
            delay,
            declared,
            fail_after: Some(fail_after),
        }
    }
}

/// Deterministic body content: byte `i` of the whole body is `i % 251`
pub(crate) fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

/// In-memory retriever answering from a fixed route table
#[derive(Default)]
pub(crate) struct MockRetriever {
    routes: HashMap<String, MockRoute>,
    calls: AtomicUsize,
}

impl MockRetriever {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn route(mut self, url: &str, route: MockRoute) -> Self {
        self.routes.insert(url.to_string(), route);
        self
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Retriever for MockRetriever {
    type Error = MockError;

    async fn retrieve(
        &self,
        url: &str,
        _options: &RequestOptions,
    ) -> Result<Response<MockError>, MockError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let route = self
            .routes
            .get(url)
            .cloned()
            .unwrap_or(MockRoute::Status(StatusCode::NOT_FOUND));

        match route {
            MockRoute::TransportError(message) => Err(MockError(message)),
            MockRoute::Status(status) => {
                let body: Body<MockError> =
                    Box::pin(stream::iter(vec![Ok(Bytes::from_static(b"not found"))]));
                Ok(Response::new(status, HeaderMap::new(), Some(body)))
            }
            MockRoute::Body {
                chunks,
                delay,
                declared,
                fail_after,
            } => {
                let mut headers = HeaderMap::new();
                if let Some(len) = declared {
                    headers.insert(CONTENT_LENGTH, HeaderValue::from(len));
                }

                let content = pattern(chunks.iter().sum());
                let mut items: Vec<Result<Bytes, MockError>> = Vec::new();
                let mut offset = 0;
                for (i, len) in chunks.into_iter().enumerate() {
                    if fail_after == Some(i) {
                        break;
                    }
                    items.push(Ok(Bytes::copy_from_slice(&content[offset..offset + len])));
                    offset += len;
                }
                if fail_after.is_some() {
                    items.push(Err(MockError("connection reset".to_string())));
                }

                let body: Body<MockError> = stream::iter(items)
                    .then(move |item| async move {
                        tokio::time::sleep(delay).await;
                        item
                    })
                    .boxed();
                Ok(Response::new(StatusCode::OK, headers, Some(body)))
            }
        }
    }
}

/// Two critical files plus an optional one
pub(crate) fn config_with_optional() -> TrackerConfig {
    TrackerConfig {
        tracked_files: vec![
            TrackedFileSpec::new(".data.br", "DataFile"),
            TrackedFileSpec::new(".wasm.br", "WasmFile"),
            TrackedFileSpec::optional(".symbols.json", "Symbols"),
        ],
        ..Default::default()
    }
}

/// Tracker with a memory sink attached
pub(crate) fn tracker_with(config: TrackerConfig) -> (DownloadTracker, Arc<MemorySink>) {
    let tracker = DownloadTracker::new(config).unwrap();
    let sink = Arc::new(MemorySink::new());
    tracker.add_shared_sink(sink.clone());
    (tracker, sink)
}

/// Retrieve `url` through `retriever` and read the whole body
pub(crate) async fn fetch<R: Retriever>(
    retriever: &R,
    url: &str,
) -> Result<Bytes, R::Error> {
    let response = retriever.retrieve(url, &RequestOptions::default()).await?;
    response.bytes().await
}
