//! Common test utilities for fetch-tracker integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use fetch_tracker::{Body, DownloadTracker, MemorySink, RequestOptions, Response, Retriever, TrackerConfig};
use futures::StreamExt;
use futures::stream;
use reqwest::StatusCode;
use reqwest::header::{CONTENT_LENGTH, HeaderMap, HeaderValue};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

pub const DATA_URL: &str = "https://cdn.example.com/Build/game.data.br?build=7";
pub const WASM_URL: &str = "https://cdn.example.com/Build/game.wasm.br";

/// Error returned by [`ScriptedRetriever`]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("scripted failure: {0}")]
pub struct ScriptedError(pub String);

/// One scripted response body
#[derive(Clone, Debug)]
pub struct Script {
    pub chunk_sizes: Vec<usize>,
    pub delay: Duration,
    pub declare_length: bool,
    pub fail_after: Option<usize>,
}

impl Script {
    pub fn chunks(chunk_sizes: Vec<usize>, delay: Duration) -> Self {
        Self {
            chunk_sizes,
            delay,
            declare_length: true,
            fail_after: None,
        }
    }

    pub fn without_length(mut self) -> Self {
        self.declare_length = false;
        self
    }

    pub fn failing_after(mut self, chunks: usize) -> Self {
        self.fail_after = Some(chunks);
        self
    }
}

/// Byte `i` of every scripted body is `i % 253`
pub fn body_content(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 253) as u8).collect()
}

/// Retriever that answers from scripts keyed by URL; unknown URLs fail to connect
#[derive(Default)]
pub struct ScriptedRetriever {
    scripts: HashMap<String, Script>,
}

impl ScriptedRetriever {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(mut self, url: &str, script: Script) -> Self {
        self.scripts.insert(url.to_string(), script);
        self
    }
}

#[async_trait]
impl Retriever for ScriptedRetriever {
    type Error = ScriptedError;

    async fn retrieve(
        &self,
        url: &str,
        _options: &RequestOptions,
    ) -> Result<Response<ScriptedError>, ScriptedError> {
        let Some(script) = self.scripts.get(url).cloned() else {
            return Err(ScriptedError(format!("no route to {url}")));
        };

        let total: usize = script.chunk_sizes.iter().sum();
        let mut headers = HeaderMap::new();
        if script.declare_length {
            headers.insert(CONTENT_LENGTH, HeaderValue::from(total as u64));
        }

        let content = body_content(total);
        let mut items: Vec<Result<Bytes, ScriptedError>> = Vec::new();
        let mut offset = 0;
        for (index, size) in script.chunk_sizes.iter().copied().enumerate() {
            if script.fail_after == Some(index) {
                items.push(Err(ScriptedError("body read interrupted".to_string())));
                break;
            }
            items.push(Ok(Bytes::copy_from_slice(&content[offset..offset + size])));
            offset += size;
        }

        let delay = script.delay;
        let body: Body<ScriptedError> = stream::iter(items)
            .then(move |item| async move {
                tokio::time::sleep(delay).await;
                item
            })
            .boxed();

        Ok(Response::new(StatusCode::OK, headers, Some(body)))
    }
}

/// Tracker with a shared memory sink
pub fn tracker(config: TrackerConfig) -> (DownloadTracker, Arc<MemorySink>) {
    let tracker = DownloadTracker::new(config).expect("valid config");
    let sink = Arc::new(MemorySink::new());
    tracker.add_shared_sink(sink.clone());
    (tracker, sink)
}

/// Retrieve and read a whole body
pub async fn fetch<R: Retriever>(retriever: &R, url: &str) -> Result<Bytes, R::Error> {
    retriever
        .retrieve(url, &RequestOptions::default())
        .await?
        .bytes()
        .await
}
