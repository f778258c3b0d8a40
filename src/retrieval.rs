//! The retrieval primitive the tracker decorates.
//!
//! A [`Retriever`] takes a URL plus [`RequestOptions`] and yields a [`Response`]
//! whose body is a lazily-read byte stream. The tracker never needs to know how
//! bytes are fetched, only that the body can be read once.

use crate::error::Result;
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use futures::stream::BoxStream;
use reqwest::header::{CONTENT_LENGTH, HeaderMap};
use reqwest::{Method, StatusCode};

/// Boxed response body: a single-read stream of chunks
pub type Body<E> = BoxStream<'static, std::result::Result<Bytes, E>>;

/// Per-request options forwarded untouched to the wrapped retriever
#[derive(Clone, Debug)]
pub struct RequestOptions {
    /// HTTP method (default GET)
    pub method: Method,
    /// Extra request headers
    pub headers: Vec<(String, String)>,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            method: Method::GET,
            headers: Vec::new(),
        }
    }
}

impl RequestOptions {
    /// Add a request header
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// A retrieved response: status, headers and an optional body stream
pub struct Response<E> {
    status: StatusCode,
    headers: HeaderMap,
    body: Option<Body<E>>,
}

impl<E> Response<E> {
    /// Create a response from its parts
    pub fn new(status: StatusCode, headers: HeaderMap, body: Option<Body<E>>) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    /// Whether the status is in the 2xx range
    pub fn ok(&self) -> bool {
        self.status.is_success()
    }

    /// Response status
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Response headers
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Declared body length from the `Content-Length` header
    ///
    /// Returns `None` when the header is absent, unparseable or zero.
    pub fn content_length(&self) -> Option<u64> {
        self.headers
            .get(CONTENT_LENGTH)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<u64>().ok())
            .filter(|&len| len > 0)
    }

    /// Whether the body has not been taken yet
    pub fn has_body(&self) -> bool {
        self.body.is_some()
    }

    /// Take the body stream out of the response, leaving it empty
    pub fn take_body(&mut self) -> Option<Body<E>> {
        self.body.take()
    }

    /// Install a body stream
    pub fn set_body(&mut self, body: Body<E>) {
        self.body = Some(body);
    }

    /// Consume the response, returning its body stream
    pub fn into_body(self) -> Option<Body<E>> {
        self.body
    }

    /// Read the whole body into memory
    pub async fn bytes(self) -> std::result::Result<Bytes, E> {
        let Some(mut body) = self.body else {
            return Ok(Bytes::new());
        };
        let mut buf = BytesMut::new();
        while let Some(chunk) = body.next().await {
            buf.extend_from_slice(&chunk?);
        }
        Ok(buf.freeze())
    }
}

impl<E> std::fmt::Debug for Response<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Response")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .field("has_body", &self.body.is_some())
            .finish()
    }
}

/// Asynchronous retrieval primitive
///
/// Implementations own redirects, timeouts and error mapping. A returned error
/// means no response was obtained; errors while reading the body surface as items
/// of the body stream.
#[async_trait]
pub trait Retriever: Send + Sync {
    /// Error type for retrieval and body reads
    type Error: std::error::Error + Send + Sync + 'static;

    /// Start retrieving `url`
    async fn retrieve(
        &self,
        url: &str,
        options: &RequestOptions,
    ) -> std::result::Result<Response<Self::Error>, Self::Error>;
}

#[async_trait]
impl<R: Retriever + ?Sized> Retriever for std::sync::Arc<R> {
    type Error = R::Error;

    async fn retrieve(
        &self,
        url: &str,
        options: &RequestOptions,
    ) -> std::result::Result<Response<Self::Error>, Self::Error> {
        (**self).retrieve(url, options).await
    }
}

/// Production retriever backed by [`reqwest::Client`]
#[derive(Clone, Debug, Default)]
pub struct ReqwestRetriever {
    client: reqwest::Client,
}

impl ReqwestRetriever {
    /// Create a retriever with a freshly built client
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("fetch-tracker/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }

    /// Create a retriever around an existing client
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Retriever for ReqwestRetriever {
    type Error = reqwest::Error;

    async fn retrieve(
        &self,
        url: &str,
        options: &RequestOptions,
    ) -> std::result::Result<Response<Self::Error>, Self::Error> {
        let mut request = self.client.request(options.method.clone(), url);
        for (name, value) in &options.headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body: Body<Self::Error> = Box::pin(response.bytes_stream());

        Ok(Response::new(status, headers, Some(body)))
    }
}
