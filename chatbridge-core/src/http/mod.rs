//! HTTP layer for calls to provider upstreams
//!
//! This module handles:
//! - Connection pooling and client management
//! - Forwarding descriptor headers unchanged
//! - Error mapping and bounded retry of transient failures
//! - Exposing the response body as bytes or as a stream of lines

pub mod client;
pub mod error;
pub mod retry;

pub use client::UpstreamClient;
pub use error::UpstreamError;
pub use retry::{RetryExecutor, RetryPolicy};

use crate::providers::ProviderDescriptor;
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::stream::{self, BoxStream};
use futures::{Stream, StreamExt, TryStreamExt};
use reqwest::header::{HeaderMap, CONTENT_TYPE, TRANSFER_ENCODING};
use serde_json::Value;
use tokio_util::codec::{AnyDelimiterCodec, FramedRead};
use tokio_util::io::StreamReader;

/// Longest single line accepted from an upstream event stream
pub const MAX_LINE_BYTES: usize = 1024 * 1024;

/// Raw upstream body
pub type ByteStream = BoxStream<'static, Result<Bytes, std::io::Error>>;

/// Upstream body split into lines, as they arrive
pub type LineStream = BoxStream<'static, Result<String, UpstreamError>>;

/// A provider's answer: status, headers and a not-yet-consumed body
pub struct UpstreamResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: ByteStream,
}

impl UpstreamResponse {
    pub fn from_reqwest(response: reqwest::Response) -> Self {
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response
            .bytes_stream()
            .map_err(std::io::Error::other)
            .boxed();

        Self {
            status,
            headers,
            body,
        }
    }

    /// Response backed by in-memory chunks
    pub fn from_chunks<I, B>(status: u16, headers: HeaderMap, chunks: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: Into<Bytes>,
    {
        let chunks: Vec<Result<Bytes, std::io::Error>> =
            chunks.into_iter().map(|chunk| Ok(chunk.into())).collect();

        Self {
            status,
            headers,
            body: stream::iter(chunks).boxed(),
        }
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok())
    }

    /// Whether the wire looks like an event stream (SSE content type or
    /// chunked transfer encoding)
    pub fn looks_like_event_stream(&self) -> bool {
        let event_stream = self
            .content_type()
            .is_some_and(|ct| ct.to_ascii_lowercase().contains("event-stream"));
        let chunked = self
            .headers
            .get(TRANSFER_ENCODING)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|te| te.to_ascii_lowercase().contains("chunked"));
        event_stream || chunked
    }

    /// Split the body into lines without waiting for it to finish
    pub fn into_lines(self) -> LineStream {
        lines_from_bytes(self.body)
    }

    /// Read the whole body
    pub async fn collect_body(mut self) -> Result<Bytes, UpstreamError> {
        let mut buffer = BytesMut::new();
        while let Some(chunk) = self.body.next().await {
            let chunk = chunk.map_err(|e| UpstreamError::Body(e.to_string()))?;
            buffer.extend_from_slice(&chunk);
        }
        Ok(buffer.freeze())
    }
}

/// Decode a byte stream into lines; a trailing line without newline is
/// still delivered at end of input.
///
/// Lines are split on raw `\n` bytes and decoded lossily, so a line with
/// invalid UTF-8 reaches the translator as text with replacement
/// characters instead of ending the stream.
pub fn lines_from_bytes<S>(bytes: S) -> LineStream
where
    S: Stream<Item = Result<Bytes, std::io::Error>> + Send + Unpin + 'static,
{
    let reader = StreamReader::new(bytes);
    let codec = AnyDelimiterCodec::new_with_max_length(b"\n".to_vec(), Vec::new(), MAX_LINE_BYTES);
    FramedRead::new(reader, codec)
        .map_ok(|line| decode_line(&line))
        .map_err(|e| UpstreamError::Body(e.to_string()))
        .boxed()
}

fn decode_line(line: &[u8]) -> String {
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    String::from_utf8_lossy(line).into_owned()
}

/// Issues the upstream call for one request
#[async_trait]
pub trait UpstreamExecutor: Send + Sync {
    /// POST `payload` to the provider described by `descriptor`.
    ///
    /// Resolves once response headers arrive; non-2xx answers become
    /// [`UpstreamError::Http`].
    async fn send(
        &self,
        descriptor: &ProviderDescriptor,
        payload: &Value,
    ) -> Result<UpstreamResponse, UpstreamError>;
}
