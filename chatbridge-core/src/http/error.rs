//! Upstream error taxonomy and HTTP error mapping

use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::StatusCode;
use std::time::Duration;
use thiserror::Error;

/// Failures of a single upstream call
#[derive(Debug, Clone, Error)]
pub enum UpstreamError {
    /// The provider could not be reached
    #[error("Failed to connect to provider at {url}: {message}")]
    Connect { url: String, message: String },

    /// The provider did not answer within the overall timeout
    #[error("Request to {url} timed out after {}s", .after.as_secs())]
    Timeout { url: String, after: Duration },

    /// The provider answered with a non-2xx status
    #[error("Provider returned HTTP {status}: {body}")]
    Http {
        status: u16,
        body: String,
        retry_after: Option<Duration>,
    },

    /// A header from the provider descriptor cannot be sent on the wire
    #[error("Invalid header '{name}' in provider descriptor: {message}")]
    InvalidHeader { name: String, message: String },

    /// The body stream broke after the response started
    #[error("Failed to read provider response body: {0}")]
    Body(String),

    /// The request could not be built or sent for a reason other than
    /// reaching the provider (bad URL, redirect loop)
    #[error("Request to {url} failed: {message}")]
    Request { url: String, message: String },
}

impl UpstreamError {
    /// Transient failures worth another attempt. Never true for 4xx.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Connect { .. } | Self::Timeout { .. } => true,
            Self::Http { status, .. } => *status >= 500,
            Self::InvalidHeader { .. } | Self::Body(_) | Self::Request { .. } => false,
        }
    }

    /// Provider-supplied backoff hint, if any
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Http { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// Map a reqwest transport failure
    pub fn from_transport(err: reqwest::Error, url: &str, timeout: Duration) -> Self {
        if err.is_timeout() {
            Self::Timeout {
                url: url.to_string(),
                after: timeout,
            }
        } else if err.is_connect() {
            Self::Connect {
                url: url.to_string(),
                message: err.to_string(),
            }
        } else if err.is_body() || err.is_decode() {
            Self::Body(err.to_string())
        } else {
            Self::Request {
                url: url.to_string(),
                message: err.to_string(),
            }
        }
    }
}

/// Map a non-success status and its body to an [`UpstreamError`]
pub fn map_http_error(status: StatusCode, headers: &HeaderMap, body: String) -> UpstreamError {
    let retry_after = headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_retry_after);

    UpstreamError::Http {
        status: status.as_u16(),
        body,
        retry_after,
    }
}

/// Parse Retry-After header value (delta-seconds form only)
pub fn parse_retry_after(header_value: &str) -> Option<Duration> {
    header_value.trim().parse::<u64>().ok().map(Duration::from_secs)
}
