//! HTTP client implementation using reqwest

use super::error::{map_http_error, UpstreamError};
use super::retry::{RetryExecutor, RetryPolicy};
use super::{UpstreamExecutor, UpstreamResponse};
use crate::config::{redact_header_value, SecretString, UpstreamConfig};
use crate::providers::ProviderDescriptor;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_LENGTH};
use reqwest::{Client, ClientBuilder};
use serde_json::Value;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Default user agent, only sent when the descriptor carries none
const USER_AGENT: &str = "chatbridge/0.1.0";

/// Shared upstream client with connection pooling
#[derive(Clone)]
pub struct UpstreamClient {
    client: Client,

    /// Bound on the wait for response headers and any error body
    request_timeout: Duration,

    /// Replaces the descriptor's Authorization header when set
    forward_token: Option<SecretString>,

    retry: RetryPolicy,
}

impl UpstreamClient {
    pub fn new(config: &UpstreamConfig) -> Result<Self, reqwest::Error> {
        // No client-wide timeout: it would also cut off long event streams.
        let client = ClientBuilder::new()
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .connect_timeout(config.connect_timeout())
            .user_agent(USER_AGENT)
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .zstd(true)
            .build()?;

        let forward_token = config
            .forward_api_key
            .clone()
            .filter(|key| !key.is_empty());
        if let Some(token) = &forward_token {
            info!(key = %token.partial_redact(), "forwarding bearer token to providers");
        }

        Ok(Self {
            client,
            request_timeout: config.request_timeout(),
            forward_token,
            retry: config.retry.clone(),
        })
    }

    /// Header map sent upstream: descriptor headers in file order with
    /// duplicates kept, minus Content-Length.
    pub fn build_headers(&self, descriptor: &ProviderDescriptor) -> Result<HeaderMap, UpstreamError> {
        let mut headers = HeaderMap::with_capacity(descriptor.headers.len() + 1);

        for (name, value) in &descriptor.headers {
            let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
                UpstreamError::InvalidHeader {
                    name: name.clone(),
                    message: e.to_string(),
                }
            })?;
            if header_name == CONTENT_LENGTH {
                continue;
            }
            let header_value =
                HeaderValue::from_str(value).map_err(|e| UpstreamError::InvalidHeader {
                    name: name.clone(),
                    message: e.to_string(),
                })?;
            headers.append(header_name, header_value);
        }

        if let Some(token) = &self.forward_token {
            let mut bearer = HeaderValue::from_str(&format!("Bearer {}", token.expose_secret()))
                .map_err(|e| UpstreamError::InvalidHeader {
                    name: AUTHORIZATION.to_string(),
                    message: e.to_string(),
                })?;
            bearer.set_sensitive(true);
            headers.insert(AUTHORIZATION, bearer);
        }

        Ok(headers)
    }

    async fn send_once(
        &self,
        url: &str,
        headers: &HeaderMap,
        payload: &Value,
    ) -> Result<UpstreamResponse, UpstreamError> {
        let deadline = Instant::now() + self.request_timeout;
        let request = self
            .client
            .post(url)
            .headers(headers.clone())
            .json(payload)
            .send();

        let response = match tokio::time::timeout_at(deadline, request).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => return Err(UpstreamError::from_transport(e, url, self.request_timeout)),
            Err(_) => {
                return Err(UpstreamError::Timeout {
                    url: url.to_string(),
                    after: self.request_timeout,
                })
            }
        };

        let status = response.status();
        debug!(%status, "upstream response headers received");

        if !status.is_success() {
            let headers = response.headers().clone();
            let body = read_error_body(response, deadline).await;
            return Err(map_http_error(status, &headers, body));
        }

        Ok(UpstreamResponse::from_reqwest(response))
    }
}

/// Body of a non-2xx answer, cut short at `deadline` or on a read error
async fn read_error_body(mut response: reqwest::Response, deadline: Instant) -> String {
    let mut body = Vec::new();
    loop {
        match tokio::time::timeout_at(deadline, response.chunk()).await {
            Ok(Ok(Some(chunk))) => body.extend_from_slice(&chunk),
            Ok(Ok(None)) => break,
            Ok(Err(e)) => {
                debug!(error = %e, "error body read failed");
                break;
            }
            Err(_) => {
                warn!(received = body.len(), "error body truncated at request timeout");
                break;
            }
        }
    }
    String::from_utf8_lossy(&body).into_owned()
}

#[async_trait]
impl UpstreamExecutor for UpstreamClient {
    async fn send(
        &self,
        descriptor: &ProviderDescriptor,
        payload: &Value,
    ) -> Result<UpstreamResponse, UpstreamError> {
        let url = descriptor.url();
        let headers = self.build_headers(descriptor)?;

        info!(provider = %descriptor.name, %url, "calling upstream");
        for (name, value) in &descriptor.headers {
            debug!(
                header = %name,
                value = %redact_header_value(name, value),
                "forwarding header"
            );
        }

        let executor = RetryExecutor::new(self.retry.clone());
        let result = executor
            .execute(|| self.send_once(&url, &headers, payload))
            .await;

        if let Err(e) = &result {
            warn!(provider = %descriptor.name, error = %e, "upstream call failed");
        }
        result
    }
}
