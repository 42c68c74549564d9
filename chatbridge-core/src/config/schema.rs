//! Configuration schema structures with serde support

use super::error::{ValidationError, ValidationErrorKind};
use super::secrets::SecretString;
use crate::http::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration structure for the gateway
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    /// Schema version
    #[serde(default = "default_version")]
    pub version: String,

    /// Directory holding one sub-directory per provider descriptor
    #[serde(default = "default_providers_dir")]
    pub providers_dir: PathBuf,

    /// Model name assumed when a request omits one
    #[serde(default = "default_model")]
    pub default_model: String,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub upstream: UpstreamConfig,
}

/// Listener settings for the HTTP front end
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

/// Settings for calls to provider upstreams
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct UpstreamConfig {
    /// Overall bound on one upstream call, in milliseconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,

    /// TCP connect timeout in milliseconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,

    /// Longest gap tolerated between two lines of a streamed body
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_ms: u64,

    /// Bearer token added to every upstream call, if set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forward_api_key: Option<SecretString>,

    #[serde(default)]
    pub retry: RetryPolicy,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            providers_dir: default_providers_dir(),
            default_model: default_model(),
            server: ServerConfig::default(),
            upstream: UpstreamConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: default_request_timeout(),
            connect_timeout_ms: default_connect_timeout(),
            idle_timeout_ms: default_idle_timeout(),
            forward_api_key: None,
            retry: RetryPolicy::default(),
        }
    }
}

impl UpstreamConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }
}

fn default_version() -> String { "0.1".to_string() }
fn default_providers_dir() -> PathBuf { PathBuf::from("providers") }
fn default_model() -> String { "gpt-3.5-turbo".to_string() }
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 5000 }
fn default_request_timeout() -> u64 { 60_000 }
fn default_connect_timeout() -> u64 { 10_000 }
fn default_idle_timeout() -> u64 { 30_000 }

impl GatewayConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.version != "0.1" {
            return Err(ValidationError::new(
                "version",
                ValidationErrorKind::InvalidVersion {
                    expected: "0.1".to_string(),
                    actual: self.version.clone(),
                },
            ));
        }

        if self.providers_dir.as_os_str().is_empty() {
            return Err(ValidationError::required("providers_dir"));
        }

        if self.default_model.trim().is_empty() {
            return Err(ValidationError::required("default_model"));
        }

        if self.server.port == 0 {
            return Err(ValidationError::out_of_range("server.port", "Must be greater than 0"));
        }

        self.upstream.validate("upstream")
    }
}

impl UpstreamConfig {
    pub fn validate(&self, path: &str) -> Result<(), ValidationError> {
        if self.request_timeout_ms == 0 {
            return Err(ValidationError::out_of_range(
                format!("{}.request_timeout_ms", path),
                "Must be greater than 0",
            ));
        }

        if self.connect_timeout_ms == 0 {
            return Err(ValidationError::out_of_range(
                format!("{}.connect_timeout_ms", path),
                "Must be greater than 0",
            ));
        }

        if self.connect_timeout_ms > self.request_timeout_ms {
            return Err(ValidationError::incompatible(
                format!("{}.connect_timeout_ms", path),
                "Cannot exceed request_timeout_ms",
            ));
        }

        if self.idle_timeout_ms == 0 {
            return Err(ValidationError::out_of_range(
                format!("{}.idle_timeout_ms", path),
                "Must be greater than 0",
            )
            .with_context("A stalled upstream would otherwise hold the caller open forever"));
        }

        if let Some(key) = &self.forward_api_key {
            if key.is_empty() {
                return Err(ValidationError::required(format!("{}.forward_api_key", path))
                    .with_context("Omit the field instead of leaving it empty"));
            }
        }

        self.retry.validate(&format!("{}.retry", path))
    }
}
