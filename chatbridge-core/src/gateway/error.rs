//! Caller-facing error taxonomy

use crate::http::UpstreamError;
use crate::protocol::ErrorEnvelope;
use crate::providers::RegistryError;
use thiserror::Error;

/// Everything that can end a request before a reply is produced
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Missing, empty or malformed `messages`
    #[error("{0}")]
    InvalidRequest(String),

    #[error("{0}")]
    ProviderNotFound(String),

    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    /// The provider answered with something that is not a JSON document
    #[error("Failed to parse provider response: {0}")]
    Parse(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// HTTP status returned to the caller
    pub fn status(&self) -> u16 {
        match self {
            Self::InvalidRequest(_) | Self::ProviderNotFound(_) => 400,
            Self::Upstream(UpstreamError::Http { status, .. }) => *status,
            Self::Upstream(_) | Self::Parse(_) | Self::Internal(_) => 500,
        }
    }

    pub fn error_type(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) | Self::ProviderNotFound(_) => "invalid_request_error",
            Self::Upstream(UpstreamError::Http { .. }) => "upstream_error",
            Self::Upstream(_) | Self::Parse(_) | Self::Internal(_) => "server_error",
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "missing_messages",
            Self::ProviderNotFound(_) => "provider_not_found",
            Self::Upstream(_) => "provider_error",
            Self::Parse(_) => "parse_error",
            Self::Internal(_) => "internal_error",
        }
    }

    pub fn envelope(&self) -> ErrorEnvelope {
        ErrorEnvelope::new(self.to_string(), self.error_type(), self.code())
    }
}

impl From<RegistryError> for GatewayError {
    fn from(err: RegistryError) -> Self {
        Self::ProviderNotFound(err.to_string())
    }
}
