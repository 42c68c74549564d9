//! Provider registry error types

use thiserror::Error;

/// Result type for registry operations
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Errors raised while resolving or loading a provider descriptor
#[derive(Debug, Clone, Error)]
pub enum RegistryError {
    /// No descriptor directory exists for this provider
    #[error("Provider \"{0}\" not found")]
    NotFound(String),

    /// The descriptor directory lacks one of its artifacts
    #[error("Provider \"{name}\" is incomplete: missing {artifact}")]
    Incomplete { name: String, artifact: &'static str },

    /// An artifact exists but cannot be parsed
    #[error("Provider \"{name}\" has an invalid {artifact}: {message}")]
    InvalidDescriptor {
        name: String,
        artifact: &'static str,
        message: String,
    },

    /// The name cannot be used as a descriptor directory
    #[error("Invalid provider name \"{0}\"")]
    InvalidName(String),
}

impl RegistryError {
    /// Name of the provider the error refers to
    pub fn provider(&self) -> &str {
        match self {
            Self::NotFound(name) | Self::InvalidName(name) => name,
            Self::Incomplete { name, .. } | Self::InvalidDescriptor { name, .. } => name,
        }
    }
}
