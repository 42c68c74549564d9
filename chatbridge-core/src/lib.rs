//! Chatbridge Core Library
//!
//! Translates OpenAI chat-completion requests into arbitrary provider wire
//! formats and the providers' replies, streamed or not, back into OpenAI
//! shapes. Providers are described by data on disk rather than code: a
//! captured header block, a payload template and a small metadata record.
//!
//! The entry point is [`gateway::Gateway`].

pub mod config;
pub mod gateway;
pub mod http;
pub mod protocol;
pub mod providers;
pub mod translate;

pub use gateway::{Gateway, GatewayError, GatewayReply};

/// Returns the version of the Chatbridge Core library.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!version().is_empty());
    }
}
