//! Protocol module for the OpenAI-compatible surface
//!
//! These structures describe what callers send and what the gateway
//! returns, independent of any provider's wire format.

pub mod types;

pub use types::{
    unix_now, ChatCompletion, ChatCompletionChunk, ChatCompletionRequest, ChatMessage,
    ChunkChoice, ChunkDelta, ErrorBody, ErrorEnvelope, ResponseMeta, ASSISTANT_ROLE,
    CHUNK_OBJECT, COMPLETION_OBJECT, FINISH_REASON_STOP,
};
