//! Mapping of complete provider documents into `chat.completion` shape

use super::stream::TranslatorEvent;
use crate::protocol::{
    ChatCompletion, ChatCompletionChunk, ChunkDelta, ResponseMeta, ASSISTANT_ROLE,
};
use serde_json::{json, Value};
use thiserror::Error;

/// Result of normalizing one document
#[derive(Debug, Clone, PartialEq)]
pub enum Normalized {
    /// A well-formed completion under the gateway's identity
    Completion(ChatCompletion),
    /// An already OpenAI-looking document, forwarded with only its `id`
    /// replaced
    Passthrough(Value),
}

impl Normalized {
    pub fn into_value(self) -> Value {
        match self {
            // Serializing a plain struct to a Value cannot fail.
            Self::Completion(completion) => serde_json::to_value(completion).unwrap_or_default(),
            Self::Passthrough(value) => value,
        }
    }
}

/// No rule recognised the document. It is handed back untouched.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("provider response has no recognisable completion shape")]
pub struct NormalizationFailure {
    pub document: Value,
}

/// Normalize a provider document. Rules, first match wins:
///
/// 1. `choices[0].message`: choices pass through unchanged
/// 2. `choices[0].delta`: a single message built from the delta
/// 3. top-level `content`: a single assistant message
/// 4. any document with an `object` field: passthrough, `id` replaced
pub fn normalize(document: Value, meta: &ResponseMeta) -> Result<Normalized, NormalizationFailure> {
    let usage = document.get("usage").filter(|u| !u.is_null()).cloned();
    let first_choice = document.pointer("/choices/0");

    if first_choice.and_then(|c| c.get("message")).is_some() {
        let choices = document
            .get("choices")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        return Ok(Normalized::Completion(ChatCompletion::new(meta, choices, usage)));
    }

    if let Some(delta) = first_choice.and_then(|c| c.get("delta")) {
        let role = delta.get("role").and_then(Value::as_str).unwrap_or(ASSISTANT_ROLE);
        let content = delta.get("content").and_then(Value::as_str).unwrap_or_default();
        return Ok(Normalized::Completion(ChatCompletion::single(meta, role, content, usage)));
    }

    if let Some(content) = document.get("content") {
        let content = match content {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        };
        return Ok(Normalized::Completion(ChatCompletion::single(
            meta,
            ASSISTANT_ROLE,
            &content,
            usage,
        )));
    }

    match document {
        Value::Object(mut fields) if fields.contains_key("object") => {
            fields.insert("id".to_string(), json!(meta.id));
            Ok(Normalized::Passthrough(Value::Object(fields)))
        }
        document => Err(NormalizationFailure { document }),
    }
}

/// Replay a completed response as stream events: one frame with role and
/// content, a stop frame carrying usage, then DONE.
pub fn completion_to_events(completion: &ChatCompletion, meta: &ResponseMeta) -> Vec<TranslatorEvent> {
    let message = completion.choices.first().and_then(|c| c.get("message"));
    let role = message
        .and_then(|m| m.get("role"))
        .and_then(Value::as_str)
        .unwrap_or(ASSISTANT_ROLE);
    let content = completion.first_content().unwrap_or_default();

    let delta = ChunkDelta {
        role: Some(role.to_string()),
        content: Some(content.to_string()),
    };
    let usage = match &completion.usage {
        Value::Object(fields) if fields.is_empty() => None,
        Value::Null => None,
        other => Some(other.clone()),
    };

    vec![
        TranslatorEvent::Chunk(ChatCompletionChunk::new(meta, delta, None)),
        TranslatorEvent::Chunk(ChatCompletionChunk::terminal(meta, usage)),
        TranslatorEvent::Done,
    ]
}
