//! OpenAI chat-completion wire types
//!
//! Inbound requests are parsed leniently: only the fields the gateway acts
//! on are typed, everything else a client sends is ignored. Outbound
//! shapes follow the `chat.completion` and `chat.completion.chunk`
//! objects. Usage objects are carried as opaque JSON because providers
//! report them in their own shapes.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

pub const COMPLETION_OBJECT: &str = "chat.completion";
pub const CHUNK_OBJECT: &str = "chat.completion.chunk";
pub const ASSISTANT_ROLE: &str = "assistant";
pub const FINISH_REASON_STOP: &str = "stop";

/// One conversation turn
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    #[serde(default = "default_role")]
    pub role: String,

    #[serde(default, deserialize_with = "deserialize_content")]
    pub content: String,
}

fn default_role() -> String {
    "user".to_string()
}

/// Accept a string, null, or an array of `{type: "text", text}` parts.
fn deserialize_content<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::String(text) => text,
        Value::Null => String::new(),
        Value::Array(parts) => parts
            .iter()
            .filter_map(|part| part.get("text").and_then(Value::as_str))
            .collect(),
        other => other.to_string(),
    })
}

impl ChatMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }
}

/// Inbound `POST /v1/chat/completions` body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletionRequest {
    #[serde(default)]
    pub model: Option<String>,

    pub messages: Vec<ChatMessage>,

    /// Explicit provider name, overriding model-based inference
    #[serde(default)]
    pub provider: Option<String>,

    #[serde(default)]
    pub stream: bool,
}

/// Identity shared by every frame and response of one inbound request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseMeta {
    pub id: String,
    pub model: String,
    pub created: i64,
}

impl ResponseMeta {
    /// Mint a fresh `chatcmpl-` identifier stamped with the current time
    pub fn mint(model: impl Into<String>) -> Self {
        let hex = Uuid::new_v4().simple().to_string();
        Self {
            id: format!("chatcmpl-{}", &hex[..29]),
            model: model.into(),
            created: unix_now(),
        }
    }
}

/// Current unix time in whole seconds
pub fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

/// Incremental message content of a chunk
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkDelta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkChoice {
    pub index: u32,
    pub delta: ChunkDelta,
    /// Serialized as `null` until the terminal frame
    pub finish_reason: Option<String>,
}

/// One `chat.completion.chunk` frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletionChunk {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    pub choices: Vec<ChunkChoice>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Value>,
}

impl ChatCompletionChunk {
    pub fn new(meta: &ResponseMeta, delta: ChunkDelta, finish_reason: Option<&str>) -> Self {
        Self {
            id: meta.id.clone(),
            object: CHUNK_OBJECT.to_string(),
            created: meta.created,
            model: meta.model.clone(),
            choices: vec![ChunkChoice {
                index: 0,
                delta,
                finish_reason: finish_reason.map(str::to_string),
            }],
            usage: None,
        }
    }

    /// Terminal frame: empty delta and a stop finish reason
    pub fn terminal(meta: &ResponseMeta, usage: Option<Value>) -> Self {
        Self {
            usage,
            ..Self::new(meta, ChunkDelta::default(), Some(FINISH_REASON_STOP))
        }
    }

    pub fn with_usage(mut self, usage: Option<Value>) -> Self {
        self.usage = usage;
        self
    }

    pub fn delta(&self) -> Option<&ChunkDelta> {
        self.choices.first().map(|choice| &choice.delta)
    }

    pub fn finish_reason(&self) -> Option<&str> {
        self.choices.first().and_then(|choice| choice.finish_reason.as_deref())
    }
}

/// A complete `chat.completion` response.
///
/// Choices stay untyped so provider choices can pass through unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletion {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    pub choices: Vec<Value>,
    pub usage: Value,
}

impl ChatCompletion {
    pub fn new(meta: &ResponseMeta, choices: Vec<Value>, usage: Option<Value>) -> Self {
        Self {
            id: meta.id.clone(),
            object: COMPLETION_OBJECT.to_string(),
            created: meta.created,
            model: meta.model.clone(),
            choices,
            usage: usage.unwrap_or_else(|| json!({})),
        }
    }

    /// Single-choice response carrying one finished message
    pub fn single(meta: &ResponseMeta, role: &str, content: &str, usage: Option<Value>) -> Self {
        let choice = json!({
            "index": 0,
            "message": {"role": role, "content": content},
            "finish_reason": FINISH_REASON_STOP,
        });
        Self::new(meta, vec![choice], usage)
    }

    /// Text of the first choice's message, if it has one
    pub fn first_content(&self) -> Option<&str> {
        self.choices
            .first()
            .and_then(|choice| choice.pointer("/message/content"))
            .and_then(Value::as_str)
    }
}

/// Error body shared by every failure: `{error: {message, type, code}}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub error: ErrorBody,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub message: String,
    #[serde(rename = "type")]
    pub error_type: String,
    pub code: String,
}

impl ErrorEnvelope {
    pub fn new(
        message: impl Into<String>,
        error_type: impl Into<String>,
        code: impl Into<String>,
    ) -> Self {
        Self {
            error: ErrorBody {
                message: message.into(),
                error_type: error_type.into(),
                code: code.into(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minted_ids_are_unique_and_shaped() {
        let a = ResponseMeta::mint("m");
        let b = ResponseMeta::mint("m");
        assert_ne!(a.id, b.id);
        assert!(a.id.starts_with("chatcmpl-"));
        assert_eq!(a.id.len(), "chatcmpl-".len() + 29);
    }

    #[test]
    fn test_request_parsing_is_lenient() {
        let request: ChatCompletionRequest = serde_json::from_value(json!({
            "model": "qwen-7b",
            "temperature": 0.2,
            "messages": [
                {"role": "user", "content": "Hi"},
                {"content": null},
                {"role": "user", "content": [{"type": "text", "text": "a"}, {"type": "text", "text": "b"}]}
            ]
        }))
        .unwrap();

        assert!(!request.stream);
        assert_eq!(request.provider, None);
        assert_eq!(request.messages[1], ChatMessage::new("user", ""));
        assert_eq!(request.messages[2].content, "ab");
    }

    #[test]
    fn test_first_chunk_serialization() {
        let meta = ResponseMeta {
            id: "chatcmpl-x".to_string(),
            model: "m".to_string(),
            created: 7,
        };
        let delta = ChunkDelta {
            role: Some(ASSISTANT_ROLE.to_string()),
            content: None,
        };
        let value = serde_json::to_value(ChatCompletionChunk::new(&meta, delta, None)).unwrap();

        assert_eq!(
            value,
            json!({
                "id": "chatcmpl-x",
                "object": "chat.completion.chunk",
                "created": 7,
                "model": "m",
                "choices": [{"index": 0, "delta": {"role": "assistant"}, "finish_reason": null}]
            })
        );
    }

    #[test]
    fn test_single_completion() {
        let meta = ResponseMeta::mint("m");
        let completion = ChatCompletion::single(&meta, "assistant", "Hello", None);
        assert_eq!(completion.first_content(), Some("Hello"));
        assert_eq!(completion.usage, json!({}));
        assert_eq!(completion.object, "chat.completion");
    }

    #[test]
    fn test_error_envelope_shape() {
        let envelope = ErrorEnvelope::new("nope", "invalid_request_error", "missing_messages");
        assert_eq!(
            serde_json::to_value(envelope).unwrap(),
            json!({"error": {"message": "nope", "type": "invalid_request_error", "code": "missing_messages"}})
        );
    }
}
