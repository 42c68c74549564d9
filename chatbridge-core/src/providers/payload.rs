//! Provider payload construction
//!
//! The outgoing body is a copy of the provider's template with its message
//! list rebuilt from the caller's conversation. Templates are never edited
//! in place.

use super::descriptor::ProviderDescriptor;
use crate::protocol::ChatMessage;
use serde_json::{json, Map, Value};

/// Seconds between the synthetic timestamps of consecutive messages
pub const TIMESTAMP_GAP_SECS: i64 = 10;

/// Per-message values written into a copy of the example message
#[derive(Debug, Clone, PartialEq)]
pub struct MessageSubstitutions<'a> {
    pub role: &'a str,
    pub content: &'a str,
    pub timestamp: Option<i64>,
    pub model: Option<&'a str>,
}

/// Build one provider message from the template's example message
pub fn instantiate_message(example: &Map<String, Value>, subs: &MessageSubstitutions<'_>) -> Value {
    let mut message = example.clone();
    message.insert("role".to_string(), json!(subs.role));
    message.insert("content".to_string(), json!(subs.content));

    if let Some(timestamp) = subs.timestamp {
        message.insert("timestamp".to_string(), json!(timestamp));
    }
    if let Some(model) = subs.model {
        message.insert("models".to_string(), json!([model]));
    }

    Value::Object(message)
}

/// Build the request body for `descriptor` from the caller's messages.
///
/// `now` is the current unix time in seconds. The `stream` field, when the
/// template has one, follows the provider's declared default and never the
/// caller's preference.
pub fn build_payload(
    descriptor: &ProviderDescriptor,
    messages: &[ChatMessage],
    model: &str,
    now: i64,
) -> Value {
    let schema = &descriptor.schema;

    let provider_messages: Vec<Value> = messages
        .iter()
        .enumerate()
        .map(|(index, message)| {
            let subs = MessageSubstitutions {
                role: &message.role,
                content: &message.content,
                timestamp: schema
                    .message_timestamp
                    .then(|| now + index as i64 * TIMESTAMP_GAP_SECS),
                model: schema.message_models.then_some(model),
            };
            instantiate_message(&schema.example_message, &subs)
        })
        .collect();

    let mut payload = match &descriptor.template {
        Value::Object(fields) => fields.clone(),
        _ => Map::new(),
    };

    payload.insert("messages".to_string(), Value::Array(provider_messages));
    if schema.top_level_timestamp {
        payload.insert("timestamp".to_string(), json!(now));
    }
    if schema.top_level_stream {
        payload.insert("stream".to_string(), json!(descriptor.stream));
    }

    Value::Object(payload)
}
