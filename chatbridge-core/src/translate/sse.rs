//! Server-sent event line parsing and frame encoding

use serde::Serialize;
use serde_json::Value;
use tracing::debug;

/// Terminal frame closing every caller-facing stream
pub const DONE_FRAME: &str = "data: [DONE]\n\n";

/// Parse one upstream line.
///
/// Only `data:` lines (with or without a following space) carry a
/// document. Anything else, including a data line whose payload is not
/// valid JSON, yields `None`.
pub fn parse_data_line(line: &str) -> Option<Value> {
    let payload = line.trim().strip_prefix("data:")?.trim_start();

    match serde_json::from_str(payload) {
        Ok(value) => Some(value),
        Err(e) => {
            debug!(error = %e, "dropping unparsable data line");
            None
        }
    }
}

/// Encode one value as a `data: <json>\n\n` frame
pub fn encode_frame<T: Serialize>(value: &T) -> String {
    // Serializing plain structs and `Value`s to a string cannot fail.
    let json = serde_json::to_string(value).unwrap_or_else(|_| "null".to_string());
    format!("data: {}\n\n", json)
}
