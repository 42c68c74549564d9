//! Provider descriptors and the artifacts they are parsed from
//!
//! A descriptor is assembled from three operator-authored files: a metadata
//! record, a raw header block captured from a real provider session, and a
//! payload template. Once built it is shared read-only between requests.

use super::error::{RegistryError, RegistryResult};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::LazyLock;

static REQUEST_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\w+)\s+(\S+)\s+HTTP").expect("static pattern compiles"));

/// Contents of `metadata.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderMetadata {
    /// Host (optionally with port) the provider is reached at
    pub host: String,

    /// Whether the provider answers with an event stream
    #[serde(default = "default_stream")]
    pub stream: bool,

    /// URL scheme, `https` unless the operator says otherwise
    #[serde(default = "default_scheme")]
    pub scheme: String,
}

fn default_stream() -> bool { true }
fn default_scheme() -> String { "https".to_string() }

/// The request line and header fields of `header.txt`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderBlock {
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    /// Header fields in file order, duplicates preserved
    pub headers: Vec<(String, String)>,
}

impl HeaderBlock {
    /// Parse a raw header block.
    ///
    /// The first line must read `METHOD path[?query] HTTP/x`. Every later
    /// line containing a colon is split on its first colon and kept as-is
    /// after trimming; lines without a colon and pseudo-header lines with an
    /// empty name are skipped.
    pub fn parse(name: &str, text: &str) -> RegistryResult<Self> {
        let mut lines = text.trim().lines();

        let request_line = lines.next().unwrap_or_default().trim();
        let captures = REQUEST_LINE.captures(request_line).ok_or_else(|| {
            RegistryError::InvalidDescriptor {
                name: name.to_string(),
                artifact: "header.txt",
                message: format!("unrecognised request line: {:?}", request_line),
            }
        })?;

        let method = captures[1].to_string();
        let (path, query) = match captures[2].split_once('?') {
            Some((path, query)) => (path.to_string(), Some(query.to_string())),
            None => (captures[2].to_string(), None),
        };

        let headers = lines
            .filter_map(|line| line.split_once(':'))
            .map(|(key, value)| (key.trim().to_string(), value.trim().to_string()))
            .filter(|(key, _)| !key.is_empty())
            .collect();

        Ok(Self {
            method,
            path,
            query,
            headers,
        })
    }
}

/// Which substitution points a payload template offers.
///
/// Computed once when the descriptor is loaded so that building a payload
/// never has to inspect the template again.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TemplateSchema {
    /// First entry of the template's `messages` list, used as the pattern
    /// for every outgoing message
    pub example_message: Map<String, Value>,
    pub message_timestamp: bool,
    pub message_models: bool,
    pub top_level_timestamp: bool,
    pub top_level_stream: bool,
}

impl TemplateSchema {
    pub fn from_template(template: &Value) -> Self {
        let example_message = template
            .get("messages")
            .and_then(Value::as_array)
            .and_then(|messages| messages.first())
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();

        Self {
            message_timestamp: example_message.contains_key("timestamp"),
            message_models: example_message.contains_key("models"),
            top_level_timestamp: template.get("timestamp").is_some(),
            top_level_stream: template.get("stream").is_some(),
            example_message,
        }
    }
}

/// Immutable description of how to talk to one provider
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderDescriptor {
    pub name: String,
    pub scheme: String,
    pub host: String,
    /// Method from the captured request line. Informational only: upstream
    /// calls are always POSTs.
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    pub headers: Vec<(String, String)>,
    pub template: Value,
    pub schema: TemplateSchema,
    /// Declared streaming default
    pub stream: bool,
}

impl ProviderDescriptor {
    pub fn new(
        name: impl Into<String>,
        metadata: ProviderMetadata,
        header_block: HeaderBlock,
        template: Value,
    ) -> Self {
        let schema = TemplateSchema::from_template(&template);
        Self {
            name: name.into(),
            scheme: metadata.scheme,
            host: metadata.host,
            method: header_block.method,
            path: header_block.path,
            query: header_block.query,
            headers: header_block.headers,
            template,
            schema,
            stream: metadata.stream,
        }
    }

    /// Full upstream URL: `{scheme}://{host}{path}[?query]`
    pub fn url(&self) -> String {
        match &self.query {
            Some(query) => format!("{}://{}{}?{}", self.scheme, self.host, self.path, query),
            None => format!("{}://{}{}", self.scheme, self.host, self.path),
        }
    }
}
