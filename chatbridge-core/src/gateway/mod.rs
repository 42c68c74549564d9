//! Request orchestration
//!
//! [`Gateway`] carries one inbound chat-completion request through the
//! pipeline: resolve the provider, load its descriptor, build the payload,
//! call the upstream, then translate or normalize the reply.
//!
//! Two policies are fixed here:
//! - the provider's declared streaming flag decides how the upstream body
//!   is read, whatever the response headers claim;
//! - the caller's `stream` flag only decides the shape handed back, so a
//!   streaming provider can serve a non-streaming caller and the reverse.

pub mod error;

pub use error::GatewayError;

use crate::config::GatewayConfig;
use crate::http::{UpstreamClient, UpstreamError, UpstreamExecutor, UpstreamResponse};
use crate::protocol::{ChatCompletion, ChatCompletionRequest, ResponseMeta};
use crate::providers::{build_payload, resolve, ProviderDescriptor, ProviderRegistry};
use crate::translate::{
    completion_to_events, normalize, translate_lines, Normalized, OutputMode, StreamTranslator,
    TranslatorEvent,
};
use futures::future::ready;
use futures::stream::{self, BoxStream};
use futures::StreamExt;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

const MISSING_MESSAGES: &str = "messages is required and must be a list";

/// What the caller receives on success
pub enum GatewayReply {
    /// A JSON document, sent with status 200
    Completion(Value),
    /// Ready-to-write `data: ...\n\n` frames, ending with DONE
    Stream(BoxStream<'static, String>),
}

impl std::fmt::Debug for GatewayReply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Completion(value) => f.debug_tuple("Completion").field(value).finish(),
            Self::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

pub struct Gateway {
    registry: Arc<ProviderRegistry>,
    upstream: Arc<dyn UpstreamExecutor>,
    default_model: String,
    request_timeout: Duration,
    idle_timeout: Duration,
}

impl Gateway {
    /// Build a gateway with a real upstream client
    pub fn new(config: &GatewayConfig) -> Result<Self, GatewayError> {
        let client = UpstreamClient::new(&config.upstream)
            .map_err(|e| GatewayError::Internal(format!("Failed to create HTTP client: {}", e)))?;
        let registry = Arc::new(ProviderRegistry::new(&config.providers_dir));
        Ok(Self::with_parts(registry, Arc::new(client), config))
    }

    /// Build a gateway around an existing registry and upstream executor
    pub fn with_parts(
        registry: Arc<ProviderRegistry>,
        upstream: Arc<dyn UpstreamExecutor>,
        config: &GatewayConfig,
    ) -> Self {
        Self {
            registry,
            upstream,
            default_model: config.default_model.clone(),
            request_timeout: config.upstream.request_timeout(),
            idle_timeout: config.upstream.idle_timeout(),
        }
    }

    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    /// Handle one `POST /v1/chat/completions` body
    pub async fn chat_completions(&self, body: Value) -> Result<GatewayReply, GatewayError> {
        let request = parse_request(body)?;

        let model = request
            .model
            .clone()
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| self.default_model.clone());

        let provider = resolve(&model, request.provider.as_deref()).ok_or_else(|| {
            GatewayError::ProviderNotFound(format!("No provider found for model \"{}\"", model))
        })?;
        let descriptor = self.registry.load(&provider).await.inspect_err(|e| {
            warn!(provider = %provider, error = %e, "provider descriptor unavailable");
        })?;

        let meta = ResponseMeta::mint(&model);
        let mode = if request.stream {
            OutputMode::Stream
        } else {
            OutputMode::Aggregate
        };
        info!(
            request_id = %meta.id,
            provider = %descriptor.name,
            model = %model,
            messages = request.messages.len(),
            caller_stream = request.stream,
            provider_stream = descriptor.stream,
            "handling chat completion"
        );

        let payload = build_payload(&descriptor, &request.messages, &model, meta.created);
        let started = Instant::now();
        let response = self.upstream.send(&descriptor, &payload).await?;

        let observed_stream = response.looks_like_event_stream();
        if observed_stream != descriptor.stream {
            debug!(
                request_id = %meta.id,
                declared = descriptor.stream,
                observed = observed_stream,
                content_type = response.content_type().unwrap_or_default(),
                "upstream transport differs from declaration"
            );
        }

        if descriptor.stream {
            self.reply_from_stream(response, meta, mode, started).await
        } else {
            self.reply_from_document(&descriptor, response, meta, mode).await
        }
    }

    async fn reply_from_stream(
        &self,
        response: UpstreamResponse,
        meta: ResponseMeta,
        mode: OutputMode,
        started: Instant,
    ) -> Result<GatewayReply, GatewayError> {
        // Only the aggregate drain is bounded end to end; live streams rely
        // on the idle timeout.
        let deadline = match mode {
            OutputMode::Stream => None,
            OutputMode::Aggregate => Some(started + self.request_timeout),
        };
        let translator = StreamTranslator::new(meta, mode);
        let events = translate_lines(
            response.into_lines(),
            translator,
            self.idle_timeout,
            deadline,
        );

        match mode {
            OutputMode::Stream => Ok(GatewayReply::Stream(
                events.filter_map(|event| ready(event.to_sse())).boxed(),
            )),
            OutputMode::Aggregate => {
                let mut events = Box::pin(events);
                while let Some(event) = events.next().await {
                    if let TranslatorEvent::Completion(completion) = event {
                        return completion_value(completion).map(GatewayReply::Completion);
                    }
                }
                Err(GatewayError::Internal(
                    "stream ended without a completion".to_string(),
                ))
            }
        }
    }

    async fn reply_from_document(
        &self,
        descriptor: &ProviderDescriptor,
        response: UpstreamResponse,
        meta: ResponseMeta,
        mode: OutputMode,
    ) -> Result<GatewayReply, GatewayError> {
        let body = tokio::time::timeout(self.request_timeout, response.collect_body())
            .await
            .map_err(|_| UpstreamError::Timeout {
                url: descriptor.url(),
                after: self.request_timeout,
            })??;

        let document: Value = serde_json::from_slice(&body).map_err(|e| {
            warn!(request_id = %meta.id, error = %e, "provider document is not JSON");
            GatewayError::Parse(e.to_string())
        })?;

        let completion = match normalize(document, &meta) {
            Ok(Normalized::Completion(completion)) => completion,
            Ok(Normalized::Passthrough(document)) => {
                match serde_json::from_value::<ChatCompletion>(document.clone()) {
                    Ok(completion) if mode == OutputMode::Stream => completion,
                    _ => return Ok(GatewayReply::Completion(document)),
                }
            }
            Err(failure) => {
                warn!(request_id = %meta.id, "returning unrecognised provider document unchanged");
                return Ok(GatewayReply::Completion(failure.document));
            }
        };

        match mode {
            OutputMode::Aggregate => completion_value(completion).map(GatewayReply::Completion),
            OutputMode::Stream => {
                let frames: Vec<String> = completion_to_events(&completion, &meta)
                    .iter()
                    .filter_map(TranslatorEvent::to_sse)
                    .collect();
                Ok(GatewayReply::Stream(stream::iter(frames).boxed()))
            }
        }
    }
}

fn parse_request(body: Value) -> Result<ChatCompletionRequest, GatewayError> {
    let has_messages = body
        .get("messages")
        .and_then(Value::as_array)
        .is_some_and(|messages| !messages.is_empty());
    if !has_messages {
        return Err(GatewayError::InvalidRequest(MISSING_MESSAGES.to_string()));
    }

    serde_json::from_value(body)
        .map_err(|e| GatewayError::InvalidRequest(format!("Invalid request body: {}", e)))
}

fn completion_value(completion: ChatCompletion) -> Result<Value, GatewayError> {
    serde_json::to_value(completion).map_err(|e| GatewayError::Internal(e.to_string()))
}
