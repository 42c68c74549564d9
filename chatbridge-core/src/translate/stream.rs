//! Incremental translation of provider event streams
//!
//! [`StreamTranslator`] is a push-driven state machine: it is fed one
//! upstream line at a time and returns the OpenAI events that line
//! produces. [`translate_lines`] drives it from an async line source.
//!
//! Provider documents are expected to look like
//! `{"choices": [{"delta": {"content": "...", "status": "typing"}}], "usage": {...}}`,
//! with `status: "finished"` on the last delta.

use super::sse::{encode_frame, parse_data_line, DONE_FRAME};
use crate::http::UpstreamError;
use crate::protocol::{
    ChatCompletion, ChatCompletionChunk, ChunkDelta, ResponseMeta, ASSISTANT_ROLE,
};
use async_stream::stream;
use futures::{Stream, StreamExt};
use serde_json::Value;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Key of the session-opened notification some providers send first
const SESSION_CREATED_KEY: &str = "response.created";

const STATUS_FINISHED: &str = "finished";

/// What the caller gets back
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// One chunk frame per upstream delta, then a stop frame and DONE
    Stream,
    /// A single completion once the upstream is done
    Aggregate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranslatorState {
    Init,
    Streaming,
    Finished,
    Aborted,
}

/// Output of the translator
#[derive(Debug, Clone, PartialEq)]
pub enum TranslatorEvent {
    Chunk(ChatCompletionChunk),
    Done,
    Completion(ChatCompletion),
}

impl TranslatorEvent {
    /// Wire form of a stream event; `None` for an aggregate completion
    pub fn to_sse(&self) -> Option<String> {
        match self {
            Self::Chunk(chunk) => Some(encode_frame(chunk)),
            Self::Done => Some(DONE_FRAME.to_string()),
            Self::Completion(_) => None,
        }
    }
}

/// Per-request translation state
#[derive(Debug)]
pub struct StreamTranslator {
    meta: ResponseMeta,
    mode: OutputMode,
    state: TranslatorState,
    buffer: String,
    usage: Option<Value>,
    first_chunk_sent: bool,
}

impl StreamTranslator {
    pub fn new(meta: ResponseMeta, mode: OutputMode) -> Self {
        Self {
            meta,
            mode,
            state: TranslatorState::Init,
            buffer: String::new(),
            usage: None,
            first_chunk_sent: false,
        }
    }

    pub fn state(&self) -> TranslatorState {
        self.state
    }

    pub fn mode(&self) -> OutputMode {
        self.mode
    }

    pub fn meta(&self) -> &ResponseMeta {
        &self.meta
    }

    /// Content accumulated so far
    pub fn content(&self) -> &str {
        &self.buffer
    }

    /// Last usage object seen
    pub fn usage(&self) -> Option<&Value> {
        self.usage.as_ref()
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.state, TranslatorState::Finished | TranslatorState::Aborted)
    }

    /// Feed one raw upstream line
    pub fn push_line(&mut self, line: &str) -> Vec<TranslatorEvent> {
        if self.is_terminal() {
            return Vec::new();
        }
        match parse_data_line(line) {
            Some(document) => self.push_document(&document),
            None => Vec::new(),
        }
    }

    /// Feed one parsed upstream document
    pub fn push_document(&mut self, document: &Value) -> Vec<TranslatorEvent> {
        if self.is_terminal() {
            return Vec::new();
        }
        if document.get(SESSION_CREATED_KEY).is_some() {
            debug!(id = %self.meta.id, "skipping session notification");
            return Vec::new();
        }

        self.state = TranslatorState::Streaming;

        let usage = document.get("usage").filter(|u| !u.is_null()).cloned();
        if usage.is_some() {
            self.usage = usage.clone();
        }

        let Some(delta) = document.pointer("/choices/0/delta").filter(|d| d.is_object()) else {
            return Vec::new();
        };
        let content = delta.get("content").and_then(Value::as_str).unwrap_or_default();
        let status = delta.get("status").and_then(Value::as_str).unwrap_or("typing");

        self.buffer.push_str(content);

        let mut events = Vec::new();
        if self.mode == OutputMode::Stream {
            let delta = self.next_delta(content);
            events.push(TranslatorEvent::Chunk(
                ChatCompletionChunk::new(&self.meta, delta, None).with_usage(usage),
            ));
        }

        if status == STATUS_FINISHED {
            events.extend(self.close(TranslatorState::Finished));
        }
        events
    }

    /// The upstream ended. Without a prior finish this is an abort.
    pub fn end_of_input(&mut self) -> Vec<TranslatorEvent> {
        self.abort("upstream ended before finishing")
    }

    /// Stop early and flush whatever was accumulated
    pub fn abort(&mut self, reason: &str) -> Vec<TranslatorEvent> {
        if self.is_terminal() {
            return Vec::new();
        }
        warn!(
            id = %self.meta.id,
            reason,
            received = self.buffer.len(),
            "upstream stream aborted"
        );
        self.close(TranslatorState::Aborted)
    }

    /// Role goes on the first frame only; content on the first frame only
    /// when non-empty.
    fn next_delta(&mut self, content: &str) -> ChunkDelta {
        if self.first_chunk_sent {
            return ChunkDelta {
                role: None,
                content: Some(content.to_string()),
            };
        }
        self.first_chunk_sent = true;
        ChunkDelta {
            role: Some(ASSISTANT_ROLE.to_string()),
            content: (!content.is_empty()).then(|| content.to_string()),
        }
    }

    fn close(&mut self, state: TranslatorState) -> Vec<TranslatorEvent> {
        self.state = state;
        match self.mode {
            OutputMode::Stream => vec![
                TranslatorEvent::Chunk(ChatCompletionChunk::terminal(&self.meta, self.usage.clone())),
                TranslatorEvent::Done,
            ],
            OutputMode::Aggregate => vec![TranslatorEvent::Completion(ChatCompletion::single(
                &self.meta,
                ASSISTANT_ROLE,
                &self.buffer,
                self.usage.clone(),
            ))],
        }
    }
}

/// Drive `translator` from an upstream line source.
///
/// Each wait for the next line is bounded by `idle_timeout`, and the whole
/// drive by `deadline` when one is given. Keep-alive lines reset the idle
/// wait but never the deadline. The stream always
/// ends with the translator's terminal output, and stops reading the
/// upstream as soon as the translator is done.
pub fn translate_lines<S>(
    mut lines: S,
    mut translator: StreamTranslator,
    idle_timeout: Duration,
    deadline: Option<Instant>,
) -> impl Stream<Item = TranslatorEvent> + Send + 'static
where
    S: Stream<Item = Result<String, UpstreamError>> + Send + Unpin + 'static,
{
    stream! {
        loop {
            let idle_deadline = Instant::now() + idle_timeout;
            let wait_until = deadline.map_or(idle_deadline, |d| d.min(idle_deadline));

            let events = if deadline.is_some_and(|d| Instant::now() >= d) {
                translator.abort("overall timeout reached")
            } else {
                match tokio::time::timeout_at(wait_until, lines.next()).await {
                    Ok(Some(Ok(line))) => translator.push_line(&line),
                    Ok(Some(Err(e))) => translator.abort(&e.to_string()),
                    Ok(None) => translator.end_of_input(),
                    Err(_) if wait_until < idle_deadline => translator.abort("overall timeout reached"),
                    Err(_) => translator.abort("idle timeout waiting for upstream"),
                }
            };

            for event in events {
                yield event;
            }

            if translator.is_terminal() {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use serde_json::json;

    fn meta() -> ResponseMeta {
        ResponseMeta {
            id: "chatcmpl-test".to_string(),
            model: "qwen-7b".to_string(),
            created: 1_700_000_000,
        }
    }

    fn delta_line(content: &str, status: &str) -> String {
        format!(
            "data: {}",
            json!({"choices": [{"delta": {"content": content, "status": status}}]})
        )
    }

    fn feed(translator: &mut StreamTranslator, lines: &[String]) -> Vec<TranslatorEvent> {
        lines.iter().flat_map(|line| translator.push_line(line)).collect()
    }

    #[test]
    fn test_stream_mode_frames() {
        let mut translator = StreamTranslator::new(meta(), OutputMode::Stream);
        let events = feed(
            &mut translator,
            &[
                "data: {\"response.created\": {\"chat_id\": \"x\"}}".to_string(),
                delta_line("Hel", "typing"),
                String::new(),
                delta_line("lo", "typing"),
                delta_line("", "finished"),
            ],
        );

        assert_eq!(events.len(), 5);
        let TranslatorEvent::Chunk(first) = &events[0] else { panic!("expected chunk") };
        assert_eq!(first.delta().unwrap().role.as_deref(), Some("assistant"));
        assert_eq!(first.delta().unwrap().content.as_deref(), Some("Hel"));

        let TranslatorEvent::Chunk(second) = &events[1] else { panic!("expected chunk") };
        assert_eq!(second.delta().unwrap().role, None);
        assert_eq!(second.delta().unwrap().content.as_deref(), Some("lo"));

        let TranslatorEvent::Chunk(stop) = &events[3] else { panic!("expected chunk") };
        assert_eq!(stop.finish_reason(), Some("stop"));
        assert_eq!(stop.delta(), Some(&ChunkDelta::default()));
        assert_eq!(events[4], TranslatorEvent::Done);

        assert_eq!(translator.state(), TranslatorState::Finished);
        assert_eq!(translator.content(), "Hello");
    }

    #[test]
    fn test_first_frame_omits_empty_content() {
        let mut translator = StreamTranslator::new(meta(), OutputMode::Stream);
        let events = translator.push_line(&delta_line("", "typing"));

        let TranslatorEvent::Chunk(first) = &events[0] else { panic!("expected chunk") };
        assert_eq!(
            serde_json::to_value(first.delta().unwrap()).unwrap(),
            json!({"role": "assistant"})
        );
    }

    #[test]
    fn test_aggregate_mode() {
        let mut translator = StreamTranslator::new(meta(), OutputMode::Aggregate);
        let events = feed(
            &mut translator,
            &[
                delta_line("Hel", "typing"),
                delta_line("lo", "typing"),
                "data: {\"choices\":[{\"delta\":{\"status\":\"finished\"}}],\"usage\":{\"total_tokens\":3}}"
                    .to_string(),
            ],
        );

        assert_eq!(events.len(), 1);
        let TranslatorEvent::Completion(completion) = &events[0] else { panic!("expected completion") };
        assert_eq!(completion.id, "chatcmpl-test");
        assert_eq!(completion.first_content(), Some("Hello"));
        assert_eq!(completion.usage, json!({"total_tokens": 3}));
    }

    #[test]
    fn test_malformed_lines_leave_buffer_untouched() {
        let mut translator = StreamTranslator::new(meta(), OutputMode::Aggregate);
        feed(
            &mut translator,
            &[
                delta_line("a", "typing"),
                "data: {\"choices\":[{\"delta\":{\"content\":\"b\"".to_string(),
                "garbage".to_string(),
                "data: not json".to_string(),
                delta_line("c", "typing"),
            ],
        );
        assert_eq!(translator.content(), "ac");
    }

    #[test]
    fn test_nothing_after_finish() {
        let mut translator = StreamTranslator::new(meta(), OutputMode::Stream);
        translator.push_line(&delta_line("x", "finished"));

        assert!(translator.push_line(&delta_line("late", "typing")).is_empty());
        assert!(translator.end_of_input().is_empty());
        assert_eq!(translator.content(), "x");
        assert_eq!(translator.state(), TranslatorState::Finished);
    }

    #[test]
    fn test_end_of_input_without_finish_aborts_and_flushes() {
        let mut translator = StreamTranslator::new(meta(), OutputMode::Stream);
        translator.push_line(&delta_line("partial", "typing"));

        let events = translator.end_of_input();

        assert_eq!(translator.state(), TranslatorState::Aborted);
        assert_eq!(events.len(), 2);
        assert_eq!(events[1], TranslatorEvent::Done);
    }

    #[test]
    fn test_usage_only_document_is_remembered() {
        let mut translator = StreamTranslator::new(meta(), OutputMode::Stream);
        translator.push_line(&delta_line("a", "typing"));

        let events = translator.push_line("data: {\"usage\": {\"output_tokens\": 9}}");
        assert!(events.is_empty());

        let events = translator.push_line(&delta_line("", "finished"));
        let TranslatorEvent::Chunk(stop) = &events[1] else { panic!("expected chunk") };
        assert_eq!(stop.usage, Some(json!({"output_tokens": 9})));
    }

    #[test]
    fn test_frames_share_identity() {
        let mut translator = StreamTranslator::new(meta(), OutputMode::Stream);
        let events = feed(
            &mut translator,
            &[delta_line("a", "typing"), delta_line("b", "finished")],
        );

        for event in &events {
            if let TranslatorEvent::Chunk(chunk) = event {
                assert_eq!(chunk.id, "chatcmpl-test");
                assert_eq!(chunk.created, 1_700_000_000);
                assert_eq!(chunk.model, "qwen-7b");
            }
        }
    }

    #[tokio::test]
    async fn test_driver_stops_at_finish() {
        let lines = stream::iter(vec![
            Ok(delta_line("a", "typing")),
            Ok(delta_line("b", "finished")),
            Ok(delta_line("ignored", "typing")),
        ]);
        let translator = StreamTranslator::new(meta(), OutputMode::Stream);

        let frames: Vec<String> = translate_lines(lines, translator, Duration::from_secs(5), None)
            .filter_map(|event| async move { event.to_sse() })
            .collect()
            .await;

        assert_eq!(frames.len(), 4);
        assert_eq!(frames.last().map(String::as_str), Some(DONE_FRAME));
        assert!(!frames.iter().any(|f| f.contains("ignored")));
    }

    #[tokio::test]
    async fn test_driver_aborts_on_transport_error() {
        let lines = stream::iter(vec![
            Ok(delta_line("part", "typing")),
            Err(UpstreamError::Body("connection reset".to_string())),
        ]);
        let translator = StreamTranslator::new(meta(), OutputMode::Aggregate);

        let events: Vec<_> = translate_lines(lines, translator, Duration::from_secs(5), None)
            .collect()
            .await;

        assert_eq!(events.len(), 1);
        let TranslatorEvent::Completion(completion) = &events[0] else { panic!("expected completion") };
        assert_eq!(completion.first_content(), Some("part"));
    }

    #[tokio::test]
    async fn test_driver_aborts_on_idle_timeout() {
        let lines = stream::iter(vec![Ok(delta_line("slow", "typing"))]).chain(stream::pending());
        let translator = StreamTranslator::new(meta(), OutputMode::Stream);

        let events: Vec<_> = translate_lines(lines, translator, Duration::from_millis(50), None)
            .collect()
            .await;

        assert_eq!(events.len(), 3);
        assert_eq!(events[2], TranslatorEvent::Done);
    }

    #[tokio::test]
    async fn test_driver_overall_deadline_ignores_keep_alives() {
        let pings = stream::unfold((), |()| async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            Some((Ok::<_, UpstreamError>(": ping".to_string()), ()))
        });
        let lines = stream::iter(vec![Ok(delta_line("partial", "typing"))]).chain(pings).boxed();
        let translator = StreamTranslator::new(meta(), OutputMode::Aggregate);
        let deadline = Instant::now() + Duration::from_millis(200);

        let events: Vec<_> = tokio::time::timeout(
            Duration::from_secs(5),
            translate_lines(lines, translator, Duration::from_secs(1), Some(deadline)).collect::<Vec<_>>(),
        )
        .await
        .expect("deadline should end the drive");

        assert_eq!(events.len(), 1);
        let TranslatorEvent::Completion(completion) = &events[0] else { panic!("expected completion") };
        assert_eq!(completion.first_content(), Some("partial"));
    }
}
