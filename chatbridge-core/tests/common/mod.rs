//! Shared fixtures for integration tests

#![allow(dead_code)]

use chatbridge_core::config::GatewayConfig;
use chatbridge_core::http::RetryPolicy;
use serde_json::{json, Value};
use std::fs;
use std::future::Future;
use std::path::Path;
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};

pub const QWEN_HEADER_TXT: &str = "POST /api/v2/chat/completions?chat_id=abc HTTP/1.1\n\
Accept: application/json\n\
Content-Type: application/json\n\
Content-Length: 1234\n\
Cookie: session=one\n\
Cookie: region=two\n\
X-Trace: id:with:colons\n";

/// Route `tracing` output through the test harness; `RUST_LOG` selects levels
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Write a provider descriptor directory under `root`
pub fn write_provider(root: &Path, name: &str, metadata: Value, header_txt: &str, payload: Value) {
    let dir = root.join(name);
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("metadata.json"), metadata.to_string()).unwrap();
    fs::write(dir.join("header.txt"), header_txt).unwrap();
    fs::write(dir.join("payload.json"), payload.to_string()).unwrap();
}

/// The template shape used by the chat-style provider in these tests
pub fn qwen_template() -> Value {
    json!({
        "chat_id": "abc",
        "stream": true,
        "timestamp": 0,
        "incremental_output": true,
        "messages": [{
            "role": "user",
            "content": "",
            "timestamp": 0,
            "models": ["qwen3-max"],
            "chat_type": "t2t",
            "feature_config": {"thinking_enabled": false}
        }]
    })
}

/// Register a provider pointing at `address` over plain http
pub fn write_local_provider(root: &Path, name: &str, address: &str, stream: bool) {
    write_provider(
        root,
        name,
        json!({"host": address, "scheme": "http", "stream": stream}),
        QWEN_HEADER_TXT,
        qwen_template(),
    );
}

/// Config with fast retries and short timeouts, reading descriptors from `root`
pub fn test_config(root: &Path) -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.providers_dir = root.to_path_buf();
    config.upstream.request_timeout_ms = 5_000;
    config.upstream.connect_timeout_ms = 1_000;
    config.upstream.idle_timeout_ms = 2_000;
    config.upstream.retry = RetryPolicy {
        max_retries: 2,
        initial_delay_ms: 10,
        max_delay_ms: 50,
        ..RetryPolicy::default()
    };
    config
}

pub fn delta_doc(content: &str, status: &str) -> Value {
    json!({"choices": [{"delta": {"role": "assistant", "content": content, "status": status}}]})
}

/// Encode documents as an upstream event-stream body
pub fn sse_body(documents: &[Value]) -> String {
    documents
        .iter()
        .map(|doc| format!("data: {}\n\n", doc))
        .collect()
}

/// Decode a caller-facing event-stream body into its data payloads
pub fn frames(body: &str) -> Vec<String> {
    body.split("\n\n")
        .filter_map(|frame| frame.strip_prefix("data: "))
        .map(str::to_string)
        .collect()
}

/// Response head of a chunked event stream, for raw upstreams
pub const SSE_RESPONSE_HEAD: &str = "HTTP/1.1 200 OK\r\n\
Content-Type: text/event-stream\r\n\
Transfer-Encoding: chunked\r\n\r\n";

/// Encode `data` as one HTTP/1.1 chunk
pub fn http_chunk(data: &str) -> String {
    format!("{:x}\r\n{}\r\n", data.len(), data)
}

/// Serve one connection by hand: read the request, then let `respond`
/// write whatever it likes. Returns the address to point a provider at.
pub async fn raw_upstream<F, Fut>(respond: F) -> String
where
    F: FnOnce(TcpStream) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap().to_string();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        read_request(&mut socket).await;
        respond(socket).await;
    });
    address
}

/// Consume one request head and its Content-Length body
async fn read_request(socket: &mut TcpStream) {
    let mut received = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
        let n = socket.read(&mut buf).await.unwrap();
        if n == 0 {
            return;
        }
        received.extend_from_slice(&buf[..n]);

        let Some(head_end) = received.windows(4).position(|w| w == b"\r\n\r\n") else {
            continue;
        };
        let head = String::from_utf8_lossy(&received[..head_end]).to_ascii_lowercase();
        let body_len = head
            .lines()
            .find_map(|line| line.strip_prefix("content-length:"))
            .and_then(|value| value.trim().parse::<usize>().ok())
            .unwrap_or(0);
        if received.len() >= head_end + 4 + body_len {
            return;
        }
    }
}
