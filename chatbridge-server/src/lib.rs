//! OpenAI-compatible HTTP front end for the chatbridge gateway
//!
//! Routes:
//! - `POST /v1/chat/completions`
//! - `GET /v1/models`, `GET /v1/models/{id}`
//! - `GET /health`

mod handlers;
mod models;

pub use handlers::ApiError;
pub use models::{model_object, MODEL_CATALOG};

use axum::routing::{get, post};
use axum::Router;
use chatbridge_core::Gateway;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

/// Name reported by the health endpoint
pub const SERVICE_NAME: &str = "chatbridge";

#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<Gateway>,
}

impl AppState {
    pub fn new(gateway: Gateway) -> Self {
        Self {
            gateway: Arc::new(gateway),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/v1/chat/completions", post(handlers::chat_completions))
        .route("/v1/models", get(handlers::list_models))
        .route("/v1/models/{id}", get(handlers::get_model))
        .route("/health", get(handlers::health))
        .with_state(state)
}

/// Serve until the process receives Ctrl-C
pub async fn serve(listener: TcpListener, state: AppState) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "chatbridge listening");
    }
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("shutdown signal received");
    }
}
