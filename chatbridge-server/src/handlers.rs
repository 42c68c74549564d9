//! Route handlers

use crate::{models, AppState, SERVICE_NAME};
use axum::body::{Body, Bytes};
use axum::extract::{Path, State};
use axum::http::header::{CACHE_CONTROL, CONNECTION, CONTENT_TYPE};
use axum::http::{HeaderName, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chatbridge_core::{GatewayError, GatewayReply};
use futures::StreamExt;
use serde_json::{json, Value};
use std::convert::Infallible;
use tracing::{error, warn};

static X_ACCEL_BUFFERING: HeaderName = HeaderName::from_static("x-accel-buffering");

/// A gateway error rendered as an OpenAI error envelope
#[derive(Debug)]
pub struct ApiError(pub GatewayError);

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            error!(code = self.0.code(), error = %self.0, "request failed");
        } else {
            warn!(code = self.0.code(), error = %self.0, "request rejected");
        }
        (status, Json(self.0.envelope())).into_response()
    }
}

pub async fn chat_completions(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Response, ApiError> {
    // Parsed here rather than with `Json` so malformed bodies still get an
    // OpenAI error envelope.
    let body: Value = serde_json::from_slice(&body)
        .map_err(|e| GatewayError::InvalidRequest(format!("Invalid JSON body: {}", e)))?;

    match state.gateway.chat_completions(body).await? {
        GatewayReply::Completion(document) => Ok(Json(document).into_response()),
        GatewayReply::Stream(frames) => {
            let body = Body::from_stream(frames.map(Ok::<_, Infallible>));
            Ok((
                [
                    (CONTENT_TYPE, "text/event-stream"),
                    (CACHE_CONTROL, "no-cache"),
                    (CONNECTION, "keep-alive"),
                    (X_ACCEL_BUFFERING.clone(), "no"),
                ],
                body,
            )
                .into_response())
        }
    }
}

pub async fn list_models() -> Json<Value> {
    Json(models::catalog())
}

pub async fn get_model(Path(id): Path<String>) -> Json<Value> {
    Json(models::lookup(&id))
}

pub async fn health(State(state): State<AppState>) -> Json<Value> {
    let providers = state.gateway.registry().available().await.len();
    Json(json!({
        "status": "healthy",
        "service": SERVICE_NAME,
        "providers": providers,
    }))
}
