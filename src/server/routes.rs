//! HTTP route handlers for the chat relay API.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderName, header};
use axum::response::IntoResponse;
use axum::response::sse::{Event, Sse};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::StreamExt;
use tracing::{debug, info};

use crate::chat::error::ChatError;
use crate::chat::query::{ensure_configured, validate_query};
use crate::conversation::store::StoreStats;

use super::dto::{
    ConversationView, HealthResponse, QueryRequest, QueryResponse, ServiceStatusResponse,
    StreamingChunk, StreamingQueryRequest,
};
use super::error::ApiError;
use super::state::AppState;

/// Prefix under which every route is mounted.
pub const API_PREFIX: &str = "/api/v1";

/// Create the API router with all routes.
pub fn create_router(state: Arc<AppState>) -> Router {
    let api = Router::new()
        .route("/health", get(health_check))
        .route("/query", post(query))
        .route("/query/stream", post(stream_query))
        .route("/query/status", get(query_status))
        .route("/conversation/{conversation_id}", get(get_conversation))
        .route("/conversations/stats", get(conversation_stats));

    Router::new().nest(API_PREFIX, api).with_state(state)
}

/// Health check endpoint.
async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        message: "API is running".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Answer a query in one piece.
async fn query(
    State(state): State<Arc<AppState>>,
    Json(request): Json<QueryRequest>,
) -> Result<Json<QueryResponse>, ApiError> {
    let outcome = state.query.answer(&request.query).await?;
    Ok(Json(QueryResponse::from(outcome)))
}

/// Stream a response as server-sent events and commit it to the conversation.
async fn stream_query(
    State(state): State<Arc<AppState>>,
    Json(request): Json<StreamingQueryRequest>,
) -> Result<impl IntoResponse, ApiError> {
    ensure_configured(state.backend.as_ref())?;
    validate_query(&request.query)?;

    let model = state.backend.model_name().to_string();
    let stream = state.bridge.start(request.query, request.conversation_id);
    let conversation_id = stream.conversation_id().to_string();
    info!(conversation_id = %conversation_id, "Streaming query started");

    let events = stream.map(move |event| {
        let chunk = StreamingChunk::from_event(event, &model, &conversation_id);
        Event::default().json_data(chunk)
    });

    Ok((
        [
            (header::CACHE_CONTROL, "no-cache"),
            (HeaderName::from_static("x-accel-buffering"), "no"),
        ],
        Sse::new(events),
    ))
}

/// Report whether the generation backend can serve requests.
async fn query_status(State(state): State<Arc<AppState>>) -> Json<ServiceStatusResponse> {
    let configured = state.backend.is_configured();
    let (status, message) = if configured {
        ("available", "AI service is ready")
    } else {
        ("unavailable", "AI service requires configuration")
    };

    Json(ServiceStatusResponse {
        status: status.to_string(),
        configured,
        model: configured.then(|| state.backend.model_name().to_string()),
        message: message.to_string(),
    })
}

/// Conversation history.
async fn get_conversation(
    State(state): State<Arc<AppState>>,
    Path(conversation_id): Path<String>,
) -> Result<Json<ConversationView>, ApiError> {
    let conversation = state
        .store
        .get(&conversation_id)
        .ok_or_else(|| ChatError::NotFound(conversation_id.clone()))?;

    debug!(conversation_id = %conversation_id, "Returning conversation history");
    Ok(Json(ConversationView::from(conversation)))
}

/// Conversation store statistics.
async fn conversation_stats(State(state): State<Arc<AppState>>) -> Json<StoreStats> {
    Json(state.store.stats())
}
