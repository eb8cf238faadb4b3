#[cfg(test)]
#[path = "api_test.rs"]
mod tests;

use axum::Json;
use axum::Router;
use axum::extract::rejection::JsonRejection;
use axum::extract::{ Query, State };
use axum::middleware;
use axum::routing::{ get, post };
use chrono::Utc;
use log::{ debug, error };
use serde::{ Deserialize, Serialize };
use std::sync::Arc;

use crate::history::ConversationStore;
use crate::llm::ChatClient;
use crate::models::chat::ChatMessage;
use crate::server::cors;
use crate::server::error::ApiError;
use crate::server::rate_limit::{ rate_limit_middleware, IpRateLimiter };

const MISSING_FIELDS: &str = "userId and message are required";
const MISSING_USER_ID: &str = "userId is required";

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ConversationStore>,
    pub chat: Option<Arc<dyn ChatClient>>,
    pub limiter: Arc<IpRateLimiter>,
    pub system_prompt: String,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct ChatRequest {
    pub user_id: Option<String>,
    pub message: Option<String>,
}

#[derive(Serialize)]
pub struct ChatResponse {
    pub reply: String,
}

#[derive(Serialize)]
struct HealthResponse {
    ok: bool,
    timestamp: i64,
}

#[derive(Deserialize)]
struct HistoryQuery {
    #[serde(rename = "userId")]
    user_id: Option<String>,
}

#[derive(Serialize)]
struct HistoryResponse {
    #[serde(rename = "userId")]
    user_id: String,
    messages: Vec<ChatMessage>,
}

#[derive(Serialize)]
struct OkResponse {
    ok: bool,
}

pub fn build_router(state: AppState, allowed_origins: &[String]) -> Router {
    Router::new()
        .route("/api/chat", post(chat_handler))
        .route("/api/chat/history", get(get_history_handler).delete(clear_history_handler))
        .route("/health", get(health_handler))
        .layer(middleware::from_fn_with_state(state.clone(), rate_limit_middleware))
        .layer(cors::layer(allowed_origins))
        .layer(middleware::from_fn(cors::preflight_no_content))
        .with_state(state)
}

async fn chat_handler(
    State(state): State<AppState>,
    body: Result<Json<ChatRequest>, JsonRejection>
) -> Result<Json<ChatResponse>, ApiError> {
    let Json(req) = body.map_err(|_| ApiError::Validation(MISSING_FIELDS.to_string()))?;

    let user_id = req.user_id.as_deref().unwrap_or_default().trim().to_string();
    let message = req.message.as_deref().unwrap_or_default().trim().to_string();
    if user_id.is_empty() || message.is_empty() {
        return Err(ApiError::Validation(MISSING_FIELDS.to_string()));
    }

    let chat = state.chat.as_ref().ok_or(ApiError::Configuration)?;
    debug!("Chat request from user '{}'", user_id);

    let history = state.store
        .get_history(&user_id).await
        .map_err(|e| {
            error!("History read failed for '{}': {}", user_id, e);
            ApiError::Internal
        })?;

    state.store
        .append(&user_id, ChatMessage::user(&message)).await
        .map_err(|e| {
            error!("History write (user) failed for '{}': {}", user_id, e);
            ApiError::Internal
        })?;

    // The user turn above stays persisted even when the upstream call
    // fails; there is no rollback.
    let reply = chat
        .complete(&state.system_prompt, &history, &message).await
        .map_err(|e| {
            error!("Upstream completion failed for '{}': {}", user_id, e);
            ApiError::from(e)
        })?;

    state.store
        .append(&user_id, ChatMessage::assistant(&reply)).await
        .map_err(|e| {
            error!("History write (assistant) failed for '{}': {}", user_id, e);
            ApiError::Internal
        })?;

    Ok(Json(ChatResponse { reply }))
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        ok: true,
        timestamp: Utc::now().timestamp_millis(),
    })
}

async fn get_history_handler(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>
) -> Result<Json<HistoryResponse>, ApiError> {
    let user_id = required_user_id(query.user_id)?;
    let messages = state.store
        .get_history(&user_id).await
        .map_err(|e| {
            error!("History read failed for '{}': {}", user_id, e);
            ApiError::Internal
        })?;

    Ok(Json(HistoryResponse { user_id, messages }))
}

async fn clear_history_handler(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>
) -> Result<Json<OkResponse>, ApiError> {
    let user_id = required_user_id(query.user_id)?;
    state.store
        .clear(&user_id).await
        .map_err(|e| {
            error!("History clear failed for '{}': {}", user_id, e);
            ApiError::Internal
        })?;

    Ok(Json(OkResponse { ok: true }))
}

fn required_user_id(raw: Option<String>) -> Result<String, ApiError> {
    let user_id = raw.unwrap_or_default().trim().to_string();
    if user_id.is_empty() {
        return Err(ApiError::Validation(MISSING_USER_ID.to_string()));
    }
    Ok(user_id)
}
