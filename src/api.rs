//! REST API Server for the sales compensation agent
//!
//! Exposes one routed turn per request. The caller owns conversation history
//! and sends it along; nothing is remembered between requests.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use uuid::Uuid;

use crate::agent::Orchestrator;
use crate::models::{
    Category, ConversationHistory, HistoryMessage, Request, Role, TurnReport,
};

/// =============================
/// Request Models
/// =============================

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TurnRequest {
    pub request_text: String,
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub history: ConversationHistory,
}

#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    pub response_text: String,
}

#[derive(Debug, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub conversation_id: Option<String>,
    pub messages: Vec<ChatMessage>,
}

/// =============================
/// Response Wrapper
/// =============================

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse {
    pub success: bool,
    pub data: Option<serde_json::Value>,
    pub error: Option<String>,
    pub timestamp: String,
}

impl ApiResponse {
    pub fn success<T: Serialize>(data: T) -> Self {
        Self {
            success: true,
            data: serde_json::to_value(data).ok(),
            error: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TurnResponse {
    pub turn_id: Uuid,
    pub conversation_id: Uuid,
    pub outcome: String,
    pub category: Option<Category>,
    /// `None` only for rejected turns
    pub response_text: Option<String>,
}

impl From<&TurnReport> for TurnResponse {
    fn from(report: &TurnReport) -> Self {
        Self {
            turn_id: report.turn_id,
            conversation_id: report.conversation_id,
            outcome: report.outcome.kind().to_string(),
            category: report.outcome.category(),
            response_text: report.outcome.response_text().map(str::to_string),
        }
    }
}

/// =============================
/// API State
/// =============================

#[derive(Clone)]
pub struct ApiState {
    pub orchestrator: Arc<Orchestrator>,
}

/// =============================
/// Helpers
/// =============================

fn stable_uuid_from_string(input: &str) -> Uuid {
    use sha2::{Digest, Sha256};

    let hash = Sha256::digest(input.as_bytes());
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&hash[..16]);

    // Set UUID version (4) and variant (RFC4122) bits.
    bytes[6] = (bytes[6] & 0x0f) | 0x40;
    bytes[8] = (bytes[8] & 0x3f) | 0x80;

    Uuid::from_bytes(bytes)
}

/// Accept UUIDs as-is, hash any other opaque thread id, mint one if absent
fn conversation_id_from(value: Option<&str>) -> Uuid {
    match value {
        Some(v) if !v.trim().is_empty() => {
            Uuid::parse_str(v).unwrap_or_else(|_| stable_uuid_from_string(v))
        }
        _ => Uuid::new_v4(),
    }
}

fn parse_role(role: &str) -> Option<Role> {
    match role.to_lowercase().as_str() {
        "user" => Some(Role::User),
        "assistant" | "agent" | "model" => Some(Role::Assistant),
        _ => None,
    }
}

/// =============================
/// Health Endpoint
/// =============================

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// =============================
/// Turn Endpoint
/// =============================

async fn run_turn(
    State(state): State<ApiState>,
    Json(req): Json<TurnRequest>,
) -> (StatusCode, Json<ApiResponse>) {
    if req.request_text.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::error("request_text must not be empty".into())),
        );
    }

    let conversation_id = conversation_id_from(req.conversation_id.as_deref());
    info!(conversation_id = %conversation_id, "Received turn request");

    let request = Request::new(req.request_text, conversation_id);
    let report = state.orchestrator.run_turn(&request, &req.history).await;

    (
        StatusCode::OK,
        Json(ApiResponse::success(TurnResponse::from(&report))),
    )
}

/// =============================
/// Chat Endpoint
/// =============================

async fn chat_handler(
    State(state): State<ApiState>,
    Json(req): Json<ChatRequest>,
) -> (StatusCode, Json<ApiResponse>) {
    let last_user_message_index = req
        .messages
        .iter()
        .rposition(|m| parse_role(&m.role) == Some(Role::User));

    let Some(last_user_message_index) = last_user_message_index else {
        return (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::error("No user message found".into())),
        );
    };

    // Earlier exchanges become history; system messages are not part of it.
    let history = ConversationHistory::new(
        req.messages[..last_user_message_index]
            .iter()
            .filter_map(|m| {
                parse_role(&m.role).map(|role| HistoryMessage {
                    role,
                    content: m.content.clone(),
                })
            })
            .collect(),
    );

    let turn = TurnRequest {
        request_text: req.messages[last_user_message_index].content.clone(),
        conversation_id: req.conversation_id,
        history,
    };

    run_turn(State(state), Json(turn)).await
}

/// =============================
/// Audit Endpoint
/// =============================

fn parse_turn_id(raw: &str) -> std::result::Result<Uuid, (StatusCode, Json<ApiResponse>)> {
    Uuid::parse_str(raw).map_err(|_| {
        (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::error("turn_id must be a UUID".into())),
        )
    })
}

fn turn_not_found(turn_id: Uuid) -> (StatusCode, Json<ApiResponse>) {
    (
        StatusCode::NOT_FOUND,
        Json(ApiResponse::error(format!("Turn {} not found", turn_id))),
    )
}

async fn get_turn(
    State(state): State<ApiState>,
    Path(turn_id): Path<String>,
) -> (StatusCode, Json<ApiResponse>) {
    let turn_id = match parse_turn_id(&turn_id) {
        Ok(id) => id,
        Err(rejection) => return rejection,
    };

    match state.orchestrator.turn_log().get(turn_id).await {
        Some(record) => (StatusCode::OK, Json(ApiResponse::success(record))),
        None => turn_not_found(turn_id),
    }
}

/// Check a response text against the digest recorded for the turn
async fn verify_turn(
    State(state): State<ApiState>,
    Path(turn_id): Path<String>,
    Json(req): Json<VerifyRequest>,
) -> (StatusCode, Json<ApiResponse>) {
    let turn_id = match parse_turn_id(&turn_id) {
        Ok(id) => id,
        Err(rejection) => return rejection,
    };

    let turn_log = state.orchestrator.turn_log();
    if turn_log.get(turn_id).await.is_none() {
        return turn_not_found(turn_id);
    }

    let verified = turn_log.verify_response(turn_id, &req.response_text).await;
    info!(turn_id = %turn_id, verified, "Verified turn response");

    (
        StatusCode::OK,
        Json(ApiResponse::success(serde_json::json!({
            "turn_id": turn_id,
            "verified": verified
        }))),
    )
}

/// =============================
/// Router
/// =============================

pub fn create_router(orchestrator: Arc<Orchestrator>) -> Router {
    let state = ApiState { orchestrator };

    Router::new()
        .route("/health", get(health))
        .route("/api/turn", post(run_turn))
        .route("/api/chat", post(chat_handler))
        .route("/api/turns/:turn_id", get(get_turn))
        .route("/api/turns/:turn_id/verify", post(verify_turn))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// =============================
/// Server Startup
/// =============================

pub async fn start_server(
    orchestrator: Arc<Orchestrator>,
    port: u16,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let router = create_router(orchestrator);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    info!("API Server listening on http://0.0.0.0:{}", port);
    info!("Local: http://127.0.0.1:{}", port);

    axum::serve(listener, router).await?;

    Ok(())
}
