//! REST API Server for the CardGenius advisor
//!
//! Exposes chat turns and direct recommendation lookups over HTTP

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::agent::CardAgent;
use crate::conversation::ConversationTurn;
use crate::error::AdvisorError;
use crate::gateway::RecommendationService;
use crate::spending::SpendingRecord;

/// =============================
/// Request Models
/// =============================

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ChatTurnRequest {
    pub message: String,
    #[serde(default, alias = "context")]
    pub history: Vec<ConversationTurn>,
    #[serde(default, alias = "spending_data")]
    pub accumulated: SpendingRecord,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RecommendationsRequest {
    #[serde(default)]
    pub spending_data: SpendingRecord,
}

/// =============================
/// Error Response
/// =============================

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

/// Error mapped to a status and a user-safe message
pub struct ApiError(AdvisorError);

impl From<AdvisorError> for ApiError {
    fn from(e: AdvisorError) -> Self {
        Self(e)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self(AdvisorError::InvalidRequest(rejection.body_text()))
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            AdvisorError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            AdvisorError::ExternalServiceTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            AdvisorError::Gateway { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            AdvisorError::Completion(_)
            | AdvisorError::ExtractionFormat(_)
            | AdvisorError::HttpError(_) => StatusCode::BAD_GATEWAY,
            AdvisorError::Config(_)
            | AdvisorError::SerializationError(_)
            | AdvisorError::IoError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn user_message(&self) -> String {
        match &self.0 {
            AdvisorError::InvalidRequest(detail) => detail.clone(),
            AdvisorError::ExternalServiceTimeout { service, .. } => {
                format!("The {} took too long to respond. Please try again.", service)
            }
            AdvisorError::Gateway { .. } => "Failed to fetch card recommendations".to_string(),
            AdvisorError::Completion(_)
            | AdvisorError::ExtractionFormat(_)
            | AdvisorError::HttpError(_) => {
                "An upstream service is unavailable. Please try again.".to_string()
            }
            _ => "Internal server error".to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(status = status.as_u16(), error = %self.0, "Request failed");
        } else {
            warn!(status = status.as_u16(), error = %self.0, "Request rejected");
        }

        (
            status,
            Json(ErrorBody {
                error: self.user_message(),
            }),
        )
            .into_response()
    }
}

/// =============================
/// API State
/// =============================

#[derive(Clone)]
pub struct ApiState {
    pub agent: Arc<CardAgent>,
    pub gateway: Arc<dyn RecommendationService>,
}

impl ApiState {
    pub fn new(agent: Arc<CardAgent>) -> Self {
        let gateway = agent.gateway();
        Self { agent, gateway }
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
/// Chat Turn Endpoint
/// =============================

async fn chat_turn_handler(
    State(state): State<ApiState>,
    body: Result<Json<ChatTurnRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(req) = body?;
    info!(
        history = req.history.len(),
        known = req.accumulated.len(),
        "Received chat turn"
    );

    let response = state
        .agent
        .chat_turn(&req.message, &req.history, &req.accumulated)
        .await?;

    Ok((StatusCode::OK, Json(response)).into_response())
}

/// =============================
/// Recommendations Endpoint
/// =============================

async fn recommendations_handler(
    State(state): State<ApiState>,
    body: Result<Json<RecommendationsRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(req) = body?;
    info!(known = req.spending_data.len(), "Received recommendations request");

    let payload = state.gateway.fetch_raw(&req.spending_data).await?;
    Ok((StatusCode::OK, Json(payload)).into_response())
}

/// =============================
/// Router
/// =============================

pub fn create_router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/chat-turn", post(chat_turn_handler))
        .route("/api/chat", post(chat_turn_handler))
        .route("/recommendations", post(recommendations_handler))
        .route("/api/card-recommendations", post(recommendations_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// =============================
/// Server Startup
/// =============================

pub async fn start_server(
    state: ApiState,
    port: u16,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    info!("API Server listening on http://0.0.0.0:{}", port);
    info!("Local: http://127.0.0.1:{}", port);

    axum::serve(listener, router).await?;

    Ok(())
}
