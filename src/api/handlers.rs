//! HTTP request handlers

use super::types::{
    ContinueRequest, ErrorResponse, HealthResponse, SessionListResponse, SessionsQuery, StartRequest,
};
use super::AppState;
use crate::engine::{TriageError, TurnResponse};
use axum::{
    async_trait,
    extract::{rejection::JsonRejection, FromRequestParts, Query, State},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};

/// Header carrying the caller's identity, set by the upstream auth layer
pub const USER_ID_HEADER: &str = "x-user-id";

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Triage turns
        .route("/api/chat/start", post(start_session))
        .route("/api/chat/continue", post(continue_session))
        // History
        .route("/api/chat/sessions", get(list_sessions))
        // Probes
        .route("/api/health", get(health))
        .route("/version", get(get_version))
        .with_state(state)
}

// ============================================================
// Identity
// ============================================================

/// Caller identity taken from [`USER_ID_HEADER`]
struct UserId(String);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for UserId {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(|v| UserId(v.to_string()))
            .ok_or(AppError::Unauthorized)
    }
}

// ============================================================
// Chat Handlers
// ============================================================

async fn start_session(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    payload: Result<Json<StartRequest>, JsonRejection>,
) -> Result<Json<TurnResponse>, AppError> {
    let Json(req) = payload?;
    let response = state.engine.start(&user_id, &req.raw_symptoms).await?;
    Ok(Json(response))
}

async fn continue_session(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    payload: Result<Json<ContinueRequest>, JsonRejection>,
) -> Result<Json<TurnResponse>, AppError> {
    let Json(req) = payload?;
    let response = state
        .engine
        .continue_session(
            &req.session_id,
            &user_id,
            &req.symptom_token,
            req.has_symptom,
            req.severity,
        )
        .await?;
    Ok(Json(response))
}

async fn list_sessions(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Query(query): Query<SessionsQuery>,
) -> Result<Json<SessionListResponse>, AppError> {
    let sessions = state
        .engine
        .list_sessions(&user_id, query.effective_limit())
        .await?;
    Ok(Json(SessionListResponse { sessions }))
}

// ============================================================
// Probes
// ============================================================

async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    match state.db.ping() {
        Ok(()) => (
            StatusCode::OK,
            Json(HealthResponse {
                status: "ok",
                database: "connected",
            }),
        ),
        Err(e) => {
            tracing::error!(error = %e, "Health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse {
                    status: "degraded",
                    database: "unreachable",
                }),
            )
        }
    }
}

async fn get_version() -> &'static str {
    concat!("triage-desk ", env!("CARGO_PKG_VERSION"))
}

// ============================================================
// Error Handling
// ============================================================

#[derive(Debug)]
enum AppError {
    BadRequest(String),
    Unauthorized,
    NotFound(String),
    Unavailable(String),
    Internal(String),
}

impl From<TriageError> for AppError {
    fn from(e: TriageError) -> Self {
        match e {
            TriageError::Validation(msg) => AppError::BadRequest(msg),
            TriageError::NotFound => AppError::NotFound(e.to_string()),
            TriageError::ClassifierUnavailable(_) => {
                AppError::Unavailable("Prediction service is unavailable, please try again".to_string())
            }
            TriageError::Persistence(_) | TriageError::Internal(_) => {
                tracing::error!(error = %e, "Turn failed");
                AppError::Internal("Internal server error".to_string())
            }
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, ErrorResponse::new(msg)),
            AppError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                ErrorResponse::new(format!("Missing {USER_ID_HEADER} header")),
            ),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, ErrorResponse::new(msg)),
            AppError::Unavailable(msg) => (
                StatusCode::SERVICE_UNAVAILABLE,
                ErrorResponse::new(msg).retryable(),
            ),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, ErrorResponse::new(msg)),
        };

        (status, Json(body)).into_response()
    }
}
