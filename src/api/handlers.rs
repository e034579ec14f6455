//! HTTP request handlers

use super::sse::sse_stream;
use super::types::{
    ChatRequest, CheckpointResponse, ConversationListResponse, CreateConversationRequest,
    ErrorResponse, HistoryQuery, HistoryResponse, RenameRequest, RunListResponse,
    StepListResponse, SuccessResponse, ToolsResponse,
};
use super::AppState;
use crate::db::{ConversationRecord, Run, Step, StoreError};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures::TryStreamExt;

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Conversation registry
        .route(
            "/api/conversations",
            get(list_conversations).post(create_conversation),
        )
        .route(
            "/api/conversations/:thread_id",
            axum::routing::put(rename_conversation).delete(delete_conversation),
        )
        // Turn controller
        .route("/api/threads/:thread_id/messages", post(send_message))
        .route("/api/threads/:thread_id/state", get(get_state))
        .route("/api/threads/:thread_id/history", get(get_history))
        // Audit trail
        .route("/api/runs", get(list_runs))
        .route("/api/runs/latest", get(get_latest_run))
        .route("/api/runs/:run_id", get(get_run))
        .route("/api/runs/:run_id/steps", get(get_steps))
        .route("/api/runs/:run_id/steps/:step_id", get(get_step))
        .route("/api/tools", get(list_tools))
        .route("/version", get(get_version))
        .with_state(state)
}

// ============================================================
// Conversations
// ============================================================

async fn list_conversations(
    State(state): State<AppState>,
) -> Result<Json<ConversationListResponse>, AppError> {
    let conversations = state.db.list_conversations().await?;
    Ok(Json(ConversationListResponse { conversations }))
}

async fn create_conversation(
    State(state): State<AppState>,
    Json(req): Json<CreateConversationRequest>,
) -> Result<Json<ConversationRecord>, AppError> {
    let thread_id = req
        .thread_id
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let record = state.db.create_conversation(&thread_id, &req.name).await?;
    tracing::info!(thread_id = %record.thread_id, "Conversation created");
    Ok(Json(record))
}

async fn rename_conversation(
    State(state): State<AppState>,
    Path(thread_id): Path<String>,
    Json(req): Json<RenameRequest>,
) -> Result<Json<ConversationRecord>, AppError> {
    let record = state.db.rename_conversation(&thread_id, &req.name).await?;
    Ok(Json(record))
}

async fn delete_conversation(
    State(state): State<AppState>,
    Path(thread_id): Path<String>,
) -> Result<Json<SuccessResponse>, AppError> {
    state.db.delete_conversation(&thread_id).await?;
    Ok(Json(SuccessResponse { success: true }))
}

// ============================================================
// Threads
// ============================================================

async fn send_message(
    State(state): State<AppState>,
    Path(thread_id): Path<String>,
    Json(req): Json<ChatRequest>,
) -> Result<impl IntoResponse, AppError> {
    if req.text.trim().is_empty() {
        return Err(AppError::BadRequest("Message text is empty".to_string()));
    }

    let updates = state.controller.advance(&thread_id, &req.text);
    tracing::info!(thread_id = %thread_id, run_id = %updates.run_id(), "Message accepted");
    Ok(sse_stream(updates))
}

async fn get_state(
    State(state): State<AppState>,
    Path(thread_id): Path<String>,
) -> Result<Json<CheckpointResponse>, AppError> {
    let checkpoint = state
        .db
        .get_checkpoint(&thread_id, None)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("No checkpoints for thread {thread_id}")))?;
    Ok(Json(checkpoint.into()))
}

async fn get_history(
    State(state): State<AppState>,
    Path(thread_id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<HistoryResponse>, AppError> {
    let checkpoints = state
        .db
        .list_checkpoints(&thread_id, query.before.as_deref(), query.limit)
        .map_ok(CheckpointResponse::from)
        .try_collect()
        .await?;
    Ok(Json(HistoryResponse { checkpoints }))
}

// ============================================================
// Runs
// ============================================================

async fn list_runs(State(state): State<AppState>) -> Result<Json<RunListResponse>, AppError> {
    let runs = state.db.list_runs().await?;
    Ok(Json(RunListResponse { runs }))
}

async fn get_run(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
) -> Result<Json<Run>, AppError> {
    state
        .db
        .get_run(&run_id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Run not found: {run_id}")))
}

async fn get_latest_run(State(state): State<AppState>) -> Result<Json<Run>, AppError> {
    state
        .db
        .latest_run()
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound("No runs recorded".to_string()))
}

async fn get_steps(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
) -> Result<Json<StepListResponse>, AppError> {
    if state.db.get_run(&run_id).await?.is_none() {
        return Err(AppError::NotFound(format!("Run not found: {run_id}")));
    }
    let steps = state.db.get_steps(&run_id).await?;
    Ok(Json(StepListResponse { steps }))
}

async fn get_step(
    State(state): State<AppState>,
    Path((run_id, step_id)): Path<(String, String)>,
) -> Result<Json<Step>, AppError> {
    state
        .db
        .get_step(&run_id, &step_id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Step not found: {run_id}/{step_id}")))
}

async fn list_tools(State(state): State<AppState>) -> Json<ToolsResponse> {
    Json(ToolsResponse {
        tools: state.tools.as_ref().clone(),
    })
}

async fn get_version() -> &'static str {
    concat!("meta-prompter ", env!("CARGO_PKG_VERSION"))
}

// ============================================================
// Error Handling
// ============================================================

#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    NotFound(String),
    Unavailable(String),
    Internal(String),
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::InvalidQuery(_) | StoreError::ConversationExists(_) => {
                AppError::BadRequest(e.to_string())
            }
            StoreError::ConversationNotFound(_) => AppError::NotFound(e.to_string()),
            StoreError::StorageUnavailable(_) => AppError::Unavailable(e.to_string()),
            StoreError::Decode { .. } | StoreError::Database(_) => {
                tracing::error!(error = %e, "Storage error");
                AppError::Internal(e.to_string())
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let retryable = status == StatusCode::SERVICE_UNAVAILABLE;
        let body = Json(ErrorResponse::new(message, retryable));
        (status, body).into_response()
    }
}
