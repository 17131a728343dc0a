//! Route handler functions for all API endpoints.
//!
//! `POST /api/query` is the stateless bridge: validate, wait for a subprocess
//! slot, run the answering process and return its trimmed stdout. The session
//! endpoints run the same bridge but also record both sides of the exchange
//! in a conversation and return the recomputed displayed-courses list.

use std::time::Instant;

use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use calgpt_bridge::{preview, BridgeError};
use calgpt_chat::Message;
use calgpt_core::types::{CourseRecord, ParsedAnswer, QueryRequest};

use crate::error::ApiError;
use crate::state::AppState;

// =============================================================================
// Request / response types
// =============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct QueryResponse {
    /// Trimmed stdout of the answering process; plain text or a JSON object.
    pub answer: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
    pub active_sessions: usize,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionCreatedResponse {
    pub session_id: Uuid,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub session_id: Uuid,
    pub messages: Vec<Message>,
    pub displayed_courses: Vec<CourseRecord>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionQueryRequest {
    pub question: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionQueryResponse {
    /// The assistant message appended for this question.
    pub message: Message,
    pub displayed_courses: Vec<CourseRecord>,
}

fn rejection(err: JsonRejection) -> ApiError {
    ApiError::BadRequest(err.body_text())
}

fn session_id(path: Result<Path<Uuid>, PathRejection>) -> Result<Uuid, ApiError> {
    path.map(|Path(id)| id)
        .map_err(|e| ApiError::BadRequest(e.body_text()))
}

// =============================================================================
// Bridge
// =============================================================================

/// Acquire a slot, run the process and log the outcome.
/// Returns the trimmed payload and its parsed form.
async fn execute(
    state: &AppState,
    request: &QueryRequest,
) -> Result<(String, ParsedAnswer), BridgeError> {
    let permit = state.admission.acquire().await?;
    let started = Instant::now();
    let preview_chars = state.config.parser.preview_chars;

    match state.invoker.run(request).await {
        Ok(payload) => {
            let answer = state.parser.parse(&payload);
            let kind = if answer.is_structured() {
                "structured"
            } else {
                "plain"
            };
            info!(
                outcome = "success",
                kind,
                queued_ms = permit.waited().as_millis() as u64,
                elapsed_ms = started.elapsed().as_millis() as u64,
                preview = %preview(&payload, preview_chars),
                "Query answered"
            );
            Ok((payload, answer))
        }
        Err(e) => {
            warn!(
                outcome = "failure",
                elapsed_ms = started.elapsed().as_millis() as u64,
                error = %preview(&e.to_string(), preview_chars),
                "Query failed"
            );
            Err(e)
        }
    }
}

// =============================================================================
// Handlers
// =============================================================================

/// POST /api/query - answer one question statelessly.
pub async fn query(
    State(state): State<AppState>,
    payload: Result<Json<QueryRequest>, JsonRejection>,
) -> Result<Json<QueryResponse>, ApiError> {
    let Json(request) = payload.map_err(rejection)?;
    let request = request.normalized()?;

    info!(
        question = %preview(&request.question, state.config.parser.preview_chars),
        history_turns = request.chat_history.len(),
        "Query received"
    );

    let (answer, _) = execute(&state, &request).await?;
    Ok(Json(QueryResponse { answer }))
}

/// POST /api/sessions - start a conversation.
pub async fn create_session(
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<SessionCreatedResponse>), ApiError> {
    let session_id = state.store.create()?;
    info!(session_id = %session_id, "Session created");
    Ok((StatusCode::CREATED, Json(SessionCreatedResponse { session_id })))
}

/// GET /api/sessions/{id} - conversation history and displayed courses.
pub async fn get_session(
    State(state): State<AppState>,
    path: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<SessionResponse>, ApiError> {
    let id = session_id(path)?;
    let convo = state.store.get(id)?;
    Ok(Json(SessionResponse {
        session_id: id,
        messages: convo.history().to_vec(),
        displayed_courses: convo.displayed_courses().to_vec(),
    }))
}

/// DELETE /api/sessions/{id}
pub async fn delete_session(
    State(state): State<AppState>,
    path: Result<Path<Uuid>, PathRejection>,
) -> Result<StatusCode, ApiError> {
    let id = session_id(path)?;
    state.store.delete(id)?;
    info!(session_id = %id, "Session deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/sessions/{id}/query - ask within a conversation.
///
/// A failed query is recorded as an `Error: ...` assistant message and still
/// returns 200, so the conversation and the displayed courses stay in step
/// with what the user saw.
pub async fn session_query(
    State(state): State<AppState>,
    path: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<SessionQueryRequest>, JsonRejection>,
) -> Result<Json<SessionQueryResponse>, ApiError> {
    let id = session_id(path)?;
    let Json(body) = payload.map_err(rejection)?;

    let (history, question) = state.store.update(id, |convo| {
        let history = convo.to_history_turns();
        convo
            .push_user(&body.question)
            .map(|m| (history, m.text.clone()))
    })??;

    info!(
        session_id = %id,
        question = %preview(&question, state.config.parser.preview_chars),
        history_turns = history.len(),
        "Session query received"
    );

    let request = QueryRequest::new(question).with_history(history);
    let outcome = execute(&state, &request).await;

    let (message, displayed_courses) = state.store.update(id, |convo| {
        let message = match outcome {
            Ok((_, answer)) => convo.push_assistant(answer).clone(),
            Err(e) => convo.push_error(&e.client_message()).clone(),
        };
        (message, convo.displayed_courses().to_vec())
    })?;

    Ok(Json(SessionQueryResponse {
        message,
        displayed_courses,
    }))
}

/// GET /health - health check.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        active_sessions: state.store.len(),
    })
}
