//! HTTP request handlers.

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{HeaderName, HeaderValue},
    response::{IntoResponse, Response},
    Json,
};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use super::server::AppState;
use super::types::{ChatRequest, ChatResponse, TestAllRequest};
use crate::error::Error;
use crate::storage;

/// Response header: correlation ID of the dispatch (UUID v4).
pub const REQUEST_ID_HEADER: &str = "x-chatrelay-request-id";

const DEFAULT_OUTCOME_LIMIT: u32 = 50;
const MAX_OUTCOME_LIMIT: u32 = 500;

/// Handle POST /chat
///
/// Upstream failures still answer 200 with a failed outcome; only an
/// invalid request is turned into an error response.
pub async fn chat(State(state): State<AppState>, body: Bytes) -> Result<Response, Error> {
    let request: ChatRequest = parse_json_body(&body)?;
    tracing::info!(
        endpoint = ?request.endpoint,
        question_chars = request.question.chars().count(),
        "Received chat request"
    );

    if request.question.trim().is_empty() {
        return Err(Error::BadRequest("question must not be empty".to_string()));
    }

    let dispatch = state
        .dispatcher
        .single_dispatch(&request.question, request.endpoint)
        .await
        .inspect_err(|e| tracing::warn!(error = %e, "Chat request rejected"))?;

    let mut response = Json(ChatResponse {
        endpoint_index: dispatch.endpoint_index,
        data: dispatch.outcome,
    })
    .into_response();

    if let Ok(value) = HeaderValue::from_str(&dispatch.correlation_id) {
        response
            .headers_mut()
            .insert(HeaderName::from_static(REQUEST_ID_HEADER), value);
    }

    Ok(response)
}

/// Handle POST /test_all
///
/// The body is optional; an empty body asks the default question.
pub async fn test_all(State(state): State<AppState>, body: Bytes) -> Result<Response, Error> {
    let request = if body.iter().all(u8::is_ascii_whitespace) {
        TestAllRequest::default()
    } else {
        parse_json_body(&body)?
    };

    tracing::info!(
        question_chars = request.question.chars().count(),
        "Received broadcast request"
    );

    let report = state.dispatcher.broadcast_dispatch(&request.question).await;
    Ok(Json(report).into_response())
}

/// Decode a JSON request body, mapping any failure to a 400.
fn parse_json_body<T: DeserializeOwned>(body: &[u8]) -> Result<T, Error> {
    serde_json::from_slice(body)
        .map_err(|e| Error::BadRequest(format!("Invalid JSON body: {}", e)))
}

/// Handle GET /health
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "chatrelay",
        "endpoints": state.dispatcher.registry().count(),
    }))
}

/// Handle GET /endpoints - list endpoints without credentials
pub async fn list_endpoints(State(state): State<AppState>) -> impl IntoResponse {
    let endpoints: Vec<serde_json::Value> = state
        .dispatcher
        .registry()
        .all()
        .iter()
        .map(|e| {
            serde_json::json!({
                "index": e.index,
                "url": e.url,
                "model": e.model,
            })
        })
        .collect();

    Json(serde_json::json!({
        "endpoints": endpoints
    }))
}

/// Query parameters for GET /outcomes.
#[derive(Debug, Deserialize)]
pub struct OutcomesQuery {
    pub limit: Option<u32>,
}

/// Handle GET /outcomes - most recent persisted outcomes
pub async fn list_outcomes(
    State(state): State<AppState>,
    Query(query): Query<OutcomesQuery>,
) -> Result<Response, Error> {
    let pool = state
        .db
        .as_ref()
        .ok_or_else(|| Error::NotFound("outcome storage is not enabled".to_string()))?;

    let limit = query
        .limit
        .unwrap_or(DEFAULT_OUTCOME_LIMIT)
        .clamp(1, MAX_OUTCOME_LIMIT);
    let rows = storage::recent_outcomes(pool, limit).await?;

    Ok(Json(serde_json::json!({
        "limit": limit,
        "data": rows,
    }))
    .into_response())
}
