use axum::{
    Json,
    body::Body,
    extract::{State, rejection::JsonRejection},
    http::header,
    response::{IntoResponse, Response},
};
use serde_json::Value;
use std::time::Instant;

use crate::error::AppResult;
use crate::relay::{self, ACCEL_BUFFERING_HEADER, UI_MESSAGE_STREAM_HEADER, UI_MESSAGE_STREAM_VERSION};
use crate::request::{AnswerRequest, required_string};

use super::AppState;
use super::models::{HealthResponse, SourcesResponse};

const SOURCES_FAILED: &str = "Failed to fetch sources";
const ANSWER_FAILED: &str = "Failed to generate answer";
const QUERY_FAILED: &str = "Failed to process query";

pub async fn sources_handler(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> AppResult<Json<SourcesResponse>> {
    let start = Instant::now();
    let Json(body) = payload?;
    let query = required_string(&body, "query", "Query is required")?;

    let results = state
        .sources
        .lookup(&query)
        .await
        .map_err(|e| e.labelled(SOURCES_FAILED))?;

    tracing::info!(
        results = results.len(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "sources looked up"
    );
    Ok(Json(SourcesResponse { results }))
}

/// Chat-stream endpoint: accepts a prompt or a conversation, answers as a
/// UI message stream.
pub async fn answer_handler(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> AppResult<Response> {
    let Json(body) = payload?;
    let request = AnswerRequest::from_json(&body)?;

    let answer = state
        .pipeline
        .answer(request)
        .await
        .map_err(|e| e.labelled(ANSWER_FAILED))?;
    tracing::info!(sources = answer.sources.len(), "streaming answer");

    let events = relay::spawn_relay(answer.stream, state.relay);
    Ok((
        [
            (header::CONTENT_TYPE.as_str(), "text/event-stream"),
            (header::CACHE_CONTROL.as_str(), "no-cache"),
            (UI_MESSAGE_STREAM_HEADER, UI_MESSAGE_STREAM_VERSION),
            (ACCEL_BUFFERING_HEADER, "no"),
        ],
        Body::from_stream(relay::ui_message_body(events)),
    )
        .into_response())
}

/// Plain-text endpoint: `{query}` in, raw answer tokens out.
pub async fn query_handler(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> AppResult<Response> {
    let Json(body) = payload?;
    let query = required_string(&body, "query", "Query is required")?;

    let answer = state
        .pipeline
        .answer(AnswerRequest::Prompt(query))
        .await
        .map_err(|e| e.labelled(QUERY_FAILED))?;
    tracing::info!(sources = answer.sources.len(), "streaming answer");

    let events = relay::spawn_relay(answer.stream, state.relay);
    Ok((
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        Body::from_stream(relay::text_body(events)),
    )
        .into_response())
}

pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        model: state.pipeline.model_id().to_string(),
        search_configured: state.credentials.search,
        generation_configured: state.credentials.generation,
    })
}
