//! Archival triggers and read-only inspection of chunks, watermarks and the
//! index.

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::debug;

use super::ApiError;
use crate::archive::{ArchiveChunk, ArchiveOutcome, ArchiveWatermark, ReindexReport};
use crate::error::validate_identifier;
use crate::memory_db::SummaryEntry;
use crate::metrics;
use crate::shared_state::SharedState;

#[derive(Debug, Deserialize)]
pub struct TurnRequest {
    pub session_id: String,
}

#[derive(Debug, Serialize)]
struct TurnAccepted {
    thread_id: String,
    accepted: bool,
}

/// Signal from the runtime that a turn finished. Archival runs in the
/// background; the response does not wait for it.
pub async fn turn_complete(
    State(state): State<Arc<SharedState>>,
    Path(thread_id): Path<String>,
    Json(payload): Json<TurnRequest>,
) -> Result<impl IntoResponse, ApiError> {
    state.counters.inc_total_requests();
    validate_identifier("thread id", &thread_id)?;
    validate_identifier("session id", &payload.session_id)?;

    let turns = state.counters.inc_turns_received();
    debug!("Turn {} complete for {}", turns, thread_id);
    state.observer.on_turn_complete(thread_id.clone(), payload.session_id);
    Ok((
        StatusCode::ACCEPTED,
        Json(TurnAccepted { thread_id, accepted: true }),
    ))
}

pub async fn flush_thread(
    State(state): State<Arc<SharedState>>,
    Path(thread_id): Path<String>,
    Json(payload): Json<TurnRequest>,
) -> Result<Json<ArchiveOutcome>, ApiError> {
    state.counters.inc_total_requests();
    validate_identifier("thread id", &thread_id)?;
    validate_identifier("session id", &payload.session_id)?;
    Ok(Json(state.observer.flush(&thread_id, &payload.session_id).await?))
}

pub async fn reindex_thread(
    State(state): State<Arc<SharedState>>,
    Path(thread_id): Path<String>,
) -> Result<Json<ReindexReport>, ApiError> {
    state.counters.inc_total_requests();
    validate_identifier("thread id", &thread_id)?;
    Ok(Json(state.observer.reindex_thread(&thread_id).await?))
}

pub async fn list_chunks(
    State(state): State<Arc<SharedState>>,
    Path(thread_id): Path<String>,
) -> Result<Json<Vec<String>>, ApiError> {
    state.counters.inc_total_requests();
    validate_identifier("thread id", &thread_id)?;
    Ok(Json(state.observer.list_chunk_ids(&thread_id)?))
}

pub async fn get_chunk(
    State(state): State<Arc<SharedState>>,
    Path((thread_id, chunk_id)): Path<(String, String)>,
) -> Result<Json<ArchiveChunk>, ApiError> {
    state.counters.inc_total_requests();
    validate_identifier("thread id", &thread_id)?;
    validate_identifier("chunk id", &chunk_id)?;
    state
        .observer
        .read_chunk(&thread_id, &chunk_id)
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("chunk {} not found in {}", chunk_id, thread_id)))
}

/// Indexed summaries of a thread in time order.
pub async fn list_summaries(
    State(state): State<Arc<SharedState>>,
    Path(thread_id): Path<String>,
) -> Result<Json<Vec<SummaryEntry>>, ApiError> {
    state.counters.inc_total_requests();
    validate_identifier("thread id", &thread_id)?;
    Ok(Json(state.index.summaries.list_thread(&thread_id)?))
}

pub async fn get_watermark(
    State(state): State<Arc<SharedState>>,
    Path(thread_id): Path<String>,
) -> Result<Json<ArchiveWatermark>, ApiError> {
    state.counters.inc_total_requests();
    validate_identifier("thread id", &thread_id)?;
    state
        .observer
        .watermark(&thread_id)
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("thread {} has no archive yet", thread_id)))
}

pub async fn index_stats(
    State(state): State<Arc<SharedState>>,
) -> Result<impl IntoResponse, ApiError> {
    let total_requests = state.counters.inc_total_requests();
    let (_, turns_received, searches) = state.counters.snapshot();
    let index = state.index.stats()?;
    Ok(Json(json!({
        "index": index,
        "total_requests": total_requests,
        "turns_received": turns_received,
        "searches": searches,
    })))
}

pub async fn metrics_endpoint() -> Result<impl IntoResponse, ApiError> {
    let body = metrics::render_metrics()?;
    Ok((
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    ))
}
