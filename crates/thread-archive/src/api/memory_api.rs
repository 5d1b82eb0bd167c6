//! CRUD over persistent memories.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use std::sync::Arc;

use super::ApiError;
use crate::memory_db::{MemoryFilter, MemoryType, PersistentMemory};
use crate::persistent::MemoryDraft;
use crate::search::check_limit;
use crate::shared_state::SharedState;

#[derive(Debug, Deserialize)]
pub struct CreateMemoryRequest {
    pub memory_type: MemoryType,
    pub content: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub thread_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateMemoryRequest {
    pub content: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub memory_type: Option<MemoryType>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListMemoriesQuery {
    pub memory_type: Option<String>,
    pub thread_id: Option<String>,
    pub limit: Option<i64>,
}

impl ListMemoriesQuery {
    fn into_filter(self) -> Result<MemoryFilter, ApiError> {
        let memory_type = self
            .memory_type
            .map(|raw| raw.parse::<MemoryType>())
            .transpose()
            .map_err(|e| ApiError::bad_request(e.to_string()))?;
        let limit = self.limit.map(check_limit).transpose()?;
        Ok(MemoryFilter { memory_type, thread_id: self.thread_id, limit })
    }
}

pub async fn create_memory(
    State(state): State<Arc<SharedState>>,
    Json(payload): Json<CreateMemoryRequest>,
) -> Result<(StatusCode, Json<PersistentMemory>), ApiError> {
    state.counters.inc_total_requests();
    let mut draft = MemoryDraft::new(payload.memory_type, payload.content).with_tags(payload.tags);
    if let Some(thread_id) = payload.thread_id {
        draft = draft.for_thread(thread_id);
    }
    let memory = state.memories.write(draft).await?;
    Ok((StatusCode::CREATED, Json(memory)))
}

pub async fn list_memories(
    State(state): State<Arc<SharedState>>,
    Query(query): Query<ListMemoriesQuery>,
) -> Result<Json<Vec<PersistentMemory>>, ApiError> {
    state.counters.inc_total_requests();
    let filter = query.into_filter()?;
    Ok(Json(state.memories.list(&filter)?))
}

pub async fn get_memory(
    State(state): State<Arc<SharedState>>,
    Path(id): Path<String>,
) -> Result<Json<PersistentMemory>, ApiError> {
    state.counters.inc_total_requests();
    state
        .memories
        .get(&id)?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("memory {} not found", id)))
}

pub async fn update_memory(
    State(state): State<Arc<SharedState>>,
    Path(id): Path<String>,
    Json(payload): Json<UpdateMemoryRequest>,
) -> Result<Json<PersistentMemory>, ApiError> {
    state.counters.inc_total_requests();
    state
        .memories
        .update(&id, payload.content, payload.tags, payload.memory_type)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("memory {} not found", id)))
}

pub async fn delete_memory(
    State(state): State<Arc<SharedState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.counters.inc_total_requests();
    if state.memories.delete(&id)? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::not_found(format!("memory {} not found", id)))
    }
}
