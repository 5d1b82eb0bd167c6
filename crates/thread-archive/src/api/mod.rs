//! HTTP surface over the archive engine: search, memories, archival triggers
//! and inspection. Handlers share one [`SharedState`](crate::shared_state::SharedState).

pub mod archive_api;
pub mod memory_api;
pub mod search_api;

use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use tracing::error;

use crate::error::{SearchError, ValidationError};

pub use archive_api::{
    flush_thread, get_chunk, get_watermark, index_stats, list_chunks, list_summaries,
    metrics_endpoint, reindex_thread, turn_complete, TurnRequest,
};
pub use memory_api::{
    create_memory, delete_memory, get_memory, list_memories, update_memory, CreateMemoryRequest,
    ListMemoriesQuery, UpdateMemoryRequest,
};
pub use search_api::{search, SearchRequest, SearchResponse};

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self { status: StatusCode::BAD_REQUEST, message: message.into() }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self { status: StatusCode::NOT_FOUND, message: message.into() }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self { status: StatusCode::INTERNAL_SERVER_ERROR, message: message.into() }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        (
            self.status,
            Json(json!({
                "error": self.message,
                "code": self.status.as_u16(),
            })),
        )
            .into_response()
    }
}

impl From<ValidationError> for ApiError {
    fn from(e: ValidationError) -> Self {
        Self::bad_request(e.to_string())
    }
}

impl From<SearchError> for ApiError {
    fn from(e: SearchError) -> Self {
        match e {
            SearchError::Validation(v) => v.into(),
            SearchError::Backend(e) => e.into(),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        if let Some(v) = e.downcast_ref::<ValidationError>() {
            return v.clone().into();
        }
        error!("Request failed: {:#}", e);
        Self::internal(format!("{:#}", e))
    }
}
