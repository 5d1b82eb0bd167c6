//! `POST /search`: one ranked list over archived chunks and memories.

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use super::ApiError;
use crate::search::{check_limit, UnifiedSearchResult};
use crate::shared_state::SharedState;

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    /// Signed so that zero and negative values reach validation instead of
    /// failing deserialization.
    pub limit: Option<i64>,
    /// Compared as-is; an id no thread can have just matches nothing.
    pub thread_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub results: Vec<UnifiedSearchResult>,
    pub total: usize,
    pub vector_search: bool,
}

pub async fn search(
    State(state): State<Arc<SharedState>>,
    Json(payload): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, ApiError> {
    state.counters.inc_total_requests();
    state.counters.inc_searches();
    info!(
        "Search request: query='{}', thread={:?}, limit={:?}",
        payload.query, payload.thread_id, payload.limit
    );

    let limit = payload.limit.map(check_limit).transpose()?;

    let results = state
        .search
        .search(&payload.query, limit, payload.thread_id.as_deref())
        .await?;

    Ok(Json(SearchResponse {
        total: results.len(),
        results,
        vector_search: state.index.vector_search_available(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemorySessionSource;
    use crate::memory_db::MemoryType;
    use crate::persistent::MemoryDraft;
    use crate::testing::{test_config, HashEmbedder, ScriptedSummarizer};
    use axum::http::StatusCode;
    use tempfile::TempDir;

    fn state(dir: &TempDir) -> Arc<SharedState> {
        Arc::new(
            SharedState::build(
                test_config(dir.path()),
                Arc::new(InMemorySessionSource::new()),
                Arc::new(ScriptedSummarizer::new()),
                Arc::new(HashEmbedder::new(32)),
            )
            .unwrap(),
        )
    }

    fn request(query: &str, limit: Option<i64>) -> Json<SearchRequest> {
        Json(SearchRequest { query: query.into(), limit, thread_id: None })
    }

    #[tokio::test]
    async fn test_search_finds_memory() {
        let dir = TempDir::new().unwrap();
        let state = state(&dir);
        state
            .memories
            .write(MemoryDraft::new(MemoryType::Fact, "staging database runs postgres 16"))
            .await
            .unwrap();

        let Json(response) = search(State(Arc::clone(&state)), request("postgres", Some(5)))
            .await
            .unwrap();
        assert_eq!(response.total, 1);
        assert_eq!(response.results[0].source(), "memory");
        assert!(response.vector_search);
        assert_eq!(state.counters.snapshot().2, 1);
    }

    #[tokio::test]
    async fn test_bad_input_is_rejected() {
        let dir = TempDir::new().unwrap();
        let state = state(&dir);

        let err = search(State(Arc::clone(&state)), request("postgres", Some(0))).await.unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        let err = search(State(Arc::clone(&state)), request("postgres", Some(-3))).await.unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        let err = search(State(state), request("   ", None)).await.unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_unusable_thread_filter_matches_nothing() {
        let dir = TempDir::new().unwrap();
        let state = state(&dir);
        state
            .memories
            .write(MemoryDraft::new(MemoryType::Fact, "staging database runs postgres 16"))
            .await
            .unwrap();

        for thread_id in ["..", "a/b", ""] {
            let payload = SearchRequest {
                query: "postgres".into(),
                limit: None,
                thread_id: Some(thread_id.into()),
            };
            let Json(response) = search(State(Arc::clone(&state)), Json(payload)).await.unwrap();
            assert_eq!(response.total, 0, "filter {:?}", thread_id);
            assert!(response.results.is_empty());
        }
    }
}
