//! HTTP server wiring.
//!
//! Every handler reads the same `Arc<SharedState>`; the only outbound calls are
//! to the LLM backend and the session runtime.

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::info;

use crate::api;
use crate::config::Config;
use crate::shared_state::SharedState;

/// Build the state from configuration and serve until ctrl-c.
pub async fn run_thread_server(cfg: Config) -> anyhow::Result<()> {
    cfg.print_config();
    let addr = cfg.api_addr()?;
    let request_timeout = cfg.collaborator_timeout() * 2;

    let state = Arc::new(SharedState::from_config(cfg)?);
    let app = build_router(Arc::clone(&state), request_timeout);

    info!("Starting HTTP server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
        })
        .await?;

    state.shutdown()
}

pub fn build_router(state: Arc<SharedState>, request_timeout: Duration) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::PUT,
            axum::http::Method::DELETE,
        ])
        .allow_headers(Any);

    Router::new()
        .route("/search", post(api::search))
        .route("/memories", post(api::create_memory).get(api::list_memories))
        .route(
            "/memories/:id",
            get(api::get_memory).put(api::update_memory).delete(api::delete_memory),
        )
        .route("/threads/:thread_id/turns", post(api::turn_complete))
        .route("/threads/:thread_id/flush", post(api::flush_thread))
        .route("/threads/:thread_id/reindex", post(api::reindex_thread))
        .route("/threads/:thread_id/chunks", get(api::list_chunks))
        .route("/threads/:thread_id/chunks/:chunk_id", get(api::get_chunk))
        .route("/threads/:thread_id/summaries", get(api::list_summaries))
        .route("/threads/:thread_id/watermark", get(api::get_watermark))
        .route("/stats", get(api::index_stats))
        .route("/metrics", get(api::metrics_endpoint))
        .route("/healthz", get(|| async { "OK" }))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(request_timeout))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemorySessionSource;
    use crate::testing::{test_config, HashEmbedder, ScriptedSummarizer};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tempfile::TempDir;
    use tower::ServiceExt;

    fn router(dir: &TempDir) -> Router {
        let state = SharedState::build(
            test_config(dir.path()),
            Arc::new(InMemorySessionSource::new()),
            Arc::new(ScriptedSummarizer::new()),
            Arc::new(HashEmbedder::new(32)),
        )
        .unwrap();
        build_router(Arc::new(state), Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_healthz() {
        let dir = TempDir::new().unwrap();
        let response = router(&dir)
            .oneshot(Request::get("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_memory_roundtrip_over_http() {
        let dir = TempDir::new().unwrap();
        let app = router(&dir);

        let create = Request::post("/memories")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"memory_type":"fact","content":"prod region is eu-west-1"}"#))
            .unwrap();
        let response = app.clone().oneshot(create).await.unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let search = Request::post("/search")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"query":"region","limit":-1}"#))
            .unwrap();
        let response = app.clone().oneshot(search).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let scoped = Request::post("/search")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"query":"region","thread_id":"../etc"}"#))
            .unwrap();
        let response = app.clone().oneshot(scoped).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let summaries = Request::get("/threads/t1/summaries").body(Body::empty()).unwrap();
        let response = app.clone().oneshot(summaries).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let missing = Request::get("/memories/mem_nope").body(Body::empty()).unwrap();
        let response = app.oneshot(missing).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
