//! Explicitly constructed engine state shared by the HTTP layer and the binary.
//!
//! Every component is built once here and handed to its dependents; there is
//! no ambient global store, so several engines can live in one process (tests
//! do this).

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::info;

use crate::archive::{ArchivalObserver, ChunkStore};
use crate::collaborators::{Embedder, Summarizer};
use crate::config::Config;
use crate::llm_worker::LlmWorker;
use crate::memory::{HttpSessionSource, SessionSource};
use crate::memory_db::IndexStore;
use crate::persistent::PersistentMemoryManager;
use crate::search::HybridSearchEngine;

/// Request counters surfaced by `/stats`.
#[derive(Debug, Default)]
pub struct AtomicCounters {
    pub total_requests: AtomicUsize,
    pub turns_received: AtomicUsize,
    pub searches: AtomicUsize,
}

impl AtomicCounters {
    pub fn inc_total_requests(&self) -> usize {
        self.total_requests.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn inc_turns_received(&self) -> usize {
        self.turns_received.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn inc_searches(&self) -> usize {
        self.searches.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn snapshot(&self) -> (usize, usize, usize) {
        (
            self.total_requests.load(Ordering::Relaxed),
            self.turns_received.load(Ordering::Relaxed),
            self.searches.load(Ordering::Relaxed),
        )
    }
}

pub struct SharedState {
    pub config: Arc<Config>,
    pub index: Arc<IndexStore>,
    pub chunks: Arc<ChunkStore>,
    pub observer: Arc<ArchivalObserver>,
    pub memories: Arc<PersistentMemoryManager>,
    pub search: Arc<HybridSearchEngine>,
    pub counters: AtomicCounters,
}

impl SharedState {
    /// Open the stores under `config.storage_root` and wire the given
    /// collaborators into the observer, memory manager and search engine.
    pub fn build(
        config: Config,
        sessions: Arc<dyn SessionSource>,
        summarizer: Arc<dyn Summarizer>,
        embedder: Arc<dyn Embedder>,
    ) -> anyhow::Result<Self> {
        info!("Initializing archive engine at {}", config.storage_root.display());
        let index = Arc::new(IndexStore::open_with_config(&config)?);
        let chunks = Arc::new(ChunkStore::new(config.chunks_root()));

        let observer = Arc::new(ArchivalObserver::new(
            &config,
            Arc::clone(&chunks),
            Arc::clone(&index),
            sessions,
            summarizer,
            Arc::clone(&embedder),
        ));
        let memories = Arc::new(PersistentMemoryManager::new(
            Arc::clone(&index),
            Arc::clone(&embedder),
            config.collaborator_timeout(),
        ));
        let search = Arc::new(HybridSearchEngine::new(&config, Arc::clone(&index), embedder));

        info!(
            "Archive engine ready (vector search: {})",
            if index.vector_search_available() { "on" } else { "off" }
        );
        Ok(Self {
            config: Arc::new(config),
            index,
            chunks,
            observer,
            memories,
            search,
            counters: AtomicCounters::default(),
        })
    }

    /// Production wiring: OpenAI-compatible LLM backend for summaries and
    /// embeddings, upstream runtime over HTTP for session history.
    pub fn from_config(config: Config) -> anyhow::Result<Self> {
        let worker = Arc::new(LlmWorker::from_config(&config));
        let sessions = Arc::new(HttpSessionSource::new(
            config.session_runtime_url.clone(),
            config.collaborator_timeout(),
        ));
        Self::build(config, sessions, worker.clone(), worker)
    }

    pub fn shutdown(&self) -> anyhow::Result<()> {
        info!("Shutting down archive engine");
        self.index.close()
    }
}
