//! Conversation archival and hybrid retrieval for long-running agent threads.
//!
//! The [`archive::ArchivalObserver`] moves aging history out of a thread into
//! summarized chunk files, [`persistent::PersistentMemoryManager`] keeps
//! agent-written facts and preferences, and [`search::HybridSearchEngine`]
//! ranks both through one full-text + vector index ([`memory_db::IndexStore`]).

pub mod archive;
pub mod collaborators;
pub mod config;
pub mod error;
pub mod llm_worker;
pub mod memory;
pub mod memory_db;
pub mod metrics;
pub mod persistent;
pub mod search;
pub mod shared_state;
pub mod telemetry;
pub mod testing;
pub mod utils;

#[cfg(feature = "cli")]
pub mod api;
#[cfg(feature = "cli")]
pub mod thread_server;

pub use archive::{ArchivalObserver, ArchivalState, ArchiveChunk, ArchiveOutcome, ArchiveWatermark, ChunkStore};
pub use collaborators::{Embedder, Summarizer};
pub use config::{ChunkThresholds, Config};
pub use error::{SearchError, ValidationError};
pub use memory::{Message, MessagePart, SessionSource};
pub use memory_db::{IndexStore, MemoryType, PersistentMemory};
pub use persistent::{MemoryDraft, PersistentMemoryManager};
pub use search::{HybridSearchEngine, MatchKind, UnifiedSearchResult};
pub use shared_state::SharedState;

#[cfg(feature = "cli")]
pub use thread_server::run_thread_server;
