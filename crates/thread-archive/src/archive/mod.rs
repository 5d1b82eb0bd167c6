//! Conversation archive: durable chunk transcripts, watermarks and the
//! observer that produces them.
pub mod chunk_store;
pub mod observer;
pub mod types;

pub use chunk_store::ChunkStore;
pub use observer::{ArchivalObserver, ArchivalState, ArchiveOutcome, ReindexReport};
pub use types::{ArchiveChunk, ArchiveWatermark, MessageRange};
