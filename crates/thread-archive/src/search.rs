//! Hybrid retrieval over archived chunk summaries and persistent memories.
//!
//! Full-text candidates (BM25) and vector candidates (cosine) are merged per
//! source by id. A vector score wins when both exist; otherwise the full-text
//! position is mapped onto the same `[0, 1]` scale. Both sources are then
//! ranked together.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::collaborators::{embed_one, Embedder};
use crate::config::Config;
use crate::error::{SearchError, ValidationError};
use crate::memory_db::{IndexStore, MemoryType, PersistentMemory, SummaryEntry, VectorKind};
use crate::metrics;
use crate::utils::TextUtils;

/// Score of the best full-text hit when no vector score exists.
const FULLTEXT_TOP_SCORE: f32 = 0.75;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    Keyword,
    Vector,
    Both,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum UnifiedSearchResult {
    Archive {
        chunk_id: String,
        thread_id: String,
        session_id: String,
        summary: String,
        token_count: u64,
        message_count: usize,
        time_start: DateTime<Utc>,
        time_end: DateTime<Utc>,
        score: f32,
        matched_by: MatchKind,
    },
    Memory {
        memory_id: String,
        memory_type: MemoryType,
        content: String,
        tags: Vec<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        thread_id: Option<String>,
        score: f32,
        matched_by: MatchKind,
    },
}

impl UnifiedSearchResult {
    pub fn score(&self) -> f32 {
        match self {
            UnifiedSearchResult::Archive { score, .. } | UnifiedSearchResult::Memory { score, .. } => *score,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            UnifiedSearchResult::Archive { chunk_id, .. } => chunk_id,
            UnifiedSearchResult::Memory { memory_id, .. } => memory_id,
        }
    }

    pub fn source(&self) -> &'static str {
        match self {
            UnifiedSearchResult::Archive { .. } => "archive",
            UnifiedSearchResult::Memory { .. } => "memory",
        }
    }

    pub fn matched_by(&self) -> MatchKind {
        match self {
            UnifiedSearchResult::Archive { matched_by, .. }
            | UnifiedSearchResult::Memory { matched_by, .. } => *matched_by,
        }
    }

    fn from_summary(entry: SummaryEntry, score: f32, matched_by: MatchKind) -> Self {
        UnifiedSearchResult::Archive {
            chunk_id: entry.id,
            thread_id: entry.thread_id,
            session_id: entry.session_id,
            summary: entry.summary,
            token_count: entry.token_count,
            message_count: entry.message_count,
            time_start: entry.time_start,
            time_end: entry.time_end,
            score,
            matched_by,
        }
    }

    fn from_memory(memory: PersistentMemory, score: f32, matched_by: MatchKind) -> Self {
        UnifiedSearchResult::Memory {
            memory_id: memory.id,
            memory_type: memory.memory_type,
            content: memory.content,
            tags: memory.tags,
            thread_id: memory.thread_id,
            score,
            matched_by,
        }
    }
}

/// Full-text score for the hit at `position` (0-based) in BM25 order.
pub fn fulltext_score(position: usize) -> f32 {
    FULLTEXT_TOP_SCORE / (1.0 + position as f32)
}

/// Candidate from one source before the record is materialized.
struct Candidate<T> {
    record: Option<T>,
    keyword_score: Option<f32>,
    vector_score: Option<f32>,
}

impl<T> Default for Candidate<T> {
    fn default() -> Self {
        Self { record: None, keyword_score: None, vector_score: None }
    }
}

impl<T> Candidate<T> {
    fn resolve(&self) -> Option<(f32, MatchKind)> {
        match (self.keyword_score, self.vector_score) {
            (Some(_), Some(v)) => Some((v, MatchKind::Both)),
            (None, Some(v)) => Some((v, MatchKind::Vector)),
            (Some(k), None) => Some((k, MatchKind::Keyword)),
            (None, None) => None,
        }
    }
}

pub struct HybridSearchEngine {
    index: Arc<IndexStore>,
    embedder: Arc<dyn Embedder>,
    default_limit: usize,
    candidate_limit: usize,
    min_similarity: f32,
    timeout: Duration,
}

impl HybridSearchEngine {
    pub fn new(config: &Config, index: Arc<IndexStore>, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            index,
            embedder,
            default_limit: config.search_default_limit.max(1),
            candidate_limit: config.search_candidate_limit.max(1),
            min_similarity: config.min_vector_similarity,
            timeout: config.collaborator_timeout(),
        }
    }

    pub fn default_limit(&self) -> usize {
        self.default_limit
    }

    /// Ranked results for `query`, best first, at most `limit` (default from
    /// configuration). With `thread_id`, only that thread's chunks and the
    /// memories scoped to it are considered.
    pub async fn search(
        &self,
        query: &str,
        limit: Option<usize>,
        thread_id: Option<&str>,
    ) -> Result<Vec<UnifiedSearchResult>, SearchError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(ValidationError::EmptyQuery.into());
        }
        let limit = match limit {
            Some(0) => return Err(ValidationError::InvalidLimit(0).into()),
            Some(limit) => limit,
            None => self.default_limit,
        };
        let cap = self.candidate_limit.max(limit);

        let query_embedding = self.embed_query(query).await;
        let mode = if query_embedding.is_some() { "hybrid" } else { "fulltext" };
        metrics::record_search(mode);

        let mut archive: HashMap<String, Candidate<SummaryEntry>> = HashMap::new();
        let mut memories: HashMap<String, Candidate<PersistentMemory>> = HashMap::new();

        if let Some(expr) = TextUtils::fts_match_expression(query) {
            for (pos, entry) in self.index.summaries.search_fts(&expr, thread_id, cap)?.into_iter().enumerate() {
                let candidate = archive.entry(entry.id.clone()).or_default();
                candidate.keyword_score = Some(fulltext_score(pos));
                candidate.record = Some(entry);
            }
            for (pos, memory) in self.index.memories.search_fts(&expr, thread_id, cap)?.into_iter().enumerate() {
                let candidate = memories.entry(memory.id.clone()).or_default();
                candidate.keyword_score = Some(fulltext_score(pos));
                candidate.record = Some(memory);
            }
        }

        if let Some(embedding) = &query_embedding {
            let hits = self.index.embeddings.find_similar(
                VectorKind::Summary,
                embedding,
                thread_id,
                cap,
                self.min_similarity,
            )?;
            for (id, sim) in hits {
                archive.entry(id).or_default().vector_score = Some(sim.clamp(0.0, 1.0));
            }
            let hits = self.index.embeddings.find_similar(
                VectorKind::Memory,
                embedding,
                thread_id,
                cap,
                self.min_similarity,
            )?;
            for (id, sim) in hits {
                memories.entry(id).or_default().vector_score = Some(sim.clamp(0.0, 1.0));
            }
        }

        let archive_count = archive.len();
        let memory_count = memories.len();
        let mut results = Vec::with_capacity(archive_count + memory_count);

        for (id, candidate) in archive {
            let Some((score, matched_by)) = candidate.resolve() else { continue };
            let entry = match candidate.record {
                Some(entry) => entry,
                None => match self.index.summaries.get(&id)? {
                    Some(entry) => entry,
                    None => continue,
                },
            };
            results.push(UnifiedSearchResult::from_summary(entry, score, matched_by));
        }
        for (id, candidate) in memories {
            let Some((score, matched_by)) = candidate.resolve() else { continue };
            let memory = match candidate.record {
                Some(memory) => memory,
                None => match self.index.memories.get(&id)? {
                    Some(memory) => memory,
                    None => continue,
                },
            };
            results.push(UnifiedSearchResult::from_memory(memory, score, matched_by));
        }

        results.sort_by(|a, b| {
            b.score()
                .partial_cmp(&a.score())
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id().cmp(b.id()))
        });
        results.truncate(limit);

        debug!(
            "Search ({}) matched {} archive and {} memory candidates, returning {}",
            mode,
            archive_count,
            memory_count,
            results.len()
        );
        Ok(results)
    }

    async fn embed_query(&self, query: &str) -> Option<Vec<f32>> {
        if !self.index.vector_search_available() {
            return None;
        }
        match embed_one(self.embedder.as_ref(), query, self.timeout).await {
            Ok(embedding) => Some(embedding),
            Err(e) => {
                warn!("Query embedding failed, searching full-text only: {:#}", e);
                None
            }
        }
    }
}

/// Checks a caller-supplied limit; non-positive values are rejected.
pub fn check_limit(raw: i64) -> Result<usize, ValidationError> {
    if raw <= 0 {
        Err(ValidationError::InvalidLimit(raw))
    } else {
        Ok(raw as usize)
    }
}
