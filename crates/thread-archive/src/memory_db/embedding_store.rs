//! Vector rows for summaries and memories.
//!
//! Rows live in SQLite; an in-memory HNSW index per kind is built from them
//! when the store opens and extended on every write. Unscoped queries go
//! through the HNSW index and are rescored exactly. Thread-scoped queries,
//! and any query while the HNSW index is missing, fall back to a linear
//! cosine scan over the table.
//!
//! The backend is resolved once when the index opens. If it cannot be loaded
//! (disabled, bad dimension, rows written by a different dimension) the store
//! stays usable and simply reports itself unavailable; full-text search is
//! unaffected.
use crate::memory_db::DbHandle;
use crate::memory_db::schema::format_timestamp;
use hora::core::ann_index::ANNIndex;
use hora::core::metrics::Metric;
use hora::index::hnsw_idx::HNSWIndex;
use hora::index::hnsw_params::HNSWParams;
use rusqlite::params;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};

pub const MAX_EMBEDDING_DIM: usize = 8192;

/// Lower bound on HNSW candidates fetched before exact rescoring.
const MIN_ANN_CANDIDATES: usize = 32;

const VECTOR_SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS summary_vectors (
    id TEXT PRIMARY KEY REFERENCES summaries(id) ON DELETE CASCADE,
    embedding BLOB NOT NULL,
    model TEXT NOT NULL,
    dim INTEGER NOT NULL,
    created_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS memory_vectors (
    id TEXT PRIMARY KEY REFERENCES memories(id) ON DELETE CASCADE,
    embedding BLOB NOT NULL,
    model TEXT NOT NULL,
    dim INTEGER NOT NULL,
    created_at TEXT NOT NULL
);
";

/// Which indexed record a vector belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VectorKind {
    Summary,
    Memory,
}

impl VectorKind {
    fn table(&self) -> &'static str {
        match self {
            VectorKind::Summary => "summary_vectors",
            VectorKind::Memory => "memory_vectors",
        }
    }

    fn parent_table(&self) -> &'static str {
        match self {
            VectorKind::Summary => "summaries",
            VectorKind::Memory => "memories",
        }
    }
}

/// HNSW graph over one vector table. hora keys nodes by integer, so every
/// stored vector gets a slot; an id that is stored again gets a new slot and
/// its old one goes stale. `vectors` holds the current embedding per id and
/// is what candidates are rescored against.
struct AnnIndex {
    graph: Option<HNSWIndex<f32, i64>>,
    slots: Vec<String>,
    vectors: HashMap<String, Vec<f32>>,
}

impl AnnIndex {
    fn new() -> Self {
        Self { graph: None, slots: Vec::new(), vectors: HashMap::new() }
    }

    fn params() -> HNSWParams<f32> {
        HNSWParams {
            n_neighbor: 16,
            ef_build: 100,
            ef_search: 50,
            ..Default::default()
        }
    }

    /// Rebuild the graph from `vectors`, dropping stale slots.
    fn rebuild(&mut self, dim: usize) -> anyhow::Result<()> {
        self.graph = None;
        self.slots.clear();
        if self.vectors.is_empty() {
            return Ok(());
        }
        let mut graph = HNSWIndex::<f32, i64>::new(dim, &Self::params());
        let mut ids: Vec<&String> = self.vectors.keys().collect();
        ids.sort();
        for id in ids {
            graph
                .add(&self.vectors[id], self.slots.len() as i64)
                .map_err(|e| anyhow::anyhow!("Failed to add {} to HNSW index: {}", id, e))?;
            self.slots.push(id.clone());
        }
        graph
            .build(Metric::CosineSimilarity)
            .map_err(|e| anyhow::anyhow!("Failed to build HNSW index: {}", e))?;
        self.graph = Some(graph);
        Ok(())
    }

    fn insert(&mut self, dim: usize, id: &str, embedding: &[f32]) -> anyhow::Result<()> {
        self.vectors.insert(id.to_string(), embedding.to_vec());
        let Some(graph) = self.graph.as_mut() else {
            return self.rebuild(dim);
        };
        graph
            .add(embedding, self.slots.len() as i64)
            .map_err(|e| anyhow::anyhow!("Failed to add {} to HNSW index: {}", id, e))?;
        self.slots.push(id.to_string());
        graph
            .build(Metric::CosineSimilarity)
            .map_err(|e| anyhow::anyhow!("Failed to rebuild HNSW index: {}", e))
    }

    fn remove(&mut self, id: &str) {
        self.vectors.remove(id);
    }

    /// Candidate ids with exact cosine scores, best first. `None` when there
    /// is no graph to query.
    fn candidates(&self, query: &[f32], k: usize) -> Option<Vec<(String, f32)>> {
        let graph = self.graph.as_ref()?;
        let mut seen = HashSet::new();
        let mut scored = Vec::new();
        for slot in graph.search(query, k) {
            let Some(id) = usize::try_from(slot).ok().and_then(|s| self.slots.get(s)) else {
                continue;
            };
            let Some(embedding) = self.vectors.get(id) else {
                continue;
            };
            if seen.insert(id.as_str()) {
                scored.push((id.clone(), cosine_similarity(query, embedding)));
            }
        }
        sort_matches(&mut scored);
        Some(scored)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VectorSettings {
    pub enabled: bool,
    pub model: String,
    pub dim: usize,
}

impl VectorSettings {
    pub fn disabled() -> Self {
        Self { enabled: false, model: String::new(), dim: 0 }
    }
}

pub struct EmbeddingStore {
    db: Arc<DbHandle>,
    model: String,
    dim: usize,
    unavailable_reason: Option<String>,
    summary_index: RwLock<AnnIndex>,
    memory_index: RwLock<AnnIndex>,
}

impl EmbeddingStore {
    pub(crate) fn load(db: Arc<DbHandle>, settings: &VectorSettings) -> Self {
        let mut summary_index = AnnIndex::new();
        let mut memory_index = AnnIndex::new();
        let loaded = Self::try_load(&db, settings).and_then(|()| {
            Self::load_index(&db, settings, VectorKind::Summary, &mut summary_index)?;
            Self::load_index(&db, settings, VectorKind::Memory, &mut memory_index)
        });
        let unavailable_reason = match loaded {
            Ok(()) => {
                info!(
                    "Vector search enabled ({}, dim {}, {} summary and {} memory vectors indexed)",
                    settings.model,
                    settings.dim,
                    summary_index.vectors.len(),
                    memory_index.vectors.len()
                );
                None
            }
            Err(e) => {
                warn!("Vector search unavailable, continuing with full-text only: {}", e);
                summary_index = AnnIndex::new();
                memory_index = AnnIndex::new();
                Some(e.to_string())
            }
        };
        Self {
            db,
            model: settings.model.clone(),
            dim: settings.dim,
            unavailable_reason,
            summary_index: RwLock::new(summary_index),
            memory_index: RwLock::new(memory_index),
        }
    }

    fn load_index(
        db: &DbHandle,
        settings: &VectorSettings,
        kind: VectorKind,
        index: &mut AnnIndex,
    ) -> anyhow::Result<()> {
        let conn = db.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT id, embedding FROM {} WHERE model = ?1",
            kind.table()
        ))?;
        let mut rows = stmt.query([&settings.model])?;
        while let Some(row) = rows.next()? {
            let id: String = row.get(0)?;
            let embedding_bytes: Vec<u8> = row.get(1)?;
            let embedding: Vec<f32> = bincode::deserialize(&embedding_bytes)
                .map_err(|e| anyhow::anyhow!("Bincode error for vector {}: {}", id, e))?;
            index.vectors.insert(id, embedding);
        }
        index.rebuild(settings.dim)
    }

    fn ann(&self, kind: VectorKind) -> &RwLock<AnnIndex> {
        match kind {
            VectorKind::Summary => &self.summary_index,
            VectorKind::Memory => &self.memory_index,
        }
    }

    /// `true` while unscoped queries for `kind` go through the HNSW index.
    pub fn ann_ready(&self, kind: VectorKind) -> bool {
        self.ann(kind)
            .read()
            .map(|index| index.graph.is_some())
            .unwrap_or(false)
    }

    fn try_load(db: &DbHandle, settings: &VectorSettings) -> anyhow::Result<()> {
        if !settings.enabled {
            return Err(anyhow::anyhow!("disabled by configuration"));
        }
        if settings.dim == 0 || settings.dim > MAX_EMBEDDING_DIM {
            return Err(anyhow::anyhow!(
                "embedding dimension {} outside 1..={}",
                settings.dim,
                MAX_EMBEDDING_DIM
            ));
        }
        if settings.model.trim().is_empty() {
            return Err(anyhow::anyhow!("embedding model name is empty"));
        }

        let conn = db.conn()?;
        conn.execute_batch(VECTOR_SCHEMA_SQL)?;
        for kind in [VectorKind::Summary, VectorKind::Memory] {
            let mut stmt = conn.prepare(&format!(
                "SELECT DISTINCT dim FROM {} WHERE dim != ?1",
                kind.table()
            ))?;
            let foreign: Vec<i64> = stmt
                .query_map([settings.dim as i64], |row| row.get(0))?
                .collect::<rusqlite::Result<_>>()?;
            if let Some(dim) = foreign.first() {
                return Err(anyhow::anyhow!(
                    "{} holds {}-dimensional vectors but {} was configured",
                    kind.table(),
                    dim,
                    settings.dim
                ));
            }
        }
        Ok(())
    }

    pub fn is_available(&self) -> bool {
        self.unavailable_reason.is_none()
    }

    pub fn unavailable_reason(&self) -> Option<&str> {
        self.unavailable_reason.as_deref()
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    fn ensure_available(&self) -> anyhow::Result<()> {
        match &self.unavailable_reason {
            None => Ok(()),
            Some(reason) => Err(anyhow::anyhow!("Vector backend unavailable: {}", reason)),
        }
    }

    fn check_vector(&self, embedding: &[f32]) -> anyhow::Result<()> {
        if embedding.len() != self.dim {
            return Err(anyhow::anyhow!(
                "Embedding has {} dimensions, expected {}",
                embedding.len(),
                self.dim
            ));
        }
        if embedding.iter().any(|v| !v.is_finite()) {
            return Err(anyhow::anyhow!("Embedding contains non-finite values"));
        }
        Ok(())
    }

    /// Insert or replace the vector for a summary or memory id.
    pub fn store(&self, kind: VectorKind, id: &str, embedding: &[f32]) -> anyhow::Result<()> {
        self.ensure_available()?;
        self.check_vector(embedding)?;
        let embedding_bytes = bincode::serialize(embedding)?;
        let conn = self.db.conn()?;
        conn.execute(
            &format!(
                "INSERT INTO {} (id, embedding, model, dim, created_at) VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(id) DO UPDATE SET
                    embedding = excluded.embedding,
                    model = excluded.model,
                    dim = excluded.dim,
                    created_at = excluded.created_at",
                kind.table()
            ),
            params![
                id,
                embedding_bytes,
                &self.model,
                self.dim as i64,
                format_timestamp(&chrono::Utc::now()),
            ],
        )?;

        match self.ann(kind).write() {
            Ok(mut index) => {
                if let Err(e) = index.insert(self.dim, id, embedding) {
                    debug!("{}, rebuilding", e);
                    if let Err(e) = index.rebuild(self.dim) {
                        warn!("{}; {} queries fall back to linear scan", e, kind.table());
                    }
                }
            }
            Err(_) => warn!("HNSW index lock for {} is poisoned", kind.table()),
        }
        Ok(())
    }

    /// Drop an id from the in-memory index after its row was deleted.
    pub fn forget(&self, kind: VectorKind, id: &str) {
        if let Ok(mut index) = self.ann(kind).write() {
            index.remove(id);
        }
    }

    pub fn has(&self, kind: VectorKind, id: &str) -> anyhow::Result<bool> {
        if !self.is_available() {
            return Ok(false);
        }
        let conn = self.db.conn()?;
        let count: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM {} WHERE id = ?1", kind.table()),
            [id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Nearest rows by cosine similarity, best first. Rows below `threshold`
    /// are dropped. Returns nothing when the backend is unavailable.
    pub fn find_similar(
        &self,
        kind: VectorKind,
        query_embedding: &[f32],
        thread_id: Option<&str>,
        limit: usize,
        threshold: f32,
    ) -> anyhow::Result<Vec<(String, f32)>> {
        if !self.is_available() || limit == 0 {
            return Ok(Vec::new());
        }
        self.check_vector(query_embedding)?;

        if thread_id.is_none() {
            if let Some(matches) = self.find_similar_ann(kind, query_embedding, limit, threshold)? {
                return Ok(matches);
            }
            debug!("HNSW index for {} not ready, using linear scan", kind.table());
        }
        self.find_similar_linear(kind, query_embedding, thread_id, limit, threshold)
    }

    fn find_similar_ann(
        &self,
        kind: VectorKind,
        query_embedding: &[f32],
        limit: usize,
        threshold: f32,
    ) -> anyhow::Result<Option<Vec<(String, f32)>>> {
        let candidates = {
            let Ok(index) = self.ann(kind).read() else {
                return Ok(None);
            };
            let k = limit
                .saturating_mul(4)
                .max(MIN_ANN_CANDIDATES)
                .min(index.slots.len());
            match index.candidates(query_embedding, k) {
                Some(candidates) => candidates,
                None => return Ok(None),
            }
        };

        // the in-memory index can outlive rows removed by cascade
        let conn = self.db.conn()?;
        let mut exists = conn.prepare(&format!(
            "SELECT COUNT(*) FROM {} v JOIN {} p ON p.id = v.id WHERE v.id = ?1",
            kind.table(),
            kind.parent_table()
        ))?;
        let mut matches = Vec::new();
        for (id, sim) in candidates {
            if sim < threshold || matches.len() >= limit {
                break;
            }
            let count: i64 = exists.query_row([&id], |row| row.get(0))?;
            if count > 0 {
                matches.push((id, sim));
            }
        }
        Ok(Some(matches))
    }

    fn find_similar_linear(
        &self,
        kind: VectorKind,
        query_embedding: &[f32],
        thread_id: Option<&str>,
        limit: usize,
        threshold: f32,
    ) -> anyhow::Result<Vec<(String, f32)>> {
        let conn = self.db.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT v.id, v.embedding FROM {} v
             JOIN {} p ON p.id = v.id
             WHERE v.model = ?1 AND (?2 IS NULL OR p.thread_id = ?2)",
            kind.table(),
            kind.parent_table()
        ))?;
        let mut rows = stmt.query(params![&self.model, thread_id])?;

        let mut matches = Vec::new();
        while let Some(row) = rows.next()? {
            let id: String = row.get(0)?;
            let embedding_bytes: Vec<u8> = row.get(1)?;
            let embedding: Vec<f32> = bincode::deserialize(&embedding_bytes)
                .map_err(|e| anyhow::anyhow!("Bincode error for vector {}: {}", id, e))?;

            let sim = cosine_similarity(query_embedding, &embedding);
            if sim >= threshold {
                matches.push((id, sim));
            }
        }

        sort_matches(&mut matches);
        matches.truncate(limit);
        Ok(matches)
    }

    pub fn count(&self, kind: VectorKind) -> anyhow::Result<i64> {
        if !self.is_available() {
            return Ok(0);
        }
        let conn = self.db.conn()?;
        Ok(conn.query_row(&format!("SELECT COUNT(*) FROM {}", kind.table()), [], |row| row.get(0))?)
    }
}

/// Score descending, then id ascending.
fn sort_matches(matches: &mut [(String, f32)]) {
    matches.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_db::{IndexStore, MemoryType, PersistentMemory};
    use crate::testing::summary_entry;
    use tempfile::TempDir;

    fn settings(dim: usize) -> VectorSettings {
        VectorSettings { enabled: true, model: "test-embed".into(), dim }
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn test_zero_dimension_disables_vectors_only() {
        let dir = TempDir::new().unwrap();
        let store = IndexStore::open(&dir.path().join("index.db"), &settings(0)).unwrap();
        assert!(!store.vector_search_available());
        assert!(store.embeddings.unavailable_reason().unwrap().contains("dimension"));

        store.summaries.insert(&summary_entry("c1", "t", "a", "b", "kafka")).unwrap();
        assert!(store.embeddings.store(VectorKind::Summary, "c1", &[]).is_err());
        assert!(store
            .embeddings
            .find_similar(VectorKind::Summary, &[], None, 5, 0.0)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_dimension_mismatch_on_reopen_disables_vectors() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("index.db");
        {
            let store = IndexStore::open(&path, &settings(3)).unwrap();
            assert!(store.vector_search_available());
            store.summaries.insert(&summary_entry("c1", "t", "a", "b", "kafka")).unwrap();
            store.embeddings.store(VectorKind::Summary, "c1", &[1.0, 0.0, 0.0]).unwrap();
            store.close().unwrap();
        }
        let reopened = IndexStore::open(&path, &settings(4)).unwrap();
        assert!(!reopened.vector_search_available());
        assert_eq!(reopened.summaries.count().unwrap(), 1);
    }

    #[test]
    fn test_find_similar_orders_and_filters() {
        let dir = TempDir::new().unwrap();
        let store = IndexStore::open(&dir.path().join("index.db"), &settings(3)).unwrap();
        for (id, thread, v) in [
            ("c1", "t1", [1.0, 0.0, 0.0]),
            ("c2", "t1", [0.8, 0.6, 0.0]),
            ("c3", "t2", [0.0, 0.0, 1.0]),
            ("c4", "t2", [0.9, 0.1, 0.0]),
        ] {
            store.summaries.insert(&summary_entry(id, thread, id, id, "text")).unwrap();
            store.embeddings.store(VectorKind::Summary, id, &v).unwrap();
        }

        let hits = store
            .embeddings
            .find_similar(VectorKind::Summary, &[1.0, 0.0, 0.0], None, 10, 0.3)
            .unwrap();
        let ids: Vec<_> = hits.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, vec!["c1", "c4", "c2"]);

        let scoped = store
            .embeddings
            .find_similar(VectorKind::Summary, &[1.0, 0.0, 0.0], Some("t1"), 1, 0.0)
            .unwrap();
        assert_eq!(scoped.len(), 1);
        assert_eq!(scoped[0].0, "c1");
    }

    #[test]
    fn test_hnsw_index_built_on_open_and_extended_on_store() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("index.db");
        let vector = |n: usize| -> Vec<f32> {
            (0..8).map(|i| ((n as f32 + 1.0) * (i as f32 + 1.0) * 0.37).sin()).collect()
        };
        {
            let store = IndexStore::open(&path, &settings(8)).unwrap();
            assert!(!store.embeddings.ann_ready(VectorKind::Summary));
            for n in 0..100 {
                let id = format!("c{:03}", n);
                store.summaries.insert(&summary_entry(&id, "t", &id, &id, "text")).unwrap();
                store.embeddings.store(VectorKind::Summary, &id, &vector(n)).unwrap();
            }
            assert!(store.embeddings.ann_ready(VectorKind::Summary));
            assert!(!store.embeddings.ann_ready(VectorKind::Memory));

            let hits = store
                .embeddings
                .find_similar(VectorKind::Summary, &vector(42), None, 3, -1.0)
                .unwrap();
            assert_eq!(hits.len(), 3);
            assert_eq!(hits[0].0, "c042");
            assert!((hits[0].1 - 1.0).abs() < 1e-5);
            store.close().unwrap();
        }

        let reopened = IndexStore::open(&path, &settings(8)).unwrap();
        assert!(reopened.embeddings.ann_ready(VectorKind::Summary));
        let ann = reopened
            .embeddings
            .find_similar(VectorKind::Summary, &vector(7), None, 1, 0.0)
            .unwrap();
        let linear = reopened
            .embeddings
            .find_similar(VectorKind::Summary, &vector(7), Some("t"), 1, 0.0)
            .unwrap();
        assert_eq!(ann[0].0, "c007");
        assert_eq!(ann, linear);
    }

    #[test]
    fn test_replaced_vector_is_rescored_with_latest_embedding() {
        let dir = TempDir::new().unwrap();
        let store = IndexStore::open(&dir.path().join("index.db"), &settings(3)).unwrap();
        for id in ["c1", "c2"] {
            store.summaries.insert(&summary_entry(id, "t", id, id, "text")).unwrap();
        }
        store.embeddings.store(VectorKind::Summary, "c1", &[1.0, 0.0, 0.0]).unwrap();
        store.embeddings.store(VectorKind::Summary, "c2", &[0.0, 1.0, 0.0]).unwrap();
        store.embeddings.store(VectorKind::Summary, "c1", &[0.0, 0.0, 1.0]).unwrap();

        let hits = store
            .embeddings
            .find_similar(VectorKind::Summary, &[1.0, 0.0, 0.0], None, 5, 0.5)
            .unwrap();
        assert!(hits.is_empty());
        let hits = store
            .embeddings
            .find_similar(VectorKind::Summary, &[0.0, 0.0, 1.0], None, 5, 0.5)
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0, "c1");
    }

    #[test]
    fn test_deleted_rows_leave_hnsw_results() {
        let dir = TempDir::new().unwrap();
        let store = IndexStore::open(&dir.path().join("index.db"), &settings(3)).unwrap();
        let now = chrono::Utc::now();
        for (id, v) in [("mem_a", [1.0, 0.0, 0.0]), ("mem_b", [0.9, 0.1, 0.0])] {
            store
                .memories
                .insert(&PersistentMemory {
                    id: id.into(),
                    memory_type: MemoryType::Fact,
                    content: id.into(),
                    tags: Vec::new(),
                    thread_id: None,
                    created_at: now,
                    updated_at: now,
                })
                .unwrap();
            store.embeddings.store(VectorKind::Memory, id, &v).unwrap();
        }

        // row gone by cascade, index not told
        store.memories.delete("mem_a").unwrap();
        let hits = store
            .embeddings
            .find_similar(VectorKind::Memory, &[1.0, 0.0, 0.0], None, 5, 0.0)
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0, "mem_b");

        store.memories.delete("mem_b").unwrap();
        store.embeddings.forget(VectorKind::Memory, "mem_b");
        assert!(store
            .embeddings
            .find_similar(VectorKind::Memory, &[1.0, 0.0, 0.0], None, 5, 0.0)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_store_rejects_wrong_length() {
        let dir = TempDir::new().unwrap();
        let store = IndexStore::open(&dir.path().join("index.db"), &settings(3)).unwrap();
        store.summaries.insert(&summary_entry("c1", "t", "a", "b", "x")).unwrap();
        assert!(store.embeddings.store(VectorKind::Summary, "c1", &[1.0, 2.0]).is_err());
        assert!(!store.embeddings.has(VectorKind::Summary, "c1").unwrap());
    }
}
