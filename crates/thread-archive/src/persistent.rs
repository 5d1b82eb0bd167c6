//! Agent-written durable memories (facts, preferences, learnings).

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::collaborators::{embed_one, Embedder};
use crate::error::{validate_identifier, ValidationError};
use crate::memory_db::{IndexStore, MemoryFilter, MemoryType, PersistentMemory, VectorKind};
use crate::metrics;

/// New memory as submitted by the agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryDraft {
    pub memory_type: MemoryType,
    pub content: String,
    pub tags: Vec<String>,
    pub thread_id: Option<String>,
}

impl MemoryDraft {
    pub fn new(memory_type: MemoryType, content: impl Into<String>) -> Self {
        Self {
            memory_type,
            content: content.into(),
            tags: Vec::new(),
            thread_id: None,
        }
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn for_thread(mut self, thread_id: impl Into<String>) -> Self {
        self.thread_id = Some(thread_id.into());
        self
    }
}

pub struct PersistentMemoryManager {
    index: Arc<IndexStore>,
    embedder: Arc<dyn Embedder>,
    timeout: Duration,
}

impl PersistentMemoryManager {
    pub fn new(index: Arc<IndexStore>, embedder: Arc<dyn Embedder>, timeout: Duration) -> Self {
        Self { index, embedder, timeout }
    }

    /// Store a new memory. The content is embedded first when the vector
    /// backend is available; if that fails nothing is stored.
    pub async fn write(&self, draft: MemoryDraft) -> anyhow::Result<PersistentMemory> {
        let content = draft.content.trim().to_string();
        if content.is_empty() {
            return Err(ValidationError::EmptyContent.into());
        }
        if let Some(thread_id) = &draft.thread_id {
            validate_identifier("thread id", thread_id)?;
        }

        let embedding = self.embed_if_available(&content).await?;
        let now = Utc::now();
        let memory = PersistentMemory {
            id: format!("mem_{}", uuid::Uuid::new_v4().simple()),
            memory_type: draft.memory_type,
            content,
            tags: normalize_tags(draft.tags),
            thread_id: draft.thread_id,
            created_at: now,
            updated_at: now,
        };

        self.index.memories.insert(&memory)?;
        if let Some(embedding) = embedding {
            if let Err(e) = self.index.embeddings.store(VectorKind::Memory, &memory.id, &embedding) {
                self.index.memories.delete(&memory.id)?;
                return Err(e.context("Failed to store memory vector"));
            }
        }

        metrics::record_memory_write("write");
        info!("Stored {} memory {}", memory.memory_type, memory.id);
        Ok(memory)
    }

    /// Replace content and tags (and optionally the type) of a memory,
    /// refreshing `updated_at`. Returns `None` if the id does not exist. If
    /// the new vector cannot be stored the previous row is put back.
    pub async fn update(
        &self,
        id: &str,
        content: impl Into<String>,
        tags: Vec<String>,
        memory_type: Option<MemoryType>,
    ) -> anyhow::Result<Option<PersistentMemory>> {
        let content = content.into().trim().to_string();
        if content.is_empty() {
            return Err(ValidationError::EmptyContent.into());
        }
        let Some(existing) = self.index.memories.get(id)? else {
            return Ok(None);
        };

        let embedding = self.embed_if_available(&content).await?;
        let updated = PersistentMemory {
            memory_type: memory_type.unwrap_or(existing.memory_type),
            content,
            tags: normalize_tags(tags),
            updated_at: Utc::now(),
            ..existing.clone()
        };
        if !self.index.memories.update(&updated)? {
            return Ok(None);
        }
        if let Some(embedding) = embedding {
            if let Err(e) = self.index.embeddings.store(VectorKind::Memory, &updated.id, &embedding) {
                self.index.memories.update(&existing)?;
                return Err(e.context("Failed to store memory vector"));
            }
        }

        metrics::record_memory_write("update");
        debug!("Updated memory {}", updated.id);
        Ok(Some(updated))
    }

    /// `true` if a memory with this id existed and was removed.
    pub fn delete(&self, id: &str) -> anyhow::Result<bool> {
        let deleted = self.index.memories.delete(id)?;
        if deleted {
            self.index.embeddings.forget(VectorKind::Memory, id);
            metrics::record_memory_write("delete");
            info!("Deleted memory {}", id);
        }
        Ok(deleted)
    }

    pub fn get(&self, id: &str) -> anyhow::Result<Option<PersistentMemory>> {
        self.index.memories.get(id)
    }

    pub fn list(&self, filter: &MemoryFilter) -> anyhow::Result<Vec<PersistentMemory>> {
        if filter.limit == Some(0) {
            return Err(ValidationError::InvalidLimit(0).into());
        }
        self.index.memories.list(filter)
    }

    async fn embed_if_available(&self, content: &str) -> anyhow::Result<Option<Vec<f32>>> {
        if !self.index.vector_search_available() {
            return Ok(None);
        }
        let embedding = embed_one(self.embedder.as_ref(), content, self.timeout).await?;
        Ok(Some(embedding))
    }
}

/// Trimmed, non-empty, de-duplicated tags in first-seen order.
fn normalize_tags(tags: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    tags.into_iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty() && seen.insert(t.to_lowercase()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_db::VectorSettings;
    use crate::testing::{FailingEmbedder, HashEmbedder};
    use tempfile::TempDir;

    fn manager(embedder: Arc<dyn Embedder>, vectors: bool) -> (TempDir, Arc<IndexStore>, PersistentMemoryManager) {
        let dir = TempDir::new().unwrap();
        let settings = VectorSettings { enabled: vectors, model: "test-embedding".into(), dim: 32 };
        let index = Arc::new(IndexStore::open(&dir.path().join("index.db"), &settings).unwrap());
        let manager = PersistentMemoryManager::new(Arc::clone(&index), embedder, Duration::from_secs(2));
        (dir, index, manager)
    }

    #[tokio::test]
    async fn test_write_stores_row_and_vector() {
        let (_dir, index, manager) = manager(Arc::new(HashEmbedder::new(32)), true);
        let memory = manager
            .write(MemoryDraft::new(MemoryType::Preference, "  Prefers tabs over spaces ").with_tags(["style", "style", " "]))
            .await
            .unwrap();
        assert!(memory.id.starts_with("mem_"));
        assert_eq!(memory.content, "Prefers tabs over spaces");
        assert_eq!(memory.tags, vec!["style"]);
        assert_eq!(memory.created_at, memory.updated_at);
        assert_eq!(manager.get(&memory.id).unwrap(), Some(memory.clone()));
        assert!(index.embeddings.has(VectorKind::Memory, &memory.id).unwrap());
    }

    #[tokio::test]
    async fn test_embedding_failure_stores_nothing() {
        let (_dir, index, manager) = manager(Arc::new(FailingEmbedder), true);
        let result = manager.write(MemoryDraft::new(MemoryType::Fact, "db is postgres")).await;
        assert!(result.is_err());
        assert_eq!(index.memories.count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_write_without_vector_backend_skips_embedding() {
        let (_dir, _index, manager) = manager(Arc::new(FailingEmbedder), false);
        let memory = manager.write(MemoryDraft::new(MemoryType::Fact, "db is postgres")).await.unwrap();
        assert!(manager.get(&memory.id).unwrap().is_some());
    }

    #[tokio::test]
    async fn test_empty_content_rejected() {
        let (_dir, _index, manager) = manager(Arc::new(HashEmbedder::new(32)), true);
        let err = manager.write(MemoryDraft::new(MemoryType::Fact, "   ")).await.unwrap_err();
        assert_eq!(err.downcast_ref::<ValidationError>(), Some(&ValidationError::EmptyContent));
    }

    #[tokio::test]
    async fn test_delete_reports_existence_once() {
        let (_dir, index, manager) = manager(Arc::new(HashEmbedder::new(32)), true);
        let memory = manager.write(MemoryDraft::new(MemoryType::Learning, "retry flaky CI once")).await.unwrap();
        assert!(manager.delete(&memory.id).unwrap());
        assert!(!manager.delete(&memory.id).unwrap());
        assert!(!manager.delete("mem_unknown").unwrap());
        assert!(manager.get(&memory.id).unwrap().is_none());
        assert_eq!(index.embeddings.count(VectorKind::Memory).unwrap(), 0);
    }

    #[tokio::test]
    async fn test_update_replaces_content_and_refreshes_timestamp() {
        let (_dir, _index, manager) = manager(Arc::new(HashEmbedder::new(32)), true);
        let memory = manager.write(MemoryDraft::new(MemoryType::Fact, "deploys on friday")).await.unwrap();
        let updated = manager
            .update(&memory.id, "deploys on tuesday", vec!["release".into()], None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.content, "deploys on tuesday");
        assert_eq!(updated.tags, vec!["release"]);
        assert_eq!(updated.created_at, memory.created_at);
        assert!(updated.updated_at >= memory.updated_at);
        assert_eq!(updated.memory_type, MemoryType::Fact);
        assert!(manager.update("mem_missing", "x", vec![], None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_failed_vector_store_keeps_previous_content() {
        let (_dir, index, manager) = manager(Arc::new(HashEmbedder::new(32)), true);
        let memory = manager.write(MemoryDraft::new(MemoryType::Fact, "cache ttl is 60s")).await.unwrap();

        // 16-dimensional vectors are rejected by a 32-dimensional index
        let mismatched =
            PersistentMemoryManager::new(Arc::clone(&index), Arc::new(HashEmbedder::new(16)), Duration::from_secs(2));
        let result = mismatched
            .update(&memory.id, "cache ttl is 5m", vec!["cache".into()], Some(MemoryType::Learning))
            .await;
        assert!(result.is_err());

        assert_eq!(manager.get(&memory.id).unwrap(), Some(memory.clone()));
        let fts = index.memories.search_fts("\"ttl\"", None, 10).unwrap();
        assert_eq!(fts.len(), 1);
        assert_eq!(fts[0].content, "cache ttl is 60s");
        assert!(index.embeddings.has(VectorKind::Memory, &memory.id).unwrap());
    }

    #[tokio::test]
    async fn test_list_is_stable_and_bounded() {
        let (_dir, _index, manager) = manager(Arc::new(HashEmbedder::new(32)), true);
        for i in 0..4 {
            let kind = if i % 2 == 0 { MemoryType::Fact } else { MemoryType::Learning };
            manager.write(MemoryDraft::new(kind, format!("note {}", i))).await.unwrap();
        }
        let all = manager.list(&MemoryFilter::default()).unwrap();
        assert_eq!(all.len(), 4);
        assert_eq!(all, manager.list(&MemoryFilter::default()).unwrap());

        let facts = manager
            .list(&MemoryFilter { memory_type: Some(MemoryType::Fact), limit: Some(1), ..Default::default() })
            .unwrap();
        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].memory_type, MemoryType::Fact);
        assert!(manager.list(&MemoryFilter { limit: Some(0), ..Default::default() }).is_err());
    }
}
