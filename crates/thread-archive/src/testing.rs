//! Deterministic collaborators and fixtures for tests.
//!
//! Nothing here talks to a network. The embedder is a hashed bag of words,
//! so texts that share words land close together and search tests can reason
//! about similarity without a model.

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::collaborators::{Embedder, Summarizer};
use crate::config::{ChunkThresholds, Config};
use crate::memory::Message;
use crate::memory_db::SummaryEntry;
use crate::utils::TextUtils;

/// Hashed bag-of-words embedder. Each distinct lowercase term adds weight to
/// one bucket; vectors are L2-normalized.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dim: usize,
}

impl HashEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim: dim.max(1) }
    }

    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dim];
        for term in TextUtils::query_terms(text) {
            let hash = blake3::hash(term.as_bytes());
            let mut bucket = [0u8; 8];
            bucket.copy_from_slice(&hash.as_bytes()[..8]);
            let slot = (u64::from_le_bytes(bucket) % self.dim as u64) as usize;
            vector[slot] += 1.0;
        }
        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    async fn embed(&self, texts: Vec<String>) -> anyhow::Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }
}

/// Embedder whose backend is always down.
#[derive(Debug, Clone, Copy, Default)]
pub struct FailingEmbedder;

#[async_trait]
impl Embedder for FailingEmbedder {
    async fn embed(&self, _texts: Vec<String>) -> anyhow::Result<Vec<Vec<f32>>> {
        Err(anyhow::anyhow!("embedding backend unreachable"))
    }
}

/// Wraps another embedder and sleeps before answering.
pub struct SlowEmbedder<E> {
    inner: E,
    delay: Duration,
}

impl<E> SlowEmbedder<E> {
    pub fn new(inner: E, delay: Duration) -> Self {
        Self { inner, delay }
    }
}

#[async_trait]
impl<E: Embedder> Embedder for SlowEmbedder<E> {
    async fn embed(&self, texts: Vec<String>) -> anyhow::Result<Vec<Vec<f32>>> {
        tokio::time::sleep(self.delay).await;
        self.inner.embed(texts).await
    }
}

/// Summarizer that concatenates the message text, so a chunk's summary
/// contains the words of its transcript. Counts its calls.
#[derive(Debug, Default)]
pub struct ScriptedSummarizer {
    calls: AtomicUsize,
}

impl ScriptedSummarizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Summarizer for ScriptedSummarizer {
    async fn summarize(&self, messages: &[Message], max_tokens: u32) -> anyhow::Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let text = messages
            .iter()
            .map(|m| m.plain_text())
            .collect::<Vec<_>>()
            .join(" ");
        let text = TextUtils::normalize_whitespace(&text);
        let max_chars = (max_tokens as usize).saturating_mul(4);
        Ok(format!(
            "Summary: {}",
            TextUtils::truncate_with_ellipsis(&text, max_chars)
        ))
    }
}

/// Summarizer that sleeps before delegating to [`ScriptedSummarizer`].
#[derive(Debug, Default)]
pub struct SlowSummarizer {
    inner: ScriptedSummarizer,
    delay: Duration,
}

impl SlowSummarizer {
    pub fn new(delay: Duration) -> Self {
        Self { inner: ScriptedSummarizer::new(), delay }
    }
}

#[async_trait]
impl Summarizer for SlowSummarizer {
    async fn summarize(&self, messages: &[Message], max_tokens: u32) -> anyhow::Result<String> {
        tokio::time::sleep(self.delay).await;
        self.inner.summarize(messages, max_tokens).await
    }
}

/// Summarizer whose backend is always down.
#[derive(Debug, Clone, Copy, Default)]
pub struct FailingSummarizer;

#[async_trait]
impl Summarizer for FailingSummarizer {
    async fn summarize(&self, _messages: &[Message], _max_tokens: u32) -> anyhow::Result<String> {
        Err(anyhow::anyhow!("summarization backend unreachable"))
    }
}

/// Small thresholds (min 100 / target 250 / max 400 tokens), 32-dim vectors
/// and a 2 second collaborator timeout, rooted at `root`.
pub fn test_config(root: &Path) -> Config {
    Config {
        storage_root: root.to_path_buf(),
        chunk_tokens: ChunkThresholds { min: 100, target: 250, max: 400 },
        summary_max_tokens: 256,
        embedding_model: "test-embedding".into(),
        embedding_dim: 32,
        collaborator_timeout_seconds: 2,
        min_vector_similarity: 0.2,
        ..Config::default()
    }
}

/// `count` alternating user/assistant messages with ids `{topic}-{n}` for n
/// starting at `first`. Each text is exactly `chars` ASCII characters and
/// starts with the topic word, so it costs `chars / 4` tokens.
pub fn turn_messages(topic: &str, first: usize, count: usize, chars: usize) -> Vec<Message> {
    let epoch = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).single().unwrap_or_else(Utc::now);
    (first..first + count)
        .map(|n| {
            let role = if n % 2 == 0 { "user" } else { "assistant" };
            let mut text = format!("{} discussion turn {}", topic, n);
            while text.len() < chars {
                text.push_str(" filler");
            }
            text.truncate(chars);
            Message::text(format!("{}-{}", topic, n), role, text)
                .with_created_at(epoch + ChronoDuration::seconds(n as i64))
        })
        .collect()
}

pub fn summary_entry(id: &str, thread_id: &str, first: &str, last: &str, summary: &str) -> SummaryEntry {
    let now = Utc::now();
    SummaryEntry {
        id: id.into(),
        thread_id: thread_id.into(),
        session_id: "session".into(),
        summary: summary.into(),
        token_count: 100,
        message_count: 2,
        first_message_id: first.into(),
        last_message_id: last.into(),
        created_at: now,
        time_start: now,
        time_end: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_db::cosine_similarity;
    use crate::utils::estimate_batch_tokens;

    #[test]
    fn test_hash_embedder_relates_shared_words() {
        let e = HashEmbedder::new(64);
        let a = e.embed_text("kafka consumer lag");
        let b = e.embed_text("Kafka lag alerts");
        let c = e.embed_text("sourdough bread recipe");
        assert!(cosine_similarity(&a, &b) > cosine_similarity(&a, &c));
        assert_eq!(a, e.embed_text("kafka consumer lag"));
    }

    #[test]
    fn test_turn_messages_cost() {
        let messages = turn_messages("kafka", 0, 4, 100);
        assert_eq!(messages[3].id, "kafka-3");
        assert!(messages[0].created_at < messages[1].created_at);
        assert_eq!(estimate_batch_tokens(&messages), 100);
    }

    #[tokio::test]
    async fn test_scripted_summarizer_echoes_words() {
        let s = ScriptedSummarizer::new();
        let out = s.summarize(&turn_messages("kafka", 0, 2, 40), 64).await.unwrap();
        assert!(out.contains("kafka discussion turn 0"));
        assert_eq!(s.calls(), 1);
    }
}
