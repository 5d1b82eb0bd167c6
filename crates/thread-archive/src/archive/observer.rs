//! Archival observer: shadows threads and moves their history into chunks.
//!
//! Per thread the observer walks `Idle -> Observing -> ChunkReady ->
//! Summarizing -> Embedding -> Committed -> Idle`. At most one attempt per
//! thread is in flight; a trigger that arrives meanwhile is coalesced into a
//! single re-run once the current attempt finishes.
//!
//! Commit order for one chunk is chunk file, summary row (its FTS row follows
//! by trigger), vector row, watermark. Nothing durable is written before the
//! summary and embedding are in hand, and the watermark is written last, so
//! a failed or cancelled attempt leaves the watermark where it was.

use std::future::Future;
use std::ops::Range;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::chunk_store::ChunkStore;
use super::types::{ArchiveChunk, ArchiveWatermark, MessageRange};
use crate::collaborators::{embed_one, Embedder, Summarizer};
use crate::config::{ChunkThresholds, Config};
use crate::error::validate_identifier;
use crate::memory::{Message, SessionSource};
use crate::memory_db::{IndexStore, VectorKind};
use crate::metrics;
use crate::utils::{estimate_message_tokens, sum_tokens};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArchivalState {
    Idle,
    Observing,
    ChunkReady,
    Summarizing,
    Embedding,
    Committed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ArchiveOutcome {
    /// Archival is switched off in configuration.
    Disabled,
    /// Another attempt for this thread was running; it will run once more.
    Coalesced,
    /// Unarchived tail is below the minimum chunk size.
    BelowMinimum { tail_tokens: u64 },
    /// Tail is above the minimum but has not reached the target yet.
    Waiting { tail_tokens: u64 },
    Archived { chunk_ids: Vec<String> },
}

impl ArchiveOutcome {
    fn label(&self) -> &'static str {
        match self {
            ArchiveOutcome::Disabled => "disabled",
            ArchiveOutcome::Coalesced => "coalesced",
            ArchiveOutcome::BelowMinimum { .. } => "below_minimum",
            ArchiveOutcome::Waiting { .. } => "waiting",
            ArchiveOutcome::Archived { .. } => "archived",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReindexReport {
    pub chunks_scanned: usize,
    pub rows_restored: usize,
    pub vectors_restored: usize,
    pub unreadable_chunks: usize,
}

/// Split consecutive message costs into runs of at most `max` tokens. A
/// single message above `max` becomes a run of its own.
fn plan_chunks(costs: &[u64], max: u64) -> Vec<Range<usize>> {
    let mut runs = Vec::new();
    let mut start = 0;
    let mut acc = 0u64;
    for (i, &cost) in costs.iter().enumerate() {
        if i > start && acc.saturating_add(cost) > max {
            runs.push(start..i);
            start = i;
            acc = 0;
        }
        acc = acc.saturating_add(cost);
    }
    if start < costs.len() {
        runs.push(start..costs.len());
    }
    runs
}

/// Trigger that arrived while an attempt was running. Later triggers replace
/// the session; `force` sticks once any of them asked for a flush.
#[derive(Debug, Clone, PartialEq, Eq)]
struct PendingRun {
    session_id: String,
    force: bool,
}

/// Removes the in-flight marker if an attempt is cancelled or panics.
struct InFlightGuard<'a> {
    in_flight: &'a DashMap<String, Option<PendingRun>>,
    thread_id: &'a str,
    armed: bool,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.in_flight.remove(self.thread_id);
        }
    }
}

pub struct ArchivalObserver {
    enabled: bool,
    thresholds: ChunkThresholds,
    summary_max_tokens: u32,
    timeout: Duration,
    chunks: Arc<ChunkStore>,
    index: Arc<IndexStore>,
    sessions: Arc<dyn SessionSource>,
    summarizer: Arc<dyn Summarizer>,
    embedder: Arc<dyn Embedder>,
    /// thread id -> re-run requested while the current attempt runs
    in_flight: DashMap<String, Option<PendingRun>>,
    states: DashMap<String, ArchivalState>,
}

impl ArchivalObserver {
    pub fn new(
        config: &Config,
        chunks: Arc<ChunkStore>,
        index: Arc<IndexStore>,
        sessions: Arc<dyn SessionSource>,
        summarizer: Arc<dyn Summarizer>,
        embedder: Arc<dyn Embedder>,
    ) -> Self {
        Self {
            enabled: config.archive_enabled,
            thresholds: config.chunk_tokens,
            summary_max_tokens: config.summary_max_tokens,
            timeout: config.collaborator_timeout(),
            chunks,
            index,
            sessions,
            summarizer,
            embedder,
            in_flight: DashMap::new(),
            states: DashMap::new(),
        }
    }

    pub fn state(&self, thread_id: &str) -> ArchivalState {
        self.states
            .get(thread_id)
            .map(|s| *s)
            .unwrap_or(ArchivalState::Idle)
    }

    pub fn watermark(&self, thread_id: &str) -> Option<ArchiveWatermark> {
        self.chunks.read_watermark(thread_id)
    }

    pub fn read_chunk(&self, thread_id: &str, chunk_id: &str) -> Option<ArchiveChunk> {
        self.chunks.read_chunk(thread_id, chunk_id)
    }

    pub fn list_chunk_ids(&self, thread_id: &str) -> anyhow::Result<Vec<String>> {
        self.chunks.list_chunk_ids(thread_id)
    }

    fn set_state(&self, thread_id: &str, state: ArchivalState) {
        self.states.insert(thread_id.to_string(), state);
    }

    /// Fire-and-forget trigger for a completed turn.
    pub fn on_turn_complete(
        self: &Arc<Self>,
        thread_id: impl Into<String>,
        session_id: impl Into<String>,
    ) -> tokio::task::JoinHandle<()> {
        let observer = Arc::clone(self);
        let thread_id = thread_id.into();
        let session_id = session_id.into();
        tokio::spawn(async move {
            match observer.archive_thread(&thread_id, &session_id).await {
                Ok(outcome) => debug!("Archival for {} finished: {:?}", thread_id, outcome),
                Err(e) => warn!("Archival for {} aborted: {:#}", thread_id, e),
            }
        })
    }

    /// Run one archival attempt (plus any coalesced re-run) for a thread.
    pub async fn archive_thread(
        &self,
        thread_id: &str,
        session_id: &str,
    ) -> anyhow::Result<ArchiveOutcome> {
        self.run_guarded(thread_id, session_id, false).await
    }

    /// Archive any tail of at least the minimum size, ignoring the target.
    /// Meant for session end.
    pub async fn flush(&self, thread_id: &str, session_id: &str) -> anyhow::Result<ArchiveOutcome> {
        self.run_guarded(thread_id, session_id, true).await
    }

    async fn run_guarded(
        &self,
        thread_id: &str,
        session_id: &str,
        force: bool,
    ) -> anyhow::Result<ArchiveOutcome> {
        validate_identifier("thread id", thread_id)?;
        validate_identifier("session id", session_id)?;
        if !self.enabled {
            return Ok(ArchiveOutcome::Disabled);
        }

        match self.in_flight.entry(thread_id.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(mut entry) => {
                let pending = entry.get_mut();
                let force = force || pending.as_ref().is_some_and(|p| p.force);
                *pending = Some(PendingRun { session_id: session_id.to_string(), force });
                debug!("Archival for {} already in flight, coalescing trigger", thread_id);
                metrics::record_archive_attempt("coalesced");
                return Ok(ArchiveOutcome::Coalesced);
            }
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                entry.insert(None);
            }
        }
        let mut guard = InFlightGuard { in_flight: &self.in_flight, thread_id, armed: true };

        let mut session_id = session_id.to_string();
        let mut force = force;
        let mut committed = Vec::new();
        let outcome = loop {
            let result = self.attempt(thread_id, &session_id, force).await;
            self.set_state(thread_id, ArchivalState::Idle);
            let outcome = match result {
                Ok(outcome) => outcome,
                Err(e) => {
                    metrics::record_archive_attempt("failed");
                    warn!("Archival attempt for {} failed: {:#}", thread_id, e);
                    return Err(e);
                }
            };
            metrics::record_archive_attempt(outcome.label());
            if let ArchiveOutcome::Archived { chunk_ids } = &outcome {
                committed.extend(chunk_ids.iter().cloned());
            }

            if self.in_flight.remove_if(thread_id, |_, pending| pending.is_none()).is_some() {
                guard.armed = false;
                break outcome;
            }
            let next = self
                .in_flight
                .get_mut(thread_id)
                .and_then(|mut pending| pending.take());
            let Some(next) = next else {
                guard.armed = false;
                break outcome;
            };
            debug!(
                "Re-running coalesced archival for {} (session {}, force {})",
                thread_id, next.session_id, next.force
            );
            session_id = next.session_id;
            force = next.force;
        };

        if committed.is_empty() {
            Ok(outcome)
        } else {
            Ok(ArchiveOutcome::Archived { chunk_ids: committed })
        }
    }

    async fn bounded<T>(
        &self,
        what: &str,
        fut: impl Future<Output = anyhow::Result<T>>,
    ) -> anyhow::Result<T> {
        tokio::time::timeout(self.timeout, fut)
            .await
            .map_err(|_| anyhow::anyhow!("{} timed out after {:?}", what, self.timeout))?
    }

    async fn attempt(
        &self,
        thread_id: &str,
        session_id: &str,
        force: bool,
    ) -> anyhow::Result<ArchiveOutcome> {
        self.set_state(thread_id, ArchivalState::Observing);

        let mut prior = self.chunks.read_watermark(thread_id);
        let messages = self
            .bounded("Session fetch", self.sessions.get_session_messages(session_id))
            .await?;

        let start = match &prior {
            Some(w) if w.session_id == session_id => resume_index(w, &messages),
            Some(w) => {
                info!(
                    "Thread {} moved from session {} to {}, archiving from the start",
                    thread_id, w.session_id, session_id
                );
                0
            }
            None => 0,
        };

        let tail = &messages[start.min(messages.len())..];
        let costs: Vec<u64> = tail.iter().map(estimate_message_tokens).collect();
        let tail_tokens = sum_tokens(costs.iter().copied());

        if tail_tokens < self.thresholds.min {
            return Ok(ArchiveOutcome::BelowMinimum { tail_tokens });
        }
        if !force && tail_tokens < self.thresholds.target {
            return Ok(ArchiveOutcome::Waiting { tail_tokens });
        }

        let runs = plan_chunks(&costs, self.thresholds.max);
        let last_run = runs.len().saturating_sub(1);
        let mut chunk_ids = Vec::new();

        for (n, run) in runs.into_iter().enumerate() {
            let run_tokens = sum_tokens(costs[run.clone()].iter().copied());
            let floor = if force { self.thresholds.min } else { self.thresholds.target };
            if n == last_run && n > 0 && run_tokens < floor {
                debug!(
                    "Leaving {} tokens of {} unarchived until more turns arrive",
                    run_tokens, thread_id
                );
                break;
            }

            self.set_state(thread_id, ArchivalState::ChunkReady);
            let first_index = start + run.start;
            let (next, chunk_id) = self
                .archive_run(thread_id, session_id, prior.as_ref(), &tail[run], first_index, run_tokens)
                .await?;
            chunk_ids.push(chunk_id);
            prior = Some(next);
        }

        if chunk_ids.is_empty() {
            return Ok(ArchiveOutcome::Waiting { tail_tokens });
        }
        Ok(ArchiveOutcome::Archived { chunk_ids })
    }

    /// Summarize, embed and commit one chunk. Returns the new watermark and
    /// the chunk id.
    async fn archive_run(
        &self,
        thread_id: &str,
        session_id: &str,
        prior: Option<&ArchiveWatermark>,
        messages: &[Message],
        first_index: usize,
        token_count: u64,
    ) -> anyhow::Result<(ArchiveWatermark, String)> {
        let (first, last) = match (messages.first(), messages.last()) {
            (Some(first), Some(last)) => (first, last),
            _ => return Err(anyhow::anyhow!("Cannot archive an empty run")),
        };
        let range = MessageRange {
            first_message_id: first.id.clone(),
            last_message_id: last.id.clone(),
            first_index,
            last_index: first_index + messages.len() - 1,
            start: first.created_at,
            end: last.created_at,
        };
        let vectors = self.index.vector_search_available();

        if let Some(existing) = self.index.summaries.find_by_range(
            thread_id,
            session_id,
            &range.first_message_id,
            &range.last_message_id,
        )? {
            info!(
                "Chunk {} for {} was already indexed, completing its commit",
                existing.id, thread_id
            );
            let chunk = ArchiveChunk {
                id: existing.id.clone(),
                thread_id: thread_id.to_string(),
                session_id: session_id.to_string(),
                summary: existing.summary.clone(),
                messages: messages.to_vec(),
                token_count,
                message_count: messages.len(),
                range,
                created_at: existing.created_at,
            };
            let embedding = if vectors && !self.index.embeddings.has(VectorKind::Summary, &chunk.id)? {
                self.set_state(thread_id, ArchivalState::Embedding);
                Some(self.embed_summary(&chunk.summary).await?)
            } else {
                None
            };
            if self.chunks.read_chunk(thread_id, &chunk.id).is_none() {
                self.chunks.write_chunk(&chunk)?;
            }
            if let Some(embedding) = embedding {
                self.index.embeddings.store(VectorKind::Summary, &chunk.id, &embedding)?;
            }
            let watermark = ArchiveWatermark::advance(prior, &chunk);
            self.chunks.write_watermark(&watermark)?;
            self.set_state(thread_id, ArchivalState::Committed);
            return Ok((watermark, chunk.id));
        }

        let sequence = prior.map(|w| w.chunk_count).unwrap_or(0);
        let chunk_id = ArchiveChunk::make_id(sequence, session_id, &range);

        self.set_state(thread_id, ArchivalState::Summarizing);
        let summary = self
            .bounded(
                "Summarization",
                self.summarizer.summarize(messages, self.summary_max_tokens),
            )
            .await?;

        let embedding = if vectors {
            self.set_state(thread_id, ArchivalState::Embedding);
            Some(self.embed_summary(&summary).await?)
        } else {
            None
        };

        let chunk = ArchiveChunk {
            id: chunk_id,
            thread_id: thread_id.to_string(),
            session_id: session_id.to_string(),
            summary,
            messages: messages.to_vec(),
            token_count,
            message_count: messages.len(),
            range,
            created_at: Utc::now(),
        };

        self.chunks.write_chunk(&chunk)?;
        self.index.summaries.insert(&chunk.summary_entry())?;
        if let Some(embedding) = embedding {
            self.index.embeddings.store(VectorKind::Summary, &chunk.id, &embedding)?;
        }
        let watermark = ArchiveWatermark::advance(prior, &chunk);
        self.chunks.write_watermark(&watermark)?;

        self.set_state(thread_id, ArchivalState::Committed);
        metrics::record_chunk_committed(chunk.token_count);
        info!(
            "Archived chunk {} for {} (messages {}..={}, {} tokens)",
            chunk.id, thread_id, chunk.range.first_index, chunk.range.last_index, chunk.token_count
        );
        Ok((watermark, chunk.id))
    }

    async fn embed_summary(&self, summary: &str) -> anyhow::Result<Vec<f32>> {
        embed_one(self.embedder.as_ref(), summary, self.timeout).await
    }

    /// Recreate index rows (and vectors) for chunk files that have none.
    pub async fn reindex_thread(&self, thread_id: &str) -> anyhow::Result<ReindexReport> {
        let mut report = ReindexReport::default();
        let vectors = self.index.vector_search_available();

        for chunk_id in self.chunks.list_chunk_ids(thread_id)? {
            report.chunks_scanned += 1;
            let Some(chunk) = self.chunks.read_chunk(thread_id, &chunk_id) else {
                report.unreadable_chunks += 1;
                continue;
            };
            if self.index.summaries.get(&chunk.id)?.is_none()
                && self.index.summaries.insert(&chunk.summary_entry())?
            {
                report.rows_restored += 1;
            }
            if vectors
                && self.index.summaries.get(&chunk.id)?.is_some()
                && !self.index.embeddings.has(VectorKind::Summary, &chunk.id)?
            {
                match self.embed_summary(&chunk.summary).await {
                    Ok(embedding) => {
                        self.index.embeddings.store(VectorKind::Summary, &chunk.id, &embedding)?;
                        report.vectors_restored += 1;
                    }
                    Err(e) => warn!("Could not embed chunk {} during reindex: {:#}", chunk.id, e),
                }
            }
        }

        info!(
            "Reindexed {}: {} chunks, {} rows and {} vectors restored",
            thread_id, report.chunks_scanned, report.rows_restored, report.vectors_restored
        );
        Ok(report)
    }
}

/// First unarchived index in `messages` for a watermark of the same session.
/// Prefers the recorded message id over the recorded index, since the runtime
/// may have compacted earlier history.
fn resume_index(watermark: &ArchiveWatermark, messages: &[Message]) -> usize {
    let by_index = watermark.last_archived_message_index;
    if messages
        .get(by_index)
        .is_some_and(|m| m.id == watermark.last_archived_message_id)
    {
        return by_index + 1;
    }
    if let Some(pos) = messages
        .iter()
        .position(|m| m.id == watermark.last_archived_message_id)
    {
        debug!("Watermark message moved from {} to {}", by_index, pos);
        return pos + 1;
    }
    warn!(
        "Last archived message {} not found in session {}, resuming at index {}",
        watermark.last_archived_message_id,
        watermark.session_id,
        watermark.next_index()
    );
    watermark.next_index().min(messages.len())
}
