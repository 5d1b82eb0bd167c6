//! Durable archive records: chunk transcripts and per-thread watermarks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::memory::Message;
use crate::memory_db::SummaryEntry;

/// Position and time span of the messages a chunk covers. Indices are
/// positions in the owning session's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageRange {
    pub first_message_id: String,
    pub last_message_id: String,
    pub first_index: usize,
    pub last_index: usize,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Immutable, summarized slice of a thread's verbatim history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchiveChunk {
    pub id: String,
    pub thread_id: String,
    pub session_id: String,
    pub summary: String,
    pub messages: Vec<Message>,
    pub token_count: u64,
    pub message_count: usize,
    pub range: MessageRange,
    pub created_at: DateTime<Utc>,
}

impl ArchiveChunk {
    /// Deterministic chunk id: the thread's chunk sequence number followed by
    /// a content hash of the covered range. A retried commit of the same range
    /// at the same position gets the same id.
    pub fn make_id(sequence: u64, session_id: &str, range: &MessageRange) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(session_id.as_bytes());
        hasher.update(&[0]);
        hasher.update(range.first_message_id.as_bytes());
        hasher.update(&[0]);
        hasher.update(range.last_message_id.as_bytes());
        hasher.update(&(range.first_index as u64).to_le_bytes());
        let hash = hasher.finalize().to_hex();
        format!("{:06}-{}", sequence, &hash[..12])
    }

    /// Searchable projection stored in the index.
    pub fn summary_entry(&self) -> SummaryEntry {
        SummaryEntry {
            id: self.id.clone(),
            thread_id: self.thread_id.clone(),
            session_id: self.session_id.clone(),
            summary: self.summary.clone(),
            token_count: self.token_count,
            message_count: self.message_count,
            first_message_id: self.range.first_message_id.clone(),
            last_message_id: self.range.last_message_id.clone(),
            created_at: self.created_at,
            time_start: self.range.start,
            time_end: self.range.end,
        }
    }
}

/// Durable cursor of how much of a thread's current session is archived.
/// `archived_tokens` and `chunk_count` are cumulative for the thread and
/// survive a session change; the position fields do not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchiveWatermark {
    pub thread_id: String,
    pub session_id: String,
    pub last_archived_message_index: usize,
    pub last_archived_message_id: String,
    pub archived_tokens: u64,
    pub chunk_count: u64,
    pub last_archived_at: DateTime<Utc>,
}

impl ArchiveWatermark {
    /// Index of the first message not yet archived.
    pub fn next_index(&self) -> usize {
        self.last_archived_message_index + 1
    }

    /// Watermark after committing `chunk` on top of `previous` (which may be
    /// absent or belong to an older session).
    pub fn advance(previous: Option<&ArchiveWatermark>, chunk: &ArchiveChunk) -> Self {
        let (archived_tokens, chunk_count) = previous
            .map(|w| (w.archived_tokens, w.chunk_count))
            .unwrap_or((0, 0));
        Self {
            thread_id: chunk.thread_id.clone(),
            session_id: chunk.session_id.clone(),
            last_archived_message_index: chunk.range.last_index,
            last_archived_message_id: chunk.range.last_message_id.clone(),
            archived_tokens: archived_tokens.saturating_add(chunk.token_count),
            chunk_count: chunk_count.saturating_add(1),
            last_archived_at: chunk.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range(first: &str, last: &str, first_index: usize, last_index: usize) -> MessageRange {
        let now = Utc::now();
        MessageRange {
            first_message_id: first.into(),
            last_message_id: last.into(),
            first_index,
            last_index,
            start: now,
            end: now,
        }
    }

    #[test]
    fn test_chunk_id_is_deterministic_and_ordered() {
        let r = range("m1", "m9", 0, 8);
        let a = ArchiveChunk::make_id(3, "s1", &r);
        assert_eq!(a, ArchiveChunk::make_id(3, "s1", &r));
        assert!(a.starts_with("000003-"));
        assert_eq!(a.len(), 6 + 1 + 12);
        assert_ne!(a, ArchiveChunk::make_id(3, "s2", &r));
        assert!(ArchiveChunk::make_id(9, "s1", &r) < ArchiveChunk::make_id(10, "s1", &r));
    }

    #[test]
    fn test_watermark_advance_accumulates_across_sessions() {
        let chunk = ArchiveChunk {
            id: "000000-x".into(),
            thread_id: "t".into(),
            session_id: "s2".into(),
            summary: String::new(),
            messages: Vec::new(),
            token_count: 500,
            message_count: 3,
            range: range("a", "c", 0, 2),
            created_at: Utc::now(),
        };
        let old = ArchiveWatermark {
            thread_id: "t".into(),
            session_id: "s1".into(),
            last_archived_message_index: 40,
            last_archived_message_id: "z".into(),
            archived_tokens: 1000,
            chunk_count: 2,
            last_archived_at: Utc::now(),
        };
        let next = ArchiveWatermark::advance(Some(&old), &chunk);
        assert_eq!(next.session_id, "s2");
        assert_eq!(next.last_archived_message_index, 2);
        assert_eq!(next.next_index(), 3);
        assert_eq!(next.archived_tokens, 1500);
        assert_eq!(next.chunk_count, 3);

        let first = ArchiveWatermark::advance(None, &chunk);
        assert_eq!(first.chunk_count, 1);
        assert_eq!(first.archived_tokens, 500);
    }
}
