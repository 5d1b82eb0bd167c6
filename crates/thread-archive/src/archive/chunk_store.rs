//! File-backed chunk transcripts and watermarks.
//!
//! Layout under the chunks root:
//!
//! ```text
//! <encoded thread id>/watermark.json
//! <encoded thread id>/chunks/<chunk id>.json
//! ```
//!
//! Every write goes to a temp file in the target directory and is renamed
//! into place, so readers see either the previous or the new complete file.
//! Reads never fail: a missing or unreadable file is reported as absent.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::{debug, warn};
use uuid::Uuid;

use super::types::{ArchiveChunk, ArchiveWatermark};
use crate::error::validate_identifier;

const WATERMARK_FILE: &str = "watermark.json";
const CHUNKS_DIR: &str = "chunks";

pub struct ChunkStore {
    root: PathBuf,
}

impl ChunkStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Callers validate `thread_id` first, so "." and ".." never get here.
    fn thread_dir(&self, thread_id: &str) -> PathBuf {
        self.root.join(urlencoding::encode(thread_id).as_ref())
    }

    fn chunk_path(&self, thread_id: &str, chunk_id: &str) -> PathBuf {
        self.thread_dir(thread_id)
            .join(CHUNKS_DIR)
            .join(format!("{}.json", chunk_id))
    }

    fn watermark_path(&self, thread_id: &str) -> PathBuf {
        self.thread_dir(thread_id).join(WATERMARK_FILE)
    }

    /// Persist a chunk, atomically replacing any file with the same id.
    pub fn write_chunk(&self, chunk: &ArchiveChunk) -> anyhow::Result<PathBuf> {
        validate_identifier("thread id", &chunk.thread_id)?;
        validate_identifier("chunk id", &chunk.id)?;
        let path = self.chunk_path(&chunk.thread_id, &chunk.id);
        write_json_atomic(&path, chunk)
            .with_context(|| format!("Failed to write chunk {}", path.display()))?;
        debug!("Wrote chunk {} ({} messages)", path.display(), chunk.message_count);
        Ok(path)
    }

    pub fn read_chunk(&self, thread_id: &str, chunk_id: &str) -> Option<ArchiveChunk> {
        if validate_identifier("thread id", thread_id).is_err()
            || validate_identifier("chunk id", chunk_id).is_err()
        {
            return None;
        }
        let path = self.chunk_path(thread_id, chunk_id);
        let chunk: ArchiveChunk = read_json(&path)?;
        if chunk.thread_id != thread_id || chunk.id != chunk_id {
            warn!(
                "Chunk file {} belongs to {}/{}, ignoring",
                path.display(),
                chunk.thread_id,
                chunk.id
            );
            return None;
        }
        Some(chunk)
    }

    /// Chunk ids of a thread in creation order (ids are sequence-prefixed).
    pub fn list_chunk_ids(&self, thread_id: &str) -> anyhow::Result<Vec<String>> {
        validate_identifier("thread id", thread_id)?;
        let dir = self.thread_dir(thread_id).join(CHUNKS_DIR);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e).with_context(|| format!("Failed to list {}", dir.display())),
        };

        let mut ids = Vec::new();
        for entry in entries {
            let name = entry?.file_name();
            let name = name.to_string_lossy();
            if name.starts_with('.') {
                continue;
            }
            if let Some(id) = name.strip_suffix(".json") {
                ids.push(id.to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }

    pub fn write_watermark(&self, watermark: &ArchiveWatermark) -> anyhow::Result<()> {
        validate_identifier("thread id", &watermark.thread_id)?;
        let path = self.watermark_path(&watermark.thread_id);
        write_json_atomic(&path, watermark)
            .with_context(|| format!("Failed to write watermark {}", path.display()))
    }

    pub fn read_watermark(&self, thread_id: &str) -> Option<ArchiveWatermark> {
        if validate_identifier("thread id", thread_id).is_err() {
            return None;
        }
        let watermark: ArchiveWatermark = read_json(&self.watermark_path(thread_id))?;
        if watermark.thread_id != thread_id {
            warn!("Watermark for {} names thread {}, ignoring", thread_id, watermark.thread_id);
            return None;
        }
        Some(watermark)
    }
}

fn write_json_atomic<T: serde::Serialize>(path: &Path, value: &T) -> anyhow::Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| anyhow::anyhow!("Path {} has no parent", path.display()))?;
    fs::create_dir_all(dir)?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp_path = dir.join(format!(".{}.{}.tmp", file_name, Uuid::new_v4().simple()));

    let written = (|| -> anyhow::Result<()> {
        let file = File::create(&temp_path)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, value)?;
        writer.flush()?;
        writer
            .into_inner()
            .map_err(|e| anyhow::anyhow!("Failed to flush {}: {}", temp_path.display(), e))?
            .sync_all()?;
        fs::rename(&temp_path, path)?;
        Ok(())
    })();

    if written.is_err() {
        let _ = fs::remove_file(&temp_path);
    }
    written
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Option<T> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
        Err(e) => {
            warn!("Failed to read {}: {}", path.display(), e);
            return None;
        }
    };
    match serde_json::from_slice(&bytes) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("Corrupt archive file {}: {}", path.display(), e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::types::MessageRange;
    use crate::memory::Message;
    use chrono::Utc;
    use proptest::prelude::*;
    use tempfile::TempDir;

    fn chunk(thread: &str, id: &str, text: &str) -> ArchiveChunk {
        let messages = vec![
            Message::text("m1", "user", text),
            Message::text("m2", "assistant", "ack"),
        ];
        ArchiveChunk {
            id: id.into(),
            thread_id: thread.into(),
            session_id: "s1".into(),
            summary: format!("summary of {}", text),
            token_count: 42,
            message_count: messages.len(),
            range: MessageRange {
                first_message_id: "m1".into(),
                last_message_id: "m2".into(),
                first_index: 0,
                last_index: 1,
                start: messages[0].created_at,
                end: messages[1].created_at,
            },
            messages,
            created_at: Utc::now(),
        }
    }

    fn watermark(thread: &str, index: usize) -> ArchiveWatermark {
        ArchiveWatermark {
            thread_id: thread.into(),
            session_id: "s1".into(),
            last_archived_message_index: index,
            last_archived_message_id: format!("m{}", index),
            archived_tokens: 100,
            chunk_count: 1,
            last_archived_at: Utc::now(),
        }
    }

    #[test]
    fn test_chunk_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = ChunkStore::new(dir.path());
        let c = chunk("thread-1", "000000-abc", "hello");
        store.write_chunk(&c).unwrap();
        assert_eq!(store.read_chunk("thread-1", "000000-abc"), Some(c));
    }

    #[test]
    fn test_missing_and_corrupt_reads_are_absent() {
        let dir = TempDir::new().unwrap();
        let store = ChunkStore::new(dir.path());
        assert!(store.read_chunk("t", "nope").is_none());
        assert!(store.read_watermark("t").is_none());

        let path = store.chunk_path("t", "bad");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, b"{ not json").unwrap();
        assert!(store.read_chunk("t", "bad").is_none());

        fs::write(store.watermark_path("t"), b"").unwrap();
        assert!(store.read_watermark("t").is_none());
    }

    #[test]
    fn test_invalid_identifiers_read_as_absent() {
        let dir = TempDir::new().unwrap();
        let store = ChunkStore::new(dir.path());
        assert!(store.read_chunk("t", "../escape").is_none());
        assert!(store.read_watermark("").is_none());
        assert!(store.write_chunk(&chunk("t", "a/b", "x")).is_err());
    }

    #[test]
    fn test_watermark_overwrites() {
        let dir = TempDir::new().unwrap();
        let store = ChunkStore::new(dir.path());
        store.write_watermark(&watermark("t", 3)).unwrap();
        let second = watermark("t", 9);
        store.write_watermark(&second).unwrap();
        assert_eq!(store.read_watermark("t"), Some(second));

        let files: Vec<_> = fs::read_dir(store.thread_dir("t")).unwrap().collect();
        assert_eq!(files.len(), 1, "no temp files or duplicates left behind");
    }

    #[test]
    fn test_list_chunk_ids_sorted_and_skips_temp_files() {
        let dir = TempDir::new().unwrap();
        let store = ChunkStore::new(dir.path());
        assert!(store.list_chunk_ids("t").unwrap().is_empty());
        store.write_chunk(&chunk("t", "000001-bb", "b")).unwrap();
        store.write_chunk(&chunk("t", "000000-aa", "a")).unwrap();
        fs::write(store.thread_dir("t").join(CHUNKS_DIR).join(".000002.tmp"), b"x").unwrap();
        assert_eq!(store.list_chunk_ids("t").unwrap(), vec!["000000-aa", "000001-bb"]);
    }

    #[test]
    fn test_thread_ids_are_encoded() {
        let dir = TempDir::new().unwrap();
        let store = ChunkStore::new(dir.path());
        let name = |id: &str| store.thread_dir(id).file_name().unwrap().to_string_lossy().into_owned();
        assert_eq!(name("telegram:42"), "telegram%3A42");
        assert_eq!(name("a-b_C9"), "a-b_C9");
        assert_eq!(name("é"), "%C3%A9");
        assert_eq!(name("release v1.2"), "release%20v1.2");
        assert_eq!(store.thread_dir("x:y").parent(), Some(dir.path()));

        let c = chunk("slack:C01/../x", "000000-aa", "enc");
        store.write_chunk(&chunk("slack:C01", "000000-aa", "enc")).unwrap();
        assert!(store.read_chunk("slack:C01", "000000-aa").is_some());
        assert!(store.write_chunk(&c).is_err());
    }

    proptest! {
        #[test]
        fn prop_watermark_roundtrip(index in 0usize..100_000, tokens in 0u64..10_000_000, thread in "[a-z0-9:]{1,20}") {
            let dir = TempDir::new().unwrap();
            let store = ChunkStore::new(dir.path());
            let mut w = watermark(&thread, index);
            w.archived_tokens = tokens;
            store.write_watermark(&w).unwrap();
            prop_assert_eq!(store.read_watermark(&thread), Some(w));
        }
    }
}
