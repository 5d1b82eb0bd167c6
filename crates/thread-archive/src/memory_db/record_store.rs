//! Persistent memory rows and their full-text index
use crate::memory_db::schema::*;
use crate::memory_db::DbHandle;
use rusqlite::{params, OptionalExtension, Row};
use std::sync::Arc;
use tracing::debug;

const MEMORY_COLUMNS: &str =
    "m.id, m.memory_type, m.content, m.tags, m.thread_id, m.created_at, m.updated_at";

pub struct RecordStore {
    db: Arc<DbHandle>,
}

impl RecordStore {
    pub(crate) fn new(db: Arc<DbHandle>) -> Self {
        Self { db }
    }

    pub fn insert(&self, memory: &PersistentMemory) -> anyhow::Result<()> {
        let conn = self.db.conn()?;
        conn.execute(
            "INSERT INTO memories (id, memory_type, content, tags, thread_id, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                &memory.id,
                memory.memory_type.as_str(),
                &memory.content,
                serde_json::to_string(&memory.tags)?,
                &memory.thread_id,
                format_timestamp(&memory.created_at),
                format_timestamp(&memory.updated_at),
            ],
        )?;
        debug!("Stored {} memory {}", memory.memory_type, memory.id);
        Ok(())
    }

    /// Overwrite content, type and tags of an existing memory. Returns `false`
    /// if no memory has this id.
    pub fn update(&self, memory: &PersistentMemory) -> anyhow::Result<bool> {
        let conn = self.db.conn()?;
        let updated = conn.execute(
            "UPDATE memories SET memory_type = ?2, content = ?3, tags = ?4, updated_at = ?5
             WHERE id = ?1",
            params![
                &memory.id,
                memory.memory_type.as_str(),
                &memory.content,
                serde_json::to_string(&memory.tags)?,
                format_timestamp(&memory.updated_at),
            ],
        )?;
        Ok(updated > 0)
    }

    /// Removes the row; its FTS entry and vector row go with it.
    pub fn delete(&self, id: &str) -> anyhow::Result<bool> {
        let conn = self.db.conn()?;
        let deleted = conn.execute("DELETE FROM memories WHERE id = ?1", [id])?;
        Ok(deleted > 0)
    }

    pub fn get(&self, id: &str) -> anyhow::Result<Option<PersistentMemory>> {
        let conn = self.db.conn()?;
        let sql = format!("SELECT {} FROM memories m WHERE m.id = ?1", MEMORY_COLUMNS);
        let row = conn
            .query_row(&sql, [id], |row| Ok(row_to_memory(row)))
            .optional()?;
        row.transpose()
    }

    /// Memories matching the filter, oldest first. A thread filter selects
    /// only memories scoped to that thread.
    pub fn list(&self, filter: &MemoryFilter) -> anyhow::Result<Vec<PersistentMemory>> {
        let conn = self.db.conn()?;
        let sql = format!(
            "SELECT {} FROM memories m
             WHERE (?1 IS NULL OR m.memory_type = ?1) AND (?2 IS NULL OR m.thread_id = ?2)
             ORDER BY m.created_at, m.id
             LIMIT ?3",
            MEMORY_COLUMNS
        );
        let limit = filter.limit.map(|l| l as i64).unwrap_or(-1);
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query(params![
            filter.memory_type.map(|t| t.as_str()),
            &filter.thread_id,
            limit,
        ])?;
        let mut memories = Vec::new();
        while let Some(row) = rows.next()? {
            memories.push(row_to_memory(row)?);
        }
        Ok(memories)
    }

    /// Full-text candidates over content and tags in BM25 order.
    pub fn search_fts(
        &self,
        match_expr: &str,
        thread_id: Option<&str>,
        limit: usize,
    ) -> anyhow::Result<Vec<PersistentMemory>> {
        let conn = self.db.conn()?;
        let sql = format!(
            "SELECT {} FROM memories_fts f
             JOIN memories m ON m.rowid = f.rowid
             WHERE memories_fts MATCH ?1 AND (?2 IS NULL OR m.thread_id = ?2)
             ORDER BY bm25(memories_fts), m.id
             LIMIT ?3",
            MEMORY_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query(params![match_expr, thread_id, limit as i64])?;
        let mut memories = Vec::new();
        while let Some(row) = rows.next()? {
            memories.push(row_to_memory(row)?);
        }
        Ok(memories)
    }

    pub fn count(&self) -> anyhow::Result<i64> {
        let conn = self.db.conn()?;
        Ok(conn.query_row("SELECT COUNT(*) FROM memories", [], |row| row.get(0))?)
    }
}

fn row_to_memory(row: &Row) -> anyhow::Result<PersistentMemory> {
    let memory_type: String = row.get(1)?;
    let tags_json: String = row.get(3)?;
    let tags: Vec<String> = serde_json::from_str(&tags_json)
        .map_err(|e| anyhow::anyhow!("Failed to parse memory tags: {}", e))?;
    let created_at: String = row.get(5)?;
    let updated_at: String = row.get(6)?;

    Ok(PersistentMemory {
        id: row.get(0)?,
        memory_type: memory_type.parse()?,
        content: row.get(2)?,
        tags,
        thread_id: row.get(4)?,
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
    })
}
