//! Chunk summary rows and their full-text index
use crate::memory_db::schema::*;
use crate::memory_db::DbHandle;
use rusqlite::{params, OptionalExtension, Row};
use std::sync::Arc;
use tracing::debug;

const SUMMARY_COLUMNS: &str = "s.id, s.thread_id, s.session_id, s.summary, s.token_count, s.message_count,
     s.first_message_id, s.last_message_id, s.created_at, s.time_start, s.time_end";

pub struct SummaryStore {
    db: Arc<DbHandle>,
}

impl SummaryStore {
    pub(crate) fn new(db: Arc<DbHandle>) -> Self {
        Self { db }
    }

    /// Insert a summary row. Returns `false` when a row with the same id or
    /// the same (thread, first message, last message) range already exists;
    /// the existing row is left untouched.
    pub fn insert(&self, entry: &SummaryEntry) -> anyhow::Result<bool> {
        let conn = self.db.conn()?;
        let inserted = conn.execute(
            "INSERT INTO summaries
             (id, thread_id, session_id, summary, token_count, message_count,
              first_message_id, last_message_id, created_at, time_start, time_end)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
             ON CONFLICT DO NOTHING",
            params![
                &entry.id,
                &entry.thread_id,
                &entry.session_id,
                &entry.summary,
                i64::try_from(entry.token_count).unwrap_or(i64::MAX),
                entry.message_count as i64,
                &entry.first_message_id,
                &entry.last_message_id,
                format_timestamp(&entry.created_at),
                format_timestamp(&entry.time_start),
                format_timestamp(&entry.time_end),
            ],
        )?;
        debug!("Summary {} for thread {} inserted={}", entry.id, entry.thread_id, inserted > 0);
        Ok(inserted > 0)
    }

    pub fn get(&self, id: &str) -> anyhow::Result<Option<SummaryEntry>> {
        let conn = self.db.conn()?;
        let sql = format!("SELECT {} FROM summaries s WHERE s.id = ?1", SUMMARY_COLUMNS);
        let row = conn
            .query_row(&sql, [id], |row| Ok(row_to_summary(row)))
            .optional()?;
        row.transpose()
    }

    /// Row previously committed for exactly this message range of this
    /// session, if any. Message ids restart with each session.
    pub fn find_by_range(
        &self,
        thread_id: &str,
        session_id: &str,
        first_message_id: &str,
        last_message_id: &str,
    ) -> anyhow::Result<Option<SummaryEntry>> {
        let conn = self.db.conn()?;
        let sql = format!(
            "SELECT {} FROM summaries s
             WHERE s.thread_id = ?1 AND s.session_id = ?2
               AND s.first_message_id = ?3 AND s.last_message_id = ?4",
            SUMMARY_COLUMNS
        );
        let row = conn
            .query_row(
                &sql,
                params![thread_id, session_id, first_message_id, last_message_id],
                |row| Ok(row_to_summary(row)),
            )
            .optional()?;
        row.transpose()
    }

    pub fn list_thread(&self, thread_id: &str) -> anyhow::Result<Vec<SummaryEntry>> {
        let conn = self.db.conn()?;
        let sql = format!(
            "SELECT {} FROM summaries s WHERE s.thread_id = ?1 ORDER BY s.time_start, s.id",
            SUMMARY_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query([thread_id])?;
        let mut entries = Vec::new();
        while let Some(row) = rows.next()? {
            entries.push(row_to_summary(row)?);
        }
        Ok(entries)
    }

    /// Full-text candidates in BM25 order (best first). `match_expr` must be a
    /// valid FTS5 expression.
    pub fn search_fts(
        &self,
        match_expr: &str,
        thread_id: Option<&str>,
        limit: usize,
    ) -> anyhow::Result<Vec<SummaryEntry>> {
        let conn = self.db.conn()?;
        let sql = format!(
            "SELECT {} FROM summaries_fts f
             JOIN summaries s ON s.rowid = f.rowid
             WHERE summaries_fts MATCH ?1 AND (?2 IS NULL OR s.thread_id = ?2)
             ORDER BY bm25(summaries_fts), s.id
             LIMIT ?3",
            SUMMARY_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query(params![match_expr, thread_id, limit as i64])?;
        let mut entries = Vec::new();
        while let Some(row) = rows.next()? {
            entries.push(row_to_summary(row)?);
        }
        Ok(entries)
    }

    pub fn count(&self) -> anyhow::Result<i64> {
        let conn = self.db.conn()?;
        Ok(conn.query_row("SELECT COUNT(*) FROM summaries", [], |row| row.get(0))?)
    }
}

fn row_to_summary(row: &Row) -> anyhow::Result<SummaryEntry> {
    let token_count: i64 = row.get(4)?;
    let message_count: i64 = row.get(5)?;
    let created_at: String = row.get(8)?;
    let time_start: String = row.get(9)?;
    let time_end: String = row.get(10)?;

    Ok(SummaryEntry {
        id: row.get(0)?,
        thread_id: row.get(1)?,
        session_id: row.get(2)?,
        summary: row.get(3)?,
        token_count: token_count.max(0) as u64,
        message_count: message_count.max(0) as usize,
        first_message_id: row.get(6)?,
        last_message_id: row.get(7)?,
        created_at: parse_timestamp(&created_at)?,
        time_start: parse_timestamp(&time_start)?,
        time_end: parse_timestamp(&time_end)?,
    })
}
