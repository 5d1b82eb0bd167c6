//! Index database schema migrations

use rusqlite::{Connection, OptionalExtension, Result};
use tracing::{error, info, warn};

use crate::memory_db::schema::IndexStats;

/// Applies pending schema migrations on a single connection.
pub struct MigrationManager<'a> {
    conn: &'a mut Connection,
}

impl<'a> MigrationManager<'a> {
    pub fn new(conn: &'a mut Connection) -> Self {
        Self { conn }
    }

    /// Create the version table if needed and bring the schema up to date.
    pub fn initialize_database(&mut self) -> Result<()> {
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY,
                applied_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
            )",
            [],
        )?;

        info!("Index schema version: {}", self.get_current_version()?);
        self.apply_migrations()
    }

    fn apply_migrations(&mut self) -> Result<()> {
        for (version, migration_sql) in get_migrations() {
            if self.has_migration_applied(version)? {
                continue;
            }
            info!("Applying index migration {}...", version);

            let tx = self.conn.transaction()?;
            if let Err(e) = tx.execute_batch(migration_sql) {
                error!("Failed to apply migration {}: {}", version, e);
                return Err(e);
            }
            tx.execute("INSERT INTO schema_version (version) VALUES (?1)", [version])?;
            tx.commit()?;
        }
        Ok(())
    }

    pub fn get_current_version(&self) -> Result<i32> {
        self.conn.query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_version",
            [],
            |row| row.get(0),
        )
    }

    pub fn has_migration_applied(&self, version: i32) -> Result<bool> {
        self.conn
            .query_row(
                "SELECT 1 FROM schema_version WHERE version = ?1",
                [version],
                |_| Ok(1),
            )
            .optional()
            .map(|row| row.is_some())
    }
}

fn get_migrations() -> Vec<(i32, &'static str)> {
    vec![
        (1, include_str!("migrations/001_summaries.sql")),
        (2, include_str!("migrations/002_memories.sql")),
    ]
}

/// Row counts, schema version and file size. Tables that do not exist (vector
/// tables when the backend never loaded) count as zero. `vectors` names the
/// loaded backend's model and dimension.
pub fn get_index_stats(conn: &Connection, vectors: Option<(&str, usize)>) -> Result<IndexStats> {
    fn table_count(conn: &Connection, table_name: &str) -> i64 {
        conn.query_row(&format!("SELECT COUNT(*) FROM {}", table_name), [], |row| row.get(0))
            .unwrap_or_else(|e| {
                warn!("Failed to count rows in {}: {}", table_name, e);
                0
            })
    }

    fn table_exists(conn: &Connection, table_name: &str) -> bool {
        conn.query_row(
            "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
            [table_name],
            |_| Ok(()),
        )
        .optional()
        .map(|row| row.is_some())
        .unwrap_or(false)
    }

    let vector_count = |table: &str| {
        if table_exists(conn, table) {
            table_count(conn, table)
        } else {
            0
        }
    };

    let database_size_bytes: i64 = conn
        .query_row(
            "SELECT page_count * page_size FROM pragma_page_count(), pragma_page_size()",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    let schema_version: i32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )?;

    Ok(IndexStats {
        schema_version,
        total_summaries: table_count(conn, "summaries"),
        total_memories: table_count(conn, "memories"),
        total_summary_vectors: vector_count("summary_vectors"),
        total_memory_vectors: vector_count("memory_vectors"),
        database_size_bytes,
        vector_search_available: vectors.is_some(),
        vector_model: vectors.map(|(model, _)| model.to_string()),
        vector_dim: vectors.map(|(_, dim)| dim),
    })
}

/// Refresh planner statistics and merge FTS segments.
pub fn run_maintenance(conn: &Connection) -> Result<()> {
    info!("Running index maintenance...");
    conn.execute_batch(
        "ANALYZE;
         INSERT INTO summaries_fts(summaries_fts) VALUES ('optimize');
         INSERT INTO memories_fts(memories_fts) VALUES ('optimize');",
    )?;
    let integrity: String = conn.query_row("PRAGMA quick_check", [], |row| row.get(0))?;
    if integrity != "ok" {
        warn!("Index integrity check reported: {}", integrity);
    }
    Ok(())
}
