//! Index store - SQLite-backed searchable projection of archived chunks and
//! persistent memories, with an optional vector backend.
pub mod schema;
pub mod migration;
pub mod summary_store;
pub mod record_store;
pub mod embedding_store;
pub use schema::*;
pub use migration::MigrationManager;
pub use summary_store::SummaryStore;
pub use record_store::RecordStore;
pub use embedding_store::{cosine_similarity, EmbeddingStore, VectorKind, VectorSettings};
use crate::config::Config;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

pub(crate) type PooledConn = r2d2::PooledConnection<SqliteConnectionManager>;

/// Shared pool plus the closed flag every store checks before touching it.
pub(crate) struct DbHandle {
    pool: Pool<SqliteConnectionManager>,
    closed: AtomicBool,
}

impl DbHandle {
    pub(crate) fn conn(&self) -> anyhow::Result<PooledConn> {
        if self.closed.load(Ordering::Acquire) {
            return Err(anyhow::anyhow!("Index store is closed"));
        }
        self.pool
            .get()
            .map_err(|e| anyhow::anyhow!("Failed to get connection from pool: {}", e))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreState {
    Ready,
    Closed,
}

pub struct IndexStore {
    pub summaries: SummaryStore,
    pub memories: RecordStore,
    pub embeddings: EmbeddingStore,
    db: Arc<DbHandle>,
    path: PathBuf,
}

impl IndexStore {
    /// Open (creating if needed) the index at `db_path`, apply migrations and
    /// resolve the vector backend. Only a failure of the relational/full-text
    /// layer is an error; a vector backend that cannot load is logged and left
    /// disabled.
    pub fn open(db_path: &Path, vectors: &VectorSettings) -> anyhow::Result<Self> {
        info!("Opening index store at: {}", db_path.display());
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let manager = SqliteConnectionManager::file(db_path)
            .with_flags(
                rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                    | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                    | rusqlite::OpenFlags::SQLITE_OPEN_FULL_MUTEX,
            )
            .with_init(|conn| {
                conn.execute_batch(
                    "PRAGMA foreign_keys = ON;
                     PRAGMA journal_mode = WAL;
                     PRAGMA synchronous = NORMAL;
                     PRAGMA busy_timeout = 5000;",
                )
            });
        let pool = Pool::builder()
            .max_size(8)
            .build(manager)
            .map_err(|e| anyhow::anyhow!("Failed to create connection pool: {}", e))?;

        {
            let mut conn = pool.get()?;
            MigrationManager::new(&mut conn).initialize_database()?;
        }

        let db = Arc::new(DbHandle { pool, closed: AtomicBool::new(false) });
        let embeddings = EmbeddingStore::load(Arc::clone(&db), vectors);
        info!("Index store ready");
        Ok(Self {
            summaries: SummaryStore::new(Arc::clone(&db)),
            memories: RecordStore::new(Arc::clone(&db)),
            embeddings,
            db,
            path: db_path.to_path_buf(),
        })
    }

    pub fn open_with_config(config: &Config) -> anyhow::Result<Self> {
        Self::open(&config.index_db_path(), &VectorSettings::from(config))
    }

    pub fn open_without_vectors(db_path: &Path) -> anyhow::Result<Self> {
        Self::open(db_path, &VectorSettings::disabled())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn state(&self) -> StoreState {
        if self.db.closed.load(Ordering::Acquire) {
            StoreState::Closed
        } else {
            StoreState::Ready
        }
    }

    pub fn vector_search_available(&self) -> bool {
        self.embeddings.is_available()
    }

    pub fn stats(&self) -> anyhow::Result<IndexStats> {
        let conn = self.db.conn()?;
        let vectors = self
            .vector_search_available()
            .then(|| (self.embeddings.model(), self.embeddings.dim()));
        Ok(migration::get_index_stats(&conn, vectors)?)
    }

    pub fn maintenance(&self) -> anyhow::Result<()> {
        let conn = self.db.conn()?;
        Ok(migration::run_maintenance(&conn)?)
    }

    /// Checkpoint the WAL and refuse further use. Idempotent.
    pub fn close(&self) -> anyhow::Result<()> {
        if self.db.closed.load(Ordering::Acquire) {
            return Ok(());
        }
        {
            let conn = self.db.conn()?;
            conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
        }
        self.db.closed.store(true, Ordering::Release);
        info!("Index store closed");
        Ok(())
    }
}

impl From<&Config> for VectorSettings {
    fn from(config: &Config) -> Self {
        Self {
            enabled: config.vector_search_enabled,
            model: config.embedding_model.clone(),
            dim: config.embedding_dim,
        }
    }
}

impl Drop for IndexStore {
    fn drop(&mut self) {
        if self.state() == StoreState::Closed {
            return;
        }
        if let Ok(conn) = self.db.conn() {
            if let Err(e) = conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);") {
                warn!("WAL checkpoint on drop failed: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::summary_entry;
    use tempfile::TempDir;

    #[test]
    fn test_open_close_lifecycle() {
        let dir = TempDir::new().unwrap();
        let store = IndexStore::open_without_vectors(&dir.path().join("nested/index.db")).unwrap();
        assert_eq!(store.state(), StoreState::Ready);
        assert!(!store.vector_search_available());

        store.close().unwrap();
        store.close().unwrap();
        assert_eq!(store.state(), StoreState::Closed);
        assert!(store.summaries.count().is_err());
        assert!(store.stats().is_err());
    }

    #[test]
    fn test_data_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("index.db");
        {
            let store = IndexStore::open_without_vectors(&path).unwrap();
            store.summaries.insert(&summary_entry("c1", "t", "a", "b", "kafka lag")).unwrap();
        }
        let store = IndexStore::open_without_vectors(&path).unwrap();
        let stats = store.stats().unwrap();
        assert_eq!(stats.total_summaries, 1);
        assert_eq!(stats.total_memories, 0);
        assert!(stats.database_size_bytes > 0);
        assert_eq!(stats.vector_dim, None);
        assert_eq!(store.summaries.search_fts("\"kafka\"", None, 5).unwrap().len(), 1);
        store.maintenance().unwrap();
    }

    #[test]
    fn test_stats_report_vector_backend() {
        let dir = TempDir::new().unwrap();
        let settings = VectorSettings { enabled: true, model: "test-embed".into(), dim: 3 };
        let store = IndexStore::open(&dir.path().join("index.db"), &settings).unwrap();
        store.summaries.insert(&summary_entry("c1", "t", "a", "b", "kafka lag")).unwrap();
        store.embeddings.store(VectorKind::Summary, "c1", &[1.0, 0.0, 0.0]).unwrap();

        let stats = store.stats().unwrap();
        assert!(stats.vector_search_available);
        assert_eq!(stats.vector_model.as_deref(), Some("test-embed"));
        assert_eq!(stats.vector_dim, Some(3));
        assert_eq!(stats.total_summary_vectors, 1);
        assert_eq!(stats.schema_version, 2);
    }

    #[test]
    fn test_vector_settings_from_config() {
        let config = Config::default();
        let settings = VectorSettings::from(&config);
        assert_eq!(settings.dim, config.embedding_dim);
        assert_eq!(settings.enabled, config.vector_search_enabled);
    }
}
