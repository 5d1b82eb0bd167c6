// thread-archive/crates/thread-archive/src/config.rs

use anyhow::{Context, Result};
use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, warn};

/// Token thresholds that drive chunk boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkThresholds {
    /// Below this the observer does nothing.
    pub min: u64,
    /// A tail at or above this is archived.
    pub target: u64,
    /// No chunk grows past this (unless a single message is larger).
    pub max: u64,
}

impl Default for ChunkThresholds {
    fn default() -> Self {
        Self {
            min: 8_000,
            target: 25_000,
            max: 40_000,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub archive_enabled: bool,
    pub storage_root: PathBuf,
    pub chunk_tokens: ChunkThresholds,
    pub summary_model: String,
    pub summary_max_tokens: u32,
    pub embedding_model: String,
    pub embedding_dim: usize,
    pub vector_search_enabled: bool,
    pub llm_backend_url: String,
    pub session_runtime_url: String,
    pub collaborator_timeout_seconds: u64,
    pub search_default_limit: usize,
    pub search_candidate_limit: usize,
    pub min_vector_similarity: f32,
    pub api_host: String,
    pub api_port: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            archive_enabled: true,
            storage_root: PathBuf::from("./data/archive"),
            chunk_tokens: ChunkThresholds::default(),
            summary_model: "local-llm".into(),
            summary_max_tokens: 1024,
            embedding_model: "local-embedding".into(),
            embedding_dim: 384,
            vector_search_enabled: true,
            llm_backend_url: "http://127.0.0.1:8081".into(),
            session_runtime_url: "http://127.0.0.1:4096".into(),
            collaborator_timeout_seconds: 120,
            search_default_limit: 5,
            search_candidate_limit: 50,
            min_vector_similarity: 0.3,
            api_host: "127.0.0.1".into(),
            api_port: 8000,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        if let Err(e) = dotenvy::dotenv() {
            warn!("Failed to load .env file: {}. Using system environment variables.", e);
        } else {
            info!("Loaded environment variables from .env file");
        }

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup. Missing keys take their
    /// defaults; present but unparseable keys are errors.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let config = Self {
            archive_enabled: parse_bool(&lookup, "ARCHIVE_ENABLED", defaults.archive_enabled)?,
            storage_root: lookup("ARCHIVE_STORAGE_ROOT")
                .map(PathBuf::from)
                .unwrap_or(defaults.storage_root),
            chunk_tokens: ChunkThresholds {
                min: parse_or(&lookup, "ARCHIVE_CHUNK_TOKENS_MIN", defaults.chunk_tokens.min)?,
                target: parse_or(&lookup, "ARCHIVE_CHUNK_TOKENS_TARGET", defaults.chunk_tokens.target)?,
                max: parse_or(&lookup, "ARCHIVE_CHUNK_TOKENS_MAX", defaults.chunk_tokens.max)?,
            },
            summary_model: lookup("ARCHIVE_SUMMARY_MODEL").unwrap_or(defaults.summary_model),
            summary_max_tokens: parse_or(&lookup, "ARCHIVE_SUMMARY_MAX_TOKENS", defaults.summary_max_tokens)?,
            embedding_model: lookup("ARCHIVE_EMBEDDING_MODEL").unwrap_or(defaults.embedding_model),
            embedding_dim: parse_or(&lookup, "ARCHIVE_EMBEDDING_DIM", defaults.embedding_dim)?,
            vector_search_enabled: parse_bool(&lookup, "ARCHIVE_VECTOR_SEARCH", defaults.vector_search_enabled)?,
            llm_backend_url: lookup("ARCHIVE_LLM_BACKEND_URL").unwrap_or(defaults.llm_backend_url),
            session_runtime_url: lookup("ARCHIVE_SESSION_RUNTIME_URL").unwrap_or(defaults.session_runtime_url),
            collaborator_timeout_seconds: parse_or(
                &lookup,
                "ARCHIVE_COLLABORATOR_TIMEOUT_SECS",
                defaults.collaborator_timeout_seconds,
            )?,
            search_default_limit: parse_or(&lookup, "ARCHIVE_SEARCH_DEFAULT_LIMIT", defaults.search_default_limit)?,
            search_candidate_limit: parse_or(
                &lookup,
                "ARCHIVE_SEARCH_CANDIDATE_LIMIT",
                defaults.search_candidate_limit,
            )?,
            min_vector_similarity: parse_or(
                &lookup,
                "ARCHIVE_MIN_VECTOR_SIMILARITY",
                defaults.min_vector_similarity,
            )?,
            api_host: lookup("API_HOST").unwrap_or(defaults.api_host),
            api_port: parse_or(&lookup, "API_PORT", defaults.api_port)?,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let t = &self.chunk_tokens;
        if t.min == 0 || t.min > t.target || t.target > t.max {
            return Err(anyhow::anyhow!(
                "Chunk thresholds must satisfy 0 < min <= target <= max (got {}/{}/{})",
                t.min,
                t.target,
                t.max
            ));
        }
        if self.summary_max_tokens == 0 {
            return Err(anyhow::anyhow!("ARCHIVE_SUMMARY_MAX_TOKENS must be positive"));
        }
        if self.vector_search_enabled && self.embedding_dim == 0 {
            return Err(anyhow::anyhow!(
                "ARCHIVE_EMBEDDING_DIM must be positive when vector search is enabled"
            ));
        }
        if self.collaborator_timeout_seconds == 0 {
            return Err(anyhow::anyhow!("ARCHIVE_COLLABORATOR_TIMEOUT_SECS must be positive"));
        }
        if self.search_default_limit == 0 || self.search_candidate_limit == 0 {
            return Err(anyhow::anyhow!("Search limits must be positive"));
        }
        if self.search_candidate_limit < self.search_default_limit {
            return Err(anyhow::anyhow!(
                "ARCHIVE_SEARCH_CANDIDATE_LIMIT ({}) must not be below ARCHIVE_SEARCH_DEFAULT_LIMIT ({})",
                self.search_candidate_limit,
                self.search_default_limit
            ));
        }
        if !(0.0..=1.0).contains(&self.min_vector_similarity) {
            return Err(anyhow::anyhow!("ARCHIVE_MIN_VECTOR_SIMILARITY must be within 0.0..=1.0"));
        }
        Ok(())
    }

    pub fn index_db_path(&self) -> PathBuf {
        self.storage_root.join("index.db")
    }

    pub fn chunks_root(&self) -> PathBuf {
        self.storage_root.join("threads")
    }

    pub fn collaborator_timeout(&self) -> Duration {
        Duration::from_secs(self.collaborator_timeout_seconds)
    }

    pub fn print_config(&self) {
        info!("Current Configuration:");
        info!("- Archival Enabled: {}", self.archive_enabled);
        info!("- Storage Root: {}", self.storage_root.display());
        info!(
            "- Chunk Tokens: min {} / target {} / max {}",
            self.chunk_tokens.min, self.chunk_tokens.target, self.chunk_tokens.max
        );
        info!("- Summary Model: {} (max {} tokens)", self.summary_model, self.summary_max_tokens);
        info!("- Embedding Model: {} (dim {})", self.embedding_model, self.embedding_dim);
        info!("- Vector Search: {}", self.vector_search_enabled);
        info!("- LLM Backend: {}", self.llm_backend_url);
        info!("- Session Runtime: {}", self.session_runtime_url);
        info!("- Collaborator Timeout: {}s", self.collaborator_timeout_seconds);
        info!(
            "- Search Limits: default {} / candidates {}",
            self.search_default_limit, self.search_candidate_limit
        );
        info!("- API: {}:{}", self.api_host, self.api_port);
    }

    pub fn api_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.api_host, self.api_port)
            .parse()
            .with_context(|| format!("Invalid API address {}:{}", self.api_host, self.api_port))
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid value for {}: {:?} ({})", key, raw, e)),
        None => Ok(default),
    }
}

fn parse_bool<F>(lookup: &F, key: &str, default: bool) -> Result<bool>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key).map(|v| v.trim().to_lowercase()) {
        None => Ok(default),
        Some(v) => match v.as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(anyhow::anyhow!("Invalid boolean for {}: {:?}", key, v)),
        },
    }
}
