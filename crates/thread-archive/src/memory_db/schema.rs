//! Row types for the index database
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Searchable projection of an archived chunk. One per chunk file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryEntry {
    pub id: String,
    pub thread_id: String,
    pub session_id: String,
    pub summary: String,
    pub token_count: u64,
    pub message_count: usize,
    pub first_message_id: String,
    pub last_message_id: String,
    pub created_at: DateTime<Utc>,
    pub time_start: DateTime<Utc>,
    pub time_end: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryType {
    Fact,
    Preference,
    Learning,
}

impl MemoryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryType::Fact => "fact",
            MemoryType::Preference => "preference",
            MemoryType::Learning => "learning",
        }
    }
}

impl fmt::Display for MemoryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MemoryType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "fact" => Ok(MemoryType::Fact),
            "preference" => Ok(MemoryType::Preference),
            "learning" => Ok(MemoryType::Learning),
            other => Err(anyhow::anyhow!("Unknown memory type: {}", other)),
        }
    }
}

/// Agent-authored durable note.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistentMemory {
    pub id: String,
    pub memory_type: MemoryType,
    pub content: String,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Thread scope; `None` for global memories.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryFilter {
    pub memory_type: Option<MemoryType>,
    pub thread_id: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IndexStats {
    pub schema_version: i32,
    pub total_summaries: i64,
    pub total_memories: i64,
    pub total_summary_vectors: i64,
    pub total_memory_vectors: i64,
    pub database_size_bytes: i64,
    pub vector_search_available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vector_model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vector_dim: Option<usize>,
}

/// Timestamps are stored as fixed-width RFC 3339 text so that string order
/// equals time order and round trips are lossless.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

pub fn parse_timestamp(raw: &str) -> anyhow::Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(raw)
        .map_err(|e| anyhow::anyhow!("Failed to parse timestamp {:?}: {}", raw, e))?
        .with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_type_parse_and_display() {
        assert_eq!("Preference".parse::<MemoryType>().unwrap(), MemoryType::Preference);
        assert_eq!(MemoryType::Learning.to_string(), "learning");
        assert!("opinion".parse::<MemoryType>().is_err());
    }

    #[test]
    fn test_timestamp_roundtrip_and_order() {
        let early = Utc::now();
        let late = early + chrono::Duration::nanoseconds(1500);
        assert_eq!(parse_timestamp(&format_timestamp(&early)).unwrap(), early);
        assert!(format_timestamp(&early) < format_timestamp(&late));
    }
}
