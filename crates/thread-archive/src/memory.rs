//! Conversation model shared with the upstream agent runtime.
//!
//! The runtime owns live session state; this crate only reads it through
//! [`SessionSource`] when a thread is shadowed for archival.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Token accounting reported by the model for a single message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    #[serde(default)]
    pub input: u64,
    #[serde(default)]
    pub output: u64,
    #[serde(default)]
    pub reasoning: u64,
}

impl TokenUsage {
    pub fn total(&self) -> u64 {
        self.input
            .saturating_add(self.output)
            .saturating_add(self.reasoning)
    }
}

/// One piece of a message. Tool calls keep their raw JSON payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessagePart {
    Text {
        text: String,
    },
    Reasoning {
        text: String,
    },
    ToolCall {
        tool: String,
        #[serde(default)]
        input: serde_json::Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        output: Option<serde_json::Value>,
    },
    File {
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        mime: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub role: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub parts: Vec<MessagePart>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
}

impl Message {
    pub fn text(id: impl Into<String>, role: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: role.into(),
            created_at: Utc::now(),
            parts: vec![MessagePart::Text { text: text.into() }],
            usage: None,
        }
    }

    pub fn with_usage(mut self, usage: TokenUsage) -> Self {
        self.usage = Some(usage);
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    /// Concatenated plain text of the message (text and reasoning parts only).
    pub fn plain_text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|part| match part {
                MessagePart::Text { text } | MessagePart::Reasoning { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Read access to the upstream runtime's session history.
#[async_trait]
pub trait SessionSource: Send + Sync {
    /// Full ordered history of a session, oldest first.
    async fn get_session_messages(&self, session_id: &str) -> anyhow::Result<Vec<Message>>;
}

/// Session history held in process memory. Used by tests and embedders that
/// push turns directly instead of running an external runtime.
#[derive(Clone, Default)]
pub struct InMemorySessionSource {
    store: Arc<DashMap<String, Vec<Message>>>,
}

impl InMemorySessionSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_message(&self, session_id: &str, message: Message) {
        let mut entry = self.store.entry(session_id.to_string()).or_default();
        entry.push(message);
    }

    pub fn add_messages(&self, session_id: &str, messages: impl IntoIterator<Item = Message>) {
        let mut entry = self.store.entry(session_id.to_string()).or_default();
        entry.extend(messages);
    }

    pub fn message_count(&self, session_id: &str) -> usize {
        self.store.get(session_id).map(|h| h.len()).unwrap_or(0)
    }

    pub fn clear_history(&self, session_id: &str) {
        self.store.remove(session_id);
    }
}

#[async_trait]
impl SessionSource for InMemorySessionSource {
    async fn get_session_messages(&self, session_id: &str) -> anyhow::Result<Vec<Message>> {
        Ok(match self.store.get(session_id) {
            Some(history) => history.clone(),
            None => Vec::new(),
        })
    }
}

/// Session history fetched from the upstream runtime over HTTP
/// (`GET {base}/session/{id}/message`).
pub struct HttpSessionSource {
    base_url: String,
    http_client: reqwest::Client,
}

impl HttpSessionSource {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http_client: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_default(),
        }
    }

    fn messages_url(&self, session_id: &str) -> String {
        format!("{}/session/{}/message", self.base_url, session_id)
    }
}

#[async_trait]
impl SessionSource for HttpSessionSource {
    async fn get_session_messages(&self, session_id: &str) -> anyhow::Result<Vec<Message>> {
        let response = self
            .http_client
            .get(self.messages_url(session_id))
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("Session runtime request failed: {}", e))?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!("Session runtime returned {}: {}", status, body));
        }
        let messages: Vec<Message> = response
            .json()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to parse session messages: {}", e))?;
        debug!("Fetched {} messages for session {}", messages.len(), session_id);
        Ok(messages)
    }
}
