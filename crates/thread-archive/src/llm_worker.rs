//! OpenAI-compatible HTTP client for chunk summaries and embeddings.
//!
//! Talks to a local llama-server style backend:
//! `POST {backend}/v1/chat/completions` and `POST {backend}/v1/embeddings`.
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

use crate::collaborators::{Embedder, Summarizer};
use crate::config::Config;
use crate::memory::{Message, MessagePart};
use crate::utils::TextUtils;

const SUMMARY_SYSTEM_PROMPT: &str = "You archive conversation history. Summarize the transcript \
below so it can be found later by search: name the topics, decisions, facts, open questions and \
any identifiers (files, services, people) that were mentioned. Write plain prose, no preamble.";

/// Tool payloads can be huge; the summarizer only needs their gist.
const TOOL_PAYLOAD_PREVIEW_CHARS: usize = 400;

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
    stream: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: Option<ChatMessage>,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest {
    model: String,
    input: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: Option<usize>,
    embedding: Vec<f32>,
}

pub struct LlmWorker {
    backend_url: String,
    summary_model: String,
    embedding_model: String,
    http_client: reqwest::Client,
}

impl LlmWorker {
    pub fn new(
        backend_url: impl Into<String>,
        summary_model: impl Into<String>,
        embedding_model: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        let backend_url = backend_url.into().trim_end_matches('/').to_string();
        info!("LLM worker initialized with backend: {}", backend_url);
        Self {
            backend_url,
            summary_model: summary_model.into(),
            embedding_model: embedding_model.into(),
            http_client: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_default(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.llm_backend_url.clone(),
            config.summary_model.clone(),
            config.embedding_model.clone(),
            config.collaborator_timeout(),
        )
    }

    fn completions_url(&self) -> String {
        format!("{}/v1/chat/completions", self.backend_url)
    }

    fn embeddings_url(&self) -> String {
        format!("{}/v1/embeddings", self.backend_url)
    }

    /// Flatten messages into a `role: text` transcript for the summary prompt.
    fn render_transcript(messages: &[Message]) -> String {
        let mut out = String::new();
        for message in messages {
            for part in &message.parts {
                let line = match part {
                    MessagePart::Text { text } => text.clone(),
                    MessagePart::Reasoning { text } => format!("(thinking) {}", text),
                    MessagePart::ToolCall { tool, input, output } => {
                        let mut call = format!(
                            "[tool {}] {}",
                            tool,
                            TextUtils::truncate_with_ellipsis(&input.to_string(), TOOL_PAYLOAD_PREVIEW_CHARS)
                        );
                        if let Some(output) = output {
                            call.push_str(" -> ");
                            call.push_str(&TextUtils::truncate_with_ellipsis(
                                &output.to_string(),
                                TOOL_PAYLOAD_PREVIEW_CHARS,
                            ));
                        }
                        call
                    }
                    MessagePart::File { name, .. } => format!("[file {}]", name),
                };
                if line.trim().is_empty() {
                    continue;
                }
                out.push_str(&message.role);
                out.push_str(": ");
                out.push_str(&TextUtils::normalize_whitespace(&line));
                out.push('\n');
            }
        }
        out
    }
}

#[async_trait]
impl Summarizer for LlmWorker {
    async fn summarize(&self, messages: &[Message], max_tokens: u32) -> anyhow::Result<String> {
        debug!("Summarizing {} messages (max {} tokens)", messages.len(), max_tokens);
        let request = ChatCompletionRequest {
            model: self.summary_model.clone(),
            messages: vec![
                ChatMessage { role: "system".to_string(), content: SUMMARY_SYSTEM_PROMPT.to_string() },
                ChatMessage { role: "user".to_string(), content: Self::render_transcript(messages) },
            ],
            max_tokens,
            temperature: 0.2,
            stream: false,
        };
        let response = self
            .http_client
            .post(self.completions_url())
            .json(&request)
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("Summary request failed: {}", e))?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!("LLM backend returned {}: {}", status, body));
        }
        let completion: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to parse summary response: {}", e))?;
        let summary = completion
            .choices
            .first()
            .and_then(|c| c.message.as_ref())
            .map(|m| m.content.trim().to_string())
            .unwrap_or_default();
        if summary.is_empty() {
            return Err(anyhow::anyhow!("LLM backend returned an empty summary"));
        }
        Ok(summary)
    }
}

#[async_trait]
impl Embedder for LlmWorker {
    async fn embed(&self, texts: Vec<String>) -> anyhow::Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let expected = texts.len();
        debug!("Generating embeddings for {} text(s)", expected);
        let request = EmbeddingRequest {
            model: self.embedding_model.clone(),
            input: texts,
        };
        let response = self
            .http_client
            .post(self.embeddings_url())
            .json(&request)
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("Embedding request failed: {}", e))?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!("Embedding endpoint returned {}: {}", status, body));
        }
        let mut embedding_response: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to parse embedding response: {}", e))?;
        if embedding_response.data.len() != expected {
            return Err(anyhow::anyhow!(
                "Embedding endpoint returned {} vectors for {} inputs",
                embedding_response.data.len(),
                expected
            ));
        }
        embedding_response.data.sort_by_key(|d| d.index.unwrap_or(usize::MAX));
        Ok(embedding_response.data.into_iter().map(|d| d.embedding).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn worker(url: String) -> LlmWorker {
        LlmWorker::new(url, "summ", "emb", Duration::from_secs(5))
    }

    #[test]
    fn test_render_transcript_includes_tool_calls() {
        let mut msg = Message::text("m1", "assistant", "running   the\nbuild");
        msg.parts.push(MessagePart::ToolCall {
            tool: "bash".into(),
            input: serde_json::json!({"cmd": "cargo build"}),
            output: Some(serde_json::json!("ok")),
        });
        let transcript = LlmWorker::render_transcript(&[msg]);
        assert!(transcript.contains("assistant: running the build"));
        assert!(transcript.contains("[tool bash]"));
        assert!(transcript.contains("-> \"ok\""));
    }

    #[tokio::test]
    async fn test_summarize_posts_chat_completion() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/chat/completions")
            .match_body(Matcher::PartialJson(serde_json::json!({"model": "summ", "max_tokens": 256})))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"choices":[{"message":{"role":"assistant","content":"  Talked about kafka. "}}]}"#)
            .create_async()
            .await;

        let summary = worker(server.url())
            .summarize(&[Message::text("m1", "user", "kafka?")], 256)
            .await
            .unwrap();
        mock.assert_async().await;
        assert_eq!(summary, "Talked about kafka.");
    }

    #[tokio::test]
    async fn test_summarize_rejects_error_status() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1/chat/completions")
            .with_status(503)
            .with_body("loading model")
            .create_async()
            .await;
        let err = worker(server.url())
            .summarize(&[Message::text("m1", "user", "x")], 64)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("503"));
    }

    #[tokio::test]
    async fn test_embed_orders_by_index_and_checks_count() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1/embeddings")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"data":[{"index":1,"embedding":[0.0,1.0]},{"index":0,"embedding":[1.0,0.0]}]}"#)
            .create_async()
            .await;
        let vectors = worker(server.url())
            .embed(vec!["a".into(), "b".into()])
            .await
            .unwrap();
        assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);

        let err = worker(server.url()).embed(vec!["only".into()]).await.unwrap_err();
        assert!(err.to_string().contains("2 vectors for 1 inputs"));
    }

    #[tokio::test]
    async fn test_embed_empty_input_skips_request() {
        let worker = worker("http://127.0.0.1:9".into());
        assert!(worker.embed(Vec::new()).await.unwrap().is_empty());
    }
}
