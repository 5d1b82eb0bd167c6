//! External collaborators the engine calls but does not implement.

use async_trait::async_trait;
use std::time::Duration;

use crate::memory::Message;

/// Produces a natural-language summary of a run of messages.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, messages: &[Message], max_tokens: u32) -> anyhow::Result<String>;
}

/// Turns texts into fixed-dimension vectors, one per input, in order.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, texts: Vec<String>) -> anyhow::Result<Vec<Vec<f32>>>;
}

/// Embed a single text with a deadline.
pub async fn embed_one(
    embedder: &dyn Embedder,
    text: &str,
    timeout: Duration,
) -> anyhow::Result<Vec<f32>> {
    let mut vectors = tokio::time::timeout(timeout, embedder.embed(vec![text.to_string()]))
        .await
        .map_err(|_| anyhow::anyhow!("Embedding timed out after {:?}", timeout))??;
    if vectors.len() != 1 {
        return Err(anyhow::anyhow!(
            "Embedder returned {} vectors for 1 input",
            vectors.len()
        ));
    }
    Ok(vectors.remove(0))
}
