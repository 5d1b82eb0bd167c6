//! Process-wide prometheus counters. Recording before `init_metrics` is a no-op.
use lazy_static::lazy_static;
use prometheus::{Encoder, IntCounter, IntCounterVec, Registry, TextEncoder};
use std::sync::OnceLock;
use tracing::warn;

lazy_static! {
    static ref REGISTRY: Registry = Registry::new();
}

static CHUNKS_COMMITTED: OnceLock<IntCounter> = OnceLock::new();
static ARCHIVE_ATTEMPTS: OnceLock<IntCounterVec> = OnceLock::new();
static TOKENS_ARCHIVED: OnceLock<IntCounter> = OnceLock::new();
static SEARCH_REQUESTS: OnceLock<IntCounterVec> = OnceLock::new();
static MEMORY_WRITES: OnceLock<IntCounterVec> = OnceLock::new();

fn register<M>(cell: &OnceLock<M>, metric: prometheus::Result<M>)
where
    M: prometheus::core::Collector + Clone + 'static,
{
    if cell.get().is_some() {
        return;
    }
    match metric {
        Ok(metric) => {
            if cell.set(metric.clone()).is_ok() {
                REGISTRY.register(Box::new(metric)).ok();
            }
        }
        Err(e) => warn!("Failed to create metric: {}", e),
    }
}

pub fn init_metrics() {
    register(
        &CHUNKS_COMMITTED,
        IntCounter::new("archive_chunks_committed_total", "Archive chunks committed"),
    );
    register(
        &ARCHIVE_ATTEMPTS,
        IntCounterVec::new(
            prometheus::opts!("archive_attempts_total", "Archival attempts by outcome"),
            &["outcome"],
        ),
    );
    register(
        &TOKENS_ARCHIVED,
        IntCounter::new("archive_tokens_archived_total", "Estimated tokens moved into chunks"),
    );
    register(
        &SEARCH_REQUESTS,
        IntCounterVec::new(
            prometheus::opts!("search_requests_total", "Search requests by retrieval mode"),
            &["mode"],
        ),
    );
    register(
        &MEMORY_WRITES,
        IntCounterVec::new(
            prometheus::opts!("memory_writes_total", "Persistent memory mutations"),
            &["op"],
        ),
    );
}

pub fn record_chunk_committed(tokens: u64) {
    if let Some(counter) = CHUNKS_COMMITTED.get() {
        counter.inc();
    }
    if let Some(counter) = TOKENS_ARCHIVED.get() {
        counter.inc_by(tokens);
    }
}

pub fn record_archive_attempt(outcome: &str) {
    if let Some(counter) = ARCHIVE_ATTEMPTS.get() {
        counter.with_label_values(&[outcome]).inc();
    }
}

pub fn record_search(mode: &str) {
    if let Some(counter) = SEARCH_REQUESTS.get() {
        counter.with_label_values(&[mode]).inc();
    }
}

pub fn record_memory_write(op: &str) {
    if let Some(counter) = MEMORY_WRITES.get() {
        counter.with_label_values(&[op]).inc();
    }
}

/// Registry contents in the prometheus text exposition format.
pub fn render_metrics() -> anyhow::Result<String> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder
        .encode(&REGISTRY.gather(), &mut buffer)
        .map_err(|e| anyhow::anyhow!("Failed to encode metrics: {}", e))?;
    Ok(String::from_utf8(buffer)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_render_after_init() {
        init_metrics();
        init_metrics();
        record_chunk_committed(1200);
        record_archive_attempt("archived");
        record_search("fulltext");
        record_memory_write("write");

        let text = render_metrics().unwrap();
        assert!(text.contains("archive_chunks_committed_total"));
        assert!(text.contains("archive_attempts_total{outcome=\"archived\"}"));
        assert!(text.contains("search_requests_total{mode=\"fulltext\"}"));
        assert!(text.contains("memory_writes_total{op=\"write\"}"));
    }
}
