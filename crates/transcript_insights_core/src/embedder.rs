//! crates/transcript_insights_core/src/embedder.rs
//!
//! Embeds pain-point descriptions. Each text is embedded independently and
//! concurrently; a failure only costs that one text its vector.

use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, warn};

use crate::domain::is_placeholder;
use crate::ports::EmbeddingService;
use crate::retry::RetryPolicy;

#[derive(Clone)]
pub struct Embedder {
    service: Arc<dyn EmbeddingService>,
    retry: RetryPolicy,
}

impl Embedder {
    pub fn new(service: Arc<dyn EmbeddingService>, retry: RetryPolicy) -> Self {
        Self { service, retry }
    }

    /// One output per input, in input order. Blank or placeholder texts and
    /// texts whose embedding failed after retries map to `None`.
    pub async fn embed(&self, texts: &[String]) -> Vec<Option<Vec<f32>>> {
        let embedded = join_all(
            texts
                .iter()
                .enumerate()
                .map(|(i, text)| self.embed_one(i, text)),
        )
        .await;
        debug!(
            requested = texts.len(),
            embedded = embedded.iter().filter(|e| e.is_some()).count(),
            "Embedding fan-out finished"
        );
        embedded
    }

    async fn embed_one(&self, index: usize, text: &str) -> Option<Vec<f32>> {
        if is_placeholder(text) {
            return None;
        }
        match self.retry.run("embedding", || self.service.embed(text)).await {
            Ok(vector) if !vector.is_empty() => Some(vector),
            Ok(_) => {
                warn!(index, "Embedding service returned an empty vector");
                None
            }
            Err(e) => {
                warn!(index, "Embedding failed, continuing without it: {}", e);
                None
            }
        }
    }
}
