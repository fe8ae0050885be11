//! services/api/src/adapters/embeddings.rs
//!
//! This module contains the adapter for the OpenAI embeddings endpoint.
//! It implements the `EmbeddingService` port from the `core` crate.

use async_openai::{config::OpenAIConfig, types::embeddings::CreateEmbeddingRequestArgs, Client};
use async_trait::async_trait;
use transcript_insights_core::ports::{EmbeddingService, PortError, PortResult};

use super::extraction_llm::map_openai_error;

/// An adapter that implements `EmbeddingService` using an OpenAI embedding model.
#[derive(Clone)]
pub struct OpenAiEmbeddingAdapter {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiEmbeddingAdapter {
    pub fn new(client: Client<OpenAIConfig>, model: String) -> Self {
        Self { client, model }
    }
}

#[async_trait]
impl EmbeddingService for OpenAiEmbeddingAdapter {
    async fn embed(&self, text: &str) -> PortResult<Vec<f32>> {
        let request = CreateEmbeddingRequestArgs::default()
            .model(&self.model)
            .input(text)
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        let response = self
            .client
            .embeddings()
            .create(request)
            .await
            .map_err(map_openai_error)?;

        response
            .data
            .into_iter()
            .next()
            .map(|e| e.embedding)
            .ok_or_else(|| {
                PortError::Unexpected("Embedding response contained no vectors.".to_string())
            })
    }
}
