//! services/api/src/adapters/extraction_llm.rs
//!
//! This module contains the adapter for the transcript-extraction LLM.
//! It implements the `LanguageModelService` port from the `core` crate.

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::chat::{
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs, ResponseFormat,
    },
    Client,
};
use async_trait::async_trait;
use transcript_insights_core::ports::{LanguageModelService, PortError, PortResult};

/// Low temperature keeps the extraction close to the transcript.
const EXTRACTION_TEMPERATURE: f32 = 0.2;

//=========================================================================================
// Error Mapping
//=========================================================================================

/// Sorts OpenAI failures into retryable and permanent ones.
pub fn map_openai_error(e: OpenAIError) -> PortError {
    match &e {
        OpenAIError::Reqwest(_) => PortError::Unavailable(e.to_string()),
        OpenAIError::ApiError(api) => {
            let code = api.code.as_deref().unwrap_or_default();
            let kind = api.r#type.as_deref().unwrap_or_default();
            if code == "invalid_api_key" {
                PortError::Unauthorized
            } else if code == "rate_limit_exceeded"
                || kind == "server_error"
                || kind == "requests"
                || kind == "tokens"
            {
                PortError::Unavailable(e.to_string())
            } else {
                PortError::Unexpected(e.to_string())
            }
        }
        _ => PortError::Unexpected(e.to_string()),
    }
}

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `LanguageModelService` using an OpenAI chat model
/// in JSON-object response mode.
#[derive(Clone)]
pub struct OpenAiExtractionAdapter {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiExtractionAdapter {
    /// Creates a new `OpenAiExtractionAdapter`.
    pub fn new(client: Client<OpenAIConfig>, model: String) -> Self {
        Self { client, model }
    }
}

//=========================================================================================
// `LanguageModelService` Trait Implementation
//=========================================================================================

#[async_trait]
impl LanguageModelService for OpenAiExtractionAdapter {
    async fn complete(&self, system_prompt: &str, user_input: &str) -> PortResult<String> {
        let messages = vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(system_prompt)
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?
                .into(),
            ChatCompletionRequestUserMessageArgs::default()
                .content(user_input)
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?
                .into(),
        ];

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .temperature(EXTRACTION_TEMPERATURE)
            .response_format(ResponseFormat::JsonObject)
            .n(1)
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(map_openai_error)?;

        // The first choice carries the JSON text; the validator handles the rest.
        match response.choices.into_iter().next() {
            Some(choice) => choice.message.content.ok_or_else(|| {
                PortError::Unexpected(
                    "Extraction LLM response contained no text content.".to_string(),
                )
            }),
            None => Err(PortError::Unexpected(
                "Extraction LLM returned no choices in its response.".to_string(),
            )),
        }
    }
}
