//! OpenAI-compatible implementation of the AI trait.
//!
//! Talks to any chat-completions endpoint that supports strict
//! `json_schema` response formats. OpenRouter is served by the same client
//! with a different base URL.
//!
//! # Example
//!
//! ```rust,ignore
//! use icf_extraction::ai::OpenAI;
//! use icf_extraction::security::{AICredentials, Provider};
//!
//! let creds = AICredentials::from_env(Provider::OpenAI, "gpt-5.1")?;
//! let ai = OpenAI::new(creds);
//! let engine = ExtractionEngine::new(ai, EngineConfig::default());
//! ```

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::ai::schema::StructuredOutput;
use crate::error::{ExtractionError, Result};
use crate::pipeline::{AISearchResponse, AISynthesisResponse};
use crate::security::{AICredentials, Provider};
use crate::traits::ai::{SearchPrompt, SynthesisPrompt, AI};

/// OpenAI-compatible AI implementation.
#[derive(Clone)]
pub struct OpenAI {
    client: Client,
    credentials: AICredentials,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
}

impl OpenAI {
    pub fn new(credentials: AICredentials) -> Self {
        Self {
            client: Client::new(),
            credentials,
            temperature: None,
            max_tokens: None,
        }
    }

    /// Sampling temperature. Unset by default; reasoning models reject it.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn model(&self) -> &str {
        &self.credentials.model
    }

    pub fn endpoint(&self) -> &str {
        self.credentials.endpoint()
    }

    /// Structured output with JSON schema (`json_schema` response_format).
    ///
    /// Returns the raw message content; callers parse it.
    pub async fn generate_structured(
        &self,
        system: &str,
        user: &str,
        schema_name: &str,
        schema: serde_json::Value,
    ) -> Result<String> {
        let request = StructuredRequest {
            model: self.credentials.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: system.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: user.to_string(),
                },
            ],
            temperature: self.temperature,
            max_completion_tokens: self.max_tokens,
            response_format: ResponseFormat {
                format_type: "json_schema".to_string(),
                json_schema: JsonSchemaFormat {
                    name: schema_name.to_string(),
                    strict: true,
                    schema,
                },
            },
        };

        let mut builder = self
            .client
            .post(format!("{}/chat/completions", self.endpoint()))
            .header(
                "Authorization",
                format!("Bearer {}", self.credentials.api_key.expose()),
            )
            .header("Content-Type", "application/json");

        if self.credentials.provider == Provider::OpenRouter {
            builder = builder.header("X-Title", "icf-extraction");
        }

        let response = builder
            .json(&request)
            .send()
            .await
            .map_err(|e| ExtractionError::AI(e.into()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(ExtractionError::AI(
                format!(
                    "{} structured output error ({}): {}",
                    self.credentials.provider, status, error_text
                )
                .into(),
            ));
        }

        let chat_response: ChatResponse = response
            .json()
            .await
            .map_err(|e| ExtractionError::AI(e.into()))?;

        let message = chat_response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message)
            .ok_or_else(|| ExtractionError::AI("no choices in chat response".into()))?;

        match (message.content, message.refusal) {
            (Some(content), _) if !content.trim().is_empty() => Ok(content),
            (_, Some(refusal)) => Err(ExtractionError::AI(
                format!("model refused: {}", refusal).into(),
            )),
            _ => Err(ExtractionError::AI("empty message content".into())),
        }
    }
}

#[async_trait]
impl AI for OpenAI {
    async fn search(&self, prompt: &SearchPrompt) -> Result<String> {
        debug!(
            section_id = %prompt.section_id,
            iteration = prompt.iteration,
            pages = prompt.pages.len(),
            model = %self.credentials.model,
            "search query"
        );

        self.generate_structured(
            &prompt.system,
            &prompt.user,
            "search_response",
            AISearchResponse::strict_schema(),
        )
        .await
    }

    async fn synthesize(&self, prompt: &SynthesisPrompt) -> Result<String> {
        debug!(
            section_id = %prompt.section_id,
            evidence = prompt.evidence_count,
            model = %self.credentials.model,
            "synthesis query"
        );

        self.generate_structured(
            &prompt.system,
            &prompt.user,
            "synthesis_response",
            AISynthesisResponse::strict_schema(),
        )
        .await
    }
}

// Request/Response types

#[derive(Serialize)]
struct StructuredRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_completion_tokens: Option<u32>,
    response_format: ResponseFormat,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: String,
    json_schema: JsonSchemaFormat,
}

#[derive(Serialize)]
struct JsonSchemaFormat {
    name: String,
    strict: bool,
    schema: serde_json::Value,
}

#[derive(Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    refusal: Option<String>,
}
