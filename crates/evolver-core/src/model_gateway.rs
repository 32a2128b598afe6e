//! Generative model gateway.
//!
//! One prompt in, plain text out. No retries, streaming or token accounting:
//! a failed call is reported once and the caller decides what it means.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::ModelConfig;
use crate::domain::{EvolverError, Result};

/// Text-completion endpoint.
#[async_trait]
pub trait ModelGateway: Send + Sync {
    /// Send a single prompt and return the generated text (possibly empty).
    async fn complete(&self, prompt: &str) -> Result<String>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: [Content<'a>; 1],
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: [Part<'a>; 1],
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Debug, Default, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: Option<ErrorBody>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

impl GenerateResponse {
    fn first_text(self) -> String {
        self.candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .and_then(|c| c.parts.into_iter().next())
            .and_then(|p| p.text)
            .unwrap_or_default()
    }
}

/// Gemini `generateContent` client.
pub struct GeminiClient {
    config: ModelConfig,
    http_client: reqwest::Client,
}

impl GeminiClient {
    pub fn new(config: ModelConfig) -> Self {
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("evolver/", env!("CARGO_PKG_VERSION")))
            .build()
            .expect("Failed to create HTTP client");

        GeminiClient {
            config,
            http_client,
        }
    }

    pub fn from_env() -> Self {
        Self::new(ModelConfig::from_env())
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.config.api_base.trim_end_matches('/'),
            self.config.model
        )
    }
}

#[async_trait]
impl ModelGateway for GeminiClient {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let key = self
            .config
            .api_key
            .as_deref()
            .ok_or_else(|| EvolverError::model("Gemini API key not configured"))?;

        let body = GenerateRequest {
            contents: [Content {
                parts: [Part { text: prompt }],
            }],
            generation_config: GenerationConfig {
                temperature: self.config.temperature,
                max_output_tokens: self.config.max_output_tokens,
            },
        };

        let response = self
            .http_client
            .post(self.endpoint())
            .query(&[("key", key)])
            .json(&body)
            .send()
            .await
            .map_err(|e| EvolverError::model(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| EvolverError::model(e.to_string()))?;

        if !status.is_success() {
            let message = serde_json::from_str::<ErrorEnvelope>(&text)
                .ok()
                .and_then(|e| e.error)
                .and_then(|e| e.message)
                .unwrap_or_else(|| format!("Gemini API error (HTTP {})", status.as_u16()));
            warn!(status = status.as_u16(), "model call rejected: {message}");
            return Err(EvolverError::model(message));
        }

        let parsed: GenerateResponse = serde_json::from_str(&text)
            .map_err(|e| EvolverError::model(format!("malformed response: {e}")))?;
        let generated = parsed.first_text();
        debug!(chars = generated.len(), "model call completed");
        Ok(generated)
    }
}
