//! Inference service client.
//!
//! The pipeline only needs "submit prompt text, receive response text", so the
//! seam is the small [`InferenceClient`] trait. [`OllamaClient`] implements it
//! against the Ollama `/api/generate` endpoint with streaming disabled.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use brain_shared::{BrainError, InferenceFailure, OllamaConfig, Result};

/// User-Agent string for inference requests.
const USER_AGENT: &str = concat!("brain/", env!("CARGO_PKG_VERSION"));

/// How much of an error body to keep in messages.
const ERROR_BODY_PREVIEW: usize = 200;

/// Submit a prompt, receive the model's text.
#[async_trait]
pub trait InferenceClient: Send + Sync {
    /// Model identifier used for requests.
    fn model(&self) -> &str;

    /// Run one completion. Never retries.
    async fn complete(&self, prompt: &str) -> Result<String>;
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

// ---------------------------------------------------------------------------
// OllamaClient
// ---------------------------------------------------------------------------

/// HTTP client for an Ollama-compatible inference service.
pub struct OllamaClient {
    client: Client,
    generate_url: String,
    model: String,
}

impl OllamaClient {
    /// Build a client from the `[ollama]` config section.
    pub fn new(config: &OllamaConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| BrainError::config(format!("failed to build HTTP client: {e}")))?;

        let generate_url = format!("{}/api/generate", config.endpoint.trim_end_matches('/'));

        Ok(Self {
            client,
            generate_url,
            model: config.model.clone(),
        })
    }
}

#[async_trait]
impl InferenceClient for OllamaClient {
    fn model(&self) -> &str {
        &self.model
    }

    #[instrument(skip_all, fields(model = %self.model, prompt_chars = prompt.len()))]
    async fn complete(&self, prompt: &str) -> Result<String> {
        let request = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
        };

        let response = self
            .client
            .post(&self.generate_url)
            .json(&request)
            .send()
            .await
            .map_err(|e| transport_error(&self.generate_url, &e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let preview: String = body.chars().take(ERROR_BODY_PREVIEW).collect();
            return Err(BrainError::inference(
                InferenceFailure::Status,
                format!("{}: HTTP {status}: {preview}", self.generate_url),
            ));
        }

        let body = response
            .text()
            .await
            .map_err(|e| transport_error(&self.generate_url, &e))?;

        let parsed: GenerateResponse = serde_json::from_str(&body).map_err(|e| {
            BrainError::inference(
                InferenceFailure::Unparseable,
                format!("{}: invalid response body: {e}", self.generate_url),
            )
        })?;

        debug!(response_chars = parsed.response.len(), "inference complete");
        Ok(parsed.response)
    }
}

/// Classify a reqwest failure as a timeout or an unreachable service.
fn transport_error(url: &str, e: &reqwest::Error) -> BrainError {
    let failure = if e.is_timeout() {
        InferenceFailure::Timeout
    } else {
        InferenceFailure::Unreachable
    };
    BrainError::inference(failure, format!("{url}: {e}"))
}
