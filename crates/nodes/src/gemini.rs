//! Gemini-backed step transform.
//!
//! [`LlmTransform`] is what the binary injects into the engine. It is either
//! a configured [`GeminiTransform`] or the `Disabled` sentinel, which fails
//! every step with a configuration hint instead of calling out.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use crate::prompt::build_prompt;
use crate::{StepTransform, TransformError, TransformOutcome, TransformRequest};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const DEFAULT_MODEL: &str = "gemini-2.5-flash";

/// Connection settings for the Gemini API.
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    /// Upper bound on a single generate call.
    pub timeout: Duration,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(120),
        }
    }
}

/// HTTP client for the `generateContent` endpoint.
#[derive(Debug, Clone)]
pub struct GeminiTransform {
    client: reqwest::Client,
    config: GeminiConfig,
}

impl GeminiTransform {
    pub fn new(config: GeminiConfig) -> Result<Self, TransformError> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.config.base_url.trim_end_matches('/'),
            self.config.model
        )
    }

    /// Send `prompt` to the model and return its trimmed text.
    pub async fn generate(&self, prompt: &str) -> Result<String, TransformError> {
        let body = json!({
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }]
        });

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.config.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransformError::Api { status: status.as_u16(), body });
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| TransformError::Decode(e.to_string()))?;

        let text = parsed.text();
        let text = text.trim();
        if text.is_empty() {
            return Err(TransformError::EmptyResponse);
        }
        Ok(text.to_string())
    }
}

#[async_trait]
impl StepTransform for GeminiTransform {
    async fn transform(&self, request: TransformRequest<'_>) -> TransformOutcome {
        let prompt = build_prompt(&request);
        debug!(step = request.step_name, role = %request.role, "calling Gemini");

        match self.generate(&prompt).await {
            Ok(text) => TransformOutcome::success(text),
            Err(e) => {
                warn!(step = request.step_name, error = %e, "Gemini call failed");
                TransformOutcome::failure(e.to_string())
            }
        }
    }
}

/// The process-wide transform, chosen once from configuration.
#[derive(Debug, Clone)]
pub enum LlmTransform {
    /// No API key configured; every step fails with [`TransformError::NotConfigured`].
    Disabled,
    Gemini(GeminiTransform),
}

impl LlmTransform {
    /// Build the Gemini client, or the disabled sentinel when the key is blank.
    pub fn from_config(config: GeminiConfig) -> Result<Self, TransformError> {
        if config.api_key.trim().is_empty() {
            return Ok(Self::Disabled);
        }
        Ok(Self::Gemini(GeminiTransform::new(config)?))
    }
}

#[async_trait]
impl StepTransform for LlmTransform {
    async fn transform(&self, request: TransformRequest<'_>) -> TransformOutcome {
        match self {
            Self::Disabled => TransformOutcome::failure(TransformError::NotConfigured.to_string()),
            Self::Gemini(gemini) => gemini.transform(request).await,
        }
    }

    fn is_available(&self) -> bool {
        matches!(self, Self::Gemini(_))
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

impl GenerateResponse {
    /// Concatenated text of the first candidate.
    fn text(&self) -> String {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|content| {
                content
                    .parts
                    .iter()
                    .filter_map(|p| p.text.as_deref())
                    .collect::<String>()
            })
            .unwrap_or_default()
    }
}
