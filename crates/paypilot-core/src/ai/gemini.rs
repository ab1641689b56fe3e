use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::error::{AssistantError, Result};
use crate::request::{Content, GenerateRequest};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// A text-producing model. `Ok(None)` means the model answered with nothing.
#[async_trait]
pub trait GenerativeModel: Send + Sync {
    async fn generate(&self, model: &str, request: &GenerateRequest) -> Result<Option<String>>;
}

#[derive(Deserialize)]
struct GeminiCandidate {
    content: Option<Content>,
}

#[derive(Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

impl GeminiResponse {
    /// Text parts of the first candidate, concatenated.
    fn text(&self) -> Option<String> {
        let content = self.candidates.first()?.content.as_ref()?;
        let text: String = content
            .parts
            .iter()
            .filter_map(|p| p.text.as_deref())
            .collect();
        if text.trim().is_empty() {
            None
        } else {
            Some(text)
        }
    }
}

#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl GeminiClient {
    pub fn new(api_key: &str) -> Self {
        Self::with_base_url(api_key, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(api_key: &str, base_url: &str) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn list_models() -> Vec<String> {
        vec![
            "gemini-2.5-flash".to_string(),
            "gemini-2.5-pro".to_string(),
            "gemini-2.0-flash".to_string(),
        ]
    }
}

#[async_trait]
impl GenerativeModel for GeminiClient {
    async fn generate(&self, model: &str, request: &GenerateRequest) -> Result<Option<String>> {
        let url = format!("{}/v1beta/models/{}:generateContent", self.base_url, model);

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            log::error!("Gemini API error {}: {}", status, text);
            return Err(classify_status(status.as_u16()));
        }

        let gemini_response: GeminiResponse = response
            .json()
            .await
            .map_err(|e| AssistantError::MalformedResponse(e.to_string()))?;
        Ok(gemini_response.text())
    }
}

/// A rejected API key is a configuration problem, not an expired session.
fn classify_status(status: u16) -> AssistantError {
    match status {
        401 | 403 => AssistantError::Config(format!("API key rejected (status {status})")),
        code => AssistantError::BackendUnavailable { status: code },
    }
}
