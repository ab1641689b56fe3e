use async_trait::async_trait;
use reqwest::Client;
use tokio_util::sync::CancellationToken;

use crate::backend::{run_cancellable, IntentBackend, RetryPolicy};
use crate::error::{AssistantError, Result};
use crate::intent::{parse_reply, StructuredIntent};
use crate::locale::{FixedReply, Language};
use crate::request::{InboundMessage, IntentRequest};

/// Client for the hosted intent function.
#[derive(Clone)]
pub struct FunctionClient {
    client: Client,
    url: String,
    access_token: Option<String>,
    language: Language,
    retry: RetryPolicy,
}

impl FunctionClient {
    pub fn new(url: &str, access_token: Option<String>, language: Language) -> Self {
        Self {
            client: Client::new(),
            url: url.to_string(),
            access_token: access_token.filter(|t| !t.trim().is_empty()),
            language,
            retry: RetryPolicy::none(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    async fn call(&self, body: &IntentRequest) -> Result<String> {
        let mut request = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .json(body);

        match &self.access_token {
            Some(token) => request = request.bearer_auth(token),
            None => log::warn!("no access token; calling intent function unauthenticated"),
        }

        let response = request.send().await?;
        let status = response.status().as_u16();
        if let Some(err) = classify_status(status) {
            let text = response.text().await.unwrap_or_default();
            log::error!("intent function error {}: {}", status, text);
            return Err(err);
        }

        Ok(response.text().await?)
    }
}

#[async_trait]
impl IntentBackend for FunctionClient {
    async fn resolve(&self, message: &InboundMessage, cancel: &CancellationToken) -> Result<StructuredIntent> {
        let body = IntentRequest::from_message(message)?;

        let outcome = run_cancellable(cancel, self.retry.run(|| self.call(&body))).await;
        match outcome {
            Ok(text) if text.trim().is_empty() => Ok(StructuredIntent::fixed(FixedReply::NoResponse, self.language)),
            Ok(text) => Ok(parse_reply(&text)),
            Err(AssistantError::Cancelled) => Err(AssistantError::Cancelled),
            Err(e) => Ok(intent_for_failure(&e, self.language)),
        }
    }
}

/// `None` for success, otherwise the error a status stands for.
pub fn classify_status(status: u16) -> Option<AssistantError> {
    match status {
        200..=299 => None,
        401 => Some(AssistantError::AuthExpired),
        code => Some(AssistantError::BackendUnavailable { status: code }),
    }
}

/// The fixed reply shown in place of a failed call.
pub fn intent_for_failure(err: &AssistantError, language: Language) -> StructuredIntent {
    let reply = match err {
        AssistantError::AuthExpired => FixedReply::SessionExpired,
        AssistantError::Network(_) => FixedReply::ConnectionError,
        _ => FixedReply::ServiceUnavailable,
    };
    StructuredIntent::fixed(reply, language)
}
