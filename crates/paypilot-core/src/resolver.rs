//! In-process intent resolution: the same pipeline the hosted function runs,
//! called directly against the model.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::ai::function::intent_for_failure;
use crate::ai::GenerativeModel;
use crate::backend::{run_cancellable, IntentBackend, RetryPolicy};
use crate::error::{AssistantError, Result};
use crate::intent::{parse_reply, StructuredIntent};
use crate::locale::{FixedReply, Language};
use crate::request::{build_generate_request, InboundMessage, ModelSettings};

pub struct IntentResolver<M> {
    model: Option<M>,
    settings: ModelSettings,
    language: Language,
    retry: RetryPolicy,
}

impl<M: GenerativeModel> IntentResolver<M> {
    pub fn new(model: M, settings: ModelSettings, language: Language) -> Self {
        Self {
            model: Some(model),
            settings,
            language,
            retry: RetryPolicy::none(),
        }
    }

    /// A resolver with no model behind it. Every turn gets the
    /// "not configured" reply.
    pub fn unconfigured(settings: ModelSettings, language: Language) -> Self {
        Self {
            model: None,
            settings,
            language,
            retry: RetryPolicy::none(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn settings(&self) -> &ModelSettings {
        &self.settings
    }

    async fn run(&self, message: &InboundMessage, cancel: &CancellationToken) -> Result<StructuredIntent> {
        let request = build_generate_request(message, &self.settings)?;

        let Some(model) = &self.model else {
            log::error!("no generative model configured");
            return Ok(self.fixed(FixedReply::NotConfigured));
        };

        log::info!(
            "resolving {} turn with {} prior turns",
            if message.is_audio() { "audio" } else { "text" },
            message.history.len()
        );

        let outcome = run_cancellable(
            cancel,
            self.retry.run(|| model.generate(&self.settings.model, &request)),
        )
        .await;

        match outcome {
            Ok(Some(raw)) if !raw.trim().is_empty() => {
                log::debug!("model raw response: {raw}");
                Ok(parse_reply(&raw))
            }
            Ok(_) => Ok(self.fixed(FixedReply::NoResponse)),
            Err(AssistantError::Cancelled) => Err(AssistantError::Cancelled),
            Err(e @ AssistantError::Network(_)) => {
                log::error!("model call failed: {e}");
                Ok(intent_for_failure(&e, self.language))
            }
            Err(AssistantError::Config(reason)) => {
                log::error!("model rejected the request: {reason}");
                Ok(self.fixed(FixedReply::NotConfigured))
            }
            Err(e) => {
                log::error!("model call failed: {e}");
                if message.is_audio() {
                    Ok(self.fixed(FixedReply::AudioFailed))
                } else {
                    Ok(self.fixed(FixedReply::ServiceUnavailable))
                }
            }
        }
    }

    fn fixed(&self, reply: FixedReply) -> StructuredIntent {
        StructuredIntent::fixed(reply, self.language)
    }
}

#[async_trait]
impl<M: GenerativeModel> IntentBackend for IntentResolver<M> {
    async fn resolve(&self, message: &InboundMessage, cancel: &CancellationToken) -> Result<StructuredIntent> {
        self.run(message, cancel).await
    }
}
