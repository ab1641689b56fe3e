//! The seam between a conversation and whatever resolves its turns into
//! intents: either the model called directly or the hosted intent function.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tokio_util::sync::CancellationToken;

use crate::error::{AssistantError, Result};
use crate::intent::StructuredIntent;
use crate::request::InboundMessage;

/// Resolves one user turn into an intent.
///
/// Implementations fold every backend, network and parse failure into a
/// message intent. The only errors that escape are `InvalidInput` (caller
/// bug) and `Cancelled` (the token fired first).
#[async_trait]
pub trait IntentBackend: Send + Sync {
    async fn resolve(&self, message: &InboundMessage, cancel: &CancellationToken) -> Result<StructuredIntent>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Gemini,
    Function,
}

impl Backend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::Gemini => "gemini",
            Backend::Function => "function",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "gemini" => Some(Backend::Gemini),
            "function" | "edge" => Some(Backend::Function),
            _ => None,
        }
    }

    pub fn all() -> Vec<Backend> {
        vec![Backend::Gemini, Backend::Function]
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Backend::Gemini => "Gemini (direct)",
            Backend::Function => "Intent function (hosted)",
        }
    }
}

/// Race `fut` against the token.
pub async fn run_cancellable<T, F>(cancel: &CancellationToken, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        _ = cancel.cancelled() => Err(AssistantError::Cancelled),
        result = fut => result,
    }
}

/// Bounded retry for network-class failures. Zero retries by default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::none()
    }
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::from_millis(400),
        }
    }

    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    /// Exponential backoff plus up to half the base delay of jitter.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base_ms = self.base_delay.as_millis() as u64;
        let backoff = base_ms.saturating_mul(1u64 << attempt.min(16));
        let jitter = if base_ms >= 2 {
            rand::thread_rng().gen_range(0..=base_ms / 2)
        } else {
            0
        };
        Duration::from_millis(backoff.saturating_add(jitter))
    }

    pub async fn run<T, F, Fut>(&self, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    let delay = self.delay_for(attempt);
                    log::warn!(
                        "retrying after {e} (attempt {} of {}, waiting {:?})",
                        attempt + 1,
                        self.max_retries,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }
}
