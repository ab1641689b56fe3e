//! Request construction for both the hosted intent function and the
//! generative model.
//!
//! Exactly one request is built per user turn. Text turns become a chat
//! transcript; audio turns become a single content block, because the
//! model's audio path does not accept mixed turn histories.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::error::{AssistantError, Result};
use crate::history::sanitize;
use crate::prompt::{AUDIO_INSTRUCTION, DEFAULT_AUDIO_MIME, HISTORY_CONTEXT_LABEL, SYSTEM_PROMPT};
use crate::state::{ChatRole, ConversationTurn};

/// What the user sent this turn.
#[derive(Debug, Clone, PartialEq)]
pub enum UserInput {
    Text(String),
    Audio { bytes: Vec<u8>, mime_type: String },
}

/// A single user turn plus the history it was sent with. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub input: UserInput,
    /// Prior turns, oldest first. Not yet sanitized.
    pub history: Vec<ConversationTurn>,
}

impl InboundMessage {
    pub fn text(text: impl Into<String>, history: Vec<ConversationTurn>) -> Self {
        Self {
            input: UserInput::Text(text.into()),
            history,
        }
    }

    pub fn audio(bytes: Vec<u8>, mime_type: impl Into<String>, history: Vec<ConversationTurn>) -> Self {
        Self {
            input: UserInput::Audio {
                bytes,
                mime_type: mime_type.into(),
            },
            history,
        }
    }

    pub fn is_audio(&self) -> bool {
        matches!(self.input, UserInput::Audio { .. })
    }

    /// Reject blank text and empty audio before anything goes over the wire.
    pub fn validate(&self) -> Result<()> {
        match &self.input {
            UserInput::Text(text) if text.trim().is_empty() => Err(AssistantError::InvalidInput(
                "text message is empty".into(),
            )),
            UserInput::Audio { bytes, .. } if bytes.is_empty() => Err(AssistantError::InvalidInput(
                "audio message is empty".into(),
            )),
            _ => Ok(()),
        }
    }
}

// ============================================================================
// Shared content shapes
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
    pub mime_type: String,
    pub data: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inline_data: Option<InlineData>,
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            inline_data: None,
        }
    }

    pub fn inline(mime_type: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            text: None,
            inline_data: Some(InlineData {
                mime_type: mime_type.into(),
                data: data.into(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub parts: Vec<Part>,
}

impl Content {
    pub fn from_turn(turn: &ConversationTurn) -> Self {
        Self {
            role: Some(turn.role.wire_name().to_string()),
            parts: vec![Part::text(turn.text.clone())],
        }
    }
}

// ============================================================================
// Hosted intent function
// ============================================================================

/// Body of a call to the hosted intent function.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntentRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Base64 audio payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub history: Vec<Content>,
}

impl IntentRequest {
    /// The history sent is already sanitized so the function does not have
    /// to repair it.
    pub fn from_message(message: &InboundMessage) -> Result<Self> {
        message.validate()?;
        let history = sanitize(&message.history).iter().map(Content::from_turn).collect();
        Ok(match &message.input {
            UserInput::Text(text) => IntentRequest {
                text: Some(text.clone()),
                history,
                ..Default::default()
            },
            UserInput::Audio { bytes, mime_type } => IntentRequest {
                audio: Some(BASE64.encode(bytes)),
                mime_type: Some(mime_type.clone()),
                history,
                ..Default::default()
            },
        })
    }
}

// ============================================================================
// Generative model
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct ModelSettings {
    pub model: String,
    pub temperature: f32,
    pub top_p: f32,
    pub max_output_tokens: u32,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            model: "gemini-2.5-flash".to_string(),
            temperature: 0.1,
            top_p: 1.0,
            max_output_tokens: 1024,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub temperature: f32,
    pub top_p: f32,
    pub max_output_tokens: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    pub system_instruction: Content,
    pub contents: Vec<Content>,
    pub generation_config: GenerationConfig,
}

impl GenerateRequest {
    fn with_contents(contents: Vec<Content>, settings: &ModelSettings) -> Self {
        Self {
            system_instruction: Content {
                role: None,
                parts: vec![Part::text(SYSTEM_PROMPT)],
            },
            contents,
            generation_config: GenerationConfig {
                temperature: settings.temperature,
                top_p: settings.top_p,
                max_output_tokens: settings.max_output_tokens,
            },
        }
    }
}

pub fn build_generate_request(message: &InboundMessage, settings: &ModelSettings) -> Result<GenerateRequest> {
    message.validate()?;
    let history = sanitize(&message.history);
    Ok(match &message.input {
        UserInput::Text(text) => build_text_request(text, &history, settings),
        UserInput::Audio { bytes, mime_type } => build_audio_request(bytes, mime_type, &history, settings)?,
    })
}

/// History as prior turns, then the new text as the final user turn.
fn build_text_request(text: &str, history: &[ConversationTurn], settings: &ModelSettings) -> GenerateRequest {
    let mut contents: Vec<Content> = history.iter().map(Content::from_turn).collect();
    contents.push(Content::from_turn(&ConversationTurn::user(text)));
    GenerateRequest::with_contents(contents, settings)
}

/// One content block: instruction, audio, then history as plain text.
fn build_audio_request(
    bytes: &[u8],
    mime_type: &str,
    history: &[ConversationTurn],
    settings: &ModelSettings,
) -> Result<GenerateRequest> {
    let mime = if mime_type.trim().is_empty() {
        DEFAULT_AUDIO_MIME
    } else {
        mime_type
    };

    let mut parts = vec![Part::text(AUDIO_INSTRUCTION), Part::inline(mime, BASE64.encode(bytes))];
    if !history.is_empty() {
        let wire: Vec<Content> = history.iter().map(Content::from_turn).collect();
        let serialized = serde_json::to_string(&wire)
            .map_err(|e| AssistantError::InvalidInput(format!("history not serializable: {e}")))?;
        parts.push(Part::text(HISTORY_CONTEXT_LABEL));
        parts.push(Part::text(serialized));
    }

    let contents = vec![Content {
        role: Some(ChatRole::User.wire_name().to_string()),
        parts,
    }];
    Ok(GenerateRequest::with_contents(contents, settings))
}
