//! UI-agnostic conversation state types
//!
//! These are the plain-data shapes the front end renders. Nothing here knows
//! about terminals, screens or the network.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Text that stands in for a confirmation entry in the history window when
/// the model gave no prose of its own.
const CONFIRMATION_PLACEHOLDER: &str = "Ödənişi təsdiqləyək?";

/// The role of a chat message sender
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChatRole {
    User,
    Assistant,
}

impl ChatRole {
    /// Role name used by the generative backend's chat protocol.
    pub fn wire_name(&self) -> &'static str {
        match self {
            ChatRole::User => "user",
            ChatRole::Assistant => "model",
        }
    }
}

/// One turn of conversation as the backend sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: ChatRole,
    pub text: String,
}

impl ConversationTurn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            text: text.into(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            text: text.into(),
        }
    }
}

/// What a chat entry represents beyond its text.
#[derive(Debug, Clone, PartialEq)]
pub enum EntryKind {
    Text,
    /// A proposed payment waiting for the user to tap confirm.
    Confirmation {
        amount: Decimal,
        currency: String,
        merchant: String,
        category: String,
        bank_name: String,
        card_hint: Option<String>,
    },
    Receipt {
        amount: Decimal,
        currency: String,
        merchant: String,
    },
    /// A voice message sent by the user.
    Audio {
        mime_type: String,
        byte_len: usize,
    },
}

/// A chat entry in the conversation view
#[derive(Debug, Clone, PartialEq)]
pub struct ChatEntry {
    pub id: String,
    pub role: ChatRole,
    pub text: String,
    pub kind: EntryKind,
    pub created_at: DateTime<Utc>,
}

impl ChatEntry {
    pub fn new(role: ChatRole, text: impl Into<String>, kind: EntryKind) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            text: text.into(),
            kind,
            created_at: Utc::now(),
        }
    }

    pub fn user_text(text: impl Into<String>) -> Self {
        Self::new(ChatRole::User, text, EntryKind::Text)
    }

    pub fn assistant_text(text: impl Into<String>) -> Self {
        Self::new(ChatRole::Assistant, text, EntryKind::Text)
    }

    pub fn is_confirmation(&self) -> bool {
        matches!(self.kind, EntryKind::Confirmation { .. })
    }

    /// The text this entry contributes to the backend history window.
    /// Receipts and voice notes contribute nothing and get filtered out later.
    pub fn history_text(&self) -> &str {
        match &self.kind {
            EntryKind::Confirmation { .. } if self.text.trim().is_empty() => {
                CONFIRMATION_PLACEHOLDER
            }
            _ => &self.text,
        }
    }

    pub fn as_turn(&self) -> ConversationTurn {
        ConversationTurn {
            role: self.role,
            text: self.history_text().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confirmation_without_prose_uses_placeholder() {
        let entry = ChatEntry::new(
            ChatRole::Assistant,
            "",
            EntryKind::Confirmation {
                amount: Decimal::new(10, 0),
                currency: "AZN".into(),
                merchant: "Azercell".into(),
                category: "Mobile".into(),
                bank_name: "ABB".into(),
                card_hint: None,
            },
        );
        assert_eq!(entry.history_text(), CONFIRMATION_PLACEHOLDER);
    }

    #[test]
    fn test_receipt_contributes_empty_history_text() {
        let entry = ChatEntry::new(
            ChatRole::Assistant,
            "",
            EntryKind::Receipt {
                amount: Decimal::new(5, 0),
                currency: "AZN".into(),
                merchant: "Bolt".into(),
            },
        );
        assert!(entry.as_turn().text.is_empty());
    }

    #[test]
    fn test_wire_role_names() {
        assert_eq!(ChatRole::User.wire_name(), "user");
        assert_eq!(ChatRole::Assistant.wire_name(), "model");
    }
}
