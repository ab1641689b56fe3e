pub mod ai;
pub mod backend;
pub mod bonus;
pub mod config;
pub mod conversation;
pub mod dispatch;
pub mod error;
pub mod history;
pub mod intent;
pub mod ledger;
pub mod locale;
pub mod payment;
pub mod prompt;
pub mod request;
pub mod resolver;
pub mod state;

// Re-export main types for convenience
pub use ai::{FunctionClient, GeminiClient, GenerativeModel};
pub use backend::{Backend, IntentBackend, RetryPolicy};
pub use bonus::{compute_bonus, Bonus};
pub use config::Config;
pub use conversation::{Conversation, TurnTicket};
pub use dispatch::{dispatch, resolve_card, route_card};
pub use error::{AssistantError, ErrorKind, Result};
pub use history::{sanitize, HistoryWindow};
pub use intent::{parse_reply, PaymentIntent, StructuredIntent};
pub use ledger::{CardIdentity, Ledger, SqliteLedger};
pub use locale::{FixedReply, Language};
pub use payment::{settle, CancelReason, CodePolicy, CompletedPayment, OneTimeCode, PaymentFlow, PaymentProposal, PaymentState};
pub use request::{InboundMessage, ModelSettings, UserInput};
pub use resolver::IntentResolver;
pub use state::{ChatEntry, ChatRole, ConversationTurn, EntryKind};
