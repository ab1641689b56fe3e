//! The conversation session: chat entries, the rolling history window and
//! the one-turn-at-a-time request discipline.
//!
//! A turn goes `submit` → (caller runs the backend) → `complete_turn`. Only
//! one turn may be in flight; a second `submit` is rejected rather than
//! queued. Results for a ticket that was cancelled or superseded are
//! dropped on the floor.

use std::collections::HashSet;

use tokio_util::sync::CancellationToken;

use crate::backend::IntentBackend;
use crate::dispatch::dispatch;
use crate::error::{AssistantError, Result};
use crate::history::HistoryWindow;
use crate::intent::StructuredIntent;
use crate::ledger::CardIdentity;
use crate::locale::{bonus_text, FixedReply, Language};
use crate::payment::CompletedPayment;
use crate::request::{InboundMessage, UserInput};
use crate::state::{ChatEntry, ChatRole, EntryKind};

/// Handle for one submitted turn.
#[derive(Debug, Clone)]
pub struct TurnTicket {
    pub id: u64,
    pub message: InboundMessage,
    pub cancel: CancellationToken,
}

impl TurnTicket {
    pub async fn resolve(&self, backend: &dyn IntentBackend) -> Result<StructuredIntent> {
        backend.resolve(&self.message, &self.cancel).await
    }
}

#[derive(Debug)]
struct InFlight {
    id: u64,
    cancel: CancellationToken,
}

#[derive(Debug)]
pub struct Conversation {
    entries: Vec<ChatEntry>,
    history: HistoryWindow,
    wallet: Vec<CardIdentity>,
    in_flight: Option<InFlight>,
    next_ticket: u64,
    delivered: HashSet<String>,
    language: Language,
    closed: bool,
}

impl Conversation {
    /// A fresh conversation opening with the welcome message.
    pub fn new(language: Language, history_window: usize) -> Self {
        let mut conversation = Self {
            entries: Vec::new(),
            history: HistoryWindow::new(history_window),
            wallet: Vec::new(),
            in_flight: None,
            next_ticket: 1,
            delivered: HashSet::new(),
            language,
            closed: false,
        };
        conversation.push(ChatEntry::assistant_text(FixedReply::Welcome.text(language)));
        conversation
    }

    pub fn entries(&self) -> &[ChatEntry] {
        &self.entries
    }

    pub fn language(&self) -> Language {
        self.language
    }

    pub fn wallet(&self) -> &[CardIdentity] {
        &self.wallet
    }

    /// Swap in a freshly read wallet snapshot.
    pub fn replace_wallet(&mut self, cards: Vec<CardIdentity>) {
        self.wallet = cards;
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn history(&self) -> &HistoryWindow {
        &self.history
    }

    /// The most recent payment confirmation prompt, if any.
    pub fn latest_confirmation(&self) -> Option<&ChatEntry> {
        self.entries.iter().rev().find(|e| e.is_confirmation())
    }

    /// Record the user's input and hand back the ticket to resolve.
    ///
    /// The outgoing history is the window as it stood before this input.
    pub fn submit(&mut self, input: UserInput) -> Result<TurnTicket> {
        if self.closed {
            return Err(AssistantError::InvalidTransition {
                action: "submit",
                state: "closed",
            });
        }
        if self.in_flight.is_some() {
            return Err(AssistantError::TurnInFlight);
        }

        let message = InboundMessage {
            input,
            history: self.history.snapshot(),
        };
        message.validate()?;

        let entry = match &message.input {
            UserInput::Text(text) => ChatEntry::user_text(text.trim()),
            UserInput::Audio { bytes, mime_type } => ChatEntry::new(
                ChatRole::User,
                "",
                EntryKind::Audio {
                    mime_type: mime_type.clone(),
                    byte_len: bytes.len(),
                },
            ),
        };
        self.push(entry);

        let id = self.next_ticket;
        self.next_ticket += 1;
        let cancel = CancellationToken::new();
        self.in_flight = Some(InFlight {
            id,
            cancel: cancel.clone(),
        });
        log::debug!("turn {id} submitted");

        Ok(TurnTicket { id, message, cancel })
    }

    /// Apply a backend result. Returns the appended entry, or `None` when
    /// the result was discarded.
    pub fn complete_turn(&mut self, ticket_id: u64, result: Result<StructuredIntent>) -> Option<&ChatEntry> {
        match &self.in_flight {
            Some(flight) if flight.id == ticket_id && !flight.cancel.is_cancelled() => {}
            _ => {
                log::debug!("discarding result for stale turn {ticket_id}");
                return None;
            }
        }
        self.in_flight = None;

        let intent = match result {
            Ok(intent) => intent,
            Err(AssistantError::Cancelled) => return None,
            Err(e) => {
                log::error!("turn {ticket_id} failed: {e}");
                StructuredIntent::fixed(FixedReply::ServiceUnavailable, self.language)
            }
        };

        let entry = dispatch(&intent, &self.wallet);
        self.push(entry);
        self.entries.last()
    }

    /// Cancel the in-flight turn, if any. Its result will be discarded.
    pub fn cancel_turn(&mut self) -> bool {
        match self.in_flight.take() {
            Some(flight) => {
                flight.cancel.cancel();
                log::info!("turn {} cancelled", flight.id);
                true
            }
            None => false,
        }
    }

    /// Tear the session down. Nothing can be submitted afterwards.
    pub fn close(&mut self) {
        self.cancel_turn();
        self.closed = true;
    }

    /// Start over with just the welcome message. Delivered receipts stay
    /// remembered.
    pub fn clear(&mut self) {
        self.cancel_turn();
        self.entries.clear();
        self.history.clear();
        self.push(ChatEntry::assistant_text(FixedReply::Welcome.text(self.language)));
    }

    /// Append a receipt for a completed payment, once per payment.
    ///
    /// Returns false if this payment was already delivered.
    pub fn deliver_completion(&mut self, completed: &CompletedPayment) -> bool {
        if !self.delivered.insert(completed.key()) {
            log::debug!("duplicate completion {} ignored", completed.key());
            return false;
        }

        self.push(ChatEntry::new(
            ChatRole::Assistant,
            "",
            EntryKind::Receipt {
                amount: completed.amount,
                currency: completed.currency.clone(),
                merchant: completed.merchant.clone(),
            },
        ));

        if completed.bonus_amount > rust_decimal::Decimal::ZERO {
            let partner = completed
                .bonus_partner
                .as_deref()
                .unwrap_or(crate::bonus::GENERAL_PARTNER);
            self.push(ChatEntry::assistant_text(bonus_text(
                self.language,
                partner,
                completed.bonus_amount,
                &completed.currency,
            )));
        }
        true
    }

    /// Show a user-facing notice. Notices are not part of the model's
    /// history.
    pub fn notice(&mut self, text: impl Into<String>) {
        self.entries.push(ChatEntry::assistant_text(text));
    }

    fn push(&mut self, entry: ChatEntry) {
        let turn = entry.as_turn();
        if !turn.text.trim().is_empty() {
            self.history.push(turn);
        }
        self.entries.push(entry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intent::PaymentIntent;
    use chrono::Utc;
    use rust_decimal::Decimal;

    fn conversation() -> Conversation {
        Conversation::new(Language::En, 6)
    }

    fn completed(merchant: &str, bonus: Decimal) -> CompletedPayment {
        CompletedPayment {
            amount: Decimal::new(1200, 2),
            currency: "AZN".into(),
            merchant: merchant.into(),
            bank_name: "Kapital Bank".into(),
            bonus_amount: bonus,
            bonus_partner: Some("CinemaPlus".into()),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_opens_with_welcome() {
        let c = conversation();
        assert_eq!(c.entries().len(), 1);
        assert_eq!(c.entries()[0].role, ChatRole::Assistant);
    }

    #[test]
    fn test_history_snapshot_taken_before_user_entry() {
        let mut c = conversation();
        let ticket = c.submit(UserInput::Text("Salam".into())).unwrap();
        assert_eq!(ticket.message.history.len(), 1);
        assert_eq!(ticket.message.history[0].role, ChatRole::Assistant);
        assert_eq!(c.entries().last().unwrap().text, "Salam");
    }

    #[test]
    fn test_second_submit_while_in_flight_is_rejected() {
        let mut c = conversation();
        let ticket = c.submit(UserInput::Text("one".into())).unwrap();
        assert!(matches!(
            c.submit(UserInput::Text("two".into())),
            Err(AssistantError::TurnInFlight)
        ));
        c.complete_turn(ticket.id, Ok(StructuredIntent::message("ok")));
        assert!(c.submit(UserInput::Text("two".into())).is_ok());
    }

    #[test]
    fn test_invalid_input_is_not_recorded() {
        let mut c = conversation();
        assert!(matches!(
            c.submit(UserInput::Text("   ".into())),
            Err(AssistantError::InvalidInput(_))
        ));
        assert_eq!(c.entries().len(), 1);
        assert!(!c.is_busy());
    }

    #[test]
    fn test_cancelled_turn_result_is_discarded() {
        let mut c = conversation();
        let ticket = c.submit(UserInput::Text("Bolt 5 AZN".into())).unwrap();
        assert!(c.cancel_turn());
        assert!(ticket.cancel.is_cancelled());
        assert!(c
            .complete_turn(ticket.id, Ok(StructuredIntent::message("late")))
            .is_none());
        assert_eq!(c.entries().last().unwrap().text, "Bolt 5 AZN");
    }

    #[test]
    fn test_payment_turn_appends_confirmation() {
        let mut c = conversation();
        c.replace_wallet(vec![CardIdentity {
            id: 1,
            bank_name: "Leobank".into(),
            card_number: "2290".into(),
            balance: Decimal::new(120, 0),
            is_favorite: true,
        }]);
        let ticket = c.submit(UserInput::Text("Azercell 10".into())).unwrap();
        let intent = StructuredIntent::Payment(PaymentIntent {
            merchant: "Azercell".into(),
            category: "Mobile".into(),
            amount: Decimal::new(10, 0),
            currency: "AZN".into(),
            card_hint: None,
            confirmation_text: String::new(),
        });
        let entry = c.complete_turn(ticket.id, Ok(intent)).unwrap().clone();
        assert!(entry.is_confirmation());
        assert_eq!(c.latest_confirmation().map(|e| &e.id), Some(&entry.id));
        // the placeholder keeps the confirmation in the model's history
        assert_eq!(c.history().snapshot().last().unwrap().role, ChatRole::Assistant);
    }

    #[test]
    fn test_backend_error_becomes_fixed_reply() {
        let mut c = conversation();
        let ticket = c.submit(UserInput::Text("hi".into())).unwrap();
        let entry = c
            .complete_turn(ticket.id, Err(AssistantError::Network("down".into())))
            .unwrap();
        assert_eq!(entry.text, FixedReply::ServiceUnavailable.text(Language::En));
    }

    #[test]
    fn test_completion_delivered_once() {
        let mut c = conversation();
        let payment = completed("CinemaPlus", Decimal::new(120, 2));
        assert!(c.deliver_completion(&payment));
        let len = c.entries().len();
        assert!(!c.deliver_completion(&payment));
        assert_eq!(c.entries().len(), len);

        let receipts = c
            .entries()
            .iter()
            .filter(|e| matches!(e.kind, EntryKind::Receipt { .. }))
            .count();
        assert_eq!(receipts, 1);
        assert!(c.entries().last().unwrap().text.contains("CinemaPlus"));
    }

    #[test]
    fn test_no_bonus_no_bonus_text() {
        let mut c = conversation();
        c.deliver_completion(&completed("Nar", Decimal::ZERO));
        assert!(matches!(c.entries().last().unwrap().kind, EntryKind::Receipt { .. }));
    }

    #[test]
    fn test_closed_conversation_rejects_submissions() {
        let mut c = conversation();
        let ticket = c.submit(UserInput::Text("hi".into())).unwrap();
        c.close();
        assert!(ticket.cancel.is_cancelled());
        assert!(matches!(
            c.submit(UserInput::Text("again".into())),
            Err(AssistantError::InvalidTransition { .. })
        ));
    }
}
