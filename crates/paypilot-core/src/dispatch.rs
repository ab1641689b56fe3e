//! Maps a structured intent onto the chat entry the front end shows.
//!
//! Everything here is a pure function of the intent and the wallet snapshot.

use crate::error::{AssistantError, Result};
use crate::intent::{PaymentIntent, StructuredIntent};
use crate::ledger::CardIdentity;
use crate::state::{ChatEntry, ChatRole, EntryKind};

/// Bank shown when there is neither a hint nor a card to default to.
pub const FALLBACK_BANK: &str = "ABB";

/// Display bank name for a payment.
///
/// A non-empty card hint always wins and is used verbatim. Otherwise the
/// first wallet card is used.
pub fn resolve_card(intent: &PaymentIntent, wallet: &[CardIdentity]) -> String {
    if let Some(hint) = intent.card_hint.as_deref().filter(|h| !h.trim().is_empty()) {
        return hint.to_string();
    }
    wallet
        .first()
        .map(|card| card.bank_name.clone())
        .unwrap_or_else(|| FALLBACK_BANK.to_string())
}

pub fn dispatch(intent: &StructuredIntent, wallet: &[CardIdentity]) -> ChatEntry {
    match intent {
        StructuredIntent::Message { text } => ChatEntry::assistant_text(text.clone()),
        StructuredIntent::Payment(payment) => {
            let bank_name = resolve_card(payment, wallet);
            log::info!(
                "proposing {} {} to {} via {}",
                payment.amount,
                payment.currency,
                payment.merchant,
                bank_name
            );
            ChatEntry::new(
                ChatRole::Assistant,
                payment.confirmation_text.clone(),
                EntryKind::Confirmation {
                    amount: payment.amount,
                    currency: payment.currency.clone(),
                    merchant: payment.merchant.clone(),
                    category: payment.category.clone(),
                    bank_name,
                    card_hint: payment.card_hint.clone(),
                },
            )
        }
    }
}

/// Pick the wallet card a confirmed payment is charged to.
///
/// Exact bank name first, then case-insensitive containment either way,
/// then the first card.
pub fn route_card<'a>(bank_name: &str, wallet: &'a [CardIdentity]) -> Result<&'a CardIdentity> {
    let wanted = bank_name.trim().to_lowercase();
    wallet
        .iter()
        .find(|card| card.bank_name == bank_name)
        .or_else(|| {
            if wanted.is_empty() {
                return None;
            }
            wallet.iter().find(|card| {
                let have = card.bank_name.to_lowercase();
                have.contains(&wanted) || wanted.contains(&have)
            })
        })
        .or_else(|| wallet.first())
        .ok_or(AssistantError::NoCardAvailable)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn card(id: i64, bank: &str) -> CardIdentity {
        CardIdentity {
            id,
            bank_name: bank.to_string(),
            card_number: format!("{:04}", id),
            balance: Decimal::new(100, 0),
            is_favorite: false,
        }
    }

    fn payment(hint: Option<&str>) -> PaymentIntent {
        PaymentIntent {
            merchant: "Azercell".into(),
            category: "Mobile".into(),
            amount: Decimal::new(10, 0),
            currency: "AZN".into(),
            card_hint: hint.map(str::to_string),
            confirmation_text: "Azercell 10 AZN. Təsdiqləyək?".into(),
        }
    }

    #[test]
    fn test_card_hint_wins_regardless_of_wallet() {
        let wallets = [vec![], vec![card(1, "ABB")], vec![card(1, "Leobank"), card(2, "ABB")]];
        for wallet in &wallets {
            assert_eq!(resolve_card(&payment(Some("Kapital Bank")), wallet), "Kapital Bank");
            // verbatim, even if no such card exists
            assert_eq!(resolve_card(&payment(Some("kapital")), wallet), "kapital");
        }
    }

    #[test]
    fn test_no_hint_defaults_to_first_card() {
        let wallet = vec![card(1, "Leobank"), card(2, "ABB")];
        assert_eq!(resolve_card(&payment(None), &wallet), "Leobank");
        assert_eq!(resolve_card(&payment(Some("  ")), &wallet), "Leobank");
        assert_eq!(resolve_card(&payment(None), &[]), FALLBACK_BANK);
    }

    #[test]
    fn test_message_dispatches_to_text_entry() {
        let entry = dispatch(&StructuredIntent::message("Salam!"), &[]);
        assert_eq!(entry.role, ChatRole::Assistant);
        assert_eq!(entry.text, "Salam!");
        assert_eq!(entry.kind, EntryKind::Text);
    }

    #[test]
    fn test_payment_dispatches_to_confirmation() {
        let wallet = vec![card(7, "Kapital Bank")];
        let entry = dispatch(&StructuredIntent::Payment(payment(None)), &wallet);
        match entry.kind {
            EntryKind::Confirmation { amount, ref merchant, ref bank_name, .. } => {
                assert_eq!(amount, Decimal::new(10, 0));
                assert_eq!(merchant, "Azercell");
                assert_eq!(bank_name, "Kapital Bank");
            }
            other => panic!("expected confirmation, got {other:?}"),
        }
        assert_eq!(entry.text, "Azercell 10 AZN. Təsdiqləyək?");
    }

    #[test]
    fn test_route_card_preference_order() {
        let wallet = vec![card(1, "Leobank"), card(2, "ABB"), card(3, "Kapital Bank")];
        assert_eq!(route_card("ABB", &wallet).unwrap().id, 2);
        assert_eq!(route_card("kapital", &wallet).unwrap().id, 3);
        assert_eq!(route_card("Unibank", &wallet).unwrap().id, 1);
        assert!(matches!(route_card("ABB", &[]), Err(AssistantError::NoCardAvailable)));
    }
}
