use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use paypilot_core::request::GenerateRequest;
use paypilot_core::{
    settle, AssistantError, CodePolicy, Conversation, EntryKind, GenerativeModel, IntentResolver, Language, Ledger,
    ModelSettings, OneTimeCode, PaymentFlow, PaymentProposal, PaymentState, SqliteLedger, StructuredIntent, UserInput,
};
use rust_decimal::Decimal;

/// Replays canned model replies in order.
struct ScriptedModel {
    replies: Mutex<Vec<String>>,
}

impl ScriptedModel {
    fn new(replies: &[&str]) -> Self {
        Self {
            replies: Mutex::new(replies.iter().map(|r| r.to_string()).collect()),
        }
    }
}

#[async_trait]
impl GenerativeModel for ScriptedModel {
    async fn generate(&self, _model: &str, _request: &GenerateRequest) -> paypilot_core::Result<Option<String>> {
        let mut replies = self.replies.lock().unwrap();
        Ok(if replies.is_empty() { None } else { Some(replies.remove(0)) })
    }
}

fn seeded_ledger() -> SqliteLedger {
    let ledger = SqliteLedger::open_in_memory("scenario").unwrap();
    ledger.seed_demo_wallet().unwrap();
    ledger
}

async fn run_turn(conversation: &mut Conversation, resolver: &IntentResolver<ScriptedModel>, text: &str) {
    let ticket = conversation.submit(UserInput::Text(text.to_string())).unwrap();
    let result = ticket.resolve(resolver).await;
    conversation.complete_turn(ticket.id, result);
}

fn resolver(replies: &[&str]) -> IntentResolver<ScriptedModel> {
    IntentResolver::new(ScriptedModel::new(replies), ModelSettings::default(), Language::En)
}

#[tokio::test]
async fn scenario_a_payment_defaults_to_first_wallet_card() {
    let ledger = seeded_ledger();
    let mut conversation = Conversation::new(Language::Az, 6);
    conversation.replace_wallet(ledger.cards().unwrap());

    let resolver = resolver(&[
        r#"{"type":"payment_request","merchant":"Azercell","category":"Mobile","amount":10,"currency":"AZN","confirmation_text":"Azercell balansını 10 AZN artırım?"}"#,
    ]);
    run_turn(&mut conversation, &resolver, "Azercell 10 AZN").await;

    let entry = conversation.latest_confirmation().expect("confirmation entry");
    match &entry.kind {
        EntryKind::Confirmation {
            amount,
            currency,
            merchant,
            bank_name,
            ..
        } => {
            assert_eq!(*amount, Decimal::new(10, 0));
            assert_eq!(currency, "AZN");
            assert_eq!(merchant, "Azercell");
            assert_eq!(bank_name, &ledger.cards().unwrap()[0].bank_name);
        }
        other => panic!("unexpected entry {other:?}"),
    }
}

#[tokio::test]
async fn scenario_b_prose_wrapped_message_is_extracted() {
    let mut conversation = Conversation::new(Language::En, 6);
    let resolver = resolver(&["Here you go: {\"type\":\"message\",\"text\":\"Salam!\"}\n"]);
    run_turn(&mut conversation, &resolver, "Salam").await;

    let last = conversation.entries().last().unwrap();
    assert_eq!(last.text, "Salam!");
    assert_eq!(last.kind, EntryKind::Text);
}

#[tokio::test]
async fn scenario_c_unparseable_reply_is_kept_verbatim() {
    let mut conversation = Conversation::new(Language::En, 6);
    let resolver = resolver(&["I am not sure what you mean"]);
    run_turn(&mut conversation, &resolver, "???").await;

    assert_eq!(conversation.entries().last().unwrap().text, "I am not sure what you mean");
}

#[test]
fn scenario_d_wrong_code_keeps_waiting() {
    let now = Instant::now();
    let mut flow = PaymentFlow::propose(
        PaymentProposal {
            amount: Decimal::new(10, 0),
            currency: "AZN".into(),
            merchant: "Azercell".into(),
            category: "Mobile".into(),
            bank_name: "Kapital Bank".into(),
        },
        CodePolicy::default(),
    )
    .unwrap();
    flow.confirm_with_code(OneTimeCode::from_digits("5678").unwrap(), now)
        .unwrap();

    let mut outcome = Ok(false);
    for (slot, digit) in "1234".chars().enumerate() {
        outcome = flow.enter_digit(slot, digit, now);
    }
    assert!(matches!(outcome, Err(AssistantError::CodeMismatch { .. })));
    assert_eq!(flow.state(), PaymentState::AwaitingCode);
}

#[tokio::test]
async fn scenario_e_correct_code_completes_exactly_once() {
    let ledger = seeded_ledger();
    let mut conversation = Conversation::new(Language::En, 6);
    conversation.replace_wallet(ledger.cards().unwrap());

    let resolver = resolver(&[
        r#"```json
{"type":"payment_request","merchant":"CinemaPlus","category":"Entertainment","amount":"12.00","currency":"AZN","card_hint":"Kapital Bank","confirmation_text":"2 tickets, 12 AZN?"}
```"#,
    ]);
    run_turn(&mut conversation, &resolver, "CinemaPlus 12 manat").await;

    let proposal = PaymentProposal::from_entry(conversation.latest_confirmation().unwrap()).unwrap();
    let mut flow = PaymentFlow::propose(proposal, CodePolicy::default()).unwrap();
    let now = Instant::now();
    let code = flow.confirm(now).unwrap().as_str().to_string();
    for (slot, digit) in code.chars().enumerate() {
        flow.enter_digit(slot, digit, now).unwrap();
    }
    assert_eq!(flow.state(), PaymentState::Verifying);

    let completed = settle(&mut flow, &ledger, Duration::ZERO).await.unwrap();
    assert_eq!(completed.merchant, "CinemaPlus");
    assert_eq!(completed.amount, Decimal::new(12, 0));
    assert_eq!(completed.bonus_amount, Decimal::new(120, 2));

    let before = conversation.entries().len();
    assert!(conversation.deliver_completion(&completed));
    assert!(!conversation.deliver_completion(&completed.clone()));
    // receipt plus bonus text, once
    assert_eq!(conversation.entries().len(), before + 2);

    conversation.replace_wallet(ledger.cards().unwrap());
    let kapital = conversation
        .wallet()
        .iter()
        .find(|c| c.bank_name == "Kapital Bank")
        .unwrap();
    assert_eq!(kapital.balance, Decimal::new(33800, 2));
}

#[tokio::test]
async fn follow_up_turn_carries_sanitized_history() {
    let mut conversation = Conversation::new(Language::En, 6);
    let resolver = resolver(&[
        r#"{"type":"message","text":"Which card?"}"#,
        r#"{"type":"message","text":"Done"}"#,
    ]);
    run_turn(&mut conversation, &resolver, "Bolt 8 AZN").await;

    let ticket = conversation.submit(UserInput::Text("ABB".into())).unwrap();
    // welcome, user, assistant
    assert_eq!(ticket.message.history.len(), 3);
    let intent = ticket.resolve(&resolver).await.unwrap();
    assert_eq!(intent, StructuredIntent::message("Done"));
}
