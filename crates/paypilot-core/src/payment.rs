//! Payment confirmation lifecycle.
//!
//! ```text
//! Proposed --confirm--> AwaitingCode --code ok--> Verifying --settle--> Completed
//!    |                     |    ^
//!    | cancel              |    | resend
//!    v                     v    |
//! Cancelled(UserCancelled | CodeExpired | AttemptsExhausted | SettlementFailed)
//! ```
//!
//! The one-time code is shown to the user directly; there is no real
//! out-of-band channel. Time is passed in explicitly so the flow can be
//! driven deterministically.

use std::fmt;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use rand::Rng;
use rust_decimal::Decimal;

use crate::bonus::compute_bonus;
use crate::dispatch::route_card;
use crate::error::{AssistantError, Result};
use crate::ledger::{BonusRecord, Ledger, PaymentRecord};
use crate::state::{ChatEntry, EntryKind};

pub const CODE_LEN: usize = 4;
pub const DEFAULT_CODE_TTL: Duration = Duration::from_secs(60);
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_SETTLEMENT_DELAY: Duration = Duration::from_millis(1500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    UserCancelled,
    CodeExpired,
    AttemptsExhausted,
    SettlementFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentState {
    Proposed,
    AwaitingCode,
    Verifying,
    Completed,
    Cancelled(CancelReason),
}

impl PaymentState {
    pub fn name(&self) -> &'static str {
        match self {
            PaymentState::Proposed => "proposed",
            PaymentState::AwaitingCode => "awaiting code",
            PaymentState::Verifying => "verifying",
            PaymentState::Completed => "completed",
            PaymentState::Cancelled(_) => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PaymentState::Completed | PaymentState::Cancelled(_))
    }
}

/// What the user is being asked to confirm.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentProposal {
    pub amount: Decimal,
    pub currency: String,
    pub merchant: String,
    pub category: String,
    /// Resolved display bank name.
    pub bank_name: String,
}

impl PaymentProposal {
    /// `None` unless the entry is a confirmation prompt.
    pub fn from_entry(entry: &ChatEntry) -> Option<Self> {
        match &entry.kind {
            EntryKind::Confirmation {
                amount,
                currency,
                merchant,
                category,
                bank_name,
                ..
            } => Some(Self {
                amount: *amount,
                currency: currency.clone(),
                merchant: merchant.clone(),
                category: category.clone(),
                bank_name: bank_name.clone(),
            }),
            _ => None,
        }
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct OneTimeCode(String);

impl OneTimeCode {
    pub fn generate() -> Self {
        let n: u16 = rand::thread_rng().gen_range(1000..=9999);
        Self(n.to_string())
    }

    /// Exactly four ASCII digits.
    pub fn from_digits(s: &str) -> Option<Self> {
        (s.len() == CODE_LEN && s.bytes().all(|b| b.is_ascii_digit())).then(|| Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for OneTimeCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("OneTimeCode(****)")
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CodePolicy {
    pub ttl: Duration,
    pub max_attempts: u32,
}

impl Default for CodePolicy {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_CODE_TTL,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

#[derive(Debug)]
pub struct PaymentFlow {
    proposal: PaymentProposal,
    policy: CodePolicy,
    state: PaymentState,
    code: Option<OneTimeCode>,
    slots: [Option<u8>; CODE_LEN],
    deadline: Option<Instant>,
    attempts_left: u32,
}

impl PaymentFlow {
    /// Start a flow. Non-positive amounts never get this far.
    pub fn propose(proposal: PaymentProposal, policy: CodePolicy) -> Result<Self> {
        if proposal.amount <= Decimal::ZERO {
            return Err(AssistantError::InvalidInput(format!(
                "payment amount must be positive, got {}",
                proposal.amount
            )));
        }
        let attempts_left = policy.max_attempts.max(1);
        Ok(Self {
            proposal,
            policy,
            state: PaymentState::Proposed,
            code: None,
            slots: [None; CODE_LEN],
            deadline: None,
            attempts_left,
        })
    }

    pub fn proposal(&self) -> &PaymentProposal {
        &self.proposal
    }

    pub fn state(&self) -> PaymentState {
        self.state
    }

    /// The code to display, while one is outstanding.
    pub fn code(&self) -> Option<&OneTimeCode> {
        match self.state {
            PaymentState::AwaitingCode => self.code.as_ref(),
            _ => None,
        }
    }

    pub fn slots(&self) -> &[Option<u8>; CODE_LEN] {
        &self.slots
    }

    pub fn attempts_left(&self) -> u32 {
        self.attempts_left
    }

    /// Countdown for display. Zero once expired or when no code is pending.
    pub fn remaining(&self, now: Instant) -> Duration {
        match (self.state, self.deadline) {
            (PaymentState::AwaitingCode, Some(deadline)) => deadline.saturating_duration_since(now),
            _ => Duration::ZERO,
        }
    }

    pub fn confirm(&mut self, now: Instant) -> Result<&OneTimeCode> {
        self.confirm_with_code(OneTimeCode::generate(), now)
    }

    pub fn confirm_with_code(&mut self, code: OneTimeCode, now: Instant) -> Result<&OneTimeCode> {
        self.require(PaymentState::Proposed, "confirm")?;
        log::info!(
            "payment to {} confirmed, awaiting code",
            self.proposal.merchant
        );
        Ok(self.issue(code, now))
    }

    /// Issue a fresh code after expiry, or replace a still-pending one.
    pub fn resend(&mut self, now: Instant) -> Result<&OneTimeCode> {
        self.resend_with_code(OneTimeCode::generate(), now)
    }

    pub fn resend_with_code(&mut self, code: OneTimeCode, now: Instant) -> Result<&OneTimeCode> {
        match self.state {
            PaymentState::AwaitingCode | PaymentState::Cancelled(CancelReason::CodeExpired) => {
                self.attempts_left = self.policy.max_attempts.max(1);
                Ok(self.issue(code, now))
            }
            state => Err(AssistantError::InvalidTransition {
                action: "resend code",
                state: state.name(),
            }),
        }
    }

    fn issue(&mut self, code: OneTimeCode, now: Instant) -> &OneTimeCode {
        self.slots = [None; CODE_LEN];
        self.deadline = Some(now + self.policy.ttl);
        self.state = PaymentState::AwaitingCode;
        self.code.insert(code)
    }

    /// Enforce expiry. Returns true if this call expired the code.
    pub fn tick(&mut self, now: Instant) -> bool {
        let expired = self.state == PaymentState::AwaitingCode
            && self.deadline.map_or(false, |deadline| now >= deadline);
        if expired {
            log::info!("confirmation code for {} expired", self.proposal.merchant);
            self.code = None;
            self.state = PaymentState::Cancelled(CancelReason::CodeExpired);
        }
        expired
    }

    /// Put a digit into a slot. Filling the last empty slot submits the code.
    ///
    /// `Ok(true)` means the code matched and the flow is now verifying.
    pub fn enter_digit(&mut self, slot: usize, digit: char, now: Instant) -> Result<bool> {
        self.require_live(now, "enter code")?;
        if slot >= CODE_LEN {
            return Err(AssistantError::InvalidInput(format!("no code slot {slot}")));
        }
        let value = digit
            .to_digit(10)
            .ok_or_else(|| AssistantError::InvalidInput(format!("{digit:?} is not a digit")))?;
        let was_empty = self.slots[slot].is_none();
        self.slots[slot] = Some(value as u8);

        if was_empty && self.slots.iter().all(Option::is_some) {
            self.submit(now)?;
            return Ok(true);
        }
        Ok(false)
    }

    pub fn clear_digit(&mut self, slot: usize) {
        if let Some(s) = self.slots.get_mut(slot) {
            *s = None;
        }
    }

    /// Compare the filled slots against the code. A mismatch leaves the
    /// slots as entered.
    pub fn submit(&mut self, now: Instant) -> Result<()> {
        self.require_live(now, "submit code")?;

        let entered: Option<String> = self
            .slots
            .iter()
            .map(|slot| slot.map(|d| char::from(b'0' + d)))
            .collect();
        let Some(entered) = entered else {
            return Err(AssistantError::InvalidInput("code is incomplete".into()));
        };

        if self.code.as_ref().map(OneTimeCode::as_str) == Some(entered.as_str()) {
            self.code = None;
            self.deadline = None;
            self.state = PaymentState::Verifying;
            return Ok(());
        }

        self.attempts_left = self.attempts_left.saturating_sub(1);
        if self.attempts_left == 0 {
            log::warn!("too many incorrect codes for {}", self.proposal.merchant);
            self.code = None;
            self.state = PaymentState::Cancelled(CancelReason::AttemptsExhausted);
            return Err(AssistantError::AttemptsExhausted);
        }
        Err(AssistantError::CodeMismatch {
            remaining_attempts: self.attempts_left,
        })
    }

    pub fn cancel(&mut self) -> Result<()> {
        match self.state {
            PaymentState::Proposed | PaymentState::AwaitingCode => {
                self.code = None;
                self.state = PaymentState::Cancelled(CancelReason::UserCancelled);
                Ok(())
            }
            state => Err(AssistantError::InvalidTransition {
                action: "cancel",
                state: state.name(),
            }),
        }
    }

    fn require(&self, expected: PaymentState, action: &'static str) -> Result<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(AssistantError::InvalidTransition {
                action,
                state: self.state.name(),
            })
        }
    }

    /// Awaiting a code that has not expired yet.
    fn require_live(&mut self, now: Instant, action: &'static str) -> Result<()> {
        if self.tick(now) {
            return Err(AssistantError::CodeExpired);
        }
        self.require(PaymentState::AwaitingCode, action)
    }
}

/// A settled payment, reported back to the conversation exactly once.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletedPayment {
    pub amount: Decimal,
    pub currency: String,
    pub merchant: String,
    pub bank_name: String,
    pub bonus_amount: Decimal,
    pub bonus_partner: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl CompletedPayment {
    /// Composite key used to drop duplicate deliveries.
    pub fn key(&self) -> String {
        format!(
            "{}-{}-{}",
            self.amount.normalize(),
            self.merchant,
            self.timestamp.timestamp_millis()
        )
    }
}

/// Run settlement for a verified flow: wait out the simulated network
/// delay, debit the routed card and record any bonus.
///
/// A failed bonus write is logged and does not undo the payment.
pub async fn settle(flow: &mut PaymentFlow, ledger: &dyn Ledger, delay: Duration) -> Result<CompletedPayment> {
    flow.require(PaymentState::Verifying, "settle")?;

    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }

    match settle_inner(&flow.proposal, ledger) {
        Ok(completed) => {
            flow.state = PaymentState::Completed;
            Ok(completed)
        }
        Err(e) => {
            log::error!("settlement for {} failed: {e}", flow.proposal.merchant);
            flow.state = PaymentState::Cancelled(CancelReason::SettlementFailed);
            Err(e)
        }
    }
}

fn settle_inner(proposal: &PaymentProposal, ledger: &dyn Ledger) -> Result<CompletedPayment> {
    let wallet = ledger.cards()?;
    let card = route_card(&proposal.bank_name, &wallet)?;

    let transaction = ledger.record_payment(&PaymentRecord {
        card_id: card.id,
        amount: proposal.amount,
        merchant: proposal.merchant.clone(),
        category: proposal.category.clone(),
    })?;

    let bonus = compute_bonus(&proposal.bank_name, &proposal.merchant, proposal.amount);
    if bonus.is_positive() {
        let record = BonusRecord {
            partner_name: bonus.partner_or_general().to_string(),
            amount: bonus.amount,
            card_name: Some(card.bank_name.clone()),
        };
        if let Err(e) = ledger.record_bonus(&record) {
            log::error!("failed to record bonus for {}: {e}", proposal.merchant);
        }
    }

    log::info!(
        "paid {} {} to {} from {} *{}",
        proposal.amount,
        proposal.currency,
        proposal.merchant,
        card.bank_name,
        card.card_number
    );

    Ok(CompletedPayment {
        amount: proposal.amount,
        currency: proposal.currency.clone(),
        merchant: proposal.merchant.clone(),
        bank_name: proposal.bank_name.clone(),
        bonus_amount: bonus.amount,
        bonus_partner: bonus.partner,
        timestamp: transaction.created_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::SqliteLedger;

    fn proposal(amount: Decimal, merchant: &str, bank: &str) -> PaymentProposal {
        PaymentProposal {
            amount,
            currency: "AZN".into(),
            merchant: merchant.into(),
            category: "Entertainment".into(),
            bank_name: bank.into(),
        }
    }

    fn awaiting(code: &str, now: Instant) -> PaymentFlow {
        let mut flow = PaymentFlow::propose(
            proposal(Decimal::new(1200, 2), "CinemaPlus", "Kapital Bank"),
            CodePolicy::default(),
        )
        .unwrap();
        flow.confirm_with_code(OneTimeCode::from_digits(code).unwrap(), now)
            .unwrap();
        flow
    }

    fn type_code(flow: &mut PaymentFlow, code: &str, now: Instant) -> Result<bool> {
        for slot in 0..CODE_LEN {
            flow.clear_digit(slot);
        }
        let mut last = Ok(false);
        for (slot, digit) in code.chars().enumerate() {
            last = flow.enter_digit(slot, digit, now);
        }
        last
    }

    #[test]
    fn test_non_positive_amount_is_rejected() {
        for amount in [Decimal::ZERO, Decimal::new(-5, 0)] {
            let err = PaymentFlow::propose(proposal(amount, "Bolt", "ABB"), CodePolicy::default()).unwrap_err();
            assert!(matches!(err, AssistantError::InvalidInput(_)));
        }
    }

    #[test]
    fn test_generated_code_is_four_digits() {
        for _ in 0..100 {
            let code = OneTimeCode::generate();
            assert_eq!(code.as_str().len(), CODE_LEN);
            assert!(OneTimeCode::from_digits(code.as_str()).is_some());
        }
        assert!(OneTimeCode::from_digits("12a4").is_none());
        assert!(OneTimeCode::from_digits("123").is_none());
    }

    #[test]
    fn test_mismatch_keeps_awaiting_code_and_slots() {
        let now = Instant::now();
        let mut flow = awaiting("5678", now);
        let err = type_code(&mut flow, "1234", now).unwrap_err();
        assert!(matches!(err, AssistantError::CodeMismatch { remaining_attempts: 2 }));
        assert_eq!(flow.state(), PaymentState::AwaitingCode);
        assert_eq!(flow.slots(), &[Some(1), Some(2), Some(3), Some(4)]);
    }

    #[test]
    fn test_partial_code_does_not_submit() {
        let now = Instant::now();
        let mut flow = awaiting("5678", now);
        assert!(!type_code(&mut flow, "567", now).unwrap());
        assert_eq!(flow.state(), PaymentState::AwaitingCode);
        assert!(matches!(flow.submit(now), Err(AssistantError::InvalidInput(_))));
    }

    #[test]
    fn test_correcting_a_slot_resubmits() {
        let now = Instant::now();
        let mut flow = awaiting("5678", now);
        assert!(type_code(&mut flow, "5670", now).is_err());
        flow.clear_digit(3);
        assert!(flow.enter_digit(3, '8', now).unwrap());
        assert_eq!(flow.state(), PaymentState::Verifying);
        assert!(flow.code().is_none());
    }

    #[test]
    fn test_attempts_are_capped() {
        let now = Instant::now();
        let mut flow = awaiting("5678", now);
        assert!(type_code(&mut flow, "0000", now).is_err());
        assert!(type_code(&mut flow, "1111", now).is_err());
        let err = type_code(&mut flow, "2222", now).unwrap_err();
        assert!(matches!(err, AssistantError::AttemptsExhausted));
        assert_eq!(
            flow.state(),
            PaymentState::Cancelled(CancelReason::AttemptsExhausted)
        );
        assert!(flow.resend(now).is_err());
    }

    #[test]
    fn test_expiry_cancels_and_resend_recovers() {
        let start = Instant::now();
        let mut flow = awaiting("5678", start);
        assert_eq!(flow.remaining(start), DEFAULT_CODE_TTL);

        let late = start + DEFAULT_CODE_TTL;
        let err = flow.enter_digit(0, '5', late).unwrap_err();
        assert!(matches!(err, AssistantError::CodeExpired));
        assert_eq!(flow.state(), PaymentState::Cancelled(CancelReason::CodeExpired));
        assert_eq!(flow.remaining(late), Duration::ZERO);

        flow.resend_with_code(OneTimeCode::from_digits("4321").unwrap(), late)
            .unwrap();
        assert_eq!(flow.state(), PaymentState::AwaitingCode);
        assert!(type_code(&mut flow, "4321", late).unwrap());
    }

    #[test]
    fn test_cancel_only_before_verification() {
        let now = Instant::now();
        let mut flow = PaymentFlow::propose(proposal(Decimal::ONE, "Bolt", "ABB"), CodePolicy::default()).unwrap();
        flow.cancel().unwrap();
        assert_eq!(flow.state(), PaymentState::Cancelled(CancelReason::UserCancelled));
        assert!(flow.confirm(now).is_err());

        let mut flow = awaiting("5678", now);
        type_code(&mut flow, "5678", now).unwrap();
        assert!(matches!(
            flow.cancel(),
            Err(AssistantError::InvalidTransition { action: "cancel", .. })
        ));
    }

    #[tokio::test]
    async fn test_settle_debits_card_and_records_bonus() {
        let ledger = SqliteLedger::open_in_memory("tester").unwrap();
        ledger.seed_demo_wallet().unwrap();

        let now = Instant::now();
        let mut flow = awaiting("5678", now);
        type_code(&mut flow, "5678", now).unwrap();

        let completed = settle(&mut flow, &ledger, Duration::ZERO).await.unwrap();
        assert_eq!(flow.state(), PaymentState::Completed);
        assert_eq!(completed.bonus_amount, Decimal::new(120, 2));
        assert_eq!(completed.bonus_partner.as_deref(), Some("CinemaPlus"));

        let kapital = ledger
            .cards()
            .unwrap()
            .into_iter()
            .find(|c| c.bank_name == "Kapital Bank")
            .unwrap();
        assert_eq!(kapital.balance, Decimal::new(33800, 2));
        assert_eq!(ledger.bonus_stats().unwrap().total, Decimal::new(120, 2));

        // settling twice is not a thing
        assert!(settle(&mut flow, &ledger, Duration::ZERO).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_settle_waits_out_the_delay_before_debiting() {
        let ledger = SqliteLedger::open_in_memory("tester").unwrap();
        ledger.seed_demo_wallet().unwrap();
        let kapital_balance = |ledger: &SqliteLedger| {
            ledger
                .cards()
                .unwrap()
                .into_iter()
                .find(|c| c.bank_name == "Kapital Bank")
                .unwrap()
                .balance
        };

        let now = Instant::now();
        let mut flow = awaiting("5678", now);
        type_code(&mut flow, "5678", now).unwrap();
        assert_eq!(flow.state(), PaymentState::Verifying);

        let started = tokio::time::Instant::now();
        {
            let settling = settle(&mut flow, &ledger, DEFAULT_SETTLEMENT_DELAY);
            tokio::pin!(settling);

            let early = DEFAULT_SETTLEMENT_DELAY - Duration::from_millis(1);
            assert!(tokio::time::timeout(early, &mut settling).await.is_err());
            assert_eq!(kapital_balance(&ledger), Decimal::new(35000, 2));

            settling.await.unwrap();
        }
        assert!(started.elapsed() >= DEFAULT_SETTLEMENT_DELAY);
        assert_eq!(flow.state(), PaymentState::Completed);
        assert_eq!(kapital_balance(&ledger), Decimal::new(33800, 2));
    }

    #[tokio::test]
    async fn test_settle_without_cards_fails_the_flow() {
        let ledger = SqliteLedger::open_in_memory("tester").unwrap();
        let now = Instant::now();
        let mut flow = awaiting("5678", now);
        type_code(&mut flow, "5678", now).unwrap();

        let err = settle(&mut flow, &ledger, Duration::ZERO).await.unwrap_err();
        assert!(matches!(err, AssistantError::NoCardAvailable));
        assert_eq!(
            flow.state(),
            PaymentState::Cancelled(CancelReason::SettlementFailed)
        );
    }
}
