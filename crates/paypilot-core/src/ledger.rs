//! Wallet and ledger access.
//!
//! The assistant core only reads cards and writes payment, bonus and chat
//! records through the [`Ledger`] trait; balances are the ledger's business.
//! [`SqliteLedger`] is the local store used by the terminal front end and
//! by tests.

use std::path::Path;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Local, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, Row};
use rust_decimal::Decimal;

use crate::error::{AssistantError, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct CardIdentity {
    pub id: i64,
    pub bank_name: String,
    /// Last four digits only.
    pub card_number: String,
    pub balance: Decimal,
    pub is_favorite: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionStatus {
    Success,
    /// Refused for insufficient funds. Nothing was debited.
    Failed,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Success => "Success",
            TransactionStatus::Failed => "Failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "Success" => Some(TransactionStatus::Success),
            "Failed" => Some(TransactionStatus::Failed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Transaction {
    pub id: i64,
    pub card_id: i64,
    pub amount: Decimal,
    pub merchant_name: String,
    pub category: String,
    pub status: TransactionStatus,
    pub created_at: DateTime<Utc>,
}

/// A settled payment to be written to the ledger.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentRecord {
    pub card_id: i64,
    pub amount: Decimal,
    pub merchant: String,
    pub category: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BonusRecord {
    pub partner_name: String,
    pub amount: Decimal,
    pub card_name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BonusStats {
    pub total: Decimal,
    pub today: Decimal,
}

pub trait Ledger: Send + Sync {
    /// Favorites first, then newest first.
    fn cards(&self) -> Result<Vec<CardIdentity>>;
    /// Newest first.
    fn transactions(&self) -> Result<Vec<Transaction>>;
    /// Record the payment and debit the card atomically.
    fn record_payment(&self, payment: &PaymentRecord) -> Result<Transaction>;
    fn record_bonus(&self, bonus: &BonusRecord) -> Result<()>;
    fn bonus_stats(&self) -> Result<BonusStats>;
    fn save_chat_message(&self, text: &str, is_bot: bool) -> Result<()>;
}

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS cards (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id TEXT NOT NULL,
    bank_name TEXT NOT NULL,
    card_number TEXT NOT NULL,
    balance TEXT NOT NULL,
    is_favorite INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS transactions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id TEXT NOT NULL,
    card_id INTEGER NOT NULL REFERENCES cards(id),
    amount TEXT NOT NULL,
    merchant_name TEXT NOT NULL,
    category TEXT NOT NULL,
    status TEXT NOT NULL,
    created_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS bonuses (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id TEXT NOT NULL,
    partner_name TEXT NOT NULL,
    amount TEXT NOT NULL,
    card_name TEXT,
    created_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS messages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id TEXT NOT NULL,
    text TEXT NOT NULL,
    is_bot INTEGER NOT NULL,
    created_at TEXT NOT NULL
);
"#;

/// Cards seeded into an empty wallet: (bank, last four, balance in cents, favorite).
const DEMO_WALLET: &[(&str, &str, i64, bool)] = &[
    ("Kapital Bank", "4417", 35000, true),
    ("ABB", "5103", 85050, false),
    ("Leobank", "2290", 12000, false),
];

pub struct SqliteLedger {
    conn: Mutex<Connection>,
    user_id: String,
}

impl SqliteLedger {
    pub fn open(path: &Path, user_id: &str) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| AssistantError::Ledger(format!("cannot create {}: {e}", parent.display())))?;
        }
        Self::init(Connection::open(path)?, user_id)
    }

    pub fn open_in_memory(user_id: &str) -> Result<Self> {
        Self::init(Connection::open_in_memory()?, user_id)
    }

    fn init(conn: Connection, user_id: &str) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
            user_id: user_id.to_string(),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| AssistantError::Ledger("connection lock poisoned".into()))
    }

    /// Seed the demo wallet if this user has no cards. Returns whether it did.
    pub fn seed_demo_wallet(&self) -> Result<bool> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM cards WHERE user_id = ?1",
            params![self.user_id],
            |row| row.get(0),
        )?;
        if count > 0 {
            return Ok(false);
        }

        let now = Utc::now().to_rfc3339();
        for (bank, last4, cents, favorite) in DEMO_WALLET {
            conn.execute(
                "INSERT INTO cards (user_id, bank_name, card_number, balance, is_favorite, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    self.user_id,
                    bank,
                    last4,
                    Decimal::new(*cents, 2).to_string(),
                    *favorite,
                    now
                ],
            )?;
        }
        log::info!("seeded demo wallet for {}", self.user_id);
        Ok(true)
    }

    fn map_card_row(row: &Row<'_>) -> rusqlite::Result<CardIdentity> {
        Ok(CardIdentity {
            id: row.get(0)?,
            bank_name: row.get(1)?,
            card_number: row.get(2)?,
            balance: decimal_column(row, 3)?,
            is_favorite: row.get(4)?,
        })
    }

    fn map_transaction_row(row: &Row<'_>) -> rusqlite::Result<Transaction> {
        let status: String = row.get(5)?;
        Ok(Transaction {
            id: row.get(0)?,
            card_id: row.get(1)?,
            amount: decimal_column(row, 2)?,
            merchant_name: row.get(3)?,
            category: row.get(4)?,
            status: TransactionStatus::from_str(&status).ok_or_else(|| {
                rusqlite::Error::FromSqlConversionFailure(
                    5,
                    Type::Text,
                    format!("unknown transaction status {status:?}").into(),
                )
            })?,
            created_at: timestamp_column(row, 6)?,
        })
    }
}

impl Ledger for SqliteLedger {
    fn cards(&self) -> Result<Vec<CardIdentity>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, bank_name, card_number, balance, is_favorite FROM cards
             WHERE user_id = ?1
             ORDER BY is_favorite DESC, created_at DESC, id DESC",
        )?;
        let rows = stmt.query_map(params![self.user_id], Self::map_card_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn transactions(&self) -> Result<Vec<Transaction>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, card_id, amount, merchant_name, category, status, created_at FROM transactions
             WHERE user_id = ?1
             ORDER BY created_at DESC, id DESC",
        )?;
        let rows = stmt.query_map(params![self.user_id], Self::map_transaction_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn record_payment(&self, payment: &PaymentRecord) -> Result<Transaction> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let balance: String = tx.query_row(
            "SELECT balance FROM cards WHERE id = ?1 AND user_id = ?2",
            params![payment.card_id, self.user_id],
            |row| row.get(0),
        )?;
        let balance = Decimal::from_str(&balance)
            .map_err(|e| AssistantError::Ledger(format!("corrupt balance {balance:?}: {e}")))?;
        let created_at = Utc::now();
        let insert_transaction = |status: TransactionStatus| {
            tx.execute(
                "INSERT INTO transactions (user_id, card_id, amount, merchant_name, category, status, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    self.user_id,
                    payment.card_id,
                    payment.amount.to_string(),
                    payment.merchant,
                    payment.category,
                    status.as_str(),
                    created_at.to_rfc3339()
                ],
            )
        };

        if balance < payment.amount {
            insert_transaction(TransactionStatus::Failed)?;
            tx.commit()?;
            log::warn!("refused {} {} on card {}", payment.amount, payment.merchant, payment.card_id);
            return Err(AssistantError::Ledger(format!(
                "insufficient funds: balance {balance}, payment {}",
                payment.amount
            )));
        }

        tx.execute(
            "UPDATE cards SET balance = ?1 WHERE id = ?2",
            params![(balance - payment.amount).to_string(), payment.card_id],
        )?;
        insert_transaction(TransactionStatus::Success)?;
        let id = tx.last_insert_rowid();
        tx.commit()?;

        Ok(Transaction {
            id,
            card_id: payment.card_id,
            amount: payment.amount,
            merchant_name: payment.merchant.clone(),
            category: payment.category.clone(),
            status: TransactionStatus::Success,
            created_at,
        })
    }

    fn record_bonus(&self, bonus: &BonusRecord) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO bonuses (user_id, partner_name, amount, card_name, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                self.user_id,
                bonus.partner_name,
                bonus.amount.to_string(),
                bonus.card_name,
                Utc::now().to_rfc3339()
            ],
        )?;
        Ok(())
    }

    fn bonus_stats(&self) -> Result<BonusStats> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT amount, created_at FROM bonuses WHERE user_id = ?1")?;
        let rows = stmt.query_map(params![self.user_id], |row| {
            Ok((decimal_column(row, 0)?, timestamp_column(row, 1)?))
        })?;

        let today = Local::now().date_naive();
        let mut stats = BonusStats::default();
        for row in rows {
            let (amount, created_at) = row?;
            stats.total += amount;
            if created_at.with_timezone(&Local).date_naive() == today {
                stats.today += amount;
            }
        }
        Ok(stats)
    }

    fn save_chat_message(&self, text: &str, is_bot: bool) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO messages (user_id, text, is_bot, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![self.user_id, text, is_bot, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }
}

fn decimal_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Decimal> {
    let text: String = row.get(idx)?;
    Decimal::from_str(&text)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn timestamp_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let text: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&text)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded() -> SqliteLedger {
        let ledger = SqliteLedger::open_in_memory("tester").unwrap();
        assert!(ledger.seed_demo_wallet().unwrap());
        ledger
    }

    #[test]
    fn test_seed_is_idempotent_and_favorite_first() {
        let ledger = seeded();
        assert!(!ledger.seed_demo_wallet().unwrap());

        let cards = ledger.cards().unwrap();
        assert_eq!(cards.len(), 3);
        assert_eq!(cards[0].bank_name, "Kapital Bank");
        assert_eq!(cards[0].balance, Decimal::new(35000, 2));
    }

    #[test]
    fn test_record_payment_debits_card() {
        let ledger = seeded();
        let abb = ledger
            .cards()
            .unwrap()
            .into_iter()
            .find(|c| c.bank_name == "ABB")
            .unwrap();

        let tx = ledger
            .record_payment(&PaymentRecord {
                card_id: abb.id,
                amount: Decimal::new(2000, 2),
                merchant: "Bolt Taxi".into(),
                category: "Transport".into(),
            })
            .unwrap();
        assert_eq!(tx.status, TransactionStatus::Success);

        let abb_after = ledger.cards().unwrap().into_iter().find(|c| c.id == abb.id).unwrap();
        assert_eq!(abb_after.balance, Decimal::new(83050, 2));

        let history = ledger.transactions().unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].merchant_name, "Bolt Taxi");
    }

    #[test]
    fn test_insufficient_funds_leaves_balance_untouched() {
        let ledger = seeded();
        let leo = ledger
            .cards()
            .unwrap()
            .into_iter()
            .find(|c| c.bank_name == "Leobank")
            .unwrap();
        let err = ledger
            .record_payment(&PaymentRecord {
                card_id: leo.id,
                amount: Decimal::new(500, 0),
                merchant: "Kontakt Home".into(),
                category: "Electronics".into(),
            })
            .unwrap_err();
        assert!(matches!(err, AssistantError::Ledger(_)));
        let history = ledger.transactions().unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].status, TransactionStatus::Failed);
        assert_eq!(history[0].merchant_name, "Kontakt Home");
        let leo_after = ledger.cards().unwrap().into_iter().find(|c| c.id == leo.id).unwrap();
        assert_eq!(leo_after.balance, leo.balance);
    }

    #[test]
    fn test_bonus_stats_sum_today_and_total() {
        let ledger = seeded();
        for cents in [120, 100] {
            ledger
                .record_bonus(&BonusRecord {
                    partner_name: "CinemaPlus".into(),
                    amount: Decimal::new(cents, 2),
                    card_name: Some("Kapital Bank".into()),
                })
                .unwrap();
        }
        let stats = ledger.bonus_stats().unwrap();
        assert_eq!(stats.total, Decimal::new(220, 2));
        assert_eq!(stats.today, Decimal::new(220, 2));
    }

    #[test]
    fn test_users_do_not_see_each_others_cards() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wallet.db");
        let alice = SqliteLedger::open(&path, "alice").unwrap();
        alice.seed_demo_wallet().unwrap();
        let bob = SqliteLedger::open(&path, "bob").unwrap();
        assert!(bob.cards().unwrap().is_empty());
        assert!(bob.seed_demo_wallet().unwrap());

        let alice_ids: Vec<i64> = alice.cards().unwrap().iter().map(|c| c.id).collect();
        let bob_cards = bob.cards().unwrap();
        assert_eq!(bob_cards.len(), 3);
        assert!(bob_cards.iter().all(|c| !alice_ids.contains(&c.id)));
    }

    #[test]
    fn test_chat_messages_are_persisted() {
        let ledger = seeded();
        ledger.save_chat_message("Azercell 10 AZN", false).unwrap();
        ledger.save_chat_message("Təsdiqləyək?", true).unwrap();
        let conn = ledger.lock().unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM messages WHERE is_bot = 1", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }
}
