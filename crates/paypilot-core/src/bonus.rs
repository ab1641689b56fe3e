//! Post-payment cashback policy.
//!
//! Rules are checked top to bottom and the first match wins. Bank names are
//! matched case-sensitively by substring, merchant keywords case-insensitively.
//! A bank with no matching rule earns nothing.

use rust_decimal::{Decimal, RoundingStrategy};

#[derive(Debug, Clone, Copy)]
struct BonusRule {
    bank: &'static str,
    /// `None` matches any merchant.
    merchant_keyword: Option<&'static str>,
    percent: u32,
    partner: Option<&'static str>,
}

const RULES: &[BonusRule] = &[
    BonusRule { bank: "Kapital", merchant_keyword: Some("cinema"), percent: 10, partner: Some("CinemaPlus") },
    BonusRule { bank: "Kapital", merchant_keyword: Some("wolt"), percent: 5, partner: Some("Wolt") },
    BonusRule { bank: "Kapital", merchant_keyword: None, percent: 1, partner: None },
    BonusRule { bank: "ABB", merchant_keyword: Some("bolt"), percent: 5, partner: Some("Bolt") },
    BonusRule { bank: "ABB", merchant_keyword: None, percent: 1, partner: None },
];

/// Partner name recorded for flat-rate bonuses.
pub const GENERAL_PARTNER: &str = "General";

#[derive(Debug, Clone, PartialEq)]
pub struct Bonus {
    /// Rounded to two decimal places, half away from zero.
    pub amount: Decimal,
    pub percent: u32,
    pub partner: Option<String>,
}

impl Bonus {
    pub fn none() -> Self {
        Self {
            amount: Decimal::ZERO,
            percent: 0,
            partner: None,
        }
    }

    pub fn is_positive(&self) -> bool {
        self.amount > Decimal::ZERO
    }

    pub fn partner_or_general(&self) -> &str {
        self.partner.as_deref().unwrap_or(GENERAL_PARTNER)
    }
}

impl BonusRule {
    fn matches(&self, bank_name: &str, merchant_lower: &str) -> bool {
        bank_name.contains(self.bank)
            && self
                .merchant_keyword
                .map_or(true, |keyword| merchant_lower.contains(keyword))
    }
}

pub fn compute_bonus(bank_name: &str, merchant: &str, amount: Decimal) -> Bonus {
    let merchant_lower = merchant.to_lowercase();
    let Some(rule) = RULES.iter().find(|r| r.matches(bank_name, &merchant_lower)) else {
        return Bonus::none();
    };

    let amount = (amount * Decimal::new(rule.percent as i64, 2))
        .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    Bonus {
        amount,
        percent: rule.percent,
        partner: rule.partner.map(str::to_string),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kapital_cinema_earns_ten_percent() {
        let bonus = compute_bonus("Kapital Bank", "CinemaPlus", Decimal::new(1200, 2));
        assert_eq!(bonus.amount, Decimal::new(120, 2));
        assert_eq!(bonus.percent, 10);
        assert_eq!(bonus.partner.as_deref(), Some("CinemaPlus"));
        assert_eq!(bonus.amount.to_string(), "1.20");
    }

    #[test]
    fn test_abb_bolt_earns_five_percent() {
        let bonus = compute_bonus("ABB", "Bolt Taxi", Decimal::new(2000, 2));
        assert_eq!(bonus.amount, Decimal::new(100, 2));
        assert_eq!(bonus.partner.as_deref(), Some("Bolt"));
    }

    #[test]
    fn test_unknown_bank_earns_nothing() {
        let bonus = compute_bonus("Leobank", "CinemaPlus", Decimal::new(50, 0));
        assert_eq!(bonus, Bonus::none());
        assert!(!bonus.is_positive());
    }

    #[test]
    fn test_known_bank_other_merchant_is_flat_one_percent() {
        let bonus = compute_bonus("Kapital Bank", "Azercell", Decimal::new(10, 0));
        assert_eq!(bonus.amount, Decimal::new(10, 2));
        assert_eq!(bonus.partner_or_general(), GENERAL_PARTNER);

        let bonus = compute_bonus("ABB", "Wolt", Decimal::new(10, 0));
        assert_eq!(bonus.percent, 1);
    }

    #[test]
    fn test_bank_match_is_case_sensitive() {
        assert_eq!(compute_bonus("kapital", "CinemaPlus", Decimal::new(10, 0)), Bonus::none());
    }

    #[test]
    fn test_rounding_is_half_away_from_zero() {
        // 1% of 0.50 is 0.005, which rounds up to 0.01.
        let bonus = compute_bonus("ABB", "Nar", Decimal::new(50, 2));
        assert_eq!(bonus.amount, Decimal::new(1, 2));
    }
}
