//! Per-method payment fees.

use std::collections::BTreeMap;

use rust_decimal::prelude::*;
use serde::{Deserialize, Serialize};

use wholesale_core::{DomainError, DomainResult, Money};

/// Percentage plus flat fee.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FeeRule {
    /// Percent of the gross amount (1.5 = 1.5%).
    #[serde(default)]
    pub pct: f64,
    #[serde(default)]
    pub flat: Money,
}

impl FeeRule {
    pub fn new(pct: f64, flat: Money) -> Self {
        Self { pct, flat }
    }

    /// `round2(amount * pct / 100 + flat)`, rounded once, half away from zero.
    pub fn quote(&self, amount: Money) -> FeeQuote {
        let fee = if amount.is_positive() {
            exact_fee(to_decimal(amount), percent_to_decimal(self.pct), to_decimal(self.flat))
                .map(to_money)
                .unwrap_or(amount)
        } else {
            Money::ZERO
        };
        FeeQuote {
            percent: self.pct,
            flat: self.flat,
            fee,
            net: (amount - fee).clamp_non_negative(),
        }
    }
}

/// Result of a fee calculation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeeQuote {
    pub percent: f64,
    pub flat: Money,
    pub fee: Money,
    pub net: Money,
}

/// Fee rules keyed by normalized payment method, with a default rule.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeeSchedule {
    default: FeeRule,
    rules: BTreeMap<String, FeeRule>,
}

impl FeeSchedule {
    pub fn new(default: FeeRule) -> Self {
        Self {
            default,
            rules: BTreeMap::new(),
        }
    }

    /// Parse `{"default": {"pct": 0, "flat": 0}, "wire": {"pct": 1.5, "flat": 5}}`.
    pub fn from_json(json: &str) -> DomainResult<Self> {
        let raw: BTreeMap<String, FeeRule> = serde_json::from_str(json)
            .map_err(|e| DomainError::validation(format!("fee rules are not valid JSON: {e}")))?;

        let mut schedule = FeeSchedule::default();
        for (method, rule) in raw {
            schedule.set_rule(&method, rule);
        }
        Ok(schedule)
    }

    /// Install a rule; the method `default` replaces the fallback rule.
    pub fn set_rule(&mut self, method: &str, rule: FeeRule) {
        let key = normalize_method(method);
        if key.is_empty() || key == "default" {
            self.default = rule;
        } else {
            self.rules.insert(key, rule);
        }
    }

    pub fn default_rule(&self) -> &FeeRule {
        &self.default
    }

    pub fn rule_for(&self, method: &str) -> &FeeRule {
        self.rules
            .get(&normalize_method(method))
            .unwrap_or(&self.default)
    }

    pub fn calc_fee(&self, method: &str, amount: Money) -> FeeQuote {
        self.rule_for(method).quote(amount)
    }

    pub fn methods(&self) -> impl Iterator<Item = (&str, &FeeRule)> {
        self.rules.iter().map(|(k, v)| (k.as_str(), v))
    }
}

fn exact_fee(amount: Decimal, pct: Decimal, flat: Decimal) -> Option<Decimal> {
    amount
        .checked_mul(pct)?
        .checked_div(Decimal::ONE_HUNDRED)?
        .checked_add(flat)
}

fn to_decimal(money: Money) -> Decimal {
    Decimal::new(money.cents(), 2)
}

/// Parsed from the shortest decimal text of the float, so `2.555` stays `2.555`.
fn percent_to_decimal(pct: f64) -> Decimal {
    pct.to_string().parse().unwrap_or_default()
}

fn to_money(value: Decimal) -> Money {
    let cents = value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero) * Decimal::ONE_HUNDRED;
    Money::from_cents(cents.to_i64().unwrap_or(i64::MAX))
}

/// Lowercase; runs of anything but letters and digits become one space; trimmed.
pub fn normalize_method(method: &str) -> String {
    let mut out = String::with_capacity(method.len());
    let mut pending_space = false;
    for ch in method.chars() {
        if ch.is_alphanumeric() {
            if pending_space && !out.is_empty() {
                out.push(' ');
            }
            pending_space = false;
            out.extend(ch.to_lowercase());
        } else {
            pending_space = true;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wire_schedule() -> FeeSchedule {
        FeeSchedule::from_json(r#"{"default": {"pct": 0, "flat": 0}, "wire": {"pct": 1.5, "flat": 5}}"#)
            .unwrap()
    }

    #[test]
    fn wire_fee_is_percentage_plus_flat() {
        let quote = wire_schedule().calc_fee("Wire", Money::from_cents(100_000));
        assert_eq!(quote.fee, Money::from_cents(2_000));
        assert_eq!(quote.net, Money::from_cents(98_000));
        assert_eq!(quote.percent, 1.5);
        assert_eq!(quote.flat, Money::from_cents(500));
    }

    #[test]
    fn unknown_method_uses_default_rule() {
        let quote = wire_schedule().calc_fee("Carrier Pigeon", Money::from_cents(100_000));
        assert_eq!(quote.fee, Money::ZERO);
        assert_eq!(quote.net, Money::from_cents(100_000));
    }

    #[test]
    fn method_names_are_normalized() {
        assert_eq!(normalize_method("  Credit--Card (Visa) "), "credit card visa");
        let mut schedule = FeeSchedule::default();
        schedule.set_rule("credit card", FeeRule::new(3.0, Money::ZERO));
        let quote = schedule.calc_fee("CREDIT_CARD", Money::from_cents(10_000));
        assert_eq!(quote.fee, Money::from_cents(300));
    }

    #[test]
    fn zero_amount_has_no_fee_and_net_never_negative() {
        let schedule = wire_schedule();
        assert_eq!(schedule.calc_fee("wire", Money::ZERO).fee, Money::ZERO);
        let tiny = schedule.calc_fee("wire", Money::from_cents(100));
        assert_eq!(tiny.fee, Money::from_cents(502));
        assert_eq!(tiny.net, Money::ZERO);
    }

    #[test]
    fn fractional_percentages_are_not_rounded_before_use() {
        let rule = FeeRule::new(2.555, Money::ZERO);
        assert_eq!(rule.quote(Money::from_cents(100_000)).fee, Money::from_cents(2_555));

        // 1234.57 * 2.555% + 0.30 = 31.8432635 -> 31.84
        let rule = FeeRule::new(2.555, Money::from_cents(30));
        assert_eq!(rule.quote(Money::from_cents(123_457)).fee, Money::from_cents(3_184));
    }

    #[test]
    fn fee_rounds_half_away_from_zero_at_the_cent() {
        // 0.10 * 2.5% + 0.10 = 0.1025 -> 0.10; 0.20 * 2.5% = 0.005 -> 0.01
        let rule = FeeRule::new(2.5, Money::from_cents(10));
        assert_eq!(rule.quote(Money::from_cents(10)).fee, Money::from_cents(10));
        let rule = FeeRule::new(2.5, Money::ZERO);
        assert_eq!(rule.quote(Money::from_cents(20)).fee, Money::from_cents(1));
    }

    #[test]
    fn malformed_rules_are_rejected() {
        assert!(FeeSchedule::from_json("{\"wire\": 3}").is_err());
    }
}
