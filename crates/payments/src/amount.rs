//! Resolving the headline amount of a ledger record.
//!
//! Current rows always carry `amount_gross`. Rows written by older versions
//! of the ledger may only have a net amount, a subtotal and shipping, or just
//! line items. Resolution walks a fixed fallback chain and reports which field
//! the figure came from so a summary can show its provenance.

use serde::{Deserialize, Serialize};

use wholesale_core::Money;

use crate::record::LedgerRecord;

/// Field a resolved amount was taken from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AmountSource {
    AmountGross,
    AmountNet,
    LinesSubtotalShipping,
    LinesPlusShipping,
    Lines,
    Default,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedAmount {
    pub amount: Money,
    pub source: AmountSource,
}

impl ResolvedAmount {
    fn new(amount: Money, source: AmountSource) -> Self {
        Self { amount, source }
    }
}

pub fn resolve_amount(record: &LedgerRecord) -> ResolvedAmount {
    let gross = record.amount_gross;
    let net = record.amount_net;
    let non_zero = |m: Option<Money>| m.filter(|m| !m.is_zero());

    if let Some(amount) = non_zero(gross) {
        return ResolvedAmount::new(amount, AmountSource::AmountGross);
    }
    if let Some(amount) = non_zero(net) {
        return ResolvedAmount::new(amount, AmountSource::AmountNet);
    }

    if record.doc_type.is_invoice() {
        let subtotal = record.lines_subtotal;
        let shipping = record.shipping_total;
        let stored = (subtotal.is_some() || shipping.is_some())
            .then(|| subtotal.unwrap_or(Money::ZERO) + shipping.unwrap_or(Money::ZERO));

        if let Some(amount) = non_zero(stored) {
            return ResolvedAmount::new(amount, AmountSource::LinesSubtotalShipping);
        }

        if !record.lines.is_empty() {
            let lines: Money = record.lines.iter().map(|l| l.line_total()).sum();
            let combined = lines + shipping.unwrap_or(Money::ZERO);
            if !combined.is_zero() {
                let source = if shipping.is_some() {
                    AmountSource::LinesPlusShipping
                } else {
                    AmountSource::Lines
                };
                return ResolvedAmount::new(combined, source);
            }
        }

        if let Some(amount) = stored {
            return ResolvedAmount::new(amount, AmountSource::LinesSubtotalShipping);
        }
    }

    if let Some(amount) = gross {
        return ResolvedAmount::new(amount, AmountSource::AmountGross);
    }
    if let Some(amount) = net {
        return ResolvedAmount::new(amount, AmountSource::AmountNet);
    }
    ResolvedAmount::new(Money::ZERO, AmountSource::Default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{DocType, LineItem};
    use wholesale_core::PaymentId;

    fn cents(n: i64) -> Money {
        Money::from_cents(n)
    }

    fn invoice() -> LedgerRecord {
        LedgerRecord::new(PaymentId::new("PAY-1"), DocType::SalesInvoice, "C1".parse().unwrap())
    }

    fn line(total: i64) -> LineItem {
        LineItem {
            so: None,
            description: String::new(),
            quantity: 1,
            unit_amount: cents(total),
            total: None,
        }
    }

    #[test]
    fn gross_wins_when_present() {
        let mut record = invoice();
        record.amount_gross = Some(cents(500));
        record.amount_net = Some(cents(400));
        assert_eq!(resolve_amount(&record), ResolvedAmount::new(cents(500), AmountSource::AmountGross));
    }

    #[test]
    fn zero_gross_falls_through_to_net() {
        let mut record = invoice();
        record.amount_gross = Some(Money::ZERO);
        record.amount_net = Some(cents(400));
        assert_eq!(resolve_amount(&record).source, AmountSource::AmountNet);
    }

    #[test]
    fn legacy_invoice_uses_subtotal_and_shipping() {
        let mut record = invoice();
        record.lines_subtotal = Some(cents(200_000));
        record.shipping_total = Some(cents(5_000));
        assert_eq!(
            resolve_amount(&record),
            ResolvedAmount::new(cents(205_000), AmountSource::LinesSubtotalShipping)
        );
    }

    #[test]
    fn legacy_invoice_sums_lines() {
        let mut record = invoice();
        record.lines = vec![line(1_000), line(2_000)];
        assert_eq!(resolve_amount(&record), ResolvedAmount::new(cents(3_000), AmountSource::Lines));

        record.shipping_total = Some(Money::ZERO);
        record.lines_subtotal = Some(Money::ZERO);
        assert_eq!(resolve_amount(&record).source, AmountSource::LinesPlusShipping);
    }

    #[test]
    fn zero_subtotal_beats_zero_gross() {
        let mut record = invoice();
        record.amount_gross = Some(Money::ZERO);
        record.lines_subtotal = Some(Money::ZERO);
        assert_eq!(resolve_amount(&record).source, AmountSource::LinesSubtotalShipping);
    }

    #[test]
    fn receipts_ignore_lines() {
        let mut record =
            LedgerRecord::new(PaymentId::new("PAY-2"), DocType::SalesReceipt, "C1".parse().unwrap());
        record.lines = vec![line(1_000)];
        assert_eq!(resolve_amount(&record), ResolvedAmount::new(Money::ZERO, AmountSource::Default));
        record.amount_gross = Some(Money::ZERO);
        assert_eq!(resolve_amount(&record).source, AmountSource::AmountGross);
    }
}
