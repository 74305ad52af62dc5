//! Ledger replay: paid-to-date, balances and unapplied credit.
//!
//! Nothing here is stored. Every figure is recomputed from the full list of
//! ledger records, so replaying the same ledger twice always gives the same
//! answer and a voided or replaced document simply drops out of the sums.

use tracing::debug;

use wholesale_core::{CustomerId, Money, SoNumber};

use crate::allocation::split_even;
use crate::record::{DocType, LedgerRecord, OrderAmounts};

/// Paid-to-date for each requested order.
///
/// Only active receipts count. A receipt with stored allocations contributes
/// its share for each requested order. A legacy receipt without allocations is
/// split evenly (net amount, else gross) across its own order list. Every
/// requested order appears in the result, with 0 when nothing was paid.
pub fn sum_receipts_for_orders(records: &[LedgerRecord], orders: &[SoNumber]) -> OrderAmounts {
    let mut paid: OrderAmounts = orders.iter().map(|so| (so.clone(), Money::ZERO)).collect();

    for record in records
        .iter()
        .filter(|r| r.doc_type.is_receipt() && r.is_active())
    {
        if !record.allocations.is_empty() {
            for share in &record.allocations {
                if paid.contains(&share.so) {
                    paid.add(&share.so, share.amount);
                }
            }
            continue;
        }

        let Some(amount) = record.amount_net.or(record.amount_gross) else {
            continue;
        };
        let Ok(shares) = split_even(amount, &record.orders()) else {
            continue;
        };
        for share in &shares {
            if paid.contains(&share.so) {
                paid.add(&share.so, share.amount);
            }
        }
    }

    debug!(orders = paid.len(), records = records.len(), "replayed receipts");
    paid
}

/// `max(0, order_total - paid)` over the given orders.
pub fn compute_balance(
    records: &[LedgerRecord],
    orders: &[SoNumber],
    current_order_total: Money,
) -> Money {
    let paid = sum_receipts_for_orders(records, orders).total();
    (current_order_total - paid).clamp_non_negative()
}

/// Credit issued to a customer and not yet applied, over active records only.
pub fn unapplied_credit(records: &[LedgerRecord], customer_id: &CustomerId) -> Money {
    let mut issued = Money::ZERO;
    let mut applied = Money::ZERO;
    for record in records
        .iter()
        .filter(|r| r.is_active() && &r.customer_id == customer_id)
    {
        let amount = record.amount_gross.unwrap_or(Money::ZERO);
        match record.doc_type {
            DocType::Credit => issued += amount,
            DocType::CreditApplied => applied += amount,
            _ => {}
        }
    }
    (issued - applied).clamp_non_negative()
}

/// Active receipts for a customer that touch any of `orders`, oldest first.
pub fn prior_receipts<'a>(
    records: &'a [LedgerRecord],
    customer_id: &CustomerId,
    orders: &[SoNumber],
) -> Vec<&'a LedgerRecord> {
    let mut out: Vec<&LedgerRecord> = records
        .iter()
        .filter(|r| r.doc_type.is_receipt() && r.is_active())
        .filter(|r| &r.customer_id == customer_id)
        .filter(|r| orders.iter().any(|so| r.touches(so)))
        .collect();
    out.sort_by_key(|r| r.payment_at.or(r.submitted_at));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::DocStatus;
    use proptest::prelude::*;
    use wholesale_core::PaymentId;

    fn so(s: &str) -> SoNumber {
        s.parse().unwrap()
    }

    fn customer() -> CustomerId {
        "ACME".parse().unwrap()
    }

    fn cents(n: i64) -> Money {
        Money::from_cents(n)
    }

    fn receipt(id: &str, orders: &[&str], gross: i64) -> LedgerRecord {
        let orders: Vec<SoNumber> = orders.iter().map(|s| so(s)).collect();
        let mut record = LedgerRecord::new(PaymentId::new(id), DocType::SalesReceipt, customer())
            .with_orders(orders[0].clone(), &orders)
            .with_gross(cents(gross));
        record.allocations = split_even(cents(gross), &orders).unwrap();
        record
    }

    fn credit(id: &str, doc_type: DocType, gross: i64) -> LedgerRecord {
        LedgerRecord::new(PaymentId::new(id), doc_type, customer()).with_gross(cents(gross))
    }

    #[test]
    fn even_receipt_across_three_orders() {
        let records = vec![receipt("PAY-1", &["SO1", "SO2", "SO3"], 50_000)];
        let paid = sum_receipts_for_orders(&records, &[so("SO1"), so("SO2"), so("SO3")]);
        assert_eq!(paid.get(&so("SO1")), Some(cents(16_667)));
        assert_eq!(paid.get(&so("SO2")), Some(cents(16_667)));
        assert_eq!(paid.get(&so("SO3")), Some(cents(16_666)));
    }

    #[test]
    fn unpaid_orders_report_zero() {
        let records = vec![receipt("PAY-1", &["SO1"], 1_000)];
        let paid = sum_receipts_for_orders(&records, &[so("SO1"), so("SO9")]);
        assert_eq!(paid.get(&so("SO9")), Some(Money::ZERO));
    }

    #[test]
    fn void_receipt_contributes_nothing() {
        let mut voided = receipt("PAY-1", &["SO1"], 40_000);
        voided.doc_status = DocStatus::Void;
        let records = vec![voided, receipt("PAY-2", &["SO1"], 10_000)];
        let paid = sum_receipts_for_orders(&records, &[so("SO1")]);
        assert_eq!(paid.get(&so("SO1")), Some(cents(10_000)));
    }

    #[test]
    fn legacy_receipt_without_allocations_splits_net_amount() {
        let mut legacy = receipt("PAY-1", &["SO1", "SO2"], 10_000);
        legacy.allocations = OrderAmounts::new();
        legacy.amount_net = Some(cents(9_001));
        let paid = sum_receipts_for_orders(&[legacy], &[so("SO1"), so("SO2")]);
        assert_eq!(paid.get(&so("SO1")), Some(cents(4_501)));
        assert_eq!(paid.get(&so("SO2")), Some(cents(4_500)));
    }

    #[test]
    fn shares_for_orders_outside_the_query_are_ignored() {
        let mut legacy = receipt("PAY-2", &["SO2", "SO4"], 2_000);
        legacy.allocations = OrderAmounts::new();
        let records = vec![receipt("PAY-1", &["SO1", "SO2", "SO3"], 30_000), legacy];

        let paid = sum_receipts_for_orders(&records, &[so("SO2")]);
        assert_eq!(paid.len(), 1);
        assert_eq!(paid.get(&so("SO2")), Some(cents(11_000)));
        assert_eq!(paid.get(&so("SO1")), None);
    }

    #[test]
    fn invoices_do_not_count_as_payments() {
        let invoice = LedgerRecord::new(PaymentId::new("PAY-1"), DocType::DepositInvoice, customer())
            .with_orders(so("SO1"), &[])
            .with_gross(cents(100_000));
        assert_eq!(compute_balance(&[invoice.clone()], &[so("SO1")], cents(100_000)), cents(100_000));

        let records = vec![invoice, receipt("PAY-2", &["SO1"], 40_000)];
        assert_eq!(compute_balance(&records, &[so("SO1")], cents(100_000)), cents(60_000));
    }

    #[test]
    fn balance_never_goes_negative() {
        let records = vec![receipt("PAY-1", &["SO1"], 150_000)];
        assert_eq!(compute_balance(&records, &[so("SO1")], cents(100_000)), Money::ZERO);
    }

    #[test]
    fn credit_minus_applications() {
        let records = vec![
            credit("CRED-1", DocType::Credit, 15_000),
            credit("CRED-APPLY-1", DocType::CreditApplied, 5_000),
        ];
        assert_eq!(unapplied_credit(&records, &customer()), cents(10_000));
    }

    #[test]
    fn void_credit_contributes_nothing() {
        let mut voided = credit("CRED-1", DocType::Credit, 15_000);
        voided.doc_status = DocStatus::Void;
        let records = vec![voided, credit("CRED-2", DocType::Credit, 2_500)];
        assert_eq!(unapplied_credit(&records, &customer()), cents(2_500));

        let other: CustomerId = "OTHER".parse().unwrap();
        assert_eq!(unapplied_credit(&records, &other), Money::ZERO);
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: replaying the same ledger twice yields identical results.
        #[test]
        fn replay_is_idempotent(amounts in prop::collection::vec((1i64..1_000_000i64, 1usize..4usize), 0..12)) {
            let all = ["SO1", "SO2", "SO3"];
            let records: Vec<LedgerRecord> = amounts
                .iter()
                .enumerate()
                .map(|(i, (amount, n))| receipt(&format!("PAY-{i}"), &all[..*n], *amount))
                .collect();
            let orders: Vec<SoNumber> = all.iter().map(|s| so(s)).collect();

            let first = sum_receipts_for_orders(&records, &orders);
            let second = sum_receipts_for_orders(&records, &orders);
            prop_assert_eq!(&first, &second);

            let total: i64 = amounts.iter().map(|(a, _)| *a).sum();
            prop_assert_eq!(first.total(), cents(total));
        }
    }
}
