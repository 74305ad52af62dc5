//! Allocation engine: splitting one payment across several sales orders.

use tracing::{debug, warn};

use wholesale_core::{DomainError, DomainResult, Money, SoNumber};

use crate::record::{OrderAmount, OrderAmounts};

/// Split `amount` evenly across `orders`.
///
/// Each share is `amount / n` rounded to the cent (half away from zero); the
/// remainder lands on the last order so the shares always add up to `amount`.
pub fn split_even(amount: Money, orders: &[SoNumber]) -> DomainResult<OrderAmounts> {
    if orders.is_empty() {
        return Err(DomainError::validation("cannot split a payment across zero orders"));
    }

    let n = orders.len();
    let per = amount.div_round(n as u32);
    let mut shares = OrderAmounts::new();
    for so in &orders[..n - 1] {
        shares.add(so, per);
    }
    let assigned = per.times(n as i64 - 1);
    shares.add(&orders[n - 1], amount - assigned);

    debug!(amount = %amount, orders = n, share = %per, "split payment evenly");
    Ok(shares)
}

/// Apply operator-entered allocations.
///
/// Duplicate entries for the same order collapse, last one wins. The collapsed
/// entries must add up to `amount` exactly. The result lists every target order
/// in target order (0 for orders without an entry); entries for orders outside
/// `targets` are dropped.
pub fn apply_manual(
    amount: Money,
    targets: &[SoNumber],
    entries: &[OrderAmount],
) -> DomainResult<OrderAmounts> {
    let collapsed: OrderAmounts = entries
        .iter()
        .map(|entry| (entry.so.clone(), entry.amount))
        .collect();

    if let Some(negative) = collapsed.iter().find(|entry| entry.amount < Money::ZERO) {
        return Err(DomainError::validation(format!(
            "allocation for {} is negative ({})",
            negative.so, negative.amount
        )));
    }

    let allocated = collapsed.total();
    if allocated != amount {
        return Err(DomainError::allocation_mismatch(amount, allocated));
    }

    let mut result = OrderAmounts::new();
    for so in targets {
        result.set(so.clone(), collapsed.get(so).unwrap_or(Money::ZERO));
    }

    for entry in collapsed.iter().filter(|entry| !result.contains(&entry.so)) {
        warn!(
            so = %entry.so,
            amount = %entry.amount,
            "dropping allocation for an order outside the payment's order list"
        );
    }

    debug!(amount = %amount, orders = result.len(), "applied manual allocation");
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn so(s: &str) -> SoNumber {
        s.parse().unwrap()
    }

    fn orders(n: usize) -> Vec<SoNumber> {
        (1..=n).map(|i| so(&format!("SO{i}"))).collect()
    }

    fn entry(s: &str, amount: &str) -> OrderAmount {
        OrderAmount {
            so: so(s),
            amount: Money::parse(amount).unwrap(),
        }
    }

    fn cents(n: i64) -> Money {
        Money::from_cents(n)
    }

    #[test]
    fn even_split_puts_remainder_on_last_order() {
        let shares = split_even(cents(50_000), &orders(3)).unwrap();
        let amounts: Vec<_> = shares.iter().map(|e| e.amount).collect();
        assert_eq!(amounts, vec![cents(16_667), cents(16_667), cents(16_666)]);
    }

    #[test]
    fn even_split_totals_match_for_fixed_grid() {
        for amount in [1, 10_000, 10_001, 33_333] {
            for n in [1, 2, 3, 7] {
                let shares = split_even(cents(amount), &orders(n)).unwrap();
                assert_eq!(shares.total(), cents(amount), "amount {amount} over {n} orders");
                assert_eq!(shares.len(), n);
            }
        }
    }

    #[test]
    fn even_split_requires_orders() {
        assert!(matches!(
            split_even(cents(100), &[]),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn manual_rejects_one_cent_short() {
        let err = apply_manual(
            cents(10_000),
            &orders(2),
            &[entry("SO1", "50.00"), entry("SO2", "49.99")],
        )
        .unwrap_err();
        assert_eq!(err, DomainError::allocation_mismatch(cents(10_000), cents(9_999)));
    }

    #[test]
    fn manual_accepts_entry_rounded_up_to_amount() {
        let shares = apply_manual(cents(10_000), &orders(1), &[entry("SO1", "99.995")]).unwrap();
        assert_eq!(shares.get(&so("SO1")), Some(cents(10_000)));
    }

    #[test]
    fn manual_last_duplicate_wins_and_absent_targets_get_zero() {
        let shares = apply_manual(
            cents(30_000),
            &orders(3),
            &[entry("SO2", "100"), entry("SO1", "50"), entry("so-2", "250")],
        )
        .unwrap();
        let amounts: Vec<_> = shares.iter().map(|e| (e.so.key().to_string(), e.amount)).collect();
        assert_eq!(
            amounts,
            vec![
                ("SO1".to_string(), cents(5_000)),
                ("SO2".to_string(), cents(25_000)),
                ("SO3".to_string(), Money::ZERO),
            ]
        );
    }

    #[test]
    fn manual_drops_orders_outside_targets() {
        let shares = apply_manual(
            cents(10_000),
            &orders(1),
            &[entry("SO1", "60"), entry("SO9", "40")],
        )
        .unwrap();
        assert_eq!(shares.len(), 1);
        assert_eq!(shares.total(), cents(6_000));
    }

    #[test]
    fn manual_rejects_negative_entries() {
        let err = apply_manual(
            cents(0),
            &orders(2),
            &[entry("SO1", "10"), entry("SO2", "-10")],
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: even splits never create or lose a cent.
        #[test]
        fn even_split_preserves_total(amount in 0i64..100_000_000i64, n in 1usize..25usize) {
            let shares = split_even(cents(amount), &orders(n)).unwrap();
            prop_assert_eq!(shares.total(), cents(amount));
            prop_assert_eq!(shares.len(), n);
        }
    }
}
