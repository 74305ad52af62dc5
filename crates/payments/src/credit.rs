//! Applying a customer's unapplied credit to orders.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use wholesale_core::{CustomerId, DomainError, DomainResult, Money, PaymentId, SoNumber};

use crate::record::{DocType, LedgerRecord, OrderAmounts};
use crate::reconciliation::unapplied_credit;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreditApplication {
    pub so: String,
    #[serde(default)]
    pub amount: Money,
}

/// Build the CREDIT_APPLIED row for `entries` against the ledger.
///
/// Entries with a blank order or a non-positive amount are ignored. The total
/// must not exceed the customer's unapplied credit.
pub fn apply_credit(
    records: &[LedgerRecord],
    customer_id: &CustomerId,
    entries: &[CreditApplication],
    payment_id: PaymentId,
    now: DateTime<Utc>,
) -> DomainResult<LedgerRecord> {
    let mut shares = OrderAmounts::new();
    for entry in entries.iter().filter(|e| e.amount.is_positive()) {
        if let Some(so) = SoNumber::new(&entry.so) {
            shares.add(&so, entry.amount);
        }
    }
    if shares.is_empty() {
        return Err(DomainError::validation("Nothing to apply."));
    }

    let requested = shares.total();
    let available = unapplied_credit(records, customer_id);
    if requested > available {
        debug!(customer = %customer_id, %requested, %available, "credit application exceeds balance");
        return Err(DomainError::validation("Not enough credit."));
    }

    let orders: Vec<SoNumber> = shares.orders().cloned().collect();
    let mut record = LedgerRecord::new(payment_id, DocType::CreditApplied, customer_id.clone())
        .with_orders(orders[0].clone(), &orders)
        .with_gross(requested);
    record.allocations = shares;
    record.submitted_at = Some(now);
    Ok(record)
}
