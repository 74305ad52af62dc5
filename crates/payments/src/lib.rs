//! Wholesale payments domain module.
//!
//! This crate contains the ledger model and the business rules around it
//! (allocation, fees, reconciliation, summaries, submissions and credit),
//! implemented purely as deterministic domain logic (no IO, no HTTP, no storage).

pub mod allocation;
pub mod amount;
pub mod credit;
pub mod fees;
pub mod numbering;
pub mod reconciliation;
pub mod record;
pub mod submission;
pub mod summary;

pub use allocation::{apply_manual, split_even};
pub use amount::{AmountSource, ResolvedAmount, resolve_amount};
pub use credit::{CreditApplication, apply_credit};
pub use fees::{FeeQuote, FeeRule, FeeSchedule, normalize_method};
pub use numbering::{DocNumber, counter_key, invoice_group_id, normalize_prefix, transaction_id};
pub use reconciliation::{compute_balance, prior_receipts, sum_receipts_for_orders, unapplied_credit};
pub use record::{
    AllocationMode, DocStatus, DocType, Documents, LedgerRecord, LineItem, OrderAmount,
    OrderAmounts, ShippingCharge, SupersedeAction,
};
pub use submission::{
    AllocationInput, AssignedIds, LineInput, PaymentDetails, SubmissionPlan, SubmissionPolicy,
    SubmitPayment, check_doc_number_override, check_supersede, plan_submission,
};
pub use summary::{
    DocSummary, GroupSummary, LedgerSummary, SummaryQuery, SummaryScope, SummaryTotals, summarize,
};
