//! Payment service (application-level orchestration).
//!
//! The service composes the ledger, order store, document-number issuer and
//! renderer around the pure planning code in `wholesale-payments`.
//!
//! ## Submission pipeline
//!
//! ```text
//! SubmitPayment
//!   ↓  (submission lock, bounded wait)
//! 1. Prefill line descriptions from the order store
//! 2. Plan: validate, lines, shipping, due date, allocation, fee
//! 3. Scan the ledger; reject conflicting supersedes
//! 4. Check the template, assign ids, issue the doc number
//! 5. Render the document
//! 6. Mark the superseded doc, append the record
//! 7. Refresh order snapshots (best effort)
//! 8. Append an overpayment credit if the receipt was not fully allocated
//! ```
//!
//! Validation, supersede conflicts, doc number collisions, missing templates
//! and lock timeouts are all raised before anything is written. Once the
//! record is appended the submission succeeds: snapshot writeback and
//! overpayment credit failures are logged and reported in the outcome, never
//! rolled back.

use std::collections::HashMap;

use chrono::{NaiveDate, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use wholesale_core::{CustomerId, DomainError, Money, PaymentId, SoNumber};
use wholesale_payments::{
    AssignedIds, CreditApplication, DocType, Documents, FeeQuote, LedgerRecord, LedgerSummary, OrderAmounts,
    SubmitPayment, SummaryQuery, check_doc_number_override, check_supersede, invoice_group_id, plan_submission,
    prior_receipts, sum_receipts_for_orders, summarize, transaction_id, unapplied_credit,
};

use crate::config::{ConfigError, Settings};
use crate::ledger_store::{LedgerStore, StoreError};
use crate::lock::{BoundedLock, LockTimeout};
use crate::orders::{OrderSnapshot, OrderStore, ReconcileReport, Reconciler, WritebackFailure};
use crate::renderer::{DocumentModel, DocumentRenderer, RenderError};
use crate::sequence::{CounterStore, DocNumberIssuer, IssueError};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error(transparent)]
    ConcurrencyTimeout(#[from] LockTimeout),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Render(#[from] RenderError),
}

impl From<IssueError> for ServiceError {
    fn from(value: IssueError) -> Self {
        match value {
            IssueError::Timeout(timeout) => ServiceError::ConcurrencyTimeout(timeout),
            IssueError::Store(err) => ServiceError::Store(err),
        }
    }
}

impl From<ConfigError> for ServiceError {
    fn from(value: ConfigError) -> Self {
        ServiceError::Configuration(value.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreditIssued {
    pub payment_id: PaymentId,
    pub amount: Money,
}

/// Result of a successful submission.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubmissionOutcome {
    pub doc_type: DocType,
    pub payment_id: PaymentId,
    pub transaction_id: String,
    pub invoice_group_id: Option<String>,
    pub doc_number: String,
    pub doc_url: Option<String>,
    pub pdf_url: Option<String>,
    pub allocations: OrderAmounts,
    pub fee: Option<FeeQuote>,
    pub overage_credit: Option<CreditIssued>,
    pub overage_credit_failure: Option<OverageCreditFailure>,
    pub writeback_failures: Vec<WritebackFailure>,
}

/// An overpayment credit that could not be appended after its receipt was.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverageCreditFailure {
    pub amount: Money,
    pub error: String,
}

pub struct PaymentService<L, O, C, R> {
    ledger: L,
    orders: O,
    issuer: DocNumberIssuer<C>,
    renderer: R,
    settings: Settings,
    submit_lock: BoundedLock,
}

impl<L, O, C, R> PaymentService<L, O, C, R>
where
    L: LedgerStore,
    O: OrderStore,
    C: CounterStore,
    R: DocumentRenderer,
{
    pub fn new(ledger: L, orders: O, counters: C, renderer: R, settings: Settings) -> Self {
        Self {
            ledger,
            orders,
            issuer: DocNumberIssuer::new(counters, settings.sequence_lock_wait),
            renderer,
            submit_lock: BoundedLock::new("submission", settings.submit_lock_wait),
            settings,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    pub fn orders(&self) -> &O {
        &self.orders
    }

    /// Issue one document and append it to the ledger.
    pub fn submit(&self, request: &SubmitPayment) -> Result<SubmissionOutcome, ServiceError> {
        let _guard = self.submit_lock.acquire()?;
        let now = Utc::now();
        let today = now.date_naive();

        let descriptions = self.descriptions(&request.orders_needing_descriptions());
        let plan = plan_submission(request, &self.settings.policy, &self.settings.fees, &descriptions, today)?;

        let records = self.ledger.scan()?;
        if let Some((doc, _)) = &plan.supersede {
            check_supersede(&records, doc)?;
        }
        if let Some(doc_number) = &plan.doc_number_override {
            let superseding = plan.supersede.as_ref().map(|(doc, _)| doc.as_str());
            check_doc_number_override(&records, doc_number, superseding)?;
        }

        let template = if self.settings.docs_enabled {
            let template = self.settings.template_for(plan.doc_type).ok_or_else(|| {
                ServiceError::Configuration(format!(
                    "no document template configured for {} (set {})",
                    plan.doc_type.label(),
                    Settings::template_key(plan.doc_type)
                ))
            })?;
            Some(template.to_string())
        } else {
            None
        };

        let ids = AssignedIds {
            payment_id: PaymentId::payment(),
            transaction_id: transaction_id(&plan.customer_id, now),
            invoice_group_id: plan
                .is_multi_order()
                .then(|| invoice_group_id(&plan.customer_id, today)),
            doc_number: match &plan.doc_number_override {
                Some(doc_number) => doc_number.clone(),
                None => self.issuer.issue(&self.settings.doc_prefix, today)?,
            },
        };

        let documents = match &template {
            Some(template) => {
                let paid_to_date = sum_receipts_for_orders(&records, &plan.orders).total();
                let history = prior_receipts(&records, &plan.customer_id, &plan.orders);
                let model = DocumentModel::from_plan(
                    &plan,
                    &ids.doc_number,
                    &ids.transaction_id,
                    ids.invoice_group_id.as_deref(),
                    paid_to_date,
                    &history,
                );
                let rendered = self.renderer.render(template, &model)?;
                Documents {
                    doc_url: rendered.doc_url,
                    pdf_url: rendered.pdf_url,
                }
            }
            None => Documents::default(),
        };

        if let Some((doc, action)) = &plan.supersede {
            let touched = self.ledger.mark_status(doc, action.target_status())?;
            info!(superseded = %doc, action = action.as_str(), rows = touched, "document superseded");
        }

        let record = plan.record(&ids, documents, now);
        let outcome_docs = record.documents.clone();
        self.ledger.append(record)?;

        let writeback_failures = if plan.doc_type.is_receipt() {
            self.refresh_snapshots(&plan.orders)
        } else {
            Vec::new()
        };

        let mut overage_credit_failure = None;
        let overage_credit = match plan.overage_credit(&ids, PaymentId::credit(), now) {
            Some(credit) => {
                let issued = CreditIssued {
                    payment_id: credit.payment_id.clone(),
                    amount: plan.overage,
                };
                match self.ledger.append(credit) {
                    Ok(()) => {
                        info!(customer = %plan.customer_id, amount = %plan.overage, "overpayment credit issued");
                        Some(issued)
                    }
                    Err(e) => {
                        warn!(
                            customer = %plan.customer_id,
                            amount = %plan.overage,
                            payment_id = %ids.payment_id,
                            error = %e,
                            "overpayment credit not recorded; receipt kept"
                        );
                        overage_credit_failure = Some(OverageCreditFailure {
                            amount: plan.overage,
                            error: e.to_string(),
                        });
                        None
                    }
                }
            }
            None => None,
        };

        info!(
            doc_type = %plan.doc_type,
            doc_number = %ids.doc_number,
            payment_id = %ids.payment_id,
            customer = %plan.customer_id,
            orders = plan.orders.len(),
            "payment submitted"
        );

        Ok(SubmissionOutcome {
            doc_type: plan.doc_type,
            payment_id: ids.payment_id,
            transaction_id: ids.transaction_id,
            invoice_group_id: ids.invoice_group_id,
            doc_number: ids.doc_number,
            doc_url: outcome_docs.doc_url,
            pdf_url: outcome_docs.pdf_url,
            allocations: plan.allocations,
            fee: plan.fee,
            overage_credit,
            overage_credit_failure,
            writeback_failures,
        })
    }

    /// Product descriptions for line prefill. Lookup failures only lose the prefill.
    fn descriptions(&self, orders: &[SoNumber]) -> HashMap<SoNumber, String> {
        let mut out = HashMap::new();
        for so in orders {
            match self.orders.find(so) {
                Ok(Some(snapshot)) if !snapshot.product_description.is_empty() => {
                    out.insert(so.clone(), snapshot.product_description);
                }
                Ok(_) => {}
                Err(e) => warn!(so = %so, error = %e, "order lookup failed; line description left blank"),
            }
        }
        out
    }

    fn refresh_snapshots(&self, orders: &[SoNumber]) -> Vec<WritebackFailure> {
        match Reconciler::new(&self.ledger, &self.orders).refresh(orders) {
            Ok(report) => report.failed,
            Err(e) => {
                warn!(error = %e, "ledger rescan failed; order snapshots not refreshed");
                orders
                    .iter()
                    .map(|so| WritebackFailure {
                        so: so.to_string(),
                        error: e.to_string(),
                    })
                    .collect()
            }
        }
    }

    /// Apply unapplied customer credit to orders.
    pub fn apply_credit(
        &self,
        customer_id: &str,
        entries: &[CreditApplication],
    ) -> Result<LedgerRecord, ServiceError> {
        let customer_id = parse_customer(customer_id)?;
        let _guard = self.submit_lock.acquire()?;

        let records = self.ledger.scan()?;
        let record = wholesale_payments::apply_credit(
            &records,
            &customer_id,
            entries,
            PaymentId::credit_application(),
            Utc::now(),
        )?;
        self.ledger.append(record.clone())?;
        info!(customer = %customer_id, amount = ?record.amount_gross, "credit applied");
        Ok(record)
    }

    pub fn summary(&self, query: &SummaryQuery) -> Result<LedgerSummary, ServiceError> {
        self.summary_as_of(query, Utc::now().date_naive())
    }

    pub fn summary_as_of(&self, query: &SummaryQuery, today: NaiveDate) -> Result<LedgerSummary, ServiceError> {
        let records = self.ledger.scan()?;
        Ok(summarize(&records, query, today)?)
    }

    /// Replayed paid-to-date per order.
    pub fn paid_to_date(&self, orders: &[String]) -> Result<OrderAmounts, ServiceError> {
        let orders = parse_orders(orders)?;
        let records = self.ledger.scan()?;
        Ok(sum_receipts_for_orders(&records, &orders))
    }

    /// Rewrite drifted order snapshots. Reads take no submission lock.
    pub fn reconcile(&self, orders: &[String]) -> Result<ReconcileReport, ServiceError> {
        let orders = parse_orders(orders)?;
        Ok(Reconciler::new(&self.ledger, &self.orders).refresh(&orders)?)
    }

    pub fn unapplied_credit(&self, customer_id: &str) -> Result<Money, ServiceError> {
        let customer_id = parse_customer(customer_id)?;
        let records = self.ledger.scan()?;
        Ok(unapplied_credit(&records, &customer_id))
    }

    pub fn list_orders(&self, customer_id: &str, limit: usize) -> Result<Vec<OrderSnapshot>, ServiceError> {
        let customer_id = parse_customer(customer_id)?;
        Ok(self.orders.list_for_customer(&customer_id, limit)?)
    }

    /// Issue a number outside a submission (e.g. for a manual document).
    pub fn issue_doc_number(&self, prefix: Option<&str>, date: Option<NaiveDate>) -> Result<String, ServiceError> {
        let prefix = prefix
            .filter(|p| !p.trim().is_empty())
            .unwrap_or(&self.settings.doc_prefix);
        let date = date.unwrap_or_else(|| Utc::now().date_naive());
        Ok(self.issuer.issue(prefix, date)?)
    }

    pub fn quote_fee(&self, method: &str, amount: Money) -> FeeQuote {
        self.settings.fees.calc_fee(method, amount)
    }
}

fn parse_customer(raw: &str) -> Result<CustomerId, ServiceError> {
    CustomerId::new(raw).ok_or_else(|| DomainError::validation("customer id is required").into())
}

fn parse_orders(raw: &[String]) -> Result<Vec<SoNumber>, ServiceError> {
    let mut orders: Vec<SoNumber> = Vec::new();
    for so in raw.iter().filter_map(SoNumber::new) {
        if !orders.contains(&so) {
            orders.push(so);
        }
    }
    if orders.is_empty() {
        return Err(DomainError::validation("provide at least one order number").into());
    }
    Ok(orders)
}
