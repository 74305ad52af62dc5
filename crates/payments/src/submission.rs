//! Payment submission: validating an operator's request and planning the
//! ledger rows it produces.
//!
//! Planning is pure. The infra service wraps it with the submission lock,
//! document-number issuance, rendering and the ledger append.

use std::collections::HashMap;

use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use wholesale_core::{CustomerId, DomainError, DomainResult, Money, PaymentId, SoNumber};

use crate::allocation::{apply_manual, split_even};
use crate::fees::{FeeQuote, FeeSchedule};
use crate::record::{
    AllocationMode, DocStatus, DocType, Documents, LedgerRecord, LineItem, OrderAmount,
    OrderAmounts, ShippingCharge, SupersedeAction, order_list,
};

/// Payment block of a submission.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PaymentDetails {
    #[serde(default)]
    pub amount: Money,
    #[serde(default)]
    pub method: String,
    #[serde(default)]
    pub reference: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub paid_at: Option<DateTime<Utc>>,
}

/// Line as entered; a missing order defaults to the primary order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LineInput {
    #[serde(default)]
    pub so: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub quantity: i64,
    #[serde(default)]
    pub unit_amount: Money,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationInput {
    pub so: String,
    #[serde(default)]
    pub amount: Money,
}

fn default_true() -> bool {
    true
}

/// Request to issue one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitPayment {
    pub doc_type: DocType,
    pub customer_id: String,
    #[serde(default)]
    pub company_name: String,
    #[serde(default)]
    pub contact_name: String,
    #[serde(default)]
    pub address: String,
    pub primary_so: String,
    #[serde(default)]
    pub so_list: Vec<String>,
    #[serde(default)]
    pub doc_date: Option<NaiveDate>,
    #[serde(default)]
    pub include_due_date: bool,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub lines: Vec<LineInput>,
    #[serde(default)]
    pub add_shipping: bool,
    #[serde(default)]
    pub shipping: Vec<ShippingCharge>,
    #[serde(default)]
    pub payment: PaymentDetails,
    #[serde(default = "default_true")]
    pub even_split: bool,
    #[serde(default)]
    pub allocations: Vec<AllocationInput>,
    #[serde(default)]
    pub doc_number_override: Option<String>,
    #[serde(default)]
    pub supersedes_doc_number: Option<String>,
    #[serde(default)]
    pub supersede_action: Option<SupersedeAction>,
    #[serde(default)]
    pub tracker_url: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub submitted_by: Option<String>,
}

impl SubmitPayment {
    /// Minimal request; the remaining fields take their defaults.
    pub fn new(
        doc_type: DocType,
        customer_id: impl Into<String>,
        primary_so: impl Into<String>,
        so_list: &[&str],
    ) -> Self {
        Self {
            doc_type,
            customer_id: customer_id.into(),
            company_name: String::new(),
            contact_name: String::new(),
            address: String::new(),
            primary_so: primary_so.into(),
            so_list: so_list.iter().map(|s| s.to_string()).collect(),
            doc_date: None,
            include_due_date: false,
            due_date: None,
            lines: Vec::new(),
            add_shipping: false,
            shipping: Vec::new(),
            payment: PaymentDetails::default(),
            even_split: true,
            allocations: Vec::new(),
            doc_number_override: None,
            supersedes_doc_number: None,
            supersede_action: None,
            tracker_url: None,
            notes: None,
            submitted_by: None,
        }
    }

    /// Order numbers to look up product descriptions for (blank lines only).
    pub fn orders_needing_descriptions(&self) -> Vec<SoNumber> {
        if !self.lines.is_empty() {
            return Vec::new();
        }
        let entered: Vec<SoNumber> = self.so_list.iter().filter_map(SoNumber::new).collect();
        match SoNumber::new(&self.primary_so) {
            Some(primary) => order_list(&primary, &entered),
            None => entered,
        }
    }
}

/// Business defaults that shape a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmissionPolicy {
    pub ship_per_order: Money,
    pub ship_threshold: Money,
    pub due_days: u64,
}

impl Default for SubmissionPolicy {
    fn default() -> Self {
        Self {
            ship_per_order: Money::from_cents(5_000),
            ship_threshold: Money::from_cents(200_000),
            due_days: 2,
        }
    }
}

/// Validated submission, ready for ids and rendering.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmissionPlan {
    pub doc_type: DocType,
    pub customer_id: CustomerId,
    pub company_name: String,
    pub contact_name: String,
    pub address: String,
    pub primary_so: SoNumber,
    pub orders: Vec<SoNumber>,
    pub doc_date: NaiveDate,
    pub due_date: Option<NaiveDate>,
    pub lines: Vec<LineItem>,
    pub lines_subtotal: Money,
    pub shipping: Vec<ShippingCharge>,
    pub shipping_total: Money,
    pub payment: PaymentDetails,
    pub allocation_mode: Option<AllocationMode>,
    pub allocations: OrderAmounts,
    pub fee: Option<FeeQuote>,
    pub overage: Money,
    pub supersede: Option<(String, SupersedeAction)>,
    pub doc_number_override: Option<String>,
    pub tracker_url: Option<String>,
    pub notes: Option<String>,
    pub submitted_by: Option<String>,
}

/// Ids assigned to a planned document just before it is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssignedIds {
    pub payment_id: PaymentId,
    pub transaction_id: String,
    pub invoice_group_id: Option<String>,
    pub doc_number: String,
}

fn trimmed(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Validate `request` and work out lines, shipping, allocation and fees.
///
/// `descriptions` maps orders to product descriptions and is only used when
/// the request carries no lines.
pub fn plan_submission(
    request: &SubmitPayment,
    policy: &SubmissionPolicy,
    fees: &FeeSchedule,
    descriptions: &HashMap<SoNumber, String>,
    today: NaiveDate,
) -> DomainResult<SubmissionPlan> {
    let doc_type = request.doc_type;
    if !DocType::SUBMITTABLE.contains(&doc_type) {
        return Err(DomainError::validation(format!(
            "{doc_type} documents cannot be submitted directly"
        )));
    }

    let customer_id = CustomerId::new(&request.customer_id)
        .ok_or_else(|| DomainError::validation("customer id is required"))?;
    let primary_so = SoNumber::new(&request.primary_so)
        .ok_or_else(|| DomainError::validation("primary order is required"))?;

    let entered: Vec<SoNumber> = request.so_list.iter().filter_map(SoNumber::new).collect();
    if entered.is_empty() {
        return Err(DomainError::validation("select at least one order"));
    }
    let orders = order_list(&primary_so, &entered);

    let amount = request.payment.amount;
    if doc_type.is_receipt() && !amount.is_positive() {
        return Err(DomainError::validation("payment amount is required for receipts"));
    }

    let doc_date = request.doc_date.unwrap_or(today);
    let due_date = if doc_type.is_invoice() && request.include_due_date {
        match request.due_date {
            Some(due) => Some(due),
            None => Some(
                doc_date
                    .checked_add_days(Days::new(policy.due_days))
                    .ok_or_else(|| DomainError::validation("due date is out of range"))?,
            ),
        }
    } else {
        None
    };

    let lines: Vec<LineItem> = if request.lines.is_empty() {
        orders
            .iter()
            .map(|so| LineItem {
                so: Some(so.clone()),
                description: descriptions.get(so).cloned().unwrap_or_default(),
                quantity: 1,
                unit_amount: Money::ZERO,
                total: None,
            })
            .collect()
    } else {
        request
            .lines
            .iter()
            .map(|line| LineItem {
                so: Some(
                    line.so
                        .as_deref()
                        .and_then(SoNumber::new)
                        .unwrap_or_else(|| primary_so.clone()),
                ),
                description: line.description.trim().to_string(),
                quantity: line.quantity,
                unit_amount: line.unit_amount,
                total: None,
            })
            .collect()
    };
    let lines_subtotal: Money = lines.iter().map(LineItem::line_total).sum();

    let shipping = if doc_type == DocType::SalesInvoice && request.add_shipping {
        if !request.shipping.is_empty() {
            request
                .shipping
                .iter()
                .map(|s| ShippingCharge {
                    label: if s.label.trim().is_empty() {
                        "Shipping".to_string()
                    } else {
                        s.label.trim().to_string()
                    },
                    amount: s.amount,
                })
                .collect()
        } else {
            let default = policy.ship_per_order.times(orders.len() as i64);
            if lines_subtotal < policy.ship_threshold && default.is_positive() {
                vec![ShippingCharge {
                    label: "Shipping".to_string(),
                    amount: default,
                }]
            } else {
                Vec::new()
            }
        }
    } else {
        Vec::new()
    };
    let shipping_total: Money = shipping.iter().map(|s| s.amount).sum();

    let (allocation_mode, allocations, fee) = if doc_type.is_receipt() {
        let allocations = if request.even_split {
            split_even(amount, &orders)?
        } else {
            let entries: Vec<OrderAmount> = request
                .allocations
                .iter()
                .filter_map(|a| {
                    SoNumber::new(&a.so).map(|so| OrderAmount {
                        so,
                        amount: a.amount,
                    })
                })
                .collect();
            apply_manual(amount, &orders, &entries)?
        };
        let mode = if request.even_split {
            AllocationMode::Even
        } else {
            AllocationMode::Manual
        };
        (Some(mode), allocations, Some(fees.calc_fee(&request.payment.method, amount)))
    } else if amount.is_positive() {
        (None, OrderAmounts::new(), Some(fees.calc_fee(&request.payment.method, amount)))
    } else {
        (None, OrderAmounts::new(), None)
    };

    let overage = if doc_type.is_receipt() {
        (amount - allocations.total()).clamp_non_negative()
    } else {
        Money::ZERO
    };

    let supersede = trimmed(&request.supersedes_doc_number)
        .map(|doc| (doc, request.supersede_action.unwrap_or_default()));

    debug!(
        doc_type = %doc_type,
        orders = orders.len(),
        subtotal = %lines_subtotal,
        shipping = %shipping_total,
        overage = %overage,
        "planned submission"
    );

    Ok(SubmissionPlan {
        doc_type,
        customer_id,
        company_name: request.company_name.trim().to_string(),
        contact_name: request.contact_name.trim().to_string(),
        address: request.address.trim().to_string(),
        primary_so,
        orders,
        doc_date,
        due_date,
        lines,
        lines_subtotal,
        shipping,
        shipping_total,
        payment: request.payment.clone(),
        allocation_mode,
        allocations,
        fee,
        overage,
        supersede,
        doc_number_override: trimmed(&request.doc_number_override),
        tracker_url: trimmed(&request.tracker_url),
        notes: trimmed(&request.notes),
        submitted_by: trimmed(&request.submitted_by),
    })
}

/// Reject amendments of documents that are missing or already superseded.
pub fn check_supersede(records: &[LedgerRecord], doc_number: &str) -> DomainResult<()> {
    let matching: Vec<&LedgerRecord> = records
        .iter()
        .filter(|r| r.doc_number.as_deref().map(str::trim) == Some(doc_number))
        .collect();

    if matching.is_empty() {
        return Err(DomainError::validation(format!(
            "document {doc_number} does not exist and cannot be superseded"
        )));
    }
    if matching.iter().all(|r| !r.is_active()) {
        return Err(DomainError::conflict(format!(
            "document {doc_number} is already {}",
            matching[0].doc_status
        )));
    }
    Ok(())
}

/// Reject a doc number override that an active document already carries,
/// unless that document is the one being superseded.
pub fn check_doc_number_override(
    records: &[LedgerRecord],
    doc_number: &str,
    superseding: Option<&str>,
) -> DomainResult<()> {
    if superseding == Some(doc_number) {
        return Ok(());
    }
    let taken = records
        .iter()
        .any(|r| r.is_active() && r.doc_number.as_deref().map(str::trim) == Some(doc_number));
    if taken {
        return Err(DomainError::conflict(format!(
            "document number {doc_number} is already in use"
        )));
    }
    Ok(())
}

impl SubmissionPlan {
    /// Order total shown on the document.
    pub fn order_total(&self) -> Money {
        self.lines_subtotal + self.shipping_total
    }

    pub fn is_multi_order(&self) -> bool {
        self.orders.len() > 1
    }

    /// The ledger row for this document.
    pub fn record(&self, ids: &AssignedIds, documents: Documents, now: DateTime<Utc>) -> LedgerRecord {
        let gross = self.payment.amount;
        let mut record = LedgerRecord::new(ids.payment_id.clone(), self.doc_type, self.customer_id.clone())
            .with_orders(self.primary_so.clone(), &self.orders)
            .with_doc_number(ids.doc_number.clone());

        record.transaction_id = Some(ids.transaction_id.clone());
        record.invoice_group_id = ids.invoice_group_id.clone();
        record.doc_status = DocStatus::Issued;
        if let Some((doc, action)) = &self.supersede {
            record.supersedes_doc_number = Some(doc.clone());
            record.supersede_action = Some(*action);
        }

        record.company_name = self.company_name.clone();
        record.contact_name = self.contact_name.clone();
        record.address = self.address.clone();

        record.allocation_mode = self.allocation_mode;
        record.allocations = self.allocations.clone();
        record.lines = self.lines.clone();
        record.lines_subtotal = Some(self.lines_subtotal);
        record.shipping = self.shipping.clone();
        record.shipping_total = Some(self.shipping_total);
        record.doc_date = Some(self.doc_date);
        record.due_date = self.due_date;

        if self.doc_type.is_receipt() {
            record.payment_at = Some(self.payment.paid_at.unwrap_or(now));
        }
        if gross.is_positive() {
            record.amount_gross = Some(gross);
        }
        record.method = non_blank(&self.payment.method);
        record.reference = non_blank(&self.payment.reference);
        record.notes = non_blank(&self.payment.notes).or_else(|| self.notes.clone());

        if let Some(fee) = &self.fee {
            record.fee_percent = Some(fee.percent);
            record.fee_flat = Some(fee.flat);
            record.fee_amount = Some(fee.fee);
            record.amount_net = Some(fee.net);
        }

        record.documents = documents;
        record.tracker_url = self.tracker_url.clone();
        record.submitted_by = self.submitted_by.clone();
        record.submitted_at = Some(now);
        record
    }

    /// Credit row for the part of a receipt not allocated to any order.
    pub fn overage_credit(&self, ids: &AssignedIds, credit_id: PaymentId, now: DateTime<Utc>) -> Option<LedgerRecord> {
        if !self.overage.is_positive() {
            return None;
        }
        let mut credit = LedgerRecord::new(credit_id, DocType::Credit, self.customer_id.clone())
            .with_gross(self.overage);
        credit.company_name = self.company_name.clone();
        credit.method = non_blank(&self.payment.method);
        credit.transaction_id = Some(ids.transaction_id.clone());
        credit.invoice_group_id = ids.invoice_group_id.clone();
        credit.submitted_by = self.submitted_by.clone();
        credit.submitted_at = Some(now);
        Some(credit)
    }
}

fn non_blank(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}
