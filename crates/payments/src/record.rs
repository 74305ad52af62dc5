//! Ledger record model.
//!
//! A `LedgerRecord` is one row of the append-only payment ledger: an invoice,
//! a receipt, an overpayment credit or a credit application. Rows are never
//! edited after they are written; the only permitted change is flagging the
//! status (`Replaced` / `Void`) when a correction supersedes them.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use wholesale_core::{CustomerId, DomainError, Money, PaymentId, SoNumber};

/// Kind of document a ledger row represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocType {
    DepositInvoice,
    DepositReceipt,
    SalesInvoice,
    SalesReceipt,
    Credit,
    CreditApplied,
}

impl DocType {
    /// The four document types an operator can submit.
    pub const SUBMITTABLE: [DocType; 4] = [
        DocType::DepositInvoice,
        DocType::DepositReceipt,
        DocType::SalesInvoice,
        DocType::SalesReceipt,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            DocType::DepositInvoice => "DEPOSIT_INVOICE",
            DocType::DepositReceipt => "DEPOSIT_RECEIPT",
            DocType::SalesInvoice => "SALES_INVOICE",
            DocType::SalesReceipt => "SALES_RECEIPT",
            DocType::Credit => "CREDIT",
            DocType::CreditApplied => "CREDIT_APPLIED",
        }
    }

    pub fn is_invoice(self) -> bool {
        matches!(self, DocType::DepositInvoice | DocType::SalesInvoice)
    }

    pub fn is_receipt(self) -> bool {
        matches!(self, DocType::DepositReceipt | DocType::SalesReceipt)
    }

    /// `DEPOSIT` or `SALES` for the four document types.
    pub fn flavor(self) -> Option<&'static str> {
        match self {
            DocType::DepositInvoice | DocType::DepositReceipt => Some("DEPOSIT"),
            DocType::SalesInvoice | DocType::SalesReceipt => Some("SALES"),
            DocType::Credit | DocType::CreditApplied => None,
        }
    }

    /// Human label used on documents and in summaries.
    pub fn label(self) -> &'static str {
        match self {
            DocType::DepositInvoice => "Deposit Invoice",
            DocType::DepositReceipt => "Deposit Receipt",
            DocType::SalesInvoice => "Sales Invoice",
            DocType::SalesReceipt => "Sales Receipt",
            DocType::Credit => "Credit",
            DocType::CreditApplied => "Credit Applied",
        }
    }
}

impl core::fmt::Display for DocType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for DocType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "DEPOSIT_INVOICE" => Ok(DocType::DepositInvoice),
            "DEPOSIT_RECEIPT" => Ok(DocType::DepositReceipt),
            "SALES_INVOICE" => Ok(DocType::SalesInvoice),
            "SALES_RECEIPT" => Ok(DocType::SalesReceipt),
            "CREDIT" => Ok(DocType::Credit),
            "CREDIT_APPLIED" => Ok(DocType::CreditApplied),
            _ => Err(DomainError::validation(format!("unknown document type '{s}'"))),
        }
    }
}

/// Lifecycle status of a ledger row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocStatus {
    #[default]
    Issued,
    Replaced,
    Void,
}

impl DocStatus {
    /// Only issued rows count toward paid-to-date, balances and credit.
    pub fn is_active(self) -> bool {
        self == DocStatus::Issued
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DocStatus::Issued => "ISSUED",
            DocStatus::Replaced => "REPLACED",
            DocStatus::Void => "VOID",
        }
    }
}

impl core::fmt::Display for DocStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What happens to the document a new one supersedes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SupersedeAction {
    #[default]
    Replace,
    Void,
}

impl SupersedeAction {
    /// Status written onto the superseded rows.
    pub fn target_status(self) -> DocStatus {
        match self {
            SupersedeAction::Replace => DocStatus::Replaced,
            SupersedeAction::Void => DocStatus::Void,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SupersedeAction::Replace => "REPLACE",
            SupersedeAction::Void => "VOID",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AllocationMode {
    #[default]
    Even,
    Manual,
}

impl AllocationMode {
    pub fn as_str(self) -> &'static str {
        match self {
            AllocationMode::Even => "EVEN",
            AllocationMode::Manual => "MANUAL",
        }
    }
}

/// One order's share of an amount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderAmount {
    pub so: SoNumber,
    pub amount: Money,
}

/// Ordered order → amount mapping.
///
/// Used for allocations on receipts and credit applications, and for
/// paid-to-date results. Keys are unique by normalized order number and keep
/// their insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderAmounts(Vec<OrderAmount>);

impl OrderAmounts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the amount for `so`, keeping its original position if present.
    pub fn set(&mut self, so: SoNumber, amount: Money) {
        match self.0.iter_mut().find(|entry| entry.so == so) {
            Some(entry) => entry.amount = amount,
            None => self.0.push(OrderAmount { so, amount }),
        }
    }

    /// Add `amount` to the entry for `so`, creating it if needed.
    pub fn add(&mut self, so: &SoNumber, amount: Money) {
        match self.0.iter_mut().find(|entry| &entry.so == so) {
            Some(entry) => entry.amount += amount,
            None => self.0.push(OrderAmount {
                so: so.clone(),
                amount,
            }),
        }
    }

    pub fn get(&self, so: &SoNumber) -> Option<Money> {
        self.0.iter().find(|entry| &entry.so == so).map(|entry| entry.amount)
    }

    pub fn contains(&self, so: &SoNumber) -> bool {
        self.0.iter().any(|entry| &entry.so == so)
    }

    pub fn total(&self) -> Money {
        self.0.iter().map(|entry| entry.amount).sum()
    }

    pub fn orders(&self) -> impl Iterator<Item = &SoNumber> {
        self.0.iter().map(|entry| &entry.so)
    }

    pub fn iter(&self) -> impl Iterator<Item = &OrderAmount> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(SoNumber, Money)> for OrderAmounts {
    fn from_iter<I: IntoIterator<Item = (SoNumber, Money)>>(iter: I) -> Self {
        let mut out = OrderAmounts::new();
        for (so, amount) in iter {
            out.set(so, amount);
        }
        out
    }
}

impl<'a> IntoIterator for &'a OrderAmounts {
    type Item = &'a OrderAmount;
    type IntoIter = core::slice::Iter<'a, OrderAmount>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Document line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub so: Option<SoNumber>,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_quantity")]
    pub quantity: i64,
    #[serde(default)]
    pub unit_amount: Money,
    /// Explicit line total; legacy rows carry this instead of a unit amount.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<Money>,
}

fn default_quantity() -> i64 {
    1
}

impl LineItem {
    pub fn line_total(&self) -> Money {
        self.total.unwrap_or_else(|| self.unit_amount.times(self.quantity))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingCharge {
    #[serde(default)]
    pub label: String,
    pub amount: Money,
}

/// Links to the rendered document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Documents {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pdf_url: Option<String>,
}

/// One row of the payment ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerRecord {
    pub payment_id: PaymentId,
    #[serde(default)]
    pub transaction_id: Option<String>,
    #[serde(default)]
    pub invoice_group_id: Option<String>,

    #[serde(default)]
    pub doc_number: Option<String>,
    pub doc_type: DocType,
    #[serde(default)]
    pub doc_status: DocStatus,
    #[serde(default)]
    pub supersedes_doc_number: Option<String>,
    #[serde(default)]
    pub supersede_action: Option<SupersedeAction>,

    pub customer_id: CustomerId,
    #[serde(default)]
    pub company_name: String,
    #[serde(default)]
    pub contact_name: String,
    #[serde(default)]
    pub address: String,

    #[serde(default)]
    pub primary_so: Option<SoNumber>,
    #[serde(default)]
    pub so_list: Vec<SoNumber>,
    #[serde(default)]
    pub allocation_mode: Option<AllocationMode>,
    #[serde(default)]
    pub allocations: OrderAmounts,

    #[serde(default)]
    pub lines: Vec<LineItem>,
    #[serde(default)]
    pub lines_subtotal: Option<Money>,
    #[serde(default)]
    pub shipping: Vec<ShippingCharge>,
    #[serde(default)]
    pub shipping_total: Option<Money>,

    #[serde(default)]
    pub doc_date: Option<NaiveDate>,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,

    #[serde(default)]
    pub payment_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub amount_gross: Option<Money>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,

    #[serde(default)]
    pub fee_percent: Option<f64>,
    #[serde(default)]
    pub fee_flat: Option<Money>,
    #[serde(default)]
    pub fee_amount: Option<Money>,
    #[serde(default)]
    pub amount_net: Option<Money>,

    #[serde(default)]
    pub documents: Documents,
    #[serde(default)]
    pub tracker_url: Option<String>,
    #[serde(default)]
    pub submitted_by: Option<String>,
    #[serde(default)]
    pub submitted_at: Option<DateTime<Utc>>,
}

impl LedgerRecord {
    /// Bare record with every optional field empty.
    pub fn new(payment_id: PaymentId, doc_type: DocType, customer_id: CustomerId) -> Self {
        Self {
            payment_id,
            transaction_id: None,
            invoice_group_id: None,
            doc_number: None,
            doc_type,
            doc_status: DocStatus::Issued,
            supersedes_doc_number: None,
            supersede_action: None,
            customer_id,
            company_name: String::new(),
            contact_name: String::new(),
            address: String::new(),
            primary_so: None,
            so_list: Vec::new(),
            allocation_mode: None,
            allocations: OrderAmounts::new(),
            lines: Vec::new(),
            lines_subtotal: None,
            shipping: Vec::new(),
            shipping_total: None,
            doc_date: None,
            due_date: None,
            payment_at: None,
            amount_gross: None,
            method: None,
            reference: None,
            notes: None,
            fee_percent: None,
            fee_flat: None,
            fee_amount: None,
            amount_net: None,
            documents: Documents::default(),
            tracker_url: None,
            submitted_by: None,
            submitted_at: None,
        }
    }

    /// Set the primary order and order list (primary first, de-duplicated).
    pub fn with_orders(mut self, primary: SoNumber, others: &[SoNumber]) -> Self {
        self.so_list = order_list(&primary, others);
        self.primary_so = Some(primary);
        self
    }

    pub fn with_gross(mut self, amount: Money) -> Self {
        self.amount_gross = Some(amount);
        self
    }

    pub fn with_doc_number(mut self, doc_number: impl Into<String>) -> Self {
        self.doc_number = Some(doc_number.into());
        self
    }

    pub fn is_active(&self) -> bool {
        self.doc_status.is_active()
    }

    /// Orders this record refers to: the order list, else the primary order.
    pub fn orders(&self) -> Vec<SoNumber> {
        if !self.so_list.is_empty() {
            return self.so_list.clone();
        }
        self.primary_so.iter().cloned().collect()
    }

    /// True when `so` is the primary order, in the order list or allocated to.
    pub fn touches(&self, so: &SoNumber) -> bool {
        self.primary_so.as_ref() == Some(so)
            || self.so_list.contains(so)
            || self.allocations.contains(so)
    }

    /// Doc date, else payment time, else submission time.
    pub fn activity_at(&self) -> Option<DateTime<Utc>> {
        self.doc_date
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|d| d.and_utc())
            .or(self.payment_at)
            .or(self.submitted_at)
    }
}

/// Primary order first, then the others, de-duplicated by normalized key.
pub fn order_list(primary: &SoNumber, others: &[SoNumber]) -> Vec<SoNumber> {
    let mut out = vec![primary.clone()];
    for so in others {
        if !out.contains(so) {
            out.push(so.clone());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn so(s: &str) -> SoNumber {
        s.parse().unwrap()
    }

    #[test]
    fn order_list_puts_primary_first_and_dedupes() {
        let list = order_list(&so("SO2"), &[so("so-1"), so("SO 2"), so("SO1"), so("SO3")]);
        let keys: Vec<_> = list.iter().map(|s| s.key().to_string()).collect();
        assert_eq!(keys, vec!["SO2", "SO1", "SO3"]);
    }

    #[test]
    fn order_amounts_set_keeps_position_and_last_value() {
        let mut amounts = OrderAmounts::new();
        amounts.set(so("SO1"), Money::from_cents(100));
        amounts.set(so("SO2"), Money::from_cents(200));
        amounts.set(so("so-1"), Money::from_cents(300));

        let keys: Vec<_> = amounts.orders().map(|s| s.key().to_string()).collect();
        assert_eq!(keys, vec!["SO1", "SO2"]);
        assert_eq!(amounts.get(&so("SO1")), Some(Money::from_cents(300)));
        assert_eq!(amounts.total(), Money::from_cents(500));
    }

    #[test]
    fn line_total_prefers_explicit_total() {
        let mut line = LineItem {
            so: None,
            description: "Ring".to_string(),
            quantity: 3,
            unit_amount: Money::from_cents(1_000),
            total: None,
        };
        assert_eq!(line.line_total(), Money::from_cents(3_000));
        line.total = Some(Money::from_cents(2_500));
        assert_eq!(line.line_total(), Money::from_cents(2_500));
    }

    #[test]
    fn doc_type_parses_loose_spellings() {
        assert_eq!("credit-applied".parse::<DocType>().unwrap(), DocType::CreditApplied);
        assert_eq!("Sales Receipt".parse::<DocType>().unwrap(), DocType::SalesReceipt);
        assert!("RECEIPT".parse::<DocType>().is_err());
    }

    #[test]
    fn record_serializes_with_screaming_enums() {
        let record = LedgerRecord::new(
            PaymentId::new("PAY-1"),
            DocType::SalesReceipt,
            "C1".parse().unwrap(),
        )
        .with_orders(so("SO1"), &[])
        .with_gross(Money::from_cents(12_345));

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["doc_type"], "SALES_RECEIPT");
        assert_eq!(json["doc_status"], "ISSUED");
        assert_eq!(json["amount_gross"], 123.45);

        let back: LedgerRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }
}
