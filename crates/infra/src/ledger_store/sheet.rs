//! Sheet-backed ledger.
//!
//! Rows are stored under the ledger header set. Columns are found by header
//! name rather than position, so operators can reorder or add columns freely,
//! and any missing ledger header is appended when the sheet is opened.
//!
//! ## Legacy rows
//!
//! Older rows are decoded as follows:
//!
//! | Cell | Legacy value | Decoded as |
//! |------|--------------|------------|
//! | `DocType` | `INVOICE` / `RECEIPT` | combined with `DocFlavor` (default `SALES`) |
//! | `DocType` | `CREDIT-APPLIED` | `CREDIT_APPLIED` |
//! | `DocStatus` | blank | `ISSUED` |
//! | `DocStatus` | `VOIDED`, `CANCELLED`, `CANCELED` | `VOID` |
//! | `DocStatus` | `SUPERSEDED`, `SUPERCEDED`, `REPLACED` | `REPLACED` |
//! | `SOsCSV` | `SO1|SO2`, `SO1;SO2` | order list |
//! | `SOsCSV` | `SO1:100, SO2:50` | order list plus allocations |
//! | `AllocationsJSON` | `{"SO1": 100}` | allocations |
//! | `LinesJSON` | `{so, desc, qty, amt}` | line items |

use std::sync::RwLock;

use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;
use tracing::{debug, info, warn};

use wholesale_core::{CustomerId, Money, PaymentId, SoNumber};
use wholesale_payments::{
    AllocationMode, DocStatus, DocType, LedgerRecord, LineItem, OrderAmounts, ShippingCharge,
    SupersedeAction,
};

use super::r#trait::{LedgerStore, StoreError};
use crate::schema::{LEDGER_HEADERS, Sheet};

pub const DEFAULT_LEDGER_SHEET: &str = "Payments";

/// Ledger stored as a header row plus string rows.
#[derive(Debug)]
pub struct SheetLedgerStore {
    sheet: RwLock<Sheet>,
    scan_window: Option<usize>,
}

impl Default for SheetLedgerStore {
    fn default() -> Self {
        Self::open(Sheet::new(DEFAULT_LEDGER_SHEET, &[]))
    }
}

impl SheetLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap an existing sheet, appending any missing ledger headers.
    pub fn open(mut sheet: Sheet) -> Self {
        let added = sheet.ensure_headers(LEDGER_HEADERS);
        if !added.is_empty() {
            info!(sheet = %sheet.name, added = added.len(), "ledger headers added");
        }
        Self {
            sheet: RwLock::new(sheet),
            scan_window: None,
        }
    }

    /// Only read the most recent `window` rows on `scan`.
    pub fn with_scan_window(mut self, window: Option<usize>) -> Self {
        self.scan_window = window.filter(|w| *w > 0);
        self
    }

    /// Copy of the underlying sheet.
    pub fn snapshot(&self) -> Result<Sheet, StoreError> {
        let sheet = self.sheet.read().map_err(|_| StoreError::poisoned())?;
        Ok(sheet.clone())
    }
}

impl LedgerStore for SheetLedgerStore {
    fn append(&self, record: LedgerRecord) -> Result<(), StoreError> {
        let mut sheet = self.sheet.write().map_err(|_| StoreError::poisoned())?;
        let row = encode_row(&sheet, &record)?;
        sheet.rows.push(row);
        info!(
            sheet = %sheet.name,
            payment_id = %record.payment_id,
            doc_type = %record.doc_type,
            doc_number = record.doc_number.as_deref().unwrap_or(""),
            "ledger row appended"
        );
        Ok(())
    }

    fn scan(&self) -> Result<Vec<LedgerRecord>, StoreError> {
        let sheet = self.sheet.read().map_err(|_| StoreError::poisoned())?;
        let start = match self.scan_window {
            Some(window) => sheet.rows.len().saturating_sub(window),
            None => 0,
        };
        let records: Vec<LedgerRecord> = (start..sheet.rows.len())
            .filter_map(|idx| decode_row(&sheet, idx))
            .collect();
        debug!(sheet = %sheet.name, rows = sheet.rows.len() - start, records = records.len(), "ledger scanned");
        Ok(records)
    }

    fn mark_status(&self, doc_number: &str, status: DocStatus) -> Result<usize, StoreError> {
        let mut sheet = self.sheet.write().map_err(|_| StoreError::poisoned())?;
        let doc_col = column(&sheet, "DocNumber")?;
        let status_col = column(&sheet, "DocStatus")?;
        let matching: Vec<usize> = (0..sheet.rows.len())
            .filter(|&idx| sheet.cell(idx, doc_col) == doc_number)
            .collect();
        for &idx in &matching {
            sheet.set_cell(idx, status_col, status.as_str());
        }
        Ok(matching.len())
    }
}

fn column(sheet: &Sheet, name: &str) -> Result<usize, StoreError> {
    sheet
        .column_named(name)
        .ok_or_else(|| StoreError::Corrupt(format!("ledger sheet is missing the {name} header")))
}

fn opt(value: &Option<String>) -> String {
    value.clone().unwrap_or_default()
}

fn money(value: Option<Money>) -> String {
    value.map(Money::to_decimal_string).unwrap_or_default()
}

fn json<T: serde::Serialize>(value: &T) -> Result<String, StoreError> {
    serde_json::to_string(value).map_err(|e| StoreError::Backend(format!("failed to encode ledger cell: {e}")))
}

fn encode_row(sheet: &Sheet, record: &LedgerRecord) -> Result<Vec<String>, StoreError> {
    let so_csv = record
        .so_list
        .iter()
        .map(SoNumber::as_str)
        .collect::<Vec<_>>()
        .join(", ");
    let allocations = if record.allocations.is_empty() {
        String::new()
    } else {
        json(&record.allocations)?
    };
    let lines = if record.lines.is_empty() {
        String::new()
    } else {
        json(&record.lines)?
    };
    let shipping = if record.shipping.is_empty() {
        String::new()
    } else {
        json(&record.shipping)?
    };

    let cells = [
        ("PaymentID", record.payment_id.to_string()),
        ("TransactionID", opt(&record.transaction_id)),
        ("InvoiceGroupID", opt(&record.invoice_group_id)),
        ("DocNumber", opt(&record.doc_number)),
        ("DocType", record.doc_type.as_str().to_string()),
        ("DocFlavor", record.doc_type.flavor().unwrap_or_default().to_string()),
        ("DocStatus", record.doc_status.as_str().to_string()),
        ("SupersedesDoc#", opt(&record.supersedes_doc_number)),
        (
            "SupersedeAction",
            record.supersede_action.map(|a| a.as_str().to_string()).unwrap_or_default(),
        ),
        ("CustomerID", record.customer_id.to_string()),
        ("CompanyName", record.company_name.clone()),
        ("ContactName", record.contact_name.clone()),
        ("Address", record.address.clone()),
        ("SOsCSV", so_csv),
        (
            "PrimarySO",
            record.primary_so.as_ref().map(|s| s.to_string()).unwrap_or_default(),
        ),
        (
            "AllocationMode",
            record.allocation_mode.map(|m| m.as_str().to_string()).unwrap_or_default(),
        ),
        ("AllocationsJSON", allocations),
        ("LinesJSON", lines),
        ("LinesSubtotal", money(record.lines_subtotal)),
        ("ShippingJSON", shipping),
        ("ShippingTotal", money(record.shipping_total)),
        ("DOC_DATE", date(record.doc_date)),
        ("DueDate", date(record.due_date)),
        ("PaymentDateTime", timestamp(record.payment_at)),
        ("AmountGross", money(record.amount_gross)),
        ("Method", opt(&record.method)),
        ("Reference", opt(&record.reference)),
        ("Notes", opt(&record.notes)),
        ("FeePercent", record.fee_percent.map(|p| p.to_string()).unwrap_or_default()),
        ("FeeFlat", money(record.fee_flat)),
        ("FeeAmount", money(record.fee_amount)),
        ("AmountNet", money(record.amount_net)),
        ("PDF_URL", opt(&record.documents.pdf_url)),
        ("DOC_URL", opt(&record.documents.doc_url)),
        ("CustomerOrderTrackerURL", opt(&record.tracker_url)),
        ("SubmittedBy", opt(&record.submitted_by)),
        ("SubmittedAt", timestamp(record.submitted_at)),
    ];

    let mut row = vec![String::new(); sheet.header.len()];
    for (name, value) in cells {
        let idx = column(sheet, name)?;
        row[idx] = value;
    }
    Ok(row)
}

fn date(value: Option<NaiveDate>) -> String {
    value.map(|d| d.format("%Y-%m-%d").to_string()).unwrap_or_default()
}

fn timestamp(value: Option<DateTime<Utc>>) -> String {
    value.map(|t| t.to_rfc3339()).unwrap_or_default()
}

struct RowReader<'a> {
    sheet: &'a Sheet,
    idx: usize,
}

impl<'a> RowReader<'a> {
    fn get(&self, name: &str) -> &'a str {
        self.sheet
            .column_named(name)
            .map(|col| self.sheet.cell(self.idx, col))
            .unwrap_or("")
    }

    fn text(&self, name: &str) -> Option<String> {
        let value = self.get(name);
        (!value.is_empty()).then(|| value.to_string())
    }
}

/// Decode one row; rows without a usable type are skipped.
fn decode_row(sheet: &Sheet, idx: usize) -> Option<LedgerRecord> {
    let row = RowReader { sheet, idx };
    let get = |name: &str| row.get(name);
    let text = |name: &str| row.text(name);

    let raw_type = get("DocType");
    if raw_type.is_empty() && get("PaymentID").is_empty() {
        return None;
    }
    let Some(doc_type) = decode_doc_type(raw_type, get("DocFlavor")) else {
        warn!(sheet = %sheet.name, row = idx + 2, doc_type = raw_type, "skipping ledger row with unknown document type");
        return None;
    };
    let customer_id = CustomerId::new(get("CustomerID")).unwrap_or_else(|| {
        debug!(sheet = %sheet.name, row = idx + 2, "ledger row has no customer id; kept for order lookups only");
        CustomerId::unassigned()
    });
    let payment_id = match get("PaymentID") {
        "" => PaymentId::new(format!("ROW-{}", idx + 2)),
        id => PaymentId::new(id),
    };

    let (so_list, csv_allocations) = decode_so_csv(get("SOsCSV"));
    let primary_so = SoNumber::new(get("PrimarySO")).or_else(|| so_list.first().cloned());
    let mut allocations = decode_allocations(get("AllocationsJSON"));
    if allocations.is_empty() {
        allocations = csv_allocations;
    }

    let mut record = LedgerRecord::new(payment_id, doc_type, customer_id);
    record.transaction_id = text("TransactionID");
    record.invoice_group_id = text("InvoiceGroupID");
    record.doc_number = text("DocNumber");
    record.doc_status = decode_status(get("DocStatus"));
    record.supersedes_doc_number = text("SupersedesDoc#");
    record.supersede_action = match get("SupersedeAction").to_ascii_uppercase().as_str() {
        "VOID" => Some(SupersedeAction::Void),
        "REPLACE" => Some(SupersedeAction::Replace),
        _ => None,
    };
    record.company_name = get("CompanyName").to_string();
    record.contact_name = get("ContactName").to_string();
    record.address = get("Address").to_string();
    record.primary_so = primary_so;
    record.so_list = so_list;
    record.allocation_mode = match get("AllocationMode").to_ascii_uppercase().as_str() {
        "EVEN" => Some(AllocationMode::Even),
        "MANUAL" => Some(AllocationMode::Manual),
        _ => None,
    };
    record.allocations = allocations;
    record.lines = decode_lines(get("LinesJSON"));
    record.lines_subtotal = parse_money(get("LinesSubtotal"));
    record.shipping = decode_shipping(get("ShippingJSON"));
    record.shipping_total = parse_money(get("ShippingTotal"));
    record.doc_date = parse_date(get("DOC_DATE"));
    record.due_date = parse_date(get("DueDate"));
    record.payment_at = parse_timestamp(get("PaymentDateTime"));
    record.amount_gross = parse_money(get("AmountGross"));
    record.method = text("Method");
    record.reference = text("Reference");
    record.notes = text("Notes");
    record.fee_percent = get("FeePercent").trim_end_matches('%').trim().parse().ok();
    record.fee_flat = parse_money(get("FeeFlat"));
    record.fee_amount = parse_money(get("FeeAmount"));
    record.amount_net = parse_money(get("AmountNet"));
    record.documents.pdf_url = text("PDF_URL");
    record.documents.doc_url = text("DOC_URL");
    record.tracker_url = text("CustomerOrderTrackerURL");
    record.submitted_by = text("SubmittedBy");
    record.submitted_at = parse_timestamp(get("SubmittedAt"));
    Some(record)
}

fn decode_doc_type(raw: &str, flavor: &str) -> Option<DocType> {
    if let Ok(doc_type) = raw.parse::<DocType>() {
        return Some(doc_type);
    }
    let deposit = flavor.trim().eq_ignore_ascii_case("DEPOSIT");
    match raw.trim().to_ascii_uppercase().as_str() {
        "INVOICE" if deposit => Some(DocType::DepositInvoice),
        "INVOICE" => Some(DocType::SalesInvoice),
        "RECEIPT" if deposit => Some(DocType::DepositReceipt),
        "RECEIPT" => Some(DocType::SalesReceipt),
        _ => None,
    }
}

fn decode_status(raw: &str) -> DocStatus {
    match raw.trim().to_ascii_uppercase().as_str() {
        "VOID" | "VOIDED" | "CANCELLED" | "CANCELED" => DocStatus::Void,
        "REPLACED" | "SUPERSEDED" | "SUPERSEDE" | "SUPERCEDED" => DocStatus::Replaced,
        _ => DocStatus::Issued,
    }
}

/// Order list plus any `SO:amount` pairs.
fn decode_so_csv(raw: &str) -> (Vec<SoNumber>, OrderAmounts) {
    let mut orders: Vec<SoNumber> = Vec::new();
    let mut allocations = OrderAmounts::new();
    for token in raw.split([',', '|', ';']) {
        let (so_text, amount) = match token.split_once(':') {
            Some((so, amount)) => (so, parse_money(amount)),
            None => (token, None),
        };
        let Some(so) = SoNumber::new(so_text) else {
            continue;
        };
        if let Some(amount) = amount {
            allocations.add(&so, amount);
        }
        if !orders.contains(&so) {
            orders.push(so);
        }
    }
    (orders, allocations)
}

fn parse_json(raw: &str, cell: &str) -> Option<Value> {
    if raw.is_empty() {
        return None;
    }
    match serde_json::from_str(raw) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(cell, error = %e, "ignoring malformed ledger JSON cell");
            None
        }
    }
}

fn field<'a>(object: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|k| object.get(*k).filter(|v| !v.is_null()))
}

fn value_money(value: &Value) -> Option<Money> {
    match value {
        Value::Number(n) => n.as_f64().and_then(|f| Money::from_major(f).ok()),
        Value::String(s) => parse_money(s),
        _ => None,
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.trim().to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// `[{so, amount}]` or `{"SO1": amount}`.
fn decode_allocations(raw: &str) -> OrderAmounts {
    let mut out = OrderAmounts::new();
    match parse_json(raw, "AllocationsJSON") {
        Some(Value::Array(entries)) => {
            for entry in &entries {
                let so = field(entry, &["so", "SO", "order"]).map(value_text);
                let amount = field(entry, &["amount", "amt"]).and_then(value_money);
                if let (Some(so), Some(amount)) = (so.as_deref().and_then(SoNumber::new), amount) {
                    out.add(&so, amount);
                }
            }
        }
        Some(Value::Object(map)) => {
            for (so, amount) in &map {
                if let (Some(so), Some(amount)) = (SoNumber::new(so), value_money(amount)) {
                    out.add(&so, amount);
                }
            }
        }
        _ => {}
    }
    out
}

fn decode_lines(raw: &str) -> Vec<LineItem> {
    let Some(Value::Array(entries)) = parse_json(raw, "LinesJSON") else {
        return Vec::new();
    };
    entries
        .iter()
        .filter(|entry| entry.is_object())
        .map(|entry| LineItem {
            so: field(entry, &["so", "SO"])
                .map(value_text)
                .as_deref()
                .and_then(SoNumber::new),
            description: field(entry, &["description", "desc"]).map(value_text).unwrap_or_default(),
            quantity: field(entry, &["quantity", "qty"])
                .and_then(|v| match v {
                    Value::Number(n) => n.as_f64(),
                    Value::String(s) => s.trim().parse().ok(),
                    _ => None,
                })
                .map(|q| q.round() as i64)
                .unwrap_or(1),
            unit_amount: field(entry, &["unit_amount", "amt", "amount", "rate", "price"])
                .and_then(value_money)
                .unwrap_or(Money::ZERO),
            total: field(entry, &["total", "lineTotal"]).and_then(value_money),
        })
        .collect()
}

fn decode_shipping(raw: &str) -> Vec<ShippingCharge> {
    let Some(Value::Array(entries)) = parse_json(raw, "ShippingJSON") else {
        return Vec::new();
    };
    entries
        .iter()
        .filter_map(|entry| {
            let amount = field(entry, &["amount", "amt"]).and_then(value_money)?;
            let label = field(entry, &["label", "desc"]).map(value_text).unwrap_or_default();
            Some(ShippingCharge { label, amount })
        })
        .collect()
}

fn parse_money(raw: &str) -> Option<Money> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    Money::parse(raw).ok()
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|t| t.date_naive()))
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|t| t.with_timezone(&Utc))
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|d| d.and_utc())
        })
}
