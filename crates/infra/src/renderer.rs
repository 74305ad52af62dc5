//! Document rendering.
//!
//! A [`DocumentModel`] carries everything a printed invoice or receipt shows.
//! Renderers turn it into stored files and hand back their URLs, which are
//! recorded on the ledger row.

use std::fmt::Write as _;
use std::fs;
use std::path::PathBuf;

use chrono::NaiveDate;
use serde::Serialize;
use thiserror::Error;
use tracing::info;

use wholesale_core::Money;
use wholesale_payments::{
    DocType, FeeQuote, LedgerRecord, ShippingCharge, SubmissionPlan, resolve_amount,
};

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("failed to write document {path}: {message}")]
    Io { path: String, message: String },

    #[error("failed to encode document model: {0}")]
    Encode(String),
}

/// One row of the `ITEM/SO, DESCRIPTION, QTY, TOTAL` table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ItemRow {
    pub item: String,
    pub description: String,
    pub quantity: String,
    pub total: String,
}

pub const ITEM_HEADERS: [&str; 4] = ["ITEM/SO", "DESCRIPTION", "QTY", "TOTAL"];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentModel {
    pub doc_type: DocType,
    pub doc_label: String,
    pub doc_number: String,
    pub transaction_id: String,
    pub invoice_group_id: Option<String>,
    pub doc_date: NaiveDate,
    pub due_date: Option<NaiveDate>,
    pub customer_id: String,
    pub company_name: String,
    pub contact_name: String,
    pub address: String,
    pub orders: Vec<String>,
    pub items: Vec<ItemRow>,
    pub lines_subtotal: Money,
    pub shipping: Vec<ShippingCharge>,
    pub shipping_total: Money,
    pub order_total: Money,
    pub amount_paid: Option<Money>,
    pub payment_method: String,
    pub payment_reference: String,
    pub fee: Option<FeeQuote>,
    pub paid_to_date: Money,
    pub balance: Money,
    pub prior_payments: String,
    pub notes: String,
    pub tracker_url: Option<String>,
    pub supersedes_doc_number: Option<String>,
}

impl DocumentModel {
    /// Model for a planned document.
    ///
    /// `paid_to_date` is the replayed total for the plan's orders, before this
    /// document is appended; `history` the prior receipts shown on the page.
    pub fn from_plan(
        plan: &SubmissionPlan,
        doc_number: &str,
        transaction_id: &str,
        invoice_group_id: Option<&str>,
        paid_to_date: Money,
        history: &[&LedgerRecord],
    ) -> Self {
        let mut items: Vec<ItemRow> = plan
            .lines
            .iter()
            .map(|line| ItemRow {
                item: line.so.as_ref().map(|so| so.to_string()).unwrap_or_default(),
                description: line.description.clone(),
                quantity: line.quantity.to_string(),
                total: line.line_total().to_string(),
            })
            .collect();
        if items.is_empty() {
            items.push(ItemRow::default());
        }

        let order_total = plan.order_total();
        let amount = plan.payment.amount;
        Self {
            doc_type: plan.doc_type,
            doc_label: plan.doc_type.label().to_string(),
            doc_number: doc_number.to_string(),
            transaction_id: transaction_id.to_string(),
            invoice_group_id: invoice_group_id.map(str::to_string),
            doc_date: plan.doc_date,
            due_date: plan.due_date,
            customer_id: plan.customer_id.to_string(),
            company_name: plan.company_name.clone(),
            contact_name: plan.contact_name.clone(),
            address: plan.address.clone(),
            orders: plan.orders.iter().map(|so| so.to_string()).collect(),
            items,
            lines_subtotal: plan.lines_subtotal,
            shipping: plan.shipping.clone(),
            shipping_total: plan.shipping_total,
            order_total,
            amount_paid: amount.is_positive().then_some(amount),
            payment_method: plan.payment.method.trim().to_string(),
            payment_reference: plan.payment.reference.trim().to_string(),
            fee: plan.fee,
            paid_to_date,
            balance: (order_total - paid_to_date).clamp_non_negative(),
            prior_payments: payment_history(history),
            notes: plan
                .notes
                .clone()
                .unwrap_or_else(|| plan.payment.notes.trim().to_string()),
            tracker_url: plan.tracker_url.clone(),
            supersedes_doc_number: plan.supersede.as_ref().map(|(doc, _)| doc.clone()),
        }
    }

    /// Plain-text rendering of the document.
    pub fn flatten(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{} {}", self.doc_label.to_uppercase(), self.doc_number);
        let _ = writeln!(out, "Date: {}", self.doc_date.format("%b %-d, %Y"));
        if let Some(due) = self.due_date {
            let _ = writeln!(out, "Due Date: {}", due.format("%b %-d, %Y"));
        }
        if let Some(doc) = &self.supersedes_doc_number {
            let _ = writeln!(out, "Supersedes: {doc}");
        }
        let _ = writeln!(out, "Customer: {} ({})", self.company_name, self.customer_id);
        if !self.contact_name.is_empty() {
            let _ = writeln!(out, "Contact: {}", self.contact_name);
        }
        if !self.address.is_empty() {
            let _ = writeln!(out, "Address: {}", self.address);
        }
        let _ = writeln!(out, "Orders: {}", self.orders.join(", "));
        out.push('\n');

        let _ = writeln!(out, "{}", ITEM_HEADERS.join(" | "));
        for row in &self.items {
            let _ = writeln!(out, "{} | {} | {} | {}", row.item, row.description, row.quantity, row.total);
        }
        out.push('\n');

        for charge in &self.shipping {
            let _ = writeln!(out, "{}: {}", charge.label, charge.amount);
        }
        let _ = writeln!(out, "Order Total: {}", self.order_total);
        if let Some(paid) = self.amount_paid {
            let _ = write!(out, "Amount: {paid}");
            if !self.payment_method.is_empty() {
                let _ = write!(out, " ({})", self.payment_method);
            }
            if !self.payment_reference.is_empty() {
                let _ = write!(out, " ref {}", self.payment_reference);
            }
            out.push('\n');
        }
        let _ = writeln!(out, "Paid to Date: {}", self.paid_to_date);
        let _ = writeln!(out, "Balance: {}", self.balance);
        if !self.prior_payments.is_empty() {
            let _ = writeln!(out, "\nPayments:\n{}", self.prior_payments);
        }
        if !self.notes.is_empty() {
            let _ = writeln!(out, "\nNotes: {}", self.notes);
        }
        out
    }
}

/// One line per receipt: `Mon D, YYYY - $X (method)`.
pub fn payment_history(receipts: &[&LedgerRecord]) -> String {
    receipts
        .iter()
        .map(|record| {
            let date = record
                .payment_at
                .or(record.submitted_at)
                .map(|t| t.format("%b %-d, %Y").to_string())
                .unwrap_or_default();
            let mut line = format!("{date} - {}", resolve_amount(record).amount);
            if let Some(method) = record.method.as_deref().filter(|m| !m.is_empty()) {
                line.push_str(&format!(" ({method})"));
            }
            line
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RenderedDocument {
    pub doc_url: Option<String>,
    pub pdf_url: Option<String>,
}

pub trait DocumentRenderer: Send + Sync {
    fn render(&self, template_id: &str, model: &DocumentModel) -> Result<RenderedDocument, RenderError>;
}

impl<S> DocumentRenderer for std::sync::Arc<S>
where
    S: DocumentRenderer + ?Sized,
{
    fn render(&self, template_id: &str, model: &DocumentModel) -> Result<RenderedDocument, RenderError> {
        (**self).render(template_id, model)
    }
}

/// Writes `<doc>.json` (template id plus model) and a flattened `<doc>.txt`.
#[derive(Debug, Clone)]
pub struct FilesystemRenderer {
    dir: PathBuf,
}

#[derive(Serialize)]
struct StoredDocument<'a> {
    template_id: &'a str,
    model: &'a DocumentModel,
}

impl FilesystemRenderer {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn write(&self, name: &str, contents: &str) -> Result<String, RenderError> {
        let path = self.dir.join(name);
        let io_error = |e: std::io::Error| RenderError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        };
        fs::create_dir_all(&self.dir).map_err(io_error)?;
        fs::write(&path, contents).map_err(io_error)?;
        Ok(format!("file://{}", path.display()))
    }
}

fn file_stem(model: &DocumentModel) -> String {
    let stem: String = model
        .doc_number
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect();
    format!("{}-{}", model.doc_type.as_str(), stem)
}

impl DocumentRenderer for FilesystemRenderer {
    fn render(&self, template_id: &str, model: &DocumentModel) -> Result<RenderedDocument, RenderError> {
        let stem = file_stem(model);
        let json = serde_json::to_string_pretty(&StoredDocument { template_id, model })
            .map_err(|e| RenderError::Encode(e.to_string()))?;

        let doc_url = self.write(&format!("{stem}.json"), &json)?;
        let pdf_url = self.write(&format!("{stem}.txt"), &model.flatten())?;
        info!(doc_number = %model.doc_number, template_id, %doc_url, "document rendered");

        Ok(RenderedDocument {
            doc_url: Some(doc_url),
            pdf_url: Some(pdf_url),
        })
    }
}
