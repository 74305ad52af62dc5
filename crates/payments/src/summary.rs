//! Account summary: ledger rows for an order, customer or invoice group,
//! grouped by invoice group with totals, overdue flags and warnings.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use wholesale_core::{DomainError, DomainResult, Money, PaymentId, SoNumber, normalize_key};

use crate::amount::{AmountSource, resolve_amount};
use crate::record::{DocStatus, DocType, LedgerRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SummaryScope {
    So,
    Customer,
    Group,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryQuery {
    #[serde(default)]
    pub scope: Option<SummaryScope>,
    #[serde(default)]
    pub so_number: Option<String>,
    #[serde(default)]
    pub customer_id: Option<String>,
    #[serde(default)]
    pub invoice_group_id: Option<String>,
}

impl SummaryQuery {
    /// Scope to use: explicit scope first, else inferred from which key is
    /// present (group, then order, then customer). An order scope without an
    /// order number falls back to the customer and vice versa.
    pub fn resolve_scope(&self) -> DomainResult<SummaryScope> {
        let so = present(&self.so_number).is_some();
        let customer = present(&self.customer_id).is_some();
        let group = present(&self.invoice_group_id).is_some();

        let scope = match self.scope {
            Some(SummaryScope::So) if !so && customer => SummaryScope::Customer,
            Some(SummaryScope::Customer) if !customer && so => SummaryScope::So,
            Some(scope) => scope,
            None if group => SummaryScope::Group,
            None if so => SummaryScope::So,
            None if customer => SummaryScope::Customer,
            None => {
                return Err(DomainError::validation(
                    "provide an order number, customer id or invoice group",
                ));
            }
        };

        let has_key = match scope {
            SummaryScope::So => so,
            SummaryScope::Customer => customer,
            SummaryScope::Group => group,
        };
        if !has_key {
            return Err(DomainError::validation(format!(
                "{scope:?} summary needs a matching identifier"
            )));
        }
        Ok(scope)
    }
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !normalize_key(v).is_empty())
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryTotals {
    pub invoiced: Money,
    pub receipts: Money,
    pub credit_applied: Money,
    pub credits_issued: Money,
    pub balance: Money,
}

impl SummaryTotals {
    fn add(&mut self, doc_type: DocType, amount: Money) {
        match doc_type {
            t if t.is_invoice() => self.invoiced += amount,
            t if t.is_receipt() => self.receipts += amount,
            DocType::CreditApplied => self.credit_applied += amount,
            DocType::Credit => self.credits_issued += amount,
            _ => {}
        }
        self.balance = self.invoiced - (self.receipts + self.credit_applied);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocSummary {
    pub payment_id: PaymentId,
    pub doc_number: Option<String>,
    pub doc_type: DocType,
    pub doc_label: String,
    pub doc_status: DocStatus,
    pub active: bool,
    pub amount: Money,
    pub amount_source: AmountSource,
    pub doc_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub payment_at: Option<DateTime<Utc>>,
    pub method: Option<String>,
    pub pdf_url: Option<String>,
    pub so_numbers: Vec<String>,
    pub overdue: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupSummary {
    pub key: String,
    pub invoice_group_id: Option<String>,
    pub label: String,
    pub so_numbers: Vec<String>,
    pub totals: SummaryTotals,
    pub overdue: bool,
    pub oldest_overdue: Option<NaiveDate>,
    pub next_due: Option<NaiveDate>,
    pub latest_activity: Option<DateTime<Utc>>,
    pub warnings: Vec<String>,
    pub docs: Vec<DocSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerSummary {
    pub scope: SummaryScope,
    pub totals: SummaryTotals,
    pub groups: Vec<GroupSummary>,
    pub warnings: Vec<String>,
}

struct GroupBuilder {
    key: String,
    invoice_group_id: Option<String>,
    orders: Vec<SoNumber>,
    totals: SummaryTotals,
    latest_activity: Option<DateTime<Utc>>,
    docs: Vec<DocSummary>,
}

/// Build the summary for `query` as of `today`.
pub fn summarize(
    records: &[LedgerRecord],
    query: &SummaryQuery,
    today: NaiveDate,
) -> DomainResult<LedgerSummary> {
    let scope = query.resolve_scope()?;
    let so_key = present(&query.so_number).map(normalize_key);
    let customer_key = present(&query.customer_id).map(normalize_key);
    let group_key = present(&query.invoice_group_id).map(normalize_key);

    let mut groups: Vec<GroupBuilder> = Vec::new();
    let mut group_index: HashMap<String, usize> = HashMap::new();
    let mut totals = SummaryTotals::default();
    // Order -> labels of its active invoices, in first-seen order.
    let mut active_invoices: Vec<(SoNumber, Vec<String>)> = Vec::new();

    for record in records {
        let orders = record_orders(record);
        let matched = match scope {
            SummaryScope::So => orders.iter().any(|so| Some(so.key()) == so_key.as_deref()),
            SummaryScope::Customer => Some(record.customer_id.key()) == customer_key.as_deref(),
            SummaryScope::Group => record
                .invoice_group_id
                .as_deref()
                .map(normalize_key)
                .filter(|k| !k.is_empty())
                == group_key,
        };
        if !matched {
            continue;
        }

        let resolved = resolve_amount(record);
        let active = record.is_active();

        let key = match record.invoice_group_id.as_deref().map(str::trim) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => format!(
                "__{}",
                record.doc_number.clone().unwrap_or_else(|| record.payment_id.to_string())
            ),
        };
        let idx = *group_index.entry(key.clone()).or_insert_with(|| {
            groups.push(GroupBuilder {
                key: key.clone(),
                invoice_group_id: record.invoice_group_id.clone().filter(|id| !id.trim().is_empty()),
                orders: Vec::new(),
                totals: SummaryTotals::default(),
                latest_activity: None,
                docs: Vec::new(),
            });
            groups.len() - 1
        });
        let group = &mut groups[idx];

        if let Some(at) = record.activity_at() {
            if group.latest_activity.is_none_or(|latest| at > latest) {
                group.latest_activity = Some(at);
            }
        }
        for so in &orders {
            if !group.orders.contains(so) {
                group.orders.push(so.clone());
            }
        }

        if active {
            group.totals.add(record.doc_type, resolved.amount);
            totals.add(record.doc_type, resolved.amount);
        }

        if active && record.doc_type.is_invoice() {
            let label = record
                .doc_number
                .clone()
                .or_else(|| record.invoice_group_id.clone())
                .unwrap_or_else(|| "invoice".to_string());
            for so in &orders {
                match active_invoices.iter_mut().find(|(seen, _)| seen == so) {
                    Some((_, labels)) => labels.push(label.clone()),
                    None => active_invoices.push((so.clone(), vec![label.clone()])),
                }
            }
        }

        group.docs.push(DocSummary {
            payment_id: record.payment_id.clone(),
            doc_number: record.doc_number.clone(),
            doc_type: record.doc_type,
            doc_label: record.doc_type.label().to_string(),
            doc_status: record.doc_status,
            active,
            amount: resolved.amount,
            amount_source: resolved.source,
            doc_date: record.doc_date,
            due_date: record.due_date,
            payment_at: record.payment_at,
            method: record.method.clone(),
            pdf_url: record.documents.pdf_url.clone(),
            so_numbers: orders.iter().map(|so| so.as_str().to_string()).collect(),
            overdue: false,
        });
    }

    let mut warnings: Vec<String> = Vec::new();
    let mut out: Vec<GroupSummary> = Vec::with_capacity(groups.len());

    for group in groups {
        let mut sorted_orders = group.orders.clone();
        sorted_orders.sort();
        let so_numbers: Vec<String> = sorted_orders.iter().map(|so| so.as_str().to_string()).collect();

        let label = match &group.invoice_group_id {
            Some(id) => id.clone(),
            None if !so_numbers.is_empty() => format!("SO {}", so_numbers.join(", ")),
            None => "Ungrouped".to_string(),
        };

        let active_due: Vec<NaiveDate> = group
            .docs
            .iter()
            .filter(|d| d.active && d.doc_type.is_invoice())
            .filter_map(|d| d.due_date)
            .collect();
        let oldest_overdue = active_due.iter().copied().filter(|due| *due < today).min();
        let next_due = active_due.iter().copied().min();
        let overdue = group.totals.balance.is_positive() && oldest_overdue.is_some();

        let mut docs = group.docs;
        let mut group_warnings = Vec::new();
        if let (true, Some(oldest)) = (overdue, oldest_overdue) {
            for doc in docs.iter_mut() {
                doc.overdue = doc.active
                    && doc.doc_type.is_invoice()
                    && doc.due_date.is_some_and(|due| due < today);
            }
            group_warnings.push(format!(
                "Outstanding balance is past due (oldest due {}).",
                oldest.format("%Y-%m-%d")
            ));
            warnings.push(format!(
                "Invoice group {label} has an outstanding balance of {} that is past due (oldest due {}).",
                group.totals.balance,
                oldest.format("%Y-%m-%d")
            ));
        }

        out.push(GroupSummary {
            key: group.key,
            invoice_group_id: group.invoice_group_id,
            label,
            so_numbers,
            totals: group.totals,
            overdue,
            oldest_overdue: oldest_overdue.filter(|_| overdue),
            next_due,
            latest_activity: group.latest_activity,
            warnings: group_warnings,
            docs,
        });
    }

    // Most recent activity first; groups without dates sink to the bottom.
    out.sort_by(|a, b| b.latest_activity.cmp(&a.latest_activity));

    for (so, labels) in &active_invoices {
        if labels.len() > 1 {
            warnings.push(format!(
                "SO {} has multiple active invoices ({}).",
                so.as_str(),
                labels.join(", ")
            ));
        }
    }
    let mut seen = std::collections::HashSet::new();
    warnings.retain(|w| seen.insert(w.clone()));

    debug!(?scope, groups = out.len(), warnings = warnings.len(), "built ledger summary");
    Ok(LedgerSummary {
        scope,
        totals,
        groups: out,
        warnings,
    })
}

/// Primary order, order list and allocation keys, de-duplicated.
fn record_orders(record: &LedgerRecord) -> Vec<SoNumber> {
    let mut out: Vec<SoNumber> = Vec::new();
    let candidates = record
        .primary_so
        .iter()
        .chain(record.so_list.iter())
        .chain(record.allocations.orders());
    for so in candidates {
        if !out.contains(so) {
            out.push(so.clone());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn so(s: &str) -> SoNumber {
        s.parse().unwrap()
    }

    fn cents(n: i64) -> Money {
        Money::from_cents(n)
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, d).unwrap()
    }

    fn invoice(id: &str, doc: &str, orders: &[&str], gross: i64, due: Option<NaiveDate>) -> LedgerRecord {
        let orders: Vec<SoNumber> = orders.iter().map(|s| so(s)).collect();
        let mut record = LedgerRecord::new(PaymentId::new(id), DocType::SalesInvoice, "ACME".parse().unwrap())
            .with_orders(orders[0].clone(), &orders)
            .with_gross(cents(gross))
            .with_doc_number(doc);
        record.doc_date = Some(day(1));
        record.due_date = due;
        if orders.len() > 1 {
            record.invoice_group_id = Some("IG-ACME-20250301".to_string());
        }
        record
    }

    fn receipt(id: &str, orders: &[&str], gross: i64, at_day: u32) -> LedgerRecord {
        let orders: Vec<SoNumber> = orders.iter().map(|s| so(s)).collect();
        let mut record = LedgerRecord::new(PaymentId::new(id), DocType::SalesReceipt, "ACME".parse().unwrap())
            .with_orders(orders[0].clone(), &orders)
            .with_gross(cents(gross));
        record.payment_at = Some(Utc.with_ymd_and_hms(2025, 3, at_day, 12, 0, 0).unwrap());
        record
    }

    fn query_so(s: &str) -> SummaryQuery {
        SummaryQuery {
            so_number: Some(s.to_string()),
            ..SummaryQuery::default()
        }
    }

    #[test]
    fn scope_inference() {
        let q = SummaryQuery {
            so_number: Some("SO1".into()),
            customer_id: Some("ACME".into()),
            invoice_group_id: Some("IG-1".into()),
            ..SummaryQuery::default()
        };
        assert_eq!(q.resolve_scope().unwrap(), SummaryScope::Group);

        let q = SummaryQuery {
            scope: Some(SummaryScope::So),
            customer_id: Some("ACME".into()),
            ..SummaryQuery::default()
        };
        assert_eq!(q.resolve_scope().unwrap(), SummaryScope::Customer);

        let q = SummaryQuery {
            scope: Some(SummaryScope::Customer),
            so_number: Some("SO1".into()),
            ..SummaryQuery::default()
        };
        assert_eq!(q.resolve_scope().unwrap(), SummaryScope::So);

        assert!(SummaryQuery::default().resolve_scope().is_err());
    }

    #[test]
    fn balance_is_invoiced_minus_payments() {
        let records = vec![
            invoice("PAY-1", "ADM-20250301-0001", &["SO1"], 100_000, None),
            receipt("PAY-2", &["SO1"], 40_000, 2),
        ];
        let summary = summarize(&records, &query_so("so-1"), day(10)).unwrap();
        assert_eq!(summary.scope, SummaryScope::So);
        assert_eq!(summary.totals.invoiced, cents(100_000));
        assert_eq!(summary.totals.receipts, cents(40_000));
        assert_eq!(summary.totals.balance, cents(60_000));
        assert!(summary.warnings.is_empty());
    }

    #[test]
    fn inactive_documents_are_listed_but_not_totaled() {
        let mut replaced = invoice("PAY-1", "ADM-20250301-0001", &["SO1"], 100_000, None);
        replaced.doc_status = DocStatus::Replaced;
        let records = vec![
            replaced,
            invoice("PAY-2", "ADM-20250301-0002", &["SO1"], 90_000, None),
        ];
        let summary = summarize(&records, &query_so("SO1"), day(10)).unwrap();
        assert_eq!(summary.totals.invoiced, cents(90_000));
        let docs: usize = summary.groups.iter().map(|g| g.docs.len()).sum();
        assert_eq!(docs, 2);
        assert!(summary.warnings.is_empty(), "replaced invoice must not count as a second active one");
    }

    #[test]
    fn overdue_group_is_flagged_and_warned() {
        let records = vec![invoice(
            "PAY-1",
            "ADM-20250301-0001",
            &["SO1", "SO2"],
            50_000,
            Some(day(3)),
        )];
        let summary = summarize(&records, &query_so("SO2"), day(10)).unwrap();
        let group = &summary.groups[0];
        assert_eq!(group.label, "IG-ACME-20250301");
        assert!(group.overdue);
        assert_eq!(group.oldest_overdue, Some(day(3)));
        assert!(group.docs[0].overdue);
        assert_eq!(
            group.warnings,
            vec!["Outstanding balance is past due (oldest due 2025-03-03).".to_string()]
        );
        assert_eq!(
            summary.warnings,
            vec![
                "Invoice group IG-ACME-20250301 has an outstanding balance of $500.00 that is past due (oldest due 2025-03-03)."
                    .to_string()
            ]
        );
    }

    #[test]
    fn paid_invoice_is_not_overdue() {
        let records = vec![
            invoice("PAY-1", "ADM-20250301-0001", &["SO1"], 50_000, Some(day(3))),
            receipt("PAY-2", &["SO1"], 50_000, 2),
        ];
        let summary = summarize(&records, &query_so("SO1"), day(10)).unwrap();
        assert!(summary.groups.iter().all(|g| !g.overdue));
    }

    #[test]
    fn multiple_active_invoices_warning() {
        let records = vec![
            invoice("PAY-1", "ADM-20250301-0001", &["SO1"], 10_000, None),
            invoice("PAY-2", "ADM-20250301-0002", &["SO1"], 10_000, None),
        ];
        let summary = summarize(&records, &query_so("SO1"), day(10)).unwrap();
        assert_eq!(
            summary.warnings,
            vec!["SO SO1 has multiple active invoices (ADM-20250301-0001, ADM-20250301-0002).".to_string()]
        );
    }

    #[test]
    fn ungrouped_records_get_singleton_groups_sorted_by_activity() {
        let records = vec![
            receipt("PAY-1", &["SO1"], 1_000, 2),
            receipt("PAY-2", &["SO1"], 1_000, 5),
        ];
        let summary = summarize(&records, &query_so("SO1"), day(10)).unwrap();
        assert_eq!(summary.groups.len(), 2);
        assert_eq!(summary.groups[0].key, "__PAY-2");
        assert_eq!(summary.groups[0].label, "SO SO1");
    }

    #[test]
    fn customer_scope_matches_normalized_id() {
        let records = vec![receipt("PAY-1", &["SO1"], 1_000, 2)];
        let q = SummaryQuery {
            customer_id: Some("acme".into()),
            ..SummaryQuery::default()
        };
        let summary = summarize(&records, &q, day(10)).unwrap();
        assert_eq!(summary.scope, SummaryScope::Customer);
        assert_eq!(summary.totals.receipts, cents(1_000));
    }
}
