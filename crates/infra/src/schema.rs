//! Tabular data and header-alias resolution.
//!
//! Order sheets are maintained by hand, so the same column shows up as `SO#`,
//! `Sales Order` or `SO` depending on who built the tab. Columns are located by
//! trying a list of aliases in order; the first header that matches (trimmed,
//! case-insensitive) wins. Domain code never sees header names.

use serde::{Deserialize, Serialize};

/// A header row plus string rows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sheet {
    pub name: String,
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Sheet {
    pub fn new(name: impl Into<String>, header: &[&str]) -> Self {
        Self {
            name: name.into(),
            header: header.iter().map(|h| h.to_string()).collect(),
            rows: Vec::new(),
        }
    }

    pub fn push_row(&mut self, cells: &[&str]) {
        self.rows.push(cells.iter().map(|c| c.to_string()).collect());
    }

    /// Index of the first header matching one of `aliases`.
    pub fn column(&self, aliases: &[String]) -> Option<usize> {
        aliases.iter().find_map(|alias| {
            let alias = alias.trim();
            self.header
                .iter()
                .position(|h| h.trim().eq_ignore_ascii_case(alias))
        })
    }

    pub fn column_named(&self, name: &str) -> Option<usize> {
        self.header.iter().position(|h| h.trim() == name)
    }

    /// Trimmed cell text; empty when the row is short.
    pub fn cell(&self, row: usize, col: usize) -> &str {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .map(|c| c.trim())
            .unwrap_or("")
    }

    pub fn set_cell(&mut self, row: usize, col: usize, value: impl Into<String>) {
        if let Some(cells) = self.rows.get_mut(row) {
            if cells.len() <= col {
                cells.resize(col + 1, String::new());
            }
            cells[col] = value.into();
        }
    }

    /// Append any of `required` missing from the header row. Returns the added names.
    pub fn ensure_headers(&mut self, required: &[&str]) -> Vec<String> {
        let mut added = Vec::new();
        for name in required {
            if self.column_named(name).is_none() {
                self.header.push(name.to_string());
                added.push(name.to_string());
            }
        }
        added
    }
}

/// Ledger header set, in column order.
pub const LEDGER_HEADERS: &[&str] = &[
    "PaymentID",
    "TransactionID",
    "InvoiceGroupID",
    "DocNumber",
    "DocType",
    "DocFlavor",
    "DocStatus",
    "SupersedesDoc#",
    "SupersedeAction",
    "CustomerID",
    "CompanyName",
    "ContactName",
    "Address",
    "SOsCSV",
    "PrimarySO",
    "AllocationMode",
    "AllocationsJSON",
    "LinesJSON",
    "LinesSubtotal",
    "ShippingJSON",
    "ShippingTotal",
    "DOC_DATE",
    "DueDate",
    "PaymentDateTime",
    "AmountGross",
    "Method",
    "Reference",
    "Notes",
    "FeePercent",
    "FeeFlat",
    "FeeAmount",
    "AmountNet",
    "PDF_URL",
    "DOC_URL",
    "CustomerOrderTrackerURL",
    "SubmittedBy",
    "SubmittedAt",
];

pub const SO_ALIASES: &[&str] = &["SO#", "SO", "Sales Order", "Sales Order #"];
pub const CUSTOMER_ID_ALIASES: &[&str] = &[
    "Customer (Company) ID",
    "Customer ID",
    "CustomerID",
    "ClientID",
    "Account Code",
];
pub const PRODUCT_DESC_ALIASES: &[&str] = &[
    "Product Description",
    "Prod Description",
    "Product",
    "Description",
    "Short Description",
];
pub const PAID_TO_DATE_ALIASES: &[&str] =
    &["Paid-to-Date", "Paid To Date", "Paid-To-Date", "Paid to Date", "Paid"];
pub const ORDER_TOTAL_ALIASES: &[&str] = &["Order Total", "OrderTotal", "Total"];
pub const REMAINING_BALANCE_ALIASES: &[&str] = &["Remaining Balance", "Balance", "RB"];

/// Custom aliases first, then the defaults, de-duplicated case-insensitively.
pub fn merge_aliases(custom: &[String], defaults: &[&str]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let candidates = custom
        .iter()
        .map(|s| s.trim().to_string())
        .chain(defaults.iter().map(|s| s.to_string()));
    for alias in candidates {
        if alias.is_empty() || out.iter().any(|a| a.eq_ignore_ascii_case(&alias)) {
            continue;
        }
        out.push(alias);
    }
    out
}

/// Column aliases for order sheets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderColumns {
    pub so: Vec<String>,
    pub customer_id: Vec<String>,
    pub product_description: Vec<String>,
    pub paid_to_date: Vec<String>,
    pub order_total: Vec<String>,
    pub remaining_balance: Vec<String>,
}

impl Default for OrderColumns {
    fn default() -> Self {
        Self::with_overrides(&[], &[], &[])
    }
}

impl OrderColumns {
    pub fn with_overrides(so: &[String], customer_id: &[String], product_description: &[String]) -> Self {
        Self {
            so: merge_aliases(so, SO_ALIASES),
            customer_id: merge_aliases(customer_id, CUSTOMER_ID_ALIASES),
            product_description: merge_aliases(product_description, PRODUCT_DESC_ALIASES),
            paid_to_date: merge_aliases(&[], PAID_TO_DATE_ALIASES),
            order_total: merge_aliases(&[], ORDER_TOTAL_ALIASES),
            remaining_balance: merge_aliases(&[], REMAINING_BALANCE_ALIASES),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_matching_alias_wins() {
        let sheet = Sheet::new("Orders", &["Total", "sales order", "Order Total"]);
        let columns = OrderColumns::default();
        assert_eq!(sheet.column(&columns.so), Some(1));
        assert_eq!(sheet.column(&columns.order_total), Some(2));
        assert_eq!(sheet.column(&columns.customer_id), None);
    }

    #[test]
    fn custom_aliases_come_first_without_duplicates() {
        let merged = merge_aliases(&["Order No".to_string(), "so".to_string()], SO_ALIASES);
        assert_eq!(merged, vec!["Order No", "so", "SO#", "Sales Order", "Sales Order #"]);
    }

    #[test]
    fn ensure_headers_appends_only_missing() {
        let mut sheet = Sheet::new("Ledger", &["PaymentID", "Custom"]);
        let added = sheet.ensure_headers(LEDGER_HEADERS);
        assert_eq!(added.len(), LEDGER_HEADERS.len() - 1);
        assert_eq!(sheet.header[1], "Custom");
        assert!(sheet.ensure_headers(LEDGER_HEADERS).is_empty());
    }

    #[test]
    fn cells_are_trimmed_and_padded() {
        let mut sheet = Sheet::new("Orders", &["SO", "Paid"]);
        sheet.push_row(&[" SO1 "]);
        assert_eq!(sheet.cell(0, 0), "SO1");
        assert_eq!(sheet.cell(0, 1), "");
        sheet.set_cell(0, 1, "10.00");
        assert_eq!(sheet.cell(0, 1), "10.00");
    }
}
