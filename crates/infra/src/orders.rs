//! Order sheets and paid-to-date writeback.
//!
//! Order tabs carry a denormalized copy of each order's paid-to-date and
//! remaining balance. The ledger stays authoritative: the [`Reconciler`]
//! replays it and rewrites snapshot cells that drifted by a cent or more.

use std::sync::{Arc, RwLock};

use serde::Serialize;
use tracing::{debug, info, warn};

use wholesale_core::{CustomerId, Money, SoNumber};
use wholesale_payments::{LedgerRecord, sum_receipts_for_orders};

use crate::ledger_store::{LedgerStore, StoreError};
use crate::schema::{OrderColumns, Sheet};

/// One order row as read from an order tab.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderSnapshot {
    pub so: SoNumber,
    pub customer_id: Option<CustomerId>,
    pub product_description: String,
    pub order_total: Option<Money>,
    pub paid_to_date: Option<Money>,
    pub remaining_balance: Option<Money>,
    pub tab: String,
}

/// External order table.
pub trait OrderStore: Send + Sync {
    fn find(&self, so: &SoNumber) -> Result<Option<OrderSnapshot>, StoreError>;

    fn list_for_customer(&self, customer_id: &CustomerId, limit: usize) -> Result<Vec<OrderSnapshot>, StoreError>;

    fn write_snapshot(&self, so: &SoNumber, paid_to_date: Money, remaining_balance: Money) -> Result<(), StoreError>;
}

impl<S> OrderStore for Arc<S>
where
    S: OrderStore + ?Sized,
{
    fn find(&self, so: &SoNumber) -> Result<Option<OrderSnapshot>, StoreError> {
        (**self).find(so)
    }

    fn list_for_customer(&self, customer_id: &CustomerId, limit: usize) -> Result<Vec<OrderSnapshot>, StoreError> {
        (**self).list_for_customer(customer_id, limit)
    }

    fn write_snapshot(&self, so: &SoNumber, paid_to_date: Money, remaining_balance: Money) -> Result<(), StoreError> {
        (**self).write_snapshot(so, paid_to_date, remaining_balance)
    }
}

/// Order store over one or more in-memory tabs.
#[derive(Debug, Default)]
pub struct SheetOrderStore {
    tabs: RwLock<Vec<Sheet>>,
    columns: OrderColumns,
    tab_names: Vec<String>,
}

impl SheetOrderStore {
    pub fn new(tabs: Vec<Sheet>, columns: OrderColumns) -> Self {
        Self {
            tabs: RwLock::new(tabs),
            columns,
            tab_names: Vec::new(),
        }
    }

    /// Only read tabs with these names (case-insensitive). Empty means all tabs.
    pub fn with_tab_names(mut self, names: &[String]) -> Self {
        self.tab_names = names
            .iter()
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .collect();
        self
    }

    pub fn add_tab(&self, tab: Sheet) -> Result<(), StoreError> {
        let mut tabs = self.tabs.write().map_err(|_| StoreError::poisoned())?;
        tabs.push(tab);
        Ok(())
    }

    /// Copy of the tabs.
    pub fn snapshot(&self) -> Result<Vec<Sheet>, StoreError> {
        let tabs = self.tabs.read().map_err(|_| StoreError::poisoned())?;
        Ok(tabs.clone())
    }

    fn searchable(&self, tab: &Sheet) -> bool {
        self.tab_names.is_empty()
            || self
                .tab_names
                .iter()
                .any(|name| name.eq_ignore_ascii_case(tab.name.trim()))
    }

    fn read_row(&self, tab: &Sheet, row: usize, so: SoNumber) -> OrderSnapshot {
        let text = |aliases: &[String]| {
            tab.column(aliases)
                .map(|col| tab.cell(row, col))
                .unwrap_or("")
        };
        let amount = |aliases: &[String]| {
            let cell = text(aliases);
            if cell.is_empty() {
                None
            } else {
                Money::parse(cell).ok()
            }
        };
        OrderSnapshot {
            so,
            customer_id: CustomerId::new(text(&self.columns.customer_id)),
            product_description: text(&self.columns.product_description).to_string(),
            order_total: amount(&self.columns.order_total),
            paid_to_date: amount(&self.columns.paid_to_date),
            remaining_balance: amount(&self.columns.remaining_balance),
            tab: tab.name.clone(),
        }
    }

    /// (tab index, row index) of the first row for `so`.
    fn locate(&self, tabs: &[Sheet], so: &SoNumber) -> Option<(usize, usize)> {
        tabs.iter()
            .enumerate()
            .filter(|(_, tab)| self.searchable(tab))
            .find_map(|(tab_idx, tab)| {
                let so_col = tab.column(&self.columns.so)?;
                (0..tab.rows.len())
                    .find(|&row| so.matches(tab.cell(row, so_col)))
                    .map(|row| (tab_idx, row))
            })
    }
}

impl OrderStore for SheetOrderStore {
    fn find(&self, so: &SoNumber) -> Result<Option<OrderSnapshot>, StoreError> {
        let tabs = self.tabs.read().map_err(|_| StoreError::poisoned())?;
        Ok(self
            .locate(&tabs, so)
            .map(|(tab, row)| self.read_row(&tabs[tab], row, so.clone())))
    }

    fn list_for_customer(&self, customer_id: &CustomerId, limit: usize) -> Result<Vec<OrderSnapshot>, StoreError> {
        let tabs = self.tabs.read().map_err(|_| StoreError::poisoned())?;
        let mut out = Vec::new();
        for tab in tabs.iter().filter(|tab| self.searchable(tab)) {
            let (Some(so_col), Some(cust_col)) = (
                tab.column(&self.columns.so),
                tab.column(&self.columns.customer_id),
            ) else {
                continue;
            };
            for row in 0..tab.rows.len() {
                if out.len() >= limit {
                    return Ok(out);
                }
                let cust = tab.cell(row, cust_col);
                if cust.is_empty() || !customer_id.matches(cust) {
                    continue;
                }
                if let Some(so) = SoNumber::new(tab.cell(row, so_col)) {
                    out.push(self.read_row(tab, row, so));
                }
            }
        }
        Ok(out)
    }

    fn write_snapshot(&self, so: &SoNumber, paid_to_date: Money, remaining_balance: Money) -> Result<(), StoreError> {
        let mut tabs = self.tabs.write().map_err(|_| StoreError::poisoned())?;
        let (tab_idx, row) = self
            .locate(&tabs, so)
            .ok_or_else(|| StoreError::NotFound(format!("order {so}")))?;
        let tab = &mut tabs[tab_idx];

        let paid_col = tab.column(&self.columns.paid_to_date);
        let balance_col = tab.column(&self.columns.remaining_balance);
        if paid_col.is_none() && balance_col.is_none() {
            return Err(StoreError::Corrupt(format!(
                "tab {} has no paid-to-date or balance column",
                tab.name
            )));
        }
        if let Some(col) = paid_col {
            tab.set_cell(row, col, paid_to_date.to_decimal_string());
        }
        if let Some(col) = balance_col {
            tab.set_cell(row, col, remaining_balance.to_decimal_string());
        }
        debug!(tab = %tab.name, so = %so, paid = %paid_to_date, balance = %remaining_balance, "order snapshot written");
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WritebackFailure {
    pub so: String,
    pub error: String,
}

/// Outcome of a snapshot refresh.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub written: Vec<String>,
    pub unchanged: Vec<String>,
    pub missing: Vec<String>,
    pub failed: Vec<WritebackFailure>,
}

/// Replays the ledger into order snapshots.
pub struct Reconciler<'a, L: ?Sized, O: ?Sized> {
    ledger: &'a L,
    orders: &'a O,
}

impl<'a, L, O> Reconciler<'a, L, O>
where
    L: LedgerStore + ?Sized,
    O: OrderStore + ?Sized,
{
    pub fn new(ledger: &'a L, orders: &'a O) -> Self {
        Self { ledger, orders }
    }

    /// Scan the ledger and refresh `orders`.
    pub fn refresh(&self, orders: &[SoNumber]) -> Result<ReconcileReport, StoreError> {
        let records = self.ledger.scan()?;
        Ok(self.refresh_from(&records, orders))
    }

    /// Refresh `orders` from already-loaded records. Per-order failures are
    /// reported, not returned.
    pub fn refresh_from(&self, records: &[LedgerRecord], orders: &[SoNumber]) -> ReconcileReport {
        let paid = sum_receipts_for_orders(records, orders);
        let mut report = ReconcileReport::default();

        for entry in &paid {
            let so = &entry.so;
            let snapshot = match self.orders.find(so) {
                Ok(Some(snapshot)) => snapshot,
                Ok(None) => {
                    report.missing.push(so.to_string());
                    continue;
                }
                Err(e) => {
                    warn!(so = %so, error = %e, "order lookup failed during reconcile");
                    report.failed.push(WritebackFailure {
                        so: so.to_string(),
                        error: e.to_string(),
                    });
                    continue;
                }
            };

            if snapshot.paid_to_date == Some(entry.amount) {
                report.unchanged.push(so.to_string());
                continue;
            }

            let total = snapshot.order_total.unwrap_or(Money::ZERO);
            let remaining = (total - entry.amount).clamp_non_negative();
            match self.orders.write_snapshot(so, entry.amount, remaining) {
                Ok(()) => report.written.push(so.to_string()),
                Err(e) => {
                    warn!(so = %so, error = %e, "order snapshot writeback failed");
                    report.failed.push(WritebackFailure {
                        so: so.to_string(),
                        error: e.to_string(),
                    });
                }
            }
        }

        info!(
            written = report.written.len(),
            unchanged = report.unchanged.len(),
            missing = report.missing.len(),
            failed = report.failed.len(),
            "order snapshots reconciled"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger_store::InMemoryLedgerStore;
    use wholesale_core::PaymentId;
    use wholesale_payments::DocType;

    fn so(s: &str) -> SoNumber {
        s.parse().unwrap()
    }

    fn orders_tab() -> Sheet {
        let mut tab = Sheet::new(
            "Orders",
            &["SO#", "Customer ID", "Product Description", "Order Total", "Paid-to-Date", "Remaining Balance"],
        );
        tab.push_row(&["SO-1", "ACME", "Gold ring", "1000", "0", "1000"]);
        tab.push_row(&["SO-2", "acme", "Chain", "$250.00", "250", "0"]);
        tab.push_row(&["SO-3", "", "Loose stone", "75", "", ""]);
        tab.push_row(&["SO-4", "Other Co", "Pendant", "80", "", ""]);
        tab
    }

    fn store() -> SheetOrderStore {
        SheetOrderStore::new(vec![orders_tab()], OrderColumns::default())
    }

    fn receipt(id: &str, so_number: &str, cents: i64) -> LedgerRecord {
        LedgerRecord::new(PaymentId::new(id), DocType::SalesReceipt, "ACME".parse().unwrap())
            .with_orders(so(so_number), &[])
            .with_gross(Money::from_cents(cents))
    }

    #[test]
    fn find_matches_normalized_order_numbers() {
        let found = store().find(&so("so 1")).unwrap().unwrap();
        assert_eq!(found.product_description, "Gold ring");
        assert_eq!(found.order_total, Some(Money::from_cents(100_000)));
        assert_eq!(found.customer_id, Some("ACME".parse().unwrap()));
        assert!(store().find(&so("SO-9")).unwrap().is_none());
    }

    #[test]
    fn customer_listing_skips_blank_ids_and_honors_limit() {
        let store = store();
        let acme: CustomerId = "ACME".parse().unwrap();
        let listed: Vec<_> = store
            .list_for_customer(&acme, 10)
            .unwrap()
            .into_iter()
            .map(|o| o.so.to_string())
            .collect();
        assert_eq!(listed, vec!["SO-1", "SO-2"]);
        assert_eq!(store.list_for_customer(&acme, 1).unwrap().len(), 1);
    }

    #[test]
    fn tab_restriction_hides_other_tabs() {
        let store = SheetOrderStore::new(vec![orders_tab()], OrderColumns::default())
            .with_tab_names(&["Archive".to_string()]);
        assert!(store.find(&so("SO-1")).unwrap().is_none());
    }

    #[test]
    fn reconcile_writes_only_drifted_orders() {
        let ledger = InMemoryLedgerStore::new();
        ledger.append(receipt("PAY-1", "SO-1", 40_000)).unwrap();
        ledger.append(receipt("PAY-2", "SO-2", 25_000)).unwrap();
        let orders = store();

        let report = Reconciler::new(&ledger, &orders)
            .refresh(&[so("SO-1"), so("SO-2"), so("SO-9")])
            .unwrap();
        assert_eq!(report.written, vec!["SO-1"]);
        assert_eq!(report.unchanged, vec!["SO-2"]);
        assert_eq!(report.missing, vec!["SO-9"]);
        assert!(report.failed.is_empty());

        let updated = orders.find(&so("SO-1")).unwrap().unwrap();
        assert_eq!(updated.paid_to_date, Some(Money::from_cents(40_000)));
        assert_eq!(updated.remaining_balance, Some(Money::from_cents(60_000)));
    }

    #[test]
    fn writeback_failures_are_reported() {
        let mut tab = Sheet::new("Orders", &["SO#", "Order Total"]);
        tab.push_row(&["SO-1", "100"]);
        let orders = SheetOrderStore::new(vec![tab], OrderColumns::default());
        let ledger = InMemoryLedgerStore::new();
        ledger.append(receipt("PAY-1", "SO-1", 5_000)).unwrap();

        let report = Reconciler::new(&ledger, &orders).refresh(&[so("SO-1")]).unwrap();
        assert!(report.written.is_empty());
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].so, "SO-1");
    }
}
