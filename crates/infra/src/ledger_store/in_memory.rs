use std::sync::RwLock;

use tracing::info;

use wholesale_payments::{DocStatus, LedgerRecord};

use super::r#trait::{LedgerStore, StoreError};

/// In-memory append-only ledger.
///
/// Intended for tests/dev. Not optimized for performance.
#[derive(Debug, Default)]
pub struct InMemoryLedgerStore {
    rows: RwLock<Vec<LedgerRecord>>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: Vec<LedgerRecord>) -> Self {
        Self {
            rows: RwLock::new(records),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.read().map(|rows| rows.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl LedgerStore for InMemoryLedgerStore {
    fn append(&self, record: LedgerRecord) -> Result<(), StoreError> {
        let mut rows = self.rows.write().map_err(|_| StoreError::poisoned())?;
        if rows.iter().any(|r| r.payment_id == record.payment_id) {
            return Err(StoreError::Duplicate(format!(
                "payment id {} is already in the ledger",
                record.payment_id
            )));
        }
        info!(
            payment_id = %record.payment_id,
            doc_type = %record.doc_type,
            doc_number = record.doc_number.as_deref().unwrap_or(""),
            "ledger row appended"
        );
        rows.push(record);
        Ok(())
    }

    fn scan(&self) -> Result<Vec<LedgerRecord>, StoreError> {
        let rows = self.rows.read().map_err(|_| StoreError::poisoned())?;
        Ok(rows.clone())
    }

    fn mark_status(&self, doc_number: &str, status: DocStatus) -> Result<usize, StoreError> {
        let mut rows = self.rows.write().map_err(|_| StoreError::poisoned())?;
        let mut touched = 0;
        for row in rows
            .iter_mut()
            .filter(|r| r.doc_number.as_deref().map(str::trim) == Some(doc_number))
        {
            row.doc_status = status;
            touched += 1;
        }
        Ok(touched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wholesale_core::{Money, PaymentId};
    use wholesale_payments::DocType;

    fn record(id: &str, doc: &str) -> LedgerRecord {
        LedgerRecord::new(PaymentId::new(id), DocType::SalesInvoice, "ACME".parse().unwrap())
            .with_doc_number(doc)
            .with_gross(Money::from_cents(1_000))
    }

    #[test]
    fn append_then_scan_preserves_order() {
        let store = InMemoryLedgerStore::new();
        store.append(record("PAY-1", "ADM-1")).unwrap();
        store.append(record("PAY-2", "ADM-2")).unwrap();
        let ids: Vec<_> = store.scan().unwrap().into_iter().map(|r| r.payment_id).collect();
        assert_eq!(ids, vec![PaymentId::new("PAY-1"), PaymentId::new("PAY-2")]);
    }

    #[test]
    fn duplicate_payment_ids_are_rejected() {
        let store = InMemoryLedgerStore::new();
        store.append(record("PAY-1", "ADM-1")).unwrap();
        assert!(matches!(
            store.append(record("PAY-1", "ADM-2")),
            Err(StoreError::Duplicate(_))
        ));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn mark_status_flags_every_matching_row() {
        let store = InMemoryLedgerStore::new();
        store.append(record("PAY-1", "ADM-1")).unwrap();
        store.append(record("PAY-2", "ADM-1")).unwrap();
        store.append(record("PAY-3", "ADM-2")).unwrap();

        assert_eq!(store.mark_status("ADM-1", DocStatus::Void).unwrap(), 2);
        let statuses: Vec<_> = store.scan().unwrap().into_iter().map(|r| r.doc_status).collect();
        assert_eq!(statuses, vec![DocStatus::Void, DocStatus::Void, DocStatus::Issued]);
        assert_eq!(store.mark_status("ADM-9", DocStatus::Void).unwrap(), 0);
    }
}
