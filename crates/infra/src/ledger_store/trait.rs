use std::sync::Arc;

use thiserror::Error;

use wholesale_payments::{DocStatus, LedgerRecord};

/// Storage operation error.
///
/// These are **infrastructure errors** (backend failures, undecodable rows) as
/// opposed to domain errors (validation, conflicts). They are shared by the
/// ledger, counter and order stores.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage backend failure: {0}")]
    Backend(String),

    #[error("stored data could not be decoded: {0}")]
    Corrupt(String),

    #[error("record already exists: {0}")]
    Duplicate(String),

    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("not found: {0}")]
    NotFound(String),
}

impl StoreError {
    pub(crate) fn poisoned() -> Self {
        StoreError::Backend("lock poisoned".to_string())
    }
}

/// Append-only payment ledger.
///
/// ## Contract
///
/// - `append` adds one row; existing rows are never rewritten.
/// - `scan` returns rows in append order (oldest first). Implementations with
///   a scan window return only the most recent rows.
/// - `mark_status` flags every row carrying `doc_number` and returns how many
///   rows it touched. It is the only mutation of existing rows.
pub trait LedgerStore: Send + Sync {
    fn append(&self, record: LedgerRecord) -> Result<(), StoreError>;

    fn scan(&self) -> Result<Vec<LedgerRecord>, StoreError>;

    fn mark_status(&self, doc_number: &str, status: DocStatus) -> Result<usize, StoreError>;
}

impl<S> LedgerStore for Arc<S>
where
    S: LedgerStore + ?Sized,
{
    fn append(&self, record: LedgerRecord) -> Result<(), StoreError> {
        (**self).append(record)
    }

    fn scan(&self) -> Result<Vec<LedgerRecord>, StoreError> {
        (**self).scan()
    }

    fn mark_status(&self, doc_number: &str, status: DocStatus) -> Result<usize, StoreError> {
        (**self).mark_status(doc_number, status)
    }
}
