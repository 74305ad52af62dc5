//! Postgres-backed ledger implementation.
//!
//! Each ledger row is stored as a JSONB document in `ledger_records`, next to
//! the few columns needed for lookups (`payment_id`, `doc_number`,
//! `doc_status`). Rows are ordered by a `BIGSERIAL` sequence so `scan` replays
//! them in append order.
//!
//! ## Error Mapping
//!
//! SQLx errors are mapped to `StoreError` as follows:
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError | Scenario |
//! |------------|----------------------|------------|----------|
//! | Database (unique violation) | `23505` | `Duplicate` | Payment id already appended |
//! | Database (other) | Any other | `Backend` | Constraint or query failure |
//! | PoolClosed / PoolTimedOut | N/A | `Unavailable` | Pool closed or exhausted |
//! | Other | N/A | `Backend` | Network errors, connection failures, etc. |
//!
//! ## Sync bridge
//!
//! `LedgerStore` is synchronous. The store captures the `tokio` runtime handle
//! it was created on and blocks on it, so trait methods must be called from a
//! blocking thread (`spawn_blocking` or a plain thread), never from inside an
//! async task.

use std::future::Future;
use std::sync::Arc;

use sqlx::{PgPool, Row};
use tokio::runtime::Handle;
use tracing::{Span, instrument};

use wholesale_payments::{DocStatus, LedgerRecord};

use super::r#trait::{LedgerStore, StoreError};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS ledger_records (
    seq BIGSERIAL PRIMARY KEY,
    payment_id TEXT NOT NULL UNIQUE,
    doc_number TEXT,
    doc_status TEXT NOT NULL,
    customer_key TEXT NOT NULL,
    record JSONB NOT NULL,
    appended_at TIMESTAMPTZ NOT NULL DEFAULT now()
)
"#;

const DOC_NUMBER_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS ledger_records_doc_number_idx ON ledger_records (doc_number)";

/// Postgres-backed append-only ledger.
#[derive(Debug, Clone)]
pub struct PostgresLedgerStore {
    pool: Arc<PgPool>,
    handle: Handle,
    scan_window: Option<usize>,
}

impl PostgresLedgerStore {
    /// Create the store and its table if missing.
    ///
    /// Must be awaited inside a tokio runtime; the runtime handle is captured
    /// for the synchronous trait methods.
    pub async fn connect(pool: PgPool) -> Result<Self, StoreError> {
        let handle = Handle::try_current().map_err(|_| {
            StoreError::Unavailable("PostgresLedgerStore requires a tokio runtime".to_string())
        })?;
        let store = Self {
            pool: Arc::new(pool),
            handle,
            scan_window: None,
        };
        store.ensure_schema().await?;
        Ok(store)
    }

    pub fn with_scan_window(mut self, window: Option<usize>) -> Self {
        self.scan_window = window.filter(|w| *w > 0);
        self
    }

    #[instrument(skip(self), err)]
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        for statement in [SCHEMA, DOC_NUMBER_INDEX] {
            sqlx::query(statement)
                .execute(&*self.pool)
                .await
                .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        }
        Ok(())
    }

    #[instrument(
        skip(self, record),
        fields(
            payment_id = %record.payment_id,
            doc_type = %record.doc_type,
            doc_number = record.doc_number.as_deref().unwrap_or("")
        ),
        err
    )]
    pub async fn append_record(&self, record: &LedgerRecord) -> Result<(), StoreError> {
        let payload = serde_json::to_value(record)
            .map_err(|e| StoreError::Backend(format!("failed to encode ledger record: {e}")))?;

        sqlx::query(
            r#"
            INSERT INTO ledger_records (payment_id, doc_number, doc_status, customer_key, record)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(record.payment_id.as_str())
        .bind(record.doc_number.as_deref())
        .bind(record.doc_status.as_str())
        .bind(record.customer_id.key())
        .bind(payload)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("append_record", e))?;

        Ok(())
    }

    #[instrument(skip(self), fields(record_count), err)]
    pub async fn load_records(&self) -> Result<Vec<LedgerRecord>, StoreError> {
        let limit = self.scan_window.map(|w| w as i64);
        let rows = sqlx::query(
            r#"
            SELECT record FROM (
                SELECT seq, record
                FROM ledger_records
                ORDER BY seq DESC
                LIMIT $1
            ) recent
            ORDER BY seq ASC
            "#,
        )
        .bind(limit)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_records", e))?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let payload: serde_json::Value = row
                .try_get("record")
                .map_err(|e| StoreError::Corrupt(format!("failed to read ledger row: {e}")))?;
            let record: LedgerRecord = serde_json::from_value(payload)
                .map_err(|e| StoreError::Corrupt(format!("failed to decode ledger row: {e}")))?;
            records.push(record);
        }

        Span::current().record("record_count", records.len());
        Ok(records)
    }

    #[instrument(skip(self), fields(status = %status), err)]
    pub async fn update_status(&self, doc_number: &str, status: DocStatus) -> Result<usize, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE ledger_records
            SET doc_status = $2,
                record = jsonb_set(record, '{doc_status}', to_jsonb($2::text))
            WHERE doc_number = $1
            "#,
        )
        .bind(doc_number)
        .bind(status.as_str())
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("update_status", e))?;

        Ok(result.rows_affected() as usize)
    }

    fn block_on<F: Future>(&self, fut: F) -> F::Output {
        self.handle.block_on(fut)
    }
}

impl LedgerStore for PostgresLedgerStore {
    fn append(&self, record: LedgerRecord) -> Result<(), StoreError> {
        self.block_on(self.append_record(&record))
    }

    fn scan(&self) -> Result<Vec<LedgerRecord>, StoreError> {
        self.block_on(self.load_records())
    }

    fn mark_status(&self, doc_number: &str, status: DocStatus) -> Result<usize, StoreError> {
        self.block_on(self.update_status(doc_number, status))
    }
}

/// Map SQLx errors to StoreError.
pub(crate) fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => StoreError::Duplicate(msg),
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            StoreError::Unavailable(format!("connection pool closed in {}", operation))
        }
        sqlx::Error::PoolTimedOut => {
            StoreError::Unavailable(format!("connection pool timed out in {}", operation))
        }
        _ => StoreError::Backend(format!("sqlx error in {}: {}", operation, err)),
    }
}
