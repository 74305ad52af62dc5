//! Daily document-number sequences.
//!
//! A document number is `PREFIX-YYYYMMDD-NNNN`, with one counter per
//! (prefix, date) pair. [`DocNumberIssuer`] serializes read-increment-write
//! under its own [`BoundedLock`], so numbers are gapless and unique within a
//! process. The Postgres counter increments atomically in one statement,
//! which also serializes issuers running in different processes.

use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use chrono::NaiveDate;
use sqlx::{PgPool, Row};
use thiserror::Error;
use tokio::runtime::Handle;
use tracing::{info, instrument};

use wholesale_payments::{DocNumber, counter_key, normalize_prefix};

use crate::ledger_store::StoreError;
use crate::ledger_store::postgres::map_sqlx_error;
use crate::lock::{BoundedLock, LockTimeout};

/// Persistent integer counters keyed by name.
pub trait CounterStore: Send + Sync {
    /// Current value; 0 when the counter does not exist.
    fn get(&self, key: &str) -> Result<u32, StoreError>;

    fn set(&self, key: &str, value: u32) -> Result<(), StoreError>;

    /// Increment and return the new value.
    ///
    /// The default reads then writes; callers must hold a lock around it.
    fn increment(&self, key: &str) -> Result<u32, StoreError> {
        let next = self
            .get(key)?
            .checked_add(1)
            .ok_or_else(|| StoreError::Corrupt(format!("counter {key} overflowed")))?;
        self.set(key, next)?;
        Ok(next)
    }
}

impl<S> CounterStore for Arc<S>
where
    S: CounterStore + ?Sized,
{
    fn get(&self, key: &str) -> Result<u32, StoreError> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: u32) -> Result<(), StoreError> {
        (**self).set(key, value)
    }

    fn increment(&self, key: &str) -> Result<u32, StoreError> {
        (**self).increment(key)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryCounterStore {
    counters: RwLock<HashMap<String, u32>>,
}

impl InMemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CounterStore for InMemoryCounterStore {
    fn get(&self, key: &str) -> Result<u32, StoreError> {
        let counters = self.counters.read().map_err(|_| StoreError::poisoned())?;
        Ok(counters.get(key).copied().unwrap_or(0))
    }

    fn set(&self, key: &str, value: u32) -> Result<(), StoreError> {
        let mut counters = self.counters.write().map_err(|_| StoreError::poisoned())?;
        counters.insert(key.to_string(), value);
        Ok(())
    }
}

/// Counters kept in a JSON object on disk, so sequences survive restarts.
#[derive(Debug)]
pub struct JsonFileCounterStore {
    path: PathBuf,
    io: Mutex<()>,
}

impl JsonFileCounterStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            io: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<HashMap<String, u32>, StoreError> {
        match fs::read_to_string(&self.path) {
            Ok(text) if text.trim().is_empty() => Ok(HashMap::new()),
            Ok(text) => serde_json::from_str(&text).map_err(|e| {
                StoreError::Corrupt(format!("counter file {}: {e}", self.path.display()))
            }),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(StoreError::Backend(format!(
                "failed to read counter file {}: {e}",
                self.path.display()
            ))),
        }
    }

    fn save(&self, counters: &HashMap<String, u32>) -> Result<(), StoreError> {
        let io_error = |e: std::io::Error| {
            StoreError::Backend(format!("failed to write counter file {}: {e}", self.path.display()))
        };
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(io_error)?;
        }
        let text = serde_json::to_string_pretty(counters)
            .map_err(|e| StoreError::Backend(format!("failed to encode counters: {e}")))?;
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, text).map_err(io_error)?;
        fs::rename(&tmp, &self.path).map_err(io_error)
    }
}

impl CounterStore for JsonFileCounterStore {
    fn get(&self, key: &str) -> Result<u32, StoreError> {
        let _io = self.io.lock().map_err(|_| StoreError::poisoned())?;
        Ok(self.load()?.get(key).copied().unwrap_or(0))
    }

    fn set(&self, key: &str, value: u32) -> Result<(), StoreError> {
        let _io = self.io.lock().map_err(|_| StoreError::poisoned())?;
        let mut counters = self.load()?;
        counters.insert(key.to_string(), value);
        self.save(&counters)
    }
}

const COUNTER_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS doc_counters (
    key TEXT PRIMARY KEY,
    value BIGINT NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
)
"#;

/// Counters in the `doc_counters` table.
#[derive(Debug, Clone)]
pub struct PostgresCounterStore {
    pool: Arc<PgPool>,
    handle: Handle,
}

impl PostgresCounterStore {
    pub async fn connect(pool: PgPool) -> Result<Self, StoreError> {
        let handle = Handle::try_current().map_err(|_| {
            StoreError::Unavailable("PostgresCounterStore requires a tokio runtime".to_string())
        })?;
        sqlx::query(COUNTER_SCHEMA)
            .execute(&pool)
            .await
            .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        Ok(Self {
            pool: Arc::new(pool),
            handle,
        })
    }

    #[instrument(skip(self), err)]
    pub async fn load(&self, key: &str) -> Result<u32, StoreError> {
        let row = sqlx::query("SELECT value FROM doc_counters WHERE key = $1")
            .bind(key)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("load_counter", e))?;
        match row {
            Some(row) => decode_value(row.try_get("value")),
            None => Ok(0),
        }
    }

    #[instrument(skip(self), err)]
    pub async fn store(&self, key: &str, value: u32) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO doc_counters (key, value) VALUES ($1, $2)
            ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value, updated_at = now()
            "#,
        )
        .bind(key)
        .bind(i64::from(value))
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("store_counter", e))?;
        Ok(())
    }

    /// Atomic upsert-increment.
    #[instrument(skip(self), err)]
    pub async fn bump(&self, key: &str) -> Result<u32, StoreError> {
        let row = sqlx::query(
            r#"
            INSERT INTO doc_counters (key, value) VALUES ($1, 1)
            ON CONFLICT (key) DO UPDATE SET value = doc_counters.value + 1, updated_at = now()
            RETURNING value
            "#,
        )
        .bind(key)
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("bump_counter", e))?;
        decode_value(row.try_get("value"))
    }
}

fn decode_value(value: Result<i64, sqlx::Error>) -> Result<u32, StoreError> {
    let value = value.map_err(|e| StoreError::Corrupt(format!("failed to read counter: {e}")))?;
    u32::try_from(value).map_err(|_| StoreError::Corrupt(format!("counter value {value} out of range")))
}

impl CounterStore for PostgresCounterStore {
    fn get(&self, key: &str) -> Result<u32, StoreError> {
        self.handle.block_on(self.load(key))
    }

    fn set(&self, key: &str, value: u32) -> Result<(), StoreError> {
        self.handle.block_on(self.store(key, value))
    }

    fn increment(&self, key: &str) -> Result<u32, StoreError> {
        self.handle.block_on(self.bump(key))
    }
}

#[derive(Debug, Error)]
pub enum IssueError {
    #[error(transparent)]
    Timeout(#[from] LockTimeout),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub const DEFAULT_SEQUENCE_WAIT: Duration = Duration::from_secs(5);

/// Issues `PREFIX-YYYYMMDD-NNNN` numbers from a [`CounterStore`].
#[derive(Debug)]
pub struct DocNumberIssuer<C> {
    counters: C,
    lock: BoundedLock,
}

impl<C: CounterStore> DocNumberIssuer<C> {
    pub fn new(counters: C, wait: Duration) -> Self {
        Self {
            counters,
            lock: BoundedLock::new("document sequence", wait),
        }
    }

    pub fn counters(&self) -> &C {
        &self.counters
    }

    pub fn issue(&self, prefix: &str, date: NaiveDate) -> Result<String, IssueError> {
        let prefix = normalize_prefix(prefix);
        let key = counter_key(&prefix, date);

        let _guard = self.lock.acquire()?;
        let sequence = self.counters.increment(&key)?;
        let number = DocNumber::new(&prefix, date, sequence).to_string();

        info!(doc_number = %number, counter = %key, "document number issued");
        Ok(number)
    }
}
