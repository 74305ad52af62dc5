//! Infrastructure layer: ledger storage, order snapshots, numbering, rendering, config.
//!
//! The pure rules live in `wholesale-payments`; this crate gives them a place
//! to read from and write to, and wires them together in [`service`].

pub mod config;
pub mod ledger_store;
pub mod lock;
pub mod orders;
pub mod renderer;
pub mod schema;
pub mod sequence;
pub mod service;

#[cfg(test)]
mod integration_tests;

pub use config::{ConfigError, EnvProperties, PropertySource, Settings};
pub use ledger_store::{InMemoryLedgerStore, LedgerStore, PostgresLedgerStore, SheetLedgerStore, StoreError};
pub use lock::{BoundedLock, LockGuard, LockTimeout};
pub use orders::{OrderSnapshot, OrderStore, ReconcileReport, Reconciler, SheetOrderStore, WritebackFailure};
pub use renderer::{DocumentModel, DocumentRenderer, FilesystemRenderer, RenderError, RenderedDocument};
pub use sequence::{
    CounterStore, DocNumberIssuer, InMemoryCounterStore, IssueError, JsonFileCounterStore,
    PostgresCounterStore,
};
pub use service::{CreditIssued, OverageCreditFailure, PaymentService, ServiceError, SubmissionOutcome};
