//! Append-only payment ledger boundary.
//!
//! The ledger is the source of truth for every paid-to-date, balance and
//! credit figure. Rows are appended and never rewritten; the one permitted
//! mutation is flagging the status of a superseded document.

pub mod in_memory;
pub mod postgres;
pub mod sheet;
pub mod r#trait;

pub use in_memory::InMemoryLedgerStore;
pub use postgres::PostgresLedgerStore;
pub use r#trait::{LedgerStore, StoreError};
pub use sheet::SheetLedgerStore;
