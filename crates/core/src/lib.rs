//! `wholesale-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! money in whole cents, normalized order/customer identifiers and the domain
//! error model shared by the ledger crates.

pub mod error;
pub mod id;
pub mod money;

pub use error::{DomainError, DomainResult};
pub use id::{CustomerId, PaymentId, SoNumber, normalize_key};
pub use money::{Money, MoneyParseError};
