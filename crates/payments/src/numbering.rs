//! Human-facing document numbers and grouping ids.
//!
//! Document numbers look like `ADM-20250114-0007`: a prefix, the issue date
//! and a per-(prefix, date) sequence that restarts at 1 every day. Issuing the
//! next sequence value needs a persistent counter and a lock, which live in the
//! infra layer; this module only owns the formats.

use chrono::{DateTime, NaiveDate, Utc};

use wholesale_core::{CustomerId, DomainError};

pub const DEFAULT_PREFIX: &str = "ADM";

/// Remove whitespace and uppercase; blank input falls back to `ADM`.
pub fn normalize_prefix(raw: &str) -> String {
    let prefix: String = raw
        .chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_uppercase)
        .collect();
    if prefix.is_empty() {
        DEFAULT_PREFIX.to_string()
    } else {
        prefix
    }
}

/// Parsed document number.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocNumber {
    pub prefix: String,
    pub date: NaiveDate,
    pub sequence: u32,
}

impl DocNumber {
    pub fn new(prefix: &str, date: NaiveDate, sequence: u32) -> Self {
        Self {
            prefix: normalize_prefix(prefix),
            date,
            sequence,
        }
    }

    /// Counter key for the (prefix, date) sequence this number belongs to.
    pub fn counter_key(&self) -> String {
        counter_key(&self.prefix, self.date)
    }
}

/// Property-store key of the daily counter, e.g. `WH_DOC_SEQ_ADM_20250114`.
pub fn counter_key(prefix: &str, date: NaiveDate) -> String {
    format!("WH_DOC_SEQ_{}_{}", normalize_prefix(prefix), date.format("%Y%m%d"))
}

impl core::fmt::Display for DocNumber {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "{}-{}-{:04}",
            self.prefix,
            self.date.format("%Y%m%d"),
            self.sequence
        )
    }
}

impl core::str::FromStr for DocNumber {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || DomainError::invalid_id(format!("'{s}' is not a PREFIX-YYYYMMDD-NNNN document number"));

        let mut parts = s.trim().rsplitn(3, '-');
        let sequence = parts.next().ok_or_else(invalid)?;
        let date = parts.next().ok_or_else(invalid)?;
        let prefix = parts.next().filter(|p| !p.is_empty()).ok_or_else(invalid)?;

        if sequence.len() < 4 || !sequence.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid());
        }
        let sequence: u32 = sequence.parse().map_err(|_| invalid())?;
        let date = NaiveDate::parse_from_str(date, "%Y%m%d").map_err(|_| invalid())?;

        Ok(DocNumber::new(prefix, date, sequence))
    }
}

fn compact_customer(customer_id: &CustomerId) -> String {
    customer_id
        .as_str()
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect()
}

/// `TXN-<customer>-<yyyyMMdd-HHmmss>`.
pub fn transaction_id(customer_id: &CustomerId, at: DateTime<Utc>) -> String {
    format!("TXN-{}-{}", compact_customer(customer_id), at.format("%Y%m%d-%H%M%S"))
}

/// `IG-<customer>-<yyyyMMdd>`, used when one document covers several orders.
pub fn invoice_group_id(customer_id: &CustomerId, date: NaiveDate) -> String {
    format!("IG-{}-{}", compact_customer(customer_id), date.format("%Y%m%d"))
}
