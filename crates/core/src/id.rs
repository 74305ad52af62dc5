//! Strongly-typed identifiers used across the domain.
//!
//! Order numbers and customer ids are typed in by people and copied between
//! spreadsheets, so `so-1001`, `SO 1001` and `SO1001` must refer to the same
//! order. Keyed identifiers keep the text as entered for display and compare on
//! a normalized key (uppercase ASCII alphanumerics).

use core::cmp::Ordering;
use core::hash::{Hash, Hasher};
use core::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

use crate::error::DomainError;

/// Uppercase and strip everything that is not an ASCII letter or digit.
pub fn normalize_key(raw: &str) -> String {
    raw.chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

/// Sales order number.
#[derive(Debug, Clone)]
pub struct SoNumber {
    raw: String,
    key: String,
}

/// Customer (company) identifier.
#[derive(Debug, Clone)]
pub struct CustomerId {
    raw: String,
    key: String,
}

macro_rules! impl_keyed_id {
    ($t:ident, $name:literal) => {
        impl $t {
            /// Returns `None` when the text has no letters or digits.
            pub fn new(raw: impl AsRef<str>) -> Option<Self> {
                let raw = raw.as_ref().trim();
                let key = normalize_key(raw);
                if key.is_empty() {
                    return None;
                }
                Some(Self {
                    raw: raw.to_string(),
                    key,
                })
            }

            /// Text as entered (trimmed).
            pub fn as_str(&self) -> &str {
                &self.raw
            }

            /// Normalized comparison key.
            pub fn key(&self) -> &str {
                &self.key
            }

            pub fn matches(&self, other: &str) -> bool {
                let key = normalize_key(other);
                !key.is_empty() && key == self.key
            }
        }

        impl PartialEq for $t {
            fn eq(&self, other: &Self) -> bool {
                self.key == other.key
            }
        }

        impl Eq for $t {}

        impl Hash for $t {
            fn hash<H: Hasher>(&self, state: &mut H) {
                self.key.hash(state);
            }
        }

        impl PartialOrd for $t {
            fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
                Some(self.cmp(other))
            }
        }

        impl Ord for $t {
            fn cmp(&self, other: &Self) -> Ordering {
                self.key.cmp(&other.key)
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                f.write_str(&self.raw)
            }
        }

        impl FromStr for $t {
            type Err = DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s).ok_or_else(|| {
                    DomainError::invalid_id(format!("{}: '{}' has no letters or digits", $name, s))
                })
            }
        }

        impl Serialize for $t {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.raw)
            }
        }

        impl<'de> Deserialize<'de> for $t {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let raw = String::deserialize(deserializer)?;
                raw.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

impl_keyed_id!(SoNumber, "SoNumber");
impl_keyed_id!(CustomerId, "CustomerId");

impl CustomerId {
    /// Placeholder for legacy rows recorded without a customer. Its key is
    /// empty, so it never matches an id built with [`CustomerId::new`].
    pub fn unassigned() -> Self {
        Self {
            raw: String::new(),
            key: String::new(),
        }
    }

    pub fn is_unassigned(&self) -> bool {
        self.key.is_empty()
    }
}

/// Ledger row identifier. Opaque; generated with a kind prefix.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PaymentId(String);

impl PaymentId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// `PAY-<uuid>` for documents and receipts.
    ///
    /// Uses UUIDv7 (time-ordered). Prefer passing IDs explicitly in tests
    /// for determinism.
    pub fn payment() -> Self {
        Self(format!("PAY-{}", Uuid::now_v7()))
    }

    /// `CRED-<8 hex>` for overpayment credits.
    pub fn credit() -> Self {
        Self(format!("CRED-{}", short_hex()))
    }

    /// `CRED-APPLY-<8 hex>` for credit applications.
    pub fn credit_application() -> Self {
        Self(format!("CRED-APPLY-{}", short_hex()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// v7 leads with the timestamp, so take the random tail.
fn short_hex() -> String {
    let simple = Uuid::now_v7().simple().to_string();
    simple[simple.len() - 8..].to_ascii_uppercase()
}

impl core::fmt::Display for PaymentId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}
