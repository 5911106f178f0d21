//! Transfer Core Types

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};

use crate::account::AccountId;

/// Transfer ID - ULID-based unique identifier
///
/// Sortable by creation time, generated without coordination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TransferId(ulid::Ulid);

impl TransferId {
    /// Generate a new unique TransferId
    pub fn new() -> Self {
        Self(ulid::Ulid::new())
    }

    /// Get the inner ULID value
    pub fn inner(&self) -> ulid::Ulid {
        self.0
    }
}

impl Default for TransferId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TransferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TransferId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(ulid::Ulid::from_string(s)?))
    }
}

/// A request to move `amount` from one account to another
///
/// Ids are plain references resolved by the repository when the request is
/// executed; they are trimmed the same way `AccountId` trims them, whether
/// the request is built with `new` or deserialized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferRequest {
    #[serde(rename = "fromAccountId", deserialize_with = "trimmed")]
    pub from: String,
    #[serde(rename = "toAccountId", deserialize_with = "trimmed")]
    pub to: String,
    pub amount: Decimal,
}

impl TransferRequest {
    pub fn new(from: impl AsRef<str>, to: impl AsRef<str>, amount: Decimal) -> Self {
        Self {
            from: from.as_ref().trim().to_string(),
            to: to.as_ref().trim().to_string(),
            amount,
        }
    }
}

fn trimmed<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    let raw = String::deserialize(deserializer)?;
    Ok(raw.trim().to_string())
}

impl fmt::Display for TransferRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{} -> {}: {}}}", self.from, self.to, self.amount)
    }
}

/// Outcome of a completed transfer
///
/// Balances are the values written while both guards were still held.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferReceipt {
    pub transfer_id: TransferId,
    pub from: AccountId,
    pub to: AccountId,
    pub amount: Decimal,
    pub from_balance: Decimal,
    pub to_balance: Decimal,
    pub completed_at: DateTime<Utc>,
}
