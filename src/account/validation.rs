//! Input validation for account identifiers and opening balances
//!
//! `AccountId` keeps its field private so every id in the system went through
//! `AccountId::new()`.

use std::borrow::Borrow;
use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Longest accepted account id, in bytes
pub const MAX_ACCOUNT_ID_LEN: usize = 64;

// ============================================================================
// Validation Errors
// ============================================================================

/// Validation errors for account input
#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum ValidationError {
    #[error("Invalid length for {field}: expected {min}-{max}, got {actual}")]
    InvalidLength {
        field: &'static str,
        min: usize,
        max: usize,
        actual: usize,
    },

    #[error("Invalid format for {field}: '{value}' (expected: {expected})")]
    InvalidFormat {
        field: &'static str,
        value: String,
        expected: &'static str,
    },

    #[error("Initial balance must not be negative: got {0}")]
    NegativeBalance(Decimal),
}

// ============================================================================
// AccountId - Validated Account Identifier (Private Field)
// ============================================================================

/// Validated account identifier
///
/// Ordering is plain byte-wise lexicographic order of the id string. The
/// transfer coordinator relies on this being total and stable across
/// processes, so it must never depend on anything but the id text.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AccountId(String);

impl AccountId {
    /// Create a new validated AccountId
    ///
    /// # Validation Rules
    /// - Surrounding whitespace is trimmed
    /// - Length: 1-64 bytes after trimming
    /// - No control characters
    ///
    /// # Examples
    /// ```
    /// use acctlock::account::validation::AccountId;
    ///
    /// let id = AccountId::new(" Id-123 ").unwrap();
    /// assert_eq!(id.as_str(), "Id-123");
    ///
    /// assert!(AccountId::new("").is_err());
    /// ```
    pub fn new(id: &str) -> Result<Self, ValidationError> {
        let id = id.trim();

        if id.is_empty() || id.len() > MAX_ACCOUNT_ID_LEN {
            return Err(ValidationError::InvalidLength {
                field: "account_id",
                min: 1,
                max: MAX_ACCOUNT_ID_LEN,
                actual: id.len(),
            });
        }

        if id.chars().any(char::is_control) {
            return Err(ValidationError::InvalidFormat {
                field: "account_id",
                value: id.escape_default().to_string(),
                expected: "printable characters only",
            });
        }

        Ok(Self(id.to_string()))
    }

    /// Get the validated id as &str
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Convert into owned String
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for AccountId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// Lets the repository map be queried with a plain &str
impl Borrow<str> for AccountId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for AccountId {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        AccountId::new(&value)
    }
}

impl From<AccountId> for String {
    fn from(id: AccountId) -> Self {
        id.0
    }
}

/// Check an opening balance
pub fn validate_opening_balance(balance: Decimal) -> Result<Decimal, ValidationError> {
    if balance < Decimal::ZERO {
        return Err(ValidationError::NegativeBalance(balance));
    }
    Ok(balance)
}
