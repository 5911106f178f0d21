//! Transfer Error Types
//!
//! Business-rule failures (`AccountNotFound`, `InvalidAmount`, `SameAccount`,
//! `InsufficientFunds`) leave every balance exactly as it was. The remaining
//! variants are an optional-timeout extension and internal faults.

use rust_decimal::Decimal;
use thiserror::Error;

use super::state::TransferState;
use crate::account::{AccountError, AccountId};

/// Transfer error types
///
/// Error codes are stable strings for whatever adapter maps them to a wire
/// response.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransferError {
    // === Resolution Errors ===
    #[error("Account(s) with id(s) {ids:?} could not be found")]
    AccountNotFound { ids: Vec<String> },

    // === Validation Errors ===
    #[error("Invalid amount {amount}: must be greater than zero")]
    InvalidAmount { amount: Decimal },

    #[error("Cannot transfer amount to the same account {id}")]
    SameAccount { id: AccountId },

    // === Funds Errors ===
    #[error("Available balance in account with id {account_id} is {balance}, requested {requested}")]
    InsufficientFunds {
        account_id: AccountId,
        balance: Decimal,
        requested: Decimal,
    },

    // === Locking Errors ===
    #[error("Timed out waiting for the balance guard of account {account_id}")]
    LockTimeout { account_id: AccountId },

    #[error("Balance guard contract violated: {0}")]
    LockOwnership(AccountError),

    // === System Errors ===
    #[error("Transfer mutation failed: {0}")]
    MutationFault(String),
}

impl TransferError {
    /// Get the error code for API responses
    pub fn code(&self) -> &'static str {
        match self {
            TransferError::AccountNotFound { .. } => "ACCOUNT_NOT_FOUND",
            TransferError::InvalidAmount { .. } => "INVALID_AMOUNT",
            TransferError::SameAccount { .. } => "SAME_ACCOUNT",
            TransferError::InsufficientFunds { .. } => "INSUFFICIENT_FUNDS",
            TransferError::LockTimeout { .. } => "LOCK_TIMEOUT",
            TransferError::LockOwnership(_) => "LOCK_OWNERSHIP",
            TransferError::MutationFault(_) => "MUTATION_FAULT",
        }
    }

    /// Get HTTP status code suggestion
    pub fn http_status(&self) -> u16 {
        match self {
            TransferError::AccountNotFound { .. }
            | TransferError::InvalidAmount { .. }
            | TransferError::SameAccount { .. } => 400,
            TransferError::InsufficientFunds { .. } => 422,
            TransferError::LockTimeout { .. } => 503,
            TransferError::LockOwnership(_) | TransferError::MutationFault(_) => 500,
        }
    }

    /// Failures a caller is expected to handle; none of them changes a balance
    pub fn is_business_rule(&self) -> bool {
        matches!(
            self,
            TransferError::AccountNotFound { .. }
                | TransferError::InvalidAmount { .. }
                | TransferError::SameAccount { .. }
                | TransferError::InsufficientFunds { .. }
        )
    }

    /// State in which the transfer failed
    pub fn stage(&self) -> TransferState {
        match self {
            TransferError::AccountNotFound { .. } => TransferState::Resolve,
            TransferError::InvalidAmount { .. } | TransferError::SameAccount { .. } => {
                TransferState::Validate
            }
            TransferError::LockTimeout { .. } => TransferState::Acquire,
            TransferError::InsufficientFunds { .. } => TransferState::CheckFunds,
            TransferError::LockOwnership(_) | TransferError::MutationFault(_) => {
                TransferState::Mutate
            }
        }
    }
}

impl From<AccountError> for TransferError {
    fn from(e: AccountError) -> Self {
        match e {
            AccountError::LockTimeout { account_id, .. } => TransferError::LockTimeout { account_id },
            AccountError::Overflow { .. } => TransferError::MutationFault(e.to_string()),
            AccountError::LockOwnership { .. } | AccountError::AlreadyHeld { .. } => {
                TransferError::LockOwnership(e)
            }
        }
    }
}
