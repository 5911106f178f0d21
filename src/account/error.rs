//! Account-level error types
//!
//! These are contract violations of the guard protocol, not business
//! failures. A transfer caller never sees them unless the coordinator itself
//! has a locking bug.

use std::thread::ThreadId;

use thiserror::Error;

use super::guard::GuardFault;
use super::validation::AccountId;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AccountError {
    #[error(
        "Balance guard of account {account_id} is not held by the caller \
         (caller: {caller:?}, holder: {holder:?})"
    )]
    LockOwnership {
        account_id: AccountId,
        holder: Option<ThreadId>,
        caller: ThreadId,
    },

    #[error("Balance guard of account {account_id} is already held by the calling thread")]
    AlreadyHeld { account_id: AccountId },

    #[error("Timed out after {waited_ms}ms waiting for the balance guard of account {account_id}")]
    LockTimeout { account_id: AccountId, waited_ms: u64 },

    #[error("Balance of account {account_id} would overflow")]
    Overflow { account_id: AccountId },
}

impl AccountError {
    pub(crate) fn from_fault(account_id: &AccountId, fault: GuardFault, waited_ms: u64) -> Self {
        match fault {
            GuardFault::Reentrant => AccountError::AlreadyHeld {
                account_id: account_id.clone(),
            },
            GuardFault::TimedOut => AccountError::LockTimeout {
                account_id: account_id.clone(),
                waited_ms,
            },
            GuardFault::NotHolder { holder } => AccountError::LockOwnership {
                account_id: account_id.clone(),
                holder,
                caller: std::thread::current().id(),
            },
        }
    }

    /// Account the error refers to
    pub fn account_id(&self) -> &AccountId {
        match self {
            AccountError::LockOwnership { account_id, .. }
            | AccountError::AlreadyHeld { account_id }
            | AccountError::LockTimeout { account_id, .. }
            | AccountError::Overflow { account_id } => account_id,
        }
    }

    /// True for misuse of the guard protocol (a bug in the caller)
    pub fn is_ownership_violation(&self) -> bool {
        matches!(
            self,
            AccountError::LockOwnership { .. } | AccountError::AlreadyHeld { .. }
        )
    }
}
