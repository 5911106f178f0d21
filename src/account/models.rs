//! Account entity - a balance cell behind an explicit guard
//!
//! # Invariants (enforced by private fields):
//! 1. `id` is immutable after creation
//! 2. `balance` is only written by `increase`/`decrease`, and both require a
//!    [`GuardToken`] that the guard confirms belongs to the calling thread
//! 3. `balance >= 0` whenever the guard is free (the funds check before
//!    `decrease` is the transfer coordinator's job)

use std::ptr;
use std::thread::ThreadId;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::error::AccountError;
use super::guard::{BalanceGuard, GuardToken};
use super::validation::{AccountId, ValidationError, validate_opening_balance};

/// A monetary account
///
/// The balance lives in its own short-lived cell lock so that `read()` never
/// waits for a transfer. Exclusive access for a whole transfer is the job of
/// the separate balance guard.
#[derive(Debug)]
pub struct Account {
    id: AccountId,              // PRIVATE - use id()
    balance: Mutex<Decimal>,    // PRIVATE - written only with a GuardToken
    guard: BalanceGuard,        // PRIVATE - use acquire()/release()
    created_at: DateTime<Utc>,
}

/// Serializable point-in-time view of an account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountSnapshot {
    pub account_id: AccountId,
    pub balance: Decimal,
}

impl Account {
    /// Create an account with an opening balance
    ///
    /// # Errors
    /// `NegativeBalance` if `balance < 0`
    pub fn new(id: AccountId, balance: Decimal) -> Result<Self, ValidationError> {
        let balance = validate_opening_balance(balance)?;
        Ok(Self {
            id,
            balance: Mutex::new(balance),
            guard: BalanceGuard::new(),
            created_at: Utc::now(),
        })
    }

    /// Validate the raw id and create the account
    pub fn open(id: &str, balance: Decimal) -> Result<Self, ValidationError> {
        Self::new(AccountId::new(id)?, balance)
    }

    /// Create an account with a zero balance
    pub fn empty(id: AccountId) -> Self {
        Self {
            id,
            balance: Mutex::new(Decimal::ZERO),
            guard: BalanceGuard::new(),
            created_at: Utc::now(),
        }
    }

    #[inline]
    pub fn id(&self) -> &AccountId {
        &self.id
    }

    #[inline]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub(crate) fn guard(&self) -> &BalanceGuard {
        &self.guard
    }

    // ============================================================
    // READS
    // ============================================================

    /// Current balance without taking the guard
    ///
    /// Diagnostics only: while a transfer holds the guard this returns
    /// whatever was last written, which may be mid-transfer.
    pub fn read(&self) -> Decimal {
        *self.balance.lock()
    }

    /// Balance read inside the guard (waits for any in-flight transfer)
    pub fn read_guarded(&self) -> Result<Decimal, AccountError> {
        let token = self.acquire()?;
        let balance = self.balance(&token)?;
        self.release(token)?;
        Ok(balance)
    }

    /// Balance read by the current guard holder
    pub fn balance(&self, token: &GuardToken<'_>) -> Result<Decimal, AccountError> {
        self.verify(token)?;
        Ok(*self.balance.lock())
    }

    pub fn snapshot(&self) -> AccountSnapshot {
        AccountSnapshot {
            account_id: self.id.clone(),
            balance: self.read(),
        }
    }

    // ============================================================
    // GUARD
    // ============================================================

    /// Block until the guard is free and take it
    ///
    /// # Errors
    /// `AlreadyHeld` if the calling thread holds it already; waiting would
    /// never end.
    pub fn acquire(&self) -> Result<GuardToken<'_>, AccountError> {
        let ticket = self
            .guard
            .lock()
            .map_err(|fault| AccountError::from_fault(&self.id, fault, 0))?;
        Ok(GuardToken::new(self, ticket))
    }

    /// Take the guard, waiting at most `timeout`
    pub fn try_acquire_for(&self, timeout: Duration) -> Result<GuardToken<'_>, AccountError> {
        let started = Instant::now();
        let ticket = self.guard.lock_for(timeout).map_err(|fault| {
            AccountError::from_fault(&self.id, fault, started.elapsed().as_millis() as u64)
        })?;
        Ok(GuardToken::new(self, ticket))
    }

    /// Give the guard back
    ///
    /// The token is consumed either way. When it belongs to a different
    /// account, that account's guard is released by the token's `Drop`.
    ///
    /// # Errors
    /// `LockOwnership` if the token is not this account's current holder.
    pub fn release(&self, token: GuardToken<'_>) -> Result<(), AccountError> {
        self.verify(&token)?;
        self.guard
            .unlock(token.ticket())
            .map_err(|fault| AccountError::from_fault(&self.id, fault, 0))?;
        token.mark_released();
        Ok(())
    }

    /// Thread currently holding the guard
    pub fn holder(&self) -> Option<ThreadId> {
        self.guard.holder().map(|h| h.thread)
    }

    pub fn is_held(&self) -> bool {
        self.guard.holder().is_some()
    }

    // ============================================================
    // GUARDED MUTATIONS
    // ============================================================

    /// Credit the balance
    ///
    /// # Errors
    /// - `LockOwnership` if `token` does not prove ownership of this guard
    /// - `Overflow` if the result does not fit (balance unchanged)
    pub fn increase(&self, token: &GuardToken<'_>, amount: Decimal) -> Result<Decimal, AccountError> {
        self.verify(token)?;
        let mut balance = self.balance.lock();
        *balance = balance
            .checked_add(amount)
            .ok_or_else(|| AccountError::Overflow {
                account_id: self.id.clone(),
            })?;
        Ok(*balance)
    }

    /// Debit the balance
    ///
    /// No funds check here; the caller decides whether the debit is allowed
    /// while it still holds the guard.
    pub fn decrease(&self, token: &GuardToken<'_>, amount: Decimal) -> Result<Decimal, AccountError> {
        self.verify(token)?;
        let mut balance = self.balance.lock();
        *balance = balance
            .checked_sub(amount)
            .ok_or_else(|| AccountError::Overflow {
                account_id: self.id.clone(),
            })?;
        Ok(*balance)
    }

    /// Token must come from this account and match the recorded holder
    fn verify(&self, token: &GuardToken<'_>) -> Result<(), AccountError> {
        if !ptr::eq(token.account(), self) {
            return Err(AccountError::LockOwnership {
                account_id: self.id.clone(),
                holder: self.holder(),
                caller: std::thread::current().id(),
            });
        }
        self.guard
            .check(token.ticket())
            .map_err(|fault| AccountError::from_fault(&self.id, fault, 0))
    }
}
