//! Balance guard - per-account lock that knows who holds it
//!
//! A plain mutex only answers "is it locked". The balance guard also records
//! the holding thread and the ticket issued to it, so a balance mutation can
//! prove it runs inside the holder's critical section.
//!
//! # Protocol
//!
//! ```text
//! acquire() ──▶ GuardToken ──▶ increase/decrease(&token) ──▶ release(token)
//!                    │                                            ▲
//!                    └──────────── Drop (panic / early return) ───┘
//! ```
//!
//! The token is the capability: it borrows the account, cannot be cloned and
//! cannot leave the thread that acquired it. Every use is still re-checked
//! against the recorded holder.

use std::fmt;
use std::marker::PhantomData;
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{error, trace};

use super::models::Account;

/// Current owner of a balance guard
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Holder {
    pub thread: ThreadId,
    pub ticket: u64,
}

/// Why a guard operation was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum GuardFault {
    /// Calling thread already holds the guard
    Reentrant,
    /// Bounded wait elapsed
    TimedOut,
    /// Caller is not the recorded holder
    NotHolder { holder: Option<ThreadId> },
}

#[derive(Debug, Default)]
struct GuardState {
    holder: Option<Holder>,
    next_ticket: u64,
}

impl GuardState {
    fn grant(&mut self, thread: ThreadId) -> u64 {
        self.next_ticket = self.next_ticket.wrapping_add(1);
        self.holder = Some(Holder {
            thread,
            ticket: self.next_ticket,
        });
        self.next_ticket
    }
}

/// Mutual exclusion over one account balance, with holder tracking
#[derive(Default)]
pub struct BalanceGuard {
    state: Mutex<GuardState>,
    freed: Condvar,
}

impl BalanceGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the current holder (None when free)
    pub fn holder(&self) -> Option<Holder> {
        self.state.lock().holder
    }

    /// Block until the guard is free, then take it for the calling thread
    pub(crate) fn lock(&self) -> Result<u64, GuardFault> {
        let me = thread::current().id();
        let mut state = self.state.lock();

        if state.holder.is_some_and(|h| h.thread == me) {
            return Err(GuardFault::Reentrant);
        }
        while state.holder.is_some() {
            self.freed.wait(&mut state);
        }
        Ok(state.grant(me))
    }

    /// Like [`lock`](Self::lock) but gives up after `timeout`
    pub(crate) fn lock_for(&self, timeout: Duration) -> Result<u64, GuardFault> {
        let me = thread::current().id();
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();

        if state.holder.is_some_and(|h| h.thread == me) {
            return Err(GuardFault::Reentrant);
        }
        while state.holder.is_some() {
            if self.freed.wait_until(&mut state, deadline).timed_out() && state.holder.is_some() {
                return Err(GuardFault::TimedOut);
            }
        }
        Ok(state.grant(me))
    }

    /// Verify the calling thread holds the guard under `ticket`
    pub(crate) fn check(&self, ticket: u64) -> Result<(), GuardFault> {
        let state = self.state.lock();
        Self::owned_by_caller(&state, ticket)
    }

    /// Release the guard; only the recorded holder may do this
    pub(crate) fn unlock(&self, ticket: u64) -> Result<(), GuardFault> {
        let mut state = self.state.lock();
        Self::owned_by_caller(&state, ticket)?;
        state.holder = None;
        drop(state);
        self.freed.notify_one();
        Ok(())
    }

    fn owned_by_caller(state: &GuardState, ticket: u64) -> Result<(), GuardFault> {
        let me = thread::current().id();
        match state.holder {
            Some(h) if h.thread == me && h.ticket == ticket => Ok(()),
            other => Err(GuardFault::NotHolder {
                holder: other.map(|h| h.thread),
            }),
        }
    }
}

impl fmt::Debug for BalanceGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BalanceGuard")
            .field("holder", &self.holder())
            .finish()
    }
}

/// Proof that the calling thread holds one account's balance guard
///
/// Obtained from [`Account::acquire`]. Hand it back with [`Account::release`];
/// if it is dropped instead (early return, panic) the guard is released by
/// `Drop`, so an account can never stay wedged after a failed transfer.
#[must_use = "dropping a GuardToken releases the balance guard immediately"]
pub struct GuardToken<'a> {
    account: &'a Account,
    ticket: u64,
    released: bool,
    // Raw pointer marker: the token must stay on the acquiring thread
    _not_send: PhantomData<*const ()>,
}

impl<'a> GuardToken<'a> {
    pub(crate) fn new(account: &'a Account, ticket: u64) -> Self {
        Self {
            account,
            ticket,
            released: false,
            _not_send: PhantomData,
        }
    }

    /// Account this token grants access to
    pub fn account(&self) -> &'a Account {
        self.account
    }

    pub(crate) fn ticket(&self) -> u64 {
        self.ticket
    }

    pub(crate) fn mark_released(mut self) {
        self.released = true;
    }
}

impl fmt::Debug for GuardToken<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GuardToken")
            .field("account", self.account.id())
            .field("ticket", &self.ticket)
            .finish()
    }
}

impl Drop for GuardToken<'_> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        match self.account.guard().unlock(self.ticket) {
            Ok(()) => trace!(account = %self.account.id(), "balance guard released on drop"),
            Err(fault) => error!(
                account = %self.account.id(),
                ?fault,
                "balance guard release on drop refused"
            ),
        }
    }
}
