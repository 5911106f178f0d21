//! Canonical lock order
//!
//! Every transfer touching accounts A and B takes their guards in the same
//! relative order, whichever of the two is the source. With a single global
//! order no cycle of waiters can form, so two-account transfers cannot
//! deadlock.
//!
//! The order is id-descending: the id-greater account first. Ids are compared
//! as strings, never by address, so the order is reproducible across runs.

use std::cmp::Ordering;

use crate::account::Account;

/// Order two distinct accounts for guard acquisition (id-greater first)
///
/// Returns `None` when both have the same id; such a transfer must be
/// rejected before any locking.
pub fn lock_order<'a>(a: &'a Account, b: &'a Account) -> Option<(&'a Account, &'a Account)> {
    match a.id().cmp(b.id()) {
        Ordering::Greater => Some((a, b)),
        Ordering::Less => Some((b, a)),
        Ordering::Equal => None,
    }
}
