//! Account-to-account transfers
//!
//! # State Machine
//!
//! ```text
//! RESOLVE → VALIDATE → ACQUIRE → CHECK_FUNDS → MUTATE → RELEASE → NOTIFY → COMPLETED
//! ```
//!
//! Any failure ends in REJECTED with every balance unchanged.
//!
//! # Safety Invariants
//!
//! 1. **Canonical Order**: both guards are taken id-greater first, whatever the
//!    direction of the transfer, so concurrent transfers cannot deadlock
//! 2. **Check Under Guard**: the funds check and both writes happen while both
//!    guards are held, with nothing in between that could let another
//!    transfer in
//! 3. **All or Nothing**: a failed credit undoes the debit before the guards
//!    are released
//! 4. **Release Always**: guards are given back on every path; a panic
//!    releases them through the token's `Drop`

pub mod coordinator;
pub mod error;
pub mod ordering;
pub mod state;
pub mod types;

// Re-exports for convenience
pub use coordinator::TransferCoordinator;
pub use error::TransferError;
pub use ordering::lock_order;
pub use state::TransferState;
pub use types::{TransferId, TransferReceipt, TransferRequest};
