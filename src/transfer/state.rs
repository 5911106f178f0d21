//! Transfer FSM State Definitions
//!
//! ```text
//! RESOLVE → VALIDATE → ACQUIRE → CHECK_FUNDS → MUTATE → RELEASE → NOTIFY → COMPLETED
//!    ↓          ↓         ↓           ↓           ↓
//!    └──────────┴─────────┴───────────┴───────────┴──────────▶ REJECTED
//! ```
//!
//! A failure after ACQUIRE always passes through RELEASE before REJECTED.

use std::fmt;

/// Transfer FSM States
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransferState {
    /// Look up both accounts in the repository
    Resolve,

    /// Amount and same-account checks (no guard held)
    Validate,

    /// Take both balance guards in canonical order
    Acquire,

    /// Compare source balance with the amount (both guards held)
    CheckFunds,

    /// Debit source, credit target (both guards held)
    Mutate,

    /// Give both guards back
    Release,

    /// Best-effort notification, guards already released
    Notify,

    /// Terminal: funds moved
    Completed,

    /// Terminal: nothing moved
    Rejected,
}

impl TransferState {
    /// Check if this is a terminal state (no more transitions possible)
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransferState::Completed | TransferState::Rejected)
    }

    /// Check if both balance guards are held in this state
    #[inline]
    pub fn holds_guards(&self) -> bool {
        matches!(self, TransferState::CheckFunds | TransferState::Mutate)
    }

    /// Get human-readable state name
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferState::Resolve => "RESOLVE",
            TransferState::Validate => "VALIDATE",
            TransferState::Acquire => "ACQUIRE",
            TransferState::CheckFunds => "CHECK_FUNDS",
            TransferState::Mutate => "MUTATE",
            TransferState::Release => "RELEASE",
            TransferState::Notify => "NOTIFY",
            TransferState::Completed => "COMPLETED",
            TransferState::Rejected => "REJECTED",
        }
    }
}

impl fmt::Display for TransferState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
