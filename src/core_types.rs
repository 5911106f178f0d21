//! Core types used throughout the system
//!
//! Amounts have no alias; they are `rust_decimal::Decimal` everywhere.

/// Account ID - validated, trimmed, immutable after creation.
///
/// # Ordering:
/// Byte-wise lexicographic. The transfer coordinator relies on this total
/// order to take balance guards in a single global sequence.
pub use crate::account::validation::AccountId;
