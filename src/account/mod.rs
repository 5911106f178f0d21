//! Account module
//!
//! Accounts, their balance guard, and the repository that owns them.

pub mod error;
pub mod guard;
pub mod models;
pub mod repository;
pub mod validation;

// Re-export commonly used types
pub use error::AccountError;
pub use guard::{BalanceGuard, GuardToken, Holder};
pub use models::{Account, AccountSnapshot};
pub use repository::{AccountsRepository, InMemoryAccountsRepository, RepositoryError};
pub use validation::{AccountId, ValidationError};
