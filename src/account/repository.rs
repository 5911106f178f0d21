//! Account repository - the single owner of all accounts
//!
//! Accounts are handed out as `Arc<Account>` so a transfer can hold them for
//! its duration without keeping any map shard locked.

use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use thiserror::Error;
use tracing::debug;

use super::models::Account;
use super::validation::{AccountId, ValidationError};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RepositoryError {
    #[error("Account id {0} already exists!")]
    DuplicateAccount(AccountId),

    #[error("Invalid account: {0}")]
    InvalidAccount(#[from] ValidationError),
}

impl RepositoryError {
    pub fn code(&self) -> &'static str {
        match self {
            RepositoryError::DuplicateAccount(_) => "DUPLICATE_ACCOUNT",
            RepositoryError::InvalidAccount(_) => "INVALID_ACCOUNT",
        }
    }

    pub fn http_status(&self) -> u16 {
        400
    }
}

/// Account storage and lookup
///
/// Implementations must make an account visible to `get` as soon as `create`
/// has returned.
pub trait AccountsRepository: Send + Sync {
    /// Insert a new account unless the id is taken
    fn create(&self, account: Account) -> Result<Arc<Account>, RepositoryError>;

    /// Look up an account by id
    fn get(&self, id: &str) -> Option<Arc<Account>>;

    /// All account ids, sorted
    fn ids(&self) -> Vec<AccountId>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove every account
    fn clear(&self);
}

/// In-memory repository backed by a sharded concurrent map
#[derive(Debug, Default)]
pub struct InMemoryAccountsRepository {
    accounts: DashMap<AccountId, Arc<Account>>,
}

impl InMemoryAccountsRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AccountsRepository for InMemoryAccountsRepository {
    fn create(&self, account: Account) -> Result<Arc<Account>, RepositoryError> {
        // entry() holds the shard lock, so check-and-insert is atomic
        match self.accounts.entry(account.id().clone()) {
            Entry::Occupied(existing) => {
                Err(RepositoryError::DuplicateAccount(existing.key().clone()))
            }
            Entry::Vacant(slot) => {
                let account = Arc::new(account);
                slot.insert(Arc::clone(&account));
                debug!(account = %account.id(), balance = %account.read(), "Account created");
                Ok(account)
            }
        }
    }

    fn get(&self, id: &str) -> Option<Arc<Account>> {
        self.accounts.get(id).map(|entry| Arc::clone(entry.value()))
    }

    fn ids(&self) -> Vec<AccountId> {
        let mut ids: Vec<AccountId> = self.accounts.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    fn len(&self) -> usize {
        self.accounts.len()
    }

    fn clear(&self) {
        self.accounts.clear();
    }
}
