//! Accounts service
//!
//! Entry point for callers: owns the repository, the notifier and the
//! transfer coordinator, and exposes create/get/transfer over them.

use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::info;

use crate::account::{
    Account, AccountSnapshot, AccountsRepository, InMemoryAccountsRepository, RepositoryError,
};
use crate::config::AppConfig;
use crate::notification::{LogNotifier, Notifier, QueuedNotifier};
use crate::transfer::{TransferCoordinator, TransferError, TransferReceipt, TransferRequest};

pub struct AccountsService {
    repository: Arc<dyn AccountsRepository>,
    coordinator: TransferCoordinator,
    outbox: Option<Arc<QueuedNotifier>>,
}

impl AccountsService {
    pub fn new(repository: Arc<dyn AccountsRepository>, notifier: Arc<dyn Notifier>) -> Self {
        let coordinator = TransferCoordinator::new(Arc::clone(&repository), notifier);
        Self {
            repository,
            coordinator,
            outbox: None,
        }
    }

    /// Wrap an already configured coordinator
    pub fn with_coordinator(coordinator: TransferCoordinator) -> Self {
        Self {
            repository: Arc::clone(coordinator.repository()),
            coordinator,
            outbox: None,
        }
    }

    /// In-memory service with the configured notifier and seed accounts
    ///
    /// A non-zero `notify_queue_size` routes notifications to a bounded
    /// outbox, reachable through [`AccountsService::outbox`], which the
    /// caller is expected to drain.
    pub fn from_config(config: &AppConfig) -> Result<Self, RepositoryError> {
        let repository: Arc<dyn AccountsRepository> = Arc::new(InMemoryAccountsRepository::new());
        let outbox = match config.transfer.notify_queue_size {
            0 => None,
            capacity => Some(Arc::new(QueuedNotifier::new(capacity))),
        };
        let notifier: Arc<dyn Notifier> = match &outbox {
            Some(queue) => Arc::clone(queue) as Arc<dyn Notifier>,
            None => Arc::new(LogNotifier),
        };
        let coordinator =
            TransferCoordinator::from_config(Arc::clone(&repository), notifier, &config.transfer);
        let mut service = Self::with_coordinator(coordinator);
        service.outbox = outbox;

        for seed in &config.accounts {
            service.open_account(&seed.id, seed.balance)?;
        }
        info!(
            accounts = service.repository.len(),
            lock_timeout_ms = ?config.transfer.lock_timeout_ms,
            notify_queue_size = config.transfer.notify_queue_size,
            "Accounts service ready"
        );
        Ok(service)
    }

    pub fn create_account(&self, account: Account) -> Result<Arc<Account>, RepositoryError> {
        self.repository.create(account)
    }

    /// Validate the raw id and balance, then create the account
    pub fn open_account(&self, id: &str, balance: Decimal) -> Result<Arc<Account>, RepositoryError> {
        self.create_account(Account::open(id, balance)?)
    }

    pub fn get_account(&self, id: &str) -> Option<Arc<Account>> {
        self.repository.get(id.trim())
    }

    pub fn transfer(
        &self,
        from: &str,
        to: &str,
        amount: Decimal,
    ) -> Result<TransferReceipt, TransferError> {
        self.coordinator.transfer(from, to, amount)
    }

    pub fn execute(&self, req: TransferRequest) -> Result<TransferReceipt, TransferError> {
        self.coordinator.execute(req)
    }

    /// Sum of all balances, each read under its guard
    ///
    /// Accounts are read one at a time, so the sum is only a consistent total
    /// when no transfer is running.
    pub fn total_balance(&self) -> Result<Decimal, TransferError> {
        let mut total = Decimal::ZERO;
        for id in self.repository.ids() {
            if let Some(account) = self.repository.get(id.as_str()) {
                total += account.read_guarded()?;
            }
        }
        Ok(total)
    }

    /// Unguarded view of every account, sorted by id
    pub fn snapshot(&self) -> Vec<AccountSnapshot> {
        self.repository
            .ids()
            .iter()
            .filter_map(|id| self.repository.get(id.as_str()))
            .map(|account| account.snapshot())
            .collect()
    }

    /// Remove every account
    pub fn clear_accounts(&self) {
        self.repository.clear();
    }

    pub fn repository(&self) -> &Arc<dyn AccountsRepository> {
        &self.repository
    }

    pub fn coordinator(&self) -> &TransferCoordinator {
        &self.coordinator
    }

    /// Pending notifications, when the service was configured with a queue
    pub fn outbox(&self) -> Option<&Arc<QueuedNotifier>> {
        self.outbox.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::ValidationError;
    use crate::config::SeedAccount;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn service() -> AccountsService {
        AccountsService::new(
            Arc::new(InMemoryAccountsRepository::new()),
            Arc::new(LogNotifier),
        )
    }

    #[test]
    fn test_add_account() {
        let service = service();
        service.open_account("Id-123", dec("1000")).unwrap();

        let account = service.get_account("Id-123").unwrap();
        assert_eq!(account.id().as_str(), "Id-123");
        assert_eq!(account.read(), dec("1000"));
    }

    #[test]
    fn test_add_account_fails_on_duplicate_id() {
        let service = service();
        service.open_account("Id-1", dec("1000")).unwrap();

        let err = service.open_account("Id-1", dec("5")).unwrap_err();
        assert_eq!(err.to_string(), "Account id Id-1 already exists!");
        assert_eq!(service.get_account("Id-1").unwrap().read(), dec("1000"));
    }

    #[test]
    fn test_add_account_rejects_invalid_input() {
        let service = service();
        assert!(matches!(
            service.open_account("", dec("1")),
            Err(RepositoryError::InvalidAccount(ValidationError::InvalidLength { .. }))
        ));
        assert!(matches!(
            service.open_account("neg", dec("-1")),
            Err(RepositoryError::InvalidAccount(ValidationError::NegativeBalance(_)))
        ));
        assert!(service.repository().is_empty());
    }

    #[test]
    fn test_transfer_and_totals() {
        let service = service();
        service.open_account("A", dec("100")).unwrap();
        service.open_account("B", dec("100")).unwrap();

        service.transfer("A", "B", dec("50")).unwrap();
        service
            .execute(TransferRequest::new("B", "A", dec("30")))
            .unwrap();

        let snapshot = service.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].balance, dec("80"));
        assert_eq!(snapshot[1].balance, dec("120"));
        assert_eq!(service.total_balance().unwrap(), dec("200"));
    }

    #[test]
    fn test_execute_deserialized_request_with_padded_ids() {
        let service = service();
        service.open_account("A", dec("100")).unwrap();
        service.open_account("B", dec("0")).unwrap();

        let req: TransferRequest = serde_json::from_str(
            r#"{"fromAccountId": "  A", "toAccountId": "B  ", "amount": "40"}"#,
        )
        .unwrap();
        let receipt = service.execute(req).unwrap();
        assert_eq!(receipt.from.as_str(), "A");
        assert_eq!(receipt.to.as_str(), "B");
        assert_eq!(service.get_account("A").unwrap().read(), dec("60"));
        assert_eq!(service.get_account("B").unwrap().read(), dec("40"));
    }

    #[test]
    fn test_clear_accounts() {
        let service = service();
        service.open_account("A", dec("1")).unwrap();
        service.clear_accounts();
        assert!(service.get_account("A").is_none());
        assert_eq!(service.total_balance().unwrap(), Decimal::ZERO);
    }

    #[test]
    fn test_from_config_seeds_accounts() {
        let config = AppConfig {
            accounts: vec![
                SeedAccount {
                    id: "alice".into(),
                    balance: dec("10"),
                },
                SeedAccount {
                    id: "bob".into(),
                    balance: dec("5.5"),
                },
            ],
            ..Default::default()
        };
        let service = AccountsService::from_config(&config).unwrap();
        assert_eq!(service.repository().len(), 2);
        assert_eq!(service.total_balance().unwrap(), dec("15.5"));
        assert_eq!(service.coordinator().lock_timeout(), None);
        assert!(service.outbox().is_none());
    }

    #[test]
    fn test_from_config_with_queue_exposes_outbox() {
        let mut config = AppConfig {
            accounts: vec![
                SeedAccount {
                    id: "alice".into(),
                    balance: dec("10"),
                },
                SeedAccount {
                    id: "bob".into(),
                    balance: dec("0"),
                },
            ],
            ..Default::default()
        };
        config.transfer.notify_queue_size = 4;
        let service = AccountsService::from_config(&config).unwrap();

        service.transfer("alice", "bob", dec("3")).unwrap();

        let outbox = service.outbox().unwrap();
        assert_eq!(outbox.capacity(), 4);
        let pending = outbox.drain();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].account_id.as_str(), "alice");
        assert_eq!(pending[0].message, "Transferred 3 to account bob");
    }

    #[test]
    fn test_from_config_duplicate_seed_fails() {
        let seed = SeedAccount {
            id: "alice".into(),
            balance: dec("10"),
        };
        let config = AppConfig {
            accounts: vec![seed.clone(), seed],
            ..Default::default()
        };
        assert!(matches!(
            AccountsService::from_config(&config),
            Err(RepositoryError::DuplicateAccount(_))
        ));
    }
}
