//! Transfer Coordinator
//!
//! Drives one transfer through the state machine on the calling thread.
//! It is the only component that holds two balance guards at once, and it
//! always takes them in the canonical order from [`super::ordering`].

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{debug, error, info, info_span, warn};

use super::error::TransferError;
use super::ordering::lock_order;
use super::state::TransferState;
use super::types::{TransferId, TransferReceipt, TransferRequest};
use crate::account::{Account, AccountError, AccountsRepository, GuardToken};
use crate::config::TransferConfig;
use crate::notification::Notifier;

const TARGET: &str = "acctlock::transfer";

/// Transfer Coordinator - moves funds between two accounts
pub struct TransferCoordinator {
    repository: Arc<dyn AccountsRepository>,
    notifier: Arc<dyn Notifier>,
    lock_timeout: Option<Duration>,
}

impl TransferCoordinator {
    /// Create a coordinator that waits for guards without limit
    pub fn new(repository: Arc<dyn AccountsRepository>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            repository,
            notifier,
            lock_timeout: None,
        }
    }

    /// Bound every guard wait; `None` waits forever
    pub fn with_lock_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn from_config(
        repository: Arc<dyn AccountsRepository>,
        notifier: Arc<dyn Notifier>,
        config: &TransferConfig,
    ) -> Self {
        Self::new(repository, notifier).with_lock_timeout(config.lock_timeout())
    }

    pub fn repository(&self) -> &Arc<dyn AccountsRepository> {
        &self.repository
    }

    pub fn lock_timeout(&self) -> Option<Duration> {
        self.lock_timeout
    }

    /// Move `amount` from `from` to `to`
    pub fn transfer(
        &self,
        from: &str,
        to: &str,
        amount: Decimal,
    ) -> Result<TransferReceipt, TransferError> {
        self.execute(TransferRequest::new(from, to, amount))
    }

    /// Run a transfer request to a terminal state
    ///
    /// On `Err` no balance has changed. Guards are released before this
    /// returns on every path.
    pub fn execute(&self, req: TransferRequest) -> Result<TransferReceipt, TransferError> {
        let transfer_id = TransferId::new();
        let span = info_span!(
            target: TARGET,
            "transfer",
            transfer_id = %transfer_id,
            from = %req.from,
            to = %req.to,
            amount = %req.amount
        );
        let _enter = span.enter();

        info!(target: TARGET, "Transfer initiated: {}", req);

        match self.run(transfer_id, &req) {
            Ok(receipt) => {
                transition(transfer_id, TransferState::Completed);
                info!(
                    target: TARGET,
                    from_balance = %receipt.from_balance,
                    to_balance = %receipt.to_balance,
                    "Transfer completed"
                );
                Ok(receipt)
            }
            Err(e) => {
                transition(transfer_id, TransferState::Rejected);
                if e.is_business_rule() || matches!(e, TransferError::LockTimeout { .. }) {
                    warn!(target: TARGET, code = e.code(), stage = %e.stage(), error = %e, "Transfer rejected");
                } else {
                    error!(target: TARGET, code = e.code(), stage = %e.stage(), error = %e, "Transfer failed");
                }
                Err(e)
            }
        }
    }

    fn run(
        &self,
        transfer_id: TransferId,
        req: &TransferRequest,
    ) -> Result<TransferReceipt, TransferError> {
        transition(transfer_id, TransferState::Resolve);
        let (from, to) = self.resolve(req)?;

        transition(transfer_id, TransferState::Validate);
        validate(&from, &to, req.amount)?;

        transition(transfer_id, TransferState::Acquire);
        let (first, second) = lock_order(&from, &to).ok_or_else(|| TransferError::SameAccount {
            id: from.id().clone(),
        })?;
        let first_token = self.acquire(first)?;
        // On failure first_token drops here and gives its guard back
        let second_token = self.acquire(second)?;

        let (from_token, to_token) = if first.id() == from.id() {
            (&first_token, &second_token)
        } else {
            (&second_token, &first_token)
        };

        guarded_transition(transfer_id, TransferState::CheckFunds, [&from, &to]);
        let outcome = move_funds(transfer_id, &from, from_token, &to, to_token, req.amount);

        transition(transfer_id, TransferState::Release);
        // Reverse acquisition order; both are attempted
        let second_released = second.release(second_token);
        let first_released = first.release(first_token);
        for released in [second_released, first_released] {
            if let Err(e) = released {
                error!(target: TARGET, error = %e, "Balance guard release failed");
            }
        }

        let (from_balance, to_balance) = outcome?;

        guarded_transition(transfer_id, TransferState::Notify, [&from, &to]);
        let message = format!("Transferred {} to account {}", req.amount, to.id());
        if let Err(e) = self.notifier.notify(&from, &message) {
            warn!(target: TARGET, account = %from.id(), error = %e, "Transfer notification failed");
        }

        Ok(TransferReceipt {
            transfer_id,
            from: from.id().clone(),
            to: to.id().clone(),
            amount: req.amount,
            from_balance,
            to_balance,
            completed_at: Utc::now(),
        })
    }

    /// Look up both accounts, reporting every id that is missing
    fn resolve(&self, req: &TransferRequest) -> Result<(Arc<Account>, Arc<Account>), TransferError> {
        let from = self.repository.get(&req.from);
        let to = self.repository.get(&req.to);
        match (from, to) {
            (Some(from), Some(to)) => Ok((from, to)),
            (from, to) => {
                let mut ids = Vec::with_capacity(2);
                if from.is_none() {
                    ids.push(req.from.clone());
                }
                if to.is_none() && !ids.contains(&req.to) {
                    ids.push(req.to.clone());
                }
                Err(TransferError::AccountNotFound { ids })
            }
        }
    }

    fn acquire<'a>(&self, account: &'a Account) -> Result<GuardToken<'a>, TransferError> {
        let token = match self.lock_timeout {
            Some(timeout) => account.try_acquire_for(timeout),
            None => account.acquire(),
        }?;
        debug!(target: TARGET, account = %account.id(), "Balance guard acquired");
        Ok(token)
    }
}

fn transition(transfer_id: TransferId, state: TransferState) {
    debug!(
        target: TARGET,
        transfer_id = %transfer_id,
        state = %state,
        terminal = state.is_terminal(),
        "Transfer state"
    );
}

/// Transition into a state that requires this thread to hold both guards,
/// or to hold neither
fn guarded_transition(transfer_id: TransferId, state: TransferState, accounts: [&Account; 2]) {
    let me = thread::current().id();
    debug_assert!(
        accounts
            .iter()
            .all(|account| (account.holder() == Some(me)) == state.holds_guards()),
        "balance guards in wrong state entering {state}"
    );
    transition(transfer_id, state);
}

fn validate(from: &Account, to: &Account, amount: Decimal) -> Result<(), TransferError> {
    if amount <= Decimal::ZERO {
        return Err(TransferError::InvalidAmount { amount });
    }
    if from.id() == to.id() {
        return Err(TransferError::SameAccount {
            id: from.id().clone(),
        });
    }
    Ok(())
}

/// Funds check and the debit/credit pair, with both guards held
///
/// Returns the new (from, to) balances. If the credit fails the debit is
/// undone before returning, so either both writes happen or neither does.
fn move_funds(
    transfer_id: TransferId,
    from: &Account,
    from_token: &GuardToken<'_>,
    to: &Account,
    to_token: &GuardToken<'_>,
    amount: Decimal,
) -> Result<(Decimal, Decimal), TransferError> {
    let balance = from.balance(from_token)?;
    if balance < amount {
        return Err(TransferError::InsufficientFunds {
            account_id: from.id().clone(),
            balance,
            requested: amount,
        });
    }

    guarded_transition(transfer_id, TransferState::Mutate, [from, to]);
    let from_balance = from.decrease(from_token, amount)?;
    let to_balance = match to.increase(to_token, amount) {
        Ok(balance) => balance,
        Err(e) => {
            compensate(from, from_token, amount, &e);
            return Err(e.into());
        }
    };
    Ok((from_balance, to_balance))
}

fn compensate(from: &Account, from_token: &GuardToken<'_>, amount: Decimal, cause: &AccountError) {
    match from.increase(from_token, amount) {
        Ok(restored) => {
            warn!(target: TARGET, account = %from.id(), balance = %restored, cause = %cause, "Debit compensated");
        }
        Err(e) => {
            error!(target: TARGET, account = %from.id(), cause = %cause, error = %e, "Debit compensation failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::{AccountId, InMemoryAccountsRepository};
    use crate::notification::NotifyError;
    use parking_lot::Mutex;
    use std::thread;

    #[derive(Default)]
    struct RecordingNotifier {
        sent: Mutex<Vec<(AccountId, String)>>,
    }

    impl Notifier for RecordingNotifier {
        fn notify(&self, account: &Account, message: &str) -> Result<(), NotifyError> {
            self.sent.lock().push((account.id().clone(), message.to_string()));
            Ok(())
        }
    }

    struct FailingNotifier;

    impl Notifier for FailingNotifier {
        fn notify(&self, _account: &Account, _message: &str) -> Result<(), NotifyError> {
            Err(NotifyError::Delivery("smtp down".into()))
        }
    }

    /// Records, for every notification, whether the source and the
    /// destination guard were still held when `notify` ran
    struct ReleaseCheckingNotifier {
        repository: Arc<InMemoryAccountsRepository>,
        seen: Mutex<Vec<(AccountId, bool, bool)>>,
    }

    impl Notifier for ReleaseCheckingNotifier {
        fn notify(&self, account: &Account, message: &str) -> Result<(), NotifyError> {
            let to_id = message
                .rsplit(' ')
                .next()
                .ok_or_else(|| NotifyError::Delivery(format!("no destination in '{message}'")))?;
            let to = self
                .repository
                .get(to_id)
                .ok_or_else(|| NotifyError::Delivery(format!("unknown account {to_id}")))?;
            self.seen
                .lock()
                .push((account.id().clone(), account.is_held(), to.is_held()));
            Ok(())
        }
    }

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn setup(accounts: &[(&str, &str)]) -> (TransferCoordinator, Arc<RecordingNotifier>) {
        let repo = Arc::new(InMemoryAccountsRepository::new());
        for (id, balance) in accounts {
            repo.create(Account::open(id, dec(balance)).unwrap()).unwrap();
        }
        let notifier = Arc::new(RecordingNotifier::default());
        (TransferCoordinator::new(repo, notifier.clone()), notifier)
    }

    fn balance(coordinator: &TransferCoordinator, id: &str) -> Decimal {
        coordinator.repository().get(id).unwrap().read()
    }

    fn assert_guards_free(coordinator: &TransferCoordinator) {
        for id in coordinator.repository().ids() {
            assert!(!coordinator.repository().get(id.as_str()).unwrap().is_held());
        }
    }

    #[test]
    fn test_transfer_moves_funds() {
        let (coordinator, notifier) = setup(&[("A", "100"), ("B", "100")]);

        let receipt = coordinator.transfer("A", "B", dec("50")).unwrap();
        assert_eq!(receipt.from.as_str(), "A");
        assert_eq!(receipt.to.as_str(), "B");
        assert_eq!(receipt.from_balance, dec("50"));
        assert_eq!(receipt.to_balance, dec("150"));

        assert_eq!(balance(&coordinator, "A"), dec("50"));
        assert_eq!(balance(&coordinator, "B"), dec("150"));
        assert_guards_free(&coordinator);

        let sent = notifier.sent.lock();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0.as_str(), "A");
        assert_eq!(sent[0].1, "Transferred 50 to account B");
    }

    #[test]
    fn test_transfer_towards_lower_id() {
        // Source is acquired second here
        let (coordinator, _) = setup(&[("A", "100"), ("B", "100")]);
        coordinator.transfer("B", "A", dec("30")).unwrap();
        assert_eq!(balance(&coordinator, "A"), dec("130"));
        assert_eq!(balance(&coordinator, "B"), dec("70"));
    }

    #[test]
    fn test_notify_runs_after_both_guards_released() {
        let repo = Arc::new(InMemoryAccountsRepository::new());
        repo.create(Account::open("A", dec("100")).unwrap()).unwrap();
        repo.create(Account::open("B", dec("100")).unwrap()).unwrap();
        let notifier = Arc::new(ReleaseCheckingNotifier {
            repository: Arc::clone(&repo),
            seen: Mutex::new(Vec::new()),
        });
        let coordinator = TransferCoordinator::new(repo, notifier.clone());

        // Source acquired second, then first
        coordinator.transfer("A", "B", dec("10")).unwrap();
        coordinator.transfer("B", "A", dec("25")).unwrap();

        let seen = notifier.seen.lock();
        assert_eq!(
            *seen,
            vec![
                (AccountId::new("A").unwrap(), false, false),
                (AccountId::new("B").unwrap(), false, false),
            ]
        );
        assert_eq!(balance(&coordinator, "A"), dec("115"));
        assert_eq!(balance(&coordinator, "B"), dec("85"));
    }

    #[test]
    fn test_exact_balance_drains_account() {
        let (coordinator, _) = setup(&[("A", "10.55"), ("B", "0")]);
        coordinator.transfer("A", "B", dec("10.55")).unwrap();
        assert_eq!(balance(&coordinator, "A"), Decimal::ZERO);
        assert_eq!(balance(&coordinator, "B"), dec("10.55"));
    }

    #[test]
    fn test_insufficient_funds() {
        let (coordinator, notifier) = setup(&[("from", "100"), ("to", "100")]);

        let err = coordinator.transfer("from", "to", dec("110")).unwrap_err();
        assert_eq!(
            err,
            TransferError::InsufficientFunds {
                account_id: AccountId::new("from").unwrap(),
                balance: dec("100"),
                requested: dec("110"),
            }
        );
        assert_eq!(balance(&coordinator, "from"), dec("100"));
        assert_eq!(balance(&coordinator, "to"), dec("100"));
        assert_guards_free(&coordinator);
        assert!(notifier.sent.lock().is_empty());
    }

    #[test]
    fn test_invalid_amount() {
        let (coordinator, notifier) = setup(&[("A", "100"), ("B", "100")]);

        for amount in ["0", "-1", "-0.01"] {
            let err = coordinator.transfer("A", "B", dec(amount)).unwrap_err();
            assert_eq!(err.code(), "INVALID_AMOUNT");
        }
        assert_eq!(balance(&coordinator, "A"), dec("100"));
        assert_eq!(balance(&coordinator, "B"), dec("100"));
        assert_guards_free(&coordinator);
        assert!(notifier.sent.lock().is_empty());
    }

    #[test]
    fn test_same_account() {
        let (coordinator, _) = setup(&[("A", "100")]);
        let err = coordinator.transfer("A", " A ", dec("10")).unwrap_err();
        assert_eq!(
            err,
            TransferError::SameAccount {
                id: AccountId::new("A").unwrap()
            }
        );
        assert_eq!(balance(&coordinator, "A"), dec("100"));
        assert_guards_free(&coordinator);
    }

    #[test]
    fn test_missing_accounts_all_reported() {
        let (coordinator, _) = setup(&[("A", "100")]);

        let err = coordinator.transfer("missing1", "missing2", dec("10")).unwrap_err();
        assert_eq!(
            err,
            TransferError::AccountNotFound {
                ids: vec!["missing1".into(), "missing2".into()]
            }
        );

        let err = coordinator.transfer("A", "missing", dec("10")).unwrap_err();
        assert_eq!(err, TransferError::AccountNotFound { ids: vec!["missing".into()] });

        let err = coordinator.transfer("missing", "A", dec("10")).unwrap_err();
        assert_eq!(err, TransferError::AccountNotFound { ids: vec!["missing".into()] });

        let err = coordinator.transfer("ghost", "ghost", dec("10")).unwrap_err();
        assert_eq!(err, TransferError::AccountNotFound { ids: vec!["ghost".into()] });
    }

    #[test]
    fn test_resolve_runs_before_validate() {
        let (coordinator, _) = setup(&[("A", "100")]);
        let err = coordinator.transfer("A", "missing", dec("-5")).unwrap_err();
        assert_eq!(err.code(), "ACCOUNT_NOT_FOUND");
    }

    #[test]
    fn test_notifier_failure_does_not_fail_transfer() {
        let repo = Arc::new(InMemoryAccountsRepository::new());
        repo.create(Account::open("A", dec("100")).unwrap()).unwrap();
        repo.create(Account::open("B", dec("0")).unwrap()).unwrap();
        let coordinator = TransferCoordinator::new(repo, Arc::new(FailingNotifier));

        coordinator.transfer("A", "B", dec("40")).unwrap();
        assert_eq!(balance(&coordinator, "A"), dec("60"));
        assert_eq!(balance(&coordinator, "B"), dec("40"));
    }

    #[test]
    fn test_failed_credit_is_compensated() {
        let max = Decimal::MAX.to_string();
        let (coordinator, notifier) = setup(&[("A", "100"), ("B", max.as_str())]);

        let err = coordinator.transfer("A", "B", dec("1")).unwrap_err();
        assert_eq!(err.code(), "MUTATION_FAULT");
        assert_eq!(balance(&coordinator, "A"), dec("100"));
        assert_eq!(balance(&coordinator, "B"), Decimal::MAX);
        assert_guards_free(&coordinator);
        assert!(notifier.sent.lock().is_empty());
    }

    #[test]
    fn test_lock_timeout_has_no_side_effects() {
        let (coordinator, _) = setup(&[("A", "100"), ("B", "100")]);
        let coordinator = coordinator.with_lock_timeout(Some(Duration::from_millis(50)));
        let b = coordinator.repository().get("B").unwrap();

        let (locked_tx, locked_rx) = std::sync::mpsc::channel();
        let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();
        let holder = {
            let b = Arc::clone(&b);
            thread::spawn(move || {
                let token = b.acquire().unwrap();
                locked_tx.send(()).unwrap();
                release_rx.recv().unwrap();
                b.release(token).unwrap();
            })
        };
        locked_rx.recv().unwrap();

        // B sorts first, so nothing is held when the wait gives up
        let err = coordinator.transfer("A", "B", dec("10")).unwrap_err();
        assert_eq!(
            err,
            TransferError::LockTimeout {
                account_id: AccountId::new("B").unwrap()
            }
        );
        assert!(!coordinator.repository().get("A").unwrap().is_held());

        release_tx.send(()).unwrap();
        holder.join().unwrap();

        coordinator.transfer("A", "B", dec("10")).unwrap();
        assert_eq!(balance(&coordinator, "A"), dec("90"));
        assert_eq!(balance(&coordinator, "B"), dec("110"));
    }

    #[test]
    fn test_second_guard_timeout_releases_first() {
        let (coordinator, _) = setup(&[("A", "100"), ("B", "100")]);
        let coordinator = coordinator.with_lock_timeout(Some(Duration::from_millis(50)));
        let a = coordinator.repository().get("A").unwrap();

        let (locked_tx, locked_rx) = std::sync::mpsc::channel();
        let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();
        let holder = {
            let a = Arc::clone(&a);
            thread::spawn(move || {
                let token = a.acquire().unwrap();
                locked_tx.send(()).unwrap();
                release_rx.recv().unwrap();
                a.release(token).unwrap();
            })
        };
        locked_rx.recv().unwrap();

        let err = coordinator.transfer("B", "A", dec("10")).unwrap_err();
        assert_eq!(err.code(), "LOCK_TIMEOUT");
        assert!(!coordinator.repository().get("B").unwrap().is_held());

        release_tx.send(()).unwrap();
        holder.join().unwrap();
        assert_eq!(balance(&coordinator, "A"), dec("100"));
        assert_eq!(balance(&coordinator, "B"), dec("100"));
    }

    #[test]
    fn test_caller_holding_a_guard_is_rejected() {
        let (coordinator, _) = setup(&[("A", "100"), ("B", "100")]);
        let a = coordinator.repository().get("A").unwrap();

        let token = a.acquire().unwrap();
        let err = coordinator.transfer("A", "B", dec("10")).unwrap_err();
        assert_eq!(err.code(), "LOCK_OWNERSHIP");
        assert!(!coordinator.repository().get("B").unwrap().is_held());
        a.release(token).unwrap();

        assert_eq!(balance(&coordinator, "A"), dec("100"));
        assert_eq!(balance(&coordinator, "B"), dec("100"));
    }

    #[test]
    fn test_from_config_applies_timeout() {
        let config = TransferConfig {
            lock_timeout_ms: Some(25),
            ..Default::default()
        };
        let (plain, notifier) = setup(&[]);
        let coordinator =
            TransferCoordinator::from_config(plain.repository().clone(), notifier, &config);
        assert_eq!(coordinator.lock_timeout(), Some(Duration::from_millis(25)));
        assert_eq!(plain.lock_timeout(), None);
    }
}
