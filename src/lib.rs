//! acctlock - deadlock-free transfers between concurrently shared accounts
//!
//! Each account carries an explicit balance guard. A transfer takes the
//! guards of both accounts in one global order, checks funds and moves the
//! amount while holding both, then releases them and notifies.
//!
//! # Modules
//!
//! - [`core_types`] - Core type definitions (AccountId)
//! - [`account`] - Account entity, balance guard, repository
//! - [`transfer`] - Transfer state machine and coordinator
//! - [`notification`] - Notifier trait and implementations
//! - [`service`] - Facade over repository, coordinator and notifier
//! - [`config`] - YAML application config
//! - [`logging`] - tracing subscriber setup
//! - [`simulation`] - Multi-threaded transfer workload

// Core types - must be first!
pub mod core_types;

pub mod account;
pub mod notification;
pub mod service;
pub mod transfer;

pub mod config;
pub mod logging;
pub mod simulation;

// Convenient re-exports at crate root
pub use account::{
    Account, AccountError, AccountSnapshot, AccountsRepository, GuardToken,
    InMemoryAccountsRepository, RepositoryError, ValidationError,
};
pub use core_types::AccountId;
pub use notification::{LogNotifier, Notification, Notifier, NotifyError, QueuedNotifier};
pub use service::AccountsService;
pub use transfer::{
    TransferCoordinator, TransferError, TransferId, TransferReceipt, TransferRequest,
    TransferState,
};
