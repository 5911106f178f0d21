//! Transfer notifications
//!
//! Fire-and-forget: the coordinator calls [`Notifier::notify`] once per
//! completed transfer, after both guards are released, and only logs a
//! failure. Nothing here can undo or fail a transfer.

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use chrono::{DateTime, Utc};
use crossbeam_queue::ArrayQueue;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::account::{Account, AccountId};

const TARGET: &str = "acctlock::notification";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum NotifyError {
    #[error("Notification queue full (capacity {capacity})")]
    QueueFull { capacity: usize },

    #[error("Notification delivery failed: {0}")]
    Delivery(String),
}

/// Delivery channel for transfer notifications
pub trait Notifier: Send + Sync {
    fn notify(&self, account: &Account, message: &str) -> Result<(), NotifyError>;
}

/// A notification waiting for delivery
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub account_id: AccountId,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

/// Writes each notification to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, account: &Account, message: &str) -> Result<(), NotifyError> {
        info!(target: TARGET, account = %account.id(), "{}", message);
        Ok(())
    }
}

/// Bounded in-memory outbox
///
/// Producers never block: when the queue is full the notification is
/// refused with `QueueFull` and the coordinator logs it. A consumer drains
/// the outbox at its own pace, usually with [`QueuedNotifier::pump`].
pub struct QueuedNotifier {
    queue: ArrayQueue<Notification>,
}

impl QueuedNotifier {
    /// # Panics
    /// If `capacity` is zero (`ArrayQueue` requirement).
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: ArrayQueue::new(capacity),
        }
    }

    pub fn capacity(&self) -> usize {
        self.queue.capacity()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Take the next pending notification
    pub fn pop(&self) -> Option<Notification> {
        self.queue.pop()
    }

    /// Take everything pending, oldest first
    pub fn drain(&self) -> Vec<Notification> {
        std::iter::from_fn(|| self.queue.pop()).collect()
    }

    /// Deliver queued notifications to the log until `stop` is set and the
    /// outbox is empty. Returns how many were delivered.
    pub fn pump(&self, stop: &AtomicBool) -> usize {
        let mut delivered = 0;
        let mut spin_count = 0u32;
        loop {
            if let Some(notification) = self.queue.pop() {
                info!(
                    target: TARGET,
                    account = %notification.account_id,
                    queued_at = %notification.created_at,
                    "{}",
                    notification.message
                );
                delivered += 1;
                spin_count = 0;
                continue;
            }

            // Checked only after a failed pop so nothing queued before stop is lost
            if stop.load(Ordering::SeqCst) && self.queue.is_empty() {
                break;
            }

            spin_count += 1;
            if spin_count > 100 {
                thread::yield_now();
                spin_count = 0;
            } else {
                std::hint::spin_loop();
            }
        }
        delivered
    }
}

impl Notifier for QueuedNotifier {
    fn notify(&self, account: &Account, message: &str) -> Result<(), NotifyError> {
        self.queue
            .push(Notification {
                account_id: account.id().clone(),
                message: message.to_string(),
                created_at: Utc::now(),
            })
            .map_err(|_| NotifyError::QueueFull {
                capacity: self.queue.capacity(),
            })
    }
}
