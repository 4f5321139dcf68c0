//! Account lifecycle notifications
//!
//! Each subscriber owns an unbounded queue, so a slow UI component never
//! loses an emission and never blocks the emitter.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use tokio::sync::mpsc;
use tracing::debug;

use super::types::AccountId;

pub const ACCOUNT_STATUS_CHANGED: &str = "accountStatusChanged";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AccountEvent {
    StatusChanged { account_id: AccountId },
}

impl AccountEvent {
    pub fn status_changed(account_id: &str) -> Self {
        AccountEvent::StatusChanged {
            account_id: account_id.to_string(),
        }
    }

    pub fn topic(&self) -> &'static str {
        match self {
            AccountEvent::StatusChanged { .. } => ACCOUNT_STATUS_CHANGED,
        }
    }

    pub fn account_id(&self) -> &str {
        match self {
            AccountEvent::StatusChanged { account_id } => account_id,
        }
    }
}

#[derive(Default)]
struct BusInner {
    next_id: AtomicU64,
    closed: AtomicBool,
    subscribers: Mutex<HashMap<u64, mpsc::UnboundedSender<AccountEvent>>>,
}

impl BusInner {
    fn subscribers(&self) -> std::sync::MutexGuard<'_, HashMap<u64, mpsc::UnboundedSender<AccountEvent>>> {
        self.subscribers.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Process-wide event channel, cheap to clone. Constructed once by the
/// account manager and handed to every account.
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver `event` to every current subscriber. Fire-and-forget.
    pub fn emit(&self, event: AccountEvent) {
        let mut subscribers = self.inner.subscribers();
        debug!(topic = event.topic(), account = event.account_id(), "emit");
        subscribers.retain(|_, tx| tx.send(event.clone()).is_ok());
    }

    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        if !self.inner.closed.load(Ordering::Acquire) {
            self.inner.subscribers().insert(id, tx);
        }
        Subscription {
            id,
            rx,
            bus: Arc::downgrade(&self.inner),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers().len()
    }

    /// Session end: drop every subscriber. Pending events can still be drained
    /// after which `recv` returns `None`.
    pub fn shutdown(&self) {
        self.inner.closed.store(true, Ordering::Release);
        self.inner.subscribers().clear();
    }
}

/// Receiving end of a subscription; dropping it unsubscribes.
pub struct Subscription {
    id: u64,
    rx: mpsc::UnboundedReceiver<AccountEvent>,
    bus: Weak<BusInner>,
}

impl Subscription {
    pub async fn recv(&mut self) -> Option<AccountEvent> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<AccountEvent> {
        self.rx.try_recv().ok()
    }

    /// Drain everything delivered so far.
    pub fn drain(&mut self) -> Vec<AccountEvent> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(bus) = self.bus.upgrade() {
            bus.subscribers().remove(&self.id);
        }
    }
}
