use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, bounded};
use serde::Serialize;

pub type ClientId = u64;

/// Outcome of one broadcast.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DeliveryReport {
    /// Queues that accepted the message. A peer that vanished but whose connection thread
    /// has not noticed yet still counts here; that thread unregisters it shortly after.
    pub enqueued: usize,
    /// Clients whose queue was full or closed; they were removed.
    pub dropped: usize,
}

/// Connected push clients, each reachable through a bounded outbound queue that only its
/// own connection thread drains.
#[derive(Debug, Default)]
pub struct ClientRegistry {
    clients: Mutex<BTreeMap<ClientId, Sender<String>>>,
    next_id: AtomicU64,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<ClientId, Sender<String>>> {
        self.clients.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn register(&self, capacity: usize) -> (ClientId, Receiver<String>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = bounded(capacity.max(1));
        self.lock().insert(id, sender);
        tracing::debug!(client = id, "push client registered");
        (id, receiver)
    }

    pub fn unregister(&self, id: ClientId) -> bool {
        let removed = self.lock().remove(&id).is_some();
        if removed {
            tracing::debug!(client = id, "push client unregistered");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Drops every queue; connection threads observe the disconnect and close.
    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Enqueues `message` for every client. The lock is held only to snapshot the senders;
    /// a client that cannot accept within `send_timeout` is removed.
    pub fn broadcast(&self, message: &str, send_timeout: Duration) -> DeliveryReport {
        let snapshot = self
            .lock()
            .iter()
            .map(|(id, sender)| (*id, sender.clone()))
            .collect::<Vec<_>>();

        let mut report = DeliveryReport::default();
        let mut dead = Vec::<ClientId>::new();
        for (id, sender) in snapshot {
            match sender.send_timeout(message.to_string(), send_timeout) {
                Ok(()) => report.enqueued += 1,
                Err(_) => dead.push(id),
            }
        }

        if !dead.is_empty() {
            let mut clients = self.lock();
            for id in &dead {
                clients.remove(id);
            }
            report.dropped = dead.len();
            tracing::warn!(dropped = ?dead, "removed unresponsive push clients");
        }
        report
    }
}
