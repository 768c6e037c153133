// ABOUTME: Multi-listener broadcast channel for source control notifications
// ABOUTME: Delivers in registration order over a snapshot of the listener set

use crate::notification::{Notification, SourceControlNotifications};
use parking_lot::RwLock;
use sourcebus_types::ConnectionState;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, error, trace};

/// Registration handle returned by [`NotificationChannel::register`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(pub u64);

/// Outcome of a single broadcast
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BroadcastReport {
    /// Listeners that returned normally
    pub delivered: usize,
    /// Listeners that panicked while handling the notification
    pub panicked: usize,
}

type Listener = Arc<dyn SourceControlNotifications>;

/// Broadcast channel with any number of listeners.
///
/// A broadcast walks a copy of the listener list taken when the broadcast
/// starts. Listeners registered or removed during delivery take effect from
/// the next broadcast, and each listener in the snapshot is invoked once.
pub struct NotificationChannel {
    listeners: RwLock<Vec<(ListenerId, Listener)>>,
    next_id: AtomicU64,
}

impl NotificationChannel {
    pub fn new() -> Self {
        Self {
            listeners: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a listener; it receives every broadcast until unregistered
    pub fn register(&self, listener: Arc<dyn SourceControlNotifications>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut listeners = self.listeners.write();
        listeners.push((id, listener));
        debug!(listener_id = id.0, listener_count = listeners.len(), "Notification listener registered");
        id
    }

    /// Remove a listener. Returns false if the id was not registered.
    pub fn unregister(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|(listener_id, _)| *listener_id != id);
        let removed = listeners.len() != before;
        debug!(listener_id = id.0, removed, "Notification listener unregistered");
        removed
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.listener_count() == 0
    }

    /// Deliver a notification to every listener registered right now.
    ///
    /// A listener that panics is logged and skipped; delivery continues with
    /// the next one.
    pub fn broadcast(&self, notification: &Notification) -> BroadcastReport {
        let snapshot: Vec<(ListenerId, Listener)> = self.listeners.read().clone();
        let mut report = BroadcastReport::default();

        trace!(
            kind = notification.kind(),
            listener_count = snapshot.len(),
            "Broadcasting notification"
        );

        for (id, listener) in snapshot {
            let outcome = catch_unwind(AssertUnwindSafe(|| notification.dispatch(listener.as_ref())));
            match outcome {
                Ok(()) => report.delivered += 1,
                Err(payload) => {
                    report.panicked += 1;
                    error!(
                        listener_id = id.0,
                        kind = notification.kind(),
                        panic = panic_message(payload.as_ref()),
                        "Notification listener panicked"
                    );
                }
            }
        }

        report
    }

    pub fn request_trust(&self, fingerprint: &str) -> BroadcastReport {
        self.broadcast(&Notification::request_trust(fingerprint))
    }

    pub fn connectivity_state_changed(&self, state: ConnectionState) -> BroadcastReport {
        self.broadcast(&Notification::connectivity_state_changed(state))
    }
}

impl Default for NotificationChannel {
    fn default() -> Self {
        Self::new()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        *message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "<non-string panic payload>"
    }
}
