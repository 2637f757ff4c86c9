//! Registry of inbound-message listeners.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use trustbridge_model::Message;

/// Handle returned by [`Listeners::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl std::fmt::Display for ListenerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}

/// What a listener wants after seeing a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerAction {
    /// Stay registered.
    Keep,
    /// Deregister now.
    Remove,
}

type Listener = Box<dyn FnMut(&Message) -> ListenerAction + Send>;

/// Listeners attached to one channel endpoint.
///
/// Dispatch runs on the channel's own task while the registry lock is held.
/// A listener must not call [`register`](Listeners::register) or
/// [`deregister`](Listeners::deregister) itself; it returns
/// [`ListenerAction::Remove`] instead.
#[derive(Default)]
pub struct Listeners {
    next_id: AtomicU64,
    entries: Mutex<Vec<(ListenerId, Listener)>>,
}

impl Listeners {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, Vec<(ListenerId, Listener)>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a listener. It sees every message dispatched after this call.
    pub fn register<F>(&self, listener: F) -> ListenerId
    where
        F: FnMut(&Message) -> ListenerAction + Send + 'static,
    {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.entries().push((id, Box::new(listener)));
        tracing::trace!(%id, "listener registered");
        id
    }

    /// Remove a listener. Returns false if it was already gone.
    pub fn deregister(&self, id: ListenerId) -> bool {
        let mut entries = self.entries();
        let before = entries.len();
        entries.retain(|(entry_id, _)| *entry_id != id);
        let removed = entries.len() != before;
        if removed {
            tracing::trace!(%id, "listener deregistered");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    /// Hand a message to every listener. Returns how many saw it.
    ///
    /// A message nobody listens for is dropped.
    pub fn dispatch(&self, message: &Message) -> usize {
        let mut entries = self.entries();
        let seen = entries.len();

        if seen == 0 {
            tracing::debug!(
                keys = ?message.keys().collect::<Vec<_>>(),
                "dropping message with no listener"
            );
            return 0;
        }

        entries.retain_mut(|(_, listener)| listener(message) == ListenerAction::Keep);
        seen
    }

    /// Drop every listener. Called once the inbound side is gone, so
    /// anything a listener owns (a pending waiter, say) is released.
    pub fn clear(&self) -> usize {
        let dropped = std::mem::take(&mut *self.entries());
        if !dropped.is_empty() {
            tracing::debug!(count = dropped.len(), "dropping listeners of closed channel");
        }
        dropped.len()
    }
}

impl std::fmt::Debug for Listeners {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listeners")
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn message(key: &str) -> Message {
        Message::new().with_entry(key, "payload")
    }

    #[test]
    fn register_and_deregister() {
        let listeners = Listeners::new();
        let id = listeners.register(|_| ListenerAction::Keep);
        assert_eq!(listeners.len(), 1);
        assert!(listeners.deregister(id));
        assert!(!listeners.deregister(id));
        assert!(listeners.is_empty());
    }

    #[test]
    fn dispatch_reaches_every_listener() {
        let listeners = Listeners::new();
        let hits = Arc::new(AtomicU64::new(0));

        for _ in 0..3 {
            let hits = hits.clone();
            listeners.register(move |_| {
                hits.fetch_add(1, Ordering::SeqCst);
                ListenerAction::Keep
            });
        }

        assert_eq!(listeners.dispatch(&message("a")), 3);
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn remove_action_deregisters() {
        let listeners = Listeners::new();
        listeners.register(|message| {
            if message.contains("done") {
                ListenerAction::Remove
            } else {
                ListenerAction::Keep
            }
        });

        listeners.dispatch(&message("other"));
        assert_eq!(listeners.len(), 1);

        listeners.dispatch(&message("done"));
        assert!(listeners.is_empty());
    }

    #[test]
    fn dispatch_without_listeners_drops() {
        let listeners = Listeners::new();
        assert_eq!(listeners.dispatch(&message("a")), 0);
    }

    #[test]
    fn clear_releases_captured_state() {
        let listeners = Listeners::new();
        let (tx, mut rx) = tokio::sync::oneshot::channel::<()>();
        let mut waiter = Some(tx);
        listeners.register(move |_| {
            waiter.take();
            ListenerAction::Remove
        });
        listeners.register(|_| ListenerAction::Keep);

        assert_eq!(listeners.clear(), 2);
        assert!(listeners.is_empty());
        assert!(matches!(
            rx.try_recv(),
            Err(tokio::sync::oneshot::error::TryRecvError::Closed)
        ));
        assert_eq!(listeners.clear(), 0);
    }

    #[test]
    fn ids_are_distinct() {
        let listeners = Listeners::new();
        let a = listeners.register(|_| ListenerAction::Keep);
        let b = listeners.register(|_| ListenerAction::Keep);
        assert_ne!(a, b);
    }
}
