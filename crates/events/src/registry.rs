//! Observer registry with token-based unregistration.
//!
//! [`ListenerRegistry`] is the fan-out point for change notifications. It
//! has exactly one writer (whoever owns the registry and calls
//! [`notify`](ListenerRegistry::notify)) and any number of listeners.
//! Listeners are invoked outside the internal lock, so a listener may
//! register or unregister other listeners without deadlocking.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// A registered callback receiving a shared reference to each event.
pub type Listener<E> = Arc<dyn Fn(&E) + Send + Sync>;

/// Handle returned by [`ListenerRegistry::register`].
///
/// Tokens are unique per registry and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ListenerToken(u64);

// ---------------------------------------------------------------------------
// ListenerRegistry
// ---------------------------------------------------------------------------

pub struct ListenerRegistry<E> {
    listeners: Mutex<BTreeMap<ListenerToken, Listener<E>>>,
    next_token: AtomicU64,
}

impl<E> ListenerRegistry<E> {
    pub fn new() -> Self {
        Self {
            listeners: Mutex::new(BTreeMap::new()),
            next_token: AtomicU64::new(1),
        }
    }

    /// Add a listener. It receives every event notified after this call.
    pub fn register<F>(&self, listener: F) -> ListenerToken
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        let token = ListenerToken(self.next_token.fetch_add(1, Ordering::Relaxed));
        self.lock().insert(token, Arc::new(listener));
        token
    }

    /// Remove a listener. Returns `false` if the token was unknown or had
    /// already been removed.
    pub fn unregister(&self, token: ListenerToken) -> bool {
        self.lock().remove(&token).is_some()
    }

    /// Deliver `event` to every listener, in registration order.
    pub fn notify(&self, event: &E) {
        // Snapshot the listener list so callbacks run without the lock held.
        let listeners: Vec<Listener<E>> = self.lock().values().cloned().collect();
        for listener in listeners {
            listener(event);
        }
    }

    /// Drop every listener.
    pub fn clear(&self) {
        let removed = std::mem::take(&mut *self.lock());
        if !removed.is_empty() {
            tracing::trace!(count = removed.len(), "Cleared listeners");
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<ListenerToken, Listener<E>>> {
        // A panicking listener never runs under this lock, so the map
        // itself cannot be left half-updated.
        self.listeners.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl<E> Default for ListenerRegistry<E> {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;

    #[test]
    fn registered_listener_receives_events() {
        let registry = ListenerRegistry::<u32>::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);

        registry.register(move |value: &u32| sink.lock().unwrap().push(*value));
        registry.notify(&1);
        registry.notify(&2);

        assert_eq!(*seen.lock().unwrap(), vec![1, 2]);
    }

    #[test]
    fn multiple_listeners_receive_same_event() {
        let registry = ListenerRegistry::<&'static str>::new();
        let count = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let count = Arc::clone(&count);
            registry.register(move |_| {
                count.fetch_add(1, Ordering::SeqCst);
            });
        }
        registry.notify(&"tick");

        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn unregistered_listener_receives_nothing() {
        let registry = ListenerRegistry::<u32>::new();
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);

        let token = registry.register(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });
        assert!(registry.unregister(token));
        registry.notify(&7);

        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert!(registry.is_empty());
    }

    #[test]
    fn unregister_twice_reports_false() {
        let registry = ListenerRegistry::<u32>::new();
        let token = registry.register(|_| {});
        assert!(registry.unregister(token));
        assert!(!registry.unregister(token));
    }

    #[test]
    fn tokens_are_unique() {
        let registry = ListenerRegistry::<u32>::new();
        let a = registry.register(|_| {});
        let b = registry.register(|_| {});
        assert_ne!(a, b);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn listener_may_unregister_itself_during_notify() {
        let registry = Arc::new(ListenerRegistry::<u32>::new());
        let token_slot: Arc<Mutex<Option<ListenerToken>>> = Arc::new(Mutex::new(None));

        let reg = Arc::clone(&registry);
        let slot = Arc::clone(&token_slot);
        let token = registry.register(move |_| {
            if let Some(token) = *slot.lock().unwrap() {
                reg.unregister(token);
            }
        });
        *token_slot.lock().unwrap() = Some(token);

        registry.notify(&1);
        assert!(registry.is_empty());
    }

    #[test]
    fn clear_removes_everything() {
        let registry = ListenerRegistry::<u32>::new();
        registry.register(|_| {});
        registry.register(|_| {});
        registry.clear();
        assert!(registry.is_empty());
    }
}
