//! Keyed publish/subscribe registry.
//!
//! A [`Subject`] maps a key to an ordered list of callbacks. Each registration
//! is owned by a [`Subscription`] token; dropping the token removes exactly
//! that callback.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::{Arc, Mutex, PoisonError, Weak};

type Callback<E> = Arc<dyn Fn(&E) + Send + Sync>;

struct Registry<K, E> {
    next_id: u64,
    slots: HashMap<K, Vec<(u64, Callback<E>)>>,
}

impl<K: Eq + Hash, E> Registry<K, E> {
    fn remove(&mut self, key: &K, id: u64) {
        if let Some(slots) = self.slots.get_mut(key) {
            slots.retain(|(slot_id, _)| *slot_id != id);
            if slots.is_empty() {
                self.slots.remove(key);
            }
        }
    }
}

/// Callback registry keyed by `K`, delivering `&E` to subscribers.
pub struct Subject<K, E> {
    registry: Arc<Mutex<Registry<K, E>>>,
}

impl<K, E> Default for Subject<K, E> {
    fn default() -> Self {
        Self {
            registry: Arc::new(Mutex::new(Registry {
                next_id: 0,
                slots: HashMap::new(),
            })),
        }
    }
}

impl<K, E> fmt::Debug for Subject<K, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subject").finish_non_exhaustive()
    }
}

impl<K, E> Subject<K, E>
where
    K: Eq + Hash + Copy + Send + 'static,
    E: 'static,
{
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `callback` under `key`. The callback stays registered for as
    /// long as the returned token is alive.
    pub fn subscribe<F>(&self, key: K, callback: F) -> Subscription
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        let mut registry = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
        let id = registry.next_id;
        registry.next_id += 1;
        registry
            .slots
            .entry(key)
            .or_default()
            .push((id, Arc::new(callback)));

        let weak: Weak<Mutex<Registry<K, E>>> = Arc::downgrade(&self.registry);
        Subscription {
            release: Some(Box::new(move || {
                if let Some(registry) = weak.upgrade() {
                    registry
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .remove(&key, id);
                }
            })),
        }
    }

    /// Invoke every callback registered under `key`, in registration order.
    ///
    /// The registry lock is not held while callbacks run, so a callback may
    /// subscribe or release tokens. A panicking callback unwinds out of
    /// `publish` and skips the callbacks after it.
    ///
    /// Returns the number of callbacks invoked.
    pub fn publish(&self, key: K, event: &E) -> usize {
        let callbacks: Vec<Callback<E>> = {
            let registry = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
            registry
                .slots
                .get(&key)
                .map(|slots| slots.iter().map(|(_, cb)| Arc::clone(cb)).collect())
                .unwrap_or_default()
        };
        for callback in &callbacks {
            callback(event);
        }
        callbacks.len()
    }

    /// Number of live registrations under `key`.
    pub fn subscriber_count(&self, key: K) -> usize {
        self.registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .slots
            .get(&key)
            .map_or(0, Vec::len)
    }
}

/// Registration token returned by [`Subject::subscribe`].
#[must_use = "dropping a Subscription immediately unregisters its callback"]
pub struct Subscription {
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    /// Unregister now. Equivalent to dropping the token.
    pub fn release(mut self) {
        self.unregister();
    }

    fn unregister(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.release.is_some())
            .finish()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unregister();
    }
}
