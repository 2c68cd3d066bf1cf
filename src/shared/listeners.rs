//! # Listener Registry
//!
//! Callback fan-out used by the connectivity monitor, the mutation tracker and
//! the status coordinator. Every registered callback receives a reference to
//! each emitted value.
//!
//! Registering returns a [`Subscription`]. Dropping it (or calling
//! [`Subscription::unsubscribe`]) removes the callback, so a torn-down
//! component cannot keep receiving events.
//!
//! Callbacks run outside the registry lock: a callback may subscribe or
//! unsubscribe without deadlocking.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError, Weak};

/// Boxed listener callback
pub type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Registry<T> {
    next_id: u64,
    callbacks: BTreeMap<u64, Callback<T>>,
}

/// Set of callbacks interested in values of type `T`
pub struct Listeners<T> {
    registry: Arc<Mutex<Registry<T>>>,
}

impl<T> Default for Listeners<T> {
    fn default() -> Self {
        Self {
            registry: Arc::new(Mutex::new(Registry {
                next_id: 0,
                callbacks: BTreeMap::new(),
            })),
        }
    }
}

impl<T> Clone for Listeners<T> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
        }
    }
}

impl<T> Listeners<T> {
    /// Number of registered callbacks
    pub fn len(&self) -> usize {
        self.registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .callbacks
            .len()
    }

    /// Whether no callback is registered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> std::fmt::Debug for Listeners<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listeners").field("len", &self.len()).finish()
    }
}

impl<T: 'static> Listeners<T> {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback
    pub fn add<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let mut registry = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
        let id = registry.next_id;
        registry.next_id += 1;
        registry.callbacks.insert(id, Arc::new(callback));

        let weak: Weak<Mutex<Registry<T>>> = Arc::downgrade(&self.registry);
        Subscription {
            remove: Some(Box::new(move || {
                if let Some(registry) = weak.upgrade() {
                    registry
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .callbacks
                        .remove(&id);
                }
            })),
        }
    }

    /// Deliver a value to every registered callback, in registration order
    ///
    /// Returns the number of callbacks invoked.
    pub fn emit(&self, value: &T) -> usize {
        let callbacks: Vec<Callback<T>> = {
            let registry = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
            registry.callbacks.values().cloned().collect()
        };
        for callback in &callbacks {
            callback(value);
        }
        callbacks.len()
    }
}

/// Handle keeping a callback registered
///
/// The callback is removed when the handle is dropped.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    remove: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    /// Remove the callback now
    pub fn unsubscribe(mut self) {
        self.cancel();
    }

    /// Whether the callback is still registered through this handle
    pub fn is_active(&self) -> bool {
        self.remove.is_some()
    }

    fn cancel(&mut self) {
        if let Some(remove) = self.remove.take() {
            remove();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.is_active())
            .finish()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}
