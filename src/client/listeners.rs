//! Change-signal listeners for reloadable configuration.

use dashmap::DashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

type Callback = Arc<dyn Fn() + Send + Sync>;

struct ListenersInner {
    callbacks: DashMap<usize, Callback>,
    next_id: AtomicUsize,
}

/// Handle for a registered listener.
///
/// When the handle is dropped, the listener is removed.
#[must_use = "dropping the handle unregisters the listener"]
pub struct ListenerHandle {
    id: usize,
    inner: Arc<ListenersInner>,
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        self.inner.callbacks.remove(&self.id);
    }
}

/// Registry of callbacks invoked when a snapshot is replaced.
///
/// # Examples
///
/// ```rust
/// use hotswap_remote::client::ChangeListeners;
///
/// let listeners = ChangeListeners::new();
/// let handle = listeners.subscribe(|| println!("Config changed!"));
///
/// listeners.notify_all();
///
/// // Unsubscribe by dropping the handle
/// drop(handle);
/// assert_eq!(listeners.listener_count(), 0);
/// ```
#[derive(Clone)]
pub struct ChangeListeners {
    inner: Arc<ListenersInner>,
}

impl ChangeListeners {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ListenersInner {
                callbacks: DashMap::new(),
                next_id: AtomicUsize::new(0),
            }),
        }
    }

    /// Register `callback`; it runs after every change until the handle is dropped.
    pub fn subscribe<F>(&self, callback: F) -> ListenerHandle
    where
        F: Fn() + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        self.inner.callbacks.insert(id, Arc::new(callback));
        ListenerHandle {
            id,
            inner: Arc::clone(&self.inner),
        }
    }

    /// Invoke every registered callback, in registration order.
    pub fn notify_all(&self) {
        let mut callbacks: Vec<(usize, Callback)> = self
            .inner
            .callbacks
            .iter()
            .map(|entry| (*entry.key(), Arc::clone(entry.value())))
            .collect();
        callbacks.sort_by_key(|(id, _)| *id);

        // Map guards are released here, so callbacks may (un)subscribe freely.
        for (_, callback) in callbacks {
            callback();
        }
    }

    /// Get the number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.inner.callbacks.len()
    }
}

impl Default for ChangeListeners {
    fn default() -> Self {
        Self::new()
    }
}
