//! Online/offline tracking with listener fan-out and an active probe.
//!
//! The monitor is an explicitly constructed service: call
//! [`ConnectivityMonitor::init`] once at startup and
//! [`ConnectivityMonitor::dispose`] on teardown. Platform notifications come
//! in through a [`ConnectivitySignal`]; ground-truth checks go through a
//! [`ConnectivityProbe`].

mod probe;
mod signal;

pub use probe::{ConnectivityProbe, HttpProbe};
pub use signal::{ConnectivitySignal, ManualSignal};

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use tokio::sync::{broadcast, watch};

use crate::util::task::TaskHandle;

/// Callback receiving the new online state.
pub type Listener = Arc<dyn Fn(bool) + Send + Sync>;

/// Returned by [`ConnectivityMonitor::add_listener`]; pass it back to remove.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Tracks connectivity and notifies listeners on genuine transitions.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct ConnectivityMonitor {
    inner: Arc<MonitorInner>,
}

struct MonitorInner {
    signal: Arc<dyn ConnectivitySignal>,
    probe: Option<Arc<dyn ConnectivityProbe>>,
    online_tx: watch::Sender<bool>,
    listeners: Mutex<Vec<(ListenerId, Listener)>>,
    next_listener: AtomicU64,
    events: Mutex<Option<TaskHandle>>,
}

impl ConnectivityMonitor {
    pub fn new(signal: Arc<dyn ConnectivitySignal>) -> Self {
        Self::build(signal, None)
    }

    /// Attach an active probe used by [`test_connectivity`](Self::test_connectivity).
    pub fn with_probe(signal: Arc<dyn ConnectivitySignal>, probe: Arc<dyn ConnectivityProbe>) -> Self {
        Self::build(signal, Some(probe))
    }

    fn build(signal: Arc<dyn ConnectivitySignal>, probe: Option<Arc<dyn ConnectivityProbe>>) -> Self {
        let (online_tx, _) = watch::channel(signal.is_online());
        Self {
            inner: Arc::new(MonitorInner {
                signal,
                probe,
                online_tx,
                listeners: Mutex::new(Vec::new()),
                next_listener: AtomicU64::new(0),
                events: Mutex::new(None),
            }),
        }
    }

    /// Start listening to platform transitions. Idempotent.
    ///
    /// Must be called from within a tokio runtime.
    pub fn init(&self) {
        let mut events = self
            .inner
            .events
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if events.as_ref().is_some_and(TaskHandle::is_active) {
            return;
        }

        let initial = self.inner.signal.is_online();
        self.inner.online_tx.send_replace(initial);
        let mut rx = self.inner.signal.subscribe();
        let weak: Weak<MonitorInner> = Arc::downgrade(&self.inner);

        *events = Some(TaskHandle::spawn(|token| async move {
            loop {
                let event = tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    event = rx.recv() => event,
                };
                let Some(inner) = weak.upgrade() else { break };
                match event {
                    Ok(online) => inner.apply(online),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::debug!(skipped, "Connectivity events lagged; resyncing");
                        let online = inner.signal.is_online();
                        inner.apply(online);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }));
        tracing::debug!(online = initial, "Connectivity monitor started");
    }

    /// Stop listening and drop every registered listener.
    pub fn dispose(&self) {
        if let Some(handle) = self
            .inner
            .events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.cancel();
        }
        self.inner
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        tracing::debug!("Connectivity monitor disposed");
    }

    pub fn is_initialized(&self) -> bool {
        self.inner
            .events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(TaskHandle::is_active)
    }

    /// Last known passive online state.
    pub fn is_online(&self) -> bool {
        *self.inner.online_tx.borrow()
    }

    /// Subscribe to state changes via a [`watch::Receiver`].
    pub fn watch(&self) -> watch::Receiver<bool> {
        self.inner.online_tx.subscribe()
    }

    /// Register a listener. Listeners run in registration order.
    pub fn add_listener(&self, listener: impl Fn(bool) + Send + Sync + 'static) -> ListenerId {
        let id = ListenerId(self.inner.next_listener.fetch_add(1, Ordering::Relaxed));
        self.inner
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, Arc::new(listener)));
        id
    }

    /// Remove a listener. Returns `false` if it was not registered.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self
            .inner
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    pub fn listener_count(&self) -> usize {
        self.inner
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Actively probe the network instead of trusting the passive flag.
    ///
    /// Without a probe this falls back to [`is_online`](Self::is_online).
    pub async fn test_connectivity(&self) -> bool {
        let Some(probe) = self.inner.probe.clone() else {
            return self.is_online();
        };
        match probe.probe().await {
            Ok(()) => true,
            Err(e) => {
                tracing::info!(error = %e, "Connectivity probe failed");
                false
            }
        }
    }
}

impl MonitorInner {
    fn apply(&self, online: bool) {
        let changed = self.online_tx.send_if_modified(|current| {
            if *current == online {
                return false;
            }
            *current = online;
            true
        });
        if !changed {
            return;
        }

        tracing::info!(online, "Connectivity changed");
        let listeners: Vec<Listener> = self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();
        for listener in listeners {
            listener(online);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_state_comes_from_signal() {
        let monitor = ConnectivityMonitor::new(Arc::new(ManualSignal::new(false)));
        assert!(!monitor.is_online());
        assert!(!monitor.is_initialized());
    }

    #[test]
    fn listeners_can_be_removed() {
        let monitor = ConnectivityMonitor::new(Arc::new(ManualSignal::new(true)));
        let a = monitor.add_listener(|_| {});
        let _b = monitor.add_listener(|_| {});

        assert!(monitor.remove_listener(a));
        assert!(!monitor.remove_listener(a));
        assert_eq!(monitor.listener_count(), 1);
    }

    #[tokio::test]
    async fn init_is_idempotent_and_dispose_clears_listeners() {
        let monitor = ConnectivityMonitor::new(Arc::new(ManualSignal::new(true)));
        monitor.init();
        monitor.init();
        monitor.add_listener(|_| {});
        assert!(monitor.is_initialized());

        monitor.dispose();

        assert!(!monitor.is_initialized());
        assert_eq!(monitor.listener_count(), 0);
    }
}
