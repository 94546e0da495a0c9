//! Platform connectivity signal abstraction.

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::broadcast;

/// Passive platform-level online/offline notifications.
pub trait ConnectivitySignal: Send + Sync {
    /// The platform's current (possibly optimistic) online flag.
    fn is_online(&self) -> bool;

    /// Stream of transition notifications. Duplicates are allowed.
    fn subscribe(&self) -> broadcast::Receiver<bool>;
}

/// Push-based signal for hosts that forward platform events themselves.
#[derive(Debug)]
pub struct ManualSignal {
    online: AtomicBool,
    tx: broadcast::Sender<bool>,
}

impl ManualSignal {
    pub fn new(initially_online: bool) -> Self {
        let (tx, _) = broadcast::channel(32);
        Self {
            online: AtomicBool::new(initially_online),
            tx,
        }
    }

    /// Forward a platform "online"/"offline" event.
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
        // No receivers simply means nobody is monitoring yet.
        let _ = self.tx.send(online);
    }
}

impl ConnectivitySignal for ManualSignal {
    fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    fn subscribe(&self) -> broadcast::Receiver<bool> {
        self.tx.subscribe()
    }
}
