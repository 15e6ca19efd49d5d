//! Process-wide inbound message registry: the surface the host posts into.
//!
//! Listeners register through [`HostWindow::listen`] and are removed when their
//! [`ListenerGuard`] is dropped, so a view can never leak a listener past teardown.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tokio::sync::mpsc;

type Listeners = Arc<RwLock<HashMap<u64, mpsc::UnboundedSender<Value>>>>;

/// Shared handle to the inbound registry. Clones refer to the same window.
#[derive(Clone, Default)]
pub struct HostWindow {
    listeners: Listeners,
    next_id: Arc<AtomicU64>,
}

/// Registration handle; deregisters its listener on drop.
pub struct ListenerGuard {
    id: u64,
    listeners: Listeners,
}

impl HostWindow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener. Messages dispatched while the guard lives arrive on the receiver.
    pub fn listen(&self) -> (ListenerGuard, mpsc::UnboundedReceiver<Value>) {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::unbounded_channel();
        if let Ok(mut g) = self.listeners.write() {
            g.insert(id, tx);
        }
        log::debug!("host window: listener {} registered", id);
        let guard = ListenerGuard {
            id,
            listeners: self.listeners.clone(),
        };
        (guard, rx)
    }

    /// Deliver one raw message to every listener. Returns how many received it.
    pub fn dispatch(&self, message: Value) -> usize {
        let Ok(g) = self.listeners.read() else {
            return 0;
        };
        g.values()
            .filter(|tx| tx.send(message.clone()).is_ok())
            .count()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.read().map(|g| g.len()).unwrap_or(0)
    }
}

impl Drop for ListenerGuard {
    fn drop(&mut self) {
        let Ok(mut g) = self.listeners.write() else {
            return;
        };
        g.remove(&self.id);
        log::debug!("host window: listener {} removed", self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn dispatch_reaches_registered_listeners() {
        let window = HostWindow::new();
        let (_a, mut rx_a) = window.listen();
        let (_b, mut rx_b) = window.listen();
        assert_eq!(window.dispatch(json!({ "event": "appContext" })), 2);
        assert_eq!(rx_a.recv().await, Some(json!({ "event": "appContext" })));
        assert_eq!(rx_b.recv().await, Some(json!({ "event": "appContext" })));
    }

    #[test]
    fn dropping_guard_deregisters() {
        let window = HostWindow::new();
        let (guard, _rx) = window.listen();
        assert_eq!(window.listener_count(), 1);
        drop(guard);
        assert_eq!(window.listener_count(), 0);
        assert_eq!(window.dispatch(json!({})), 0);
    }

    #[test]
    fn clones_share_listeners() {
        let window = HostWindow::new();
        let other = window.clone();
        let (_guard, _rx) = other.listen();
        assert_eq!(window.listener_count(), 1);
    }
}
