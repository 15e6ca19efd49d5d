//! Host bridge: owns the view's listener, the latest context, and the pending context request.

use super::protocol::{decode_host_message, InboundContext};
use super::window::{HostWindow, ListenerGuard};
use super::{BridgeError, HostTransport};
use serde_json::Value;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Identifies one outstanding context request. Only the current token may report a timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestToken(u64);

/// Wait for the next bridge event. Events missed because the receiver fell behind are
/// skipped with a warning; None once the bridge is gone.
pub async fn next_event(events: &mut broadcast::Receiver<BridgeEvent>) -> Option<BridgeEvent> {
    loop {
        match events.recv().await {
            Ok(event) => return Some(event),
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                log::warn!("host bridge: {} events dropped while busy", missed);
            }
            Err(broadcast::error::RecvError::Closed) => return None,
        }
    }
}

/// What the bridge tells its view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeEvent {
    /// A new context replaced the previous one wholesale.
    Context(InboundContext),
    Error(BridgeError),
}

#[derive(Default)]
struct BridgeState {
    context: Option<InboundContext>,
    error: Option<BridgeError>,
    pending: Option<RequestToken>,
    next_token: u64,
}

struct Shared {
    state: Mutex<BridgeState>,
    events: broadcast::Sender<BridgeEvent>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, BridgeState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn handle_message(&self, raw: Value) {
        match decode_host_message(raw) {
            Ok(ctx) => {
                {
                    let mut st = self.lock();
                    st.context = Some(ctx.clone());
                    st.error = None;
                    st.pending = None;
                }
                log::debug!("host bridge: context received (event {:?})", ctx.event);
                let _ = self.events.send(BridgeEvent::Context(ctx));
            }
            Err(e) => {
                log::warn!("host bridge: {}", e);
                self.lock().error = Some(e.clone());
                let _ = self.events.send(BridgeEvent::Error(e));
            }
        }
    }

    /// Report `err` for `token` only if that request is still the one outstanding.
    fn fail_pending(&self, token: RequestToken, err: BridgeError) {
        {
            let mut st = self.lock();
            if st.pending != Some(token) {
                log::debug!("host bridge: ignoring {:?} for superseded request {:?}", err, token);
                return;
            }
            st.pending = None;
            st.error = Some(err.clone());
        }
        log::warn!("host bridge: {}", err);
        let _ = self.events.send(BridgeEvent::Error(err));
    }
}

struct Attachment {
    _guard: ListenerGuard,
    pump: JoinHandle<()>,
}

impl Drop for Attachment {
    fn drop(&mut self) {
        self.pump.abort();
    }
}

/// One view's connection to the host.
pub struct HostBridge {
    transport: Arc<dyn HostTransport>,
    fetch_signal: String,
    timeout: Duration,
    shared: Arc<Shared>,
    attachment: Option<Attachment>,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl HostBridge {
    pub fn new(
        transport: Arc<dyn HostTransport>,
        fetch_signal: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            transport,
            fetch_signal: fetch_signal.into(),
            timeout,
            shared: Arc::new(Shared {
                state: Mutex::new(BridgeState::default()),
                events,
            }),
            attachment: None,
            timer: Mutex::new(None),
        }
    }

    /// Receive context and error events from this bridge.
    pub fn subscribe(&self) -> broadcast::Receiver<BridgeEvent> {
        self.shared.events.subscribe()
    }

    /// Start listening on `window`. Returns false (and does nothing) when already attached,
    /// so repeated activation never registers a second listener.
    pub fn attach(&mut self, window: &HostWindow) -> bool {
        if self.attachment.is_some() {
            return false;
        }
        let (guard, mut rx) = window.listen();
        let shared = self.shared.clone();
        let pump = tokio::spawn(async move {
            while let Some(raw) = rx.recv().await {
                shared.handle_message(raw);
            }
        });
        self.attachment = Some(Attachment {
            _guard: guard,
            pump,
        });
        log::info!("host bridge: attached");
        true
    }

    /// Stop listening. Returns false when there was nothing to detach.
    pub fn detach(&mut self) -> bool {
        match self.attachment.take() {
            Some(_) => {
                log::info!("host bridge: detached");
                true
            }
            None => false,
        }
    }

    pub fn is_attached(&self) -> bool {
        self.attachment.is_some()
    }

    /// Handle one raw inbound message (string or object). Decode failures leave the
    /// previous context in place and are reported as an error event.
    pub fn on_message(&self, raw: Value) {
        self.shared.handle_message(raw);
    }

    /// Ask the host for its context and start the wait window. If no context arrives before
    /// the window closes, a single `Timeout` is reported for this request. A newer request or
    /// any received context makes this one stale.
    pub async fn request_context(&self) -> RequestToken {
        let token = {
            let mut st = self.shared.lock();
            st.next_token += 1;
            let token = RequestToken(st.next_token);
            st.pending = Some(token);
            st.error = None;
            token
        };
        log::info!("host bridge: requesting context ({:?})", token);

        // The window opens now, so a stalled post cannot stretch it.
        let deadline = tokio::time::Instant::now() + self.timeout;
        let shared = self.shared.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            shared.fail_pending(token, BridgeError::Timeout);
        });
        let previous = self
            .timer
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .replace(handle);
        if let Some(old) = previous {
            old.abort();
        }

        match tokio::time::timeout_at(deadline, self.transport.post(&self.fetch_signal)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => self.shared.fail_pending(token, BridgeError::Transport(e)),
            Err(_) => log::warn!("host bridge: post for {:?} still pending at deadline", token),
        }
        token
    }

    /// Latest context received, if any.
    pub fn context(&self) -> Option<InboundContext> {
        self.shared.lock().context.clone()
    }

    /// Current user-visible error, cleared by the next successful message or request.
    pub fn error(&self) -> Option<BridgeError> {
        self.shared.lock().error.clone()
    }

    /// True while a context request is waiting for the host.
    pub fn is_waiting(&self) -> bool {
        self.shared.lock().pending.is_some()
    }
}

impl Drop for HostBridge {
    fn drop(&mut self) {
        if let Some(timer) = self
            .timer
            .get_mut()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            timer.abort();
        }
    }
}
