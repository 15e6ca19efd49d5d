//! Host messaging: the widget's only channel to the application that embeds it.
//!
//! Inbound context arrives through a [`HostWindow`] as either a JSON string or an already
//! structured object; [`HostBridge`] decodes it, keeps the latest context, and issues
//! outbound context requests with a bounded wait.

mod bridge;
mod protocol;
mod window;
mod ws;

use async_trait::async_trait;

pub use bridge::{next_event, BridgeEvent, HostBridge, RequestToken};
pub use protocol::{decode_host_message, ContextData, InboundContext, Person};
pub use window::{HostWindow, ListenerGuard};
pub use ws::{connect_host, WsHost};

/// Failures on the host channel. Each is reported once and never retried automatically.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BridgeError {
    #[error("could not parse host message: {0}")]
    Parse(String),
    #[error("unexpected host message shape: {0}")]
    Format(String),
    #[error("the host did not answer the context request in time")]
    Timeout,
    #[error("could not reach the host: {0}")]
    Transport(String),
}

/// Outbound side of the host channel.
#[async_trait]
pub trait HostTransport: Send + Sync {
    /// Post a message to the host. No acknowledgment is expected.
    async fn post(&self, message: &str) -> Result<(), String>;
}
