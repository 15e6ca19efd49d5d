//! WebSocket connection to a host application.
//!
//! Text frames from the host are dispatched to a [`HostWindow`] as raw strings, exactly as
//! the host sent them; decoding is left to the bridge. Outbound posts go out as text frames.

use super::window::HostWindow;
use super::HostTransport;
use anyhow::{Context, Result};
use async_trait::async_trait;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

/// Live connection to the host. Dropping it stops the reader.
pub struct WsHost {
    sink: Mutex<WsSink>,
    reader: JoinHandle<()>,
    closed: watch::Receiver<bool>,
}

/// Connect to the host at `url` and start forwarding its messages into `window`.
pub async fn connect_host(url: &str, window: HostWindow) -> Result<WsHost> {
    let (ws, _) = tokio_tungstenite::connect_async(url)
        .await
        .with_context(|| format!("connecting to host at {}", url))?;
    log::info!("connected to host at {}", url);
    let (sink, mut stream) = ws.split();
    let (closed_tx, closed) = watch::channel(false);
    let reader = tokio::spawn(async move {
        while let Some(msg) = stream.next().await {
            match msg {
                Ok(Message::Text(text)) => {
                    let delivered = window.dispatch(Value::String(text));
                    if delivered == 0 {
                        log::debug!("host message dropped: no listener attached");
                    }
                }
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    log::warn!("host connection error: {}", e);
                    break;
                }
            }
        }
        log::info!("host connection closed");
        let _ = closed_tx.send(true);
    });
    Ok(WsHost {
        sink: Mutex::new(sink),
        reader,
        closed,
    })
}

impl WsHost {
    /// True once the host closed the connection (or it failed).
    pub fn is_closed(&self) -> bool {
        *self.closed.borrow() || self.reader.is_finished()
    }

    /// Resolves once the connection is gone.
    pub async fn closed(&self) {
        let mut closed = self.closed.clone();
        let _ = closed.wait_for(|c| *c).await;
    }
}

#[async_trait]
impl HostTransport for WsHost {
    async fn post(&self, message: &str) -> Result<(), String> {
        self.sink
            .lock()
            .await
            .send(Message::Text(message.to_string()))
            .await
            .map_err(|e| e.to_string())
    }
}

impl Drop for WsHost {
    fn drop(&mut self) {
        self.reader.abort();
    }
}
