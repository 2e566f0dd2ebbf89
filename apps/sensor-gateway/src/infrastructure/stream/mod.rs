//! Live Stream Server
//!
//! Accepts WebSocket clients on the stream port (any path) and pushes one
//! JSON text message per broadcast tick to each of them.
//!
//! # Connection Lifecycle
//!
//! Each accepted TCP connection runs in its own task:
//!
//! 1. WebSocket upgrade, bounded by the handshake timeout
//! 2. Registration with the [`BroadcastHub`](crate::infrastructure::broadcast::BroadcastHub)
//! 3. A select loop over the outbound queue, inbound frames and shutdown
//! 4. Deregistration
//!
//! Every socket write is bounded by the send timeout. A failed or timed-out
//! write closes the connection; nothing is retried. Client text frames are
//! ignored.

use std::net::SocketAddr;
use std::time::Duration;

use futures_util::{Sink, SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::{Error as WsError, Message, Utf8Bytes};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::domain::subscriber::CloseReason;
use crate::infrastructure::broadcast::{SharedBroadcastHub, Subscription};
use crate::infrastructure::config::BroadcastSettings;
use crate::infrastructure::metrics;

// =============================================================================
// Configuration
// =============================================================================

/// Per-connection timeouts.
#[derive(Debug, Clone, Copy)]
pub struct StreamConfig {
    /// Upper bound for the WebSocket upgrade.
    pub handshake_timeout: Duration,
    /// Upper bound for a single socket write.
    pub send_timeout: Duration,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self::from(&BroadcastSettings::default())
    }
}

impl From<&BroadcastSettings> for StreamConfig {
    fn from(settings: &BroadcastSettings) -> Self {
        Self {
            handshake_timeout: settings.handshake_timeout,
            send_timeout: settings.send_timeout,
        }
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Failure of a single stream connection. Contained within its task.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// The WebSocket upgrade was rejected or the transport failed.
    #[error("websocket handshake failed: {0}")]
    Handshake(#[source] WsError),

    /// The WebSocket upgrade did not finish in time.
    #[error("websocket handshake timed out after {0:?}")]
    HandshakeTimeout(Duration),

    /// A socket write failed.
    #[error("socket write failed: {0}")]
    SendFailed(#[source] WsError),

    /// A socket write did not finish in time.
    #[error("socket write timed out after {0:?}")]
    SendTimeout(Duration),
}

/// Stream server errors.
#[derive(Debug, thiserror::Error)]
pub enum StreamServerError {
    /// Failed to bind the listener.
    #[error("failed to bind stream server to {0}: {1}")]
    BindFailed(SocketAddr, String),
}

// =============================================================================
// Stream Server
// =============================================================================

/// WebSocket server feeding connections from the broadcast hub.
pub struct StreamServer {
    listener: TcpListener,
    hub: SharedBroadcastHub,
    config: StreamConfig,
    cancel: CancellationToken,
}

impl StreamServer {
    /// Bind the listener.
    ///
    /// # Errors
    ///
    /// Returns [`StreamServerError::BindFailed`] if the address is unavailable.
    pub async fn bind(
        addr: SocketAddr,
        hub: SharedBroadcastHub,
        config: StreamConfig,
        cancel: CancellationToken,
    ) -> Result<Self, StreamServerError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| StreamServerError::BindFailed(addr, e.to_string()))?;

        Ok(Self {
            listener,
            hub,
            config,
            cancel,
        })
    }

    /// Address the listener is bound to.
    ///
    /// # Errors
    ///
    /// Returns the underlying socket error.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections until cancelled, then wait for open connections
    /// to send their close frames.
    pub async fn run(self) {
        let tracker = TaskTracker::new();
        if let Ok(addr) = self.local_addr() {
            tracing::info!(%addr, "Stream server listening");
        }

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((socket, peer)) => {
                        tracker.spawn(serve_connection(
                            socket,
                            peer,
                            self.hub.clone(),
                            self.config,
                            self.cancel.clone(),
                        ));
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Failed to accept stream connection");
                        tokio::time::sleep(Duration::from_millis(100)).await;
                    }
                },
            }
        }

        tracker.close();
        tracing::info!(open = tracker.len(), "Stream server draining connections");
        tracker.wait().await;
        tracing::info!("Stream server stopped");
    }
}

// =============================================================================
// Connection Handling
// =============================================================================

async fn serve_connection(
    socket: TcpStream,
    peer: SocketAddr,
    hub: SharedBroadcastHub,
    config: StreamConfig,
    cancel: CancellationToken,
) {
    let ws = match handshake(socket, config.handshake_timeout).await {
        Ok(ws) => ws,
        Err(e) => {
            metrics::record_handshake_failure();
            tracing::warn!(%peer, error = %e, "Stream handshake failed");
            return;
        }
    };

    let mut subscription = hub.register();
    let id = subscription.id();
    tracing::debug!(%peer, subscriber = %id, "Stream client connected");

    let reason = pump(ws, &mut subscription, config.send_timeout, &cancel).await;

    hub.deregister(id, reason);
    tracing::debug!(%peer, subscriber = %id, reason = %reason, "Stream client disconnected");
}

async fn handshake(
    socket: TcpStream,
    limit: Duration,
) -> Result<WebSocketStream<TcpStream>, StreamError> {
    tokio::time::timeout(limit, tokio_tungstenite::accept_async(socket))
        .await
        .map_err(|_| StreamError::HandshakeTimeout(limit))?
        .map_err(StreamError::Handshake)
}

/// Forward queued readings to the socket until either side closes.
async fn pump(
    ws: WebSocketStream<TcpStream>,
    subscription: &mut Subscription,
    send_timeout: Duration,
    cancel: &CancellationToken,
) -> CloseReason {
    let (mut sink, mut stream) = ws.split();

    let reason = loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                let frame = CloseFrame {
                    code: CloseCode::Away,
                    reason: Utf8Bytes::from_static("server shutting down"),
                };
                if let Err(e) = send(&mut sink, Message::Close(Some(frame)), send_timeout).await {
                    tracing::debug!(error = %e, "Close frame not delivered");
                }
                break CloseReason::Shutdown;
            }
            payload = subscription.recv() => {
                let Some(json) = payload else {
                    // The hub already removed this subscriber.
                    break CloseReason::Lagging;
                };
                if let Err(e) = send(&mut sink, Message::text(json.to_string()), send_timeout).await {
                    tracing::warn!(subscriber = %subscription.id(), error = %e, "Stream send failed");
                    return CloseReason::SendFailed;
                }
            }
            frame = stream.next() => match frame {
                Some(Ok(Message::Close(_))) | None => break CloseReason::ClientClosed,
                Some(Ok(Message::Ping(data))) => {
                    if let Err(e) = send(&mut sink, Message::Pong(data), send_timeout).await {
                        tracing::debug!(error = %e, "Pong not delivered");
                        return CloseReason::SendFailed;
                    }
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::debug!(subscriber = %subscription.id(), error = %e, "Stream read failed");
                    return CloseReason::TransportError;
                }
            },
        }
    };

    if let Ok(Err(e)) = tokio::time::timeout(send_timeout, sink.close()).await {
        tracing::debug!(error = %e, "Stream close handshake incomplete");
    }
    reason
}

async fn send<S>(sink: &mut S, message: Message, limit: Duration) -> Result<(), StreamError>
where
    S: Sink<Message, Error = WsError> + Unpin,
{
    tokio::time::timeout(limit, sink.send(message))
        .await
        .map_err(|_| StreamError::SendTimeout(limit))?
        .map_err(StreamError::SendFailed)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio::io::AsyncWriteExt;

    use super::*;
    use crate::domain::schema::FieldSchema;
    use crate::infrastructure::broadcast::{BroadcastConfig, BroadcastHub};
    use crate::infrastructure::source::SyntheticSource;

    fn hub() -> SharedBroadcastHub {
        let source = SyntheticSource::seeded(FieldSchema::gas_log(), 1).unwrap();
        Arc::new(BroadcastHub::new(BroadcastConfig::default(), Arc::new(source)))
    }

    async fn start(hub: SharedBroadcastHub, config: StreamConfig) -> (SocketAddr, CancellationToken) {
        let cancel = CancellationToken::new();
        let server = StreamServer::bind(
            SocketAddr::from(([127, 0, 0, 1], 0)),
            hub,
            config,
            cancel.clone(),
        )
        .await
        .unwrap();
        let addr = server.local_addr().unwrap();
        tokio::spawn(server.run());
        (addr, cancel)
    }

    async fn wait_for_subscribers(hub: &SharedBroadcastHub, count: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while hub.subscriber_count() != count {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
    }

    #[test]
    fn config_from_settings() {
        let config = StreamConfig::default();
        assert_eq!(config.handshake_timeout, Duration::from_secs(5));
        assert_eq!(config.send_timeout, Duration::from_secs(2));
    }

    #[test]
    fn error_display() {
        let err = StreamError::SendTimeout(Duration::from_secs(2));
        assert_eq!(err.to_string(), "socket write timed out after 2s");
    }

    #[tokio::test]
    async fn client_receives_broadcast_and_deregisters_on_close() {
        let hub = hub();
        let (addr, cancel) = start(hub.clone(), StreamConfig::default()).await;

        let (mut client, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/"))
            .await
            .unwrap();
        wait_for_subscribers(&hub, 1).await;

        let reading = SyntheticSource::seeded(FieldSchema::gas_log(), 2)
            .unwrap()
            .sample();
        hub.broadcast(&reading).unwrap();

        let msg = client.next().await.unwrap().unwrap();
        assert_eq!(
            msg.into_text().unwrap().as_str(),
            serde_json::to_string(&reading).unwrap()
        );

        client.close(None).await.unwrap();
        wait_for_subscribers(&hub, 0).await;
        cancel.cancel();
    }

    #[tokio::test]
    async fn garbage_handshake_never_registers() {
        let hub = hub();
        let (addr, cancel) = start(hub.clone(), StreamConfig::default()).await;

        let mut raw = TcpStream::connect(addr).await.unwrap();
        raw.write_all(b"this is not an upgrade request\r\n\r\n")
            .await
            .unwrap();
        drop(raw);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(hub.subscriber_count(), 0);
        cancel.cancel();
    }

    #[tokio::test]
    async fn silent_client_times_out_in_handshake() {
        let hub = hub();
        let config = StreamConfig {
            handshake_timeout: Duration::from_millis(50),
            send_timeout: Duration::from_secs(2),
        };
        let (addr, cancel) = start(hub.clone(), config).await;

        let _idle = TcpStream::connect(addr).await.unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(hub.subscriber_count(), 0);
        cancel.cancel();
    }

    #[tokio::test]
    async fn shutdown_sends_close_frame() {
        let hub = hub();
        let (addr, cancel) = start(hub.clone(), StreamConfig::default()).await;

        let (mut client, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/live"))
            .await
            .unwrap();
        wait_for_subscribers(&hub, 1).await;

        cancel.cancel();
        let frame = tokio::time::timeout(Duration::from_secs(5), client.next())
            .await
            .unwrap();
        match frame {
            Some(Ok(Message::Close(Some(close)))) => assert_eq!(close.code, CloseCode::Away),
            other => panic!("expected close frame, got {other:?}"),
        }
        wait_for_subscribers(&hub, 0).await;
    }
}
