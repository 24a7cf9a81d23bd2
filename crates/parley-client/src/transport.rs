//! WebSocket transport adapter.
//!
//! Provides [`ConnectionHandle`] which handles WebSocket I/O for frame
//! transport. This is a thin layer that just moves frames - session logic
//! stays in the sans-IO [`crate::Session`]. Frame bodies are opaque here;
//! chat event (de)serialization belongs to the session.

use futures_util::{SinkExt, StreamExt};
use parley_proto::{Command, Frame};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::warn;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = futures_util::stream::SplitSink<WsStream, Message>;
type WsSource = futures_util::stream::SplitStream<WsStream>;

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Channel open or handshake failed.
    #[error("connection failed: {0}")]
    Connect(String),

    /// Operation attempted on a handle whose connection is gone.
    #[error("not connected")]
    NotConnected,

    /// Broker rejected the handshake with an error frame.
    #[error("broker error: {0}")]
    Broker(String),
}

/// Handle bound to one subscription on the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionId(u64);

/// Handle to an open broker connection.
///
/// Frames are moved over channels; an internal task owns the WebSocket
/// I/O. Dropping the handle (or calling [`disconnect`](Self::disconnect))
/// stops the task.
pub struct ConnectionHandle {
    to_broker: mpsc::Sender<Frame>,
    from_broker: mpsc::Receiver<Frame>,
    abort_handle: tokio::task::AbortHandle,
    next_subscription: u64,
}

impl ConnectionHandle {
    /// Subscribe to a broadcast topic.
    ///
    /// Inbound frames for the topic arrive via [`recv`](Self::recv) in
    /// channel order.
    ///
    /// # Errors
    ///
    /// [`TransportError::NotConnected`] if the connection is gone.
    pub async fn subscribe(&mut self, topic: &str) -> Result<SubscriptionId, TransportError> {
        let id = self.next_subscription;
        self.next_subscription += 1;

        self.to_broker
            .send(Frame::subscribe(id, topic))
            .await
            .map_err(|_| TransportError::NotConnected)?;
        Ok(SubscriptionId(id))
    }

    /// Release a previously opened subscription.
    ///
    /// # Errors
    ///
    /// [`TransportError::NotConnected`] if the connection is gone.
    pub async fn unsubscribe(&mut self, id: SubscriptionId) -> Result<(), TransportError> {
        self.to_broker
            .send(Frame::unsubscribe(id.0))
            .await
            .map_err(|_| TransportError::NotConnected)
    }

    /// Enqueue an outbound publish. Does not wait for broker delivery.
    ///
    /// # Errors
    ///
    /// [`TransportError::NotConnected`] if the connection is gone.
    pub async fn send(
        &mut self,
        destination: &str,
        body: impl Into<String>,
    ) -> Result<(), TransportError> {
        self.to_broker
            .send(Frame::send(destination, body))
            .await
            .map_err(|_| TransportError::NotConnected)
    }

    /// Next inbound frame, in arrival order. `None` once the connection is
    /// closed and all buffered frames are drained.
    pub async fn recv(&mut self) -> Option<Frame> {
        self.from_broker.recv().await
    }

    /// Close the connection and release all subscriptions. Idempotent.
    pub fn disconnect(&mut self) {
        // Best effort; the task may already be gone.
        let _ = self.to_broker.try_send(Frame::disconnect());
        self.abort_handle.abort();
    }
}

impl Drop for ConnectionHandle {
    fn drop(&mut self) {
        self.abort_handle.abort();
    }
}

/// Connect to a broker over WebSocket and complete the frame handshake.
///
/// Returns a [`ConnectionHandle`] once the broker has acknowledged with a
/// `Connected` frame.
///
/// # Errors
///
/// - [`TransportError::Connect`] if the WebSocket cannot be opened or the
///   channel closes mid-handshake
/// - [`TransportError::Broker`] if the broker answers with an error frame
pub async fn connect(endpoint: &str) -> Result<ConnectionHandle, TransportError> {
    let (ws, _) = connect_async(endpoint)
        .await
        .map_err(|e| TransportError::Connect(format!("websocket open failed: {e}")))?;
    let (mut sink, mut source) = ws.split();

    sink.send(Message::text(Frame::connect().encode()))
        .await
        .map_err(|e| TransportError::Connect(format!("handshake send failed: {e}")))?;

    await_connected(&mut source).await?;

    let (to_broker_tx, to_broker_rx) = mpsc::channel::<Frame>(32);
    let (from_broker_tx, from_broker_rx) = mpsc::channel::<Frame>(32);

    let handle = tokio::spawn(run_connection(sink, source, to_broker_rx, from_broker_tx));

    Ok(ConnectionHandle {
        to_broker: to_broker_tx,
        from_broker: from_broker_rx,
        abort_handle: handle.abort_handle(),
        next_subscription: 0,
    })
}

/// Wait for the broker's `Connected` acknowledgement.
async fn await_connected(source: &mut WsSource) -> Result<(), TransportError> {
    while let Some(message) = source.next().await {
        let message =
            message.map_err(|e| TransportError::Connect(format!("handshake read failed: {e}")))?;
        let Message::Text(text) = message else {
            continue;
        };

        let frame = Frame::decode(text.as_str())
            .map_err(|e| TransportError::Connect(format!("handshake frame invalid: {e}")))?;
        match frame.command {
            Command::Connected => return Ok(()),
            Command::Error => {
                let reason = frame.header("message").unwrap_or("unspecified").to_string();
                return Err(TransportError::Broker(reason));
            },
            _ => continue,
        }
    }

    Err(TransportError::Connect("channel closed during handshake".to_string()))
}

/// Run the connection, bridging between channels and the WebSocket.
///
/// Inbound frames are forwarded one at a time, so the consumer sees them
/// in exactly the order they arrived on the channel.
async fn run_connection(
    mut sink: WsSink,
    mut source: WsSource,
    mut to_broker: mpsc::Receiver<Frame>,
    from_broker: mpsc::Sender<Frame>,
) {
    loop {
        tokio::select! {
            outbound = to_broker.recv() => {
                let Some(frame) = outbound else { break };
                let closing = frame.command == Command::Disconnect;
                if sink.send(Message::text(frame.encode())).await.is_err() {
                    break;
                }
                if closing {
                    break;
                }
            },
            inbound = source.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => match Frame::decode(text.as_str()) {
                        Ok(frame) => {
                            if from_broker.send(frame).await.is_err() {
                                break;
                            }
                        },
                        Err(e) => warn!(error = %e, "dropping undecodable frame"),
                    },
                    Some(Ok(Message::Close(_))) | None => break,
                    // Ping/pong and binary frames are transport noise here.
                    Some(Ok(_)) => {},
                    Some(Err(e)) => {
                        warn!(error = %e, "websocket read failed");
                        break;
                    },
                }
            },
        }
    }

    let _ = sink.close().await;
}
