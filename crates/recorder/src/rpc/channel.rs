//! Debug-controller RPC channel - the correlation layer.
//!
//! Design decisions:
//! 1. One WebSocket per channel instance; reconnecting means building a new one
//! 2. Request/reply matching via id, events handed off to subscriber queues
//! 3. Every outstanding call settles: matching reply, per-call timeout, or close
//! 4. A malformed frame is fatal for the connection - no resync is attempted

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use futures_util::{stream::SplitSink, SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async_with_config, MaybeTlsStream, WebSocketStream};

use super::protocol::{Command, CommandId, Inbound};
use crate::error::{RecorderError, Result};

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

/// Largest frame accepted from the server. Generated source for a long
/// recording can get big.
const MAX_FRAME_BYTES: usize = 256 * 1024 * 1024;

/// Channel tuning knobs.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Bound on the WebSocket handshake.
    pub connect_timeout: Duration,
    /// Bound on every `send` awaiting its reply.
    pub call_timeout: Duration,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            call_timeout: Duration::from_secs(30),
        }
    }
}

type Settlement = std::result::Result<Value, RecorderError>;

/// RPC channel over a single WebSocket connection.
///
/// Correlated commands and out-of-band events are multiplexed over the one
/// connection. The channel is created connected and cannot reconnect; a new
/// recording cycle builds a new instance.
pub struct RpcChannel {
    /// Monotonic command id counter. First id handed out is 1.
    next_id: AtomicU64,

    /// Calls awaiting their reply, keyed by command id. At most one entry
    /// per id; entries are removed exactly once, on reply, timeout or close.
    pending: DashMap<CommandId, oneshot::Sender<Settlement>>,

    /// Event subscriber queues, keyed by method name. Multiple subscribers
    /// per method are allowed and all receive every matching event.
    subscribers: DashMap<String, Vec<mpsc::UnboundedSender<Value>>>,

    sink: Mutex<WsSink>,
    closed: AtomicBool,
    call_timeout: Duration,
}

impl RpcChannel {
    /// Connect to a debug-controller endpoint.
    pub async fn connect(endpoint: &str, config: ChannelConfig) -> Result<Arc<Self>> {
        let mut ws_config = WebSocketConfig::default();
        ws_config.max_message_size = Some(MAX_FRAME_BYTES);
        ws_config.max_frame_size = Some(MAX_FRAME_BYTES);

        let connecting = connect_async_with_config(endpoint, Some(ws_config), false);
        let (ws_stream, _) = tokio::time::timeout(config.connect_timeout, connecting)
            .await
            .map_err(|_| RecorderError::ConnectTimeout)??;
        let (sink, mut stream) = ws_stream.split();

        tracing::debug!(endpoint, "websocket connected");

        let channel = Arc::new(Self {
            next_id: AtomicU64::new(1),
            pending: DashMap::new(),
            subscribers: DashMap::new(),
            sink: Mutex::new(sink),
            closed: AtomicBool::new(false),
            call_timeout: config.call_timeout,
        });

        let rx_channel = Arc::clone(&channel);
        tokio::spawn(async move {
            while let Some(frame) = stream.next().await {
                match frame {
                    Ok(Message::Text(text)) => {
                        if rx_channel.dispatch(&text).is_err() {
                            tracing::error!("malformed frame, closing connection");
                            break;
                        }
                    }
                    Ok(Message::Close(_)) => {
                        tracing::info!("server closed the connection");
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::error!("websocket error: {e}");
                        break;
                    }
                }
            }
            rx_channel.shutdown().await;
        });

        Ok(channel)
    }

    /// Send a command and await the reply with the matching id.
    pub async fn send(&self, method: impl Into<String>, params: Value) -> Result<Value> {
        if self.is_closed() {
            return Err(RecorderError::ChannelClosed);
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let command = Command::new(id, method, params);
        let json = serde_json::to_string(&command)?;

        let (tx, rx) = oneshot::channel();
        self.pending.insert(id, tx);

        // The channel may have shut down between the check above and the
        // insert; settle instead of leaving the entry to its timeout.
        if self.is_closed() {
            self.pending.remove(&id);
            return Err(RecorderError::ChannelClosed);
        }

        tracing::debug!(id, method = %command.method, "sending command");

        {
            let mut sink = self.sink.lock().await;
            if let Err(e) = sink.send(Message::Text(json)).await {
                self.pending.remove(&id);
                return Err(RecorderError::WebSocket(e));
            }
        }

        match tokio::time::timeout(self.call_timeout, rx).await {
            Ok(Ok(settlement)) => settlement,
            Ok(Err(_)) => Err(RecorderError::ChannelClosed),
            Err(_) => {
                self.pending.remove(&id);
                Err(RecorderError::RpcTimeout)
            }
        }
    }

    /// Subscribe to an event method. Every subscriber receives every
    /// matching event's params in arrival order; a slow consumer never
    /// blocks the receive loop. Dropping the receiver unsubscribes.
    pub fn subscribe(&self, method: impl Into<String>) -> mpsc::UnboundedReceiver<Value> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.entry(method.into()).or_default().push(tx);
        rx
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Close the channel. Idempotent. Every outstanding call is settled
    /// with `ChannelClosed`.
    pub async fn close(&self) {
        self.shutdown().await;
    }

    /// Route one inbound frame. Returns Err only for text that is not
    /// valid JSON, which the receive loop treats as fatal.
    fn dispatch(&self, text: &str) -> serde_json::Result<()> {
        let value: Value = serde_json::from_str(text)?;

        match serde_json::from_value::<Inbound>(value) {
            Ok(Inbound::Reply(reply)) => {
                let Some((_, tx)) = self.pending.remove(&reply.id) else {
                    tracing::warn!(id = reply.id, "reply for unknown command, dropping");
                    return Ok(());
                };
                let settlement = match reply.error {
                    Some(error) => Err(RecorderError::Remote {
                        message: error.message,
                        data: error.data,
                    }),
                    None => Ok(reply.result.unwrap_or(Value::Null)),
                };
                let _ = tx.send(settlement);
            }
            Ok(Inbound::Event(event)) => {
                let params = event
                    .params
                    .unwrap_or_else(|| Value::Object(Default::default()));
                if let Some(mut subscribers) = self.subscribers.get_mut(&event.method) {
                    subscribers.retain(|tx| tx.send(params.clone()).is_ok());
                } else {
                    tracing::debug!(method = %event.method, "event with no subscribers");
                }
            }
            Err(_) => {
                tracing::warn!("unroutable message, dropping: {text}");
            }
        }

        Ok(())
    }

    async fn shutdown(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        let mut sink = self.sink.lock().await;
        if let Err(e) = sink.close().await {
            tracing::debug!("error closing websocket: {e}");
        }
        drop(sink);

        // Dropping the oneshot senders settles the waiting callers with
        // ChannelClosed.
        self.pending.clear();
        self.subscribers.clear();
    }
}
