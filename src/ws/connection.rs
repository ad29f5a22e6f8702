//! Per-client connection: bounded outbound queue plus two duties.
//!
//! The inbound duty is the only reader of the socket: it reads frames,
//! normalizes them and hands them to the hub. The outbound duty is the only
//! writer: it drains the connection's queue to the socket in batches and
//! sends a ping whenever the probe interval elapses. Every read and write
//! carries a deadline; hitting one ends the connection like any I/O error.

use std::net::SocketAddr;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::ws::{Message, Utf8Bytes, WebSocket};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};

use super::payload;
use crate::error::ConnectionError;
use crate::hub::{ConnectionId, HubHandle, Member};

/// Maximum time a single write may take.
pub const WRITE_WAIT: Duration = Duration::from_secs(10);

/// Maximum time between two reads from the peer (any frame, pongs included).
pub const PONG_WAIT: Duration = Duration::from_secs(60);

/// Largest inbound message accepted, in bytes.
pub const MAX_MESSAGE_SIZE: usize = 512;

/// Capacity of each connection's outbound queue.
pub const OUTBOUND_CAPACITY: usize = 256;

/// Deadlines and limits applied to every connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionSettings {
    /// Per-write deadline.
    pub write_wait: Duration,
    /// Idle read deadline, reset by every frame from the peer.
    pub pong_wait: Duration,
    /// Largest inbound message accepted, in bytes.
    pub max_message_size: usize,
    /// Capacity of the outbound queue.
    pub outbound_capacity: usize,
}

impl ConnectionSettings {
    /// Interval between liveness probes: nine tenths of the idle window, so
    /// at least one probe lands before the peer's deadline lapses.
    #[must_use]
    pub fn ping_period(&self) -> Duration {
        self.pong_wait * 9 / 10
    }
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            write_wait: WRITE_WAIT,
            pong_wait: PONG_WAIT,
            max_message_size: MAX_MESSAGE_SIZE,
            outbound_capacity: OUTBOUND_CAPACITY,
        }
    }
}

/// One client's connection from upgrade to close.
#[derive(Debug)]
pub struct Connection {
    id: ConnectionId,
    remote_addr: SocketAddr,
    hub: HubHandle,
}

impl Connection {
    /// Creates a connection for a freshly upgraded client.
    #[must_use]
    pub fn new(remote_addr: SocketAddr, hub: HubHandle) -> Self {
        Self {
            id: ConnectionId::new(),
            remote_addr,
            hub,
        }
    }

    /// Admits the connection to the hub and runs both duties until the
    /// connection closes.
    ///
    /// The socket is split between the duties and both halves are dropped
    /// when this returns, which closes the transport exactly once.
    pub async fn run(self, socket: WebSocket, settings: ConnectionSettings) {
        let (sink, stream) = socket.split();
        self.drive(sink, stream, settings).await;
    }

    async fn drive<Si, St, E>(self, sink: Si, stream: St, settings: ConnectionSettings)
    where
        Si: Sink<Message> + Unpin + Send + 'static,
        Si::Error: Send,
        ConnectionError: From<Si::Error>,
        St: Stream<Item = Result<Message, E>> + Unpin,
        ConnectionError: From<E>,
    {
        let (outbound_tx, outbound_rx) = mpsc::channel(settings.outbound_capacity);
        self.hub
            .admit(Member::new(self.id, self.remote_addr, outbound_tx))
            .await;

        let mut outbound = tokio::spawn(write_outbound(sink, outbound_rx, settings));

        tokio::select! {
            result = read_inbound(stream, &self.hub, &settings) => {
                self.log_exit("inbound", result.as_ref().err());
                self.hub.remove(self.id).await;
                // The removal closed the queue: the writer flushes what is
                // left, sends a close frame and finishes.
                if let Ok(Err(err)) = (&mut outbound).await {
                    self.log_exit("outbound", Some(&err));
                }
            }
            joined = &mut outbound => match joined {
                Ok(Ok(())) => {
                    if self.hub.contains(self.id).await {
                        tracing::warn!(
                            connection = %self.id,
                            remote_addr = %self.remote_addr,
                            "outbound queue closed while still a member"
                        );
                    }
                }
                Ok(Err(err)) => {
                    self.log_exit("outbound", Some(&err));
                    self.hub.remove(self.id).await;
                }
                Err(join_err) => {
                    tracing::error!(
                        connection = %self.id,
                        error = %join_err,
                        "outbound duty aborted"
                    );
                    self.hub.remove(self.id).await;
                }
            },
        }

        tracing::debug!(
            connection = %self.id,
            remote_addr = %self.remote_addr,
            "connection closed"
        );
    }

    fn log_exit(&self, duty: &'static str, err: Option<&ConnectionError>) {
        match err {
            None => {
                tracing::debug!(connection = %self.id, duty, "peer closed connection");
            }
            Some(err) if err.is_anomaly() => {
                tracing::warn!(
                    connection = %self.id,
                    remote_addr = %self.remote_addr,
                    duty,
                    error = %err,
                    "connection failed"
                );
            }
            Some(err) => {
                tracing::debug!(connection = %self.id, duty, error = %err, "connection dropped");
            }
        }
    }
}

/// Reads frames from `stream` and broadcasts each normalized message
/// through `hub`.
///
/// Returns `Ok(())` when the peer closes the connection.
///
/// # Errors
///
/// Returns a [`ConnectionError`] on transport failure, an oversized or
/// non-UTF-8 message, or when no frame arrives within `pong_wait`.
pub async fn read_inbound<S, E>(
    mut stream: S,
    hub: &HubHandle,
    settings: &ConnectionSettings,
) -> Result<(), ConnectionError>
where
    S: Stream<Item = Result<Message, E>> + Unpin,
    ConnectionError: From<E>,
{
    loop {
        let frame = tokio::time::timeout(settings.pong_wait, stream.next())
            .await
            .map_err(|_| ConnectionError::IdleTimeout(settings.pong_wait))?;

        let Some(frame) = frame else {
            return Ok(());
        };

        match frame? {
            Message::Text(text) => {
                let message =
                    payload::prepare(text.as_str().as_bytes(), settings.max_message_size)?;
                hub.broadcast(message).await;
            }
            Message::Binary(bytes) => {
                let message = payload::prepare(&bytes, settings.max_message_size)?;
                hub.broadcast(message).await;
            }
            // The deadline is re-armed on the next iteration; axum answers
            // pings on its own.
            Message::Ping(_) | Message::Pong(_) => {}
            Message::Close(_) => return Ok(()),
        }
    }
}

/// Drains `queue` to `sink` and sends a ping every probe interval.
///
/// Returns `Ok(())` once the hub has closed the queue, after a best-effort
/// close frame.
///
/// # Errors
///
/// Returns a [`ConnectionError`] if a write fails or misses `write_wait`.
pub async fn write_outbound<S>(
    mut sink: S,
    mut queue: mpsc::Receiver<Utf8Bytes>,
    settings: ConnectionSettings,
) -> Result<(), ConnectionError>
where
    S: Sink<Message> + Unpin,
    ConnectionError: From<S::Error>,
{
    let period = settings.ping_period();
    let mut probe = tokio::time::interval_at(Instant::now() + period, period);
    probe.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            next = queue.recv() => {
                let Some(first) = next else {
                    let close = Message::Close(None);
                    let _ = send_with_deadline(&mut sink, close, settings.write_wait).await;
                    return Ok(());
                };
                let frame = drain_batch(first, &mut queue);
                send_with_deadline(&mut sink, Message::Text(frame), settings.write_wait).await?;
            }
            _ = probe.tick() => {
                let ping = Message::Ping(Bytes::new());
                send_with_deadline(&mut sink, ping, settings.write_wait).await?;
            }
        }
    }
}

/// Joins `first` with every message already waiting in `queue`, newline
/// separated, so they go out as one frame.
fn drain_batch(first: Utf8Bytes, queue: &mut mpsc::Receiver<Utf8Bytes>) -> Utf8Bytes {
    let pending = queue.len();
    if pending == 0 {
        return first;
    }

    let mut combined = String::from(first.as_str());
    for _ in 0..pending {
        let Ok(next) = queue.try_recv() else {
            break;
        };
        combined.push('\n');
        combined.push_str(next.as_str());
    }
    Utf8Bytes::from(combined)
}

async fn send_with_deadline<S>(
    sink: &mut S,
    message: Message,
    wait: Duration,
) -> Result<(), ConnectionError>
where
    S: Sink<Message> + Unpin,
    ConnectionError: From<S::Error>,
{
    tokio::time::timeout(wait, sink.send(message))
        .await
        .map_err(|_| ConnectionError::WriteTimeout(wait))??;
    Ok(())
}
