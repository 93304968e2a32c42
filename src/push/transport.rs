//! Reconnecting websocket transport for the push channel.
//!
//! One background task owns the socket. It reports connection state and
//! decoded events over an mpsc channel and forwards outbound events while
//! connected. Reconnection follows [`ReconnectPolicy`]; once the attempts are
//! exhausted the task reports [`PushEvent::Disconnected`] and exits.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use super::{decode_event, encode_event, OutboundEvent, PushEvent};
use crate::config;
use crate::error::AppError;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Bounded exponential backoff between reconnect attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: config::PUSH_MAX_RECONNECT_ATTEMPTS,
            base_delay: Duration::from_millis(config::PUSH_RECONNECT_DELAY_MS),
            max_delay: Duration::from_millis(config::PUSH_RECONNECT_DELAY_MAX_MS),
        }
    }
}

impl ReconnectPolicy {
    /// Delay before reconnect attempt `attempt` (1-based), or `None` once the
    /// attempts are used up.
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || attempt > self.max_attempts {
            return None;
        }
        let factor = 2u32.saturating_pow(attempt - 1);
        Some(self.base_delay.saturating_mul(factor).min(self.max_delay))
    }
}

/// Handle to the background push task. Dropping it stops the task.
pub struct PushTransport {
    outbound: mpsc::Sender<OutboundEvent>,
    task: JoinHandle<()>,
}

impl PushTransport {
    /// Start connecting to `url`. Inbound events arrive on the returned receiver.
    pub fn spawn(url: impl Into<String>, policy: ReconnectPolicy) -> (Self, mpsc::Receiver<PushEvent>) {
        let url = url.into();
        let (inbound_tx, inbound_rx) = mpsc::channel(config::CHANNEL_CAPACITY);
        let (outbound_tx, outbound_rx) = mpsc::channel(config::CHANNEL_CAPACITY);
        let task = tokio::spawn(run(url, policy, outbound_rx, inbound_tx));
        (
            Self {
                outbound: outbound_tx,
                task,
            },
            inbound_rx,
        )
    }

    /// A sender for outbound events; events sent while disconnected are dropped.
    pub fn sender(&self) -> mpsc::Sender<OutboundEvent> {
        self.outbound.clone()
    }

    /// Queue an outbound event without waiting. Returns false if the queue is
    /// full or the transport has stopped.
    pub fn send(&self, event: OutboundEvent) -> bool {
        self.outbound.try_send(event).is_ok()
    }
}

impl Drop for PushTransport {
    fn drop(&mut self) {
        self.task.abort();
    }
}

enum SessionEnd {
    /// The dashboard side went away; stop for good.
    Closed,
    /// The socket failed; try to reconnect.
    Lost(String),
}

async fn run(
    url: String,
    policy: ReconnectPolicy,
    mut outbound_rx: mpsc::Receiver<OutboundEvent>,
    inbound_tx: mpsc::Sender<PushEvent>,
) {
    let mut failures = 0u32;
    let mut reported_down = false;

    loop {
        match tokio_tungstenite::connect_async(url.as_str()).await {
            Ok((socket, _)) => {
                failures = 0;
                reported_down = false;
                tracing::info!("Push channel connected to {url}");
                drain_stale(&mut outbound_rx);
                if inbound_tx.send(PushEvent::Connected).await.is_err() {
                    return;
                }
                match session(socket, &mut outbound_rx, &inbound_tx).await {
                    SessionEnd::Closed => return,
                    SessionEnd::Lost(reason) => {
                        tracing::warn!("Push channel lost: {reason}");
                        reported_down = true;
                        if inbound_tx.send(PushEvent::Disconnected).await.is_err() {
                            return;
                        }
                    }
                }
            }
            Err(e) => tracing::warn!("Push connect to {url} failed: {}", AppError::from(e)),
        }

        failures += 1;
        let Some(delay) = policy.delay_for(failures) else {
            tracing::error!(
                "Push channel giving up after {} reconnect attempts",
                policy.max_attempts
            );
            if !reported_down {
                let _ = inbound_tx.send(PushEvent::Disconnected).await;
            }
            return;
        };
        tracing::debug!("Reconnecting push channel in {delay:?} (attempt {failures})");
        if !wait_dropping_outbound(delay, &mut outbound_rx).await {
            return;
        }
    }
}

/// One connected session. Sends `request_summary` first, then pumps frames
/// both ways until either side closes.
async fn session(
    socket: Socket,
    outbound_rx: &mut mpsc::Receiver<OutboundEvent>,
    inbound_tx: &mpsc::Sender<PushEvent>,
) -> SessionEnd {
    let (mut sink, mut stream) = socket.split();

    if let Err(e) = send_frame(&mut sink, &OutboundEvent::RequestSummary).await {
        return SessionEnd::Lost(e.to_string());
    }

    loop {
        tokio::select! {
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => match decode_event(&text) {
                    Ok(Some(event)) => {
                        if inbound_tx.send(event).await.is_err() {
                            let _ = sink.close().await;
                            return SessionEnd::Closed;
                        }
                    }
                    Ok(None) => {}
                    Err(e) => tracing::warn!("Dropping malformed push frame: {e}"),
                },
                Some(Ok(Message::Close(_))) | None => {
                    return SessionEnd::Lost("closed by server".into());
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return SessionEnd::Lost(AppError::from(e).to_string()),
            },
            event = outbound_rx.recv() => match event {
                Some(event) => {
                    if let Err(e) = send_frame(&mut sink, &event).await {
                        return SessionEnd::Lost(e.to_string());
                    }
                }
                None => {
                    let _ = sink.close().await;
                    return SessionEnd::Closed;
                }
            },
        }
    }
}

async fn send_frame<S>(sink: &mut S, event: &OutboundEvent) -> Result<(), AppError>
where
    S: futures_util::Sink<Message, Error = tokio_tungstenite::tungstenite::Error> + Unpin,
{
    let text = encode_event(event)?;
    sink.send(Message::Text(text)).await?;
    Ok(())
}

fn drain_stale(outbound_rx: &mut mpsc::Receiver<OutboundEvent>) {
    while let Ok(event) = outbound_rx.try_recv() {
        tracing::debug!("Dropped outbound {} queued while disconnected", event.name());
    }
}

/// Sleep for `delay`, discarding outbound events meanwhile. Returns false if
/// the outbound side closed.
async fn wait_dropping_outbound(delay: Duration, outbound_rx: &mut mpsc::Receiver<OutboundEvent>) -> bool {
    let sleep = tokio::time::sleep(delay);
    tokio::pin!(sleep);
    loop {
        tokio::select! {
            _ = &mut sleep => return true,
            event = outbound_rx.recv() => match event {
                Some(event) => {
                    tracing::debug!("Dropped outbound {} while disconnected", event.name());
                }
                None => return false,
            },
        }
    }
}
