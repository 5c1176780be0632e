use futures_util::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

use super::frames::{self, InboundEvent};
use crate::config::ReconnectPolicy;
use crate::models::{RawMessage, UserStatusMap};

/// How often the visitor re-asserts presence once subscribed.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(25);

/// Everything one channel subscription needs.
#[derive(Debug, Clone)]
pub struct RealtimeConfig {
    pub ws_url: String,
    pub pubsub_token: String,
    pub account_id: i64,
    pub reconnect: ReconnectPolicy,
}

/// The only two things that ever cross from the channel to its consumer.
/// Message payloads are raw; normalization is the consumer's job.
#[derive(Debug)]
pub enum ChannelEvent {
    Message(RawMessage),
    Presence(UserStatusMap),
}

/// Handle to one (token, account) channel subscription.
///
/// Exactly one socket and one heartbeat live per handle. Dropping the handle
/// (or calling [`disconnect`](Self::disconnect)) cancels the heartbeat first,
/// then closes the socket with a normal-closure frame. Re-arming with a new
/// token means dropping the old handle and spawning a new one.
pub struct RealtimeClient {
    shutdown_tx: broadcast::Sender<()>,
    connected: Arc<AtomicBool>,
}

impl RealtimeClient {
    /// Opens the channel and starts pumping events into `events`. Returns
    /// immediately; connection and subscription happen on a background task.
    pub fn spawn(config: RealtimeConfig, events: mpsc::UnboundedSender<ChannelEvent>) -> Self {
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let connected = Arc::new(AtomicBool::new(false));
        tokio::spawn(run(config, events, shutdown_rx, connected.clone()));
        Self {
            shutdown_tx,
            connected,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Initiates graceful teardown. Idempotent.
    pub fn disconnect(&self) {
        let _ = self.shutdown_tx.send(());
    }
}

impl Drop for RealtimeClient {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(());
    }
}

async fn run(
    config: RealtimeConfig,
    events: mpsc::UnboundedSender<ChannelEvent>,
    mut shutdown_rx: broadcast::Receiver<()>,
    connected: Arc<AtomicBool>,
) {
    let identifier = frames::channel_identifier(&config.pubsub_token, config.account_id);
    let mut attempt: u32 = 0;

    loop {
        if shutdown_rx.try_recv().is_ok() {
            info!("shutdown before connect, stopping realtime channel");
            break;
        }

        info!(url = %config.ws_url, "connecting to realtime endpoint");
        match connect_async(&config.ws_url).await {
            Ok((ws_stream, _)) => {
                attempt = 0;
                let closed_by_us =
                    subscribed_session(ws_stream, &identifier, &events, &mut shutdown_rx, &connected)
                        .await;
                connected.store(false, Ordering::SeqCst);
                info!("realtime channel disconnected");
                if closed_by_us {
                    break;
                }
            }
            Err(e) => {
                error!(error = %e, url = %config.ws_url, "failed to connect to realtime endpoint");
            }
        }

        attempt += 1;
        let Some(delay) = config.reconnect.delay_for(attempt) else {
            warn!(attempt, "reconnect budget exhausted, realtime channel going quiet");
            break;
        };
        debug!(attempt, delay_ms = delay.as_millis() as u64, "reconnecting after backoff");
        tokio::select! {
            _ = shutdown_rx.recv() => {
                info!("shutdown during backoff, stopping realtime channel");
                break;
            }
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

/// Runs one subscribed session to completion. Returns true when the session
/// ended on our initiative (shutdown or consumer gone), false when the peer
/// dropped us and a reconnect may be warranted.
async fn subscribed_session(
    ws_stream: tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >,
    identifier: &str,
    events: &mpsc::UnboundedSender<ChannelEvent>,
    shutdown_rx: &mut broadcast::Receiver<()>,
    connected: &AtomicBool,
) -> bool {
    let (mut write, mut read) = ws_stream.split();

    if write
        .send(Message::Text(frames::subscribe_frame(identifier).into()))
        .await
        .is_err()
    {
        error!("failed to send subscribe frame");
        return false;
    }
    connected.store(true, Ordering::SeqCst);

    // First tick fires immediately: the initial presence update right after
    // the subscribe handshake.
    let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
    let mut close_requested = false;

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                info!("shutdown signal received, closing realtime channel");
                close_requested = true;
                break;
            }
            _ = heartbeat.tick() => {
                if write
                    .send(Message::Text(frames::presence_frame(identifier).into()))
                    .await
                    .is_err()
                {
                    warn!("presence heartbeat failed, dropping connection");
                    break;
                }
            }
            frame = read.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => match frames::parse_inbound(&text) {
                        Some(InboundEvent::MessageCreated(raw)) => {
                            if events.send(ChannelEvent::Message(raw)).is_err() {
                                // consumer gone, nobody left to deliver to
                                close_requested = true;
                                break;
                            }
                        }
                        Some(InboundEvent::PresenceUpdate(users)) => {
                            if events.send(ChannelEvent::Presence(users)).is_err() {
                                close_requested = true;
                                break;
                            }
                        }
                        None => debug!("ignoring unrecognized realtime frame"),
                    },
                    Some(Ok(Message::Close(_))) | None => {
                        info!("realtime endpoint closed the connection");
                        break;
                    }
                    Some(Err(e)) => {
                        error!(error = %e, "websocket error");
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    // The heartbeat timer must stop before the close frame goes out: no
    // send-after-close.
    drop(heartbeat);

    if close_requested {
        let close = Message::Close(Some(CloseFrame {
            code: CloseCode::Normal,
            reason: "client going away".into(),
        }));
        if let Err(e) = write.send(close).await {
            debug!(error = %e, "close frame not delivered");
        }
    }

    close_requested
}
