use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use murmur_types::events::ServerEvent;

use crate::dispatcher::Dispatcher;
use crate::envelope::Envelope;
use crate::error::GatewayError;
use crate::registry::{ConnectionHandle, Outbound};

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Lifecycle of one connection. `Closed` is terminal; a returning user gets
/// a brand-new session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Registered,
    Active,
    Closed,
}

struct Session {
    identity: String,
    handle: ConnectionHandle,
    state: SessionState,
}

impl Session {
    fn advance(&mut self, next: SessionState) {
        debug!(
            "{} [{}] {:?} -> {:?}",
            self.identity,
            self.handle.conn_id(),
            self.state,
            next
        );
        self.state = next;
    }
}

/// Drive a WebSocket whose identity was already verified at the HTTP
/// upgrade layer. Returns once the connection is closed and its registry
/// entry released.
pub async fn handle_connection(socket: WebSocket, dispatcher: Dispatcher, identity: String) {
    let (mut sender, receiver) = socket.split();
    let (handle, outbound_rx) = ConnectionHandle::new(&identity);
    let mut session = Session {
        identity,
        handle,
        state: SessionState::Connecting,
    };

    let channels = dispatcher.channels().await.unwrap_or_else(|e| {
        warn!("{}: could not load channel list: {}", session.identity, e);
        Vec::new()
    });
    let mut online = dispatcher.registry().online().await;
    if !online.contains(&session.identity) {
        online.push(session.identity.clone());
        online.sort();
    }
    let ready = ServerEvent::Ready {
        username: session.identity.clone(),
        channels,
        online,
    };
    if let Err(e) = send_event(&mut sender, &ready).await {
        // Never registered, nothing to clean up
        warn!("{}: failed to send ready: {}", session.identity, e);
        return;
    }

    dispatcher.registry().connect(session.handle.clone()).await;
    session.advance(SessionState::Registered);
    info!("{} connected to gateway", session.identity);

    session.advance(SessionState::Active);
    run_connection_loop(sender, receiver, outbound_rx, &dispatcher, &session).await;

    // Unconditional: however the loop ended, the entry must not outlive the socket
    dispatcher
        .registry()
        .release(&session.identity, session.handle.conn_id())
        .await;
    session.advance(SessionState::Closed);
    info!("{} disconnected from gateway", session.identity);
}

async fn run_connection_loop(
    mut sender: SplitSink<WebSocket, Message>,
    mut receiver: SplitStream<WebSocket>,
    mut outbound_rx: mpsc::UnboundedReceiver<Outbound>,
    dispatcher: &Dispatcher,
    session: &Session,
) {
    // Shared flag for heartbeat
    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    // Forward queued frames -> client, with heartbeat
    let identity_send = session.identity.clone();
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                msg = outbound_rx.recv() => {
                    let Some(msg) = msg else { break };
                    match msg {
                        Outbound::Text(text) => {
                            if sender.send(Message::Text(text.to_string().into())).await.is_err() {
                                break;
                            }
                        }
                        Outbound::Close { code, reason } => {
                            info!("{}: closing connection ({} {})", identity_send, code, reason);
                            let _ = sender
                                .send(Message::Close(Some(CloseFrame { code, reason: reason.into() })))
                                .await;
                            break;
                        }
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("{}: heartbeat timeout (missed {} pongs), dropping connection", identity_send, missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Read frames from client
    let dispatcher_recv = dispatcher.clone();
    let identity_recv = session.identity.clone();
    let handle_recv = session.handle.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(result) = receiver.next().await {
            let msg = match result {
                Ok(msg) => msg,
                Err(e) => {
                    warn!("{}: {}", identity_recv, GatewayError::from(e));
                    break;
                }
            };
            match msg {
                Message::Text(text) => {
                    handle_frame(&dispatcher_recv, &handle_recv, &identity_recv, text.as_str()).await;
                }
                Message::Binary(data) => {
                    warn!("{}: ignoring {}-byte binary frame", identity_recv, data.len());
                    reject(&handle_recv, "binary frames are not supported".into());
                }
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                Message::Ping(_) => {}
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }
}

/// Parse and route one text frame. Failures are reported to this session
/// only; the connection stays up.
async fn handle_frame(dispatcher: &Dispatcher, handle: &ConnectionHandle, identity: &str, text: &str) {
    let envelope = match Envelope::parse(identity, text, dispatcher.lobby()) {
        Ok(envelope) => envelope,
        Err(e) => {
            warn!(
                "{} bad frame: {} -- raw: {}",
                identity,
                e,
                truncate(text, 200)
            );
            reject(handle, e.to_string());
            return;
        }
    };

    if let Err(e) = dispatcher.route(envelope).await {
        warn!("{}: message rejected: {}", identity, e);
        reject(handle, e.to_string());
    }
}

fn reject(handle: &ConnectionHandle, reason: String) {
    let _ = handle.send_event(&ServerEvent::Error { reason });
}

async fn send_event(
    sender: &mut SplitSink<WebSocket, Message>,
    event: &ServerEvent,
) -> Result<(), GatewayError> {
    let text = serde_json::to_string(event)?;
    sender.send(Message::Text(text.into())).await?;
    Ok(())
}

fn truncate(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
