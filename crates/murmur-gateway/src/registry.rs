use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, mpsc};
use tracing::info;
use uuid::Uuid;

use murmur_types::events::ServerEvent;

use crate::error::GatewayError;

/// Close code sent to a connection replaced by a newer one for the same identity.
pub const CLOSE_SUPERSEDED: u16 = 4000;
/// Close code sent to every connection when the server shuts down.
pub const CLOSE_GOING_AWAY: u16 = 1001;

const SUPERSEDED_REASON: &str = "superseded by a newer connection";

/// What a session's writer task forwards to its socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// Already-serialized JSON, shared between all recipients of a broadcast
    Text(Arc<str>),
    Close { code: u16, reason: String },
}

/// Live reference to one connected session.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    conn_id: Uuid,
    identity: Arc<str>,
    tx: mpsc::UnboundedSender<Outbound>,
}

impl ConnectionHandle {
    /// Create a handle plus the receiver the session's writer task drains.
    pub fn new(identity: &str) -> (Self, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = Self {
            conn_id: Uuid::new_v4(),
            identity: Arc::from(identity),
            tx,
        };
        (handle, rx)
    }

    pub fn conn_id(&self) -> Uuid {
        self.conn_id
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Queue a frame. Never blocks; fails only once the session is gone.
    pub fn send(&self, msg: Outbound) -> Result<(), GatewayError> {
        self.tx
            .send(msg)
            .map_err(|_| GatewayError::Delivery(self.identity.to_string()))
    }

    pub fn send_event(&self, event: &ServerEvent) -> Result<(), GatewayError> {
        let text = serde_json::to_string(event)?;
        self.send(Outbound::Text(text.into()))
    }

    pub fn close(&self, code: u16, reason: &str) -> Result<(), GatewayError> {
        self.send(Outbound::Close {
            code,
            reason: reason.to_string(),
        })
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Identity -> live connection. At most one entry per identity.
///
/// Cheap to clone; all clones share the same map. Created once at startup
/// and handed to the dispatcher, every session and the REST layer.
#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    inner: Arc<RwLock<HashMap<String, ConnectionHandle>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handle` under its identity. Always succeeds.
    ///
    /// If the identity already had a connection, that connection is told to
    /// close (code 4000) and returned. The newest connection wins.
    pub async fn connect(&self, handle: ConnectionHandle) -> Option<ConnectionHandle> {
        let previous = self
            .inner
            .write()
            .await
            .insert(handle.identity().to_string(), handle.clone());

        if let Some(old) = &previous {
            if old.conn_id() != handle.conn_id() {
                info!(
                    "{} reconnected, closing superseded connection {}",
                    handle.identity(),
                    old.conn_id()
                );
                let _ = old.close(CLOSE_SUPERSEDED, SUPERSEDED_REASON);
            }
        }

        previous
    }

    /// Remove whatever connection `identity` has. No-op if none.
    pub async fn disconnect(&self, identity: &str) -> bool {
        self.inner.write().await.remove(identity).is_some()
    }

    /// Remove `identity` only if its entry still belongs to `conn_id`.
    /// Sessions call this on teardown so a superseded session cannot evict
    /// the connection that replaced it.
    pub async fn release(&self, identity: &str, conn_id: Uuid) -> bool {
        let mut conns = self.inner.write().await;
        match conns.get(identity) {
            Some(handle) if handle.conn_id() == conn_id => {
                conns.remove(identity);
                true
            }
            _ => false,
        }
    }

    pub async fn lookup(&self, identity: &str) -> Option<ConnectionHandle> {
        self.inner.read().await.get(identity).cloned()
    }

    /// Snapshot of every registered handle, for channel broadcast.
    pub async fn broadcast_targets(&self) -> Vec<ConnectionHandle> {
        self.inner.read().await.values().cloned().collect()
    }

    /// Connected identities, sorted.
    pub async fn online(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    pub async fn is_online(&self, identity: &str) -> bool {
        self.inner.read().await.contains_key(identity)
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }

    /// Shutdown: ask every session to close and empty the registry.
    pub async fn close_all(&self, reason: &str) -> usize {
        let drained: Vec<ConnectionHandle> =
            self.inner.write().await.drain().map(|(_, handle)| handle).collect();
        for handle in &drained {
            let _ = handle.close(CLOSE_GOING_AWAY, reason);
        }
        drained.len()
    }
}
