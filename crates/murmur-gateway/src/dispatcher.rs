use std::sync::Arc;

use tracing::{debug, error, warn};

use murmur_types::events::ServerEvent;
use murmur_types::models::{Message, MessageTarget, NewMessage};

use crate::envelope::Envelope;
use crate::error::GatewayError;
use crate::registry::{ConnectionHandle, ConnectionRegistry, Outbound};
use crate::store::MessageStore;

/// Outcome of routing one envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryReport {
    pub message_id: i64,
    /// Connections the notification was queued on
    pub delivered: usize,
    /// Connections that had already gone away
    pub failed: usize,
}

/// Routes inbound envelopes: persist first, then deliver to whoever is
/// connected right now.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    registry: ConnectionRegistry,
    store: Arc<dyn MessageStore>,
    /// Channel that unaddressed (single-room) frames go to
    lobby: String,
    /// Check that the channel / recipient exists before persisting
    strict_targets: bool,
}

impl Dispatcher {
    pub fn new(
        registry: ConnectionRegistry,
        store: Arc<dyn MessageStore>,
        lobby: impl Into<String>,
        strict_targets: bool,
    ) -> Self {
        Self {
            inner: Arc::new(DispatcherInner {
                registry,
                store,
                lobby: lobby.into(),
                strict_targets,
            }),
        }
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.inner.registry
    }

    pub fn lobby(&self) -> &str {
        &self.inner.lobby
    }

    /// Names of all channels, for the `ready` event.
    pub async fn channels(&self) -> Result<Vec<String>, GatewayError> {
        let store = self.inner.store.clone();
        let channels = self.blocking(move || store.channels()).await?;
        Ok(channels.into_iter().map(|c| c.name).collect())
    }

    /// Persist `envelope`, then deliver it.
    ///
    /// A store failure aborts before anything is delivered. Delivery
    /// failures are logged and counted in the report, never returned.
    pub async fn route(&self, envelope: Envelope) -> Result<DeliveryReport, GatewayError> {
        if self.inner.strict_targets {
            self.check_target(&envelope.target).await?;
        }

        let new_message = NewMessage {
            sender: envelope.sender,
            target: envelope.target,
            content: envelope.content,
            created_at: chrono::Utc::now(),
        };

        let store = self.inner.store.clone();
        let message = self
            .blocking(move || {
                let id = store.append_message(&new_message)?;
                Ok(new_message.into_message(id))
            })
            .await
            .inspect_err(|e| error!("Dropping message: {}", e))?;

        let text: Arc<str> = serde_json::to_string(&ServerEvent::from(&message))?.into();

        let report = match &message.target {
            MessageTarget::Channel { channel_name } => {
                let targets = self.inner.registry.broadcast_targets().await;
                let report = deliver_all(&message, &targets, &text);
                debug!(
                    "#{} {} -> channel {}: {} delivered, {} failed",
                    message.id, message.sender, channel_name, report.delivered, report.failed
                );
                report
            }
            MessageTarget::Direct { recipient } => {
                let mut targets = Vec::with_capacity(2);
                if let Some(handle) = self.inner.registry.lookup(recipient).await {
                    targets.push(handle);
                }
                // Echo to the sender's own connection
                if *recipient != message.sender {
                    if let Some(handle) = self.inner.registry.lookup(&message.sender).await {
                        targets.push(handle);
                    }
                }
                let report = deliver_all(&message, &targets, &text);
                debug!(
                    "#{} {} -> {}: {} delivered, {} failed",
                    message.id, message.sender, recipient, report.delivered, report.failed
                );
                report
            }
        };

        Ok(report)
    }

    async fn check_target(&self, target: &MessageTarget) -> Result<(), GatewayError> {
        let store = self.inner.store.clone();
        match target.clone() {
            MessageTarget::Channel { channel_name } => {
                let name = channel_name.clone();
                if !self.blocking(move || store.channel_exists(&name)).await? {
                    return Err(GatewayError::UnknownChannel(channel_name));
                }
            }
            MessageTarget::Direct { recipient } => {
                let name = recipient.clone();
                if !self.blocking(move || store.active_user_exists(&name)).await? {
                    return Err(GatewayError::UnknownRecipient(recipient));
                }
            }
        }
        Ok(())
    }

    /// Run a store call on the blocking pool so a slow disk only stalls the
    /// session that issued it.
    async fn blocking<F, T>(&self, f: F) -> Result<T, GatewayError>
    where
        F: FnOnce() -> anyhow::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        tokio::task::spawn_blocking(f)
            .await
            .map_err(|e| GatewayError::store(anyhow::anyhow!("store task failed: {}", e)))?
            .map_err(GatewayError::store)
    }
}

fn deliver_all(message: &Message, targets: &[ConnectionHandle], text: &Arc<str>) -> DeliveryReport {
    let mut report = DeliveryReport {
        message_id: message.id,
        delivered: 0,
        failed: 0,
    };
    for handle in targets {
        match handle.send(Outbound::Text(text.clone())) {
            Ok(()) => report.delivered += 1,
            Err(e) => {
                warn!("Message #{}: {}", message.id, e);
                report.failed += 1;
            }
        }
    }
    report
}
