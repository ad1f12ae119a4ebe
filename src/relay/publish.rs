//! Relay variant publishing to a fan-out channel.

use async_trait::async_trait;

use super::{
    DeliveryResult, MessageId, Relay,
    backend::{BackendConnection, Connection, Connector},
    error::RelayError,
};
use crate::{encoder::JsonEventEncoder, envelope::Envelope, important};

/// Publishes each encoded event to a named pub/sub channel. Fire-and-forget:
/// there is no length, no backpressure, and no persistence for subscribers
/// that are not currently listening.
pub struct PublishRelay<C: Connector> {
    connection: BackendConnection<C>,
    encoder: JsonEventEncoder,
    channel: String,
}

impl<C: Connector> PublishRelay<C> {
    pub fn new(connection: BackendConnection<C>, channel: impl Into<String>) -> Self {
        Self {
            connection,
            encoder: JsonEventEncoder,
            channel: channel.into(),
        }
    }

    #[must_use]
    pub const fn connection(&self) -> &BackendConnection<C> {
        &self.connection
    }

    async fn deliver(&self, envelope: &Envelope) -> Result<MessageId, RelayError> {
        let payload = self.encoder.encode(envelope)?;

        let published = {
            let mut conn = self.connection.ensure_connected().await?;
            conn.publish(&self.channel, payload.as_bytes()).await
        };
        match published {
            Ok(receivers) => {
                tracing::debug!(channel = %self.channel, receivers, "event published");
                Ok(MessageId::generate())
            }
            Err(err) => {
                self.connection.kill().await;
                Err(err.into())
            }
        }
    }
}

#[async_trait]
impl<C: Connector> Relay for PublishRelay<C> {
    /// Failures here are backend-specific and unclassified: the caller
    /// applies its own default retry policy.
    async fn attempt(&self, envelope: &Envelope, attempt_count: u32) -> DeliveryResult {
        match self.deliver(envelope).await {
            Ok(id) => {
                important!("Message Delivered; {id}");
                DeliveryResult::Delivered(id)
            }
            Err(err) => {
                tracing::error!(
                    error = %err,
                    attempt = attempt_count,
                    channel = %self.channel,
                    "while attempting to deliver envelope"
                );
                DeliveryResult::Unclassified(err)
            }
        }
    }

    async fn kill(&self) {
        self.connection.kill().await;
    }
}
