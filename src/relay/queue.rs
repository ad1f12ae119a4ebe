//! Relay variant delivering onto a bounded backend list.

use async_trait::async_trait;
use thiserror::Error;

use super::{
    DeliveryResult, MessageId, Relay,
    backend::{BackendConnection, Connection, Connector},
    error::{BackendError, RelayError},
};
use crate::{
    encoder::{EventPayload, JsonEventEncoder},
    envelope::Envelope,
    important,
};

pub const DEFAULT_HIGH_WATER_MARK: u64 = 20_100;
pub const DEFAULT_TARGET_LENGTH: u64 = 20_000;

/// Lossy backpressure valve for the backend list: once the list grows past
/// `high_water_mark`, it is cut back to the newest `target_length` entries
/// and the oldest are silently discarded. Under sustained overload this
/// trades completeness for throughput; producers are never blocked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueTrimPolicy {
    high_water_mark: u64,
    target_length: u64,
}

#[derive(Debug, Error)]
#[error("Trim target {target_length} exceeds high water mark {high_water_mark}")]
pub struct InvalidTrimPolicy {
    pub high_water_mark: u64,
    pub target_length: u64,
}

impl Default for QueueTrimPolicy {
    fn default() -> Self {
        Self {
            high_water_mark: DEFAULT_HIGH_WATER_MARK,
            target_length: DEFAULT_TARGET_LENGTH,
        }
    }
}

impl QueueTrimPolicy {
    /// # Errors
    ///
    /// If `target_length` exceeds `high_water_mark`.
    pub const fn new(high_water_mark: u64, target_length: u64) -> Result<Self, InvalidTrimPolicy> {
        if target_length > high_water_mark {
            Err(InvalidTrimPolicy {
                high_water_mark,
                target_length,
            })
        } else {
            Ok(Self {
                high_water_mark,
                target_length,
            })
        }
    }

    #[must_use]
    pub const fn high_water_mark(&self) -> u64 {
        self.high_water_mark
    }

    #[must_use]
    pub const fn target_length(&self) -> u64 {
        self.target_length
    }

    /// Whether a list of `length` entries warrants a trim.
    #[must_use]
    pub const fn exceeded(&self, length: u64) -> bool {
        length > self.high_water_mark
    }
}

/// Pushes each encoded event onto the tail of a named backend list, trimming
/// the list when it saturates.
pub struct QueueRelay<C: Connector> {
    connection: BackendConnection<C>,
    encoder: JsonEventEncoder,
    queue: String,
    trim: QueueTrimPolicy,
}

impl<C: Connector> QueueRelay<C> {
    pub fn new(
        connection: BackendConnection<C>,
        queue: impl Into<String>,
        trim: QueueTrimPolicy,
    ) -> Self {
        Self {
            connection,
            encoder: JsonEventEncoder,
            queue: queue.into(),
            trim,
        }
    }

    #[must_use]
    pub const fn connection(&self) -> &BackendConnection<C> {
        &self.connection
    }

    async fn deliver(&self, envelope: &Envelope) -> Result<MessageId, RelayError> {
        let payload = self.encoder.encode(envelope)?;

        if let Err(err) = self.push_and_trim(&payload).await {
            // A handle that failed mid-operation is not reused.
            self.connection.kill().await;
            return Err(err.into());
        }

        Ok(MessageId::generate())
    }

    async fn push_and_trim(&self, payload: &EventPayload) -> Result<(), BackendError> {
        let mut conn = self.connection.ensure_connected().await?;

        let length = conn.rpush(&self.queue, payload.as_bytes()).await?;
        if self.trim.exceeded(length) {
            let target = self.trim.target_length();
            tracing::debug!(queue = %self.queue, length, target, "trimming saturated queue");
            if target == 0 {
                // Redis idiom for clearing a list.
                conn.ltrim(&self.queue, 1, 0).await?;
            } else {
                let target = i64::try_from(target).unwrap_or(i64::MAX);
                conn.ltrim(&self.queue, -target, -1).await?;
            }
        }

        Ok(())
    }
}

#[async_trait]
impl<C: Connector> Relay for QueueRelay<C> {
    /// Every failure is terminal for this variant: the caller is never asked
    /// to retry.
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
                    queue = %self.queue,
                    "while attempting to deliver envelope"
                );
                DeliveryResult::Permanent(err)
            }
        }
    }

    async fn kill(&self) {
        self.connection.kill().await;
    }
}
