//! Delivery of envelope-derived events to a Redis backend.
//!
//! A relay composes the event encoder with a lazily-established backend
//! connection and exposes a single `attempt` contract to the queue
//! collaborator. Two variants exist: [`QueueRelay`] pushes onto a bounded
//! FIFO list, [`PublishRelay`] publishes to a fan-out channel.

pub mod backend;
pub mod error;
pub mod memory;
pub mod publish;
pub mod queue;
pub mod redis;

use core::fmt;

use async_trait::async_trait;
use ulid::Ulid;

pub use backend::{BackendConnection, Connection, Connector, Interrupt};
pub use error::{BackendError, RelayError};
pub use memory::{MemoryBackend, MemoryConnector};
pub use publish::PublishRelay;
pub use queue::{InvalidTrimPolicy, QueueRelay, QueueTrimPolicy};
pub use redis::{RedisConnector, RedisOptions};

use crate::envelope::Envelope;

/// Correlation identifier generated for every successful delivery. It has no
/// meaning to the backend; it only ties log records and SMTP replies
/// together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageId(Ulid);

impl MessageId {
    #[must_use]
    pub fn generate() -> Self {
        Self(Ulid::new())
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Outcome of one `attempt` call, consumed by the retry collaborator.
#[derive(Debug)]
pub enum DeliveryResult {
    /// The event reached the backend.
    Delivered(MessageId),

    /// A retry may succeed; the caller decides whether and when.
    Temporary(RelayError),

    /// Retrying cannot help; the delivery is terminal.
    Permanent(RelayError),

    /// A backend-specific failure with no classification. Deliberately
    /// distinct from [`Self::Permanent`]: the caller applies its own default
    /// retry policy.
    Unclassified(RelayError),
}

impl DeliveryResult {
    /// Returns `true` if the caller should not re-invoke `attempt`.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Delivered(_) | Self::Permanent(_))
    }

    #[must_use]
    pub const fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered(_))
    }
}

/// One delivery attempt: encode, ensure a connection, invoke the backend
/// primitive, map the outcome.
#[async_trait]
pub trait Relay: Send + Sync {
    /// Attempt to deliver one envelope. `attempt_count` is supplied by the
    /// retry collaborator, increasing across re-attempts for the same
    /// envelope; it is used for diagnostics only.
    async fn attempt(&self, envelope: &Envelope, attempt_count: u32) -> DeliveryResult;

    /// Drop the current backend connection. The next attempt re-establishes
    /// from scratch.
    async fn kill(&self);
}
