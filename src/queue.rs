//! The collaborator that drives delivery attempts.
//!
//! The proxy queue keeps no storage of its own: each completed transaction
//! is relayed inline and the delivery result is handed straight back to the
//! session that produced the envelope.

use std::{sync::Arc, time::Duration};

use crate::{
    envelope::Envelope,
    relay::{DeliveryResult, Relay},
};

/// Policy applied when a relay reports a non-terminal result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of attempts before the last result is returned as-is.
    pub max_attempts: u32,
    /// Delay between attempts.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Whether another attempt should be made after `attempt_count` attempts.
    #[must_use]
    pub const fn should_retry(&self, attempt_count: u32) -> bool {
        attempt_count < self.max_attempts
    }
}

pub struct ProxyQueue {
    relay: Arc<dyn Relay>,
    policy: RetryPolicy,
}

impl ProxyQueue {
    pub fn new(relay: Arc<dyn Relay>) -> Self {
        Self {
            relay,
            policy: RetryPolicy::default(),
        }
    }

    #[must_use]
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Relay one envelope, re-invoking `attempt` with an increasing attempt
    /// count until the result is terminal or the policy gives up.
    pub async fn deliver(&self, envelope: &Envelope) -> DeliveryResult {
        let mut attempt_count = 0;

        loop {
            let result = self.relay.attempt(envelope, attempt_count).await;
            attempt_count += 1;

            if result.is_terminal() || !self.policy.should_retry(attempt_count) {
                return result;
            }

            tracing::debug!(attempt = attempt_count, "delivery not terminal, retrying");
            tokio::time::sleep(self.policy.delay).await;
        }
    }
}
