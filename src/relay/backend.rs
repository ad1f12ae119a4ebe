//! Lazily-established, retry-on-failure backend connection handling.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use tokio::sync::{MappedMutexGuard, Mutex, MutexGuard};

use super::error::BackendError;

/// Delay between establishment attempts while the backend is unreachable.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(2);

/// Cooperative flag bounding the reconnect loop. Checked every iteration;
/// once set, no further establishment attempts are made.
#[derive(Debug, Clone, Default)]
pub struct Interrupt(Arc<AtomicBool>);

impl Interrupt {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    #[must_use]
    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Establishes connections to the backend.
#[async_trait]
pub trait Connector: Send + Sync {
    type Connection: Connection + 'static;

    /// Establish a fresh connection.
    ///
    /// # Errors
    ///
    /// If the backend is unreachable.
    async fn connect(&self) -> Result<Self::Connection, BackendError>;
}

/// The backend primitives a live connection supports.
#[async_trait]
pub trait Connection: Send {
    /// Append the payload to the tail of the named list, returning the
    /// resulting list length.
    async fn rpush(&mut self, key: &str, payload: &[u8]) -> Result<u64, BackendError>;

    /// Trim the named list to the inclusive index range, Redis-style
    /// (negative indices count from the tail).
    async fn ltrim(&mut self, key: &str, start: i64, stop: i64) -> Result<(), BackendError>;

    /// Publish the payload to the named channel, returning the number of
    /// subscribers that received it.
    async fn publish(&mut self, channel: &str, payload: &[u8]) -> Result<u64, BackendError>;
}

/// A single logical connection handle, created on first use, shared by all
/// concurrent attempts on the same relay, and re-created transparently after
/// a teardown or a detected failure.
///
/// The mutex guarantees at most one establishment loop is in flight per
/// relay instance.
pub struct BackendConnection<C: Connector> {
    connector: C,
    slot: Mutex<Option<C::Connection>>,
    interrupt: Interrupt,
    retry_delay: Duration,
}

impl<C: Connector> BackendConnection<C> {
    pub fn new(connector: C, interrupt: Interrupt) -> Self {
        Self {
            connector,
            slot: Mutex::new(None),
            interrupt,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }

    #[must_use]
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    #[must_use]
    pub fn interrupt(&self) -> Interrupt {
        self.interrupt.clone()
    }

    /// Establish a connection if none is currently live, blocking the
    /// calling attempt in a retry loop spaced by the configured delay. The
    /// interrupt flag is the only non-success exit.
    ///
    /// # Errors
    ///
    /// [`BackendError::Interrupted`] if the flag was raised before a
    /// connection could be established.
    pub async fn ensure_connected(
        &self,
    ) -> Result<MappedMutexGuard<'_, C::Connection>, BackendError> {
        let mut slot = self.slot.lock().await;

        while slot.is_none() {
            if self.interrupt.is_set() {
                return Err(BackendError::Interrupted);
            }

            match self.connector.connect().await {
                Ok(connection) => *slot = Some(connection),
                Err(err) => {
                    tracing::warn!(error = %err, "while connecting");
                    tokio::time::sleep(self.retry_delay).await;
                }
            }
        }

        Ok(MutexGuard::map(slot, |conn| {
            conn.as_mut().expect("connection slot filled by the loop above")
        }))
    }

    /// Drop the current connection handle immediately. The next
    /// [`Self::ensure_connected`] call re-establishes from scratch.
    pub async fn kill(&self) {
        *self.slot.lock().await = None;
    }

    /// Whether a connection handle is currently held.
    pub async fn is_connected(&self) -> bool {
        self.slot.lock().await.is_some()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::super::memory::MemoryBackend;
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn retries_are_spaced_by_the_configured_delay() {
        let backend = MemoryBackend::new();
        backend.fail_connects(3);

        let connection = BackendConnection::new(backend.connector(), Interrupt::new())
            .with_retry_delay(Duration::from_secs(2));

        let guard = connection.ensure_connected().await.expect("connects");
        drop(guard);

        let times = backend.connect_times();
        assert_eq!(times.len(), 4, "three failures then one success");
        for pair in times.windows(2) {
            assert_eq!(pair[1] - pair[0], Duration::from_secs(2));
        }
    }

    #[tokio::test]
    async fn interrupt_is_the_only_non_success_exit() {
        let backend = MemoryBackend::new();
        backend.fail_connects(u32::MAX);

        let interrupt = Interrupt::new();
        interrupt.set();

        let connection = BackendConnection::new(backend.connector(), interrupt);
        let err = connection
            .ensure_connected()
            .await
            .expect_err("interrupted before connecting");
        assert!(matches!(err, BackendError::Interrupted));
        assert_eq!(backend.connect_count(), 0, "flag is checked before dialing");
    }

    #[tokio::test]
    async fn established_connection_is_reused() {
        let backend = MemoryBackend::new();
        let connection = BackendConnection::new(backend.connector(), Interrupt::new());

        drop(connection.ensure_connected().await.expect("connects"));
        drop(connection.ensure_connected().await.expect("still connected"));

        assert_eq!(backend.connect_count(), 1);
        assert!(connection.is_connected().await);
    }

    #[tokio::test]
    async fn kill_forces_a_fresh_establishment() {
        let backend = MemoryBackend::new();
        let connection = BackendConnection::new(backend.connector(), Interrupt::new());

        drop(connection.ensure_connected().await.expect("connects"));
        connection.kill().await;
        assert!(!connection.is_connected().await);

        drop(connection.ensure_connected().await.expect("reconnects"));
        assert_eq!(backend.connect_count(), 2);
    }
}
