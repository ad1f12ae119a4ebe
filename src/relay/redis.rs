//! Production connector over the `redis` crate.
//!
//! One tokio multiplexed connection serves all concurrent attempts on a
//! relay: it is internally synchronized and bounds backend connection growth
//! at a single TCP connection per relay instance.

use std::time::Duration;

use async_trait::async_trait;
use redis::{AsyncCommands, AsyncConnectionConfig, Client, aio::MultiplexedConnection};

use super::{
    backend::{Connection, Connector},
    error::BackendError,
};

/// Timeouts applied when a connection is established. Changing these after a
/// connection exists affects only subsequent (re)connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RedisOptions {
    /// Timeout for establishing the TCP connection.
    pub connect_timeout: Duration,
    /// Timeout for each command's response. Never unbounded: an unreachable
    /// backend must surface as an error, not a hang.
    pub socket_timeout: Duration,
}

impl Default for RedisOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(1),
            socket_timeout: Duration::from_secs(1),
        }
    }
}

pub struct RedisConnector {
    client: Client,
    options: RedisOptions,
}

impl RedisConnector {
    /// # Errors
    ///
    /// If the URL cannot be parsed as a Redis connection string.
    pub fn new(url: &str, options: RedisOptions) -> Result<Self, BackendError> {
        let client = Client::open(url).map_err(|err| BackendError::Connect(err.to_string()))?;
        Ok(Self { client, options })
    }
}

#[async_trait]
impl Connector for RedisConnector {
    type Connection = RedisConnection;

    async fn connect(&self) -> Result<RedisConnection, BackendError> {
        let config = AsyncConnectionConfig::new()
            .set_connection_timeout(self.options.connect_timeout)
            .set_response_timeout(self.options.socket_timeout);

        let inner = self
            .client
            .get_multiplexed_async_connection_with_config(&config)
            .await
            .map_err(|err| BackendError::Connect(err.to_string()))?;

        Ok(RedisConnection { inner })
    }
}

pub struct RedisConnection {
    inner: MultiplexedConnection,
}

#[async_trait]
impl Connection for RedisConnection {
    async fn rpush(&mut self, key: &str, payload: &[u8]) -> Result<u64, BackendError> {
        self.inner
            .rpush(key, payload)
            .await
            .map_err(|err| BackendError::Operation(err.to_string()))
    }

    async fn ltrim(&mut self, key: &str, start: i64, stop: i64) -> Result<(), BackendError> {
        self.inner
            .ltrim(key, start as isize, stop as isize)
            .await
            .map_err(|err| BackendError::Operation(err.to_string()))
    }

    async fn publish(&mut self, channel: &str, payload: &[u8]) -> Result<u64, BackendError> {
        self.inner
            .publish(channel, payload)
            .await
            .map_err(|err| BackendError::Operation(err.to_string()))
    }
}
