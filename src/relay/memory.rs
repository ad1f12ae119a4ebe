//! In-memory backend with Redis list semantics.
//!
//! Used by the test suite and as a development sink. Supports failure
//! injection for both establishment and post-connection operations, and
//! records connect calls so reconnect behavior is observable.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
};

use async_trait::async_trait;
use tokio::time::Instant;

use super::{
    backend::{Connection, Connector},
    error::BackendError,
};

#[derive(Debug, Default)]
struct State {
    lists: HashMap<String, Vec<Vec<u8>>>,
    published: HashMap<String, Vec<Vec<u8>>>,
    connect_times: Vec<Instant>,
    connect_failures: u32,
    operation_failures: u32,
    trim_calls: Vec<(String, i64, i64)>,
}

/// Shared in-memory backend. Clones refer to the same store, so a test can
/// hold one handle for assertions while the relay drives another.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    state: Arc<Mutex<State>>,
}

impl MemoryBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn connector(&self) -> MemoryConnector {
        MemoryConnector {
            backend: self.clone(),
        }
    }

    /// Make the next `count` establishment attempts fail.
    pub fn fail_connects(&self, count: u32) {
        self.state().connect_failures = count;
    }

    /// Make the next `count` post-connection operations fail.
    pub fn fail_operations(&self, count: u32) {
        self.state().operation_failures = count;
    }

    #[must_use]
    pub fn connect_count(&self) -> usize {
        self.state().connect_times.len()
    }

    #[must_use]
    pub fn connect_times(&self) -> Vec<Instant> {
        self.state().connect_times.clone()
    }

    #[must_use]
    pub fn list(&self, key: &str) -> Vec<Vec<u8>> {
        self.state().lists.get(key).cloned().unwrap_or_default()
    }

    #[must_use]
    pub fn list_len(&self, key: &str) -> usize {
        self.state().lists.get(key).map_or(0, Vec::len)
    }

    #[must_use]
    pub fn published(&self, channel: &str) -> Vec<Vec<u8>> {
        self.state()
            .published
            .get(channel)
            .cloned()
            .unwrap_or_default()
    }

    #[must_use]
    pub fn trim_call_count(&self) -> usize {
        self.state().trim_calls.len()
    }

    /// # Panics
    /// Panics if the state mutex is poisoned.
    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().expect("MemoryBackend state mutex poisoned")
    }
}

/// Translates a Redis `LTRIM` range into an inclusive slice of a list of
/// `len` entries. `None` means the range is empty and the list is cleared.
fn ltrim_range(len: usize, start: i64, stop: i64) -> Option<(usize, usize)> {
    let len = i64::try_from(len).unwrap_or(i64::MAX);
    let start = if start < 0 { len + start } else { start }.max(0);
    let stop = if stop < 0 { len + stop } else { stop }.min(len - 1);

    if start > stop || start >= len {
        None
    } else {
        Some((
            usize::try_from(start).unwrap_or_default(),
            usize::try_from(stop).unwrap_or_default(),
        ))
    }
}

#[derive(Debug, Clone)]
pub struct MemoryConnector {
    backend: MemoryBackend,
}

#[async_trait]
impl Connector for MemoryConnector {
    type Connection = MemoryConnection;

    async fn connect(&self) -> Result<MemoryConnection, BackendError> {
        let mut state = self.backend.state();
        state.connect_times.push(Instant::now());

        if state.connect_failures > 0 {
            state.connect_failures -= 1;
            return Err(BackendError::Connect(
                "injected connect failure".to_string(),
            ));
        }

        Ok(MemoryConnection {
            backend: self.backend.clone(),
        })
    }
}

#[derive(Debug)]
pub struct MemoryConnection {
    backend: MemoryBackend,
}

fn check_operation(state: &mut State) -> Result<(), BackendError> {
    if state.operation_failures > 0 {
        state.operation_failures -= 1;
        return Err(BackendError::Operation(
            "injected operation failure".to_string(),
        ));
    }
    Ok(())
}

#[async_trait]
impl Connection for MemoryConnection {
    async fn rpush(&mut self, key: &str, payload: &[u8]) -> Result<u64, BackendError> {
        let mut state = self.backend.state();
        check_operation(&mut state)?;

        let list = state.lists.entry(key.to_string()).or_default();
        list.push(payload.to_vec());
        Ok(list.len() as u64)
    }

    async fn ltrim(&mut self, key: &str, start: i64, stop: i64) -> Result<(), BackendError> {
        let mut state = self.backend.state();
        check_operation(&mut state)?;
        state.trim_calls.push((key.to_string(), start, stop));

        let Some(list) = state.lists.get_mut(key) else {
            return Ok(());
        };
        match ltrim_range(list.len(), start, stop) {
            Some((first, last)) => {
                *list = list[first..=last].to_vec();
            }
            None => list.clear(),
        }
        Ok(())
    }

    async fn publish(&mut self, channel: &str, payload: &[u8]) -> Result<u64, BackendError> {
        let mut state = self.backend.state();
        check_operation(&mut state)?;

        state
            .published
            .entry(channel.to_string())
            .or_default()
            .push(payload.to_vec());
        // Nothing subscribes to the in-memory backend.
        Ok(0)
    }
}
