use std::sync::{Arc, LazyLock};

use futures_util::future::join_all;
use tokio::sync::broadcast;

use crate::{
    internal,
    relay::{Interrupt, Relay},
    smtp::listener::Listener,
};

#[derive(Debug, Clone, Copy)]
pub enum Signal {
    Shutdown,
    Finalised,
}

pub static SHUTDOWN_BROADCAST: LazyLock<broadcast::Sender<Signal>> = LazyLock::new(|| {
    let (sender, _receiver) = broadcast::channel(64);
    sender
});

async fn shutdown(interrupt: Interrupt) -> anyhow::Result<()> {
    let _ = tokio::signal::ctrl_c().await;
    internal!(level = INFO, "CTRL+C entered -- Enter it again to force shutdown");

    // Stop any reconnect loop before draining sessions, otherwise a session
    // blocked on an unreachable backend would hold up the drain.
    interrupt.set();

    let mut receiver = SHUTDOWN_BROADCAST.subscribe();

    SHUTDOWN_BROADCAST
        .send(Signal::Shutdown)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Interrupted, e.to_string()))?;

    loop {
        tokio::select! {
            sig = receiver.recv() => {
                match sig {
                    Ok(s) => tracing::debug!("Received {s:?}"),
                    Err(broadcast::error::RecvError::Closed) => break,
                    Err(e) => tracing::debug!("Received: {e:?}"),
                }
            }

            _ = tokio::signal::ctrl_c() => {
                break;
            }
        }
    }

    Ok(())
}

/// Runs the listeners and tears everything down on CTRL+C.
pub struct Controller {
    listeners: Vec<Listener>,
    relay: Arc<dyn Relay>,
    interrupt: Interrupt,
}

impl Controller {
    pub fn new(listeners: Vec<Listener>, relay: Arc<dyn Relay>, interrupt: Interrupt) -> Self {
        Self {
            listeners,
            relay,
            interrupt,
        }
    }

    /// Run this controller, and everything it controls.
    ///
    /// # Errors
    ///
    /// If a listener fails to bind or accept.
    pub async fn run(self) -> anyhow::Result<()> {
        internal!("Controller running");

        let serve = join_all(self.listeners.iter().map(Listener::serve));

        tokio::select! {
            results = serve => {
                for result in results {
                    result?;
                }
            }
            _ = shutdown(self.interrupt.clone()) => {}
        };

        self.relay.kill().await;
        internal!("Shutting down...");

        Ok(())
    }
}
