use std::{net::SocketAddr, sync::Arc};

use futures_util::future::join_all;
use tokio::net::TcpListener;

use crate::{
    controller::{SHUTDOWN_BROADCAST, Signal},
    envelope::EnvelopeBuilder,
    internal,
    queue::ProxyQueue,
    smtp::{
        session::{Session, SessionConfig},
        validate::ValidatorFactory,
    },
};

/// The shared ingredients every accepted connection is wired up with.
#[derive(Clone)]
pub struct Edge {
    pub banner: String,
    pub max_message_size: usize,
    pub builder: Arc<dyn EnvelopeBuilder>,
    pub validator: ValidatorFactory,
    pub queue: Arc<ProxyQueue>,
}

impl Edge {
    fn session_config(&self) -> SessionConfig {
        SessionConfig {
            banner: self.banner.clone(),
            max_message_size: self.max_message_size,
            builder: Arc::clone(&self.builder),
            validator: (self.validator)(),
            queue: Arc::clone(&self.queue),
        }
    }
}

/// Accept loop on one socket, spawning a session per connection and
/// draining them on shutdown.
pub struct Listener {
    socket: SocketAddr,
    edge: Edge,
}

impl Listener {
    pub const fn new(socket: SocketAddr, edge: Edge) -> Self {
        Self { socket, edge }
    }

    /// Bind and serve until a shutdown signal arrives.
    ///
    /// # Errors
    ///
    /// If the socket cannot be bound, or accepting a connection fails.
    pub async fn serve(&self) -> anyhow::Result<()> {
        let listener = TcpListener::bind(self.socket).await?;
        internal!(level = INFO, "Listening on {}", self.socket);

        let mut shutdown = SHUTDOWN_BROADCAST.subscribe();
        let mut sessions = Vec::new();

        loop {
            tokio::select! {
                sig = shutdown.recv() => {
                    if matches!(sig, Ok(Signal::Shutdown)) {
                        internal!("Draining {} session(s) on {}", sessions.len(), self.socket);
                        join_all(sessions).await;
                        let _ = SHUTDOWN_BROADCAST.send(Signal::Finalised);
                        break;
                    }
                }

                accepted = listener.accept() => {
                    let (stream, peer) = accepted?;
                    internal!("Connection from {peer}");

                    let session =
                        Session::new(stream, peer, self.edge.session_config());
                    let signal = SHUTDOWN_BROADCAST.subscribe();

                    sessions.push(tokio::spawn(async move {
                        if let Err(err) = session.run(signal).await {
                            tracing::error!(%peer, error = %err, "session failed");
                        }
                    }));

                    sessions.retain(|handle| !handle.is_finished());
                }
            }
        }

        Ok(())
    }
}
