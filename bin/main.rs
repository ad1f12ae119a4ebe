use std::sync::Arc;

use clap::Parser;

use mailsink::{
    config::{Config, Sink},
    controller::Controller,
    envelope::ParsingBuilder,
    queue::ProxyQueue,
    relay::{BackendConnection, Interrupt, PublishRelay, QueueRelay, RedisConnector, Relay},
    smtp::{Edge, Listener, TrapValidator},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();

    mailsink::logging::init();

    let interrupt = Interrupt::new();
    let connector = RedisConnector::new(&config.backend, config.redis_options())?;
    let connection = BackendConnection::new(connector, interrupt.clone())
        .with_retry_delay(config.reconnect_delay());

    let relay: Arc<dyn Relay> = match config.sink() {
        Some(Sink::Queue(queue)) => {
            Arc::new(QueueRelay::new(connection, queue, config.trim_policy()?))
        }
        Some(Sink::Channel(channel)) => Arc::new(PublishRelay::new(connection, channel)),
        None => anyhow::bail!("either --queue or --channel is required"),
    };

    let queue = Arc::new(ProxyQueue::new(Arc::clone(&relay)));

    let hostname = config.hostname.clone();
    let edge = Edge {
        banner: config.hostname.clone(),
        max_message_size: config.max_message_size,
        builder: Arc::new(ParsingBuilder),
        validator: Arc::new(move || Box::new(TrapValidator::new(hostname.clone()))),
        queue,
    };

    let listeners = config
        .sockets()
        .into_iter()
        .map(|socket| Listener::new(socket, edge.clone()))
        .collect();

    Controller::new(listeners, relay, interrupt).run().await
}
