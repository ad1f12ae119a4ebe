use std::{net::SocketAddr, sync::Arc};

use tokio::{
    io::{AsyncRead, AsyncWrite},
    sync::broadcast,
};

use crate::{
    controller::Signal,
    envelope::{Envelope, EnvelopeBuilder},
    incoming, internal, outgoing,
    queue::ProxyQueue,
    relay::DeliveryResult,
    smtp::{
        command::Command,
        connection::{COMMAND_LINE_LIMIT, Connection, DataOutcome},
        reply::{Reply, Status},
        validate::SessionValidator,
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Connect,
    Greeted,
    MailFrom,
    RcptTo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Event {
    ConnectionClose,
    ConnectionKeepAlive,
}

enum Action {
    Respond(Reply, Event),
    BeginData,
}

/// Everything a session needs beyond its stream and peer address.
pub struct SessionConfig {
    pub banner: String,
    pub max_message_size: usize,
    pub builder: Arc<dyn EnvelopeBuilder>,
    pub validator: Box<dyn SessionValidator + Send>,
    pub queue: Arc<ProxyQueue>,
}

/// One SMTP conversation: a state machine over the commands, producing at
/// most one envelope per transaction and handing each finished envelope to
/// the delivery queue.
pub struct Session<Stream> {
    peer: SocketAddr,
    connection: Connection<Stream>,
    state: State,
    helo: Option<String>,
    default_builder: Arc<dyn EnvelopeBuilder>,
    builder: Arc<dyn EnvelopeBuilder>,
    envelope: Option<Envelope>,
    validator: Box<dyn SessionValidator + Send>,
    queue: Arc<ProxyQueue>,
    banner: String,
    max_message_size: usize,
}

impl<Stream: AsyncRead + AsyncWrite + Unpin + Send + Sync> Session<Stream> {
    pub fn new(stream: Stream, peer: SocketAddr, config: SessionConfig) -> Self {
        Self {
            peer,
            connection: Connection::new(stream),
            state: State::Connect,
            helo: None,
            default_builder: Arc::clone(&config.builder),
            builder: config.builder,
            envelope: None,
            validator: config.validator,
            queue: config.queue,
            banner: config.banner,
            max_message_size: config.max_message_size,
        }
    }

    /// Drive the conversation until the peer quits, disconnects, or a
    /// shutdown signal arrives.
    ///
    /// # Errors
    ///
    /// If the underlying stream fails.
    pub async fn run(mut self, mut signal: broadcast::Receiver<Signal>) -> std::io::Result<()> {
        let mut greeting = Reply::new(
            Status::ServiceReady,
            format!("{} ESMTP service ready", self.banner),
        );
        self.validator.banner(&mut greeting, self.peer);

        outgoing!("{greeting}");
        self.connection.send(&greeting).await?;

        loop {
            tokio::select! {
                sig = signal.recv() => {
                    if matches!(
                        sig,
                        Ok(Signal::Shutdown) | Err(broadcast::error::RecvError::Closed)
                    ) {
                        let reply =
                            Reply::new(Status::GoodBye, "Service closing transmission channel");
                        outgoing!("{reply}");
                        let _ = self.connection.send(&reply).await;
                        return Ok(());
                    }
                }

                line = self.connection.read_line(COMMAND_LINE_LIMIT) => {
                    let Some(line) = line? else {
                        internal!("Connection closed by {}", self.peer);
                        return Ok(());
                    };

                    incoming!("{}", String::from_utf8_lossy(&line));

                    let action = match Command::try_from(line.as_slice()) {
                        Ok(command) => self.handle(command),
                        Err(invalid) => Action::Respond(
                            Reply::new(
                                Status::CommandUnrecognized,
                                format!("Invalid command: {invalid}"),
                            ),
                            Event::ConnectionKeepAlive,
                        ),
                    };

                    match action {
                        Action::Respond(reply, event) => {
                            outgoing!("{reply}");
                            self.connection.send(&reply).await?;

                            if event == Event::ConnectionClose {
                                return Ok(());
                            }
                        }

                        Action::BeginData => {
                            let go = Reply::new(
                                Status::StartMailInput,
                                "Start mail input; end with <CRLF>.<CRLF>",
                            );
                            outgoing!("{go}");
                            self.connection.send(&go).await?;

                            let reply = match self
                                .connection
                                .read_data(self.max_message_size)
                                .await?
                            {
                                DataOutcome::Closed => {
                                    internal!("Connection closed by {} mid-content", self.peer);
                                    return Ok(());
                                }
                                DataOutcome::TooLarge => {
                                    self.reset_transaction();
                                    Reply::new(
                                        Status::ExceededStorage,
                                        "5.3.4 Message exceeds the maximum size",
                                    )
                                }
                                DataOutcome::Complete(raw) => {
                                    self.complete_transaction(raw).await
                                }
                            };

                            outgoing!("{reply}");
                            self.connection.send(&reply).await?;
                        }
                    }
                }
            }
        }
    }

    fn handle(&mut self, command: Command) -> Action {
        match command {
            Command::Helo(host) | Command::Ehlo(host) => {
                self.helo = Some(host);
                self.reset_transaction();
                Action::Respond(
                    Reply::new(Status::Ok, self.banner.clone()),
                    Event::ConnectionKeepAlive,
                )
            }

            Command::MailFrom(sender) => {
                if self.state != State::Greeted {
                    return Action::Respond(Reply::bad_sequence(), Event::ConnectionKeepAlive);
                }

                let mut reply = Reply::new(Status::Ok, "2.1.0 Sender Ok");
                if let Some(builder) = self.validator.mail_from(&mut reply, sender.as_deref()) {
                    self.builder = builder;
                }

                if reply.status.is_success() {
                    let mut envelope = self.builder.begin(sender);
                    envelope.client_mut().ip = Some(self.peer.ip());
                    envelope.client_mut().helo = self.helo.clone();
                    self.envelope = Some(envelope);
                    self.state = State::MailFrom;
                }

                Action::Respond(reply, Event::ConnectionKeepAlive)
            }

            Command::RcptTo(recipient) => {
                if !matches!(self.state, State::MailFrom | State::RcptTo) {
                    return Action::Respond(Reply::bad_sequence(), Event::ConnectionKeepAlive);
                }

                if let Some(envelope) = self.envelope.as_mut() {
                    envelope.push_recipient(recipient);
                }
                self.state = State::RcptTo;

                Action::Respond(
                    Reply::new(Status::Ok, "2.1.5 Recipient Ok"),
                    Event::ConnectionKeepAlive,
                )
            }

            Command::Data => {
                if self.state == State::RcptTo {
                    Action::BeginData
                } else {
                    Action::Respond(Reply::bad_sequence(), Event::ConnectionKeepAlive)
                }
            }

            Command::Rset => {
                self.reset_transaction();
                Action::Respond(
                    Reply::new(Status::Ok, "2.0.0 Ok"),
                    Event::ConnectionKeepAlive,
                )
            }

            Command::Noop => Action::Respond(
                Reply::new(Status::Ok, "2.0.0 Ok"),
                Event::ConnectionKeepAlive,
            ),

            Command::Quit => Action::Respond(
                Reply::new(Status::GoodBye, "Service closing transmission channel"),
                Event::ConnectionClose,
            ),

            Command::Invalid(text) => Action::Respond(
                Reply::new(Status::CommandUnrecognized, format!("Invalid command: {text}")),
                Event::ConnectionKeepAlive,
            ),
        }
    }

    /// Drop any in-flight transaction. The builder reverts to the session
    /// default; the greeting survives.
    fn reset_transaction(&mut self) {
        self.envelope = None;
        self.builder = Arc::clone(&self.default_builder);
        self.state = if self.helo.is_some() {
            State::Greeted
        } else {
            State::Connect
        };
    }

    async fn complete_transaction(&mut self, raw: Vec<u8>) -> Reply {
        let Some(mut envelope) = self.envelope.take() else {
            return Reply::bad_sequence();
        };
        let builder = Arc::clone(&self.builder);
        self.reset_transaction();

        if let Err(err) = builder.finish(&mut envelope, raw) {
            internal!(level = WARN, "{err}");
            return Reply::new(Status::TransactionFailed, "5.6.0 Message content rejected");
        }

        self.validator.data_received(&mut envelope, self.peer);

        match self.queue.deliver(&envelope).await {
            DeliveryResult::Delivered(id) => {
                Reply::new(Status::Ok, format!("2.0.0 Message Delivered; {id}"))
            }
            DeliveryResult::Permanent(_) => {
                Reply::new(Status::MailboxUnavailable, "5.0.0 Unable to deliver")
            }
            DeliveryResult::Temporary(_) | DeliveryResult::Unclassified(_) => Reply::new(
                Status::ActionUnavailable,
                "4.0.0 Unable to deliver; try again later",
            ),
        }
    }
}
