use std::{net::SocketAddr, sync::Arc};

use crate::{
    envelope::{Envelope, EnvelopeBuilder, RawBuilder},
    smtp::reply::Reply,
};

/// Hooks into the session lifecycle. Implementations may rewrite the pending
/// reply, swap the envelope builder for the transaction, or annotate the
/// finished envelope.
#[allow(unused_variables)]
pub trait SessionValidator: Send {
    /// Called before the greeting banner is sent.
    fn banner(&mut self, reply: &mut Reply, peer: SocketAddr) {}

    /// Called on `MAIL FROM`. Returning a builder swaps it in for the rest
    /// of the transaction.
    fn mail_from(
        &mut self,
        reply: &mut Reply,
        sender: Option<&str>,
    ) -> Option<Arc<dyn EnvelopeBuilder>> {
        None
    }

    /// Called once message content has been accepted into the envelope.
    fn data_received(&mut self, envelope: &mut Envelope, peer: SocketAddr) {}
}

/// Produces a fresh validator per session.
pub type ValidatorFactory = Arc<dyn Fn() -> Box<dyn SessionValidator + Send> + Send + Sync>;

/// Accept-everything validator for trap deployments: greets with the
/// configured hostname, stores content verbatim instead of parsing it, and
/// records the peer's source port on the envelope.
#[derive(Debug, Clone)]
pub struct TrapValidator {
    hostname: String,
}

impl TrapValidator {
    pub const fn new(hostname: String) -> Self {
        Self { hostname }
    }
}

impl SessionValidator for TrapValidator {
    fn banner(&mut self, reply: &mut Reply, _peer: SocketAddr) {
        reply.text = format!("{} ESMTP service ready", self.hostname);
    }

    fn mail_from(
        &mut self,
        reply: &mut Reply,
        _sender: Option<&str>,
    ) -> Option<Arc<dyn EnvelopeBuilder>> {
        reply
            .status
            .is_success()
            .then(|| Arc::new(RawBuilder) as Arc<dyn EnvelopeBuilder>)
    }

    fn data_received(&mut self, envelope: &mut Envelope, peer: SocketAddr) {
        envelope.client_mut().port = Some(peer.port());
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::smtp::reply::Status;

    fn peer() -> SocketAddr {
        "10.0.0.1:51234".parse().expect("socket address")
    }

    #[test]
    fn banner_carries_hostname() {
        let mut validator = TrapValidator::new("trap.example".into());
        let mut reply = Reply::new(Status::ServiceReady, "ready");
        validator.banner(&mut reply, peer());

        assert_eq!(reply.to_string(), "220 trap.example ESMTP service ready");
    }

    #[test]
    fn mail_from_swaps_builder_only_on_success() {
        let mut validator = TrapValidator::new("trap.example".into());

        let mut accepted = Reply::new(Status::Ok, "Ok");
        assert!(validator.mail_from(&mut accepted, Some("a@x.com")).is_some());

        let mut refused = Reply::new(Status::MailboxUnavailable, "no");
        assert!(validator.mail_from(&mut refused, Some("a@x.com")).is_none());
    }

    #[test]
    fn data_received_records_source_port() {
        let mut validator = TrapValidator::new("trap.example".into());
        let mut envelope = RawBuilder.begin(Some("a@x.com".into()));
        validator.data_received(&mut envelope, peer());

        assert_eq!(envelope.client().port, Some(51234));
    }
}
