use std::{fmt::Debug, net::IpAddr};

use thiserror::Error;

/// Metadata about the client that handed us the transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientInfo {
    pub ip: Option<IpAddr>,
    pub port: Option<u16>,
    /// The hostname the client announced in HELO/EHLO.
    pub helo: Option<String>,
}

/// A single mail transaction: sender, recipients, raw content, and client
/// metadata. Immutable once handed to the relay; the relay never retains a
/// reference past `attempt`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Envelope {
    sender: Option<String>,
    recipients: Vec<String>,
    raw_data: Vec<u8>,
    client: ClientInfo,
}

impl Envelope {
    #[must_use]
    pub fn new(sender: Option<String>) -> Self {
        Self {
            sender,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn sender(&self) -> Option<&str> {
        self.sender.as_deref()
    }

    #[must_use]
    pub fn recipients(&self) -> &[String] {
        &self.recipients
    }

    pub fn push_recipient(&mut self, recipient: String) {
        self.recipients.push(recipient);
    }

    #[must_use]
    pub fn raw_data(&self) -> &[u8] {
        &self.raw_data
    }

    pub fn set_raw_data(&mut self, raw: Vec<u8>) {
        self.raw_data = raw;
    }

    #[must_use]
    pub const fn client(&self) -> &ClientInfo {
        &self.client
    }

    pub const fn client_mut(&mut self) -> &mut ClientInfo {
        &mut self.client
    }
}

#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("Malformed message content: {0}")]
    Malformed(String),
}

/// Envelope construction strategy, selected per-transaction. The session
/// holds this behind a trait object so a validator can swap the strategy at
/// the moment a declared sender is accepted.
pub trait EnvelopeBuilder: Debug + Send + Sync {
    /// Start an envelope for the declared sender.
    fn begin(&self, sender: Option<String>) -> Envelope {
        Envelope::new(sender)
    }

    /// Attach the received message content to the envelope.
    ///
    /// # Errors
    ///
    /// If the builder considers the content malformed.
    fn finish(&self, envelope: &mut Envelope, raw: Vec<u8>) -> Result<(), EnvelopeError>;
}

/// Validates message content with `mailparse` before accepting it.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParsingBuilder;

impl EnvelopeBuilder for ParsingBuilder {
    fn finish(&self, envelope: &mut Envelope, raw: Vec<u8>) -> Result<(), EnvelopeError> {
        mailparse::parse_mail(&raw).map_err(|err| EnvelopeError::Malformed(err.to_string()))?;
        envelope.set_raw_data(raw);
        Ok(())
    }
}

/// Stores the received bytes untouched, skipping content parsing entirely.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawBuilder;

impl EnvelopeBuilder for RawBuilder {
    fn finish(&self, envelope: &mut Envelope, raw: Vec<u8>) -> Result<(), EnvelopeError> {
        envelope.set_raw_data(raw);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn envelope_accumulates_recipients_in_order() {
        let mut envelope = Envelope::new(Some("a@x.com".to_string()));
        envelope.push_recipient("b@y.com".to_string());
        envelope.push_recipient("c@z.com".to_string());

        assert_eq!(envelope.sender(), Some("a@x.com"));
        assert_eq!(envelope.recipients(), &["b@y.com", "c@z.com"]);
    }

    #[test]
    fn parsing_builder_accepts_well_formed_mail() {
        let mut envelope = ParsingBuilder.begin(Some("a@x.com".to_string()));
        let raw = b"Subject: hi\r\n\r\nbody\r\n".to_vec();

        ParsingBuilder
            .finish(&mut envelope, raw.clone())
            .expect("well-formed message");
        assert_eq!(envelope.raw_data(), raw.as_slice());
    }

    #[test]
    fn raw_builder_stores_bytes_untouched() {
        let mut envelope = RawBuilder.begin(None);
        let raw = vec![0xff, 0xfe, 0x00, b'!'];

        RawBuilder
            .finish(&mut envelope, raw.clone())
            .expect("raw builder never rejects");
        assert_eq!(envelope.raw_data(), raw.as_slice());
        assert_eq!(envelope.sender(), None);
    }
}
