use std::{borrow::Cow, fmt, net::IpAddr};

use serde::Serialize;
use thiserror::Error;

use crate::envelope::Envelope;

/// Tag identifying the emitting system in every event.
pub const EVENT_SOURCE: &str = "sproxy";
/// Tag identifying the event family.
pub const EVENT_CLASS: &str = "mail";

/// The serialized form of exactly one envelope. A stateless value with no
/// identity beyond its bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventPayload(String);

impl EventPayload {
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EventPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("Failed to serialize event: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Serialize)]
struct Event<'a> {
    event_source: &'static str,
    event_class: &'static str,
    data: EventData<'a>,
}

#[derive(Serialize)]
struct EventData<'a> {
    isipv4: bool,
    src_ip: Option<IpAddr>,
    src_port: Option<u16>,
    /// Always absent at this layer; consumers fill these downstream.
    dst_ip: Option<IpAddr>,
    dst_port: Option<u16>,
    helo: Option<&'a str>,
    mailfrom: Option<&'a str>,
    rcptto: &'a [String],
    data: Cow<'a, str>,
}

/// Encodes an envelope into the JSON event record consumed by the backend.
///
/// Total for well-formed input: missing client metadata degrades to JSON
/// null fields rather than erroring.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonEventEncoder;

impl JsonEventEncoder {
    /// # Errors
    ///
    /// If the event cannot be serialized, which should not occur for any
    /// envelope this crate constructs.
    pub fn encode(&self, envelope: &Envelope) -> Result<EventPayload, EncodeError> {
        let client = envelope.client();
        let event = Event {
            event_source: EVENT_SOURCE,
            event_class: EVENT_CLASS,
            data: EventData {
                isipv4: client.ip.is_none_or(|ip| ip.is_ipv4()),
                src_ip: client.ip,
                src_port: client.port,
                dst_ip: None,
                dst_port: None,
                helo: client.helo.as_deref(),
                mailfrom: envelope.sender(),
                rcptto: envelope.recipients(),
                data: String::from_utf8_lossy(envelope.raw_data()),
            },
        };

        let encoded = serde_json::to_string(&event)?;

        crate::important!("event emitted");
        tracing::info!("{}", serde_json::to_string_pretty(&event)?);

        Ok(EventPayload(encoded))
    }
}
