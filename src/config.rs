use std::{
    net::{IpAddr, SocketAddr},
    time::Duration,
};

use clap::Parser;

use crate::{
    relay::{
        InvalidTrimPolicy, QueueTrimPolicy, RedisOptions,
        queue::{DEFAULT_HIGH_WATER_MARK, DEFAULT_TARGET_LENGTH},
    },
    smtp::DEFAULT_MAX_MESSAGE_SIZE,
};

/// Where accepted events are sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sink {
    /// RPUSH onto a bounded list.
    Queue(String),
    /// PUBLISH to a fan-out channel.
    Channel(String),
}

#[derive(Debug, Parser)]
#[command(
    version,
    about = "SMTP trap relaying accepted messages to Redis as JSON events"
)]
#[command(group(
    clap::ArgGroup::new("sink")
        .required(true)
        .args(["queue", "channel"])
))]
pub struct Config {
    /// Ports to listen on.
    #[arg(short = 'p', long = "port", default_values_t = [2525_u16])]
    pub ports: Vec<u16>,

    /// Address to bind the listeners to.
    #[arg(long, default_value = "0.0.0.0")]
    pub bind: IpAddr,

    /// Redis connection string.
    #[arg(long, default_value = "redis://localhost")]
    pub backend: String,

    /// Deliver events onto this Redis list.
    #[arg(long)]
    pub queue: Option<String>,

    /// Publish events to this Redis channel instead of a list.
    #[arg(long)]
    pub channel: Option<String>,

    /// List length above which the queue is trimmed.
    #[arg(long, default_value_t = DEFAULT_HIGH_WATER_MARK)]
    pub high_water_mark: u64,

    /// Number of newest entries kept when the queue is trimmed.
    #[arg(long, default_value_t = DEFAULT_TARGET_LENGTH)]
    pub target_length: u64,

    /// Backend connect timeout, in seconds.
    #[arg(long, default_value_t = 1)]
    pub connect_timeout: u64,

    /// Backend per-command timeout, in seconds.
    #[arg(long, default_value_t = 1)]
    pub socket_timeout: u64,

    /// Delay between reconnection attempts, in seconds.
    #[arg(long, default_value_t = 2)]
    pub reconnect_delay: u64,

    /// Hostname announced in the greeting banner.
    #[arg(long, default_value = "localhost")]
    pub hostname: String,

    /// Largest accepted message, in bytes.
    #[arg(long, default_value_t = DEFAULT_MAX_MESSAGE_SIZE)]
    pub max_message_size: usize,
}

impl Config {
    /// The configured sink. The argument group guarantees exactly one of
    /// `--queue` and `--channel` was given.
    #[must_use]
    pub fn sink(&self) -> Option<Sink> {
        self.queue
            .clone()
            .map(Sink::Queue)
            .or_else(|| self.channel.clone().map(Sink::Channel))
    }

    #[must_use]
    pub fn sockets(&self) -> Vec<SocketAddr> {
        self.ports
            .iter()
            .map(|port| SocketAddr::new(self.bind, *port))
            .collect()
    }

    /// # Errors
    ///
    /// If the target length exceeds the high water mark.
    pub fn trim_policy(&self) -> Result<QueueTrimPolicy, InvalidTrimPolicy> {
        QueueTrimPolicy::new(self.high_water_mark, self.target_length)
    }

    #[must_use]
    pub const fn redis_options(&self) -> RedisOptions {
        RedisOptions {
            connect_timeout: Duration::from_secs(self.connect_timeout),
            socket_timeout: Duration::from_secs(self.socket_timeout),
        }
    }

    #[must_use]
    pub const fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn queue_and_channel_are_mutually_exclusive() {
        assert!(
            Config::try_parse_from([
                "mailsink",
                "--queue",
                "events",
                "--channel",
                "events"
            ])
            .is_err()
        );
    }

    #[test]
    fn one_sink_is_required() {
        assert!(Config::try_parse_from(["mailsink"]).is_err());
    }

    #[test]
    fn queue_sink() {
        let config = Config::try_parse_from(["mailsink", "--queue", "events"]).expect("parses");
        assert_eq!(config.sink(), Some(Sink::Queue("events".to_string())));
        assert_eq!(config.high_water_mark, DEFAULT_HIGH_WATER_MARK);
        assert_eq!(config.target_length, DEFAULT_TARGET_LENGTH);
        assert!(config.trim_policy().is_ok());
    }

    #[test]
    fn sockets_combine_bind_address_and_ports() {
        let config = Config::try_parse_from([
            "mailsink",
            "--channel",
            "events",
            "--bind",
            "127.0.0.1",
            "-p",
            "2525",
            "-p",
            "2526",
        ])
        .expect("parses");

        assert_eq!(
            config.sockets(),
            vec![
                "127.0.0.1:2525".parse().expect("socket address"),
                "127.0.0.1:2526".parse().expect("socket address"),
            ]
        );
    }

    #[test]
    fn invalid_trim_policy_is_rejected() {
        let config = Config::try_parse_from([
            "mailsink",
            "--queue",
            "events",
            "--high-water-mark",
            "10",
            "--target-length",
            "20",
        ])
        .expect("parses");

        assert!(config.trim_policy().is_err());
    }
}
