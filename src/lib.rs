pub mod config;
pub mod controller;
pub mod encoder;
pub mod envelope;
pub mod logging;
pub mod queue;
pub mod relay;
pub mod smtp;

pub use tracing;
