//! A compact SMTP receiver: just enough protocol to accept a transaction
//! and hand the resulting envelope to the delivery queue.

pub mod command;
pub mod connection;
pub mod listener;
pub mod reply;
pub mod session;
pub mod validate;

pub use listener::{Edge, Listener};
pub use session::{Session, SessionConfig};
pub use validate::{SessionValidator, TrapValidator, ValidatorFactory};

/// Default cap on message content, matching the trap's historical limit.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 10 * 1024 * 1024;
