use core::fmt::{self, Display, Formatter};

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Debug)]
pub enum Status {
    ServiceReady,
    GoodBye,
    Ok,
    StartMailInput,
    ActionUnavailable,
    CommandUnrecognized,
    InvalidCommandSequence,
    MailboxUnavailable,
    ExceededStorage,
    TransactionFailed,
    Unknown(u16),
}

impl Status {
    /// Checks if the status is a permanent rejection
    #[must_use]
    pub fn is_permanent(self) -> bool {
        u16::from(self) >= 500
    }

    /// Checks if the status is a temporary rejection
    #[must_use]
    pub fn is_temporary(self) -> bool {
        (400..500).contains(&u16::from(self))
    }

    #[must_use]
    pub fn is_success(self) -> bool {
        (200..300).contains(&u16::from(self))
    }
}

impl From<u16> for Status {
    fn from(value: u16) -> Self {
        match value {
            220 => Self::ServiceReady,
            221 => Self::GoodBye,
            250 => Self::Ok,
            354 => Self::StartMailInput,
            451 => Self::ActionUnavailable,
            500 => Self::CommandUnrecognized,
            503 => Self::InvalidCommandSequence,
            550 => Self::MailboxUnavailable,
            552 => Self::ExceededStorage,
            554 => Self::TransactionFailed,
            _ => Self::Unknown(value),
        }
    }
}

impl From<Status> for u16 {
    fn from(value: Status) -> Self {
        match value {
            Status::ServiceReady => 220,
            Status::GoodBye => 221,
            Status::Ok => 250,
            Status::StartMailInput => 354,
            Status::ActionUnavailable => 451,
            Status::CommandUnrecognized => 500,
            Status::InvalidCommandSequence => 503,
            Status::MailboxUnavailable => 550,
            Status::ExceededStorage => 552,
            Status::TransactionFailed => 554,
            Status::Unknown(v) => v,
        }
    }
}

impl Display for Status {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        write!(fmt, "{}", u16::from(*self))
    }
}

/// A reply line sent back to the client. Validators may rewrite the text
/// (and, for hooks that allow it, the status) before it goes out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub status: Status,
    pub text: String,
}

impl Reply {
    pub fn new(status: Status, text: impl Into<String>) -> Self {
        Self {
            status,
            text: text.into(),
        }
    }

    #[must_use]
    pub fn bad_sequence() -> Self {
        Self::new(Status::InvalidCommandSequence, "5.5.1 Bad sequence of commands")
    }
}

impl Display for Reply {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> fmt::Result {
        write!(fmt, "{} {}", self.status, self.text)
    }
}
