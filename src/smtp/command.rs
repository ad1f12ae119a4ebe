use core::fmt::{self, Display, Formatter};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Helo(String),
    Ehlo(String),
    /// `None` is the null sender, or null reverse-path, from
    /// [RFC-5321](https://www.ietf.org/rfc/rfc5321.txt).
    MailFrom(Option<String>),
    RcptTo(String),
    Data,
    Rset,
    Noop,
    Quit,
    Invalid(String),
}

impl Display for Command {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Helo(host) => write!(fmt, "HELO {host}"),
            Self::Ehlo(host) => write!(fmt, "EHLO {host}"),
            Self::MailFrom(sender) => write!(
                fmt,
                "MAIL FROM:<{}>",
                sender.as_deref().unwrap_or_default()
            ),
            Self::RcptTo(rcpt) => write!(fmt, "RCPT TO:<{rcpt}>"),
            Self::Data => fmt.write_str("DATA"),
            Self::Rset => fmt.write_str("RSET"),
            Self::Noop => fmt.write_str("NOOP"),
            Self::Quit => fmt.write_str("QUIT"),
            Self::Invalid(s) => fmt.write_str(s),
        }
    }
}

/// Extract a single mailbox from the argument of MAIL FROM / RCPT TO,
/// ignoring any trailing ESMTP parameters.
fn parse_address(raw: &str) -> Option<String> {
    let candidate = raw.trim().split_whitespace().next()?;

    match mailparse::addrparse(candidate) {
        Ok(list) => list.first().and_then(|addr| match addr {
            mailparse::MailAddr::Single(single) => Some(single.addr.clone()),
            mailparse::MailAddr::Group(_) => None,
        }),
        Err(_) => None,
    }
}

impl TryFrom<&str> for Command {
    type Error = Self;

    fn try_from(command: &str) -> Result<Self, Self::Error> {
        let comm = command.to_ascii_uppercase();
        let comm = comm.trim();

        if let Some(rest) = comm.strip_prefix("MAIL FROM:") {
            // Handle the null sender explicitly, as mailparse doesn't tend
            // to like it
            if rest.trim() == "<>" {
                return Ok(Self::MailFrom(None));
            }

            let raw = command.trim();
            parse_address(&raw[raw.len() - rest.len()..]).map_or_else(
                || Err(Self::Invalid(command.to_owned())),
                |sender| Ok(Self::MailFrom(Some(sender))),
            )
        } else if let Some(rest) = comm.strip_prefix("RCPT TO:") {
            let raw = command.trim();
            parse_address(&raw[raw.len() - rest.len()..]).map_or_else(
                || Err(Self::Invalid(command.to_owned())),
                |rcpt| Ok(Self::RcptTo(rcpt)),
            )
        } else if comm.starts_with("EHLO") || comm.starts_with("HELO") {
            match command.trim().split_once(' ') {
                None => Err(Self::Invalid(format!("Expected hostname in {comm}"))),
                Some((_, host)) if comm.starts_with('H') => {
                    Ok(Self::Helo(host.trim().to_string()))
                }
                Some((_, host)) => Ok(Self::Ehlo(host.trim().to_string())),
            }
        } else {
            match comm {
                "DATA" => Ok(Self::Data),
                "RSET" => Ok(Self::Rset),
                "NOOP" => Ok(Self::Noop),
                "QUIT" => Ok(Self::Quit),
                _ => Err(Self::Invalid(command.to_owned())),
            }
        }
    }
}

impl TryFrom<&[u8]> for Command {
    type Error = Self;

    fn try_from(command: &[u8]) -> Result<Self, Self::Error> {
        std::str::from_utf8(command).map_or(
            Err(Self::Invalid("Unable to interpret command".to_string())),
            Self::try_from,
        )
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::Command;

    #[test]
    fn mail_from_command() {
        assert_eq!(
            Command::try_from("MAIL FROM:<test@gmail.com>"),
            Ok(Command::MailFrom(Some("test@gmail.com".to_string())))
        );

        // Case-insensitive verb, address case preserved
        assert_eq!(
            Command::try_from("mail from:<Test@Gmail.com>"),
            Ok(Command::MailFrom(Some("Test@Gmail.com".to_string())))
        );

        // ESMTP parameters are ignored
        assert_eq!(
            Command::try_from("MAIL FROM:<a@x.com> SIZE=1024"),
            Ok(Command::MailFrom(Some("a@x.com".to_string())))
        );

        assert_eq!(
            Command::try_from("MAIL FROM:<>"),
            Ok(Command::MailFrom(None))
        );

        assert!(Command::try_from("MAIL FROM:").is_err());
    }

    #[test]
    fn rcpt_to_command() {
        assert_eq!(
            Command::try_from("RCPT TO:<test@gmail.com>"),
            Ok(Command::RcptTo("test@gmail.com".to_string()))
        );
        assert_eq!(
            Command::try_from("rcpt to: test@gmail.com"),
            Ok(Command::RcptTo("test@gmail.com".to_string()))
        );

        assert!(Command::try_from("RCPT TO:").is_err());
    }

    #[test]
    fn helo_ehlo_command() {
        assert!(Command::try_from("EHLO").is_err());
        assert!(Command::try_from("HELO").is_err());

        assert_eq!(
            Command::try_from("EHLO client.example"),
            Ok(Command::Ehlo("client.example".to_string()))
        );
        assert_eq!(
            Command::try_from("helo client.example"),
            Ok(Command::Helo("client.example".to_string()))
        );
    }

    #[test]
    fn bare_commands() {
        assert_eq!(Command::try_from("DATA"), Ok(Command::Data));
        assert_eq!(Command::try_from("data"), Ok(Command::Data));
        assert_eq!(Command::try_from("RSET"), Ok(Command::Rset));
        assert_eq!(Command::try_from("NOOP"), Ok(Command::Noop));
        assert_eq!(Command::try_from("QUIT"), Ok(Command::Quit));
        assert!(Command::try_from("VRFY someone").is_err());
    }

    #[test]
    fn invalid_bytes() {
        assert!(Command::try_from(&[0xff_u8, 0xfe][..]).is_err());
    }
}
