use core::fmt::Display;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Command lines are short; RFC 5321 only requires 512 octets.
pub const COMMAND_LINE_LIMIT: usize = 1024;
/// Content lines inside DATA can be much longer in practice.
pub const DATA_LINE_LIMIT: usize = 1 << 20;

/// Outcome of collecting message content.
#[derive(Debug, PartialEq, Eq)]
pub enum DataOutcome {
    /// Content received up to the terminating `<CRLF>.<CRLF>`.
    Complete(Vec<u8>),
    /// The terminator arrived but the content exceeded the size cap.
    TooLarge,
    /// The peer closed the stream mid-content.
    Closed,
}

/// Buffered SMTP stream wrapper: CRLF-delimited lines in, replies out.
pub struct Connection<Stream> {
    stream: Stream,
    buffer: Vec<u8>,
}

impl<Stream: AsyncRead + AsyncWrite + Unpin + Send + Sync> Connection<Stream> {
    pub const fn new(stream: Stream) -> Self {
        Self {
            stream,
            buffer: Vec::new(),
        }
    }

    pub async fn send<S: Display + Send + Sync>(&mut self, response: &S) -> std::io::Result<()> {
        self.stream
            .write_all(format!("{response}\r\n").as_bytes())
            .await?;
        self.stream.flush().await
    }

    /// Read one CRLF-terminated line, returned without the terminator.
    /// `None` means the peer closed the stream.
    pub async fn read_line(&mut self, limit: usize) -> std::io::Result<Option<Vec<u8>>> {
        loop {
            if let Some(pos) = find_crlf(&self.buffer) {
                let mut line: Vec<u8> = self.buffer.drain(..pos + 2).collect();
                line.truncate(pos);
                return Ok(Some(line));
            }

            if self.buffer.len() > limit {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    "line exceeds limit",
                ));
            }

            let mut chunk = [0u8; 1024];
            let read = self.stream.read(&mut chunk).await?;
            if read == 0 {
                return Ok(None);
            }
            self.buffer.extend_from_slice(&chunk[..read]);
        }
    }

    /// Collect message content until `<CRLF>.<CRLF>`, un-stuffing leading
    /// dots. Oversized content is still consumed up to the terminator so the
    /// session can reply rather than desynchronize.
    pub async fn read_data(&mut self, max_size: usize) -> std::io::Result<DataOutcome> {
        let mut body = Vec::new();
        let mut oversized = false;

        loop {
            let Some(line) = self.read_line(DATA_LINE_LIMIT).await? else {
                return Ok(DataOutcome::Closed);
            };

            if line == b"." {
                return Ok(if oversized {
                    DataOutcome::TooLarge
                } else {
                    DataOutcome::Complete(body)
                });
            }

            if oversized {
                continue;
            }

            let stripped = line.strip_prefix(b".").unwrap_or(&line);
            body.extend_from_slice(stripped);
            body.extend_from_slice(b"\r\n");
            if body.len() > max_size {
                oversized = true;
                body = Vec::new();
            }
        }
    }
}

fn find_crlf(buffer: &[u8]) -> Option<usize> {
    buffer.windows(2).position(|pair| pair == b"\r\n")
}
