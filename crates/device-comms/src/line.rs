//! Newline-delimited framing over a blocking byte stream

use crate::error::ConnectionError;
use crate::message::Message;
use std::io::{BufRead, BufReader, ErrorKind, Read};

/// Accumulates bytes until `\n`, surviving read timeouts mid-line
pub(crate) struct LineReader<R> {
    inner: BufReader<R>,
    pending: Vec<u8>,
}

impl<R: Read> LineReader<R> {
    pub(crate) fn new(inner: R) -> Self {
        Self {
            inner: BufReader::new(inner),
            pending: Vec::new(),
        }
    }

    /// Read the next line with its `\r\n` terminator removed
    ///
    /// Returns an empty message when the stream's read timeout fires before a
    /// full line arrived; the partial line is kept for the next call.
    pub(crate) fn next_line(&mut self) -> Result<Message, ConnectionError> {
        match self.inner.read_until(b'\n', &mut self.pending) {
            Ok(0) => Err(ConnectionError::Closed),
            Ok(_) if self.pending.ends_with(b"\n") => {
                let line = std::mem::take(&mut self.pending);
                Ok(decode(line))
            }
            Ok(_) => Ok(Message::default()),
            Err(e) if is_timeout(e.kind()) => Ok(Message::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Drop buffered input, including any partial line
    pub(crate) fn discard_pending(&mut self) {
        self.pending.clear();
        let buffered = self.inner.buffer().len();
        self.inner.consume(buffered);
    }
}

fn is_timeout(kind: ErrorKind) -> bool {
    matches!(
        kind,
        ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
    )
}

fn decode(mut bytes: Vec<u8>) -> Message {
    while matches!(bytes.last(), Some(b'\n' | b'\r')) {
        bytes.pop();
    }
    Message::from(String::from_utf8_lossy(&bytes).into_owned())
}
