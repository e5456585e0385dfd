//! Codec for the three-byte reply alphabet.
//!
//! Every record boundary in the protocol is acknowledged with a single
//! byte: `0x00` for OK, `0x01` for a warning, `0x02` for a fatal error.
//! The two failure bytes are followed by a message terminated by a line
//! feed, which is stripped before the message is surfaced.

use std::fmt;
use std::io::{self, BufRead, Write};

use crate::error::ProtocolError;

pub(crate) const REPLY_OK: u8 = 0x00;
pub(crate) const REPLY_WARNING: u8 = 0x01;
pub(crate) const REPLY_FATAL: u8 = 0x02;

/// Severity of a reply sent by the remote peer.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ReplyKind {
    /// The record was accepted.
    Ok,
    /// The record failed but the peer kept the session alive.
    Warning,
    /// The peer aborted the session.
    Fatal,
}

impl fmt::Display for ReplyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => f.write_str("ok"),
            Self::Warning => f.write_str("warning"),
            Self::Fatal => f.write_str("fatal error"),
        }
    }
}

/// One decoded reply from the peer.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ReplyMessage {
    kind: ReplyKind,
    text: String,
}

impl ReplyMessage {
    /// Returns the reply severity.
    #[must_use]
    pub const fn kind(&self) -> ReplyKind {
        self.kind
    }

    /// Returns the message text; empty for OK replies.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Reports whether the reply acknowledged the record.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.kind == ReplyKind::Ok
    }
}

/// Reads one byte, treating a clean end-of-stream as `None`.
pub(crate) fn read_type_byte<R: BufRead>(reader: &mut R) -> Result<Option<u8>, ProtocolError> {
    let mut byte = [0u8; 1];
    loop {
        match reader.read(&mut byte) {
            Ok(0) => return Ok(None),
            Ok(_) => return Ok(Some(byte[0])),
            Err(error) if error.kind() == io::ErrorKind::Interrupted => continue,
            Err(error) => return Err(error.into()),
        }
    }
}

/// Reads the LF-terminated message that follows a warning or fatal byte.
pub(crate) fn read_message_line<R: BufRead>(reader: &mut R) -> Result<String, ProtocolError> {
    let mut line = Vec::new();
    reader.read_until(b'\n', &mut line)?;
    if line.last() != Some(&b'\n') {
        return Err(ProtocolError::UnexpectedEof);
    }
    line.pop();
    Ok(String::from_utf8_lossy(&line).into_owned())
}

/// Reads one reply from the peer.
pub fn read_reply<R: BufRead>(reader: &mut R) -> Result<ReplyMessage, ProtocolError> {
    let byte = read_type_byte(reader)?.ok_or(ProtocolError::UnexpectedEof)?;
    let kind = match byte {
        REPLY_OK => {
            return Ok(ReplyMessage {
                kind: ReplyKind::Ok,
                text: String::new(),
            });
        }
        REPLY_WARNING => ReplyKind::Warning,
        REPLY_FATAL => ReplyKind::Fatal,
        other => return Err(ProtocolError::UnexpectedReply { byte: other }),
    };
    let text = read_message_line(reader)?;
    Ok(ReplyMessage { kind, text })
}

/// Reads one reply and converts anything but OK into an error.
pub fn expect_ok<R: BufRead>(reader: &mut R) -> Result<(), ProtocolError> {
    let reply = read_reply(reader)?;
    if reply.is_ok() {
        Ok(())
    } else {
        Err(ProtocolError::Remote {
            kind: reply.kind,
            message: reply.text,
        })
    }
}

/// Writes one OK byte and flushes it to the peer.
pub fn write_ok<W: Write>(writer: &mut W) -> Result<(), ProtocolError> {
    writer.write_all(&[REPLY_OK])?;
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn ok_byte_decodes_without_a_message() {
        let mut reader = Cursor::new(vec![0x00]);
        let reply = read_reply(&mut reader).expect("reply");
        assert!(reply.is_ok());
        assert_eq!(reply.text(), "");
    }

    #[test]
    fn warning_and_fatal_strip_the_line_feed() {
        let mut reader = Cursor::new(b"\x01scp: oops\n".to_vec());
        let reply = read_reply(&mut reader).expect("reply");
        assert_eq!(reply.kind(), ReplyKind::Warning);
        assert_eq!(reply.text(), "scp: oops");

        let mut reader = Cursor::new(b"\x02No such file\n".to_vec());
        let reply = read_reply(&mut reader).expect("reply");
        assert_eq!(reply.kind(), ReplyKind::Fatal);
        assert_eq!(reply.text(), "No such file");
    }

    #[test]
    fn unknown_reply_byte_is_a_framing_error() {
        let mut reader = Cursor::new(vec![0x07]);
        match read_reply(&mut reader) {
            Err(ProtocolError::UnexpectedReply { byte: 0x07 }) => {}
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn truncated_message_is_an_unexpected_eof() {
        let mut reader = Cursor::new(b"\x02half a mess".to_vec());
        assert!(matches!(
            read_reply(&mut reader),
            Err(ProtocolError::UnexpectedEof)
        ));
    }

    #[test]
    fn empty_stream_is_an_unexpected_eof() {
        let mut reader = Cursor::new(Vec::new());
        assert!(matches!(
            read_reply(&mut reader),
            Err(ProtocolError::UnexpectedEof)
        ));
    }

    #[test]
    fn expect_ok_surfaces_the_peer_message() {
        let mut reader = Cursor::new(b"\x02No such file\n".to_vec());
        match expect_ok(&mut reader) {
            Err(ProtocolError::Remote { kind, message }) => {
                assert_eq!(kind, ReplyKind::Fatal);
                assert_eq!(message, "No such file");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn write_ok_emits_a_single_nul() {
        let mut out = Vec::new();
        write_ok(&mut out).expect("write");
        assert_eq!(out, vec![0x00]);
    }
}
