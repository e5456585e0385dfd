use std::io;

use thiserror::Error;

use crate::reply::ReplyKind;

/// Errors produced while speaking the scp wire protocol.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The peer reported a warning or fatal error with a message.
    #[error("remote scp peer reported {kind}: {message}")]
    Remote {
        /// Severity the peer attached to the message.
        kind: ReplyKind,
        /// Message text with its terminating newline stripped.
        message: String,
    },
    /// A reply position held a byte outside the reply alphabet.
    #[error("unexpected scp reply byte {byte:#04x}")]
    UnexpectedReply {
        /// The offending byte.
        byte: u8,
    },
    /// A control record could not be parsed.
    #[error("malformed scp record {line:?}: {reason}")]
    MalformedHeader {
        /// The rejected record, lossily decoded for display.
        line: String,
        /// Which constraint the record violated.
        reason: &'static str,
    },
    /// A record arrived that the current transfer phase cannot accept.
    #[error("unexpected {record} record in this transfer phase")]
    UnexpectedRecord {
        /// Human-readable record kind.
        record: &'static str,
    },
    /// An entry expected to be a regular file was not.
    #[error("entry {name:?} is not a regular file")]
    NotAFile {
        /// Name of the offending entry.
        name: String,
    },
    /// An entry expected to be a directory was not.
    #[error("entry {name:?} is not a directory")]
    NotADirectory {
        /// Name of the offending entry.
        name: String,
    },
    /// The peer closed the stream in the middle of a record or body.
    #[error("unexpected end of stream from the remote scp peer")]
    UnexpectedEof,
    /// An `E` record was produced with no directory open.
    #[error("directory end without a matching directory start")]
    UnbalancedDirectoryEnd,
    /// A `T` record was not followed by the `C` or `D` it must apply to.
    #[error("time record not followed by a file or directory record")]
    DanglingTime,
    /// A file body ended before the declared length.
    #[error("file body ended after {actual} of {expected} bytes")]
    BodyTooShort {
        /// Bytes the header declared.
        expected: u64,
        /// Bytes actually transferred.
        actual: u64,
    },
    /// A file body kept producing bytes past the declared length.
    #[error("file body continued past the declared {declared} bytes")]
    BodyTooLong {
        /// Bytes the header declared.
        declared: u64,
    },
    /// The byte after a file body was not the `0x00` terminator.
    #[error("missing end-of-body marker, got byte {byte:#04x}")]
    BadBodyTerminator {
        /// The byte found in place of the terminator.
        byte: u8,
    },
    /// An I/O failure on the underlying channel.
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl From<ProtocolError> for io::Error {
    fn from(error: ProtocolError) -> Self {
        match error {
            ProtocolError::Io(error) => error,
            ProtocolError::UnexpectedEof => {
                io::Error::new(io::ErrorKind::UnexpectedEof, error.to_string())
            }
            other => io::Error::new(io::ErrorKind::InvalidData, other),
        }
    }
}
