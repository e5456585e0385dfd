//! Receiving state machine, driving a remote `scp -f` process.

use std::io::{self, BufRead, Read, Write};

use tracing::trace;

use crate::error::ProtocolError;
use crate::header::{
    Header, MSG_DIR_END, MSG_DIR_START, MSG_FILE, MSG_TIME, parse_record, read_record_line,
};
use crate::reply::{
    REPLY_FATAL, REPLY_OK, REPLY_WARNING, ReplyKind, read_message_line, read_type_byte, write_ok,
};

/// One step of the incoming record stream.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SinkEvent {
    /// A decoded control record.
    Record(Header),
    /// A spontaneous OK byte, seen in some `-p` preludes; carries no
    /// information and needs no acknowledgement.
    Ok,
    /// The peer closed the stream cleanly.
    Eof,
}

/// Drives the receiving half of an scp conversation.
///
/// The sink speaks first: opening the protocol announces readiness with a
/// single OK byte, and every record the peer should send next is permitted
/// by another one. File bodies are read either eagerly with
/// [`receive_body`](Self::receive_body) or in caller-paced chunks with
/// [`read_body_chunk`](Self::read_body_chunk) followed by
/// [`finish_body`](Self::finish_body).
pub struct SinkProtocol<R, W> {
    reader: R,
    writer: W,
}

impl<R: BufRead, W: Write> SinkProtocol<R, W> {
    /// Announces readiness to the remote source.
    pub fn open(reader: R, mut writer: W) -> Result<Self, ProtocolError> {
        write_ok(&mut writer)?;
        Ok(Self { reader, writer })
    }

    /// Reads the next record, spontaneous OK, or end-of-stream.
    ///
    /// A warning or fatal reply in record position surfaces as
    /// [`ProtocolError::Remote`].
    pub fn read_event(&mut self) -> Result<SinkEvent, ProtocolError> {
        let Some(byte) = read_type_byte(&mut self.reader)? else {
            return Ok(SinkEvent::Eof);
        };
        match byte {
            REPLY_OK => Ok(SinkEvent::Ok),
            REPLY_WARNING | REPLY_FATAL => {
                let message = read_message_line(&mut self.reader)?;
                Err(ProtocolError::Remote {
                    kind: if byte == REPLY_WARNING {
                        ReplyKind::Warning
                    } else {
                        ReplyKind::Fatal
                    },
                    message,
                })
            }
            kind @ (MSG_FILE | MSG_DIR_START | MSG_DIR_END | MSG_TIME) => {
                let line = read_record_line(&mut self.reader)?;
                let header = parse_record(kind, &line)?;
                trace!(record = header.kind_name(), "received record");
                Ok(SinkEvent::Record(header))
            }
            other => Err(ProtocolError::MalformedHeader {
                line: (other as char).to_string(),
                reason: "unknown record type",
            }),
        }
    }

    /// Permits the peer to send its next record.
    pub fn request_next(&mut self) -> Result<(), ProtocolError> {
        write_ok(&mut self.writer)
    }

    /// Requests and consumes one file body of exactly `size` bytes,
    /// piping it into `out`, then consumes the `0x00` terminator and acks.
    pub fn receive_body(&mut self, size: u64, out: &mut dyn Write) -> Result<(), ProtocolError> {
        self.request_next()?;
        let mut bounded = (&mut self.reader).take(size);
        let copied = io::copy(&mut bounded, out)?;
        if copied < size {
            return Err(ProtocolError::BodyTooShort {
                expected: size,
                actual: copied,
            });
        }
        self.finish_body()
    }

    /// Reads raw body bytes for a caller-paced body transfer.
    ///
    /// The caller is responsible for bounding reads to the declared size
    /// and for calling [`finish_body`](Self::finish_body) once exactly that
    /// many bytes have been consumed.
    pub fn read_body_chunk(&mut self, buf: &mut [u8]) -> Result<usize, ProtocolError> {
        loop {
            match self.reader.read(buf) {
                Ok(n) => return Ok(n),
                Err(error) if error.kind() == io::ErrorKind::Interrupted => continue,
                Err(error) => return Err(error.into()),
            }
        }
    }

    /// Consumes the end-of-body terminator and acknowledges the body.
    pub fn finish_body(&mut self) -> Result<(), ProtocolError> {
        let byte = read_type_byte(&mut self.reader)?.ok_or(ProtocolError::UnexpectedEof)?;
        if byte != REPLY_OK {
            return Err(ProtocolError::BadBodyTerminator { byte });
        }
        write_ok(&mut self.writer)
    }
}
