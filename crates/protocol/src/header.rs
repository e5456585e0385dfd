//! Codec for the `C`, `D`, `E`, and `T` control records.
//!
//! Records are ASCII lines terminated by a line feed. The grammar is:
//!
//! ```text
//! C<mode> <size> <name>\n        file
//! D<mode> 0 <name>\n             directory start
//! E\n                            directory end
//! T<ms> <mu> <as> <au>\n         times for the next entity
//! ```
//!
//! Mode fields are four octal digits with a leading zero; names run to the
//! end of the line and are transmitted verbatim, so they must be basenames
//! containing neither `/` nor a newline.

use std::io::{BufRead, Write};

use scp_metadata::WireTime;

use crate::error::ProtocolError;

pub(crate) const MSG_FILE: u8 = b'C';
pub(crate) const MSG_DIR_START: u8 = b'D';
pub(crate) const MSG_DIR_END: u8 = b'E';
pub(crate) const MSG_TIME: u8 = b'T';

/// One scp control record.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Header {
    /// `C`: a regular file follows, with `size` body bytes after the ack.
    File {
        /// Nine permission bits.
        mode: u32,
        /// Body length in bytes.
        size: u64,
        /// Basename of the file.
        name: String,
    },
    /// `D`: descend into a directory until the matching [`Header::DirEnd`].
    DirStart {
        /// Nine permission bits.
        mode: u32,
        /// Basename of the directory.
        name: String,
    },
    /// `E`: ascend out of the most recent [`Header::DirStart`].
    DirEnd,
    /// `T`: times to apply to the next file or directory record.
    Time {
        /// Modification time.
        mtime: WireTime,
        /// Access time.
        atime: WireTime,
    },
}

impl Header {
    /// Human-readable record kind, used in error messages.
    #[must_use]
    pub const fn kind_name(&self) -> &'static str {
        match self {
            Self::File { .. } => "file",
            Self::DirStart { .. } => "directory-start",
            Self::DirEnd => "directory-end",
            Self::Time { .. } => "time",
        }
    }
}

fn validate_name(name: &str) -> Result<(), ProtocolError> {
    let reason = if name.is_empty() {
        Some("empty name")
    } else if name.contains('/') {
        Some("name contains a path separator")
    } else if name.contains('\n') {
        Some("name contains a newline")
    } else if name == "." || name == ".." {
        Some("name is a relative path component")
    } else {
        None
    };
    match reason {
        Some(reason) => Err(ProtocolError::MalformedHeader {
            line: name.to_string(),
            reason,
        }),
        None => Ok(()),
    }
}

/// Formats and emits one record, flushing it to the peer.
pub fn write_header<W: Write>(writer: &mut W, header: &Header) -> Result<(), ProtocolError> {
    match header {
        Header::File { mode, size, name } => {
            validate_name(name)?;
            writeln!(writer, "C{:04o} {} {}", mode & 0o777, size, name)?;
        }
        Header::DirStart { mode, name } => {
            validate_name(name)?;
            writeln!(writer, "D{:04o} 0 {}", mode & 0o777, name)?;
        }
        Header::DirEnd => writeln!(writer, "E")?,
        Header::Time { mtime, atime } => {
            writeln!(
                writer,
                "T{} {} {} {}",
                mtime.seconds(),
                mtime.microseconds(),
                atime.seconds(),
                atime.microseconds()
            )?;
        }
    }
    writer.flush()?;
    Ok(())
}

/// Reads the remainder of a record line, stripping the terminator.
pub(crate) fn read_record_line<R: BufRead>(reader: &mut R) -> Result<Vec<u8>, ProtocolError> {
    let mut line = Vec::new();
    reader.read_until(b'\n', &mut line)?;
    if line.last() != Some(&b'\n') {
        return Err(ProtocolError::UnexpectedEof);
    }
    line.pop();
    Ok(line)
}

fn malformed(line: &[u8], reason: &'static str) -> ProtocolError {
    ProtocolError::MalformedHeader {
        line: String::from_utf8_lossy(line).into_owned(),
        reason,
    }
}

fn split_field<'a>(rest: &mut &'a str) -> Option<&'a str> {
    let (field, tail) = rest.split_once(' ')?;
    *rest = tail;
    Some(field)
}

fn parse_mode(field: &str, line: &[u8]) -> Result<u32, ProtocolError> {
    if field.is_empty() || !field.bytes().all(|b| b.is_ascii_digit() && b < b'8') {
        return Err(malformed(line, "mode is not octal"));
    }
    u32::from_str_radix(field, 8).map_err(|_| malformed(line, "mode is not octal"))
}

fn parse_entry_line(line: &[u8]) -> Result<(u32, u64, String), ProtocolError> {
    let text = std::str::from_utf8(line).map_err(|_| malformed(line, "record is not UTF-8"))?;
    let mut rest = text;
    let mode_field = split_field(&mut rest).ok_or_else(|| malformed(line, "missing size field"))?;
    let size_field = split_field(&mut rest).ok_or_else(|| malformed(line, "missing name field"))?;

    let mode = parse_mode(mode_field, line)?;
    let size = size_field
        .parse::<u64>()
        .map_err(|_| malformed(line, "size is not decimal"))?;
    let name = rest.to_string();
    validate_name(&name).map_err(|_| malformed(line, "invalid name"))?;
    Ok((mode, size, name))
}

fn parse_time_line(line: &[u8]) -> Result<(WireTime, WireTime), ProtocolError> {
    let text = std::str::from_utf8(line).map_err(|_| malformed(line, "record is not UTF-8"))?;
    let fields: Vec<&str> = text.split(' ').collect();
    if fields.len() != 4 {
        return Err(malformed(line, "expected four time fields"));
    }
    let mut parsed = [0u64; 4];
    for (slot, field) in parsed.iter_mut().zip(&fields) {
        *slot = field
            .parse::<u64>()
            .map_err(|_| malformed(line, "time field is not decimal"))?;
    }
    let wire = |seconds: u64, micros: u64| {
        u32::try_from(micros)
            .ok()
            .and_then(|micros| WireTime::new(seconds, micros))
            .ok_or_else(|| malformed(line, "microseconds out of range"))
    };
    Ok((wire(parsed[0], parsed[1])?, wire(parsed[2], parsed[3])?))
}

/// Parses one record from its type byte and the rest of its line.
pub(crate) fn parse_record(kind: u8, line: &[u8]) -> Result<Header, ProtocolError> {
    match kind {
        MSG_FILE => {
            let (mode, size, name) = parse_entry_line(line)?;
            Ok(Header::File { mode, size, name })
        }
        MSG_DIR_START => {
            let (mode, _size, name) = parse_entry_line(line)?;
            Ok(Header::DirStart { mode, name })
        }
        MSG_DIR_END => {
            if line.is_empty() {
                Ok(Header::DirEnd)
            } else {
                Err(malformed(line, "directory end carries fields"))
            }
        }
        MSG_TIME => {
            let (mtime, atime) = parse_time_line(line)?;
            Ok(Header::Time { mtime, atime })
        }
        other => Err(malformed(&[other], "unknown record type")),
    }
}
