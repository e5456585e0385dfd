//! Sending state machine, driving a remote `scp -t` process.

use std::io::{self, BufRead, Read, Write};

use scp_metadata::{EntryInfo, EntryKind};
use tracing::trace;

use crate::error::ProtocolError;
use crate::header::{Header, write_header};
use crate::reply::{REPLY_OK, expect_ok};

/// Drives the sending half of an scp conversation.
///
/// The peer acknowledges the opening of the session and every record
/// boundary; any warning or fatal reply aborts the transfer. The type
/// tracks the directory nesting it has announced so that every `D` record
/// is balanced by an `E` before the session closes.
#[derive(Debug)]
pub struct SourceProtocol<R, W> {
    reader: R,
    writer: W,
    open_dirs: Vec<String>,
}

impl<R: BufRead, W: Write> SourceProtocol<R, W> {
    /// Performs the opening handshake: the remote sink speaks first with
    /// one reply, and anything but OK aborts.
    pub fn open(mut reader: R, writer: W) -> Result<Self, ProtocolError> {
        expect_ok(&mut reader)?;
        Ok(Self {
            reader,
            writer,
            open_dirs: Vec::new(),
        })
    }

    /// Sends one regular file: optional `T`, the `C` header, exactly
    /// `info.size()` body bytes, the `0x00` terminator, and the final ack.
    ///
    /// The body value is consumed on every path, so underlying handles are
    /// released whether or not the transfer succeeds. A body that yields
    /// fewer or more bytes than declared fails the transfer; the protocol
    /// has no way to resynchronise after a length mismatch.
    pub fn write_file<B: Read>(&mut self, info: &EntryInfo, body: B) -> Result<(), ProtocolError> {
        if info.kind() != EntryKind::File {
            return Err(ProtocolError::NotAFile {
                name: info.name().to_string(),
            });
        }
        self.send_times(info)?;
        trace!(name = info.name(), size = info.size(), "sending file");
        write_header(
            &mut self.writer,
            &Header::File {
                mode: info.mode(),
                size: info.size(),
                name: info.name().to_string(),
            },
        )?;
        expect_ok(&mut self.reader)?;

        let size = info.size();
        let mut bounded = body.take(size);
        let copied = io::copy(&mut bounded, &mut self.writer)?;
        if copied < size {
            return Err(ProtocolError::BodyTooShort {
                expected: size,
                actual: copied,
            });
        }
        let mut body = bounded.into_inner();
        let mut probe = [0u8; 1];
        if read_one(&mut body, &mut probe)? > 0 {
            return Err(ProtocolError::BodyTooLong { declared: size });
        }
        drop(body);

        self.writer.write_all(&[REPLY_OK])?;
        self.writer.flush()?;
        expect_ok(&mut self.reader)
    }

    /// Announces a directory: optional `T`, then the `D` header.
    pub fn start_directory(&mut self, info: &EntryInfo) -> Result<(), ProtocolError> {
        if info.kind() != EntryKind::Directory {
            return Err(ProtocolError::NotADirectory {
                name: info.name().to_string(),
            });
        }
        self.send_times(info)?;
        trace!(name = info.name(), depth = self.open_dirs.len(), "entering directory");
        write_header(
            &mut self.writer,
            &Header::DirStart {
                mode: info.mode(),
                name: info.name().to_string(),
            },
        )?;
        expect_ok(&mut self.reader)?;
        self.open_dirs.push(info.name().to_string());
        Ok(())
    }

    /// Closes the most recently announced directory with an `E` record.
    pub fn end_directory(&mut self) -> Result<(), ProtocolError> {
        let name = self
            .open_dirs
            .pop()
            .ok_or(ProtocolError::UnbalancedDirectoryEnd)?;
        trace!(name = %name, depth = self.open_dirs.len(), "leaving directory");
        write_header(&mut self.writer, &Header::DirEnd)?;
        expect_ok(&mut self.reader)
    }

    /// Number of `D` records not yet balanced by an `E`.
    #[must_use]
    pub fn open_directories(&self) -> usize {
        self.open_dirs.len()
    }

    fn send_times(&mut self, info: &EntryInfo) -> Result<(), ProtocolError> {
        let Some(times) = info.times() else {
            return Ok(());
        };
        let (mtime, atime) = times.to_wire();
        write_header(&mut self.writer, &Header::Time { mtime, atime })?;
        expect_ok(&mut self.reader)
    }
}

fn read_one<R: Read>(reader: &mut R, buf: &mut [u8; 1]) -> Result<usize, ProtocolError> {
    loop {
        match reader.read(buf) {
            Ok(n) => return Ok(n),
            Err(error) if error.kind() == io::ErrorKind::Interrupted => continue,
            Err(error) => return Err(error.into()),
        }
    }
}
