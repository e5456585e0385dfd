//! Sink-side driver: rebuilds a local tree from the incoming record
//! stream, and the lazy reader behind `recv_open`.

use std::fs;
use std::io::{self, BufRead, Read, Write};
use std::path::{Path, PathBuf};

use scp_metadata::{EntryInfo, TimePair, apply_mode, apply_times};
use scp_protocol::{Header, ProtocolError, SinkEvent, SinkProtocol};
use scp_transport::{ShellChannel, SinkSession};
use tracing::{debug, trace};

use crate::client::AcceptFn;
use crate::error::{ScpError, ScpResult, local_io};
use crate::send::consult;

/// Receives a single file body into `out`, returning its descriptor.
pub(crate) fn receive_single<R: BufRead, W: Write>(
    protocol: &mut SinkProtocol<R, W>,
    remote_path: &str,
    out: &mut dyn Write,
) -> ScpResult<EntryInfo> {
    let mut pending_time: Option<TimePair> = None;
    let mut received: Option<EntryInfo> = None;

    loop {
        match protocol.read_event()? {
            SinkEvent::Eof => break,
            SinkEvent::Ok => continue,
            SinkEvent::Record(Header::Time { mtime, atime }) => {
                if pending_time.is_some() {
                    return Err(ProtocolError::DanglingTime.into());
                }
                pending_time = Some(TimePair::from_wire(mtime, atime));
                protocol.request_next()?;
            }
            SinkEvent::Record(Header::File { mode, size, name }) => {
                let mut info = EntryInfo::file(name, size, mode)?;
                if let Some(times) = pending_time.take() {
                    info = info.with_times(times);
                }
                protocol.receive_body(size, out)?;
                received = Some(info);
            }
            SinkEvent::Record(other) => {
                return Err(ProtocolError::UnexpectedRecord {
                    record: other.kind_name(),
                }
                .into());
            }
        }
    }

    received.ok_or_else(|| ScpError::MissingFileHeader {
        path: remote_path.to_string(),
    })
}

/// Rebuilds a directory tree under `dest` from the incoming stream.
///
/// The driver mirrors the wire's nesting with `cur_dir` and a stack of
/// pending directory times applied when the matching `E` arrives. A
/// rejected directory marks its path as the skip base: every record below
/// it is consumed without local side effects (file bodies are drained to
/// keep the wire in sync) until the matching `E` ascends past it. When
/// `strip_first_dir` is set the very first `D` is consumed silently, along
/// with any pending time attached to it.
pub(crate) fn receive_tree<R: BufRead, W: Write>(
    protocol: &mut SinkProtocol<R, W>,
    dest: &Path,
    strip_first_dir: bool,
    mut accept: Option<AcceptFn<'_>>,
) -> ScpResult<()> {
    let mut cur_dir = dest.to_path_buf();
    let mut depth: usize = 0;
    let mut pending_time: Option<TimePair> = None;
    let mut dir_times: Vec<Option<TimePair>> = Vec::new();
    let mut first_dir = true;
    let mut skip_base: Option<PathBuf> = None;

    loop {
        match protocol.read_event()? {
            SinkEvent::Eof => break,
            SinkEvent::Ok => continue,
            SinkEvent::Record(Header::Time { mtime, atime }) => {
                if pending_time.is_some() {
                    return Err(ProtocolError::DanglingTime.into());
                }
                pending_time = Some(TimePair::from_wire(mtime, atime));
                protocol.request_next()?;
            }
            SinkEvent::Record(Header::DirStart { mode, name }) => {
                let time = pending_time.take();
                if first_dir {
                    first_dir = false;
                    if strip_first_dir {
                        trace!(name = %name, "stripping outer directory record");
                        protocol.request_next()?;
                        continue;
                    }
                }

                let parent = cur_dir.clone();
                cur_dir.push(&name);
                depth += 1;
                dir_times.push(time);

                if skip_base.is_none() {
                    let mut info = EntryInfo::directory(name, mode)?;
                    if let Some(times) = time {
                        info = info.with_times(times);
                    }
                    if consult(&mut accept, &parent, &info)? {
                        fs::create_dir_all(&cur_dir)
                            .map_err(|error| local_io("create directory", &cur_dir, error))?;
                        apply_mode(&cur_dir, info.mode())?;
                    } else {
                        debug!(dir = %cur_dir.display(), "directory rejected, skipping subtree");
                        skip_base = Some(cur_dir.clone());
                    }
                }
                protocol.request_next()?;
            }
            SinkEvent::Record(Header::DirEnd) => {
                if depth > 0 {
                    if let Some(times) = dir_times.pop().flatten() {
                        if skip_base.is_none() {
                            apply_times(&cur_dir, &times)?;
                        }
                    }
                    cur_dir.pop();
                    depth -= 1;
                    if let Some(base) = &skip_base {
                        if !cur_dir.starts_with(base) {
                            skip_base = None;
                        }
                    }
                }
                protocol.request_next()?;
            }
            SinkEvent::Record(Header::File { mode, size, name }) => {
                let time = pending_time.take();
                if skip_base.is_none() {
                    let mut info = EntryInfo::file(name, size, mode)?;
                    if let Some(times) = time {
                        info = info.with_times(times);
                    }
                    if consult(&mut accept, &cur_dir, &info)? {
                        let local = cur_dir.join(info.name());
                        receive_file(protocol, &local, &info)?;
                        continue;
                    }
                }
                // rejected or under a skipped subtree: the body still has
                // to be drained to keep the wire in sync
                protocol.receive_body(size, &mut io::sink())?;
            }
        }
    }
    Ok(())
}

/// Receives one file body into `local`, then applies mode and times.
fn receive_file<R: BufRead, W: Write>(
    protocol: &mut SinkProtocol<R, W>,
    local: &Path,
    info: &EntryInfo,
) -> ScpResult<()> {
    let mut options = fs::OpenOptions::new();
    options.read(true).write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(info.mode());
    }
    let mut file = options
        .open(local)
        .map_err(|error| local_io("open destination file", local, error))?;
    protocol.receive_body(info.size(), &mut file)?;
    drop(file);

    apply_mode(local, info.mode())?;
    if let Some(times) = info.times() {
        apply_times(local, times)?;
    }
    Ok(())
}

/// Bounded reader over a live sink session, returned by `recv_open`.
///
/// Reading to the declared size consumes the end-of-body terminator,
/// acknowledges the body, and waits for the remote to exit cleanly.
/// Dropping the stream earlier tears the channel down and discards
/// whatever the remote had left to say.
pub struct ScpReadStream<C: ShellChannel> {
    session: SinkSession<C>,
    remaining: u64,
    finished: bool,
}

impl<C: ShellChannel> ScpReadStream<C> {
    pub(crate) fn new(session: SinkSession<C>, size: u64) -> Self {
        Self {
            session,
            remaining: size,
            finished: false,
        }
    }

    /// Bytes of body not yet read.
    #[must_use]
    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    fn complete(&mut self) -> io::Result<()> {
        self.finished = true;
        self.session.protocol().finish_body().map_err(io::Error::from)?;
        self.session.finish().map_err(io::Error::other)?;
        Ok(())
    }
}

impl<C: ShellChannel> Read for ScpReadStream<C> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.finished || buf.is_empty() {
            return Ok(0);
        }
        if self.remaining == 0 {
            self.complete()?;
            return Ok(0);
        }
        let want = buf
            .len()
            .min(usize::try_from(self.remaining).unwrap_or(usize::MAX));
        let read = self
            .session
            .protocol()
            .read_body_chunk(&mut buf[..want])
            .map_err(io::Error::from)?;
        if read == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "remote closed the stream mid-body",
            ));
        }
        self.remaining -= read as u64;
        if self.remaining == 0 {
            self.complete()?;
        }
        Ok(read)
    }
}
