//! High-level client entry points.

use std::fs;
use std::io::{self, Read, Write};
use std::path::Path;

use scp_metadata::{EntryInfo, TimePair, apply_mode, apply_times};
use scp_protocol::{Header, ProtocolError, SinkEvent};
use scp_transport::{
    DEFAULT_SCP_PATH, Direction, ScpCommand, ShellChannelFactory, SinkSession,
    run_sink_session, run_source_session,
};
use tracing::debug;

use crate::error::{ScpError, ScpResult, local_io};
use crate::recv::{ScpReadStream, receive_single, receive_tree};
use crate::send::send_tree;

/// Caller-supplied filter invoked once per entry during recursive
/// transfers, with the entry's parent directory and its descriptor.
///
/// Returning `Ok(false)` for a directory skips its whole subtree;
/// returning an error aborts the transfer and is returned verbatim.
pub type AcceptFn<'a> = &'a mut dyn FnMut(&Path, &EntryInfo) -> io::Result<bool>;

/// The scp client: a thin facade over one shell-channel factory.
///
/// Every operation opens a fresh channel, runs a single remote `scp`
/// invocation over it, and releases the channel on every exit path. File
/// metadata (permission bits, modification and access times) is preserved
/// end-to-end.
pub struct Scp<F: ShellChannelFactory> {
    factory: F,
    scp_path: String,
}

impl<F: ShellChannelFactory> Scp<F> {
    /// Creates a client over the given channel factory.
    #[must_use]
    pub fn new(factory: F) -> Self {
        Self {
            factory,
            scp_path: String::from(DEFAULT_SCP_PATH),
        }
    }

    /// Overrides the remote scp program, e.g. `"sudo scp"`.
    pub fn set_scp_path(&mut self, path: impl Into<String>) -> &mut Self {
        self.scp_path = path.into();
        self
    }

    fn open_channel(&mut self) -> ScpResult<F::Channel> {
        self.factory.open_channel().map_err(ScpError::OpenChannel)
    }

    fn command(&self, direction: Direction, remote_path: &str) -> ScpCommand {
        let mut command = ScpCommand::new(direction, remote_path);
        command
            .set_scp_path(self.scp_path.clone())
            .set_preserve_times(true);
        command
    }

    /// Sends the bytes of `body` as the remote file `remote_path`,
    /// described by `info`. The descriptor's name is replaced by the
    /// remote basename when they differ.
    pub fn send_stream<R: Read>(
        &mut self,
        info: &EntryInfo,
        body: R,
        remote_path: &str,
    ) -> ScpResult<()> {
        let (dir, base) = split_remote(remote_path);
        let info = if info.name() == base {
            info.clone()
        } else {
            info.renamed(base)?
        };
        let mut command = self.command(Direction::ToRemote, &dir);
        command.set_target_is_dir(true);
        debug!(remote = remote_path, "sending stream");
        let channel = self.open_channel()?;
        run_source_session(channel, &command, |protocol| {
            protocol.write_file(&info, body).map_err(ScpError::from)
        })
    }

    /// Sends a single local file, preserving its metadata.
    pub fn send_file(&mut self, local_path: &Path, remote_path: &str) -> ScpResult<()> {
        let (dir, base) = split_remote(remote_path);
        let metadata = fs::metadata(local_path)
            .map_err(|error| local_io("stat source file", local_path, error))?;
        if metadata.is_dir() {
            return Err(ProtocolError::NotAFile { name: base }.into());
        }
        let info = EntryInfo::from_fs_metadata(base, &metadata)?;
        let file = fs::File::open(local_path)
            .map_err(|error| local_io("open source file", local_path, error))?;

        let mut command = self.command(Direction::ToRemote, &dir);
        command.set_target_is_dir(true);
        debug!(local = %local_path.display(), remote = remote_path, "sending file");
        let channel = self.open_channel()?;
        run_source_session(channel, &command, |protocol| {
            protocol.write_file(&info, file).map_err(ScpError::from)
        })
    }

    /// Recursively sends a local directory.
    ///
    /// A trailing separator on `remote_dir` selects contents-only mode:
    /// `"/backup/"` spreads the contents of `local_dir` directly into
    /// `/backup`, while `"/backup"` recreates the source directory itself
    /// underneath it.
    pub fn send_dir(
        &mut self,
        local_dir: &Path,
        remote_dir: &str,
        accept: Option<AcceptFn<'_>>,
    ) -> ScpResult<()> {
        let contents_only = remote_dir.len() > 1 && remote_dir.ends_with('/');
        let target = trim_trailing_slashes(remote_dir);
        let mut command = self.command(Direction::ToRemote, target);
        command.set_recursive(true).set_target_is_dir(true);
        debug!(
            local = %local_dir.display(),
            remote = target,
            contents_only,
            "sending directory"
        );
        let channel = self.open_channel()?;
        run_source_session(channel, &command, |protocol| {
            send_tree(protocol, local_dir, !contents_only, accept)
        })
    }

    /// Receives a single remote file into `out`, returning its descriptor.
    pub fn recv_to_writer(&mut self, remote_path: &str, out: &mut dyn Write) -> ScpResult<EntryInfo> {
        let command = self.command(Direction::FromRemote, remote_path);
        debug!(remote = remote_path, "receiving to writer");
        let channel = self.open_channel()?;
        run_sink_session(channel, &command, |protocol| {
            receive_single(protocol, remote_path, out)
        })
    }

    /// Opens a single remote file for caller-paced reading.
    ///
    /// The returned stream yields exactly the declared number of body
    /// bytes; reading them all waits for a clean remote exit, and dropping
    /// the stream earlier tears the channel down without writing anything
    /// locally.
    pub fn recv_open(
        &mut self,
        remote_path: &str,
    ) -> ScpResult<(ScpReadStream<F::Channel>, EntryInfo)> {
        let command = self.command(Direction::FromRemote, remote_path);
        debug!(remote = remote_path, "opening remote file");
        let channel = self.open_channel()?;
        let mut session = SinkSession::open(channel, &command)?;

        let mut pending_time: Option<TimePair> = None;
        loop {
            match session.protocol().read_event()? {
                SinkEvent::Eof => {
                    return Err(ScpError::MissingFileHeader {
                        path: remote_path.to_string(),
                    });
                }
                SinkEvent::Ok => continue,
                SinkEvent::Record(Header::Time { mtime, atime }) => {
                    if pending_time.is_some() {
                        return Err(ProtocolError::DanglingTime.into());
                    }
                    pending_time = Some(TimePair::from_wire(mtime, atime));
                    session.protocol().request_next()?;
                }
                SinkEvent::Record(Header::File { mode, size, name }) => {
                    let mut info = EntryInfo::file(name, size, mode)?;
                    if let Some(times) = pending_time.take() {
                        info = info.with_times(times);
                    }
                    // ack the header so the peer starts streaming the body
                    session.protocol().request_next()?;
                    return Ok((ScpReadStream::new(session, size), info));
                }
                SinkEvent::Record(other) => {
                    return Err(ProtocolError::UnexpectedRecord {
                        record: other.kind_name(),
                    }
                    .into());
                }
            }
        }
    }

    /// Receives a single remote file to `local_path`, applying the remote
    /// metadata. When `local_path` is an existing directory the file is
    /// placed inside it under the remote basename.
    pub fn recv_file(&mut self, remote_path: &str, local_path: &Path) -> ScpResult<()> {
        let mut dest = local_path.to_path_buf();
        match fs::metadata(&dest) {
            Ok(metadata) if metadata.is_dir() => {
                dest.push(remote_basename(remote_path));
            }
            Ok(_) => {}
            Err(error) if error.kind() == io::ErrorKind::NotFound => {}
            Err(error) => return Err(local_io("stat destination", &dest, error)),
        }

        let mut file = fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&dest)
            .map_err(|error| local_io("open destination file", &dest, error))?;
        let command = self.command(Direction::FromRemote, remote_path);
        debug!(remote = remote_path, local = %dest.display(), "receiving file");
        let channel = self.open_channel()?;
        let info = run_sink_session(channel, &command, |protocol| {
            receive_single(protocol, remote_path, &mut file)
        })?;
        drop(file);

        apply_mode(&dest, info.mode())?;
        if let Some(times) = info.times() {
            apply_times(&dest, times)?;
        }
        Ok(())
    }

    /// Recursively receives a remote directory under `local_dir`.
    ///
    /// When `local_dir` does not exist it is created and the remote tree's
    /// outer directory is stripped, so the contents land directly inside
    /// it; when it exists the remote tree is placed underneath it as
    /// `local_dir/<remote-basename>`.
    pub fn recv_dir(
        &mut self,
        remote_dir: &str,
        local_dir: &Path,
        accept: Option<AcceptFn<'_>>,
    ) -> ScpResult<()> {
        let strip_first_dir = match fs::metadata(local_dir) {
            Ok(metadata) if metadata.is_dir() => false,
            Ok(_) => {
                return Err(local_io(
                    "use destination directory",
                    local_dir,
                    io::Error::new(
                        io::ErrorKind::InvalidInput,
                        "destination exists and is not a directory",
                    ),
                ));
            }
            Err(error) if error.kind() == io::ErrorKind::NotFound => {
                fs::create_dir_all(local_dir)
                    .map_err(|error| local_io("create destination directory", local_dir, error))?;
                true
            }
            Err(error) => return Err(local_io("stat destination directory", local_dir, error)),
        };

        let mut command = self.command(Direction::FromRemote, remote_dir);
        command.set_recursive(true);
        debug!(
            remote = remote_dir,
            local = %local_dir.display(),
            strip_first_dir,
            "receiving directory"
        );
        let channel = self.open_channel()?;
        run_sink_session(channel, &command, |protocol| {
            receive_tree(protocol, local_dir, strip_first_dir, accept)
        })
    }
}

/// Splits a remote POSIX path into `(directory, basename)`.
fn split_remote(path: &str) -> (String, String) {
    let trimmed = trim_trailing_slashes(path);
    match trimmed.rfind('/') {
        Some(0) => (String::from("/"), trimmed[1..].to_string()),
        Some(index) => (trimmed[..index].to_string(), trimmed[index + 1..].to_string()),
        None => (String::from("."), trimmed.to_string()),
    }
}

fn remote_basename(path: &str) -> String {
    split_remote(path).1
}

fn trim_trailing_slashes(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() { "/" } else { trimmed }
}
