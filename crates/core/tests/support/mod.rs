//! In-process scp peer for the loopback tests.
//!
//! [`LoopbackChannel`] implements the shell-channel contract over a pair
//! of loopback TCP streams. Its `start` parses the rendered command line
//! the way a remote shell would, then serves the requested `scp -t` or
//! `scp -f` role from a background thread against a local directory.

#![allow(dead_code)]

use std::fs;
use std::io::{self, BufRead, BufReader, Read, Write};
use std::net::{Ipv4Addr, Shutdown, TcpListener, TcpStream};
use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};

use filetime::FileTime;
use scp_transport::{ChannelExit, ChannelReader, ChannelWriter, ShellChannel, ShellChannelFactory};

pub fn tcp_pair() -> io::Result<(TcpStream, TcpStream)> {
    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0))?;
    let address = listener.local_addr()?;
    let client = TcpStream::connect(address)?;
    let (server, _) = listener.accept()?;
    Ok((client, server))
}

/// Write half that shuts the socket's write direction down on drop, so the
/// peer observes end-of-file exactly like a closed stdin.
pub struct WriteHalf(TcpStream);

impl Write for WriteHalf {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.flush()
    }
}

impl Drop for WriteHalf {
    fn drop(&mut self) {
        let _ = self.0.shutdown(Shutdown::Write);
    }
}

#[derive(Clone, Debug)]
pub struct PeerCommand {
    pub to_remote: bool,
    pub preserve: bool,
    pub recursive: bool,
    pub dir_target: bool,
    pub path: PathBuf,
}

pub fn parse_scp_command(command: &str) -> Option<PeerCommand> {
    let rest = command.strip_prefix("scp -")?;
    let (flags, quoted) = rest.split_once(' ')?;
    let to_remote = flags.contains('t');
    if to_remote == flags.contains('f') {
        return None;
    }
    Some(PeerCommand {
        to_remote,
        preserve: flags.contains('p'),
        recursive: flags.contains('r'),
        dir_target: flags.contains('d'),
        path: PathBuf::from(unquote(quoted)?),
    })
}

fn unquote(quoted: &str) -> Option<String> {
    let inner = quoted.strip_prefix('\'')?.strip_suffix('\'')?;
    Some(inner.replace("'\\''", "'"))
}

/// Factory handing out loopback channels; the "remote" filesystem is the
/// local one, so tests point remote paths into temp directories.
pub struct LoopbackFactory;

impl ShellChannelFactory for LoopbackFactory {
    type Channel = LoopbackChannel;

    fn open_channel(&mut self) -> io::Result<Self::Channel> {
        Ok(LoopbackChannel {
            stream: None,
            peer: None,
        })
    }
}

pub struct LoopbackChannel {
    stream: Option<TcpStream>,
    peer: Option<JoinHandle<i32>>,
}

impl ShellChannel for LoopbackChannel {
    fn start(&mut self, command: &str) -> io::Result<()> {
        let parsed = parse_scp_command(command).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("unparseable scp command: {command}"),
            )
        })?;
        let (local, remote) = tcp_pair()?;
        self.peer = Some(thread::spawn(move || serve_peer(&parsed, remote)));
        self.stream = Some(local);
        Ok(())
    }

    fn stdin(&mut self) -> io::Result<ChannelWriter> {
        let stream = self.stream.as_ref().ok_or_else(not_started)?;
        Ok(Box::new(WriteHalf(stream.try_clone()?)))
    }

    fn stdout(&mut self) -> io::Result<ChannelReader> {
        let stream = self.stream.as_ref().ok_or_else(not_started)?;
        Ok(Box::new(stream.try_clone()?))
    }

    fn wait(&mut self) -> io::Result<ChannelExit> {
        let handle = self.peer.take().ok_or_else(not_started)?;
        let code = handle
            .join()
            .map_err(|_| io::Error::other("scp peer panicked"))?;
        Ok(ChannelExit::new(Some(code)))
    }

    fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(Shutdown::Both);
        }
        // a still-running peer thread exits on its own once the socket dies
        self.peer.take();
    }
}

fn not_started() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "loopback channel not started")
}

fn serve_peer(command: &PeerCommand, stream: TcpStream) -> i32 {
    let result = if command.to_remote {
        serve_sink(command, stream)
    } else {
        serve_source(command, stream)
    };
    result.unwrap_or(1)
}

// ---------------------------------------------------------------------
// Remote `scp -t`: consume records, write the local tree, ack everything.
// ---------------------------------------------------------------------

fn serve_sink(command: &PeerCommand, stream: TcpStream) -> io::Result<i32> {
    let mut reader = BufReader::new(stream.try_clone()?);
    let mut writer = stream;

    if command.dir_target {
        fs::create_dir_all(&command.path)?;
    }
    send_ok(&mut writer)?;

    let mut cur_dir = command.path.clone();
    let mut depth = 0usize;
    let mut pending: Option<(FileTime, FileTime)> = None;
    let mut dir_times: Vec<Option<(FileTime, FileTime)>> = Vec::new();

    loop {
        let Some(kind) = read_byte(&mut reader)? else {
            return Ok(0);
        };
        match kind {
            b'T' => {
                let line = read_line(&mut reader)?;
                pending = Some(parse_times(&line)?);
                send_ok(&mut writer)?;
            }
            b'C' => {
                let line = read_line(&mut reader)?;
                let (mode, size, name) = parse_entry(&line)?;
                let dest = if command.dir_target || depth > 0 {
                    cur_dir.join(&name)
                } else {
                    cur_dir.clone()
                };
                send_ok(&mut writer)?;

                let mut file = open_with_mode(&dest, mode)?;
                io::copy(&mut (&mut reader).take(size), &mut file)?;
                drop(file);
                let terminator = read_byte(&mut reader)?.ok_or(io::ErrorKind::UnexpectedEof)?;
                if terminator != 0 {
                    send_fatal(&mut writer, "protocol error: bad body terminator")?;
                    return Ok(1);
                }
                set_mode(&dest, mode)?;
                if let Some((mtime, atime)) = pending.take() {
                    filetime::set_file_times(&dest, atime, mtime)?;
                }
                send_ok(&mut writer)?;
            }
            b'D' => {
                let line = read_line(&mut reader)?;
                let (mode, _size, name) = parse_entry(&line)?;
                cur_dir.push(&name);
                depth += 1;
                fs::create_dir_all(&cur_dir)?;
                set_mode(&cur_dir, mode)?;
                dir_times.push(pending.take());
                send_ok(&mut writer)?;
            }
            b'E' => {
                let _ = read_line(&mut reader)?;
                if depth == 0 {
                    send_fatal(&mut writer, "protocol error: unexpected E")?;
                    return Ok(1);
                }
                if let Some(Some((mtime, atime))) = dir_times.pop() {
                    filetime::set_file_times(&cur_dir, atime, mtime)?;
                }
                cur_dir.pop();
                depth -= 1;
                send_ok(&mut writer)?;
            }
            0x00 => {}
            _ => {
                send_fatal(&mut writer, "protocol error: unknown record")?;
                return Ok(1);
            }
        }
    }
}

// ---------------------------------------------------------------------
// Remote `scp -f`: walk the local tree and produce records.
// ---------------------------------------------------------------------

fn serve_source(command: &PeerCommand, stream: TcpStream) -> io::Result<i32> {
    let mut reader = BufReader::new(stream.try_clone()?);
    let mut writer = stream;

    read_ok(&mut reader)?;
    let metadata = match fs::metadata(&command.path) {
        Ok(metadata) => metadata,
        Err(_) => {
            send_fatal(&mut writer, "No such file")?;
            return Ok(1);
        }
    };
    if metadata.is_dir() {
        if !command.recursive {
            send_fatal(&mut writer, "not a regular file")?;
            return Ok(1);
        }
        emit_dir(&mut reader, &mut writer, &command.path, command.preserve)?;
    } else {
        emit_file(
            &mut reader,
            &mut writer,
            &command.path,
            &metadata,
            command.preserve,
        )?;
    }
    Ok(0)
}

fn emit_times<R: BufRead, W: Write>(
    reader: &mut R,
    writer: &mut W,
    metadata: &fs::Metadata,
) -> io::Result<()> {
    let mtime = FileTime::from_last_modification_time(metadata);
    let atime = FileTime::from_last_access_time(metadata);
    writeln!(
        writer,
        "T{} {} {} {}",
        mtime.unix_seconds(),
        mtime.nanoseconds() / 1_000,
        atime.unix_seconds(),
        atime.nanoseconds() / 1_000
    )?;
    read_ok(reader)
}

fn emit_file<R: BufRead, W: Write>(
    reader: &mut R,
    writer: &mut W,
    path: &Path,
    metadata: &fs::Metadata,
    preserve: bool,
) -> io::Result<()> {
    if preserve {
        emit_times(reader, writer, metadata)?;
    }
    let name = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or(io::ErrorKind::InvalidData)?;
    writeln!(writer, "C{:04o} {} {}", peer_mode(metadata), metadata.len(), name)?;
    read_ok(reader)?;
    let mut file = fs::File::open(path)?;
    io::copy(&mut file, writer)?;
    writer.write_all(&[0x00])?;
    writer.flush()?;
    read_ok(reader)
}

fn emit_dir<R: BufRead, W: Write>(
    reader: &mut R,
    writer: &mut W,
    path: &Path,
    preserve: bool,
) -> io::Result<()> {
    let metadata = fs::metadata(path)?;
    if preserve {
        emit_times(reader, writer, &metadata)?;
    }
    let name = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or(io::ErrorKind::InvalidData)?;
    writeln!(writer, "D{:04o} 0 {}", peer_mode(&metadata), name)?;
    read_ok(reader)?;

    let mut names: Vec<_> = fs::read_dir(path)?
        .collect::<Result<Vec<_>, _>>()?
        .into_iter()
        .map(|entry| entry.file_name())
        .collect();
    names.sort();
    for child_name in names {
        let child = path.join(&child_name);
        let child_metadata = fs::metadata(&child)?;
        if child_metadata.is_dir() {
            emit_dir(reader, writer, &child, preserve)?;
        } else {
            emit_file(reader, writer, &child, &child_metadata, preserve)?;
        }
    }

    writeln!(writer, "E")?;
    writer.flush()?;
    read_ok(reader)
}

// ---------------------------------------------------------------------
// Shared helpers.
// ---------------------------------------------------------------------

fn read_byte<R: BufRead>(reader: &mut R) -> io::Result<Option<u8>> {
    let mut byte = [0u8; 1];
    match reader.read(&mut byte)? {
        0 => Ok(None),
        _ => Ok(Some(byte[0])),
    }
}

fn read_line<R: BufRead>(reader: &mut R) -> io::Result<String> {
    let mut line = Vec::new();
    reader.read_until(b'\n', &mut line)?;
    if line.last() != Some(&b'\n') {
        return Err(io::ErrorKind::UnexpectedEof.into());
    }
    line.pop();
    String::from_utf8(line).map_err(|_| io::ErrorKind::InvalidData.into())
}

fn parse_entry(line: &str) -> io::Result<(u32, u64, String)> {
    let mut fields = line.splitn(3, ' ');
    let mode = fields
        .next()
        .and_then(|field| u32::from_str_radix(field, 8).ok())
        .ok_or(io::ErrorKind::InvalidData)?;
    let size = fields
        .next()
        .and_then(|field| field.parse::<u64>().ok())
        .ok_or(io::ErrorKind::InvalidData)?;
    let name = fields.next().ok_or(io::ErrorKind::InvalidData)?;
    if name.is_empty() || name.contains('/') {
        return Err(io::ErrorKind::InvalidData.into());
    }
    Ok((mode, size, name.to_string()))
}

fn parse_times(line: &str) -> io::Result<(FileTime, FileTime)> {
    let fields: Vec<i64> = line
        .split(' ')
        .map(|field| field.parse::<i64>())
        .collect::<Result<_, _>>()
        .map_err(|_| io::Error::from(io::ErrorKind::InvalidData))?;
    if fields.len() != 4 {
        return Err(io::ErrorKind::InvalidData.into());
    }
    let mtime = FileTime::from_unix_time(fields[0], (fields[1] * 1_000) as u32);
    let atime = FileTime::from_unix_time(fields[2], (fields[3] * 1_000) as u32);
    Ok((mtime, atime))
}

fn peer_mode(metadata: &fs::Metadata) -> u32 {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        metadata.permissions().mode() & 0o777
    }

    #[cfg(not(unix))]
    {
        if metadata.is_dir() { 0o755 } else { 0o644 }
    }
}

fn send_ok<W: Write>(writer: &mut W) -> io::Result<()> {
    writer.write_all(&[0x00])?;
    writer.flush()
}

fn send_fatal<W: Write>(writer: &mut W, message: &str) -> io::Result<()> {
    writer.write_all(&[0x02])?;
    writer.write_all(message.as_bytes())?;
    writer.write_all(b"\n")?;
    writer.flush()
}

fn read_ok<R: BufRead>(reader: &mut R) -> io::Result<()> {
    match read_byte(reader)? {
        Some(0x00) => Ok(()),
        Some(byte) => Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("peer expected ack, got {byte:#04x}"),
        )),
        None => Err(io::ErrorKind::UnexpectedEof.into()),
    }
}

fn open_with_mode(path: &Path, mode: u32) -> io::Result<fs::File> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(mode);
    }
    #[cfg(not(unix))]
    let _ = mode;
    options.open(path)
}

fn set_mode(path: &Path, mode: u32) -> io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(mode & 0o777))?;
    }
    #[cfg(not(unix))]
    {
        let _ = (path, mode);
    }
    Ok(())
}
