//! Session harnesses binding a channel's stdio to a protocol object.

use std::io::{self, BufReader};

use scp_protocol::{ProtocolError, SinkProtocol, SourceProtocol};
use thiserror::Error;
use tracing::debug;

use crate::channel::{ChannelExit, ChannelReader, ChannelWriter, ShellChannel};
use crate::command::ScpCommand;

/// The source protocol as a session instantiates it.
pub type ChannelSourceProtocol = SourceProtocol<BufReader<ChannelReader>, ChannelWriter>;

/// The sink protocol as a session instantiates it.
pub type ChannelSinkProtocol = SinkProtocol<BufReader<ChannelReader>, ChannelWriter>;

/// Errors raised while running one remote scp session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The remote command could not be started.
    #[error("failed to start remote command: {0}")]
    Start(#[source] io::Error),
    /// The channel did not expose the stdio streams.
    #[error("failed to bind channel streams: {0}")]
    Stream(#[source] io::Error),
    /// The wire conversation failed.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    /// Waiting for the remote command failed locally.
    #[error("failed to wait for remote command: {0}")]
    Wait(#[source] io::Error),
    /// The remote command finished with a non-zero status.
    #[error("remote scp exited with {0}")]
    RemoteExit(ChannelExit),
}

/// A live conversation with a remote `scp -t` process.
///
/// The session owns the channel for its whole lifetime and closes it on
/// every exit path, including panics.
pub struct SourceSession<C: ShellChannel> {
    channel: C,
    protocol: Option<ChannelSourceProtocol>,
}

impl<C: ShellChannel> SourceSession<C> {
    /// Starts the rendered command and performs the opening handshake.
    pub fn open(channel: C, command: &ScpCommand) -> Result<Self, SessionError> {
        let mut session = Self {
            channel,
            protocol: None,
        };
        let rendered = command.render();
        debug!(command = %rendered, "opening source session");
        session.channel.start(&rendered).map_err(SessionError::Start)?;
        let stdout = session.channel.stdout().map_err(SessionError::Stream)?;
        let stdin = session.channel.stdin().map_err(SessionError::Stream)?;
        session.protocol = Some(SourceProtocol::open(BufReader::new(stdout), stdin)?);
        Ok(session)
    }

    /// Returns the protocol driving this session.
    ///
    /// # Panics
    ///
    /// Panics when called after [`finish`](Self::finish).
    pub fn protocol(&mut self) -> &mut ChannelSourceProtocol {
        self.protocol.as_mut().expect("session already finished")
    }

    /// Ends the transfer: closes the remote stdin, waits for the remote to
    /// exit, and fails on a non-zero status.
    pub fn finish(&mut self) -> Result<ChannelExit, SessionError> {
        self.protocol = None;
        let exit = self.channel.wait().map_err(SessionError::Wait)?;
        debug!(%exit, "source session finished");
        if exit.success() {
            Ok(exit)
        } else {
            Err(SessionError::RemoteExit(exit))
        }
    }
}

impl<C: ShellChannel> Drop for SourceSession<C> {
    fn drop(&mut self) {
        self.protocol = None;
        self.channel.close();
    }
}

/// A live conversation with a remote `scp -f` process.
pub struct SinkSession<C: ShellChannel> {
    channel: C,
    protocol: Option<ChannelSinkProtocol>,
}

impl<C: ShellChannel> SinkSession<C> {
    /// Starts the rendered command and announces readiness to the remote.
    pub fn open(channel: C, command: &ScpCommand) -> Result<Self, SessionError> {
        let mut session = Self {
            channel,
            protocol: None,
        };
        let rendered = command.render();
        debug!(command = %rendered, "opening sink session");
        session.channel.start(&rendered).map_err(SessionError::Start)?;
        let stdout = session.channel.stdout().map_err(SessionError::Stream)?;
        let stdin = session.channel.stdin().map_err(SessionError::Stream)?;
        session.protocol = Some(SinkProtocol::open(BufReader::new(stdout), stdin)?);
        Ok(session)
    }

    /// Returns the protocol driving this session.
    ///
    /// # Panics
    ///
    /// Panics when called after [`finish`](Self::finish).
    pub fn protocol(&mut self) -> &mut ChannelSinkProtocol {
        self.protocol.as_mut().expect("session already finished")
    }

    /// Waits for the remote to exit and fails on a non-zero status.
    /// Closing stdin is not required on the sink side; dropping the
    /// protocol simply releases the streams.
    pub fn finish(&mut self) -> Result<ChannelExit, SessionError> {
        self.protocol = None;
        let exit = self.channel.wait().map_err(SessionError::Wait)?;
        debug!(%exit, "sink session finished");
        if exit.success() {
            Ok(exit)
        } else {
            Err(SessionError::RemoteExit(exit))
        }
    }
}

impl<C: ShellChannel> Drop for SinkSession<C> {
    fn drop(&mut self) {
        self.protocol = None;
        self.channel.close();
    }
}

/// Opens a source session, runs `handler`, and finishes the session.
///
/// The channel is released on every path; the first error observed wins.
pub fn run_source_session<C, T, E, F>(
    channel: C,
    command: &ScpCommand,
    handler: F,
) -> Result<T, E>
where
    C: ShellChannel,
    E: From<SessionError>,
    F: FnOnce(&mut ChannelSourceProtocol) -> Result<T, E>,
{
    let mut session = SourceSession::open(channel, command)?;
    let value = handler(session.protocol())?;
    session.finish()?;
    Ok(value)
}

/// Opens a sink session, runs `handler`, and finishes the session.
pub fn run_sink_session<C, T, E, F>(channel: C, command: &ScpCommand, handler: F) -> Result<T, E>
where
    C: ShellChannel,
    E: From<SessionError>,
    F: FnOnce(&mut ChannelSinkProtocol) -> Result<T, E>,
{
    let mut session = SinkSession::open(channel, command)?;
    let value = handler(session.protocol())?;
    session.finish()?;
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{ChannelExit, ShellChannel};
    use crate::command::Direction;
    use scp_protocol::ProtocolError;
    use std::io::Cursor;
    use std::sync::{Arc, Mutex};

    /// Channel whose remote side is a scripted byte stream.
    struct ScriptedChannel {
        incoming: Option<Cursor<Vec<u8>>>,
        outgoing: Arc<Mutex<Vec<u8>>>,
        exit_code: i32,
        started: Arc<Mutex<Option<String>>>,
        closed: Arc<Mutex<bool>>,
    }

    impl ScriptedChannel {
        fn new(incoming: &[u8], exit_code: i32) -> Self {
            Self {
                incoming: Some(Cursor::new(incoming.to_vec())),
                outgoing: Arc::new(Mutex::new(Vec::new())),
                exit_code,
                started: Arc::new(Mutex::new(None)),
                closed: Arc::new(Mutex::new(false)),
            }
        }
    }

    struct SharedWriter(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for SharedWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().expect("lock").extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl ShellChannel for ScriptedChannel {
        fn start(&mut self, command: &str) -> io::Result<()> {
            *self.started.lock().expect("lock") = Some(command.to_string());
            Ok(())
        }

        fn stdin(&mut self) -> io::Result<crate::channel::ChannelWriter> {
            Ok(Box::new(SharedWriter(Arc::clone(&self.outgoing))))
        }

        fn stdout(&mut self) -> io::Result<crate::channel::ChannelReader> {
            Ok(Box::new(self.incoming.take().expect("stdout taken twice")))
        }

        fn wait(&mut self) -> io::Result<ChannelExit> {
            Ok(ChannelExit::new(Some(self.exit_code)))
        }

        fn close(&mut self) {
            *self.closed.lock().expect("lock") = true;
        }
    }

    #[test]
    fn source_session_starts_the_rendered_command() {
        let channel = ScriptedChannel::new(&[0x00], 0);
        let started = Arc::clone(&channel.started);
        let mut command = ScpCommand::new(Direction::ToRemote, "/tmp/dest");
        command.set_preserve_times(true).set_target_is_dir(true);

        let mut session = SourceSession::open(channel, &command).expect("open");
        session.finish().expect("finish");
        assert_eq!(
            started.lock().expect("lock").as_deref(),
            Some("scp -tpd '/tmp/dest'")
        );
    }

    #[test]
    fn a_fatal_greeting_aborts_the_open_and_closes_the_channel() {
        let channel = ScriptedChannel::new(b"\x02No such file\n", 1);
        let closed = Arc::clone(&channel.closed);
        let command = ScpCommand::new(Direction::ToRemote, "/tmp");

        match SourceSession::open(channel, &command) {
            Err(SessionError::Protocol(ProtocolError::Remote { message, .. })) => {
                assert_eq!(message, "No such file");
            }
            other => panic!("unexpected result: {:?}", other.err()),
        }
        assert!(*closed.lock().expect("lock"));
    }

    #[test]
    fn nonzero_exit_surfaces_as_remote_exit() {
        let channel = ScriptedChannel::new(&[0x00], 1);
        let command = ScpCommand::new(Direction::ToRemote, "/tmp");
        let mut session = SourceSession::open(channel, &command).expect("open");
        match session.finish() {
            Err(SessionError::RemoteExit(exit)) => assert_eq!(exit.code(), Some(1)),
            other => panic!("unexpected result: {:?}", other.err()),
        }
    }

    #[test]
    fn sink_session_announces_readiness() {
        let channel = ScriptedChannel::new(b"", 0);
        let outgoing = Arc::clone(&channel.outgoing);
        let command = ScpCommand::new(Direction::FromRemote, "f");
        let mut session = SinkSession::open(channel, &command).expect("open");
        assert_eq!(*outgoing.lock().expect("lock"), vec![0x00]);
        session.finish().expect("finish");
    }

    #[test]
    fn run_source_session_reports_handler_errors_first() {
        let channel = ScriptedChannel::new(&[0x00], 1);
        let closed = Arc::clone(&channel.closed);
        let command = ScpCommand::new(Direction::ToRemote, "/tmp");
        let result: Result<(), SessionError> =
            run_source_session(channel, &command, |_protocol| {
                Err(SessionError::Protocol(ProtocolError::UnexpectedEof))
            });
        assert!(matches!(
            result,
            Err(SessionError::Protocol(ProtocolError::UnexpectedEof))
        ));
        assert!(*closed.lock().expect("lock"));
    }
}
