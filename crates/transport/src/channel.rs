//! The remote-shell channel abstraction consumed by session harnesses.

use std::fmt;
use std::io::{self, Read, Write};

/// Writer connected to the remote process's stdin.
///
/// Dropping the writer closes the stream, which is how a source signals
/// end-of-transfer to the remote `scp`.
pub type ChannelWriter = Box<dyn Write + Send>;

/// Reader connected to the remote process's stdout.
pub type ChannelReader = Box<dyn Read + Send>;

/// Exit information reported by a channel once the remote command finishes.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ChannelExit {
    code: Option<i32>,
    message: String,
}

impl ChannelExit {
    /// Creates an exit status from an optional exit code.
    ///
    /// `None` means the remote terminated without reporting a code, for
    /// example when it was killed by a signal.
    #[must_use]
    pub fn new(code: Option<i32>) -> Self {
        Self {
            code,
            message: String::new(),
        }
    }

    /// Attaches diagnostic text captured from the remote, typically the
    /// tail of its stderr.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Returns the exit code, when one was reported.
    #[must_use]
    pub const fn code(&self) -> Option<i32> {
        self.code
    }

    /// Reports whether the remote command exited cleanly.
    #[must_use]
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Returns the captured diagnostic text, possibly empty.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for ChannelExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "exit code {code}")?,
            None => f.write_str("no exit code")?,
        }
        if !self.message.is_empty() {
            write!(f, ": {}", self.message)?;
        }
        Ok(())
    }
}

/// A bidirectional byte pipe to one remote process.
///
/// The channel is single-use: `start` runs one command, the stdio streams
/// may each be taken once, and `wait` collects the exit status. `close`
/// must be safe to call at any point and any number of times.
pub trait ShellChannel {
    /// Starts the remote command.
    fn start(&mut self, command: &str) -> io::Result<()>;

    /// Takes the writer connected to the remote stdin.
    fn stdin(&mut self) -> io::Result<ChannelWriter>;

    /// Takes the reader connected to the remote stdout.
    fn stdout(&mut self) -> io::Result<ChannelReader>;

    /// Waits for the remote command to finish.
    fn wait(&mut self) -> io::Result<ChannelExit>;

    /// Tears the channel down. Idempotent, and safe after [`wait`](Self::wait).
    fn close(&mut self);
}

/// Opens fresh [`ShellChannel`]s on demand, one per transfer.
pub trait ShellChannelFactory {
    /// The channel type this factory produces.
    type Channel: ShellChannel;

    /// Opens a channel for a single remote command.
    fn open_channel(&mut self) -> io::Result<Self::Channel>;
}
