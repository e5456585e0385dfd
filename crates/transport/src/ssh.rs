//! Production channel: the system `ssh` binary as a subprocess.

use std::ffi::OsString;
use std::io::{self, Read};
use std::process::{Child, ChildStderr, Command, Stdio};

use thiserror::Error;
use tracing::debug;

use crate::channel::{
    ChannelExit, ChannelReader, ChannelWriter, ShellChannel, ShellChannelFactory,
};

/// Builder describing how to reach the remote host with `ssh`.
///
/// The builder doubles as a [`ShellChannelFactory`]: each transfer clones
/// the configuration into a fresh [`ProcessChannel`].
#[derive(Clone, Debug)]
pub struct SshCommand {
    program: OsString,
    user: Option<OsString>,
    host: OsString,
    port: Option<u16>,
    batch_mode: bool,
    options: Vec<OsString>,
}

impl SshCommand {
    /// Creates a builder targeting the provided host name or address.
    #[must_use]
    pub fn new(host: impl Into<OsString>) -> Self {
        Self {
            program: OsString::from("ssh"),
            user: None,
            host: host.into(),
            port: None,
            batch_mode: true,
            options: Vec::new(),
        }
    }

    /// Overrides the program used to reach the remote shell.
    pub fn set_program<S: Into<OsString>>(&mut self, program: S) -> &mut Self {
        self.program = program.into();
        self
    }

    /// Sets the remote username. When omitted, the `ssh` default applies.
    pub fn set_user<S: Into<OsString>>(&mut self, user: S) -> &mut Self {
        self.user = Some(user.into());
        self
    }

    /// Specifies the TCP port used when connecting.
    pub fn set_port(&mut self, port: u16) -> &mut Self {
        self.port = Some(port);
        self
    }

    /// Enables or disables batch mode (default: enabled). Batch mode keeps
    /// `ssh` from prompting for passwords mid-transfer.
    pub fn set_batch_mode(&mut self, enabled: bool) -> &mut Self {
        self.batch_mode = enabled;
        self
    }

    /// Appends an extra option placed before the target operand.
    pub fn push_option<S: Into<OsString>>(&mut self, option: S) -> &mut Self {
        self.options.push(option.into());
        self
    }

    fn argv(&self, remote_command: &str) -> (OsString, Vec<OsString>) {
        let mut args =
            Vec::with_capacity(4 + self.options.len() + usize::from(self.port.is_some()));

        if self.batch_mode {
            args.push(OsString::from("-oBatchMode=yes"));
        }
        if let Some(port) = self.port {
            args.push(OsString::from("-p"));
            args.push(OsString::from(port.to_string()));
        }
        args.extend(self.options.iter().cloned());
        args.push(self.target_operand());
        args.push(OsString::from(remote_command));

        (self.program.clone(), args)
    }

    fn target_operand(&self) -> OsString {
        let mut target = OsString::new();
        if let Some(user) = &self.user {
            target.push(user);
            target.push("@");
        }
        target.push(&self.host);
        target
    }
}

impl ShellChannelFactory for SshCommand {
    type Channel = ProcessChannel;

    fn open_channel(&mut self) -> io::Result<Self::Channel> {
        Ok(ProcessChannel {
            command: self.clone(),
            child: None,
            stderr: None,
        })
    }
}

/// A [`ShellChannel`] backed by a spawned subprocess.
pub struct ProcessChannel {
    command: SshCommand,
    child: Option<Child>,
    stderr: Option<ChildStderr>,
}

impl ShellChannel for ProcessChannel {
    fn start(&mut self, command: &str) -> io::Result<()> {
        if self.child.is_some() {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                "channel already started",
            ));
        }
        let (program, args) = self.command.argv(command);
        debug!(program = %program.to_string_lossy(), remote = command, "spawning shell channel");
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;
        self.stderr = child.stderr.take();
        self.child = Some(child);
        Ok(())
    }

    fn stdin(&mut self) -> io::Result<ChannelWriter> {
        let child = self.child.as_mut().ok_or_else(not_started)?;
        let stdin = child.stdin.take().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::BrokenPipe,
                "subprocess did not expose a writable stdin",
            )
        })?;
        Ok(Box::new(stdin))
    }

    fn stdout(&mut self) -> io::Result<ChannelReader> {
        let child = self.child.as_mut().ok_or_else(not_started)?;
        let stdout = child.stdout.take().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::BrokenPipe,
                "subprocess did not expose a readable stdout",
            )
        })?;
        Ok(Box::new(stdout))
    }

    fn wait(&mut self) -> io::Result<ChannelExit> {
        let child = self.child.as_mut().ok_or_else(not_started)?;
        let status = child.wait()?;
        let mut exit = ChannelExit::new(status.code());
        if !status.success() {
            if let Some(mut stderr) = self.stderr.take() {
                let mut text = String::new();
                if stderr.read_to_string(&mut text).is_ok() {
                    let text = text.trim();
                    if !text.is_empty() {
                        exit = exit.with_message(text);
                    }
                }
            }
        }
        Ok(exit)
    }

    fn close(&mut self) {
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
        self.stderr = None;
    }
}

fn not_started() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "channel not started")
}

/// Parsed `[user@]host:path` operand.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RemoteSpec {
    user: Option<String>,
    host: String,
    path: String,
}

/// Error returned when a remote operand cannot be parsed.
#[derive(Debug, Error)]
#[error("invalid remote operand {operand:?}: {reason}")]
pub struct RemoteSpecError {
    operand: String,
    reason: &'static str,
}

fn spec_error(operand: &str, reason: &'static str) -> RemoteSpecError {
    RemoteSpecError {
        operand: operand.to_string(),
        reason,
    }
}

impl RemoteSpec {
    /// Parses a remote operand of the form `[user@]host:path`, with IPv6
    /// addresses bracketed as `[::1]:path`. An empty path means the remote
    /// user's home directory and is normalised to `.`.
    pub fn parse(operand: &str) -> Result<Self, RemoteSpecError> {
        let (user, rest) = match operand.split_once('@') {
            Some((user, rest)) if !user.is_empty() && !user.contains(':') => {
                (Some(user.to_string()), rest)
            }
            _ => (None, operand),
        };

        let (host, path) = if let Some(bracketed) = rest.strip_prefix('[') {
            let (host, tail) = bracketed
                .split_once(']')
                .ok_or_else(|| spec_error(operand, "unterminated bracketed host"))?;
            let path = tail
                .strip_prefix(':')
                .ok_or_else(|| spec_error(operand, "missing path separator"))?;
            (host, path)
        } else {
            rest.split_once(':')
                .ok_or_else(|| spec_error(operand, "missing path separator"))?
        };

        if host.is_empty() {
            return Err(spec_error(operand, "empty host"));
        }

        Ok(Self {
            user,
            host: host.to_string(),
            path: if path.is_empty() {
                String::from(".")
            } else {
                path.to_string()
            },
        })
    }

    /// Returns the username component, when present.
    #[must_use]
    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    /// Returns the hostname or address.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Returns the remote path.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }
}
