//! Remote command construction: flag assembly and shell quoting.

/// Program invoked on the remote side when the caller does not override it.
pub const DEFAULT_SCP_PATH: &str = "scp";

/// Transfer direction, encoded as the first flag letter.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Direction {
    /// We send; the remote runs `scp -t` and consumes records.
    ToRemote,
    /// We receive; the remote runs `scp -f` and produces records.
    FromRemote,
}

impl Direction {
    const fn flag(self) -> char {
        match self {
            Self::ToRemote => 't',
            Self::FromRemote => 'f',
        }
    }
}

/// Specification of one remote `scp` invocation.
///
/// Rendering is byte-exact: flags appear as one contiguous letter set in
/// the fixed order `t|f`, `p`, `r`, `d`, and the remote path is always
/// single-quoted.
#[derive(Clone, Debug)]
pub struct ScpCommand {
    scp_path: String,
    direction: Direction,
    preserve_times: bool,
    recursive: bool,
    target_is_dir: bool,
    remote_path: String,
}

impl ScpCommand {
    /// Creates a command for the given direction and remote path, with the
    /// default `scp` program and no optional flags.
    #[must_use]
    pub fn new(direction: Direction, remote_path: impl Into<String>) -> Self {
        Self {
            scp_path: String::from(DEFAULT_SCP_PATH),
            direction,
            preserve_times: false,
            recursive: false,
            target_is_dir: false,
            remote_path: remote_path.into(),
        }
    }

    /// Overrides the remote program, e.g. `"sudo scp"`.
    pub fn set_scp_path(&mut self, path: impl Into<String>) -> &mut Self {
        self.scp_path = path.into();
        self
    }

    /// Requests metadata preservation (`p`).
    pub fn set_preserve_times(&mut self, preserve: bool) -> &mut Self {
        self.preserve_times = preserve;
        self
    }

    /// Requests directory recursion (`r`).
    pub fn set_recursive(&mut self, recursive: bool) -> &mut Self {
        self.recursive = recursive;
        self
    }

    /// Declares that the remote target is a directory (`d`).
    pub fn set_target_is_dir(&mut self, is_dir: bool) -> &mut Self {
        self.target_is_dir = is_dir;
        self
    }

    /// Returns the transfer direction.
    #[must_use]
    pub const fn direction(&self) -> Direction {
        self.direction
    }

    /// Returns the remote path operand.
    #[must_use]
    pub fn remote_path(&self) -> &str {
        &self.remote_path
    }

    /// Renders the command line handed to the remote shell.
    #[must_use]
    pub fn render(&self) -> String {
        let mut flags = String::new();
        flags.push(self.direction.flag());
        if self.preserve_times {
            flags.push('p');
        }
        if self.recursive {
            flags.push('r');
        }
        if self.target_is_dir {
            flags.push('d');
        }
        format!(
            "{} -{} {}",
            self.scp_path,
            flags,
            shell_quote(&self.remote_path)
        )
    }
}

/// Quotes an argument for a POSIX shell.
///
/// The argument is wrapped in single quotes and every interior quote is
/// replaced by the four-character sequence `'\''`. A POSIX shell parsing
/// the result recovers the input exactly, for any string free of NUL
/// bytes.
#[must_use]
pub fn shell_quote(argument: &str) -> String {
    let mut quoted = String::with_capacity(argument.len() + 2);
    quoted.push('\'');
    for ch in argument.chars() {
        if ch == '\'' {
            quoted.push_str("'\\''");
        } else {
            quoted.push(ch);
        }
    }
    quoted.push('\'');
    quoted
}
