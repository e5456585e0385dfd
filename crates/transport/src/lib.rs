#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `scp_transport` connects the wire engine to a remote process. It owns
//! three concerns: the [`ShellChannel`] abstraction over an interactive
//! remote-shell connection, the construction of the remote `scp` command
//! line (fixed flag order, single-quote shell quoting), and the session
//! harnesses that start the remote command, hand its stdio to a protocol
//! object, and guarantee the channel is released on every exit path.
//!
//! # Design
//!
//! - [`channel`] defines [`ShellChannel`]/[`ShellChannelFactory`] and the
//!   [`ChannelExit`] status type. Implementations only need to expose a
//!   writable stdin, a readable stdout, and a wait/close pair.
//! - [`command`] renders `"<scp-path> -<flags> '<path>'"` byte-exactly and
//!   houses [`shell_quote`].
//! - [`ssh`] is the production channel: it spawns the system `ssh` binary
//!   as a subprocess with piped stdio, in the shape of a small builder.
//! - [`session`] pairs a channel with a [`SourceProtocol`] or
//!   [`SinkProtocol`] and enforces the shutdown sequence: stdin close,
//!   then channel wait, then channel close, on every path.
//!
//! # Invariants
//!
//! - A session closes its channel exactly once, including on error and
//!   panic unwinding; `close` implementations are idempotent.
//! - Dropping the writer returned by [`ShellChannel::stdin`] closes the
//!   remote process's stdin; that is how a source signals end-of-transfer.
//! - A non-zero remote exit status always surfaces as
//!   [`SessionError::RemoteExit`], preserving the remote's diagnostic text.
//!
//! [`SourceProtocol`]: scp_protocol::SourceProtocol
//! [`SinkProtocol`]: scp_protocol::SinkProtocol

pub mod channel;
pub mod command;
pub mod session;
pub mod ssh;

pub use channel::{ChannelExit, ChannelReader, ChannelWriter, ShellChannel, ShellChannelFactory};
pub use command::{DEFAULT_SCP_PATH, Direction, ScpCommand, shell_quote};
pub use session::{
    ChannelSinkProtocol, ChannelSourceProtocol, SessionError, SinkSession, SourceSession,
    run_sink_session, run_source_session,
};
pub use ssh::{ProcessChannel, RemoteSpec, RemoteSpecError, SshCommand};
