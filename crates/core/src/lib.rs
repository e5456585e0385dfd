#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `scp_core` is the high-level facade of the oc-scp client. Given a shell
//! channel factory (anything that can run a command on the remote side and
//! expose its stdio), it pushes files, byte streams, and whole directory
//! subtrees to a peer running `scp -t`, and pulls the same from a peer
//! running `scp -f`, preserving permission bits and timestamps end-to-end.
//!
//! # Design
//!
//! - [`Scp`] owns the channel factory and exposes one method per transfer
//!   shape: [`Scp::send_stream`], [`Scp::send_file`], [`Scp::send_dir`],
//!   [`Scp::recv_to_writer`], [`Scp::recv_open`], [`Scp::recv_file`], and
//!   [`Scp::recv_dir`].
//! - The source-side driver walks the local tree lexicographically and
//!   derives the record stream from the relative movement between
//!   consecutive entries, so directory starts and ends always balance.
//! - The sink-side driver rebuilds the local tree from the record stream,
//!   applying each directory's times when its `E` record closes it.
//! - Recursive transfers take an [`AcceptFn`] filter. Rejecting a
//!   directory prunes the subtree on the sending side and drains it
//!   without local side effects on the receiving side; the wire stays in
//!   sync either way.
//!
//! # Errors
//!
//! Every operation returns at most one [`ScpError`], the first failure
//! observed. Channels are released on every exit path, including panics;
//! partially written destination files are left in place for the caller
//! to clean up.
//!
//! # Examples
//!
//! Copy a file to a remote host over the system `ssh`:
//!
//! ```no_run
//! use scp_core::Scp;
//! use scp_transport::SshCommand;
//! use std::path::Path;
//!
//! # fn demo() -> Result<(), scp_core::ScpError> {
//! let mut ssh = SshCommand::new("files.example.com");
//! ssh.set_user("backup");
//! let mut client = Scp::new(ssh);
//! client.send_file(Path::new("notes.txt"), "/var/backup/notes.txt")?;
//! # Ok(())
//! # }
//! ```

mod client;
mod error;
mod recv;
mod send;

pub use client::{AcceptFn, Scp};
pub use error::{ScpError, ScpResult};
pub use recv::ScpReadStream;

pub use scp_metadata::{EntryInfo, EntryKind, TimePair};
