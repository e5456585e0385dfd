#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `scp_protocol` implements the wire-level engine of the classic scp/rcp
//! copy protocol: the three-byte reply alphabet, the `C`/`D`/`E`/`T`
//! control records, and the two half-duplex state machines that drive a
//! remote `scp -t` (we send) or `scp -f` (we receive) process over an
//! already-established shell channel.
//!
//! # Design
//!
//! - [`reply`] reads and writes the reply alphabet: `0x00` OK, `0x01`
//!   warning-with-message, `0x02` fatal-with-message.
//! - [`header`] parses and emits the LF-terminated control records.
//! - [`SourceProtocol`] is the sending state machine. It performs the
//!   opening handshake, emits headers and file bodies with the trailing-NUL
//!   discipline, and tracks the directory stack so every `D` is balanced by
//!   an `E` before the session closes.
//! - [`SinkProtocol`] is the receiving state machine. It announces
//!   readiness, decodes one record at a time, and exposes both an eager and
//!   a chunked body path so callers can stream bodies lazily.
//!
//! The conversation is strictly half-duplex: at every point exactly one
//! side is producing bytes, and every record boundary is acknowledged with
//! a reply before the conversation advances.
//!
//! # Invariants
//!
//! - Every file body is exactly the declared number of bytes followed by a
//!   single `0x00` terminator; a shorter or longer body fails the transfer
//!   rather than desynchronising the stream.
//! - A `T` record is only ever emitted immediately before the `C` or `D`
//!   record it applies to.
//! - Mode fields are masked to the nine permission bits and formatted as
//!   four octal digits.
//!
//! # Errors
//!
//! All operations fail with [`ProtocolError`]. Remote-reported warnings and
//! fatal errors surface as [`ProtocolError::Remote`] with the peer's
//! message text; framing violations and unexpected end-of-stream conditions
//! have dedicated variants so callers can tell a broken peer from a broken
//! pipe.
//!
//! # Examples
//!
//! Parse a file header from a scripted peer:
//!
//! ```
//! use std::io::Cursor;
//! use scp_protocol::{Header, SinkEvent, SinkProtocol};
//!
//! let incoming = Cursor::new(b"C0644 5 hello.txt\n".to_vec());
//! let mut acks = Vec::new();
//! let mut sink = SinkProtocol::open(incoming, &mut acks).expect("handshake");
//! match sink.read_event().expect("event") {
//!     SinkEvent::Record(Header::File { mode, size, name }) => {
//!         assert_eq!(mode, 0o644);
//!         assert_eq!(size, 5);
//!         assert_eq!(name, "hello.txt");
//!     }
//!     other => panic!("unexpected event: {other:?}"),
//! }
//! ```

mod error;
pub mod header;
pub mod reply;
mod sink;
mod source;

pub use error::ProtocolError;
pub use header::Header;
pub use reply::{ReplyKind, ReplyMessage};
pub use sink::{SinkEvent, SinkProtocol};
pub use source::SourceProtocol;
