#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `scp_metadata` models the per-entry metadata that travels inside scp
//! control records: the basename, the byte size, the nine permission bits,
//! and the optional modification/access time pair. The same descriptor type
//! is produced on the sending side from a local `stat` and on the receiving
//! side from an incoming header, so both halves of a transfer agree on what
//! an entry looks like.
//!
//! # Design
//!
//! - [`EntryInfo`] is the immutable descriptor. Constructors validate the
//!   name (a basename with no separator and no newline) so malformed values
//!   cannot reach the wire or the local filesystem.
//! - [`TimePair`] carries mtime and atime together; the protocol transmits
//!   both in one record, so they are either both present or both absent.
//! - [`WireTime`] is the on-the-wire shape of one timestamp: Unix seconds
//!   plus microseconds truncated toward zero.
//! - [`mode_bits`], [`file_times`], [`apply_mode`], and [`apply_times`] are
//!   the host-side helpers that read permission bits and timestamps from
//!   [`std::fs::Metadata`] and write them back with `chmod` and `utimes`
//!   semantics.
//!
//! # Invariants
//!
//! - A directory descriptor always reports size `0`.
//! - `mode` is masked to the nine permission bits on construction; extra
//!   bits never survive into a descriptor.
//! - `WireTime::microseconds` is strictly less than `1_000_000`.
//!
//! # Errors
//!
//! Name validation fails with [`InvalidEntryName`]; filesystem mutation
//! helpers fail with [`MetadataError`], which preserves the operation, the
//! path, and the underlying [`std::io::Error`].

mod apply;
mod entry;
mod error;
mod time;

pub use apply::{apply_mode, apply_times, file_times, mode_bits};
pub use entry::{EntryInfo, EntryKind, InvalidEntryName};
pub use error::MetadataError;
pub use time::{TimePair, WireTime};
