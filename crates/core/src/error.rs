use std::io;
use std::path::{Path, PathBuf};

use scp_metadata::{InvalidEntryName, MetadataError};
use scp_protocol::ProtocolError;
use scp_transport::SessionError;
use scp_walk::WalkError;
use thiserror::Error;

/// Result type for facade operations.
pub type ScpResult<T> = Result<T, ScpError>;

/// Errors returned by the high-level scp facade.
///
/// Exactly one error value is returned per operation: the first failure
/// observed, with the failing stage identifiable from the variant and the
/// underlying cause preserved in the source chain.
#[derive(Debug, Error)]
pub enum ScpError {
    /// Opening a fresh shell channel failed.
    #[error("failed to open shell channel: {0}")]
    OpenChannel(#[source] io::Error),
    /// The session harness failed: start, handshake, wait, or remote exit.
    #[error(transparent)]
    Session(#[from] SessionError),
    /// The wire conversation failed mid-transfer.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    /// The local tree traversal failed.
    #[error(transparent)]
    Walk(#[from] WalkError),
    /// Reading or applying local metadata failed.
    #[error(transparent)]
    Metadata(#[from] MetadataError),
    /// An entry name was not representable on the wire.
    #[error(transparent)]
    Entry(#[from] InvalidEntryName),
    /// A local filesystem operation failed.
    #[error("failed to {context} '{}': {source}", path.display())]
    LocalIo {
        /// The operation being performed.
        context: &'static str,
        /// The path involved.
        path: PathBuf,
        /// Underlying operating-system error.
        #[source]
        source: io::Error,
    },
    /// The caller-supplied accept predicate returned an error.
    #[error("accept callback failed: {0}")]
    Accept(#[source] io::Error),
    /// The remote finished without ever announcing the requested file.
    #[error("remote sent no file header for {path:?}")]
    MissingFileHeader {
        /// The remote path that was requested.
        path: String,
    },
}

pub(crate) fn local_io(context: &'static str, path: &Path, source: io::Error) -> ScpError {
    ScpError::LocalIo {
        context,
        path: path.to_path_buf(),
        source,
    }
}
