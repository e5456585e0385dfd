//! Source-side driver: translates a local tree walk into protocol calls.

use std::ffi::OsString;
use std::fs;
use std::io::{BufRead, Write};
use std::path::Path;

use scp_metadata::EntryInfo;
use scp_protocol::SourceProtocol;
use scp_walk::WalkBuilder;
use tracing::debug;

use crate::client::AcceptFn;
use crate::error::{ScpError, ScpResult, local_io};

/// Walks `root` and emits it through `protocol`.
///
/// A file root is sent as a single `write_file`. A directory root is
/// traversed depth-first in lexicographic order; `include_root` controls
/// whether the root directory itself is announced with a leading `D`
/// record (and closed with a matching trailing `E`), or only its contents
/// are sent.
///
/// The driver keeps a running `prev_dir` and derives the record stream
/// from the relative movement between consecutive entries: each `..`
/// component emits an `end_directory`, each fresh component stages a
/// `start_directory` that is flushed only after the accept filter has had
/// its say. Rejecting a directory therefore prunes the subtree without a
/// single record reaching the wire; rejecting a file suppresses just that
/// file.
pub(crate) fn send_tree<R: BufRead, W: Write>(
    protocol: &mut SourceProtocol<R, W>,
    root: &Path,
    include_root: bool,
    mut accept: Option<AcceptFn<'_>>,
) -> ScpResult<()> {
    let mut walker = WalkBuilder::new(root).build()?;
    let root_path = walker.root().to_path_buf();
    let mut prev_dir = root_path.clone();
    let mut root_started = false;

    while let Some(entry) = walker.next() {
        let entry = entry?;
        let path = entry.path();
        let metadata = entry.metadata();

        if entry.is_root() {
            if !metadata.is_dir() {
                let info = entry_info(path, metadata)?;
                let file = fs::File::open(path)
                    .map_err(|error| local_io("open source file", path, error))?;
                protocol.write_file(&info, file)?;
                return Ok(());
            }
            let info = entry_info(path, metadata)?;
            let parent = path.parent().unwrap_or(path);
            if !consult(&mut accept, parent, &info)? {
                debug!(root = %path.display(), "root directory rejected, sending nothing");
                return Ok(());
            }
            if include_root {
                protocol.start_directory(&info)?;
                root_started = true;
            }
            continue;
        }

        let dir: &Path = if metadata.is_dir() {
            path
        } else {
            path.parent().unwrap_or(path)
        };
        let (ascents, descents) = relative_steps(&prev_dir, dir);
        for _ in 0..ascents {
            protocol.end_directory()?;
        }

        let info = entry_info(path, metadata)?;
        let parent = path.parent().unwrap_or(path);
        let accepted = consult(&mut accept, parent, &info)?;
        if metadata.is_dir() && !accepted {
            // nothing was announced for this directory; the ascents above
            // left its parent as the open level
            walker.skip_subtree();
            prev_dir = parent.to_path_buf();
            continue;
        }

        for component in &descents {
            let name = component
                .to_str()
                .ok_or_else(|| non_unicode_name(path))?;
            let staged = info.renamed(name)?;
            protocol.start_directory(&staged)?;
        }

        if !metadata.is_dir() && accepted {
            let file =
                fs::File::open(path).map_err(|error| local_io("open source file", path, error))?;
            protocol.write_file(&info, file)?;
        }

        prev_dir = dir.to_path_buf();
    }

    let (ascents, _) = relative_steps(&prev_dir, &root_path);
    for _ in 0..ascents {
        protocol.end_directory()?;
    }
    if root_started {
        protocol.end_directory()?;
    }
    Ok(())
}

/// Relative movement between two directories as `(ascents, descents)`.
fn relative_steps(from: &Path, to: &Path) -> (usize, Vec<OsString>) {
    let from_components: Vec<_> = from.components().collect();
    let to_components: Vec<_> = to.components().collect();
    let common = from_components
        .iter()
        .zip(&to_components)
        .take_while(|(a, b)| a == b)
        .count();
    let descents = to_components[common..]
        .iter()
        .map(|component| component.as_os_str().to_os_string())
        .collect();
    (from_components.len() - common, descents)
}

pub(crate) fn entry_info(path: &Path, metadata: &fs::Metadata) -> ScpResult<EntryInfo> {
    let name = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| non_unicode_name(path))?;
    Ok(EntryInfo::from_fs_metadata(name, metadata)?)
}

fn non_unicode_name(path: &Path) -> ScpError {
    local_io(
        "derive entry name for",
        path,
        std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "name is missing or not valid Unicode",
        ),
    )
}

pub(crate) fn consult(
    accept: &mut Option<AcceptFn<'_>>,
    parent: &Path,
    info: &EntryInfo,
) -> ScpResult<bool> {
    match accept {
        Some(callback) => callback(parent, info).map_err(ScpError::Accept),
        None => Ok(true),
    }
}
