#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `scp_walk` enumerates a local file tree in the order the scp record
//! stream needs it: the root first, then every directory before its
//! contents, siblings sorted lexicographically. The ordering is stable
//! across platforms because directory entries are sorted before they are
//! yielded, regardless of the underlying filesystem's iteration order.
//!
//! # Design
//!
//! - [`WalkBuilder`] configures the traversal root and the symlink policy.
//! - [`Walker`] yields [`WalkEntry`] values depth-first and pre-order. It
//!   is driven manually (not through a `for` loop) so callers can prune the
//!   subtree of the entry they just saw with [`Walker::skip_subtree`], the
//!   hook the accept filter of recursive sends is built on.
//! - Symlinks are either followed by `stat` (the default, so a symlink is
//!   presented as whatever it points to) or skipped entirely. When
//!   following, visited directories are tracked by canonical path so link
//!   cycles terminate.
//!
//! # Invariants
//!
//! - Every yielded path lies inside the configured root.
//! - A directory is yielded before any of its contents, and its contents
//!   are exhausted before its next sibling.
//! - Traversal never panics; failures surface as [`WalkError`] with the
//!   offending path.

use std::collections::HashSet;
use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Error returned when traversal fails.
#[derive(Debug, Error)]
pub enum WalkError {
    /// Metadata for a path could not be retrieved.
    #[error("failed to inspect '{}': {source}", path.display())]
    Metadata {
        /// Path whose metadata could not be read.
        path: PathBuf,
        /// Underlying operating-system error.
        #[source]
        source: io::Error,
    },
    /// A directory's contents could not be listed.
    #[error("failed to read directory '{}': {source}", path.display())]
    ReadDir {
        /// Directory that could not be listed.
        path: PathBuf,
        /// Underlying operating-system error.
        #[source]
        source: io::Error,
    },
    /// A path could not be canonicalised while guarding against symlink
    /// cycles.
    #[error("failed to canonicalize '{}': {source}", path.display())]
    Canonicalize {
        /// Path that failed to canonicalise.
        path: PathBuf,
        /// Underlying operating-system error.
        #[source]
        source: io::Error,
    },
}

impl WalkError {
    fn metadata(path: PathBuf, source: io::Error) -> Self {
        Self::Metadata { path, source }
    }

    fn read_dir(path: PathBuf, source: io::Error) -> Self {
        Self::ReadDir { path, source }
    }

    fn canonicalize(path: PathBuf, source: io::Error) -> Self {
        Self::Canonicalize { path, source }
    }
}

/// Configures a traversal rooted at one path.
#[derive(Clone, Debug)]
pub struct WalkBuilder {
    root: PathBuf,
    follow_symlinks: bool,
}

impl WalkBuilder {
    /// Creates a builder for the given root path.
    #[must_use]
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self {
            root: root.into(),
            follow_symlinks: true,
        }
    }

    /// Chooses the symlink policy.
    ///
    /// When enabled (the default) a symlink is presented as its target;
    /// when disabled symlinks are silently skipped. The scp record stream
    /// has no encoding for links themselves.
    #[must_use]
    pub const fn follow_symlinks(mut self, follow: bool) -> Self {
        self.follow_symlinks = follow;
        self
    }

    /// Builds the [`Walker`], resolving the root eagerly so a missing or
    /// unreadable root fails here rather than on the first iteration.
    pub fn build(self) -> Result<Walker, WalkError> {
        let root = absolutize(self.root)?;
        let metadata =
            fs::metadata(&root).map_err(|error| WalkError::metadata(root.clone(), error))?;

        let mut walker = Walker {
            root: root.clone(),
            follow_symlinks: self.follow_symlinks,
            pending_root: None,
            stack: Vec::new(),
            visited: HashSet::new(),
            just_entered: false,
        };

        if metadata.is_dir() {
            walker.enter_directory(&root)?;
        }
        walker.pending_root = Some(metadata);
        Ok(walker)
    }
}

/// One traversal step.
#[derive(Debug)]
pub struct WalkEntry {
    path: PathBuf,
    metadata: fs::Metadata,
    is_root: bool,
}

impl WalkEntry {
    /// Returns the absolute path of the entry.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the metadata captured for the entry. Symlinks that were
    /// followed report their target's metadata.
    #[must_use]
    pub fn metadata(&self) -> &fs::Metadata {
        &self.metadata
    }

    /// Reports whether the entry is the traversal root.
    #[must_use]
    pub const fn is_root(&self) -> bool {
        self.is_root
    }

    /// Reports whether the entry is a directory.
    #[must_use]
    pub fn is_dir(&self) -> bool {
        self.metadata.is_dir()
    }
}

struct DirFrame {
    dir: PathBuf,
    names: Vec<OsString>,
    index: usize,
}

impl DirFrame {
    fn next_name(&mut self) -> Option<OsString> {
        let name = self.names.get(self.index)?.clone();
        self.index += 1;
        Some(name)
    }
}

/// Depth-first, lexicographically ordered traversal.
pub struct Walker {
    root: PathBuf,
    follow_symlinks: bool,
    pending_root: Option<fs::Metadata>,
    stack: Vec<DirFrame>,
    visited: HashSet<PathBuf>,
    just_entered: bool,
}

impl Walker {
    /// Returns the absolute traversal root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Advances the traversal by one entry.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> Option<Result<WalkEntry, WalkError>> {
        if let Some(metadata) = self.pending_root.take() {
            self.just_entered = !self.stack.is_empty();
            return Some(Ok(WalkEntry {
                path: self.root.clone(),
                metadata,
                is_root: true,
            }));
        }

        self.just_entered = false;
        loop {
            let path = {
                let frame = self.stack.last_mut()?;
                match frame.next_name() {
                    Some(name) => frame.dir.join(name),
                    None => {
                        self.stack.pop();
                        continue;
                    }
                }
            };

            let link_metadata = match fs::symlink_metadata(&path) {
                Ok(metadata) => metadata,
                Err(error) => return Some(Err(WalkError::metadata(path, error))),
            };
            let metadata = if link_metadata.file_type().is_symlink() {
                if !self.follow_symlinks {
                    continue;
                }
                match fs::metadata(&path) {
                    Ok(metadata) => metadata,
                    Err(error) => return Some(Err(WalkError::metadata(path, error))),
                }
            } else {
                link_metadata
            };

            if metadata.is_dir() {
                match self.enter_directory(&path) {
                    Ok(entered) => self.just_entered = entered,
                    Err(error) => return Some(Err(error)),
                }
            }

            return Some(Ok(WalkEntry {
                path,
                metadata,
                is_root: false,
            }));
        }
    }

    /// Prunes the subtree of the directory entry that was just yielded.
    ///
    /// Calling this after any other entry, or twice in a row, is a no-op.
    pub fn skip_subtree(&mut self) {
        if self.just_entered {
            self.stack.pop();
            self.just_entered = false;
        }
    }

    fn enter_directory(&mut self, path: &Path) -> Result<bool, WalkError> {
        if self.follow_symlinks {
            let canonical = fs::canonicalize(path)
                .map_err(|error| WalkError::canonicalize(path.to_path_buf(), error))?;
            if !self.visited.insert(canonical) {
                return Ok(false);
            }
        }

        let mut names = Vec::new();
        let entries =
            fs::read_dir(path).map_err(|error| WalkError::read_dir(path.to_path_buf(), error))?;
        for entry in entries {
            let entry =
                entry.map_err(|error| WalkError::read_dir(path.to_path_buf(), error))?;
            names.push(entry.file_name());
        }
        names.sort();

        self.stack.push(DirFrame {
            dir: path.to_path_buf(),
            names,
            index: 0,
        });
        Ok(true)
    }
}

fn absolutize(path: PathBuf) -> Result<PathBuf, WalkError> {
    if path.is_absolute() {
        return Ok(path);
    }
    let cwd = std::env::current_dir()
        .map_err(|error| WalkError::canonicalize(PathBuf::from("."), error))?;
    Ok(cwd.join(path))
}
