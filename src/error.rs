//! Unified error type for filesystem operations.
//!
//! Replaces ad-hoc io::Error propagation with structured variants so
//! callers can distinguish the tolerated kinds (NotFound in batch copy,
//! AlreadyExists in unique-name allocation) from fatal I/O failures.

use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Unified error type for gallery-vfs operations.
#[derive(Error, Debug)]
pub enum VfsError {
    /// The referenced file or directory does not exist.
    /// Tolerated per-item in batch copy.
    #[error("not found: {0}")]
    NotFound(PathBuf),

    /// The destination already exists.
    /// Retried (bounded) in unique-name allocation.
    #[error("already exists: {0}")]
    AlreadyExists(PathBuf),

    /// Unique-name allocation exhausted its attempt budget.
    #[error("could not produce a valid unique name for {0:?}")]
    InvalidFilename(String),

    /// A directory operation hit an existing non-directory.
    #[error("not a directory: {0}")]
    NotDirectory(PathBuf),

    /// A batch job was given unequal source and destination lists.
    #[error("batch has {sources} sources but {destinations} destinations")]
    UnpairedBatch { sources: usize, destinations: usize },

    /// The operation's cancellation token fired.
    /// Surfaced at the next suspension point.
    #[error("operation cancelled")]
    Cancelled,

    /// Any other I/O failure. Fatal.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl VfsError {
    /// Classify an io::Error against the path it occurred on, so the
    /// structured kinds arrive as themselves regardless of which call
    /// produced them.
    pub fn from_io(err: io::Error, path: &Path) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => VfsError::NotFound(path.to_path_buf()),
            io::ErrorKind::AlreadyExists => VfsError::AlreadyExists(path.to_path_buf()),
            _ => VfsError::Io(err),
        }
    }

    /// True for the kind batch copy skips instead of aborting on.
    pub fn is_not_found(&self) -> bool {
        matches!(self, VfsError::NotFound(_))
    }
}

pub type VfsResult<T> = Result<T, VfsError>;
