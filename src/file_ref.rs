//! File references and stat metadata.
//!
//! A `FileRef` is an opaque handle to a filesystem location: either a
//! path on the local filesystem or a remote URI reachable only through
//! a `RemoteStore` (see `cache`). Equality and hashing go through the
//! canonical form computed at construction, so two spellings of the
//! same location deduplicate.

use crate::error::{VfsError, VfsResult};
use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;

/// Handle to a local path or remote URI, compared by canonical identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FileRef {
    Local(PathBuf),
    Remote(String),
}

impl FileRef {
    /// Build a local reference with the path lexically cleaned
    /// (`.` and redundant separators removed, `..` resolved where
    /// possible without touching the filesystem).
    pub fn local(path: impl Into<PathBuf>) -> Self {
        FileRef::Local(clean_path(&path.into()))
    }

    /// Build a remote reference with the URI normalized: trailing
    /// slashes stripped so `scheme://host/dir/` and `.../dir` collapse.
    pub fn remote(uri: impl Into<String>) -> Self {
        let mut uri = uri.into();
        while uri.ends_with('/') && !uri.ends_with("://") {
            uri.pop();
        }
        FileRef::Remote(uri)
    }

    /// Whether this reference is reachable via the local filesystem.
    pub fn is_native(&self) -> bool {
        matches!(self, FileRef::Local(_))
    }

    pub fn as_local(&self) -> Option<&Path> {
        match self {
            FileRef::Local(path) => Some(path),
            FileRef::Remote(_) => None,
        }
    }
}

/// Entry type as reported by stat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Regular,
    Directory,
    Symlink,
    Other,
}

/// Stat metadata for one filesystem entry.
#[derive(Debug, Clone)]
pub struct FileInfo {
    pub kind: FileKind,
    pub size: u64,
    pub modified: Option<SystemTime>,
    /// Target of the link when `kind == Symlink` and it was readable.
    pub symlink_target: Option<PathBuf>,
}

impl FileInfo {
    pub fn is_dir(&self) -> bool {
        self.kind == FileKind::Directory
    }

    pub fn is_symlink(&self) -> bool {
        self.kind == FileKind::Symlink
    }

    fn from_metadata(meta: &std::fs::Metadata) -> Self {
        let kind = if meta.is_dir() {
            FileKind::Directory
        } else if meta.is_file() {
            FileKind::Regular
        } else if meta.file_type().is_symlink() {
            FileKind::Symlink
        } else {
            FileKind::Other
        };
        FileInfo {
            kind,
            size: meta.len(),
            modified: meta.modified().ok(),
            symlink_target: None,
        }
    }
}

/// Stat a path, optionally following a symlink at the terminal
/// component. Symlink targets are filled in for link entries.
pub async fn stat(path: &Path, follow_symlinks: bool) -> VfsResult<FileInfo> {
    let meta = if follow_symlinks {
        tokio::fs::metadata(path).await
    } else {
        tokio::fs::symlink_metadata(path).await
    }
    .map_err(|e| VfsError::from_io(e, path))?;

    let mut info = FileInfo::from_metadata(&meta);
    if info.is_symlink() {
        info.symlink_target = tokio::fs::read_link(path).await.ok();
    }
    Ok(info)
}

/// Lexically clean a path without hitting the filesystem.
fn clean_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for comp in path.components() {
        match comp {
            Component::CurDir => {}
            Component::ParentDir => {
                // Pop a normal component when possible, otherwise keep
                // the `..` (relative path escaping its start).
                let popped = matches!(
                    out.components().next_back(),
                    Some(Component::Normal(_))
                );
                if popped {
                    out.pop();
                } else {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    if out.as_os_str().is_empty() {
        out.push(".");
    }
    out
}
