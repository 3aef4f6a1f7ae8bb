//! Cancellable recursive directory enumeration.
//!
//! The walker visits one directory at a time: `on_enter_dir` fires
//! before a directory's children are read, then every child is reported
//! through `on_child` in enumeration order, then the next pending
//! directory is drained from a FIFO. Traversal order is therefore
//! directory-enumeration order, not depth-first. Children are read in
//! fixed-size batches so cancellation has a checkpoint between batches
//! and memory stays bounded on huge directories.
//!
//! Cycle safety: a directory's canonical path is inserted into the
//! visited set before it is queued; a repeat (symlink loop, bind mount)
//! is dropped silently.

use crate::error::{VfsError, VfsResult};
use crate::file_ref::{stat, FileInfo};
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Children read per enumeration request.
pub const DEFAULT_BATCH_SIZE: usize = 128;

/// Decision returned by `on_enter_dir` for each directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirOp {
    /// Enumerate this directory's children.
    Continue,
    /// Drop this directory's subtree and move on.
    Skip,
    /// End the whole walk.
    Stop,
}

/// How a completed walk ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkOutcome {
    /// Every reachable entry was visited.
    Completed,
    /// `on_enter_dir` returned Stop, or Skip on the root.
    Stopped,
}

/// Traversal options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalkOptions {
    /// Descend into subdirectories.
    pub recursive: bool,
    /// Dereference symbolic links; when false, links are reported as
    /// links and never descended into.
    pub follow_symlinks: bool,
    /// Cancellation checkpoint interval while enumerating children.
    pub batch_size: usize,
}

impl Default for WalkOptions {
    fn default() -> Self {
        WalkOptions {
            recursive: true,
            follow_symlinks: false,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

/// Walk `root`, reporting each directory through `on_enter_dir` (the
/// root included) and each child entry through `on_child`.
///
/// Callbacks fire strictly in enumeration order and never overlap.
/// Cancellation is observed before each directory and between child
/// batches; it surfaces as `VfsError::Cancelled` and no further
/// callbacks fire.
pub async fn walk<E, C>(
    root: &Path,
    options: &WalkOptions,
    cancel: &CancellationToken,
    mut on_enter_dir: E,
    mut on_child: C,
) -> VfsResult<WalkOutcome>
where
    E: FnMut(&Path, &FileInfo) -> DirOp,
    C: FnMut(&Path, &FileInfo),
{
    let root_info = stat(root, true).await?;

    let mut visited: HashSet<PathBuf> = HashSet::new();
    let mut to_visit: VecDeque<(PathBuf, FileInfo)> = VecDeque::new();

    if let Ok(canonical) = tokio::fs::canonicalize(root).await {
        visited.insert(canonical);
    }

    let mut current = Some((root.to_path_buf(), root_info));
    let mut at_root = true;

    while let Some((dir, dir_info)) = current.take() {
        if cancel.is_cancelled() {
            return Err(VfsError::Cancelled);
        }

        match on_enter_dir(&dir, &dir_info) {
            DirOp::Stop => return Ok(WalkOutcome::Stopped),
            DirOp::Skip => {
                if at_root {
                    // Skipping the root means nothing was traversed.
                    return Ok(WalkOutcome::Stopped);
                }
                current = to_visit.pop_front();
                continue;
            }
            DirOp::Continue => {}
        }
        at_root = false;

        let mut entries = tokio::fs::read_dir(&dir)
            .await
            .map_err(|e| VfsError::from_io(e, &dir))?;

        let mut read_in_batch = 0usize;
        loop {
            if read_in_batch >= options.batch_size {
                read_in_batch = 0;
                if cancel.is_cancelled() {
                    return Err(VfsError::Cancelled);
                }
            }

            let entry = entries
                .next_entry()
                .await
                .map_err(|e| VfsError::from_io(e, &dir))?;
            let Some(entry) = entry else { break };
            read_in_batch += 1;

            let child = entry.path();
            let child_info = match stat(&child, options.follow_symlinks).await {
                Ok(info) => info,
                // Entry vanished between enumeration and stat.
                Err(VfsError::NotFound(_)) => continue,
                Err(e) => return Err(e),
            };

            if child_info.is_dir() && options.recursive {
                let identity = tokio::fs::canonicalize(&child)
                    .await
                    .unwrap_or_else(|_| child.clone());
                if visited.insert(identity) {
                    to_visit.push_back((child.clone(), child_info.clone()));
                } else {
                    debug!(path = %child.display(), "dropping already-visited directory");
                }
            }

            on_child(&child, &child_info);
        }

        if options.recursive {
            current = to_visit.pop_front();
        }
    }

    Ok(WalkOutcome::Completed)
}
