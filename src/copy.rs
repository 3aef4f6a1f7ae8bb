//! Sequential copy, move and delete engines.
//!
//! `Copier` processes (source, destination) pairs strictly in list
//! order, one at a time, with per-file and per-byte progress. A missing
//! source is skipped; any other failure aborts the remainder.
//! `copy_directory` walks the source tree first, then replays the
//! collected entries in order: directories created, symlinks recreated,
//! files copied with the same progress shape.

use crate::error::{VfsError, VfsResult};
use crate::file_ref::{stat, FileInfo, FileKind};
use crate::walk::{walk, DirOp, WalkOptions};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Copy chunk size; progress fires once per chunk.
const COPY_CHUNK_SIZE: usize = 64 * 1024;

/// Per-chunk progress report for multi-file operations.
#[derive(Debug, Clone)]
pub struct CopyProgress {
    /// 1-based index of the file in flight.
    pub file_index: usize,
    pub total_files: usize,
    pub source: PathBuf,
    pub destination: PathBuf,
    pub bytes_done: u64,
    pub bytes_total: u64,
}

/// Flags for multi-file copy/move jobs.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct CopyFlags {
    /// Replace existing destinations instead of failing AlreadyExists.
    pub overwrite: bool,
    /// Append each file's metadata sidecars to the job before it runs.
    pub include_sidecars: bool,
}

/// Options for recursive directory copy.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct DirCopyOptions {
    pub overwrite: bool,
    /// Abort on directory/symlink creation failures instead of logging
    /// and continuing.
    pub strict: bool,
}

/// Discovers companion files (metadata caches, edit lists) associated
/// 1:1 with a primary file. Injected by the application layer.
pub trait SidecarProvider: Send + Sync {
    /// Sidecar paths for `file`, whether or not they exist on disk.
    fn sidecars_for(&self, file: &Path) -> Vec<PathBuf>;
}

/// Sequential multi-file copy/move engine.
#[derive(Default)]
pub struct Copier {
    sidecar_provider: Option<Arc<dyn SidecarProvider>>,
}

impl Copier {
    pub fn new() -> Self {
        Copier {
            sidecar_provider: None,
        }
    }

    pub fn with_sidecar_provider(provider: Arc<dyn SidecarProvider>) -> Self {
        Copier {
            sidecar_provider: Some(provider),
        }
    }

    /// Copy `sources[i]` to `destinations[i]`, in order, one at a time.
    ///
    /// All destination parent directories are created up front,
    /// deduplicated. A NotFound source is skipped and the job
    /// continues; any other error aborts the remainder and is returned
    /// once. Progress fires per chunk of the file in flight. The two
    /// lists must pair up exactly; a length mismatch is refused before
    /// anything is copied.
    pub async fn copy_files<P>(
        &self,
        sources: &[PathBuf],
        destinations: &[PathBuf],
        flags: &CopyFlags,
        cancel: &CancellationToken,
        mut on_progress: P,
    ) -> VfsResult<()>
    where
        P: FnMut(&CopyProgress),
    {
        check_paired(sources, destinations)?;
        let (sources, destinations) = self.with_sidecars(sources, destinations, flags);

        create_parent_dirs(&destinations).await?;

        let total_files = sources.len();
        for (index, (source, destination)) in
            sources.iter().zip(destinations.iter()).enumerate()
        {
            if cancel.is_cancelled() {
                return Err(VfsError::Cancelled);
            }

            let result = copy_one_file(
                source,
                destination,
                flags.overwrite,
                cancel,
                |bytes_done, bytes_total| {
                    on_progress(&CopyProgress {
                        file_index: index + 1,
                        total_files,
                        source: source.clone(),
                        destination: destination.clone(),
                        bytes_done,
                        bytes_total,
                    })
                },
            )
            .await;

            match result {
                Ok(_) => {}
                Err(e) if e.is_not_found() => {
                    info!(source = %source.display(), "source missing, skipping");
                }
                Err(e) => return Err(e),
            }
        }

        Ok(())
    }

    /// Move files: rename when the filesystem allows it, otherwise copy
    /// and delete the source. Same ordering, tolerance and progress
    /// contract as `copy_files`.
    pub async fn move_files<P>(
        &self,
        sources: &[PathBuf],
        destinations: &[PathBuf],
        flags: &CopyFlags,
        cancel: &CancellationToken,
        mut on_progress: P,
    ) -> VfsResult<()>
    where
        P: FnMut(&CopyProgress),
    {
        check_paired(sources, destinations)?;
        let (sources, destinations) = self.with_sidecars(sources, destinations, flags);
        create_parent_dirs(&destinations).await?;

        let total_files = sources.len();
        for (index, (source, destination)) in
            sources.iter().zip(destinations.iter()).enumerate()
        {
            if cancel.is_cancelled() {
                return Err(VfsError::Cancelled);
            }

            if !flags.overwrite && path_exists(destination).await {
                return Err(VfsError::AlreadyExists(destination.clone()));
            }

            match tokio::fs::rename(source, destination).await {
                Ok(()) => {
                    on_progress(&CopyProgress {
                        file_index: index + 1,
                        total_files,
                        source: source.clone(),
                        destination: destination.clone(),
                        bytes_done: 0,
                        bytes_total: 0,
                    });
                    continue;
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    info!(source = %source.display(), "source missing, skipping");
                    continue;
                }
                Err(_) => {
                    // Cross-device move: fall back to copy + delete.
                }
            }

            copy_one_file(
                source,
                destination,
                flags.overwrite,
                cancel,
                |bytes_done, bytes_total| {
                    on_progress(&CopyProgress {
                        file_index: index + 1,
                        total_files,
                        source: source.clone(),
                        destination: destination.clone(),
                        bytes_done,
                        bytes_total,
                    })
                },
            )
            .await?;
            tokio::fs::remove_file(source)
                .await
                .map_err(|e| VfsError::from_io(e, source))?;
        }

        Ok(())
    }

    /// Delete files in order; the first failure aborts. Sidecars of
    /// deleted files are removed best-effort when requested.
    pub async fn delete_files(
        &self,
        files: &[PathBuf],
        include_sidecars: bool,
    ) -> VfsResult<()> {
        for file in files {
            tokio::fs::remove_file(file)
                .await
                .map_err(|e| VfsError::from_io(e, file))?;
        }

        if include_sidecars {
            if let Some(provider) = &self.sidecar_provider {
                for file in files {
                    for sidecar in provider.sidecars_for(file) {
                        if let Err(e) = tokio::fs::remove_file(&sidecar).await {
                            debug!(sidecar = %sidecar.display(), error = %e,
                                   "sidecar delete failed");
                        }
                    }
                }
            }
        }

        Ok(())
    }

    /// Append each pair's sidecar pairs to the job when requested.
    fn with_sidecars(
        &self,
        sources: &[PathBuf],
        destinations: &[PathBuf],
        flags: &CopyFlags,
    ) -> (Vec<PathBuf>, Vec<PathBuf>) {
        let mut all_sources = sources.to_vec();
        let mut all_destinations = destinations.to_vec();

        if flags.include_sidecars {
            if let Some(provider) = &self.sidecar_provider {
                for (source, destination) in sources.iter().zip(destinations.iter()) {
                    let source_sidecars = provider.sidecars_for(source);
                    let destination_sidecars = provider.sidecars_for(destination);
                    for (s, d) in source_sidecars
                        .into_iter()
                        .zip(destination_sidecars.into_iter())
                    {
                        all_sources.push(s);
                        all_destinations.push(d);
                    }
                }
            }
        }

        (all_sources, all_destinations)
    }
}

/// Recursively copy `source` into `destination`.
///
/// The destination is validated (an existing non-directory is a
/// `NotDirectory` error) and created if missing. The source tree is
/// walked (recursive, following symlinks at directory level is off so
/// links replay as links) into an ordered replay list, then each entry
/// is materialized: directories created, symlinks recreated with their
/// original target, regular files copied one at a time. Directory and
/// symlink creation failures are tolerated unless `options.strict`; a
/// file-copy failure always aborts.
pub async fn copy_directory<P>(
    source: &Path,
    destination: &Path,
    options: &DirCopyOptions,
    cancel: &CancellationToken,
    mut on_progress: P,
) -> VfsResult<()>
where
    P: FnMut(&CopyProgress),
{
    match stat(destination, true).await {
        Ok(info) if !info.is_dir() => {
            return Err(VfsError::NotDirectory(destination.to_path_buf()));
        }
        Ok(_) => {}
        Err(VfsError::NotFound(_)) => {
            tokio::fs::create_dir_all(destination)
                .await
                .map_err(|e| VfsError::from_io(e, destination))?;
        }
        Err(e) => return Err(e),
    }

    // Collect the whole tree first so the replay owns a stable ordered
    // list and the walk's traversal order is preserved.
    let to_copy: std::cell::RefCell<Vec<(PathBuf, FileInfo)>> = std::cell::RefCell::new(Vec::new());
    walk(
        source,
        &WalkOptions {
            recursive: true,
            follow_symlinks: false,
            ..Default::default()
        },
        cancel,
        |dir, dir_info| {
            to_copy
                .borrow_mut()
                .push((dir.to_path_buf(), dir_info.clone()));
            DirOp::Continue
        },
        |child, info| {
            if !info.is_dir() {
                to_copy
                    .borrow_mut()
                    .push((child.to_path_buf(), info.clone()));
            }
        },
    )
    .await?;
    let to_copy = to_copy.into_inner();

    let total_files = to_copy.len();
    for (index, (path, entry_info)) in to_copy.iter().enumerate() {
        if cancel.is_cancelled() {
            return Err(VfsError::Cancelled);
        }

        let Ok(relative) = path.strip_prefix(source) else {
            continue;
        };
        let target = if relative.as_os_str().is_empty() {
            destination.to_path_buf()
        } else {
            destination.join(relative)
        };

        match entry_info.kind {
            FileKind::Directory => {
                if let Err(e) = tokio::fs::create_dir(&target).await {
                    if e.kind() != std::io::ErrorKind::AlreadyExists {
                        if options.strict {
                            return Err(VfsError::from_io(e, &target));
                        }
                        warn!(target = %target.display(), error = %e,
                              "directory creation failed, continuing");
                    }
                }
            }
            FileKind::Symlink => {
                if let Some(link_target) = &entry_info.symlink_target {
                    if let Err(e) = make_symlink(link_target, &target).await {
                        if options.strict {
                            return Err(e);
                        }
                        warn!(target = %target.display(), error = %e,
                              "symlink creation failed, continuing");
                    }
                }
            }
            FileKind::Regular => {
                copy_one_file(
                    path,
                    &target,
                    options.overwrite,
                    cancel,
                    |bytes_done, bytes_total| {
                        on_progress(&CopyProgress {
                            file_index: index + 1,
                            total_files,
                            source: path.clone(),
                            destination: target.clone(),
                            bytes_done,
                            bytes_total,
                        })
                    },
                )
                .await?;
            }
            FileKind::Other => {}
        }
    }

    Ok(())
}

/// Copy one file in chunks, reporting (bytes_done, bytes_total) per
/// chunk. Cancellation is observed between chunks.
async fn copy_one_file<P>(
    source: &Path,
    destination: &Path,
    overwrite: bool,
    cancel: &CancellationToken,
    mut on_chunk: P,
) -> VfsResult<u64>
where
    P: FnMut(u64, u64),
{
    if !overwrite && path_exists(destination).await {
        return Err(VfsError::AlreadyExists(destination.to_path_buf()));
    }

    let mut reader = tokio::fs::File::open(source)
        .await
        .map_err(|e| VfsError::from_io(e, source))?;
    let bytes_total = reader
        .metadata()
        .await
        .map_err(|e| VfsError::from_io(e, source))?
        .len();

    let mut writer = tokio::fs::File::create(destination)
        .await
        .map_err(|e| VfsError::from_io(e, destination))?;

    let mut buf = vec![0u8; COPY_CHUNK_SIZE];
    let mut bytes_done: u64 = 0;
    loop {
        if cancel.is_cancelled() {
            drop(writer);
            let _ = tokio::fs::remove_file(destination).await;
            return Err(VfsError::Cancelled);
        }
        let n = reader
            .read(&mut buf)
            .await
            .map_err(|e| VfsError::from_io(e, source))?;
        if n == 0 {
            break;
        }
        writer
            .write_all(&buf[..n])
            .await
            .map_err(|e| VfsError::from_io(e, destination))?;
        bytes_done += n as u64;
        on_chunk(bytes_done, bytes_total);
    }
    writer
        .flush()
        .await
        .map_err(|e| VfsError::from_io(e, destination))?;

    Ok(bytes_done)
}

fn check_paired(sources: &[PathBuf], destinations: &[PathBuf]) -> VfsResult<()> {
    if sources.len() != destinations.len() {
        return Err(VfsError::UnpairedBatch {
            sources: sources.len(),
            destinations: destinations.len(),
        });
    }
    Ok(())
}

/// Pre-create every destination's parent directory, deduplicated.
async fn create_parent_dirs(destinations: &[PathBuf]) -> VfsResult<()> {
    let mut parents: HashSet<&Path> = HashSet::new();
    for destination in destinations {
        if let Some(parent) = destination.parent() {
            if !parent.as_os_str().is_empty() {
                parents.insert(parent);
            }
        }
    }
    for parent in parents {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| VfsError::from_io(e, parent))?;
    }
    Ok(())
}

async fn path_exists(path: &Path) -> bool {
    tokio::fs::symlink_metadata(path).await.is_ok()
}

#[cfg(unix)]
async fn make_symlink(link_target: &Path, at: &Path) -> VfsResult<()> {
    tokio::fs::symlink(link_target, at)
        .await
        .map_err(|e| VfsError::from_io(e, at))
}

#[cfg(not(unix))]
async fn make_symlink(_link_target: &Path, at: &Path) -> VfsResult<()> {
    warn!(target = %at.display(), "symlink recreation unsupported on this platform");
    Ok(())
}
