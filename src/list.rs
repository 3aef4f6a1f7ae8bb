//! Filtered directory listing built on the walker.
//!
//! Produces separate file and directory lists. When an include or
//! exclude pattern narrows the result, the directory list is rebuilt
//! from the parent chains of the matched files so that directories
//! holding nothing of interest are not reported. The base directory
//! itself is always included even when empty.

use crate::error::VfsResult;
use crate::file_ref::FileKind;
use crate::filter::{Filter, FilterFlags};
use crate::walk::{walk, DirOp, WalkOptions};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Listing options. `Default` lists everything recursively with no
/// filtering, reporting absolute paths.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListOptions {
    /// When set, final paths are relativized to this directory and
    /// entries outside it are dropped. The base itself is reported
    /// as `"."`.
    pub base_dir: Option<PathBuf>,
    pub recursive: bool,
    pub follow_symlinks: bool,
    pub exclude_dotfiles: bool,
    pub exclude_backup: bool,
    pub case_insensitive: bool,
    /// Files must match this pattern (empty or `*`: keep all).
    pub include_pattern: String,
    /// Files matching this pattern are dropped.
    pub exclude_pattern: String,
    /// Directories whose name matches this pattern are skipped with
    /// their whole subtree.
    pub exclude_folder_pattern: String,
}

impl Default for ListOptions {
    fn default() -> Self {
        ListOptions {
            base_dir: None,
            recursive: true,
            follow_symlinks: false,
            exclude_dotfiles: false,
            exclude_backup: false,
            case_insensitive: false,
            include_pattern: String::new(),
            exclude_pattern: String::new(),
            exclude_folder_pattern: String::new(),
        }
    }
}

/// Result of `list`: files and directories, in traversal order.
#[derive(Debug, Clone, Default)]
pub struct Listing {
    pub files: Vec<PathBuf>,
    pub dirs: Vec<PathBuf>,
}

/// List `root` according to `options`.
pub async fn list(
    root: &Path,
    options: &ListOptions,
    cancel: &CancellationToken,
) -> VfsResult<Listing> {
    let include = Filter::new(
        &options.include_pattern,
        FilterFlags {
            case_insensitive: options.case_insensitive,
            exclude_dotfiles: options.exclude_dotfiles,
            exclude_backup: options.exclude_backup,
        },
    )?;
    let exclude = Filter::new(
        &options.exclude_pattern,
        FilterFlags {
            case_insensitive: options.case_insensitive,
            ..Default::default()
        },
    )?;
    let exclude_folders = Filter::new(
        &options.exclude_folder_pattern,
        FilterFlags {
            case_insensitive: options.case_insensitive,
            ..Default::default()
        },
    )?;

    let walk_options = WalkOptions {
        recursive: options.recursive,
        follow_symlinks: options.follow_symlinks,
        ..Default::default()
    };

    let mut files: Vec<PathBuf> = Vec::new();
    let mut dirs: Vec<PathBuf> = Vec::new();

    walk(
        root,
        &walk_options,
        cancel,
        |dir, _info| {
            if !exclude_folders.is_empty() && exclude_folders.matches(dir) {
                debug!(path = %dir.display(), "skipping excluded folder");
                return DirOp::Skip;
            }
            dirs.push(dir.to_path_buf());
            DirOp::Continue
        },
        |child, info| {
            if info.kind != FileKind::Regular {
                return;
            }
            if include.matches(child) && (exclude.is_empty() || !exclude.matches(child)) {
                files.push(child.to_path_buf());
            }
        },
    )
    .await?;

    // A narrowing file pattern invalidates the collected directory
    // list: rebuild it from the matched files' parents so empty
    // directories of no interest disappear.
    let narrowed = !include.is_empty() || !exclude.is_empty();
    if narrowed {
        dirs.clear();
    }

    let base = options.base_dir.as_deref();
    // Parent chains never climb past the base, or past the traversal
    // root when no base is given.
    let boundary = base.unwrap_or(root);
    let mut seen: HashSet<PathBuf> = HashSet::new();
    let mut final_dirs: Vec<PathBuf> = Vec::new();

    // The base directory is always reported, even when empty.
    seen.insert(boundary.to_path_buf());
    final_dirs.push(boundary.to_path_buf());
    for dir in &dirs {
        if seen.insert(dir.clone()) {
            final_dirs.push(dir.clone());
        }
    }

    // Fill in every ancestor of the matched files (and, when no
    // narrowing applied, of the listed directories) up to the boundary.
    add_parent_chains(&mut final_dirs, &mut seen, boundary, &files);
    if !narrowed {
        let snapshot = final_dirs.clone();
        add_parent_chains(&mut final_dirs, &mut seen, boundary, &snapshot);
    }

    if let Some(base) = base {
        Ok(Listing {
            files: relativize(&files, base),
            dirs: relativize(&final_dirs, base),
        })
    } else {
        Ok(Listing {
            files,
            dirs: final_dirs,
        })
    }
}

/// Append each path's parent chain, strictly below `boundary`, to
/// `dirs`, deduplicating through `seen`.
fn add_parent_chains(
    dirs: &mut Vec<PathBuf>,
    seen: &mut HashSet<PathBuf>,
    boundary: &Path,
    paths: &[PathBuf],
) {
    for path in paths {
        let mut parent = path.parent();
        while let Some(dir) = parent {
            if dir.as_os_str().is_empty() || !dir.starts_with(boundary) || dir == boundary {
                break;
            }
            if seen.insert(dir.to_path_buf()) {
                dirs.push(dir.to_path_buf());
            }
            parent = dir.parent();
        }
    }
}

/// Keep only paths under `base`, stripped of the base prefix. The base
/// itself becomes `"."`.
fn relativize(paths: &[PathBuf], base: &Path) -> Vec<PathBuf> {
    paths
        .iter()
        .filter_map(|path| {
            if path == base {
                Some(PathBuf::from("."))
            } else {
                path.strip_prefix(base).ok().map(PathBuf::from)
            }
        })
        .collect()
}
