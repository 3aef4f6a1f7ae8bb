//! Asynchronous filesystem layer for the gallery media browser.
//!
//! This crate is the browser's only path to the filesystem: recursive
//! enumeration ([`walk`]), filtered listing ([`list`]), sequential
//! multi-file and directory copy ([`copy`]), buffered whole-file I/O
//! ([`io`]), unique-name allocation ([`unique`]), change-notification
//! coalescing ([`monitor`]), and a bounded local mirror for remote
//! files ([`cache`]).
//!
//! Every entry point is async, runs on the caller's task, and accepts a
//! [`CancellationToken`](tokio_util::sync::CancellationToken); within
//! one invocation callbacks fire strictly in enumeration/list order and
//! never overlap. The only internal task is the monitor's debounce
//! owner.

pub mod cache;
pub mod copy;
pub mod error;
pub mod file_ref;
pub mod filter;
pub mod io;
pub mod list;
pub mod monitor;
pub mod unique;
pub mod walk;

pub use cache::{CacheConfig, CacheEntry, CacheStore, RemoteStore};
pub use copy::{
    copy_directory, Copier, CopyFlags, CopyProgress, DirCopyOptions, SidecarProvider,
};
pub use error::{VfsError, VfsResult};
pub use file_ref::{stat, FileInfo, FileKind, FileRef};
pub use filter::{Filter, FilterFlags};
pub use list::{list, ListOptions, Listing};
pub use monitor::{
    ChangeKind, ChangeNotification, FileMonitor, MonitorConfig, RawEvent,
};
pub use unique::{create_unique_dir, create_unique_file};
pub use walk::{walk, DirOp, WalkOptions, WalkOutcome};
