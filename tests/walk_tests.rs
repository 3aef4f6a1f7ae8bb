//! Integration tests for the directory walker.

use gallery_vfs::{walk, DirOp, VfsError, WalkOptions, WalkOutcome};
use std::path::PathBuf;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

async fn make_tree(root: &std::path::Path) {
    tokio::fs::create_dir_all(root.join("sub1")).await.unwrap();
    tokio::fs::create_dir_all(root.join("sub2/nested")).await.unwrap();
    tokio::fs::write(root.join("a.txt"), b"a").await.unwrap();
    tokio::fs::write(root.join("sub1/b.txt"), b"b").await.unwrap();
    tokio::fs::write(root.join("sub2/c.txt"), b"c").await.unwrap();
    tokio::fs::write(root.join("sub2/nested/d.txt"), b"d")
        .await
        .unwrap();
}

/// Every entry is reported exactly once, directories before their
/// children are drained (FIFO, not depth-first).
#[tokio::test]
async fn test_walk_visits_every_entry_once() {
    let tmp = TempDir::new().unwrap();
    make_tree(tmp.path()).await;

    let mut dirs: Vec<PathBuf> = Vec::new();
    let mut children: Vec<PathBuf> = Vec::new();
    let outcome = walk(
        tmp.path(),
        &WalkOptions::default(),
        &CancellationToken::new(),
        |dir, _| {
            dirs.push(dir.to_path_buf());
            DirOp::Continue
        },
        |child, _| children.push(child.to_path_buf()),
    )
    .await
    .unwrap();

    assert_eq!(outcome, WalkOutcome::Completed);
    assert_eq!(dirs.len(), 4, "root, sub1, sub2, nested: {dirs:?}");
    assert_eq!(children.len(), 7, "3 dirs + 4 files as children: {children:?}");

    let mut sorted = children.clone();
    sorted.sort();
    sorted.dedup();
    assert_eq!(sorted.len(), children.len(), "no entry reported twice");

    // The root's own enumeration completes before any subdirectory is
    // entered.
    assert_eq!(dirs[0], tmp.path());
}

/// A symlink cycle back to an ancestor terminates and visits each
/// directory exactly once.
#[cfg(unix)]
#[tokio::test]
async fn test_walk_survives_symlink_cycle() {
    let tmp = TempDir::new().unwrap();
    tokio::fs::create_dir_all(tmp.path().join("a/b")).await.unwrap();
    tokio::fs::write(tmp.path().join("a/file.txt"), b"x")
        .await
        .unwrap();
    tokio::fs::symlink(tmp.path().join("a"), tmp.path().join("a/b/loop"))
        .await
        .unwrap();

    let mut enter_count = 0usize;
    let outcome = walk(
        tmp.path(),
        &WalkOptions {
            follow_symlinks: true,
            ..Default::default()
        },
        &CancellationToken::new(),
        |_, _| {
            enter_count += 1;
            DirOp::Continue
        },
        |_, _| {},
    )
    .await
    .unwrap();

    assert_eq!(outcome, WalkOutcome::Completed);
    assert_eq!(enter_count, 3, "root, a, b; the loop link is dropped");
}

/// Skip drops the subtree; Stop ends the walk.
#[tokio::test]
async fn test_walk_skip_and_stop() {
    let tmp = TempDir::new().unwrap();
    make_tree(tmp.path()).await;

    let mut seen_files: Vec<PathBuf> = Vec::new();
    let outcome = walk(
        tmp.path(),
        &WalkOptions::default(),
        &CancellationToken::new(),
        |dir, _| {
            if dir.ends_with("sub2") {
                DirOp::Skip
            } else {
                DirOp::Continue
            }
        },
        |child, info| {
            if !info.is_dir() {
                seen_files.push(child.to_path_buf());
            }
        },
    )
    .await
    .unwrap();

    assert_eq!(outcome, WalkOutcome::Completed);
    assert!(
        !seen_files.iter().any(|f| f.starts_with(tmp.path().join("sub2/nested"))),
        "skipped subtree must not be descended into"
    );

    // Stop on the root: outcome is Stopped, nothing enumerated.
    let mut any_child = false;
    let outcome = walk(
        tmp.path(),
        &WalkOptions::default(),
        &CancellationToken::new(),
        |_, _| DirOp::Stop,
        |_, _| any_child = true,
    )
    .await
    .unwrap();
    assert_eq!(outcome, WalkOutcome::Stopped);
    assert!(!any_child);
}

/// Cancelling mid-traversal surfaces Cancelled and fires no further
/// callbacks: the token is cancelled while the root is enumerating, so
/// no subdirectory is ever entered.
#[tokio::test]
async fn test_walk_cancellation_stops_callbacks() {
    let tmp = TempDir::new().unwrap();
    make_tree(tmp.path()).await;

    let cancel = CancellationToken::new();
    let mut entered: Vec<PathBuf> = Vec::new();

    let result = {
        let cancel = cancel.clone();
        walk(
            tmp.path(),
            &WalkOptions::default(),
            &cancel.clone(),
            |dir, _| {
                entered.push(dir.to_path_buf());
                DirOp::Continue
            },
            move |_, _| cancel.cancel(),
        )
        .await
    };

    assert!(matches!(result, Err(VfsError::Cancelled)));
    assert_eq!(
        entered,
        vec![tmp.path().to_path_buf()],
        "no subdirectory may be entered after cancellation"
    );
}

/// With `batch_size: 1` every child is a checkpoint: cancelling during
/// a large directory's enumeration stops it after the entry in flight,
/// not at the end of the directory.
#[tokio::test]
async fn test_walk_batch_checkpoint_cancels_mid_enumeration() {
    let tmp = TempDir::new().unwrap();
    for i in 0..16 {
        tokio::fs::write(tmp.path().join(format!("f{i:02}")), b"x")
            .await
            .unwrap();
    }

    let cancel = CancellationToken::new();
    let cancel_inner = cancel.clone();
    let mut reported = 0usize;

    let result = walk(
        tmp.path(),
        &WalkOptions {
            batch_size: 1,
            ..Default::default()
        },
        &cancel,
        |_, _| DirOp::Continue,
        |_, _| {
            reported += 1;
            cancel_inner.cancel();
        },
    )
    .await;

    assert!(matches!(result, Err(VfsError::Cancelled)));
    assert_eq!(
        reported, 1,
        "the batch boundary after the first entry must observe the token"
    );
}

/// Non-recursive walk reports the root's children only.
#[tokio::test]
async fn test_walk_non_recursive() {
    let tmp = TempDir::new().unwrap();
    make_tree(tmp.path()).await;

    let mut dirs = 0usize;
    let mut children = 0usize;
    walk(
        tmp.path(),
        &WalkOptions {
            recursive: false,
            ..Default::default()
        },
        &CancellationToken::new(),
        |_, _| {
            dirs += 1;
            DirOp::Continue
        },
        |_, _| children += 1,
    )
    .await
    .unwrap();

    assert_eq!(dirs, 1, "only the root is entered");
    assert_eq!(children, 3, "a.txt, sub1, sub2");
}
