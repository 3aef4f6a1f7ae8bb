//! Per-source event queues and their transition rules.
//!
//! A file's pending state is its membership in one of three
//! insertion-ordered lists. Invariant: a given file appears in at most
//! one list at any instant.
//!
//! Transition rules for a raw event on file F:
//! - Created: if F is pending-deleted, the delete-then-create pair is a
//!   content replace, so F moves to pending-changed. Otherwise enqueue
//!   pending-created (deduplicated).
//! - Deleted: an add undone before flush yields nothing; when F was
//!   pending-created it is removed and no delete is queued. Otherwise F
//!   leaves pending-changed (if there) and joins pending-deleted.
//! - Changed / AttributeChanged: covered already when F is
//!   pending-created; otherwise move-to-latest in pending-changed.
//! - ChangesDoneHint / PreUnmount / Unmounted: ignored.

use super::{ChangeKind, ChangeNotification, RawEvent};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// The three per-kind pending lists for one filesystem source.
#[derive(Debug, Default)]
pub struct EventQueues {
    created: Vec<PathBuf>,
    deleted: Vec<PathBuf>,
    changed: Vec<PathBuf>,
}

impl EventQueues {
    /// Apply one raw event. Returns whether any queue mutated (only
    /// mutations restart the debounce timer).
    pub fn apply(&mut self, event: &RawEvent) -> bool {
        match event {
            RawEvent::Created(file) => {
                if remove_if_present(&mut self.deleted, file) {
                    move_to_latest(&mut self.changed, file);
                    true
                } else if self.created.iter().any(|f| f == file) {
                    false
                } else {
                    self.created.push(file.clone());
                    true
                }
            }
            RawEvent::Deleted(file) => {
                if remove_if_present(&mut self.created, file) {
                    // Created and deleted within one window: net nothing.
                    return true;
                }
                let mut mutated = remove_if_present(&mut self.changed, file);
                if !self.deleted.iter().any(|f| f == file) {
                    self.deleted.push(file.clone());
                    mutated = true;
                }
                mutated
            }
            RawEvent::Changed(file) | RawEvent::AttributeChanged(file) => {
                if self.created.iter().any(|f| f == file) {
                    // A pending Created already covers the new content.
                    false
                } else {
                    move_to_latest(&mut self.changed, file);
                    true
                }
            }
            RawEvent::ChangesDoneHint | RawEvent::PreUnmount | RawEvent::Unmounted => false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.created.is_empty() && self.deleted.is_empty() && self.changed.is_empty()
    }

    /// Drain all three queues into notifications: one per (kind,
    /// parent directory) with files in arrival order. Kind order is
    /// Created, Deleted, Changed.
    pub fn drain(&mut self) -> Vec<ChangeNotification> {
        let mut out = Vec::new();
        group_by_parent(std::mem::take(&mut self.created), ChangeKind::Created, &mut out);
        group_by_parent(std::mem::take(&mut self.deleted), ChangeKind::Deleted, &mut out);
        group_by_parent(std::mem::take(&mut self.changed), ChangeKind::Changed, &mut out);
        out
    }
}

fn remove_if_present(queue: &mut Vec<PathBuf>, file: &Path) -> bool {
    if let Some(pos) = queue.iter().position(|f| f == file) {
        queue.remove(pos);
        true
    } else {
        false
    }
}

fn move_to_latest(queue: &mut Vec<PathBuf>, file: &Path) {
    remove_if_present(queue, file);
    queue.push(file.to_path_buf());
}

fn group_by_parent(files: Vec<PathBuf>, kind: ChangeKind, out: &mut Vec<ChangeNotification>) {
    let mut order: Vec<PathBuf> = Vec::new();
    let mut grouped: HashMap<PathBuf, Vec<PathBuf>> = HashMap::new();

    for file in files {
        let parent = file
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("/"));
        grouped
            .entry(parent.clone())
            .or_insert_with(|| {
                order.push(parent.clone());
                Vec::new()
            })
            .push(file);
    }

    for parent in order {
        if let Some(files) = grouped.remove(&parent) {
            out.push(ChangeNotification {
                parent,
                files,
                kind,
            });
        }
    }
}
