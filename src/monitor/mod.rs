//! Filesystem-change coalescing.
//!
//! Raw events from a filesystem source are merged into minimal
//! notifications: bursts collapse behind a debounce timer, and a file
//! that flaps within one window (created then deleted, deleted then
//! recreated) yields the single notification that describes the net
//! effect. Subscribers receive `(parent directory, files, kind)`
//! batches, the sole channel by which the rest of the application
//! learns of underlying filesystem changes.

mod queues;

pub use queues::EventQueues;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::debug;

/// Quiet period before queued events flush.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);

/// Raw event as delivered by the underlying watcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawEvent {
    Created(PathBuf),
    Deleted(PathBuf),
    Changed(PathBuf),
    AttributeChanged(PathBuf),
    ChangesDoneHint,
    PreUnmount,
    Unmounted,
}

/// Net change kind reported to subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeKind {
    Created,
    Deleted,
    Changed,
}

/// One coalesced batch: files sharing a parent directory and a kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeNotification {
    pub parent: PathBuf,
    pub files: Vec<PathBuf>,
    pub kind: ChangeKind,
}

/// Monitor configuration. The debounce default matches production; it
/// is configurable so tests can shrink the window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    pub debounce: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        MonitorConfig {
            debounce: DEFAULT_DEBOUNCE,
        }
    }
}

/// Handle to a spawned coalescing task. One per filesystem source, kept
/// for the source's whole lifetime. Dropping the handle flushes any
/// pending events and ends the task.
pub struct FileMonitor {
    raw_tx: mpsc::UnboundedSender<RawEvent>,
}

impl FileMonitor {
    /// Spawn the coalescing task, returning the submit handle and the
    /// notification stream.
    pub fn spawn(
        config: MonitorConfig,
    ) -> (FileMonitor, mpsc::UnboundedReceiver<ChangeNotification>) {
        let (raw_tx, raw_rx) = mpsc::unbounded_channel();
        let (note_tx, note_rx) = mpsc::unbounded_channel();

        tokio::spawn(run_coalescer(config, raw_rx, note_tx));

        (FileMonitor { raw_tx }, note_rx)
    }

    /// Feed one raw event. Events submitted after the task ended are
    /// dropped silently.
    pub fn submit(&self, event: RawEvent) {
        let _ = self.raw_tx.send(event);
    }

    /// Feed everything a `notify` backend reported.
    pub fn submit_notify(&self, event: &notify::Event) {
        for raw in raw_events_from_notify(event) {
            self.submit(raw);
        }
    }
}

async fn run_coalescer(
    config: MonitorConfig,
    mut raw_rx: mpsc::UnboundedReceiver<RawEvent>,
    note_tx: mpsc::UnboundedSender<ChangeNotification>,
) {
    let mut queues = EventQueues::default();
    let mut deadline: Option<Instant> = None;

    loop {
        tokio::select! {
            event = raw_rx.recv() => match event {
                Some(event) => {
                    // Every queue mutation restarts the debounce window.
                    if queues.apply(&event) {
                        deadline = Some(Instant::now() + config.debounce);
                    }
                }
                None => break,
            },
            _ = wait_until(deadline) => {
                deadline = None;
                flush(&mut queues, &note_tx);
            }
        }
    }

    // Handle dropped: deliver whatever is still pending.
    flush(&mut queues, &note_tx);
    debug!("change coalescer stopped");
}

fn flush(queues: &mut EventQueues, note_tx: &mpsc::UnboundedSender<ChangeNotification>) {
    for notification in queues.drain() {
        if note_tx.send(notification).is_err() {
            return;
        }
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Map one `notify` event into raw coalescer inputs. Renames become a
/// Deleted/Created pair so the queue rules can collapse same-window
/// replacements into Changed.
pub fn raw_events_from_notify(event: &notify::Event) -> Vec<RawEvent> {
    use notify::event::{ModifyKind, RenameMode};
    use notify::EventKind;

    match &event.kind {
        EventKind::Create(_) => event
            .paths
            .iter()
            .cloned()
            .map(RawEvent::Created)
            .collect(),
        EventKind::Remove(_) => event
            .paths
            .iter()
            .cloned()
            .map(RawEvent::Deleted)
            .collect(),
        EventKind::Modify(ModifyKind::Metadata(_)) => event
            .paths
            .iter()
            .cloned()
            .map(RawEvent::AttributeChanged)
            .collect(),
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => event
            .paths
            .iter()
            .cloned()
            .map(RawEvent::Deleted)
            .collect(),
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => event
            .paths
            .iter()
            .cloned()
            .map(RawEvent::Created)
            .collect(),
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            let mut out = Vec::with_capacity(2);
            if let Some(from) = event.paths.first() {
                out.push(RawEvent::Deleted(from.clone()));
            }
            if let Some(to) = event.paths.get(1) {
                out.push(RawEvent::Created(to.clone()));
            }
            out
        }
        EventKind::Modify(_) => event
            .paths
            .iter()
            .cloned()
            .map(RawEvent::Changed)
            .collect(),
        _ => Vec::new(),
    }
}
