//! Storage-root observer: OS file events → bus events.
//!
//! Watches the storage root recursively (stored files live one level down,
//! in per-user directories) and publishes `{basename, action}` tuples into
//! the notification bus. The watcher callback runs on the `notify` thread;
//! a small mpsc channel bridges into a tokio task that does the publishing,
//! the same bridge the credential-reload path uses elsewhere in this family
//! of daemons.
//!
//! Once started the watcher runs until its handle is dropped; callback
//! errors are logged and watching continues.

use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::bus::{NotificationBus, UpdateAction, UpdateEvent};

/// Handle to a running storage watcher; dropping it stops the watch.
pub struct StorageWatcher {
    _watcher: RecommendedWatcher,
    _task: tokio::task::JoinHandle<()>,
    root: PathBuf,
}

impl StorageWatcher {
    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Start observing `root` and publishing its changes into `bus`.
///
/// Only setup errors are returned; runtime watch errors are logged.
pub fn watch_storage(
    root: PathBuf,
    bus: Arc<NotificationBus>,
) -> Result<StorageWatcher, notify::Error> {
    let (tx, mut rx) = tokio::sync::mpsc::channel::<UpdateEvent>(256);

    let mut watcher: RecommendedWatcher =
        notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => {
                for update in map_event(&event) {
                    // Bounded bridge; if it fills, the bus's own lag policy
                    // would have dropped the event for slow readers anyway
                    let _ = tx.try_send(update);
                }
            }
            Err(e) => {
                warn!("storage watch error: {e}");
            }
        })?;

    watcher.watch(&root, RecursiveMode::Recursive)?;
    info!(root = %root.display(), "watching storage for changes");

    let task = tokio::spawn(async move {
        while let Some(update) = rx.recv().await {
            debug!(file = %update.filename, action = %update.action, "storage change");
            bus.publish(update);
        }
    });

    Ok(StorageWatcher {
        _watcher: watcher,
        _task: task,
        root,
    })
}

/// Translate one OS event into zero or more bus events.
///
/// Create and content/metadata modifications map to `created`; removals map
/// to `deleted`; renames decompose into `deleted` + `created`. Directory
/// creation (lazy user dirs) is filtered out.
fn map_event(event: &Event) -> Vec<UpdateEvent> {
    match event.kind {
        EventKind::Create(_) => events_for(&event.paths, UpdateAction::Created),
        EventKind::Remove(_) => events_for(&event.paths, UpdateAction::Deleted),
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
            events_for(&event.paths, UpdateAction::Deleted)
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
            events_for(&event.paths, UpdateAction::Created)
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            // paths = [from, to]
            let mut out = Vec::new();
            if let Some(from) = event.paths.first() {
                out.extend(events_for(std::slice::from_ref(from), UpdateAction::Deleted));
            }
            if let Some(to) = event.paths.get(1) {
                out.extend(events_for(std::slice::from_ref(to), UpdateAction::Created));
            }
            out
        }
        EventKind::Modify(_) => events_for(&event.paths, UpdateAction::Created),
        _ => Vec::new(),
    }
}

fn events_for(paths: &[PathBuf], action: UpdateAction) -> Vec<UpdateEvent> {
    paths
        .iter()
        .filter_map(|path| {
            if action == UpdateAction::Created && path.is_dir() {
                return None;
            }
            let name = path.file_name()?.to_str()?;
            Some(UpdateEvent {
                filename: name.to_string(),
                action,
            })
        })
        .collect()
}
