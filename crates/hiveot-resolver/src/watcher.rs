//! Socket directory watcher.
//!
//! Reports `*.socket` files appearing, disappearing or being renamed in one
//! directory. Events arrive on a channel; the consumer debounces and rescans.

use std::path::{Path, PathBuf};
use std::time::Duration;

use hiveot_kernel::folders::SOCKET_EXTENSION;
use hiveot_kernel::{HubError, HubResult};
use notify::event::ModifyKind;
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketEventKind {
    Created,
    Removed,
    Renamed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocketEvent {
    pub kind: SocketEventKind,
    pub path: PathBuf,
}

/// Live watch on a socket directory. Dropping it stops the notifications.
pub struct SocketWatcher {
    dir: PathBuf,
    _watcher: RecommendedWatcher,
}

impl SocketWatcher {
    /// Watch `dir`, creating it when missing.
    pub fn start(dir: &Path) -> HubResult<(Self, mpsc::UnboundedReceiver<SocketEvent>)> {
        std::fs::create_dir_all(dir)?;
        let (tx, rx) = mpsc::unbounded_channel();
        let config = Config::default().with_poll_interval(Duration::from_millis(100));
        let mut watcher = RecommendedWatcher::new(
            move |result: Result<Event, notify::Error>| match result {
                Ok(event) => {
                    let Some(kind) = classify(&event.kind) else {
                        return;
                    };
                    for path in event.paths {
                        if is_socket_file(&path) {
                            debug!("socket event {kind:?}: {}", path.display());
                            let _ = tx.send(SocketEvent { kind, path });
                        }
                    }
                }
                Err(err) => warn!("socket watcher error: {err}"),
            },
            config,
        )
        .map_err(|e| HubError::internal(format!("socket watcher: {e}")))?;
        watcher
            .watch(dir, RecursiveMode::NonRecursive)
            .map_err(|e| HubError::internal(format!("watch {}: {e}", dir.display())))?;
        info!("watching {} for service sockets", dir.display());
        Ok((
            Self {
                dir: dir.to_path_buf(),
                _watcher: watcher,
            },
            rx,
        ))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

fn classify(kind: &EventKind) -> Option<SocketEventKind> {
    match kind {
        EventKind::Create(_) => Some(SocketEventKind::Created),
        EventKind::Remove(_) => Some(SocketEventKind::Removed),
        EventKind::Modify(ModifyKind::Name(_)) => Some(SocketEventKind::Renamed),
        _ => None,
    }
}

pub(crate) fn is_socket_file(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some(SOCKET_EXTENSION)
}
