//! Debounced reload of the credential files.
//!
//! The watcher subscribes to the **parent directory** of each credential file
//! because common editors save by unlink-and-rename; watching the file inode
//! itself would go silent after the first save. Create, write and rename
//! events that target the watched file name arm a 100 ms quiet timer; further
//! events within that window re-arm it, so an editor's multi-event save burst
//! produces exactly one reload. A failed reload keeps the previous in-memory
//! state.

use std::collections::HashMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::{mpsc, watch};
use tokio::time::{sleep_until, Instant};

pub const DEBOUNCE: Duration = Duration::from_millis(100);

/// Invoked after the quiet period. Must swap store state only on success.
pub type ReloadFn = Arc<dyn Fn() -> anyhow::Result<()> + Send + Sync>;

pub struct WatchTarget {
    pub path: PathBuf,
    pub reload: ReloadFn,
}

/// Keeps the OS subscription and the debounce task alive for the server
/// lifetime. Dropping it stops both.
pub struct CredentialWatcher {
    _watcher: RecommendedWatcher,
    _task: tokio::task::JoinHandle<()>,
}

/// Starts watching. Reload callbacks run on the single debounce task, so no
/// two reloads for the same file (or any file) ever overlap.
pub fn spawn(
    targets: Vec<WatchTarget>,
    shutdown: watch::Receiver<bool>,
) -> anyhow::Result<CredentialWatcher> {
    let names: Vec<OsString> = targets
        .iter()
        .map(|t| {
            t.path
                .file_name()
                .map(|n| n.to_os_string())
                .ok_or_else(|| anyhow::anyhow!("cannot watch path without a file name: {}", t.path.display()))
        })
        .collect::<anyhow::Result<_>>()?;

    let (tx, rx) = mpsc::unbounded_channel::<usize>();
    let mut watcher = notify::recommended_watcher({
        let names = names.clone();
        move |res: notify::Result<Event>| {
            let event = match res {
                Ok(event) => event,
                Err(err) => {
                    tracing::warn!(error = %err, "file watcher error");
                    return;
                }
            };
            if !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
                return;
            }
            for path in &event.paths {
                let Some(name) = path.file_name() else { continue };
                for (idx, expected) in names.iter().enumerate() {
                    if name == expected.as_os_str() {
                        // receiver gone means shutdown; nothing to do
                        let _ = tx.send(idx);
                    }
                }
            }
        }
    })?;

    let mut dirs: Vec<PathBuf> = targets
        .iter()
        .map(|t| {
            t.path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."))
                .to_path_buf()
        })
        .collect();
    dirs.sort();
    dirs.dedup();
    for dir in &dirs {
        watcher.watch(dir, RecursiveMode::NonRecursive)?;
    }

    let task = tokio::spawn(debounce_loop(targets, rx, shutdown));

    Ok(CredentialWatcher {
        _watcher: watcher,
        _task: task,
    })
}

async fn debounce_loop(
    targets: Vec<WatchTarget>,
    mut rx: mpsc::UnboundedReceiver<usize>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut pending: HashMap<usize, Instant> = HashMap::new();

    loop {
        let deadline = pending
            .values()
            .min()
            .copied()
            .unwrap_or_else(|| Instant::now() + Duration::from_secs(3600));
        let armed = !pending.is_empty();

        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            received = rx.recv() => {
                match received {
                    Some(idx) => {
                        pending.insert(idx, Instant::now() + DEBOUNCE);
                    }
                    None => break,
                }
            }
            _ = sleep_until(deadline), if armed => {
                let now = Instant::now();
                let due: Vec<usize> = pending
                    .iter()
                    .filter(|(_, at)| **at <= now)
                    .map(|(idx, _)| *idx)
                    .collect();
                for idx in due {
                    pending.remove(&idx);
                    let target = &targets[idx];
                    match (target.reload)() {
                        Ok(()) => {
                            tracing::info!("[AUTH] Reloaded {}", target.path.display());
                        }
                        Err(err) => {
                            tracing::warn!(
                                path = %target.path.display(),
                                error = %err,
                                "credential reload failed, keeping previous state"
                            );
                        }
                    }
                }
            }
        }
    }
}
