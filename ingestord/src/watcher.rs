//! Inbox watcher: a debounced filesystem event source. It only tells the
//! scheduling kernel "something changed under the inbox" — settling and
//! deciding what to do about it is the controller's job, not this one's.

use notify::{RecommendedWatcher, RecursiveMode};
use notify_debouncer_full::{new_debouncer, DebounceEventResult, Debouncer, FileIdMap};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

const DEBOUNCE_WINDOW: Duration = Duration::from_millis(500);
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// A single coalesced change under a watched root.
#[derive(Debug, Clone)]
pub enum WatchEvent {
    Created(PathBuf),
    Modified(PathBuf),
    Removed(PathBuf),
    DirCreated(PathBuf),
    Error(String),
}

#[derive(Debug, Error)]
pub enum WatchError {
    #[error("failed to initialize watcher: {0}")]
    Init(String),
    #[error("failed to watch path: {0}")]
    Watch(String),
}

/// Handle to a running inbox watcher. Dropping it stops the watch.
pub struct InboxWatcher {
    _debouncer: Debouncer<RecommendedWatcher, FileIdMap>,
    running: Arc<AtomicBool>,
}

impl InboxWatcher {
    /// Start watching `root` recursively, returning the handle and a
    /// receiver of coalesced events.
    pub fn new(root: &std::path::Path) -> Result<(Self, mpsc::Receiver<WatchEvent>), WatchError> {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let running = Arc::new(AtomicBool::new(true));
        let running_clone = Arc::clone(&running);

        let mut debouncer = new_debouncer(DEBOUNCE_WINDOW, None, move |result: DebounceEventResult| {
            if !running_clone.load(Ordering::Relaxed) {
                return;
            }
            handle_debounced_events(result, &tx);
        })
        .map_err(|e| WatchError::Init(e.to_string()))?;

        debouncer
            .watch(root, RecursiveMode::Recursive)
            .map_err(|e| WatchError::Watch(e.to_string()))?;

        Ok((
            Self {
                _debouncer: debouncer,
                running,
            },
            rx,
        ))
    }
}

impl Drop for InboxWatcher {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        tracing::debug!("inbox watcher stopped");
    }
}

fn handle_debounced_events(result: DebounceEventResult, tx: &mpsc::Sender<WatchEvent>) {
    match result {
        Ok(events) => {
            for event in events {
                for path in &event.paths {
                    if path.is_file() && !crate::paths::is_audio_file(path) {
                        continue;
                    }

                    let watch_event = match event.kind {
                        notify::EventKind::Create(notify::event::CreateKind::File) => {
                            Some(WatchEvent::Created(path.clone()))
                        }
                        notify::EventKind::Create(notify::event::CreateKind::Folder) => {
                            Some(WatchEvent::DirCreated(path.clone()))
                        }
                        notify::EventKind::Modify(notify::event::ModifyKind::Data(_))
                        | notify::EventKind::Modify(notify::event::ModifyKind::Metadata(_)) => {
                            Some(WatchEvent::Modified(path.clone()))
                        }
                        notify::EventKind::Remove(notify::event::RemoveKind::File) => {
                            Some(WatchEvent::Removed(path.clone()))
                        }
                        _ => None,
                    };

                    if let Some(evt) = watch_event {
                        let _ = tx.try_send(evt);
                    }
                }
            }
        }
        Err(errors) => {
            for error in errors {
                tracing::warn!(error = %error, "inbox watch error");
                let _ = tx.try_send(WatchEvent::Error(error.to_string()));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn watcher_creation_and_drop_does_not_panic() {
        let dir = TempDir::new().unwrap();
        let (watcher, _rx) = InboxWatcher::new(dir.path()).unwrap();
        drop(watcher);
    }

    #[tokio::test]
    async fn watcher_detects_new_audio_file() {
        let dir = TempDir::new().unwrap();
        let (watcher, mut rx) = InboxWatcher::new(dir.path()).unwrap();

        let file_path = dir.path().join("new_song.mp3");
        std::fs::write(&file_path, b"fake mp3 content").unwrap();

        let event = tokio::time::timeout(Duration::from_secs(2), rx.recv()).await;
        drop(watcher);

        if let Ok(Some(WatchEvent::Created(path))) = event {
            assert_eq!(path.file_name().unwrap(), "new_song.mp3");
        }
    }
}
