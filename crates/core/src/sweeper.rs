use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{info, warn};
use walkdir::WalkDir;

/// Deletes session folders under `root` older than `max_age`. Per-folder
/// failures are logged and skipped. Returns the number of folders removed.
pub fn sweep_once(root: &Path, max_age: Duration) -> usize {
    if !root.is_dir() {
        return 0;
    }

    let now = SystemTime::now();
    let mut removed = 0;

    for entry in WalkDir::new(root)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|item| item.ok())
    {
        if !entry.file_type().is_dir() {
            continue;
        }

        let age = entry
            .metadata()
            .ok()
            .and_then(|metadata| metadata.modified().ok())
            .and_then(|modified| now.duration_since(modified).ok());
        let Some(age) = age else {
            continue;
        };

        if age > max_age {
            match std::fs::remove_dir_all(entry.path()) {
                Ok(()) => {
                    info!(path = %entry.path().display(), "removed stale session folder");
                    removed += 1;
                }
                Err(error) => {
                    warn!(path = %entry.path().display(), %error, "failed to remove session folder");
                }
            }
        }
    }

    removed
}

/// Fire-and-forget periodic sweep for the lifetime of the process.
pub fn spawn(root: PathBuf, interval: Duration, max_age: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            sweep_once(&root, max_age);
        }
    })
}
