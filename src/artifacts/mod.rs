//! Temporary artifact tracking and retention.
//!
//! Every file a strategy or post-processor writes is registered here.
//! Files marked in-use (a delivery is still reading them) are never
//! swept; everything else is removed once it outlives the retention
//! window. Release deletes immediately, for files that lost all value
//! the moment they were replaced.

use dashmap::DashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::ArtifactConfig;

#[derive(Debug, Clone)]
struct ArtifactEntry {
    created_at: Instant,
    owner: Uuid,
    // one pin per delivery reading the file, not a flag
    pins: u32,
}

pub struct ArtifactManager {
    entries: DashMap<PathBuf, ArtifactEntry>,
    root_dir: PathBuf,
    retention: Duration,
    sweep_interval: Duration,
}

impl ArtifactManager {
    pub fn new(cfg: &ArtifactConfig) -> Self {
        Self {
            entries: DashMap::new(),
            root_dir: cfg.root_dir.clone(),
            retention: cfg.retention(),
            sweep_interval: cfg.sweep_interval(),
        }
    }

    /// Directory strategies download into. Created lazily on startup.
    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    pub async fn ensure_root(&self) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.root_dir).await
    }

    /// Track a freshly written file. Registration is idempotent per
    /// path; re-registering restarts the retention clock.
    pub fn register(&self, path: &Path, owner: Uuid) {
        self.entries.insert(
            path.to_path_buf(),
            ArtifactEntry {
                created_at: Instant::now(),
                owner,
                pins: 0,
            },
        );
        debug!(path = %path.display(), %owner, "artifact registered");
    }

    /// Delete a file that no longer has any value. Missing files are
    /// fine, someone may have cleaned up manually.
    pub async fn release(&self, path: &Path) {
        self.entries.remove(path);
        match tokio::fs::remove_file(path).await {
            Ok(()) => debug!(path = %path.display(), "artifact released"),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => warn!(path = %path.display(), error = %err, "failed to remove artifact"),
        }
    }

    /// Protect a file from sweeping while a delivery reads it. Pins
    /// stack, so concurrent deliveries of the same file each take and
    /// drop their own.
    pub fn mark_in_use(&self, path: &Path) {
        if let Some(mut entry) = self.entries.get_mut(path) {
            entry.pins += 1;
        }
    }

    pub fn clear_in_use(&self, path: &Path) {
        if let Some(mut entry) = self.entries.get_mut(path) {
            entry.pins = entry.pins.saturating_sub(1);
        }
    }

    /// Remove everything past the retention window. Returns how many
    /// files were deleted.
    pub async fn sweep(&self) -> usize {
        let now = Instant::now();
        let expired: Vec<PathBuf> = self
            .entries
            .iter()
            .filter(|entry| {
                entry.pins == 0 && now.duration_since(entry.created_at) >= self.retention
            })
            .map(|entry| entry.key().clone())
            .collect();

        let mut removed = 0;
        for path in expired {
            self.entries.remove(&path);
            match tokio::fs::remove_file(&path).await {
                Ok(()) => removed += 1,
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "sweep failed to remove file")
                }
            }
        }

        if removed > 0 {
            info!(removed, "artifact sweep completed");
        }
        removed
    }

    /// Spawn the periodic sweeper. The task runs until the handle is
    /// aborted or the runtime shuts down.
    pub fn spawn_sweeper(self: &Arc<Self>) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        let period = manager.sweep_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // the startup tick would sweep an empty index
            ticker.tick().await;
            loop {
                ticker.tick().await;
                manager.sweep().await;
            }
        })
    }

    #[cfg(test)]
    pub fn tracked(&self) -> usize {
        self.entries.len()
    }
}
