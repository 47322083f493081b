//! Polling file watcher
//!
//! Compares modification times of a fixed set of paths on an interval and
//! hands the changed paths to a callback. A file appearing or disappearing
//! counts as a change. Stops when its cancellation signal fires.

use log::{debug, trace};
use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::time::MissedTickBehavior;

use crate::sync::CancellationSignal;

type Snapshot = HashMap<PathBuf, Option<SystemTime>>;

pub struct FileWatcher {
    paths: Vec<PathBuf>,
    interval: Duration,
    last_seen: Snapshot,
}

impl FileWatcher {
    pub fn new(paths: Vec<PathBuf>, interval: Duration) -> Self {
        Self {
            paths,
            interval,
            last_seen: Snapshot::new(),
        }
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    async fn modified(path: &Path) -> Option<SystemTime> {
        tokio::fs::metadata(path).await.and_then(|m| m.modified()).ok()
    }

    /// Record the current state of every path without reporting changes
    pub async fn prime(&mut self) {
        for path in &self.paths {
            let modified = Self::modified(path).await;
            self.last_seen.insert(path.clone(), modified);
        }
    }

    /// Paths whose modification time changed since the last poll
    pub async fn poll_changes(&mut self) -> Vec<PathBuf> {
        let mut changed = Vec::new();
        for path in &self.paths {
            let modified = Self::modified(path).await;
            let previous = self.last_seen.insert(path.clone(), modified);
            if previous != Some(modified) {
                trace!("{} changed: {:?} -> {:?}", path.display(), previous, modified);
                changed.push(path.clone());
            }
        }
        changed
    }

    /// Poll until `signal` fires, awaiting `on_change` for every batch of changes
    pub async fn run<F, Fut>(mut self, signal: CancellationSignal, mut on_change: F)
    where
        F: FnMut(Vec<PathBuf>) -> Fut,
        Fut: Future<Output = ()>,
    {
        self.prime().await;
        debug!("Watching {} file(s) every {:?}", self.paths.len(), self.interval);

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = signal.aborted() => break,
                _ = ticker.tick() => {
                    let changed = self.poll_changes().await;
                    if !changed.is_empty() {
                        on_change(changed).await;
                    }
                }
            }
        }
        debug!("File watcher stopped");
    }
}
