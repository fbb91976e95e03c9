//! `WatcherSet` — one watcher per resource type, each run on its own task.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::info;

use crate::error::WatchError;
use crate::watcher::{Watcher, WatcherState};

/// A spawned watcher run.
pub struct WatchTask {
    pub name: String,
    pub handle: JoinHandle<Result<(), WatchError>>,
}

/// Named, independent watchers. Watchers share no mutable state.
#[derive(Default)]
pub struct WatcherSet {
    watchers: BTreeMap<String, Arc<Watcher>>,
}

impl WatcherSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a watcher under its own name, replacing any previous one.
    pub fn insert(&mut self, watcher: Watcher) -> Arc<Watcher> {
        let watcher = Arc::new(watcher);
        self.watchers
            .insert(watcher.name().to_string(), Arc::clone(&watcher));
        watcher
    }

    pub fn get(&self, name: &str) -> Option<&Arc<Watcher>> {
        self.watchers.get(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.watchers.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.watchers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.watchers.is_empty()
    }

    /// Returns `(name, state)` for every watcher.
    pub fn states(&self) -> Vec<(String, WatcherState)> {
        self.watchers
            .iter()
            .map(|(name, w)| (name.clone(), w.state()))
            .collect()
    }

    /// Spawn every watcher on its own task.
    pub fn spawn_all(&self) -> Vec<WatchTask> {
        info!("spawning {} watchers", self.watchers.len());
        self.watchers
            .iter()
            .map(|(name, w)| WatchTask {
                name: name.clone(),
                handle: w.spawn(),
            })
            .collect()
    }

    pub fn stop_all(&self) {
        for w in self.watchers.values() {
            w.stop();
        }
    }

    /// Forward a restart request to one watcher.
    pub fn restart(&self, name: &str) -> Result<(), WatchError> {
        let w = self
            .watchers
            .get(name)
            .ok_or_else(|| WatchError::Other(format!("unknown watcher '{name}'")))?;
        w.restart();
        Ok(())
    }

    /// Resolve once every watcher is stopped.
    pub async fn wait_all(&self) {
        for w in self.watchers.values() {
            w.wait().await;
        }
    }

    /// Await spawned runs and collect each one's outcome.
    pub async fn join(tasks: Vec<WatchTask>) -> Vec<(String, Result<(), WatchError>)> {
        let mut out = Vec::with_capacity(tasks.len());
        for task in tasks {
            let result = match task.handle.await {
                Ok(r) => r,
                Err(e) => Err(WatchError::Other(format!("watcher task failed: {e}"))),
            };
            out.push((task.name, result));
        }
        out
    }
}
