//! Injected observability for watchers.
//!
//! Each watcher reports lifecycle transitions and decoded events to its
//! `WatchObserver` instead of a process-wide logger.

use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::event::{DecodeOutcome, WatchEvent};

/// A watcher lifecycle record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lifecycle {
    /// Stopped → Running; the connection is about to be opened.
    Started { url: String },
    /// Running → Stopped.
    Stopped,
    /// `restart()` was called. No reconnect is performed.
    Restarted,
    /// A host began waiting on the watcher.
    Waiting,
    /// The remote stream ended normally.
    StreamEnded,
    /// The loop ended with a connection or handler error.
    Failed(String),
}

/// Receives diagnostics from a watcher. All methods must be cheap.
pub trait WatchObserver: Send + Sync + 'static {
    fn on_lifecycle(&self, watcher: &str, event: &Lifecycle);

    /// Called before each object is handed to the translator.
    fn on_event(&self, _watcher: &str, _event: &Map<String, Value>) {}

    /// Called for each dropped line. Discards are silent by default.
    fn on_discard(&self, _watcher: &str, _outcome: &DecodeOutcome) {}
}

/// Default observer: structured `tracing` records.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl WatchObserver for TracingObserver {
    fn on_lifecycle(&self, watcher: &str, event: &Lifecycle) {
        match event {
            Lifecycle::Started { url } => info!(watcher = %watcher, url = %url, "started watcher"),
            Lifecycle::Stopped => info!(watcher = %watcher, "stopped watcher"),
            Lifecycle::Restarted => debug!(watcher = %watcher, "restarted watcher"),
            Lifecycle::Waiting => debug!(watcher = %watcher, "waiting for watcher"),
            Lifecycle::StreamEnded => info!(watcher = %watcher, "watch stream ended"),
            Lifecycle::Failed(reason) => warn!(watcher = %watcher, error = %reason, "watch loop failed"),
        }
    }

    fn on_event(&self, watcher: &str, event: &Map<String, Value>) {
        let ev = WatchEvent::from_object(event);
        debug!(
            watcher = %watcher,
            event_type = %ev.kind,
            name = ev.name().unwrap_or("-"),
            "watch event"
        );
    }
}

/// Observer that drops everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullObserver;

impl WatchObserver for NullObserver {
    fn on_lifecycle(&self, _watcher: &str, _event: &Lifecycle) {}
}
