//! `Watcher` — one streaming watch over one resource endpoint.
//!
//! # Lifecycle
//! ```text
//! Stopped ──start()/spawn()──► Running ──stream ends / error──► Stopped
//!                              Running ──stop()──────────────► Stopped
//! ```
//!
//! Each run owns its connection: it is opened inside the loop and dropped
//! when the loop returns, whatever the reason. `stop()` fires a per-run
//! cancellation signal that the loop checks at every read boundary.
//!
//! Dispatch is synchronous by default: a slow translator stalls reading.
//! [`DispatchMode::Queued`] decouples the two with a bounded queue.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::StreamExt;
use serde_json::{Map, Value};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::endpoint::WatchEndpoint;
use crate::error::WatchError;
use crate::event::{decode_line, DecodeOutcome};
use crate::handler::Translate;
use crate::lines::lines;
use crate::observer::{Lifecycle, TracingObserver, WatchObserver};
use crate::source::WatchSource;

/// Watcher run state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatcherState {
    Stopped,
    Running,
}

impl fmt::Display for WatcherState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stopped => write!(f, "stopped"),
            Self::Running => write!(f, "running"),
        }
    }
}

/// How decoded objects reach the translator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DispatchMode {
    /// Translate on the read loop, one event at a time.
    #[default]
    Inline,
    /// Hand events to a worker task through a bounded queue. Reading blocks
    /// only when `capacity` events are waiting.
    Queued { capacity: usize },
}

/// Configuration for a `Watcher`.
#[derive(Debug, Clone, Default)]
pub struct WatcherConfig {
    pub dispatch: DispatchMode,
}

impl WatcherConfig {
    pub fn validate(&self) -> Result<(), WatchError> {
        if self.dispatch == (DispatchMode::Queued { capacity: 0 }) {
            return Err(WatchError::Config("dispatch queue capacity must be > 0".into()));
        }
        Ok(())
    }
}

struct RunHandle {
    id: u64,
    cancel: watch::Sender<bool>,
}

enum Exit {
    StreamEnded,
    Cancelled,
}

/// A streaming watcher bound to one endpoint and one translator.
pub struct Watcher {
    name: String,
    endpoint: WatchEndpoint,
    source: Arc<dyn WatchSource>,
    translator: Arc<dyn Translate>,
    observer: Arc<dyn WatchObserver>,
    config: WatcherConfig,
    state: watch::Sender<WatcherState>,
    run: Mutex<Option<RunHandle>>,
    next_run: AtomicU64,
}

impl Watcher {
    /// Create a stopped watcher with the default observer and configuration.
    pub fn new(
        name: impl Into<String>,
        endpoint: WatchEndpoint,
        source: Arc<dyn WatchSource>,
        translator: Arc<dyn Translate>,
    ) -> Self {
        let (state, _) = watch::channel(WatcherState::Stopped);
        Self {
            name: name.into(),
            endpoint,
            source,
            translator,
            observer: Arc::new(TracingObserver),
            config: WatcherConfig::default(),
            state,
            run: Mutex::new(None),
            next_run: AtomicU64::new(0),
        }
    }

    /// Replace the observer.
    pub fn with_observer(mut self, observer: Arc<dyn WatchObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Replace the configuration.
    pub fn with_config(mut self, config: WatcherConfig) -> Result<Self, WatchError> {
        config.validate()?;
        self.config = config;
        Ok(self)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn endpoint(&self) -> &WatchEndpoint {
        &self.endpoint
    }

    pub fn state(&self) -> WatcherState {
        *self.state.borrow()
    }

    /// Start watching and block until the loop ends.
    ///
    /// Returns immediately with `Ok(())` if the watcher is already running.
    /// Connection and handler errors are returned after the connection has
    /// been released and the watcher stopped.
    pub async fn start(&self) -> Result<(), WatchError> {
        match self.begin_run() {
            Some((id, cancel)) => self.run(id, cancel).await,
            None => Ok(()),
        }
    }

    /// Mark the watcher running and drive the loop on its own task.
    ///
    /// The state is `Running` when this returns, so a following
    /// [`wait`](Self::wait) cannot miss the run.
    pub fn spawn(self: &Arc<Self>) -> JoinHandle<Result<(), WatchError>> {
        let this = Arc::clone(self);
        match self.begin_run() {
            Some((id, cancel)) => tokio::spawn(async move { this.run(id, cancel).await }),
            None => tokio::spawn(async { Ok::<(), WatchError>(()) }),
        }
    }

    /// Force the watcher to `Stopped`. Safe to call in any state.
    pub fn stop(&self) {
        let mut run = self.lock_run();
        match run.take() {
            Some(handle) => {
                let _ = handle.cancel.send(true);
                self.state.send_replace(WatcherState::Stopped);
                drop(run);
                self.observer.on_lifecycle(&self.name, &Lifecycle::Stopped);
            }
            None => debug!(watcher = %self.name, "stop on a stopped watcher"),
        }
    }

    /// Record a restart request. The connection is not re-established;
    /// supervisors call `stop()` and `start()` to reconnect.
    pub fn restart(&self) {
        self.observer.on_lifecycle(&self.name, &Lifecycle::Restarted);
    }

    /// Resolve once the watcher is `Stopped`.
    pub async fn wait(&self) {
        self.observer.on_lifecycle(&self.name, &Lifecycle::Waiting);
        let mut rx = self.state.subscribe();
        let _ = rx.wait_for(|s| *s == WatcherState::Stopped).await;
    }

    fn lock_run(&self) -> MutexGuard<'_, Option<RunHandle>> {
        self.run.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn begin_run(&self) -> Option<(u64, watch::Receiver<bool>)> {
        let mut run = self.lock_run();
        if run.is_some() {
            debug!(watcher = %self.name, "start on a running watcher");
            return None;
        }
        let id = self.next_run.fetch_add(1, Ordering::Relaxed) + 1;
        let (cancel, cancel_rx) = watch::channel(false);
        *run = Some(RunHandle { id, cancel });
        self.state.send_replace(WatcherState::Running);
        drop(run);

        self.observer.on_lifecycle(
            &self.name,
            &Lifecycle::Started {
                url: self.endpoint.watch_url(),
            },
        );
        Some((id, cancel_rx))
    }

    /// Stop the watcher only if `id` is still the current run.
    fn finish_run(&self, id: u64) {
        let mut run = self.lock_run();
        if run.as_ref().map(|h| h.id) != Some(id) {
            return;
        }
        *run = None;
        self.state.send_replace(WatcherState::Stopped);
        drop(run);
        self.observer.on_lifecycle(&self.name, &Lifecycle::Stopped);
    }

    async fn run(&self, id: u64, mut cancel: watch::Receiver<bool>) -> Result<(), WatchError> {
        let guard = RunGuard { watcher: self, id };
        let result = self.watch(&mut cancel).await;
        match &result {
            Ok(Exit::StreamEnded) => self.observer.on_lifecycle(&self.name, &Lifecycle::StreamEnded),
            Ok(Exit::Cancelled) => {}
            Err(e) => self
                .observer
                .on_lifecycle(&self.name, &Lifecycle::Failed(e.to_string())),
        }
        drop(guard);
        result.map(|_| ())
    }

    async fn watch(&self, cancel: &mut watch::Receiver<bool>) -> Result<Exit, WatchError> {
        let stream = tokio::select! {
            biased;
            _ = cancelled(cancel) => return Ok(Exit::Cancelled),
            opened = self.source.open(&self.endpoint) => opened?,
        };
        let lines = lines(stream);
        futures::pin_mut!(lines);
        let mut dispatcher = Dispatcher::new(self.translator.clone(), self.config.dispatch);

        loop {
            let next = tokio::select! {
                biased;
                _ = cancelled(cancel) => return Ok(Exit::Cancelled),
                next = lines.next() => next,
            };
            let line = match next {
                None => break,
                Some(Err(e)) => return Err(e),
                Some(Ok(line)) => line,
            };
            match decode_line(&line) {
                DecodeOutcome::Object(event) => {
                    self.observer.on_event(&self.name, &event);
                    dispatcher.dispatch(event).await?;
                }
                discarded => self.observer.on_discard(&self.name, &discarded),
            }
        }

        dispatcher.close().await?;
        Ok(Exit::StreamEnded)
    }
}

/// Ends a run when it goes out of scope, so a dropped `start()` future or an
/// aborted task still leaves the watcher `Stopped`.
struct RunGuard<'a> {
    watcher: &'a Watcher,
    id: u64,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.watcher.finish_run(self.id);
    }
}

async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    let _ = cancel.wait_for(|stop| *stop).await;
}

struct Queue {
    tx: mpsc::Sender<Map<String, Value>>,
    worker: JoinHandle<Result<(), WatchError>>,
}

/// Delivers decoded events to the translator, inline or through a queue.
struct Dispatcher {
    translator: Arc<dyn Translate>,
    queue: Option<Queue>,
}

impl Dispatcher {
    fn new(translator: Arc<dyn Translate>, mode: DispatchMode) -> Self {
        let queue = match mode {
            DispatchMode::Inline => None,
            DispatchMode::Queued { capacity } => {
                let (tx, mut rx) = mpsc::channel::<Map<String, Value>>(capacity);
                let worker_translator = translator.clone();
                let worker = tokio::spawn(async move {
                    while let Some(event) = rx.recv().await {
                        worker_translator.translate(&event).await?;
                    }
                    Ok(())
                });
                Some(Queue { tx, worker })
            }
        };
        Self { translator, queue }
    }

    async fn dispatch(&mut self, event: Map<String, Value>) -> Result<(), WatchError> {
        let Some(queue) = &self.queue else {
            return self.translator.translate(&event).await;
        };
        if queue.tx.send(event).await.is_ok() {
            return Ok(());
        }
        // The worker hung up, which only happens when a translation failed.
        match self.close().await {
            Ok(()) => Err(WatchError::Dispatch("dispatch worker exited early".into())),
            Err(e) => Err(e),
        }
    }

    /// Drain the queue and surface the worker's result.
    async fn close(&mut self) -> Result<(), WatchError> {
        let Some(Queue { tx, worker }) = self.queue.take() else {
            return Ok(());
        };
        drop(tx);
        worker
            .await
            .map_err(|e| WatchError::Dispatch(e.to_string()))?
    }

}

impl Drop for Dispatcher {
    // Undrained events are dropped when the loop exits early.
    fn drop(&mut self) {
        if let Some(queue) = self.queue.take() {
            queue.worker.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::translate_fn;
    use crate::observer::NullObserver;
    use crate::source::{ByteStream, ReplaySource};
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn pods() -> WatchEndpoint {
        WatchEndpoint::for_resource("http://k8s", "pods").unwrap()
    }

    fn collecting() -> (Arc<dyn Translate>, Arc<Mutex<Vec<Map<String, Value>>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let t = translate_fn(move |e| {
            sink.lock().unwrap().push(e.clone());
            Ok(())
        });
        (Arc::new(t), seen)
    }

    fn watcher(source: impl WatchSource, translator: Arc<dyn Translate>) -> Watcher {
        Watcher::new("pods", pods(), Arc::new(source), translator).with_observer(Arc::new(NullObserver))
    }

    /// Never yields data; counts how many times its connection is released.
    struct HangingSource {
        released: Arc<AtomicUsize>,
        opened: Arc<AtomicUsize>,
    }

    struct HangingStream {
        released: Arc<AtomicUsize>,
    }

    impl Drop for HangingStream {
        fn drop(&mut self) {
            self.released.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl ByteStream for HangingStream {
        async fn next_chunk(&mut self) -> Result<Bytes, WatchError> {
            futures::future::pending::<()>().await;
            Ok(Bytes::new())
        }
    }

    #[async_trait]
    impl WatchSource for HangingSource {
        async fn open(&self, _e: &WatchEndpoint) -> Result<Box<dyn ByteStream>, WatchError> {
            self.opened.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(HangingStream {
                released: self.released.clone(),
            }))
        }
    }

    #[tokio::test]
    async fn start_dispatches_objects_and_stops_at_stream_end() {
        let (t, seen) = collecting();
        let src = ReplaySource::new().with_script(&pods(), ["{\"a\":1}\n[1]\nnope\n\n{\"b\":2}"]);
        let w = watcher(src, t);
        assert_eq!(w.state(), WatcherState::Stopped);
        w.start().await.unwrap();
        assert_eq!(w.state(), WatcherState::Stopped);
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[1]["b"], 2);
    }

    #[tokio::test]
    async fn stop_releases_connection_once_and_is_idempotent() {
        let released = Arc::new(AtomicUsize::new(0));
        let opened = Arc::new(AtomicUsize::new(0));
        let (t, _) = collecting();
        let w = Arc::new(watcher(
            HangingSource {
                released: released.clone(),
                opened: opened.clone(),
            },
            t,
        ));

        let handle = w.spawn();
        assert_eq!(w.state(), WatcherState::Running);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(opened.load(Ordering::SeqCst), 1);

        w.stop();
        assert_eq!(w.state(), WatcherState::Stopped);
        w.stop();
        handle.await.unwrap().unwrap();
        assert_eq!(released.load(Ordering::SeqCst), 1);
        assert_eq!(w.state(), WatcherState::Stopped);
    }

    #[tokio::test]
    async fn start_is_idempotent_while_running() {
        let (t, _) = collecting();
        let w = Arc::new(watcher(
            HangingSource {
                released: Arc::new(AtomicUsize::new(0)),
                opened: Arc::new(AtomicUsize::new(0)),
            },
            t,
        ));
        let first = w.spawn();
        w.start().await.unwrap();
        assert_eq!(w.state(), WatcherState::Running);
        w.stop();
        first.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn wait_resolves_when_stream_ends() {
        let (t, seen) = collecting();
        let src = ReplaySource::new().with_script(&pods(), ["{}\n"]);
        let w = Arc::new(watcher(src, t));
        let handle = w.spawn();
        tokio::time::timeout(Duration::from_secs(2), w.wait()).await.unwrap();
        handle.await.unwrap().unwrap();
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn wait_on_stopped_watcher_returns() {
        let (t, _) = collecting();
        let w = watcher(ReplaySource::new(), t);
        tokio::time::timeout(Duration::from_secs(1), w.wait()).await.unwrap();
    }

    #[tokio::test]
    async fn connection_failure_propagates_and_stops() {
        let (t, _) = collecting();
        let w = watcher(ReplaySource::new(), t);
        let err = w.start().await.unwrap_err();
        assert!(err.is_connection_error());
        assert_eq!(w.state(), WatcherState::Stopped);
    }

    #[tokio::test]
    async fn handler_failure_ends_loop() {
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        let t = translate_fn(move |_e| {
            c.fetch_add(1, Ordering::SeqCst);
            Err(WatchError::handler("pods", "boom"))
        });
        let src = ReplaySource::new().with_script(&pods(), ["{}\n{}\n{}\n"]);
        let w = watcher(src, Arc::new(t));
        let err = w.start().await.unwrap_err();
        assert!(err.is_handler_error());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(w.state(), WatcherState::Stopped);
    }

    #[tokio::test]
    async fn restart_does_not_reconnect() {
        let opened = Arc::new(AtomicUsize::new(0));
        let (t, _) = collecting();
        let w = watcher(
            HangingSource {
                released: Arc::new(AtomicUsize::new(0)),
                opened: opened.clone(),
            },
            t,
        );
        w.restart();
        assert_eq!(opened.load(Ordering::SeqCst), 0);
        assert_eq!(w.state(), WatcherState::Stopped);
    }

    #[tokio::test]
    async fn queued_dispatch_delivers_in_order() {
        let (t, seen) = collecting();
        let src = ReplaySource::new().with_body(&pods(), "{\"n\":1}\n{\"n\":2}\n{\"n\":3}\n", 4);
        let w = watcher(src, t)
            .with_config(WatcherConfig {
                dispatch: DispatchMode::Queued { capacity: 1 },
            })
            .unwrap();
        w.start().await.unwrap();
        let ns: Vec<i64> = seen.lock().unwrap().iter().map(|e| e["n"].as_i64().unwrap()).collect();
        assert_eq!(ns, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn queued_dispatch_surfaces_handler_error() {
        let t = translate_fn(|_e| Err(WatchError::handler("pods", "boom")));
        let src = ReplaySource::new().with_script(&pods(), ["{}\n{}\n{}\n{}\n"]);
        let w = watcher(src, Arc::new(t))
            .with_config(WatcherConfig {
                dispatch: DispatchMode::Queued { capacity: 1 },
            })
            .unwrap();
        let err = w.start().await.unwrap_err();
        assert!(err.is_handler_error());
    }

    #[tokio::test]
    async fn dropped_start_returns_to_stopped() {
        let released = Arc::new(AtomicUsize::new(0));
        let opened = Arc::new(AtomicUsize::new(0));
        let (t, _) = collecting();
        let w = Arc::new(watcher(
            HangingSource {
                released: released.clone(),
                opened: opened.clone(),
            },
            t,
        ));

        let timed_out = tokio::time::timeout(Duration::from_millis(50), w.start()).await;
        assert!(timed_out.is_err());
        assert_eq!(w.state(), WatcherState::Stopped);
        assert_eq!(released.load(Ordering::SeqCst), 1);
        tokio::time::timeout(Duration::from_secs(1), w.wait()).await.unwrap();

        // A later run opens a fresh connection.
        let handle = w.spawn();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(opened.load(Ordering::SeqCst), 2);
        w.stop();
        handle.await.unwrap().unwrap();
        assert_eq!(released.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn aborted_task_returns_to_stopped() {
        let released = Arc::new(AtomicUsize::new(0));
        let (t, _) = collecting();
        let w = Arc::new(watcher(
            HangingSource {
                released: released.clone(),
                opened: Arc::new(AtomicUsize::new(0)),
            },
            t,
        ));

        let handle = w.spawn();
        tokio::time::sleep(Duration::from_millis(20)).await;
        handle.abort();
        assert!(handle.await.unwrap_err().is_cancelled());
        assert_eq!(w.state(), WatcherState::Stopped);
        assert_eq!(released.load(Ordering::SeqCst), 1);
        tokio::time::timeout(Duration::from_secs(1), w.wait()).await.unwrap();
    }

    #[test]
    fn zero_capacity_queue_rejected() {
        let cfg = WatcherConfig {
            dispatch: DispatchMode::Queued { capacity: 0 },
        };
        assert!(cfg.validate().is_err());
    }
}
