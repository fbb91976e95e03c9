//! raven-core — the streaming watch engine.
//!
//! # Overview
//!
//! A watch endpoint keeps an HTTP response open and emits one JSON document
//! per line. The core crate turns that byte stream into handler calls:
//!
//! ```text
//! network bytes ─► LineReassembler ─► decode_line ─► object? ─► Translate
//!                                                  └─ other ─► dropped
//! ```
//!
//! - [`WatchSource`] / [`ByteStream`] — the network seam
//! - [`LineReassembler`] and [`lines`] — chunk-to-line reassembly
//! - [`decode_line`] / [`DecodeOutcome`] — the object-only acceptance filter
//! - [`Translate`] — resource-specific handling, injected per watcher
//! - [`Watcher`] — start / stop / restart / wait lifecycle
//! - [`WatcherSet`] — one independent watcher per resource type

pub mod endpoint;
pub mod error;
pub mod event;
pub mod handler;
pub mod lines;
pub mod observer;
pub mod set;
pub mod source;
pub mod watcher;

pub use endpoint::WatchEndpoint;
pub use error::WatchError;
pub use event::{decode_line, DecodeOutcome, EventKind, JsonKind, WatchEvent};
pub use handler::{translate_fn, Translate};
pub use lines::{lines, LineReassembler};
pub use observer::{Lifecycle, NullObserver, TracingObserver, WatchObserver};
pub use set::{WatchTask, WatcherSet};
pub use source::{ByteStream, ReplaySource, WatchSource, DEFAULT_CHUNK_SIZE};
pub use watcher::{DispatchMode, Watcher, WatcherConfig, WatcherState};
