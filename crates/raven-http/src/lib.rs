//! raven-http — streaming HTTP transport for raven watchers.
//!
//! Implements [`WatchSource`](raven_core::WatchSource) with `reqwest`:
//! a GET against `<endpoint>?watch=true` whose body is read chunk by chunk
//! for as long as the server keeps the connection open.

pub mod client;

pub use client::{HttpByteStream, HttpSourceConfig, HttpWatchSource};
