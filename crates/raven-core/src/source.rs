//! `WatchSource` / `ByteStream` — the seam between the engine and the network.
//!
//! A `WatchSource` opens one streaming connection per watch run. The returned
//! `ByteStream` owns that connection; dropping it releases the connection.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use crate::endpoint::WatchEndpoint;
use crate::error::WatchError;

/// Default read-buffer bound, in bytes.
pub const DEFAULT_CHUNK_SIZE: usize = 1024;

/// A single-pass stream of raw byte chunks from one open connection.
#[async_trait]
pub trait ByteStream: Send {
    /// Read the next chunk. A zero-length chunk signals end-of-stream.
    async fn next_chunk(&mut self) -> Result<Bytes, WatchError>;
}

#[async_trait]
impl<T: ByteStream + ?Sized> ByteStream for Box<T> {
    async fn next_chunk(&mut self) -> Result<Bytes, WatchError> {
        (**self).next_chunk().await
    }
}

/// Opens streaming connections to watch endpoints.
///
/// # Thread Safety
/// Implementations must be `Send + Sync`; one source is shared by every
/// watcher and each `open` call yields an independent stream.
#[async_trait]
pub trait WatchSource: Send + Sync + 'static {
    /// Open a streaming GET against `endpoint` with the watch flag enabled.
    async fn open(&self, endpoint: &WatchEndpoint) -> Result<Box<dyn ByteStream>, WatchError>;
}

/// A `ByteStream` over a fixed list of chunks.
pub struct ChunkStream {
    chunks: std::vec::IntoIter<Bytes>,
}

impl ChunkStream {
    pub fn new(chunks: Vec<Bytes>) -> Self {
        Self {
            chunks: chunks.into_iter(),
        }
    }
}

#[async_trait]
impl ByteStream for ChunkStream {
    async fn next_chunk(&mut self) -> Result<Bytes, WatchError> {
        Ok(self.chunks.next().unwrap_or_default())
    }
}

/// In-memory source that replays a fixed chunk script per watch URL.
///
/// Every `open` replays the script from the start, so a watcher started
/// twice sees the same stream twice.
#[derive(Clone, Default)]
pub struct ReplaySource {
    scripts: Arc<HashMap<String, Vec<Bytes>>>,
}

impl ReplaySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the chunks returned for `endpoint`.
    pub fn with_script<I, B>(mut self, endpoint: &WatchEndpoint, chunks: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: Into<Bytes>,
    {
        Arc::make_mut(&mut self.scripts).insert(
            endpoint.watch_url(),
            chunks.into_iter().map(Into::into).collect(),
        );
        self
    }

    /// Register `body` split into chunks of at most `chunk_size` bytes.
    pub fn with_body(self, endpoint: &WatchEndpoint, body: impl Into<Bytes>, chunk_size: usize) -> Self {
        let body: Bytes = body.into();
        let size = chunk_size.max(1);
        let chunks: Vec<Bytes> = (0..body.len())
            .step_by(size)
            .map(|start| body.slice(start..(start + size).min(body.len())))
            .collect();
        self.with_script(endpoint, chunks)
    }
}

#[async_trait]
impl WatchSource for ReplaySource {
    async fn open(&self, endpoint: &WatchEndpoint) -> Result<Box<dyn ByteStream>, WatchError> {
        let url = endpoint.watch_url();
        let chunks = self
            .scripts
            .get(&url)
            .cloned()
            .ok_or_else(|| WatchError::Status { status: 404, url })?;
        Ok(Box::new(ChunkStream::new(chunks)))
    }
}
