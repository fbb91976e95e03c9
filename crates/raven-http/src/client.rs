//! `HttpWatchSource` — streaming GET against a watch endpoint.
//!
//! The response body of a watch never completes, so the client carries a
//! connect timeout only. Each network chunk is re-sliced so the engine never
//! sees more than `chunk_size` bytes per read.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use raven_core::endpoint::WatchEndpoint;
use raven_core::error::WatchError;
use raven_core::source::{ByteStream, WatchSource, DEFAULT_CHUNK_SIZE};

/// Configuration for `HttpWatchSource`.
#[derive(Debug, Clone)]
pub struct HttpSourceConfig {
    /// TCP/TLS connect timeout.
    pub connect_timeout: Duration,
    /// Upper bound on bytes handed to the engine per read.
    pub chunk_size: usize,
}

impl Default for HttpSourceConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

/// Opens `?watch=true` streams over HTTP(S).
pub struct HttpWatchSource {
    http: reqwest::Client,
    chunk_size: usize,
}

impl HttpWatchSource {
    pub fn new(config: HttpSourceConfig) -> Result<Self, WatchError> {
        if config.chunk_size == 0 {
            return Err(WatchError::Config("chunk_size must be > 0".into()));
        }
        let http = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| WatchError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            chunk_size: config.chunk_size,
        })
    }

    /// Create with default configuration.
    pub fn default_source() -> Result<Self, WatchError> {
        Self::new(HttpSourceConfig::default())
    }
}

#[async_trait]
impl WatchSource for HttpWatchSource {
    async fn open(&self, endpoint: &WatchEndpoint) -> Result<Box<dyn ByteStream>, WatchError> {
        let url = endpoint.watch_url();
        tracing::debug!(url = %url, "opening watch connection");

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| WatchError::Http(e.to_string()))?;

        if !response.status().is_success() {
            return Err(WatchError::Status {
                status: response.status().as_u16(),
                url,
            });
        }

        Ok(Box::new(HttpByteStream {
            response,
            carry: Bytes::new(),
            chunk_size: self.chunk_size,
            url,
        }))
    }
}

/// One open watch response. Dropping it closes the connection.
pub struct HttpByteStream {
    response: reqwest::Response,
    carry: Bytes,
    chunk_size: usize,
    url: String,
}

#[async_trait]
impl ByteStream for HttpByteStream {
    async fn next_chunk(&mut self) -> Result<Bytes, WatchError> {
        loop {
            if !self.carry.is_empty() {
                let n = self.chunk_size.min(self.carry.len());
                return Ok(self.carry.split_to(n));
            }
            match self
                .response
                .chunk()
                .await
                .map_err(|e| WatchError::Http(e.to_string()))?
            {
                Some(chunk) => self.carry = chunk,
                None => return Ok(Bytes::new()),
            }
        }
    }
}

impl Drop for HttpByteStream {
    fn drop(&mut self) {
        tracing::debug!(url = %self.url, "released watch connection");
    }
}
