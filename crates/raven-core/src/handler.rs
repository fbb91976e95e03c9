//! The `Translate` trait — resource-specific handling of decoded events.

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::WatchError;

/// Handles one decoded watch notification.
///
/// The engine calls this once per JSON-object line, in stream order, and
/// does not isolate failures: an `Err` ends the watch loop.
#[async_trait]
pub trait Translate: Send + Sync + 'static {
    async fn translate(&self, event: &Map<String, Value>) -> Result<(), WatchError>;
}

/// Adapter turning a closure into a [`Translate`] implementation.
pub struct FnTranslator<F> {
    f: F,
}

#[async_trait]
impl<F> Translate for FnTranslator<F>
where
    F: Fn(&Map<String, Value>) -> Result<(), WatchError> + Send + Sync + 'static,
{
    async fn translate(&self, event: &Map<String, Value>) -> Result<(), WatchError> {
        (self.f)(event)
    }
}

/// Wrap a synchronous closure as a translator.
pub fn translate_fn<F>(f: F) -> FnTranslator<F>
where
    F: Fn(&Map<String, Value>) -> Result<(), WatchError> + Send + Sync + 'static,
{
    FnTranslator { f }
}
