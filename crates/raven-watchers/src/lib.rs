//! raven-watchers — resource profiles for the watch engine.
//!
//! Each profile knows its resource name and supplies the translator for
//! that resource. The engine logic lives entirely in `raven-core`.
//!
//! # Quick start
//! ```rust,no_run
//! use std::sync::Arc;
//! use raven_core::{ReplaySource, TracingObserver, WatcherConfig};
//!
//! let watcher = raven_watchers::build_watcher(
//!     "pods",
//!     "http://127.0.0.1:8080",
//!     Arc::new(ReplaySource::new()),
//!     Arc::new(TracingObserver),
//!     WatcherConfig::default(),
//! )
//! .unwrap();
//! ```

use std::sync::Arc;

use raven_core::{
    Translate, WatchEndpoint, WatchError, WatchObserver, WatchSource, Watcher, WatcherConfig,
};

pub mod pods;
pub mod services;

/// A watchable resource type.
#[derive(Debug, Clone, Copy)]
pub struct ResourceProfile {
    pub resource: &'static str,
    translator: fn() -> Arc<dyn Translate>,
}

impl ResourceProfile {
    pub fn endpoint(&self, api_root: &str) -> Result<WatchEndpoint, WatchError> {
        WatchEndpoint::for_resource(api_root, self.resource)
    }

    pub fn translator(&self) -> Arc<dyn Translate> {
        (self.translator)()
    }
}

fn pods_translator() -> Arc<dyn Translate> {
    Arc::new(pods::PodsTranslator)
}

fn services_translator() -> Arc<dyn Translate> {
    Arc::new(services::ServicesTranslator)
}

/// Every built-in profile.
pub const PROFILES: &[ResourceProfile] = &[
    ResourceProfile {
        resource: pods::RESOURCE,
        translator: pods_translator,
    },
    ResourceProfile {
        resource: services::RESOURCE,
        translator: services_translator,
    },
];

/// Look up a profile by resource name.
pub fn profile(resource: &str) -> Option<&'static ResourceProfile> {
    PROFILES.iter().find(|p| p.resource == resource)
}

/// Names of every built-in profile.
pub fn resource_names() -> Vec<&'static str> {
    PROFILES.iter().map(|p| p.resource).collect()
}

/// Build a stopped watcher for `resource` under `api_root`.
pub fn build_watcher(
    resource: &str,
    api_root: &str,
    source: Arc<dyn WatchSource>,
    observer: Arc<dyn WatchObserver>,
    config: WatcherConfig,
) -> Result<Watcher, WatchError> {
    let profile = profile(resource).ok_or_else(|| {
        WatchError::Config(format!(
            "unknown resource '{resource}' (known: {})",
            resource_names().join(", ")
        ))
    })?;
    let endpoint = profile.endpoint(api_root)?;
    Watcher::new(profile.resource, endpoint, source, profile.translator())
        .with_observer(observer)
        .with_config(config)
}
