//! Watch endpoint identity.

use std::fmt;

use crate::error::WatchError;

/// Query string that turns a list endpoint into a streaming watch.
pub const WATCH_QUERY: &str = "watch=true";

/// API group/version prefix for core resources.
pub const API_V1: &str = "/api/v1";

/// The watch target of one resource type: `<api-root>/api/v1/<resource>`.
///
/// Immutable once built; the watch query is appended by [`watch_url`](Self::watch_url).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WatchEndpoint {
    resource: String,
    resource_url: String,
}

impl WatchEndpoint {
    /// Derive the endpoint for `resource` under `api_root`.
    ///
    /// A trailing `/` on the root is ignored so `http://host/` and
    /// `http://host` produce the same URL.
    pub fn for_resource(api_root: &str, resource: &str) -> Result<Self, WatchError> {
        let root = api_root.trim_end_matches('/');
        if !(root.starts_with("http://") || root.starts_with("https://")) {
            return Err(WatchError::Config(format!(
                "API root must be an http(s) URL, got '{api_root}'"
            )));
        }
        if resource.is_empty() || resource.contains(['/', '?', '#']) {
            return Err(WatchError::Config(format!("invalid resource name '{resource}'")));
        }
        Ok(Self {
            resource: resource.to_string(),
            resource_url: format!("{root}{API_V1}/{resource}"),
        })
    }

    /// Resource type name (e.g. `"pods"`).
    pub fn resource(&self) -> &str {
        &self.resource
    }

    /// The plain list URL without the watch flag.
    pub fn resource_url(&self) -> &str {
        &self.resource_url
    }

    /// The streaming URL with `?watch=true`.
    pub fn watch_url(&self) -> String {
        format!("{}?{WATCH_QUERY}", self.resource_url)
    }
}

impl fmt::Display for WatchEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.watch_url())
    }
}
