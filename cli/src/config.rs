//! `raven.yaml` configuration.
//!
//! Precedence: defaults < config file < `RAVEN_K8S_API_ROOT` < CLI flags.

use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use raven_core::{DispatchMode, WatcherConfig, DEFAULT_CHUNK_SIZE};
use raven_http::HttpSourceConfig;
use serde::{Deserialize, Serialize};

use crate::logging::LogConfig;

/// Environment variable overriding `k8s_api_root`.
pub const ENV_API_ROOT: &str = "RAVEN_K8S_API_ROOT";

/// Watcher section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatcherSection {
    /// Read-buffer bound in bytes.
    pub chunk_size: usize,
    /// Bounded dispatch queue capacity; `None` dispatches inline.
    pub dispatch_queue: Option<usize>,
}

impl Default for WatcherSection {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            dispatch_queue: None,
        }
    }
}

/// HTTP section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpSection {
    pub connect_timeout_ms: u64,
}

impl Default for HttpSection {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 10_000,
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RavenConfig {
    /// Base URL of the Kubernetes API server.
    pub k8s_api_root: String,
    /// Resource types to watch.
    pub resources: Vec<String>,
    pub watcher: WatcherSection,
    pub http: HttpSection,
    pub log: LogConfig,
}

impl Default for RavenConfig {
    fn default() -> Self {
        Self {
            k8s_api_root: "http://127.0.0.1:8080".into(),
            resources: raven_watchers::resource_names()
                .into_iter()
                .map(String::from)
                .collect(),
            watcher: WatcherSection::default(),
            http: HttpSection::default(),
            log: LogConfig::default(),
        }
    }
}

impl RavenConfig {
    /// Defaults, then the YAML file at `path` (if any), then the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read config file {}", path.display()))?;
        serde_yaml::from_str(&content)
            .with_context(|| format!("invalid config file {}", path.display()))
    }

    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(root) = lookup(ENV_API_ROOT).filter(|v| !v.is_empty()) {
            self.k8s_api_root = root;
        }
    }

    /// Apply command-line overrides. An empty `resources` keeps the config's list.
    pub fn apply_overrides(&mut self, api_root: Option<String>, resources: &[String]) {
        if let Some(root) = api_root {
            self.k8s_api_root = root;
        }
        if !resources.is_empty() {
            self.resources = resources.to_vec();
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.resources.is_empty() {
            bail!("no resources configured");
        }
        for resource in &self.resources {
            if raven_watchers::profile(resource).is_none() {
                bail!(
                    "unknown resource '{resource}' (known: {})",
                    raven_watchers::resource_names().join(", ")
                );
            }
        }
        if self.watcher.chunk_size == 0 {
            bail!("watcher.chunk_size must be > 0");
        }
        if self.watcher.dispatch_queue == Some(0) {
            bail!("watcher.dispatch_queue must be > 0 when set");
        }
        raven_core::WatchEndpoint::for_resource(&self.k8s_api_root, &self.resources[0])?;
        Ok(())
    }

    pub fn watcher_config(&self) -> WatcherConfig {
        WatcherConfig {
            dispatch: match self.watcher.dispatch_queue {
                Some(capacity) => DispatchMode::Queued { capacity },
                None => DispatchMode::Inline,
            },
        }
    }

    pub fn http_config(&self) -> HttpSourceConfig {
        HttpSourceConfig {
            connect_timeout: Duration::from_millis(self.http.connect_timeout_ms),
            chunk_size: self.watcher.chunk_size,
        }
    }
}
