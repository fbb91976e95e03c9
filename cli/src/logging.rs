//! Tracing / logging initialisation.

use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Log settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Global default level: "trace" | "debug" | "info" | "warn" | "error"
    pub level: String,
    /// Override per component: crate name → level
    pub components: BTreeMap<String, String>,
    /// Emit JSON structured logs (true) or human-readable text (false)
    pub json: bool,
    /// Append to this file instead of writing to stderr
    pub file: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            components: BTreeMap::new(),
            json: false,
            file: None,
        }
    }
}

/// Build the filter directive string, e.g. `"info,raven_core=debug"`.
pub fn directives(config: &LogConfig) -> String {
    let mut directives = config.level.clone();
    for (component, level) in &config.components {
        directives.push_str(&format!(",{}={}", component.replace('-', "_"), level));
    }
    directives
}

/// Install the global subscriber. `RUST_LOG`, when set, wins over `config`.
/// Call once at startup.
pub fn init_tracing(config: &LogConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(directives(config)))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let (writer, ansi) = match &config.file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("cannot open log file {}", path.display()))?;
            (BoxMakeWriter::new(Mutex::new(file)), false)
        }
        None => (BoxMakeWriter::new(std::io::stderr), true),
    };

    let registry = tracing_subscriber::registry().with(filter);
    let installed = if config.json {
        registry
            .with(fmt::layer().json().with_writer(writer))
            .try_init()
    } else {
        registry
            .with(fmt::layer().with_ansi(ansi).with_writer(writer))
            .try_init()
    };
    installed.context("tracing subscriber already installed")
}
