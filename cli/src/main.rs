//! raven CLI — watch Kubernetes resource streams and dispatch each event.
//!
//! Usage:
//! ```bash
//! # Watch pods and services until Ctrl-C
//! raven run --api-root http://127.0.0.1:8080
//!
//! # Print the watch URL of each configured resource
//! raven endpoints --config raven.yaml
//!
//! # Feed a recorded line-delimited stream through the pods handler
//! raven replay --file pods.ndjson --resource pods
//! ```

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use serde_json::{Map, Value};
use tracing::{error, info};

use raven_core::{
    DecodeOutcome, Lifecycle, ReplaySource, TracingObserver, WatchObserver, WatchSource,
    WatcherSet,
};
use raven_http::HttpWatchSource;

mod config;
mod logging;

use config::RavenConfig;

#[derive(Parser)]
#[command(
    name = "raven",
    about = "Watch Kubernetes API resources and translate their events",
    long_about = "
raven opens a streaming `?watch=true` request per resource type and hands
every line-delimited JSON object to that resource's handler.

ENVIRONMENT VARIABLES:
  RAVEN_K8S_API_ROOT   Kubernetes API root URL (overrides the config file)
  RUST_LOG             Log filter (overrides log.level)
",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug, Default)]
struct CommonArgs {
    /// Path to a raven.yaml config file
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Kubernetes API root URL
    #[arg(long)]
    api_root: Option<String>,
    /// Resource to watch (repeatable; default: all configured)
    #[arg(long = "resource")]
    resources: Vec<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the watchers until every stream ends or Ctrl-C
    Run(CommonArgs),
    /// Print the watch URL of each configured resource
    Endpoints(CommonArgs),
    /// Replay a recorded line-delimited stream through the handlers
    Replay {
        #[command(flatten)]
        common: CommonArgs,
        /// File holding one JSON watch event per line
        #[arg(long)]
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Run(common) => cmd_run(common).await,
        Commands::Endpoints(common) => cmd_endpoints(common),
        Commands::Replay { common, file } => cmd_replay(common, file).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

fn load_config(common: &CommonArgs) -> Result<RavenConfig> {
    let mut cfg = RavenConfig::load(common.config.as_deref())?;
    cfg.apply_overrides(common.api_root.clone(), &common.resources);
    cfg.validate()?;
    Ok(cfg)
}

fn build_set(
    cfg: &RavenConfig,
    source: Arc<dyn WatchSource>,
    observer: Arc<dyn WatchObserver>,
) -> Result<WatcherSet> {
    let mut set = WatcherSet::new();
    for resource in &cfg.resources {
        let watcher = raven_watchers::build_watcher(
            resource,
            &cfg.k8s_api_root,
            source.clone(),
            observer.clone(),
            cfg.watcher_config(),
        )
        .with_context(|| format!("cannot build watcher for '{resource}'"))?;
        set.insert(watcher);
    }
    Ok(set)
}

async fn cmd_run(common: CommonArgs) -> Result<()> {
    let cfg = load_config(&common)?;
    logging::init_tracing(&cfg.log)?;

    let source = Arc::new(HttpWatchSource::new(cfg.http_config())?);
    let set = Arc::new(build_set(&cfg, source, Arc::new(TracingObserver))?);
    info!(
        api_root = %cfg.k8s_api_root,
        resources = ?set.names(),
        "launching watchers"
    );
    let tasks = set.spawn_all();

    let stopper = Arc::clone(&set);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, stopping watchers");
            stopper.stop_all();
        }
    });

    set.wait_all().await;

    let mut failed = 0;
    for (name, result) in WatcherSet::join(tasks).await {
        if let Err(e) = result {
            error!(watcher = %name, error = %e, "watcher ended with an error");
            failed += 1;
        }
    }
    if failed > 0 {
        bail!("{failed} watcher(s) ended with an error");
    }
    Ok(())
}

fn cmd_endpoints(common: CommonArgs) -> Result<()> {
    let cfg = load_config(&common)?;
    for resource in &cfg.resources {
        if let Some(profile) = raven_watchers::profile(resource) {
            println!("{:<10} {}", profile.resource, profile.endpoint(&cfg.k8s_api_root)?);
        }
    }
    Ok(())
}

/// Wraps the tracing observer and counts what each run dispatched or dropped.
#[derive(Default)]
struct ReplayStats {
    inner: TracingObserver,
    events: AtomicU64,
    discarded: AtomicU64,
}

impl WatchObserver for ReplayStats {
    fn on_lifecycle(&self, watcher: &str, event: &Lifecycle) {
        self.inner.on_lifecycle(watcher, event);
    }

    fn on_event(&self, watcher: &str, event: &Map<String, Value>) {
        self.events.fetch_add(1, Ordering::Relaxed);
        self.inner.on_event(watcher, event);
    }

    fn on_discard(&self, _watcher: &str, _outcome: &DecodeOutcome) {
        self.discarded.fetch_add(1, Ordering::Relaxed);
    }
}

async fn cmd_replay(common: CommonArgs, file: PathBuf) -> Result<()> {
    let cfg = load_config(&common)?;
    logging::init_tracing(&cfg.log)?;

    let body = std::fs::read(&file)
        .with_context(|| format!("cannot read replay file {}", file.display()))?;

    for resource in &cfg.resources {
        let Some(profile) = raven_watchers::profile(resource) else {
            continue;
        };
        let endpoint = profile.endpoint(&cfg.k8s_api_root)?;
        let source =
            ReplaySource::new().with_body(&endpoint, body.clone(), cfg.watcher.chunk_size);
        let stats = Arc::new(ReplayStats::default());

        let set = build_set(
            &RavenConfig {
                resources: vec![resource.clone()],
                ..cfg.clone()
            },
            Arc::new(source),
            stats.clone(),
        )?;
        let tasks = set.spawn_all();
        set.wait_all().await;
        for (name, result) in WatcherSet::join(tasks).await {
            result.with_context(|| format!("replay through '{name}' failed"))?;
        }

        println!(
            "{:<10} {} events dispatched, {} lines discarded",
            resource,
            stats.events.load(Ordering::Relaxed),
            stats.discarded.load(Ordering::Relaxed)
        );
    }
    Ok(())
}
