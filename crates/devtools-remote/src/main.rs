//! # devtools-remote
//!
//! DevTools remote relay binary: loads settings, initializes logging and
//! metrics, then serves until ctrl-c.

#![deny(unsafe_code)]

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use devtools_remote_server::{RelayServer, ServerConfig, analytics, metrics};
use devtools_remote_settings::RelaySettings;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::prelude::*;

/// How long to wait for open connections on shutdown.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// DevTools remote relay server.
#[derive(Parser, Debug)]
#[command(name = "devtools-remote", about = "DevTools remote relay server")]
struct Cli {
    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings and `PORT`).
    #[arg(long)]
    port: Option<u16>,

    /// Settings file (default `$DEVTOOLS_REMOTE_SETTINGS` or `./devtools-remote.json`).
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Externally visible `host[:port]` used in target URLs.
    #[arg(long)]
    public_host: Option<String>,

    /// Directory served for unmatched GET requests.
    #[arg(long)]
    static_dir: Option<PathBuf>,

    /// Emit logs as JSON.
    #[arg(long)]
    log_json: bool,

    /// Disable the Prometheus `/metrics` endpoint.
    #[arg(long)]
    no_metrics: bool,
}

impl Cli {
    /// Apply flags on top of loaded settings.
    fn apply(&self, settings: &mut RelaySettings) {
        if let Some(ref host) = self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(ref public_host) = self.public_host {
            settings.server.public_host = Some(public_host.clone());
        }
        if let Some(ref dir) = self.static_dir {
            settings.server.static_dir = dir.to_string_lossy().into_owned();
        }
        if self.log_json {
            settings.logging.json = true;
        }
        if self.no_metrics {
            settings.metrics.enabled = false;
        }
    }
}

/// Load settings with a temporary warn-level subscriber on `writer`, so
/// loader warnings (e.g. an ignored env override) are not lost before the
/// configured subscriber exists.
fn load_settings<F, W>(path: &Path, env: F, writer: W) -> Result<RelaySettings>
where
    F: Fn(&str) -> Option<String>,
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let bootstrap = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .with_ansi(false)
        .with_writer(writer)
        .finish();
    tracing::subscriber::with_default(bootstrap, || {
        devtools_remote_settings::load_with_env(path, env)
    })
    .with_context(|| format!("Failed to load settings from {}", path.display()))
}

/// Install the global subscriber. `RUST_LOG` wins over the configured level.
fn init_logging(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    let settings_path = args
        .settings
        .clone()
        .unwrap_or_else(devtools_remote_settings::settings_path);
    let mut settings = load_settings(
        &settings_path,
        |name| std::env::var(name).ok(),
        std::io::stderr,
    )?;
    args.apply(&mut settings);
    settings.validate().context("Invalid settings")?;

    init_logging(&settings.logging.level, settings.logging.json);
    tracing::info!(path = %settings_path.display(), "starting DevTools remote relay");

    let analytics =
        analytics::from_settings(&settings.analytics).context("Failed to set up analytics")?;
    let metrics_handle = if settings.metrics.enabled {
        Some(metrics::install_recorder().context("Failed to install metrics recorder")?)
    } else {
        None
    };

    let config = ServerConfig::from_settings(&settings);
    let handle = RelayServer::listen(config, analytics, metrics_handle)
        .await
        .context("Failed to start server")?;
    tracing::info!(addr = %handle.addr(), "relay ready");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;
    tracing::info!("shutting down");

    handle
        .stop(Some(SHUTDOWN_TIMEOUT))
        .await
        .context("Server did not stop cleanly")?;
    Ok(())
}
