//! # dashhub
//!
//! Dashboard hub binary: loads settings, starts logging and metrics,
//! compiles the demo dashboard, and serves it over WebSocket until Ctrl-C.

#![deny(unsafe_code)]

mod demo;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use dashhub_core::EndpointRegistry;
use dashhub_logging::{LoggingConfig, init_logging};
use dashhub_server::DashServer;
use dashhub_settings::{DashSettings, load_settings_from_path, settings_path};

/// Real-time dashboard synchronization hub.
#[derive(Parser, Debug)]
#[command(name = "dashhub", about = "Real-time dashboard synchronization hub")]
struct Cli {
    /// Settings file (defaults to `~/.dashhub/settings.json`).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Base log level (overrides settings).
    #[arg(long)]
    log_level: Option<String>,
}

impl Cli {
    fn settings_file(&self) -> PathBuf {
        self.config.clone().unwrap_or_else(settings_path)
    }

    /// Flags win over the file and the environment.
    fn apply(&self, settings: &mut DashSettings) {
        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(level) = &self.log_level {
            settings.logging.level.clone_from(level);
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let path = cli.settings_file();
    let mut settings =
        load_settings_from_path(&path).with_context(|| format!("Failed to load settings from {}", path.display()))?;
    cli.apply(&mut settings);

    let logging = LoggingConfig::parse(
        &settings.logging.level,
        settings.logging.json,
        &settings.logging.module_levels,
    )
    .context("Invalid logging settings")?;
    init_logging(&logging).context("Failed to initialise logging")?;

    let metrics = if settings.server.metrics {
        Some(dashhub_server::metrics::install_recorder().context("Failed to install metrics recorder")?)
    } else {
        None
    };

    let registry = Arc::new(EndpointRegistry::new());
    let dashboard = demo::dashboard();
    let app = dashhub_compiler::compile(&dashboard);
    let endpoint_count = app.register(&registry);

    let mut server = DashServer::new(&settings, registry);
    if let Some(handle) = metrics {
        server = server.with_metrics(handle);
    }

    let (addr, handle) = server.listen().await.context("Failed to bind server")?;
    tracing::info!(
        title = %dashboard.title,
        endpoints = endpoint_count,
        scripts = app.element_scripts.len(),
        "dashhub listening on ws://{addr}/ws"
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("shutting down");
    // listener task drains endpoints itself; allow it that long plus slack
    let deadline = server.drain_timeout() + Duration::from_secs(5);
    if !server.shutdown().graceful_shutdown(vec![handle], deadline).await {
        tracing::warn!("forced shutdown");
    }

    tracing::info!("shutdown complete");
    Ok(())
}
