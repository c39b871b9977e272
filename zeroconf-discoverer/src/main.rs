mod config;
mod engine;
mod error;
mod listeners;
mod report;
mod session;
mod store;

use std::sync::Arc;
use anyhow::{Context, Result};
use crate::config::{Config, OutputMode};
use crate::engine::mdns::MdnsEngine;
use crate::report::{DirectorySink, ReportSink, StreamSink};

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr; stdout carries the report stream
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("zeroconf_discoverer=info"))
        )
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("Start discovery");

    let config = match std::env::args().nth(1) {
        Some(config_path) => {
            let config = Config::load(&config_path)
                .with_context(|| format!("Failed to load config from {}", config_path))?;
            tracing::info!("Loaded config from {}", config_path);
            config
        }
        None => Config::default(),
    };

    let engine = Arc::new(
        MdnsEngine::create(&config.discovery).context("Failed to start discovery engine")?,
    );

    let stdout = std::io::stdout();
    let mut sink: Box<dyn ReportSink> = match config.output.mode {
        OutputMode::Stdout => Box::new(StreamSink::new(stdout.lock())),
        OutputMode::Files => {
            let sink = DirectorySink::new(&config.output.directory, &config.output.file_prefix);
            tracing::info!("Writing reports to {}", sink.directory().display());
            Box::new(sink)
        }
    };

    let summary = session::run_session(engine, config.discovery.window(), sink.as_mut())
        .await
        .context("Discovery session failed")?;

    tracing::info!(
        "Reported {} services across {} service types",
        summary.written,
        summary.types_browsed
    );
    if summary.failed > 0 {
        tracing::warn!("{} of {} reports could not be written", summary.failed, summary.records);
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
