use anyhow::Context;
use argus::ai::{OpenAiSummarizer, Summarizer};
use argus::config::Config;
use argus::observer::Observer;
use argus::publisher::{AmqpPublisher, Publisher};
use clap::Parser;
use log::{info, warn};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;

/// Command-line arguments for the Observer agent
#[derive(Parser)]
#[command(
    name = "argus",
    about = "Incident-response Observer agent",
    long_about = "Periodically polls cluster metrics and logs, flags anomalous services, \
                  and publishes an AI-generated health summary to the incidents exchange \
                  once per cycle."
)]
struct Cli {
    /// Path to configuration file (TOML format)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Enable verbose logging output (sets log level to debug)
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut builder = env_logger::Builder::from_default_env();
    if cli.verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.init();

    info!("Starting Observer agent");

    // Any configuration problem is fatal before the first cycle runs
    let config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;
    info!(
        "Configuration loaded: cluster={}, prometheus={}, loki={}, interval={}s",
        config.cluster,
        config.prometheus.url,
        config.loki.url,
        config.observer.cycle_interval_seconds
    );

    let summarizer: Option<Arc<dyn Summarizer>> = match &config.ai.api_key {
        Some(api_key) => Some(Arc::new(OpenAiSummarizer::new(
            api_key.clone(),
            config.ai.model.clone(),
            config.ai.base_url.clone(),
        ))),
        None => {
            warn!("No summarizer credential configured, publishing placeholder summaries");
            None
        }
    };

    // The bus connection is a single long-lived resource; failing to
    // acquire it at startup is fatal.
    let publisher = Arc::new(
        AmqpPublisher::connect(&config.amqp.url)
            .await
            .context("Failed to connect to message bus")?,
    );

    let observer = Observer::new(
        config,
        summarizer,
        Arc::clone(&publisher) as Arc<dyn Publisher>,
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let loop_handle = {
        let observer = Arc::new(observer);
        tokio::spawn(async move { observer.run(shutdown_rx).await })
    };

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Shutdown signal received");

    shutdown_tx.send(true).ok();
    loop_handle.await.ok();
    publisher.close().await;

    info!("Observer agent stopped");
    Ok(())
}
