//! duffeld: duffel file synchronization daemon
//!
//! Usage:
//!   duffeld [--config duffel.toml] [--listen 0.0.0.0:50051]
//!
//! The token-signing secret comes from DUFFEL_TOKEN_SECRET (or the config
//! file); the daemon refuses to start without one.

use anyhow::Result;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use tracing::info;

use duffeld::daemon;

#[derive(Parser, Debug)]
#[command(name = "duffeld", version, about = "duffel file synchronization daemon")]
struct Cli {
    /// Path to duffel.toml configuration file
    #[arg(long, short = 'c', env = "DUFFEL_CONFIG", default_value = "duffel.toml")]
    config: PathBuf,

    /// Listen address override (e.g. 0.0.0.0:50051)
    #[arg(long, env = "DUFFEL_LISTEN")]
    listen: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "DUFFEL_LOG", default_value = "info")]
    log: String,

    /// Log format (json, text)
    #[arg(long, env = "DUFFEL_LOG_FORMAT", default_value = "text")]
    log_format: LogFormat,
}

#[derive(Clone, Debug, ValueEnum)]
enum LogFormat {
    Json,
    Text,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(&cli.log, &cli.log_format);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %cli.config.display(),
        "duffeld starting"
    );

    let mut config = load_config(&cli.config).await?;
    if let Some(listen) = cli.listen {
        config.server.listen = listen;
    }

    daemon::run(config).await
}

async fn load_config(path: &PathBuf) -> Result<duffel_core::DuffelConfig> {
    if path.exists() {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| anyhow::anyhow!("reading config {}: {e}", path.display()))?;
        toml::from_str(&content)
            .map_err(|e| anyhow::anyhow!("parsing config {}: {e}", path.display()))
    } else {
        tracing::warn!(
            "config file not found: {}  (using defaults)",
            path.display()
        );
        Ok(duffel_core::DuffelConfig::default())
    }
}

fn init_logging(level: &str, format: &LogFormat) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json())
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer())
                .init();
        }
    }
}
