//! Relay server entry point

use clap::Parser;
use tracing::{error, info};

use relay_server::{AppConfig, Cli, RelayApp};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command line arguments
    let cli = Cli::parse();

    // Initialize logging
    setup_logging(cli.verbose);

    // Load configuration and apply CLI overrides
    let mut config = load_configuration(&cli)?;
    config.apply_overrides(&cli);

    // Create and run the application
    let app = RelayApp::new(config)?.with_components(!cli.no_udp, !cli.no_bridge);
    if let Err(err) = app.run().await {
        error!("Relay service failed: {err}");
        std::process::exit(1);
    }

    info!("Relay exited successfully");
    Ok(())
}

/// Setup logging based on verbosity level
fn setup_logging(verbose: bool) {
    let log_level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}

/// Load configuration from file or use defaults
fn load_configuration(cli: &Cli) -> anyhow::Result<AppConfig> {
    if let Some(config_path) = &cli.config {
        info!("Loading configuration from: {}", config_path);
        Ok(AppConfig::load_from_file(config_path)?)
    } else {
        info!("Using default configuration");
        Ok(AppConfig::default())
    }
}
