use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tally_config::RuntimeConfig;

/// Chat-event leaderboard server with an append-only event ledger
#[derive(Parser)]
#[command(name = "tallyd")]
#[command(version)]
#[command(about = "Time-windowed leaderboard server over an append-only event ledger", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// HTTP listen port (overrides config file)
    #[arg(short, long, value_name = "PORT")]
    port: Option<u16>,

    /// Data directory for the ledger and snapshot (filesystem backend only)
    #[arg(short, long, value_name = "DIR")]
    data_dir: Option<PathBuf>,

    /// Log level: trace, debug, info, warn, error
    #[arg(short = 'v', long, value_name = "LEVEL")]
    log_level: Option<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?
        .block_on(async_main(cli))
}

async fn async_main(cli: Cli) -> Result<()> {
    // Step 1: Load base configuration
    let mut config = if let Some(config_path) = &cli.config {
        tally_config::load_from_path(config_path)
            .with_context(|| format!("Failed to load config from {}", config_path.display()))?
    } else {
        tally_config::load_or_default().context("Failed to load configuration")?
    };

    // Step 2: Apply CLI overrides (highest priority)
    apply_cli_overrides(&mut config, &cli)?;

    // Step 3: Re-validate the overridden configuration
    config.validate().context("Invalid configuration")?;

    // Step 4: Run server with resolved config
    tally_server::run_with_config(config).await
}

fn apply_cli_overrides(config: &mut RuntimeConfig, cli: &Cli) -> Result<()> {
    use tally_config::StorageBackend;

    if let Some(port) = cli.port {
        config.server.listen_addr = format!("0.0.0.0:{}", port);
    }

    if let Some(data_dir) = &cli.data_dir {
        if config.storage.backend != StorageBackend::Fs {
            anyhow::bail!(
                "--data-dir flag only works with the filesystem backend, but backend is '{}'.\n\
                Either remove --data-dir or set backend to 'fs' in the config file.",
                config.storage.backend
            );
        }

        let fs_config = config.storage.fs.get_or_insert_with(Default::default);
        fs_config.path = data_dir.to_string_lossy().to_string();
    }

    if let Some(level) = &cli.log_level {
        config.server.log_level = level.clone();
    }

    Ok(())
}
