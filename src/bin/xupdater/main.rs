//! xupdater CLI entry point.

mod cli;

use clap::Parser;
use cli::Cli;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use xupdater::swap::backup_path;
use xupdater::UpdaterBuilder;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    // Initialize error handling
    color_eyre::install()?;

    // Parse CLI arguments
    let cli = Cli::parse();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cli.log_level.as_deref().unwrap_or("info")));

    if cli.json_logs {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer())
            .with(filter)
            .init();
    }

    info!("xupdater v{}", env!("CARGO_PKG_VERSION"));

    let mode = cli.mode();
    let config = cli.into_config()?;
    let updater = UpdaterBuilder::new(config).build()?;

    match mode {
        cli::Mode::Update => updater.update_and_exit().await,
        cli::Mode::Confirm => {
            let removed = updater.confirm_started()?;
            info!(path = %updater.target().display(), removed, "confirmed");
        }
        cli::Mode::Rollback => {
            if updater.rollback()? {
                info!(path = %updater.target().display(), "rolled back");
            } else {
                info!(
                    backup = %backup_path(updater.target()).display(),
                    "no backup to roll back to"
                );
                std::process::exit(1);
            }
        }
    }
    Ok(())
}
