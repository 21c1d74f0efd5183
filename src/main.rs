//! Lightgun driver CLI
//!
//! Discovers guns, binds them to player slots, calibrates them and runs the
//! input pipeline.

use anyhow::Result;
use clap::Parser;
use tracing::{debug, info};

use lightgun_driver::LightgunConfig;

mod cli;
use cli::{Cli, Commands};

// Command handlers
mod commands;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    // Load config
    let config_path = cli.config.unwrap_or_else(LightgunConfig::default_path);
    debug!("Loading config from {:?}", config_path);
    let mut config = LightgunConfig::load(&config_path)?;
    if let Some(store) = cli.store {
        config.store_dir = Some(store);
    }

    match cli.command {
        None | Some(Commands::Status { json: false }) => {
            commands::slots::status(&config, false).await?;
        }
        Some(Commands::Status { json: true }) => {
            commands::slots::status(&config, true).await?;
        }

        // === Devices ===
        Some(Commands::List) => {
            commands::devices::list(&config).await?;
        }
        Some(Commands::Select) => {
            commands::devices::select(&config).await?;
        }

        // === Slots ===
        Some(Commands::Detect { pointer }) => {
            commands::slots::detect(&config, pointer).await?;
        }
        Some(Commands::MapButton { player, role }) => {
            commands::slots::map_button(&config, player, role).await?;
        }
        Some(Commands::Cursor { player, show }) => {
            commands::slots::cursor(&config, player, show).await?;
        }
        Some(Commands::Reset) => {
            commands::slots::reset(&config).await?;
        }

        // === Calibration ===
        Some(Commands::Calibrate { player }) => {
            commands::calibrate::calibrate(&config, player).await?;
        }
        Some(Commands::ClearCalibration { device }) => {
            commands::calibrate::clear(&config, &device).await?;
        }

        Some(Commands::Run { pointer }) => {
            commands::run::run(&config, pointer).await?;
        }
    }

    info!("Done");
    Ok(())
}
