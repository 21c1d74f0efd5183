//! Command handlers for the CLI application.
//!
//! - `devices`: discovery commands (list, select)
//! - `slots`: slot commands (status, detect, map-button, cursor, reset)
//! - `calibrate`: calibration wizard and profile removal
//! - `run`: the game-facing event loop

pub mod calibrate;
pub mod devices;
pub mod run;
pub mod slots;

use anyhow::{bail, Result};
use lightgun_driver::terminal::TracingCursor;
use lightgun_driver::{LightgunConfig, Pipeline};
use lightgun_guns::NoUi;
use lightgun_transport::DeviceId;

/// Result type for command handlers
pub type CommandResult = Result<()>;

/// Assemble the pipeline and open present guns
pub async fn open_pipeline(config: &LightgunConfig) -> Pipeline {
    let mut pipeline = Pipeline::from_config(config, Box::new(TracingCursor), Box::new(NoUi));
    pipeline.start().await;
    pipeline
}

/// Slot index for a 1-based player number
pub fn slot_index(player: u8) -> usize {
    usize::from(player.saturating_sub(1))
}

/// The gun bound to a player, which must be connected
pub fn player_gun(pipeline: &Pipeline, player: u8) -> Result<DeviceId> {
    let Some(slot) = pipeline.router.slot(slot_index(player)) else {
        bail!("No player {player}");
    };
    let Some(id) = slot.hid_device() else {
        bail!("Player {player} has no gun assigned (run `detect` first)");
    };
    if !slot.connected {
        bail!("Player {player}'s gun {id} is not connected");
    }
    Ok(id.clone())
}

/// Resolves on Ctrl+C
pub async fn ctrl_c() {
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
}
