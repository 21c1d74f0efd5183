// CLI definitions using clap

use clap::{Parser, Subcommand};
use lightgun_guns::ButtonRole;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "lightgun_driver")]
#[command(author, version, about = "Multi-gun lightgun input driver")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Config file path (default: ~/.config/lightgun/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Override the profile/calibration store directory
    #[arg(long, global = true, value_name = "DIR")]
    pub store: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List connected lightguns
    #[command(visible_alias = "ls")]
    List,

    /// Pick guns to use from the known device table
    Select,

    /// Show player slots and calibration profiles
    #[command(visible_alias = "st")]
    Status {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Bind guns to free player slots by pulling their triggers
    Detect {
        /// Detect the terminal mouse instead of HID guns
        #[arg(long)]
        pointer: bool,
    },

    /// Learn which raw button a slot uses for a role
    MapButton {
        /// Player number (1-4)
        #[arg(value_parser = clap::value_parser!(u8).range(1..=4))]
        player: u8,
        /// Role to learn (trigger, reload, start)
        role: ButtonRole,
    },

    /// Run the two-point calibration wizard for a player's gun
    #[command(visible_alias = "cal")]
    Calibrate {
        /// Player number (1-4)
        #[arg(value_parser = clap::value_parser!(u8).range(1..=4))]
        player: u8,
    },

    /// Toggle a player's cursor
    Cursor {
        /// Player number (1-4)
        #[arg(value_parser = clap::value_parser!(u8).range(1..=4))]
        player: u8,
        #[arg(action = clap::ArgAction::Set)]
        show: bool,
    },

    /// Clear all player slot assignments (calibration is kept)
    Reset,

    /// Delete a device's calibration profile
    ClearCalibration {
        /// Device id as shown by `list`
        device: String,
    },

    /// Run the pipeline and print game events
    Run {
        /// Also drive pointer slots from the terminal mouse
        #[arg(long)]
        pointer: bool,
    },
}
