//! Lightgun driver host
//!
//! Wires the device registry, calibration engine and slot router into a
//! single-task event loop, with a terminal mouse fallback when no HID
//! access is available.

pub mod config;
pub mod runtime;
pub mod terminal;

pub use config::LightgunConfig;
pub use runtime::Pipeline;
