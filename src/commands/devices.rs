//! Discovery commands: list, select

use lightgun_driver::terminal::TracingCursor;
use lightgun_driver::{LightgunConfig, Pipeline};
use lightgun_guns::NoUi;
use lightgun_transport::known_devices;

use super::{open_pipeline, CommandResult};

/// List connected guns with their identity and player slot
pub async fn list(config: &LightgunConfig) -> CommandResult {
    let pipeline = open_pipeline(config).await;
    if !pipeline.registry.is_available() {
        println!("HID access unavailable; only the pointer fallback can drive slots");
        return Ok(());
    }

    let devices = pipeline.registry.devices();
    if devices.is_empty() {
        println!("No lightguns found");
        return Ok(());
    }

    println!("{:<28} {:<13} {:<7} {:<8} NAME", "ID", "FAMILY", "PLAYER", "SLOT");
    for (id, info) in devices {
        let hint = known_devices::lookup(info.vid, info.pid)
            .and_then(|k| k.player_hint)
            .map(|p| format!("P{p}"))
            .unwrap_or_else(|| "-".into());
        let slot = pipeline
            .router
            .slot_for_device(&id)
            .map(|s| format!("P{}", s + 1))
            .unwrap_or_else(|| "-".into());
        println!(
            "{:<28} {:<13} {:<7} {:<8} {}",
            id.as_str(),
            info.family.tag(),
            hint,
            slot,
            info.display_name()
        );
        if info.usable_serial().is_none() {
            println!("  (no serial: identity only holds until the gun is unplugged)");
        }
    }
    Ok(())
}

/// Ask for guns from the known device table and open them
pub async fn select(config: &LightgunConfig) -> CommandResult {
    let mut pipeline = Pipeline::from_config(config, Box::new(TracingCursor), Box::new(NoUi));
    if !pipeline.registry.is_available() {
        println!("HID access unavailable");
        return Ok(());
    }

    let ids = pipeline.registry.request_selection().await;
    if ids.is_empty() {
        println!("No guns selected");
        return Ok(());
    }
    for id in ids {
        let name = pipeline
            .registry
            .device(&id)
            .map(|info| info.display_name())
            .unwrap_or_default();
        println!("Selected {} ({})", id, name);
    }
    Ok(())
}
