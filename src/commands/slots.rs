//! Slot commands: status, detect, map-button, cursor, reset

use anyhow::bail;
use lightgun_driver::terminal::{TerminalInput, TerminalPointer};
use lightgun_driver::LightgunConfig;
use lightgun_guns::{ButtonRole, GameEvent, SlotAssignment, SLOT_COUNT};
use serde_json::json;
use tokio::sync::oneshot;
use tracing::info;

use super::run::next_terminal_input;
use super::{ctrl_c, open_pipeline, player_gun, slot_index, CommandResult};

/// Print player slots and calibration profiles
pub async fn status(config: &LightgunConfig, as_json: bool) -> CommandResult {
    let pipeline = open_pipeline(config).await;
    let router = &pipeline.router;
    let calibration = router.calibration().profiles();

    if as_json {
        let slots: Vec<_> = router
            .slots()
            .iter()
            .map(|slot| {
                json!({
                    "player": slot.player(),
                    "color": slot.color,
                    "profile": slot.to_profile(),
                    "connected": slot.connected,
                })
            })
            .collect();
        let profiles: serde_json::Map<String, serde_json::Value> = calibration
            .iter()
            .map(|(id, profile)| Ok((id.to_string(), serde_json::to_value(profile)?)))
            .collect::<Result<_, serde_json::Error>>()?;
        let doc = json!({
            "hidAvailable": pipeline.registry.is_available(),
            "slots": slots,
            "calibration": profiles,
        });
        println!("{}", serde_json::to_string_pretty(&doc)?);
        return Ok(());
    }

    if !pipeline.registry.is_available() {
        println!("HID access unavailable; pointer fallback only\n");
    }
    for slot in router.slots() {
        let source = match &slot.assignment {
            SlotAssignment::Unassigned => "unassigned".to_string(),
            SlotAssignment::Pointer(id) => format!("pointer {id}"),
            SlotAssignment::Hid(id) => {
                let calibrated = if router.calibration().profile(id).is_some() {
                    "calibrated"
                } else {
                    "uncalibrated"
                };
                format!(
                    "{} ({}, {})",
                    id,
                    slot.device_name.as_deref().unwrap_or("unknown"),
                    calibrated
                )
            }
        };
        let state = if !slot.assignment.is_assigned() {
            ""
        } else if slot.connected {
            " connected"
        } else {
            " disconnected"
        };
        println!("P{} {} {}{}", slot.player(), slot.color, source, state);
        if slot.assignment.is_assigned() {
            let buttons: Vec<String> = ButtonRole::ALL
                .iter()
                .map(|role| format!("{}={}", role.name(), slot.buttons.get(*role)))
                .collect();
            println!(
                "   buttons: {}  cursor: {}",
                buttons.join(" "),
                if slot.show_cursor { "shown" } else { "hidden" }
            );
        }
    }

    if !calibration.is_empty() {
        println!("\nCalibration profiles:");
        for (id, p) in calibration {
            println!(
                "  {}  x = raw1 * {:.5} + {:.1}  y = raw2 * {:.5} + {:.1}  ({}x{})",
                id, p.scale_x, p.offset_x, p.scale_y, p.offset_y, p.screen_width, p.screen_height
            );
        }
    }
    Ok(())
}

/// Bind sources to free slots until every slot is full, timeout or quit
pub async fn detect(config: &LightgunConfig, pointer: bool) -> CommandResult {
    let mut pipeline = open_pipeline(config).await;
    if !pointer && !pipeline.registry.is_available() {
        bail!("HID access unavailable; use `detect --pointer`");
    }

    let mut terminal = if pointer {
        pipeline
            .router
            .start_detection(|slot| info!("Player {} assigned", slot + 1));
        Some(TerminalPointer::enable(config.surface)?)
    } else {
        pipeline
            .router
            .start_detection_via_devices(|slot| info!("Player {} assigned", slot + 1));
        None
    };
    print!(
        "Pull the trigger on each {} in player order (q / Ctrl+C to stop)\r\n",
        if pointer { "mouse" } else { "gun" }
    );

    let deadline = tokio::time::sleep(config.input_timeout());
    tokio::pin!(deadline);
    let shutdown = ctrl_c();
    tokio::pin!(shutdown);

    loop {
        let input = tokio::select! {
            _ = &mut deadline => break,
            _ = &mut shutdown => break,
            _ = pipeline.step() => None,
            input = next_terminal_input(&mut terminal) => match input {
                Some(TerminalInput::Pointer(event)) => Some(event),
                Some(TerminalInput::Quit) | None => break,
            },
        };
        if let Some(event) = input {
            pipeline.router.handle_pointer(event);
        }
        while let Some(event) = pipeline.next_game_event() {
            if let GameEvent::GunAssigned { slot } = event {
                print!("Player {} ready\r\n", slot + 1);
            }
        }
        let bound = pipeline
            .router
            .slots()
            .iter()
            .filter(|s| s.assignment.is_assigned())
            .count();
        if bound == SLOT_COUNT {
            print!("All slots assigned\r\n");
            break;
        }
    }

    pipeline.router.stop_detection();
    drop(terminal);
    pipeline.shutdown();
    Ok(())
}

/// Learn the raw button a player's gun uses for a role
pub async fn map_button(config: &LightgunConfig, player: u8, role: ButtonRole) -> CommandResult {
    let mut pipeline = open_pipeline(config).await;
    let id = player_gun(&pipeline, player)?;

    let (tx, mut rx) = oneshot::channel();
    pipeline.router.map_next_button(id, move |bit| {
        let _ = tx.send(bit);
    });
    println!("Press the {} button on player {}'s gun", role.name(), player);

    let deadline = tokio::time::sleep(config.input_timeout());
    tokio::pin!(deadline);
    let shutdown = ctrl_c();
    tokio::pin!(shutdown);

    let bit = loop {
        tokio::select! {
            bit = &mut rx => match bit {
                Ok(bit) => break Some(bit),
                Err(_) => break None,
            },
            _ = &mut deadline => break None,
            _ = &mut shutdown => break None,
            _ = pipeline.step() => {}
        }
    };

    pipeline.router.cancel_button_mapping();
    match bit {
        Some(bit) => {
            pipeline.router.set_button(slot_index(player), role, bit);
            println!("Player {} {} = button {}", player, role.name(), bit);
        }
        None => println!("No button pressed, mapping unchanged"),
    }
    pipeline.shutdown();
    Ok(())
}

/// Show or hide a player's cursor
pub async fn cursor(config: &LightgunConfig, player: u8, show: bool) -> CommandResult {
    let mut pipeline = open_pipeline(config).await;
    if !pipeline.router.set_show_cursor(slot_index(player), show) {
        bail!("No player {player}");
    }
    println!(
        "Player {} cursor {}",
        player,
        if show { "shown" } else { "hidden" }
    );
    Ok(())
}

/// Unbind every player slot
pub async fn reset(config: &LightgunConfig) -> CommandResult {
    let mut pipeline = open_pipeline(config).await;
    pipeline.router.reset_assignments();
    println!("Cleared all {} player slots; calibration kept", SLOT_COUNT);
    Ok(())
}
