//! Calibration commands

use lightgun_driver::terminal::{ConsoleTargets, TracingCursor};
use lightgun_driver::{LightgunConfig, Pipeline};
use lightgun_guns::{run_wizard, NoUi, WizardOutcome};
use lightgun_transport::DeviceId;

use super::{ctrl_c, open_pipeline, player_gun, slot_index, CommandResult};

/// Run the two-target wizard for a player's gun and store the result
pub async fn calibrate(config: &LightgunConfig, player: u8) -> CommandResult {
    let mut pipeline = open_pipeline(config).await;
    let id = player_gun(&pipeline, player)?;
    let trigger = pipeline
        .router
        .slot(slot_index(player))
        .map(|slot| slot.buttons.trigger)
        .unwrap_or_default();

    // The tap keeps wizard shots away from the game
    let tap = pipeline.router.set_device_input_handler(id.clone());
    let wizard = pipeline.router.calibration().begin_wizard(id.clone(), trigger);
    let mut targets = ConsoleTargets {
        player: usize::from(player),
    };

    let outcome = tokio::select! {
        outcome = run_wizard(wizard, tap, &mut targets, ctrl_c()) => outcome,
        _ = pipeline.pump_forever() => WizardOutcome::Cancelled,
    };
    pipeline.router.remove_device_input_handler(&id);

    match outcome {
        WizardOutcome::Completed(profile) => {
            println!(
                "Calibrated {}: x = raw1 * {:.5} + {:.1}, y = raw2 * {:.5} + {:.1}",
                id, profile.scale_x, profile.offset_x, profile.scale_y, profile.offset_y
            );
            pipeline.router.calibration_mut().set_profile(id, profile);
        }
        WizardOutcome::Cancelled => println!("Calibration cancelled, previous profile kept"),
    }
    pipeline.shutdown();
    Ok(())
}

/// Forget a gun's calibration
pub async fn clear(config: &LightgunConfig, device: &str) -> CommandResult {
    let mut pipeline = Pipeline::from_config(config, Box::new(TracingCursor), Box::new(NoUi));
    let id = DeviceId::from(device);
    if pipeline.router.calibration_mut().clear_profile(&id) {
        println!("Removed calibration for {}", id);
    } else {
        println!("No calibration stored for {}", id);
    }
    Ok(())
}
