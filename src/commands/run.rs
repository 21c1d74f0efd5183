//! The game-facing loop: pump guns, print game events

use lightgun_driver::terminal::{TerminalInput, TerminalPointer, TERMINAL_POINTER_ID};
use lightgun_driver::{LightgunConfig, Pipeline};
use lightgun_guns::{GameEvent, SLOT_COUNT};
use tracing::info;

use super::{ctrl_c, open_pipeline, CommandResult};

/// Next terminal input, or never when there is no terminal pointer
pub async fn next_terminal_input(terminal: &mut Option<TerminalPointer>) -> Option<TerminalInput> {
    match terminal {
        Some(terminal) => terminal.next().await,
        None => std::future::pending().await,
    }
}

fn describe(event: &GameEvent) -> String {
    match event {
        GameEvent::Shoot { slot, x, y } => format!("P{} shoot ({:.0}, {:.0})", slot + 1, x, y),
        GameEvent::GunAssigned { slot } => format!("P{} assigned", slot + 1),
        GameEvent::StartButton { slot } => format!("P{} start", slot + 1),
        GameEvent::Reload { slot } => format!("P{} reload", slot + 1),
    }
}

/// Bind the terminal mouse to the first free slot unless a slot already has it
fn bind_terminal_pointer(pipeline: &mut Pipeline) {
    if pipeline.router.slot_for_pointer(TERMINAL_POINTER_ID).is_some() {
        return;
    }
    let free = (0..SLOT_COUNT).find(|&i| {
        pipeline
            .router
            .slot(i)
            .is_some_and(|slot| !slot.assignment.is_assigned())
    });
    match free {
        Some(index) => {
            pipeline.router.assign_pointer(index, TERMINAL_POINTER_ID);
            info!("Mouse drives player {}", index + 1);
        }
        None => info!("All slots taken; the mouse only drives menus"),
    }
}

/// Run until Ctrl+C (or `q` with the terminal pointer)
pub async fn run(config: &LightgunConfig, pointer: bool) -> CommandResult {
    let mut pipeline = open_pipeline(config).await;
    let use_pointer = pointer || !pipeline.registry.is_available();
    let mut terminal = if use_pointer {
        bind_terminal_pointer(&mut pipeline);
        Some(TerminalPointer::enable(config.surface)?)
    } else {
        None
    };
    print!("Running; press Ctrl+C to stop\r\n");

    let shutdown = ctrl_c();
    tokio::pin!(shutdown);

    loop {
        let input = tokio::select! {
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
        // Raw mode needs the explicit carriage return
        while let Some(event) = pipeline.next_game_event() {
            print!("{}\r\n", describe(&event));
        }
    }

    drop(terminal);
    pipeline.shutdown();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_uses_player_numbers() {
        assert_eq!(
            describe(&GameEvent::Shoot { slot: 0, x: 960.4, y: 640.0 }),
            "P1 shoot (960, 640)"
        );
        assert_eq!(describe(&GameEvent::Reload { slot: 3 }), "P4 reload");
    }
}
