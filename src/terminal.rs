//! Terminal front end: mouse capture as the pointer fallback, and console
//! output for wizard targets and cursors

use std::io::{stdout, Write};

use crossterm::event::{
    DisableMouseCapture, EnableMouseCapture, Event, EventStream, KeyCode, KeyEventKind,
    KeyModifiers, MouseButton, MouseEvent, MouseEventKind,
};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use crossterm::ExecutableCommand;
use futures::StreamExt;
use lightgun_guns::{
    CursorSink, PointerEvent, PointerKind, ScreenPoint, SurfaceGeometry, TargetPresenter,
};
use tracing::{debug, trace};

/// Pointer id reported for the terminal mouse; there is only ever one
pub const TERMINAL_POINTER_ID: u32 = 1;

/// Raw bit a mouse button maps to
fn button_bit(button: MouseButton) -> u8 {
    match button {
        MouseButton::Left => 0,
        MouseButton::Right => 1,
        MouseButton::Middle => 2,
    }
}

/// Map a terminal mouse event onto the play surface
///
/// Each cell covers `surface / terminal size` pixels; the pointer sits at the
/// cell center. Scroll events are ignored.
pub fn pointer_from_mouse(
    event: &MouseEvent,
    columns: u16,
    rows: u16,
    surface: &SurfaceGeometry,
) -> Option<PointerEvent> {
    if columns == 0 || rows == 0 {
        return None;
    }
    let kind = match event.kind {
        MouseEventKind::Down(button) => PointerKind::Down(button_bit(button)),
        MouseEventKind::Up(button) => PointerKind::Up(button_bit(button)),
        MouseEventKind::Moved | MouseEventKind::Drag(_) => PointerKind::Move,
        _ => return None,
    };
    let x = (f64::from(event.column) + 0.5) / f64::from(columns) * surface.surface_width;
    let y = (f64::from(event.row) + 0.5) / f64::from(rows) * surface.surface_height;
    Some(PointerEvent {
        pointer_id: TERMINAL_POINTER_ID,
        x,
        y,
        kind,
    })
}

/// What the terminal produced
#[derive(Debug, Clone, PartialEq)]
pub enum TerminalInput {
    Pointer(PointerEvent),
    /// `q`, Esc or Ctrl+C (raw mode swallows the signal)
    Quit,
}

/// Mouse capture for the lifetime of the value
pub struct TerminalPointer {
    events: EventStream,
    surface: SurfaceGeometry,
}

impl TerminalPointer {
    pub fn enable(surface: SurfaceGeometry) -> anyhow::Result<Self> {
        enable_raw_mode()?;
        stdout().execute(EnableMouseCapture)?;
        debug!("Terminal mouse capture enabled");
        Ok(Self {
            events: EventStream::new(),
            surface,
        })
    }

    /// Next pointer event or quit request; `None` when the terminal closes
    pub async fn next(&mut self) -> Option<TerminalInput> {
        while let Some(event) = self.events.next().await {
            let event = match event {
                Ok(event) => event,
                Err(e) => {
                    debug!("Terminal event error: {}", e);
                    continue;
                }
            };
            match event {
                Event::Mouse(mouse) => {
                    let (columns, rows) = crossterm::terminal::size().unwrap_or((80, 24));
                    if let Some(pointer) = pointer_from_mouse(&mouse, columns, rows, &self.surface) {
                        return Some(TerminalInput::Pointer(pointer));
                    }
                }
                Event::Key(key) if key.kind == KeyEventKind::Press => {
                    let ctrl_c = key.code == KeyCode::Char('c')
                        && key.modifiers.contains(KeyModifiers::CONTROL);
                    if ctrl_c || matches!(key.code, KeyCode::Char('q') | KeyCode::Esc) {
                        return Some(TerminalInput::Quit);
                    }
                }
                _ => {}
            }
        }
        None
    }
}

impl Drop for TerminalPointer {
    fn drop(&mut self) {
        let _ = stdout().execute(DisableMouseCapture);
        let _ = disable_raw_mode();
    }
}

/// Prints wizard targets for the user to aim at
pub struct ConsoleTargets {
    pub player: usize,
}

impl TargetPresenter for ConsoleTargets {
    fn show_target(&mut self, index: usize, target: ScreenPoint) {
        let corner = if index == 0 { "top-left" } else { "bottom-right" };
        println!(
            "Player {}: shoot the {} target at screen ({:.0}, {:.0})",
            self.player, corner, target.x, target.y
        );
        let _ = stdout().flush();
    }

    fn finish(&mut self) {
        println!();
    }
}

/// Cursor sink that traces positions
#[derive(Debug, Default)]
pub struct TracingCursor;

impl CursorSink for TracingCursor {
    fn update(&mut self, slot: usize, x: f64, y: f64, visible: bool) {
        trace!(slot, x, y, visible, "cursor");
    }
}
