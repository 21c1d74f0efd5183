//! Events and collaborator seams on the game side of the router

/// High level events for the game
#[derive(Debug, Clone, PartialEq)]
pub enum GameEvent {
    /// Trigger pulled, surface-relative coordinates
    Shoot { slot: usize, x: f64, y: f64 },
    /// A source was bound to a slot in detection mode
    GunAssigned { slot: usize },
    StartButton { slot: usize },
    Reload { slot: usize },
}

/// Renders per-slot cursors
pub trait CursorSink: Send {
    fn update(&mut self, slot: usize, x: f64, y: f64, visible: bool);
}

/// Gets first refusal on trigger pulls, for menus and buttons
pub trait UiClickRouter: Send {
    /// Returns true when the click hit UI and must not become a shot
    fn click(&mut self, slot: usize, x: f64, y: f64) -> bool;
}

/// Cursor sink that draws nothing
#[derive(Debug, Default)]
pub struct NoCursor;

impl CursorSink for NoCursor {
    fn update(&mut self, _slot: usize, _x: f64, _y: f64, _visible: bool) {}
}

/// UI router that never consumes a click
#[derive(Debug, Default)]
pub struct NoUi;

impl UiClickRouter for NoUi {
    fn click(&mut self, _slot: usize, _x: f64, _y: f64) -> bool {
        false
    }
}

/// Fallback pointer input, already surface-relative
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointerEvent {
    pub pointer_id: u32,
    pub x: f64,
    pub y: f64,
    pub kind: PointerKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerKind {
    Move,
    /// Button pressed; the index is used as a raw button bit
    Down(u8),
    Up(u8),
}
