//! Lightgun calibration and player slot routing
//!
//! Sits between the device registry and the game: maps raw sensor readings
//! to surface pixels per gun, and binds guns (or a fallback pointer) to four
//! player slots that emit shoot/start/reload events.

pub mod calibration;
pub mod error;
pub mod output;
pub mod router;
pub mod slots;
pub mod store;
pub mod wizard;

pub use calibration::{
    solve_two_point, AimPoint, CalibrationEngine, CalibrationProfile, CalibrationSample,
    ScreenPoint, SurfaceGeometry,
};
pub use error::{CalibrationError, StoreError};
pub use output::{CursorSink, GameEvent, NoCursor, NoUi, PointerEvent, PointerKind, UiClickRouter};
pub use router::GunSlotRouter;
pub use slots::{ButtonMapping, ButtonRole, GunProfile, GunSlot, SlotAssignment, SlotWatch, SLOT_COUNT};
pub use store::{JsonFileStore, KeyValueStore, MemoryStore, SharedStore};
pub use wizard::{run_wizard, CalibrationWizard, TargetPresenter, WizardOutcome, WizardProgress};
