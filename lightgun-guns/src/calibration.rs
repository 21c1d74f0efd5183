//! Raw sensor to surface coordinate mapping
//!
//! Three coordinate spaces are involved:
//! - raw: the gun's two u16 sensor axes
//! - screen: absolute desktop pixels, what a calibration profile produces
//! - surface: pixels relative to the play surface's top-left corner, what
//!   the rest of the pipeline consumes
//!
//! Profiles map raw to screen, so they survive the window being moved or the
//! surface being resized. [`CalibrationEngine::transform`] subtracts the
//! surface's current screen origin on every call.

use std::collections::HashMap;

use lightgun_transport::DeviceId;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Axis, CalibrationError};
use crate::store::{self, SharedStore, KEY_GUN_CALIBRATION};
use crate::wizard::CalibrationWizard;

/// Distance of the wizard targets from the viewport edges, in pixels
pub const TARGET_MARGIN: f64 = 100.0;

/// Raw range assumed for uncalibrated guns
pub const RAW_AXIS_MAX: f64 = 65535.0;

/// Fraction of the surface size a point may sit outside before it is offscreen
pub const OFFSCREEN_TOLERANCE: f64 = 0.10;

/// A point in pixels
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ScreenPoint {
    pub x: f64,
    pub y: f64,
}

impl ScreenPoint {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Where the play surface sits on screen
///
/// Window origin is the top-left of the window content on the desktop;
/// the surface box is relative to the viewport.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SurfaceGeometry {
    pub window_x: f64,
    pub window_y: f64,
    pub viewport_width: f64,
    pub viewport_height: f64,
    pub surface_x: f64,
    pub surface_y: f64,
    pub surface_width: f64,
    pub surface_height: f64,
}

impl SurfaceGeometry {
    /// A surface filling a viewport placed at the desktop origin
    pub fn fullscreen(width: f64, height: f64) -> Self {
        Self {
            window_x: 0.0,
            window_y: 0.0,
            viewport_width: width,
            viewport_height: height,
            surface_x: 0.0,
            surface_y: 0.0,
            surface_width: width,
            surface_height: height,
        }
    }

    /// Screen position of the surface's top-left corner
    pub fn surface_origin(&self) -> ScreenPoint {
        ScreenPoint::new(
            self.window_x + self.surface_x,
            self.window_y + self.surface_y,
        )
    }

    /// Wizard targets in screen coordinates: top-left, then bottom-right
    pub fn wizard_targets(&self) -> [ScreenPoint; 2] {
        [
            ScreenPoint::new(self.window_x + TARGET_MARGIN, self.window_y + TARGET_MARGIN),
            ScreenPoint::new(
                self.window_x + self.viewport_width - TARGET_MARGIN,
                self.window_y + self.viewport_height - TARGET_MARGIN,
            ),
        ]
    }

    /// Whether a surface-relative point is offscreen
    ///
    /// Points up to 10% of the surface size past an edge still count as on
    /// the surface, so shots at the border are not lost.
    pub fn is_offscreen(&self, x: f64, y: f64) -> bool {
        let slack_x = self.surface_width * OFFSCREEN_TOLERANCE;
        let slack_y = self.surface_height * OFFSCREEN_TOLERANCE;
        x < -slack_x
            || x > self.surface_width + slack_x
            || y < -slack_y
            || y > self.surface_height + slack_y
    }

    /// Clamp a surface-relative point to the surface
    pub fn clamp(&self, x: f64, y: f64) -> ScreenPoint {
        ScreenPoint::new(
            x.clamp(0.0, self.surface_width.max(0.0)),
            y.clamp(0.0, self.surface_height.max(0.0)),
        )
    }

    pub fn center(&self) -> ScreenPoint {
        ScreenPoint::new(self.surface_width / 2.0, self.surface_height / 2.0)
    }
}

impl Default for SurfaceGeometry {
    fn default() -> Self {
        Self::fullscreen(1920.0, 1080.0)
    }
}

/// One wizard capture: the target shown and the raw reading shot at it
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationSample {
    pub target: ScreenPoint,
    pub raw1: u16,
    pub raw2: u16,
}

/// Per-device affine map from raw sensor axes to screen pixels
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalibrationProfile {
    pub scale_x: f64,
    pub offset_x: f64,
    pub scale_y: f64,
    pub offset_y: f64,
    /// Raw axis 1 drives X (and axis 2 drives Y)
    pub axis_swapped: bool,
    /// Viewport size when the profile was captured
    pub screen_width: f64,
    pub screen_height: f64,
}

impl CalibrationProfile {
    /// Map a raw reading to screen pixels
    pub fn to_screen(&self, raw1: u16, raw2: u16) -> ScreenPoint {
        let (rx, ry) = if self.axis_swapped {
            (raw1, raw2)
        } else {
            (raw2, raw1)
        };
        ScreenPoint::new(
            f64::from(rx) * self.scale_x + self.offset_x,
            f64::from(ry) * self.scale_y + self.offset_y,
        )
    }
}

/// Solve one axis: `scale = (s2 - s1) / (r2 - r1)`, `offset = s1 - r1 * scale`
fn solve_axis(axis: Axis, s1: f64, r1: u16, s2: f64, r2: u16) -> Result<(f64, f64), CalibrationError> {
    if r1 == r2 {
        return Err(CalibrationError::DegenerateCalibration { axis, raw: r1 });
    }
    let scale = (s2 - s1) / (f64::from(r2) - f64::from(r1));
    Ok((scale, s1 - f64::from(r1) * scale))
}

/// Two-point affine solve, raw axis 1 to X and raw axis 2 to Y
pub fn solve_two_point(
    first: CalibrationSample,
    second: CalibrationSample,
    screen_width: f64,
    screen_height: f64,
) -> Result<CalibrationProfile, CalibrationError> {
    let (scale_x, offset_x) =
        solve_axis(Axis::X, first.target.x, first.raw1, second.target.x, second.raw1)?;
    let (scale_y, offset_y) =
        solve_axis(Axis::Y, first.target.y, first.raw2, second.target.y, second.raw2)?;
    Ok(CalibrationProfile {
        scale_x,
        offset_x,
        scale_y,
        offset_y,
        axis_swapped: true,
        screen_width,
        screen_height,
    })
}

/// A transformed aim point, relative to the play surface
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AimPoint {
    pub x: f64,
    pub y: f64,
    pub offscreen: bool,
}

/// Owns calibration profiles and the current surface geometry
pub struct CalibrationEngine {
    profiles: HashMap<DeviceId, CalibrationProfile>,
    surface: SurfaceGeometry,
    store: SharedStore,
}

impl CalibrationEngine {
    /// Create an engine and load persisted profiles
    pub fn new(store: SharedStore, surface: SurfaceGeometry) -> Self {
        let profiles: HashMap<DeviceId, CalibrationProfile> =
            store::load_value(store.as_ref(), KEY_GUN_CALIBRATION).unwrap_or_default();
        if !profiles.is_empty() {
            info!("Loaded {} calibration profiles", profiles.len());
        }
        Self {
            profiles,
            surface,
            store,
        }
    }

    /// Register the current surface geometry (window moved or resized)
    pub fn set_target_surface(&mut self, surface: SurfaceGeometry) {
        debug!("Target surface now {:?}", surface);
        self.surface = surface;
    }

    pub fn surface(&self) -> &SurfaceGeometry {
        &self.surface
    }

    /// Map a raw reading to surface coordinates
    ///
    /// Uncalibrated devices are mapped proportionally over the full raw range
    /// onto the viewport.
    pub fn transform(&self, device_id: &DeviceId, raw1: u16, raw2: u16) -> AimPoint {
        let screen = match self.profiles.get(device_id) {
            Some(profile) => profile.to_screen(raw1, raw2),
            None => ScreenPoint::new(
                self.surface.window_x
                    + f64::from(raw1) / RAW_AXIS_MAX * self.surface.viewport_width,
                self.surface.window_y
                    + f64::from(raw2) / RAW_AXIS_MAX * self.surface.viewport_height,
            ),
        };
        let origin = self.surface.surface_origin();
        let x = screen.x - origin.x;
        let y = screen.y - origin.y;
        AimPoint {
            x,
            y,
            offscreen: self.surface.is_offscreen(x, y),
        }
    }

    /// Start a two-point wizard for a device against the current surface
    pub fn begin_wizard(&self, device_id: DeviceId, trigger_bit: u8) -> CalibrationWizard {
        CalibrationWizard::new(device_id, &self.surface, trigger_bit)
    }

    pub fn profile(&self, device_id: &DeviceId) -> Option<&CalibrationProfile> {
        self.profiles.get(device_id)
    }

    /// All profiles, sorted by device id
    pub fn profiles(&self) -> Vec<(DeviceId, CalibrationProfile)> {
        let mut profiles: Vec<_> = self
            .profiles
            .iter()
            .map(|(id, p)| (id.clone(), *p))
            .collect();
        profiles.sort_by(|a, b| a.0.cmp(&b.0));
        profiles
    }

    /// Store a profile (overwriting) and persist immediately
    pub fn set_profile(&mut self, device_id: DeviceId, profile: CalibrationProfile) {
        info!("Calibrated {}", device_id);
        self.profiles.insert(device_id, profile);
        self.save();
    }

    /// Drop a device's profile; returns false if it had none
    pub fn clear_profile(&mut self, device_id: &DeviceId) -> bool {
        if self.profiles.remove(device_id).is_none() {
            return false;
        }
        info!("Cleared calibration for {}", device_id);
        self.save();
        true
    }

    fn save(&self) {
        store::save_value(self.store.as_ref(), KEY_GUN_CALIBRATION, &self.profiles);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{KeyValueStore, MemoryStore};
    use std::sync::Arc;

    const EPS: f64 = 1e-6;

    fn sample(x: f64, y: f64, raw1: u16, raw2: u16) -> CalibrationSample {
        CalibrationSample {
            target: ScreenPoint::new(x, y),
            raw1,
            raw2,
        }
    }

    fn worked_example() -> CalibrationProfile {
        solve_two_point(
            sample(100.0, 100.0, 1000, 2000),
            sample(1820.0, 1180.0, 30000, 31000),
            1920.0,
            1280.0,
        )
        .unwrap()
    }

    #[test]
    fn test_worked_example() {
        let profile = worked_example();
        assert!((profile.scale_x - 1720.0 / 29000.0).abs() < EPS);
        assert!((profile.scale_x - 0.05929).abs() < 1e-5);
        assert!(profile.axis_swapped);

        let store = Arc::new(MemoryStore::new());
        let mut engine = CalibrationEngine::new(store, SurfaceGeometry::fullscreen(1920.0, 1280.0));
        let id = DeviceId::from("0483:5750:A");
        engine.set_profile(id.clone(), profile);
        let aim = engine.transform(&id, 15500, 16500);
        assert!((aim.x - 960.0).abs() < 0.5);
        assert!((aim.y - 640.0).abs() < 0.5);
        assert!(!aim.offscreen);
    }

    #[test]
    fn test_exact_at_calibration_points() {
        let profile = worked_example();
        let p1 = profile.to_screen(1000, 2000);
        let p2 = profile.to_screen(30000, 31000);
        assert!((p1.x - 100.0).abs() < EPS && (p1.y - 100.0).abs() < EPS);
        assert!((p2.x - 1820.0).abs() < EPS && (p2.y - 1180.0).abs() < EPS);
    }

    #[test]
    fn test_degenerate_axis() {
        let err = solve_two_point(
            sample(100.0, 100.0, 5000, 2000),
            sample(1820.0, 1180.0, 5000, 31000),
            1920.0,
            1280.0,
        )
        .unwrap_err();
        assert_eq!(
            err,
            CalibrationError::DegenerateCalibration {
                axis: Axis::X,
                raw: 5000
            }
        );
        assert!(solve_two_point(
            sample(100.0, 100.0, 1, 7),
            sample(1820.0, 1180.0, 2, 7),
            1920.0,
            1280.0
        )
        .is_err());
    }

    #[test]
    fn test_wizard_targets_include_window_origin() {
        let mut surface = SurfaceGeometry::fullscreen(1920.0, 1280.0);
        assert_eq!(
            surface.wizard_targets(),
            [ScreenPoint::new(100.0, 100.0), ScreenPoint::new(1820.0, 1180.0)]
        );
        surface.window_x = 50.0;
        surface.window_y = 30.0;
        assert_eq!(surface.wizard_targets()[0], ScreenPoint::new(150.0, 130.0));
    }

    #[test]
    fn test_transform_follows_window_moves() {
        let store = Arc::new(MemoryStore::new());
        let mut engine = CalibrationEngine::new(store, SurfaceGeometry::fullscreen(1920.0, 1280.0));
        let id = DeviceId::from("0483:5750:A");
        engine.set_profile(id.clone(), worked_example());

        // Window moved right by 200px, surface inset by 10px: same raw reading
        // lands 210px further left on the surface
        let mut moved = SurfaceGeometry::fullscreen(1920.0, 1280.0);
        moved.window_x = 200.0;
        moved.surface_x = 10.0;
        engine.set_target_surface(moved);
        let aim = engine.transform(&id, 15500, 16500);
        assert!((aim.x - 750.0).abs() < 0.5);
    }

    #[test]
    fn test_offscreen_threshold() {
        let surface = SurfaceGeometry::fullscreen(1000.0, 500.0);
        assert!(!surface.is_offscreen(0.0, 0.0));
        assert!(!surface.is_offscreen(1000.0, 500.0));
        assert!(!surface.is_offscreen(-100.0, 550.0));
        assert!(surface.is_offscreen(-100.5, 250.0));
        assert!(surface.is_offscreen(500.0, 551.0));
        assert!(surface.is_offscreen(1101.0, 250.0));
    }

    #[test]
    fn test_uncalibrated_fallback() {
        let store = Arc::new(MemoryStore::new());
        let mut surface = SurfaceGeometry::fullscreen(1920.0, 1080.0);
        surface.surface_x = 100.0;
        surface.surface_width = 1720.0;
        let engine = CalibrationEngine::new(store, surface);
        let id = DeviceId::from("unknown");

        let aim = engine.transform(&id, 0, 0);
        assert_eq!((aim.x, aim.y), (-100.0, 0.0));
        let aim = engine.transform(&id, u16::MAX, u16::MAX);
        assert!((aim.x - 1820.0).abs() < EPS);
        assert!((aim.y - 1080.0).abs() < EPS);
    }

    #[test]
    fn test_profiles_persist() {
        let store: SharedStore = Arc::new(MemoryStore::new());
        let id = DeviceId::from("0483:5750:A");
        {
            let mut engine = CalibrationEngine::new(store.clone(), SurfaceGeometry::default());
            engine.set_profile(id.clone(), worked_example());
        }
        let raw = store.get(KEY_GUN_CALIBRATION).unwrap().unwrap();
        assert!(raw["0483:5750:A"]["scaleX"].is_number());
        assert_eq!(raw["0483:5750:A"]["axisSwapped"], true);

        let mut engine = CalibrationEngine::new(store.clone(), SurfaceGeometry::default());
        assert_eq!(engine.profile(&id), Some(&worked_example()));
        assert!(engine.clear_profile(&id));
        assert!(!engine.clear_profile(&id));
        let engine = CalibrationEngine::new(store, SurfaceGeometry::default());
        assert!(engine.profiles().is_empty());
    }
}
