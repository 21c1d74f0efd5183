//! Common types for the transport layer

use std::fmt;

use serde::{Deserialize, Serialize};

/// Hardware family a known vendor/product pair belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeviceFamily {
    /// RetroShooter RS3 "Reaper" style guns (STM32 firmware)
    RetroShooter,
    /// GUN4IR guns (Arduino Leonardo / Pro Micro based)
    Gun4Ir,
    /// Sinden lightguns (camera based, HID reports only)
    Sinden,
}

impl DeviceFamily {
    /// Short tag used for `deviceType` in persisted gun profiles
    pub fn tag(&self) -> &'static str {
        match self {
            DeviceFamily::RetroShooter => "retroshooter",
            DeviceFamily::Gun4Ir => "gun4ir",
            DeviceFamily::Sinden => "sinden",
        }
    }
}

impl fmt::Display for DeviceFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Identity of a tracked physical device
///
/// Either `vvvv:pppp:serial` (stable across sessions) or `vvvv:pppp:N`
/// (synthesized, session scoped) when the device reports no serial.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    /// Stable identity from vendor, product and serial number
    pub fn from_serial(vid: u16, pid: u16, serial: &str) -> Self {
        Self(format!("{vid:04x}:{pid:04x}:{serial}"))
    }

    /// Session scoped identity for a device without a serial
    pub fn synthesized(vid: u16, pid: u16, n: u32) -> Self {
        Self(format!("{vid:04x}:{pid:04x}:{n}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for DeviceId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for DeviceId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Device identification information as reported by the platform
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    /// USB Vendor ID
    pub vid: u16,
    /// USB Product ID
    pub pid: u16,
    /// Serial number if available (empty strings are treated as absent)
    pub serial: Option<String>,
    /// Platform device path, the identity of the underlying device reference
    pub path: String,
    /// Product name if available
    pub product_name: Option<String>,
    /// Family from the known device table
    pub family: DeviceFamily,
}

impl DeviceInfo {
    /// Serial number, ignoring empty strings some firmwares report
    pub fn usable_serial(&self) -> Option<&str> {
        self.serial
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Human readable name for logs and persisted profiles
    pub fn display_name(&self) -> String {
        match &self.product_name {
            Some(name) if !name.is_empty() => name.clone(),
            _ => format!("{} {:04x}:{:04x}", self.family, self.vid, self.pid),
        }
    }
}

/// Position carried by an input frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Position {
    /// Raw sensor coordinates from the joystick layout
    Absolute { axis1: u16, axis2: u16 },
    /// Mouse style motion deltas
    Relative { dx: i8, dy: i8 },
}

impl Position {
    pub fn is_absolute(&self) -> bool {
        matches!(self, Position::Absolute { .. })
    }

    /// Neutral position used for malformed reports
    pub const NEUTRAL: Position = Position::Relative { dx: 0, dy: 0 };
}

/// Button snapshot with edges relative to the previous report of the same device
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ButtonState {
    /// Raw bitmask, bit N = button N held
    pub mask: u8,
    /// Bits that went 0 -> 1 on this report
    pub pressed: u8,
    /// Bits that went 1 -> 0 on this report
    pub released: u8,
}

impl ButtonState {
    /// Compute the state for `current` given the previous snapshot
    pub fn from_transition(previous: u8, current: u8) -> Self {
        Self {
            mask: current,
            pressed: current & !previous,
            released: previous & !current,
        }
    }

    #[inline]
    pub fn is_down(&self, bit: u8) -> bool {
        bit < 8 && self.mask & (1 << bit) != 0
    }

    #[inline]
    pub fn was_pressed(&self, bit: u8) -> bool {
        bit < 8 && self.pressed & (1 << bit) != 0
    }

    #[inline]
    pub fn was_released(&self, bit: u8) -> bool {
        bit < 8 && self.released & (1 << bit) != 0
    }

    /// Lowest bit index with a press edge, if any
    pub fn first_pressed(&self) -> Option<u8> {
        (self.pressed != 0).then(|| self.pressed.trailing_zeros() as u8)
    }
}

/// Normalized input frame produced once per decoded report
#[derive(Debug, Clone, PartialEq)]
pub struct InputFrame {
    pub device_id: DeviceId,
    /// Seconds since the registry was created
    pub timestamp: f64,
    pub buttons: ButtonState,
    pub position: Position,
}

/// Raw bytes read from a device, before decoding
#[derive(Debug, Clone)]
pub struct RawReport {
    pub device_id: DeviceId,
    /// Seconds since the reader's epoch, captured right after the read
    pub timestamp: f64,
    pub data: Vec<u8>,
}

/// Notifications fanned out by the device registry
#[derive(Debug, Clone)]
pub enum DeviceEvent {
    /// A device was opened and is now tracked
    Connected { id: DeviceId, info: DeviceInfo },
    /// A tracked device went away; fired once per disconnect
    Disconnected { id: DeviceId },
    /// A decoded report
    Input(InputFrame),
}
