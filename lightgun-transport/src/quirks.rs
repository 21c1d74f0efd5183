//! Per-family firmware quirks
//!
//! None of these are backed by a device descriptor. They were observed on real
//! hardware and are kept as data so a new firmware revision can be handled by
//! editing a table entry.

use crate::types::DeviceFamily;

/// Quirk flags applied while decoding reports of one family
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FirmwareQuirks {
    pub family: DeviceFamily,
    /// Table revision, bumped whenever an entry changes meaning
    pub revision: u16,
    /// Some firmwares leave byte 0 of the joystick report at zero and put
    /// the button mask in byte 1 instead. See [`ButtonByteLatch`].
    pub button_byte_fallback: bool,
    /// Raw axis 1 drives X and raw axis 2 drives Y
    pub axis_swapped: bool,
}

const QUIRKS: &[FirmwareQuirks] = &[
    FirmwareQuirks {
        family: DeviceFamily::RetroShooter,
        revision: 2,
        button_byte_fallback: true,
        axis_swapped: true,
    },
    FirmwareQuirks {
        family: DeviceFamily::Gun4Ir,
        revision: 1,
        button_byte_fallback: true,
        axis_swapped: true,
    },
    FirmwareQuirks {
        family: DeviceFamily::Sinden,
        revision: 1,
        button_byte_fallback: false,
        axis_swapped: true,
    },
];

/// Quirks for a family; every known family has an entry
pub fn for_family(family: DeviceFamily) -> FirmwareQuirks {
    QUIRKS
        .iter()
        .copied()
        .find(|q| q.family == family)
        .unwrap_or(FirmwareQuirks {
            family,
            revision: 0,
            button_byte_fallback: false,
            axis_swapped: true,
        })
}

/// Which byte of the joystick report carries the button mask
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ButtonByte {
    #[default]
    Byte0,
    Byte1,
}

/// Per-device state for the `button_byte_fallback` quirk
///
/// While byte 0 has never been non-zero and byte 1 is, buttons come from
/// byte 1. The first non-zero byte 0 latches the device to byte 0 for the
/// rest of the session.
#[derive(Debug, Clone, Copy, Default)]
pub struct ButtonByteLatch {
    byte0_seen: bool,
}

impl ButtonByteLatch {
    /// Pick the button byte for this report and update the latch
    pub fn select(&mut self, quirks: &FirmwareQuirks, byte0: u8, byte1: u8) -> ButtonByte {
        if byte0 != 0 {
            self.byte0_seen = true;
        }
        if quirks.button_byte_fallback && !self.byte0_seen && byte1 != 0 {
            ButtonByte::Byte1
        } else {
            ButtonByte::Byte0
        }
    }
}
