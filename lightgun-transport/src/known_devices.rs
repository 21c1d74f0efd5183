//! Known lightgun VID/PID pairs
//!
//! Compiled-in filter for discovery and selection. Not runtime configurable:
//! anything not in this table is never opened.

use crate::types::DeviceFamily;

/// A vendor/product pair we know how to decode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KnownDevice {
    pub vid: u16,
    pub pid: u16,
    pub family: DeviceFamily,
    /// Player number printed on the gun, if the firmware encodes it in the PID
    pub player_hint: Option<u8>,
}

const fn known(vid: u16, pid: u16, family: DeviceFamily, player: u8) -> KnownDevice {
    KnownDevice {
        vid,
        pid,
        family,
        player_hint: Some(player),
    }
}

/// STMicroelectronics VID used by RetroShooter firmware
pub const VID_STM: u16 = 0x0483;
/// Arduino SA VID used by GUN4IR boards
pub const VID_ARDUINO: u16 = 0x2341;
/// Van Ooijen Technische Informatica shared VID used by Sinden
pub const VID_SINDEN: u16 = 0x16C0;

pub const KNOWN_DEVICES: &[KnownDevice] = &[
    // RetroShooter RS3 Reaper, P1-P4
    known(VID_STM, 0x5750, DeviceFamily::RetroShooter, 1),
    known(VID_STM, 0x5751, DeviceFamily::RetroShooter, 2),
    known(VID_STM, 0x5752, DeviceFamily::RetroShooter, 3),
    known(VID_STM, 0x5753, DeviceFamily::RetroShooter, 4),
    // GUN4IR, P1-P4
    known(VID_ARDUINO, 0x8042, DeviceFamily::Gun4Ir, 1),
    known(VID_ARDUINO, 0x8043, DeviceFamily::Gun4Ir, 2),
    known(VID_ARDUINO, 0x8044, DeviceFamily::Gun4Ir, 3),
    known(VID_ARDUINO, 0x8045, DeviceFamily::Gun4Ir, 4),
    // Sinden, P1-P2 (blue/black border firmwares)
    known(VID_SINDEN, 0x0F01, DeviceFamily::Sinden, 1),
    known(VID_SINDEN, 0x0F02, DeviceFamily::Sinden, 2),
    known(VID_SINDEN, 0x0F38, DeviceFamily::Sinden, 1),
    known(VID_SINDEN, 0x0F39, DeviceFamily::Sinden, 2),
];

/// Look up a VID/PID pair in the known device table
pub fn lookup(vid: u16, pid: u16) -> Option<&'static KnownDevice> {
    KNOWN_DEVICES.iter().find(|d| d.vid == vid && d.pid == pid)
}

/// Check if a VID/PID pair is a supported lightgun
#[inline]
pub fn is_known(vid: u16, pid: u16) -> bool {
    lookup(vid, pid).is_some()
}

/// Unique (VID, PID) filters, the shape a device picker expects
pub fn selection_filters() -> Vec<(u16, u16)> {
    let mut pairs: Vec<(u16, u16)> = KNOWN_DEVICES.iter().map(|d| (d.vid, d.pid)).collect();
    pairs.sort();
    pairs.dedup();
    pairs
}
