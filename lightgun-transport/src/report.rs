//! Lightgun input report decoding and the blocking reader loop
//!
//! The guns do not ship usable report descriptors, so reports are decoded by
//! length rather than by parsing a descriptor:
//!
//! - 8 bytes or more: joystick layout
//!   `[buttons, (buttons), _, _, axis1_lo, axis1_hi, axis2_lo, axis2_hi, ...]`
//! - 3 to 7 bytes: mouse layout `[buttons, dx, dy, ...]` with signed deltas
//! - anything shorter: neutral frame
//!
//! Decoding never fails. A report that matches no layout becomes a neutral
//! zero-motion, zero-button frame.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use hidapi::HidDevice;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::quirks::{ButtonByte, ButtonByteLatch, FirmwareQuirks};
use crate::types::{DeviceId, Position, RawReport};

/// Sending half handed to backends when a device is opened
///
/// Clones share the registry's epoch so timestamps from different devices
/// are comparable.
#[derive(Clone, Debug)]
pub struct ReportSink {
    tx: mpsc::UnboundedSender<RawReport>,
    epoch: Instant,
}

impl ReportSink {
    pub fn new(tx: mpsc::UnboundedSender<RawReport>, epoch: Instant) -> Self {
        Self { tx, epoch }
    }

    /// Forward one report; returns false once the registry side is gone
    pub fn send(&self, device_id: &DeviceId, data: &[u8]) -> bool {
        let report = RawReport {
            device_id: device_id.clone(),
            timestamp: self.epoch.elapsed().as_secs_f64(),
            data: data.to_vec(),
        };
        self.tx.send(report).is_ok()
    }

    /// True once the registry has dropped its receiver
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Joystick report layout offsets
pub mod joystick {
    pub const MIN_LEN: usize = 8;
    pub const BUTTONS: usize = 0;
    pub const BUTTONS_ALT: usize = 1;
    pub const AXIS1: usize = 4;
    pub const AXIS2: usize = 6;
}

/// Relative (mouse) report layout offsets
pub mod relative {
    pub const MIN_LEN: usize = 3;
    pub const BUTTONS: usize = 0;
    pub const DX: usize = 1;
    pub const DY: usize = 2;
}

/// Result of decoding one report, before edge detection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedReport {
    pub buttons: u8,
    pub position: Position,
    /// True when the report matched no layout and was coerced
    pub neutral: bool,
}

impl DecodedReport {
    pub const NEUTRAL: DecodedReport = DecodedReport {
        buttons: 0,
        position: Position::NEUTRAL,
        neutral: true,
    };
}

/// Decode a raw input report
///
/// `latch` is the per-device state of the button byte quirk and is updated
/// for joystick reports.
pub fn decode_report(
    data: &[u8],
    quirks: &FirmwareQuirks,
    latch: &mut ButtonByteLatch,
) -> DecodedReport {
    if data.len() >= joystick::MIN_LEN {
        let byte0 = data[joystick::BUTTONS];
        let byte1 = data[joystick::BUTTONS_ALT];
        let buttons = match latch.select(quirks, byte0, byte1) {
            ButtonByte::Byte0 => byte0,
            ButtonByte::Byte1 => byte1,
        };
        let axis1 = u16::from_le_bytes([data[joystick::AXIS1], data[joystick::AXIS1 + 1]]);
        let axis2 = u16::from_le_bytes([data[joystick::AXIS2], data[joystick::AXIS2 + 1]]);
        return DecodedReport {
            buttons,
            position: Position::Absolute { axis1, axis2 },
            neutral: false,
        };
    }

    if data.len() >= relative::MIN_LEN {
        return DecodedReport {
            buttons: data[relative::BUTTONS],
            position: Position::Relative {
                dx: data[relative::DX] as i8,
                dy: data[relative::DY] as i8,
            },
            neutral: false,
        };
    }

    debug!("Coercing {}-byte report to neutral frame", data.len());
    DecodedReport::NEUTRAL
}

/// Configuration for the reader loop
#[derive(Clone, Debug)]
pub struct ReaderConfig {
    /// Read timeout in milliseconds (for checking shutdown flag when idle)
    pub read_timeout_ms: i32,
    /// Sleep duration on error before retrying
    pub error_sleep_ms: u64,
    /// Consecutive read errors after which the device is considered gone
    pub max_consecutive_errors: u32,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            read_timeout_ms: 5,
            error_sleep_ms: 100,
            max_consecutive_errors: 10,
        }
    }
}

/// Blocking reader loop for one opened gun
///
/// Only forwards bytes. Decoding and edge tracking happen on the event loop
/// so the per-device state has a single writer. The loop exits when the
/// shutdown flag is set, the receiving side is gone, or the device keeps
/// failing (unplugged); the registry notices the disconnect on its next
/// presence sync.
pub fn run_reader_loop(
    input_device: HidDevice,
    device_id: DeviceId,
    sink: ReportSink,
    shutdown: Arc<AtomicBool>,
    config: ReaderConfig,
) {
    debug!("{} reader thread started", device_id);
    let mut buf = [0u8; 64];
    let mut consecutive_errors = 0u32;

    while !shutdown.load(Ordering::Relaxed) {
        match input_device.read_timeout(&mut buf, config.read_timeout_ms) {
            Ok(len) if len > 0 => {
                consecutive_errors = 0;
                if !sink.send(&device_id, &buf[..len]) {
                    break;
                }
            }
            Ok(_) if sink.is_closed() => break,
            Ok(_) => {
                // Timeout, no data - loop continues to check shutdown
            }
            Err(e) => {
                consecutive_errors += 1;
                if consecutive_errors >= config.max_consecutive_errors {
                    warn!("{} reader giving up after {} errors: {}", device_id, consecutive_errors, e);
                    break;
                }
                debug!("{} read error: {}", device_id, e);
                std::thread::sleep(Duration::from_millis(config.error_sleep_ms));
            }
        }
    }

    debug!("{} reader thread exiting", device_id);
}
