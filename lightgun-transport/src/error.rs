//! Transport error types

use thiserror::Error;

/// Errors that can occur during transport operations
///
/// None of these are fatal to the host: callers degrade to fewer guns or to
/// pointer-only control.
#[derive(Error, Debug)]
pub enum TransportError {
    /// The platform offers no HID access at all (fallback mode)
    #[error("HID capability unavailable: {0}")]
    CapabilityUnavailable(String),

    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    /// Opening one device failed; other devices are unaffected
    #[error("Failed to open {path}: {reason}")]
    DeviceOpenFailure { path: String, reason: String },

    // HID-specific errors
    #[error("HID error: {0}")]
    HidError(String),

    #[error("HID permission denied: {0}")]
    HidPermissionDenied(String),

    // Generic
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<hidapi::HidError> for TransportError {
    fn from(e: hidapi::HidError) -> Self {
        let msg = e.to_string();
        if msg.contains("Permission denied") || msg.contains("EPERM") {
            TransportError::HidPermissionDenied(msg)
        } else {
            TransportError::HidError(msg)
        }
    }
}
