//! Device layer for optical lightguns
//!
//! This crate finds supported guns, gives each one an identity that is stable
//! where the hardware allows it, and turns their raw HID reports into
//! normalized [`InputFrame`]s with press/release edges.
//!
//! - `known_devices`: compiled-in VID/PID filter
//! - `quirks`: per-family firmware quirk table
//! - `report`: length-tagged report decoding and the blocking reader loop
//! - `registry`: [`DeviceRegistry`], identity, edge tracking and fan-out
//! - `discovery`: the `hidapi` backend

pub mod error;
pub mod known_devices;
pub mod quirks;
pub mod registry;
pub mod report;
pub mod types;

mod discovery;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use discovery::HidDiscovery;
pub use error::TransportError;
pub use registry::DeviceRegistry;
pub use report::{decode_report, DecodedReport, ReaderConfig, ReportSink};
pub use types::{
    ButtonState, DeviceEvent, DeviceFamily, DeviceId, DeviceInfo, InputFrame, Position, RawReport,
};

use std::sync::Arc;

use async_trait::async_trait;

/// The capability-gated device access API
///
/// Mirrors what the platform offers: enumeration of already authorized
/// devices, a user-facing picker, and opening a device for input reports.
/// The registry never talks to `hidapi` directly, so tests can swap in
/// [`mock::MockBackend`].
#[async_trait]
pub trait DeviceBackend: Send + Sync {
    /// List currently present, authorized devices matching the known table
    async fn enumerate(&self) -> Result<Vec<DeviceInfo>, TransportError>;

    /// Ask the user to pick devices, constrained to `filters` (VID, PID)
    ///
    /// An empty result means the user cancelled; that is not an error.
    async fn request_selection(
        &self,
        filters: &[(u16, u16)],
    ) -> Result<Vec<DeviceInfo>, TransportError>;

    /// Open a device and start forwarding its input reports to `sink`
    async fn open(
        &self,
        info: &DeviceInfo,
        id: &DeviceId,
        sink: ReportSink,
    ) -> Result<Box<dyn DeviceHandle>, TransportError>;
}

/// An open device; dropping or closing it stops report forwarding
pub trait DeviceHandle: Send {
    fn close(&mut self);
}

/// Type alias for a shared backend
pub type SharedBackend = Arc<dyn DeviceBackend>;
