//! Device registry - identity, open handles and edge tracking
//!
//! The registry is the only owner of per-device state (open handle, quirk
//! latch, previous button snapshot). It lives on the host's event loop:
//! reader threads only forward raw bytes, and every decode happens in
//! [`DeviceRegistry::process_report`].
//!
//! Identity rules:
//! - a device with a serial number is `vvvv:pppp:serial`, stable across
//!   sessions and reconnects
//! - a serial-less device that is already tracked under the same path keeps
//!   its identity
//! - otherwise a session-scoped `vvvv:pppp:N` is synthesized. A serial-less
//!   gun that is unplugged and plugged back in gets a new N; there is nothing
//!   on the device to recognise it by.

use std::collections::{HashMap, HashSet};
use std::time::Instant;

use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, trace, warn};

use crate::error::TransportError;
use crate::known_devices;
use crate::quirks::{self, ButtonByteLatch, FirmwareQuirks};
use crate::report::{decode_report, ReportSink};
use crate::types::{ButtonState, DeviceEvent, DeviceId, DeviceInfo, InputFrame, RawReport};
use crate::SharedBackend;

/// Broadcast channel capacity for device events
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Per-device state owned by the registry
struct TrackedDevice {
    info: DeviceInfo,
    handle: Box<dyn crate::DeviceHandle>,
    quirks: FirmwareQuirks,
    latch: ButtonByteLatch,
    previous_buttons: u8,
}

/// Tracks opened guns and turns their reports into [`InputFrame`]s
pub struct DeviceRegistry {
    /// `None` when the platform has no HID capability
    backend: Option<SharedBackend>,
    devices: HashMap<DeviceId, TrackedDevice>,
    /// Next synthesized N per (VID, PID), for serial-less devices
    session_counters: HashMap<(u16, u16), u32>,
    events: broadcast::Sender<DeviceEvent>,
    sink: ReportSink,
}

impl DeviceRegistry {
    /// Create a registry over a backend
    ///
    /// Returns the receiving end of the raw report channel; the event loop
    /// feeds what it receives back into [`process_report`](Self::process_report).
    pub fn new(backend: SharedBackend) -> (Self, mpsc::UnboundedReceiver<RawReport>) {
        Self::build(Some(backend))
    }

    /// Create an inert registry for hosts without HID access
    ///
    /// Every method is a no-op returning empty results.
    pub fn unavailable(reason: &str) -> (Self, mpsc::UnboundedReceiver<RawReport>) {
        warn!("HID capability unavailable ({reason}); guns disabled, pointer fallback only");
        Self::build(None)
    }

    fn build(backend: Option<SharedBackend>) -> (Self, mpsc::UnboundedReceiver<RawReport>) {
        let (report_tx, report_rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let registry = Self {
            backend,
            devices: HashMap::new(),
            session_counters: HashMap::new(),
            events,
            sink: ReportSink::new(report_tx, Instant::now()),
        };
        (registry, report_rx)
    }

    /// Whether HID access exists at all
    pub fn is_available(&self) -> bool {
        self.backend.is_some()
    }

    /// Subscribe to connect/disconnect/input notifications
    ///
    /// Dropping the receiver ends the subscription.
    pub fn subscribe(&self) -> broadcast::Receiver<DeviceEvent> {
        self.events.subscribe()
    }

    /// Enumerate previously authorized devices and open them
    ///
    /// Devices that fail to open are logged and omitted.
    pub async fn discover(&mut self) -> Vec<DeviceId> {
        let Some(backend) = self.backend.clone() else {
            return Vec::new();
        };
        let devices = match backend.enumerate().await {
            Ok(devices) => devices,
            Err(e) => {
                warn!("Device enumeration failed: {}", e);
                return Vec::new();
            }
        };
        self.open_all(devices).await
    }

    /// Ask the user to pick guns from the known device table
    ///
    /// Must be driven by a user action. An empty result means the user
    /// cancelled the picker.
    pub async fn request_selection(&mut self) -> Vec<DeviceId> {
        let Some(backend) = self.backend.clone() else {
            return Vec::new();
        };
        let selected = match backend
            .request_selection(&known_devices::selection_filters())
            .await
        {
            Ok(selected) => selected,
            Err(e) => {
                warn!("Device selection failed: {}", e);
                return Vec::new();
            }
        };
        if selected.is_empty() {
            info!("Device selection cancelled");
            return Vec::new();
        }
        self.open_all(selected).await
    }

    async fn open_all(&mut self, devices: Vec<DeviceInfo>) -> Vec<DeviceId> {
        let mut ids = Vec::with_capacity(devices.len());
        for info in devices {
            match self.open(info).await {
                Ok(id) => {
                    if !ids.contains(&id) {
                        ids.push(id);
                    }
                }
                Err(e) => warn!("Skipping device: {}", e),
            }
        }
        ids
    }

    /// Open a device and start tracking it
    ///
    /// Idempotent: opening a device that is already tracked returns its
    /// existing identity without opening a second handle.
    pub async fn open(&mut self, info: DeviceInfo) -> Result<DeviceId, TransportError> {
        let Some(backend) = self.backend.clone() else {
            return Err(TransportError::CapabilityUnavailable(
                "no HID backend".into(),
            ));
        };
        if !known_devices::is_known(info.vid, info.pid) {
            return Err(TransportError::DeviceNotFound(format!(
                "{:04x}:{:04x} is not a known lightgun",
                info.vid, info.pid
            )));
        }

        let id = self.assign_identity(&info);
        if self.devices.contains_key(&id) {
            debug!("{} already open", id);
            return Ok(id);
        }

        let handle = backend.open(&info, &id, self.sink.clone()).await?;
        let quirks = quirks::for_family(info.family);
        self.devices.insert(
            id.clone(),
            TrackedDevice {
                info: info.clone(),
                handle,
                quirks,
                latch: ButtonByteLatch::default(),
                previous_buttons: 0,
            },
        );

        info!("Tracking {} ({})", id, info.display_name());
        let _ = self.events.send(DeviceEvent::Connected {
            id: id.clone(),
            info,
        });
        Ok(id)
    }

    /// Derive the identity for a device description
    fn assign_identity(&mut self, info: &DeviceInfo) -> DeviceId {
        if let Some(serial) = info.usable_serial() {
            return DeviceId::from_serial(info.vid, info.pid, serial);
        }

        if let Some((id, _)) = self.devices.iter().find(|(_, d)| d.info.path == info.path) {
            return id.clone();
        }

        let counter = self
            .session_counters
            .entry((info.vid, info.pid))
            .or_insert(0);
        loop {
            *counter += 1;
            let id = DeviceId::synthesized(info.vid, info.pid, *counter);
            if !self.devices.contains_key(&id) {
                return id;
            }
        }
    }

    /// Reconcile tracked devices with what is present right now
    ///
    /// Newly present known devices are opened (connect); tracked devices that
    /// disappeared are closed (disconnect). Call periodically for hot-plug.
    pub async fn sync_present(&mut self) {
        let Some(backend) = self.backend.clone() else {
            return;
        };
        let present = match backend.enumerate().await {
            Ok(present) => present,
            Err(e) => {
                debug!("Presence sync skipped: {}", e);
                return;
            }
        };

        let present_paths: HashSet<&str> = present.iter().map(|d| d.path.as_str()).collect();
        let gone: Vec<DeviceId> = self
            .devices
            .iter()
            .filter(|(_, d)| !present_paths.contains(d.info.path.as_str()))
            .map(|(id, _)| id.clone())
            .collect();
        for id in gone {
            self.handle_disconnect(&id);
        }

        let tracked_paths: HashSet<String> =
            self.devices.values().map(|d| d.info.path.clone()).collect();
        let arrived: Vec<DeviceInfo> = present
            .into_iter()
            .filter(|d| !tracked_paths.contains(&d.path))
            .collect();
        if !arrived.is_empty() {
            self.open_all(arrived).await;
        }
    }

    /// Stop tracking a device and announce the disconnect
    ///
    /// Returns false when the device was not tracked, so a device is only
    /// ever announced once.
    pub fn handle_disconnect(&mut self, id: &DeviceId) -> bool {
        let Some(mut device) = self.devices.remove(id) else {
            return false;
        };
        device.handle.close();
        info!("{} disconnected", id);
        let _ = self.events.send(DeviceEvent::Disconnected { id: id.clone() });
        true
    }

    /// Decode one raw report, update edges and fan the frame out
    ///
    /// Reports from devices that are no longer tracked are dropped.
    pub fn process_report(&mut self, report: RawReport) -> Option<InputFrame> {
        let Some(device) = self.devices.get_mut(&report.device_id) else {
            trace!("Dropping report from untracked {}", report.device_id);
            return None;
        };

        let decoded = decode_report(&report.data, &device.quirks, &mut device.latch);
        let buttons = if decoded.neutral {
            ButtonState::default()
        } else {
            let state = ButtonState::from_transition(device.previous_buttons, decoded.buttons);
            device.previous_buttons = decoded.buttons;
            state
        };

        let frame = InputFrame {
            device_id: report.device_id,
            timestamp: report.timestamp,
            buttons,
            position: decoded.position,
        };
        trace!("{:?}", frame);
        let _ = self.events.send(DeviceEvent::Input(frame.clone()));
        Some(frame)
    }

    /// Info for a tracked device
    pub fn device(&self, id: &DeviceId) -> Option<&DeviceInfo> {
        self.devices.get(id).map(|d| &d.info)
    }

    /// All tracked devices, sorted by id
    pub fn devices(&self) -> Vec<(DeviceId, DeviceInfo)> {
        let mut devices: Vec<_> = self
            .devices
            .iter()
            .map(|(id, d)| (id.clone(), d.info.clone()))
            .collect();
        devices.sort_by(|a, b| a.0.cmp(&b.0));
        devices
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Close every handle without announcing disconnects (shutdown)
    pub fn close_all(&mut self) {
        for (_, mut device) in self.devices.drain() {
            device.handle.close();
        }
    }
}

impl Drop for DeviceRegistry {
    fn drop(&mut self) {
        self.close_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{gun_info, joystick_report, MockBackend};
    use crate::types::Position;
    use std::sync::Arc;

    fn registry() -> (MockBackend, DeviceRegistry, mpsc::UnboundedReceiver<RawReport>) {
        let backend = MockBackend::new();
        let (registry, rx) = DeviceRegistry::new(Arc::new(backend.clone()));
        (backend, registry, rx)
    }

    #[tokio::test]
    async fn test_serial_identity_is_deterministic() {
        let (_backend, mut registry, _rx) = registry();
        let id = registry.open(gun_info("/dev/hidraw3", Some("ABC123"))).await.unwrap();
        assert_eq!(id.as_str(), "0483:5750:ABC123");
    }

    #[tokio::test]
    async fn test_open_is_idempotent() {
        let (backend, mut registry, _rx) = registry();
        let first = registry.open(gun_info("/dev/hidraw3", None)).await.unwrap();
        let second = registry.open(gun_info("/dev/hidraw3", None)).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(registry.len(), 1);
        assert_eq!(backend.open_calls(), 1);
    }

    #[tokio::test]
    async fn test_serial_less_devices_get_distinct_ids() {
        let (_backend, mut registry, _rx) = registry();
        let a = registry.open(gun_info("/dev/hidraw3", None)).await.unwrap();
        let b = registry.open(gun_info("/dev/hidraw4", None)).await.unwrap();
        assert_ne!(a, b);
        assert_eq!(a.as_str(), "0483:5750:1");
        assert_eq!(b.as_str(), "0483:5750:2");
    }

    #[tokio::test]
    async fn test_serial_less_reconnect_gets_new_identity() {
        let (backend, mut registry, _rx) = registry();
        backend.plug(gun_info("/dev/hidraw3", None));
        let first = registry.discover().await;
        backend.unplug("/dev/hidraw3");
        registry.sync_present().await;
        backend.plug(gun_info("/dev/hidraw3", None));
        registry.sync_present().await;
        let ids: Vec<DeviceId> = registry.devices().into_iter().map(|(id, _)| id).collect();
        assert_eq!(ids.len(), 1);
        assert_ne!(ids[0], first[0]);
    }

    #[tokio::test]
    async fn test_open_failure_is_per_device() {
        let (backend, mut registry, _rx) = registry();
        backend.plug(gun_info("/dev/hidraw3", Some("A")));
        backend.plug(gun_info("/dev/hidraw4", Some("B")));
        backend.fail_open("/dev/hidraw3");
        let ids = registry.discover().await;
        assert_eq!(ids, vec![DeviceId::from("0483:5750:B")]);
    }

    #[tokio::test]
    async fn test_cancelled_selection_is_empty() {
        let (_backend, mut registry, _rx) = registry();
        assert!(registry.request_selection().await.is_empty());
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_unavailable_registry_is_inert() {
        let (mut registry, _rx) = DeviceRegistry::unavailable("test");
        assert!(!registry.is_available());
        assert!(registry.discover().await.is_empty());
        assert!(registry.request_selection().await.is_empty());
        assert!(matches!(
            registry.open(gun_info("/dev/hidraw3", None)).await,
            Err(TransportError::CapabilityUnavailable(_))
        ));
        registry.sync_present().await;
    }

    #[tokio::test]
    async fn test_held_button_edges() {
        let (backend, mut registry, mut rx) = registry();
        let id = registry.open(gun_info("/dev/hidraw3", Some("A"))).await.unwrap();

        let n = 4;
        for _ in 0..n {
            assert!(backend.inject(&id, &joystick_report(0x01, 100, 200)));
        }
        assert!(backend.inject(&id, &joystick_report(0x00, 100, 200)));

        let mut presses = Vec::new();
        let mut releases = Vec::new();
        while let Ok(raw) = rx.try_recv() {
            let frame = registry.process_report(raw).unwrap();
            presses.push(frame.buttons.was_pressed(0));
            releases.push(frame.buttons.was_released(0));
        }
        assert_eq!(presses, vec![true, false, false, false, false]);
        assert_eq!(releases, vec![false, false, false, false, true]);
    }

    #[tokio::test]
    async fn test_neutral_report_keeps_snapshot() {
        let (backend, mut registry, mut rx) = registry();
        let id = registry.open(gun_info("/dev/hidraw3", Some("A"))).await.unwrap();
        backend.inject(&id, &joystick_report(0x01, 0, 0));
        backend.inject(&id, &[0xFF]);
        backend.inject(&id, &joystick_report(0x01, 0, 0));

        let frames: Vec<InputFrame> = std::iter::from_fn(|| rx.try_recv().ok())
            .filter_map(|raw| registry.process_report(raw))
            .collect();
        assert_eq!(frames.len(), 3);
        assert!(frames[0].buttons.was_pressed(0));
        assert_eq!(frames[1].buttons, ButtonState::default());
        assert_eq!(frames[1].position, Position::NEUTRAL);
        assert!(!frames[2].buttons.was_pressed(0));
    }

    #[tokio::test]
    async fn test_disconnect_fires_once() {
        let (backend, mut registry, _rx) = registry();
        let mut events = registry.subscribe();
        let id = registry.open(gun_info("/dev/hidraw3", Some("A"))).await.unwrap();
        assert!(registry.handle_disconnect(&id));
        assert!(!registry.handle_disconnect(&id));
        assert!(!backend.is_open(&id));

        assert!(matches!(events.try_recv(), Ok(DeviceEvent::Connected { .. })));
        assert!(matches!(events.try_recv(), Ok(DeviceEvent::Disconnected { .. })));
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_reports_from_closed_device_are_dropped() {
        let (_backend, mut registry, _rx) = registry();
        let report = RawReport {
            device_id: DeviceId::from("0483:5750:gone"),
            timestamp: 0.0,
            data: joystick_report(1, 0, 0),
        };
        assert!(registry.process_report(report).is_none());
    }
}
