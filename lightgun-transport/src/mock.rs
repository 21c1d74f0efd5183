//! In-memory backend for tests without hardware
//!
//! Devices are "plugged" by adding them to the present list; reports are
//! injected through the sink the registry handed over on open.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::TransportError;
use crate::known_devices;
use crate::report::ReportSink;
use crate::types::{DeviceFamily, DeviceId, DeviceInfo};
use crate::{DeviceBackend, DeviceHandle};

#[derive(Default)]
struct MockState {
    present: Vec<DeviceInfo>,
    selection: Vec<DeviceInfo>,
    failing_paths: HashSet<String>,
    sinks: HashMap<DeviceId, ReportSink>,
    open_calls: usize,
}

/// Scriptable stand-in for the HID backend
#[derive(Default, Clone)]
pub struct MockBackend {
    state: Arc<Mutex<MockState>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make a device present for enumeration
    pub fn plug(&self, info: DeviceInfo) {
        let mut state = self.state.lock();
        state.present.retain(|d| d.path != info.path);
        state.present.push(info);
    }

    /// Remove a device from enumeration
    pub fn unplug(&self, path: &str) {
        self.state.lock().present.retain(|d| d.path != path);
    }

    /// Devices the "picker" returns; empty simulates a cancelled picker
    pub fn set_selection(&self, devices: Vec<DeviceInfo>) {
        self.state.lock().selection = devices;
    }

    /// Make `open` fail for a path
    pub fn fail_open(&self, path: &str) {
        self.state.lock().failing_paths.insert(path.to_string());
    }

    /// Push a raw report as if the device's reader thread had read it
    pub fn inject(&self, id: &DeviceId, data: &[u8]) -> bool {
        let sink = self.state.lock().sinks.get(id).cloned();
        match sink {
            Some(sink) => sink.send(id, data),
            None => false,
        }
    }

    /// Whether the registry currently holds an open handle for `id`
    pub fn is_open(&self, id: &DeviceId) -> bool {
        self.state.lock().sinks.contains_key(id)
    }

    /// Number of successful and failed `open` calls
    pub fn open_calls(&self) -> usize {
        self.state.lock().open_calls
    }
}

#[async_trait]
impl DeviceBackend for MockBackend {
    async fn enumerate(&self) -> Result<Vec<DeviceInfo>, TransportError> {
        Ok(self.state.lock().present.clone())
    }

    async fn request_selection(
        &self,
        filters: &[(u16, u16)],
    ) -> Result<Vec<DeviceInfo>, TransportError> {
        Ok(self
            .state
            .lock()
            .selection
            .iter()
            .filter(|d| filters.contains(&(d.vid, d.pid)))
            .cloned()
            .collect())
    }

    async fn open(
        &self,
        info: &DeviceInfo,
        id: &DeviceId,
        sink: ReportSink,
    ) -> Result<Box<dyn DeviceHandle>, TransportError> {
        let mut state = self.state.lock();
        state.open_calls += 1;
        if state.failing_paths.contains(&info.path) {
            return Err(TransportError::DeviceOpenFailure {
                path: info.path.clone(),
                reason: "mock failure".into(),
            });
        }
        state.sinks.insert(id.clone(), sink);
        Ok(Box::new(MockHandle {
            id: id.clone(),
            state: self.state.clone(),
        }))
    }
}

struct MockHandle {
    id: DeviceId,
    state: Arc<Mutex<MockState>>,
}

impl DeviceHandle for MockHandle {
    fn close(&mut self) {
        self.state.lock().sinks.remove(&self.id);
    }
}

impl Drop for MockHandle {
    fn drop(&mut self) {
        self.close();
    }
}

/// A RetroShooter P1 gun description for tests
pub fn gun_info(path: &str, serial: Option<&str>) -> DeviceInfo {
    DeviceInfo {
        vid: known_devices::VID_STM,
        pid: 0x5750,
        serial: serial.map(str::to_string),
        path: path.to_string(),
        product_name: Some("RS3 Reaper".to_string()),
        family: DeviceFamily::RetroShooter,
    }
}

/// Build an 8-byte joystick report
pub fn joystick_report(buttons: u8, axis1: u16, axis2: u16) -> Vec<u8> {
    let a1 = axis1.to_le_bytes();
    let a2 = axis2.to_le_bytes();
    vec![buttons, 0, 0, 0, a1[0], a1[1], a2[0], a2[1]]
}
