//! Player gun slots and their persisted form

use lightgun_transport::DeviceId;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::error;

/// Number of player slots
pub const SLOT_COUNT: usize = 4;

/// Cursor colors per slot (P1 red, P2 blue, P3 green, P4 yellow)
pub const SLOT_COLORS: [&str; SLOT_COUNT] = ["#e53935", "#1e88e5", "#43a047", "#fdd835"];

/// What fills a slot
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SlotAssignment {
    #[default]
    Unassigned,
    /// A fallback pointer (mouse/touch) identity
    Pointer(u32),
    /// A HID gun
    Hid(DeviceId),
}

impl SlotAssignment {
    pub fn is_assigned(&self) -> bool {
        !matches!(self, SlotAssignment::Unassigned)
    }
}

/// Logical buttons a gun exposes to games
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ButtonRole {
    Trigger,
    Reload,
    Start,
}

impl ButtonRole {
    pub const ALL: [ButtonRole; 3] = [ButtonRole::Trigger, ButtonRole::Reload, ButtonRole::Start];

    pub fn name(&self) -> &'static str {
        match self {
            ButtonRole::Trigger => "trigger",
            ButtonRole::Reload => "reload",
            ButtonRole::Start => "start",
        }
    }
}

impl std::str::FromStr for ButtonRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "trigger" => Ok(ButtonRole::Trigger),
            "reload" => Ok(ButtonRole::Reload),
            "start" => Ok(ButtonRole::Start),
            _ => Err(format!("unknown button role: {s} (expected trigger, reload or start)")),
        }
    }
}

/// Raw button bit index per role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ButtonMapping {
    #[serde(default = "default_trigger")]
    pub trigger: u8,
    #[serde(default = "default_reload")]
    pub reload: u8,
    #[serde(default = "default_start")]
    pub start: u8,
}

fn default_trigger() -> u8 {
    0
}
fn default_reload() -> u8 {
    1
}
fn default_start() -> u8 {
    2
}

impl Default for ButtonMapping {
    fn default() -> Self {
        Self {
            trigger: default_trigger(),
            reload: default_reload(),
            start: default_start(),
        }
    }
}

impl ButtonMapping {
    pub fn get(&self, role: ButtonRole) -> u8 {
        match role {
            ButtonRole::Trigger => self.trigger,
            ButtonRole::Reload => self.reload,
            ButtonRole::Start => self.start,
        }
    }

    pub fn set(&mut self, role: ButtonRole, bit: u8) {
        match role {
            ButtonRole::Trigger => self.trigger = bit,
            ButtonRole::Reload => self.reload = bit,
            ButtonRole::Start => self.start = bit,
        }
    }
}

/// One logical player gun
#[derive(Debug, Clone, PartialEq)]
pub struct GunSlot {
    pub index: usize,
    pub color: &'static str,
    pub assignment: SlotAssignment,
    /// Family tag of the bound gun, `"pointer"` for the fallback pointer
    pub device_type: Option<String>,
    pub device_name: Option<String>,
    pub connected: bool,
    /// Live surface-relative aim, not persisted
    pub x: f64,
    pub y: f64,
    pub offscreen: bool,
    pub buttons: ButtonMapping,
    pub show_cursor: bool,
}

impl GunSlot {
    pub fn new(index: usize) -> Self {
        Self {
            index,
            color: SLOT_COLORS[index % SLOT_COUNT],
            assignment: SlotAssignment::Unassigned,
            device_type: None,
            device_name: None,
            connected: false,
            x: 0.0,
            y: 0.0,
            offscreen: true,
            buttons: ButtonMapping::default(),
            show_cursor: true,
        }
    }

    /// Player label, 1-based
    pub fn player(&self) -> usize {
        self.index + 1
    }

    pub fn hid_device(&self) -> Option<&DeviceId> {
        match &self.assignment {
            SlotAssignment::Hid(id) => Some(id),
            _ => None,
        }
    }

    pub fn pointer_id(&self) -> Option<u32> {
        match self.assignment {
            SlotAssignment::Pointer(id) => Some(id),
            _ => None,
        }
    }

    /// Drop the binding and its labels, keeping mappings and cursor flag
    pub fn clear_assignment(&mut self) {
        self.assignment = SlotAssignment::Unassigned;
        self.device_type = None;
        self.device_name = None;
        self.connected = false;
        self.offscreen = true;
    }

    pub fn to_profile(&self) -> GunProfile {
        GunProfile {
            pointer_id: self.pointer_id(),
            hid_device_id: self.hid_device().cloned(),
            device_type: self.device_type.clone(),
            device_name: self.device_name.clone(),
            buttons: self.buttons,
            show_cursor: self.show_cursor,
        }
    }
}

/// Persisted slot state, one entry per slot in the `gun-profiles` array
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GunProfile {
    #[serde(default)]
    pub pointer_id: Option<u32>,
    #[serde(default)]
    pub hid_device_id: Option<DeviceId>,
    #[serde(default)]
    pub device_type: Option<String>,
    #[serde(default)]
    pub device_name: Option<String>,
    #[serde(default)]
    pub buttons: ButtonMapping,
    #[serde(default = "default_show_cursor")]
    pub show_cursor: bool,
}

fn default_show_cursor() -> bool {
    true
}

/// Subscription to one slot's updates
///
/// Created by `GunSlotRouter::watch_slot`. An inert watch (bad or unassigned
/// slot) never yields anything and unsubscribing it does nothing.
pub struct SlotWatch {
    rx: Option<watch::Receiver<GunSlot>>,
}

impl SlotWatch {
    pub(crate) fn live(rx: watch::Receiver<GunSlot>) -> Self {
        Self { rx: Some(rx) }
    }

    pub(crate) fn inert(index: usize, reason: &str) -> Self {
        error!("Cannot watch slot {}: {}", index, reason);
        Self { rx: None }
    }

    pub fn is_inert(&self) -> bool {
        self.rx.is_none()
    }

    /// Latest slot state
    pub fn current(&self) -> Option<GunSlot> {
        self.rx.as_ref().map(|rx| rx.borrow().clone())
    }

    /// Wait for the next update; `None` once the router is gone or if inert
    pub async fn changed(&mut self) -> Option<GunSlot> {
        let rx = self.rx.as_mut()?;
        rx.changed().await.ok()?;
        let slot = rx.borrow_and_update().clone();
        Some(slot)
    }

    /// Stop receiving updates
    pub fn unsubscribe(mut self) {
        self.rx = None;
    }
}
