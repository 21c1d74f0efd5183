//! Player slot router
//!
//! Binds guns and fallback pointers to the four player slots and turns their
//! input into cursor updates and [`GameEvent`]s. Per frame, in order:
//!
//! 1. an exclusive input tap for the device (calibration) takes the frame
//! 2. a pending button-mapping request for the device takes a press edge
//! 3. detection mode takes press edges and binds unbound sources
//! 4. otherwise the bound slot's aim is updated and button roles fire

use std::collections::HashMap;

use lightgun_transport::{ButtonState, DeviceEvent, DeviceId, DeviceInfo, InputFrame, Position};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, trace, warn};

use crate::calibration::{CalibrationEngine, SurfaceGeometry};
use crate::output::{CursorSink, GameEvent, PointerEvent, PointerKind, UiClickRouter};
use crate::slots::{
    ButtonRole, GunProfile, GunSlot, SlotAssignment, SlotWatch, SLOT_COUNT,
};
use crate::store::{self, SharedStore, KEY_GUN_PROFILES};

/// Device type label for pointer-backed slots
pub const POINTER_DEVICE_TYPE: &str = "pointer";

type AssignedCallback = Box<dyn FnMut(usize) + Send>;
type MappingCallback = Box<dyn FnOnce(u8) + Send>;

enum Detection {
    Off,
    Pointers(AssignedCallback),
    Devices(AssignedCallback),
}

/// At most one button-mapping request in flight
enum PendingMapping {
    None,
    Pending {
        target: DeviceId,
        callback: MappingCallback,
    },
}

/// Routes device and pointer input to player slots
pub struct GunSlotRouter {
    slots: Vec<GunSlot>,
    watchers: Vec<watch::Sender<GunSlot>>,
    calibration: CalibrationEngine,
    detection: Detection,
    mapping: PendingMapping,
    taps: HashMap<DeviceId, mpsc::UnboundedSender<InputFrame>>,
    /// Devices currently connected, for slot labels
    present: HashMap<DeviceId, DeviceInfo>,
    events: mpsc::UnboundedSender<GameEvent>,
    cursor: Box<dyn CursorSink>,
    ui: Box<dyn UiClickRouter>,
    store: SharedStore,
}

impl GunSlotRouter {
    /// Create the slot pool and restore persisted assignments
    pub fn new(
        calibration: CalibrationEngine,
        store: SharedStore,
        cursor: Box<dyn CursorSink>,
        ui: Box<dyn UiClickRouter>,
    ) -> (Self, mpsc::UnboundedReceiver<GameEvent>) {
        let (events, events_rx) = mpsc::unbounded_channel();
        let slots: Vec<GunSlot> = (0..SLOT_COUNT).map(GunSlot::new).collect();
        let watchers = slots
            .iter()
            .map(|slot| watch::channel(slot.clone()).0)
            .collect();

        let mut router = Self {
            slots,
            watchers,
            calibration,
            detection: Detection::Off,
            mapping: PendingMapping::None,
            taps: HashMap::new(),
            present: HashMap::new(),
            events,
            cursor,
            ui,
            store,
        };
        router.restore_profiles();
        (router, events_rx)
    }

    fn restore_profiles(&mut self) {
        let profiles: Vec<GunProfile> =
            store::load_value(self.store.as_ref(), KEY_GUN_PROFILES).unwrap_or_default();

        for (index, profile) in profiles.into_iter().take(SLOT_COUNT).enumerate() {
            let assignment = match (profile.hid_device_id, profile.pointer_id) {
                (Some(id), _) => SlotAssignment::Hid(id),
                (None, Some(pointer)) => SlotAssignment::Pointer(pointer),
                (None, None) => SlotAssignment::Unassigned,
            };
            if assignment.is_assigned() && self.holder_of(&assignment).is_some() {
                warn!("Stored slot {} duplicates another slot, dropping it", index + 1);
                continue;
            }

            let slot = &mut self.slots[index];
            slot.buttons = profile.buttons;
            slot.show_cursor = profile.show_cursor;
            if assignment.is_assigned() {
                slot.connected = matches!(assignment, SlotAssignment::Pointer(_));
                slot.assignment = assignment;
                slot.device_type = profile.device_type;
                slot.device_name = profile.device_name;
            }
            self.notify(index);
        }

        let bound = self.slots.iter().filter(|s| s.assignment.is_assigned()).count();
        debug!("Restored {} bound slots", bound);
    }

    fn persist(&self) {
        let profiles: Vec<GunProfile> = self.slots.iter().map(GunSlot::to_profile).collect();
        store::save_value(self.store.as_ref(), KEY_GUN_PROFILES, &profiles);
    }

    fn notify(&self, index: usize) {
        self.watchers[index].send_replace(self.slots[index].clone());
    }

    fn emit(&self, event: GameEvent) {
        trace!("{:?}", event);
        if self.events.send(event).is_err() {
            trace!("No game listening");
        }
    }

    // ── Slot table ──

    pub fn slots(&self) -> &[GunSlot] {
        &self.slots
    }

    pub fn slot(&self, index: usize) -> Option<&GunSlot> {
        self.slots.get(index)
    }

    pub fn slot_for_device(&self, id: &DeviceId) -> Option<usize> {
        self.slots.iter().position(|s| s.hid_device() == Some(id))
    }

    pub fn slot_for_pointer(&self, pointer_id: u32) -> Option<usize> {
        self.slots.iter().position(|s| s.pointer_id() == Some(pointer_id))
    }

    fn holder_of(&self, assignment: &SlotAssignment) -> Option<usize> {
        self.slots.iter().position(|s| &s.assignment == assignment)
    }

    fn first_free_slot(&self) -> Option<usize> {
        self.slots.iter().position(|s| !s.assignment.is_assigned())
    }

    /// Bind a source to a slot, refusing duplicates
    fn bind(&mut self, index: usize, assignment: SlotAssignment) -> bool {
        if index >= SLOT_COUNT {
            warn!("No slot {}", index);
            return false;
        }
        match self.holder_of(&assignment) {
            Some(holder) if holder == index => return true,
            Some(holder) => {
                warn!("{:?} already bound to slot {}", assignment, holder + 1);
                return false;
            }
            None => {}
        }

        let (device_type, device_name, connected) = match &assignment {
            SlotAssignment::Hid(id) => match self.present.get(id) {
                Some(info) => (
                    Some(info.family.tag().to_string()),
                    Some(info.display_name()),
                    true,
                ),
                None => (None, None, false),
            },
            SlotAssignment::Pointer(_) => (Some(POINTER_DEVICE_TYPE.to_string()), None, true),
            SlotAssignment::Unassigned => (None, None, false),
        };

        let slot = &mut self.slots[index];
        slot.clear_assignment();
        slot.assignment = assignment;
        slot.device_type = device_type;
        slot.device_name = device_name;
        slot.connected = connected;
        info!("Slot {} bound to {:?}", index + 1, slot.assignment);

        self.persist();
        self.notify(index);
        true
    }

    /// Bind a HID gun to a slot; false on a bad index or if another slot has it
    pub fn assign_device(&mut self, index: usize, id: DeviceId) -> bool {
        self.bind(index, SlotAssignment::Hid(id))
    }

    /// Bind a fallback pointer to a slot; false on a bad index or duplicate
    pub fn assign_pointer(&mut self, index: usize, pointer_id: u32) -> bool {
        self.bind(index, SlotAssignment::Pointer(pointer_id))
    }

    pub fn unassign(&mut self, index: usize) -> bool {
        let Some(slot) = self.slots.get_mut(index) else {
            return false;
        };
        slot.clear_assignment();
        self.cursor.update(index, slot.x, slot.y, false);
        self.persist();
        self.notify(index);
        true
    }

    /// Unbind every slot; calibration profiles are untouched
    pub fn reset_assignments(&mut self) {
        for index in 0..SLOT_COUNT {
            self.slots[index].clear_assignment();
            self.cursor.update(index, self.slots[index].x, self.slots[index].y, false);
            self.notify(index);
        }
        info!("All slot assignments cleared");
        self.persist();
    }

    /// Store a learned raw bit for a role
    pub fn set_button(&mut self, index: usize, role: ButtonRole, bit: u8) -> bool {
        if bit >= 8 {
            warn!("Button bit {} out of range for {}", bit, role.name());
            return false;
        }
        let Some(slot) = self.slots.get_mut(index) else {
            error!("set_button: no slot {}", index);
            return false;
        };
        slot.buttons.set(role, bit);
        debug!("Slot {} {} = bit {}", index + 1, role.name(), bit);
        self.persist();
        self.notify(index);
        true
    }

    pub fn set_show_cursor(&mut self, index: usize, show: bool) -> bool {
        let Some(slot) = self.slots.get_mut(index) else {
            error!("set_show_cursor: no slot {}", index);
            return false;
        };
        slot.show_cursor = show;
        self.cursor
            .update(index, slot.x, slot.y, show && slot.connected && !slot.offscreen);
        self.persist();
        self.notify(index);
        true
    }

    /// Per-slot update stream
    pub fn watch_slot(&self, index: usize) -> SlotWatch {
        match self.slots.get(index) {
            None => SlotWatch::inert(index, "no such slot"),
            Some(slot) if !slot.assignment.is_assigned() => {
                SlotWatch::inert(index, "slot is unassigned")
            }
            Some(_) => SlotWatch::live(self.watchers[index].subscribe()),
        }
    }

    // ── Calibration ──

    pub fn calibration(&self) -> &CalibrationEngine {
        &self.calibration
    }

    pub fn calibration_mut(&mut self) -> &mut CalibrationEngine {
        &mut self.calibration
    }

    pub fn set_target_surface(&mut self, surface: SurfaceGeometry) {
        self.calibration.set_target_surface(surface);
    }

    // ── Detection ──

    /// Bind unbound pointers to free slots on their first press
    pub fn start_detection(&mut self, on_assigned: impl FnMut(usize) + Send + 'static) {
        info!("Detecting pointers");
        self.detection = Detection::Pointers(Box::new(on_assigned));
    }

    /// Bind unbound guns to free slots on their first press
    pub fn start_detection_via_devices(&mut self, on_assigned: impl FnMut(usize) + Send + 'static) {
        info!("Detecting guns");
        self.detection = Detection::Devices(Box::new(on_assigned));
    }

    pub fn stop_detection(&mut self) {
        if !matches!(self.detection, Detection::Off) {
            debug!("Detection stopped");
        }
        self.detection = Detection::Off;
    }

    pub fn is_detecting(&self) -> bool {
        !matches!(self.detection, Detection::Off)
    }

    /// Returns true when the press was consumed by detection
    fn detect(&mut self, assignment: SlotAssignment) -> bool {
        let wanted = match (&self.detection, &assignment) {
            (Detection::Pointers(_), SlotAssignment::Pointer(_)) => true,
            (Detection::Devices(_), SlotAssignment::Hid(_)) => true,
            _ => false,
        };
        if !wanted {
            return false;
        }
        if self.holder_of(&assignment).is_some() {
            return true;
        }
        let Some(index) = self.first_free_slot() else {
            debug!("No free slot for {:?}", assignment);
            return true;
        };
        if !self.bind(index, assignment) {
            return true;
        }
        if let Detection::Pointers(cb) | Detection::Devices(cb) = &mut self.detection {
            cb(index);
        }
        self.emit(GameEvent::GunAssigned { slot: index });
        true
    }

    // ── Button mapping ──

    /// Resolve `callback` with the next pressed bit of `target`
    ///
    /// Replaces (drops) any request already pending.
    pub fn map_next_button(&mut self, target: DeviceId, callback: impl FnOnce(u8) + Send + 'static) {
        if let PendingMapping::Pending { target: previous, .. } = &self.mapping {
            debug!("Replacing pending button mapping for {}", previous);
        }
        info!("Waiting for a button on {}", target);
        self.mapping = PendingMapping::Pending {
            target,
            callback: Box::new(callback),
        };
    }

    /// Drop the pending request; returns false if none was pending
    pub fn cancel_button_mapping(&mut self) -> bool {
        let was_pending = self.is_mapping_pending();
        self.mapping = PendingMapping::None;
        was_pending
    }

    pub fn is_mapping_pending(&self) -> bool {
        matches!(self.mapping, PendingMapping::Pending { .. })
    }

    fn resolve_mapping(&mut self, frame: &InputFrame) -> bool {
        let matches_target = matches!(
            &self.mapping,
            PendingMapping::Pending { target, .. } if *target == frame.device_id
        );
        if !matches_target {
            return false;
        }
        let Some(bit) = frame.buttons.first_pressed() else {
            return false;
        };
        if let PendingMapping::Pending { callback, .. } =
            std::mem::replace(&mut self.mapping, PendingMapping::None)
        {
            debug!("{} mapped bit {}", frame.device_id, bit);
            callback(bit);
        }
        true
    }

    // ── Input taps ──

    /// Route all of a device's frames exclusively to the returned receiver
    ///
    /// A second call for the same device closes the first receiver. Dropping
    /// the receiver removes the tap.
    pub fn set_device_input_handler(&mut self, id: DeviceId) -> mpsc::UnboundedReceiver<InputFrame> {
        let (tx, rx) = mpsc::unbounded_channel();
        if self.taps.insert(id.clone(), tx).is_some() {
            debug!("Replaced input tap for {}", id);
        }
        rx
    }

    pub fn remove_device_input_handler(&mut self, id: &DeviceId) -> bool {
        self.taps.remove(id).is_some()
    }

    fn deliver_to_tap(&mut self, frame: &InputFrame) -> bool {
        let Some(tx) = self.taps.get(&frame.device_id) else {
            return false;
        };
        if tx.send(frame.clone()).is_ok() {
            return true;
        }
        debug!("Input tap for {} dropped", frame.device_id);
        self.taps.remove(&frame.device_id);
        false
    }

    // ── Input ──

    /// Feed a registry notification
    pub fn handle_device_event(&mut self, event: &DeviceEvent) {
        match event {
            DeviceEvent::Connected { id, info } => {
                self.present.insert(id.clone(), info.clone());
                if let Some(index) = self.slot_for_device(id) {
                    let slot = &mut self.slots[index];
                    slot.connected = true;
                    slot.device_type = Some(info.family.tag().to_string());
                    slot.device_name = Some(info.display_name());
                    info!("Player {} gun reconnected", index + 1);
                    self.notify(index);
                }
            }
            DeviceEvent::Disconnected { id } => {
                self.present.remove(id);
                self.taps.remove(id);
                if matches!(&self.mapping, PendingMapping::Pending { target, .. } if target == id) {
                    debug!("Button mapping target {} went away", id);
                    self.mapping = PendingMapping::None;
                }
                if let Some(index) = self.slot_for_device(id) {
                    let slot = &mut self.slots[index];
                    slot.connected = false;
                    self.cursor.update(index, slot.x, slot.y, false);
                    info!("Player {} gun disconnected", index + 1);
                    self.notify(index);
                }
            }
            DeviceEvent::Input(frame) => self.handle_frame(frame),
        }
    }

    /// Route one decoded frame
    pub fn handle_frame(&mut self, frame: &InputFrame) {
        if self.deliver_to_tap(frame) || self.resolve_mapping(frame) {
            return;
        }
        if frame.buttons.pressed != 0 && self.detect(SlotAssignment::Hid(frame.device_id.clone())) {
            return;
        }
        let Some(index) = self.slot_for_device(&frame.device_id) else {
            trace!("Frame from unbound {}", frame.device_id);
            return;
        };

        match frame.position {
            Position::Absolute { axis1, axis2 } => {
                let aim = self.calibration.transform(&frame.device_id, axis1, axis2);
                self.move_aim(index, aim.x, aim.y, aim.offscreen);
            }
            Position::Relative { dx: 0, dy: 0 } => {}
            Position::Relative { dx, dy } => {
                let surface = *self.calibration.surface();
                let slot = &self.slots[index];
                let base = if slot.offscreen {
                    surface.center()
                } else {
                    surface.clamp(slot.x, slot.y)
                };
                let next = surface.clamp(base.x + f64::from(dx), base.y + f64::from(dy));
                self.move_aim(index, next.x, next.y, false);
            }
        }
        self.fire_buttons(index, &frame.buttons);
        self.notify(index);
    }

    /// Feed a fallback pointer event (surface-relative coordinates)
    pub fn handle_pointer(&mut self, event: PointerEvent) {
        if let PointerKind::Down(_) = event.kind {
            if self.detect(SlotAssignment::Pointer(event.pointer_id)) {
                return;
            }
        }
        let Some(index) = self.slot_for_pointer(event.pointer_id) else {
            return;
        };

        let offscreen = self.calibration.surface().is_offscreen(event.x, event.y);
        self.move_aim(index, event.x, event.y, offscreen);
        if let PointerKind::Down(button) = event.kind {
            if button < 8 {
                self.fire_buttons(index, &ButtonState::from_transition(0, 1 << button));
            }
        }
        self.notify(index);
    }

    fn move_aim(&mut self, index: usize, x: f64, y: f64, offscreen: bool) {
        let slot = &mut self.slots[index];
        slot.x = x;
        slot.y = y;
        slot.offscreen = offscreen;
        let visible = slot.show_cursor && !offscreen;
        self.cursor.update(index, x, y, visible);
    }

    fn fire_buttons(&mut self, index: usize, buttons: &ButtonState) {
        if buttons.pressed == 0 {
            return;
        }
        let slot = &self.slots[index];
        let mapping = slot.buttons;
        let (x, y) = (slot.x, slot.y);

        if buttons.was_pressed(mapping.trigger) {
            let consumed = self.ui.click(index, x, y);
            if consumed {
                debug!("Player {} click consumed by UI", index + 1);
            } else {
                self.emit(GameEvent::Shoot { slot: index, x, y });
            }
        }
        if buttons.was_pressed(mapping.reload) {
            self.emit(GameEvent::Reload { slot: index });
        }
        if buttons.was_pressed(mapping.start) {
            self.emit(GameEvent::StartButton { slot: index });
        }
    }
}
