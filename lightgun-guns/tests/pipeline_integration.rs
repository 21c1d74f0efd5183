//! Integration tests for the full gun pipeline.
//!
//! Mock devices feed the registry, the router consumes its frames, and the
//! calibration wizard runs over an exclusive input tap, with profiles and
//! slot assignments persisted to a JSON store on disk.

use std::sync::Arc;

use lightgun_guns::{
    run_wizard, CalibrationEngine, GameEvent, GunSlotRouter, JsonFileStore, NoCursor, NoUi,
    ScreenPoint, SharedStore, SurfaceGeometry, TargetPresenter, WizardOutcome,
};
use lightgun_transport::mock::{gun_info, joystick_report, MockBackend};
use lightgun_transport::{DeviceEvent, DeviceId, DeviceRegistry, RawReport};
use tokio::sync::{broadcast, mpsc};

struct Harness {
    backend: MockBackend,
    registry: DeviceRegistry,
    raw_rx: mpsc::UnboundedReceiver<RawReport>,
    device_events: broadcast::Receiver<DeviceEvent>,
    router: GunSlotRouter,
    game: mpsc::UnboundedReceiver<GameEvent>,
}

impl Harness {
    fn new(store: SharedStore) -> Self {
        let backend = MockBackend::new();
        let (registry, raw_rx) = DeviceRegistry::new(Arc::new(backend.clone()));
        let device_events = registry.subscribe();
        let engine = CalibrationEngine::new(store.clone(), SurfaceGeometry::fullscreen(1920.0, 1280.0));
        let (router, game) = GunSlotRouter::new(engine, store, Box::new(NoCursor), Box::new(NoUi));
        Self {
            backend,
            registry,
            raw_rx,
            device_events,
            router,
            game,
        }
    }

    /// Move everything queued so far through registry and router
    fn pump(&mut self) {
        while let Ok(raw) = self.raw_rx.try_recv() {
            self.registry.process_report(raw);
        }
        while let Ok(event) = self.device_events.try_recv() {
            self.router.handle_device_event(&event);
        }
    }

    fn game_events(&mut self) -> Vec<GameEvent> {
        std::iter::from_fn(|| self.game.try_recv().ok()).collect()
    }
}

#[derive(Default)]
struct Targets(Vec<ScreenPoint>);

impl TargetPresenter for Targets {
    fn show_target(&mut self, _index: usize, target: ScreenPoint) {
        self.0.push(target);
    }
}

fn file_store(dir: &tempfile::TempDir) -> SharedStore {
    Arc::new(JsonFileStore::new(dir.path()))
}

// ── Detection → calibration → play ──

#[tokio::test]
async fn detect_calibrate_and_shoot() {
    let dir = tempfile::tempdir().unwrap();
    let mut h = Harness::new(file_store(&dir));
    h.backend.plug(gun_info("/dev/hidraw1", Some("P1")));
    let id = h.registry.discover().await.remove(0);
    h.pump();

    // First trigger pull in detection mode claims player 1
    h.router.start_detection_via_devices(|_| {});
    h.backend.inject(&id, &joystick_report(0x01, 100, 100));
    h.backend.inject(&id, &joystick_report(0x00, 100, 100));
    h.pump();
    h.router.stop_detection();
    assert_eq!(h.router.slot_for_device(&id), Some(0));
    assert_eq!(h.game_events(), vec![GameEvent::GunAssigned { slot: 0 }]);
    assert_eq!(h.router.slot(0).unwrap().device_name.as_deref(), Some("RS3 Reaper"));

    // Wizard over an exclusive tap: the shots never reach the game
    let tap = h.router.set_device_input_handler(id.clone());
    let wizard = h.router.calibration().begin_wizard(id.clone(), 0);
    h.backend.inject(&id, &joystick_report(0x01, 1000, 2000));
    h.backend.inject(&id, &joystick_report(0x00, 1000, 2000));
    h.backend.inject(&id, &joystick_report(0x01, 30000, 31000));
    h.backend.inject(&id, &joystick_report(0x00, 30000, 31000));
    h.pump();
    assert!(h.game_events().is_empty());

    let mut targets = Targets::default();
    let outcome = run_wizard(wizard, tap, &mut targets, std::future::pending()).await;
    assert_eq!(
        targets.0,
        vec![ScreenPoint::new(100.0, 100.0), ScreenPoint::new(1820.0, 1180.0)]
    );
    let WizardOutcome::Completed(profile) = outcome else {
        panic!("wizard did not complete");
    };
    h.router.calibration_mut().set_profile(id.clone(), profile);
    assert!(h.router.remove_device_input_handler(&id));

    // Aim at the middle of the screen
    h.backend.inject(&id, &joystick_report(0x01, 15500, 16500));
    h.pump();
    match h.game_events().as_slice() {
        [GameEvent::Shoot { slot: 0, x, y }] => {
            assert!((x - 960.0).abs() < 0.5);
            assert!((y - 640.0).abs() < 0.5);
        }
        other => panic!("expected a shot, got {other:?}"),
    }
}

// ── Persistence ──

#[tokio::test]
async fn state_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let gun = DeviceId::from("0483:5750:P1");
    {
        let mut h = Harness::new(file_store(&dir));
        h.router.assign_device(1, gun.clone());
        let engine = h.router.calibration_mut();
        let wizard = engine.begin_wizard(gun.clone(), 0);
        assert_eq!(wizard.targets()[1], ScreenPoint::new(1820.0, 1180.0));
        let profile = lightgun_guns::solve_two_point(
            lightgun_guns::CalibrationSample {
                target: ScreenPoint::new(100.0, 100.0),
                raw1: 1000,
                raw2: 2000,
            },
            lightgun_guns::CalibrationSample {
                target: ScreenPoint::new(1820.0, 1180.0),
                raw1: 30000,
                raw2: 31000,
            },
            1920.0,
            1280.0,
        )
        .unwrap();
        engine.set_profile(gun.clone(), profile);
    }
    assert!(dir.path().join("gun-profiles.json").exists());
    assert!(dir.path().join("gun-calibration.json").exists());

    let mut h = Harness::new(file_store(&dir));
    assert_eq!(h.router.slot_for_device(&gun), Some(1));
    assert!(!h.router.slot(1).unwrap().connected);

    // The gun shows up again with the same serial
    h.backend.plug(gun_info("/dev/hidraw5", Some("P1")));
    h.registry.sync_present().await;
    h.pump();
    assert!(h.router.slot(1).unwrap().connected);

    h.backend.inject(&gun, &joystick_report(0x01, 15500, 16500));
    h.pump();
    match h.game_events().as_slice() {
        [GameEvent::Shoot { slot: 1, x, .. }] => assert!((x - 960.0).abs() < 0.5),
        other => panic!("expected a shot, got {other:?}"),
    }

    // Reset leaves calibration alone
    h.router.reset_assignments();
    assert!(h.router.slot_for_device(&gun).is_none());
    assert!(h.router.calibration().profile(&gun).is_some());
}

#[tokio::test]
async fn unplug_marks_slot_disconnected() {
    let mut h = Harness::new(lightgun_guns::MemoryStore::shared());
    h.backend.plug(gun_info("/dev/hidraw1", Some("P1")));
    let id = h.registry.discover().await.remove(0);
    h.pump();
    h.router.assign_device(0, id.clone());
    assert!(h.router.slot(0).unwrap().connected);

    h.backend.unplug("/dev/hidraw1");
    h.registry.sync_present().await;
    h.pump();
    let slot = h.router.slot(0).unwrap();
    assert!(!slot.connected);
    assert_eq!(slot.hid_device(), Some(&id));
}
