//! Event loop wiring: registry → router → game
//!
//! Everything runs on one task. Reader threads push raw reports into the
//! registry's channel; [`Pipeline::step`] waits for the next report or
//! hot-plug tick, decodes it and routes the resulting notifications.

use std::sync::Arc;

use lightgun_guns::{
    CalibrationEngine, CursorSink, GameEvent, GunSlotRouter, JsonFileStore, SharedStore,
    UiClickRouter,
};
use lightgun_transport::{DeviceEvent, DeviceId, DeviceRegistry, HidDiscovery, RawReport};
use tokio::sync::{broadcast, mpsc};
use tokio::time::{interval, Interval, MissedTickBehavior};
use tracing::{debug, warn};

use crate::config::LightgunConfig;

/// The assembled input pipeline
pub struct Pipeline {
    pub registry: DeviceRegistry,
    pub router: GunSlotRouter,
    raw_rx: mpsc::UnboundedReceiver<RawReport>,
    device_events: broadcast::Receiver<DeviceEvent>,
    game_events: mpsc::UnboundedReceiver<GameEvent>,
    hotplug: Interval,
}

impl Pipeline {
    /// Assemble from parts
    pub fn new(
        config: &LightgunConfig,
        (registry, raw_rx): (DeviceRegistry, mpsc::UnboundedReceiver<RawReport>),
        store: SharedStore,
        cursor: Box<dyn CursorSink>,
        ui: Box<dyn UiClickRouter>,
    ) -> Self {
        let device_events = registry.subscribe();
        let engine = CalibrationEngine::new(store.clone(), config.surface);
        let (router, game_events) = GunSlotRouter::new(engine, store, cursor, ui);

        let mut hotplug = interval(config.hotplug_interval());
        hotplug.set_missed_tick_behavior(MissedTickBehavior::Delay);

        Self {
            registry,
            router,
            raw_rx,
            device_events,
            game_events,
            hotplug,
        }
    }

    /// Probe HID, open the on-disk store and assemble
    ///
    /// Without HID access the registry is inert and only the pointer
    /// fallback drives slots.
    pub fn from_config(
        config: &LightgunConfig,
        cursor: Box<dyn CursorSink>,
        ui: Box<dyn UiClickRouter>,
    ) -> Self {
        let registry = match HidDiscovery::probe() {
            Ok(discovery) => {
                DeviceRegistry::new(Arc::new(discovery.with_reader_config(config.reader_config())))
            }
            Err(e) => DeviceRegistry::unavailable(&e.to_string()),
        };
        let store: SharedStore = Arc::new(JsonFileStore::new(config.store_dir()));
        debug!("Using store at {}", config.store_dir().display());
        Self::new(config, registry, store, cursor, ui)
    }

    /// Open already-present guns and route their connect notifications
    pub async fn start(&mut self) -> Vec<DeviceId> {
        let ids = self.registry.discover().await;
        self.route_device_events();
        ids
    }

    /// Wait for one report or hot-plug tick and route everything it caused
    pub async fn step(&mut self) {
        tokio::select! {
            Some(raw) = self.raw_rx.recv() => {
                self.registry.process_report(raw);
                self.route_device_events();
                // Drain whatever else queued up while we were busy, routing
                // per report so the event channel never holds a backlog
                while let Ok(raw) = self.raw_rx.try_recv() {
                    self.registry.process_report(raw);
                    self.route_device_events();
                }
            }
            _ = self.hotplug.tick() => {
                self.registry.sync_present().await;
            }
        }
        self.route_device_events();
    }

    /// Pump the pipeline until the surrounding future is dropped
    pub async fn pump_forever(&mut self) {
        loop {
            self.step().await;
        }
    }

    fn route_device_events(&mut self) {
        loop {
            match self.device_events.try_recv() {
                Ok(event) => self.router.handle_device_event(&event),
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    warn!("Router lagged, {} device events dropped", n);
                }
                Err(_) => break,
            }
        }
    }

    /// Next queued game event, if any
    pub fn next_game_event(&mut self) -> Option<GameEvent> {
        self.game_events.try_recv().ok()
    }

    /// Stop all readers
    pub fn shutdown(&mut self) {
        self.registry.close_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lightgun_guns::{MemoryStore, NoCursor, NoUi};
    use lightgun_transport::mock::{gun_info, joystick_report, MockBackend};

    fn pipeline(backend: &MockBackend) -> Pipeline {
        let config = LightgunConfig {
            hotplug_interval_ms: 50,
            ..LightgunConfig::default()
        };
        Pipeline::new(
            &config,
            DeviceRegistry::new(Arc::new(backend.clone())),
            MemoryStore::shared(),
            Box::new(NoCursor),
            Box::new(NoUi),
        )
    }

    #[tokio::test]
    async fn test_step_routes_reports_to_game() {
        let backend = MockBackend::new();
        backend.plug(gun_info("/dev/hidraw1", Some("P1")));
        let mut pipeline = pipeline(&backend);
        let ids = pipeline.start().await;
        assert!(pipeline.router.assign_device(0, ids[0].clone()));
        assert!(pipeline.router.slot(0).unwrap().connected);

        backend.inject(&ids[0], &joystick_report(0x04, 0, 0));
        backend.inject(&ids[0], &joystick_report(0x05, 0, 0));
        // The first tick of a fresh interval fires immediately
        pipeline.step().await;
        pipeline.step().await;
        assert_eq!(
            pipeline.next_game_event(),
            Some(GameEvent::StartButton { slot: 0 })
        );
        assert!(matches!(
            pipeline.next_game_event(),
            Some(GameEvent::Shoot { slot: 0, .. })
        ));
        assert_eq!(pipeline.next_game_event(), None);
    }

    #[tokio::test]
    async fn test_report_burst_keeps_press_edge() {
        let backend = MockBackend::new();
        backend.plug(gun_info("/dev/hidraw1", Some("P1")));
        let mut pipeline = pipeline(&backend);
        let ids = pipeline.start().await;
        assert!(pipeline.router.assign_device(0, ids[0].clone()));

        // Far more queued reports than the event channel holds
        backend.inject(&ids[0], &joystick_report(0x01, 100, 100));
        for _ in 0..299 {
            backend.inject(&ids[0], &joystick_report(0x01, 100, 100));
        }
        for _ in 0..3 {
            pipeline.step().await;
        }

        let shots = std::iter::from_fn(|| pipeline.next_game_event())
            .filter(|e| matches!(e, GameEvent::Shoot { slot: 0, .. }))
            .count();
        assert_eq!(shots, 1);
    }

    #[tokio::test]
    async fn test_hotplug_tick_connects_late_guns() {
        let backend = MockBackend::new();
        let mut pipeline = pipeline(&backend);
        assert!(pipeline.start().await.is_empty());

        backend.plug(gun_info("/dev/hidraw1", Some("P1")));
        pipeline.step().await;
        assert_eq!(pipeline.registry.len(), 1);
    }
}
