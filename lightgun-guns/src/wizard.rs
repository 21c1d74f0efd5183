//! Two-point calibration wizard
//!
//! [`CalibrationWizard`] is the synchronous state machine: it is fed frames
//! from the device being calibrated and reports what to show next.
//! [`run_wizard`] drives it from an exclusive input tap until it completes,
//! the tap closes, or the caller cancels.

use std::future::Future;

use lightgun_transport::{DeviceId, InputFrame, Position};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::calibration::{
    solve_two_point, CalibrationProfile, CalibrationSample, ScreenPoint, SurfaceGeometry,
};
use crate::error::CalibrationError;

/// What the wizard wants after consuming a frame
#[derive(Debug, Clone, PartialEq)]
pub enum WizardProgress {
    /// Frame carried no usable trigger press
    Ignored,
    /// Sample taken; show the next target
    NextTarget { index: usize, target: ScreenPoint },
    /// Captures were degenerate; start again at the first target
    Restart {
        target: ScreenPoint,
        error: CalibrationError,
    },
    Complete(CalibrationProfile),
}

/// Two-point capture state for one device
#[derive(Debug, Clone)]
pub struct CalibrationWizard {
    device_id: DeviceId,
    targets: [ScreenPoint; 2],
    screen_width: f64,
    screen_height: f64,
    trigger_bit: u8,
    samples: Vec<CalibrationSample>,
    finished: bool,
}

impl CalibrationWizard {
    pub fn new(device_id: DeviceId, surface: &SurfaceGeometry, trigger_bit: u8) -> Self {
        Self {
            device_id,
            targets: surface.wizard_targets(),
            screen_width: surface.viewport_width,
            screen_height: surface.viewport_height,
            trigger_bit,
            samples: Vec::with_capacity(2),
            finished: false,
        }
    }

    pub fn device_id(&self) -> &DeviceId {
        &self.device_id
    }

    /// Index of the target currently awaiting a shot
    pub fn step(&self) -> usize {
        self.samples.len()
    }

    pub fn current_target(&self) -> ScreenPoint {
        self.targets[self.samples.len().min(1)]
    }

    pub fn targets(&self) -> [ScreenPoint; 2] {
        self.targets
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Consume one frame
    ///
    /// Only trigger press edges with an absolute position from the device
    /// being calibrated count as a capture.
    pub fn feed(&mut self, frame: &InputFrame) -> Result<WizardProgress, CalibrationError> {
        if self.finished {
            return Err(CalibrationError::WizardFinished);
        }
        if frame.device_id != self.device_id || !frame.buttons.was_pressed(self.trigger_bit) {
            return Ok(WizardProgress::Ignored);
        }
        let Position::Absolute { axis1, axis2 } = frame.position else {
            debug!("{} trigger without absolute position ignored", self.device_id);
            return Ok(WizardProgress::Ignored);
        };

        let target = self.current_target();
        self.samples.push(CalibrationSample {
            target,
            raw1: axis1,
            raw2: axis2,
        });
        debug!(
            "{} captured target {} at raw ({}, {})",
            self.device_id,
            self.samples.len(),
            axis1,
            axis2
        );

        if self.samples.len() < 2 {
            return Ok(WizardProgress::NextTarget {
                index: 1,
                target: self.targets[1],
            });
        }

        match solve_two_point(
            self.samples[0],
            self.samples[1],
            self.screen_width,
            self.screen_height,
        ) {
            Ok(profile) => {
                self.finished = true;
                Ok(WizardProgress::Complete(profile))
            }
            Err(error) => {
                warn!("{}: {}, recapturing", self.device_id, error);
                self.samples.clear();
                Ok(WizardProgress::Restart {
                    target: self.targets[0],
                    error,
                })
            }
        }
    }
}

/// Displays wizard targets to the user
pub trait TargetPresenter {
    /// Show target `index` (0 = top-left, 1 = bottom-right) at screen coordinates
    fn show_target(&mut self, index: usize, target: ScreenPoint);

    /// The wizard ended; remove any target
    fn finish(&mut self) {}
}

/// How a wizard run ended
#[derive(Debug, Clone, PartialEq)]
pub enum WizardOutcome {
    Completed(CalibrationProfile),
    Cancelled,
}

/// Drive a wizard from an input tap
///
/// Resolves `Cancelled` when `cancel` resolves or the tap closes (the device
/// disconnected or the tap was replaced). The caller stores a completed
/// profile with [`CalibrationEngine::set_profile`](crate::CalibrationEngine::set_profile).
pub async fn run_wizard<P, C>(
    mut wizard: CalibrationWizard,
    mut input: mpsc::UnboundedReceiver<InputFrame>,
    presenter: &mut P,
    cancel: C,
) -> WizardOutcome
where
    P: TargetPresenter + ?Sized,
    C: Future<Output = ()>,
{
    tokio::pin!(cancel);
    info!("Calibrating {}", wizard.device_id());
    presenter.show_target(0, wizard.current_target());

    let outcome = loop {
        tokio::select! {
            _ = &mut cancel => {
                info!("Calibration of {} cancelled", wizard.device_id());
                break WizardOutcome::Cancelled;
            }
            frame = input.recv() => {
                let Some(frame) = frame else {
                    warn!("Input for {} closed during calibration", wizard.device_id());
                    break WizardOutcome::Cancelled;
                };
                match wizard.feed(&frame) {
                    Ok(WizardProgress::Ignored) => {}
                    Ok(WizardProgress::NextTarget { index, target }) => {
                        presenter.show_target(index, target);
                    }
                    Ok(WizardProgress::Restart { target, .. }) => {
                        presenter.show_target(0, target);
                    }
                    Ok(WizardProgress::Complete(profile)) => {
                        break WizardOutcome::Completed(profile);
                    }
                    Err(e) => {
                        warn!("{}", e);
                        break WizardOutcome::Cancelled;
                    }
                }
            }
        }
    };

    presenter.finish();
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use lightgun_transport::ButtonState;

    fn frame(id: &str, pressed: bool, position: Position) -> InputFrame {
        let mask = u8::from(pressed);
        InputFrame {
            device_id: DeviceId::from(id),
            timestamp: 0.0,
            buttons: ButtonState::from_transition(0, mask),
            position,
        }
    }

    fn shot(raw1: u16, raw2: u16) -> InputFrame {
        frame("gun", true, Position::Absolute { axis1: raw1, axis2: raw2 })
    }

    fn wizard() -> CalibrationWizard {
        CalibrationWizard::new(
            DeviceId::from("gun"),
            &SurfaceGeometry::fullscreen(1920.0, 1280.0),
            0,
        )
    }

    #[derive(Default)]
    struct RecordingPresenter {
        shown: Vec<(usize, ScreenPoint)>,
        finished: bool,
    }

    impl TargetPresenter for RecordingPresenter {
        fn show_target(&mut self, index: usize, target: ScreenPoint) {
            self.shown.push((index, target));
        }

        fn finish(&mut self) {
            self.finished = true;
        }
    }

    #[test]
    fn test_two_captures_complete() {
        let mut wizard = wizard();
        assert_eq!(wizard.current_target(), ScreenPoint::new(100.0, 100.0));
        assert_eq!(
            wizard.feed(&shot(1000, 2000)).unwrap(),
            WizardProgress::NextTarget {
                index: 1,
                target: ScreenPoint::new(1820.0, 1180.0)
            }
        );
        match wizard.feed(&shot(30000, 31000)).unwrap() {
            WizardProgress::Complete(profile) => {
                assert!((profile.scale_x - 1720.0 / 29000.0).abs() < 1e-9);
                assert_eq!(profile.screen_width, 1920.0);
            }
            other => panic!("expected completion, got {other:?}"),
        }
        assert_eq!(wizard.feed(&shot(1, 1)), Err(CalibrationError::WizardFinished));
    }

    #[test]
    fn test_ignores_other_input() {
        let mut wizard = wizard();
        assert_eq!(
            wizard.feed(&frame("other", true, Position::Absolute { axis1: 1, axis2: 1 })).unwrap(),
            WizardProgress::Ignored
        );
        assert_eq!(
            wizard.feed(&frame("gun", false, Position::Absolute { axis1: 1, axis2: 1 })).unwrap(),
            WizardProgress::Ignored
        );
        assert_eq!(
            wizard.feed(&frame("gun", true, Position::Relative { dx: 1, dy: 1 })).unwrap(),
            WizardProgress::Ignored
        );
        assert_eq!(wizard.step(), 0);
    }

    #[test]
    fn test_degenerate_restarts() {
        let mut wizard = wizard();
        wizard.feed(&shot(1000, 2000)).unwrap();
        match wizard.feed(&shot(1000, 31000)).unwrap() {
            WizardProgress::Restart { target, .. } => {
                assert_eq!(target, ScreenPoint::new(100.0, 100.0));
            }
            other => panic!("expected restart, got {other:?}"),
        }
        assert_eq!(wizard.step(), 0);
        assert!(!wizard.is_finished());
    }

    #[tokio::test]
    async fn test_run_wizard_completes() {
        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(shot(1000, 2000)).unwrap();
        tx.send(frame("gun", false, Position::Absolute { axis1: 0, axis2: 0 }))
            .unwrap();
        tx.send(shot(30000, 31000)).unwrap();

        let mut presenter = RecordingPresenter::default();
        let outcome = run_wizard(wizard(), rx, &mut presenter, std::future::pending()).await;
        assert!(matches!(outcome, WizardOutcome::Completed(_)));
        assert_eq!(presenter.shown.len(), 2);
        assert_eq!(presenter.shown[1].0, 1);
        assert!(presenter.finished);
    }

    #[tokio::test]
    async fn test_run_wizard_cancel() {
        let (_tx, rx) = mpsc::unbounded_channel();
        let mut presenter = RecordingPresenter::default();
        let outcome = run_wizard(wizard(), rx, &mut presenter, async {}).await;
        assert_eq!(outcome, WizardOutcome::Cancelled);
        assert!(presenter.finished);
    }

    #[tokio::test]
    async fn test_run_wizard_tap_closed() {
        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(shot(1000, 2000)).unwrap();
        drop(tx);
        let mut presenter = RecordingPresenter::default();
        let outcome = run_wizard(wizard(), rx, &mut presenter, std::future::pending()).await;
        assert_eq!(outcome, WizardOutcome::Cancelled);
    }
}
