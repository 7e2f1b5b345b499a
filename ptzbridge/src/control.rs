/*!
Main control loop: polls [`PanelState`] and turns its edges into
orchestrator calls.
*/

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info};

use crate::input::{Mode, PanelState};
use crate::state::Orchestrator;

/// Why the loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    /// Running flag cleared (Ctrl-C)
    Shutdown,
    /// Home held long enough to ask for a re-exec
    Restart,
    /// A hardware thread died
    ThreadCrashed,
}

pub struct ControlLoop {
    orchestrator: Arc<Orchestrator>,
    panel: Arc<PanelState>,
    interval: Duration,
    last_mode: Mode,
}

impl ControlLoop {
    pub fn new(orchestrator: Arc<Orchestrator>, interval: Duration) -> Self {
        let panel = orchestrator.panel().clone();
        let last_mode = panel.mode();
        Self {
            orchestrator,
            panel,
            interval,
            last_mode,
        }
    }

    /// One poll of the panel. Returns an exit reason when the loop should stop.
    pub fn step(&mut self) -> Option<LoopExit> {
        let mode = self.panel.mode();
        if mode != self.last_mode {
            debug!("Mode {:?} -> {:?}", self.last_mode, mode);
            self.last_mode = mode;
            self.orchestrator.update_leds();
        }

        if let Some(index) = self.panel.take_camera_changed() {
            info!("Attempting to switch to camera {}", index);
            match self.orchestrator.connect_to_camera(index) {
                Ok(()) => self.orchestrator.update_leds(),
                Err(e) => error!("Failed to switch to camera {}: {}", index, e),
            }
        }

        if let Some(key) = self.panel.take_recall_preset() {
            self.orchestrator.recall_preset_from_panel(key);
        }

        if let Some(key) = self.panel.take_set_preset() {
            self.orchestrator.save_preset_from_panel(key);
        }

        self.orchestrator
            .update_pan_tilt(self.panel.pan(), self.panel.tilt());
        self.orchestrator.update_zoom(self.panel.zoom());

        if self.panel.take_vertical_lock_changed() {
            self.orchestrator.update_leds();
        }

        if self.panel.take_home_short_release() {
            self.orchestrator.home_camera();
        }

        if self.panel.restart_requested() {
            info!("Long press detected, restarting");
            return Some(LoopExit::Restart);
        }

        None
    }

    /// Poll until `running` clears, a restart is requested, or
    /// `threads_alive` reports a dead hardware thread
    pub fn run(&mut self, running: &AtomicBool, threads_alive: impl Fn() -> bool) -> LoopExit {
        while running.load(Ordering::SeqCst) {
            if !threads_alive() {
                error!("💥 One or more hardware threads have crashed, shutting down");
                return LoopExit::ThreadCrashed;
            }

            if let Some(exit) = self.step() {
                return exit;
            }

            thread::sleep(self.interval);
        }
        LoopExit::Shutdown
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::animation::AnimationScheduler;
    use crate::config::CameraEntry;
    use crate::input::{DecoderConfig, InputDecoder};
    use crate::leds::{LedMatrix, BLUE, RED};
    use crate::testing::{test_app_config, FakeCamera, SharedSink};
    use std::time::Instant;

    struct Rig {
        camera: FakeCamera,
        orchestrator: Arc<Orchestrator>,
        decoder: InputDecoder,
        control: ControlLoop,
    }

    fn rig(cameras: usize) -> Rig {
        let camera = FakeCamera::acking();
        let roster = (0..cameras)
            .map(|_| CameraEntry {
                ip: "127.0.0.1".to_string(),
                color: RED,
            })
            .collect();
        let config = test_app_config(camera.endpoint().port, roster);

        let leds = Arc::new(LedMatrix::new(Box::new(SharedSink::default())));
        let animations = Arc::new(AnimationScheduler::new(leds.clone()));
        let panel = Arc::new(PanelState::new());
        let orchestrator = Arc::new(Orchestrator::new(&config, leds, animations, panel.clone()).unwrap());
        orchestrator.connect_to_camera(0).unwrap();

        let decoder = InputDecoder::new(panel, DecoderConfig::default());
        let control = ControlLoop::new(orchestrator.clone(), Duration::from_millis(1));
        Rig {
            camera,
            orchestrator,
            decoder,
            control,
        }
    }

    impl Rig {
        fn feed(&mut self, line: &str) {
            let roster_len = self.orchestrator.roster_len();
            self.decoder.handle_line(line, Instant::now(), roster_len).unwrap();
        }

        fn last_command(&self) -> Vec<u8> {
            self.camera.command_payloads().last().cloned().unwrap()
        }
    }

    #[test]
    fn test_joystick_drives_camera() {
        let mut rig = rig(1);
        rig.feed("1,10");
        assert_eq!(rig.control.step(), None);
        // pan 9 from the panel goes out as -9
        assert_eq!(rig.last_command(), vec![0x81, 0x01, 0x06, 0x01, 0x09, 0x00, 0x01, 0x03, 0xFF]);

        rig.feed("2,-4");
        rig.control.step();
        assert_eq!(rig.last_command(), vec![0x81, 0x01, 0x04, 0x07, 0x33, 0xFF]);
    }

    #[test]
    fn test_camera_select_switches_link() {
        let mut rig = rig(2);
        rig.feed("8,5,1");
        rig.feed("9,2,1"); // (0, 1) -> camera 1
        rig.control.step();
        assert_eq!(rig.orchestrator.current_index(), 1);
        assert!(rig.orchestrator.is_connected());
    }

    #[test]
    fn test_preset_mode_redraws_leds() {
        let mut rig = rig(1);
        rig.feed("7,5,1");
        rig.control.step();
        let grid = rig.orchestrator.get_led_status();
        assert_eq!(grid[0][0], BLUE);
        assert_eq!(grid[3][3], RED);

        rig.feed("10,2,1"); // (0, 0) saves preset 1
        rig.control.step();
        assert_eq!(rig.last_command(), vec![0x81, 0x01, 0x04, 0x3F, 0x01, 0x01, 0xFF]);
    }

    #[test]
    fn test_restart_and_shutdown_exits() {
        let mut rig = rig(1);
        let running = AtomicBool::new(false);
        assert_eq!(rig.control.run(&running, || true), LoopExit::Shutdown);

        running.store(true, Ordering::SeqCst);
        assert_eq!(rig.control.run(&running, || false), LoopExit::ThreadCrashed);

        let start = Instant::now();
        rig.decoder.handle_line("10,5,1", start, 1).unwrap();
        rig.decoder
            .handle_line("10,5,0", start + Duration::from_secs(6), 1)
            .unwrap();
        assert_eq!(rig.control.run(&running, || true), LoopExit::Restart);
    }
}
