/*!
Shared orchestration state.

[`Orchestrator`] owns the camera roster, the single active [`CameraLink`],
auto-tracking vectors and LED rendering. The control loop drives it from
panel input; external collaborators (an HTTP front end, a tracker) use the
same methods.

Panel-path methods (`update_*`, `home_camera`, `*_from_panel`) log camera
errors instead of returning them. Collaborator methods return them.
*/

use ptz_shared::commands::{self, AutofocusMode, MAX_PANTILT_SPEED, MAX_ZOOM_SPEED};
use ptz_shared::panel::{dim, key_position, GRID_COLUMNS, GRID_ROWS};
use ptz_shared::protocol::MAX_CAMERAS;
use ptz_shared::{BridgeError, CommandFrame, ResponseFrame, Result, Rgb};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::animation::AnimationScheduler;
use crate::camera::{CameraEndpoint, CameraLink, LinkConfig};
use crate::config::{AppConfig, CameraEntry};
use crate::dispatch::CommandQueue;
use crate::input::{PanelState, CAMERA_SELECT_KEY, PRESET_KEY, VERTICAL_LOCK_KEY};
use crate::leds::{Grid, LedMatrix, BLACK, BLUE, GREEN, RED, YELLOW};

/// Non-selected cameras are shown at this brightness
const INACTIVE_CAMERA_DIM: f64 = 0.3;

/// Brightness of the camera function key relative to the camera colour
const FUNCTION_KEY_DIM: f64 = 0.7;

/// Preset keys lit in preset-setting mode
const PRESET_KEYS_SHOWN: usize = 10;

const PRESET_IDLE: Rgb = [100, 0, 0];

const RECALL_FADE: Duration = Duration::from_millis(500);
const SAVE_FADE: Duration = Duration::from_secs(1);

/// Auto-tracking speeds added to manual pan/tilt for one camera
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct AutoTrackingVector {
    pub pan_speed: f32,
    pub tilt_speed: f32,
}

/// Serialisable auto-tracking snapshot for collaborators
#[derive(Debug, Clone, Serialize)]
pub struct AutoTrackStatus {
    pub auto_tracking_active: bool,
    pub current_camera_index: usize,
    pub auto_tracking_commands: BTreeMap<usize, AutoTrackingVector>,
}

/// Work queued for the active link
pub type LinkJob = Box<dyn FnOnce(&mut CameraLink) -> Result<()> + Send>;

/// Last values transmitted to the active camera
#[derive(Debug, Default)]
struct Motion {
    pantilt: (i32, i32),
    zoom: i32,
}

pub struct Orchestrator {
    roster: Mutex<Vec<CameraEntry>>,
    current: AtomicUsize,
    // lock order: link, then motion
    link: Mutex<Option<CameraLink>>,
    motion: Mutex<Motion>,
    tracking: Mutex<BTreeMap<usize, AutoTrackingVector>>,
    tracking_enabled: AtomicBool,
    fast_mode: AtomicBool,
    camera_port: u16,
    link_config: LinkConfig,
    leds: Arc<LedMatrix>,
    animations: Arc<AnimationScheduler>,
    panel: Arc<PanelState>,
    dispatcher: Mutex<Option<CommandQueue<LinkJob>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn check_roster_len(len: usize) -> Result<()> {
    if len > MAX_CAMERAS {
        return Err(BridgeError::invalid_parameter(format!(
            "at most {MAX_CAMERAS} cameras are supported, got {len}"
        )));
    }
    Ok(())
}

/// Round and clamp a combined speed to the pan/tilt range
fn clamp_speed(speed: f32) -> i32 {
    (speed.round() as i32).clamp(-MAX_PANTILT_SPEED, MAX_PANTILT_SPEED)
}

impl Orchestrator {
    pub fn new(
        config: &AppConfig,
        leds: Arc<LedMatrix>,
        animations: Arc<AnimationScheduler>,
        panel: Arc<PanelState>,
    ) -> Result<Self> {
        check_roster_len(config.cameras.len())?;

        Ok(Self {
            roster: Mutex::new(config.cameras.clone()),
            current: AtomicUsize::new(0),
            link: Mutex::new(None),
            motion: Mutex::new(Motion::default()),
            tracking: Mutex::new(BTreeMap::new()),
            tracking_enabled: AtomicBool::new(false),
            fast_mode: AtomicBool::new(false),
            camera_port: config.camera.port,
            link_config: config.camera.link_config(),
            leds,
            animations,
            panel,
            dispatcher: Mutex::new(None),
        })
    }

    pub fn panel(&self) -> &Arc<PanelState> {
        &self.panel
    }

    pub fn roster_len(&self) -> usize {
        lock(&self.roster).len()
    }

    pub fn current_index(&self) -> usize {
        self.current.load(Ordering::SeqCst)
    }

    pub fn is_connected(&self) -> bool {
        lock(&self.link).is_some()
    }

    /// Switch the active link to roster entry `index`.
    ///
    /// The old link is closed first (both bind the same local port). On
    /// failure no link is active and the current index is unchanged.
    pub fn connect_to_camera(&self, index: usize) -> Result<()> {
        let entry = lock(&self.roster).get(index).cloned().ok_or_else(|| {
            BridgeError::invalid_parameter(format!("no camera at index {index}"))
        })?;

        let mut link = lock(&self.link);
        if let Some(mut old) = link.take() {
            old.close();
        }

        let endpoint = CameraEndpoint::new(entry.ip.clone(), self.camera_port);
        let mut new_link = CameraLink::connect(endpoint, self.link_config.clone()).map_err(|e| {
            error!("Failed to connect to camera {} at {}: {}", index, entry.ip, e);
            e
        })?;

        if let Err(e) = new_link.set_slow_pan_tilt(true) {
            warn!("Could not enable slow pan/tilt on {}: {}", entry.ip, e);
        }
        // zoom-triggered autofocus hunts while zooming from the panel
        if let Err(e) = new_link.set_autofocus_mode(AutofocusMode::Normal) {
            warn!("Could not set autofocus mode on {}: {}", entry.ip, e);
        }

        *link = Some(new_link);
        *lock(&self.motion) = Motion::default();
        self.fast_mode.store(false, Ordering::SeqCst);
        self.current.store(index, Ordering::SeqCst);

        info!("🎥 Active camera {} ({})", index, entry.ip);
        Ok(())
    }

    /// Connect to the first roster entry that answers; returns its index
    pub fn connect_first_available(&self) -> Result<usize> {
        let len = self.roster_len();
        for index in 0..len {
            if self.connect_to_camera(index).is_ok() {
                return Ok(index);
            }
        }
        Err(BridgeError::connection(format!(
            "none of the {len} configured cameras could be connected"
        )))
    }

    /// Release the active link
    pub fn disconnect(&self) {
        if let Some(mut link) = lock(&self.link).take() {
            link.close();
        }
    }

    fn with_link<T>(&self, op: impl FnOnce(&mut CameraLink) -> Result<T>) -> Result<T> {
        let mut link = lock(&self.link);
        let link = link
            .as_mut()
            .ok_or_else(|| BridgeError::not_found("no active camera"))?;
        op(link)
    }

    /// Combine manual input with the current camera's tracking vector and
    /// send it, sign inverted to match the panel's axes.
    ///
    /// Returns the transmitted pair, or `None` when nothing was sent (no
    /// camera, unchanged value, or a failed send).
    pub fn update_pan_tilt(&self, manual_pan: i32, manual_tilt: i32) -> Option<(i32, i32)> {
        let (mut pan, mut tilt) = (manual_pan as f32, manual_tilt as f32);
        if self.tracking_enabled.load(Ordering::SeqCst) {
            if let Some(vector) = lock(&self.tracking).get(&self.current_index()) {
                pan += vector.pan_speed;
                tilt += vector.tilt_speed;
            }
        }
        let pair = (-clamp_speed(pan), -clamp_speed(tilt));

        let mut link = lock(&self.link);
        let camera = link.as_mut()?;
        let mut motion = lock(&self.motion);
        if motion.pantilt == pair {
            return None;
        }

        match camera.pantilt(pair.0, pair.1) {
            Ok(()) => {
                motion.pantilt = pair;
                Some(pair)
            }
            Err(e) => {
                warn!("Error updating pan/tilt: {}", e);
                None
            }
        }
    }

    pub fn update_zoom(&self, speed: i32) -> Option<i32> {
        let speed = speed.clamp(-MAX_ZOOM_SPEED, MAX_ZOOM_SPEED);

        let mut link = lock(&self.link);
        let camera = link.as_mut()?;
        let mut motion = lock(&self.motion);
        if motion.zoom == speed {
            return None;
        }

        match camera.zoom(speed) {
            Ok(()) => {
                motion.zoom = speed;
                Some(speed)
            }
            Err(e) => {
                warn!("Error updating zoom: {}", e);
                None
            }
        }
    }

    /// Resynchronise the sequence number, then zoom out and centre
    pub fn home_camera(&self) {
        let result = self.with_link(|camera| {
            camera.reset_sequence_number()?;
            camera.home()
        });
        match result {
            Ok(()) => info!("Camera homed"),
            Err(BridgeError::NotFound(_)) => {}
            Err(e) => warn!("Error homing camera: {}", e),
        }
    }

    /// Flip between slow and fast pan/tilt; returns whether fast mode is on
    pub fn toggle_fast_mode(&self) -> bool {
        let fast = !self.fast_mode.load(Ordering::SeqCst);
        match self.with_link(|camera| camera.set_slow_pan_tilt(!fast)) {
            Ok(()) => self.fast_mode.store(fast, Ordering::SeqCst),
            Err(e) => warn!("Error toggling fast mode: {}", e),
        }
        self.fast_mode.load(Ordering::SeqCst)
    }

    /// Recall the preset stored under panel key `key` (camera preset `key + 1`)
    pub fn recall_preset_from_panel(&self, key: usize) {
        let (x, y) = key_position(key);
        self.flash(x, y, |animations| animations.fade_to_black(x, y, RECALL_FADE));

        let preset = key as i32 + 1;
        match self.with_link(|camera| camera.recall_preset(preset)) {
            Ok(()) => info!("Recalled preset {}", preset),
            Err(e) => warn!("Error recalling preset {}: {}", preset, e),
        }
    }

    /// Store the current position under panel key `key` (camera preset `key + 1`)
    pub fn save_preset_from_panel(&self, key: usize) {
        let preset = key as i32 + 1;
        match self.with_link(|camera| camera.save_preset(preset)) {
            Ok(()) => info!("Saved preset {}", preset),
            Err(e) => {
                warn!("Error saving preset {}: {}", preset, e);
                return;
            }
        }

        let (x, y) = key_position(key);
        self.flash(x, y, |animations| animations.fade_to_color(x, y, BLUE, SAVE_FADE));
    }

    fn flash(
        &self,
        x: usize,
        y: usize,
        fade: impl FnOnce(&AnimationScheduler) -> Result<crate::animation::AnimationId>,
    ) {
        let result = self
            .leds
            .update(x, y, YELLOW)
            .and_then(|_| fade(&self.animations));
        if let Err(e) = result {
            warn!("Preset key ({}, {}) cannot be lit: {}", x, y, e);
        }
    }

    /// Redraw the whole grid from roster, mode and lock state
    pub fn update_leds(&self) {
        let roster = lock(&self.roster).clone();
        let current = self.current_index();
        let preset_mode = self.panel.preset_setting();

        let mut cells: Vec<((usize, usize), Rgb)> = Vec::new();
        if preset_mode {
            for key in 0..PRESET_KEYS_SHOWN {
                cells.push((key_position(key), BLUE));
            }
        } else {
            for (index, camera) in roster.iter().enumerate() {
                let color = if index == current {
                    camera.color
                } else {
                    dim(camera.color, INACTIVE_CAMERA_DIM)
                };
                cells.push((key_position(index), color));
            }
        }

        let lock_color = if self.panel.vertical_lock() { RED } else { GREEN };
        cells.push((VERTICAL_LOCK_KEY, lock_color));

        if let Some(camera) = roster.get(current) {
            cells.push((CAMERA_SELECT_KEY, dim(camera.color, FUNCTION_KEY_DIM)));
        }
        cells.push((PRESET_KEY, if preset_mode { RED } else { PRESET_IDLE }));

        let mut grid: Grid = [[BLACK; GRID_ROWS]; GRID_COLUMNS];
        for ((x, y), color) in cells {
            match grid.get_mut(x).and_then(|column| column.get_mut(y)) {
                Some(cell) => *cell = color,
                None => warn!("LED ({}, {}) outside the grid, not drawn", x, y),
            }
        }
        self.leds.replace(grid);
        debug!("LEDs redrawn (preset mode: {})", preset_mode);
    }

    // Collaborator interface

    pub fn get_cameras(&self) -> Vec<CameraEntry> {
        lock(&self.roster).clone()
    }

    /// Current roster entry, if the roster is not empty
    pub fn get_current_camera(&self) -> Option<(usize, CameraEntry)> {
        let index = self.current_index();
        lock(&self.roster).get(index).cloned().map(|entry| (index, entry))
    }

    /// Run `job` on the active link, or queue it when the dispatcher is
    /// running. Queued jobs report their own failures.
    fn run_or_queue(&self, job: impl FnOnce(&mut CameraLink) -> Result<()> + Send + 'static) -> Result<()> {
        {
            let dispatcher = lock(&self.dispatcher);
            if let Some(queue) = dispatcher.as_ref() {
                return if queue.submit(Box::new(job)) {
                    Ok(())
                } else {
                    Err(BridgeError::QueueFull)
                };
            }
        }
        self.with_link(job)
    }

    pub fn pan_tilt(&self, pan_speed: i32, tilt_speed: i32) -> Result<()> {
        commands::pantilt_drive(pan_speed, tilt_speed)?;
        self.run_or_queue(move |camera| camera.pantilt(pan_speed, tilt_speed))
    }

    pub fn zoom(&self, speed: i32) -> Result<()> {
        commands::zoom_drive(speed)?;
        self.run_or_queue(move |camera| camera.zoom(speed))
    }

    pub fn recall_preset(&self, preset: i32) -> Result<()> {
        commands::recall_preset(preset)?;
        self.run_or_queue(move |camera| camera.recall_preset(preset))
    }

    pub fn save_preset(&self, preset: i32) -> Result<()> {
        commands::save_preset(preset)?;
        self.run_or_queue(move |camera| camera.save_preset(preset))
    }

    /// Send a raw frame over the active link. While the dispatcher is
    /// running the frame is queued and `None` is returned.
    pub fn send_frame(&self, frame: &CommandFrame) -> Result<Option<ResponseFrame>> {
        if lock(&self.dispatcher).is_none() {
            return self.with_link(|camera| camera.send(frame));
        }
        let frame = frame.clone();
        self.run_or_queue(move |camera| camera.send(&frame).map(|_| ()))
            .map(|()| None)
    }

    pub fn get_led_status(&self) -> Grid {
        self.leds.snapshot()
    }

    /// Set one LED and flush immediately
    pub fn update_led(&self, x: usize, y: usize, color: Rgb) -> Result<()> {
        self.leds.update(x, y, color)?;
        self.leds.show()
    }

    pub fn add_camera(&self, entry: CameraEntry) -> Result<usize> {
        let index = {
            let mut roster = lock(&self.roster);
            check_roster_len(roster.len() + 1)?;
            roster.push(entry);
            roster.len() - 1
        };
        self.update_leds();
        Ok(index)
    }

    pub fn update_camera(&self, index: usize, entry: CameraEntry) -> Result<()> {
        {
            let mut roster = lock(&self.roster);
            let slot = roster
                .get_mut(index)
                .ok_or_else(|| BridgeError::not_found(format!("camera {index}")))?;
            if index == self.current_index() && slot.ip != entry.ip {
                info!("Active camera address changed, reconnect to apply");
            }
            *slot = entry;
        }
        self.update_leds();
        Ok(())
    }

    /// Remove a roster entry. Removing the active camera closes its link.
    pub fn remove_camera(&self, index: usize) -> Result<CameraEntry> {
        let removed = {
            let mut roster = lock(&self.roster);
            if index >= roster.len() {
                return Err(BridgeError::not_found(format!("camera {index}")));
            }
            roster.remove(index)
        };

        let current = self.current_index();
        if index == current {
            self.disconnect();
            self.current.store(0, Ordering::SeqCst);
        } else if index < current {
            self.current.store(current - 1, Ordering::SeqCst);
        }

        // tracking vectors follow their camera
        let mut tracking = lock(&self.tracking);
        *tracking = std::mem::take(&mut *tracking)
            .into_iter()
            .filter(|(i, _)| *i != index)
            .map(|(i, v)| if i > index { (i - 1, v) } else { (i, v) })
            .collect();
        drop(tracking);

        self.update_leds();
        Ok(removed)
    }

    /// Flip auto-tracking; returns the new state
    pub fn toggle_autotrack(&self) -> bool {
        let active = !self.tracking_enabled.fetch_xor(true, Ordering::SeqCst);
        info!("Auto-tracking {}", if active { "on" } else { "off" });
        active
    }

    pub fn update_auto_tracking_command(&self, index: usize, pan_speed: f32, tilt_speed: f32) -> Result<()> {
        if index >= self.roster_len() {
            return Err(BridgeError::not_found(format!("camera {index}")));
        }
        if !pan_speed.is_finite() || !tilt_speed.is_finite() {
            return Err(BridgeError::invalid_parameter("tracking speeds must be finite"));
        }
        lock(&self.tracking).insert(
            index,
            AutoTrackingVector {
                pan_speed,
                tilt_speed,
            },
        );
        Ok(())
    }

    pub fn autotrack_status(&self) -> AutoTrackStatus {
        AutoTrackStatus {
            auto_tracking_active: self.tracking_enabled.load(Ordering::SeqCst),
            current_camera_index: self.current_index(),
            auto_tracking_commands: lock(&self.tracking).clone(),
        }
    }

    /// Route collaborator commands through a queue running at most
    /// `max_rate` jobs per second against whichever link is active when each
    /// job is dequeued. Replaces a running dispatcher.
    pub fn start_dispatcher(self: &Arc<Self>, max_rate: u32, capacity: usize) -> std::io::Result<()> {
        let orchestrator: Weak<Self> = Arc::downgrade(self);
        let queue = CommandQueue::spawn(max_rate, capacity, move |job: LinkJob| {
            let Some(orchestrator) = orchestrator.upgrade() else {
                return;
            };
            if let Err(e) = orchestrator.with_link(job) {
                warn!("Queued command failed: {}", e);
            }
        })?;

        info!("Command queue limited to {} commands/s", max_rate);
        if let Some(old) = lock(&self.dispatcher).replace(queue) {
            old.shutdown();
        }
        Ok(())
    }

    /// Run the queued jobs, then go back to sending directly
    pub fn stop_dispatcher(&self) {
        let queue = lock(&self.dispatcher).take();
        if let Some(queue) = queue {
            queue.shutdown();
            debug!("Command queue stopped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{test_app_config, FakeCamera, SharedSink};
    use std::net::UdpSocket;

    fn entry(ip: &str, color: Rgb) -> CameraEntry {
        CameraEntry {
            ip: ip.to_string(),
            color,
        }
    }

    fn orchestrator(port: u16, cameras: Vec<CameraEntry>) -> Orchestrator {
        let config = test_app_config(port, cameras);
        let leds = Arc::new(LedMatrix::new(Box::new(SharedSink::default())));
        let animations = Arc::new(AnimationScheduler::new(leds.clone()));
        Orchestrator::new(&config, leds, animations, Arc::new(PanelState::new())).unwrap()
    }

    #[test]
    fn test_combined_motion_is_clamped_and_inverted() {
        let camera = FakeCamera::acking();
        let o = orchestrator(camera.endpoint().port, vec![entry("127.0.0.1", RED)]);
        o.connect_to_camera(0).unwrap();

        o.toggle_autotrack();
        o.update_auto_tracking_command(0, 10.0, 0.0).unwrap();
        assert_eq!(o.update_pan_tilt(20, 0), Some((-24, 0)));

        let last = camera.command_payloads().last().cloned().unwrap();
        assert_eq!(last, vec![0x81, 0x01, 0x06, 0x01, 0x18, 0x00, 0x01, 0x03, 0xFF]);

        // unchanged input is not resent
        assert_eq!(o.update_pan_tilt(20, 0), None);
    }

    #[test]
    fn test_negative_and_rounded_motion_is_clamped() {
        let camera = FakeCamera::acking();
        let o = orchestrator(camera.endpoint().port, vec![entry("127.0.0.1", RED)]);
        o.connect_to_camera(0).unwrap();
        o.toggle_autotrack();

        // -20 - 10 clamps to -24; 23 + 0.6 rounds up to the limit
        o.update_auto_tracking_command(0, -10.0, 0.6).unwrap();
        assert_eq!(o.update_pan_tilt(-20, 23), Some((24, -24)));
        let last = camera.command_payloads().last().cloned().unwrap();
        assert_eq!(last, vec![0x81, 0x01, 0x06, 0x01, 0x18, 0x18, 0x02, 0x01, 0xFF]);

        // -24.6 rounds past the limit and is clamped back
        o.update_auto_tracking_command(0, -0.6, 0.0).unwrap();
        assert_eq!(o.update_pan_tilt(-24, -24), Some((24, 24)));
        let last = camera.command_payloads().last().cloned().unwrap();
        assert_eq!(last, vec![0x81, 0x01, 0x06, 0x01, 0x18, 0x18, 0x02, 0x02, 0xFF]);
    }

    #[test]
    fn test_tracking_ignored_when_disabled() {
        let camera = FakeCamera::acking();
        let o = orchestrator(camera.endpoint().port, vec![entry("127.0.0.1", RED)]);
        o.connect_to_camera(0).unwrap();

        o.update_auto_tracking_command(0, 3.6, -2.4).unwrap();
        assert_eq!(o.update_pan_tilt(5, 5), Some((-5, -5)));

        o.toggle_autotrack();
        assert_eq!(o.update_pan_tilt(5, 5), Some((-9, -3)));
    }

    #[test]
    fn test_no_camera_is_a_no_op() {
        let o = orchestrator(52381, vec![entry("127.0.0.1", RED)]);
        assert_eq!(o.update_pan_tilt(10, 10), None);
        assert_eq!(o.update_zoom(3), None);
        assert!(matches!(o.pan_tilt(1, 1), Err(BridgeError::NotFound(_))));
    }

    #[test]
    fn test_connect_index_out_of_range() {
        let o = orchestrator(52381, vec![entry("127.0.0.1", RED)]);
        assert!(matches!(o.connect_to_camera(1), Err(BridgeError::InvalidParameter(_))));
        assert_eq!(o.current_index(), 0);
    }

    #[test]
    fn test_failed_connect_keeps_index() {
        let good = FakeCamera::acking();
        let silent = UdpSocket::bind("127.0.0.1:0").unwrap();
        let silent_port = silent.local_addr().unwrap().port();

        let mut o = orchestrator(good.endpoint().port, vec![entry("127.0.0.1", RED)]);
        o.connect_to_camera(0).unwrap();

        // second roster entry points at a port nobody answers on
        o.camera_port = silent_port;
        o.link_config.require_handshake_reply = true;
        o.add_camera(entry("127.0.0.1", GREEN)).unwrap();

        assert!(matches!(o.connect_to_camera(1), Err(BridgeError::ConnectionFault(_))));
        assert_eq!(o.current_index(), 0);
        assert!(!o.is_connected());
    }

    #[test]
    fn test_roster_bounds() {
        let o = orchestrator(52381, Vec::new());
        for i in 0..MAX_CAMERAS {
            o.add_camera(entry(&format!("10.0.0.{i}"), BLUE)).unwrap();
        }
        assert!(matches!(
            o.add_camera(entry("10.0.0.99", BLUE)),
            Err(BridgeError::InvalidParameter(_))
        ));
        assert!(matches!(o.remove_camera(15), Err(BridgeError::NotFound(_))));
        assert!(matches!(
            o.update_camera(20, entry("10.0.0.1", RED)),
            Err(BridgeError::NotFound(_))
        ));
        assert!(matches!(
            o.update_auto_tracking_command(15, 1.0, 1.0),
            Err(BridgeError::NotFound(_))
        ));
    }

    #[test]
    fn test_remove_shifts_current_and_tracking() {
        let o = orchestrator(52381, vec![entry("a", RED), entry("b", GREEN), entry("c", BLUE)]);
        o.current.store(2, Ordering::SeqCst);
        o.update_auto_tracking_command(2, 1.0, 2.0).unwrap();
        o.update_auto_tracking_command(0, 5.0, 5.0).unwrap();

        let removed = o.remove_camera(0).unwrap();
        assert_eq!(removed.ip, "a");
        assert_eq!(o.current_index(), 1);
        assert_eq!(o.get_current_camera().unwrap().1.ip, "c");

        let status = o.autotrack_status();
        assert_eq!(status.auto_tracking_commands.len(), 1);
        assert_eq!(status.auto_tracking_commands[&1].tilt_speed, 2.0);
    }

    #[test]
    fn test_led_rendering() {
        let o = orchestrator(52381, vec![entry("a", [200, 100, 10]), entry("b", [100, 250, 0])]);
        o.update_leds();

        let grid = o.get_led_status();
        assert_eq!(grid[0][0], [200, 100, 10]);
        assert_eq!(grid[0][1], [30, 75, 0]);
        assert_eq!(grid[0][2], [0, 0, 0]);
        assert_eq!(grid[3][4], GREEN);
        assert_eq!(grid[3][2], [140, 70, 7]);
        assert_eq!(grid[3][3], PRESET_IDLE);
    }

    #[test]
    fn test_led_redraw_is_never_half_drawn() {
        let o = Arc::new(orchestrator(52381, vec![entry("a", [200, 100, 10])]));
        o.update_leds();

        let watcher = {
            let o = o.clone();
            std::thread::spawn(move || {
                (0..2000).all(|_| {
                    let grid = o.get_led_status();
                    grid[0][0] == [200, 100, 10] && grid[3][4] == GREEN
                })
            })
        };
        for _ in 0..500 {
            o.update_leds();
        }
        assert!(watcher.join().unwrap());
    }

    #[test]
    fn test_autotrack_status_serializes() {
        let o = orchestrator(52381, vec![entry("a", RED)]);
        assert!(o.toggle_autotrack());
        o.update_auto_tracking_command(0, 1.5, -0.5).unwrap();

        let json = serde_json::to_value(o.autotrack_status()).unwrap();
        assert_eq!(json["auto_tracking_active"], true);
        assert_eq!(json["auto_tracking_commands"]["0"]["pan_speed"], 1.5);
        assert!(!o.toggle_autotrack());
    }

    #[test]
    fn test_dispatcher_routes_collaborator_commands() {
        let camera = FakeCamera::acking();
        let o = Arc::new(orchestrator(camera.endpoint().port, vec![entry("127.0.0.1", RED)]));
        o.connect_to_camera(0).unwrap();
        let before = camera.command_payloads().len();

        o.start_dispatcher(100, 8).unwrap();
        o.recall_preset(3).unwrap();
        assert_eq!(o.send_frame(&commands::pantilt_home()).unwrap(), None);

        // range errors are reported at once and never queued
        assert!(matches!(o.pan_tilt(30, 0), Err(BridgeError::InvalidParameter(_))));
        assert!(matches!(o.save_preset(16), Err(BridgeError::InvalidParameter(_))));

        o.stop_dispatcher();
        let sent = camera.command_payloads()[before..].to_vec();
        assert_eq!(
            sent,
            vec![
                vec![0x81, 0x01, 0x04, 0x3F, 0x02, 0x03, 0xFF],
                vec![0x81, 0x01, 0x06, 0x04, 0xFF],
            ]
        );

        // direct again once stopped
        assert!(o.send_frame(&commands::pantilt_home()).unwrap().is_some());
    }

    #[test]
    fn test_dispatcher_rate_limits_commands() {
        let camera = FakeCamera::acking();
        let o = Arc::new(orchestrator(camera.endpoint().port, vec![entry("127.0.0.1", RED)]));
        o.connect_to_camera(0).unwrap();

        o.start_dispatcher(20, 8).unwrap();
        let start = std::time::Instant::now();
        for preset in 0..3 {
            o.recall_preset(preset).unwrap();
        }
        // queued, not sent yet
        assert!(start.elapsed() < Duration::from_millis(50));
        o.stop_dispatcher();
        // three jobs at 20/s are two 50ms gaps apart
        assert!(start.elapsed() >= Duration::from_millis(90));
    }

    #[test]
    fn test_preset_from_panel_sends_next_slot() {
        let camera = FakeCamera::acking();
        let o = orchestrator(camera.endpoint().port, vec![entry("127.0.0.1", RED)]);
        o.connect_to_camera(0).unwrap();

        o.recall_preset_from_panel(6);
        let last = camera.command_payloads().last().cloned().unwrap();
        assert_eq!(last, vec![0x81, 0x01, 0x04, 0x3F, 0x02, 0x07, 0xFF]);
        assert_eq!(o.get_led_status()[1][1], YELLOW);

        o.save_preset_from_panel(14);
        let last = camera.command_payloads().last().cloned().unwrap();
        assert_eq!(last, vec![0x81, 0x01, 0x04, 0x3F, 0x01, 0x0F, 0xFF]);
    }
}
