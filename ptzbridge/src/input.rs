/*!
Panel input decoding and mode state machine.

The serial-read thread owns an [`InputDecoder`] and is the only writer of
[`PanelState`]. The control loop reads axis values directly and consumes
edge flags with the `take_*` methods, each of which clears its flag.
*/

use ptz_shared::commands::{MAX_PANTILT_SPEED, MAX_ZOOM_SPEED};
use ptz_shared::panel::{key_index, PacketError, GRID_COLUMNS, GRID_ROWS};
use ptz_shared::{apply_deadzone, Axis, PanelPacket};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Holding this key enters camera-select mode
pub const CAMERA_SELECT_KEY: (usize, usize) = (3, 2);

/// Holding this key enters preset-setting mode
pub const PRESET_KEY: (usize, usize) = (3, 3);

/// Each press flips the vertical lock
pub const VERTICAL_LOCK_KEY: (usize, usize) = (3, 4);

/// How the two mode keys behave
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModifierBehavior {
    /// Mode is active while the key is held
    #[default]
    Hold,
    /// Each press flips the mode; releases are ignored
    Toggle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Mode {
    Normal,
    CameraSelect,
    PresetSetting,
}

#[derive(Debug, Clone)]
pub struct DecoderConfig {
    pub modifier_behavior: ModifierBehavior,
    pub deadzone: i32,
    /// Home held at least this long requests a restart
    pub long_press: Duration,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            modifier_behavior: ModifierBehavior::Hold,
            deadzone: 1,
            long_press: Duration::from_secs(5),
        }
    }
}

/// Latest panel input, shared lock-free between the reader and the control loop
#[derive(Debug, Default)]
pub struct PanelState {
    pan: AtomicI32,
    tilt: AtomicI32,
    zoom: AtomicI32,
    buttons: [[AtomicBool; GRID_ROWS]; GRID_COLUMNS],
    camera_select: AtomicBool,
    preset_setting: AtomicBool,
    vertical_lock: AtomicBool,
    vertical_lock_changed: AtomicBool,
    camera_changed: AtomicBool,
    selected_camera: AtomicUsize,
    set_preset: AtomicBool,
    recall_preset: AtomicBool,
    preset_number: AtomicUsize,
    home_short_release: AtomicBool,
    restart_requested: AtomicBool,
}

impl PanelState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pan(&self) -> i32 {
        self.pan.load(Ordering::SeqCst)
    }

    /// Tilt as published; always 0 while the vertical lock is on
    pub fn tilt(&self) -> i32 {
        self.tilt.load(Ordering::SeqCst)
    }

    pub fn zoom(&self) -> i32 {
        self.zoom.load(Ordering::SeqCst)
    }

    pub fn button(&self, x: usize, y: usize) -> bool {
        self.buttons
            .get(x)
            .and_then(|column| column.get(y))
            .is_some_and(|b| b.load(Ordering::SeqCst))
    }

    pub fn mode(&self) -> Mode {
        if self.camera_select.load(Ordering::SeqCst) {
            Mode::CameraSelect
        } else if self.preset_setting.load(Ordering::SeqCst) {
            Mode::PresetSetting
        } else {
            Mode::Normal
        }
    }

    pub fn camera_select(&self) -> bool {
        self.camera_select.load(Ordering::SeqCst)
    }

    pub fn preset_setting(&self) -> bool {
        self.preset_setting.load(Ordering::SeqCst)
    }

    pub fn vertical_lock(&self) -> bool {
        self.vertical_lock.load(Ordering::SeqCst)
    }

    pub fn take_vertical_lock_changed(&self) -> bool {
        self.vertical_lock_changed.swap(false, Ordering::SeqCst)
    }

    /// Newly selected roster index, if a selection happened since the last call
    pub fn take_camera_changed(&self) -> Option<usize> {
        self.camera_changed
            .swap(false, Ordering::SeqCst)
            .then(|| self.selected_camera.load(Ordering::SeqCst))
    }

    /// Key number (0-based) to store a preset under
    pub fn take_set_preset(&self) -> Option<usize> {
        self.set_preset
            .swap(false, Ordering::SeqCst)
            .then(|| self.preset_number.load(Ordering::SeqCst))
    }

    /// Key number (0-based) to recall
    pub fn take_recall_preset(&self) -> Option<usize> {
        self.recall_preset
            .swap(false, Ordering::SeqCst)
            .then(|| self.preset_number.load(Ordering::SeqCst))
    }

    pub fn take_home_short_release(&self) -> bool {
        self.home_short_release.swap(false, Ordering::SeqCst)
    }

    /// Not consumed: once requested a restart stays requested
    pub fn restart_requested(&self) -> bool {
        self.restart_requested.load(Ordering::SeqCst)
    }

    fn enter_mode(&self, mode: Mode, on: bool) {
        let (flag, other) = match mode {
            Mode::CameraSelect => (&self.camera_select, &self.preset_setting),
            Mode::PresetSetting => (&self.preset_setting, &self.camera_select),
            Mode::Normal => {
                self.camera_select.store(false, Ordering::SeqCst);
                self.preset_setting.store(false, Ordering::SeqCst);
                return;
            }
        };
        // clear the other mode first so both are never observed on together
        if on {
            other.store(false, Ordering::SeqCst);
        }
        flag.store(on, Ordering::SeqCst);
    }
}

/// Turns panel records into [`PanelState`] updates
pub struct InputDecoder {
    state: Arc<PanelState>,
    config: DecoderConfig,
    raw_tilt: i32,
    home_pressed_at: Option<Instant>,
}

impl InputDecoder {
    pub fn new(state: Arc<PanelState>, config: DecoderConfig) -> Self {
        Self {
            state,
            config,
            raw_tilt: 0,
            home_pressed_at: None,
        }
    }

    pub fn state(&self) -> &Arc<PanelState> {
        &self.state
    }

    /// Parse and apply one serial line
    pub fn handle_line(&mut self, line: &str, now: Instant, roster_len: usize) -> Result<(), PacketError> {
        let packet = PanelPacket::parse(line)?;
        self.handle(packet, now, roster_len);
        Ok(())
    }

    pub fn handle(&mut self, packet: PanelPacket, now: Instant, roster_len: usize) {
        match packet {
            PanelPacket::Axis { axis, value } => self.axis(axis, value),
            PanelPacket::Home { pressed: true } => {
                self.home_pressed_at = Some(now);
            }
            PanelPacket::Home { pressed: false } => self.home_released(now),
            PanelPacket::Button { x, y, pressed } => self.button(x, y, pressed, roster_len),
        }
    }

    fn axis(&mut self, axis: Axis, value: i32) {
        let value = apply_deadzone(value, self.config.deadzone);
        match axis {
            Axis::Pan => {
                let pan = value.clamp(-MAX_PANTILT_SPEED, MAX_PANTILT_SPEED);
                self.state.pan.store(pan, Ordering::SeqCst);
            }
            Axis::Tilt => {
                self.raw_tilt = value.clamp(-MAX_PANTILT_SPEED, MAX_PANTILT_SPEED);
                self.publish_tilt();
            }
            Axis::Zoom => {
                let zoom = value.clamp(-MAX_ZOOM_SPEED, MAX_ZOOM_SPEED);
                self.state.zoom.store(zoom, Ordering::SeqCst);
            }
        }
    }

    fn publish_tilt(&self) {
        let tilt = if self.state.vertical_lock() { 0 } else { self.raw_tilt };
        self.state.tilt.store(tilt, Ordering::SeqCst);
    }

    fn home_released(&mut self, now: Instant) {
        let Some(pressed_at) = self.home_pressed_at.take() else {
            return;
        };
        let held = now.saturating_duration_since(pressed_at);
        if held >= self.config.long_press {
            info!("Home held for {:.1}s, restart requested", held.as_secs_f32());
            self.state.restart_requested.store(true, Ordering::SeqCst);
        } else {
            self.state.home_short_release.store(true, Ordering::SeqCst);
        }
    }

    fn button(&mut self, x: usize, y: usize, pressed: bool, roster_len: usize) {
        let was_pressed = self.state.buttons[x][y].swap(pressed, Ordering::SeqCst);

        match (x, y) {
            CAMERA_SELECT_KEY => self.modifier(Mode::CameraSelect, pressed, was_pressed),
            PRESET_KEY => self.modifier(Mode::PresetSetting, pressed, was_pressed),
            VERTICAL_LOCK_KEY => {
                if pressed && !was_pressed {
                    let locked = !self.state.vertical_lock();
                    self.state.vertical_lock.store(locked, Ordering::SeqCst);
                    self.publish_tilt();
                    self.state.vertical_lock_changed.store(true, Ordering::SeqCst);
                    debug!("Vertical lock {}", if locked { "on" } else { "off" });
                }
            }
            (x, y) if x <= 2 && pressed => self.select(key_index(x, y), roster_len),
            _ => {}
        }
    }

    fn modifier(&mut self, mode: Mode, pressed: bool, was_pressed: bool) {
        let on = match self.config.modifier_behavior {
            ModifierBehavior::Hold => pressed,
            ModifierBehavior::Toggle if pressed && !was_pressed => self.state.mode() != mode,
            ModifierBehavior::Toggle => return,
        };
        self.state.enter_mode(mode, on);
        debug!("Mode now {:?}", self.state.mode());
    }

    fn select(&mut self, index: usize, roster_len: usize) {
        match self.state.mode() {
            Mode::CameraSelect => {
                if index < roster_len {
                    self.state.selected_camera.store(index, Ordering::SeqCst);
                    self.state.camera_changed.store(true, Ordering::SeqCst);
                    debug!("Camera {} selected", index);
                } else {
                    debug!("Key {} has no camera ({} configured)", index, roster_len);
                }
            }
            Mode::PresetSetting => {
                self.state.preset_number.store(index, Ordering::SeqCst);
                self.state.set_preset.store(true, Ordering::SeqCst);
            }
            Mode::Normal => {
                self.state.preset_number.store(index, Ordering::SeqCst);
                self.state.recall_preset.store(true, Ordering::SeqCst);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decoder(behavior: ModifierBehavior) -> InputDecoder {
        let config = DecoderConfig {
            modifier_behavior: behavior,
            ..DecoderConfig::default()
        };
        InputDecoder::new(Arc::new(PanelState::new()), config)
    }

    fn feed(decoder: &mut InputDecoder, lines: &[&str]) {
        let now = Instant::now();
        for line in lines {
            decoder.handle_line(line, now, 4).unwrap();
        }
    }

    #[test]
    fn test_axis_deadzone_and_clamp() {
        let mut d = decoder(ModifierBehavior::Hold);
        feed(&mut d, &["1,1", "0,-1", "2,5"]);
        assert_eq!((d.state().pan(), d.state().tilt(), d.state().zoom()), (0, 0, 4));

        feed(&mut d, &["1,-30", "0,12", "2,-20"]);
        assert_eq!(d.state().pan(), -24);
        assert_eq!(d.state().tilt(), 11);
        assert_eq!(d.state().zoom(), -7);
    }

    #[test]
    fn test_hold_modifiers_are_exclusive() {
        let mut d = decoder(ModifierBehavior::Hold);
        let sequence = [
            "8,5,1", "7,5,1", "8,5,0", "7,5,0", "7,5,1", "8,5,1", "7,5,0", "8,5,0",
        ];
        for line in sequence {
            feed(&mut d, &[line]);
            assert!(!(d.state().camera_select() && d.state().preset_setting()), "after {line}");
        }
        assert_eq!(d.state().mode(), Mode::Normal);

        feed(&mut d, &["8,5,1"]);
        assert_eq!(d.state().mode(), Mode::CameraSelect);
        feed(&mut d, &["7,5,1"]);
        assert_eq!(d.state().mode(), Mode::PresetSetting);
        assert!(!d.state().camera_select());
    }

    #[test]
    fn test_toggle_modifiers_ignore_release() {
        let mut d = decoder(ModifierBehavior::Toggle);
        feed(&mut d, &["8,5,1", "8,5,0"]);
        assert_eq!(d.state().mode(), Mode::CameraSelect);

        feed(&mut d, &["7,5,1", "7,5,0"]);
        assert_eq!(d.state().mode(), Mode::PresetSetting);
        assert!(!d.state().camera_select());

        feed(&mut d, &["7,5,1"]);
        assert_eq!(d.state().mode(), Mode::Normal);
    }

    #[test]
    fn test_camera_select_respects_roster() {
        let mut d = decoder(ModifierBehavior::Hold);
        // (1, 0) -> index 5, roster of 4
        feed(&mut d, &["8,5,1", "10,3,1"]);
        assert_eq!(d.state().take_camera_changed(), None);

        // (0, 3) -> index 3
        feed(&mut d, &["7,2,1"]);
        assert_eq!(d.state().take_camera_changed(), Some(3));
        assert_eq!(d.state().take_camera_changed(), None);
    }

    #[test]
    fn test_preset_keys_by_mode() {
        let mut d = decoder(ModifierBehavior::Hold);
        // (2, 1) -> index 11
        feed(&mut d, &["9,4,1", "9,4,0"]);
        assert_eq!(d.state().take_recall_preset(), Some(11));
        assert_eq!(d.state().take_set_preset(), None);

        feed(&mut d, &["7,5,1", "9,4,1"]);
        assert_eq!(d.state().take_set_preset(), Some(11));
        assert_eq!(d.state().take_recall_preset(), None);
    }

    #[test]
    fn test_vertical_lock_on_press_edge_only() {
        let mut d = decoder(ModifierBehavior::Hold);
        feed(&mut d, &["0,10", "6,5,1"]);
        assert!(d.state().vertical_lock());
        assert!(d.state().take_vertical_lock_changed());
        assert_eq!(d.state().tilt(), 0);

        // repeated press without release and the release do nothing
        feed(&mut d, &["6,5,1", "6,5,0"]);
        assert!(d.state().vertical_lock());
        assert!(!d.state().take_vertical_lock_changed());

        feed(&mut d, &["0,-6", "6,5,1"]);
        assert_eq!(d.state().tilt(), -5);
        assert!(!d.state().vertical_lock());
    }

    #[test]
    fn test_home_long_and_short_press() {
        let mut d = decoder(ModifierBehavior::Hold);
        let start = Instant::now();

        d.handle_line("10,5,1", start, 0).unwrap();
        assert!(!d.state().take_home_short_release());
        d.handle_line("10,5,0", start + Duration::from_millis(4990), 0).unwrap();
        assert!(d.state().take_home_short_release());
        assert!(!d.state().restart_requested());

        d.handle_line("10,5,1", start, 0).unwrap();
        d.handle_line("10,5,0", start + Duration::from_secs(5), 0).unwrap();
        assert!(d.state().restart_requested());
        assert!(!d.state().take_home_short_release());
    }

    #[test]
    fn test_release_without_press_is_ignored() {
        let mut d = decoder(ModifierBehavior::Hold);
        feed(&mut d, &["10,5,0"]);
        assert!(!d.state().take_home_short_release());
        assert!(!d.state().restart_requested());
    }

    #[test]
    fn test_malformed_line_reported() {
        let mut d = decoder(ModifierBehavior::Hold);
        assert!(d.handle_line("x,y", Instant::now(), 1).is_err());
        assert!(d.handle_line("5,9,1", Instant::now(), 1).is_err());
    }
}
