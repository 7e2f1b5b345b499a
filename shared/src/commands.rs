/*!
Semantic VISCA command set.

Each builder validates its numeric inputs and returns a ready-to-send
[`CommandFrame`]. Validation happens here, before any socket is touched, so
an out-of-range request can never reach the wire.
*/

use serde::{Deserialize, Serialize};

use crate::visca::{from_nibbles, nibbles, CommandFrame, ViscaError};

/// Pan/tilt drive speed limit (magnitude)
pub const MAX_PANTILT_SPEED: i32 = 24;

/// Zoom and focus drive speed limit (magnitude)
pub const MAX_ZOOM_SPEED: i32 = 7;

/// Highest preset slot
pub const MAX_PRESET: i32 = 15;

/// Full-tele zoom position
pub const ZOOM_POSITION_MAX: u16 = 16384;

type Result<T> = std::result::Result<T, ViscaError>;

fn check_range(name: &str, value: i32, min: i32, max: i32) -> Result<()> {
    if value < min || value > max {
        return Err(ViscaError::invalid(format!(
            "{name} must be between {min} and {max} inclusive, got {value}"
        )));
    }
    Ok(())
}

fn on_off(on: bool) -> u8 {
    if on {
        0x02
    } else {
        0x03
    }
}

/// Direction byte for continuous pan/tilt: 01 negative, 02 positive, 03 stop
fn pantilt_direction(speed: i32) -> u8 {
    match speed.signum() {
        -1 => 0x01,
        1 => 0x02,
        _ => 0x03,
    }
}

/// `0p` style drive byte for zoom and focus: high nibble direction, low nibble speed
fn variable_drive(speed: i32) -> u8 {
    let direction: u8 = match speed.signum() {
        1 => 0x2,
        -1 => 0x3,
        _ => 0x0,
    };
    (direction << 4) | speed.unsigned_abs() as u8
}

/// Clears the camera's command sockets; sent after every handshake
pub fn interface_clear() -> CommandFrame {
    CommandFrame::command(vec![0x00, 0x01])
}

pub fn power(on: bool) -> CommandFrame {
    CommandFrame::command(vec![0x04, 0x00, on_off(on)])
}

pub fn info_display(on: bool) -> CommandFrame {
    CommandFrame::command(vec![0x7E, 0x08, 0x18, on_off(on)])
}

/// Continuous pan/tilt.
///
/// Speeds are -24..=24. Negative pan moves right, negative tilt moves down,
/// zero stops the axis.
pub fn pantilt_drive(pan_speed: i32, tilt_speed: i32) -> Result<CommandFrame> {
    check_range("pan_speed", pan_speed, -MAX_PANTILT_SPEED, MAX_PANTILT_SPEED)?;
    check_range("tilt_speed", tilt_speed, -MAX_PANTILT_SPEED, MAX_PANTILT_SPEED)?;

    Ok(CommandFrame::command(vec![
        0x06,
        0x01,
        pan_speed.unsigned_abs() as u8,
        tilt_speed.unsigned_abs() as u8,
        pantilt_direction(pan_speed),
        pantilt_direction(tilt_speed),
    ]))
}

/// Move to an absolute position, or by a relative offset.
///
/// Positions are signed with 0 at the centre of travel; the camera stops at
/// its mechanical limits rather than wrapping.
pub fn pantilt_position(
    pan_speed: i32,
    tilt_speed: i32,
    pan_position: i16,
    tilt_position: i16,
    relative: bool,
) -> Result<CommandFrame> {
    check_range("pan_speed", pan_speed, -MAX_PANTILT_SPEED, MAX_PANTILT_SPEED)?;
    check_range("tilt_speed", tilt_speed, -MAX_PANTILT_SPEED, MAX_PANTILT_SPEED)?;

    let mut opcode = vec![
        0x06,
        if relative { 0x03 } else { 0x02 },
        pan_speed.unsigned_abs() as u8,
        tilt_speed.unsigned_abs() as u8,
    ];
    opcode.extend_from_slice(&nibbles(pan_position as u16));
    opcode.extend_from_slice(&nibbles(tilt_position as u16));
    Ok(CommandFrame::command(opcode))
}

pub fn pantilt_home() -> CommandFrame {
    CommandFrame::command(vec![0x06, 0x04])
}

pub fn pantilt_reset() -> CommandFrame {
    CommandFrame::command(vec![0x06, 0x05])
}

/// Slow pan/tilt mode: `true` slows motion down for fine framing
pub fn slow_pantilt(slow: bool) -> CommandFrame {
    CommandFrame::command(vec![0x06, 0x44, on_off(slow)])
}

/// Continuous zoom: -7..=7, positive zooms in (tele), zero stops
pub fn zoom_drive(speed: i32) -> Result<CommandFrame> {
    check_range("zoom speed", speed, -MAX_ZOOM_SPEED, MAX_ZOOM_SPEED)?;
    Ok(CommandFrame::command(vec![0x04, 0x07, variable_drive(speed)]))
}

/// Zoom to an absolute position, 0.0 (wide) to 1.0 (tele)
pub fn zoom_to(position: f32) -> Result<CommandFrame> {
    if !(0.0..=1.0).contains(&position) {
        return Err(ViscaError::invalid(format!(
            "zoom position must be between 0.0 and 1.0, got {position}"
        )));
    }
    let value = (position * ZOOM_POSITION_MAX as f32).round() as u16;
    let mut opcode = vec![0x04, 0x47];
    opcode.extend_from_slice(&nibbles(value));
    Ok(CommandFrame::command(opcode))
}

pub fn digital_zoom(on: bool) -> CommandFrame {
    CommandFrame::command(vec![0x04, 0x06, on_off(on)])
}

/// Manual focus drive: -7..=7, positive focuses near
pub fn focus_drive(speed: i32) -> Result<CommandFrame> {
    check_range("focus speed", speed, -MAX_ZOOM_SPEED, MAX_ZOOM_SPEED)?;
    Ok(CommandFrame::command(vec![0x04, 0x08, variable_drive(speed)]))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FocusMode {
    Auto,
    Manual,
    AutoManual,
    OnePushTrigger,
    Infinity,
}

pub fn focus_mode(mode: FocusMode) -> CommandFrame {
    let tail: [u8; 2] = match mode {
        FocusMode::Auto => [0x38, 0x02],
        FocusMode::Manual => [0x38, 0x03],
        FocusMode::AutoManual => [0x38, 0x10],
        FocusMode::OnePushTrigger => [0x18, 0x01],
        FocusMode::Infinity => [0x18, 0x02],
    };
    CommandFrame::command(vec![0x04, tail[0], tail[1]])
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutofocusMode {
    Normal,
    Interval,
    ZoomTrigger,
}

pub fn autofocus_mode(mode: AutofocusMode) -> CommandFrame {
    let value = match mode {
        AutofocusMode::Normal => 0x00,
        AutofocusMode::Interval => 0x01,
        AutofocusMode::ZoomTrigger => 0x02,
    };
    CommandFrame::command(vec![0x04, 0x57, value])
}

/// Interval autofocus timing, both values in seconds (1..=255)
pub fn autofocus_interval(active_secs: i32, interval_secs: i32) -> Result<CommandFrame> {
    check_range("autofocus active time", active_secs, 1, 255)?;
    check_range("autofocus interval time", interval_secs, 1, 255)?;
    Ok(CommandFrame::command(vec![
        0x04,
        0x27,
        active_secs as u8,
        interval_secs as u8,
    ]))
}

pub fn autofocus_sensitivity_low(low: bool) -> CommandFrame {
    CommandFrame::command(vec![0x04, 0x58, if low { 0x03 } else { 0x02 }])
}

pub fn ir_correction(on: bool) -> CommandFrame {
    CommandFrame::command(vec![0x04, 0x11, if on { 0x01 } else { 0x00 }])
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WhiteBalanceMode {
    Auto,
    Indoor,
    Outdoor,
    OnePush,
    AutoTracing,
    Manual,
    ColorTemperature,
    OnePushTrigger,
}

pub fn white_balance_mode(mode: WhiteBalanceMode) -> CommandFrame {
    let tail: [u8; 2] = match mode {
        WhiteBalanceMode::Auto => [0x35, 0x00],
        WhiteBalanceMode::Indoor => [0x35, 0x01],
        WhiteBalanceMode::Outdoor => [0x35, 0x02],
        WhiteBalanceMode::OnePush => [0x35, 0x03],
        WhiteBalanceMode::AutoTracing => [0x35, 0x04],
        WhiteBalanceMode::Manual => [0x35, 0x05],
        WhiteBalanceMode::ColorTemperature => [0x35, 0x20],
        WhiteBalanceMode::OnePushTrigger => [0x10, 0x05],
    };
    CommandFrame::command(vec![0x04, tail[0], tail[1]])
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutoExposureMode {
    Auto,
    Manual,
    ShutterPriority,
    IrisPriority,
    Bright,
}

pub fn auto_exposure_mode(mode: AutoExposureMode) -> CommandFrame {
    let value = match mode {
        AutoExposureMode::Auto => 0x00,
        AutoExposureMode::Manual => 0x03,
        AutoExposureMode::ShutterPriority => 0x0A,
        AutoExposureMode::IrisPriority => 0x0B,
        AutoExposureMode::Bright => 0x0D,
    };
    CommandFrame::command(vec![0x04, 0x39, value])
}

/// Image controls that accept an absolute level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Level {
    RedGain,
    BlueGain,
    ColorTemperature,
    Gain,
    Shutter,
    Iris,
    Brightness,
    Aperture,
}

impl Level {
    /// Opcode prefix and inclusive maximum
    fn layout(self) -> (&'static [u8], i32) {
        match self {
            Level::RedGain => (&[0x04, 0x43, 0x00, 0x00], 255),
            Level::BlueGain => (&[0x04, 0x44, 0x00, 0x00], 255),
            Level::ColorTemperature => (&[0x04, 0x43, 0x00, 0x20], 255),
            Level::Gain => (&[0x04, 0x4C, 0x00, 0x00], 255),
            Level::Shutter => (&[0x04, 0x4A, 0x00], 21),
            Level::Iris => (&[0x04, 0x4B, 0x00, 0x00], 17),
            Level::Brightness => (&[0x04, 0x4D, 0x00, 0x00], 255),
            Level::Aperture => (&[0x04, 0x42, 0x00, 0x00], 255),
        }
    }
}

pub fn set_level(level: Level, value: i32) -> Result<CommandFrame> {
    let (prefix, max) = level.layout();
    check_range(&format!("{level:?}"), value, 0, max)?;
    let mut opcode = prefix.to_vec();
    opcode.push(value as u8);
    Ok(CommandFrame::command(opcode))
}

/// Image controls that accept up/down/reset steps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Adjustable {
    RedGain,
    BlueGain,
    ColorTemperature,
    Gain,
    Shutter,
    Iris,
    Brightness,
    Aperture,
    ExposureCompensation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Reset,
    Up,
    Down,
}

pub fn step(control: Adjustable, direction: Step) -> CommandFrame {
    let register = match control {
        Adjustable::RedGain => 0x03,
        Adjustable::BlueGain => 0x04,
        Adjustable::ColorTemperature => 0x20,
        Adjustable::Gain => 0x0C,
        Adjustable::Shutter => 0x0A,
        Adjustable::Iris => 0x0B,
        Adjustable::Brightness => 0x0D,
        Adjustable::Aperture => 0x02,
        Adjustable::ExposureCompensation => 0x0E,
    };
    let value = match direction {
        Step::Reset => 0x00,
        Step::Up => 0x02,
        Step::Down => 0x03,
    };
    CommandFrame::command(vec![0x04, register, value])
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorChannel {
    Master,
    Magenta,
    Red,
    Yellow,
    Green,
    Cyan,
    Blue,
}

/// Per-channel colour gain, 0..=15 (camera default 4)
pub fn color_gain(channel: ColorChannel, gain: i32) -> Result<CommandFrame> {
    check_range("color gain", gain, 0, 15)?;
    Ok(CommandFrame::command(vec![
        0x04,
        0x49,
        0x00,
        0x00,
        channel as u8,
        gain as u8,
    ]))
}

pub fn slow_shutter(on: bool) -> CommandFrame {
    CommandFrame::command(vec![0x04, 0x5A, on_off(on)])
}

pub fn backlight(on: bool) -> CommandFrame {
    CommandFrame::command(vec![0x04, 0x33, on_off(on)])
}

pub fn flip_horizontal(on: bool) -> CommandFrame {
    CommandFrame::command(vec![0x04, 0x61, on_off(on)])
}

pub fn flip_vertical(on: bool) -> CommandFrame {
    CommandFrame::command(vec![0x04, 0x66, on_off(on)])
}

pub fn flip(horizontal: bool, vertical: bool) -> CommandFrame {
    let value = match (horizontal, vertical) {
        (true, true) => 0x03,
        (false, true) => 0x02,
        (true, false) => 0x01,
        (false, false) => 0x00,
    };
    CommandFrame::command(vec![0x04, 0xA4, value])
}

/// Defog; not every model supports it
pub fn defog(on: bool) -> CommandFrame {
    CommandFrame::command(vec![0x04, 0x37, on_off(on), 0x00])
}

pub fn save_preset(preset: i32) -> Result<CommandFrame> {
    check_range("preset", preset, 0, MAX_PRESET)?;
    Ok(CommandFrame::command(vec![0x04, 0x3F, 0x01, preset as u8]))
}

pub fn recall_preset(preset: i32) -> Result<CommandFrame> {
    check_range("preset", preset, 0, MAX_PRESET)?;
    Ok(CommandFrame::command(vec![0x04, 0x3F, 0x02, preset as u8]))
}

pub fn pantilt_position_inquiry() -> CommandFrame {
    CommandFrame::query(vec![0x06, 0x12])
}

pub fn zoom_position_inquiry() -> CommandFrame {
    CommandFrame::query(vec![0x04, 0x47])
}

pub fn focus_mode_inquiry() -> CommandFrame {
    CommandFrame::query(vec![0x04, 0x38])
}

fn short_reply(body: &[u8]) -> ViscaError {
    ViscaError::TruncatedResponse(body.len())
}

/// Decode a pan/tilt position answer body (`50 0p 0p 0p 0p 0t 0t 0t 0t`)
pub fn parse_pantilt_position(body: &[u8]) -> Result<(i32, i32)> {
    let pan = body.get(1..5).ok_or_else(|| short_reply(body))?;
    let tilt = body.get(5..9).ok_or_else(|| short_reply(body))?;
    Ok((from_nibbles(pan, true) as i32, from_nibbles(tilt, true) as i32))
}

/// Decode a zoom position answer body (`50 0p 0p 0p 0p`)
pub fn parse_zoom_position(body: &[u8]) -> Result<u32> {
    let digits = body.get(1..).filter(|d| !d.is_empty()).ok_or_else(|| short_reply(body))?;
    Ok(from_nibbles(digits, false) as u32)
}

/// Decode a focus mode answer body; only auto and manual are reported
pub fn parse_focus_mode(body: &[u8]) -> Result<FocusMode> {
    match body.last() {
        Some(0x02) => Ok(FocusMode::Auto),
        Some(0x03) => Ok(FocusMode::Manual),
        Some(other) => Err(ViscaError::invalid(format!("unknown focus mode {other:#04x}"))),
        None => Err(short_reply(body)),
    }
}
