/*!
Control panel serial protocol and LED grid geometry.

The panel streams newline-delimited ASCII records:

- `0,<value>` tilt, `1,<value>` pan, `2,<value>` zoom
- `10,5,<0|1>` the home button
- `<row channel>,<column index>,<0|1>` any other key of the button matrix

Keys and LEDs share one logical 4x5 grid addressed as `(x, y)`.
*/

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Logical grid width (x)
pub const GRID_COLUMNS: usize = 4;

/// Logical grid height (y)
pub const GRID_ROWS: usize = 5;

/// Keys usable for camera or preset selection (`x <= 2`)
pub const SELECTABLE_KEYS: usize = 15;

/// Serial channel carrying the home button
pub const HOME_CHANNEL: i32 = 10;

/// Column index of the home button on [`HOME_CHANNEL`]
pub const HOME_INDEX: i32 = 5;

/// One LED colour
pub type Rgb = [u8; 3];

/// Logical `(x, y)` to physical wire position; `None` marks a cell with no LED
pub type Lut = [[Option<usize>; GRID_ROWS]; GRID_COLUMNS];

/// Wire order of the production panel. The chain runs right to left per
/// column and the last column has only three LEDs.
pub const DEFAULT_LUT: Lut = [
    [Some(4), Some(3), Some(2), Some(1), Some(0)],
    [Some(9), Some(8), Some(7), Some(6), Some(5)],
    [Some(14), Some(13), Some(12), Some(11), Some(10)],
    [None, None, Some(17), Some(16), Some(15)],
];

/// Joystick / rocker axes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Axis {
    Tilt,
    Pan,
    Zoom,
}

/// Errors that can occur while parsing a panel record
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PacketError {
    #[error("empty record")]
    Empty,

    #[error("malformed record: {0:?}")]
    Malformed(String),

    #[error("key outside the grid: channel {channel}, index {index}")]
    OutOfGrid { channel: i32, index: i32 },
}

/// One decoded panel record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanelPacket {
    Axis { axis: Axis, value: i32 },
    Home { pressed: bool },
    Button { x: usize, y: usize, pressed: bool },
}

impl PanelPacket {
    /// Parse one line (trailing `\r\n` allowed)
    pub fn parse(line: &str) -> Result<Self, PacketError> {
        let line = line.trim();
        if line.is_empty() {
            return Err(PacketError::Empty);
        }

        let fields = line
            .split(',')
            .map(|f| f.trim().parse::<i32>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| PacketError::Malformed(line.to_string()))?;

        let axis = match fields[0] {
            0 => Some(Axis::Tilt),
            1 => Some(Axis::Pan),
            2 => Some(Axis::Zoom),
            _ => None,
        };
        if let Some(axis) = axis {
            let value = *fields
                .get(1)
                .ok_or_else(|| PacketError::Malformed(line.to_string()))?;
            return Ok(Self::Axis { axis, value });
        }

        let [channel, index, value] = fields[..] else {
            return Err(PacketError::Malformed(line.to_string()));
        };
        let pressed = value != 0;

        if channel == HOME_CHANNEL && index == HOME_INDEX {
            return Ok(Self::Home { pressed });
        }

        let x = index - 2;
        let y = 4 - (channel - 6);
        if !(0..GRID_COLUMNS as i32).contains(&x) || !(0..GRID_ROWS as i32).contains(&y) {
            return Err(PacketError::OutOfGrid { channel, index });
        }

        Ok(Self::Button {
            x: x as usize,
            y: y as usize,
            pressed,
        })
    }
}

/// Subtract `deadzone` from the magnitude of `value`, keeping the sign.
/// Values inside the band map to 0.
pub fn apply_deadzone(value: i32, deadzone: i32) -> i32 {
    if value.abs() <= deadzone {
        0
    } else {
        value.signum() * (value.abs() - deadzone)
    }
}

/// Selection index of a key (`x * 5 + y`)
pub fn key_index(x: usize, y: usize) -> usize {
    x * GRID_ROWS + y
}

/// Grid position of a selection index
pub fn key_position(index: usize) -> (usize, usize) {
    (index / GRID_ROWS, index % GRID_ROWS)
}

/// Scale a colour by `factor`, truncating like the firmware expects
pub fn dim(color: Rgb, factor: f64) -> Rgb {
    color.map(|c| (f64::from(c) * factor) as u8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_axis_records() {
        assert_eq!(
            PanelPacket::parse("0,-12\r\n").unwrap(),
            PanelPacket::Axis { axis: Axis::Tilt, value: -12 }
        );
        assert_eq!(
            PanelPacket::parse("1,24").unwrap(),
            PanelPacket::Axis { axis: Axis::Pan, value: 24 }
        );
        assert_eq!(
            PanelPacket::parse("2,3").unwrap(),
            PanelPacket::Axis { axis: Axis::Zoom, value: 3 }
        );
    }

    #[test]
    fn test_home_and_button_records() {
        assert_eq!(PanelPacket::parse("10,5,1").unwrap(), PanelPacket::Home { pressed: true });
        assert_eq!(
            PanelPacket::parse("6,2,1").unwrap(),
            PanelPacket::Button { x: 0, y: 4, pressed: true }
        );
        assert_eq!(
            PanelPacket::parse("8,5,0").unwrap(),
            PanelPacket::Button { x: 3, y: 2, pressed: false }
        );
        assert_eq!(
            PanelPacket::parse("10,2,1").unwrap(),
            PanelPacket::Button { x: 0, y: 0, pressed: true }
        );
    }

    #[test]
    fn test_bad_records() {
        assert_eq!(PanelPacket::parse("  \r\n"), Err(PacketError::Empty));
        assert!(matches!(PanelPacket::parse("abc"), Err(PacketError::Malformed(_))));
        assert!(matches!(PanelPacket::parse("0"), Err(PacketError::Malformed(_))));
        assert!(matches!(PanelPacket::parse("7,3"), Err(PacketError::Malformed(_))));
        assert_eq!(
            PanelPacket::parse("5,2,1"),
            Err(PacketError::OutOfGrid { channel: 5, index: 2 })
        );
        assert_eq!(
            PanelPacket::parse("6,9,1"),
            Err(PacketError::OutOfGrid { channel: 6, index: 9 })
        );
    }

    #[test]
    fn test_deadzone() {
        assert_eq!(apply_deadzone(-1, 1), 0);
        assert_eq!(apply_deadzone(0, 1), 0);
        assert_eq!(apply_deadzone(1, 1), 0);
        assert_eq!(apply_deadzone(2, 1), 1);
        assert_eq!(apply_deadzone(-2, 1), -1);
        assert_eq!(apply_deadzone(24, 1), 23);
    }

    #[test]
    fn test_key_index_roundtrip() {
        assert_eq!(key_index(2, 4), 14);
        assert_eq!(key_position(7), (1, 2));
    }

    #[test]
    fn test_default_lut_is_dense() {
        let mut seen: Vec<usize> = DEFAULT_LUT.iter().flatten().flatten().copied().collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..18).collect::<Vec<_>>());
    }
}
