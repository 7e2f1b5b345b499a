/*!
# Shared Types and Utilities

This crate contains the pure, I/O-free pieces of the PTZ control surface
bridge: the VISCA-over-IP wire codec, the semantic camera command set, and
the control panel's serial record format and LED geometry.

## Core Types

- [`CommandFrame`] - a command or inquiry ready to be sequenced and sent
- [`ResponseFrame`] - a decoded ACK or completion reply
- [`PanelPacket`] - one decoded record from the control panel
- [`BridgeError`] - error taxonomy shared by every component

## Modules

- [`visca`] - datagram framing and reply decoding
- [`commands`] - validated builders for every camera operation
- [`panel`] - panel record parsing, deadzone, grid and LUT
- [`error`] - common error types
*/

pub mod commands;
pub mod error;
pub mod panel;
pub mod visca;

// Re-export commonly used types
pub use error::{BridgeError, Result};
pub use panel::{apply_deadzone, Axis, Lut, PanelPacket, Rgb, DEFAULT_LUT};
pub use visca::{CommandFrame, ResponseFrame, ResponseKind, ViscaError};

/// Version information for the shared library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Protocol constants
pub mod protocol {
    /// Default VISCA-over-IP UDP port
    pub const VISCA_PORT: u16 = 52381;

    /// Panel serial baud rate
    pub const PANEL_BAUD_RATE: u32 = 2_000_000;

    /// Maximum number of cameras on the roster (one per selectable key)
    pub const MAX_CAMERAS: usize = crate::panel::SELECTABLE_KEYS;
}
