/*!
Configuration management for the PTZ bridge.
*/

use anyhow::{Context, Result};
use ptz_shared::protocol::{MAX_CAMERAS, PANEL_BAUD_RATE, VISCA_PORT};
use ptz_shared::Rgb;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::camera::LinkConfig;
use crate::input::{DecoderConfig, ModifierBehavior};
use crate::retry::RetryPolicy;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub serial: SerialConfig,
    #[serde(default)]
    pub camera: CameraConfig,
    #[serde(default)]
    pub panel: PanelConfig,
    #[serde(default)]
    pub cameras: Vec<CameraEntry>,
}

impl AppConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self {
            serial: SerialConfig::default(),
            camera: CameraConfig::default(),
            panel: PanelConfig::default(),
            cameras: Vec::new(),
        }
    }

    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: AppConfig =
            toml::from_str(&content).with_context(|| "Failed to parse config file as TOML")?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content =
            toml::to_string_pretty(self).with_context(|| "Failed to serialize config to TOML")?;

        std::fs::write(path.as_ref(), content)
            .with_context(|| format!("Failed to write config file: {}", path.as_ref().display()))?;

        Ok(())
    }

    /// Reject rosters the panel cannot address and timings the loops
    /// cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.cameras.len() > MAX_CAMERAS {
            anyhow::bail!(
                "{} cameras configured, the panel supports at most {}",
                self.cameras.len(),
                MAX_CAMERAS
            );
        }
        if let Some(entry) = self.cameras.iter().find(|c| c.ip.trim().is_empty()) {
            anyhow::bail!("camera entry with empty address: {:?}", entry);
        }

        if self.camera.receive_timeout_ms == 0 {
            anyhow::bail!("camera.receive_timeout_ms must be at least 1");
        }
        if self.camera.retry_attempts == 0 {
            anyhow::bail!("camera.retry_attempts must be at least 1");
        }
        if self.serial.read_timeout_ms == 0 {
            anyhow::bail!("serial.read_timeout_ms must be at least 1");
        }

        let panel = &self.panel;
        if panel.deadzone < 0 {
            anyhow::bail!("panel.deadzone must not be negative, got {}", panel.deadzone);
        }
        if !panel.long_press_secs.is_finite() || panel.long_press_secs <= 0.0 {
            anyhow::bail!(
                "panel.long_press_secs must be a positive number of seconds, got {}",
                panel.long_press_secs
            );
        }
        for (name, value) in [
            ("control_interval_ms", panel.control_interval_ms),
            ("led_refresh_ms", panel.led_refresh_ms),
            ("animation_tick_ms", panel.animation_tick_ms),
        ] {
            if value == 0 {
                anyhow::bail!("panel.{} must be at least 1", name);
            }
        }
        Ok(())
    }

    /// An example configuration with a two-camera roster
    pub fn example() -> Self {
        Self {
            cameras: vec![
                CameraEntry {
                    ip: "192.168.0.101".to_string(),
                    color: [255, 0, 0],
                },
                CameraEntry {
                    ip: "192.168.0.102".to_string(),
                    color: [0, 255, 0],
                },
            ],
            ..Self::new()
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// One roster entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraEntry {
    /// Camera address or hostname
    pub ip: String,

    /// Key colour on the panel
    pub color: Rgb,
}

/// Panel serial device settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Device path; discovered automatically when unset
    pub device: Option<String>,

    /// Baud rate
    pub baud_rate: u32,

    /// Read timeout in milliseconds
    pub read_timeout_ms: u64,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            device: None,
            baud_rate: PANEL_BAUD_RATE,
            read_timeout_ms: 100,
        }
    }
}

/// Camera link settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Camera's VISCA port
    pub port: u16,

    /// Local control port to bind
    pub local_port: u16,

    /// Receive timeout in milliseconds
    pub receive_timeout_ms: u64,

    /// Attempts per command before giving up
    pub retry_attempts: u32,

    /// Pause between attempts in milliseconds
    pub retry_delay_ms: u64,

    /// Pause after a reconnect in milliseconds
    pub settle_ms: u64,

    /// Fail connect when the handshake goes unanswered
    pub require_handshake_reply: bool,

    /// Rate limit for queued commands per second; 0 disables the queue
    pub max_command_rate: u32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            port: VISCA_PORT,
            local_port: VISCA_PORT,
            receive_timeout_ms: 100,
            retry_attempts: 3,
            retry_delay_ms: 100,
            settle_ms: 500,
            require_handshake_reply: false,
            max_command_rate: 0,
        }
    }
}

impl CameraConfig {
    pub fn link_config(&self) -> LinkConfig {
        LinkConfig {
            local_port: self.local_port,
            receive_timeout: Duration::from_millis(self.receive_timeout_ms),
            retry: RetryPolicy::new(self.retry_attempts, Duration::from_millis(self.retry_delay_ms)),
            settle: Duration::from_millis(self.settle_ms),
            require_handshake_reply: self.require_handshake_reply,
        }
    }
}

/// Panel behaviour settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PanelConfig {
    /// Hold or toggle semantics for the mode keys
    pub modifier_behavior: ModifierBehavior,

    /// Joystick deadzone
    pub deadzone: i32,

    /// Home button hold time that requests a restart, in seconds
    pub long_press_secs: f64,

    /// Control loop poll interval in milliseconds
    pub control_interval_ms: u64,

    /// LED flush interval in milliseconds
    pub led_refresh_ms: u64,

    /// Animation tick interval in milliseconds
    pub animation_tick_ms: u64,
}

impl Default for PanelConfig {
    fn default() -> Self {
        Self {
            modifier_behavior: ModifierBehavior::Hold,
            deadzone: 1,
            long_press_secs: 5.0,
            control_interval_ms: 5,
            led_refresh_ms: 10,
            animation_tick_ms: 10,
        }
    }
}

impl PanelConfig {
    pub fn decoder_config(&self) -> Result<DecoderConfig> {
        let long_press = Duration::try_from_secs_f64(self.long_press_secs)
            .with_context(|| format!("Invalid long press time: {}", self.long_press_secs))?;
        Ok(DecoderConfig {
            modifier_behavior: self.modifier_behavior,
            deadzone: self.deadzone,
            long_press,
        })
    }
}
