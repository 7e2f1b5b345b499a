/*!
# PTZ Bridge

Connects a serial button/joystick/LED control panel to networked PTZ
cameras speaking VISCA over IP.

## Features

- Joystick pan/tilt and rocker zoom with deadzone and optional auto-tracking
- Camera selection, preset recall and preset storage from the panel keys
- LED feedback with fades, vertical lock, and mode indicators
- Automatic reconnect when a camera stops answering
- One-shot camera commands for bench testing

## Usage

### Run the bridge (default)
```bash
ptzbridge --config ptzbridge.toml
```

### Generate a configuration file
```bash
ptzbridge config --output ptzbridge.toml
```

### Talk to one camera directly
```bash
ptzbridge camera 192.168.0.101 recall 3
```
*/

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use ptzbridge::animation::AnimationScheduler;
use ptzbridge::camera::{CameraEndpoint, CameraLink};
use ptzbridge::config::AppConfig;
use ptzbridge::control::{ControlLoop, LoopExit};
use ptzbridge::hardware::{self, PanelHardware};
use ptzbridge::input::{InputDecoder, PanelState};
use ptzbridge::leds::LedMatrix;
use ptzbridge::state::Orchestrator;

/// Queued commands waiting for the camera before new ones are rejected
const COMMAND_QUEUE_CAPACITY: usize = 64;

#[derive(Parser)]
#[command(name = "ptzbridge")]
#[command(about = "Serial control panel to VISCA-over-IP camera bridge")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Configuration file path
    #[arg(short, long, default_value = "ptzbridge.toml")]
    config: PathBuf,

    /// Debug logging (RUST_LOG overrides)
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the bridge
    Run {
        /// Panel serial device (overrides the config file)
        #[arg(short, long)]
        device: Option<String>,
    },

    /// Generate configuration file
    Config {
        /// Output path for configuration file
        #[arg(short, long, default_value = "ptzbridge.toml")]
        output: PathBuf,
    },

    /// Send one command to a camera and exit
    Camera {
        /// Camera address
        ip: String,

        /// Camera VISCA port
        #[arg(short, long, default_value_t = ptz_shared::protocol::VISCA_PORT)]
        port: u16,

        #[command(subcommand)]
        action: CameraAction,
    },
}

#[derive(Subcommand)]
enum CameraAction {
    /// Zoom out and centre pan/tilt
    Home,
    /// Recall a preset (0-15)
    Recall { preset: i32 },
    /// Store the current position as a preset (0-15)
    Save { preset: i32 },
    /// Switch the camera on or off
    Power {
        #[arg(value_enum)]
        state: Switch,
    },
    /// Stop pan, tilt and zoom
    Stop,
    /// Print pan/tilt and zoom positions
    Position,
}

#[derive(Clone, Copy, ValueEnum)]
enum Switch {
    On,
    Off,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so stdout stays clean for command output
    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    match cli.command.unwrap_or(Commands::Run { device: None }) {
        Commands::Run { device } => run_bridge(&cli.config, device),
        Commands::Config { output } => generate_config_file(output),
        Commands::Camera { ip, port, action } => run_camera_command(&cli.config, ip, port, action),
    }
}

/// Load the config file, or defaults if it does not exist
fn load_config(path: &Path) -> Result<AppConfig> {
    if path.exists() {
        AppConfig::load_from_file(path)
    } else {
        warn!("⚠️ Config file {} not found, using defaults", path.display());
        Ok(AppConfig::new())
    }
}

/// Run the bridge until Ctrl-C, a restart request, or a dead thread
fn run_bridge(config_path: &Path, device: Option<String>) -> Result<()> {
    let mut config = load_config(config_path)?;
    if device.is_some() {
        config.serial.device = device;
    }
    info!("🚀 Starting PTZ bridge with {} camera(s)", config.cameras.len());

    let serial = hardware::open_serial(&config.serial).context("Failed to open panel serial device")?;
    info!("🎛️ Panel connected on {}", serial.device);

    let leds = Arc::new(LedMatrix::new(Box::new(serial.writer)));
    let animations = Arc::new(AnimationScheduler::new(leds.clone()));
    let panel = Arc::new(PanelState::new());
    let orchestrator = Arc::new(Orchestrator::new(
        &config,
        leds.clone(),
        animations.clone(),
        panel.clone(),
    )?);

    let decoder = InputDecoder::new(panel, config.panel.decoder_config()?);
    let mut panel_threads = PanelHardware::start(
        Box::new(serial.reader),
        decoder,
        orchestrator.clone(),
        leds.clone(),
        animations,
        &config.panel,
    )
    .context("Failed to start panel threads")?;

    // Set up Ctrl+C handler
    let running = panel_threads.running_flag();
    {
        let running = running.clone();
        ctrlc::set_handler(move || {
            info!("🛑 Received Ctrl+C, shutting down gracefully...");
            running.store(false, std::sync::atomic::Ordering::SeqCst);
        })?;
    }

    match orchestrator.connect_first_available() {
        Ok(index) => info!("Connected to camera {}", index),
        Err(e) => warn!("{}; select a camera on the panel to retry", e),
    }
    orchestrator.update_leds();

    if config.camera.max_command_rate > 0 {
        orchestrator
            .start_dispatcher(config.camera.max_command_rate, COMMAND_QUEUE_CAPACITY)
            .context("Failed to start the command queue")?;
    }

    let mut control = ControlLoop::new(
        orchestrator.clone(),
        Duration::from_millis(config.panel.control_interval_ms),
    );
    let exit = control.run(&running, || panel_threads.threads_alive());

    info!("Shutting down...");
    orchestrator.stop_dispatcher();
    panel_threads.close();
    leds.clear_all();
    if let Err(e) = leds.show() {
        warn!("Could not blank the panel: {}", e);
    }
    orchestrator.disconnect();
    // serial device and camera port must be free before a restart reopens them
    leds.release();
    drop(control);
    drop(orchestrator);
    drop(leds);

    match exit {
        LoopExit::Shutdown => {
            info!("✅ Closed");
            Ok(())
        }
        LoopExit::Restart => restart_process(),
        LoopExit::ThreadCrashed => {
            error!("Panel thread crashed");
            anyhow::bail!("a panel thread exited unexpectedly")
        }
    }
}

/// Replace this process with a fresh copy of itself
#[cfg(unix)]
fn restart_process() -> Result<()> {
    use std::os::unix::process::CommandExt;

    let exe = std::env::current_exe().context("Cannot locate the running executable")?;
    info!("🔄 Restarting {}", exe.display());
    let err = std::process::Command::new(exe)
        .args(std::env::args_os().skip(1))
        .exec();
    Err(err).context("Failed to re-exec")
}

#[cfg(not(unix))]
fn restart_process() -> Result<()> {
    let exe = std::env::current_exe().context("Cannot locate the running executable")?;
    info!("🔄 Restarting {}", exe.display());
    std::process::Command::new(exe)
        .args(std::env::args_os().skip(1))
        .spawn()
        .context("Failed to start a new instance")?;
    std::process::exit(0)
}

/// Connect to one camera, run `action`, and report
fn run_camera_command(config_path: &Path, ip: String, port: u16, action: CameraAction) -> Result<()> {
    let config = load_config(config_path)?;
    let endpoint = CameraEndpoint::new(ip, port);
    let mut link = CameraLink::connect(endpoint.clone(), config.camera.link_config())
        .with_context(|| format!("Failed to connect to {}", endpoint))?;

    match action {
        CameraAction::Home => link.home()?,
        CameraAction::Recall { preset } => link.recall_preset(preset)?,
        CameraAction::Save { preset } => link.save_preset(preset)?,
        CameraAction::Power { state } => link.set_power(matches!(state, Switch::On))?,
        CameraAction::Stop => {
            link.pantilt(0, 0)?;
            link.zoom(0)?;
        }
        CameraAction::Position => {
            let (pan, tilt) = link.get_pantilt_position()?;
            let zoom = link.get_zoom_position()?;
            let focus = link.get_focus_mode()?;
            println!("pan={} tilt={} zoom={} focus={:?}", pan, tilt, zoom, focus);
        }
    }

    info!(
        "✅ Done ({} response(s) missed)",
        link.missed_responses()
    );
    Ok(())
}

/// Generate an example configuration file
fn generate_config_file(output_path: PathBuf) -> Result<()> {
    let config = AppConfig::example();
    config.save_to_file(&output_path)?;

    println!("✅ Generated configuration file: {}", output_path.display());
    println!("📝 Edit the camera roster, then run:");
    println!("   ptzbridge --config {}", output_path.display());

    Ok(())
}
