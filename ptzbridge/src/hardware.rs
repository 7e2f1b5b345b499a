/*!
Panel hardware: serial device discovery and the background threads.

Three threads share one running flag:
1. Serial reader: panel records -> [`InputDecoder`] -> [`PanelState`]
2. LED refresh: flushes the LED grid at a fixed rate
3. Animation tick: advances running fades
*/

use ptz_shared::{BridgeError, Result};
use serialport::SerialPort;
use std::io::{self, BufRead, BufReader, Read};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::animation::AnimationScheduler;
use crate::config::{PanelConfig, SerialConfig};
use crate::input::InputDecoder;
use crate::leds::LedMatrix;
use crate::state::Orchestrator;

/// Device name prefixes in order of preference
const DEVICE_PREFIXES: &[&str] = &["/dev/ttyUSB", "/dev/cu.usbserial", "/dev/ttyACM", "/dev/serial0"];

/// Pause after a failed or empty serial read
const READ_RETRY_PAUSE: Duration = Duration::from_millis(10);

/// Pick the preferred panel device among `names`
pub fn pick_device<S: AsRef<str>>(names: &[S]) -> Option<String> {
    DEVICE_PREFIXES.iter().find_map(|prefix| {
        names
            .iter()
            .map(|name| name.as_ref())
            .filter(|name| name.starts_with(prefix))
            .min()
            .map(str::to_string)
    })
}

/// Find the panel among the system's serial ports
pub fn discover_serial_device() -> Result<String> {
    let mut names: Vec<String> = match serialport::available_ports() {
        Ok(ports) => ports.into_iter().map(|p| p.port_name).collect(),
        Err(e) => {
            warn!("Could not enumerate serial ports: {}", e);
            Vec::new()
        }
    };
    // Raspberry Pi UART alias, not reported by enumeration
    if Path::new("/dev/serial0").exists() {
        names.push("/dev/serial0".to_string());
    }

    debug!("Serial ports: {:?}", names);
    pick_device(&names).ok_or_else(|| BridgeError::not_found("no panel serial device found"))
}

/// Both halves of the panel's serial port
pub struct SerialLink {
    pub device: String,
    pub reader: Box<dyn SerialPort>,
    pub writer: Box<dyn SerialPort>,
}

/// Open the configured (or discovered) panel device
pub fn open_serial(config: &SerialConfig) -> Result<SerialLink> {
    let device = match &config.device {
        Some(device) => device.clone(),
        None => discover_serial_device()?,
    };

    info!("🔌 Opening panel on {} at {} baud", device, config.baud_rate);
    let reader = serialport::new(device.as_str(), config.baud_rate)
        .timeout(Duration::from_millis(config.read_timeout_ms))
        .open()
        .map_err(|e| BridgeError::SerialIo(e.into()))?;
    let writer = reader
        .try_clone()
        .map_err(|e| BridgeError::SerialIo(e.into()))?;

    Ok(SerialLink {
        device,
        reader,
        writer,
    })
}

/// Running hardware threads
pub struct PanelHardware {
    running: Arc<AtomicBool>,
    handles: Vec<JoinHandle<()>>,
}

impl PanelHardware {
    pub fn start(
        reader: Box<dyn Read + Send>,
        decoder: InputDecoder,
        orchestrator: Arc<Orchestrator>,
        leds: Arc<LedMatrix>,
        animations: Arc<AnimationScheduler>,
        config: &PanelConfig,
    ) -> Result<Self> {
        let running = Arc::new(AtomicBool::new(true));
        let mut handles = Vec::new();

        let running_reader = Arc::clone(&running);
        handles.push(
            thread::Builder::new()
                .name("panel-reader".to_string())
                .spawn(move || serial_reader_thread(reader, decoder, orchestrator, running_reader))?,
        );

        let running_leds = Arc::clone(&running);
        let refresh = Duration::from_millis(config.led_refresh_ms);
        handles.push(
            thread::Builder::new()
                .name("led-refresh".to_string())
                .spawn(move || {
                    while running_leds.load(Ordering::SeqCst) {
                        // show() logs its own failures
                        let _ = leds.show();
                        thread::sleep(refresh);
                    }
                })?,
        );

        let running_animations = Arc::clone(&running);
        let tick = Duration::from_millis(config.animation_tick_ms);
        handles.push(
            thread::Builder::new()
                .name("animation".to_string())
                .spawn(move || {
                    while running_animations.load(Ordering::SeqCst) {
                        animations.tick(Instant::now());
                        thread::sleep(tick);
                    }
                })?,
        );

        info!("✅ Panel threads started");
        Ok(Self { running, handles })
    }

    /// Shared running flag; clearing it stops every thread
    pub fn running_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    /// False once any thread has exited while the flag is still set
    pub fn threads_alive(&self) -> bool {
        self.handles.iter().all(|handle| !handle.is_finished())
    }

    /// Stop and join every thread
    pub fn close(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        for handle in self.handles.drain(..) {
            let name = handle.thread().name().unwrap_or("panel").to_string();
            if handle.join().is_err() {
                warn!("Thread {} panicked", name);
            }
        }
        debug!("Panel threads stopped");
    }
}

impl Drop for PanelHardware {
    fn drop(&mut self) {
        self.close();
    }
}

fn serial_reader_thread(
    reader: Box<dyn Read + Send>,
    mut decoder: InputDecoder,
    orchestrator: Arc<Orchestrator>,
    running: Arc<AtomicBool>,
) {
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();

    while running.load(Ordering::SeqCst) {
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) => thread::sleep(READ_RETRY_PAUSE),
            Ok(_) if buf.ends_with(b"\n") => {
                let line = String::from_utf8_lossy(&buf);
                if let Err(e) = decoder.handle_line(&line, Instant::now(), orchestrator.roster_len()) {
                    debug!("Ignoring panel record: {}", e);
                }
                buf.clear();
            }
            // partial record, the rest follows
            Ok(_) => {}
            Err(e) if matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock) => {}
            Err(e) => {
                warn!("Serial read error: {}", e);
                thread::sleep(READ_RETRY_PAUSE);
            }
        }
    }
    debug!("Serial reader stopped");
}
