/*!
VISCA-over-IP camera link.

A [`CameraLink`] owns the UDP socket for one camera and the sequence number
that goes with it. Only one link may be bound to a local port at a time, so
switching cameras means closing the old link first.
*/

use ptz_shared::commands::{
    self, Adjustable, AutoExposureMode, AutofocusMode, ColorChannel, FocusMode, Level, Step,
    WhiteBalanceMode,
};
use ptz_shared::visca::{response_payload, response_sequence, RESET_SEQUENCE_FRAME};
use ptz_shared::{BridgeError, CommandFrame, ResponseFrame, Result};
use serde::{Deserialize, Serialize};
use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, ToSocketAddrs, UdpSocket};
use std::thread;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

use crate::retry::{Attempt, RetryPolicy};

/// Zero-speed stop commands are repeated this many times
const STOP_REPEATS: usize = 3;

/// Pause between repeated stop commands
const STOP_REPEAT_PAUSE: Duration = Duration::from_millis(5);

/// "Command not executable" error code, answered by a camera already in the requested power state
const NOT_EXECUTABLE: u8 = 0x41;

/// Where a camera lives
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraEndpoint {
    pub address: String,
    pub port: u16,
}

impl CameraEndpoint {
    pub fn new(address: impl Into<String>, port: u16) -> Self {
        Self {
            address: address.into(),
            port,
        }
    }

    fn resolve(&self) -> Result<SocketAddr> {
        (self.address.as_str(), self.port)
            .to_socket_addrs()
            .map_err(|e| BridgeError::connection(format!("cannot resolve {}: {}", self, e)))?
            .next()
            .ok_or_else(|| BridgeError::connection(format!("no address for {}", self)))
    }
}

impl std::fmt::Display for CameraEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.address, self.port)
    }
}

/// Socket and retry settings for a link
#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// Local UDP port to bind; 0 picks an ephemeral port
    pub local_port: u16,
    pub receive_timeout: Duration,
    pub retry: RetryPolicy,
    /// Pause after a reconnect before the next command goes out
    pub settle: Duration,
    /// Treat an unanswered sequence reset as a connection failure
    pub require_handshake_reply: bool,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            local_port: ptz_shared::protocol::VISCA_PORT,
            receive_timeout: Duration::from_millis(100),
            retry: RetryPolicy::default(),
            settle: Duration::from_millis(500),
            require_handshake_reply: false,
        }
    }
}

/// Command/response exchange with one camera
pub struct CameraLink {
    endpoint: CameraEndpoint,
    remote: SocketAddr,
    config: LinkConfig,
    socket: Option<UdpSocket>,
    sequence: u32,
    missed_responses: u64,
}

impl CameraLink {
    /// Bind the control socket, reset the camera's sequence number and clear
    /// its command sockets.
    pub fn connect(endpoint: CameraEndpoint, config: LinkConfig) -> Result<Self> {
        let remote = endpoint.resolve()?;
        let socket = bind_socket(remote, &config)?;

        let mut link = Self {
            endpoint,
            remote,
            config,
            socket: Some(socket),
            sequence: 0,
            missed_responses: 0,
        };
        link.handshake()?;

        info!("📡 Connected to camera {}", link.endpoint);
        Ok(link)
    }

    pub fn endpoint(&self) -> &CameraEndpoint {
        &self.endpoint
    }

    /// Sequence number of the most recent frame
    pub fn sequence(&self) -> u32 {
        self.sequence
    }

    /// Responses that never arrived (expected now and then over UDP)
    pub fn missed_responses(&self) -> u64 {
        self.missed_responses
    }

    pub fn is_open(&self) -> bool {
        self.socket.is_some()
    }

    /// Release the socket so another link can bind the same port
    pub fn close(&mut self) {
        if self.socket.take().is_some() {
            debug!("Closed link to {}", self.endpoint);
        }
    }

    /// Close and rebind the socket, then redo the handshake
    pub fn reset_connection(&mut self) -> Result<()> {
        info!("Resetting connection to {}", self.endpoint);
        self.close();
        self.socket = Some(bind_socket(self.remote, &self.config)?);
        self.handshake()?;
        if !self.config.settle.is_zero() {
            thread::sleep(self.config.settle);
        }
        Ok(())
    }

    /// Send the sequence reset frame and restart numbering at 1
    pub fn reset_sequence_number(&mut self) -> Result<()> {
        self.send_datagram(&RESET_SEQUENCE_FRAME)
            .map_err(|e| BridgeError::connection(format!("sequence reset failed: {e}")))?;

        let reply = self.recv_datagram()?;
        self.sequence = 1;

        if reply.is_none() {
            if self.config.require_handshake_reply {
                return Err(BridgeError::connection(format!(
                    "{} did not answer the sequence reset",
                    self.endpoint
                )));
            }
            debug!("No reply to sequence reset from {}", self.endpoint);
        }
        Ok(())
    }

    fn handshake(&mut self) -> Result<()> {
        self.reset_sequence_number()?;

        match self.transact(&commands::interface_clear()) {
            Ok(_) => Ok(()),
            Err(BridgeError::Io(e)) => Err(BridgeError::connection(format!(
                "interface clear to {} failed: {}",
                self.endpoint, e
            ))),
            Err(e) => {
                warn!("Interface clear on {} answered with {}", self.endpoint, e);
                Ok(())
            }
        }
    }

    /// Send a frame with retry.
    ///
    /// Commands that go unanswered return `Ok(None)`; an unanswered inquiry
    /// counts as a failed attempt. Protocol faults and socket errors trigger a
    /// full reconnect before the next attempt.
    pub fn send(&mut self, frame: &CommandFrame) -> Result<Option<ResponseFrame>> {
        let policy = self.config.retry;
        policy.run(
            self,
            |link| match link.transact(frame) {
                Ok(Some(response)) => Attempt::Done(Some(response)),
                Ok(None) if !frame.is_query() => Attempt::Done(None),
                Ok(None) => Attempt::Retry(BridgeError::NoResponse),
                Err(e @ BridgeError::InvalidParameter(_)) => Attempt::Fatal(e),
                Err(e) => Attempt::Retry(e),
            },
            |link, err| match err {
                BridgeError::NoResponse => Ok(()),
                _ => link.reset_connection(),
            },
        )
    }

    /// Send an inquiry and return its answer
    pub fn query(&mut self, frame: &CommandFrame) -> Result<ResponseFrame> {
        self.send(frame)?.ok_or(BridgeError::NoResponse)
    }

    /// One attempt: number, encode, transmit, wait for the reply
    fn transact(&mut self, frame: &CommandFrame) -> Result<Option<ResponseFrame>> {
        self.sequence = self.sequence.wrapping_add(1);
        let datagram = frame.encode(self.sequence);
        self.send_datagram(&datagram)?;
        self.receive()
    }

    /// Read replies until one for the current sequence arrives or the socket
    /// times out. Older sequence numbers are duplicates or late replies and
    /// are skipped.
    pub fn receive(&mut self) -> Result<Option<ResponseFrame>> {
        loop {
            let Some(datagram) = self.recv_datagram()? else {
                return Ok(None);
            };

            match response_sequence(&datagram) {
                Some(seq) if seq >= self.sequence => {
                    let response = ResponseFrame::decode(response_payload(&datagram))?;
                    return Ok(Some(response));
                }
                Some(seq) => {
                    trace!("Discarding stale reply seq={} (current {})", seq, self.sequence);
                }
                None => {
                    debug!("Discarding runt datagram: {}", hex::encode(&datagram));
                }
            }
        }
    }

    fn socket(&self) -> Result<&UdpSocket> {
        self.socket
            .as_ref()
            .ok_or_else(|| BridgeError::connection(format!("link to {} is closed", self.endpoint)))
    }

    fn send_datagram(&self, bytes: &[u8]) -> Result<()> {
        trace!("→ {} {}", self.remote, hex::encode(bytes));
        self.socket()?.send_to(bytes, self.remote)?;
        Ok(())
    }

    fn recv_datagram(&mut self) -> Result<Option<Vec<u8>>> {
        let mut buf = [0u8; 64];
        let received = self.socket()?.recv(&mut buf);
        match received {
            Ok(len) => {
                trace!("← {} {}", self.remote, hex::encode(&buf[..len]));
                Ok(Some(buf[..len].to_vec()))
            }
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                self.missed_responses += 1;
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn command(&mut self, frame: CommandFrame) -> Result<()> {
        self.send(&frame).map(|_| ())
    }

    /// Stop commands are repeated: a lost stop leaves the camera moving
    fn command_repeated(&mut self, frame: CommandFrame) -> Result<()> {
        for _ in 0..STOP_REPEATS {
            self.send(&frame)?;
            thread::sleep(STOP_REPEAT_PAUSE);
        }
        Ok(())
    }

    pub fn set_power(&mut self, on: bool) -> Result<()> {
        let frame = commands::power(on);
        for _ in 0..4 {
            match self.send(&frame) {
                Ok(_) => {}
                Err(e) if e.visca_code() == Some(NOT_EXECUTABLE) => {
                    debug!("Power command not executable, camera already settling");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    pub fn info_display(&mut self, on: bool) -> Result<()> {
        self.command(commands::info_display(on))
    }

    /// Continuous pan/tilt, speeds -24..=24
    pub fn pantilt(&mut self, pan_speed: i32, tilt_speed: i32) -> Result<()> {
        let frame = commands::pantilt_drive(pan_speed, tilt_speed)?;
        if pan_speed == 0 && tilt_speed == 0 {
            self.command_repeated(frame)
        } else {
            self.command(frame)
        }
    }

    pub fn pantilt_to(&mut self, pan_speed: i32, tilt_speed: i32, pan: i16, tilt: i16) -> Result<()> {
        self.command(commands::pantilt_position(pan_speed, tilt_speed, pan, tilt, false)?)
    }

    pub fn pantilt_by(&mut self, pan_speed: i32, tilt_speed: i32, pan: i16, tilt: i16) -> Result<()> {
        self.command(commands::pantilt_position(pan_speed, tilt_speed, pan, tilt, true)?)
    }

    pub fn pantilt_home(&mut self) -> Result<()> {
        self.command(commands::pantilt_home())
    }

    pub fn pantilt_reset(&mut self) -> Result<()> {
        self.command(commands::pantilt_reset())
    }

    /// Zoom fully out and centre pan/tilt
    pub fn home(&mut self) -> Result<()> {
        self.zoom_to(0.0)?;
        self.pantilt_home()
    }

    /// Continuous zoom, -7..=7
    pub fn zoom(&mut self, speed: i32) -> Result<()> {
        let frame = commands::zoom_drive(speed)?;
        if speed == 0 {
            self.command_repeated(frame)
        } else {
            self.command(frame)
        }
    }

    pub fn zoom_to(&mut self, position: f32) -> Result<()> {
        self.command(commands::zoom_to(position)?)
    }

    pub fn digital_zoom(&mut self, on: bool) -> Result<()> {
        self.command(commands::digital_zoom(on))
    }

    /// Manual focus drive, -7..=7; set the focus mode to manual first
    pub fn focus(&mut self, speed: i32) -> Result<()> {
        self.command(commands::focus_drive(speed)?)
    }

    pub fn set_focus_mode(&mut self, mode: FocusMode) -> Result<()> {
        self.command(commands::focus_mode(mode))
    }

    pub fn set_autofocus_mode(&mut self, mode: AutofocusMode) -> Result<()> {
        self.command(commands::autofocus_mode(mode))
    }

    pub fn set_autofocus_interval(&mut self, active_secs: i32, interval_secs: i32) -> Result<()> {
        self.command(commands::autofocus_interval(active_secs, interval_secs)?)
    }

    pub fn autofocus_sensitivity_low(&mut self, low: bool) -> Result<()> {
        self.command(commands::autofocus_sensitivity_low(low))
    }

    pub fn ir_correction(&mut self, on: bool) -> Result<()> {
        self.command(commands::ir_correction(on))
    }

    pub fn set_white_balance_mode(&mut self, mode: WhiteBalanceMode) -> Result<()> {
        self.command(commands::white_balance_mode(mode))
    }

    pub fn set_auto_exposure_mode(&mut self, mode: AutoExposureMode) -> Result<()> {
        self.command(commands::auto_exposure_mode(mode))
    }

    /// Absolute gain, shutter, iris, brightness, aperture or colour level
    pub fn set_level(&mut self, level: Level, value: i32) -> Result<()> {
        self.command(commands::set_level(level, value)?)
    }

    /// Step an image control up, down, or back to its default
    pub fn step(&mut self, control: Adjustable, direction: Step) -> Result<()> {
        self.command(commands::step(control, direction))
    }

    pub fn set_color_gain(&mut self, channel: ColorChannel, gain: i32) -> Result<()> {
        self.command(commands::color_gain(channel, gain)?)
    }

    pub fn slow_shutter(&mut self, on: bool) -> Result<()> {
        self.command(commands::slow_shutter(on))
    }

    pub fn backlight(&mut self, on: bool) -> Result<()> {
        self.command(commands::backlight(on))
    }

    pub fn flip_horizontal(&mut self, on: bool) -> Result<()> {
        self.command(commands::flip_horizontal(on))
    }

    pub fn flip_vertical(&mut self, on: bool) -> Result<()> {
        self.command(commands::flip_vertical(on))
    }

    pub fn flip(&mut self, horizontal: bool, vertical: bool) -> Result<()> {
        self.command(commands::flip(horizontal, vertical))
    }

    pub fn defog(&mut self, on: bool) -> Result<()> {
        self.command(commands::defog(on))
    }

    /// Store position, zoom and image settings in slot 0..=15
    pub fn save_preset(&mut self, preset: i32) -> Result<()> {
        self.command(commands::save_preset(preset)?)
    }

    pub fn recall_preset(&mut self, preset: i32) -> Result<()> {
        self.command(commands::recall_preset(preset)?)
    }

    /// Slow pan/tilt mode, retried a few times since the panel relies on it
    pub fn set_slow_pan_tilt(&mut self, slow: bool) -> Result<()> {
        let frame = commands::slow_pantilt(slow);
        let mut tries = 0;
        loop {
            match self.send(&frame) {
                Ok(_) => {
                    info!("{} pan/tilt on {}", if slow { "Slow" } else { "Fast" }, self.endpoint);
                    return Ok(());
                }
                Err(e) if tries < 3 => {
                    warn!("Error setting slow pan/tilt mode: {}. Trying again in 100ms.", e);
                    tries += 1;
                    thread::sleep(Duration::from_millis(100));
                }
                Err(e) => {
                    warn!("Failed to set slow pan/tilt mode after {} tries", tries + 1);
                    return Err(e);
                }
            }
        }
    }

    /// Absolute pan and tilt position
    pub fn get_pantilt_position(&mut self) -> Result<(i32, i32)> {
        let response = self.query(&commands::pantilt_position_inquiry())?;
        Ok(commands::parse_pantilt_position(response.body())?)
    }

    /// Absolute zoom position, 0 (wide) to 16384 (tele)
    pub fn get_zoom_position(&mut self) -> Result<u32> {
        let response = self.query(&commands::zoom_position_inquiry())?;
        Ok(commands::parse_zoom_position(response.body())?)
    }

    pub fn get_focus_mode(&mut self) -> Result<FocusMode> {
        let response = self.query(&commands::focus_mode_inquiry())?;
        Ok(commands::parse_focus_mode(response.body())?)
    }
}

impl Drop for CameraLink {
    fn drop(&mut self) {
        self.close();
    }
}

/// UDP socket bound to the control port, with address reuse so a
/// reconnect can rebind immediately
fn bind_socket(remote: SocketAddr, config: &LinkConfig) -> Result<UdpSocket> {
    let (domain, local): (Domain, SocketAddr) = if remote.is_ipv4() {
        (Domain::IPV4, (Ipv4Addr::UNSPECIFIED, config.local_port).into())
    } else {
        (Domain::IPV6, (Ipv6Addr::UNSPECIFIED, config.local_port).into())
    };

    let bind = || -> io::Result<UdpSocket> {
        let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_reuse_address(true)?;
        socket.bind(&local.into())?;
        socket.set_read_timeout(Some(config.receive_timeout))?;
        Ok(socket.into())
    };

    bind().map_err(|e| BridgeError::connection(format!("cannot bind {}: {}", local, e)))
}
