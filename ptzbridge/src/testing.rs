//! Test doubles: a loopback VISCA camera and an in-memory LED sink.

use ptz_shared::visca::{response_payload, response_sequence, RESET_SEQUENCE_FRAME};
use std::io::{self, Write};
use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::camera::{CameraEndpoint, LinkConfig};
use crate::config::{AppConfig, CameraEntry};
use crate::retry::RetryPolicy;

/// Link settings suited to a loopback camera
pub fn test_link_config() -> LinkConfig {
    LinkConfig {
        local_port: 0,
        receive_timeout: Duration::from_millis(50),
        retry: RetryPolicy::new(3, Duration::ZERO),
        settle: Duration::ZERO,
        require_handshake_reply: false,
    }
}

/// Application config whose camera settings match [`test_link_config`]
pub fn test_app_config(port: u16, cameras: Vec<CameraEntry>) -> AppConfig {
    let mut config = AppConfig::new();
    config.camera.port = port;
    config.camera.local_port = 0;
    config.camera.receive_timeout_ms = 50;
    config.camera.retry_delay_ms = 0;
    config.camera.settle_ms = 0;
    config.cameras = cameras;
    config
}

pub fn is_reset(datagram: &[u8]) -> bool {
    datagram == RESET_SEQUENCE_FRAME
}

fn reply(datagram: &[u8], payload: &[u8]) -> Vec<u8> {
    let seq = response_sequence(datagram).unwrap_or(0);
    let mut out = vec![0x01, 0x11];
    out.extend_from_slice(&(payload.len() as u16).to_be_bytes());
    out.extend_from_slice(&seq.to_be_bytes());
    out.extend_from_slice(payload);
    out
}

/// ACK carrying the request's sequence number
pub fn ack_for(datagram: &[u8]) -> Vec<u8> {
    reply(datagram, &[0x90, 0x41, 0xFF])
}

/// Completion (inquiry answer) carrying `data` after the `50` status byte
pub fn completion_for(datagram: &[u8], data: &[u8]) -> Vec<u8> {
    let mut payload = vec![0x90, 0x50];
    payload.extend_from_slice(data);
    payload.push(0xFF);
    reply(datagram, &payload)
}

type Responder = Box<dyn FnMut(&[u8]) -> Vec<Vec<u8>> + Send>;

/// A camera on 127.0.0.1 that records every datagram and answers through a
/// scripted responder
pub struct FakeCamera {
    addr: SocketAddr,
    received: Arc<Mutex<Vec<Vec<u8>>>>,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl FakeCamera {
    pub fn spawn(responder: impl FnMut(&[u8]) -> Vec<Vec<u8>> + Send + 'static) -> Self {
        let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
        socket
            .set_read_timeout(Some(Duration::from_millis(10)))
            .unwrap();
        let addr = socket.local_addr().unwrap();

        let received = Arc::new(Mutex::new(Vec::new()));
        let running = Arc::new(AtomicBool::new(true));
        let mut responder: Responder = Box::new(responder);

        let handle = {
            let received = received.clone();
            let running = running.clone();
            thread::spawn(move || {
                let mut buf = [0u8; 256];
                while running.load(Ordering::SeqCst) {
                    let Ok((len, from)) = socket.recv_from(&mut buf) else {
                        continue;
                    };
                    let datagram = buf[..len].to_vec();
                    received.lock().unwrap().push(datagram.clone());
                    for out in responder(&datagram) {
                        let _ = socket.send_to(&out, from);
                    }
                }
            })
        };

        Self {
            addr,
            received,
            running,
            handle: Some(handle),
        }
    }

    /// ACKs every command and echoes the sequence reset
    pub fn acking() -> Self {
        Self::spawn(|datagram| {
            if is_reset(datagram) {
                vec![RESET_SEQUENCE_FRAME.to_vec()]
            } else {
                vec![ack_for(datagram)]
            }
        })
    }

    pub fn endpoint(&self) -> CameraEndpoint {
        CameraEndpoint::new(self.addr.ip().to_string(), self.addr.port())
    }

    pub fn received(&self) -> Vec<Vec<u8>> {
        self.received.lock().unwrap().clone()
    }

    /// VISCA payloads of everything except sequence resets
    pub fn command_payloads(&self) -> Vec<Vec<u8>> {
        self.received()
            .iter()
            .filter(|d| !is_reset(d))
            .map(|d| response_payload(d).to_vec())
            .collect()
    }
}

impl Drop for FakeCamera {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// Shared in-memory serial sink
#[derive(Clone, Default)]
pub struct SharedSink(pub Arc<Mutex<Vec<u8>>>);

impl SharedSink {
    pub fn contents(&self) -> Vec<u8> {
        self.0.lock().unwrap().clone()
    }
}

impl Write for SharedSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// A sink whose writes always fail
pub struct BrokenSink;

impl Write for BrokenSink {
    fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
        Err(io::Error::new(io::ErrorKind::BrokenPipe, "panel unplugged"))
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
