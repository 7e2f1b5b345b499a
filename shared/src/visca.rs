/*!
VISCA-over-IP frame encoding and decoding.

Every datagram starts with an 8-byte header followed by a VISCA payload:

```text
payload type (2B, big-endian) | payload length (2B) | sequence number (4B) | payload
```

Command payloads are `0x81`, a category byte (`0x01` command, `0x09`
inquiry), the opcode bytes and the `0xFF` terminator. Nothing in this
module performs I/O.
*/

use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Payload type written in front of every command and inquiry
pub const PAYLOAD_TYPE: u16 = 0x0100;

/// Camera address byte opening every payload
pub const ADDRESS_BYTE: u8 = 0x81;

/// Category byte for commands
pub const CATEGORY_COMMAND: u8 = 0x01;

/// Category byte for inquiries
pub const CATEGORY_INQUIRY: u8 = 0x09;

/// Payload terminator
pub const TERMINATOR: u8 = 0xFF;

/// Length of the datagram header in bytes
pub const HEADER_LEN: usize = 8;

/// Control frame that resets the camera's expected sequence number to 1.
/// Sent verbatim, outside of sequence tracking.
pub const RESET_SEQUENCE_FRAME: [u8; 9] = [0x02, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x01];

/// Highest value of the per-link sequence counter before it wraps to 0
pub const SEQUENCE_NUM_MAX: u32 = u32::MAX;

/// Errors produced while building or decoding VISCA frames
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ViscaError {
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("response payload too short: {0} bytes")]
    TruncatedResponse(usize),

    #[error("camera replied with status {status:#04x}, error code {code:#04x}")]
    ErrorReply { status: u8, code: u8 },
}

impl ViscaError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidParameter(msg.into())
    }
}

/// A command or inquiry, not yet bound to a sequence number
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandFrame {
    opcode: Vec<u8>,
    query: bool,
}

impl CommandFrame {
    /// A command (category `0x01`)
    pub fn command(opcode: impl Into<Vec<u8>>) -> Self {
        Self {
            opcode: opcode.into(),
            query: false,
        }
    }

    /// An inquiry (category `0x09`); the caller expects an answer
    pub fn query(opcode: impl Into<Vec<u8>>) -> Self {
        Self {
            opcode: opcode.into(),
            query: true,
        }
    }

    pub fn opcode(&self) -> &[u8] {
        &self.opcode
    }

    pub fn is_query(&self) -> bool {
        self.query
    }

    /// VISCA payload: address, category, opcode, terminator
    pub fn payload(&self) -> Vec<u8> {
        let mut payload = Vec::with_capacity(self.opcode.len() + 3);
        payload.push(ADDRESS_BYTE);
        payload.push(if self.query {
            CATEGORY_INQUIRY
        } else {
            CATEGORY_COMMAND
        });
        payload.extend_from_slice(&self.opcode);
        payload.push(TERMINATOR);
        payload
    }

    /// Encode the full datagram for the given sequence number
    pub fn encode(&self, sequence: u32) -> Bytes {
        let payload = self.payload();
        let mut buf = BytesMut::with_capacity(HEADER_LEN + payload.len());
        buf.put_u16(PAYLOAD_TYPE);
        buf.put_u16(payload.len() as u16);
        buf.put_u32(sequence);
        buf.put_slice(&payload);
        buf.freeze()
    }
}

/// Sequence number embedded in a received datagram
pub fn response_sequence(datagram: &[u8]) -> Option<u32> {
    let bytes: [u8; 4] = datagram.get(4..HEADER_LEN)?.try_into().ok()?;
    Some(u32::from_be_bytes(bytes))
}

/// Payload part of a received datagram (empty when the header is incomplete)
pub fn response_payload(datagram: &[u8]) -> &[u8] {
    datagram.get(HEADER_LEN..).unwrap_or(&[])
}

/// Accepted reply categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResponseKind {
    /// Status nibble 4: the command was accepted into a socket
    Ack,
    /// Status nibble 5: the command finished, or an inquiry answer
    Completion,
}

/// A decoded, non-error reply payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseFrame {
    kind: ResponseKind,
    payload: Vec<u8>,
}

impl ResponseFrame {
    /// Decode a reply payload (the bytes after the 8-byte header)
    pub fn decode(payload: &[u8]) -> Result<Self, ViscaError> {
        if payload.len() <= 2 {
            return Err(ViscaError::TruncatedResponse(payload.len()));
        }

        let status = payload[1];
        let kind = match status >> 4 {
            4 => ResponseKind::Ack,
            5 => ResponseKind::Completion,
            _ => {
                return Err(ViscaError::ErrorReply {
                    status,
                    code: payload[2],
                })
            }
        };

        Ok(Self {
            kind,
            payload: payload.to_vec(),
        })
    }

    pub fn kind(&self) -> ResponseKind {
        self.kind
    }

    /// Raw payload including address byte and terminator
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Payload with the leading address byte and trailing terminator removed
    pub fn body(&self) -> &[u8] {
        let end = self.payload.len().saturating_sub(1).max(1);
        &self.payload[1..end]
    }
}

/// Spread a 16-bit value across four bytes, one nibble per byte (`0x1234` -> `01 02 03 04`)
pub fn nibbles(value: u16) -> [u8; 4] {
    [
        ((value >> 12) & 0x0F) as u8,
        ((value >> 8) & 0x0F) as u8,
        ((value >> 4) & 0x0F) as u8,
        (value & 0x0F) as u8,
    ]
}

/// Reassemble an integer from zero-padded nibble bytes, sign-extending if `signed`
pub fn from_nibbles(bytes: &[u8], signed: bool) -> i64 {
    let mut value: i64 = 0;
    for byte in bytes {
        value = (value << 4) | i64::from(byte & 0x0F);
    }

    let bits = bytes.len() * 4;
    if signed && bits > 0 && bits < 64 && value & (1 << (bits - 1)) != 0 {
        value -= 1 << bits;
    }
    value
}
