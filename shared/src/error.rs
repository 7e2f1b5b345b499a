/*!
Common error types for the PTZ bridge components.
*/

use thiserror::Error;

use crate::visca::ViscaError;

/// Common result type used throughout the bridge
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Error taxonomy for camera, panel and roster operations
#[derive(Error, Debug)]
pub enum BridgeError {
    /// Caller-supplied value outside the protocol range. Never retried.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// The camera answered with an error status, or with garbage
    #[error("Protocol fault: {0}")]
    Protocol(ViscaError),

    /// A query went unanswered within the receive timeout
    #[error("No response from camera")]
    NoResponse,

    /// Socket-level failure while connecting or reconnecting
    #[error("Connection fault: {0}")]
    ConnectionFault(String),

    /// Retry budget exhausted
    #[error("Command failed after {attempts} attempts: {last}")]
    CommandFailed {
        attempts: u32,
        last: Box<BridgeError>,
    },

    /// Writing to or reading from the panel's serial device failed
    #[error("Serial I/O error: {0}")]
    SerialIo(std::io::Error),

    /// The rate-limited command queue has no room left
    #[error("Command queue full")]
    QueueFull,

    /// Index-addressed lookup missed (roster, camera)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Other I/O errors (socket setup, etc.)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<ViscaError> for BridgeError {
    fn from(err: ViscaError) -> Self {
        match err {
            ViscaError::InvalidParameter(msg) => Self::InvalidParameter(msg),
            other => Self::Protocol(other),
        }
    }
}

impl BridgeError {
    /// Create a new invalid parameter error
    pub fn invalid_parameter(msg: impl Into<String>) -> Self {
        Self::InvalidParameter(msg.into())
    }

    /// Create a new connection fault
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::ConnectionFault(msg.into())
    }

    /// Create a new not-found error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// VISCA error code carried by a protocol fault, if any.
    ///
    /// Looks through `CommandFailed` so callers can tolerate specific codes
    /// (0x41, "not executable") after the retry budget is spent.
    pub fn visca_code(&self) -> Option<u8> {
        match self {
            Self::Protocol(ViscaError::ErrorReply { code, .. }) => Some(*code),
            Self::CommandFailed { last, .. } => last.visca_code(),
            _ => None,
        }
    }
}
