//! Error types and stable error codes for session operations.

use crate::connection::ConnectionId;
use crate::options::SendMode;

/// Text the backend puts in front of every failure that means the physical
/// link is gone. Backends that only speak strings are classified by it.
pub const LINK_LOST_MARKER: &str = "Lost coms with serial port.";

/// Rejection of user input before anything is sent.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EncodeError {
    #[error(
        "value {value} from '{token}' does not fit in a byte (must be less than or equal to 255)"
    )]
    ValueOutOfRange { token: String, value: u64 },

    #[error("'{token}' is not a valid {mode} value")]
    InvalidToken { token: String, mode: SendMode },
}

impl EncodeError {
    pub fn error_code(&self) -> &str {
        match self {
            Self::ValueOutOfRange { .. } => "value_out_of_range",
            Self::InvalidToken { .. } => "invalid_token",
        }
    }
}

/// The two failure classes a backend call can end in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// The serial link is gone; the connection must be deactivated.
    LinkLost,
    /// Anything else. Reported, state untouched.
    Recoverable,
}

/// Failure reported by the port backend.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    #[error("Lost coms with serial port. {detail}")]
    LinkLost { detail: String },

    #[error("Serial port not currently connected.")]
    NotConnected,

    #[error("{0}")]
    Other(String),
}

impl BackendError {
    /// Build a typed error from a backend message string.
    pub fn from_message(message: impl Into<String>) -> Self {
        let message = message.into();
        match message.find(LINK_LOST_MARKER) {
            Some(pos) => Self::LinkLost {
                detail: message[pos + LINK_LOST_MARKER.len()..].trim().to_string(),
            },
            None if message == "Serial port not currently connected." => Self::NotConnected,
            None => Self::Other(message),
        }
    }

    pub fn class(&self) -> FailureClass {
        match self {
            Self::LinkLost { .. } => FailureClass::LinkLost,
            Self::NotConnected | Self::Other(_) => FailureClass::Recoverable,
        }
    }

    pub fn is_link_lost(&self) -> bool {
        self.class() == FailureClass::LinkLost
    }

    pub fn error_code(&self) -> &str {
        match self {
            Self::LinkLost { .. } => "link_lost",
            Self::NotConnected => "not_connected",
            Self::Other(_) => "backend_error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("connection not found: {0}")]
    NotFound(ConnectionId),

    #[error("connection {0} is not active")]
    NotActive(ConnectionId),

    #[error("unsupported baud rate: {0}")]
    InvalidBaudRate(u32),

    #[error("buffer size must be greater than zero")]
    InvalidBufferSize,

    #[error("unknown {kind} option: {value}")]
    UnknownOption { kind: &'static str, value: String },

    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl SessionError {
    pub fn error_code(&self) -> &str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::NotActive(_) => "not_active",
            Self::InvalidBaudRate(_) => "invalid_baud_rate",
            Self::InvalidBufferSize => "invalid_buffer_size",
            Self::UnknownOption { .. } => "unknown_option",
            Self::Encode(e) => e.error_code(),
            Self::Backend(e) => e.error_code(),
        }
    }

    /// True when the failure came from the backend losing the serial link.
    pub fn is_link_lost(&self) -> bool {
        matches!(self, Self::Backend(e) if e.is_link_lost())
    }
}
