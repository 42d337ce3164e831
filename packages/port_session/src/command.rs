use serde::{Deserialize, Serialize};

use crate::encoder::Frame;
use crate::options::DisplayMode;

/// Different commands the session can send to the port backend
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandKind {
    /// Transmit data on the serial line
    Tx,
    /// Update display settings
    Settings,
    /// Clear backend-side state for the port
    Clear,
    /// Update the log settings
    Logging,
}

/// Settings related to how received data should be displayed
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayConfig {
    /// Scrollback length, in characters
    pub max_bytes: usize,
    pub display_mode: DisplayMode,
}

/// Whether and where received data should be logged
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogSettings {
    pub enabled: bool,
    pub path: String,
}

/// Data that goes along with a command
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Payload {
    Byte(u8),
    Text(String),
    Bytes(Vec<u8>),
    Display(DisplayConfig),
    Log(LogSettings),
}

/// One message to the backend, serialized as `{"command": .., "package": ..}`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    #[serde(rename = "command")]
    pub kind: CommandKind,
    #[serde(rename = "package")]
    pub payload: Payload,
}

impl Command {
    pub fn clear() -> Self {
        Self {
            kind: CommandKind::Clear,
            payload: Payload::Text(String::new()),
        }
    }

    pub fn tx(frame: Frame) -> Self {
        Self {
            kind: CommandKind::Tx,
            payload: Payload::Bytes(frame.into_inner()),
        }
    }

    pub fn tx_byte(byte: u8) -> Self {
        Self {
            kind: CommandKind::Tx,
            payload: Payload::Byte(byte),
        }
    }

    pub fn settings(config: DisplayConfig) -> Self {
        Self {
            kind: CommandKind::Settings,
            payload: Payload::Display(config),
        }
    }

    pub fn logging(settings: LogSettings) -> Self {
        Self {
            kind: CommandKind::Logging,
            payload: Payload::Log(settings),
        }
    }
}
