use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::options::{BaudRate, DataBits, DisplayMode, FlowControl, Parity, StopBits};

/// Unique identifier for a connection, stable for its lifetime
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(pub Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for ConnectionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// What the caller supplies when adding a port. Everything else is defaulted.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConnectionParams {
    pub name: String,
    pub baud_rate: u32,
}

/// Line settings needed to open the physical port.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortSettings {
    /// Port name (such as COM3 or /dev/ttyUSB0)
    pub name: String,
    pub baud_rate: BaudRate,
    pub flow_control: FlowControl,
    pub data_bits: DataBits,
    pub parity: Parity,
    pub stop_bits: StopBits,
}

/// One configured or open serial port, as seen by the UI.
///
/// The receive buffer always holds at most `max_bytes` characters: appends
/// drop the oldest data first.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Connection {
    pub id: ConnectionId,
    pub name: String,
    pub baud_rate: BaudRate,
    pub flow_control: FlowControl,
    pub data_bits: DataBits,
    pub parity: Parity,
    pub stop_bits: StopBits,
    /// Size of the receive buffer, in characters
    pub max_bytes: usize,
    pub display_mode: DisplayMode,
    /// Backend port is open
    pub is_active: bool,
    /// Data streaming is enabled
    pub is_running: bool,
    pub is_logging: bool,
    /// Only meaningful while `is_logging` is set
    pub log_path: String,
    rx_buffer: String,
}

impl Connection {
    pub(crate) fn new(
        id: ConnectionId,
        name: String,
        baud_rate: BaudRate,
        max_bytes: usize,
        display_mode: DisplayMode,
    ) -> Self {
        Self {
            id,
            name,
            baud_rate,
            flow_control: FlowControl::None,
            data_bits: DataBits::Eight,
            parity: Parity::None,
            stop_bits: StopBits::One,
            max_bytes,
            display_mode,
            is_active: false,
            is_running: false,
            is_logging: false,
            log_path: String::new(),
            rx_buffer: String::new(),
        }
    }

    pub fn rx_buffer(&self) -> &str {
        &self.rx_buffer
    }

    /// Length of the receive buffer in characters.
    pub fn rx_len(&self) -> usize {
        self.rx_buffer.chars().count()
    }

    pub fn port_settings(&self) -> PortSettings {
        PortSettings {
            name: self.name.clone(),
            baud_rate: self.baud_rate,
            flow_control: self.flow_control,
            data_bits: self.data_bits,
            parity: self.parity,
            stop_bits: self.stop_bits,
        }
    }

    pub(crate) fn apply_port_settings(&mut self, settings: PortSettings) {
        self.name = settings.name;
        self.baud_rate = settings.baud_rate;
        self.flow_control = settings.flow_control;
        self.data_bits = settings.data_bits;
        self.parity = settings.parity;
        self.stop_bits = settings.stop_bits;
    }

    pub(crate) fn append_received(&mut self, chunk: &str) {
        self.rx_buffer.push_str(chunk);
        self.trim_to_window();
    }

    pub(crate) fn replace_received(&mut self, buffer: &str) {
        self.rx_buffer.clear();
        self.append_received(buffer);
    }

    pub(crate) fn clear_received(&mut self) {
        self.rx_buffer.clear();
    }

    pub(crate) fn set_max_bytes(&mut self, max_bytes: usize) {
        self.max_bytes = max_bytes;
        self.trim_to_window();
    }

    /// Keep only the newest `max_bytes` characters.
    fn trim_to_window(&mut self) {
        let len = self.rx_len();
        if len <= self.max_bytes {
            return;
        }
        let excess = len - self.max_bytes;
        let cut = self
            .rx_buffer
            .char_indices()
            .nth(excess)
            .map(|(i, _)| i)
            .unwrap_or(self.rx_buffer.len());
        self.rx_buffer.drain(..cut);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connection(max_bytes: usize) -> Connection {
        Connection::new(
            ConnectionId::new(),
            "COM1".to_string(),
            BaudRate::default(),
            max_bytes,
            DisplayMode::Ascii,
        )
    }

    #[test]
    fn append_keeps_tail_window() {
        let mut c = connection(5);
        c.append_received("abc");
        assert_eq!(c.rx_buffer(), "abc");
        c.append_received("defgh");
        assert_eq!(c.rx_buffer(), "defgh");
    }

    #[test]
    fn append_chunk_larger_than_window() {
        let mut c = connection(3);
        c.append_received("0123456789");
        assert_eq!(c.rx_buffer(), "789");
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let mut c = connection(3);
        c.append_received("añbßc");
        assert_eq!(c.rx_buffer(), "bßc");
        assert_eq!(c.rx_len(), 3);
    }

    #[test]
    fn shrinking_window_drops_oldest() {
        let mut c = connection(10);
        c.append_received("hello world");
        assert_eq!(c.rx_buffer(), "ello world");
        c.set_max_bytes(5);
        assert_eq!(c.rx_buffer(), "world");
    }

    #[test]
    fn replace_overwrites_and_still_bounds() {
        let mut c = connection(4);
        c.append_received("abcd");
        c.replace_received("");
        assert_eq!(c.rx_buffer(), "");
        c.replace_received("123456");
        assert_eq!(c.rx_buffer(), "3456");
    }

    #[test]
    fn connection_id_roundtrips_through_display() {
        let id = ConnectionId::new();
        let parsed: ConnectionId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
    }
}
