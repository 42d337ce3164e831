//! Valid choices for every configurable port and display setting.
//!
//! The tables here are reference data for presenting and validating choices.
//! Only the `value` of an entry is meaningful on the wire; ids and labels are
//! for display.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::SessionError;

/// One selectable choice: ordinal id, display label, underlying value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct OptionEntry<T: 'static> {
    pub id: u8,
    pub label: &'static str,
    pub value: T,
}

macro_rules! named_options {
    ($ty:ident, $kind:literal, [$($variant:ident),+ $(,)?]) => {
        impl $ty {
            pub const ALL: &'static [$ty] = &[$($ty::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($ty::$variant => stringify!($variant)),+
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = SessionError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                $ty::ALL
                    .iter()
                    .copied()
                    .find(|v| v.as_str().eq_ignore_ascii_case(s.trim()))
                    .ok_or_else(|| SessionError::UnknownOption {
                        kind: $kind,
                        value: s.to_string(),
                    })
            }
        }
    };
}

/// Flow control modes
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FlowControl {
    /// No flow control.
    #[default]
    None,
    /// XON/XOFF bytes.
    Software,
    /// RTS/CTS signals.
    Hardware,
}
named_options!(FlowControl, "flow control", [None, Software, Hardware]);

/// Number of bits per character
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataBits {
    Five,
    Six,
    Seven,
    #[default]
    Eight,
}
named_options!(DataBits, "data bits", [Five, Six, Seven, Eight]);

/// Parity checking modes
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Parity {
    #[default]
    None,
    Odd,
    Even,
}
named_options!(Parity, "parity", [None, Odd, Even]);

/// Number of stop bits sent after every character
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StopBits {
    #[default]
    One,
    Two,
}
named_options!(StopBits, "stop bits", [One, Two]);

/// How received bytes are rendered.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DisplayMode {
    #[default]
    Ascii,
    Ansi,
    Decimal,
    Hex,
}
named_options!(DisplayMode, "display mode", [Ascii, Ansi, Decimal, Hex]);

/// How typed input is turned into outbound bytes. There is no Ansi send mode.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SendMode {
    #[default]
    Ascii,
    Decimal,
    Hex,
}
named_options!(SendMode, "send mode", [Ascii, Decimal, Hex]);

/// A baud rate from the fixed set in [`BAUD_RATES`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct BaudRate(u32);

impl BaudRate {
    pub fn value(self) -> u32 {
        self.0
    }
}

impl Default for BaudRate {
    fn default() -> Self {
        BaudRate(9600)
    }
}

impl TryFrom<u32> for BaudRate {
    type Error = SessionError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        BAUD_RATES
            .iter()
            .find(|entry| entry.value.0 == value)
            .map(|entry| entry.value)
            .ok_or(SessionError::InvalidBaudRate(value))
    }
}

impl From<BaudRate> for u32 {
    fn from(value: BaudRate) -> Self {
        value.0
    }
}

impl fmt::Display for BaudRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for BaudRate {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = s.trim().parse::<u32>().map_err(|_| SessionError::UnknownOption {
            kind: "baud rate",
            value: s.to_string(),
        })?;
        BaudRate::try_from(value)
    }
}

const fn baud(id: u8, label: &'static str, value: u32) -> OptionEntry<BaudRate> {
    OptionEntry {
        id,
        label,
        value: BaudRate(value),
    }
}

pub static BAUD_RATES: [OptionEntry<BaudRate>; 36] = [
    baud(1, "300 baud", 300),
    baud(2, "600 baud", 600),
    baud(3, "1200 baud", 1200),
    baud(4, "1800 baud", 1800),
    baud(5, "2400 baud", 2400),
    baud(6, "4000 baud", 4000),
    baud(7, "4800 baud", 4800),
    baud(8, "7200 baud", 7200),
    baud(9, "9600 baud", 9600),
    baud(10, "14.4 kbaud", 14400),
    baud(11, "16.0 kbaud", 16000),
    baud(12, "19.2 kbaud", 19200),
    baud(13, "28.8 kbaud", 28800),
    baud(14, "38.4 kbaud", 38400),
    baud(15, "51.2 kbaud", 51200),
    baud(16, "56.0 kbaud", 56000),
    baud(18, "64.0 kbaud", 64000),
    baud(17, "57.6 kbaud", 57600),
    baud(19, "76.8 kbaud", 76800),
    baud(20, "115.2 kbaud", 115200),
    baud(21, "128.0 kbaud", 128000),
    baud(22, "153.6 kbaud", 153600),
    baud(23, "230.4 kbaud", 230400),
    baud(24, "250.0 kbaud", 250000),
    baud(25, "256.0 kbaud", 256000),
    baud(26, "460.8 kbaud", 460800),
    baud(27, "500.0 kbaud", 500000),
    baud(28, "576.0 kbaud", 576000),
    baud(29, "921.6 kbaud", 921600),
    baud(30, "1.00 Mbaud", 1000000),
    baud(31, "1.20 Mbaud", 1200000),
    baud(32, "1.50 Mbaud", 1500000),
    baud(33, "2.00 Mbaud", 2000000),
    baud(34, "2.25 Mbaud", 2250000),
    baud(35, "3.00 Mbaud", 3000000),
    baud(36, "4.50 Mbaud", 4500000),
];

pub static FLOW_CONTROL: [OptionEntry<FlowControl>; 3] = [
    OptionEntry { id: 1, label: "No Flow Ctrl", value: FlowControl::None },
    OptionEntry { id: 2, label: "Software", value: FlowControl::Software },
    OptionEntry { id: 3, label: "Hardware", value: FlowControl::Hardware },
];

pub static DATA_BITS: [OptionEntry<DataBits>; 4] = [
    OptionEntry { id: 1, label: "Five Data Bits", value: DataBits::Five },
    OptionEntry { id: 2, label: "Six Data Bits", value: DataBits::Six },
    OptionEntry { id: 3, label: "Seven Data Bits", value: DataBits::Seven },
    OptionEntry { id: 4, label: "Eight Data Bits", value: DataBits::Eight },
];

pub static PARITY: [OptionEntry<Parity>; 3] = [
    OptionEntry { id: 1, label: "No Parity", value: Parity::None },
    OptionEntry { id: 2, label: "Odd Parity", value: Parity::Odd },
    OptionEntry { id: 3, label: "Even Parity", value: Parity::Even },
];

pub static STOP_BITS: [OptionEntry<StopBits>; 2] = [
    OptionEntry { id: 1, label: "One Stop Bit", value: StopBits::One },
    OptionEntry { id: 2, label: "Two Stop Bits", value: StopBits::Two },
];

pub static DISPLAY_MODES: [OptionEntry<DisplayMode>; 4] = [
    OptionEntry { id: 1, label: "ASCII", value: DisplayMode::Ascii },
    OptionEntry { id: 2, label: "ANSI", value: DisplayMode::Ansi },
    OptionEntry { id: 3, label: "Decimal", value: DisplayMode::Decimal },
    OptionEntry { id: 4, label: "Hex", value: DisplayMode::Hex },
];

pub static SEND_MODES: [OptionEntry<SendMode>; 3] = [
    OptionEntry { id: 1, label: "Ascii", value: SendMode::Ascii },
    OptionEntry { id: 2, label: "Decimal", value: SendMode::Decimal },
    OptionEntry { id: 3, label: "Hex", value: SendMode::Hex },
];
