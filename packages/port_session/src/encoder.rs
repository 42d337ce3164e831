//! Turns typed user input into the bytes sent out of the serial port.
//!
//! In Decimal and Hex mode the input is a list of numbers separated by
//! whitespace or commas. Every number must fit in a byte; a single bad token
//! rejects the whole frame so nothing is ever partially sent.

use crate::error::EncodeError;
use crate::options::SendMode;

pub const CR: u8 = 0x0d;
pub const LF: u8 = 0x0a;

/// A validated outbound byte sequence, terminators included
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Frame(Vec<u8>);

impl Frame {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.0
    }
}

impl From<Vec<u8>> for Frame {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

/// Encode `raw` under `mode`, then append CR and/or LF (in that order).
pub fn encode(
    raw: &str,
    mode: SendMode,
    append_cr: bool,
    append_lf: bool,
) -> Result<Frame, EncodeError> {
    let mut bytes = match mode {
        SendMode::Ascii => raw.as_bytes().to_vec(),
        SendMode::Decimal | SendMode::Hex => tokens(raw)
            .map(|token| parse_byte(token, mode))
            .collect::<Result<Vec<u8>, EncodeError>>()?,
    };

    if append_cr {
        bytes.push(CR);
    }
    if append_lf {
        bytes.push(LF);
    }
    Ok(Frame(bytes))
}

/// Validate a single code for one-shot transmission.
pub fn encode_single_byte(value: u32) -> Result<u8, EncodeError> {
    u8::try_from(value).map_err(|_| EncodeError::ValueOutOfRange {
        token: value.to_string(),
        value: u64::from(value),
    })
}

fn tokens(raw: &str) -> impl Iterator<Item = &str> {
    raw.split(|c: char| c.is_ascii_whitespace() || c == ',' || c == '，')
        .filter(|token| !token.is_empty())
}

fn parse_byte(token: &str, mode: SendMode) -> Result<u8, EncodeError> {
    let (digits, radix) = match mode {
        SendMode::Hex => (
            token
                .strip_prefix("0x")
                .or_else(|| token.strip_prefix("0X"))
                .unwrap_or(token),
            16,
        ),
        _ => (token, 10),
    };

    let invalid = || EncodeError::InvalidToken {
        token: token.to_string(),
        mode,
    };
    if digits.is_empty() || !digits.chars().all(|c| c.is_digit(radix)) {
        return Err(invalid());
    }

    // Only overflow can fail here; saturate so it reports as out of range
    let value = u64::from_str_radix(digits, radix).unwrap_or(u64::MAX);
    u8::try_from(value).map_err(|_| EncodeError::ValueOutOfRange {
        token: token.to_string(),
        value,
    })
}
