use port_session::DisplayMode;

/// Render received bytes for display and for the log file.
///
/// Numeric modes end every value with a space so consecutive chunks can be
/// concatenated.
pub fn format_bytes(bytes: &[u8], mode: DisplayMode) -> String {
    match mode {
        // Ansi escapes are passed through for the terminal to render
        DisplayMode::Ascii | DisplayMode::Ansi => String::from_utf8_lossy(bytes).into_owned(),
        DisplayMode::Decimal => bytes.iter().map(|b| format!("{b} ")).collect(),
        DisplayMode::Hex => bytes.iter().map(|b| format!("{b:#04x} ")).collect(),
    }
}
