use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use port_session::{ConnectionDefaults, DisplayMode, SendMode};

// =============================================================================
// File config (figment-deserialized from defaults / uniterm.toml / env vars)
// =============================================================================
//
//   uniterm.toml:    [session]
//                    display_mode = "hex"
//
//   env var:         UNITERM_SESSION__DISPLAY_MODE=hex   (double underscore = nesting)
//
// Option values are matched case-insensitively.

/// Top-level tunable configuration, deserialized by figment.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub session: SessionFileConfig,
    #[serde(default)]
    pub send: SendFileConfig,
    #[serde(default)]
    pub log: LogFileConfig,
}

/// Receive buffer and display settings (lives under `[session]`).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionFileConfig {
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,
    #[serde(default = "default_display_mode")]
    pub display_mode: String,
}

impl Default for SessionFileConfig {
    fn default() -> Self {
        Self {
            max_bytes: default_max_bytes(),
            display_mode: default_display_mode(),
        }
    }
}

/// How typed lines are encoded (lives under `[send]`).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SendFileConfig {
    #[serde(default = "default_send_mode")]
    pub mode: String,
    #[serde(default)]
    pub append_cr: bool,
    #[serde(default = "default_append_lf")]
    pub append_lf: bool,
}

impl Default for SendFileConfig {
    fn default() -> Self {
        Self {
            mode: default_send_mode(),
            append_cr: false,
            append_lf: default_append_lf(),
        }
    }
}

/// Diagnostics (lives under `[log]`).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LogFileConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LogFileConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_max_bytes() -> usize {
    ConnectionDefaults::default().max_bytes
}
fn default_display_mode() -> String {
    DisplayMode::default().to_string()
}
fn default_send_mode() -> String {
    SendMode::default().to_string()
}
fn default_append_lf() -> bool {
    true
}
fn default_log_level() -> String {
    "info".to_string()
}

/// Default location of the config file: `<config dir>/uniterm/uniterm.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("uniterm").join("uniterm.toml"))
}

/// Build a figment that layers: defaults → uniterm.toml → UNITERM_* env vars.
///
/// A missing file is not an error; figment skips it.
pub fn load_config(path: Option<&Path>) -> figment::Figment {
    use figment::{
        Figment,
        providers::{Env, Format, Serialized, Toml},
    };

    let mut figment = Figment::from(Serialized::defaults(FileConfig::default()));
    if let Some(path) = path {
        figment = figment.merge(Toml::file(path));
    }
    figment.merge(Env::prefixed("UNITERM_").split("__"))
}

// =============================================================================
// Runtime settings (validated view of FileConfig)
// =============================================================================

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Settings {
    pub defaults: ConnectionDefaults,
    pub send_mode: SendMode,
    pub append_cr: bool,
    pub append_lf: bool,
    pub log_level: String,
}

impl Settings {
    pub fn from_file(fc: &FileConfig) -> Result<Self> {
        if fc.session.max_bytes == 0 {
            anyhow::bail!("session.max_bytes must be greater than zero");
        }
        let display_mode = fc
            .session
            .display_mode
            .parse()
            .context("Invalid session.display_mode")?;
        let send_mode = fc.send.mode.parse().context("Invalid send.mode")?;

        Ok(Self {
            defaults: ConnectionDefaults {
                max_bytes: fc.session.max_bytes,
                display_mode,
            },
            send_mode,
            append_cr: fc.send.append_cr,
            append_lf: fc.send.append_lf,
            log_level: fc.log.level.clone(),
        })
    }

    /// Resolve settings from `--config` or the default config path
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let path = config_path
            .map(Path::to_path_buf)
            .or_else(default_config_path);
        let fc: FileConfig = load_config(path.as_deref())
            .extract()
            .context("Failed to load configuration")?;
        Self::from_file(&fc)
    }
}
