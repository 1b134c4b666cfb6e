//! Configuration loading and config file resolution
//!
//! The service is configured by a single TOML file. Every field has a
//! built-in default, so a missing file only produces a warning. A file that
//! exists but cannot be parsed or fails validation is a startup error.

use crate::types::BackendKind;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "BLUEMGR_CONFIG";

/// Highest volume accepted in configuration (percent). The audio server
/// allows software amplification above 100%.
pub const MAX_VOLUME_PERCENT: u8 = 150;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Bootstrap configuration loaded from TOML file
///
/// Settings cannot change while running; restart to pick up edits.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TomlConfig {
    /// HTTP server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// HTTP bind address
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub commands: CommandsConfig,

    #[serde(default)]
    pub arbitration: ArbitrationConfig,

    #[serde(default)]
    pub pairing: PairingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

/// External command names and execution limits
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CommandsConfig {
    #[serde(default = "default_bluetoothctl")]
    pub bluetoothctl: String,

    #[serde(default = "default_pactl")]
    pub pactl: String,

    /// Audio server daemon binary, used for restarts
    #[serde(default = "default_pulseaudio")]
    pub pulseaudio: String,

    /// Per-command timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// systemd unit of the playback client restarted after pairing.
    /// Empty disables the restart.
    #[serde(default = "default_playback_service")]
    pub playback_service: String,

    /// Prefix `systemctl` with `sudo`
    #[serde(default = "default_true")]
    pub use_sudo: bool,
}

/// One arbitration priority class
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct PriorityEntry {
    pub kind: BackendKind,
    /// Sink name fragment identifying the class
    pub prefix: String,
}

/// Priority arbitration loop settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ArbitrationConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Seconds between evaluation cycles
    #[serde(default = "default_period_secs")]
    pub period_secs: u64,

    /// Volume applied when arbitration switches the default sink (percent)
    #[serde(default = "default_takeover_volume")]
    pub takeover_volume: u8,

    /// Priority classes, highest first
    #[serde(default = "default_priorities")]
    pub priorities: Vec<PriorityEntry>,
}

/// Pairing workflow settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PairingConfig {
    /// Volume applied to a freshly paired sink (percent)
    #[serde(default = "default_activation_volume")]
    pub activation_volume: u8,

    #[serde(default = "default_connect_attempts")]
    pub connect_attempts: u32,

    /// Polls (one second apart) waiting for the Bluetooth sink to appear
    #[serde(default = "default_sink_wait_polls")]
    pub sink_wait_polls: u32,

    /// Card profiles tried in order until one is accepted
    #[serde(default = "default_profiles")]
    pub profiles: Vec<String>,

    /// Discovery duration for scan requests, in seconds
    #[serde(default = "default_scan_secs")]
    pub scan_secs: u64,
}

fn default_port() -> u16 {
    5000
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_bluetoothctl() -> String {
    "bluetoothctl".to_string()
}

fn default_pactl() -> String {
    "pactl".to_string()
}

fn default_pulseaudio() -> String {
    "pulseaudio".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_playback_service() -> String {
    "raspotify".to_string()
}

fn default_true() -> bool {
    true
}

fn default_period_secs() -> u64 {
    5
}

fn default_takeover_volume() -> u8 {
    100
}

fn default_priorities() -> Vec<PriorityEntry> {
    vec![
        PriorityEntry {
            kind: BackendKind::Bluetooth,
            prefix: "bluez_sink".to_string(),
        },
        PriorityEntry {
            kind: BackendKind::Onboard,
            prefix: "alsa_output.platform-bcm2835".to_string(),
        },
        PriorityEntry {
            kind: BackendKind::Hat,
            prefix: "alsa_output.platform-soc_sound.googlevoicehat".to_string(),
        },
    ]
}

fn default_activation_volume() -> u8 {
    80
}

fn default_connect_attempts() -> u32 {
    5
}

fn default_sink_wait_polls() -> u32 {
    25
}

fn default_profiles() -> Vec<String> {
    vec![
        "a2dp-sink".to_string(),
        "a2dp_sink".to_string(),
        "a2dp".to_string(),
    ]
}

fn default_scan_secs() -> u64 {
    5
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind_address: default_bind_address(),
            logging: LoggingConfig::default(),
            commands: CommandsConfig::default(),
            arbitration: ArbitrationConfig::default(),
            pairing: PairingConfig::default(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Default for CommandsConfig {
    fn default() -> Self {
        Self {
            bluetoothctl: default_bluetoothctl(),
            pactl: default_pactl(),
            pulseaudio: default_pulseaudio(),
            timeout_secs: default_timeout_secs(),
            playback_service: default_playback_service(),
            use_sudo: true,
        }
    }
}

impl Default for ArbitrationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            period_secs: default_period_secs(),
            takeover_volume: default_takeover_volume(),
            priorities: default_priorities(),
        }
    }
}

impl Default for PairingConfig {
    fn default() -> Self {
        Self {
            activation_volume: default_activation_volume(),
            connect_attempts: default_connect_attempts(),
            sink_wait_polls: default_sink_wait_polls(),
            profiles: default_profiles(),
            scan_secs: default_scan_secs(),
        }
    }
}

impl TomlConfig {
    /// Parse and validate configuration text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: TomlConfig = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Invalid TOML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a configuration file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }

    /// Check value ranges that serde cannot express
    pub fn validate(&self) -> Result<()> {
        if !LOG_LEVELS.contains(&self.logging.level.to_ascii_lowercase().as_str()) {
            return Err(Error::Config(format!(
                "logging.level must be one of {:?}, got {:?}",
                LOG_LEVELS, self.logging.level
            )));
        }

        if self.commands.timeout_secs == 0 {
            return Err(Error::Config("commands.timeout_secs must be > 0".to_string()));
        }

        if self.arbitration.period_secs == 0 {
            return Err(Error::Config("arbitration.period_secs must be > 0".to_string()));
        }

        if self.arbitration.priorities.is_empty() {
            return Err(Error::Config("arbitration.priorities must not be empty".to_string()));
        }

        if let Some(entry) = self.arbitration.priorities.iter().find(|p| p.prefix.trim().is_empty()) {
            return Err(Error::Config(format!(
                "arbitration.priorities entry for {} has an empty prefix",
                entry.kind
            )));
        }

        for (name, volume) in [
            ("arbitration.takeover_volume", self.arbitration.takeover_volume),
            ("pairing.activation_volume", self.pairing.activation_volume),
        ] {
            if volume > MAX_VOLUME_PERCENT {
                return Err(Error::Config(format!(
                    "{} must be <= {}, got {}",
                    name, MAX_VOLUME_PERCENT, volume
                )));
            }
        }

        if self.pairing.connect_attempts == 0 {
            return Err(Error::Config("pairing.connect_attempts must be >= 1".to_string()));
        }

        if self.pairing.sink_wait_polls == 0 {
            return Err(Error::Config("pairing.sink_wait_polls must be >= 1".to_string()));
        }

        if self.pairing.profiles.is_empty() {
            return Err(Error::Config("pairing.profiles must not be empty".to_string()));
        }

        Ok(())
    }
}

/// Config file resolution following priority order:
/// 1. Command-line argument (highest priority)
/// 2. Environment variable `BLUEMGR_CONFIG`
/// 3. User config directory (`~/.config/bluemgr/config.toml`)
/// 4. System config (`/etc/bluemgr/config.toml`)
///
/// If none of these exist, compiled defaults are used.
pub struct ConfigResolver {
    cli_path: Option<PathBuf>,
}

impl ConfigResolver {
    pub fn new(cli_path: Option<PathBuf>) -> Self {
        Self { cli_path }
    }

    /// Find the highest-priority config file candidate that exists
    pub fn locate(&self) -> Option<PathBuf> {
        self.candidates().into_iter().find(|p| p.exists())
    }

    /// Load the located config file, or defaults if there is none
    pub fn load(&self) -> Result<TomlConfig> {
        if let Some(explicit) = self.explicit_path() {
            if !explicit.exists() {
                warn!(
                    "Config file {} does not exist, falling back to search paths",
                    explicit.display()
                );
            }
        }

        match self.locate() {
            Some(path) => {
                info!("Loading configuration from {}", path.display());
                TomlConfig::load(&path)
            }
            None => {
                warn!("No config file found, using built-in defaults");
                Ok(TomlConfig::default())
            }
        }
    }

    fn explicit_path(&self) -> Option<PathBuf> {
        self.cli_path
            .clone()
            .or_else(|| std::env::var(CONFIG_ENV_VAR).ok().map(PathBuf::from))
    }

    fn candidates(&self) -> Vec<PathBuf> {
        let mut candidates = Vec::new();

        if let Some(path) = &self.cli_path {
            candidates.push(path.clone());
        }
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            candidates.push(PathBuf::from(path));
        }
        if let Some(dir) = dirs::config_dir() {
            candidates.push(dir.join("bluemgr").join("config.toml"));
        }
        candidates.push(PathBuf::from("/etc/bluemgr/config.toml"));

        candidates
    }
}
