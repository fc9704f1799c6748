//! Bootstrap configuration loading
//!
//! Configuration file resolution follows a fixed priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable (`PRESENCE_CONFIG`)
//! 3. User config directory (`~/.config/presence/presence.toml` on Linux)
//! 4. Compiled defaults (fallback)
//!
//! A missing config file is never fatal: the service logs a warning and
//! starts with compiled defaults.

use crate::policy::{AttendanceAnchor, AttendanceWindow};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "PRESENCE_CONFIG";

/// Config file name inside the platform config directory
pub const CONFIG_FILE_NAME: &str = "presence.toml";

/// Bootstrap configuration loaded from TOML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TomlConfig {
    /// HTTP server port
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub policy: PolicyConfig,

    #[serde(default)]
    pub ip_lookup: IpLookupConfig,

    #[serde(default)]
    pub qr: QrConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (logs to stderr if not specified)
    #[serde(default)]
    pub file: Option<PathBuf>,
}

/// Attendance policy and verification timing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    #[serde(default)]
    pub anchor: AttendanceAnchor,

    #[serde(default)]
    pub window: AttendanceWindow,

    /// Bounded wait for a one-shot location fix
    #[serde(default = "default_location_timeout_ms")]
    pub location_timeout_ms: u64,

    /// Reject QR tokens older than this; unset disables the freshness check
    #[serde(default)]
    pub qr_max_age_secs: Option<u64>,

    /// How long submission waits for outstanding enrichment (address, IP)
    #[serde(default = "default_enrichment_grace_ms")]
    pub enrichment_grace_ms: u64,
}

/// Public IP lookup (best-effort enrichment of submitted records)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IpLookupConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Endpoint returning `{"ip": "..."}`
    #[serde(default = "default_ip_lookup_url")]
    pub url: String,
}

/// QR decoding backend selection
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QrConfig {
    #[serde(default)]
    pub decoder: QrDecoderKind,
}

/// Which decoder turns a captured frame into a QR payload
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QrDecoderKind {
    /// Frame bytes already carry the decoded payload (decoded on the client)
    #[default]
    Passthrough,
    /// Fabricates a fresh valid payload for every frame (demo installs)
    Simulated,
}

fn default_port() -> u16 {
    5790
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_location_timeout_ms() -> u64 {
    10_000
}

fn default_enrichment_grace_ms() -> u64 {
    1_500
}

fn default_true() -> bool {
    true
}

fn default_ip_lookup_url() -> String {
    "https://api.ipify.org?format=json".to_string()
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            logging: LoggingConfig::default(),
            policy: PolicyConfig::default(),
            ip_lookup: IpLookupConfig::default(),
            qr: QrConfig::default(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            anchor: AttendanceAnchor::default(),
            window: AttendanceWindow::default(),
            location_timeout_ms: default_location_timeout_ms(),
            qr_max_age_secs: None,
            enrichment_grace_ms: default_enrichment_grace_ms(),
        }
    }
}

impl Default for IpLookupConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            url: default_ip_lookup_url(),
        }
    }
}

impl PolicyConfig {
    pub fn location_timeout(&self) -> Duration {
        Duration::from_millis(self.location_timeout_ms)
    }

    pub fn enrichment_grace(&self) -> Duration {
        Duration::from_millis(self.enrichment_grace_ms)
    }

    pub fn qr_max_age(&self) -> Option<Duration> {
        self.qr_max_age_secs.map(Duration::from_secs)
    }
}

impl TomlConfig {
    /// Parse and validate a config file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: TomlConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.policy.anchor.validate()?;
        self.policy.window.validate()?;
        if self.policy.location_timeout_ms == 0 {
            return Err(Error::Config(
                "location_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.ip_lookup.enabled && self.ip_lookup.url.trim().is_empty() {
            return Err(Error::Config(
                "ip_lookup.url is empty while ip_lookup is enabled".to_string(),
            ));
        }
        Ok(())
    }
}

/// Resolves which config file to load and loads it
pub struct ConfigResolver {
    cli_path: Option<PathBuf>,
}

impl ConfigResolver {
    pub fn new(cli_path: Option<PathBuf>) -> Self {
        Self { cli_path }
    }

    /// Locate the config file by priority; `None` means compiled defaults
    pub fn locate(&self) -> Option<PathBuf> {
        // Priority 1: Command-line argument
        if let Some(path) = &self.cli_path {
            return Some(path.clone());
        }

        // Priority 2: Environment variable
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            if !path.trim().is_empty() {
                return Some(PathBuf::from(path));
            }
        }

        // Priority 3: Platform config directory
        let user_config = dirs::config_dir().map(|d| d.join("presence").join(CONFIG_FILE_NAME))?;
        if user_config.exists() {
            Some(user_config)
        } else {
            None
        }
    }

    /// Load configuration, degrading to defaults when the file is missing
    ///
    /// A file that exists but fails to parse or validate is an error; only
    /// absence falls back to defaults.
    pub fn load(&self) -> Result<TomlConfig> {
        let Some(path) = self.locate() else {
            info!("No config file found, using compiled defaults");
            return Ok(TomlConfig::default());
        };

        if !path.exists() {
            warn!(
                "Config file {} not found, using compiled defaults",
                path.display()
            );
            return Ok(TomlConfig::default());
        }

        let config = TomlConfig::load(&path)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_current_policy() {
        let config = TomlConfig::default();
        assert_eq!(config.policy.anchor.radius_meters, 100.0);
        assert_eq!(config.policy.window, AttendanceWindow::new(9, 10));
        assert_eq!(config.policy.location_timeout(), Duration::from_secs(10));
        assert!(config.policy.qr_max_age().is_none());
        assert_eq!(config.qr.decoder, QrDecoderKind::Passthrough);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: TomlConfig = toml::from_str(
            r#"
            port = 6000

            [policy.window]
            start_hour = 8
            end_hour = 11
            "#,
        )
        .unwrap();

        assert_eq!(config.port, 6000);
        assert_eq!(config.policy.window, AttendanceWindow::new(8, 11));
        assert_eq!(config.policy.anchor, AttendanceAnchor::default());
        assert_eq!(config.logging.level, "info");
        assert!(config.ip_lookup.enabled);
    }

    #[test]
    fn test_decoder_kind_lowercase() {
        let config: TomlConfig = toml::from_str("[qr]\ndecoder = \"simulated\"\n").unwrap();
        assert_eq!(config.qr.decoder, QrDecoderKind::Simulated);
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let mut config = TomlConfig::default();
        config.policy.location_timeout_ms = 0;
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }
}
