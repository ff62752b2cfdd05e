//! qrcraft runtime configuration handling

use crate::error::{Error, Result};
use crate::form::{EccLevel, FormDefaults};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Default remote generator endpoint
pub const DEFAULT_ENDPOINT: &str = "https://api.qrserver.com/v1/create-qr-code/";

/// Top-level configuration structure persisted to disk or environment
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct QrcraftConfig {
    /// Remote / local generator settings
    pub service: ServiceOptions,
    /// Initial form values
    pub defaults: FormDefaults,
    /// Download destination
    pub output: OutputOptions,
    /// Preference storage
    pub preferences: PreferenceOptions,
    /// Logging configuration
    pub logging: LoggingOptions,
}

impl QrcraftConfig {
    /// Load configuration from an explicit path or fall back to discovered defaults.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        let mut config = if let Some(path) = explicit_path {
            Self::from_file(path)?
        } else if let Some(path) = Self::discover_file()? {
            tracing::info!("Using configuration file: {}", path.display());
            Self::from_file(&path)?
        } else {
            tracing::debug!("No qrcraft.toml / qrcraft.yaml found, using defaults");
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Attempt to locate a configuration file in common locations.
    fn discover_file() -> Result<Option<PathBuf>> {
        let cwd =
            env::current_dir().map_err(|e| Error::Config(format!("Failed to read cwd: {e}")))?;
        for candidate in ["qrcraft.toml", "qrcraft.yaml", "qrcraft.yml"] {
            let path = cwd.join(candidate);
            if path.exists() {
                return Ok(Some(path));
            }
        }

        if let Some(base) = config_home() {
            let base = base.join("qrcraft");
            for candidate in ["config.toml", "config.yaml"] {
                let path = base.join(candidate);
                if path.exists() {
                    return Ok(Some(path));
                }
            }
        }

        Ok(None)
    }

    /// Read configuration from a concrete file path.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read {}: {e}", path.display())))?;

        match path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or("")
            .to_ascii_lowercase()
            .as_str()
        {
            "toml" => Self::from_toml_str(&contents).map_err(|e| {
                Error::Config(format!("Failed to parse TOML {}: {e}", path.display()))
            }),
            "yaml" | "yml" => serde_yaml::from_str(&contents).map_err(|e| {
                Error::Config(format!("Failed to parse YAML {}: {e}", path.display()))
            }),
            other => Err(Error::Config(format!(
                "Unsupported config format '{}', expected toml/yaml",
                other
            ))),
        }
    }

    /// Parse configuration from TOML text.
    pub fn from_toml_str(contents: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    /// Apply environment variable overrides after file/default loading.
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| env::var(key).ok());
    }

    /// Apply overrides from an arbitrary `QRCRAFT_*` lookup.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        self.service.apply_overrides(&lookup);
        self.output.apply_overrides(&lookup);
        self.preferences.apply_overrides(&lookup);
        self.logging.apply_overrides(&lookup);

        if let Some(color) = lookup("QRCRAFT_COLOR") {
            self.defaults.color = color;
        }
        if let Some(bg) = lookup("QRCRAFT_BG_COLOR") {
            self.defaults.bg_color = bg;
        }
        if let Some(size) = lookup("QRCRAFT_SIZE") {
            if let Ok(parsed) = size.parse::<u32>() {
                self.defaults.size = parsed;
            }
        }
        if let Some(ecc) = lookup("QRCRAFT_ECC") {
            if let Ok(parsed) = ecc.parse::<EccLevel>() {
                self.defaults.ecc = parsed;
            }
        }
    }
}

pub(crate) fn config_home() -> Option<PathBuf> {
    env::var_os("XDG_CONFIG_HOME")
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .or_else(|| env::var_os("HOME").map(|home| PathBuf::from(home).join(".config")))
}

/// Which generator answers requests
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Remote HTTP image generator
    #[default]
    Remote,
    /// Render locally with the `qrcode` crate
    Local,
}

impl FromStr for Backend {
    type Err = String;

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "remote" => Ok(Self::Remote),
            "local" => Ok(Self::Local),
            _ => Err(format!(
                "Unsupported backend '{value}', expected 'remote' or 'local'"
            )),
        }
    }
}

/// Campaign parameters appended to generated payloads
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UtmOptions {
    /// `utm_source`
    pub source: String,
    /// `utm_medium`
    pub medium: String,
    /// `utm_campaign`
    pub campaign: String,
}

impl Default for UtmOptions {
    fn default() -> Self {
        Self {
            source: "qr_code".to_string(),
            medium: "print".to_string(),
            campaign: "campaign_name".to_string(),
        }
    }
}

/// Generator service settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceOptions {
    /// Backend selection
    pub backend: Backend,
    /// Remote endpoint URL
    pub endpoint: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Quiet zone width in modules
    pub quiet_zone: u32,
    /// Extra margin in pixels
    pub margin: u32,
    /// User agent sent to the remote service
    pub user_agent: String,
    /// Optional campaign tagging of generated payloads
    pub utm: Option<UtmOptions>,
}

impl Default for ServiceOptions {
    fn default() -> Self {
        Self {
            backend: Backend::Remote,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            timeout_secs: 15,
            quiet_zone: 1,
            margin: 0,
            user_agent: concat!("qrcraft/", env!("CARGO_PKG_VERSION")).to_string(),
            utm: None,
        }
    }
}

impl ServiceOptions {
    pub(crate) fn apply_overrides<F>(&mut self, lookup: &F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(backend) = lookup("QRCRAFT_BACKEND") {
            match backend.parse::<Backend>() {
                Ok(parsed) => self.backend = parsed,
                Err(err) => tracing::warn!("{err}"),
            }
        }
        if let Some(endpoint) = lookup("QRCRAFT_ENDPOINT") {
            self.endpoint = endpoint;
        }
        if let Some(timeout) = lookup("QRCRAFT_TIMEOUT_SECS") {
            if let Ok(value) = timeout.parse::<u64>() {
                self.timeout_secs = value.max(1);
            }
        }
        if let Some(qzone) = lookup("QRCRAFT_QUIET_ZONE") {
            if let Ok(value) = qzone.parse::<u32>() {
                self.quiet_zone = value;
            }
        }
        if let Some(campaign) = lookup("QRCRAFT_UTM_CAMPAIGN") {
            if campaign.trim().is_empty() {
                self.utm = None;
            } else {
                let utm = self.utm.get_or_insert_with(UtmOptions::default);
                utm.campaign = campaign;
            }
        }
    }
}

/// Download destination
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputOptions {
    /// Directory downloads are written into
    pub dir: PathBuf,
}

impl Default for OutputOptions {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("."),
        }
    }
}

impl OutputOptions {
    pub(crate) fn apply_overrides<F>(&mut self, lookup: &F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup("QRCRAFT_OUTPUT_DIR") {
            self.dir = PathBuf::from(dir);
        }
    }
}

/// Where the dark-mode preference lives
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PreferenceOptions {
    /// Explicit preference file; defaults to `$XDG_CONFIG_HOME/qrcraft/preferences.json`
    pub path: Option<PathBuf>,
}

impl PreferenceOptions {
    pub(crate) fn apply_overrides<F>(&mut self, lookup: &F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup("QRCRAFT_PREFERENCES") {
            self.path = Some(PathBuf::from(path));
        }
    }

    /// Resolved preference file path
    pub fn resolve(&self) -> Result<PathBuf> {
        if let Some(path) = &self.path {
            return Ok(path.clone());
        }
        config_home()
            .map(|base| base.join("qrcraft").join("preferences.json"))
            .ok_or_else(|| {
                Error::Config("Cannot locate a config directory for preferences".to_string())
            })
    }
}

/// Structured logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingOptions {
    /// Default log level (overridable via `QRCRAFT_LOG_LEVEL`)
    pub level: String,
    /// Optional log file path for teeing structured logs
    pub file: Option<PathBuf>,
    /// Force ANSI colors in stderr logging
    pub color: bool,
    /// Optional log rotation strategy applied to `file`
    pub rotation: Option<LogRotation>,
}

impl Default for LoggingOptions {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            file: None,
            color: true,
            rotation: None,
        }
    }
}

impl LoggingOptions {
    pub(crate) fn apply_overrides<F>(&mut self, lookup: &F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(level) = lookup("QRCRAFT_LOG_LEVEL") {
            self.level = level;
        }
        if let Some(file) = lookup("QRCRAFT_LOG_FILE") {
            self.file = Some(PathBuf::from(file));
        }
        if let Some(color) = lookup("QRCRAFT_LOG_COLOR") {
            match color.to_ascii_lowercase().as_str() {
                "0" | "false" | "off" => self.color = false,
                "1" | "true" | "on" => self.color = true,
                _ => {}
            }
        }
        if let Some(rotation) = lookup("QRCRAFT_LOG_ROTATION") {
            if let Some(parsed) = LogRotation::parse(&rotation) {
                self.rotation = Some(parsed);
            }
        }
    }
}

/// Supported log rotation policies for file sinks
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    /// Rotate log files once per hour
    Hourly,
    /// Rotate log files once per day
    Daily,
}

impl LogRotation {
    fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "hourly" => Some(Self::Hourly),
            "daily" => Some(Self::Daily),
            _ => None,
        }
    }
}
