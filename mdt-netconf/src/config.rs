//! Device list and runtime settings
//!
//! Handles:
//! - the device descriptor list (host, credentials, profile, port)
//! - the add-subscription template location
//! - settings file lookup (`devices.yaml` or `$MDT_NETCONF_CONFIG`)

use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

/// Environment variable overriding the settings file location
pub const CONFIG_ENV: &str = "MDT_NETCONF_CONFIG";
pub const DEFAULT_CONFIG_FILE: &str = "devices.yaml";
pub const DEFAULT_TEMPLATE_FILE: &str = "telemetry_config.hbs";
pub const DEFAULT_NETCONF_PORT: u16 = 830;
const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid settings: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("no devices configured")]
    NoDevices,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default = "default_template")]
    pub template: PathBuf,
    pub devices: Vec<DeviceDescriptor>,
}

/// Connection parameters for one device
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DeviceDescriptor {
    pub host: String,
    pub user: String,
    pub password: String,
    #[serde(rename = "dev_type", alias = "device_type", default)]
    pub device_type: DeviceProfile,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Checked against ~/.ssh/known_hosts when enabled; off unless asked for
    #[serde(default)]
    pub hostkey_verify: bool,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

/// Vendor profile selecting the NETCONF dialect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceProfile {
    #[default]
    Default,
    Iosxe,
    Csr,
    Nexus,
    Junos,
    Huawei,
}

impl DeviceProfile {
    /// Capabilities added to the client hello for this vendor
    pub fn extra_capabilities(&self) -> &'static [&'static str] {
        match self {
            DeviceProfile::Nexus => &[
                "urn:ietf:params:xml:ns:netconf:base:1.0",
                "urn:ietf:params:xml:ns:netconf:capability:startup:1.0",
                "urn:ietf:params:xml:ns:netconf:capability:writable-running:1.0",
                "urn:ietf:params:xml:ns:netconf:capability:rollback-on-error:1.0",
            ],
            DeviceProfile::Huawei => &["http://www.huawei.com/netconf/capability/base/1.0"],
            DeviceProfile::Default | DeviceProfile::Iosxe | DeviceProfile::Csr | DeviceProfile::Junos => &[],
        }
    }
}

fn default_port() -> u16 {
    DEFAULT_NETCONF_PORT
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_template() -> PathBuf {
    PathBuf::from(DEFAULT_TEMPLATE_FILE)
}

impl DeviceDescriptor {
    pub fn new(host: impl Into<String>, user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            user: user.into(),
            password: password.into(),
            device_type: DeviceProfile::default(),
            port: DEFAULT_NETCONF_PORT,
            hostkey_verify: false,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }

    pub fn with_profile(mut self, profile: DeviceProfile) -> Self {
        self.device_type = profile;
        self
    }
}

impl Settings {
    /// Settings file path: `$MDT_NETCONF_CONFIG` or `devices.yaml`
    pub fn config_file_path() -> PathBuf {
        std::env::var_os(CONFIG_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE))
    }

    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let content = std::fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let settings = Self::from_yaml(&content)?;
        info!("Loaded {} device(s) from {}", settings.devices.len(), path.display());
        Ok(settings)
    }

    pub fn from_yaml(content: &str) -> Result<Self, SettingsError> {
        let settings: Settings = serde_yaml::from_str(content)?;
        if settings.devices.is_empty() {
            return Err(SettingsError::NoDevices);
        }
        Ok(settings)
    }
}
