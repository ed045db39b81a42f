//! # EdgeLink Configuration
//!
//! Device identity and tool settings for both binaries.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     EDGELINK_HOST_NAME=my-hub.azure-devices.net                        │
//! │     EDGELINK_DEVICE_ID=edge-01                                         │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     -c <file>, else /etc/edgelink/edgelink.toml, else                  │
//! │     ~/.config/edgelink/edgelink.toml (Linux)                           │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! [device]
//! host_name = "my-hub.azure-devices.net"
//! device_id = "edge-01"
//! cert_file = "/etc/edgelink/device.pem"
//! key_file  = "/etc/edgelink/device.key"
//!
//! [provisioning]
//! endpoint = "global.azure-devices-provisioning.net"
//! id_scope = "0ne000ABCDE"
//!
//! [transport]
//! kind = "loopback"
//! trace = true
//!
//! [delivery]
//! max_files = 1024
//! max_payload_bytes = 262144
//! poll_interval_ms = 1
//! clean_up = true
//! exit_policy = "completion"
//! ```
//!
//! When only `key_file` is set, its contents are the full pre-shared
//! connection string rather than a private key.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

use edgelink_core::{ConnectParams, ConnectionString, DEFAULT_MAX_FILES};

use crate::connector::SessionSettings;
use crate::delivery::ExitPolicy;
use crate::error::{CloudError, CloudResult};

/// System-wide configuration file, checked before the per-user one.
pub const SYSTEM_CONFIG_PATH: &str = "/etc/edgelink/edgelink.toml";

// =============================================================================
// Transport Kind
// =============================================================================

/// Which transport SDK binding to drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    /// In-process simulation; nothing leaves the device.
    #[default]
    Loopback,
}

impl TransportKind {
    /// Whether a confirmed send means the payload left the device. Cleanup
    /// only deletes files for transports that really deliver.
    pub fn delivers(&self) -> bool {
        match self {
            TransportKind::Loopback => false,
        }
    }
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportKind::Loopback => write!(f, "loopback"),
        }
    }
}

impl std::str::FromStr for TransportKind {
    type Err = CloudError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "loopback" | "dry-run" => Ok(TransportKind::Loopback),
            other => Err(CloudError::InvalidConfig(format!(
                "Unknown transport kind: '{}'. Valid options: loopback",
                other
            ))),
        }
    }
}

// =============================================================================
// Sections
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceSettings {
    #[serde(default)]
    pub host_name: String,

    #[serde(default)]
    pub device_id: String,

    /// PEM certificate. Certificate auth needs both this and `key_file`.
    #[serde(default)]
    pub cert_file: Option<PathBuf>,

    /// PEM private key, or a connection string when `cert_file` is unset.
    #[serde(default)]
    pub key_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisioningSettings {
    #[serde(default = "default_provisioning_endpoint")]
    pub endpoint: String,

    #[serde(default)]
    pub id_scope: String,
}

fn default_provisioning_endpoint() -> String {
    "global.azure-devices-provisioning.net".to_string()
}

impl Default for ProvisioningSettings {
    fn default() -> Self {
        ProvisioningSettings {
            endpoint: default_provisioning_endpoint(),
            id_scope: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportSettings {
    #[serde(default)]
    pub kind: TransportKind,

    /// SDK-level protocol tracing.
    #[serde(default = "default_true")]
    pub trace: bool,

    #[serde(default)]
    pub trusted_cert_file: Option<PathBuf>,
}

impl Default for TransportSettings {
    fn default() -> Self {
        TransportSettings {
            kind: TransportKind::default(),
            trace: true,
            trusted_cert_file: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliverySettings {
    #[serde(default = "default_max_files")]
    pub max_files: usize,

    /// Files larger than this are skipped, not truncated.
    #[serde(default = "default_max_payload_bytes")]
    pub max_payload_bytes: u64,

    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Delete delivered files at the end of the run.
    #[serde(default = "default_true")]
    pub clean_up: bool,

    #[serde(default)]
    pub exit_policy: ExitPolicy,
}

fn default_true() -> bool {
    true
}
fn default_max_files() -> usize {
    DEFAULT_MAX_FILES
}
fn default_max_payload_bytes() -> u64 {
    256 * 1024
}
fn default_poll_interval() -> u64 {
    1
}

impl Default for DeliverySettings {
    fn default() -> Self {
        DeliverySettings {
            max_files: default_max_files(),
            max_payload_bytes: default_max_payload_bytes(),
            poll_interval_ms: default_poll_interval(),
            clean_up: true,
            exit_policy: ExitPolicy::default(),
        }
    }
}

// =============================================================================
// Settings
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub device: DeviceSettings,

    #[serde(default)]
    pub provisioning: ProvisioningSettings,

    #[serde(default)]
    pub transport: TransportSettings,

    #[serde(default)]
    pub delivery: DeliverySettings,
}

impl Settings {
    /// Loads a config file, then applies environment overrides.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (`path`, else [`Settings::default_config_path`])
    /// 3. Environment variables
    ///
    /// The file must exist.
    pub fn load(path: Option<&Path>) -> CloudResult<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::default_config_path().ok_or_else(|| {
                CloudError::ConfigLoadFailed("No config path available".into())
            })?,
        };

        let mut settings = Self::from_file(&path)?;
        settings.apply_env_overrides();
        Ok(settings)
    }

    /// Defaults plus environment overrides, for runs that take identity from
    /// a connection string file.
    pub fn from_env() -> Self {
        let mut settings = Self::default();
        settings.apply_env_overrides();
        settings
    }

    pub fn from_file(path: &Path) -> CloudResult<Self> {
        if !path.is_file() {
            return Err(CloudError::MissingFile(path.to_path_buf()));
        }
        info!(path = %path.display(), "Loading config");
        let contents = fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }

    /// `/etc/edgelink/edgelink.toml` if present, else the per-user config dir.
    pub fn default_config_path() -> Option<PathBuf> {
        let system = PathBuf::from(SYSTEM_CONFIG_PATH);
        if system.is_file() {
            return Some(system);
        }
        directories::ProjectDirs::from("io", "edgelink", "edgelink")
            .map(|dirs| dirs.config_dir().join("edgelink.toml"))
    }

    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(host) = lookup("EDGELINK_HOST_NAME") {
            debug!(host = %host, "Overriding host name from environment");
            self.device.host_name = host;
        }
        if let Some(id) = lookup("EDGELINK_DEVICE_ID") {
            debug!(device_id = %id, "Overriding device ID from environment");
            self.device.device_id = id;
        }
        if let Some(cert) = lookup("EDGELINK_CERT_FILE") {
            self.device.cert_file = Some(PathBuf::from(cert));
        }
        if let Some(key) = lookup("EDGELINK_KEY_FILE") {
            self.device.key_file = Some(PathBuf::from(key));
        }
        if let Some(endpoint) = lookup("EDGELINK_DPS_ENDPOINT") {
            self.provisioning.endpoint = endpoint;
        }
        if let Some(scope) = lookup("EDGELINK_DPS_ID_SCOPE") {
            self.provisioning.id_scope = scope;
        }
        if let Some(interval) = lookup("EDGELINK_POLL_INTERVAL_MS") {
            match interval.parse::<u64>() {
                Ok(ms) => self.delivery.poll_interval_ms = ms,
                Err(_) => warn!(value = %interval, "Ignoring invalid EDGELINK_POLL_INTERVAL_MS"),
            }
        }
    }

    // =========================================================================
    // Validation
    // =========================================================================

    /// Checks tool settings and any referenced files.
    pub fn validate(&self) -> CloudResult<()> {
        if self.delivery.max_files == 0 {
            return Err(CloudError::InvalidConfig(
                "max_files must be greater than 0".into(),
            ));
        }
        if self.delivery.poll_interval_ms == 0 {
            return Err(CloudError::InvalidConfig(
                "poll_interval_ms must be greater than 0".into(),
            ));
        }

        let files = [
            &self.device.cert_file,
            &self.device.key_file,
            &self.transport.trusted_cert_file,
        ];
        for path in files.into_iter().flatten() {
            if !path.is_file() {
                return Err(CloudError::MissingFile(path.clone()));
            }
        }
        Ok(())
    }

    /// Checks that the config names a device.
    pub fn validate_identity(&self) -> CloudResult<()> {
        self.validate()?;
        require("device.host_name", &self.device.host_name)?;
        require("device.device_id", &self.device.device_id)
    }

    /// Checks what registration needs on top of [`Settings::validate_identity`].
    pub fn validate_provisioning(&self) -> CloudResult<()> {
        self.validate_identity()?;
        require("provisioning.endpoint", &self.provisioning.endpoint)?;
        require("provisioning.id_scope", &self.provisioning.id_scope)
    }

    // =========================================================================
    // Derived Values
    // =========================================================================

    /// Builds the identity bundle, reading certificate and key material.
    pub fn connect_params(&self) -> CloudResult<ConnectParams> {
        let cert = read_material(self.device.cert_file.as_deref())?;
        let key = read_material(self.device.key_file.as_deref())?;

        Ok(ConnectParams {
            host_name: self.device.host_name.clone(),
            provisioning_endpoint: self.provisioning.endpoint.clone(),
            id_scope: self.provisioning.id_scope.clone(),
            device_id: self.device.device_id.clone(),
            cert,
            key,
        })
    }

    pub fn session_settings(&self) -> CloudResult<SessionSettings> {
        let trusted_cert = match &self.transport.trusted_cert_file {
            Some(path) => Some(read_material(Some(path.as_path()))?),
            None => None,
        };
        Ok(SessionSettings {
            trace: self.transport.trace,
            auto_url_encode: true,
            trusted_cert,
        })
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.delivery.poll_interval_ms.max(1))
    }
}

/// Identity from a file holding a pre-shared connection string (`-C`).
///
/// Certificate auth is never used on this path.
pub fn params_from_connection_string(path: &Path) -> CloudResult<ConnectParams> {
    let raw = read_material(Some(path))?;
    let parsed: ConnectionString = raw
        .trim()
        .parse()
        .map_err(|e| CloudError::InvalidConfig(format!("{}: {}", path.display(), e)))?;

    Ok(ConnectParams {
        host_name: parsed.host_name,
        device_id: parsed.device_id,
        key: raw.trim().to_string(),
        ..Default::default()
    })
}

fn require(field: &str, value: &str) -> CloudResult<()> {
    if value.trim().is_empty() {
        Err(CloudError::InvalidConfig(format!("{} is required", field)))
    } else {
        Ok(())
    }
}

fn read_material(path: Option<&Path>) -> CloudResult<String> {
    let Some(path) = path else {
        return Ok(String::new());
    };
    fs::read_to_string(path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => CloudError::MissingFile(path.to_path_buf()),
        _ => CloudError::ConfigLoadFailed(format!("{}: {}", path.display(), e)),
    })
}
