//! # Device Identity
//!
//! [`ConnectParams`] is the identity and credential bundle handed to the
//! connector for one connect or register attempt. [`ConnectionString`] is the
//! parsed form of the credential string a transport session is opened with.
//!
//! ## Authentication Modes
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Credential Selection                               │
//! │                                                                         │
//! │  cert non-empty AND key non-empty                                      │
//! │  ──────────────────────────────────                                    │
//! │  is_x509 = true                                                        │
//! │  credential = "HostName=<host>;DeviceId=<id>;x509=true"                │
//! │  cert + key are applied later as session options                       │
//! │                                                                         │
//! │  otherwise                                                             │
//! │  ─────────                                                             │
//! │  is_x509 = false                                                       │
//! │  credential = key material, which holds a full pre-shared             │
//! │  "HostName=..;DeviceId=..;SharedAccessKey=.." string                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::fmt;
use std::str::FromStr;

use crate::error::ValidationError;

// =============================================================================
// Connect Parameters
// =============================================================================

/// Identity and credential bundle for one connect / register attempt.
///
/// Built once by configuration loading and read-only thereafter.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ConnectParams {
    /// Telemetry endpoint host (e.g. `my-hub.azure-devices.net`).
    pub host_name: String,

    /// Provisioning service endpoint.
    pub provisioning_endpoint: String,

    /// Provisioning scope id.
    pub id_scope: String,

    pub device_id: String,

    /// PEM certificate contents (empty when not using certificates).
    pub cert: String,

    /// Private key contents, or the pre-shared connection string.
    pub key: String,
}

impl ConnectParams {
    /// True iff both certificate and key material are present.
    pub fn is_x509(&self) -> bool {
        !self.cert.is_empty() && !self.key.is_empty()
    }

    /// Builds the credential string a transport session is created with.
    pub fn credential(&self) -> String {
        if self.is_x509() {
            ConnectionString {
                host_name: self.host_name.clone(),
                device_id: self.device_id.clone(),
                auth: DeviceAuth::X509,
            }
            .to_string()
        } else {
            self.key.trim().to_string()
        }
    }
}

impl fmt::Debug for ConnectParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectParams")
            .field("host_name", &self.host_name)
            .field("provisioning_endpoint", &self.provisioning_endpoint)
            .field("id_scope", &self.id_scope)
            .field("device_id", &self.device_id)
            .field("cert", &redacted(&self.cert))
            .field("key", &redacted(&self.key))
            .field("is_x509", &self.is_x509())
            .finish()
    }
}

fn redacted(material: &str) -> &'static str {
    if material.is_empty() {
        "<empty>"
    } else {
        "<redacted>"
    }
}

// =============================================================================
// Connection String
// =============================================================================

/// How the device proves its identity to the endpoint.
#[derive(Clone, PartialEq, Eq)]
pub enum DeviceAuth {
    SharedAccessKey(String),
    X509,
}

impl fmt::Debug for DeviceAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceAuth::SharedAccessKey(_) => f.write_str("SharedAccessKey(<redacted>)"),
            DeviceAuth::X509 => f.write_str("X509"),
        }
    }
}

/// Parsed `HostName=..;DeviceId=..;(SharedAccessKey=..|x509=true)` string.
///
/// Keys are matched case-insensitively; unknown keys (e.g. `GatewayHostName`)
/// are ignored. Values may themselves contain `=` (base64 keys do).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionString {
    pub host_name: String,
    pub device_id: String,
    pub auth: DeviceAuth,
}

const FIELD: &str = "connection string";

impl FromStr for ConnectionString {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut host_name = None;
        let mut device_id = None;
        let mut access_key = None;
        let mut x509 = false;

        for segment in s.trim().split(';').filter(|seg| !seg.trim().is_empty()) {
            let (key, value) =
                segment
                    .split_once('=')
                    .ok_or_else(|| ValidationError::InvalidFormat {
                        field: FIELD.to_string(),
                        reason: format!("segment '{}' has no '='", segment.trim()),
                    })?;
            let value = value.trim();

            match key.trim().to_ascii_lowercase().as_str() {
                "hostname" => host_name = Some(value.to_string()),
                "deviceid" => device_id = Some(value.to_string()),
                "sharedaccesskey" => access_key = Some(value.to_string()),
                "x509" => x509 = value.eq_ignore_ascii_case("true"),
                _ => {}
            }
        }

        let host_name = non_empty(host_name, "HostName")?;
        let device_id = non_empty(device_id, "DeviceId")?;

        let auth = match (access_key, x509) {
            (Some(key), false) if !key.is_empty() => DeviceAuth::SharedAccessKey(key),
            (None, true) => DeviceAuth::X509,
            (Some(_), true) => {
                return Err(ValidationError::InvalidFormat {
                    field: FIELD.to_string(),
                    reason: "both SharedAccessKey and x509 are set".to_string(),
                })
            }
            _ => {
                return Err(ValidationError::Required {
                    field: "SharedAccessKey or x509".to_string(),
                })
            }
        };

        Ok(ConnectionString {
            host_name,
            device_id,
            auth,
        })
    }
}

fn non_empty(value: Option<String>, field: &str) -> Result<String, ValidationError> {
    match value {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(ValidationError::Required {
            field: field.to_string(),
        }),
    }
}

impl fmt::Display for ConnectionString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HostName={};DeviceId={};", self.host_name, self.device_id)?;
        match &self.auth {
            DeviceAuth::SharedAccessKey(key) => write!(f, "SharedAccessKey={}", key),
            DeviceAuth::X509 => f.write_str("x509=true"),
        }
    }
}
