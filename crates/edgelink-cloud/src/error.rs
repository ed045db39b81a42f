//! # Cloud Error Types
//!
//! Error types for connector, configuration and file operations.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Cloud Error Categories                            │
//! │                                                                         │
//! │  ┌──────────────────┐  ┌──────────────────┐  ┌──────────────────────┐  │
//! │  │  Setup (fatal)   │  │  Preconditions   │  │  Per-item            │  │
//! │  │                  │  │                  │  │                      │  │
//! │  │  InitError       │  │  NotInitialized  │  │  SendRejected        │  │
//! │  │  SessionCreate   │  │  AlreadyInit..   │  │  PayloadUnreadable   │  │
//! │  │  SessionOption   │  │  AlreadyConnected│  │                      │  │
//! │  │  Provisioning..  │  │  AlreadyRegist.. │  │                      │  │
//! │  │  RegisterRequest │  │  NotConnected    │  │                      │  │
//! │  └──────────────────┘  └──────────────────┘  └──────────────────────┘  │
//! │                                                                         │
//! │  ┌──────────────────┐  ┌──────────────────┐                            │
//! │  │  Configuration   │  │  Domain          │                            │
//! │  │                  │  │                  │                            │
//! │  │  InvalidConfig   │  │  Core            │                            │
//! │  │  ConfigLoadFailed│  │  (CoreError)     │                            │
//! │  │  MissingFile     │  │                  │                            │
//! │  └──────────────────┘  └──────────────────┘                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Asynchronous, transport-dependent outcomes (connection refused, send not
//! confirmed) never appear here; they arrive as `CloudEvent`s.

use std::path::PathBuf;
use thiserror::Error;

use edgelink_core::CoreError;

/// Result type alias for cloud operations.
pub type CloudResult<T> = Result<T, CloudError>;

#[derive(Debug, Error)]
pub enum CloudError {
    // =========================================================================
    // Connector Errors
    // =========================================================================
    /// The transport library could not start.
    #[error("Transport init failed: {0}")]
    InitError(String),

    #[error("Connector is not initialized")]
    NotInitialized,

    #[error("Connector is already initialized")]
    AlreadyInitialized,

    /// A transport session is already active.
    ///
    /// ## When This Occurs
    /// - `connect` is called twice without `deinitialize` in between
    #[error("A transport session is already active")]
    AlreadyConnected,

    /// The transport refused to construct a session for the credential.
    #[error("Failed to create transport session for device '{device_id}'")]
    SessionCreateError { device_id: String },

    /// A session option was rejected; the half-built session is discarded.
    #[error("Transport rejected option {option}: {reason}")]
    SessionOption { option: String, reason: String },

    #[error("Provisioning service unavailable at '{endpoint}' (scope '{id_scope}')")]
    ProvisioningUnavailable { endpoint: String, id_scope: String },

    #[error("A registration is already in progress")]
    AlreadyRegistering,

    #[error("Failed to issue registration request: {0}")]
    RegisterRequest(String),

    /// `send` was called without an authenticated session.
    #[error("Not connected")]
    NotConnected,

    #[error("Transport rejected message: {0}")]
    SendRejected(String),

    // =========================================================================
    // Payload Errors
    // =========================================================================
    #[error("Cannot read payload {path}: {reason}")]
    PayloadUnreadable { path: PathBuf, reason: String },

    // =========================================================================
    // Configuration Errors
    // =========================================================================
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    /// A file named on the command line or in the config does not exist.
    #[error("File not found: {}", .0.display())]
    MissingFile(PathBuf),

    #[error("Failed to write report: {0}")]
    ReportFailed(String),

    // =========================================================================
    // Domain Errors
    // =========================================================================
    #[error(transparent)]
    Core(#[from] CoreError),
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<std::io::Error> for CloudError {
    fn from(err: std::io::Error) -> Self {
        CloudError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for CloudError {
    fn from(err: toml::de::Error) -> Self {
        CloudError::ConfigLoadFailed(err.to_string())
    }
}

impl From<serde_json::Error> for CloudError {
    fn from(err: serde_json::Error) -> Self {
        CloudError::ReportFailed(err.to_string())
    }
}

// =============================================================================
// Error Categorization
// =============================================================================

impl CloudError {
    /// Returns true if this error aborts the run before any state-machine step.
    pub fn is_setup_error(&self) -> bool {
        matches!(
            self,
            CloudError::InitError(_)
                | CloudError::AlreadyInitialized
                | CloudError::SessionCreateError { .. }
                | CloudError::SessionOption { .. }
                | CloudError::ProvisioningUnavailable { .. }
        ) || self.is_config_error()
    }

    /// Returns true if this error indicates a configuration problem.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            CloudError::InvalidConfig(_)
                | CloudError::ConfigLoadFailed(_)
                | CloudError::MissingFile(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_categories() {
        assert!(CloudError::InitError("boom".into()).is_setup_error());
        assert!(CloudError::MissingFile(PathBuf::from("/nope")).is_setup_error());
        assert!(CloudError::InvalidConfig("x".into()).is_config_error());

        assert!(!CloudError::NotConnected.is_setup_error());
        assert!(!CloudError::SendRejected("queue full".into()).is_setup_error());
        assert!(!CloudError::InitError("boom".into()).is_config_error());
    }

    #[test]
    fn test_error_display() {
        let err = CloudError::SessionCreateError {
            device_id: "edge-01".into(),
        };
        assert!(err.to_string().contains("edge-01"));

        let err = CloudError::MissingFile(PathBuf::from("/etc/edgelink/device.pem"));
        assert_eq!(err.to_string(), "File not found: /etc/edgelink/device.pem");
    }

    #[test]
    fn test_conversions() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert!(CloudError::from(io).is_config_error());

        let core = CoreError::ManifestFull { max: 1 };
        assert!(matches!(CloudError::from(core), CloudError::Core(_)));
    }
}
