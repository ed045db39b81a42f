//! # Transport SDK Contract
//!
//! The traits a cloud transport SDK binding implements. The connector is the
//! only consumer; it never sees wire protocol, TLS or retry details.
//!
//! ## Callback Model
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Pump-Driven Notifications                           │
//! │                                                                         │
//! │   Connector::poll()                                                    │
//! │        │                                                                │
//! │        ├──► session.pump()       ──► Vec<SessionNotification>          │
//! │        │       ConnectionStatus { state, reason }                      │
//! │        │       SendConfirmation { message_id, result }                 │
//! │        │                                                                │
//! │        └──► provisioning.pump()  ──► Vec<ProvisioningNotification>     │
//! │                Status(phase)                                           │
//! │                Completed(Ok(assignment) | Err(reason))                 │
//! │                                                                         │
//! │   Nothing is delivered outside a pump call, so every notification is  │
//! │   handled on the driver thread.                                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::fmt;
use thiserror::Error;
use uuid::Uuid;

use edgelink_core::{TransportAuthState, TransportReason};

/// Content type stamped on every outbound message.
pub const CONTENT_TYPE_JSON: &str = "application/json";

/// Content encoding stamped on every outbound message.
pub const CONTENT_ENCODING_UTF8: &str = "utf-8";

// =============================================================================
// Transport Error
// =============================================================================

/// Failure reported synchronously by an SDK call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct TransportError(pub String);

impl TransportError {
    pub fn new(reason: impl Into<String>) -> Self {
        TransportError(reason.into())
    }
}

// =============================================================================
// Session Options
// =============================================================================

/// Options applied to a freshly created session.
#[derive(Clone, PartialEq, Eq)]
pub enum SessionOption {
    LogTrace(bool),
    AutoUrlEncode(bool),
    /// PEM bundle of trusted roots, for hosts without a system store.
    TrustedCert(String),
    X509Cert(String),
    X509PrivateKey(String),
    /// Provisioning only.
    RegistrationId(String),
}

impl SessionOption {
    /// SDK option name, used in errors and logs.
    pub fn name(&self) -> &'static str {
        match self {
            SessionOption::LogTrace(_) => "logtrace",
            SessionOption::AutoUrlEncode(_) => "auto_url_encode_decode",
            SessionOption::TrustedCert(_) => "TrustedCerts",
            SessionOption::X509Cert(_) => "x509certificate",
            SessionOption::X509PrivateKey(_) => "x509privatekey",
            SessionOption::RegistrationId(_) => "registration_id",
        }
    }
}

impl fmt::Debug for SessionOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionOption::LogTrace(on) | SessionOption::AutoUrlEncode(on) => {
                write!(f, "{}={}", self.name(), on)
            }
            SessionOption::RegistrationId(id) => write!(f, "{}={}", self.name(), id),
            _ => write!(f, "{}=<pem>", self.name()),
        }
    }
}

// =============================================================================
// Messages and Notifications
// =============================================================================

/// One telemetry message handed to the SDK.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub id: Uuid,
    pub body: String,
    pub content_type: &'static str,
    pub content_encoding: &'static str,
}

impl OutboundMessage {
    /// Wraps a JSON payload with a fresh message id.
    pub fn json(body: impl Into<String>) -> Self {
        OutboundMessage {
            id: Uuid::new_v4(),
            body: body.into(),
            content_type: CONTENT_TYPE_JSON,
            content_encoding: CONTENT_ENCODING_UTF8,
        }
    }
}

/// Terminal result of one `send_async`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    Ok,
    /// The session was torn down before the message went out.
    Destroyed,
    Timeout,
    Error,
}

impl Confirmation {
    pub fn is_ok(&self) -> bool {
        matches!(self, Confirmation::Ok)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionNotification {
    ConnectionStatus {
        state: TransportAuthState,
        reason: TransportReason,
    },
    SendConfirmation {
        message_id: Uuid,
        result: Confirmation,
    },
}

/// Intermediate provisioning progress, logged only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationPhase {
    Connected,
    Registering,
    Assigning,
}

/// Where the provisioning service placed the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub host_name: String,
    pub device_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProvisioningNotification {
    Status(RegistrationPhase),
    Completed(Result<Assignment, String>),
}

// =============================================================================
// SDK Traits
// =============================================================================

/// Process-wide entry point of a transport SDK.
pub trait TransportSdk {
    type Session: TransportSession;
    type Provisioning: ProvisioningSession;

    /// Starts process-wide SDK state.
    fn init(&mut self) -> Result<(), TransportError>;

    /// Releases process-wide SDK state. Safe to call more than once.
    fn deinit(&mut self);

    fn version(&self) -> String;

    /// Opens a session from a credential string, or `None` if the SDK
    /// refuses it.
    fn create_session(&mut self, credential: &str) -> Option<Self::Session>;

    fn create_provisioning_session(
        &mut self,
        endpoint: &str,
        id_scope: &str,
    ) -> Option<Self::Provisioning>;
}

/// An open telemetry session.
pub trait TransportSession {
    fn set_option(&mut self, option: SessionOption) -> Result<(), TransportError>;

    /// Arms connection status notifications.
    fn watch_connection_status(&mut self);

    /// Queues one message; its confirmation arrives from a later `pump`.
    fn send_async(&mut self, message: OutboundMessage) -> Result<(), TransportError>;

    /// Runs one unit of SDK work and returns what happened.
    fn pump(&mut self) -> Vec<SessionNotification>;
}

/// An open device-provisioning session.
pub trait ProvisioningSession {
    fn set_option(&mut self, option: SessionOption) -> Result<(), TransportError>;

    /// Issues the (single) registration request.
    fn register_device(&mut self) -> Result<(), TransportError>;

    fn pump(&mut self) -> Vec<ProvisioningNotification>;
}
