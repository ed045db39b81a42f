//! # Connection Status
//!
//! Translation from the transport's (authentication state, reason code) pair
//! into the closed [`ConnectionStatus`] vocabulary the orchestrators consume.
//!
//! ## Translation Table
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                   Transport Reason → ConnectionStatus                   │
//! │                                                                         │
//! │  authenticated (any reason)  ──────────►  Connected                     │
//! │                                                                         │
//! │  not authenticated:                                                     │
//! │    expired-sas-token         ──────────►  DisconnectedExpiredCredential │
//! │    device-disabled           ──────────►  DisconnectedDeviceDisabled    │
//! │    bad-credential            ──────────►  DisconnectedBadCredential     │
//! │    retry-expired             ──────────►  DisconnectedRetryExpired      │
//! │    no-network                ──────────►  DisconnectedNoNetwork         │
//! │    communication-error       ──────────►  DisconnectedCommunicationError│
//! │    no-ping-response          ──────────►  DisconnectedNoPingResponse    │
//! │    quota-exceeded            ──────────►  DisconnectedQuotaExceeded     │
//! │    anything else             ──────────►  DisconnectedUnknown           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The translation is total: every `(TransportAuthState, TransportReason)`
//! pair yields exactly one status, and parsing a reason code never fails.

use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

// =============================================================================
// Connection Status
// =============================================================================

/// Connection state as seen by the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConnectionStatus {
    /// The transport authenticated with the endpoint.
    Connected,
    DisconnectedUnknown,
    DisconnectedExpiredCredential,
    DisconnectedDeviceDisabled,
    DisconnectedBadCredential,
    DisconnectedRetryExpired,
    DisconnectedNoNetwork,
    DisconnectedCommunicationError,
    DisconnectedNoPingResponse,
    DisconnectedQuotaExceeded,
}

impl ConnectionStatus {
    /// Translates a transport status callback into a `ConnectionStatus`.
    ///
    /// An authenticated state wins over whatever (possibly stale) reason
    /// accompanies it.
    pub fn from_transport(state: TransportAuthState, reason: &TransportReason) -> Self {
        if state.is_authenticated() {
            return ConnectionStatus::Connected;
        }

        match reason {
            TransportReason::ExpiredSasToken => ConnectionStatus::DisconnectedExpiredCredential,
            TransportReason::DeviceDisabled => ConnectionStatus::DisconnectedDeviceDisabled,
            TransportReason::BadCredential => ConnectionStatus::DisconnectedBadCredential,
            TransportReason::RetryExpired => ConnectionStatus::DisconnectedRetryExpired,
            TransportReason::NoNetwork => ConnectionStatus::DisconnectedNoNetwork,
            TransportReason::CommunicationError => {
                ConnectionStatus::DisconnectedCommunicationError
            }
            TransportReason::NoPingResponse => ConnectionStatus::DisconnectedNoPingResponse,
            TransportReason::QuotaExceeded => ConnectionStatus::DisconnectedQuotaExceeded,
            TransportReason::ConnectionOk | TransportReason::Unrecognized(_) => {
                ConnectionStatus::DisconnectedUnknown
            }
        }
    }

    /// Returns true only for [`ConnectionStatus::Connected`].
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionStatus::Connected)
    }

    /// Stable kebab-case name, used in logs and the delivery report.
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::DisconnectedUnknown => "disconnected-unknown",
            ConnectionStatus::DisconnectedExpiredCredential => "disconnected-expired-credential",
            ConnectionStatus::DisconnectedDeviceDisabled => "disconnected-device-disabled",
            ConnectionStatus::DisconnectedBadCredential => "disconnected-bad-credential",
            ConnectionStatus::DisconnectedRetryExpired => "disconnected-retry-expired",
            ConnectionStatus::DisconnectedNoNetwork => "disconnected-no-network",
            ConnectionStatus::DisconnectedCommunicationError => {
                "disconnected-communication-error"
            }
            ConnectionStatus::DisconnectedNoPingResponse => "disconnected-no-ping-response",
            ConnectionStatus::DisconnectedQuotaExceeded => "disconnected-quota-exceeded",
        }
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Transport Authentication State
// =============================================================================

/// The authentication half of a transport status callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportAuthState {
    Authenticated,
    Unauthenticated,
}

impl TransportAuthState {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, TransportAuthState::Authenticated)
    }
}

// =============================================================================
// Transport Reason
// =============================================================================

/// The reason half of a transport status callback.
///
/// ## Accepted Spellings
/// Reason codes are matched case-insensitively in either the kebab form
/// (`no-network`) or the SDK's constant form
/// (`IOTHUB_CLIENT_CONNECTION_NO_NETWORK`). Anything else is kept verbatim
/// in [`TransportReason::Unrecognized`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TransportReason {
    ConnectionOk,
    ExpiredSasToken,
    DeviceDisabled,
    BadCredential,
    RetryExpired,
    NoNetwork,
    CommunicationError,
    NoPingResponse,
    QuotaExceeded,
    Unrecognized(String),
}

/// Prefix carried by the SDK's reason constants.
const SDK_REASON_PREFIX: &str = "iothub-client-connection-";

impl TransportReason {
    /// Parses a reason code. Never fails.
    pub fn parse(code: &str) -> Self {
        let normalized = code.trim().to_ascii_lowercase().replace('_', "-");
        let name = normalized
            .strip_prefix(SDK_REASON_PREFIX)
            .unwrap_or(&normalized);

        match name {
            "ok" | "connection-ok" => TransportReason::ConnectionOk,
            "expired-sas-token" => TransportReason::ExpiredSasToken,
            "device-disabled" => TransportReason::DeviceDisabled,
            "bad-credential" => TransportReason::BadCredential,
            "retry-expired" => TransportReason::RetryExpired,
            "no-network" => TransportReason::NoNetwork,
            "communication-error" => TransportReason::CommunicationError,
            "no-ping-response" => TransportReason::NoPingResponse,
            "quota-exceeded" => TransportReason::QuotaExceeded,
            _ => TransportReason::Unrecognized(code.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            TransportReason::ConnectionOk => "connection-ok",
            TransportReason::ExpiredSasToken => "expired-sas-token",
            TransportReason::DeviceDisabled => "device-disabled",
            TransportReason::BadCredential => "bad-credential",
            TransportReason::RetryExpired => "retry-expired",
            TransportReason::NoNetwork => "no-network",
            TransportReason::CommunicationError => "communication-error",
            TransportReason::NoPingResponse => "no-ping-response",
            TransportReason::QuotaExceeded => "quota-exceeded",
            TransportReason::Unrecognized(code) => code,
        }
    }
}

impl FromStr for TransportReason {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(TransportReason::parse(s))
    }
}

impl From<&str> for TransportReason {
    fn from(code: &str) -> Self {
        TransportReason::parse(code)
    }
}

impl fmt::Display for TransportReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE: &[(&str, ConnectionStatus)] = &[
        ("expired-sas-token", ConnectionStatus::DisconnectedExpiredCredential),
        ("device-disabled", ConnectionStatus::DisconnectedDeviceDisabled),
        ("bad-credential", ConnectionStatus::DisconnectedBadCredential),
        ("retry-expired", ConnectionStatus::DisconnectedRetryExpired),
        ("no-network", ConnectionStatus::DisconnectedNoNetwork),
        ("communication-error", ConnectionStatus::DisconnectedCommunicationError),
        ("no-ping-response", ConnectionStatus::DisconnectedNoPingResponse),
        ("quota-exceeded", ConnectionStatus::DisconnectedQuotaExceeded),
    ];

    #[test]
    fn test_reason_table_when_unauthenticated() {
        for (code, expected) in TABLE {
            let reason = TransportReason::parse(code);
            assert_eq!(
                ConnectionStatus::from_transport(TransportAuthState::Unauthenticated, &reason),
                *expected,
                "reason {code}"
            );
        }
    }

    #[test]
    fn test_authenticated_wins_over_any_reason() {
        for (code, _) in TABLE {
            let reason = TransportReason::parse(code);
            assert_eq!(
                ConnectionStatus::from_transport(TransportAuthState::Authenticated, &reason),
                ConnectionStatus::Connected
            );
        }

        let reason = TransportReason::parse("something-new");
        assert_eq!(
            ConnectionStatus::from_transport(TransportAuthState::Authenticated, &reason),
            ConnectionStatus::Connected
        );
    }

    #[test]
    fn test_unknown_reasons_map_to_unknown() {
        for code in ["", "connection-ok", "IOTHUB_CLIENT_CONNECTION_OK", "gremlins", "42"] {
            let reason = TransportReason::parse(code);
            assert_eq!(
                ConnectionStatus::from_transport(TransportAuthState::Unauthenticated, &reason),
                ConnectionStatus::DisconnectedUnknown,
                "reason {code:?}"
            );
        }
    }

    #[test]
    fn test_sdk_constant_spelling() {
        assert_eq!(
            TransportReason::parse("IOTHUB_CLIENT_CONNECTION_NO_NETWORK"),
            TransportReason::NoNetwork
        );
        assert_eq!(
            TransportReason::parse("EXPIRED_SAS_TOKEN"),
            TransportReason::ExpiredSasToken
        );
        assert_eq!(
            "quota-exceeded".parse::<TransportReason>(),
            Ok(TransportReason::QuotaExceeded)
        );
    }

    #[test]
    fn test_unrecognized_keeps_original_code() {
        let reason = TransportReason::parse("Weird_Code");
        assert_eq!(reason, TransportReason::Unrecognized("Weird_Code".to_string()));
        assert_eq!(reason.to_string(), "Weird_Code");
    }

    #[test]
    fn test_status_display() {
        assert_eq!(ConnectionStatus::Connected.to_string(), "connected");
        assert_eq!(
            ConnectionStatus::DisconnectedNoNetwork.to_string(),
            "disconnected-no-network"
        );
        assert!(ConnectionStatus::Connected.is_connected());
        assert!(!ConnectionStatus::DisconnectedUnknown.is_connected());
    }
}
