//! # Cloud Events
//!
//! The entire vocabulary the connector exposes to its observer.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Transport callback                    CloudEvent<T>                    │
//! │  ──────────────────                    ─────────────                    │
//! │  connection status (state, reason) ──► ConnectionStatusChanged(status)  │
//! │  send confirmation OK              ──► SendSucceeded(token)             │
//! │  send confirmation not OK          ──► SendFailed(token)                │
//! │  registration assigned             ──► RegistrationSucceeded            │
//! │  registration error                ──► RegistrationFailed               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! `T` is the caller-chosen correlation token passed to `send`; the delivery
//! flow uses the manifest's [`EntryId`](crate::manifest::EntryId).

use crate::status::ConnectionStatus;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloudEvent<T> {
    ConnectionStatusChanged(ConnectionStatus),
    SendSucceeded(T),
    SendFailed(T),
    RegistrationSucceeded,
    RegistrationFailed,
}

impl<T> CloudEvent<T> {
    /// Short name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            CloudEvent::ConnectionStatusChanged(_) => "connection_status_changed",
            CloudEvent::SendSucceeded(_) => "send_succeeded",
            CloudEvent::SendFailed(_) => "send_failed",
            CloudEvent::RegistrationSucceeded => "registration_succeeded",
            CloudEvent::RegistrationFailed => "registration_failed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_names() {
        assert_eq!(CloudEvent::SendSucceeded(7u32).kind(), "send_succeeded");
        assert_eq!(CloudEvent::SendFailed(8u32).kind(), "send_failed");
        assert_eq!(
            CloudEvent::<u32>::RegistrationSucceeded.kind(),
            "registration_succeeded"
        );
        assert_eq!(
            CloudEvent::<u32>::ConnectionStatusChanged(ConnectionStatus::Connected).kind(),
            "connection_status_changed"
        );
    }
}
