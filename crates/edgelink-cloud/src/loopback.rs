//! # Loopback Transport
//!
//! In-process implementation of the transport SDK traits. It accepts every
//! well-formed credential, "delivers" messages into a journal and confirms
//! them on the next pump. A [`LoopbackScript`] bends that behaviour to
//! reproduce refused connections, failed or unconfirmed sends and
//! provisioning outcomes.
//!
//! ## Timeline (default script)
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  pump #1  ─► ConnectionStatus { Authenticated, connection-ok }          │
//! │  send A   ─► queued                                                     │
//! │  send B   ─► queued                                                     │
//! │  pump #2  ─► SendConfirmation(A, Ok), SendConfirmation(B, Ok)           │
//! │                                                                         │
//! │  register ─► request recorded                                          │
//! │  pump #1  ─► Status(Connected), Status(Registering)                     │
//! │  pump #2  ─► Status(Assigning), Completed(Ok(assignment))               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;
use uuid::Uuid;

use edgelink_core::{ConnectionString, TransportAuthState, TransportReason};

use crate::transport::{
    Assignment, Confirmation, OutboundMessage, ProvisioningNotification, ProvisioningSession,
    RegistrationPhase, SessionNotification, SessionOption, TransportError, TransportSdk,
    TransportSession,
};

// =============================================================================
// Script
// =============================================================================

/// How the simulated endpoint answers a connection attempt.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConnectOutcome {
    #[default]
    Authenticate,
    Refuse(TransportReason),
}

/// How the simulated provisioning service answers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationOutcome {
    Assign { host_name: String },
    Fail(String),
}

impl Default for RegistrationOutcome {
    fn default() -> Self {
        RegistrationOutcome::Assign {
            host_name: "loopback.azure-devices.net".to_string(),
        }
    }
}

/// Scripted behaviour of a [`LoopbackSdk`]. Send ordinals count every
/// `send_async` call on a session, starting at 0.
#[derive(Debug, Clone)]
pub struct LoopbackScript {
    pub fail_init: bool,
    pub refuse_sessions: bool,
    pub rejected_options: Vec<&'static str>,
    /// Pumps that pass before the connection status is reported.
    pub connect_after_pumps: usize,
    /// Reports `Unauthenticated` with `connection-ok` on the first watched
    /// pump, before the real outcome, as SDKs do mid-handshake.
    pub pre_auth_notice: bool,
    pub connect: ConnectOutcome,
    /// Unauthenticated status reported on the pump after authentication.
    pub drop_after_connect: Option<TransportReason>,
    pub rejected_sends: HashSet<usize>,
    /// Non-OK confirmation reported for a send ordinal.
    pub failed_sends: HashMap<usize, Confirmation>,
    pub unconfirmed_sends: HashSet<usize>,
    pub provisioning_unavailable: bool,
    pub fail_register_request: bool,
    pub registration: RegistrationOutcome,
    /// Reports the registration result twice.
    pub repeat_registration_result: bool,
}

impl Default for LoopbackScript {
    fn default() -> Self {
        LoopbackScript {
            fail_init: false,
            refuse_sessions: false,
            rejected_options: Vec::new(),
            connect_after_pumps: 0,
            pre_auth_notice: false,
            connect: ConnectOutcome::Authenticate,
            drop_after_connect: None,
            rejected_sends: HashSet::new(),
            failed_sends: HashMap::new(),
            unconfirmed_sends: HashSet::new(),
            provisioning_unavailable: false,
            fail_register_request: false,
            registration: RegistrationOutcome::default(),
            repeat_registration_result: false,
        }
    }
}

impl LoopbackScript {
    pub fn refuse(mut self, reason: TransportReason) -> Self {
        self.connect = ConnectOutcome::Refuse(reason);
        self
    }

    pub fn fail_send(self, ordinal: usize) -> Self {
        self.fail_send_with(ordinal, Confirmation::Error)
    }

    pub fn fail_send_with(mut self, ordinal: usize, result: Confirmation) -> Self {
        self.failed_sends.insert(ordinal, result);
        self
    }

    pub fn connect_after(mut self, pumps: usize) -> Self {
        self.connect_after_pumps = pumps;
        self
    }

    pub fn drop_after_connect(mut self, reason: TransportReason) -> Self {
        self.drop_after_connect = Some(reason);
        self
    }

    pub fn reject_send(mut self, ordinal: usize) -> Self {
        self.rejected_sends.insert(ordinal);
        self
    }

    pub fn never_confirm(mut self, ordinal: usize) -> Self {
        self.unconfirmed_sends.insert(ordinal);
        self
    }

    pub fn reject_option(mut self, name: &'static str) -> Self {
        self.rejected_options.push(name);
        self
    }

    pub fn fail_registration(mut self, reason: impl Into<String>) -> Self {
        self.registration = RegistrationOutcome::Fail(reason.into());
        self
    }
}

// =============================================================================
// Journal
// =============================================================================

/// Everything the loopback SDK was asked to do.
#[derive(Debug, Default)]
pub struct Journal {
    pub init_calls: usize,
    pub deinit_calls: usize,
    pub credentials: Vec<String>,
    pub options: Vec<SessionOption>,
    pub provisioning_options: Vec<SessionOption>,
    pub messages: Vec<OutboundMessage>,
    pub registration_requests: usize,
}

/// Shared view of a [`Journal`], kept by tests while the SDK is owned by the
/// connector.
#[derive(Debug, Clone, Default)]
pub struct JournalHandle(Arc<Mutex<Journal>>);

impl JournalHandle {
    pub fn lock(&self) -> MutexGuard<'_, Journal> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// =============================================================================
// SDK
// =============================================================================

pub struct LoopbackSdk {
    script: Arc<LoopbackScript>,
    journal: JournalHandle,
}

impl Default for LoopbackSdk {
    fn default() -> Self {
        LoopbackSdk::new(LoopbackScript::default())
    }
}

impl LoopbackSdk {
    pub fn new(script: LoopbackScript) -> Self {
        LoopbackSdk {
            script: Arc::new(script),
            journal: JournalHandle::default(),
        }
    }

    pub fn journal(&self) -> JournalHandle {
        self.journal.clone()
    }

    /// Applies the script's option policy without opening a session.
    pub fn accepts(&self, option: &SessionOption) -> bool {
        check_option(&self.script, option).is_ok()
    }
}

fn check_option(script: &LoopbackScript, option: &SessionOption) -> Result<(), TransportError> {
    if script.rejected_options.contains(&option.name()) {
        Err(TransportError::new(format!("option {} not supported", option.name())))
    } else {
        Ok(())
    }
}

impl TransportSdk for LoopbackSdk {
    type Session = LoopbackSession;
    type Provisioning = LoopbackProvisioning;

    fn init(&mut self) -> Result<(), TransportError> {
        self.journal.lock().init_calls += 1;
        if self.script.fail_init {
            return Err(TransportError::new("loopback init disabled by script"));
        }
        Ok(())
    }

    fn deinit(&mut self) {
        self.journal.lock().deinit_calls += 1;
    }

    fn version(&self) -> String {
        format!("loopback/{}", env!("CARGO_PKG_VERSION"))
    }

    fn create_session(&mut self, credential: &str) -> Option<LoopbackSession> {
        self.journal.lock().credentials.push(credential.to_string());

        if self.script.refuse_sessions {
            return None;
        }
        if let Err(e) = credential.parse::<ConnectionString>() {
            debug!(error = %e, "Loopback refused credential");
            return None;
        }

        Some(LoopbackSession {
            script: self.script.clone(),
            journal: self.journal.clone(),
            pumps: 0,
            watching: false,
            authenticated: false,
            notice_sent: false,
            status_reported: false,
            dropped: false,
            sends: 0,
            pending: VecDeque::new(),
        })
    }

    fn create_provisioning_session(
        &mut self,
        endpoint: &str,
        id_scope: &str,
    ) -> Option<LoopbackProvisioning> {
        if self.script.provisioning_unavailable || endpoint.is_empty() || id_scope.is_empty() {
            return None;
        }

        Some(LoopbackProvisioning {
            script: self.script.clone(),
            journal: self.journal.clone(),
            registration_id: None,
            requested: false,
            stage: 0,
        })
    }
}

// =============================================================================
// Telemetry Session
// =============================================================================

pub struct LoopbackSession {
    script: Arc<LoopbackScript>,
    journal: JournalHandle,
    pumps: usize,
    watching: bool,
    authenticated: bool,
    notice_sent: bool,
    status_reported: bool,
    dropped: bool,
    sends: usize,
    pending: VecDeque<(Uuid, Confirmation)>,
}

impl TransportSession for LoopbackSession {
    fn set_option(&mut self, option: SessionOption) -> Result<(), TransportError> {
        check_option(&self.script, &option)?;
        self.journal.lock().options.push(option);
        Ok(())
    }

    fn watch_connection_status(&mut self) {
        self.watching = true;
    }

    fn send_async(&mut self, message: OutboundMessage) -> Result<(), TransportError> {
        let ordinal = self.sends;
        self.sends += 1;

        if self.script.rejected_sends.contains(&ordinal) {
            return Err(TransportError::new("loopback queue rejected message"));
        }

        if !self.script.unconfirmed_sends.contains(&ordinal) {
            let result = self
                .script
                .failed_sends
                .get(&ordinal)
                .copied()
                .unwrap_or(Confirmation::Ok);
            self.pending.push_back((message.id, result));
        }

        self.journal.lock().messages.push(message);
        Ok(())
    }

    fn pump(&mut self) -> Vec<SessionNotification> {
        self.pumps += 1;
        let mut out = Vec::new();

        if self.watching && self.status_reported && self.authenticated && !self.dropped {
            if let Some(reason) = &self.script.drop_after_connect {
                self.dropped = true;
                out.push(SessionNotification::ConnectionStatus {
                    state: TransportAuthState::Unauthenticated,
                    reason: reason.clone(),
                });
            }
        }

        if self.watching && self.script.pre_auth_notice && !self.notice_sent {
            self.notice_sent = true;
            out.push(SessionNotification::ConnectionStatus {
                state: TransportAuthState::Unauthenticated,
                reason: TransportReason::ConnectionOk,
            });
            return out;
        }

        if self.watching && !self.status_reported && self.pumps > self.script.connect_after_pumps
        {
            self.status_reported = true;
            let (state, reason) = match &self.script.connect {
                ConnectOutcome::Authenticate => {
                    self.authenticated = true;
                    (TransportAuthState::Authenticated, TransportReason::ConnectionOk)
                }
                ConnectOutcome::Refuse(reason) => {
                    (TransportAuthState::Unauthenticated, reason.clone())
                }
            };
            out.push(SessionNotification::ConnectionStatus { state, reason });
            return out;
        }

        out.extend(
            self.pending
                .drain(..)
                .map(|(message_id, result)| SessionNotification::SendConfirmation {
                    message_id,
                    result,
                }),
        );
        out
    }
}

// =============================================================================
// Provisioning Session
// =============================================================================

pub struct LoopbackProvisioning {
    script: Arc<LoopbackScript>,
    journal: JournalHandle,
    registration_id: Option<String>,
    requested: bool,
    stage: u8,
}

impl ProvisioningSession for LoopbackProvisioning {
    fn set_option(&mut self, option: SessionOption) -> Result<(), TransportError> {
        check_option(&self.script, &option)?;
        if let SessionOption::RegistrationId(id) = &option {
            self.registration_id = Some(id.clone());
        }
        self.journal.lock().provisioning_options.push(option);
        Ok(())
    }

    fn register_device(&mut self) -> Result<(), TransportError> {
        self.journal.lock().registration_requests += 1;
        if self.script.fail_register_request {
            return Err(TransportError::new("loopback refused registration request"));
        }
        self.requested = true;
        Ok(())
    }

    fn pump(&mut self) -> Vec<ProvisioningNotification> {
        if !self.requested {
            return Vec::new();
        }

        self.stage = self.stage.saturating_add(1);
        match self.stage {
            1 => vec![
                ProvisioningNotification::Status(RegistrationPhase::Connected),
                ProvisioningNotification::Status(RegistrationPhase::Registering),
            ],
            2 => {
                let result = match &self.script.registration {
                    RegistrationOutcome::Assign { host_name } => Ok(Assignment {
                        host_name: host_name.clone(),
                        device_id: self
                            .registration_id
                            .clone()
                            .unwrap_or_else(|| "loopback-device".to_string()),
                    }),
                    RegistrationOutcome::Fail(reason) => Err(reason.clone()),
                };

                let mut out = vec![
                    ProvisioningNotification::Status(RegistrationPhase::Assigning),
                    ProvisioningNotification::Completed(result.clone()),
                ];
                if self.script.repeat_registration_result {
                    out.push(ProvisioningNotification::Completed(result));
                }
                out
            }
            _ => Vec::new(),
        }
    }
}
