//! # Cloud Connector
//!
//! Hides a transport SDK behind a small connect / register / send / poll
//! contract and turns its notifications into [`CloudEvent`]s for a single
//! observer.
//!
//! ## Connector State
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Connector Lifecycle                              │
//! │                                                                         │
//! │  ┌───────────────┐  initialize()  ┌──────┐  connect()  ┌────────────┐   │
//! │  │ Uninitialized │ ─────────────► │ Idle │ ──────────► │ Connecting │   │
//! │  └───────────────┘                └──┬───┘             └─────┬──────┘   │
//! │          ▲                           │                       │ status   │
//! │          │                           │ register()            ▼          │
//! │          │                           ▼               ┌────────────┐     │
//! │          │                    ┌─────────────┐        │ Connected  │     │
//! │          │                    │ Registering │        └────────────┘     │
//! │          │                    └─────────────┘                           │
//! │          │                                                              │
//! │          └──────────────── deinitialize() (from any state) ─────────    │
//! │                                                                         │
//! │  At most one telemetry session and one registration session exist.    │
//! │  A second connect()/register() is rejected, never queued.              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Events fire only from inside [`Connector::poll`].

use std::collections::HashMap;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use edgelink_core::{CloudEvent, ConnectParams, ConnectionStatus};

use crate::error::{CloudError, CloudResult};
use crate::transport::{
    OutboundMessage, ProvisioningNotification, ProvisioningSession, SessionNotification,
    SessionOption, TransportSdk, TransportSession,
};

/// The connector's single event sink.
pub type EventObserver<T> = Box<dyn FnMut(CloudEvent<T>)>;

// =============================================================================
// Cloud Link
// =============================================================================

/// The operations an orchestrator may request from the cloud.
///
/// Implemented by [`Connector`]; tests substitute fakes.
pub trait CloudLink<T> {
    fn connect(&mut self, params: &ConnectParams) -> CloudResult<()>;

    fn register(&mut self, params: &ConnectParams) -> CloudResult<()>;

    /// Queues one message tagged with `token`; the outcome arrives later as
    /// `SendSucceeded(token)` or `SendFailed(token)`.
    fn send(&mut self, payload: &str, token: T) -> CloudResult<()>;
}

// =============================================================================
// Session Settings
// =============================================================================

/// Options applied to every telemetry session.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub trace: bool,
    pub auto_url_encode: bool,
    /// PEM bundle for hosts without a system certificate store.
    pub trusted_cert: Option<String>,
}

impl Default for SessionSettings {
    fn default() -> Self {
        SessionSettings {
            trace: true,
            auto_url_encode: true,
            trusted_cert: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectorState {
    Uninitialized,
    Idle,
    Connecting,
    Connected,
    Registering,
}

// =============================================================================
// Connector
// =============================================================================

pub struct Connector<S: TransportSdk, T> {
    sdk: S,
    settings: SessionSettings,
    initialized: bool,
    session: Option<S::Session>,
    provisioning: Option<S::Provisioning>,
    registering: bool,
    /// Last reported status was `Connected`.
    connected: bool,
    observer: Option<EventObserver<T>>,
    in_flight: HashMap<Uuid, T>,
}

impl<S: TransportSdk, T> Connector<S, T> {
    pub fn new(sdk: S, settings: SessionSettings) -> Self {
        Connector {
            sdk,
            settings,
            initialized: false,
            session: None,
            provisioning: None,
            registering: false,
            connected: false,
            observer: None,
            in_flight: HashMap::new(),
        }
    }

    /// Starts process-wide transport state.
    pub fn initialize(&mut self) -> CloudResult<()> {
        if self.initialized {
            return Err(CloudError::AlreadyInitialized);
        }

        self.sdk
            .init()
            .map_err(|e| CloudError::InitError(e.to_string()))?;
        self.initialized = true;

        info!(sdk = %self.sdk.version(), "Transport initialized");
        Ok(())
    }

    /// Installs the event sink, replacing any previous one.
    pub fn register_observer(&mut self, observer: EventObserver<T>) {
        self.observer = Some(observer);
    }

    /// Opens a telemetry session. The result arrives later as a
    /// `ConnectionStatusChanged` event.
    pub fn connect(&mut self, params: &ConnectParams) -> CloudResult<()> {
        if !self.initialized {
            return Err(CloudError::NotInitialized);
        }
        if self.session.is_some() {
            return Err(CloudError::AlreadyConnected);
        }

        let credential = params.credential();
        let mut session =
            self.sdk
                .create_session(&credential)
                .ok_or_else(|| CloudError::SessionCreateError {
                    device_id: params.device_id.clone(),
                })?;

        let mut options = vec![
            SessionOption::LogTrace(self.settings.trace),
            SessionOption::AutoUrlEncode(self.settings.auto_url_encode),
        ];
        if let Some(pem) = &self.settings.trusted_cert {
            options.push(SessionOption::TrustedCert(pem.clone()));
        }
        if params.is_x509() {
            options.push(SessionOption::X509Cert(params.cert.clone()));
            options.push(SessionOption::X509PrivateKey(params.key.clone()));
        }

        for option in options {
            let name = option.name();
            session
                .set_option(option)
                .map_err(|e| CloudError::SessionOption {
                    option: name.to_string(),
                    reason: e.to_string(),
                })?;
        }

        session.watch_connection_status();
        self.session = Some(session);
        self.connected = false;

        info!(
            host = %params.host_name,
            device_id = %params.device_id,
            x509 = params.is_x509(),
            "Connecting"
        );
        Ok(())
    }

    /// Starts a one-shot device registration. Exactly one of
    /// `RegistrationSucceeded` / `RegistrationFailed` follows.
    pub fn register(&mut self, params: &ConnectParams) -> CloudResult<()> {
        if !self.initialized {
            return Err(CloudError::NotInitialized);
        }
        if self.registering {
            return Err(CloudError::AlreadyRegistering);
        }

        info!(sdk = %self.sdk.version(), "Starting device registration");

        let mut provisioning = self
            .sdk
            .create_provisioning_session(&params.provisioning_endpoint, &params.id_scope)
            .ok_or_else(|| CloudError::ProvisioningUnavailable {
                endpoint: params.provisioning_endpoint.clone(),
                id_scope: params.id_scope.clone(),
            })?;

        let mut options = vec![SessionOption::LogTrace(self.settings.trace)];
        if params.is_x509() {
            options.push(SessionOption::X509Cert(params.cert.clone()));
            options.push(SessionOption::X509PrivateKey(params.key.clone()));
            options.push(SessionOption::RegistrationId(params.device_id.clone()));
        }

        for option in options {
            let name = option.name();
            provisioning
                .set_option(option)
                .map_err(|e| CloudError::SessionOption {
                    option: name.to_string(),
                    reason: e.to_string(),
                })?;
        }

        provisioning
            .register_device()
            .map_err(|e| CloudError::RegisterRequest(e.to_string()))?;

        self.provisioning = Some(provisioning);
        self.registering = true;

        info!(
            endpoint = %params.provisioning_endpoint,
            id_scope = %params.id_scope,
            "Registration requested"
        );
        Ok(())
    }

    /// Pumps whichever sessions are active. The observer may run zero or
    /// more times before this returns.
    pub fn poll(&mut self) {
        let notifications = match self.session.as_mut() {
            Some(session) => session.pump(),
            None => Vec::new(),
        };
        for notification in notifications {
            self.on_session_notification(notification);
        }

        let notifications = match self.provisioning.as_mut() {
            Some(provisioning) => provisioning.pump(),
            None => Vec::new(),
        };
        for notification in notifications {
            self.on_provisioning_notification(notification);
        }

        if !self.registering && self.provisioning.is_some() {
            self.provisioning = None;
        }
    }

    /// Releases every session. Unconfirmed sends are abandoned.
    pub fn deinitialize(&mut self) {
        if !self.in_flight.is_empty() {
            warn!(
                abandoned = self.in_flight.len(),
                "Abandoning unconfirmed messages"
            );
            self.in_flight.clear();
        }

        self.session = None;
        self.provisioning = None;
        self.registering = false;
        self.connected = false;

        if self.initialized {
            self.sdk.deinit();
            self.initialized = false;
            debug!("Transport deinitialized");
        }
    }

    pub fn state(&self) -> ConnectorState {
        if !self.initialized {
            ConnectorState::Uninitialized
        } else if self.registering {
            ConnectorState::Registering
        } else if self.session.is_some() && self.connected {
            ConnectorState::Connected
        } else if self.session.is_some() {
            ConnectorState::Connecting
        } else {
            ConnectorState::Idle
        }
    }

    /// Messages sent but not yet confirmed.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    // =========================================================================
    // Notification Handling
    // =========================================================================

    fn on_session_notification(&mut self, notification: SessionNotification) {
        match notification {
            SessionNotification::ConnectionStatus { state, reason } => {
                let status = ConnectionStatus::from_transport(state, &reason);
                self.connected = status.is_connected();

                if self.connected {
                    info!("Connected");
                } else {
                    warn!(status = %status, reason = %reason, "Not connected");
                }
                self.emit(CloudEvent::ConnectionStatusChanged(status));
            }

            SessionNotification::SendConfirmation { message_id, result } => {
                match self.in_flight.remove(&message_id) {
                    Some(token) => {
                        debug!(message_id = %message_id, ?result, "Send confirmed");
                        let event = if result.is_ok() {
                            CloudEvent::SendSucceeded(token)
                        } else {
                            CloudEvent::SendFailed(token)
                        };
                        self.emit(event);
                    }
                    None => {
                        warn!(message_id = %message_id, "Confirmation for unknown message")
                    }
                }
            }
        }
    }

    fn on_provisioning_notification(&mut self, notification: ProvisioningNotification) {
        match notification {
            ProvisioningNotification::Status(phase) => {
                debug!(?phase, "Registration progress");
            }

            ProvisioningNotification::Completed(result) => {
                if !self.registering {
                    warn!("Ignoring repeated registration result");
                    return;
                }
                self.registering = false;

                match result {
                    Ok(assignment) => {
                        info!(
                            hub = %assignment.host_name,
                            device_id = %assignment.device_id,
                            "Device registered"
                        );
                        self.emit(CloudEvent::RegistrationSucceeded);
                    }
                    Err(reason) => {
                        error!(reason = %reason, "Registration failed");
                        self.emit(CloudEvent::RegistrationFailed);
                    }
                }
            }
        }
    }

    fn emit(&mut self, event: CloudEvent<T>) {
        match self.observer.as_mut() {
            Some(observer) => observer(event),
            None => debug!(kind = event.kind(), "No observer registered; event dropped"),
        }
    }
}

impl<S: TransportSdk, T> CloudLink<T> for Connector<S, T> {
    fn connect(&mut self, params: &ConnectParams) -> CloudResult<()> {
        Connector::connect(self, params)
    }

    fn register(&mut self, params: &ConnectParams) -> CloudResult<()> {
        Connector::register(self, params)
    }

    fn send(&mut self, payload: &str, token: T) -> CloudResult<()> {
        if !self.connected {
            return Err(CloudError::NotConnected);
        }
        let session = self.session.as_mut().ok_or(CloudError::NotConnected)?;

        let message = OutboundMessage::json(payload);
        let id = message.id;
        session
            .send_async(message)
            .map_err(|e| CloudError::SendRejected(e.to_string()))?;

        self.in_flight.insert(id, token);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loopback::{JournalHandle, LoopbackScript, LoopbackSdk};
    use crate::transport::Confirmation;
    use edgelink_core::TransportReason;
    use std::cell::RefCell;
    use std::rc::Rc;

    type Events = Rc<RefCell<Vec<CloudEvent<u32>>>>;

    fn params() -> ConnectParams {
        ConnectParams {
            host_name: "hub.example.net".into(),
            provisioning_endpoint: "global.example.net".into(),
            id_scope: "0ne000ABC".into(),
            device_id: "edge-01".into(),
            cert: String::new(),
            key: "HostName=hub.example.net;DeviceId=edge-01;SharedAccessKey=a2V5".into(),
        }
    }

    fn x509_params() -> ConnectParams {
        ConnectParams {
            cert: "CERT".into(),
            key: "KEY".into(),
            ..params()
        }
    }

    fn setup(script: LoopbackScript) -> (Connector<LoopbackSdk, u32>, JournalHandle, Events) {
        let sdk = LoopbackSdk::new(script);
        let journal = sdk.journal();
        let mut connector = Connector::new(sdk, SessionSettings::default());
        let events: Events = Rc::default();
        let sink = events.clone();
        connector.register_observer(Box::new(move |e| sink.borrow_mut().push(e)));
        connector.initialize().unwrap();
        (connector, journal, events)
    }

    #[test]
    fn test_operations_need_initialize() {
        let mut connector: Connector<LoopbackSdk, u32> =
            Connector::new(LoopbackSdk::default(), SessionSettings::default());
        assert_eq!(connector.state(), ConnectorState::Uninitialized);
        assert!(matches!(
            connector.connect(&params()),
            Err(CloudError::NotInitialized)
        ));
        assert!(matches!(
            connector.register(&params()),
            Err(CloudError::NotInitialized)
        ));

        connector.initialize().unwrap();
        assert!(matches!(
            connector.initialize(),
            Err(CloudError::AlreadyInitialized)
        ));
    }

    #[test]
    fn test_init_failure() {
        let script = LoopbackScript {
            fail_init: true,
            ..Default::default()
        };
        let mut connector: Connector<LoopbackSdk, u32> =
            Connector::new(LoopbackSdk::new(script), SessionSettings::default());
        assert!(matches!(connector.initialize(), Err(CloudError::InitError(_))));
        assert_eq!(connector.state(), ConnectorState::Uninitialized);
    }

    #[test]
    fn test_connect_then_status_event() {
        let (mut connector, journal, events) = setup(LoopbackScript::default());
        connector.connect(&params()).unwrap();
        assert_eq!(connector.state(), ConnectorState::Connecting);
        // Nothing fires outside poll.
        assert!(events.borrow().is_empty());

        connector.poll();
        assert_eq!(
            *events.borrow(),
            vec![CloudEvent::ConnectionStatusChanged(ConnectionStatus::Connected)]
        );
        assert_eq!(connector.state(), ConnectorState::Connected);

        let journal = journal.lock();
        assert_eq!(journal.credentials, vec![params().key]);
        assert_eq!(
            journal.options,
            vec![
                SessionOption::LogTrace(true),
                SessionOption::AutoUrlEncode(true)
            ]
        );
    }

    #[test]
    fn test_second_connect_rejected_without_side_effects() {
        let (mut connector, journal, events) = setup(LoopbackScript::default());
        connector.connect(&params()).unwrap();
        connector.poll();

        assert!(matches!(
            connector.connect(&params()),
            Err(CloudError::AlreadyConnected)
        ));
        assert_eq!(connector.state(), ConnectorState::Connected);
        assert_eq!(journal.lock().credentials.len(), 1);

        connector.send("{}", 1).unwrap();
        connector.poll();
        assert_eq!(events.borrow().last(), Some(&CloudEvent::SendSucceeded(1)));
    }

    #[test]
    fn test_x509_identity_and_options() {
        let (mut connector, journal, _) = setup(LoopbackScript::default());
        connector.connect(&x509_params()).unwrap();

        let journal = journal.lock();
        assert_eq!(
            journal.credentials,
            vec!["HostName=hub.example.net;DeviceId=edge-01;x509=true".to_string()]
        );
        assert!(journal.options.contains(&SessionOption::X509Cert("CERT".into())));
        assert!(journal
            .options
            .contains(&SessionOption::X509PrivateKey("KEY".into())));
    }

    #[test]
    fn test_trusted_cert_option() {
        let sdk = LoopbackSdk::default();
        let journal = sdk.journal();
        let settings = SessionSettings {
            trusted_cert: Some("ROOTS".into()),
            ..Default::default()
        };
        let mut connector: Connector<LoopbackSdk, u32> = Connector::new(sdk, settings);
        connector.initialize().unwrap();
        connector.connect(&params()).unwrap();

        assert!(journal
            .lock()
            .options
            .contains(&SessionOption::TrustedCert("ROOTS".into())));
    }

    #[test]
    fn test_session_create_and_option_errors() {
        let (mut connector, _, _) = setup(LoopbackScript::default());
        let bad = ConnectParams {
            key: "garbage".into(),
            ..params()
        };
        assert!(matches!(
            connector.connect(&bad),
            Err(CloudError::SessionCreateError { .. })
        ));
        assert_eq!(connector.state(), ConnectorState::Idle);

        let (mut connector, _, _) =
            setup(LoopbackScript::default().reject_option("auto_url_encode_decode"));
        let err = connector.connect(&params()).unwrap_err();
        assert!(matches!(err, CloudError::SessionOption { ref option, .. } if option == "auto_url_encode_decode"));
        // Half-built session was discarded, so a retry is not "already connected".
        assert!(matches!(
            connector.connect(&params()),
            Err(CloudError::SessionOption { .. })
        ));
    }

    #[test]
    fn test_send_requires_connected_status() {
        let (mut connector, _, _) = setup(LoopbackScript::default());
        assert!(matches!(connector.send("{}", 1), Err(CloudError::NotConnected)));

        connector.connect(&params()).unwrap();
        // Session exists but status not yet reported.
        assert!(matches!(connector.send("{}", 1), Err(CloudError::NotConnected)));
    }

    #[test]
    fn test_refused_connection_blocks_send() {
        let (mut connector, _, events) =
            setup(LoopbackScript::default().refuse(TransportReason::NoNetwork));
        connector.connect(&params()).unwrap();
        connector.poll();

        assert_eq!(
            *events.borrow(),
            vec![CloudEvent::ConnectionStatusChanged(
                ConnectionStatus::DisconnectedNoNetwork
            )]
        );
        assert!(matches!(connector.send("{}", 1), Err(CloudError::NotConnected)));
    }

    #[test]
    fn test_send_outcomes_carry_tokens() {
        let (mut connector, journal, events) =
            setup(LoopbackScript::default().fail_send(1).reject_send(2));
        connector.connect(&params()).unwrap();
        connector.poll();
        events.borrow_mut().clear();

        connector.send("{\"a\":1}", 10).unwrap();
        connector.send("{\"b\":2}", 20).unwrap();
        assert!(matches!(
            connector.send("{\"c\":3}", 30),
            Err(CloudError::SendRejected(_))
        ));
        assert_eq!(connector.in_flight(), 2);

        connector.poll();
        assert_eq!(
            *events.borrow(),
            vec![CloudEvent::SendSucceeded(10), CloudEvent::SendFailed(20)]
        );
        assert_eq!(connector.in_flight(), 0);

        let journal = journal.lock();
        assert_eq!(journal.messages.len(), 2);
        assert!(journal
            .messages
            .iter()
            .all(|m| m.content_type == "application/json" && m.content_encoding == "utf-8"));
    }

    #[test]
    fn test_deinitialize_twice_is_safe() {
        let (mut connector, journal, _) =
            setup(LoopbackScript::default().never_confirm(0));
        connector.connect(&params()).unwrap();
        connector.poll();
        connector.send("{}", 1).unwrap();

        connector.deinitialize();
        connector.deinitialize();

        assert_eq!(connector.state(), ConnectorState::Uninitialized);
        assert_eq!(connector.in_flight(), 0);
        assert_eq!(journal.lock().deinit_calls, 1);

        // Initialize works again after a matching deinitialize.
        connector.initialize().unwrap();
        assert_eq!(connector.state(), ConnectorState::Idle);
    }

    #[test]
    fn test_registration_single_terminal_event() {
        let script = LoopbackScript {
            repeat_registration_result: true,
            ..Default::default()
        };
        let (mut connector, journal, events) = setup(script);
        connector.register(&x509_params()).unwrap();
        assert_eq!(connector.state(), ConnectorState::Registering);
        assert!(matches!(
            connector.register(&x509_params()),
            Err(CloudError::AlreadyRegistering)
        ));

        for _ in 0..4 {
            connector.poll();
        }

        assert_eq!(*events.borrow(), vec![CloudEvent::RegistrationSucceeded]);
        assert_eq!(connector.state(), ConnectorState::Idle);

        let journal = journal.lock();
        assert_eq!(journal.registration_requests, 1);
        assert!(journal
            .provisioning_options
            .contains(&SessionOption::RegistrationId("edge-01".into())));
    }

    #[test]
    fn test_registration_failure_event() {
        let (mut connector, _, events) =
            setup(LoopbackScript::default().fail_registration("unauthorized"));
        connector.register(&params()).unwrap();
        connector.poll();
        connector.poll();
        assert_eq!(*events.borrow(), vec![CloudEvent::RegistrationFailed]);
    }

    #[test]
    fn test_registration_setup_errors() {
        let (mut connector, _, _) = setup(LoopbackScript::default());
        let no_scope = ConnectParams {
            id_scope: String::new(),
            ..params()
        };
        assert!(matches!(
            connector.register(&no_scope),
            Err(CloudError::ProvisioningUnavailable { .. })
        ));
        assert_eq!(connector.state(), ConnectorState::Idle);

        let script = LoopbackScript {
            fail_register_request: true,
            ..Default::default()
        };
        let (mut connector, _, _) = setup(script);
        assert!(matches!(
            connector.register(&params()),
            Err(CloudError::RegisterRequest(_))
        ));
        assert_eq!(connector.state(), ConnectorState::Idle);
    }

    #[test]
    fn test_unavailable_sdk_sessions() {
        let script = LoopbackScript {
            refuse_sessions: true,
            provisioning_unavailable: true,
            ..Default::default()
        };
        let (mut connector, _, _) = setup(script);

        assert!(matches!(
            connector.connect(&params()),
            Err(CloudError::SessionCreateError { ref device_id }) if device_id == "edge-01"
        ));
        assert!(matches!(
            connector.register(&params()),
            Err(CloudError::ProvisioningUnavailable { .. })
        ));
        assert_eq!(connector.state(), ConnectorState::Idle);
    }

    #[test]
    fn test_every_non_ok_confirmation_is_a_failure() {
        let script = LoopbackScript::default()
            .fail_send_with(0, Confirmation::Timeout)
            .fail_send_with(1, Confirmation::Destroyed)
            .fail_send(2);
        let (mut connector, _, events) = setup(script);
        connector.connect(&params()).unwrap();
        connector.poll();
        events.borrow_mut().clear();

        for token in [1, 2, 3] {
            connector.send("{}", token).unwrap();
        }
        connector.poll();

        assert_eq!(
            *events.borrow(),
            vec![
                CloudEvent::SendFailed(1),
                CloudEvent::SendFailed(2),
                CloudEvent::SendFailed(3),
            ]
        );
    }

    #[test]
    fn test_disconnect_after_connected() {
        let (mut connector, _, events) = setup(
            LoopbackScript::default().drop_after_connect(TransportReason::NoPingResponse),
        );
        connector.connect(&params()).unwrap();
        connector.poll();
        assert_eq!(connector.state(), ConnectorState::Connected);

        connector.send("{}", 7).unwrap();
        connector.poll();

        assert_eq!(
            *events.borrow(),
            vec![
                CloudEvent::ConnectionStatusChanged(ConnectionStatus::Connected),
                CloudEvent::ConnectionStatusChanged(ConnectionStatus::DisconnectedNoPingResponse),
                CloudEvent::SendSucceeded(7),
            ]
        );
        assert_eq!(connector.state(), ConnectorState::Connecting);
        assert!(matches!(connector.send("{}", 8), Err(CloudError::NotConnected)));
    }
}
