//! # Runner
//!
//! Owns the connector for the lifetime of a run and drives an orchestrator
//! until it reports an [`Exit`] or a shutdown signal arrives.
//!
//! ## Tick
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  every poll_interval:                                                   │
//! │                                                                         │
//! │   machine.step(connector) ──► connector.poll() ──► drain events         │
//! │          │                           │                   │              │
//! │          │ Some(exit)                │ observer pushes   │ machine      │
//! │          ▼                           ▼ into channel      ▼ .on_event()  │
//! │        stop                    (no re-entry into          Some(exit)    │
//! │                                  the machine)             ──► stop      │
//! │                                                                         │
//! │  Ctrl+C / SIGTERM wins over the next tick and yields Exit::Interrupted │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Everything runs on one thread; the observer is not `Send`.

use std::future::Future;
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use edgelink_core::CloudEvent;

use crate::connector::{Connector, EventObserver, SessionSettings};
use crate::error::CloudResult;
use crate::machine::{Exit, StateMachine};
use crate::transport::TransportSdk;

/// Observer that forwards every event into a channel the runner drains
/// after `poll`.
pub fn channel_observer<T: 'static>() -> (EventObserver<T>, UnboundedReceiver<CloudEvent<T>>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let observer: EventObserver<T> = Box::new(move |event| {
        if tx.send(event).is_err() {
            debug!("Event receiver gone; dropping event");
        }
    });
    (observer, rx)
}

/// One driver tick. Returns the exit if the machine finished.
pub fn tick<S, T, M>(
    machine: &mut M,
    connector: &mut Connector<S, T>,
    events: &mut UnboundedReceiver<CloudEvent<T>>,
) -> Option<Exit>
where
    S: TransportSdk,
    M: StateMachine<T>,
{
    if let Some(exit) = machine.step(connector) {
        return Some(exit);
    }

    connector.poll();

    while let Ok(event) = events.try_recv() {
        if let Some(exit) = machine.on_event(event) {
            return Some(exit);
        }
    }
    None
}

/// Ticks until the machine exits or `shutdown` resolves, then releases the
/// connector.
pub async fn drive<S, T, M, F>(
    machine: &mut M,
    connector: &mut Connector<S, T>,
    events: &mut UnboundedReceiver<CloudEvent<T>>,
    poll_interval: Duration,
    shutdown: F,
) -> Exit
where
    S: TransportSdk,
    M: StateMachine<T>,
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);

    let mut ticker = interval(poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let exit = loop {
        let outcome = tokio::select! {
            biased;

            _ = &mut shutdown => {
                warn!("Interrupted; stopping");
                Some(Exit::Interrupted)
            }

            _ = ticker.tick() => tick(machine, connector, events),
        };

        if let Some(exit) = outcome {
            break exit;
        }
    };

    connector.deinitialize();
    info!(?exit, "Run finished");
    exit
}

/// Builds and initializes a connector over `sdk`, then drives `machine`.
///
/// Setup failures come back as `Err`; everything after that is an [`Exit`].
pub async fn run_until<S, T, M, F>(
    sdk: S,
    settings: SessionSettings,
    machine: &mut M,
    poll_interval: Duration,
    shutdown: F,
) -> CloudResult<Exit>
where
    S: TransportSdk,
    T: 'static,
    M: StateMachine<T>,
    F: Future<Output = ()>,
{
    let mut connector = Connector::new(sdk, settings);
    let (observer, mut events) = channel_observer();
    connector.register_observer(observer);

    if let Err(e) = connector.initialize() {
        error!(error = %e, "Transport setup failed");
        return Err(e);
    }

    Ok(drive(machine, &mut connector, &mut events, poll_interval, shutdown).await)
}

/// [`run_until`] stopped by Ctrl+C or SIGTERM.
pub async fn run<S, T, M>(
    sdk: S,
    settings: SessionSettings,
    machine: &mut M,
    poll_interval: Duration,
) -> CloudResult<Exit>
where
    S: TransportSdk,
    T: 'static,
    M: StateMachine<T>,
{
    run_until(sdk, settings, machine, poll_interval, shutdown_signal()).await
}

/// Resolves on Ctrl+C or SIGTERM. A handler that cannot be installed just
/// never fires.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delivery::{DeliveryFlow, DeliveryState, ExitPolicy};
    use crate::error::CloudError;
    use crate::files::{self, FsPayloadSource};
    use crate::loopback::{LoopbackScript, LoopbackSdk};
    use crate::registration::RegistrationFlow;
    use edgelink_core::{ConnectParams, EntryId, Manifest, TransportReason};
    use std::fs;
    use tempfile::TempDir;

    const TICK: Duration = Duration::from_millis(1);

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

    fn spool(dir: &TempDir, names: &[&str]) -> Manifest {
        let mut manifest = Manifest::with_capacity(16);
        for name in names {
            let path = dir.path().join(name);
            fs::write(&path, format!("{{\"name\":\"{name}\"}}")).unwrap();
            manifest.push(&path).unwrap();
        }
        manifest
    }

    #[tokio::test]
    async fn test_delivery_end_to_end() {
        let dir = TempDir::new().unwrap();
        let sdk = LoopbackSdk::default();
        let journal = sdk.journal();
        let mut flow = DeliveryFlow::new(
            params(),
            spool(&dir, &["A.json", "B.json"]),
            FsPayloadSource::new(1024),
            ExitPolicy::Completion,
        );

        let exit = run_until(
            sdk,
            SessionSettings::default(),
            &mut flow,
            TICK,
            std::future::pending(),
        )
        .await
        .unwrap();

        assert_eq!(exit, Exit::Success);
        assert_eq!(flow.succeeded(), 2);

        {
            let journal = journal.lock();
            assert_eq!(journal.messages.len(), 2);
            assert_eq!(journal.messages[0].body, "{\"name\":\"A.json\"}");
            assert_eq!(journal.init_calls, 1);
            assert_eq!(journal.deinit_calls, 1);
        }

        let summary = files::clean_delivered(flow.manifest());
        assert_eq!(summary.deleted, 2);
        assert!(!dir.path().join("A.json").exists());
        assert!(!dir.path().join("B.json").exists());
    }

    #[tokio::test]
    async fn test_partial_failure_keeps_failed_file() {
        let dir = TempDir::new().unwrap();
        let sdk = LoopbackSdk::new(LoopbackScript::default().fail_send(1));
        let mut flow = DeliveryFlow::new(
            params(),
            spool(&dir, &["A.json", "B.json", "C.json"]),
            FsPayloadSource::new(1024),
            ExitPolicy::Completion,
        );

        let exit = run_until(
            sdk,
            SessionSettings::default(),
            &mut flow,
            TICK,
            std::future::pending(),
        )
        .await
        .unwrap();

        assert_eq!(exit, Exit::Success);
        assert_eq!((flow.succeeded(), flow.failed()), (2, 1));

        files::clean_delivered(flow.manifest());
        assert!(!dir.path().join("A.json").exists());
        assert!(dir.path().join("B.json").exists());
        assert!(!dir.path().join("C.json").exists());
    }

    #[tokio::test]
    async fn test_no_network_exits_without_sending() {
        let dir = TempDir::new().unwrap();
        let sdk = LoopbackSdk::new(LoopbackScript::default().refuse(TransportReason::NoNetwork));
        let journal = sdk.journal();
        let mut flow = DeliveryFlow::new(
            params(),
            spool(&dir, &["A.json"]),
            FsPayloadSource::new(1024),
            ExitPolicy::Completion,
        );

        let exit = run_until(
            sdk,
            SessionSettings::default(),
            &mut flow,
            TICK,
            std::future::pending(),
        )
        .await
        .unwrap();

        assert_eq!(exit, Exit::Failure);
        assert!(journal.lock().messages.is_empty());
        assert!(dir.path().join("A.json").exists());
    }

    #[tokio::test(start_paused = true)]
    async fn test_interrupt_then_cleanup_keeps_unconfirmed() {
        let dir = TempDir::new().unwrap();
        let sdk = LoopbackSdk::new(LoopbackScript::default().never_confirm(1));
        let journal = sdk.journal();
        let mut flow = DeliveryFlow::new(
            params(),
            spool(&dir, &["A.json", "B.json"]),
            FsPayloadSource::new(1024),
            ExitPolicy::Completion,
        );

        let exit = run_until(
            sdk,
            SessionSettings::default(),
            &mut flow,
            TICK,
            tokio::time::sleep(Duration::from_millis(50)),
        )
        .await
        .unwrap();

        assert_eq!(exit, Exit::Interrupted);
        assert_eq!(flow.succeeded(), 1);
        assert_eq!(journal.lock().messages.len(), 2);
        assert_eq!(journal.lock().deinit_calls, 1);

        let summary = files::clean_delivered(flow.manifest());
        assert_eq!(summary.deleted, 1);
        assert!(!dir.path().join("A.json").exists());
        assert!(dir.path().join("B.json").exists());
        assert_eq!(
            files::undelivered(flow.manifest()),
            vec![dir.path().join("B.json")]
        );
    }

    #[tokio::test]
    async fn test_disconnect_while_sending_is_logged_only() {
        let dir = TempDir::new().unwrap();
        let sdk = LoopbackSdk::new(
            LoopbackScript::default().drop_after_connect(TransportReason::CommunicationError),
        );
        let mut flow = DeliveryFlow::new(
            params(),
            spool(&dir, &["A.json", "B.json"]),
            FsPayloadSource::new(1024),
            ExitPolicy::Strict,
        );

        let exit = run_until(
            sdk,
            SessionSettings::default(),
            &mut flow,
            TICK,
            std::future::pending(),
        )
        .await
        .unwrap();

        assert_eq!(exit, Exit::Success);
        assert_eq!((flow.succeeded(), flow.failed()), (2, 0));
    }

    #[tokio::test]
    async fn test_early_unknown_status_keeps_waiting() {
        let dir = TempDir::new().unwrap();
        let script = LoopbackScript {
            pre_auth_notice: true,
            ..LoopbackScript::default().connect_after(2)
        };
        let mut flow = DeliveryFlow::new(
            params(),
            spool(&dir, &["A.json"]),
            FsPayloadSource::new(1024),
            ExitPolicy::Completion,
        );

        let exit = run_until(
            LoopbackSdk::new(script),
            SessionSettings::default(),
            &mut flow,
            TICK,
            std::future::pending(),
        )
        .await
        .unwrap();

        assert_eq!(exit, Exit::Success);
        assert_eq!(flow.succeeded(), 1);
    }

    #[tokio::test]
    async fn test_shutdown_wins_over_first_tick() {
        let sdk = LoopbackSdk::default();
        let journal = sdk.journal();
        let mut flow = RegistrationFlow::new(params());

        let exit = run_until(
            sdk,
            SessionSettings::default(),
            &mut flow,
            TICK,
            std::future::ready(()),
        )
        .await
        .unwrap();

        assert_eq!(exit, Exit::Interrupted);
        assert_eq!(journal.lock().registration_requests, 0);
    }

    #[tokio::test]
    async fn test_registration_end_to_end() {
        let mut flow = RegistrationFlow::new(params());
        let exit = run_until(
            LoopbackSdk::default(),
            SessionSettings::default(),
            &mut flow,
            TICK,
            std::future::pending(),
        )
        .await
        .unwrap();
        assert_eq!(exit, Exit::Success);

        let mut flow = RegistrationFlow::new(params());
        let exit = run_until(
            LoopbackSdk::new(LoopbackScript::default().fail_registration("unauthorized")),
            SessionSettings::default(),
            &mut flow,
            TICK,
            std::future::pending(),
        )
        .await
        .unwrap();
        assert_eq!(exit, Exit::Failure);
    }

    #[tokio::test]
    async fn test_init_failure_is_setup_error() {
        let script = LoopbackScript {
            fail_init: true,
            ..Default::default()
        };
        let mut flow = RegistrationFlow::new(params());

        let err = run_until(
            LoopbackSdk::new(script),
            SessionSettings::default(),
            &mut flow,
            TICK,
            std::future::pending(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, CloudError::InitError(_)));
        assert!(err.is_setup_error());
    }

    #[test]
    fn test_tick_drains_events_in_order() {
        let sdk = LoopbackSdk::default();
        let mut connector: Connector<LoopbackSdk, ()> =
            Connector::new(sdk, SessionSettings::default());
        let (observer, mut events) = channel_observer();
        connector.register_observer(observer);
        connector.initialize().unwrap();

        let mut flow = RegistrationFlow::new(params());
        let mut exit = None;
        for _ in 0..8 {
            exit = tick(&mut flow, &mut connector, &mut events);
            if exit.is_some() {
                break;
            }
        }
        assert_eq!(exit, Some(Exit::Success));
    }

    #[test]
    fn test_connecting_survives_empty_polls() {
        let dir = TempDir::new().unwrap();
        let sdk = LoopbackSdk::new(LoopbackScript::default().connect_after(4));
        let journal = sdk.journal();
        let mut connector: Connector<LoopbackSdk, EntryId> =
            Connector::new(sdk, SessionSettings::default());
        let (observer, mut events) = channel_observer();
        connector.register_observer(observer);
        connector.initialize().unwrap();

        let mut flow = DeliveryFlow::new(
            params(),
            spool(&dir, &["A.json"]),
            FsPayloadSource::new(1024),
            ExitPolicy::Completion,
        );

        for _ in 0..4 {
            assert_eq!(tick(&mut flow, &mut connector, &mut events), None);
        }
        assert_eq!(flow.state(), DeliveryState::Connecting);
        assert!(journal.lock().messages.is_empty());

        let mut exit = None;
        for _ in 0..4 {
            exit = tick(&mut flow, &mut connector, &mut events);
            if exit.is_some() {
                break;
            }
        }
        assert_eq!(exit, Some(Exit::Success));
        assert_eq!(journal.lock().messages.len(), 1);
    }
}
