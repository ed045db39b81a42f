//! # Delivery Orchestrator
//!
//! Connects, sends every queued file as one message, then waits for every
//! confirmation before reporting the batch outcome.
//!
//! ## Delivery Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Delivery State Machine                           │
//! │                                                                         │
//! │  ┌──────┐ connect() ok ┌────────────┐ Connected ┌───────────┐           │
//! │  │ Idle │ ───────────► │ Connecting │ ────────► │ Connected │           │
//! │  └──┬───┘              └─────┬──────┘           └─────┬─────┘           │
//! │     │ empty manifest         │ known disconnect       │ dispatch batch  │
//! │     │ or connect() err       │                        ▼                 │
//! │     │                        │               ┌────────────────┐         │
//! │     │                        │               │ SendInProgress │         │
//! │     │                        │               └───────┬────────┘         │
//! │     ▼                        ▼                       │ in-flight == 0   │
//! │  ┌──────────────────────────────┐                    ▼                  │
//! │  │           exit 1             │          ┌───────────────────┐        │
//! │  │ (also: zero sends submitted) │          │ exit per policy   │        │
//! │  └──────────────────────────────┘          └───────────────────┘        │
//! │                                                                         │
//! │  Per-item problems (unreadable file, rejected send) skip the entry     │
//! │  and never abort the batch. success + fail == submitted at the end.    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! `DisconnectedUnknown` while connecting is not a verdict: the flow keeps
//! waiting for a concrete status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use edgelink_core::{CloudEvent, ConnectParams, ConnectionStatus, EntryId, FileEntry, Manifest};

use crate::connector::CloudLink;
use crate::error::CloudResult;
use crate::machine::{Exit, StateMachine};

// =============================================================================
// Payload Source
// =============================================================================

/// Where message bodies come from. The filesystem in production.
pub trait PayloadSource {
    fn read(&mut self, path: &Path) -> CloudResult<String>;
}

// =============================================================================
// Exit Policy
// =============================================================================

/// How a completed batch maps to the process exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitPolicy {
    /// Exit 0 once every submitted message is confirmed, whatever the outcome.
    #[default]
    Completion,

    /// Any failed or skipped file makes the exit nonzero.
    Strict,
}

impl std::fmt::Display for ExitPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExitPolicy::Completion => write!(f, "completion"),
            ExitPolicy::Strict => write!(f, "strict"),
        }
    }
}

// =============================================================================
// Delivery Report
// =============================================================================

/// Outcome of one batch, written by `cloud-send --report`.
#[derive(Debug, Clone, Serialize)]
pub struct DeliveryReport {
    pub batch_id: Uuid,
    pub started_at: DateTime<Utc>,
    /// `None` if the run did not reach a terminal state.
    pub finished_at: Option<DateTime<Utc>>,
    pub outcome: Option<Exit>,
    pub policy: ExitPolicy,
    pub manifest_size: usize,
    pub submitted: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub files: Vec<FileEntry>,
}

// =============================================================================
// Delivery Flow
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryState {
    Idle,
    Connecting,
    Connected,
    SendInProgress,
    Finished(Exit),
}

pub struct DeliveryFlow<P> {
    params: ConnectParams,
    manifest: Manifest,
    source: P,
    policy: ExitPolicy,
    state: DeliveryState,
    in_flight: usize,
    submitted: usize,
    succeeded: usize,
    failed: usize,
    skipped: usize,
    batch_id: Uuid,
    started_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
}

impl<P: PayloadSource> DeliveryFlow<P> {
    pub fn new(params: ConnectParams, manifest: Manifest, source: P, policy: ExitPolicy) -> Self {
        DeliveryFlow {
            params,
            manifest,
            source,
            policy,
            state: DeliveryState::Idle,
            in_flight: 0,
            submitted: 0,
            succeeded: 0,
            failed: 0,
            skipped: 0,
            batch_id: Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn state(&self) -> DeliveryState {
        self.state
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    pub fn submitted(&self) -> usize {
        self.submitted
    }

    pub fn succeeded(&self) -> usize {
        self.succeeded
    }

    pub fn failed(&self) -> usize {
        self.failed
    }

    pub fn report(&self) -> DeliveryReport {
        DeliveryReport {
            batch_id: self.batch_id,
            started_at: self.started_at,
            finished_at: self.finished_at,
            outcome: match self.state {
                DeliveryState::Finished(exit) => Some(exit),
                _ => None,
            },
            policy: self.policy,
            manifest_size: self.manifest.len(),
            submitted: self.submitted,
            succeeded: self.succeeded,
            failed: self.failed,
            skipped: self.skipped,
            files: self.manifest.entries().to_vec(),
        }
    }

    fn finish(&mut self, exit: Exit) -> Option<Exit> {
        self.state = DeliveryState::Finished(exit);
        self.finished_at = Some(Utc::now());
        Some(exit)
    }

    /// Reads and submits every queued entry in manifest order.
    fn dispatch_batch(&mut self, link: &mut dyn CloudLink<EntryId>) {
        let ids: Vec<EntryId> = self.manifest.ids().collect();

        for id in ids {
            let Some(path) = self.manifest.entry(id).map(|e| e.path.clone()) else {
                continue;
            };

            let body = match self.source.read(&path) {
                Ok(body) => body,
                Err(e) => {
                    warn!(file = %path.display(), error = %e, "Skipping unreadable file");
                    self.skip(id);
                    continue;
                }
            };

            match link.send(&body, id) {
                Ok(()) => {
                    if let Err(e) = self.manifest.mark_in_flight(id) {
                        warn!(entry = %id, error = %e, "Manifest out of step");
                    }
                    self.submitted += 1;
                    self.in_flight += 1;
                    debug!(file = %path.display(), entry = %id, "Submitted");
                }
                Err(e) => {
                    warn!(file = %path.display(), error = %e, "Send rejected; skipping file");
                    self.skip(id);
                }
            }
        }
    }

    fn skip(&mut self, id: EntryId) {
        self.skipped += 1;
        if let Err(e) = self.manifest.mark_skipped(id) {
            warn!(entry = %id, error = %e, "Manifest out of step");
        }
    }

    fn on_send_complete(&mut self, id: EntryId, delivered: bool) -> Option<Exit> {
        if !self.manifest.complete(id, delivered) {
            warn!(entry = %id, "Completion for an entry that is not in flight");
            return None;
        }

        self.in_flight -= 1;
        if delivered {
            self.succeeded += 1;
        } else {
            self.failed += 1;
            if let Some(entry) = self.manifest.entry(id) {
                warn!(file = %entry.path.display(), "Delivery failed");
            }
        }

        if self.in_flight > 0 {
            return None;
        }

        info!(
            batch_id = %self.batch_id,
            skipped = self.skipped,
            "Sent {} files. OK: {}, NOK: {}",
            self.submitted,
            self.succeeded,
            self.failed
        );

        let clean = self.failed == 0 && self.skipped == 0;
        let exit = match self.policy {
            ExitPolicy::Completion => Exit::Success,
            ExitPolicy::Strict if clean => Exit::Success,
            ExitPolicy::Strict => Exit::Failure,
        };
        self.finish(exit)
    }
}

impl<P: PayloadSource> StateMachine<EntryId> for DeliveryFlow<P> {
    fn step(&mut self, link: &mut dyn CloudLink<EntryId>) -> Option<Exit> {
        match self.state {
            DeliveryState::Idle => {
                if self.manifest.is_empty() {
                    error!("No files to deliver");
                    return self.finish(Exit::Failure);
                }
                match link.connect(&self.params) {
                    Ok(()) => {
                        self.state = DeliveryState::Connecting;
                        None
                    }
                    Err(e) => {
                        error!(error = %e, "Connect failed");
                        self.finish(Exit::Failure)
                    }
                }
            }

            DeliveryState::Connecting | DeliveryState::SendInProgress => None,

            DeliveryState::Connected => {
                self.dispatch_batch(link);
                if self.submitted == 0 {
                    error!(
                        files = self.manifest.len(),
                        "No file could be submitted"
                    );
                    return self.finish(Exit::Failure);
                }

                self.succeeded = 0;
                self.failed = 0;
                self.state = DeliveryState::SendInProgress;
                info!(
                    submitted = self.submitted,
                    skipped = self.skipped,
                    "Batch dispatched; awaiting confirmations"
                );
                None
            }

            DeliveryState::Finished(exit) => Some(exit),
        }
    }

    fn on_event(&mut self, event: CloudEvent<EntryId>) -> Option<Exit> {
        match (self.state, event) {
            (DeliveryState::Connecting, CloudEvent::ConnectionStatusChanged(status)) => {
                match status {
                    ConnectionStatus::Connected => {
                        self.state = DeliveryState::Connected;
                        None
                    }
                    // Not a verdict yet; the handshake is still running.
                    ConnectionStatus::DisconnectedUnknown => {
                        debug!(status = %status, "Still connecting");
                        None
                    }
                    _ => {
                        error!(status = %status, "Connection failed");
                        self.finish(Exit::Failure)
                    }
                }
            }

            (DeliveryState::SendInProgress, CloudEvent::SendSucceeded(id)) => {
                self.on_send_complete(id, true)
            }
            (DeliveryState::SendInProgress, CloudEvent::SendFailed(id)) => {
                self.on_send_complete(id, false)
            }

            (state, CloudEvent::ConnectionStatusChanged(status)) => {
                info!(?state, status = %status, "Connection status changed");
                None
            }

            (state, other) => {
                debug!(?state, kind = other.kind(), "Ignoring event");
                None
            }
        }
    }
}
