//! # Registration Orchestrator
//!
//! One-shot device registration with the provisioning service.
//!
//! ```text
//! ┌──────┐  register() ok   ┌─────────────┐  RegistrationSucceeded  ┌─────────┐
//! │ Idle │ ───────────────► │ Registering │ ──────────────────────► │ exit 0  │
//! └──┬───┘                  └──────┬──────┘                         └─────────┘
//!    │ register() err              │ RegistrationFailed             ┌─────────┐
//!    └─────────────────────────────┴──────────────────────────────► │ exit 1  │
//!                                                                   └─────────┘
//! ```
//!
//! No retry: the outcome of the first request decides the exit.

use tracing::{debug, error, info};

use edgelink_core::{CloudEvent, ConnectParams};

use crate::connector::CloudLink;
use crate::machine::{Exit, StateMachine};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationState {
    Idle,
    Registering,
    Finished(Exit),
}

pub struct RegistrationFlow {
    params: ConnectParams,
    state: RegistrationState,
}

impl RegistrationFlow {
    pub fn new(params: ConnectParams) -> Self {
        RegistrationFlow {
            params,
            state: RegistrationState::Idle,
        }
    }

    pub fn state(&self) -> RegistrationState {
        self.state
    }

    fn finish(&mut self, exit: Exit) -> Option<Exit> {
        self.state = RegistrationState::Finished(exit);
        Some(exit)
    }
}

impl StateMachine<()> for RegistrationFlow {
    fn step(&mut self, link: &mut dyn CloudLink<()>) -> Option<Exit> {
        match self.state {
            RegistrationState::Idle => match link.register(&self.params) {
                Ok(()) => {
                    self.state = RegistrationState::Registering;
                    None
                }
                Err(e) => {
                    error!(error = %e, "Could not start registration");
                    self.finish(Exit::Failure)
                }
            },
            RegistrationState::Registering => None,
            RegistrationState::Finished(exit) => Some(exit),
        }
    }

    fn on_event(&mut self, event: CloudEvent<()>) -> Option<Exit> {
        if self.state != RegistrationState::Registering {
            debug!(kind = event.kind(), "Ignoring event outside registration");
            return None;
        }

        match event {
            CloudEvent::RegistrationSucceeded => {
                info!(device_id = %self.params.device_id, "Registration complete");
                self.finish(Exit::Success)
            }
            CloudEvent::RegistrationFailed => self.finish(Exit::Failure),
            other => {
                debug!(kind = other.kind(), "Ignoring event while registering");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{CloudError, CloudResult};

    /// Link whose register() outcome is fixed up front.
    struct FakeLink {
        fail_with: Option<fn() -> CloudError>,
        register_calls: usize,
    }

    impl CloudLink<()> for FakeLink {
        fn connect(&mut self, _params: &ConnectParams) -> CloudResult<()> {
            unreachable!("registration never connects")
        }

        fn register(&mut self, _params: &ConnectParams) -> CloudResult<()> {
            self.register_calls += 1;
            match self.fail_with {
                Some(make) => Err(make()),
                None => Ok(()),
            }
        }

        fn send(&mut self, _payload: &str, _token: ()) -> CloudResult<()> {
            unreachable!("registration never sends")
        }
    }

    fn ok_link() -> FakeLink {
        FakeLink {
            fail_with: None,
            register_calls: 0,
        }
    }

    #[test]
    fn test_success_path() {
        let mut flow = RegistrationFlow::new(ConnectParams::default());
        let mut link = ok_link();

        assert_eq!(flow.step(&mut link), None);
        assert_eq!(flow.state(), RegistrationState::Registering);
        // Waiting does not re-issue the request.
        assert_eq!(flow.step(&mut link), None);
        assert_eq!(link.register_calls, 1);

        assert_eq!(
            flow.on_event(CloudEvent::RegistrationSucceeded),
            Some(Exit::Success)
        );
        assert_eq!(flow.step(&mut link), Some(Exit::Success));
    }

    #[test]
    fn test_failure_event() {
        let mut flow = RegistrationFlow::new(ConnectParams::default());
        let mut link = ok_link();
        flow.step(&mut link);

        assert_eq!(
            flow.on_event(CloudEvent::ConnectionStatusChanged(
                edgelink_core::ConnectionStatus::Connected
            )),
            None
        );
        assert_eq!(
            flow.on_event(CloudEvent::RegistrationFailed),
            Some(Exit::Failure)
        );
    }

    #[test]
    fn test_unavailable_service_never_enters_registering() {
        let mut flow = RegistrationFlow::new(ConnectParams::default());
        let mut link = FakeLink {
            fail_with: Some(|| CloudError::ProvisioningUnavailable {
                endpoint: String::new(),
                id_scope: String::new(),
            }),
            register_calls: 0,
        };

        assert_eq!(flow.step(&mut link), Some(Exit::Failure));
        assert_eq!(flow.state(), RegistrationState::Finished(Exit::Failure));
        // A late event cannot flip the outcome.
        assert_eq!(flow.on_event(CloudEvent::RegistrationSucceeded), None);
    }
}
