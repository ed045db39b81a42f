//! # State Machine Contract
//!
//! Both orchestrators are driven the same way: `step` once per driver tick,
//! then `on_event` for every event the connector produced during `poll`.
//! Either call may end the run by returning an [`Exit`].

use serde::Serialize;
use std::process::ExitCode;

use edgelink_core::CloudEvent;

use crate::connector::CloudLink;

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Exit {
    Success,
    Failure,
    /// Stopped by Ctrl+C / SIGTERM.
    Interrupted,
}

impl Exit {
    /// Process exit status.
    pub fn code(&self) -> u8 {
        match self {
            Exit::Success => 0,
            Exit::Failure => 1,
            Exit::Interrupted => 130,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Exit::Success)
    }
}

impl From<Exit> for ExitCode {
    fn from(exit: Exit) -> Self {
        ExitCode::from(exit.code())
    }
}

pub trait StateMachine<T> {
    /// Advances on the driver's tick. May call into the link.
    fn step(&mut self, link: &mut dyn CloudLink<T>) -> Option<Exit>;

    /// Consumes one connector event.
    fn on_event(&mut self, event: CloudEvent<T>) -> Option<Exit>;
}
