//! # EdgeLink Cloud
//!
//! Cloud connectivity for edge devices: a connector over a transport SDK,
//! the two orchestrators that drive it, and the runner both binaries share.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           EdgeLink Cloud                                │
//! │                                                                         │
//! │  ┌───────────────────────┐        ┌───────────────────────┐             │
//! │  │   DeliveryFlow        │        │   RegistrationFlow    │             │
//! │  │   (cloud-send)        │        │   (cloud-provision)   │             │
//! │  └───────────┬───────────┘        └───────────┬───────────┘             │
//! │              │      StateMachine / CloudLink  │                         │
//! │              └───────────────┬────────────────┘                         │
//! │                              ▼                                          │
//! │                 ┌─────────────────────────┐      ┌──────────┐           │
//! │                 │ runner (tick loop)      │ ◄─── │ Settings │           │
//! │                 └────────────┬────────────┘      └──────────┘           │
//! │                              ▼                                          │
//! │                 ┌─────────────────────────┐                             │
//! │                 │ Connector               │──► CloudEvent observer      │
//! │                 └────────────┬────────────┘                             │
//! │                              ▼ TransportSdk                             │
//! │                 ┌─────────────────────────┐                             │
//! │                 │ LoopbackSdk / vendor SDK│                             │
//! │                 └─────────────────────────┘                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod connector;
pub mod delivery;
pub mod error;
pub mod files;
pub mod loopback;
pub mod machine;
pub mod registration;
pub mod runner;
pub mod transport;

pub use config::{params_from_connection_string, Settings, TransportKind};
pub use connector::{CloudLink, Connector, ConnectorState, EventObserver, SessionSettings};
pub use delivery::{DeliveryFlow, DeliveryReport, DeliveryState, ExitPolicy, PayloadSource};
pub use error::{CloudError, CloudResult};
pub use files::{CleanupSummary, FsPayloadSource};
pub use loopback::{LoopbackScript, LoopbackSdk};
pub use machine::{Exit, StateMachine};
pub use registration::{RegistrationFlow, RegistrationState};
pub use runner::{run, run_until, shutdown_signal};
pub use transport::{TransportError, TransportSdk};
