//! # edgelink-core: Pure Domain Types for EdgeLink
//!
//! Everything the connector, the orchestrators and the binaries agree on,
//! with zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        EdgeLink Architecture                            │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │            cloud-send / cloud-provision (binaries)              │   │
//! │  │         CLI ──► Settings ──► run(sdk, settings, machine)        │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                     edgelink-cloud                              │   │
//! │  │   Connector ◄──► Transport SDK      Delivery / Registration     │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ edgelink-core (THIS CRATE) ★                    │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │  params   │  │  status   │  │   event   │  │ manifest  │  │   │
//! │  │   │ Identity  │  │  Reason→  │  │CloudEvent │  │ FileEntry │  │   │
//! │  │   │ ConnStr   │  │  Status   │  │           │  │ Manifest  │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO TRANSPORT • NO CLOCKS • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`params`] - Device identity (`ConnectParams`, `ConnectionString`)
//! - [`status`] - Transport reason → `ConnectionStatus` translation
//! - [`event`] - `CloudEvent<T>` observer vocabulary
//! - [`manifest`] - Ordered delivery batch with per-entry status
//! - [`error`] - Domain error types

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod event;
pub mod manifest;
pub mod params;
pub mod status;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ValidationError};
pub use event::CloudEvent;
pub use manifest::{EntryId, EntryStatus, FileEntry, Manifest};
pub use params::{ConnectParams, ConnectionString, DeviceAuth};
pub use status::{ConnectionStatus, TransportAuthState, TransportReason};

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Longest filename a manifest accepts, in bytes.
pub const MAX_FILENAME_LEN: usize = 255;

/// Default cap on entries per delivery batch.
pub const DEFAULT_MAX_FILES: usize = 1024;
