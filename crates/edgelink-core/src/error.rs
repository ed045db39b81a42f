//! # Error Types
//!
//! Domain-specific error types for edgelink-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  edgelink-core errors (this file)                                      │
//! │  ├── CoreError        - Manifest bookkeeping failures                  │
//! │  └── ValidationError  - Identity / filename validation failures        │
//! │                                                                         │
//! │  edgelink-cloud errors (separate crate)                                │
//! │  └── CloudError       - Connector, config and I/O failures             │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → CloudError → exit code            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

use crate::manifest::EntryId;

// =============================================================================
// Core Error
// =============================================================================

/// Errors raised while building or mutating a manifest.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The manifest already holds its configured maximum number of entries.
    ///
    /// ## When This Occurs
    /// - A list file names more files than `max_files`
    /// - `push` is called on a full manifest
    #[error("Manifest is full: at most {max} files per batch")]
    ManifestFull { max: usize },

    /// An entry id does not belong to this manifest.
    #[error("Unknown manifest entry: {0}")]
    UnknownEntry(EntryId),

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} bytes")]
    TooLong { field: String, max: usize },

    /// Invalid format (e.g. a connection string segment without `=`).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;
