//! # File Manifest
//!
//! Ordered, bounded list of files queued for delivery in one batch.
//!
//! ## Entry Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        FileEntry Status                                 │
//! │                                                                         │
//! │                 mark_in_flight            complete(true)               │
//! │   ┌────────┐  ───────────────►  ┌──────────┐ ──────────► ┌───────────┐  │
//! │   │ Queued │                    │ InFlight │             │ Delivered │  │
//! │   └───┬────┘                    └────┬─────┘             └───────────┘  │
//! │       │ mark_skipped                 │ complete(false)                  │
//! │       ▼                              ▼                                  │
//! │   ┌─────────┐                   ┌────────┐                              │
//! │   │ Skipped │                   │ Failed │                              │
//! │   └─────────┘                   └────────┘                              │
//! │                                                                         │
//! │  An entry leaves InFlight exactly once. Only Delivered entries are     │
//! │  eligible for cleanup.                                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Insertion order is delivery order. The manifest does no file I/O itself;
//! reading list files and deleting delivered files live in `edgelink-cloud`.

use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::{DEFAULT_MAX_FILES, MAX_FILENAME_LEN};

// =============================================================================
// Entry Id
// =============================================================================

/// Position of an entry in its manifest. Used as the send correlation token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct EntryId(usize);

impl EntryId {
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// =============================================================================
// File Entry
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    #[default]
    Queued,
    InFlight,
    Delivered,
    Failed,
    /// Unreadable, or the transport refused to enqueue it.
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileEntry {
    pub path: PathBuf,
    pub status: EntryStatus,
}

impl FileEntry {
    pub fn is_delivered(&self) -> bool {
        self.status == EntryStatus::Delivered
    }
}

// =============================================================================
// Manifest
// =============================================================================

#[derive(Debug, Clone)]
pub struct Manifest {
    entries: Vec<FileEntry>,
    max_files: usize,
}

impl Default for Manifest {
    fn default() -> Self {
        Manifest::with_capacity(DEFAULT_MAX_FILES)
    }
}

impl Manifest {
    /// Creates an empty manifest holding at most `max_files` entries.
    pub fn with_capacity(max_files: usize) -> Self {
        Manifest {
            entries: Vec::new(),
            max_files,
        }
    }

    /// Appends a file to the end of the batch.
    ///
    /// ## Errors
    /// - `Validation(Required)` for an empty path
    /// - `Validation(TooLong)` for a path over [`MAX_FILENAME_LEN`] bytes
    /// - `ManifestFull` once `max_files` entries are queued
    pub fn push(&mut self, path: impl AsRef<Path>) -> CoreResult<EntryId> {
        let path = path.as_ref();
        let len = path.as_os_str().len();

        if len == 0 {
            return Err(ValidationError::Required {
                field: "filename".to_string(),
            }
            .into());
        }
        if len > MAX_FILENAME_LEN {
            return Err(ValidationError::TooLong {
                field: "filename".to_string(),
                max: MAX_FILENAME_LEN,
            }
            .into());
        }
        if self.is_full() {
            return Err(CoreError::ManifestFull {
                max: self.max_files,
            });
        }

        let id = EntryId(self.entries.len());
        self.entries.push(FileEntry {
            path: path.to_path_buf(),
            status: EntryStatus::Queued,
        });
        Ok(id)
    }

    /// Queued → InFlight.
    pub fn mark_in_flight(&mut self, id: EntryId) -> CoreResult<()> {
        self.transition(id, EntryStatus::Queued, EntryStatus::InFlight)
    }

    /// Queued → Skipped.
    pub fn mark_skipped(&mut self, id: EntryId) -> CoreResult<()> {
        self.transition(id, EntryStatus::Queued, EntryStatus::Skipped)
    }

    /// Records the terminal outcome of an in-flight entry.
    ///
    /// Returns `false` (and changes nothing) when the entry is unknown or not
    /// in flight, so a duplicate or stray confirmation is never counted twice.
    pub fn complete(&mut self, id: EntryId, delivered: bool) -> bool {
        match self.entries.get_mut(id.0) {
            Some(entry) if entry.status == EntryStatus::InFlight => {
                entry.status = if delivered {
                    EntryStatus::Delivered
                } else {
                    EntryStatus::Failed
                };
                true
            }
            _ => false,
        }
    }

    fn transition(&mut self, id: EntryId, from: EntryStatus, to: EntryStatus) -> CoreResult<()> {
        match self.entries.get_mut(id.0) {
            Some(entry) if entry.status == from => {
                entry.status = to;
                Ok(())
            }
            _ => Err(CoreError::UnknownEntry(id)),
        }
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Entry ids in delivery order.
    pub fn ids(&self) -> impl Iterator<Item = EntryId> {
        (0..self.entries.len()).map(EntryId)
    }

    pub fn entry(&self, id: EntryId) -> Option<&FileEntry> {
        self.entries.get(id.0)
    }

    pub fn entries(&self) -> &[FileEntry] {
        &self.entries
    }

    /// Entries whose delivery was confirmed.
    pub fn delivered(&self) -> impl Iterator<Item = &FileEntry> {
        self.entries.iter().filter(|e| e.is_delivered())
    }

    pub fn count(&self, status: EntryStatus) -> usize {
        self.entries.iter().filter(|e| e.status == status).count()
    }

    pub fn in_flight_count(&self) -> usize {
        self.count(EntryStatus::InFlight)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.max_files
    }

    pub fn max_files(&self) -> usize {
        self.max_files
    }
}
