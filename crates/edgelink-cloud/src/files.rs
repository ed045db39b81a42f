//! # File Store
//!
//! Filesystem side of the manifest: building it from the command line,
//! reading payloads, and deleting what was delivered.
//!
//! ## List File Format
//! ```text
//! /var/spool/edgelink/A.json      ◄── one filename per line
//! /var/spool/edgelink/B.json
//!                                 ◄── blank lines skipped
//! <256+ byte line>                ◄── rejected with a warning
//! ...                             ◄── entries past max_files dropped
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use edgelink_core::{CoreError, Manifest};

use crate::delivery::PayloadSource;
use crate::error::{CloudError, CloudResult};

// =============================================================================
// Manifest Builders
// =============================================================================

/// Fails with `MissingFile` unless `path` names an existing regular file.
pub fn require_file(path: &Path) -> CloudResult<()> {
    if path.is_file() {
        Ok(())
    } else {
        Err(CloudError::MissingFile(path.to_path_buf()))
    }
}

/// One-entry manifest for `cloud-send -f`.
pub fn single(path: &Path) -> CloudResult<Manifest> {
    require_file(path)?;
    let mut manifest = Manifest::with_capacity(1);
    manifest.push(path)?;
    Ok(manifest)
}

/// Manifest from a list file, one filename per line.
pub fn load_list(path: &Path, max_files: usize) -> CloudResult<Manifest> {
    require_file(path)?;
    let contents = fs::read_to_string(path)?;
    let mut manifest = Manifest::with_capacity(max_files);

    let mut lines = contents.lines().enumerate();
    while let Some((index, line)) = lines.next() {
        let name = line.trim_end_matches('\r');
        if name.trim().is_empty() {
            continue;
        }

        match manifest.push(name) {
            Ok(_) => {}
            Err(CoreError::ManifestFull { max }) => {
                let dropped = 1 + lines.by_ref().filter(|(_, l)| !l.trim().is_empty()).count();
                warn!(max, dropped, list = %path.display(), "Too many files; extra entries dropped");
                break;
            }
            Err(e) => {
                warn!(line = index + 1, error = %e, list = %path.display(), "Skipping list entry");
            }
        }
    }

    info!(files = manifest.len(), list = %path.display(), "Loaded file list");
    Ok(manifest)
}

// =============================================================================
// Payload Source
// =============================================================================

/// Reads payloads from disk, refusing anything larger than `max_bytes` or
/// not valid UTF-8.
#[derive(Debug, Clone)]
pub struct FsPayloadSource {
    max_bytes: u64,
}

impl FsPayloadSource {
    pub fn new(max_bytes: u64) -> Self {
        FsPayloadSource { max_bytes }
    }
}

impl PayloadSource for FsPayloadSource {
    fn read(&mut self, path: &Path) -> CloudResult<String> {
        let unreadable = |reason: String| CloudError::PayloadUnreadable {
            path: path.to_path_buf(),
            reason,
        };

        let meta = fs::metadata(path).map_err(|e| unreadable(e.to_string()))?;
        if !meta.is_file() {
            return Err(unreadable("not a regular file".to_string()));
        }
        if meta.len() > self.max_bytes {
            return Err(unreadable(format!(
                "{} bytes exceeds limit of {}",
                meta.len(),
                self.max_bytes
            )));
        }

        fs::read_to_string(path).map_err(|e| unreadable(e.to_string()))
    }
}

// =============================================================================
// Cleanup
// =============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupSummary {
    pub deleted: usize,
    pub failed: usize,
}

/// Deletes every delivered file. Errors are logged, never fatal.
pub fn clean_delivered(manifest: &Manifest) -> CleanupSummary {
    let mut summary = CleanupSummary::default();

    for entry in manifest.delivered() {
        match fs::remove_file(&entry.path) {
            Ok(()) => {
                debug!(file = %entry.path.display(), "Deleted delivered file");
                summary.deleted += 1;
            }
            Err(e) => {
                warn!(file = %entry.path.display(), error = %e, "Could not delete delivered file");
                summary.failed += 1;
            }
        }
    }

    info!(
        deleted = summary.deleted,
        failed = summary.failed,
        "Cleanup finished"
    );
    summary
}

/// Paths still on disk that were queued but not delivered.
pub fn undelivered(manifest: &Manifest) -> Vec<PathBuf> {
    manifest
        .entries()
        .iter()
        .filter(|e| !e.is_delivered())
        .map(|e| e.path.clone())
        .collect()
}
