// src/datum/file.rs

//! File-backed datum backend: the pointer is a path in the local
//! filesystem.

use std::path::Path;
use std::time::UNIX_EPOCH;

use tracing::debug;

use super::{hash_of, DatumBackend, Pointer};

/// Backend for values persisted as files.
///
/// Verification is an existence check. The quickhash combines the path
/// with the file's mtime, which is enough to expose modification without
/// reading the file.
#[derive(Debug, Default)]
pub struct FileBackend {
    owned: bool,
}

impl FileBackend {
    /// A backend that removes the file from disk on `clear`.
    ///
    /// Used for task outputs the workflow owns; external input files
    /// should use [`FileBackend::default`], which leaves them in place.
    pub fn owned() -> Self {
        Self { owned: true }
    }
}

impl DatumBackend for FileBackend {
    fn validate_format(&self, pointer: &Pointer) -> bool {
        matches!(pointer, Pointer::Path(p) if !p.as_os_str().is_empty())
    }

    fn verify_available(&self, pointer: &Pointer) -> bool {
        matches!(pointer, Pointer::Path(p) if p.exists())
    }

    fn clear(&mut self, pointer: &Pointer) {
        if !self.owned {
            return;
        }
        if let Pointer::Path(p) = pointer {
            if let Err(e) = std::fs::remove_file(p) {
                debug!(path = %p.display(), error = %e, "could not remove cleared file");
            }
        }
    }

    fn quickhash(&self, pointer: &Pointer) -> u64 {
        match pointer {
            Pointer::Path(p) => hash_of((p, mtime_nanos(p))),
            Pointer::Value(v) => hash_of(v.to_string()),
        }
    }
}

fn mtime_nanos(path: &Path) -> u128 {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_nanos())
        .unwrap_or(0)
}
