// src/datum/mod.rs

//! Data handles exchanged between tasks.
//!
//! A [`Datum`] is a typed handle to a value that will exist at some point
//! during workflow execution. It is often an IOU: a task's output datums
//! are created before the task has run, and downstream tasks bind to them
//! ahead of time.
//!
//! A datum moves through three states:
//!
//! ```text
//! EMPTY ──populate──► POPULATED ──verify──► AVAILABLE
//!   ▲                                           │
//!   └───────────────── clear ───────────────────┘
//! ```
//!
//! - EMPTY: no pointer.
//! - POPULATED: pointer set, existence unverified.
//! - AVAILABLE: pointer set and the value has been observed to exist.
//!
//! The state machine lives in [`Datum`]; what "well-formed", "exists" and
//! "remove" mean for a given kind of value is supplied by a
//! [`DatumBackend`]. The crate ships a [`memory`] backend (the pointer
//! carries the value itself) and a [`file`] backend (the pointer is a
//! filesystem path).

use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use crate::errors::{DagrunError, Result};

pub mod collection;
pub mod file;
pub mod memory;

pub use collection::DatumCollection;
pub use file::FileBackend;
pub use memory::MemoryBackend;

/// Opaque location descriptor for the value a datum points at.
///
/// Serializable so that the `collect inputs → run → raw outputs` triple
/// can cross a process boundary when a worker pool requires it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Pointer {
    /// An in-memory JSON value.
    Value(serde_json::Value),
    /// A location in the local filesystem.
    Path(PathBuf),
}

impl fmt::Display for Pointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pointer::Value(v) => write!(f, "value:{v}"),
            Pointer::Path(p) => write!(f, "path:{}", p.display()),
        }
    }
}

/// A datum is in exactly one of these states at any time.
///
/// The derived ordering (`Empty < Populated < Available`) is what lets a
/// [`DatumCollection`] report the least-advanced state of its members.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DatumState {
    Empty,
    Populated,
    Available,
}

/// Implementation-specific logic behind the datum state machine.
///
/// Implementors supply the four operations below; [`Datum`] enforces the
/// state transitions around them.
pub trait DatumBackend: Send + fmt::Debug {
    /// Whether `pointer` is well-formed for this backend.
    fn validate_format(&self, pointer: &Pointer) -> bool;

    /// Whether the value behind `pointer` exists right now.
    fn verify_available(&self, pointer: &Pointer) -> bool;

    /// Remove the underlying value if this backend owns it.
    fn clear(&mut self, pointer: &Pointer);

    /// Cheap identity hash of the pointed-at value. Not cryptographic;
    /// used only to expose modification.
    fn quickhash(&self, pointer: &Pointer) -> u64;
}

/// A typed handle to a value produced or consumed by tasks.
#[derive(Debug)]
pub struct Datum {
    backend: Box<dyn DatumBackend>,
    pointer: Option<Pointer>,
    state: DatumState,
    quickhash: Option<u64>,
}

impl Datum {
    /// Construct an EMPTY datum over the given backend.
    pub fn empty(backend: Box<dyn DatumBackend>) -> Self {
        Self {
            backend,
            pointer: None,
            state: DatumState::Empty,
            quickhash: None,
        }
    }

    /// Construct a datum and populate it immediately.
    ///
    /// Verification is attempted right away; if the value does not exist
    /// yet the datum is left POPULATED rather than failing.
    pub fn populated(backend: Box<dyn DatumBackend>, pointer: Pointer) -> Result<Self> {
        let mut datum = Self::empty(backend);
        datum.populate(pointer)?;
        let _ = datum.verify();
        Ok(datum)
    }

    /// An EMPTY in-memory datum.
    pub fn memory() -> Self {
        Self::empty(Box::<MemoryBackend>::default())
    }

    /// An in-memory datum populated with `value`.
    pub fn value(value: serde_json::Value) -> Result<Self> {
        Self::populated(Box::<MemoryBackend>::default(), Pointer::Value(value))
    }

    /// A file-backed datum populated with `path`. The file need not exist
    /// yet; the datum stays POPULATED until it does.
    pub fn file(path: impl Into<PathBuf>) -> Result<Self> {
        Self::populated(Box::<FileBackend>::default(), Pointer::Path(path.into()))
    }

    pub fn state(&self) -> DatumState {
        self.state
    }

    pub fn is_available(&self) -> bool {
        self.state == DatumState::Available
    }

    pub fn pointer(&self) -> Option<&Pointer> {
        self.pointer.as_ref()
    }

    /// The identity hash computed when this datum last became AVAILABLE.
    pub fn quickhash(&self) -> Option<u64> {
        self.quickhash
    }

    /// Set the pointer and move EMPTY → POPULATED.
    ///
    /// Idempotent when `pointer` equals the current pointer. A different
    /// pointer re-populates the datum, discarding any previous
    /// verification.
    pub fn populate(&mut self, pointer: Pointer) -> Result<()> {
        if self.state != DatumState::Empty && self.pointer.as_ref() == Some(&pointer) {
            return Ok(());
        }
        if !self.backend.validate_format(&pointer) {
            return Err(DagrunError::InvalidFormat(pointer.to_string()));
        }
        self.pointer = Some(pointer);
        self.state = DatumState::Populated;
        self.quickhash = None;
        Ok(())
    }

    /// Move POPULATED → AVAILABLE iff the underlying value exists.
    ///
    /// No-op when already AVAILABLE. The quickhash is computed here, on
    /// the transition into AVAILABLE.
    pub fn verify(&mut self) -> Result<()> {
        match self.state {
            DatumState::Available => Ok(()),
            DatumState::Empty => Err(DagrunError::NotAvailable(
                "datum is empty; populate it first".to_string(),
            )),
            DatumState::Populated => {
                let Some(pointer) = self.pointer.as_ref() else {
                    return Err(DagrunError::NotAvailable(
                        "populated datum has no pointer".to_string(),
                    ));
                };
                if self.backend.verify_available(pointer) {
                    self.quickhash = Some(self.backend.quickhash(pointer));
                    self.state = DatumState::Available;
                    Ok(())
                } else {
                    Err(DagrunError::NotAvailable(pointer.to_string()))
                }
            }
        }
    }

    /// Delete the underlying value (if the backend owns it) and reset to
    /// EMPTY.
    pub fn clear(&mut self) {
        if let Some(pointer) = self.pointer.take() {
            self.backend.clear(&pointer);
        }
        self.state = DatumState::Empty;
        self.quickhash = None;
    }

    /// Content equality, defined only when both datums are AVAILABLE.
    pub fn same_content(&self, other: &Datum) -> Option<bool> {
        match (self.quickhash, other.quickhash) {
            (Some(a), Some(b)) if self.is_available() && other.is_available() => Some(a == b),
            _ => None,
        }
    }
}

/// Shared handle to a datum.
///
/// Producers precede consumers in the DAG, so a datum is only ever
/// mutated by the control thread (during finalize) and read afterwards;
/// the mutex exists to make that sharing sound, not to arbitrate races.
pub type SharedDatum = Arc<Mutex<Datum>>;

/// Wrap a datum in a shared handle.
pub fn shared(datum: Datum) -> SharedDatum {
    Arc::new(Mutex::new(datum))
}

/// Lock a shared datum, recovering the data from a poisoned mutex.
pub fn lock(datum: &SharedDatum) -> std::sync::MutexGuard<'_, Datum> {
    datum.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

pub(crate) fn hash_of(h: impl Hash) -> u64 {
    let mut hasher = DefaultHasher::new();
    h.hash(&mut hasher);
    hasher.finish()
}
