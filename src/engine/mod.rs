// src/engine/mod.rs

//! Orchestration engine.
//!
//! This module ties together:
//! - the DAG of task nodes (discovered from the root task)
//! - resource accounting against a global budget
//! - the scheduling loop that admits ready tasks, dispatches them to a
//!   worker pool, reaps completions and handles failures and
//!   cancellation.
//!
//! The scheduling loop lives in [`manager`]; resource bookkeeping in
//! [`resources`].

use serde::Deserialize;

use crate::errors::{DagrunError, Result};

/// Canonical task name type used throughout the engine.
pub type TaskName = String;

pub mod manager;
pub mod resources;

pub use manager::{CancelHandle, WorkflowManager};
pub use resources::{ResourceMap, ResourcePool};

/// Tuning knobs for the scheduling loop, used by both embedding
/// applications (deserialized from their config) and tests.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct RunOptions {
    /// Shortest sleep between idle scheduler iterations, in milliseconds.
    pub poll_min_ms: u64,
    /// Longest sleep between idle scheduler iterations, in milliseconds.
    pub poll_max_ms: u64,
    /// Verify externally supplied POPULATED input datums before the
    /// first admission round.
    pub verify_inputs_at_start: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            poll_min_ms: 1,
            poll_max_ms: 50,
            verify_inputs_at_start: true,
        }
    }
}

/// Terminal result of a workflow run.
#[derive(Debug)]
pub enum WorkflowOutcome {
    /// Every ancestor of the root completed and the root's outputs are
    /// available.
    Complete,
    Failed(FailureReport),
}

impl WorkflowOutcome {
    pub fn is_complete(&self) -> bool {
        matches!(self, WorkflowOutcome::Complete)
    }

    /// Collapse the outcome into a `Result`, turning a failure report
    /// into its representative error.
    pub fn ok(self) -> Result<()> {
        match self {
            WorkflowOutcome::Complete => Ok(()),
            WorkflowOutcome::Failed(report) => Err(report.into_error()),
        }
    }
}

/// Why a run ended without completing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    /// One or more tasks failed; their descendants were never started.
    TaskFailures,
    /// Cancellation was requested while the run was in flight.
    Cancelled,
    /// Nothing was running and nothing could be admitted while tasks
    /// were still waiting.
    Deadlock,
}

/// Diagnostic payload of a failed run.
#[derive(Debug)]
pub struct FailureReport {
    pub reason: FailureReason,
    /// Tasks that entered FAILED, with the error each reported.
    pub failed: Vec<(TaskName, DagrunError)>,
    /// Tasks still WAITING when the run ended.
    pub stuck: Vec<TaskName>,
}

impl FailureReport {
    /// A single error summarizing the report.
    pub fn into_error(self) -> DagrunError {
        match self.reason {
            FailureReason::Deadlock => DagrunError::Deadlock(self.stuck),
            _ => self
                .failed
                .into_iter()
                .next()
                .map(|(_, e)| e)
                .unwrap_or_else(|| {
                    DagrunError::Other(anyhow::anyhow!(
                        "workflow cancelled before any task failed"
                    ))
                }),
        }
    }
}
