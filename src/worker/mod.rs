// src/worker/mod.rs

//! Pluggable worker-pool abstraction.
//!
//! The manager dispatches task bodies through a [`WorkerPool`] instead
//! of running them itself: the control thread never executes a body, and
//! workers never touch scheduler state. Any pool satisfying the contract
//! is admissible — thread-based (the built-in [`ThreadWorkerPool`]),
//! process-based, or cluster-backed — and tests can substitute pools
//! that complete jobs on command.
//!
//! The contract:
//! - `submit(job)` returns a handle for the in-flight job;
//! - `JobHandle::poll` is non-blocking and yields the result exactly
//!   once;
//! - `JobHandle::interrupt` requests cooperative interruption;
//! - `shutdown` stops accepting work and releases pool resources.

use crate::engine::TaskName;
use crate::errors::Result;
use crate::task::RawOutputs;

pub mod thread_pool;

pub use thread_pool::ThreadWorkerPool;

/// Terminal result of a worker job.
pub type JobResult = Result<RawOutputs>;

/// Non-blocking view of an in-flight job.
#[derive(Debug)]
pub enum JobStatus {
    Pending,
    Done(JobResult),
}

/// A unit of work handed to a pool: the task name (for diagnostics) and
/// the closure to execute in a worker.
pub struct WorkerJob {
    task: TaskName,
    run: Box<dyn FnOnce() -> JobResult + Send + 'static>,
}

impl WorkerJob {
    pub fn new<F>(task: impl Into<TaskName>, run: F) -> Self
    where
        F: FnOnce() -> JobResult + Send + 'static,
    {
        Self {
            task: task.into(),
            run: Box::new(run),
        }
    }

    pub fn task(&self) -> &str {
        &self.task
    }

    /// Execute the job body. Pools call this from a worker context.
    pub fn execute(self) -> JobResult {
        (self.run)()
    }
}

impl std::fmt::Debug for WorkerJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerJob")
            .field("task", &self.task)
            .finish_non_exhaustive()
    }
}

/// Handle to a submitted job.
pub trait JobHandle: Send {
    /// Non-blocking completion check. Once `Done` has been returned the
    /// handle is exhausted and must not be polled again.
    fn poll(&mut self) -> JobStatus;

    /// Request cooperative interruption of the job. Idempotent; the job
    /// is still reaped through `poll`.
    fn interrupt(&self);
}

/// Trait abstracting how scheduled task bodies are executed.
pub trait WorkerPool: Send {
    /// Dispatch a job for execution.
    fn submit(&mut self, job: WorkerJob) -> Result<Box<dyn JobHandle>>;

    /// Stop accepting work and release pool resources. Idempotent.
    fn shutdown(&mut self);
}
