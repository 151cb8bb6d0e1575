// src/errors.rs

//! Crate-wide error type and helpers.

use thiserror::Error;

use crate::engine::TaskName;

#[derive(Error, Debug)]
pub enum DagrunError {
    #[error("workflow contains a cycle: {0}")]
    CyclicGraph(String),

    #[error("two tasks in the workflow are both named `{0}`")]
    DuplicateTask(TaskName),

    #[error("task `{consumer}` references unknown output `{output}` of task `{producer}`")]
    UnknownOutput {
        consumer: TaskName,
        producer: TaskName,
        output: String,
    },

    #[error("task `{task}` demands {demand} `{resource}` but the budget caps it at {budget}")]
    UnsatisfiableResource {
        task: TaskName,
        resource: String,
        demand: u64,
        budget: u64,
    },

    #[error("malformed datum pointer: {0}")]
    InvalidFormat(String),

    #[error("datum is not available: {0}")]
    NotAvailable(String),

    #[error("task `{task}` did not produce declared output `{output}`")]
    OutputMissing { task: TaskName, output: String },

    #[error("input `{input}` of task `{task}` was dispatched before it became available")]
    InputNotReady { task: TaskName, input: String },

    #[error("worker crashed: {0}")]
    WorkerCrash(String),

    #[error("workflow deadlocked; stuck tasks: {0:?}")]
    Deadlock(Vec<TaskName>),

    #[error("workflow manager has already run")]
    AlreadyRun,

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, DagrunError>;
