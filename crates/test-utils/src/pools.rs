#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use dagrun::errors::{DagrunError, Result};
use dagrun::worker::{JobHandle, JobResult, JobStatus, WorkerJob, WorkerPool};

/// A pool that executes every job inline at submission time and records
/// the order in which tasks were started.
///
/// Handles report `Done` on the first poll, so the scheduler still goes
/// through a full reap cycle per task.
#[derive(Default)]
pub struct InstantPool {
    executed: Arc<Mutex<Vec<String>>>,
}

impl InstantPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Task names in the order they were executed.
    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }

    /// Shared handle to the execution log, for use after the pool has
    /// been moved into a running workflow.
    pub fn executed_handle(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.executed)
    }
}

impl WorkerPool for InstantPool {
    fn submit(&mut self, job: WorkerJob) -> Result<Box<dyn JobHandle>> {
        self.executed.lock().unwrap().push(job.task().to_string());
        let result = job.execute();
        Ok(Box::new(ReadyHandle {
            result: Some(result),
        }))
    }

    fn shutdown(&mut self) {}
}

struct ReadyHandle {
    result: Option<JobResult>,
}

impl JobHandle for ReadyHandle {
    fn poll(&mut self) -> JobStatus {
        match self.result.take() {
            Some(result) => JobStatus::Done(result),
            None => JobStatus::Pending,
        }
    }

    fn interrupt(&self) {}
}

#[derive(Default)]
struct ControlState {
    started: Vec<String>,
    slots: HashMap<String, Slot>,
}

#[derive(Default)]
struct Slot {
    job: Option<WorkerJob>,
    result: Option<JobResult>,
    interrupted: bool,
}

/// A pool whose jobs complete only when the test says so.
///
/// `submit` parks the job; the paired [`PoolController`] lets the test
/// observe what has started, then `finish` or `fail` individual tasks
/// while the workflow loop is running in the background.
pub struct ControllablePool {
    state: Arc<Mutex<ControlState>>,
}

impl ControllablePool {
    pub fn new() -> (Self, PoolController) {
        let state = Arc::new(Mutex::new(ControlState::default()));
        (
            Self {
                state: Arc::clone(&state),
            },
            PoolController { state },
        )
    }
}

impl WorkerPool for ControllablePool {
    fn submit(&mut self, job: WorkerJob) -> Result<Box<dyn JobHandle>> {
        let task = job.task().to_string();
        let mut state = self.state.lock().unwrap();
        state.started.push(task.clone());
        state.slots.insert(
            task.clone(),
            Slot {
                job: Some(job),
                ..Slot::default()
            },
        );
        Ok(Box::new(ControlledHandle {
            task,
            state: Arc::clone(&self.state),
        }))
    }

    fn shutdown(&mut self) {}
}

struct ControlledHandle {
    task: String,
    state: Arc<Mutex<ControlState>>,
}

impl JobHandle for ControlledHandle {
    fn poll(&mut self) -> JobStatus {
        let mut state = self.state.lock().unwrap();
        match state
            .slots
            .get_mut(&self.task)
            .and_then(|slot| slot.result.take())
        {
            Some(result) => JobStatus::Done(result),
            None => JobStatus::Pending,
        }
    }

    fn interrupt(&self) {
        let mut state = self.state.lock().unwrap();
        if let Some(slot) = state.slots.get_mut(&self.task) {
            slot.interrupted = true;
        }
    }
}

/// Test-side controller for a [`ControllablePool`].
#[derive(Clone)]
pub struct PoolController {
    state: Arc<Mutex<ControlState>>,
}

impl PoolController {
    /// Task names in the order they were submitted.
    pub fn started(&self) -> Vec<String> {
        self.state.lock().unwrap().started.clone()
    }

    /// Tasks submitted but not yet finished or failed.
    pub fn in_flight(&self) -> Vec<String> {
        let state = self.state.lock().unwrap();
        state
            .started
            .iter()
            .filter(|task| {
                state
                    .slots
                    .get(*task)
                    .is_some_and(|slot| slot.job.is_some() || slot.result.is_some())
            })
            .cloned()
            .collect()
    }

    /// Whether `interrupt` was requested for the given task.
    pub fn was_interrupted(&self, task: &str) -> bool {
        self.state
            .lock()
            .unwrap()
            .slots
            .get(task)
            .is_some_and(|slot| slot.interrupted)
    }

    /// Execute the parked job for `task` and deliver its result.
    pub fn finish(&self, task: &str) {
        let job = {
            let mut state = self.state.lock().unwrap();
            state
                .slots
                .get_mut(task)
                .and_then(|slot| slot.job.take())
                .unwrap_or_else(|| panic!("no parked job for task {task}"))
        };
        let result = job.execute();
        self.state
            .lock()
            .unwrap()
            .slots
            .get_mut(task)
            .expect("slot exists")
            .result = Some(result);
    }

    /// Deliver a crash result for `task` without executing its job.
    pub fn fail(&self, task: &str, message: &str) {
        let mut state = self.state.lock().unwrap();
        let slot = state
            .slots
            .get_mut(task)
            .unwrap_or_else(|| panic!("no parked job for task {task}"));
        slot.job = None;
        slot.result = Some(Err(DagrunError::WorkerCrash(message.to_string())));
    }

    /// Deliver a crash result for every interrupted, still-parked job,
    /// emulating workers that observe cancellation and exit.
    pub fn abort_interrupted(&self) {
        let mut state = self.state.lock().unwrap();
        for slot in state.slots.values_mut() {
            if slot.interrupted && slot.result.is_none() && slot.job.is_some() {
                slot.job = None;
                slot.result = Some(Err(DagrunError::WorkerCrash(
                    "interrupted by cancellation".to_string(),
                )));
            }
        }
    }

    /// Wait until `task` has been submitted to the pool.
    pub async fn wait_for_start(&self, task: &str) {
        for _ in 0..500 {
            if self.started().iter().any(|t| t == task) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("Task {task} did not start");
    }
}
