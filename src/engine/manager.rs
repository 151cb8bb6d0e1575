// src/engine/manager.rs

//! The concurrent scheduling loop.
//!
//! A [`WorkflowManager`] owns everything about one run: the discovered
//! ancestor graph, per-task states, resource accounting and the failure
//! latch. Task bodies execute in workers; the manager's control loop
//! only reaps completions, admits ready tasks and sleeps.
//!
//! Task state transitions are driven exclusively from here. Bodies never
//! mutate their own state.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::dag::DagGraph;
use crate::datum::{lock as lock_datum, DatumState, Pointer};
use crate::errors::{DagrunError, Result};
use crate::task::{resolve_binding, InputBinding, RawOutputs, TaskRef, TaskState};
use crate::worker::{JobHandle, JobStatus, WorkerJob, WorkerPool};

use super::resources::{ResourceMap, ResourcePool};
use super::{FailureReason, FailureReport, RunOptions, TaskName, WorkflowOutcome};

/// Cloneable handle for requesting cancellation of a running workflow.
///
/// Setting the flag is an asynchronous request: the control loop
/// observes it on its next iteration, stops admitting tasks and invokes
/// `interrupt_cleanup` on everything running. Requesting cancellation
/// more than once has no further effect.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    flag: Arc<AtomicBool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// A task currently executing in a worker, with the resources it holds.
struct RunningTask {
    name: TaskName,
    handle: Box<dyn JobHandle>,
    held: ResourceMap,
}

/// Executes the DAG of tasks terminating at a root task.
///
/// Construction discovers the root's ancestors, rejects cycles and
/// never-admissible resource demands, and initializes every task's
/// output datums. [`WorkflowManager::run`] then drives the workflow to a
/// terminal state.
pub struct WorkflowManager {
    graph: DagGraph,
    root: TaskName,
    states: HashMap<TaskName, TaskState>,
    resources: ResourcePool,
    options: RunOptions,
    cancel: CancelHandle,
    ran: bool,
}

impl WorkflowManager {
    pub fn new(root: TaskRef, budget: ResourceMap) -> Result<Self> {
        Self::with_options(root, budget, RunOptions::default())
    }

    pub fn with_options(root: TaskRef, budget: ResourceMap, options: RunOptions) -> Result<Self> {
        let root_name = root.name().to_string();
        let graph = DagGraph::from_root(&root)?;

        if let Some(cycle) = graph.detect_cycle() {
            return Err(DagrunError::CyclicGraph(cycle.join(" -> ")));
        }

        let resources = ResourcePool::new(budget);
        for task in graph.tasks() {
            let demand = task.resources();
            if resources.satisfiable(&demand) {
                continue;
            }
            // Name the offending key in the error.
            for (resource, amount) in demand {
                if let Some(cap) = resources.cap(&resource) {
                    if amount > cap {
                        return Err(DagrunError::UnsatisfiableResource {
                            task: task.name().to_string(),
                            resource,
                            demand: amount,
                            budget: cap,
                        });
                    }
                }
            }
        }

        for task in graph.tasks() {
            for (_, binding) in task.inputs() {
                if let InputBinding::Output(r) = binding {
                    let declared = r
                        .producer()
                        .output_specs()
                        .iter()
                        .any(|spec| spec.name == r.output());
                    if !declared {
                        return Err(DagrunError::UnknownOutput {
                            consumer: task.name().to_string(),
                            producer: r.producer().name().to_string(),
                            output: r.output().to_string(),
                        });
                    }
                }
            }
        }

        for task in graph.tasks() {
            task.initialize_outputs()?;
        }

        let states = graph
            .discovery_order()
            .iter()
            .map(|name| (name.clone(), TaskState::Waiting))
            .collect();

        Ok(Self {
            graph,
            root: root_name,
            states,
            resources,
            options,
            cancel: CancelHandle::default(),
            ran: false,
        })
    }

    /// Handle for cancelling the workflow from another thread or task.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Request cancellation. Equivalent to `cancel_handle().cancel()`;
    /// use the handle when the manager is borrowed by `run`.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// The name of the root (sink) task.
    pub fn root(&self) -> &str {
        &self.root
    }

    /// Snapshot of task states, for observability.
    pub fn status(&self) -> BTreeMap<TaskName, TaskState> {
        self.states
            .iter()
            .map(|(name, state)| (name.clone(), *state))
            .collect()
    }

    pub fn state_of(&self, name: &str) -> Option<TaskState> {
        self.states.get(name).copied()
    }

    /// Execute the workflow to a terminal state.
    ///
    /// Blocks (asynchronously) until every ancestor of the root is
    /// terminal or the run is abandoned. Task failures are reported in
    /// the returned [`WorkflowOutcome`], not as `Err`; `Err` is reserved
    /// for misuse ([`DagrunError::AlreadyRun`]) and scheduler-internal
    /// invariant violations ([`DagrunError::InputNotReady`]).
    pub async fn run(&mut self, pool: &mut dyn WorkerPool) -> Result<WorkflowOutcome> {
        if self.ran {
            return Err(DagrunError::AlreadyRun);
        }
        self.ran = true;

        info!(
            root = %self.root,
            tasks = self.graph.len(),
            budget = ?self.resources.budget(),
            "workflow run starting"
        );

        if self.options.verify_inputs_at_start {
            self.verify_external_inputs();
        }

        let mut running: Vec<RunningTask> = Vec::new();
        let mut failed: Vec<(TaskName, DagrunError)> = Vec::new();
        let mut cancelled = false;
        let poll_min = self.options.poll_min_ms.max(1);
        let poll_max = self.options.poll_max_ms.max(poll_min);
        let mut backoff_ms = poll_min;

        loop {
            // Observe a cancellation request exactly once: stop admitting
            // and interrupt everything currently running.
            if self.cancel.is_cancelled() && !cancelled {
                cancelled = true;
                info!("cancellation requested; interrupting running tasks");
                for rt in &running {
                    rt.handle.interrupt();
                    if let Some(task) = self.graph.get(&rt.name) {
                        task.body().interrupt_cleanup();
                    }
                }
            }

            let mut progressed = false;

            // Reap: poll every running worker without blocking.
            let mut idx = 0;
            while idx < running.len() {
                match running[idx].handle.poll() {
                    JobStatus::Pending => idx += 1,
                    JobStatus::Done(result) => {
                        let rt = running.swap_remove(idx);
                        self.resources.release(&rt.held);
                        self.reap(rt.name, result, &mut failed);
                        progressed = true;
                    }
                }
            }

            // Admit: scan waiting tasks in discovery order. Once the
            // failure latch is set no further task is admitted.
            let failed_latch = cancelled || !failed.is_empty();
            if !failed_latch {
                for name in self.graph.discovery_order().to_vec() {
                    if self.states.get(&name) != Some(&TaskState::Waiting) {
                        continue;
                    }
                    if !self.parents_complete(&name) {
                        continue;
                    }
                    let Some(task) = self.graph.get(&name) else {
                        continue;
                    };
                    let task = Arc::clone(task);
                    if !task.inputs_available() {
                        continue;
                    }
                    let demand = task.resources();
                    if !self.resources.fits(&demand) {
                        debug!(
                            task = %name,
                            demand = ?demand,
                            available = ?self.resources.available(),
                            "ready but short on resources; reconsidering later"
                        );
                        continue;
                    }

                    let job = self.make_job(&task)?;
                    let handle = pool.submit(job)?;
                    self.resources.acquire(&demand);
                    self.states.insert(name.clone(), TaskState::Running);
                    info!(task = %name, "task admitted");
                    running.push(RunningTask {
                        name,
                        handle,
                        held: demand,
                    });
                    progressed = true;
                }
            }

            // Terminate when the run has drained.
            if running.is_empty() {
                if failed_latch {
                    let report = FailureReport {
                        reason: if cancelled {
                            FailureReason::Cancelled
                        } else {
                            FailureReason::TaskFailures
                        },
                        failed: std::mem::take(&mut failed),
                        stuck: self.waiting_tasks(),
                    };
                    info!(
                        failed = report.failed.len(),
                        stuck = report.stuck.len(),
                        "workflow failed"
                    );
                    return Ok(WorkflowOutcome::Failed(report));
                }

                let waiting = self.waiting_tasks();
                if waiting.is_empty() {
                    info!("workflow complete");
                    return Ok(WorkflowOutcome::Complete);
                }
                if !progressed {
                    warn!(stuck = ?waiting, "workflow deadlocked; nothing running and nothing admissible");
                    return Ok(WorkflowOutcome::Failed(FailureReport {
                        reason: FailureReason::Deadlock,
                        failed: Vec::new(),
                        stuck: waiting,
                    }));
                }
            }

            if progressed {
                backoff_ms = poll_min;
            } else {
                tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                backoff_ms = (backoff_ms * 2).min(poll_max);
            }
        }
    }

    /// Handle one finished worker: finalize outputs on success, run
    /// failure cleanup otherwise.
    fn reap(
        &mut self,
        name: TaskName,
        result: Result<RawOutputs>,
        failed: &mut Vec<(TaskName, DagrunError)>,
    ) {
        match result.and_then(|raw| self.finalize(&name, raw)) {
            Ok(()) => {
                debug!(task = %name, "task completed; outputs available");
                self.states.insert(name, TaskState::Complete);
            }
            Err(e) => {
                warn!(task = %name, error = %e, "task failed");
                if let Some(task) = self.graph.get(&name) {
                    task.body().fail_cleanup();
                }
                self.states.insert(name.clone(), TaskState::Failed);
                failed.push((name, e));
            }
        }
    }

    /// Populate and verify every declared output of `name` from the raw
    /// output map the worker returned.
    fn finalize(&self, name: &str, raw: RawOutputs) -> Result<()> {
        let Some(task) = self.graph.get(name) else {
            return Ok(());
        };
        let Some(outputs) = task.outputs() else {
            return Ok(());
        };

        for (out_name, datum) in outputs.iter() {
            let Some(pointer) = raw.get(out_name) else {
                return Err(DagrunError::OutputMissing {
                    task: name.to_string(),
                    output: out_name.to_string(),
                });
            };
            let mut datum = lock_datum(datum);
            datum.populate(pointer.clone())?;
            datum.verify()?;
        }

        for extra in raw.keys().filter(|k| outputs.get(k).is_none()) {
            warn!(task = %name, output = %extra, "worker returned undeclared output; ignoring");
        }
        Ok(())
    }

    /// Build the worker job for a ready task: resolve its input bindings
    /// to concrete pointers and capture the body.
    ///
    /// Every input must be AVAILABLE at this point; anything else is a
    /// scheduler bug surfaced as [`DagrunError::InputNotReady`].
    fn make_job(&self, task: &TaskRef) -> Result<WorkerJob> {
        fn not_ready(task: &TaskRef, input: &str) -> DagrunError {
            DagrunError::InputNotReady {
                task: task.name().to_string(),
                input: input.to_string(),
            }
        }

        let mut resolved: Vec<(String, Pointer)> = Vec::new();
        for (input, binding) in task.inputs() {
            let datum = resolve_binding(&binding).ok_or_else(|| not_ready(task, &input))?;
            let datum = lock_datum(&datum);
            if !datum.is_available() {
                return Err(not_ready(task, &input));
            }
            let pointer = datum
                .pointer()
                .cloned()
                .ok_or_else(|| not_ready(task, &input))?;
            drop(datum);
            resolved.push((input, pointer));
        }

        let body = Arc::clone(task.body());
        Ok(WorkerJob::new(task.name(), move || {
            let collected = body.collect_inputs(&resolved)?;
            body.run_logic(collected)
        }))
    }

    fn parents_complete(&self, name: &str) -> bool {
        self.graph
            .dependencies_of(name)
            .iter()
            .all(|dep| self.states.get(dep) == Some(&TaskState::Complete))
    }

    fn waiting_tasks(&self) -> Vec<TaskName> {
        self.graph
            .discovery_order()
            .iter()
            .filter(|name| self.states.get(*name) == Some(&TaskState::Waiting))
            .cloned()
            .collect()
    }

    /// Give externally supplied POPULATED inputs one verification pass
    /// before the first admission round.
    fn verify_external_inputs(&self) {
        for task in self.graph.tasks() {
            for (input, binding) in task.inputs() {
                if let InputBinding::Datum(datum) = binding {
                    let mut datum = lock_datum(&datum);
                    if datum.state() == DatumState::Populated {
                        if let Err(e) = datum.verify() {
                            debug!(
                                task = %task.name(),
                                input = %input,
                                error = %e,
                                "external input not yet available"
                            );
                        }
                    }
                }
            }
        }
    }
}
