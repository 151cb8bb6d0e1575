// src/task/mod.rs

//! Tasks: units of computational work with typed input/output bindings
//! and declared resource demands.
//!
//! - [`TaskBody`] is the extension trait a concrete task variant
//!   implements (output initialization, input collection, the work
//!   itself, cleanup hooks).
//! - [`TaskNode`] is the graph node wrapping a body: name, input
//!   bindings, output declarations, resource demands. Binding an input to
//!   an upstream task's [`OutputRef`] is what creates a DAG edge.
//! - [`function`] provides [`FnTask`](function::FnTask), a body wrapping
//!   a plain closure over in-memory values.
//!
//! Task *state* (WAITING / RUNNING / COMPLETE / FAILED) is owned and
//! driven exclusively by the workflow manager; nodes never mutate their
//! own state.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Deserialize;

use crate::datum::{lock as lock_datum, DatumCollection, Pointer, SharedDatum};
use crate::engine::{ResourceMap, TaskName};
use crate::errors::{DagrunError, Result};

pub mod function;

pub use function::FnTask;

/// A task is in exactly one of these states at any time:
///
/// ```text
///            (manager admits)        (worker returns)
/// WAITING ─────────────────► RUNNING ───────────► COMPLETE
///                               │
///                               └─(error/crash/cancel)─► FAILED
/// ```
///
/// COMPLETE and FAILED are absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Waiting,
    Running,
    Complete,
    Failed,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Complete | TaskState::Failed)
    }
}

/// The argument form a task body consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputForm {
    /// In-memory values; file-backed inputs are read and parsed.
    #[default]
    Object,
    /// Path strings; in-memory inputs cannot be converted to this form.
    FilePath,
}

/// User-facing output declaration, resolved into a concrete datum by the
/// task body's `initialize_outputs`.
#[derive(Debug, Clone)]
pub struct OutputSpec {
    pub name: String,
    pub pointer: Option<Pointer>,
}

impl OutputSpec {
    /// An output whose location is decided when the task completes.
    pub fn unbound(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            pointer: None,
        }
    }

    /// An output with a known location (e.g. a fixed file path).
    pub fn at(name: impl Into<String>, pointer: Pointer) -> Self {
        Self {
            name: name.into(),
            pointer: Some(pointer),
        }
    }
}

/// Inputs as consumed by a task body, keyed by input name.
pub type CollectedInputs = BTreeMap<String, serde_json::Value>;

/// What a task body returns: a pointer (or value) per declared output.
pub type RawOutputs = BTreeMap<String, Pointer>;

/// Extension trait for concrete task variants.
///
/// The engine supplies state-machine enforcement, input-readiness checks
/// and output finalization around these operations. `run_logic` (and the
/// default `collect_inputs`) execute on a worker, potentially in another
/// thread or process; everything else runs on the control thread.
pub trait TaskBody: Send + Sync + fmt::Debug {
    /// Convert output declarations into concrete datums. Called once per
    /// task, before scheduling begins.
    fn initialize_outputs(&self, specs: &[OutputSpec]) -> Result<DatumCollection>;

    /// The argument form `run_logic` consumes.
    fn input_form(&self) -> InputForm {
        InputForm::Object
    }

    /// Resolve collected input pointers to the form the body consumes.
    /// Runs on the worker immediately before `run_logic`.
    fn collect_inputs(&self, inputs: &[(String, Pointer)]) -> Result<CollectedInputs> {
        inputs
            .iter()
            .map(|(name, pointer)| Ok((name.clone(), convert_pointer(pointer, self.input_form())?)))
            .collect()
    }

    /// Perform the computation. Returns a pointer (or value) for every
    /// declared output.
    fn run_logic(&self, inputs: CollectedInputs) -> Result<RawOutputs>;

    /// Cheap identity hash exposing modifications to the task definition.
    fn quickhash(&self) -> u64;

    /// Called when the workflow is cancelled while this task is RUNNING.
    /// Must be idempotent and safe to call from any thread.
    fn interrupt_cleanup(&self) {}

    /// Called when the task reports failure or its worker crashes.
    fn fail_cleanup(&self) {}
}

/// Convert a pointer into the given argument form.
///
/// A file consumed as `Object` is read and parsed as JSON; content that
/// is not JSON is handed over as a string. An in-memory value consumed as
/// `FilePath` has no sensible conversion and is rejected.
pub fn convert_pointer(pointer: &Pointer, form: InputForm) -> Result<serde_json::Value> {
    match (pointer, form) {
        (Pointer::Value(v), InputForm::Object) => Ok(v.clone()),
        (Pointer::Path(p), InputForm::FilePath) => {
            Ok(serde_json::Value::String(p.display().to_string()))
        }
        (Pointer::Path(p), InputForm::Object) => {
            let content = std::fs::read_to_string(p)?;
            let parsed: std::result::Result<serde_json::Value, _> = serde_json::from_str(&content);
            Ok(parsed.unwrap_or(serde_json::Value::String(content)))
        }
        (Pointer::Value(_), InputForm::FilePath) => Err(DagrunError::InvalidFormat(format!(
            "in-memory value cannot be consumed as a file path: {pointer}"
        ))),
    }
}

/// How a task input is supplied.
#[derive(Debug, Clone)]
pub enum InputBinding {
    /// A concrete datum handle (an external workflow input).
    Datum(SharedDatum),
    /// A named output of an upstream task, resolved at schedule time.
    Output(OutputRef),
}

/// Handle to the future value of a task output.
///
/// Obtained from [`TaskNode::output`] before the producing task has run
/// (or even initialized its outputs); the manager resolves it to the
/// concrete datum once `initialize_outputs` has been invoked.
#[derive(Debug, Clone)]
pub struct OutputRef {
    producer: TaskRef,
    output: String,
}

impl OutputRef {
    pub fn producer(&self) -> &TaskRef {
        &self.producer
    }

    pub fn output(&self) -> &str {
        &self.output
    }

    /// The concrete datum behind this reference, once the producer's
    /// outputs have been initialized.
    pub fn resolve(&self) -> Option<SharedDatum> {
        self.producer
            .outputs()
            .and_then(|outs| outs.get(&self.output).cloned())
    }
}

/// Shared handle to a task node.
pub type TaskRef = Arc<TaskNode>;

/// A node in the task graph: a body plus its wiring.
///
/// All wiring mutators take `&self`; wiring happens while the graph is
/// being assembled, before a manager is constructed over it.
#[derive(Debug)]
pub struct TaskNode {
    name: TaskName,
    body: Arc<dyn TaskBody>,
    inputs: Mutex<Vec<(String, InputBinding)>>,
    output_specs: Mutex<Vec<OutputSpec>>,
    outputs: Mutex<Option<DatumCollection>>,
    resources: Mutex<ResourceMap>,
    explicit_deps: Mutex<Vec<TaskRef>>,
}

impl TaskNode {
    pub fn new(name: impl Into<TaskName>, body: impl TaskBody + 'static) -> TaskRef {
        Arc::new(Self {
            name: name.into(),
            body: Arc::new(body),
            inputs: Mutex::new(Vec::new()),
            output_specs: Mutex::new(Vec::new()),
            outputs: Mutex::new(None),
            resources: Mutex::new(ResourceMap::new()),
            explicit_deps: Mutex::new(Vec::new()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn body(&self) -> &Arc<dyn TaskBody> {
        &self.body
    }

    /// Bind an input to a concrete datum or an upstream output.
    pub fn bind_input(&self, name: impl Into<String>, binding: InputBinding) {
        lock(&self.inputs).push((name.into(), binding));
    }

    /// Bind an input to an external datum handle.
    pub fn bind_datum(&self, name: impl Into<String>, datum: SharedDatum) {
        self.bind_input(name, InputBinding::Datum(datum));
    }

    /// Bind an input to a named output of an upstream task. This creates
    /// a DAG edge from the producer to this task.
    pub fn bind_output(&self, name: impl Into<String>, output: OutputRef) {
        self.bind_input(name, InputBinding::Output(output));
    }

    /// Declare an output of this task.
    pub fn declare_output(&self, spec: OutputSpec) {
        lock(&self.output_specs).push(spec);
    }

    /// Add a dependency edge that carries no data.
    pub fn depends_on(&self, other: &TaskRef) {
        lock(&self.explicit_deps).push(Arc::clone(other));
    }

    /// Declare demand for `amount` units of the named resource.
    pub fn require(&self, resource: impl Into<String>, amount: u64) {
        lock(&self.resources).insert(resource.into(), amount);
    }

    /// Handle to the future value of the named output.
    pub fn output(self: &Arc<Self>, name: impl Into<String>) -> OutputRef {
        OutputRef {
            producer: Arc::clone(self),
            output: name.into(),
        }
    }

    /// This task's declared resource demand. Absent keys mean zero.
    pub fn resources(&self) -> ResourceMap {
        lock(&self.resources).clone()
    }

    /// Snapshot of the input bindings, in binding order.
    pub fn inputs(&self) -> Vec<(String, InputBinding)> {
        lock(&self.inputs).clone()
    }

    /// Snapshot of the declared output specs.
    pub fn output_specs(&self) -> Vec<OutputSpec> {
        lock(&self.output_specs).clone()
    }

    /// The concrete output collection, once initialized.
    pub fn outputs(&self) -> Option<DatumCollection> {
        lock(&self.outputs).clone()
    }

    /// The tasks whose outputs feed this task, plus explicit
    /// dependencies. Deduplicated by name, in binding order.
    pub fn parents(&self) -> Vec<TaskRef> {
        let mut seen = Vec::new();
        let mut parents: Vec<TaskRef> = Vec::new();
        for (_, binding) in lock(&self.inputs).iter() {
            if let InputBinding::Output(r) = binding {
                if !seen.contains(&r.producer.name) {
                    seen.push(r.producer.name.clone());
                    parents.push(Arc::clone(&r.producer));
                }
            }
        }
        for dep in lock(&self.explicit_deps).iter() {
            if !seen.contains(&dep.name) {
                seen.push(dep.name.clone());
                parents.push(Arc::clone(dep));
            }
        }
        parents
    }

    /// Build the concrete output datums from the declared specs.
    /// Idempotent; the first call wins.
    pub fn initialize_outputs(&self) -> Result<()> {
        let mut guard = lock(&self.outputs);
        if guard.is_some() {
            return Ok(());
        }
        let specs = lock(&self.output_specs).clone();
        *guard = Some(self.body.initialize_outputs(&specs)?);
        Ok(())
    }

    /// Cheap identity hash of this node: the body's hash combined with
    /// the wiring, so rebinding inputs or redeclaring outputs is exposed
    /// as a change.
    pub fn quickhash(&self) -> u64 {
        let input_names: Vec<String> = lock(&self.inputs)
            .iter()
            .map(|(name, _)| name.clone())
            .collect();
        let output_names: Vec<String> = lock(&self.output_specs)
            .iter()
            .map(|spec| spec.name.clone())
            .collect();
        crate::datum::hash_of((self.body.quickhash(), input_names, output_names))
    }

    /// Whether every input datum of this task is AVAILABLE.
    ///
    /// Inputs still POPULATED get one verification attempt, so external
    /// data that has appeared since the last check is picked up.
    pub fn inputs_available(&self) -> bool {
        for (_, binding) in lock(&self.inputs).iter() {
            let Some(datum) = resolve_binding(binding) else {
                return false;
            };
            let mut datum = lock_datum(&datum);
            if !datum.is_available() && datum.verify().is_err() {
                return false;
            }
        }
        true
    }
}

/// Resolve a binding to its concrete datum, if it exists yet.
pub fn resolve_binding(binding: &InputBinding) -> Option<SharedDatum> {
    match binding {
        InputBinding::Datum(d) => Some(Arc::clone(d)),
        InputBinding::Output(r) => r.resolve(),
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
