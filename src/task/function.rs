// src/task/function.rs

//! Function-backed task body: wraps a plain closure over in-memory
//! values. The built-in variant for pure-computation workflows and the
//! workhorse of the test suite.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::datum::{hash_of, shared, Datum, DatumCollection, MemoryBackend, Pointer};
use crate::errors::Result;

use super::{CollectedInputs, InputForm, OutputSpec, RawOutputs, TaskBody};

static NEXT_INSTANCE: AtomicU64 = AtomicU64::new(0);

type BodyFn = dyn Fn(CollectedInputs) -> Result<BTreeMap<String, serde_json::Value>> + Send + Sync;
type CleanupFn = dyn Fn() + Send + Sync;

/// A task body that runs a closure.
///
/// The closure receives its collected inputs by name and returns a value
/// per declared output. Outputs are initialized as in-memory datums.
pub struct FnTask {
    label: String,
    instance: u64,
    input_form: InputForm,
    func: Box<BodyFn>,
    on_interrupt: Option<Box<CleanupFn>>,
    on_fail: Option<Box<CleanupFn>>,
}

impl FnTask {
    pub fn new<F>(label: impl Into<String>, func: F) -> Self
    where
        F: Fn(CollectedInputs) -> Result<BTreeMap<String, serde_json::Value>>
            + Send
            + Sync
            + 'static,
    {
        Self {
            label: label.into(),
            instance: NEXT_INSTANCE.fetch_add(1, Ordering::Relaxed),
            input_form: InputForm::Object,
            func: Box::new(func),
            on_interrupt: None,
            on_fail: None,
        }
    }

    /// Override the argument form the closure consumes.
    pub fn with_input_form(mut self, form: InputForm) -> Self {
        self.input_form = form;
        self
    }

    /// Hook invoked on workflow cancellation while this task is running.
    pub fn on_interrupt<F: Fn() + Send + Sync + 'static>(mut self, hook: F) -> Self {
        self.on_interrupt = Some(Box::new(hook));
        self
    }

    /// Hook invoked when this task fails or its worker crashes.
    pub fn on_fail<F: Fn() + Send + Sync + 'static>(mut self, hook: F) -> Self {
        self.on_fail = Some(Box::new(hook));
        self
    }
}

impl fmt::Debug for FnTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnTask")
            .field("label", &self.label)
            .field("instance", &self.instance)
            .field("input_form", &self.input_form)
            .finish_non_exhaustive()
    }
}

impl TaskBody for FnTask {
    fn initialize_outputs(&self, specs: &[OutputSpec]) -> Result<DatumCollection> {
        let mut outputs = DatumCollection::new();
        for spec in specs {
            let datum = match &spec.pointer {
                Some(pointer) => {
                    Datum::populated(Box::<MemoryBackend>::default(), pointer.clone())?
                }
                None => Datum::empty(Box::<MemoryBackend>::default()),
            };
            outputs.insert(spec.name.clone(), shared(datum));
        }
        Ok(outputs)
    }

    fn input_form(&self) -> InputForm {
        self.input_form
    }

    fn run_logic(&self, inputs: CollectedInputs) -> Result<RawOutputs> {
        let values = (self.func)(inputs)?;
        Ok(values
            .into_iter()
            .map(|(name, value)| (name, Pointer::Value(value)))
            .collect())
    }

    fn quickhash(&self) -> u64 {
        hash_of((&self.label, self.instance))
    }

    fn interrupt_cleanup(&self) {
        if let Some(hook) = &self.on_interrupt {
            hook();
        }
    }

    fn fail_cleanup(&self) {
        if let Some(hook) = &self.on_fail {
            hook();
        }
    }
}
