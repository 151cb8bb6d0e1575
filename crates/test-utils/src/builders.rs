#![allow(dead_code)]

use std::collections::BTreeMap;

use serde_json::Value;

use dagrun::datum::{shared, Datum, SharedDatum};
use dagrun::task::{CollectedInputs, FnTask, OutputRef, OutputSpec, TaskNode, TaskRef};

/// Shared in-memory datum holding `value`.
pub fn value_datum(value: Value) -> SharedDatum {
    shared(Datum::value(value).expect("in-memory datum from value"))
}

/// A function task with a single output named `out`.
pub fn single_output<F>(label: &str, f: F) -> FnTask
where
    F: Fn(&CollectedInputs) -> Value + Send + Sync + 'static,
{
    FnTask::new(label, move |inputs| {
        Ok(BTreeMap::from([("out".to_string(), f(&inputs))]))
    })
}

/// A function task that always fails with the given message.
pub fn failing(label: &str, message: &str) -> FnTask {
    let message = message.to_string();
    FnTask::new(label, move |_| Err(anyhow::anyhow!("{message}").into()))
}

/// Builder for function-backed task nodes to simplify test graph setup.
pub struct TaskNodeBuilder {
    name: String,
    body: FnTask,
    outputs: Vec<OutputSpec>,
    datum_inputs: Vec<(String, SharedDatum)>,
    upstream_inputs: Vec<(String, OutputRef)>,
    resources: Vec<(String, u64)>,
    deps: Vec<TaskRef>,
}

impl TaskNodeBuilder {
    pub fn new(name: &str, body: FnTask) -> Self {
        Self {
            name: name.to_string(),
            body,
            outputs: Vec::new(),
            datum_inputs: Vec::new(),
            upstream_inputs: Vec::new(),
            resources: Vec::new(),
            deps: Vec::new(),
        }
    }

    /// Declare an output with the given name.
    pub fn output(mut self, name: &str) -> Self {
        self.outputs.push(OutputSpec::unbound(name));
        self
    }

    /// Bind an input to an external datum.
    pub fn input_datum(mut self, name: &str, datum: SharedDatum) -> Self {
        self.datum_inputs.push((name.to_string(), datum));
        self
    }

    /// Bind an input to an upstream task output (creates a DAG edge).
    pub fn input_from(mut self, name: &str, output: OutputRef) -> Self {
        self.upstream_inputs.push((name.to_string(), output));
        self
    }

    /// Declare demand for `amount` units of a resource.
    pub fn resource(mut self, name: &str, amount: u64) -> Self {
        self.resources.push((name.to_string(), amount));
        self
    }

    /// Add a dataless dependency edge.
    pub fn after(mut self, dep: &TaskRef) -> Self {
        self.deps.push(dep.clone());
        self
    }

    pub fn build(self) -> TaskRef {
        let node = TaskNode::new(self.name, self.body);
        for spec in self.outputs {
            node.declare_output(spec);
        }
        for (name, datum) in self.datum_inputs {
            node.bind_datum(name, datum);
        }
        for (name, output) in self.upstream_inputs {
            node.bind_output(name, output);
        }
        for (name, amount) in self.resources {
            node.require(name, amount);
        }
        for dep in &self.deps {
            node.depends_on(dep);
        }
        node
    }
}
