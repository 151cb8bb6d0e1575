// src/lib.rs

//! dagrun — core engine for executing DAGs of resource-aware tasks.
//!
//! A workflow is a directed acyclic graph of [`task::TaskNode`]s that
//! exchange typed data handles ([`datum::Datum`]). The user constructs
//! datums for external inputs, wires tasks together by binding inputs to
//! upstream outputs, and hands the single *root* task (the sink whose
//! outputs they want) to a [`engine::WorkflowManager`]. The manager
//! discovers all ancestors, executes them in dependency order under a
//! global resource budget, and reports completion or the set of
//! failures.
//!
//! Task bodies run in isolated workers dispatched through a
//! [`worker::WorkerPool`]; the control loop never executes a body.
//!
//! ```no_run
//! use std::collections::BTreeMap;
//!
//! use serde_json::json;
//! use dagrun::datum::{shared, Datum};
//! use dagrun::engine::WorkflowManager;
//! use dagrun::task::{FnTask, OutputSpec, TaskNode};
//! use dagrun::worker::ThreadWorkerPool;
//!
//! # async fn demo() -> dagrun::errors::Result<()> {
//! let x = shared(Datum::value(json!(3))?);
//!
//! let double = TaskNode::new(
//!     "double",
//!     FnTask::new("double", |inputs| {
//!         let x = inputs["x"].as_i64().unwrap_or(0);
//!         Ok(BTreeMap::from([("out".to_string(), json!(x * 2))]))
//!     }),
//! );
//! double.declare_output(OutputSpec::unbound("out"));
//! double.bind_datum("x", x);
//!
//! let mut manager = WorkflowManager::new(double, BTreeMap::new())?;
//! let mut pool = ThreadWorkerPool::new(4);
//! let outcome = manager.run(&mut pool).await?;
//! assert!(outcome.is_complete());
//! # Ok(())
//! # }
//! ```

pub mod dag;
pub mod datum;
pub mod engine;
pub mod errors;
pub mod logging;
pub mod task;
pub mod worker;
