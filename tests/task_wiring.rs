// tests/task_wiring.rs

//! Task node wiring: output references, parent derivation, output
//! initialization and change detection.

use std::error::Error;

use serde_json::json;

use dagrun::datum::{DatumState, Pointer};
use dagrun::task::OutputSpec;
use dagrun_test_utils::builders::{single_output, value_datum, TaskNodeBuilder};
use dagrun_test_utils::init_tracing;

type TestResult = Result<(), Box<dyn Error>>;

#[test]
fn output_refs_resolve_only_after_initialization() -> TestResult {
    init_tracing();

    let producer = TaskNodeBuilder::new("producer", single_output("producer", |_| json!(0)))
        .output("out")
        .build();

    let handle = producer.output("out");
    assert!(handle.resolve().is_none());

    producer.initialize_outputs()?;
    let datum = handle.resolve().expect("initialized output");
    assert_eq!(dagrun::datum::lock(&datum).state(), DatumState::Empty);

    // Initialization is once-per-task: re-initializing keeps the same
    // datum instance.
    producer.initialize_outputs()?;
    let again = handle.resolve().expect("still resolvable");
    assert!(std::sync::Arc::ptr_eq(&datum, &again));

    Ok(())
}

#[test]
fn fixed_location_outputs_initialize_populated() -> TestResult {
    init_tracing();

    let producer = TaskNodeBuilder::new("producer", single_output("producer", |_| json!(0)))
        .output("out")
        .build();
    producer.declare_output(OutputSpec::at("fixed", Pointer::Value(json!(7))));

    producer.initialize_outputs()?;
    let datum = producer
        .output("fixed")
        .resolve()
        .expect("initialized output");
    let datum = dagrun::datum::lock(&datum);
    assert_eq!(datum.state(), DatumState::Available);
    assert_eq!(datum.pointer(), Some(&Pointer::Value(json!(7))));

    Ok(())
}

#[test]
fn parents_are_deduplicated_in_binding_order() -> TestResult {
    init_tracing();

    let left = TaskNodeBuilder::new("left", single_output("left", |_| json!(0)))
        .output("out")
        .build();
    let right = TaskNodeBuilder::new("right", single_output("right", |_| json!(0)))
        .output("a")
        .output("b")
        .build();

    let child = TaskNodeBuilder::new("child", single_output("child", |_| json!(0)))
        .output("out")
        .input_from("x", right.output("a"))
        .input_from("y", left.output("out"))
        .input_from("z", right.output("b"))
        .after(&left)
        .build();

    let child_parents = child.parents();
    let parents: Vec<&str> = child_parents.iter().map(|p| p.name()).collect();
    assert_eq!(parents, vec!["right", "left"]);

    Ok(())
}

#[test]
fn quickhash_exposes_wiring_changes() {
    init_tracing();

    let task = TaskNodeBuilder::new("t", single_output("t", |_| json!(0)))
        .output("out")
        .build();
    let before = task.quickhash();

    task.bind_datum("extra", value_datum(json!(1)));
    let after = task.quickhash();

    assert_ne!(before, after);
}

#[test]
fn distinct_bodies_hash_differently() {
    init_tracing();

    let a = TaskNodeBuilder::new("a", single_output("same_label", |_| json!(0)))
        .output("out")
        .build();
    let b = TaskNodeBuilder::new("b", single_output("same_label", |_| json!(0)))
        .output("out")
        .build();

    assert_ne!(a.quickhash(), b.quickhash());
}
