// tests/diamond.rs

//! Diamond-shaped workflow over in-memory values:
//!
//! ```text
//!        x = 3
//!          │
//!         t0 (+1)
//!        /    \
//!   t1 (+1)  t2 (·2)
//!        \    /
//!        t3 (·)
//! ```

use std::collections::BTreeMap;
use std::error::Error;

use serde_json::json;

use dagrun::datum::lock as lock_datum;
use dagrun::engine::WorkflowManager;
use dagrun::task::{TaskRef, TaskState};
use dagrun_test_utils::builders::{single_output, value_datum, TaskNodeBuilder};
use dagrun_test_utils::pools::InstantPool;
use dagrun_test_utils::{init_tracing, with_timeout};

type TestResult = Result<(), Box<dyn Error>>;

fn as_i64(value: &serde_json::Value) -> i64 {
    value.as_i64().expect("integer value")
}

fn diamond() -> TaskRef {
    let x = value_datum(json!(3));

    let t0 = TaskNodeBuilder::new("t0", single_output("t0", |i| json!(as_i64(&i["x"]) + 1)))
        .output("out")
        .input_datum("x", x)
        .build();
    let t1 = TaskNodeBuilder::new("t1", single_output("t1", |i| json!(as_i64(&i["x"]) + 1)))
        .output("out")
        .input_from("x", t0.output("out"))
        .build();
    let t2 = TaskNodeBuilder::new("t2", single_output("t2", |i| json!(as_i64(&i["x"]) * 2)))
        .output("out")
        .input_from("x", t0.output("out"))
        .build();
    TaskNodeBuilder::new(
        "t3",
        single_output("t3", |i| json!(as_i64(&i["x"]) * as_i64(&i["y"]))),
    )
    .output("out")
    .input_from("x", t1.output("out"))
    .input_from("y", t2.output("out"))
    .build()
}

#[tokio::test]
async fn diamond_completes_with_expected_product() -> TestResult {
    with_timeout(async {
        init_tracing();

        let root = diamond();
        let mut manager = WorkflowManager::new(root.clone(), BTreeMap::new())?;
        let mut pool = InstantPool::new();

        let outcome = manager.run(&mut pool).await?;
        assert!(outcome.is_complete());

        // (3+1+1) * ((3+1)*2) = 5 * 8
        let out = root.output("out").resolve().expect("root output datum");
        let out = lock_datum(&out);
        assert!(out.is_available());
        assert_eq!(out.pointer().and_then(|p| match p {
            dagrun::datum::Pointer::Value(v) => v.as_i64(),
            _ => None,
        }), Some(40));

        for (task, state) in manager.status() {
            assert_eq!(state, TaskState::Complete, "task {task} not complete");
        }

        // Root's whole output set is available as a composite handle.
        let outputs = root.outputs().expect("initialized outputs");
        assert_eq!(outputs.state(), dagrun::datum::DatumState::Available);
        assert!(outputs.quickhash().is_some());

        Ok(())
    })
    .await
}

#[tokio::test]
async fn admission_order_follows_discovery_order() -> TestResult {
    with_timeout(async {
        init_tracing();

        let root = diamond();
        let mut manager = WorkflowManager::new(root, BTreeMap::new())?;
        let mut pool = InstantPool::new();
        let executed = pool.executed_handle();

        manager.run(&mut pool).await?.ok()?;

        // Dependencies gate t1/t2 behind t0 and t3 behind both; among
        // simultaneously ready tasks, order equals binding order.
        let executed = executed.lock().unwrap().clone();
        assert_eq!(executed, vec!["t0", "t1", "t2", "t3"]);

        Ok(())
    })
    .await
}

#[tokio::test]
async fn rerunning_a_finished_manager_is_rejected() -> TestResult {
    with_timeout(async {
        init_tracing();

        let root = diamond();
        let mut manager = WorkflowManager::new(root, BTreeMap::new())?;
        let mut pool = InstantPool::new();

        manager.run(&mut pool).await?.ok()?;
        let second = manager.run(&mut pool).await;
        assert!(matches!(second, Err(dagrun::errors::DagrunError::AlreadyRun)));

        Ok(())
    })
    .await
}
