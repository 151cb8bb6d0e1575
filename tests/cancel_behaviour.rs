// tests/cancel_behaviour.rs

//! Cooperative cancellation: no task starts after the request, running
//! tasks are interrupted exactly once, and a second request is a no-op.

use std::collections::BTreeMap;
use std::error::Error;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde_json::json;

use dagrun::engine::{FailureReason, WorkflowManager, WorkflowOutcome};
use dagrun::task::{TaskRef, TaskState};
use dagrun_test_utils::builders::{single_output, TaskNodeBuilder};
use dagrun_test_utils::pools::ControllablePool;
use dagrun_test_utils::{init_tracing, with_timeout};

type TestResult = Result<(), Box<dyn Error>>;

/// a → b → c, with an interrupt counter on b.
fn chain(interrupts_on_b: Arc<AtomicUsize>) -> TaskRef {
    let a = TaskNodeBuilder::new("a", single_output("a", |_| json!(1)))
        .output("out")
        .build();
    let b_body = single_output("b", |_| json!(2)).on_interrupt(move || {
        interrupts_on_b.fetch_add(1, Ordering::SeqCst);
    });
    let b = TaskNodeBuilder::new("b", b_body)
        .output("out")
        .input_from("x", a.output("out"))
        .build();
    TaskNodeBuilder::new("c", single_output("c", |_| json!(3)))
        .output("out")
        .input_from("x", b.output("out"))
        .build()
}

#[tokio::test]
async fn cancel_while_mid_chain_stops_the_workflow() -> TestResult {
    with_timeout(async {
        init_tracing();

        let interrupts = Arc::new(AtomicUsize::new(0));
        let root = chain(Arc::clone(&interrupts));

        let mut manager = WorkflowManager::new(root, BTreeMap::new())?;
        let cancel = manager.cancel_handle();
        let (mut pool, control) = ControllablePool::new();

        let run = tokio::spawn(async move {
            let outcome = manager.run(&mut pool).await;
            (outcome, manager)
        });

        control.wait_for_start("a").await;
        control.finish("a");
        control.wait_for_start("b").await;

        // Cancel while b is running; then cancel again immediately.
        cancel.cancel();
        cancel.cancel();

        // The worker honors the interrupt and exits.
        for _ in 0..500 {
            if control.was_interrupted("b") {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        assert!(control.was_interrupted("b"));
        control.abort_interrupted();

        let (outcome, manager) = run.await?;
        let WorkflowOutcome::Failed(report) = outcome? else {
            panic!("expected the workflow to fail");
        };
        assert_eq!(report.reason, FailureReason::Cancelled);

        // c never reached the pool; b was interrupted exactly once.
        assert_eq!(control.started(), vec!["a", "b"]);
        assert_eq!(interrupts.load(Ordering::SeqCst), 1);
        assert_eq!(manager.state_of("c"), Some(TaskState::Waiting));
        assert_eq!(manager.state_of("b"), Some(TaskState::Failed));

        Ok(())
    })
    .await
}

#[tokio::test]
async fn cancel_before_run_stops_immediately() -> TestResult {
    with_timeout(async {
        init_tracing();

        let interrupts = Arc::new(AtomicUsize::new(0));
        let root = chain(Arc::clone(&interrupts));

        let mut manager = WorkflowManager::new(root, BTreeMap::new())?;
        manager.cancel();

        let (mut pool, control) = ControllablePool::new();
        let outcome = manager.run(&mut pool).await?;
        let WorkflowOutcome::Failed(report) = outcome else {
            panic!("expected the workflow to fail");
        };
        assert_eq!(report.reason, FailureReason::Cancelled);
        assert!(report.failed.is_empty());
        assert!(control.started().is_empty());
        assert_eq!(interrupts.load(Ordering::SeqCst), 0);

        Ok(())
    })
    .await
}
