// tests/deadlock.rs

//! A workflow whose inputs never become available must terminate with a
//! deadlock report instead of spinning forever.

use std::collections::BTreeMap;
use std::error::Error;

use serde_json::json;

use dagrun::datum::{shared, Datum};
use dagrun::engine::{FailureReason, WorkflowManager, WorkflowOutcome};
use dagrun::errors::DagrunError;
use dagrun_test_utils::builders::{single_output, TaskNodeBuilder};
use dagrun_test_utils::pools::InstantPool;
use dagrun_test_utils::{init_tracing, with_timeout};

type TestResult = Result<(), Box<dyn Error>>;

#[tokio::test]
async fn empty_external_input_deadlocks_the_run() -> TestResult {
    with_timeout(async {
        init_tracing();

        // The datum is never populated, so the task can never be ready.
        let missing = shared(Datum::memory());
        let stuck_task = TaskNodeBuilder::new("stuck", single_output("stuck", |_| json!(0)))
            .output("out")
            .input_datum("x", missing)
            .build();

        let mut manager = WorkflowManager::new(stuck_task, BTreeMap::new())?;
        let mut pool = InstantPool::new();
        let executed = pool.executed_handle();

        let outcome = manager.run(&mut pool).await?;
        let WorkflowOutcome::Failed(report) = outcome else {
            panic!("expected the workflow to fail");
        };
        assert_eq!(report.reason, FailureReason::Deadlock);
        assert!(report.failed.is_empty());
        assert_eq!(report.stuck, vec!["stuck"]);
        assert!(executed.lock().unwrap().is_empty());

        // The report collapses into the deadlock error kind.
        assert!(matches!(
            report.into_error(),
            DagrunError::Deadlock(stuck) if stuck == vec!["stuck"]
        ));

        Ok(())
    })
    .await
}

#[tokio::test]
async fn downstream_of_a_stuck_task_is_reported_too() -> TestResult {
    with_timeout(async {
        init_tracing();

        let missing = shared(Datum::memory());
        let blocked = TaskNodeBuilder::new("blocked", single_output("blocked", |_| json!(0)))
            .output("out")
            .input_datum("x", missing)
            .build();
        let child = TaskNodeBuilder::new("child", single_output("child", |_| json!(0)))
            .output("out")
            .input_from("x", blocked.output("out"))
            .build();

        let mut manager = WorkflowManager::new(child, BTreeMap::new())?;
        let mut pool = InstantPool::new();

        let outcome = manager.run(&mut pool).await?;
        let WorkflowOutcome::Failed(report) = outcome else {
            panic!("expected the workflow to fail");
        };
        assert_eq!(report.reason, FailureReason::Deadlock);
        assert_eq!(report.stuck, vec!["child", "blocked"]);

        Ok(())
    })
    .await
}
