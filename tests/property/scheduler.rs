// tests/property/scheduler.rs

//! Randomized DAG simulation: for arbitrary acyclic graphs and failure
//! sets the scheduler must terminate, respect dependency order, contain
//! failures, and admit deterministically.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::time::Duration;

use proptest::prelude::*;
use serde_json::json;

use dagrun::engine::{WorkflowManager, WorkflowOutcome};
use dagrun::task::{TaskRef, TaskState};
use dagrun_test_utils::builders::{failing, single_output, TaskNodeBuilder};
use dagrun_test_utils::pools::InstantPool;

#[derive(Debug, Clone)]
struct GraphSpec {
    /// deps[i] ⊆ {0..i-1}, which keeps every generated graph acyclic.
    deps: Vec<Vec<usize>>,
    fails: Vec<bool>,
}

fn graph_spec(max_tasks: usize) -> impl Strategy<Value = GraphSpec> {
    (1..=max_tasks).prop_flat_map(|num_tasks| {
        let deps = proptest::collection::vec(
            proptest::collection::vec(any::<usize>(), 0..num_tasks),
            num_tasks,
        );
        let fails = proptest::collection::vec(prop::bool::weighted(0.2), num_tasks);

        (deps, fails).prop_map(|(raw_deps, fails)| {
            let deps = raw_deps
                .into_iter()
                .enumerate()
                .map(|(i, candidates)| {
                    // Sanitize: only allow deps on earlier tasks.
                    candidates
                        .into_iter()
                        .filter(|_| i > 0)
                        .map(|d| d % i)
                        .collect::<BTreeSet<usize>>()
                        .into_iter()
                        .collect()
                })
                .collect();
            GraphSpec { deps, fails }
        })
    })
}

fn task_name(i: usize) -> String {
    format!("task_{i}")
}

/// Build the graph: every generated task plus a sink depending on all of
/// them, so one root covers the whole workflow.
fn build(spec: &GraphSpec) -> TaskRef {
    let mut tasks: Vec<TaskRef> = Vec::with_capacity(spec.deps.len());
    for (i, deps) in spec.deps.iter().enumerate() {
        let name = task_name(i);
        let body = if spec.fails[i] {
            failing(&name, "injected failure")
        } else {
            single_output(&name, |_| json!(1))
        };
        let mut builder = TaskNodeBuilder::new(&name, body).output("out");
        for dep in deps {
            builder = builder.after(&tasks[*dep]);
        }
        tasks.push(builder.build());
    }

    let mut sink = TaskNodeBuilder::new("sink", single_output("sink", |_| json!(0))).output("out");
    for task in &tasks {
        sink = sink.after(task);
    }
    sink.build()
}

fn run_spec(spec: &GraphSpec) -> (WorkflowOutcome, Vec<String>, BTreeMap<String, TaskState>) {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .expect("tokio runtime");

    rt.block_on(async {
        let root = build(spec);
        let mut manager = WorkflowManager::new(root, BTreeMap::new()).expect("valid workflow");
        let mut pool = InstantPool::new();
        let executed = pool.executed_handle();

        let outcome = tokio::time::timeout(Duration::from_secs(10), manager.run(&mut pool))
            .await
            .expect("scheduler did not terminate")
            .expect("run must not error");

        let executed = executed.lock().unwrap().clone();
        (outcome, executed, manager.status())
    })
}

/// Every task reachable downstream of a failing task.
fn downstream_of_failures(spec: &GraphSpec) -> BTreeSet<String> {
    let mut children: HashMap<usize, Vec<usize>> = HashMap::new();
    for (i, deps) in spec.deps.iter().enumerate() {
        for dep in deps {
            children.entry(*dep).or_default().push(i);
        }
    }

    let mut queue: VecDeque<usize> = (0..spec.fails.len()).filter(|i| spec.fails[*i]).collect();
    let mut reached: BTreeSet<usize> = BTreeSet::new();
    while let Some(i) = queue.pop_front() {
        for child in children.get(&i).into_iter().flatten() {
            if reached.insert(*child) {
                queue.push_back(*child);
            }
        }
    }

    let mut names: BTreeSet<String> = reached.iter().map(|i| task_name(*i)).collect();
    if spec.fails.iter().any(|f| *f) {
        // The sink depends on everything.
        names.insert("sink".to_string());
    }
    names
}

proptest! {
    #[test]
    fn random_dags_terminate_and_respect_dependencies(spec in graph_spec(8)) {
        let (outcome, executed, status) = run_spec(&spec);
        let any_failure = spec.fails.iter().any(|f| *f);

        // Dependency respect: a task only executes after all its deps.
        let position: HashMap<&str, usize> = executed
            .iter()
            .enumerate()
            .map(|(pos, name)| (name.as_str(), pos))
            .collect();
        for (i, deps) in spec.deps.iter().enumerate() {
            let name = task_name(i);
            if let Some(my_pos) = position.get(name.as_str()) {
                for dep in deps {
                    let dep_name = task_name(*dep);
                    let dep_pos = position.get(dep_name.as_str());
                    prop_assert!(
                        dep_pos.is_some_and(|p| p < my_pos),
                        "{dep_name} must execute before {name}"
                    );
                }
            }
        }

        if any_failure {
            prop_assert!(!outcome.is_complete());
            // Failure containment: nothing downstream of a failure runs.
            let blocked = downstream_of_failures(&spec);
            for name in &executed {
                prop_assert!(!blocked.contains(name), "{name} ran downstream of a failure");
            }
        } else {
            prop_assert!(outcome.is_complete());
            prop_assert_eq!(executed.len(), spec.deps.len() + 1);
            for (task, state) in status {
                prop_assert_eq!(state, TaskState::Complete, "task {} not complete", task);
            }
        }
    }

    #[test]
    fn admission_is_deterministic_for_a_fixed_graph(spec in graph_spec(8)) {
        let (_, first, _) = run_spec(&spec);
        let (_, second, _) = run_spec(&spec);
        prop_assert_eq!(first, second);
    }
}
