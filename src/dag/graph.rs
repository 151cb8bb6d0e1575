// src/dag/graph.rs

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::engine::TaskName;
use crate::errors::{DagrunError, Result};
use crate::task::TaskRef;

/// Internal node structure: stores immediate deps and dependents.
#[derive(Debug, Clone, Default)]
struct DagNode {
    /// Direct dependencies: tasks that must complete before this one.
    deps: Vec<TaskName>,
    /// Direct dependents: tasks that depend on this one.
    dependents: Vec<TaskName>,
}

/// In-memory DAG over the ancestors of a root task, keyed by task name.
///
/// Built by walking `parents` edges from the root; the walk's discovery
/// order is recorded and later fixes the scheduler's admission order, so
/// replays on the same graph admit ready tasks identically.
#[derive(Debug)]
pub struct DagGraph {
    tasks: HashMap<TaskName, TaskRef>,
    nodes: HashMap<TaskName, DagNode>,
    order: Vec<TaskName>,
}

impl DagGraph {
    /// Discover every ancestor of `root` (the root included) and build
    /// adjacency for them.
    ///
    /// Visiting a node means its parent names are in hand, so both edge
    /// directions are recorded during the walk itself: the reverse
    /// (dependent) edges land on the parents immediately, and a parent
    /// visited later fills in its own deps.
    ///
    /// Fails with [`DagrunError::DuplicateTask`] if two distinct nodes
    /// share a name. Cycles are tolerated here and reported by
    /// [`DagGraph::detect_cycle`].
    pub fn from_root(root: &TaskRef) -> Result<Self> {
        let mut tasks: HashMap<TaskName, TaskRef> = HashMap::new();
        let mut nodes: HashMap<TaskName, DagNode> = HashMap::new();
        let mut order: Vec<TaskName> = Vec::new();

        let mut queue: VecDeque<TaskRef> = VecDeque::new();
        queue.push_back(Arc::clone(root));

        while let Some(task) = queue.pop_front() {
            match tasks.get(task.name()) {
                Some(known) if Arc::ptr_eq(known, &task) => continue,
                Some(_) => return Err(DagrunError::DuplicateTask(task.name().to_string())),
                None => {}
            }

            let parents = task.parents();
            let deps: Vec<TaskName> = parents.iter().map(|p| p.name().to_string()).collect();
            for dep in &deps {
                nodes
                    .entry(dep.clone())
                    .or_default()
                    .dependents
                    .push(task.name().to_string());
            }
            nodes.entry(task.name().to_string()).or_default().deps = deps;

            order.push(task.name().to_string());
            tasks.insert(task.name().to_string(), Arc::clone(&task));

            for parent in parents {
                queue.push_back(parent);
            }
        }

        Ok(Self {
            tasks,
            nodes,
            order,
        })
    }

    /// Number of tasks in the workflow.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tasks.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&TaskRef> {
        self.tasks.get(name)
    }

    /// Task names in discovery order (root first).
    pub fn discovery_order(&self) -> &[TaskName] {
        &self.order
    }

    /// Task handles in discovery order.
    pub fn tasks(&self) -> impl Iterator<Item = &TaskRef> {
        self.order.iter().filter_map(|name| self.tasks.get(name))
    }

    /// Immediate dependencies of a task.
    pub fn dependencies_of(&self, name: &str) -> &[TaskName] {
        self.nodes
            .get(name)
            .map(|n| n.deps.as_slice())
            .unwrap_or(&[])
    }

    /// Immediate dependents of a task.
    pub fn dependents_of(&self, name: &str) -> &[TaskName] {
        self.nodes
            .get(name)
            .map(|n| n.dependents.as_slice())
            .unwrap_or(&[])
    }

    /// A topological ordering of the workflow: dependencies precede
    /// dependents. The scheduler does not need this; it exists for
    /// deterministic replay and debugging.
    pub fn topo_order(&self) -> Result<Vec<TaskName>> {
        let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

        for name in self.nodes.keys() {
            graph.add_node(name.as_str());
        }
        for (name, node) in self.nodes.iter() {
            for dep in node.deps.iter() {
                graph.add_edge(dep.as_str(), name.as_str(), ());
            }
        }

        match toposort(&graph, None) {
            Ok(sorted) => Ok(sorted.into_iter().map(|n| n.to_string()).collect()),
            Err(cycle) => Err(DagrunError::CyclicGraph(format!(
                "cycle involving task `{}`",
                cycle.node_id()
            ))),
        }
    }

    /// Search for a dependency cycle, returning the witness path if one
    /// exists.
    pub fn detect_cycle(&self) -> Option<Vec<TaskName>> {
        let mut visited: HashSet<TaskName> = HashSet::new();
        let mut stack: Vec<TaskName> = Vec::new();

        for name in &self.order {
            if let Some(cycle) = self.cycle_from(name, &mut stack, &mut visited) {
                return Some(cycle);
            }
        }
        None
    }

    fn cycle_from(
        &self,
        name: &str,
        stack: &mut Vec<TaskName>,
        visited: &mut HashSet<TaskName>,
    ) -> Option<Vec<TaskName>> {
        if let Some(pos) = stack.iter().position(|n| n == name) {
            let mut cycle = stack[pos..].to_vec();
            cycle.push(name.to_string());
            return Some(cycle);
        }
        if visited.contains(name) {
            return None;
        }

        stack.push(name.to_string());
        for dep in self.dependencies_of(name).to_vec() {
            if let Some(cycle) = self.cycle_from(&dep, stack, visited) {
                return Some(cycle);
            }
        }
        stack.pop();
        visited.insert(name.to_string());
        None
    }
}
