// ABOUTME: Adjacency and in-degree maps plus Kahn topological ordering
// ABOUTME: Cycle detection reports the residual node set as the offending cycle

use std::collections::{HashMap, VecDeque};

use crate::plan::{PlanError, PlanSpec, Result};

/// Dependency indexes over a plan: who waits on whom, and how many
/// dependencies each task has.
#[derive(Debug, Clone)]
pub struct DagIndex {
    /// task id -> ids of tasks that depend on it, in plan order.
    pub dependents: HashMap<String, Vec<String>>,
    /// task id -> number of direct dependencies.
    pub in_degree: HashMap<String, usize>,
}

impl DagIndex {
    pub fn dependents_of(&self, task_id: &str) -> &[String] {
        self.dependents
            .get(task_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// Compute the dependents adjacency and in-degree for every task.
pub fn build_adjacency(plan: &PlanSpec) -> DagIndex {
    let mut dependents: HashMap<String, Vec<String>> = HashMap::new();
    let mut in_degree: HashMap<String, usize> = HashMap::new();

    for task in &plan.tasks {
        in_degree.insert(task.id.clone(), task.depends_on.len());
        dependents.entry(task.id.clone()).or_default();
        for dep in &task.depends_on {
            dependents
                .entry(dep.clone())
                .or_default()
                .push(task.id.clone());
        }
    }

    DagIndex {
        dependents,
        in_degree,
    }
}

/// Kahn's algorithm: repeatedly remove zero-in-degree nodes. Returns the
/// topological order in plan order among ties, or the residual (cyclic) set
/// as a `PlanError`.
pub fn topological_order(task_ids: &[String], dag: &DagIndex) -> Result<Vec<String>> {
    let mut degrees: HashMap<&str, usize> = task_ids
        .iter()
        .map(|id| (id.as_str(), dag.in_degree.get(id).copied().unwrap_or(0)))
        .collect();

    let mut queue: VecDeque<&str> = task_ids
        .iter()
        .filter(|id| degrees.get(id.as_str()) == Some(&0))
        .map(String::as_str)
        .collect();

    let mut order = Vec::with_capacity(task_ids.len());
    while let Some(current) = queue.pop_front() {
        order.push(current.to_string());
        for next in dag.dependents_of(current) {
            if let Some(degree) = degrees.get_mut(next.as_str()) {
                *degree -= 1;
                if *degree == 0 {
                    queue.push_back(next.as_str());
                }
            }
        }
    }

    if order.len() != task_ids.len() {
        let remaining: Vec<String> = task_ids
            .iter()
            .filter(|id| !order.contains(id))
            .cloned()
            .collect();
        return Err(PlanError::CyclicDependencies { remaining });
    }
    Ok(order)
}
