use std::collections::{HashMap, HashSet};

use petgraph::graph::DiGraph;

use crate::engine::{Registry, Task};
use crate::error::PlanError;

/// The resolved execution order for one or more targets.
///
/// Only the tasks reachable from the targets take part. Edges point from a
/// dependency to the task that declared it.
#[derive(Debug, Clone)]
pub struct Plan {
    pub(crate) targets: Vec<String>,
    pub(crate) graph: DiGraph<usize, ()>,
    pub(crate) order: Vec<usize>,
}

impl Plan {
    /// Resolves `targets` against `registry`.
    ///
    /// Fails before anything runs when a name is unknown or the reachable
    /// graph has a cycle. The order is the depth-first post-order of the
    /// dependencies, visited in declaration order, with every task listed
    /// once. Several targets share the visited set, so a task needed by two
    /// of them still runs only once.
    pub fn new<S: AsRef<str>>(registry: &Registry, targets: &[S]) -> Result<Self, PlanError> {
        let mut graph = DiGraph::new();
        let mut nodes = HashMap::new();

        let mut roots = Vec::with_capacity(targets.len());
        for target in targets {
            let name = target.as_ref();
            let index = registry.position(name).ok_or_else(|| PlanError::Unknown {
                name: name.to_string(),
                required_by: "the command line".into(),
            })?;
            roots.push(index);
        }

        // Discover the reachable part of the registry.
        let mut stack = roots.clone();
        while let Some(index) = stack.pop() {
            if nodes.contains_key(&index) {
                continue;
            }
            let node = graph.add_node(index);
            nodes.insert(index, node);

            let task = registry.at(index);
            for dep in &task.deps {
                let dep_index = registry.position(dep).ok_or_else(|| PlanError::Unknown {
                    name: dep.clone(),
                    required_by: format!("'{}'", task.name),
                })?;
                stack.push(dep_index);
            }
        }

        let mut indices: Vec<_> = nodes.keys().copied().collect();
        indices.sort_unstable();

        for index in indices {
            let node = nodes[&index];
            for dep in &registry.at(index).deps {
                if let Some(dep_index) = registry.position(dep) {
                    graph.add_edge(nodes[&dep_index], node, ());
                }
            }
        }

        // Primarily run to detect cycles.
        petgraph::algo::toposort(&graph, None)
            .map_err(|cycle| PlanError::Cycle(registry.at(graph[cycle.node_id()]).name.clone()))?;

        let mut order = Vec::with_capacity(nodes.len());
        let mut visited = HashSet::new();
        for root in roots {
            post_order(registry, root, &mut visited, &mut order);
        }

        Ok(Self {
            targets: targets.iter().map(|t| t.as_ref().to_string()).collect(),
            graph,
            order,
        })
    }

    pub fn targets(&self) -> &[String] {
        &self.targets
    }

    /// Tasks in execution order, composites included.
    pub fn tasks<'r>(&self, registry: &'r Registry) -> impl Iterator<Item = &'r Task> {
        self.order.iter().map(|&i| registry.at(i))
    }

    /// Names of the tasks that actually do work, in execution order.
    pub fn primitives<'r>(&self, registry: &'r Registry) -> Vec<&'r str> {
        self.tasks(registry)
            .filter(|task| !task.is_composite())
            .map(Task::name)
            .collect()
    }

    pub(crate) fn edges(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.graph.edge_indices().filter_map(|edge| {
            let (a, b) = self.graph.edge_endpoints(edge)?;
            Some((self.graph[a], self.graph[b]))
        })
    }
}

fn post_order(
    registry: &Registry,
    index: usize,
    visited: &mut HashSet<usize>,
    order: &mut Vec<usize>,
) {
    if !visited.insert(index) {
        return;
    }

    for dep in &registry.at(index).deps {
        if let Some(dep_index) = registry.position(dep) {
            post_order(registry, dep_index, visited, order);
        }
    }

    order.push(index);
}
