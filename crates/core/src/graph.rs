// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workflow graph: node/edge container, topological ordering, and cycle
//! detection.
//!
//! Ordering uses Kahn's in-degree sweep; when the sweep cannot discharge
//! every node a DFS recovers a witness cycle for the error. Back-edges
//! (loop regions) are excluded from ordering and cycle checks. The same
//! pass runs on every dynamic append (DIRECTOR output, SUBFLOW
//! materialization).

use crate::edge::Edge;
use crate::id::NodeId;
use crate::node::Node;
use crate::subtask::Subtask;
use indexmap::IndexMap;
use std::collections::{HashMap, HashSet, VecDeque};
use thiserror::Error;

/// Errors from graph construction and mutation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("cycle detected: {}", witness.join(" -> "))]
    CycleDetected { witness: Vec<String> },

    #[error("edge references unknown node: {0}")]
    UnknownNode(String),

    #[error("duplicate node id: {0}")]
    DuplicateNode(String),
}

/// The node/edge set of one workflow, kept in insertion order so
/// topological ties resolve deterministically.
#[derive(Debug, Clone, Default)]
pub struct WorkflowGraph {
    nodes: IndexMap<NodeId, Node>,
    edges: Vec<Edge>,
}

impl WorkflowGraph {
    /// Build a graph, rejecting duplicate ids, dangling endpoints, and
    /// cycles outside marked loop regions.
    pub fn new(nodes: Vec<Node>, edges: Vec<Edge>) -> Result<Self, GraphError> {
        let mut graph = Self::default();
        graph.append(nodes, edges)?;
        Ok(graph)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: &NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn node_mut(&mut self, id: &NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn node_ids(&self) -> impl Iterator<Item = &NodeId> {
        self.nodes.keys()
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Forward edges leaving `id` (back-edges excluded).
    pub fn edges_from<'a>(&'a self, id: &'a NodeId) -> impl Iterator<Item = &'a Edge> {
        self.edges.iter().filter(move |e| !e.back_edge && e.from == *id)
    }

    /// Back-edges leaving `id` (the loop return path).
    pub fn back_edges_from<'a>(&'a self, id: &'a NodeId) -> impl Iterator<Item = &'a Edge> {
        self.edges.iter().filter(move |e| e.back_edge && e.from == *id)
    }

    /// Forward successors of `id`.
    pub fn successors(&self, id: &NodeId) -> Vec<NodeId> {
        self.edges_from(id).map(|e| e.to.clone()).collect()
    }

    /// Forward predecessors of `id`.
    pub fn predecessors(&self, id: &NodeId) -> Vec<NodeId> {
        self.edges
            .iter()
            .filter(|e| !e.back_edge && e.to == *id)
            .map(|e| e.from.clone())
            .collect()
    }

    /// Append nodes and edges, re-running the full validation pass.
    /// On error the graph is left unchanged.
    pub fn append(&mut self, nodes: Vec<Node>, edges: Vec<Edge>) -> Result<(), GraphError> {
        let mut next_nodes = self.nodes.clone();
        for node in nodes {
            if next_nodes.contains_key(&node.id) {
                return Err(GraphError::DuplicateNode(node.id.to_string()));
            }
            next_nodes.insert(node.id.clone(), node);
        }
        let mut next_edges = self.edges.clone();
        next_edges.extend(edges);

        for edge in &next_edges {
            for endpoint in [&edge.from, &edge.to] {
                if !next_nodes.contains_key(endpoint) {
                    return Err(GraphError::UnknownNode(endpoint.to_string()));
                }
            }
        }

        if let Some(witness) = find_cycle(&next_nodes, &next_edges) {
            return Err(GraphError::CycleDetected {
                witness: witness.iter().map(|n| n.to_string()).collect(),
            });
        }

        self.nodes = next_nodes;
        self.edges = next_edges;
        Ok(())
    }

    /// Topological order over forward edges (Kahn's algorithm).
    pub fn topo_order(&self) -> Result<Vec<NodeId>, GraphError> {
        let mut in_degree: HashMap<&NodeId, usize> =
            self.nodes.keys().map(|id| (id, 0)).collect();
        for edge in self.edges.iter().filter(|e| !e.back_edge) {
            if let Some(d) = in_degree.get_mut(&edge.to) {
                *d += 1;
            }
        }

        let mut queue: VecDeque<&NodeId> = self
            .nodes
            .keys()
            .filter(|id| in_degree.get(id).copied() == Some(0))
            .collect();
        let mut order = Vec::with_capacity(self.nodes.len());

        while let Some(id) = queue.pop_front() {
            order.push(id.clone());
            for edge in self.edges.iter().filter(|e| !e.back_edge && e.from == *id) {
                if let Some(d) = in_degree.get_mut(&edge.to) {
                    *d -= 1;
                    if *d == 0 {
                        queue.push_back(&edge.to);
                    }
                }
            }
        }

        if order.len() != self.nodes.len() {
            // Not all nodes discharged; recover a witness for the error.
            let witness = find_cycle(&self.nodes, &self.edges).unwrap_or_default();
            return Err(GraphError::CycleDetected {
                witness: witness.iter().map(|n| n.to_string()).collect(),
            });
        }
        Ok(order)
    }
}

/// DFS cycle search over forward edges; returns the witness path.
fn find_cycle(nodes: &IndexMap<NodeId, Node>, edges: &[Edge]) -> Option<Vec<NodeId>> {
    let mut succ: HashMap<&NodeId, Vec<&NodeId>> = HashMap::new();
    for edge in edges.iter().filter(|e| !e.back_edge) {
        succ.entry(&edge.from).or_default().push(&edge.to);
    }

    let mut done: HashSet<&NodeId> = HashSet::new();
    let mut on_path: Vec<&NodeId> = Vec::new();
    let mut on_path_set: HashSet<&NodeId> = HashSet::new();

    fn visit<'a>(
        id: &'a NodeId,
        succ: &HashMap<&'a NodeId, Vec<&'a NodeId>>,
        done: &mut HashSet<&'a NodeId>,
        on_path: &mut Vec<&'a NodeId>,
        on_path_set: &mut HashSet<&'a NodeId>,
    ) -> Option<Vec<NodeId>> {
        if done.contains(id) {
            return None;
        }
        if on_path_set.contains(id) {
            // Close the loop: witness runs from the repeated node around.
            let start = on_path.iter().position(|n| *n == id).unwrap_or(0);
            let mut witness: Vec<NodeId> =
                on_path[start..].iter().map(|n| (*n).clone()).collect();
            witness.push(id.clone());
            return Some(witness);
        }
        on_path.push(id);
        on_path_set.insert(id);
        if let Some(nexts) = succ.get(id) {
            for next in nexts {
                if let Some(w) = visit(next, succ, done, on_path, on_path_set) {
                    return Some(w);
                }
            }
        }
        on_path.pop();
        on_path_set.remove(id);
        done.insert(id);
        None
    }

    for id in nodes.keys() {
        if let Some(w) = visit(id, &succ, &mut done, &mut on_path, &mut on_path_set) {
            return Some(w);
        }
    }
    None
}

/// Validate that the dependency graph over one workflow's subtasks is
/// acyclic and self-contained (Kahn sweep, DFS witness on failure).
pub fn validate_subtask_dependencies(subtasks: &[Subtask]) -> Result<(), GraphError> {
    let ids: HashSet<&crate::id::SubtaskId> = subtasks.iter().map(|s| &s.id).collect();
    for subtask in subtasks {
        for dep in &subtask.dependencies {
            if !ids.contains(dep) {
                return Err(GraphError::UnknownNode(dep.to_string()));
            }
        }
    }

    let mut in_degree: HashMap<&crate::id::SubtaskId, usize> =
        subtasks.iter().map(|s| (&s.id, s.dependencies.len())).collect();
    let mut dependents: HashMap<&crate::id::SubtaskId, Vec<&crate::id::SubtaskId>> =
        HashMap::new();
    for subtask in subtasks {
        for dep in &subtask.dependencies {
            dependents.entry(dep).or_default().push(&subtask.id);
        }
    }

    let mut queue: VecDeque<&crate::id::SubtaskId> = in_degree
        .iter()
        .filter(|(_, d)| **d == 0)
        .map(|(id, _)| *id)
        .collect();
    let mut discharged = 0usize;
    while let Some(id) = queue.pop_front() {
        discharged += 1;
        if let Some(deps) = dependents.get(id) {
            for dependent in deps {
                if let Some(d) = in_degree.get_mut(dependent) {
                    *d -= 1;
                    if *d == 0 {
                        queue.push_back(dependent);
                    }
                }
            }
        }
    }

    if discharged != subtasks.len() {
        let witness: Vec<String> = subtasks
            .iter()
            .filter(|s| in_degree.get(&s.id).copied().unwrap_or(0) > 0)
            .map(|s| s.id.to_string())
            .collect();
        return Err(GraphError::CycleDetected { witness });
    }
    Ok(())
}

#[cfg(test)]
#[path = "graph_tests.rs"]
mod tests;
