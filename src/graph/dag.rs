//! Acyclic execution graph keyed by resource id.

use petgraph::algo::{has_path_connecting, tarjan_scc, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use std::collections::HashMap;

use crate::error::GraphError;

use super::node::{GraphNode, ResourceNode, ROOT_NODE_ID};

/// Directed graph of resource vertices anchored at a root vertex.
///
/// An edge `a -> b` means `a` must finish before `b` starts. Vertices are
/// deduplicated by resource key.
#[derive(Debug, Clone)]
pub struct ExecutionGraph {
    graph: DiGraph<GraphNode, ()>,
    root: NodeIndex,
    by_key: HashMap<String, NodeIndex>,
}

impl Default for ExecutionGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionGraph {
    /// Creates a graph holding only the root vertex.
    #[must_use]
    pub fn new() -> Self {
        let mut graph = DiGraph::new();
        let root = graph.add_node(GraphNode::Root);
        Self {
            graph,
            root,
            by_key: HashMap::new(),
        }
    }

    /// Returns the root vertex.
    #[must_use]
    pub const fn root(&self) -> NodeIndex {
        self.root
    }

    /// Returns the number of vertices, root included.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Returns the number of edges.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Returns true if a vertex exists for `key`.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.by_key.contains_key(key)
    }

    /// Returns the vertex index of `key`. `"root"` names the root vertex.
    #[must_use]
    pub fn index_of(&self, key: &str) -> Option<NodeIndex> {
        if key == ROOT_NODE_ID {
            return Some(self.root);
        }
        self.by_key.get(key).copied()
    }

    /// Gets the resource node of `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&ResourceNode> {
        self.by_key
            .get(key)
            .and_then(|&idx| self.graph[idx].as_resource())
    }

    /// Gets the vertex at `idx`.
    #[must_use]
    pub fn node(&self, idx: NodeIndex) -> &GraphNode {
        &self.graph[idx]
    }

    /// Iterates the resource nodes.
    pub fn resource_nodes(&self) -> impl Iterator<Item = &ResourceNode> {
        self.graph.node_weights().filter_map(GraphNode::as_resource)
    }

    /// Returns the vertex indices.
    #[must_use]
    pub fn indices(&self) -> Vec<NodeIndex> {
        self.graph.node_indices().collect()
    }

    /// Returns the vertices that must finish before `idx` starts.
    #[must_use]
    pub fn predecessors(&self, idx: NodeIndex) -> Vec<NodeIndex> {
        self.graph
            .neighbors_directed(idx, Direction::Incoming)
            .collect()
    }

    /// Returns the vertices waiting on `idx`.
    #[must_use]
    pub fn successors(&self, idx: NodeIndex) -> Vec<NodeIndex> {
        self.graph
            .neighbors_directed(idx, Direction::Outgoing)
            .collect()
    }

    /// Inserts `node` unless its key already exists.
    ///
    /// Returns the vertex index and whether it was newly inserted. A later
    /// insertion of the same key reuses the earlier vertex.
    pub fn add_resource(&mut self, node: ResourceNode) -> (NodeIndex, bool) {
        if let Some(&idx) = self.by_key.get(&node.id) {
            return (idx, false);
        }
        let key = node.id.clone();
        let idx = self.graph.add_node(GraphNode::Resource(node));
        self.by_key.insert(key, idx);
        (idx, true)
    }

    /// Adds the edge `from -> to` unless it exists.
    pub fn connect(&mut self, from: NodeIndex, to: NodeIndex) {
        self.graph.update_edge(from, to, ());
    }

    /// Returns true if the edge `from -> to` exists between two keys.
    #[must_use]
    pub fn has_edge(&self, from: &str, to: &str) -> bool {
        match (self.index_of(from), self.index_of(to)) {
            (Some(a), Some(b)) => self.graph.contains_edge(a, b),
            _ => false,
        }
    }

    /// Returns true if a path leads from `from` to `to`.
    #[must_use]
    pub fn has_path(&self, from: &str, to: &str) -> bool {
        match (self.index_of(from), self.index_of(to)) {
            (Some(a), Some(b)) => has_path_connecting(&self.graph, a, b, None),
            _ => false,
        }
    }

    /// Returns every edge as `(from, to)` keys, sorted.
    #[must_use]
    pub fn edges(&self) -> Vec<(String, String)> {
        let mut edges: Vec<(String, String)> = self
            .graph
            .edge_references()
            .map(|e| {
                (
                    self.graph[e.source()].id().to_string(),
                    self.graph[e.target()].id().to_string(),
                )
            })
            .collect();
        edges.sort();
        edges
    }

    /// Checks that the graph has no cycle.
    ///
    /// # Errors
    ///
    /// Returns an error naming the members of every cycle.
    pub fn validate(&self) -> Result<(), GraphError> {
        if toposort(&self.graph, None).is_ok() {
            return Ok(());
        }

        let cycles: Vec<String> = tarjan_scc(&self.graph)
            .into_iter()
            .filter(|component| {
                component.len() > 1
                    || component
                        .first()
                        .is_some_and(|&n| self.graph.contains_edge(n, n))
            })
            .map(|component| {
                let mut members: Vec<&str> =
                    component.iter().map(|&n| self.graph[n].id()).collect();
                members.sort_unstable();
                format!("[{}]", members.join(", "))
            })
            .collect();

        Err(GraphError::CircularDependency {
            cycle: cycles.join("; "),
        })
    }

    /// Removes every edge implied by a longer path.
    ///
    /// Reachability is unchanged, so execution order is unchanged. Must only
    /// be called on an acyclic graph.
    pub fn transitive_reduction(&mut self) {
        let edges: Vec<(NodeIndex, NodeIndex)> = self
            .graph
            .edge_references()
            .map(|e| (e.source(), e.target()))
            .collect();

        for (from, to) in edges {
            let Some(edge) = self.graph.find_edge(from, to) else {
                continue;
            };
            self.graph.remove_edge(edge);
            if !has_path_connecting(&self.graph, from, to, None) {
                self.graph.add_edge(from, to, ());
            }
        }
    }

    /// Returns the resource keys in a dependency-respecting order.
    #[must_use]
    pub fn topological_keys(&self) -> Vec<String> {
        toposort(&self.graph, None)
            .map(|order| {
                order
                    .into_iter()
                    .filter_map(|n| self.graph[n].as_resource().map(|r| r.id.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }
}
