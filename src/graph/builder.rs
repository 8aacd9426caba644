//! Graph construction from a spec and the prior recorded resources.
//!
//! Two passes share one graph:
//!
//! 1. the spec pass adds one `Update` vertex per desired resource and links
//!    every dependency before its dependent;
//! 2. the delete pass adds one `Delete` vertex per recorded resource that no
//!    longer has a vertex, linking dependents before their dependencies.
//!
//! Both finish with cycle validation and transitive reduction.

use std::collections::{BTreeMap, HashSet};
use tracing::debug;

use crate::error::GraphError;
use crate::model::{index_resources, ActionType, Resource, Spec};
use crate::reference::dependency_keys;

use super::dag::ExecutionGraph;
use super::node::ResourceNode;

/// Builds execution graphs for one operation.
#[derive(Debug, Clone, Copy)]
pub struct GraphBuilder<'a> {
    /// Desired state, absent for destroy.
    spec: Option<&'a Spec>,
    /// Resources recorded by the prior release.
    prior: &'a [Resource],
}

impl<'a> GraphBuilder<'a> {
    /// Creates a builder over the desired `spec` and the `prior` resources.
    #[must_use]
    pub const fn new(spec: Option<&'a Spec>, prior: &'a [Resource]) -> Self {
        Self { spec, prior }
    }

    /// Builds the graph used by apply and apply-preview.
    ///
    /// # Errors
    ///
    /// Returns an error if the spec is empty, a dependency cannot be found,
    /// a surviving resource depends on a deleted one, or the graph has a
    /// cycle.
    pub fn build_apply(&self) -> Result<ExecutionGraph, GraphError> {
        let spec = self
            .spec
            .filter(|s| !s.is_empty())
            .ok_or_else(|| GraphError::NoResources {
                operation: String::from("apply"),
            })?;

        let mut graph = ExecutionGraph::new();
        self.add_spec_resources(&mut graph, spec)?;
        self.add_delete_resources(&mut graph)?;
        Self::finalize(graph)
    }

    /// Builds the graph used by destroy and destroy-preview.
    ///
    /// # Errors
    ///
    /// Returns an error if there is nothing recorded to delete or the graph
    /// has a cycle.
    pub fn build_destroy(&self) -> Result<ExecutionGraph, GraphError> {
        if self.prior.is_empty() {
            return Err(GraphError::NoResources {
                operation: String::from("destroy"),
            });
        }

        let mut graph = ExecutionGraph::new();
        self.add_delete_resources(&mut graph)?;
        Self::finalize(graph)
    }

    /// Adds one vertex per desired resource and its dependency edges.
    fn add_spec_resources(&self, graph: &mut ExecutionGraph, spec: &Spec) -> Result<(), GraphError> {
        let spec_keys: HashSet<&str> = spec.resources.iter().map(Resource::key).collect();
        let prior_keys: HashSet<&str> = self.prior.iter().map(Resource::key).collect();
        let known: HashSet<&str> = spec_keys.union(&prior_keys).copied().collect();

        // Resolve every dependency list before touching the graph.
        let mut planned: Vec<(Resource, Vec<String>)> = Vec::with_capacity(spec.len());
        for resource in &spec.resources {
            let deps = dependency_keys(resource, &known)?;
            for dep in &deps {
                if spec_keys.contains(dep.as_str()) {
                    continue;
                }
                if prior_keys.contains(dep.as_str()) {
                    return Err(GraphError::DeleteBlocked {
                        resource: dep.clone(),
                        dependent: resource.id.clone(),
                    });
                }
                return Err(GraphError::UnresolvedDependency {
                    resource: resource.id.clone(),
                    dependency: dep.clone(),
                });
            }

            let mut bound = resource.clone();
            bound.depends_on.clone_from(&deps);
            planned.push((bound, deps));
        }

        let root = graph.root();
        for (resource, _) in &planned {
            let (idx, inserted) = graph.add_resource(ResourceNode::new(resource.clone(), ActionType::Update));
            if !inserted {
                debug!("Reusing vertex for resource {}", resource.id);
            }
            graph.connect(root, idx);
        }

        for (resource, deps) in &planned {
            let Some(node) = graph.index_of(&resource.id) else {
                continue;
            };
            for dep in deps {
                if let Some(dep_idx) = graph.index_of(dep) {
                    graph.connect(dep_idx, node);
                }
            }
        }

        Ok(())
    }

    /// Adds one delete vertex per recorded resource that has no vertex yet.
    fn add_delete_resources(&self, graph: &mut ExecutionGraph) -> Result<(), GraphError> {
        let prior_index: BTreeMap<String, Resource> = index_resources(self.prior);
        let known: HashSet<&str> = prior_index.keys().map(String::as_str).collect();

        let mut deletes: Vec<(String, Vec<String>)> = Vec::new();
        let mut seen: HashSet<&str> = HashSet::new();
        for resource in self.prior {
            if graph.contains(&resource.id) || !seen.insert(resource.key()) {
                continue;
            }
            let Some(recorded) = prior_index.get(&resource.id) else {
                continue;
            };
            let deps = dependency_keys(recorded, &known)?;
            let mut bound = recorded.clone();
            bound.depends_on.clone_from(&deps);

            debug!("Resource {} is no longer desired, scheduling delete", resource.id);
            let (idx, _) = graph.add_resource(ResourceNode::new(bound, ActionType::Delete));
            graph.connect(graph.root(), idx);
            deletes.push((resource.id.clone(), deps));
        }

        for (key, deps) in &deletes {
            let Some(node) = graph.index_of(key) else {
                continue;
            };
            for dep in deps {
                let Some(dep_idx) = graph.index_of(dep) else {
                    debug!("Dependency {dep} of deleted resource {key} is already gone");
                    continue;
                };
                let dep_is_delete = graph.get(dep).is_some_and(ResourceNode::is_delete);
                if dep_is_delete {
                    graph.connect(node, dep_idx);
                } else {
                    graph.connect(dep_idx, node);
                }
            }
        }

        Ok(())
    }

    /// Validates the graph and minimizes its edges.
    fn finalize(mut graph: ExecutionGraph) -> Result<ExecutionGraph, GraphError> {
        graph.validate()?;
        graph.transitive_reduction();
        debug!(
            "Built graph with {} vertices and {} edges",
            graph.node_count(),
            graph.edge_count()
        );
        Ok(graph)
    }
}
