//! The module dependency graph.
//!
//! Modules are nodes of a petgraph `DiGraph`; an edge runs from a dependency
//! to each module that depends on it. Dependencies on ids outside the reactor
//! (third-party libraries) carry no cache state and are ignored.

use std::collections::HashMap;

use ffwd_common::ModuleId;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;

use crate::error::CacheError;
use crate::snapshot::ModuleSnapshot;

/// A validated, acyclic module graph.
#[derive(Debug)]
pub struct Reactor {
    graph: DiGraph<ModuleSnapshot, ()>,
    index: HashMap<ModuleId, NodeIndex>,
    layers: Vec<Vec<NodeIndex>>,
}

impl Reactor {
    /// Builds the graph and rejects duplicates and cycles.
    pub fn new(modules: Vec<ModuleSnapshot>) -> Result<Self, CacheError> {
        let mut graph = DiGraph::with_capacity(modules.len(), 0);
        let mut index = HashMap::with_capacity(modules.len());
        for module in modules {
            if index.contains_key(&module.id) {
                return Err(CacheError::DuplicateModule { module: module.id });
            }
            let id = module.id.clone();
            index.insert(id, graph.add_node(module));
        }

        let mut edges = Vec::new();
        for node in graph.node_indices() {
            let module = &graph[node];
            for dep in &module.dependencies {
                if *dep == module.id {
                    return Err(CacheError::CyclicDependency {
                        module: module.id.clone(),
                    });
                }
                if let Some(&from) = index.get(dep) {
                    edges.push((from, node));
                }
            }
        }
        for (from, to) in edges {
            graph.update_edge(from, to, ());
        }

        let order = petgraph::algo::toposort(&graph, None).map_err(|cycle| {
            CacheError::CyclicDependency {
                module: graph[cycle.node_id()].id.clone(),
            }
        })?;

        let mut depth: HashMap<NodeIndex, usize> = HashMap::with_capacity(order.len());
        let mut layers: Vec<Vec<NodeIndex>> = Vec::new();
        for node in order {
            let level = graph
                .neighbors_directed(node, Direction::Incoming)
                .filter_map(|dep| depth.get(&dep))
                .map(|d| d + 1)
                .max()
                .unwrap_or(0);
            depth.insert(node, level);
            if layers.len() <= level {
                layers.resize_with(level + 1, Vec::new);
            }
            layers[level].push(node);
        }
        for layer in &mut layers {
            layer.sort_by(|a, b| graph[*a].id.cmp(&graph[*b].id));
        }

        Ok(Self {
            graph,
            index,
            layers,
        })
    }

    /// Number of modules.
    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    /// `true` if the reactor has no modules.
    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Looks up a module by id.
    pub fn module(&self, id: &ModuleId) -> Option<&ModuleSnapshot> {
        self.index.get(id).map(|n| &self.graph[*n])
    }

    /// Groups of modules whose dependencies all sit in earlier groups.
    /// Modules inside one group are sorted by id.
    pub fn layers(&self) -> Vec<Vec<&ModuleSnapshot>> {
        self.layers
            .iter()
            .map(|layer| layer.iter().map(|n| &self.graph[*n]).collect())
            .collect()
    }

    /// All modules in dependency order.
    pub fn modules(&self) -> impl Iterator<Item = &ModuleSnapshot> {
        self.layers.iter().flatten().map(|n| &self.graph[*n])
    }

    /// Direct in-reactor dependencies of `id`, sorted.
    pub fn dependencies(&self, id: &ModuleId) -> Vec<&ModuleId> {
        let Some(&node) = self.index.get(id) else {
            return Vec::new();
        };
        let mut ids: Vec<&ModuleId> = self
            .graph
            .neighbors_directed(node, Direction::Incoming)
            .map(|n| &self.graph[n].id)
            .collect();
        ids.sort();
        ids
    }
}
