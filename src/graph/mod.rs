//! Build graph: named derived targets with declared outputs and dependencies.
//!
//! Nodes are declared one at a time and may only depend on nodes declared
//! before them, so a graph built through [`BuildGraph::declare`] is acyclic by
//! construction. [`BuildGraph::topological_order`] re-checks this with Kahn's
//! algorithm for graphs assembled from other sources.

pub mod composer;

pub use composer::{compose, compose_all};

use crate::abi::trim::{effective_trim, GlobalOverrides, TrimState};
use crate::error::GraphError;
use crate::orchestrator::state::BuildPhase;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};

/// What a node produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Sources,
    SymbolLists,
    KernelBuild,
    ToolchainVersion,
    UapiHeaders,
    Headers,
    ModulesPrepare,
    AbiSymbolList,
    AbiDump,
    ModulesInstall,
    UnstrippedModulesArchive,
    Images,
    GkiArtifacts,
    /// Pure union of other nodes' outputs.
    Filegroup,
    Dist,
}

/// A named derived target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraphNode {
    pub name: String,
    pub kind: NodeKind,
    pub phase: BuildPhase,
    pub deps: Vec<String>,
    pub outputs: Vec<String>,
    /// Requested trim value; `Some` only for nodes with the trim capability.
    pub trim: Option<TrimState>,
    pub attrs: BTreeMap<String, String>,
}

impl GraphNode {
    pub fn new(name: impl Into<String>, kind: NodeKind, phase: BuildPhase) -> Self {
        GraphNode {
            name: name.into(),
            kind,
            phase,
            deps: Vec::new(),
            outputs: Vec::new(),
            trim: None,
            attrs: BTreeMap::new(),
        }
    }

    pub fn deps<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.deps.extend(deps.into_iter().map(Into::into));
        self
    }

    pub fn outputs<I, S>(mut self, outputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.outputs.extend(outputs.into_iter().map(Into::into));
        self
    }

    pub fn trim(mut self, requested: TrimState) -> Self {
        self.trim = Some(requested);
        self
    }

    pub fn attr(mut self, key: &str, value: impl Into<String>) -> Self {
        self.attrs.insert(key.to_string(), value.into());
        self
    }
}

/// Nodes in declaration order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BuildGraph {
    nodes: Vec<GraphNode>,
    #[serde(skip)]
    index: HashMap<String, usize>,
}

impl BuildGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node. Every dependency must already be declared and belong to
    /// the same or an earlier phase.
    pub fn declare(&mut self, node: GraphNode) -> Result<&GraphNode, GraphError> {
        if self.index.contains_key(&node.name) {
            return Err(GraphError::DuplicateNode(node.name));
        }

        for dep in &node.deps {
            let Some(&idx) = self.index.get(dep) else {
                return Err(GraphError::UnknownDependency {
                    node: node.name.clone(),
                    dependency: dep.clone(),
                });
            };
            let dep_phase = self.nodes[idx].phase;
            if !node.phase.can_depend_on(dep_phase) {
                return Err(GraphError::PhaseInversion {
                    node: node.name.clone(),
                    node_phase: node.phase.as_str(),
                    dependency: dep.clone(),
                    dependency_phase: dep_phase.as_str(),
                });
            }
        }

        log::trace!(
            "[Graph] declare {} ({}, {} deps, {} outputs)",
            node.name,
            node.phase,
            node.deps.len(),
            node.outputs.len()
        );
        let idx = self.nodes.len();
        self.index.insert(node.name.clone(), idx);
        self.nodes.push(node);
        Ok(&self.nodes[idx])
    }

    pub fn get(&self, name: &str) -> Option<&GraphNode> {
        self.index.get(name).map(|&i| &self.nodes[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn nodes(&self) -> &[GraphNode] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Ordered, de-duplicated union of the outputs of `names`.
    pub fn union_outputs(&self, names: &[String]) -> Result<Vec<String>, GraphError> {
        let mut seen = HashSet::new();
        let mut union = Vec::new();
        for name in names {
            let node = self
                .get(name)
                .ok_or_else(|| GraphError::NotFound(name.clone()))?;
            for out in &node.outputs {
                if seen.insert(out.as_str()) {
                    union.push(out.clone());
                }
            }
        }
        Ok(union)
    }

    /// All nodes `name` depends on, directly or indirectly.
    pub fn transitive_deps(&self, name: &str) -> Result<BTreeSet<String>, GraphError> {
        let start = self
            .get(name)
            .ok_or_else(|| GraphError::NotFound(name.to_string()))?;
        let mut seen = BTreeSet::new();
        let mut stack: Vec<&str> = start.deps.iter().map(String::as_str).collect();

        while let Some(current) = stack.pop() {
            if !seen.insert(current.to_string()) {
                continue;
            }
            if let Some(node) = self.get(current) {
                stack.extend(node.deps.iter().map(String::as_str));
            }
        }
        Ok(seen)
    }

    /// Topological order via Kahn's algorithm; fails on cycles.
    pub fn topological_order(&self) -> Result<Vec<&str>, GraphError> {
        let mut in_degree: HashMap<&str, usize> = HashMap::new();
        let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();

        for node in &self.nodes {
            in_degree.entry(node.name.as_str()).or_insert(0);
            for dep in &node.deps {
                *in_degree.entry(node.name.as_str()).or_insert(0) += 1;
                dependents
                    .entry(dep.as_str())
                    .or_default()
                    .push(node.name.as_str());
            }
        }

        // Seed in declaration order so the result is deterministic.
        let mut queue: VecDeque<&str> = self
            .nodes
            .iter()
            .map(|n| n.name.as_str())
            .filter(|n| in_degree.get(n) == Some(&0))
            .collect();

        let mut sorted = Vec::with_capacity(self.nodes.len());
        while let Some(name) = queue.pop_front() {
            sorted.push(name);
            if let Some(deps) = dependents.get(name) {
                for dependent in deps {
                    if let Some(degree) = in_degree.get_mut(dependent) {
                        *degree -= 1;
                        if *degree == 0 {
                            queue.push_back(*dependent);
                        }
                    }
                }
            }
        }

        if sorted.len() != self.nodes.len() {
            return Err(GraphError::Cycle {
                remaining: self.nodes.len() - sorted.len(),
                total: self.nodes.len(),
            });
        }
        Ok(sorted)
    }

    /// Trim value `name` builds with, or `None` if it lacks the capability.
    pub fn effective_trim(
        &self,
        name: &str,
        overrides: &GlobalOverrides,
    ) -> Result<Option<TrimState>, GraphError> {
        let node = self
            .get(name)
            .ok_or_else(|| GraphError::NotFound(name.to_string()))?;
        Ok(node.trim.map(|requested| effective_trim(requested, overrides)))
    }

    /// Push a node without any checks; only for exercising cycle detection.
    #[cfg(test)]
    pub(crate) fn push_unchecked(&mut self, node: GraphNode) {
        self.index.insert(node.name.clone(), self.nodes.len());
        self.nodes.push(node);
    }
}
