//! Blueprint compilation
//!
//! [`GraphBuilder`] turns a validated blueprint into a [`CompiledGraph`]:
//! per-node instances constructed through the registry factories,
//! adjacency lists, a deterministic topological order over the
//! loop-reduced graph, and a fingerprint for the compilation cache.
//! Compilation is pure: the same blueprint and config shape always compile
//! to an equivalent graph.

use crate::blueprint::{EdgeSpec, WorkflowBlueprint, WorkflowConfig};
use crate::error::{Result, WorkflowError};
use crate::nodes::{WorkflowNode, BRANCH_BODY};
use crate::registry::{NodeKind, NodeRegistry};
use crate::validator::validate_blueprint;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;

/// One compiled node: its kind plus the constructed instance
#[derive(Clone)]
pub struct CompiledNode {
    /// Node kind
    pub kind: NodeKind,
    /// The instance, stateless across runs
    pub instance: Arc<dyn WorkflowNode>,
}

impl std::fmt::Debug for CompiledNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledNode").field("kind", &self.kind).finish()
    }
}

/// Executable form of a blueprint
#[derive(Debug, Clone)]
pub struct CompiledGraph {
    /// The validated blueprint this graph was compiled from
    pub blueprint: WorkflowBlueprint,
    /// Id of the start node
    pub start_id: String,
    /// Compiled nodes by id
    pub nodes: HashMap<String, CompiledNode>,
    /// Outgoing edges by source id, in declaration order
    pub adjacency: HashMap<String, Vec<EdgeSpec>>,
    /// Deterministic topological order of the loop-reduced graph
    pub topo_order: Vec<String>,
    /// Cache key: blueprint plus bound config shape
    pub fingerprint: u64,
}

impl CompiledGraph {
    /// Compiled node by id
    pub fn node(&self, id: &str) -> Result<&CompiledNode> {
        self.nodes
            .get(id)
            .ok_or_else(|| WorkflowError::internal(format!("compiled node '{id}' missing")))
    }

    /// Select the edge to follow out of `from` for the given branch.
    ///
    /// Branch-returning nodes follow the matching conditional edge, with
    /// ties broken by the `order` field and then declaration order. Plain
    /// nodes follow their unconditional edge. `None` means the node is
    /// terminal and the run ends.
    pub fn next_edge(&self, from: &str, branch: Option<&str>) -> Result<Option<&EdgeSpec>> {
        let edges = match self.adjacency.get(from) {
            Some(edges) if !edges.is_empty() => edges,
            _ => return Ok(None),
        };

        if let Some(branch) = branch {
            let mut candidates: Vec<&EdgeSpec> = edges
                .iter()
                .filter(|e| e.condition.as_deref() == Some(branch))
                .collect();
            if !candidates.is_empty() {
                candidates.sort_by_key(|e| e.order.unwrap_or(u32::MAX));
                return Ok(Some(candidates[0]));
            }
            // A branch with no labeled edge falls back to an unconditional
            // edge when one exists (error-handler recovery uses this).
            if let Some(edge) = edges.iter().find(|e| e.condition.is_none()) {
                return Ok(Some(edge));
            }
            return Err(WorkflowError::internal(format!(
                "node '{from}' selected branch '{branch}' but no edge matches"
            )));
        }

        match edges.iter().find(|e| e.condition.is_none()) {
            Some(edge) => Ok(Some(edge)),
            None => Err(WorkflowError::internal(format!(
                "node '{from}' has only conditional edges but selected no branch"
            ))),
        }
    }

    /// Nearest error-handler node reachable from `from`, if any
    pub fn error_handler_from(&self, from: &str) -> Option<String> {
        let mut seen = std::collections::HashSet::new();
        let mut queue = VecDeque::from([from.to_string()]);
        while let Some(id) = queue.pop_front() {
            if !seen.insert(id.clone()) {
                continue;
            }
            if id != from {
                if let Some(node) = self.nodes.get(&id) {
                    if node.kind == NodeKind::ErrorHandler {
                        return Some(id);
                    }
                }
            }
            for edge in self.adjacency.get(&id).into_iter().flatten() {
                queue.push_back(edge.to.clone());
            }
        }
        None
    }
}

/// Compiles blueprints through a node registry
#[derive(Debug, Clone)]
pub struct GraphBuilder {
    registry: NodeRegistry,
}

impl GraphBuilder {
    /// Builder over `registry`
    pub fn new(registry: NodeRegistry) -> Self {
        Self { registry }
    }

    /// The registry this builder compiles against
    pub fn registry(&self) -> &NodeRegistry {
        &self.registry
    }

    /// Validate and compile a blueprint.
    ///
    /// Every blueprint the validator accepts compiles; every blueprint it
    /// rejects is refused here with the full issue list in the error
    /// message.
    pub fn compile(
        &self,
        blueprint: &WorkflowBlueprint,
        config: &WorkflowConfig,
    ) -> Result<CompiledGraph> {
        let report = validate_blueprint(blueprint, &self.registry);
        if !report.is_valid() {
            let summary = report
                .issues
                .iter()
                .map(|i| format!("{} at {}: {}", i.code, i.path, i.message))
                .collect::<Vec<_>>()
                .join("; ");
            return Err(WorkflowError::validation(summary));
        }

        let mut nodes = HashMap::with_capacity(blueprint.nodes.len());
        for spec in &blueprint.nodes {
            let instance = self.registry.instantiate(spec)?;
            nodes.insert(
                spec.id.clone(),
                CompiledNode {
                    kind: spec.kind,
                    instance,
                },
            );
        }

        let mut adjacency: HashMap<String, Vec<EdgeSpec>> = HashMap::new();
        for edge in &blueprint.edges {
            adjacency.entry(edge.from.clone()).or_default().push(edge.clone());
        }

        let start_id = blueprint
            .start_node()
            .map(|n| n.id.clone())
            .ok_or_else(|| WorkflowError::internal("validated blueprint lost its start node"))?;

        let topo_order = topological_order(blueprint);

        Ok(CompiledGraph {
            fingerprint: blueprint.fingerprint(config),
            blueprint: blueprint.clone(),
            start_id,
            nodes,
            adjacency,
            topo_order,
        })
    }
}

/// Kahn's algorithm over the loop-reduced graph, deterministic via sorted
/// zero-indegree selection.
fn topological_order(blueprint: &WorkflowBlueprint) -> Vec<String> {
    let mut indegree: BTreeMap<&str, usize> =
        blueprint.nodes.iter().map(|n| (n.id.as_str(), 0)).collect();
    let mut adjacency: BTreeMap<&str, Vec<&str>> = BTreeMap::new();

    for edge in &blueprint.edges {
        let from_loop = blueprint
            .node(&edge.from)
            .map(|n| n.kind == NodeKind::Loop)
            .unwrap_or(false);
        if from_loop && edge.condition.as_deref() == Some(BRANCH_BODY) {
            continue;
        }
        adjacency.entry(edge.from.as_str()).or_default().push(edge.to.as_str());
        *indegree.entry(edge.to.as_str()).or_insert(0) += 1;
    }

    let mut ready: VecDeque<&str> = indegree
        .iter()
        .filter(|(_, d)| **d == 0)
        .map(|(id, _)| *id)
        .collect();
    let mut order = Vec::with_capacity(blueprint.nodes.len());

    while let Some(id) = ready.pop_front() {
        order.push(id.to_string());
        for next in adjacency.get(id).into_iter().flatten() {
            if let Some(d) = indegree.get_mut(next) {
                *d -= 1;
                if *d == 0 {
                    ready.push_back(*next);
                }
            }
        }
    }

    order
}
