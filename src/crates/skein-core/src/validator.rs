//! Blueprint and config validation
//!
//! The single authoritative validation implementation. Editors may run
//! advisory subsets of these checks, never supersets; the executor treats
//! any non-empty issue list as a `ValidationError` and refuses to run.
//!
//! Structural rules enforced here:
//!
//! - node ids unique, kinds registered, config matches the declared schema
//! - exactly one `start` node, with no inbound edges
//! - every node reachable from `start`
//! - no duplicate `(from, to)` edge pairs
//! - a node may lack outgoing edges only if its kind allows termination
//! - conditional/loop nodes carry the branch edges their kind requires
//! - several same-condition edges from one node all need an `order`
//! - cycles are legal only through a loop node's `body` edge

use crate::blueprint::{EdgeSpec, WorkflowBlueprint, WorkflowConfig};
use crate::nodes::{BRANCH_BODY, BRANCH_EXIT, BRANCH_FALSE, BRANCH_TRUE};
use crate::registry::{NodeKind, NodeRegistry};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};

/// One validation finding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationIssue {
    /// Location of the problem ("nodes[2].config.maxIterations", "edges[0]")
    pub path: String,
    /// Stable machine-readable code
    pub code: String,
    /// Human-readable description
    pub message: String,
}

impl ValidationIssue {
    fn new(path: impl Into<String>, code: &str, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            code: code.to_string(),
            message: message.into(),
        }
    }
}

/// Outcome of validating one blueprint
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    /// All findings; empty means valid
    pub issues: Vec<ValidationIssue>,
}

impl ValidationReport {
    /// True when no issues were found
    pub fn is_valid(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Validate a blueprint against the structural rules and the registry's
/// config schemas
pub fn validate_blueprint(
    blueprint: &WorkflowBlueprint,
    registry: &NodeRegistry,
) -> ValidationReport {
    let mut issues = Vec::new();

    check_nodes(blueprint, registry, &mut issues);
    check_start(blueprint, &mut issues);
    check_edges(blueprint, &mut issues);

    // Graph-level checks only make sense over a structurally sound node set.
    if issues.is_empty() {
        check_outgoing(blueprint, registry, &mut issues);
        check_branches(blueprint, &mut issues);
        check_edge_orders(blueprint, &mut issues);
        check_reachability(blueprint, &mut issues);
        check_cycles(blueprint, &mut issues);
    }

    ValidationReport { issues }
}

/// Validate run-level execution parameters
pub fn validate_config(config: &WorkflowConfig) -> ValidationReport {
    let mut issues = Vec::new();

    if config.provider.trim().is_empty() {
        issues.push(ValidationIssue::new(
            "config.provider",
            "missing-provider",
            "provider must be set",
        ));
    }
    if config.model.trim().is_empty() {
        issues.push(ValidationIssue::new(
            "config.model",
            "missing-model",
            "model must be set",
        ));
    }
    if !(0.0..=2.0).contains(&config.temperature) {
        issues.push(ValidationIssue::new(
            "config.temperature",
            "temperature-out-of-range",
            format!("temperature {} outside [0, 2]", config.temperature),
        ));
    }
    if config.max_tokens == Some(0) {
        issues.push(ValidationIssue::new(
            "config.maxTokens",
            "zero-max-tokens",
            "maxTokens must be positive when set",
        ));
    }

    ValidationReport { issues }
}

fn check_nodes(
    blueprint: &WorkflowBlueprint,
    registry: &NodeRegistry,
    issues: &mut Vec<ValidationIssue>,
) {
    if blueprint.nodes.is_empty() {
        issues.push(ValidationIssue::new(
            "nodes",
            "empty-blueprint",
            "blueprint has no nodes",
        ));
        return;
    }

    let mut seen = HashSet::new();
    for (i, node) in blueprint.nodes.iter().enumerate() {
        let path = format!("nodes[{i}]");
        if node.id.trim().is_empty() {
            issues.push(ValidationIssue::new(&path, "empty-node-id", "node id is empty"));
        }
        if !seen.insert(node.id.clone()) {
            issues.push(ValidationIssue::new(
                &path,
                "duplicate-node-id",
                format!("node id '{}' declared more than once", node.id),
            ));
        }
        match registry.get(node.kind) {
            None => {
                issues.push(ValidationIssue::new(
                    format!("{path}.kind"),
                    "unknown-kind",
                    format!("node kind '{}' is not registered", node.kind),
                ));
            }
            Some(descriptor) => {
                check_node_config(&path, node, &descriptor.config_keys, issues);
            }
        }
    }
}

fn check_node_config(
    path: &str,
    node: &crate::blueprint::NodeSpec,
    keys: &[crate::registry::ConfigKey],
    issues: &mut Vec<ValidationIssue>,
) {
    let config = node.config.as_object();

    for key in keys {
        let value = config.and_then(|c| c.get(&key.name));
        match value {
            None => {
                if key.required {
                    issues.push(ValidationIssue::new(
                        format!("{path}.config.{}", key.name),
                        "missing-config-key",
                        format!("'{}' node requires config key '{}'", node.kind, key.name),
                    ));
                }
            }
            Some(value) => {
                if !key.value_kind.accepts(value) {
                    issues.push(ValidationIssue::new(
                        format!("{path}.config.{}", key.name),
                        "invalid-config-value",
                        format!(
                            "config key '{}' of node '{}' has the wrong type",
                            key.name, node.id
                        ),
                    ));
                }
            }
        }
    }
}

fn check_start(blueprint: &WorkflowBlueprint, issues: &mut Vec<ValidationIssue>) {
    let starts: Vec<&str> = blueprint
        .nodes
        .iter()
        .filter(|n| n.kind == NodeKind::Start)
        .map(|n| n.id.as_str())
        .collect();

    match starts.len() {
        0 => issues.push(ValidationIssue::new(
            "nodes",
            "missing-start",
            "blueprint has no start node",
        )),
        1 => {}
        n => issues.push(ValidationIssue::new(
            "nodes",
            "multiple-start",
            format!("blueprint has {n} start nodes, expected exactly one"),
        )),
    }

    let start_ids: HashSet<&str> = starts.into_iter().collect();
    for (i, edge) in blueprint.edges.iter().enumerate() {
        if start_ids.contains(edge.to.as_str()) {
            issues.push(ValidationIssue::new(
                format!("edges[{i}]"),
                "edge-into-start",
                format!("edge '{}' -> '{}' targets the start node", edge.from, edge.to),
            ));
        }
    }
}

fn check_edges(blueprint: &WorkflowBlueprint, issues: &mut Vec<ValidationIssue>) {
    let ids: HashSet<&str> = blueprint.nodes.iter().map(|n| n.id.as_str()).collect();
    let mut pairs = HashSet::new();

    for (i, edge) in blueprint.edges.iter().enumerate() {
        let path = format!("edges[{i}]");
        if !ids.contains(edge.from.as_str()) {
            issues.push(ValidationIssue::new(
                &path,
                "unknown-edge-source",
                format!("edge source '{}' does not exist", edge.from),
            ));
        }
        if !ids.contains(edge.to.as_str()) {
            issues.push(ValidationIssue::new(
                &path,
                "unknown-edge-target",
                format!("edge target '{}' does not exist", edge.to),
            ));
        }
        if !pairs.insert((edge.from.clone(), edge.to.clone())) {
            issues.push(ValidationIssue::new(
                &path,
                "duplicate-edge",
                format!("duplicate edge '{}' -> '{}'", edge.from, edge.to),
            ));
        }
    }
}

fn check_outgoing(
    blueprint: &WorkflowBlueprint,
    registry: &NodeRegistry,
    issues: &mut Vec<ValidationIssue>,
) {
    for (i, node) in blueprint.nodes.iter().enumerate() {
        let outgoing = blueprint.outgoing(&node.id);
        if outgoing.is_empty() {
            let terminal_allowed = registry
                .get(node.kind)
                .map(|d| d.terminal_allowed)
                .unwrap_or(false);
            if !terminal_allowed {
                issues.push(ValidationIssue::new(
                    format!("nodes[{i}]"),
                    "missing-outgoing-edge",
                    format!(
                        "'{}' node '{}' cannot terminate the workflow and needs an outgoing edge",
                        node.kind, node.id
                    ),
                ));
            }
        }
    }
}

fn check_branches(blueprint: &WorkflowBlueprint, issues: &mut Vec<ValidationIssue>) {
    for (i, node) in blueprint.nodes.iter().enumerate() {
        let required: &[&str] = match node.kind {
            NodeKind::Conditional => &[BRANCH_TRUE, BRANCH_FALSE],
            NodeKind::Loop => &[BRANCH_BODY, BRANCH_EXIT],
            _ => continue,
        };
        let outgoing = blueprint.outgoing(&node.id);
        for branch in required {
            let present = outgoing
                .iter()
                .any(|e| e.condition.as_deref() == Some(*branch));
            if !present {
                issues.push(ValidationIssue::new(
                    format!("nodes[{i}]"),
                    "missing-branch",
                    format!(
                        "'{}' node '{}' has no outgoing edge for branch '{}'",
                        node.kind, node.id, branch
                    ),
                ));
            }
        }
    }
}

fn check_edge_orders(blueprint: &WorkflowBlueprint, issues: &mut Vec<ValidationIssue>) {
    let mut groups: HashMap<(&str, &str), Vec<(usize, &EdgeSpec)>> = HashMap::new();
    for (i, edge) in blueprint.edges.iter().enumerate() {
        if let Some(condition) = &edge.condition {
            groups
                .entry((edge.from.as_str(), condition.as_str()))
                .or_default()
                .push((i, edge));
        }
    }

    for ((from, condition), edges) in groups {
        if edges.len() < 2 {
            continue;
        }
        let mut orders = HashSet::new();
        for (i, edge) in &edges {
            match edge.order {
                None => issues.push(ValidationIssue::new(
                    format!("edges[{i}]"),
                    "missing-edge-order",
                    format!(
                        "edges from '{from}' on branch '{condition}' compete and each needs an order"
                    ),
                )),
                Some(order) => {
                    if !orders.insert(order) {
                        issues.push(ValidationIssue::new(
                            format!("edges[{i}]"),
                            "duplicate-edge-order",
                            format!(
                                "edges from '{from}' on branch '{condition}' share order {order}"
                            ),
                        ));
                    }
                }
            }
        }
    }
}

fn check_reachability(blueprint: &WorkflowBlueprint, issues: &mut Vec<ValidationIssue>) {
    let start = match blueprint.start_node() {
        Some(node) => node.id.clone(),
        None => return,
    };

    let mut reached: HashSet<String> = HashSet::new();
    let mut queue = VecDeque::from([start]);
    while let Some(id) = queue.pop_front() {
        if !reached.insert(id.clone()) {
            continue;
        }
        for edge in blueprint.outgoing(&id) {
            queue.push_back(edge.to.clone());
        }
    }

    for (i, node) in blueprint.nodes.iter().enumerate() {
        if !reached.contains(&node.id) {
            issues.push(ValidationIssue::new(
                format!("nodes[{i}]"),
                "unreachable-node",
                format!("node '{}' is not reachable from the start node", node.id),
            ));
        }
    }
}

/// True for the back-edge a loop node uses to re-enter its body.
fn is_loop_body_edge(blueprint: &WorkflowBlueprint, edge: &EdgeSpec) -> bool {
    edge.condition.as_deref() == Some(BRANCH_BODY)
        && blueprint
            .node(&edge.from)
            .map(|n| n.kind == NodeKind::Loop)
            .unwrap_or(false)
}

fn check_cycles(blueprint: &WorkflowBlueprint, issues: &mut Vec<ValidationIssue>) {
    // Kahn's algorithm over the graph without loop body edges; anything
    // left over sits on a cycle that no loop node mediates.
    let mut indegree: HashMap<&str, usize> =
        blueprint.nodes.iter().map(|n| (n.id.as_str(), 0)).collect();
    let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();

    for edge in &blueprint.edges {
        if is_loop_body_edge(blueprint, edge) {
            continue;
        }
        adjacency
            .entry(edge.from.as_str())
            .or_default()
            .push(edge.to.as_str());
        *indegree.entry(edge.to.as_str()).or_insert(0) += 1;
    }

    let mut queue: VecDeque<&str> = indegree
        .iter()
        .filter(|(_, d)| **d == 0)
        .map(|(id, _)| *id)
        .collect();
    let mut visited = 0usize;

    while let Some(id) = queue.pop_front() {
        visited += 1;
        for next in adjacency.get(id).into_iter().flatten() {
            if let Some(d) = indegree.get_mut(next) {
                *d -= 1;
                if *d == 0 {
                    queue.push_back(*next);
                }
            }
        }
    }

    if visited != blueprint.nodes.len() {
        issues.push(ValidationIssue::new(
            "edges",
            "illegal-cycle",
            "blueprint contains a cycle outside a loop node's body edge",
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blueprint::{EdgeSpec, NodeSpec};
    use crate::registry::default_registry;
    use serde_json::json;

    fn chat() -> WorkflowBlueprint {
        WorkflowBlueprint::new("chat")
            .with_node(NodeSpec::new("start", NodeKind::Start))
            .with_node(NodeSpec::new("llm", NodeKind::Model))
            .with_edge(EdgeSpec::new("start", "llm"))
    }

    fn codes(report: &ValidationReport) -> Vec<&str> {
        report.issues.iter().map(|i| i.code.as_str()).collect()
    }

    #[test]
    fn valid_chat_blueprint_passes() {
        let report = validate_blueprint(&chat(), &default_registry());
        assert!(report.is_valid(), "{:?}", report.issues);
    }

    #[test]
    fn two_start_nodes_are_rejected() {
        let bp = chat().with_node(NodeSpec::new("start2", NodeKind::Start));
        let report = validate_blueprint(&bp, &default_registry());
        assert!(codes(&report).contains(&"multiple-start"));
    }

    #[test]
    fn edge_into_start_is_rejected() {
        let bp = chat().with_edge(EdgeSpec::new("llm", "start"));
        let report = validate_blueprint(&bp, &default_registry());
        assert!(codes(&report).contains(&"edge-into-start"));
    }

    #[test]
    fn duplicate_edges_are_rejected() {
        let bp = chat().with_edge(EdgeSpec::new("start", "llm"));
        let report = validate_blueprint(&bp, &default_registry());
        assert!(codes(&report).contains(&"duplicate-edge"));
    }

    #[test]
    fn unreachable_node_is_rejected() {
        let bp = chat().with_node(NodeSpec::new("orphan", NodeKind::Model));
        let report = validate_blueprint(&bp, &default_registry());
        assert!(codes(&report).contains(&"unreachable-node"));
    }

    #[test]
    fn non_terminal_kind_needs_outgoing_edge() {
        // Retrieval with no outgoing edge cannot terminate a run.
        let bp = WorkflowBlueprint::new("bad")
            .with_node(NodeSpec::new("start", NodeKind::Start))
            .with_node(NodeSpec::new("rag", NodeKind::Retrieval))
            .with_edge(EdgeSpec::new("start", "rag"));
        let report = validate_blueprint(&bp, &default_registry());
        assert!(codes(&report).contains(&"missing-outgoing-edge"));
    }

    #[test]
    fn missing_required_config_key_is_rejected() {
        let bp = WorkflowBlueprint::new("bad")
            .with_node(NodeSpec::new("start", NodeKind::Start))
            .with_node(NodeSpec::new("wait", NodeKind::Delay))
            .with_edge(EdgeSpec::new("start", "wait"));
        let report = validate_blueprint(&bp, &default_registry());
        assert!(codes(&report).contains(&"missing-config-key"));
    }

    #[test]
    fn wrong_config_value_type_is_rejected() {
        let bp = WorkflowBlueprint::new("bad")
            .with_node(NodeSpec::new("start", NodeKind::Start))
            .with_node(
                NodeSpec::new("wait", NodeKind::Delay)
                    .with_config(json!({"durationMs": "soon"})),
            )
            .with_edge(EdgeSpec::new("start", "wait"));
        let report = validate_blueprint(&bp, &default_registry());
        assert!(codes(&report).contains(&"invalid-config-value"));
    }

    #[test]
    fn conditional_requires_both_branches() {
        let bp = WorkflowBlueprint::new("bad")
            .with_node(NodeSpec::new("start", NodeKind::Start))
            .with_node(
                NodeSpec::new("cond", NodeKind::Conditional)
                    .with_config(json!({"input": "lastMessage", "operator": "exists"})),
            )
            .with_node(NodeSpec::new("llm", NodeKind::Model))
            .with_edge(EdgeSpec::new("start", "cond"))
            .with_edge(EdgeSpec::conditional("cond", "llm", "true"));
        let report = validate_blueprint(&bp, &default_registry());
        assert!(codes(&report).contains(&"missing-branch"));
    }

    #[test]
    fn competing_conditional_edges_need_orders() {
        let bp = WorkflowBlueprint::new("bad")
            .with_node(NodeSpec::new("start", NodeKind::Start))
            .with_node(
                NodeSpec::new("cond", NodeKind::Conditional)
                    .with_config(json!({"input": "lastMessage", "operator": "exists"})),
            )
            .with_node(NodeSpec::new("a", NodeKind::Model))
            .with_node(NodeSpec::new("b", NodeKind::Model))
            .with_node(NodeSpec::new("c", NodeKind::Model))
            .with_edge(EdgeSpec::new("start", "cond"))
            .with_edge(EdgeSpec::conditional("cond", "a", "true"))
            .with_edge(EdgeSpec::conditional("cond", "b", "true"))
            .with_edge(EdgeSpec::conditional("cond", "c", "false"));
        let report = validate_blueprint(&bp, &default_registry());
        assert!(codes(&report).contains(&"missing-edge-order"));
    }

    #[test]
    fn cycle_without_loop_node_is_rejected() {
        let bp = WorkflowBlueprint::new("bad")
            .with_node(NodeSpec::new("start", NodeKind::Start))
            .with_node(NodeSpec::new("a", NodeKind::Model))
            .with_node(NodeSpec::new("b", NodeKind::Model))
            .with_edge(EdgeSpec::new("start", "a"))
            .with_edge(EdgeSpec::new("a", "b"))
            .with_edge(EdgeSpec::new("b", "a"));
        let report = validate_blueprint(&bp, &default_registry());
        assert!(codes(&report).contains(&"illegal-cycle"));
    }

    #[test]
    fn loop_body_cycle_is_allowed() {
        let bp = WorkflowBlueprint::new("looped")
            .with_node(NodeSpec::new("start", NodeKind::Start))
            .with_node(
                NodeSpec::new("loop", NodeKind::Loop).with_config(json!({"maxIterations": 3})),
            )
            .with_node(NodeSpec::new("work", NodeKind::Model))
            .with_node(NodeSpec::new("done", NodeKind::Model))
            .with_edge(EdgeSpec::new("start", "loop"))
            .with_edge(EdgeSpec::conditional("loop", "work", "body"))
            .with_edge(EdgeSpec::new("work", "loop"))
            .with_edge(EdgeSpec::conditional("loop", "done", "exit"));

        let report = validate_blueprint(&bp, &default_registry());
        assert!(report.is_valid(), "{:?}", report.issues);
    }

    #[test]
    fn config_validation_flags_missing_provider_and_bad_temperature() {
        let mut config = WorkflowConfig::new("", "m");
        config.temperature = 3.5;
        let report = validate_config(&config);
        let codes: Vec<&str> = report.issues.iter().map(|i| i.code.as_str()).collect();
        assert!(codes.contains(&"missing-provider"));
        assert!(codes.contains(&"temperature-out-of-range"));
    }
}
