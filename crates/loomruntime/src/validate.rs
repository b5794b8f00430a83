//! Graph validation: connection legality for the editor, and the pre-run
//! diagnostic sweep that gates execution.

use crate::handles::resolve_handle_spec;
use crate::registry::NodeRegistry;
use loomcore::{
    are_types_compatible, Edge, Flow, HandleDirection, NodeIssues, ValidationIssue,
};
use petgraph::algo::toposort;
use petgraph::graph::DiGraph;
use std::collections::{HashMap, HashSet};

/// Would adding `candidate` to the flow be legal? Used by the editor to
/// reject illegal connections as they are drawn. Fails closed: unknown nodes,
/// unknown node types and unresolvable handles all reject.
pub fn check_connection_validity(candidate: &Edge, flow: &Flow, registry: &NodeRegistry) -> bool {
    // Inputs are single-writer: an occupied target handle rejects regardless
    // of type.
    if flow
        .edge_into(&candidate.target, candidate.target_handle.as_deref())
        .is_some()
    {
        return false;
    }

    let (Some(source), Some(target)) = (
        flow.find_node(&candidate.source),
        flow.find_node(&candidate.target),
    ) else {
        return false;
    };

    let Some(source_spec) = resolve_handle_spec(
        registry,
        flow,
        source,
        candidate.source_handle.as_deref(),
        HandleDirection::Output,
    ) else {
        return false;
    };
    let Some(target_spec) = resolve_handle_spec(
        registry,
        flow,
        target,
        candidate.target_handle.as_deref(),
        HandleDirection::Input,
    ) else {
        return false;
    };

    are_types_compatible(source_spec.data_type, target_spec.data_type)
}

/// Full pre-run diagnostic sweep. Deterministic: the same flow yields the
/// same issue list. A flow is runnable iff no node carries an Error issue.
pub fn validate_flow(flow: &Flow, registry: &NodeRegistry) -> Vec<NodeIssues> {
    let mut collector = IssueCollector::new();

    for node in &flow.nodes {
        let Some(definition) = registry.get(&node.node_type) else {
            collector.push(
                &node.id,
                ValidationIssue::error(format!("unknown node type '{}'", node.node_type)),
            );
            continue;
        };

        if let Err(e) = definition.validate_data(&node.data) {
            collector.push(&node.id, ValidationIssue::error(e.to_string()));
        }
        for issue in definition.validate(node, &flow.edges) {
            collector.push(&node.id, issue);
        }
    }

    validate_edges(flow, registry, &mut collector);
    validate_acyclic(flow, &mut collector);

    collector.into_issues()
}

/// True when no node in the diagnostic sweep carries an Error-severity issue.
pub fn is_runnable(issues: &[NodeIssues]) -> bool {
    !issues.iter().any(NodeIssues::has_errors)
}

fn validate_edges(flow: &Flow, registry: &NodeRegistry, collector: &mut IssueCollector) {
    // Keyed by the normalized input key, so `None` and `Some("main")` count
    // as the same slot.
    let mut seen_targets: HashSet<(&str, &str)> = HashSet::new();

    for edge in &flow.edges {
        let target_exists = flow.find_node(&edge.target).is_some();
        let source_exists = flow.find_node(&edge.source).is_some();
        // Attribute edge issues to the consuming node when it exists.
        let owner = if target_exists { &edge.target } else { &edge.source };

        if !source_exists || !target_exists {
            collector.push(
                owner,
                ValidationIssue::error(format!(
                    "edge references a missing node ({} -> {})",
                    edge.source, edge.target
                )),
            );
            continue;
        }

        if !seen_targets.insert((edge.target.as_str(), edge.target_key())) {
            collector.push(
                &edge.target,
                ValidationIssue::error(format!(
                    "input '{}' has more than one incoming connection",
                    edge.target_key()
                )),
            );
            continue;
        }

        let source = flow.find_node(&edge.source).unwrap();
        let target = flow.find_node(&edge.target).unwrap();
        let source_spec = resolve_handle_spec(
            registry,
            flow,
            source,
            edge.source_handle.as_deref(),
            HandleDirection::Output,
        );
        let target_spec = resolve_handle_spec(
            registry,
            flow,
            target,
            edge.target_handle.as_deref(),
            HandleDirection::Input,
        );

        match (source_spec, target_spec) {
            (Some(s), Some(t)) => {
                if !are_types_compatible(s.data_type, t.data_type) {
                    collector.push(
                        &edge.target,
                        ValidationIssue::error(format!(
                            "incompatible connection into '{}': {:?} does not accept {:?}",
                            edge.target_key(),
                            t.data_type,
                            s.data_type
                        ))
                        .for_field(edge.target_key()),
                    );
                }
            }
            _ => {
                collector.push(
                    &edge.target,
                    ValidationIssue::error(format!(
                        "connection into '{}' references an unresolvable handle",
                        edge.target_key()
                    )),
                );
            }
        }
    }
}

fn validate_acyclic(flow: &Flow, collector: &mut IssueCollector) {
    let mut graph = DiGraph::<&str, ()>::new();
    let mut indices = HashMap::new();
    for node in &flow.nodes {
        indices.insert(node.id.as_str(), graph.add_node(node.id.as_str()));
    }
    for edge in &flow.edges {
        if let (Some(&a), Some(&b)) = (
            indices.get(edge.source.as_str()),
            indices.get(edge.target.as_str()),
        ) {
            graph.add_edge(a, b, ());
        }
    }
    if let Err(cycle) = toposort(&graph, None) {
        let node_id = graph[cycle.node_id()].to_string();
        collector.push(
            &node_id,
            ValidationIssue::error("flow contains a cycle through this node"),
        );
    }
}

/// Accumulates issues per node, preserving first-seen node order.
struct IssueCollector {
    order: Vec<String>,
    by_node: HashMap<String, Vec<ValidationIssue>>,
}

impl IssueCollector {
    fn new() -> Self {
        Self {
            order: Vec::new(),
            by_node: HashMap::new(),
        }
    }

    fn push(&mut self, node_id: &str, issue: ValidationIssue) {
        if !self.by_node.contains_key(node_id) {
            self.order.push(node_id.to_string());
        }
        self.by_node.entry(node_id.to_string()).or_default().push(issue);
    }

    fn into_issues(mut self) -> Vec<NodeIssues> {
        self.order
            .iter()
            .map(|id| NodeIssues {
                node_id: id.clone(),
                issues: self.by_node.remove(id).unwrap_or_default(),
            })
            .collect()
    }
}
