//! Whole-graph validation
//!
//! Edge-level rules are enforced by [`Pipeline::connect`]. These checks
//! look at the graph as a whole before execution: inputs that can never be
//! fed (the node can never become ready), cycles, and saved descriptions
//! that reference unknown algorithms or nodes.

use std::collections::{BTreeMap, HashSet, VecDeque};

use crate::graph::Pipeline;
use crate::persistence::PipelineDescription;
use crate::registry::AlgorithmRegistry;
use crate::types::NodeId;

/// Validation finding with location context
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Nodes that lie on at least one cycle
    CycleDetected { nodes: Vec<NodeId> },
    /// An input port has no incoming edge, so the node never becomes ready
    /// unless Results are injected
    UnconnectedInput { node: NodeId, port: String },
    /// A saved node refers to an algorithm type missing from the registry
    UnknownAlgorithm { node: NodeId, algorithm: String },
    /// A saved edge refers to a node that is not in the description
    UnknownNode { edge: usize, node: NodeId },
    /// Two saved nodes share a handle
    DuplicateNode { node: NodeId },
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CycleDetected { nodes } => {
                let list: Vec<String> = nodes.iter().map(ToString::to_string).collect();
                write!(f, "Cycle detected through nodes {}", list.join(", "))
            }
            Self::UnconnectedInput { node, port } => {
                write!(f, "Input '{}' on node {} is not connected", port, node)
            }
            Self::UnknownAlgorithm { node, algorithm } => {
                write!(f, "Unknown algorithm '{}' for node {}", algorithm, node)
            }
            Self::UnknownNode { edge, node } => {
                write!(f, "Edge {} references unknown node {}", edge, node)
            }
            Self::DuplicateNode { node } => write!(f, "Node {} appears more than once", node),
        }
    }
}

impl std::error::Error for ValidationError {}

/// Validate a live pipeline
///
/// Returns all findings (not just the first).
pub fn validate_pipeline(pipeline: &Pipeline) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    validate_inputs_connected(pipeline, &mut errors);

    let nodes = pipeline.node_ids();
    let edges: Vec<(NodeId, NodeId)> = pipeline
        .edges()
        .iter()
        .map(|e| (e.source.node, e.target.node))
        .collect();
    detect_cycles(&nodes, &edges, &mut errors);

    errors
}

/// Validate a saved description before loading it
pub fn validate_description(desc: &PipelineDescription, registry: &AlgorithmRegistry) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    let mut seen = HashSet::new();
    for node in &desc.nodes {
        if !seen.insert(node.id) {
            errors.push(ValidationError::DuplicateNode { node: node.id });
        }
        if !registry.has_type(&node.algorithm) {
            errors.push(ValidationError::UnknownAlgorithm {
                node: node.id,
                algorithm: node.algorithm.clone(),
            });
        }
    }

    let mut edges = Vec::new();
    for (index, edge) in desc.edges.iter().enumerate() {
        let mut valid = true;
        for node in [edge.source, edge.target] {
            if !seen.contains(&node) {
                errors.push(ValidationError::UnknownNode { edge: index, node });
                valid = false;
            }
        }
        if valid {
            edges.push((edge.source, edge.target));
        }
    }

    let nodes: Vec<NodeId> = desc.nodes.iter().map(|n| n.id).collect();
    detect_cycles(&nodes, &edges, &mut errors);

    errors
}

fn validate_inputs_connected(pipeline: &Pipeline, errors: &mut Vec<ValidationError>) {
    for node in pipeline.nodes() {
        for port in node.inputs() {
            if pipeline.edge_count(port.port_ref()) == 0 {
                errors.push(ValidationError::UnconnectedInput {
                    node: node.id(),
                    port: port.id.clone(),
                });
            }
        }
    }
}

/// Kahn's algorithm; whatever cannot be ordered lies on or behind a cycle
fn detect_cycles(nodes: &[NodeId], edges: &[(NodeId, NodeId)], errors: &mut Vec<ValidationError>) {
    let mut in_degree: BTreeMap<NodeId, usize> = nodes.iter().map(|n| (*n, 0)).collect();
    let mut adjacency: BTreeMap<NodeId, Vec<NodeId>> = BTreeMap::new();

    for (source, target) in edges {
        adjacency.entry(*source).or_default().push(*target);
        if let Some(degree) = in_degree.get_mut(target) {
            *degree += 1;
        }
    }

    let mut queue: VecDeque<NodeId> = in_degree
        .iter()
        .filter(|(_, degree)| **degree == 0)
        .map(|(id, _)| *id)
        .collect();
    let mut ordered = 0;

    while let Some(node) = queue.pop_front() {
        ordered += 1;
        for next in adjacency.get(&node).into_iter().flatten() {
            if let Some(degree) = in_degree.get_mut(next) {
                *degree -= 1;
                if *degree == 0 {
                    queue.push_back(*next);
                }
            }
        }
    }

    if ordered < in_degree.len() {
        let nodes = in_degree
            .into_iter()
            .filter(|(_, degree)| *degree > 0)
            .map(|(id, _)| id)
            .collect();
        errors.push(ValidationError::CycleDetected { nodes });
    }
}
