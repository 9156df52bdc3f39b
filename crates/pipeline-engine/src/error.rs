//! Error types for the pipeline engine

use thiserror::Error;

use crate::types::{NodeId, PortDirection};

/// Result type alias using PipelineError
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Errors raised while building, editing or persisting a pipeline.
///
/// None of these ever reach the scheduler: a mutation that fails is
/// rejected before the graph changes.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Node handle does not refer to a live node
    #[error("Node {0} not found")]
    UnknownNode(NodeId),

    /// Node handle is already taken (loading a saved graph)
    #[error("Node {0} already exists")]
    DuplicateNode(NodeId),

    /// Port index is outside the node's declared port list
    #[error("{direction:?} port {index} out of range for node {node}")]
    PortOutOfRange {
        node: NodeId,
        direction: PortDirection,
        index: usize,
    },

    /// Edge source must be an output port
    #[error("Input port {index} on node {node} cannot be an edge source")]
    InputAsSource { node: NodeId, index: usize },

    /// Edge target must be an input port
    #[error("Output port {index} on node {node} cannot be an edge target")]
    OutputAsTarget { node: NodeId, index: usize },

    /// Edge from a node to itself
    #[error("Node {0} cannot be connected to itself")]
    SelfLoop(NodeId),

    /// The same output/input pair is already connected
    #[error("Edge {source_node}.{source_port} -> {target_node}.{target_port} already exists")]
    DuplicateEdge {
        source_node: NodeId,
        source_port: usize,
        target_node: NodeId,
        target_port: usize,
    },

    /// Payload types of the two ports cannot be joined
    #[error("Incompatible ports: {source_type} cannot feed {target_type}")]
    TypeIncompatible {
        source_type: String,
        target_type: String,
    },

    /// A port constraint rejected the connection
    #[error("Constraint '{constraint}' rejected connection on node {node}")]
    ConstraintViolated { node: NodeId, constraint: String },

    /// No edge matches the given endpoints
    #[error("Edge not found: {0}")]
    UnknownEdge(String),

    /// Algorithm type is not present in the registry
    #[error("Unknown algorithm type '{0}'")]
    UnknownAlgorithm(String),

    /// Option name is not declared by the node's algorithm
    #[error("Unknown option '{name}' on node {node}")]
    UnknownOption { node: NodeId, name: String },

    /// Option value is out of bounds or of the wrong type
    #[error("Invalid value for option '{name}': {reason}")]
    InvalidOption { name: String, reason: String },

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Compression error
    #[error("Compression error: {0}")]
    Compression(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The worker pool could not be started
    #[error("Worker pool error: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),
}

impl PipelineError {
    /// Create an invalid option error with a message
    pub fn invalid_option(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidOption {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

/// Error returned by an algorithm's `run`.
#[derive(Debug, Clone, Error)]
pub enum AlgorithmError {
    /// Generic failure with a message
    #[error("{0}")]
    Failed(String),

    /// An input payload was not of the kind the algorithm expects
    #[error("Input {index} has unexpected payload (expected {expected})")]
    InvalidInput { index: usize, expected: String },

    /// A requested side channel was not supplied by the host
    #[error("Side channel {0} not available")]
    MissingSideChannel(String),

    /// The algorithm observed cancellation and stopped early
    #[error("Cancelled")]
    Cancelled,
}

impl AlgorithmError {
    /// Create a failed error with a message
    pub fn failed(msg: impl Into<String>) -> Self {
        Self::Failed(msg.into())
    }
}

/// Failure of a single node invocation.
///
/// These are isolated per invocation: they are logged and reported as
/// events, never propagated to sibling or downstream work.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum InvocationError {
    /// `run` returned an error
    #[error("Execution failed: {0}")]
    Failed(String),

    /// `run` panicked
    #[error("Execution panicked: {0}")]
    Panicked(String),

    /// `run` (or a yield) produced the wrong number of outputs
    #[error("Expected {expected} outputs, got {actual}")]
    ArityMismatch { expected: usize, actual: usize },

    /// Cancellation was observed; outputs were discarded
    #[error("Invocation cancelled")]
    Cancelled,
}

impl From<AlgorithmError> for InvocationError {
    fn from(err: AlgorithmError) -> Self {
        match err {
            AlgorithmError::Cancelled => Self::Cancelled,
            other => Self::Failed(other.to_string()),
        }
    }
}
