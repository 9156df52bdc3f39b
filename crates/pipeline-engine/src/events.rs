//! Event types for observing pipeline execution
//!
//! The scheduler reports progress, yields, failures and redraw requests
//! through an [`EventSink`]. The sink is the only coupling between the
//! execution core and whatever displays it.

use serde::{Deserialize, Serialize};

use crate::types::{InvocationId, NodeId};

/// Trait for receiving pipeline events
///
/// Called from worker threads; implementations must not block for long.
pub trait EventSink: Send + Sync {
    /// Send an event
    ///
    /// Returns an error if the event could not be delivered (e.g., channel closed)
    fn send(&self, event: PipelineEvent) -> Result<(), EventError>;
}

/// Error when sending events fails
#[derive(Debug, Clone)]
pub struct EventError {
    pub message: String,
}

impl std::fmt::Display for EventError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Event error: {}", self.message)
    }
}

impl std::error::Error for EventError {}

impl EventError {
    pub fn channel_closed() -> Self {
        Self {
            message: "Channel closed".to_string(),
        }
    }
}

/// Events emitted during pipeline execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PipelineEvent {
    /// `execute` was called on a set of roots
    #[serde(rename_all = "camelCase")]
    ExecutionStarted {
        execution_id: String,
        roots: Vec<NodeId>,
    },

    /// An invocation was submitted to the executor
    #[serde(rename_all = "camelCase")]
    NodeScheduled { node: NodeId, priority: i32 },

    /// An invocation entered `run`
    #[serde(rename_all = "camelCase")]
    NodeStarted {
        node: NodeId,
        invocation: InvocationId,
    },

    /// Advisory progress, keyed by invocation
    #[serde(rename_all = "camelCase")]
    NodeProgress {
        node: NodeId,
        invocation: InvocationId,
        percent: f32,
    },

    /// A yielded tuple was fanned out
    #[serde(rename_all = "camelCase")]
    NodeYielded {
        node: NodeId,
        invocation: InvocationId,
        sequence: u64,
    },

    /// An invocation finished and its outputs were fanned out
    #[serde(rename_all = "camelCase")]
    NodeCompleted {
        node: NodeId,
        invocation: InvocationId,
        outputs: usize,
    },

    /// An invocation failed; its outputs were discarded
    #[serde(rename_all = "camelCase")]
    NodeFailed {
        node: NodeId,
        invocation: InvocationId,
        error: String,
    },

    /// An invocation was skipped or its outputs dropped after cancellation
    #[serde(rename_all = "camelCase")]
    NodeCancelled { node: NodeId },

    /// `cancel` was called
    #[serde(rename_all = "camelCase")]
    ExecutionCancelled { execution_id: String },

    /// Queue contents or retained history changed; the view should repaint
    QueueRedraw,
}

impl PipelineEvent {
    /// Create a node progress event
    pub fn node_progress(node: NodeId, invocation: InvocationId, percent: f32) -> Self {
        Self::NodeProgress {
            node,
            invocation,
            percent,
        }
    }

    /// Node the event refers to, if any
    pub fn node(&self) -> Option<NodeId> {
        match self {
            Self::NodeScheduled { node, .. }
            | Self::NodeStarted { node, .. }
            | Self::NodeProgress { node, .. }
            | Self::NodeYielded { node, .. }
            | Self::NodeCompleted { node, .. }
            | Self::NodeFailed { node, .. }
            | Self::NodeCancelled { node } => Some(*node),
            Self::ExecutionStarted { .. } | Self::ExecutionCancelled { .. } | Self::QueueRedraw => None,
        }
    }
}

/// A no-op event sink that discards all events
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn send(&self, _event: PipelineEvent) -> Result<(), EventError> {
        Ok(())
    }
}

/// A vector-based event sink that collects events
///
/// Useful for testing to verify events were emitted correctly.
pub struct VecEventSink {
    events: parking_lot::Mutex<Vec<PipelineEvent>>,
}

impl VecEventSink {
    pub fn new() -> Self {
        Self {
            events: parking_lot::Mutex::new(Vec::new()),
        }
    }

    /// Get all collected events
    pub fn events(&self) -> Vec<PipelineEvent> {
        self.events.lock().clone()
    }

    /// Collected events concerning one node
    pub fn events_for(&self, node: NodeId) -> Vec<PipelineEvent> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.node() == Some(node))
            .cloned()
            .collect()
    }

    /// Clear all collected events
    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl Default for VecEventSink {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for VecEventSink {
    fn send(&self, event: PipelineEvent) -> Result<(), EventError> {
        self.events.lock().push(event);
        Ok(())
    }
}
