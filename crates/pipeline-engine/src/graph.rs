//! Pipeline graph model
//!
//! A [`Pipeline`] is an arena of [`Node`]s plus a list of directed
//! [`Edge`]s from output ports to input ports. Node handles are arena
//! indices and are never reused; removed slots stay empty.
//!
//! Every input port owns a FIFO queue of pending Results. All queues of a
//! node live under one lock so that [`Node::dequeue_inputs`] can re-check
//! readiness and pull one item per port in a single step.
//!
//! A Result reaching the same node over several edges is marked used by
//! that node once. The node counts the copies it still holds (queued or
//! handed to a running invocation) and only the release of the last copy
//! lets the Result be finished on the node's behalf.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::compatible::{Compatible, MatchOutcome, PortContext};
use crate::contract::{Algorithm, AlgorithmMetadata, PortMetadata};
use crate::error::{PipelineError, Result};
use crate::options::{OptionValue, OptionValues};
use crate::result::{ResultId, ResultRef};
use crate::types::{EdgeId, NodeId, PortDirection, PortRef};

/// A typed slot on a node
#[derive(Debug, Clone)]
pub struct Port {
    pub node: NodeId,
    pub direction: PortDirection,
    pub index: usize,
    /// Port identifier from the algorithm's declaration
    pub id: String,
    pub label: String,
    pub compatible: Compatible,
}

impl Port {
    pub fn port_ref(&self) -> PortRef {
        PortRef {
            node: self.node,
            direction: self.direction,
            index: self.index,
        }
    }
}

/// A directed connection from an output port to an input port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub id: EdgeId,
    pub source: PortRef,
    pub target: PortRef,
}

/// One retained `(outputs, inputs)` tuple of a node
#[derive(Debug, Clone)]
pub struct HistoryEntry {
    pub outputs: Vec<ResultRef>,
    pub inputs: Vec<ResultRef>,
    /// Sequence id when the tuple came from a yield
    pub sequence: Option<u64>,
}

/// Runtime state of a node as seen by the editor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeState {
    Idle,
    /// Every input queue holds at least one Result
    Ready,
    /// At least one invocation is submitted but not yet running
    Scheduled,
    /// At least one invocation is inside `run`
    Running,
    /// Has run at least once and nothing is pending
    Completed,
}

/// An algorithm instance placed in the pipeline
pub struct Node {
    id: NodeId,
    algorithm: Arc<dyn Algorithm>,
    metadata: AlgorithmMetadata,
    inputs: Vec<Port>,
    outputs: Vec<Port>,
    options: OptionValues,
    preserve_results: bool,
    position: (f64, f64),
    queues: Mutex<Vec<VecDeque<ResultRef>>>,
    held: Mutex<HashMap<ResultId, usize>>,
    history: Mutex<Vec<HistoryEntry>>,
    scheduled: AtomicUsize,
    running: AtomicUsize,
    completed: AtomicU64,
}

impl Node {
    fn new(id: NodeId, algorithm: Arc<dyn Algorithm>) -> Self {
        let metadata = algorithm.metadata();
        let make_ports = |direction: PortDirection, declared: &[PortMetadata]| {
            declared
                .iter()
                .enumerate()
                .map(|(index, p)| Port {
                    node: id,
                    direction,
                    index,
                    id: p.id.clone(),
                    label: p.label.clone(),
                    compatible: p.compatible.clone(),
                })
                .collect::<Vec<_>>()
        };
        let inputs = make_ports(PortDirection::Input, &metadata.inputs);
        let outputs = make_ports(PortDirection::Output, &metadata.outputs);
        let options = OptionValues::from_specs(&metadata.options);
        let queues = Mutex::new(vec![VecDeque::new(); inputs.len()]);

        Self {
            id,
            algorithm,
            metadata,
            inputs,
            outputs,
            options,
            preserve_results: false,
            position: (0.0, 0.0),
            queues,
            held: Mutex::new(HashMap::new()),
            history: Mutex::new(Vec::new()),
            scheduled: AtomicUsize::new(0),
            running: AtomicUsize::new(0),
            completed: AtomicU64::new(0),
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn algorithm(&self) -> Arc<dyn Algorithm> {
        Arc::clone(&self.algorithm)
    }

    pub fn metadata(&self) -> &AlgorithmMetadata {
        &self.metadata
    }

    pub fn type_id(&self) -> &str {
        &self.metadata.type_id
    }

    pub fn inputs(&self) -> &[Port] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[Port] {
        &self.outputs
    }

    /// Look up a port of this node by direction and index
    pub fn port(&self, direction: PortDirection, index: usize) -> Result<&Port> {
        let ports = match direction {
            PortDirection::Input => &self.inputs,
            PortDirection::Output => &self.outputs,
        };
        ports.get(index).ok_or(PipelineError::PortOutOfRange {
            node: self.id,
            direction,
            index,
        })
    }

    pub fn options(&self) -> &OptionValues {
        &self.options
    }

    pub fn preserve_results(&self) -> bool {
        self.preserve_results
    }

    pub fn position(&self) -> (f64, f64) {
        self.position
    }

    /// True when the node produces features and its Results are retained
    pub fn is_terminal(&self) -> bool {
        self.outputs.iter().any(|p| p.compatible.is_terminal())
    }

    /// True iff every input queue is non-empty.
    ///
    /// A node without inputs is always ready; it runs when triggered.
    pub fn is_ready(&self) -> bool {
        self.queues.lock().iter().all(|q| !q.is_empty())
    }

    /// Pull one Result from every input queue, or nothing if any is empty.
    pub fn dequeue_inputs(&self) -> Option<Vec<ResultRef>> {
        let mut queues = self.queues.lock();
        if queues.iter().any(|q| q.is_empty()) {
            return None;
        }
        Some(queues.iter_mut().filter_map(|q| q.pop_front()).collect())
    }

    /// Append a Result to an input queue
    pub(crate) fn enqueue(&self, port: usize, result: ResultRef) -> Result<()> {
        let mut queues = self.queues.lock();
        let queue = queues.get_mut(port).ok_or(PipelineError::PortOutOfRange {
            node: self.id,
            direction: PortDirection::Input,
            index: port,
        })?;
        *self.held.lock().entry(result.id()).or_insert(0) += 1;
        queue.push_back(result);
        Ok(())
    }

    /// True while any copy of `result` is queued here or being consumed
    pub fn holds(&self, result: &ResultRef) -> bool {
        self.held.lock().contains_key(&result.id())
    }

    /// Give back one copy of `result` taken from this node's queues.
    ///
    /// Returns true when it was the last copy the node held, i.e. when the
    /// Result may now be finished on this node's behalf.
    pub(crate) fn release(&self, result: &ResultRef) -> bool {
        let mut held = self.held.lock();
        match held.get_mut(&result.id()) {
            Some(count) if *count > 1 => {
                *count -= 1;
                false
            }
            Some(_) => {
                held.remove(&result.id());
                true
            }
            None => true,
        }
    }

    /// Snapshot of the Results pending at one input port
    pub fn queued(&self, port: usize) -> Vec<ResultRef> {
        self.queues
            .lock()
            .get(port)
            .map(|q| q.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Pending Results per input port
    pub fn queue_lengths(&self) -> Vec<usize> {
        self.queues.lock().iter().map(VecDeque::len).collect()
    }

    /// Empty every input queue.
    ///
    /// Returns how many copies were dropped and the Results this node no
    /// longer holds at all, which the caller finishes.
    pub(crate) fn drain_queues(&self) -> (usize, Vec<ResultRef>) {
        let drained: Vec<ResultRef> = {
            let mut queues = self.queues.lock();
            queues.iter_mut().flat_map(|q| q.drain(..)).collect()
        };
        let count = drained.len();
        let released = drained.into_iter().filter(|r| self.release(r)).collect();
        (count, released)
    }

    /// Snapshot of the retained history
    pub fn history(&self) -> Vec<HistoryEntry> {
        self.history.lock().clone()
    }

    pub(crate) fn push_history(&self, entry: HistoryEntry) {
        self.history.lock().push(entry);
    }

    pub(crate) fn take_history(&self) -> Vec<HistoryEntry> {
        std::mem::take(&mut *self.history.lock())
    }

    pub fn state(&self) -> NodeState {
        if self.running.load(Ordering::SeqCst) > 0 {
            NodeState::Running
        } else if self.scheduled.load(Ordering::SeqCst) > 0 {
            NodeState::Scheduled
        } else if !self.inputs.is_empty() && self.is_ready() {
            NodeState::Ready
        } else if self.completed.load(Ordering::SeqCst) > 0 {
            NodeState::Completed
        } else {
            NodeState::Idle
        }
    }

    /// Number of finished invocations
    pub fn completed_invocations(&self) -> u64 {
        self.completed.load(Ordering::SeqCst)
    }

    pub(crate) fn mark_scheduled(&self) {
        self.scheduled.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn mark_running(&self) {
        self.running.fetch_add(1, Ordering::SeqCst);
        self.scheduled.fetch_sub(1, Ordering::SeqCst);
    }

    pub(crate) fn mark_skipped(&self) {
        self.scheduled.fetch_sub(1, Ordering::SeqCst);
    }

    pub(crate) fn mark_finished(&self) {
        self.completed.fetch_add(1, Ordering::SeqCst);
        self.running.fetch_sub(1, Ordering::SeqCst);
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("type_id", &self.metadata.type_id)
            .field("inputs", &self.inputs.len())
            .field("outputs", &self.outputs.len())
            .field("preserve_results", &self.preserve_results)
            .finish()
    }
}

/// The dataflow graph: a node arena and its edges
#[derive(Debug, Default)]
pub struct Pipeline {
    nodes: Vec<Option<Node>>,
    edges: Vec<Edge>,
    next_edge: u64,
    next_node: u32,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Place an algorithm instance; ports are fixed from its declaration.
    pub fn add_node(&mut self, algorithm: Arc<dyn Algorithm>) -> NodeId {
        let id = NodeId(self.next_node);
        self.next_node += 1;
        let node = Node::new(id, algorithm);
        log::debug!("Added node {} ({})", id, node.type_id());
        if self.nodes.len() <= id.index() {
            self.nodes.resize_with(id.index() + 1, || None);
        }
        self.nodes[id.index()] = Some(node);
        id
    }

    /// Handle the next [`add_node`](Self::add_node) will issue
    pub fn next_node_id(&self) -> NodeId {
        NodeId(self.next_node)
    }

    /// Never issue a handle below `next`, so handles of removed nodes
    /// stay retired across save and load.
    pub(crate) fn retire_node_ids(&mut self, next: NodeId) {
        self.next_node = self.next_node.max(next.0);
    }

    /// Place a node at a specific handle, used when loading a saved graph.
    ///
    /// Fails if the handle is already taken.
    pub(crate) fn insert_node(&mut self, id: NodeId, algorithm: Arc<dyn Algorithm>) -> Result<()> {
        let index = id.index();
        if self.nodes.len() <= index {
            self.nodes.resize_with(index + 1, || None);
        }
        if self.nodes[index].is_some() {
            return Err(PipelineError::DuplicateNode(id));
        }
        self.nodes[index] = Some(Node::new(id, algorithm));
        self.next_node = self.next_node.max(id.0 + 1);
        Ok(())
    }

    /// Remove a node and every edge touching it.
    ///
    /// Results still queued at the node are finished on its behalf unless an
    /// invocation of the node is still consuming another copy.
    pub fn remove_node(&mut self, id: NodeId) -> Result<()> {
        let slot = self
            .nodes
            .get_mut(id.index())
            .ok_or(PipelineError::UnknownNode(id))?;
        let node = slot.take().ok_or(PipelineError::UnknownNode(id))?;

        self.edges
            .retain(|e| e.source.node != id && e.target.node != id);

        let (_, released) = node.drain_queues();
        for result in released {
            result.finish(id);
        }
        log::debug!("Removed node {} ({})", id, node.type_id());
        Ok(())
    }

    pub fn node(&self, id: NodeId) -> Result<&Node> {
        self.nodes
            .get(id.index())
            .and_then(Option::as_ref)
            .ok_or(PipelineError::UnknownNode(id))
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut Node> {
        self.nodes
            .get_mut(id.index())
            .and_then(Option::as_mut)
            .ok_or(PipelineError::UnknownNode(id))
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.node(id).is_ok()
    }

    /// Live nodes in handle order
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter().filter_map(Option::as_ref)
    }

    pub fn node_ids(&self) -> Vec<NodeId> {
        self.nodes().map(Node::id).collect()
    }

    pub fn node_count(&self) -> usize {
        self.nodes().count()
    }

    /// Nodes without inputs, the natural execution roots
    pub fn roots(&self) -> Vec<NodeId> {
        self.nodes()
            .filter(|n| n.inputs().is_empty())
            .map(Node::id)
            .collect()
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn edge(&self, id: EdgeId) -> Option<&Edge> {
        self.edges.iter().find(|e| e.id == id)
    }

    /// Edges leaving any output port of `node`
    pub fn edges_from(&self, node: NodeId) -> impl Iterator<Item = &Edge> + '_ {
        self.edges.iter().filter(move |e| e.source.node == node)
    }

    /// Edges arriving at any input port of `node`
    pub fn edges_into(&self, node: NodeId) -> impl Iterator<Item = &Edge> + '_ {
        self.edges.iter().filter(move |e| e.target.node == node)
    }

    /// Edges leaving one output port
    pub fn edges_from_port(&self, port: PortRef) -> impl Iterator<Item = &Edge> + '_ {
        self.edges.iter().filter(move |e| e.source == port)
    }

    /// Number of edges attached to a port
    pub fn edge_count(&self, port: PortRef) -> usize {
        self.edges
            .iter()
            .filter(|e| e.source == port || e.target == port)
            .count()
    }

    /// Add an edge after validating direction, endpoints and compatibility.
    pub fn connect(&mut self, source: PortRef, target: PortRef) -> Result<EdgeId> {
        if source.direction != PortDirection::Output {
            return Err(PipelineError::InputAsSource {
                node: source.node,
                index: source.index,
            });
        }
        if target.direction != PortDirection::Input {
            return Err(PipelineError::OutputAsTarget {
                node: target.node,
                index: target.index,
            });
        }
        if source.node == target.node {
            return Err(PipelineError::SelfLoop(source.node));
        }

        let source_port = self.node(source.node)?.port(source.direction, source.index)?;
        let target_port = self.node(target.node)?.port(target.direction, target.index)?;

        if self.edges.iter().any(|e| e.source == source && e.target == target) {
            return Err(PipelineError::DuplicateEdge {
                source_node: source.node,
                source_port: source.index,
                target_node: target.node,
                target_port: target.index,
            });
        }

        let source_ctx = PortContext {
            node: source.node,
            direction: source.direction,
            index: source.index,
            compatible: &source_port.compatible,
            edge_count: self.edge_count(source),
        };
        let target_ctx = PortContext {
            node: target.node,
            direction: target.direction,
            index: target.index,
            compatible: &target_port.compatible,
            edge_count: self.edge_count(target),
        };

        match Compatible::matches(&source_ctx, &target_ctx) {
            MatchOutcome::Accepted => {}
            MatchOutcome::TypeMismatch => {
                return Err(PipelineError::TypeIncompatible {
                    source_type: source_port.compatible.port_type.to_string(),
                    target_type: target_port.compatible.port_type.to_string(),
                });
            }
            MatchOutcome::ConstraintFailed { node, constraint } => {
                return Err(PipelineError::ConstraintViolated { node, constraint });
            }
        }

        let id = EdgeId(self.next_edge);
        self.next_edge += 1;
        self.edges.push(Edge { id, source, target });
        log::debug!("Connected {} -> {}", source, target);
        Ok(id)
    }

    /// Remove an edge by id
    pub fn disconnect(&mut self, id: EdgeId) -> Result<Edge> {
        let pos = self
            .edges
            .iter()
            .position(|e| e.id == id)
            .ok_or_else(|| PipelineError::UnknownEdge(format!("{:?}", id)))?;
        let edge = self.edges.remove(pos);
        log::debug!("Disconnected {} -> {}", edge.source, edge.target);
        Ok(edge)
    }

    /// Remove the edge between two ports
    pub fn disconnect_ports(&mut self, source: PortRef, target: PortRef) -> Result<Edge> {
        let id = self
            .edges
            .iter()
            .find(|e| e.source == source && e.target == target)
            .map(|e| e.id)
            .ok_or_else(|| PipelineError::UnknownEdge(format!("{} -> {}", source, target)))?;
        self.disconnect(id)
    }

    /// Edit one option of a node, validated against its declaration
    pub fn set_option(&mut self, id: NodeId, name: &str, value: OptionValue) -> Result<()> {
        let node = self.node_mut(id)?;
        if !node.metadata.options.iter().any(|s| s.name == name) {
            return Err(PipelineError::UnknownOption {
                node: id,
                name: name.to_string(),
            });
        }
        node.options.set_checked(&node.metadata.options, name, value)
    }

    pub fn set_preserve(&mut self, id: NodeId, preserve: bool) -> Result<()> {
        self.node_mut(id)?.preserve_results = preserve;
        Ok(())
    }

    pub fn set_position(&mut self, id: NodeId, x: f64, y: f64) -> Result<()> {
        self.node_mut(id)?.position = (x, y);
        Ok(())
    }

    pub fn is_ready(&self, id: NodeId) -> Result<bool> {
        Ok(self.node(id)?.is_ready())
    }

    pub fn dequeue_inputs(&self, id: NodeId) -> Result<Option<Vec<ResultRef>>> {
        Ok(self.node(id)?.dequeue_inputs())
    }

    pub fn node_state(&self, id: NodeId) -> Result<NodeState> {
        Ok(self.node(id)?.state())
    }

    pub fn history(&self, id: NodeId) -> Result<Vec<HistoryEntry>> {
        Ok(self.node(id)?.history())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::{PipelineResult, ResultId};
    use crate::testing::{Increment, SingleSink, Source, Sum};
    use crate::types::Data;

    fn result(id: u64) -> ResultRef {
        Arc::new(PipelineResult::new(
            ResultId(id),
            None,
            Data::number(id as f64),
            Vec::new(),
            None,
            false,
        ))
    }

    #[test]
    fn test_ports_follow_declaration_order() {
        let mut pipeline = Pipeline::new();
        let sum = pipeline.add_node(Arc::new(Sum));
        let node = pipeline.node(sum).unwrap();

        let ids: Vec<_> = node.inputs().iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(node.inputs()[1].index, 1);
        assert_eq!(node.inputs()[1].node, sum);
        assert!(node.is_terminal());
    }

    #[test]
    fn test_second_edge_into_single_use_port_rejected() {
        let mut pipeline = Pipeline::new();
        let x = pipeline.add_node(Arc::new(Source));
        let x2 = pipeline.add_node(Arc::new(Source));
        let y = pipeline.add_node(Arc::new(SingleSink));

        pipeline
            .connect(PortRef::output(x, 0), PortRef::input(y, 0))
            .unwrap();
        let err = pipeline
            .connect(PortRef::output(x2, 0), PortRef::input(y, 0))
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::ConstraintViolated { node, .. } if node == y
        ));
        assert_eq!(pipeline.edges().len(), 1);

        // Removing the first edge frees the port again
        pipeline
            .disconnect_ports(PortRef::output(x, 0), PortRef::input(y, 0))
            .unwrap();
        pipeline
            .connect(PortRef::output(x2, 0), PortRef::input(y, 0))
            .unwrap();
    }

    #[test]
    fn test_connect_rejects_bad_endpoints() {
        let mut pipeline = Pipeline::new();
        let a = pipeline.add_node(Arc::new(Increment));
        let b = pipeline.add_node(Arc::new(Increment));

        assert!(matches!(
            pipeline.connect(PortRef::input(a, 0), PortRef::input(b, 0)),
            Err(PipelineError::InputAsSource { .. })
        ));
        assert!(matches!(
            pipeline.connect(PortRef::output(a, 0), PortRef::output(b, 0)),
            Err(PipelineError::OutputAsTarget { .. })
        ));
        assert!(matches!(
            pipeline.connect(PortRef::output(a, 0), PortRef::input(a, 0)),
            Err(PipelineError::SelfLoop(_))
        ));
        assert!(matches!(
            pipeline.connect(PortRef::output(a, 3), PortRef::input(b, 0)),
            Err(PipelineError::PortOutOfRange { .. })
        ));
        assert!(matches!(
            pipeline.connect(PortRef::output(a, 0), PortRef::input(NodeId(42), 0)),
            Err(PipelineError::UnknownNode(_))
        ));

        pipeline.connect(PortRef::output(a, 0), PortRef::input(b, 0)).unwrap();
        assert!(matches!(
            pipeline.connect(PortRef::output(a, 0), PortRef::input(b, 0)),
            Err(PipelineError::DuplicateEdge { .. })
        ));
    }

    #[test]
    fn test_type_mismatch_rejected() {
        let mut pipeline = Pipeline::new();
        let sum = pipeline.add_node(Arc::new(Sum));
        let inc = pipeline.add_node(Arc::new(Increment));

        let err = pipeline
            .connect(PortRef::output(sum, 0), PortRef::input(inc, 0))
            .unwrap_err();
        assert!(matches!(err, PipelineError::TypeIncompatible { .. }));
    }

    #[test]
    fn test_ready_requires_every_input() {
        let mut pipeline = Pipeline::new();
        let src = pipeline.add_node(Arc::new(Source));
        let sum = pipeline.add_node(Arc::new(Sum));

        // Zero-input node is always ready
        assert!(pipeline.is_ready(src).unwrap());
        assert!(!pipeline.is_ready(sum).unwrap());

        let node = pipeline.node(sum).unwrap();
        node.enqueue(0, result(1)).unwrap();
        assert!(!node.is_ready());
        assert!(node.dequeue_inputs().is_none());
        assert_eq!(node.queue_lengths(), vec![1, 0]);

        node.enqueue(1, result(2)).unwrap();
        assert!(node.is_ready());
        assert_eq!(node.state(), NodeState::Ready);
    }

    #[test]
    fn test_dequeue_is_fifo_per_port() {
        let mut pipeline = Pipeline::new();
        let sum = pipeline.add_node(Arc::new(Sum));
        let node = pipeline.node(sum).unwrap();

        node.enqueue(0, result(1)).unwrap();
        node.enqueue(0, result(2)).unwrap();
        node.enqueue(1, result(3)).unwrap();

        let tuple = node.dequeue_inputs().unwrap();
        let ids: Vec<_> = tuple.iter().map(|r| r.id()).collect();
        assert_eq!(ids, vec![ResultId(1), ResultId(3)]);
        assert!(node.dequeue_inputs().is_none());
        assert_eq!(node.queue_lengths(), vec![1, 0]);
    }

    #[test]
    fn test_remove_node_drops_edges_and_finishes_queue() {
        let mut pipeline = Pipeline::new();
        let src = pipeline.add_node(Arc::new(Source));
        let inc = pipeline.add_node(Arc::new(Increment));
        pipeline.connect(PortRef::output(src, 0), PortRef::input(inc, 0)).unwrap();

        let pending = result(7);
        pending.used(inc);
        pipeline.node(inc).unwrap().enqueue(0, Arc::clone(&pending)).unwrap();

        pipeline.remove_node(inc).unwrap();
        assert!(pipeline.edges().is_empty());
        assert!(pending.is_disposed());
        assert!(!pipeline.contains(inc));

        // Handles are not reused
        let next = pipeline.add_node(Arc::new(Increment));
        assert_ne!(next, inc);
        assert!(matches!(pipeline.remove_node(inc), Err(PipelineError::UnknownNode(_))));
    }

    #[test]
    fn test_set_option_validates() {
        let mut pipeline = Pipeline::new();
        let src = pipeline.add_node(Arc::new(Source));

        pipeline.set_option(src, "value", OptionValue::Number(5.0)).unwrap();
        assert_eq!(pipeline.node(src).unwrap().options().number("value"), Some(5.0));

        assert!(matches!(
            pipeline.set_option(src, "value", OptionValue::Number(5000.0)),
            Err(PipelineError::InvalidOption { .. })
        ));
        assert!(matches!(
            pipeline.set_option(src, "nope", OptionValue::Boolean(true)),
            Err(PipelineError::UnknownOption { .. })
        ));
    }

    #[test]
    fn test_insert_node_keeps_handles() {
        let mut pipeline = Pipeline::new();
        pipeline.insert_node(NodeId(3), Arc::new(Source)).unwrap();
        assert_eq!(pipeline.node_ids(), vec![NodeId(3)]);
        assert!(pipeline.insert_node(NodeId(3), Arc::new(Source)).is_err());

        let next = pipeline.add_node(Arc::new(Source));
        assert_eq!(next, NodeId(4));
    }

    #[test]
    fn test_removed_tail_handle_not_reissued() {
        let mut pipeline = Pipeline::new();
        let first = pipeline.add_node(Arc::new(Source));
        let tail = pipeline.add_node(Arc::new(Source));
        pipeline.remove_node(tail).unwrap();
        assert_eq!(pipeline.next_node_id(), NodeId(2));

        pipeline.retire_node_ids(NodeId(1));
        let next = pipeline.add_node(Arc::new(Source));
        assert_eq!(next, NodeId(2));
        assert_eq!(pipeline.node_ids(), vec![first, next]);
    }

    #[test]
    fn test_release_counts_copies_per_result() {
        let mut pipeline = Pipeline::new();
        let sum = pipeline.add_node(Arc::new(Sum));
        let node = pipeline.node(sum).unwrap();

        // One Result reaching both ports
        let shared = result(5);
        node.enqueue(0, Arc::clone(&shared)).unwrap();
        node.enqueue(1, Arc::clone(&shared)).unwrap();
        assert!(node.holds(&shared));

        let tuple = node.dequeue_inputs().unwrap();
        assert!(node.holds(&shared));
        assert!(!node.release(&tuple[0]));
        assert!(node.release(&tuple[1]));
        assert!(!node.holds(&shared));

        // Unknown Results are not held, so they may be finished
        assert!(node.release(&result(6)));
    }

    #[test]
    fn test_drain_keeps_copy_still_in_flight() {
        let mut pipeline = Pipeline::new();
        let sum = pipeline.add_node(Arc::new(Sum));
        let node = pipeline.node(sum).unwrap();

        let shared = result(1);
        let other = result(2);
        node.enqueue(0, Arc::clone(&other)).unwrap();
        node.enqueue(0, Arc::clone(&shared)).unwrap();
        node.enqueue(1, Arc::clone(&shared)).unwrap();

        // Takes `other` and one copy of `shared`
        let in_flight = node.dequeue_inputs().unwrap();
        assert!(Arc::ptr_eq(&in_flight[1], &shared));

        let (count, released) = node.drain_queues();
        assert_eq!(count, 1);
        assert!(released.is_empty());
        assert!(node.holds(&shared));

        assert!(node.release(&in_flight[0]));
        assert!(node.release(&in_flight[1]));
        assert!(!node.holds(&shared));
    }
}
