//! Pipeline scheduler
//!
//! Drives node execution over a [`Pipeline`]:
//!
//! 1. `start` resolves the node's side channels and submits one
//!    invocation to the [`PriorityExecutor`].
//! 2. The invocation checks cancellation, reports progress, and calls
//!    [`Algorithm::run`] with panics caught at this boundary.
//! 3. The completion continuation always finishes the consumed inputs,
//!    then wraps any outputs as Results and fans them out.
//! 4. Fan-out marks each Result used by every distinct destination node,
//!    pushes it into the destination queues, and starts every destination
//!    that became ready at one priority band lower.
//!
//! Yielded tuples take the same fan-out path while `run` is still in
//! progress. Cancellation is cooperative: it is checked before every `run`
//! and every recursive start, and a cancelled invocation's outputs are
//! dropped without being scheduled further. Each execution runs under a
//! child of one scheduler-wide token, so `cancel` reaches every execution
//! still in flight, not only the newest.

use std::collections::BTreeSet;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::cancel::CancellationToken;
use crate::config::SchedulerConfig;
use crate::contract::{Algorithm, InvocationEmitter, RunContext, RunOutput};
use crate::error::{AlgorithmError, InvocationError, PipelineError, Result};
use crate::events::{EventSink, PipelineEvent};
use crate::executor::{ExecutorHandle, PriorityExecutor};
use crate::graph::{HistoryEntry, Node, Pipeline};
use crate::options::OptionValues;
use crate::result::{PipelineResult, ResultId, ResultRef};
use crate::side_channel::{SideChannel, SideChannelSources};
use crate::types::{Data, InvocationId, NodeId, PayloadType, PortDirection, PortRef};

/// Shared handle to a pipeline that the scheduler and the editor both use
pub type SharedPipeline = Arc<RwLock<Pipeline>>;

struct Execution {
    id: String,
    /// Parent of every execution token issued since the last cancel
    root: CancellationToken,
    /// Token of the newest execution
    token: CancellationToken,
}

impl Execution {
    fn new() -> Self {
        let root = CancellationToken::new();
        let token = root.child();
        Self {
            id: String::new(),
            root,
            token,
        }
    }
}

struct SchedulerInner {
    pipeline: SharedPipeline,
    executor: ExecutorHandle,
    events: Arc<dyn EventSink>,
    side_channels: RwLock<SideChannelSources>,
    execution: Mutex<Execution>,
    next_result: AtomicU64,
    next_invocation: AtomicU64,
    base_priority: i32,
}

/// Concurrent, priority-ordered executor of pipeline nodes.
pub struct Scheduler {
    inner: Arc<SchedulerInner>,
    executor: PriorityExecutor,
}

impl Scheduler {
    pub fn new(pipeline: SharedPipeline, config: SchedulerConfig, events: Arc<dyn EventSink>) -> Result<Self> {
        let executor = PriorityExecutor::new(config.resolved_worker_threads(), &config.thread_name_prefix)?;
        let inner = Arc::new(SchedulerInner {
            pipeline,
            executor: executor.handle(),
            events,
            side_channels: RwLock::new(SideChannelSources::new()),
            execution: Mutex::new(Execution::new()),
            next_result: AtomicU64::new(0),
            next_invocation: AtomicU64::new(0),
            base_priority: config.base_priority,
        });
        Ok(Self { inner, executor })
    }

    pub fn pipeline(&self) -> SharedPipeline {
        Arc::clone(&self.inner.pipeline)
    }

    /// Replace every host-provided side channel
    pub fn set_side_channels(&self, sources: SideChannelSources) {
        *self.inner.side_channels.write() = sources;
    }

    /// Register (or replace) one host-provided side channel
    pub fn set_side_channel<T: Send + Sync + 'static>(&self, kind: SideChannel, value: Arc<T>) {
        self.inner.side_channels.write().set(kind, value);
    }

    /// Trigger `roots` under a fresh child cancellation token.
    ///
    /// A root without inputs runs once. A root with inputs runs once per
    /// complete input tuple already waiting in its queues. Returns the
    /// execution id.
    pub fn execute(&self, roots: &[NodeId]) -> Result<String> {
        let execution_id = uuid::Uuid::new_v4().to_string();
        let token = {
            let mut execution = self.inner.execution.lock();
            execution.id = execution_id.clone();
            execution.token = execution.root.child();
            execution.token.clone()
        };

        let mut starts = Vec::new();
        {
            let pipeline = self.inner.pipeline.read();
            for root in roots {
                let node = pipeline.node(*root)?;
                if node.inputs().is_empty() {
                    starts.push((*root, Vec::new()));
                } else {
                    while let Some(inputs) = node.dequeue_inputs() {
                        starts.push((*root, inputs));
                    }
                }
            }
        }

        log::info!("Execution {} started with {} root(s)", execution_id, roots.len());
        self.inner.emit(PipelineEvent::ExecutionStarted {
            execution_id: execution_id.clone(),
            roots: roots.to_vec(),
        });

        for (node, inputs) in starts {
            SchedulerInner::start(&self.inner, node, inputs, self.inner.base_priority, &token);
        }
        Ok(execution_id)
    }

    /// Request cooperative cancellation of every execution in flight.
    ///
    /// Executions started afterwards get a fresh parent and are unaffected.
    pub fn cancel(&self) {
        let execution_id = {
            let mut execution = self.inner.execution.lock();
            execution.root.cancel();
            execution.root = CancellationToken::new();
            execution.id.clone()
        };
        log::info!("Execution {} cancelled", execution_id);
        self.inner.emit(PipelineEvent::ExecutionCancelled { execution_id });
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.current_token().is_cancelled()
    }

    /// Id of the most recent execution (empty before the first `execute`)
    pub fn execution_id(&self) -> String {
        self.inner.execution.lock().id.clone()
    }

    /// Push an externally produced datum into an input queue.
    ///
    /// The node is started for every input tuple that became complete,
    /// unless the current execution is cancelled.
    pub fn inject(&self, node: NodeId, port: usize, data: Data) -> Result<ResultRef> {
        let token = self.inner.current_token();
        let mut starts = Vec::new();
        let result = {
            let pipeline = self.inner.pipeline.read();
            let target = pipeline.node(node)?;
            let declared = target.port(PortDirection::Input, port)?.compatible.port_type;
            if !PayloadType::Kind(data.kind()).accepts(&declared.unwrap_stream()) {
                return Err(PipelineError::TypeIncompatible {
                    source_type: format!("{:?}", data.kind()),
                    target_type: declared.to_string(),
                });
            }

            let result = Arc::new(PipelineResult::new(
                self.inner.next_result_id(),
                None,
                data,
                Vec::new(),
                None,
                false,
            ));
            result.used(node);
            target.enqueue(port, Arc::clone(&result))?;

            while !token.is_cancelled() {
                match target.dequeue_inputs() {
                    Some(inputs) => starts.push(inputs),
                    None => break,
                }
            }
            result
        };
        self.inner.emit(PipelineEvent::QueueRedraw);

        for inputs in starts {
            SchedulerInner::start(&self.inner, node, inputs, self.inner.base_priority, &token);
        }
        Ok(result)
    }

    /// Block until no invocation is queued or running.
    pub fn wait(&self) {
        self.executor.wait_idle();
    }

    /// Drain every input queue and finish the drained Results.
    ///
    /// A Result still being consumed by a running invocation of the same
    /// node is finished when that invocation completes instead. Returns the
    /// number of queued copies removed.
    pub fn reset_queues(&self) -> usize {
        let pipeline = self.inner.pipeline.read();
        let mut drained = 0;
        for node in pipeline.nodes() {
            let (count, released) = node.drain_queues();
            for result in released {
                result.finish(node.id());
            }
            drained += count;
        }
        drop(pipeline);
        log::debug!("Reset queues, {} pending Result(s) finished", drained);
        self.inner.emit(PipelineEvent::QueueRedraw);
        drained
    }

    /// Retained `(outputs, inputs)` tuples of a node
    pub fn history(&self, node: NodeId) -> Result<Vec<HistoryEntry>> {
        self.inner.pipeline.read().history(node)
    }

    /// Release a node's retained history for disposal.
    ///
    /// Clears the history and drops the preserve flag of every retained
    /// output; each is disposed as soon as no consumer holds it. Returns
    /// the number of Results released.
    pub fn release_history(&self, node: NodeId) -> Result<usize> {
        let entries = self.inner.pipeline.read().node(node)?.take_history();
        let mut released = 0;
        for entry in &entries {
            for result in &entry.outputs {
                result.release();
                released += 1;
            }
        }
        log::debug!("Released {} retained Result(s) of node {}", released, node);
        self.inner.emit(PipelineEvent::QueueRedraw);
        Ok(released)
    }

    pub fn worker_count(&self) -> usize {
        self.executor.worker_count()
    }
}

/// Everything an invocation needs, captured under the read lock
struct NodeSnapshot {
    type_id: String,
    algorithm: Arc<dyn Algorithm>,
    options: OptionValues,
    side_channels: Vec<SideChannel>,
    output_count: usize,
    retain: bool,
}

impl NodeSnapshot {
    fn capture(node: &Node) -> Self {
        Self {
            type_id: node.type_id().to_string(),
            algorithm: node.algorithm(),
            options: node.options().clone(),
            side_channels: node.metadata().side_channels.clone(),
            output_count: node.outputs().len(),
            retain: node.preserve_results() || node.is_terminal(),
        }
    }
}

impl SchedulerInner {
    fn emit(&self, event: PipelineEvent) {
        if let Err(e) = self.events.send(event) {
            log::warn!("Failed to deliver pipeline event: {}", e);
        }
    }

    fn current_token(&self) -> CancellationToken {
        self.execution.lock().token.clone()
    }

    fn next_result_id(&self) -> ResultId {
        ResultId(self.next_result.fetch_add(1, Ordering::SeqCst))
    }

    fn with_node<R>(&self, id: NodeId, f: impl FnOnce(&Node) -> R) -> Option<R> {
        let pipeline = self.pipeline.read();
        pipeline.node(id).ok().map(f)
    }

    /// Hand the consumed copies back to `node`, finishing each Result the
    /// node no longer holds anywhere in its queues.
    fn finish_inputs(&self, node: NodeId, inputs: &[ResultRef]) {
        let pipeline = self.pipeline.read();
        let target = pipeline.node(node).ok();
        for input in inputs {
            let last = match target {
                Some(n) => n.release(input),
                None => true,
            };
            if last {
                input.finish(node);
            }
        }
    }

    /// Submit one invocation of `node` over `inputs` at `priority`.
    fn start(
        inner: &Arc<Self>,
        node: NodeId,
        inputs: Vec<ResultRef>,
        priority: i32,
        token: &CancellationToken,
    ) {
        if token.is_cancelled() {
            inner.finish_inputs(node, &inputs);
            inner.emit(PipelineEvent::NodeCancelled { node });
            return;
        }

        let snapshot = inner.with_node(node, |n| {
            n.mark_scheduled();
            NodeSnapshot::capture(n)
        });
        let Some(snapshot) = snapshot else {
            log::warn!("Node {} was removed before it could start", node);
            inner.finish_inputs(node, &inputs);
            return;
        };

        inner.emit(PipelineEvent::NodeScheduled { node, priority });

        let pending = inputs.clone();
        let job_inner = Arc::clone(inner);
        let job_token = token.clone();
        let submitted = inner.executor.submit(priority, move || {
            Self::invoke(&job_inner, node, snapshot, inputs, priority, &job_token);
        });
        if let Err(rejected) = submitted {
            drop(rejected);
            log::warn!("Executor shut down; node {} not started", node);
            inner.with_node(node, Node::mark_skipped);
            inner.finish_inputs(node, &pending);
        }
    }

    /// Work body and completion continuation of one invocation
    fn invoke(
        inner: &Arc<Self>,
        node: NodeId,
        snapshot: NodeSnapshot,
        inputs: Vec<ResultRef>,
        priority: i32,
        token: &CancellationToken,
    ) {
        if token.is_cancelled() {
            inner.with_node(node, Node::mark_skipped);
            inner.finish_inputs(node, &inputs);
            log::debug!("Node {} ({}) skipped after cancellation", node, snapshot.type_id);
            inner.emit(PipelineEvent::NodeCancelled { node });
            return;
        }

        inner.with_node(node, Node::mark_running);
        let invocation = InvocationId(inner.next_invocation.fetch_add(1, Ordering::SeqCst));
        inner.emit(PipelineEvent::NodeStarted { node, invocation });

        let scope = InvocationScope {
            inner: Arc::clone(inner),
            node,
            invocation,
            inputs,
            output_count: snapshot.output_count,
            retain: snapshot.retain,
            priority,
            token: token.clone(),
        };
        scope.emit_progress(0.0);

        let outcome = scope.run(&snapshot);

        scope.emit_progress(100.0);

        // Completion continuation: runs whatever `run` did
        inner.finish_inputs(node, &scope.inputs);

        let outcome = outcome.and_then(|outputs| match outputs {
            Some(outputs) if token.is_cancelled() => {
                drop(outputs);
                Err(InvocationError::Cancelled)
            }
            Some(outputs) => scope.publish(outputs, None),
            None => Ok(0),
        });

        inner.with_node(node, Node::mark_finished);
        match outcome {
            Ok(outputs) => {
                log::debug!("Node {} ({}) completed", node, snapshot.type_id);
                inner.emit(PipelineEvent::NodeCompleted {
                    node,
                    invocation,
                    outputs,
                });
            }
            Err(InvocationError::Cancelled) => {
                log::debug!("Node {} ({}) outputs discarded after cancellation", node, snapshot.type_id);
                inner.emit(PipelineEvent::NodeCancelled { node });
            }
            Err(e) => {
                log::error!("Node {} ({}) failed: {}", node, snapshot.type_id, e);
                inner.emit(PipelineEvent::NodeFailed {
                    node,
                    invocation,
                    error: e.to_string(),
                });
            }
        }
        inner.emit(PipelineEvent::QueueRedraw);
    }
}

/// Push `result` along every edge leaving `source`.
///
/// The Result is marked used once per distinct destination node before
/// any queue sees it, then enqueued once per edge. If nothing consumes it
/// and it is not preserved it is disposed right away. Returns the
/// destination nodes.
pub(crate) fn route(pipeline: &Pipeline, source: PortRef, result: &ResultRef) -> BTreeSet<NodeId> {
    let edges: Vec<_> = pipeline.edges_from_port(source).copied().collect();
    let destinations: BTreeSet<NodeId> = edges.iter().map(|e| e.target.node).collect();

    for dest in &destinations {
        result.used(*dest);
    }
    for edge in &edges {
        let enqueued = pipeline
            .node(edge.target.node)
            .and_then(|n| n.enqueue(edge.target.index, Arc::clone(result)));
        if let Err(e) = enqueued {
            log::error!("Failed to enqueue {} into {}: {}", result.id(), edge.target, e);
            let held = pipeline
                .node(edge.target.node)
                .is_ok_and(|n| n.holds(result));
            if !held {
                result.finish(edge.target.node);
            }
        }
    }
    result.dispose_if_unused();
    destinations
}

/// Per-invocation emitter and output router
struct InvocationScope {
    inner: Arc<SchedulerInner>,
    node: NodeId,
    invocation: InvocationId,
    inputs: Vec<ResultRef>,
    output_count: usize,
    retain: bool,
    priority: i32,
    token: CancellationToken,
}

impl InvocationScope {
    /// Call `run` with panics caught; `Err` means no output was produced.
    fn run(&self, snapshot: &NodeSnapshot) -> std::result::Result<RunOutput, InvocationError> {
        let data: Vec<Data> = self.inputs.iter().filter_map(|r| r.payload()).collect();
        if data.len() != self.inputs.len() {
            return Err(InvocationError::Failed("input Result already disposed".to_string()));
        }

        let side_channels = self.inner.side_channels.read().resolve(&snapshot.side_channels);
        let mut ctx = RunContext::new(
            self.node,
            self.invocation,
            &snapshot.options,
            &side_channels,
            self,
            &self.token,
        );

        let algorithm = &snapshot.algorithm;
        match panic::catch_unwind(AssertUnwindSafe(|| algorithm.run(&mut ctx, &data))) {
            Ok(Ok(outputs)) => Ok(outputs),
            Ok(Err(AlgorithmError::Cancelled)) => Err(InvocationError::Cancelled),
            Ok(Err(e)) => Err(e.into()),
            Err(payload) => Err(InvocationError::Panicked(panic_message(payload.as_ref()))),
        }
    }

    /// Wrap one output tuple as Results, retain it if needed, fan it out
    /// and start every destination that became ready.
    fn publish(&self, outputs: Vec<Data>, sequence: Option<u64>) -> std::result::Result<usize, InvocationError> {
        if outputs.len() != self.output_count {
            return Err(InvocationError::ArityMismatch {
                expected: self.output_count,
                actual: outputs.len(),
            });
        }
        if self.token.is_cancelled() {
            return Err(InvocationError::Cancelled);
        }

        let results: Vec<ResultRef> = outputs
            .into_iter()
            .enumerate()
            .map(|(index, data)| {
                Arc::new(PipelineResult::new(
                    self.inner.next_result_id(),
                    Some(PortRef::output(self.node, index)),
                    data,
                    self.inputs.clone(),
                    sequence,
                    self.retain,
                ))
            })
            .collect();
        let count = results.len();

        let mut starts = Vec::new();
        {
            let pipeline = self.inner.pipeline.read();
            if self.retain {
                if let Ok(node) = pipeline.node(self.node) {
                    node.push_history(HistoryEntry {
                        outputs: results.clone(),
                        inputs: self.inputs.clone(),
                        sequence,
                    });
                }
            }

            let mut destinations = BTreeSet::new();
            for (index, result) in results.iter().enumerate() {
                destinations.extend(route(&pipeline, PortRef::output(self.node, index), result));
            }

            'dest: for dest in destinations {
                let Ok(target) = pipeline.node(dest) else { continue };
                loop {
                    if self.token.is_cancelled() {
                        break 'dest;
                    }
                    match target.dequeue_inputs() {
                        Some(inputs) => starts.push((dest, inputs)),
                        None => break,
                    }
                }
            }
        }
        self.inner.emit(PipelineEvent::QueueRedraw);

        let child_priority = self.priority.saturating_sub(1);
        for (dest, inputs) in starts {
            SchedulerInner::start(&self.inner, dest, inputs, child_priority, &self.token);
        }
        Ok(count)
    }
}

impl InvocationEmitter for InvocationScope {
    fn emit_yield(&self, sequence: u64, outputs: Vec<Data>) -> std::result::Result<(), InvocationError> {
        self.publish(outputs, Some(sequence))?;
        self.inner.emit(PipelineEvent::NodeYielded {
            node: self.node,
            invocation: self.invocation,
            sequence,
        });
        Ok(())
    }

    fn emit_progress(&self, percent: f32) {
        self.inner
            .emit(PipelineEvent::node_progress(self.node, self.invocation, percent));
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
