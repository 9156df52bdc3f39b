//! Algorithm contract
//!
//! Every analysis plugin implements [`Algorithm`]. The engine depends only
//! on this trait: the declared port lists (which fix a node's port order),
//! the option declarations, the requested side channels, and `run`.
//!
//! `run` receives a [`RunContext`] through which it can stream extra
//! output tuples (`yield_outputs`) and report progress while it is still
//! executing. Both are routed by the scheduler; the algorithm never talks
//! to the graph directly.

use serde::{Deserialize, Serialize};

use crate::cancel::CancellationToken;
use crate::compatible::Compatible;
use crate::error::{AlgorithmError, InvocationError};
use crate::options::{OptionSpec, OptionValues};
use crate::side_channel::{SideChannel, SideChannelData};
use crate::types::{Data, InvocationId, NodeId};

/// Category of an algorithm, used for palette grouping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlgorithmCategory {
    /// Brings scans into the pipeline
    Importer,
    /// Image to image transforms, windowing, masking
    Filter,
    /// Produces features
    FeatureExtractor,
    /// Consumes features for display or export
    Output,
}

/// Declaration of one port on an algorithm
#[derive(Debug, Clone)]
pub struct PortMetadata {
    /// Port identifier, unique per direction within the algorithm
    pub id: String,
    /// Human-readable label
    pub label: String,
    pub compatible: Compatible,
}

impl PortMetadata {
    pub fn new(id: impl Into<String>, label: impl Into<String>, compatible: Compatible) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            compatible,
        }
    }
}

/// Complete static description of an algorithm type
#[derive(Debug, Clone)]
pub struct AlgorithmMetadata {
    /// Unique type identifier (e.g. "first-order-statistics")
    pub type_id: String,
    pub category: AlgorithmCategory,
    pub label: String,
    pub description: String,
    /// Ordered input ports
    pub inputs: Vec<PortMetadata>,
    /// Ordered output ports
    pub outputs: Vec<PortMetadata>,
    pub options: Vec<OptionSpec>,
    pub side_channels: Vec<SideChannel>,
}

impl AlgorithmMetadata {
    pub fn new(type_id: impl Into<String>, category: AlgorithmCategory, label: impl Into<String>) -> Self {
        Self {
            type_id: type_id.into(),
            category,
            label: label.into(),
            description: String::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            options: Vec::new(),
            side_channels: Vec::new(),
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn input(mut self, port: PortMetadata) -> Self {
        self.inputs.push(port);
        self
    }

    pub fn output(mut self, port: PortMetadata) -> Self {
        self.outputs.push(port);
        self
    }

    pub fn option(mut self, spec: OptionSpec) -> Self {
        self.options.push(spec);
        self
    }

    pub fn side_channel(mut self, kind: SideChannel) -> Self {
        self.side_channels.push(kind);
        self
    }

    /// True if any output port carries features
    pub fn produces_features(&self) -> bool {
        self.outputs.iter().any(|p| p.compatible.is_terminal())
    }
}

/// Output of one `run` call.
///
/// `Some(outputs)` must hold exactly one item per declared output port.
/// `None` means "nothing more": used by algorithms that already streamed
/// everything through `yield_outputs`.
pub type RunOutput = Option<Vec<Data>>;

/// The contract every analysis plugin implements.
///
/// `run` is synchronous and may be called concurrently for different
/// input tuples of the same node.
pub trait Algorithm: Send + Sync {
    /// Static description; queried once when a node is created.
    fn metadata(&self) -> AlgorithmMetadata;

    /// Process one input tuple (one item per declared input port, in order).
    fn run(&self, ctx: &mut RunContext<'_>, inputs: &[Data]) -> Result<RunOutput, AlgorithmError>;
}

/// Receiver for out-of-band signals from a running invocation.
///
/// Implemented by the scheduler; a test double can implement it to run
/// an algorithm in isolation.
pub trait InvocationEmitter: Send + Sync {
    /// Route one yielded output tuple tagged with `sequence`.
    fn emit_yield(&self, sequence: u64, outputs: Vec<Data>) -> Result<(), InvocationError>;

    /// Advisory progress report in percent.
    fn emit_progress(&self, percent: f32);
}

/// Per-invocation context passed to [`Algorithm::run`].
pub struct RunContext<'a> {
    node: NodeId,
    invocation: InvocationId,
    options: &'a OptionValues,
    side_channels: &'a SideChannelData,
    emitter: &'a dyn InvocationEmitter,
    cancel: &'a CancellationToken,
    next_sequence: u64,
}

impl<'a> RunContext<'a> {
    pub fn new(
        node: NodeId,
        invocation: InvocationId,
        options: &'a OptionValues,
        side_channels: &'a SideChannelData,
        emitter: &'a dyn InvocationEmitter,
        cancel: &'a CancellationToken,
    ) -> Self {
        Self {
            node,
            invocation,
            options,
            side_channels,
            emitter,
            cancel,
            next_sequence: 0,
        }
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn invocation(&self) -> InvocationId {
        self.invocation
    }

    pub fn options(&self) -> &OptionValues {
        self.options
    }

    pub fn side_channels(&self) -> &SideChannelData {
        self.side_channels
    }

    /// Typed access to a requested side channel
    pub fn side_channel<T: Send + Sync + 'static>(&self, kind: SideChannel) -> Result<&T, AlgorithmError> {
        self.side_channels
            .get::<T>(kind)
            .ok_or_else(|| AlgorithmError::MissingSideChannel(kind.to_string()))
    }

    /// Cooperative cancellation check for long-running algorithms
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Emit one extra output tuple before `run` returns.
    ///
    /// Returns the sequence id assigned to the tuple. Sequence ids start at
    /// zero and increase by one per yield within this invocation.
    pub fn yield_outputs(&mut self, outputs: Vec<Data>) -> Result<u64, InvocationError> {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.emitter.emit_yield(sequence, outputs)?;
        Ok(sequence)
    }

    /// Number of tuples yielded so far
    pub fn yielded(&self) -> u64 {
        self.next_sequence
    }

    /// Report progress (clamped to 0..=100)
    pub fn progress(&self, percent: f32) {
        self.emitter.emit_progress(percent.clamp(0.0, 100.0));
    }
}
