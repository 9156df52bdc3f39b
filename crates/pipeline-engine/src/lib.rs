//! Pipeline Engine - dataflow execution core for texture-analysis pipelines
//!
//! Algorithm nodes are wired into a directed graph and executed over a
//! stream of scans. This crate provides:
//!
//! - Typed ports with connection constraints, checked at edge creation
//! - The [`Algorithm`] contract with streaming yields and progress reports
//! - Reference-counted Results with provenance and explicit preservation
//! - A priority-ordered scheduler on a fixed worker pool with cooperative
//!   cancellation
//! - JSON persistence and compressed undo/redo snapshots
//!
//! # Architecture
//!
//! - [`Pipeline`]: node arena, edges, and per-input FIFO queues
//! - [`Scheduler`]: starts ready nodes, fans out outputs, recurses
//! - [`PipelineResult`]: payload lifetime tied to its consumer set
//! - [`EventSink`]: progress and redraw notifications (not tied to any UI)
//!
//! # Example
//!
//! ```ignore
//! use pipeline_engine::{Pipeline, PortRef, Scheduler, SchedulerConfig, NullEventSink};
//!
//! let pipeline = Arc::new(RwLock::new(Pipeline::new()));
//! let scan = pipeline.write().add_node(registry.create("scan-input")?);
//! let stats = pipeline.write().add_node(registry.create("first-order-statistics")?);
//! pipeline.write().connect(PortRef::output(scan, 0), PortRef::input(stats, 0))?;
//!
//! let scheduler = Scheduler::new(pipeline, SchedulerConfig::default(), Arc::new(NullEventSink))?;
//! scheduler.execute(&[scan])?;
//! scheduler.wait();
//! ```

pub mod cancel;
pub mod compatible;
pub mod config;
pub mod contract;
pub mod error;
pub mod events;
pub mod executor;
pub mod graph;
pub mod history;
pub mod options;
pub mod persistence;
pub mod registry;
pub mod result;
pub mod scheduler;
pub mod side_channel;
pub mod types;
pub mod validation;

#[cfg(test)]
pub(crate) mod testing;

// Re-export key types
pub use cancel::CancellationToken;
pub use compatible::{Compatible, Constraint, MatchOutcome, PortContext};
pub use config::SchedulerConfig;
pub use contract::{
    Algorithm, AlgorithmCategory, AlgorithmMetadata, InvocationEmitter, PortMetadata, RunContext, RunOutput,
};
pub use error::{AlgorithmError, InvocationError, PipelineError, Result};
pub use events::{EventError, EventSink, NullEventSink, PipelineEvent, VecEventSink};
pub use executor::PriorityExecutor;
pub use graph::{Edge, HistoryEntry, Node, NodeState, Pipeline, Port};
pub use history::RevisionHistory;
pub use options::{OptionKind, OptionSpec, OptionValue, OptionValues};
pub use persistence::{EdgeDescription, NodeDescription, PipelineDescription};
pub use registry::{AlgorithmRegistration, AlgorithmRegistry};
pub use result::{PipelineResult, ResultId, ResultRef};
pub use scheduler::{Scheduler, SharedPipeline};
pub use side_channel::{SideChannel, SideChannelData, SideChannelSources};
pub use types::{
    Capability, Data, DataKind, EdgeId, InvocationId, NodeId, PayloadType, PortDirection, PortRef, PortType,
};
pub use validation::{validate_description, validate_pipeline, ValidationError};

// Hosts share the pipeline through this lock type
pub use parking_lot::RwLock;
