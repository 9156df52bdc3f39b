//! Reference-counted Results
//!
//! A [`PipelineResult`] owns one produced payload plus its provenance.
//! Instead of counting raw references it tracks the set of consuming
//! nodes: `used` adds a consumer, `finish` removes one, and the payload is
//! released exactly once, when the set becomes empty and the Result is not
//! preserved. Preserved Results stay alive until [`PipelineResult::release`]
//! is called explicitly.
//!
//! The `Arc` around a Result only keeps its metadata (id, provenance,
//! sequence) reachable; the payload lifetime is governed by the consumer
//! set alone.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::types::{Data, NodeId, PortRef};

/// Shared handle to a Result
pub type ResultRef = Arc<PipelineResult>;

/// Identifier of a Result, unique per scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResultId(pub u64);

impl fmt::Display for ResultId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

struct ResultState {
    payload: Option<Data>,
    used_by: BTreeSet<NodeId>,
    preserve: bool,
    disposed: bool,
}

/// One produced datum with its provenance and consumer set
pub struct PipelineResult {
    id: ResultId,
    /// Producing output port; `None` for externally injected Results
    origin: Option<PortRef>,
    /// Per-invocation sequence id for yielded tuples
    sequence: Option<u64>,
    provenance: Vec<ResultRef>,
    state: Mutex<ResultState>,
}

impl PipelineResult {
    pub fn new(
        id: ResultId,
        origin: Option<PortRef>,
        payload: Data,
        provenance: Vec<ResultRef>,
        sequence: Option<u64>,
        preserve: bool,
    ) -> Self {
        Self {
            id,
            origin,
            sequence,
            provenance,
            state: Mutex::new(ResultState {
                payload: Some(payload),
                used_by: BTreeSet::new(),
                preserve,
                disposed: false,
            }),
        }
    }

    pub fn id(&self) -> ResultId {
        self.id
    }

    pub fn origin(&self) -> Option<PortRef> {
        self.origin
    }

    pub fn sequence(&self) -> Option<u64> {
        self.sequence
    }

    /// Results consumed by the invocation that produced this one
    pub fn provenance(&self) -> &[ResultRef] {
        &self.provenance
    }

    /// Record `node` as a consumer. Idempotent; returns true if newly added.
    pub fn used(&self, node: NodeId) -> bool {
        let mut state = self.state.lock();
        if state.disposed {
            log::warn!("Result {} marked used by {} after disposal", self.id, node);
        }
        state.used_by.insert(node)
    }

    /// Remove `node` from the consumers.
    ///
    /// Returns true if this call disposed the payload.
    pub fn finish(&self, node: NodeId) -> bool {
        let mut state = self.state.lock();
        if !state.used_by.remove(&node) {
            log::debug!("Result {} finished by {} which was not a consumer", self.id, node);
            return false;
        }
        Self::dispose_locked(self.id, &mut state)
    }

    /// Membership query
    pub fn is_used(&self, node: NodeId) -> bool {
        self.state.lock().used_by.contains(&node)
    }

    /// Current size of the consumer set
    pub fn used_count(&self) -> usize {
        self.state.lock().used_by.len()
    }

    /// Snapshot of the consumer set
    pub fn consumers(&self) -> Vec<NodeId> {
        self.state.lock().used_by.iter().copied().collect()
    }

    pub fn preserve(&self) -> bool {
        self.state.lock().preserve
    }

    /// Mark the Result as kept for inspection.
    ///
    /// Setting the flag never disposes; use [`release`](Self::release) to
    /// drop it again.
    pub fn set_preserve(&self) {
        self.state.lock().preserve = true;
    }

    /// Drop the preserve flag and dispose the payload if no consumer is left.
    ///
    /// Returns true if this call disposed the payload.
    pub fn release(&self) -> bool {
        let mut state = self.state.lock();
        state.preserve = false;
        Self::dispose_locked(self.id, &mut state)
    }

    /// Dispose the payload if there are no consumers and it is not preserved.
    pub fn dispose_if_unused(&self) -> bool {
        let mut state = self.state.lock();
        Self::dispose_locked(self.id, &mut state)
    }

    /// The payload, or `None` once disposed
    pub fn payload(&self) -> Option<Data> {
        self.state.lock().payload.clone()
    }

    pub fn is_disposed(&self) -> bool {
        self.state.lock().disposed
    }

    fn dispose_locked(id: ResultId, state: &mut ResultState) -> bool {
        if state.disposed || state.preserve || !state.used_by.is_empty() {
            return false;
        }
        state.disposed = true;
        let payload = state.payload.take();
        log::trace!("Result {} disposed", id);
        drop(payload);
        true
    }
}

impl fmt::Debug for PipelineResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("PipelineResult")
            .field("id", &self.id)
            .field("origin", &self.origin)
            .field("sequence", &self.sequence)
            .field("provenance", &self.provenance.iter().map(|r| r.id).collect::<Vec<_>>())
            .field("used_by", &state.used_by)
            .field("preserve", &state.preserve)
            .field("disposed", &state.disposed)
            .finish()
    }
}
