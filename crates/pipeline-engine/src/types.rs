//! Core types for pipeline graphs
//!
//! Node handles, port addressing, the closed set of payload kinds with
//! their capability table, and the type-erased payload handle carried by
//! every Result.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Stable handle to a node: an index into the pipeline's node arena.
///
/// Handles are never reused after a node is removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Identifier of an edge, unique within one pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EdgeId(pub u64);

/// Identity of one execution unit (one `run` call), used to key progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InvocationId(pub u64);

/// Direction of a port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortDirection {
    Input,
    Output,
}

/// Address of a port: owning node, direction and position index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortRef {
    pub node: NodeId,
    pub direction: PortDirection,
    pub index: usize,
}

impl PortRef {
    pub fn input(node: NodeId, index: usize) -> Self {
        Self {
            node,
            direction: PortDirection::Input,
            index,
        }
    }

    pub fn output(node: NodeId, index: usize) -> Self {
        Self {
            node,
            direction: PortDirection::Output,
            index,
        }
    }
}

impl fmt::Display for PortRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dir = match self.direction {
            PortDirection::Input => "in",
            PortDirection::Output => "out",
        };
        write!(f, "{}.{}{}", self.node, dir, self.index)
    }
}

/// Concrete payload kinds that can travel along an edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataKind {
    /// A scan as imported from the data collection
    Scan,
    /// Grayscale image or sub-region of one
    Image,
    /// Binary mask over an image
    Mask,
    /// A single computed feature (terminal)
    Feature,
    /// A set of features, e.g. one per region (terminal)
    FeatureCollection,
    /// Scalar number
    Number,
    /// Text value
    Text,
}

/// Capabilities a port can require instead of a concrete kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Anything with a pixel grid
    Raster,
    /// Anything that can be exported as a table of numbers
    Measurement,
}

impl DataKind {
    /// Static implements-table
    pub fn implements(self, capability: Capability) -> bool {
        match capability {
            Capability::Raster => matches!(self, DataKind::Scan | DataKind::Image | DataKind::Mask),
            Capability::Measurement => matches!(
                self,
                DataKind::Feature | DataKind::FeatureCollection | DataKind::Number
            ),
        }
    }
}

/// Base payload type of a port: either a concrete kind or a capability
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadType {
    Kind(DataKind),
    Capability(Capability),
}

impl PayloadType {
    /// Check whether two base types can be joined.
    ///
    /// Symmetric: a capability on either side accepts any concrete kind
    /// implementing it; two capabilities must be equal; two kinds must be
    /// equal.
    pub fn accepts(&self, other: &PayloadType) -> bool {
        match (self, other) {
            (PayloadType::Kind(a), PayloadType::Kind(b)) => a == b,
            (PayloadType::Capability(c), PayloadType::Kind(k))
            | (PayloadType::Kind(k), PayloadType::Capability(c)) => k.implements(*c),
            (PayloadType::Capability(a), PayloadType::Capability(b)) => a == b,
        }
    }
}

impl fmt::Display for PayloadType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PayloadType::Kind(k) => write!(f, "{:?}", k),
            PayloadType::Capability(c) => write!(f, "impl {:?}", c),
        }
    }
}

/// Declared type of a port: a base type, optionally wrapped as a stream
/// (the producer yields many items per invocation).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortType {
    pub base: PayloadType,
    pub streamed: bool,
}

impl PortType {
    pub fn kind(kind: DataKind) -> Self {
        Self {
            base: PayloadType::Kind(kind),
            streamed: false,
        }
    }

    pub fn capability(capability: Capability) -> Self {
        Self {
            base: PayloadType::Capability(capability),
            streamed: false,
        }
    }

    /// Wrap this type as a stream
    pub fn stream(mut self) -> Self {
        self.streamed = true;
        self
    }

    /// Base payload type with any streaming wrapper removed
    pub fn unwrap_stream(&self) -> PayloadType {
        self.base
    }
}

impl fmt::Display for PortType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.streamed {
            write!(f, "Stream<{}>", self.base)
        } else {
            write!(f, "{}", self.base)
        }
    }
}

/// Type-erased payload produced by an algorithm.
///
/// Cloning is cheap (shared pointer). The Result owning a `Data` drops
/// its handle when disposed; the value itself is released when the last
/// handle goes away.
#[derive(Clone)]
pub struct Data {
    kind: DataKind,
    value: Arc<dyn Any + Send + Sync>,
}

impl Data {
    pub fn new<T: Any + Send + Sync>(kind: DataKind, value: T) -> Self {
        Self {
            kind,
            value: Arc::new(value),
        }
    }

    /// Wrap an already shared value
    pub fn from_arc<T: Any + Send + Sync>(kind: DataKind, value: Arc<T>) -> Self {
        Self { kind, value }
    }

    pub fn number(value: f64) -> Self {
        Self::new(DataKind::Number, value)
    }

    pub fn text(value: impl Into<String>) -> Self {
        Self::new(DataKind::Text, value.into())
    }

    pub fn kind(&self) -> DataKind {
        self.kind
    }

    /// Borrow the payload as `T`, if that is its concrete type
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }

    pub fn is<T: Any>(&self) -> bool {
        self.value.is::<T>()
    }
}

impl fmt::Debug for Data {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Data").field("kind", &self.kind).finish_non_exhaustive()
    }
}
