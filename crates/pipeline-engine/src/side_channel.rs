//! Side-channel data for algorithm invocations.
//!
//! Some algorithms need more than their port inputs, e.g. an importer
//! that reads the whole scan collection. They request a closed set of
//! [`SideChannel`] kinds in their metadata; the host registers the
//! matching runtime objects in [`SideChannelSources`] and the scheduler
//! resolves the requested subset into a [`SideChannelData`] map that is
//! handed to `run`.
//!
//! # Example
//!
//! ```ignore
//! let mut sources = SideChannelSources::new();
//! sources.set(SideChannel::DataCollection, Arc::new(collection));
//!
//! // Inside Algorithm::run:
//! let collection = ctx.side_channel::<ScanCollection>(SideChannel::DataCollection)?;
//! ```

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Kinds of out-of-band data an algorithm may request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SideChannel {
    /// Full access to the project's scan collection
    DataCollection,
    /// Project-wide settings (pixel spacing, units, ...)
    ProjectSettings,
}

impl fmt::Display for SideChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SideChannel::DataCollection => f.write_str("data-collection"),
            SideChannel::ProjectSettings => f.write_str("project-settings"),
        }
    }
}

type SharedValue = Arc<dyn Any + Send + Sync>;

/// Host-provided side-channel objects, keyed by kind.
#[derive(Clone, Default)]
pub struct SideChannelSources {
    inner: HashMap<SideChannel, SharedValue>,
}

impl SideChannelSources {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the object for `kind`.
    pub fn set<T: Send + Sync + 'static>(&mut self, kind: SideChannel, value: Arc<T>) {
        self.inner.insert(kind, value);
    }

    pub fn remove(&mut self, kind: SideChannel) {
        self.inner.remove(&kind);
    }

    pub fn has(&self, kind: SideChannel) -> bool {
        self.inner.contains_key(&kind)
    }

    /// Build the map for one invocation from the requested kinds.
    ///
    /// Kinds the host did not provide are left out; the algorithm sees
    /// them as missing.
    pub fn resolve(&self, requested: &[SideChannel]) -> SideChannelData {
        let mut data = SideChannelData::default();
        for kind in requested {
            match self.inner.get(kind) {
                Some(value) => {
                    data.inner.insert(*kind, Arc::clone(value));
                }
                None => log::warn!("Side channel {} requested but not provided", kind),
            }
        }
        data
    }
}

impl fmt::Debug for SideChannelSources {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.inner.keys()).finish()
    }
}

/// Resolved side-channel objects for one invocation
#[derive(Clone, Default)]
pub struct SideChannelData {
    inner: HashMap<SideChannel, SharedValue>,
}

impl SideChannelData {
    /// Get a typed reference to the object for `kind`.
    ///
    /// Returns `None` if the kind was not resolved or the type doesn't match.
    pub fn get<T: Send + Sync + 'static>(&self, kind: SideChannel) -> Option<&T> {
        self.inner.get(&kind).and_then(|v| v.downcast_ref())
    }

    pub fn has(&self, kind: SideChannel) -> bool {
        self.inner.contains_key(&kind)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl fmt::Debug for SideChannelData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.inner.keys()).finish()
    }
}
