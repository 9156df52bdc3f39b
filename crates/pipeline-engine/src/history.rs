//! Edit history for undo/redo
//!
//! Each revision is a zstd-compressed JSON [`PipelineDescription`] tagged
//! with a short label ("Connect #0.out0 -> #2.in0"). Restoring a revision
//! goes through [`PipelineDescription::to_pipeline`], so every edge is
//! re-validated exactly as on load.

use std::collections::VecDeque;

use crate::error::{PipelineError, Result};
use crate::graph::Pipeline;
use crate::persistence::PipelineDescription;
use crate::registry::AlgorithmRegistry;

const COMPRESSION_LEVEL: i32 = 3;

struct Revision {
    label: String,
    compressed: Vec<u8>,
}

/// Bounded linear history of pipeline structures
pub struct RevisionHistory {
    revisions: VecDeque<Revision>,
    /// Index of the revision the editor is showing
    cursor: usize,
    capacity: usize,
}

impl RevisionHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            revisions: VecDeque::new(),
            cursor: 0,
            capacity: capacity.max(1),
        }
    }

    /// Record the pipeline's structure after an edit.
    ///
    /// Discards any revisions that were undone, then trims the oldest
    /// revisions beyond capacity.
    pub fn record(&mut self, label: impl Into<String>, pipeline: &Pipeline) -> Result<()> {
        let desc = PipelineDescription::from_pipeline(pipeline);
        let json = serde_json::to_vec(&desc)?;
        let compressed = zstd::encode_all(&json[..], COMPRESSION_LEVEL)
            .map_err(|e| PipelineError::Compression(e.to_string()))?;

        if !self.revisions.is_empty() {
            self.revisions.truncate(self.cursor + 1);
        }
        self.revisions.push_back(Revision {
            label: label.into(),
            compressed,
        });
        self.cursor = self.revisions.len() - 1;

        while self.revisions.len() > self.capacity {
            self.revisions.pop_front();
            self.cursor = self.cursor.saturating_sub(1);
        }
        Ok(())
    }

    /// Step back one revision and return its description
    pub fn undo(&mut self) -> Option<Result<PipelineDescription>> {
        if !self.can_undo() {
            return None;
        }
        self.cursor -= 1;
        Some(self.decode(self.cursor))
    }

    /// Step forward one revision and return its description
    pub fn redo(&mut self) -> Option<Result<PipelineDescription>> {
        if !self.can_redo() {
            return None;
        }
        self.cursor += 1;
        Some(self.decode(self.cursor))
    }

    /// Description at the cursor
    pub fn current(&self) -> Option<Result<PipelineDescription>> {
        if self.revisions.is_empty() {
            None
        } else {
            Some(self.decode(self.cursor))
        }
    }

    /// Rebuild the pipeline at the cursor
    pub fn restore(&self, registry: &AlgorithmRegistry) -> Option<Result<Pipeline>> {
        self.current()
            .map(|desc| desc.and_then(|d| d.to_pipeline(registry)))
    }

    pub fn can_undo(&self) -> bool {
        self.cursor > 0
    }

    pub fn can_redo(&self) -> bool {
        self.cursor + 1 < self.revisions.len()
    }

    /// Label of the revision `undo` would return to
    pub fn undo_label(&self) -> Option<&str> {
        if self.can_undo() {
            Some(self.revisions[self.cursor].label.as_str())
        } else {
            None
        }
    }

    /// Label of the revision `redo` would apply
    pub fn redo_label(&self) -> Option<&str> {
        self.revisions
            .get(self.cursor + 1)
            .map(|r| r.label.as_str())
    }

    pub fn len(&self) -> usize {
        self.revisions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.revisions.is_empty()
    }

    pub fn clear(&mut self) {
        self.revisions.clear();
        self.cursor = 0;
    }

    /// Total compressed size of all revisions in bytes
    pub fn compressed_size(&self) -> usize {
        self.revisions.iter().map(|r| r.compressed.len()).sum()
    }

    fn decode(&self, index: usize) -> Result<PipelineDescription> {
        let json = zstd::decode_all(&self.revisions[index].compressed[..])
            .map_err(|e| PipelineError::Compression(e.to_string()))?;
        Ok(serde_json::from_slice(&json)?)
    }
}

impl Default for RevisionHistory {
    fn default() -> Self {
        Self::new(100)
    }
}
