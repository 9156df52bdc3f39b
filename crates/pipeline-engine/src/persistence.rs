//! Serializable pipeline descriptions
//!
//! A [`PipelineDescription`] holds what a saved project needs to rebuild a
//! pipeline: every node's handle, algorithm type, canvas position, option
//! values and preserve flag, the edge list, and the next handle to issue
//! so that handles of removed nodes stay retired. Port descriptors are not
//! stored. On load they are re-derived from each algorithm's declaration
//! and every edge is re-validated through [`Pipeline::connect`].

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::graph::Pipeline;
use crate::options::OptionValues;
use crate::registry::AlgorithmRegistry;
use crate::types::{NodeId, PortRef};

/// Current description format version
pub const FORMAT_VERSION: u32 = 1;

/// One saved node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeDescription {
    pub id: NodeId,
    /// Algorithm type id as registered
    pub algorithm: String,
    pub position: (f64, f64),
    #[serde(default)]
    pub options: OptionValues,
    #[serde(default)]
    pub preserve_results: bool,
}

/// One saved edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeDescription {
    pub source: NodeId,
    pub source_port: usize,
    pub target: NodeId,
    pub target_port: usize,
}

/// A whole saved pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineDescription {
    pub version: u32,
    pub nodes: Vec<NodeDescription>,
    pub edges: Vec<EdgeDescription>,
    /// Handle the next added node receives; older files omit it
    #[serde(default, rename = "nextNode")]
    pub next_node: Option<NodeId>,
}

impl PipelineDescription {
    /// Capture the structure of a pipeline (queues and history are not saved)
    pub fn from_pipeline(pipeline: &Pipeline) -> Self {
        let nodes = pipeline
            .nodes()
            .map(|n| NodeDescription {
                id: n.id(),
                algorithm: n.type_id().to_string(),
                position: n.position(),
                options: n.options().clone(),
                preserve_results: n.preserve_results(),
            })
            .collect();
        let edges = pipeline
            .edges()
            .iter()
            .map(|e| EdgeDescription {
                source: e.source.node,
                source_port: e.source.index,
                target: e.target.node,
                target_port: e.target.index,
            })
            .collect();
        Self {
            version: FORMAT_VERSION,
            nodes,
            edges,
            next_node: Some(pipeline.next_node_id()),
        }
    }

    /// Rebuild a pipeline, resolving algorithms through `registry`.
    ///
    /// Node handles are kept. Options the algorithm no longer declares are
    /// dropped with a warning; out-of-range values and edges that no longer
    /// match fail the whole load.
    pub fn to_pipeline(&self, registry: &AlgorithmRegistry) -> Result<Pipeline> {
        let mut pipeline = Pipeline::new();

        for desc in &self.nodes {
            let algorithm = registry.create(&desc.algorithm)?;
            pipeline.insert_node(desc.id, algorithm)?;
            pipeline.set_position(desc.id, desc.position.0, desc.position.1)?;
            pipeline.set_preserve(desc.id, desc.preserve_results)?;
            for (name, value) in desc.options.iter() {
                match pipeline.set_option(desc.id, name, value.clone()) {
                    Ok(()) => {}
                    Err(PipelineError::UnknownOption { node, name }) => {
                        log::warn!("Dropping saved option '{}' on node {}: no longer declared", name, node);
                    }
                    Err(e) => return Err(e),
                }
            }
        }

        if let Some(next) = self.next_node {
            pipeline.retire_node_ids(next);
        }

        for edge in &self.edges {
            pipeline.connect(
                PortRef::output(edge.source, edge.source_port),
                PortRef::input(edge.target, edge.target_port),
            )?;
        }

        log::debug!(
            "Loaded pipeline with {} node(s) and {} edge(s)",
            pipeline.node_count(),
            pipeline.edges().len()
        );
        Ok(pipeline)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Write as pretty JSON
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        fs::write(path, self.to_json()?)?;
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        Self::from_json(&json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::OptionValue;
    use crate::result::{PipelineResult, ResultId, ResultRef};
    use crate::scheduler::route;
    use crate::testing::{Increment, SingleSink, Source, Sum};
    use crate::types::Data;
    use std::sync::Arc;

    fn registry() -> AlgorithmRegistry {
        let mut registry = AlgorithmRegistry::new();
        registry.register(|| Arc::new(Source));
        registry.register(|| Arc::new(Increment));
        registry.register(|| Arc::new(Sum));
        registry.register(|| Arc::new(SingleSink));
        registry
    }

    /// Source(0) -> Increment(2) -> Sum.a(3); Source(0) -> Sum.b(3); node 1 removed
    fn sample() -> Pipeline {
        let mut p = Pipeline::new();
        let src = p.add_node(Arc::new(Source));
        let gone = p.add_node(Arc::new(Source));
        let inc = p.add_node(Arc::new(Increment));
        let sum = p.add_node(Arc::new(Sum));
        p.remove_node(gone).unwrap();

        p.set_option(src, "value", OptionValue::Number(3.5)).unwrap();
        p.set_position(inc, 120.0, -40.5).unwrap();
        p.set_preserve(inc, true).unwrap();
        p.connect(PortRef::output(src, 0), PortRef::input(inc, 0)).unwrap();
        p.connect(PortRef::output(inc, 0), PortRef::input(sum, 0)).unwrap();
        p.connect(PortRef::output(src, 0), PortRef::input(sum, 1)).unwrap();
        p
    }

    fn number(id: u64) -> ResultRef {
        Arc::new(PipelineResult::new(
            ResultId(id),
            None,
            Data::number(id as f64),
            Vec::new(),
            None,
            false,
        ))
    }

    /// Queue lengths and readiness of every node after routing the same inputs
    fn drive(pipeline: &Pipeline) -> Vec<(NodeId, Vec<usize>, bool)> {
        for i in 0..3 {
            route(pipeline, PortRef::output(NodeId(0), 0), &number(i));
        }
        route(pipeline, PortRef::output(NodeId(2), 0), &number(10));
        pipeline
            .nodes()
            .map(|n| (n.id(), n.queue_lengths(), n.is_ready()))
            .collect()
    }

    #[test]
    fn test_round_trip_preserves_structure_and_behavior() {
        let original = sample();
        let desc = PipelineDescription::from_pipeline(&original);
        let json = desc.to_json().unwrap();
        let restored_desc = PipelineDescription::from_json(&json).unwrap();
        assert_eq!(desc, restored_desc);

        let restored = restored_desc.to_pipeline(&registry()).unwrap();
        assert_eq!(restored.node_ids(), vec![NodeId(0), NodeId(2), NodeId(3)]);
        assert_eq!(restored.node(NodeId(0)).unwrap().options().number("value"), Some(3.5));
        assert_eq!(restored.node(NodeId(2)).unwrap().position(), (120.0, -40.5));
        assert!(restored.node(NodeId(2)).unwrap().preserve_results());
        assert_eq!(PipelineDescription::from_pipeline(&restored), desc);

        assert_eq!(drive(&original), drive(&restored));
    }

    #[test]
    fn test_removed_tail_handle_stays_retired_after_load() {
        let mut p = Pipeline::new();
        let src = p.add_node(Arc::new(Source));
        let tail = p.add_node(Arc::new(Increment));
        p.connect(PortRef::output(src, 0), PortRef::input(tail, 0)).unwrap();
        p.remove_node(tail).unwrap();

        let desc = PipelineDescription::from_pipeline(&p);
        assert_eq!(desc.next_node, Some(NodeId(2)));
        let json = desc.to_json().unwrap();
        assert!(json.contains("\"nextNode\": 2"));

        let mut restored = PipelineDescription::from_json(&json)
            .unwrap()
            .to_pipeline(&registry())
            .unwrap();
        let added = restored.add_node(Arc::new(Increment));
        assert_ne!(added, tail);
        assert_eq!(added, NodeId(2));
    }

    #[test]
    fn test_load_without_next_node_uses_highest_handle() {
        let json = r#"{
            "version": 1,
            "nodes": [{"id": 4, "algorithm": "test-source", "position": [0.0, 0.0]}],
            "edges": []
        }"#;
        let desc = PipelineDescription::from_json(json).unwrap();
        assert_eq!(desc.next_node, None);

        let mut restored = desc.to_pipeline(&registry()).unwrap();
        assert_eq!(restored.add_node(Arc::new(Source)), NodeId(5));
    }

    #[test]
    fn test_load_revalidates_edges() {
        let mut desc = PipelineDescription::from_pipeline(&sample());
        // Feature output into a Number input
        desc.edges.push(EdgeDescription {
            source: NodeId(3),
            source_port: 0,
            target: NodeId(2),
            target_port: 0,
        });
        assert!(matches!(
            desc.to_pipeline(&registry()),
            Err(PipelineError::TypeIncompatible { .. })
        ));
    }

    #[test]
    fn test_load_enforces_constraints() {
        let mut p = Pipeline::new();
        let a = p.add_node(Arc::new(Source));
        let b = p.add_node(Arc::new(Source));
        let sink = p.add_node(Arc::new(SingleSink));
        p.connect(PortRef::output(a, 0), PortRef::input(sink, 0)).unwrap();

        let mut desc = PipelineDescription::from_pipeline(&p);
        desc.edges.push(EdgeDescription {
            source: b,
            source_port: 0,
            target: sink,
            target_port: 0,
        });
        assert!(matches!(
            desc.to_pipeline(&registry()),
            Err(PipelineError::ConstraintViolated { .. })
        ));
    }

    #[test]
    fn test_unknown_algorithm_and_stale_option() {
        let mut desc = PipelineDescription::from_pipeline(&sample());
        let mut options = OptionValues::new();
        options
            .set_checked(
                &[crate::options::OptionSpec::boolean("legacy", "Legacy", false)],
                "legacy",
                OptionValue::Boolean(true),
            )
            .unwrap();
        desc.nodes[1].options = options;
        // Stale option is dropped, not fatal
        assert!(desc.to_pipeline(&registry()).is_ok());

        desc.nodes[0].algorithm = "gone".to_string();
        assert!(matches!(
            desc.to_pipeline(&registry()),
            Err(PipelineError::UnknownAlgorithm(_))
        ));
    }

    #[test]
    fn test_save_and_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.json");

        let desc = PipelineDescription::from_pipeline(&sample());
        desc.save(&path).unwrap();
        let loaded = PipelineDescription::load(&path).unwrap();
        assert_eq!(loaded, desc);
        assert_eq!(loaded.version, FORMAT_VERSION);
    }
}
