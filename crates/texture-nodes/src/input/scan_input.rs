//! Scan input
//!
//! Root of most pipelines. Reads the project's scan collection through the
//! `DataCollection` side channel and streams one Result per scan, so
//! downstream filters start on the first scan while later ones are still
//! being yielded.

use std::sync::Arc;

use pipeline_engine::{
    Algorithm, AlgorithmCategory, AlgorithmError, AlgorithmMetadata, AlgorithmRegistration, Compatible, Data,
    DataKind, PortMetadata, PortType, RunContext, RunOutput, SideChannel,
};

use crate::image::ScanCollection;

/// Streams every scan of the data collection
#[derive(Debug, Clone, Copy, Default)]
pub struct ScanInput;

impl ScanInput {
    pub const TYPE_ID: &'static str = "scan-input";
    /// Port ID for the scan stream
    pub const PORT_SCAN: &'static str = "scan";
}

inventory::submit!(AlgorithmRegistration {
    type_id: ScanInput::TYPE_ID,
    create: || Arc::new(ScanInput),
});

impl Algorithm for ScanInput {
    fn metadata(&self) -> AlgorithmMetadata {
        AlgorithmMetadata::new(Self::TYPE_ID, AlgorithmCategory::Importer, "Scan Input")
            .description("Yields each scan of the data collection")
            .output(PortMetadata::new(
                Self::PORT_SCAN,
                "Scan",
                Compatible::new(PortType::kind(DataKind::Scan).stream()),
            ))
            .side_channel(SideChannel::DataCollection)
    }

    fn run(&self, ctx: &mut RunContext<'_>, _inputs: &[Data]) -> Result<RunOutput, AlgorithmError> {
        let collection = ctx.side_channel::<ScanCollection>(SideChannel::DataCollection)?.clone();
        let total = collection.len();
        log::debug!("scan-input on {}: {} scan(s)", ctx.node(), total);

        for (i, scan) in collection.scans.into_iter().enumerate() {
            if ctx.is_cancelled() {
                return Err(AlgorithmError::Cancelled);
            }
            ctx.yield_outputs(vec![Data::new(DataKind::Scan, scan)])
                .map_err(|e| AlgorithmError::failed(e.to_string()))?;
            ctx.progress(100.0 * (i + 1) as f32 / total as f32);
        }
        Ok(None)
    }
}
