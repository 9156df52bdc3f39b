//! First-order intensity statistics

use std::sync::Arc;

use pipeline_engine::{
    Algorithm, AlgorithmCategory, AlgorithmError, AlgorithmMetadata, AlgorithmRegistration, Capability, Compatible,
    Data, DataKind, OptionSpec, PortMetadata, PortType, RunContext, RunOutput,
};

use crate::image::{raster, FeatureVector, GrayImage, ImageError};

/// Mean and population variance of a raster, optionally with extrema
#[derive(Debug, Clone, Copy, Default)]
pub struct FirstOrderStatistics;

impl FirstOrderStatistics {
    pub const TYPE_ID: &'static str = "first-order-statistics";
    pub const PORT_IMAGE: &'static str = "image";
    pub const PORT_FEATURES: &'static str = "features";
    pub const OPTION_INCLUDE_EXTREMA: &'static str = "include_extrema";

    pub fn compute(image: &GrayImage, include_extrema: bool) -> Result<FeatureVector, ImageError> {
        if image.is_empty() {
            return Err(ImageError::Empty);
        }
        let n = image.pixels().len() as f64;
        let mean = image.pixels().iter().map(|p| *p as f64).sum::<f64>() / n;
        let variance = image
            .pixels()
            .iter()
            .map(|p| {
                let d = *p as f64 - mean;
                d * d
            })
            .sum::<f64>()
            / n;

        let mut features = FeatureVector::default();
        features.push("mean", mean);
        features.push("variance", variance);
        if include_extrema {
            let (min, max) = image
                .pixels()
                .iter()
                .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), p| (lo.min(*p), hi.max(*p)));
            features.push("min", min as f64);
            features.push("max", max as f64);
        }
        Ok(features)
    }
}

inventory::submit!(AlgorithmRegistration {
    type_id: FirstOrderStatistics::TYPE_ID,
    create: || Arc::new(FirstOrderStatistics),
});

impl Algorithm for FirstOrderStatistics {
    fn metadata(&self) -> AlgorithmMetadata {
        AlgorithmMetadata::new(
            Self::TYPE_ID,
            AlgorithmCategory::FeatureExtractor,
            "First-Order Statistics",
        )
        .description("Mean and variance of pixel intensities")
        .input(PortMetadata::new(
            Self::PORT_IMAGE,
            "Image",
            Compatible::new(PortType::capability(Capability::Raster)),
        ))
        .output(PortMetadata::new(
            Self::PORT_FEATURES,
            "Features",
            Compatible::kind(DataKind::Feature),
        ))
        .option(OptionSpec::boolean(
            Self::OPTION_INCLUDE_EXTREMA,
            "Include min/max",
            false,
        ))
    }

    fn run(&self, ctx: &mut RunContext<'_>, inputs: &[Data]) -> Result<RunOutput, AlgorithmError> {
        let image = raster(&inputs[0], 0)?;
        let include_extrema = ctx
            .options()
            .boolean(Self::OPTION_INCLUDE_EXTREMA)
            .unwrap_or(false);
        let features = Self::compute(image, include_extrema)?;
        Ok(Some(vec![Data::new(DataKind::Feature, features)]))
    }
}
