//! Sliding-window tiling
//!
//! Splits a raster into square sub-windows and yields each as its own
//! `Image` Result, row by row. Windows that would extend past the right or
//! bottom edge are skipped; an input smaller than one window yields nothing.

use std::sync::Arc;

use pipeline_engine::{
    Algorithm, AlgorithmCategory, AlgorithmError, AlgorithmMetadata, AlgorithmRegistration, Capability, Compatible,
    Data, DataKind, OptionSpec, PortMetadata, PortType, RunContext, RunOutput,
};

use crate::image::raster;

#[derive(Debug, Clone, Copy, Default)]
pub struct ImageWindow;

impl ImageWindow {
    pub const TYPE_ID: &'static str = "image-window";
    pub const PORT_IMAGE: &'static str = "image";
    pub const PORT_WINDOW: &'static str = "window";
    pub const OPTION_WINDOW_SIZE: &'static str = "window_size";
    pub const OPTION_STRIDE: &'static str = "stride";

    /// Top-left corners of every full window, row-major
    pub fn offsets(width: usize, height: usize, size: usize, stride: usize) -> Vec<(usize, usize)> {
        if size == 0 || stride == 0 || size > width || size > height {
            return Vec::new();
        }
        let mut offsets = Vec::new();
        for y in (0..=height - size).step_by(stride) {
            for x in (0..=width - size).step_by(stride) {
                offsets.push((x, y));
            }
        }
        offsets
    }
}

inventory::submit!(AlgorithmRegistration {
    type_id: ImageWindow::TYPE_ID,
    create: || Arc::new(ImageWindow),
});

impl Algorithm for ImageWindow {
    fn metadata(&self) -> AlgorithmMetadata {
        AlgorithmMetadata::new(Self::TYPE_ID, AlgorithmCategory::Filter, "Image Window")
            .description("Yields square sub-windows of a raster")
            .input(PortMetadata::new(
                Self::PORT_IMAGE,
                "Image",
                Compatible::new(PortType::capability(Capability::Raster)),
            ))
            .output(PortMetadata::new(
                Self::PORT_WINDOW,
                "Window",
                Compatible::new(PortType::kind(DataKind::Image).stream()),
            ))
            .option(OptionSpec::integer(Self::OPTION_WINDOW_SIZE, "Window size", 1, 4096, 32))
            .option(OptionSpec::integer(Self::OPTION_STRIDE, "Stride", 1, 4096, 32))
    }

    fn run(&self, ctx: &mut RunContext<'_>, inputs: &[Data]) -> Result<RunOutput, AlgorithmError> {
        let image = raster(&inputs[0], 0)?;
        let size = ctx.options().integer(Self::OPTION_WINDOW_SIZE).unwrap_or(32).max(1) as usize;
        let stride = ctx.options().integer(Self::OPTION_STRIDE).unwrap_or(32).max(1) as usize;

        let offsets = Self::offsets(image.width(), image.height(), size, stride);
        if offsets.is_empty() {
            log::debug!(
                "image-window on {}: {}x{} image smaller than window {}",
                ctx.node(),
                image.width(),
                image.height(),
                size
            );
        }

        let total = offsets.len();
        for (i, (x, y)) in offsets.into_iter().enumerate() {
            if ctx.is_cancelled() {
                return Err(AlgorithmError::Cancelled);
            }
            let window = image.region(x, y, size, size)?;
            ctx.yield_outputs(vec![Data::new(DataKind::Image, window)])
                .map_err(|e| AlgorithmError::failed(e.to_string()))?;
            ctx.progress(100.0 * (i + 1) as f32 / total as f32);
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::{GrayImage, Scan};
    use crate::testing;
    use pipeline_engine::{CancellationToken, OptionValue, OptionValues, SideChannelData};

    fn options(size: i64, stride: i64) -> OptionValues {
        let specs = ImageWindow.metadata().options;
        let mut values = OptionValues::from_specs(&specs);
        values
            .set_checked(&specs, ImageWindow::OPTION_WINDOW_SIZE, OptionValue::Integer(size))
            .unwrap();
        values
            .set_checked(&specs, ImageWindow::OPTION_STRIDE, OptionValue::Integer(stride))
            .unwrap();
        values
    }

    fn ramp(width: usize, height: usize) -> GrayImage {
        GrayImage::from_fn(width, height, move |x, y| (y * width + x) as f32)
    }

    #[test]
    fn test_offsets() {
        assert_eq!(
            ImageWindow::offsets(4, 4, 2, 2),
            vec![(0, 0), (2, 0), (0, 2), (2, 2)]
        );
        assert_eq!(ImageWindow::offsets(5, 3, 3, 1), vec![(0, 0), (1, 0), (2, 0)]);
        assert!(ImageWindow::offsets(2, 2, 3, 1).is_empty());
    }

    #[test]
    fn test_yields_every_window() {
        let input = Data::new(DataKind::Image, ramp(4, 4));
        let run = testing::run(
            &ImageWindow,
            &options(2, 2),
            &SideChannelData::default(),
            &CancellationToken::new(),
            &[input],
        );

        assert!(run.output.unwrap().is_none());
        assert_eq!(run.yields.len(), 4);
        let last = run.yields[3][0].downcast_ref::<GrayImage>().unwrap();
        assert_eq!(last.pixels(), &[10.0, 11.0, 14.0, 15.0]);
        assert!(run.yields.iter().all(|t| t[0].kind() == DataKind::Image));
    }

    #[test]
    fn test_accepts_scan_input() {
        let scan = Data::new(DataKind::Scan, Scan::new("s", ramp(3, 3)));
        let run = testing::run(
            &ImageWindow,
            &options(3, 1),
            &SideChannelData::default(),
            &CancellationToken::new(),
            &[scan],
        );
        assert_eq!(run.yields.len(), 1);
    }

    #[test]
    fn test_small_image_yields_nothing() {
        let run = testing::run_default(&ImageWindow, &[Data::new(DataKind::Image, ramp(8, 8))]);
        assert!(run.output.unwrap().is_none());
        assert!(run.yields.is_empty());
    }

    #[test]
    fn test_rejects_non_raster() {
        let run = testing::run_default(&ImageWindow, &[Data::number(1.0)]);
        assert!(matches!(run.output, Err(AlgorithmError::InvalidInput { index: 0, .. })));
    }
}
