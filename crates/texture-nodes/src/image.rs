//! Image payloads
//!
//! Scans are single-channel intensity images with a name from the data
//! collection. Filters pass around [`GrayImage`] values; statistics come
//! back as [`FeatureVector`]s.

use std::sync::Arc;

use pipeline_engine::{AlgorithmError, Data, DataKind};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors building or slicing images
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ImageError {
    #[error("Pixel buffer holds {actual} values, expected {width}x{height}")]
    BufferSize { width: usize, height: usize, actual: usize },

    #[error("Region {width}x{height} at ({x}, {y}) exceeds image bounds")]
    OutOfBounds { x: usize, y: usize, width: usize, height: usize },

    #[error("Image has no pixels")]
    Empty,
}

impl From<ImageError> for AlgorithmError {
    fn from(err: ImageError) -> Self {
        AlgorithmError::failed(err.to_string())
    }
}

/// Row-major single-channel image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrayImage {
    width: usize,
    height: usize,
    pixels: Vec<f32>,
}

impl GrayImage {
    pub fn new(width: usize, height: usize, pixels: Vec<f32>) -> Result<Self, ImageError> {
        if pixels.len() != width * height {
            return Err(ImageError::BufferSize {
                width,
                height,
                actual: pixels.len(),
            });
        }
        Ok(Self { width, height, pixels })
    }

    /// Image of `width * height` pixels produced by `f(x, y)`
    pub fn from_fn(width: usize, height: usize, f: impl Fn(usize, usize) -> f32) -> Self {
        let mut pixels = Vec::with_capacity(width * height);
        for y in 0..height {
            for x in 0..width {
                pixels.push(f(x, y));
            }
        }
        Self { width, height, pixels }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn pixels(&self) -> &[f32] {
        &self.pixels
    }

    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }

    pub fn get(&self, x: usize, y: usize) -> Option<f32> {
        if x < self.width && y < self.height {
            Some(self.pixels[y * self.width + x])
        } else {
            None
        }
    }

    /// Copy out a rectangular sub-region
    pub fn region(&self, x: usize, y: usize, width: usize, height: usize) -> Result<GrayImage, ImageError> {
        if x + width > self.width || y + height > self.height {
            return Err(ImageError::OutOfBounds { x, y, width, height });
        }
        let mut pixels = Vec::with_capacity(width * height);
        for row in y..y + height {
            let start = row * self.width + x;
            pixels.extend_from_slice(&self.pixels[start..start + width]);
        }
        Ok(GrayImage { width, height, pixels })
    }
}

/// One scan from the data collection
#[derive(Debug, Clone, PartialEq)]
pub struct Scan {
    pub name: String,
    pub image: Arc<GrayImage>,
}

impl Scan {
    pub fn new(name: impl Into<String>, image: GrayImage) -> Self {
        Self {
            name: name.into(),
            image: Arc::new(image),
        }
    }
}

/// The project's scans, provided to importers as a side channel
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScanCollection {
    pub scans: Vec<Scan>,
}

impl ScanCollection {
    pub fn new(scans: Vec<Scan>) -> Self {
        Self { scans }
    }

    pub fn len(&self) -> usize {
        self.scans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scans.is_empty()
    }
}

/// Named scalar features computed over one raster
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub values: Vec<(String, f64)>,
}

impl FeatureVector {
    pub fn push(&mut self, name: impl Into<String>, value: f64) {
        self.values.push((name.into(), value));
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.values.iter().find(|(n, _)| n == name).map(|(_, v)| *v)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Borrow the pixel grid of any raster payload (scan or image).
pub fn raster(data: &Data, index: usize) -> Result<&GrayImage, AlgorithmError> {
    let image = match data.kind() {
        DataKind::Scan => data.downcast_ref::<Scan>().map(|s| s.image.as_ref()),
        DataKind::Image | DataKind::Mask => data.downcast_ref::<GrayImage>(),
        _ => None,
    };
    image.ok_or_else(|| AlgorithmError::InvalidInput {
        index,
        expected: "raster image".to_string(),
    })
}
