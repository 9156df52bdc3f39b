//! Texture Nodes
//!
//! Reference analysis algorithms for the pipeline engine. Each is an
//! atomic building block registered with `inventory`, so linking this
//! crate is enough for `AlgorithmRegistry::with_registered()` to list them.
//!
//! # Categories
//!
//! - **Input**: importers that stream scans from the data collection
//! - **Filter**: raster transforms such as sliding windows
//! - **Features**: extractors producing terminal `Feature` Results

pub mod features;
pub mod filter;
pub mod image;
pub mod input;

pub use features::*;
pub use filter::*;
pub use image::{FeatureVector, GrayImage, ImageError, Scan, ScanCollection};
pub use input::*;

#[cfg(test)]
pub(crate) mod testing;
