//! Filters
//!
//! Raster to raster transforms.

mod image_window;

pub use image_window::ImageWindow;
