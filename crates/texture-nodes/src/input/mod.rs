//! Importers
//!
//! Algorithms that bring scans into a pipeline.

mod scan_input;

pub use scan_input::ScanInput;
