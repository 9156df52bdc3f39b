//! Feature extractors
//!
//! Algorithms ending a pipeline branch with a `Feature` output. Their
//! Results are retained in the node's history for display and export.

mod first_order_statistics;

pub use first_order_statistics::FirstOrderStatistics;
