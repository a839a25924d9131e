//! Periodic sample grids and local-maximum detection.
//!
//! - [`field`] - The immutable [`field::GridField`] and the [`field::SampleGrid`] view trait
//! - [`filter`] - Separable maximum filter with clamped borders
//! - [`peaks`] - Periodic peak detection, ranking and threshold filtering

pub mod field;
pub mod filter;
pub mod peaks;
