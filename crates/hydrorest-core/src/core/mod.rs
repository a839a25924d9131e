//! # Core Module
//!
//! Fundamental data structures and algorithms that the engine builds on.
//!
//! - **Crystal Representation** ([`models`]) - Lattices, fractional sites and element data
//! - **Field Analysis** ([`grid`]) - Periodic sample grids and local-maximum detection
//! - **File I/O** ([`io`]) - CIF and cube files, fallback records and peak snapshots
//! - **Units** ([`units`]) - Physical conversion constants shared across modules

pub mod grid;
pub mod io;
pub mod models;
pub mod units;
