//! # Engine Module
//!
//! The iterative restoration engine: it turns ranked field maxima into new atoms
//! and alternates that step with external field computations and relaxations
//! until the structure holds the requested number of tracked atoms.
//!
//! ## Architecture
//!
//! - **Configuration** ([`config`]) - Detection, allocation, relaxation and loop parameters
//! - **Site Allocation** ([`allocator`]) - Budgeted, proximity-checked placement of peaks
//! - **Services** ([`services`]) - Traits for the field solver, relaxer, fallback solver,
//!   energy calculator and artifact cleaner
//! - **State Machine** ([`machine`], [`state`]) - One transition function per phase, with the
//!   run state passed explicitly between phases
//! - **Progress Monitoring** ([`progress`]) - Callback-based progress reporting
//! - **Error Handling** ([`error`]) - Engine errors tagged by the failing stage

pub mod allocator;
pub mod config;
pub mod context;
pub mod error;
pub mod machine;
pub mod progress;
pub mod services;
pub mod state;

#[cfg(test)]
pub(crate) mod testing;
