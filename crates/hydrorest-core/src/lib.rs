//! # HydroRest Core Library
//!
//! Restores missing hydrogen sites in periodic crystal structures by repeatedly
//! computing a field over the unit cell and placing atoms at its strongest maxima.
//!
//! ## Architectural Philosophy
//!
//! The library follows a strict three-layer architecture:
//!
//! - **[`core`]: The Foundation.** Stateless data models (`Structure`, `Lattice`,
//!   `GridField`), the periodic peak detector, and artifact I/O (CIF, cube files,
//!   result records, peak snapshots).
//!
//! - **[`engine`]: The Logic Core.** The site allocator, the boundary traits for the
//!   external field, relaxation and fallback services, and the refinement state machine
//!   that alternates field computation with site placement.
//!
//! - **[`workflows`]: The Public API.** Complete procedures built on the engine: the
//!   full restoration run and a one-shot detect-and-place pass over an existing field.

pub mod core;
pub mod engine;
pub mod workflows;
