//! # Workflows Module
//!
//! Top-level entry points of the library.
//!
//! - **Restoration** ([`restore`]) - The full iterative run: optional reference energy,
//!   the refinement state machine, and opt-in cleanup of external artifacts.
//! - **One-shot Detection** ([`detect`]) - A single detect-and-place pass over a field that
//!   was computed elsewhere, such as one read from a cube file.

pub mod detect;
pub mod restore;
