//! # Core Models Module
//!
//! Data structures describing a periodic crystal: the cell geometry, the sites it
//! holds and the element table used when structures are read from files that only
//! carry atomic numbers.
//!
//! ## Key Components
//!
//! - [`lattice`] - Cell vectors, fractional/Cartesian conversion and minimum-image distances
//! - [`structure`] - Fractional sites grouped by kind, with proximity-checked insertion
//! - [`element`] - Symbol lookup by atomic number and label normalisation
//!
//! ## Usage
//!
//! ```ignore
//! use hydrorest::core::models::{lattice::Lattice, structure::Structure};
//!
//! let lattice = Lattice::cubic(6.0)?;
//! let structure = Structure::empty(lattice)
//!     .with_site("O", Point3::new(0.5, 0.5, 0.5), 0.5)?
//!     .with_site("H", Point3::new(0.5, 0.5, 0.65), 0.5)?;
//! assert_eq!(structure.count_of("H"), 1);
//! ```

pub mod element;
pub mod lattice;
pub mod structure;
