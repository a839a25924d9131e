//! Reading and writing the files exchanged with external solvers.
//!
//! Structures travel as P1 CIF files ([`cif`]) and fields arrive as Gaussian cube
//! files ([`cube`]); both implement the shared [`traits::StructureFile`] interface.
//! The fallback solver's JSON input and result record live in [`record`], and the
//! peak snapshot can be exported as CSV through [`snapshot`].

pub mod cif;
pub mod cube;
pub mod record;
pub mod snapshot;
pub mod traits;
