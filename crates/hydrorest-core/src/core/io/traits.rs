use crate::core::models::structure::Structure;
use std::error::Error;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::Path;

/// Common interface of the structure file formats.
///
/// Implementors parse a [`Structure`] together with format-specific metadata
/// and serialise it back.
pub trait StructureFile {
    /// Format-specific data carried alongside the structure.
    type Metadata;

    /// The error type for parsing and I/O failures.
    type Error: Error + From<io::Error>;

    /// Reads a structure from a buffered reader.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is malformed or cannot be read.
    fn read_from(reader: &mut impl BufRead) -> Result<(Structure, Self::Metadata), Self::Error>;

    /// Writes a structure and its metadata.
    ///
    /// # Errors
    ///
    /// Returns an error if the structure cannot be expressed in this format or
    /// the writer fails.
    fn write_to(
        structure: &Structure,
        metadata: &Self::Metadata,
        writer: &mut impl Write,
    ) -> Result<(), Self::Error>;

    /// Writes a structure with default metadata.
    fn write_structure_to(structure: &Structure, writer: &mut impl Write) -> Result<(), Self::Error>
    where
        Self::Metadata: Default,
    {
        Self::write_to(structure, &Self::Metadata::default(), writer)
    }

    fn read_from_path<P: AsRef<Path>>(path: P) -> Result<(Structure, Self::Metadata), Self::Error> {
        let file = File::open(path)?;
        let mut reader = BufReader::new(file);
        Self::read_from(&mut reader)
    }

    fn write_to_path<P: AsRef<Path>>(
        structure: &Structure,
        metadata: &Self::Metadata,
        path: P,
    ) -> Result<(), Self::Error> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        Self::write_to(structure, metadata, &mut writer)?;
        writer.flush()?;
        Ok(())
    }

    fn write_structure_to_path<P: AsRef<Path>>(
        structure: &Structure,
        path: P,
    ) -> Result<(), Self::Error>
    where
        Self::Metadata: Default,
    {
        Self::write_to_path(structure, &Self::Metadata::default(), path)
    }
}
