use crate::core::io::cif::CifFile;
use crate::core::io::traits::StructureFile;
use crate::core::models::structure::Structure;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;
use thiserror::Error;

/// The artifacts returned by the fallback solver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    FinalStructure,
    ResultRecord,
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtifactKind::FinalStructure => write!(f, "final structure"),
            ArtifactKind::ResultRecord => write!(f, "result record"),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
#[error("Failed to read {kind} artifact: {message}")]
pub struct ArtifactError {
    pub kind: ArtifactKind,
    pub message: String,
}

impl ArtifactError {
    pub fn new(kind: ArtifactKind, message: impl fmt::Display) -> Self {
        Self {
            kind,
            message: message.to_string(),
        }
    }
}

/// Result record written by the fallback solver next to its final structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FallbackRecord {
    /// Fractional positions of the atoms the solver placed.
    pub positions: Vec<[f64; 3]>,
    /// Pseudo-identifier of the placed species.
    pub pseudo: String,
    /// Number of atoms the solver was asked to place.
    #[serde(rename = "tot_pinballs")]
    pub requested: usize,
}

/// Input handed to the fallback solver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FallbackInput {
    /// Input file of the field computation whose working directory the solver reuses.
    pub pwin: String,
    #[serde(rename = "tot_pinballs")]
    pub remaining: usize,
    pub pseudo: String,
    /// Every candidate peak, strongest first, in fractional coordinates.
    pub positions: Vec<[f64; 3]>,
}

impl FallbackInput {
    pub fn write_to(&self, writer: &mut impl Write) -> io::Result<()> {
        serde_json::to_writer_pretty(&mut *writer, self)?;
        writeln!(writer)
    }

    pub fn write_to_path<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        self.write_to(&mut writer)?;
        writer.flush()
    }
}

/// Parses a fallback result record.
pub fn read_result_record(reader: impl Read) -> Result<FallbackRecord, ArtifactError> {
    serde_json::from_reader(reader).map_err(|e| ArtifactError::new(ArtifactKind::ResultRecord, e))
}

pub fn read_result_record_path<P: AsRef<Path>>(path: P) -> Result<FallbackRecord, ArtifactError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| {
        ArtifactError::new(
            ArtifactKind::ResultRecord,
            format!("{}: {e}", path.display()),
        )
    })?;
    read_result_record(BufReader::new(file))
}

/// Reads the fallback solver's final structure (a P1 CIF file).
pub fn read_final_structure<P: AsRef<Path>>(path: P) -> Result<Structure, ArtifactError> {
    let path = path.as_ref();
    CifFile::read_from_path(path)
        .map(|(structure, _)| structure)
        .map_err(|e| {
            ArtifactError::new(
                ArtifactKind::FinalStructure,
                format!("{}: {e}", path.display()),
            )
        })
}
