use crate::core::grid::field::{self, GridError, GridField, SampleGrid};
use crate::core::io::traits::StructureFile;
use crate::core::models::element;
use crate::core::models::lattice::{Lattice, LatticeError};
use crate::core::models::structure::{Site, Structure};
use crate::core::units::{angstrom_to_bohr, bohr_to_angstrom};
use nalgebra::{Point3, Vector3};
use std::io::{self, BufRead, Write};
use thiserror::Error;

const VALUES_PER_LINE: usize = 6;

/// Everything a cube file carries besides the structure.
#[derive(Debug, Clone, PartialEq)]
pub struct CubeMetadata {
    pub comments: [String; 2],
    /// Grid origin in Å.
    pub origin: Point3<f64>,
    pub field: GridField,
}

#[derive(Debug, Error)]
pub enum CubeError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Parse error on line {line}: {message}")]
    Parse { line: usize, message: String },
    #[error("Unexpected end of file while reading {0}")]
    UnexpectedEof(&'static str),
    #[error("Unknown element: {0}")]
    UnknownElement(String),
    #[error("Invalid cell: {0}")]
    Lattice(#[from] LatticeError),
    #[error("Invalid grid: {0}")]
    Grid(#[from] GridError),
}

struct LineReader<'r, R: BufRead> {
    lines: io::Lines<&'r mut R>,
    line_num: usize,
}

impl<'r, R: BufRead> LineReader<'r, R> {
    fn new(reader: &'r mut R) -> Self {
        Self {
            lines: reader.lines(),
            line_num: 0,
        }
    }

    fn next_line(&mut self, what: &'static str) -> Result<String, CubeError> {
        self.line_num += 1;
        self.lines.next().ok_or(CubeError::UnexpectedEof(what))?.map_err(CubeError::from)
    }

    fn fields(&mut self, what: &'static str) -> Result<Vec<String>, CubeError> {
        Ok(self
            .next_line(what)?
            .split_whitespace()
            .map(str::to_string)
            .collect())
    }

    fn parse_error(&self, message: impl Into<String>) -> CubeError {
        CubeError::Parse {
            line: self.line_num,
            message: message.into(),
        }
    }

    fn number<T: std::str::FromStr>(&self, fields: &[String], index: usize) -> Result<T, CubeError> {
        let raw = fields
            .get(index)
            .ok_or_else(|| self.parse_error(format!("expected at least {} columns", index + 1)))?;
        raw.parse()
            .map_err(|_| self.parse_error(format!("invalid number '{raw}'")))
    }
}

/// Reader and writer for Gaussian cube files.
///
/// Axis lines with a positive voxel count are in Bohr, negative counts mean Å.
/// A negative atom count announces an extra line of data-set identifiers after
/// the atom block. Samples are stored with the last axis varying fastest.
pub struct CubeFile;

impl StructureFile for CubeFile {
    type Metadata = CubeMetadata;
    type Error = CubeError;

    fn read_from(reader: &mut impl BufRead) -> Result<(Structure, Self::Metadata), Self::Error> {
        let mut lines = LineReader::new(reader);
        let comments = [
            lines.next_line("the first comment line")?,
            lines.next_line("the second comment line")?,
        ];

        let header = lines.fields("the atom count line")?;
        let signed_atoms: i64 = lines.number(&header, 0)?;
        let raw_origin = Vector3::new(
            lines.number(&header, 1)?,
            lines.number(&header, 2)?,
            lines.number(&header, 3)?,
        );

        let mut dims = [0usize; 3];
        let mut steps = [Vector3::zeros(); 3];
        let mut in_bohr = true;
        for axis in 0..3 {
            let fields = lines.fields("the axis lines")?;
            let count: i64 = lines.number(&fields, 0)?;
            if axis == 0 {
                in_bohr = count > 0;
            }
            dims[axis] = count.unsigned_abs() as usize;
            steps[axis] = Vector3::new(
                lines.number(&fields, 1)?,
                lines.number(&fields, 2)?,
                lines.number(&fields, 3)?,
            );
        }
        if field::sample_count(dims).is_none() {
            return Err(lines.parse_error(format!(
                "grid of {}x{}x{} samples is too large",
                dims[0], dims[1], dims[2]
            )));
        }
        let to_angstrom = |v: Vector3<f64>| if in_bohr { v.map(bohr_to_angstrom) } else { v };

        let origin = Point3::from(to_angstrom(raw_origin));
        let lattice = Lattice::from_vectors(
            to_angstrom(steps[0] * dims[0] as f64),
            to_angstrom(steps[1] * dims[1] as f64),
            to_angstrom(steps[2] * dims[2] as f64),
        )?;

        let mut sites = Vec::new();
        for _ in 0..signed_atoms.unsigned_abs() {
            let fields = lines.fields("the atom block")?;
            let number: u8 = lines.number(&fields, 0)?;
            let kind = element::symbol(number)
                .ok_or_else(|| CubeError::UnknownElement(format!("atomic number {number}")))?;
            let cartesian = Point3::from(to_angstrom(Vector3::new(
                lines.number(&fields, 2)?,
                lines.number(&fields, 3)?,
                lines.number(&fields, 4)?,
            )));
            let fractional = lattice.to_fractional(&Point3::from(cartesian - origin));
            sites.push(Site::new(kind, fractional));
        }

        if signed_atoms < 0 {
            let fields = lines.fields("the data set identifiers")?;
            let declared: usize = lines.number(&fields, 0)?;
            let mut seen = fields.len().saturating_sub(1);
            while seen < declared {
                seen += lines.fields("the data set identifiers")?.len();
            }
        }

        let mut samples = Vec::new();
        while let Some(line) = lines.lines.next() {
            let line = line?;
            lines.line_num += 1;
            for raw in line.split_whitespace() {
                let value = raw
                    .parse::<f64>()
                    .map_err(|_| lines.parse_error(format!("invalid sample '{raw}'")))?;
                samples.push(value);
            }
        }
        let field = GridField::new(dims, samples)?;

        Ok((
            Structure::new(lattice, sites),
            CubeMetadata {
                comments,
                origin,
                field,
            },
        ))
    }

    fn write_to(
        structure: &Structure,
        metadata: &Self::Metadata,
        writer: &mut impl Write,
    ) -> Result<(), Self::Error> {
        let dims = metadata.field.dims();
        let lattice = structure.lattice();
        let origin = metadata.origin.coords.map(angstrom_to_bohr);

        writeln!(writer, "{}", metadata.comments[0])?;
        writeln!(writer, "{}", metadata.comments[1])?;
        writeln!(
            writer,
            "{:5} {:12.6} {:12.6} {:12.6}",
            structure.len(),
            origin.x,
            origin.y,
            origin.z
        )?;
        for axis in 0..3 {
            let step = lattice.vector(axis).map(angstrom_to_bohr) / dims[axis] as f64;
            writeln!(
                writer,
                "{:5} {:12.6} {:12.6} {:12.6}",
                dims[axis], step.x, step.y, step.z
            )?;
        }
        for site in structure.sites() {
            let number = element::atomic_number(&site.kind)
                .ok_or_else(|| CubeError::UnknownElement(site.kind.clone()))?;
            let position = (lattice.to_cartesian(&site.position) + metadata.origin.coords)
                .coords
                .map(angstrom_to_bohr);
            writeln!(
                writer,
                "{:5} {:12.6} {:12.6} {:12.6} {:12.6}",
                number, number as f64, position.x, position.y, position.z
            )?;
        }
        for chunk in metadata.field.samples().chunks(VALUES_PER_LINE) {
            let line: Vec<String> = chunk.iter().map(|v| format!("{v:13.5E}")).collect();
            writeln!(writer, "{}", line.join(" "))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::units::BOHR_TO_ANGSTROM;
    use std::io::Cursor;

    fn sample_cube(axis_count: i64) -> String {
        let mut text = String::from("comment one\ncomment two\n");
        text.push_str("    2    0.000000    0.000000    0.000000\n");
        text.push_str(&format!("{axis_count:5}    2.000000    0.000000    0.000000\n"));
        text.push_str(&format!("{:5}    0.000000    2.000000    0.000000\n", axis_count + 1));
        text.push_str(&format!("{:5}    0.000000    0.000000    2.000000\n", axis_count + 2));
        text.push_str("    8    8.000000    0.000000    0.000000    0.000000\n");
        text.push_str("    1    1.000000    1.000000    2.000000    3.000000\n");
        let n = (axis_count.abs() * (axis_count.abs() + 1) * (axis_count.abs() + 2)) as usize;
        let values: Vec<String> = (0..n).map(|v| format!("{v}.0")).collect();
        for chunk in values.chunks(6) {
            text.push_str(&chunk.join(" "));
            text.push('\n');
        }
        text
    }

    #[test]
    fn reads_dims_and_sample_order() {
        let (structure, metadata) = CubeFile::read_from(&mut Cursor::new(sample_cube(2))).unwrap();
        assert_eq!(metadata.field.dims(), [2, 3, 4]);
        assert_eq!(metadata.field.get([0, 0, 1]), Some(1.0));
        assert_eq!(metadata.field.get([0, 1, 0]), Some(4.0));
        assert_eq!(metadata.field.get([1, 0, 0]), Some(12.0));
        assert_eq!(metadata.comments[1], "comment two");
        assert_eq!(structure.count_of("O"), 1);
        assert_eq!(structure.count_of("H"), 1);
    }

    #[test]
    fn positive_counts_are_bohr() {
        let (structure, _) = CubeFile::read_from(&mut Cursor::new(sample_cube(2))).unwrap();
        let (lengths, _) = structure.lattice().parameters();
        assert!((lengths[0] - 4.0 * BOHR_TO_ANGSTROM).abs() < 1e-9);
        let h = &structure.sites()[1].position;
        assert!((h - Point3::new(0.25, 2.0 / 6.0, 3.0 / 8.0)).norm() < 1e-12);
    }

    #[test]
    fn negative_counts_are_angstrom() {
        let text = sample_cube(2)
            .replace("    2    2.000000", "   -2    2.000000")
            .replace("    3    0.000000    2.0", "   -3    0.000000    2.0")
            .replace("    4    0.000000    0.000000    2.0", "   -4    0.000000    0.000000    2.0");
        let (structure, metadata) = CubeFile::read_from(&mut Cursor::new(text)).unwrap();
        assert_eq!(metadata.field.dims(), [2, 3, 4]);
        let (lengths, _) = structure.lattice().parameters();
        assert!((lengths[0] - 4.0).abs() < 1e-12);
        assert!((lengths[2] - 8.0).abs() < 1e-12);
    }

    #[test]
    fn negative_atom_count_skips_data_set_identifiers() {
        let text = sample_cube(2).replacen("    2    0.000000", "   -2    0.000000", 1);
        let text = text.replacen(
            "    1    1.000000    1.000000    2.000000    3.000000\n",
            "    1    1.000000    1.000000    2.000000    3.000000\n    1   7\n",
            1,
        );
        let (_, metadata) = CubeFile::read_from(&mut Cursor::new(text)).unwrap();
        assert_eq!(metadata.field.samples().len(), 24);
        assert_eq!(metadata.field.get([1, 2, 3]), Some(23.0));
    }

    #[test]
    fn sample_count_mismatch_is_reported() {
        let mut text = sample_cube(2);
        text.push_str("99.0\n");
        assert!(matches!(
            CubeFile::read_from(&mut Cursor::new(text)),
            Err(CubeError::Grid(GridError::SampleCountMismatch { .. }))
        ));
    }

    #[test]
    fn truncated_header_is_reported() {
        let text = "only one line\n";
        assert!(matches!(
            CubeFile::read_from(&mut Cursor::new(text)),
            Err(CubeError::UnexpectedEof(_))
        ));
    }

    #[test]
    fn oversized_axis_counts_are_a_parse_error() {
        let text = sample_cube(2)
            .replacen("    2    2.000000", "4000000    2.000000", 1)
            .replacen("    3    0.000000    2.0", "4000000    0.000000    2.0", 1)
            .replacen("    4    0.000000    0.000000    2.0", "4000000    0.000000    0.000000    2.0", 1);
        match CubeFile::read_from(&mut Cursor::new(text)) {
            Err(CubeError::Parse { line, message }) => {
                assert_eq!(line, 6);
                assert!(message.contains("too large"));
            }
            other => panic!("expected a parse error, got {other:?}"),
        }
    }

    #[test]
    fn huge_atom_count_fails_without_preallocating() {
        let text = sample_cube(2).replacen("    2    0.000000", "9000000000000    0.000000", 1);
        assert!(matches!(
            CubeFile::read_from(&mut Cursor::new(text)),
            Err(CubeError::UnexpectedEof(_)) | Err(CubeError::Parse { .. })
        ));
    }

    #[test]
    fn written_cube_can_be_read_back() {
        let (structure, metadata) = CubeFile::read_from(&mut Cursor::new(sample_cube(2))).unwrap();
        let mut buffer = Vec::new();
        CubeFile::write_to(&structure, &metadata, &mut buffer).unwrap();
        let (again, metadata_again) = CubeFile::read_from(&mut Cursor::new(buffer)).unwrap();
        assert_eq!(metadata_again.field.dims(), metadata.field.dims());
        assert_eq!(again.composition(), structure.composition());
        for (a, b) in metadata.field.samples().iter().zip(metadata_again.field.samples()) {
            assert!((a - b).abs() < 1e-4);
        }
    }
}
