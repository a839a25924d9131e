use crate::core::io::traits::StructureFile;
use crate::core::models::element;
use crate::core::models::lattice::{Lattice, LatticeError};
use crate::core::models::structure::{Site, Structure};
use nalgebra::Point3;
use std::collections::HashMap;
use std::io::{self, BufRead, Write};
use std::iter::Peekable;
use thiserror::Error;

const DEFAULT_DATA_NAME: &str = "hydrorest";

#[derive(Debug, Clone, PartialEq)]
pub struct CifMetadata {
    /// Block name following `data_`.
    pub data_name: String,
}

impl Default for CifMetadata {
    fn default() -> Self {
        Self {
            data_name: DEFAULT_DATA_NAME.to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum CifError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Parse error on line {line}: {kind}")]
    Parse { line: usize, kind: CifParseErrorKind },
    #[error("Missing required item: {0}")]
    MissingItem(&'static str),
    #[error("Invalid number for {tag}: '{value}'")]
    InvalidNumber { tag: String, value: String },
    #[error("Unsupported symmetry: {0} (only P1 structures are supported)")]
    UnsupportedSymmetry(String),
    #[error("Cannot determine element for atom site '{0}'")]
    UnknownElement(String),
    #[error("Invalid cell: {0}")]
    Lattice(#[from] LatticeError),
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CifParseErrorKind {
    #[error("unterminated quoted value")]
    UnterminatedQuote,
    #[error("unterminated semicolon text field")]
    UnterminatedTextField,
    #[error("tag '{0}' has no value")]
    MissingValue(String),
    #[error("loop_ declares no tags")]
    EmptyLoop,
    #[error("loop with {tags} tags has {values} values")]
    RaggedLoop { tags: usize, values: usize },
    #[error("unexpected value '{0}' outside a loop")]
    UnexpectedValue(String),
}

#[derive(Debug, Clone)]
struct Token {
    text: String,
    line: usize,
    quoted: bool,
}

impl Token {
    fn is_keyword(&self, keyword: &str) -> bool {
        !self.quoted && self.text.eq_ignore_ascii_case(keyword)
    }

    fn is_tag(&self) -> bool {
        !self.quoted && self.text.starts_with('_')
    }

    fn is_data_block(&self) -> bool {
        !self.quoted
            && self
                .text
                .get(..5)
                .is_some_and(|prefix| prefix.eq_ignore_ascii_case("data_"))
    }

    fn ends_loop_body(&self) -> bool {
        self.is_tag() || self.is_keyword("loop_") || self.is_data_block()
    }
}

fn tokenize(reader: &mut impl BufRead) -> Result<Vec<Token>, CifError> {
    let mut tokens = Vec::new();
    let mut text_field: Option<(usize, String)> = None;

    for (line_num, line_res) in reader.lines().enumerate() {
        let line = line_res?;
        let line_num = line_num + 1;

        if let Some((start, mut text)) = text_field.take() {
            if line.starts_with(';') {
                tokens.push(Token {
                    text: text.trim_end().to_string(),
                    line: start,
                    quoted: true,
                });
            } else {
                text.push_str(&line);
                text.push('\n');
                text_field = Some((start, text));
            }
            continue;
        }

        if let Some(rest) = line.strip_prefix(';') {
            text_field = Some((line_num, format!("{rest}\n")));
            continue;
        }

        tokenize_line(&line, line_num, &mut tokens)?;
    }

    if let Some((start, _)) = text_field {
        return Err(CifError::Parse {
            line: start,
            kind: CifParseErrorKind::UnterminatedTextField,
        });
    }
    Ok(tokens)
}

fn tokenize_line(line: &str, line_num: usize, tokens: &mut Vec<Token>) -> Result<(), CifError> {
    let chars: Vec<char> = line.chars().collect();
    let mut pos = 0;

    while pos < chars.len() {
        let c = chars[pos];
        if c.is_whitespace() {
            pos += 1;
            continue;
        }
        if c == '#' {
            break;
        }

        if c == '\'' || c == '"' {
            let start = pos + 1;
            let mut end = start;
            loop {
                if end >= chars.len() {
                    return Err(CifError::Parse {
                        line: line_num,
                        kind: CifParseErrorKind::UnterminatedQuote,
                    });
                }
                let closes = chars[end] == c
                    && chars.get(end + 1).is_none_or(|next| next.is_whitespace());
                if closes {
                    break;
                }
                end += 1;
            }
            tokens.push(Token {
                text: chars[start..end].iter().collect(),
                line: line_num,
                quoted: true,
            });
            pos = end + 1;
        } else {
            let start = pos;
            while pos < chars.len() && !chars[pos].is_whitespace() {
                pos += 1;
            }
            tokens.push(Token {
                text: chars[start..pos].iter().collect(),
                line: line_num,
                quoted: false,
            });
        }
    }
    Ok(())
}

#[derive(Debug, Default)]
struct CifLoop {
    tags: Vec<String>,
    values: Vec<String>,
}

impl CifLoop {
    fn column(&self, tag: &str) -> Option<usize> {
        self.tags.iter().position(|t| t == tag)
    }

    fn rows(&self) -> impl Iterator<Item = &[String]> {
        self.values.chunks(self.tags.len())
    }
}

#[derive(Debug, Default)]
struct CifBlock {
    name: String,
    items: HashMap<String, String>,
    loops: Vec<CifLoop>,
}

impl CifBlock {
    fn parse(tokens: Vec<Token>) -> Result<Self, CifError> {
        let mut block = CifBlock::default();
        let mut seen_block = false;
        let mut iter = tokens.into_iter().peekable();

        while let Some(token) = iter.next() {
            if token.is_data_block() {
                if seen_block {
                    break;
                }
                seen_block = true;
                block.name = token.text[5..].to_string();
            } else if token.is_keyword("loop_") {
                block.loops.push(Self::parse_loop(&mut iter, token.line)?);
            } else if token.is_tag() {
                let value = iter.next().filter(|v| !v.is_tag()).ok_or_else(|| CifError::Parse {
                    line: token.line,
                    kind: CifParseErrorKind::MissingValue(token.text.clone()),
                })?;
                block.items.insert(token.text.to_ascii_lowercase(), value.text);
            } else {
                return Err(CifError::Parse {
                    line: token.line,
                    kind: CifParseErrorKind::UnexpectedValue(token.text),
                });
            }
        }
        Ok(block)
    }

    fn parse_loop(
        iter: &mut Peekable<impl Iterator<Item = Token>>,
        line: usize,
    ) -> Result<CifLoop, CifError> {
        let mut cif_loop = CifLoop::default();
        while let Some(tag) = iter.next_if(Token::is_tag) {
            cif_loop.tags.push(tag.text.to_ascii_lowercase());
        }
        if cif_loop.tags.is_empty() {
            return Err(CifError::Parse {
                line,
                kind: CifParseErrorKind::EmptyLoop,
            });
        }
        while let Some(value) = iter.next_if(|t| !t.ends_loop_body()) {
            cif_loop.values.push(value.text);
        }
        if cif_loop.values.len() % cif_loop.tags.len() != 0 {
            return Err(CifError::Parse {
                line,
                kind: CifParseErrorKind::RaggedLoop {
                    tags: cif_loop.tags.len(),
                    values: cif_loop.values.len(),
                },
            });
        }
        Ok(cif_loop)
    }

    fn find_loop(&self, tag: &str) -> Option<&CifLoop> {
        self.loops.iter().find(|l| l.column(tag).is_some())
    }

    fn number(&self, tag: &'static str) -> Result<f64, CifError> {
        let raw = self.items.get(tag).ok_or(CifError::MissingItem(tag))?;
        parse_number(tag, raw)
    }
}

/// Parses a CIF numeric value, dropping a trailing standard uncertainty such as `(4)`.
fn parse_number(tag: &str, raw: &str) -> Result<f64, CifError> {
    let trimmed = raw.split('(').next().unwrap_or(raw).trim();
    trimmed.parse::<f64>().map_err(|_| CifError::InvalidNumber {
        tag: tag.to_string(),
        value: raw.to_string(),
    })
}

fn is_identity_operation(op: &str) -> bool {
    let compact: String = op
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| c.to_ascii_lowercase())
        .collect();
    matches!(compact.as_str(), "x,y,z" | "+x,+y,+z")
}

fn check_symmetry(block: &CifBlock) -> Result<(), CifError> {
    for tag in [
        "_symmetry_space_group_name_h-m",
        "_space_group_name_h-m_alt",
    ] {
        if let Some(name) = block.items.get(tag) {
            let compact: String = name.chars().filter(|c| !c.is_whitespace()).collect();
            if !compact.eq_ignore_ascii_case("p1") && compact != "?" && compact != "." {
                return Err(CifError::UnsupportedSymmetry(format!("space group '{name}'")));
            }
        }
    }
    for tag in ["_symmetry_int_tables_number", "_space_group_it_number"] {
        if let Some(number) = block.items.get(tag) {
            if number.trim() != "1" {
                return Err(CifError::UnsupportedSymmetry(format!(
                    "space group number {number}"
                )));
            }
        }
    }
    for tag in [
        "_symmetry_equiv_pos_as_xyz",
        "_space_group_symop_operation_xyz",
    ] {
        if let Some(op_loop) = block.find_loop(tag) {
            let column = op_loop.column(tag).unwrap_or(0);
            if let Some(op) = op_loop.rows().map(|row| &row[column]).find(|op| !is_identity_operation(op)) {
                return Err(CifError::UnsupportedSymmetry(format!("operation '{op}'")));
            }
        }
        if let Some(op) = block.items.get(tag) {
            if !is_identity_operation(op) {
                return Err(CifError::UnsupportedSymmetry(format!("operation '{op}'")));
            }
        }
    }
    Ok(())
}

fn read_sites(block: &CifBlock) -> Result<Vec<Site>, CifError> {
    let Some(atom_loop) = block.find_loop("_atom_site_fract_x") else {
        return Ok(Vec::new());
    };

    let column = |tag: &'static str| atom_loop.column(tag).ok_or(CifError::MissingItem(tag));
    let fract = [
        column("_atom_site_fract_x")?,
        column("_atom_site_fract_y")?,
        column("_atom_site_fract_z")?,
    ];
    let kind_column = atom_loop
        .column("_atom_site_type_symbol")
        .or_else(|| atom_loop.column("_atom_site_label"))
        .ok_or(CifError::MissingItem("_atom_site_type_symbol"))?;
    let fract_tags = ["_atom_site_fract_x", "_atom_site_fract_y", "_atom_site_fract_z"];

    atom_loop
        .rows()
        .map(|row| {
            let raw_kind = &row[kind_column];
            let kind = element::normalize_symbol(raw_kind)
                .ok_or_else(|| CifError::UnknownElement(raw_kind.clone()))?;
            let mut coords = [0.0; 3];
            for axis in 0..3 {
                coords[axis] = parse_number(fract_tags[axis], &row[fract[axis]])?;
            }
            Ok(Site::new(kind, Point3::from(coords)))
        })
        .collect()
}

/// Reader and writer for the P1 subset of the Crystallographic Information File format.
pub struct CifFile;

impl StructureFile for CifFile {
    type Metadata = CifMetadata;
    type Error = CifError;

    fn read_from(reader: &mut impl BufRead) -> Result<(Structure, Self::Metadata), Self::Error> {
        let block = CifBlock::parse(tokenize(reader)?)?;
        check_symmetry(&block)?;

        let lengths = [
            block.number("_cell_length_a")?,
            block.number("_cell_length_b")?,
            block.number("_cell_length_c")?,
        ];
        let angles = [
            block.number("_cell_angle_alpha")?,
            block.number("_cell_angle_beta")?,
            block.number("_cell_angle_gamma")?,
        ];
        let lattice = Lattice::from_parameters(lengths, angles)?;
        let sites = read_sites(&block)?;

        let data_name = if block.name.is_empty() {
            DEFAULT_DATA_NAME.to_string()
        } else {
            block.name
        };
        Ok((Structure::new(lattice, sites), CifMetadata { data_name }))
    }

    fn write_to(
        structure: &Structure,
        metadata: &Self::Metadata,
        writer: &mut impl Write,
    ) -> Result<(), Self::Error> {
        let ([a, b, c], [alpha, beta, gamma]) = structure.lattice().parameters();

        writeln!(writer, "data_{}", metadata.data_name)?;
        writeln!(writer, "_symmetry_space_group_name_H-M   'P 1'")?;
        writeln!(writer, "_cell_length_a   {a:.8}")?;
        writeln!(writer, "_cell_length_b   {b:.8}")?;
        writeln!(writer, "_cell_length_c   {c:.8}")?;
        writeln!(writer, "_cell_angle_alpha   {alpha:.8}")?;
        writeln!(writer, "_cell_angle_beta   {beta:.8}")?;
        writeln!(writer, "_cell_angle_gamma   {gamma:.8}")?;
        writeln!(writer, "_symmetry_Int_Tables_number   1")?;
        writeln!(writer, "_chemical_formula_sum   '{}'", formula(structure))?;
        writeln!(writer, "_cell_volume   {:.8}", structure.lattice().volume())?;
        writeln!(writer, "loop_")?;
        writeln!(writer, " _symmetry_equiv_pos_site_id")?;
        writeln!(writer, " _symmetry_equiv_pos_as_xyz")?;
        writeln!(writer, "  1  'x, y, z'")?;
        writeln!(writer, "loop_")?;
        writeln!(writer, " _atom_site_type_symbol")?;
        writeln!(writer, " _atom_site_label")?;
        writeln!(writer, " _atom_site_symmetry_multiplicity")?;
        writeln!(writer, " _atom_site_fract_x")?;
        writeln!(writer, " _atom_site_fract_y")?;
        writeln!(writer, " _atom_site_fract_z")?;
        writeln!(writer, " _atom_site_occupancy")?;

        let mut per_kind: HashMap<&str, usize> = HashMap::new();
        for site in structure.sites() {
            let index = per_kind.entry(site.kind.as_str()).or_insert(0);
            let p = &site.position;
            writeln!(
                writer,
                "  {kind}  {kind}{index}  1  {:.8}  {:.8}  {:.8}  1",
                p.x,
                p.y,
                p.z,
                kind = site.kind
            )?;
            *index += 1;
        }
        Ok(())
    }
}

fn formula(structure: &Structure) -> String {
    structure
        .composition()
        .iter()
        .map(|(kind, count)| format!("{kind}{count}"))
        .collect::<Vec<_>>()
        .join(" ")
}
