//! Magnopy-style exchange parameter files.
//!
//! ```text
//! ================================================================================
//! # free-form comments
//! ================================================================================
//! cell a
//! 3.79 0 0
//! ...
//! --------------------------------------------------------------------------------
//! atoms a
//! 0Fe(l:All) 0 0 11.65
//! --------------------------------------------------------------------------------
//! exchange m
//! 0Fe(l:All) 1Fe(l:All) 0 0 0
//! isotropic -82.08
//! dmi 0.12 -0.0008 0.00000007
//! symmetric -0.6 -0.8 -0.0003 -0.00001 -0.00003
//! --------------------------------------------------------------------------------
//! on-site m
//! 0Fe(l:All)
//! anisotropy 0.16 0.16 0 0 0 0
//! ================================================================================
//! ```
//!
//! Symmetric exchange is stored as `[Sxx, Syy, Sxy, Sxz, Syz]` and anisotropy as
//! `[Kxx, Kyy, Kzz, Kxy, Kxz, Kyz]`. Separator lines are cosmetic.

use super::traits::ExchangeFormat;
use crate::core::models::entity::MagneticEntity;
use crate::core::models::layout::Layout;
use crate::core::models::pair::Pair;
use crate::core::units::{EnergyUnit, LengthUnit};
use nalgebra::{Matrix3, Vector3};
use std::io::{self, BufRead, Write};
use thiserror::Error;

const RULE_MAJOR: &str =
    "================================================================================";
const RULE_MINOR: &str =
    "--------------------------------------------------------------------------------";

#[derive(Debug, Error)]
pub enum ExchangeFileError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Parse error on line {line}: {kind}")]
    Parse { line: usize, kind: ParseErrorKind },
    #[error("Missing required section: {0}")]
    MissingSection(&'static str),
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParseErrorKind {
    #[error("unexpected content '{content}'")]
    UnexpectedLine { content: String },
    #[error("invalid number '{value}'")]
    InvalidNumber { value: String },
    #[error("expected {expected} fields, found {found} in '{content}'")]
    FieldCount {
        expected: usize,
        found: usize,
        content: String,
    },
    #[error("expected a '{expected}' line, found '{content}'")]
    MissingLabel {
        expected: &'static str,
        content: String,
    },
    #[error("unknown unit '{unit}'")]
    UnknownUnit { unit: String },
    #[error("unit '{unit}' differs from the other energy section")]
    UnitMismatch { unit: String },
    #[error("section '{name}' appears twice")]
    DuplicateSection { name: String },
    #[error("'{tag}' is not listed in the atoms section")]
    UnknownAtom { tag: String },
    #[error("record is truncated at the end of the file")]
    Truncated,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AtomRecord {
    pub tag: String,
    pub xyz: Vector3<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExchangeRecord {
    pub tag1: String,
    pub tag2: String,
    pub ruc: Vector3<i32>,
    pub iso: f64,
    pub dm: Vector3<f64>,
    /// `[Sxx, Syy, Sxy, Sxz, Syz]`.
    pub s: [f64; 5],
    pub xyz1: Vector3<f64>,
    pub xyz2: Vector3<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OnsiteRecord {
    pub tag: String,
    /// `[Kxx, Kyy, Kzz, Kxy, Kxz, Kyz]`.
    pub k: [f64; 6],
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExchangeFile {
    pub comments: Vec<String>,
    pub length_unit: LengthUnit,
    /// Lattice vectors as rows.
    pub cell: Matrix3<f64>,
    pub atoms: Vec<AtomRecord>,
    pub energy_unit: EnergyUnit,
    pub exchange: Vec<ExchangeRecord>,
    pub onsite: Vec<OnsiteRecord>,
}

impl ExchangeFile {
    /// Collects the solved tensors of `entities` and `pairs`.
    ///
    /// Entities appear in the atoms section at their mean position; pairs and entities
    /// without a result are skipped.
    pub fn from_parts(
        layout: &Layout,
        entities: &[MagneticEntity],
        pairs: &[Pair],
        energy_unit: EnergyUnit,
    ) -> Self {
        let atoms = entities
            .iter()
            .map(|e| AtomRecord {
                tag: e.tag().to_string(),
                xyz: *e.xyz(),
            })
            .collect();
        let exchange = pairs
            .iter()
            .filter_map(|pair| {
                pair.exchange().map(|tensor| ExchangeRecord {
                    tag1: pair.tag1().to_string(),
                    tag2: pair.tag2().to_string(),
                    ruc: *pair.ruc(),
                    iso: tensor.iso,
                    dm: tensor.dm,
                    s: tensor.s_components(),
                    xyz1: *pair.xyz1(),
                    xyz2: *pair.xyz2(),
                })
            })
            .collect();
        let onsite = entities
            .iter()
            .filter_map(|e| {
                e.anisotropy().map(|k| OnsiteRecord {
                    tag: e.tag().to_string(),
                    k: k.components(),
                })
            })
            .collect();

        Self {
            comments: Vec::new(),
            length_unit: LengthUnit::Angstrom,
            cell: *layout.cell(),
            atoms,
            energy_unit,
            exchange,
            onsite,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MagnopyOptions {
    /// Fixed number of decimals; `None` writes the shortest exact representation.
    pub precision: Option<usize>,
    /// Whether to write [`ExchangeFile::comments`].
    pub comments: bool,
}

pub struct MagnopyFile;

impl ExchangeFormat for MagnopyFile {
    type Options = MagnopyOptions;
    type Error = ExchangeFileError;

    fn read_from(reader: &mut impl BufRead) -> Result<ExchangeFile, Self::Error> {
        let mut comments = Vec::new();
        let mut lines = Vec::new();
        for (index, line) in reader.lines().enumerate() {
            let line = line?;
            let trimmed = line.trim();
            if let Some(comment) = trimmed.strip_prefix('#') {
                comments.push(comment.trim().to_string());
            } else if !trimmed.is_empty() && !is_rule(trimmed) {
                lines.push((index + 1, trimmed.to_string()));
            }
        }

        let mut cursor = Cursor { lines: &lines, at: 0 };
        let mut seen: Vec<String> = Vec::new();
        let mut length_unit = LengthUnit::default();
        let mut energy_unit: Option<EnergyUnit> = None;
        let mut cell = None;
        let mut atoms = None;
        let mut exchange = Vec::new();
        let mut onsite = Vec::new();

        while let Some((line, content)) = cursor.advance() {
            let fields: Vec<&str> = content.split_whitespace().collect();
            let (name, unit) = match fields.as_slice() {
                [name @ ("cell" | "atoms" | "exchange" | "on-site"), unit] => (*name, *unit),
                _ => {
                    return Err(parse_error(
                        line,
                        ParseErrorKind::UnexpectedLine {
                            content: content.to_string(),
                        },
                    ));
                }
            };
            if seen.iter().any(|s| s == name) {
                return Err(parse_error(
                    line,
                    ParseErrorKind::DuplicateSection {
                        name: name.to_string(),
                    },
                ));
            }
            seen.push(name.to_string());

            match name {
                "cell" | "atoms" => {
                    length_unit = unit.parse().map_err(|_| unknown_unit(line, unit))?;
                    if name == "cell" {
                        cell = Some(read_cell(&mut cursor)?);
                    } else {
                        atoms = Some(read_atoms(&mut cursor)?);
                    }
                }
                _ => {
                    let parsed: EnergyUnit =
                        unit.parse().map_err(|_| unknown_unit(line, unit))?;
                    if energy_unit.is_some_and(|u| u != parsed) {
                        return Err(parse_error(
                            line,
                            ParseErrorKind::UnitMismatch {
                                unit: unit.to_string(),
                            },
                        ));
                    }
                    energy_unit = Some(parsed);
                    if name == "exchange" {
                        exchange = read_exchange(&mut cursor, atoms.as_deref().unwrap_or(&[]))?;
                    } else {
                        onsite = read_onsite(&mut cursor)?;
                    }
                }
            }
        }

        Ok(ExchangeFile {
            comments,
            length_unit,
            cell: cell.ok_or(ExchangeFileError::MissingSection("cell"))?,
            atoms: atoms.ok_or(ExchangeFileError::MissingSection("atoms"))?,
            energy_unit: energy_unit.ok_or(ExchangeFileError::MissingSection("exchange"))?,
            exchange,
            onsite,
        })
    }

    fn write_to(
        file: &ExchangeFile,
        options: &Self::Options,
        writer: &mut impl Write,
    ) -> Result<(), Self::Error> {
        let num = |v: f64| match options.precision {
            Some(p) => format!("{:.*}", p, v),
            None => format!("{}", v),
        };
        let nums = |values: &[f64]| values.iter().map(|&v| num(v)).collect::<Vec<_>>().join(" ");

        writeln!(writer, "{}", RULE_MAJOR)?;
        if options.comments && !file.comments.is_empty() {
            for comment in &file.comments {
                writeln!(writer, "# {}", comment)?;
            }
            writeln!(writer, "{}", RULE_MAJOR)?;
        }

        writeln!(writer, "cell {}", file.length_unit.tag())?;
        for row in file.cell.row_iter() {
            writeln!(writer, "{}", nums(&[row[0], row[1], row[2]]))?;
        }

        writeln!(writer, "{}", RULE_MINOR)?;
        writeln!(writer, "atoms {}", file.length_unit.tag())?;
        for atom in &file.atoms {
            writeln!(writer, "{} {}", atom.tag, nums(atom.xyz.as_slice()))?;
        }

        writeln!(writer, "{}", RULE_MINOR)?;
        writeln!(writer, "exchange {}", file.energy_unit.tag())?;
        for record in &file.exchange {
            writeln!(
                writer,
                "{} {} {} {} {}",
                record.tag1, record.tag2, record.ruc.x, record.ruc.y, record.ruc.z
            )?;
            writeln!(writer, "isotropic {}", num(record.iso))?;
            writeln!(writer, "dmi {}", nums(record.dm.as_slice()))?;
            writeln!(writer, "symmetric {}", nums(&record.s))?;
        }

        writeln!(writer, "{}", RULE_MINOR)?;
        writeln!(writer, "on-site {}", file.energy_unit.tag())?;
        for record in &file.onsite {
            writeln!(writer, "{}", record.tag)?;
            writeln!(writer, "anisotropy {}", nums(&record.k))?;
        }
        writeln!(writer, "{}", RULE_MAJOR)?;
        Ok(())
    }
}

struct Cursor<'a> {
    lines: &'a [(usize, String)],
    at: usize,
}

impl<'a> Cursor<'a> {
    fn advance(&mut self) -> Option<(usize, &'a str)> {
        let (line, content) = self.lines.get(self.at)?;
        self.at += 1;
        Some((*line, content.as_str()))
    }

    /// Next line unless it opens a new section.
    fn next_record(&mut self) -> Option<(usize, &'a str)> {
        let (_, content) = self.lines.get(self.at)?;
        if is_section_header(content) {
            None
        } else {
            self.advance()
        }
    }

    fn require(&mut self) -> Result<(usize, &'a str), ExchangeFileError> {
        let last = self.lines.last().map_or(0, |(line, _)| *line);
        self.next_record()
            .ok_or_else(|| parse_error(last, ParseErrorKind::Truncated))
    }
}

fn is_rule(line: &str) -> bool {
    line.chars().all(|c| c == '=') || line.chars().all(|c| c == '-')
}

fn is_section_header(line: &str) -> bool {
    let mut fields = line.split_whitespace();
    matches!(
        (fields.next(), fields.next(), fields.next()),
        (Some("cell" | "atoms" | "exchange" | "on-site"), Some(_), None)
    )
}

fn parse_error(line: usize, kind: ParseErrorKind) -> ExchangeFileError {
    ExchangeFileError::Parse { line, kind }
}

fn unknown_unit(line: usize, unit: &str) -> ExchangeFileError {
    parse_error(
        line,
        ParseErrorKind::UnknownUnit {
            unit: unit.to_string(),
        },
    )
}

fn parse_number<T: std::str::FromStr>(line: usize, value: &str) -> Result<T, ExchangeFileError> {
    value.parse().map_err(|_| {
        parse_error(
            line,
            ParseErrorKind::InvalidNumber {
                value: value.to_string(),
            },
        )
    })
}

fn fields<'a>(
    line: usize,
    content: &'a str,
    expected: usize,
) -> Result<Vec<&'a str>, ExchangeFileError> {
    let fields: Vec<&str> = content.split_whitespace().collect();
    if fields.len() != expected {
        return Err(parse_error(
            line,
            ParseErrorKind::FieldCount {
                expected,
                found: fields.len(),
                content: content.to_string(),
            },
        ));
    }
    Ok(fields)
}

/// Numbers following a `label` keyword.
fn labelled<const N: usize>(
    line: usize,
    content: &str,
    label: &'static str,
) -> Result<[f64; N], ExchangeFileError> {
    let parts = fields(line, content, N + 1)?;
    if parts[0] != label {
        return Err(parse_error(
            line,
            ParseErrorKind::MissingLabel {
                expected: label,
                content: content.to_string(),
            },
        ));
    }
    let mut values = [0.0; N];
    for (value, text) in values.iter_mut().zip(&parts[1..]) {
        *value = parse_number(line, text)?;
    }
    Ok(values)
}

fn read_cell(cursor: &mut Cursor<'_>) -> Result<Matrix3<f64>, ExchangeFileError> {
    let mut cell = Matrix3::zeros();
    for row in 0..3 {
        let (line, content) = cursor.require()?;
        let parts = fields(line, content, 3)?;
        for (col, text) in parts.iter().enumerate() {
            cell[(row, col)] = parse_number(line, text)?;
        }
    }
    Ok(cell)
}

fn read_atoms(cursor: &mut Cursor<'_>) -> Result<Vec<AtomRecord>, ExchangeFileError> {
    let mut atoms = Vec::new();
    while let Some((line, content)) = cursor.next_record() {
        let parts = fields(line, content, 4)?;
        atoms.push(AtomRecord {
            tag: parts[0].to_string(),
            xyz: Vector3::new(
                parse_number(line, parts[1])?,
                parse_number(line, parts[2])?,
                parse_number(line, parts[3])?,
            ),
        });
    }
    Ok(atoms)
}

fn read_exchange(
    cursor: &mut Cursor<'_>,
    atoms: &[AtomRecord],
) -> Result<Vec<ExchangeRecord>, ExchangeFileError> {
    let position = |line: usize, tag: &str| {
        atoms
            .iter()
            .find(|a| a.tag == tag)
            .map(|a| a.xyz)
            .ok_or_else(|| {
                parse_error(
                    line,
                    ParseErrorKind::UnknownAtom {
                        tag: tag.to_string(),
                    },
                )
            })
    };

    let mut records = Vec::new();
    while let Some((line, content)) = cursor.next_record() {
        let header = fields(line, content, 5)?;
        let ruc = Vector3::new(
            parse_number(line, header[2])?,
            parse_number(line, header[3])?,
            parse_number(line, header[4])?,
        );
        let xyz1 = position(line, header[0])?;
        let xyz2 = position(line, header[1])?;

        let (l, c) = cursor.require()?;
        let [iso] = labelled::<1>(l, c, "isotropic")?;
        let (l, c) = cursor.require()?;
        let dm = labelled::<3>(l, c, "dmi")?;
        let (l, c) = cursor.require()?;
        let s = labelled::<5>(l, c, "symmetric")?;

        records.push(ExchangeRecord {
            tag1: header[0].to_string(),
            tag2: header[1].to_string(),
            ruc,
            iso,
            dm: Vector3::from(dm),
            s,
            xyz1,
            xyz2,
        });
    }
    Ok(records)
}

fn read_onsite(cursor: &mut Cursor<'_>) -> Result<Vec<OnsiteRecord>, ExchangeFileError> {
    let mut records = Vec::new();
    while let Some((line, content)) = cursor.next_record() {
        let tag = fields(line, content, 1)?[0].to_string();
        let (l, c) = cursor.require()?;
        let k = labelled::<6>(l, c, "anisotropy")?;
        records.push(OnsiteRecord { tag, k });
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::BufReader;
    use tempfile::tempdir;

    fn sample() -> ExchangeFile {
        let atoms = vec![
            AtomRecord {
                tag: "3Fe(l:All)".to_string(),
                xyz: Vector3::new(-0.0, 0.0, 11.6576),
            },
            AtomRecord {
                tag: "4Fe(l:All)".to_string(),
                xyz: Vector3::new(0.0, 0.0, 8.9124),
            },
        ];
        let exchange = vec![
            ExchangeRecord {
                tag1: atoms[0].tag.clone(),
                tag2: atoms[1].tag.clone(),
                ruc: Vector3::new(0, 0, 0),
                iso: -82.0854,
                dm: Vector3::new(1.2557e-1, -8.2199e-4, 6.9668e-8),
                s: [-6.0237e-1, -8.3842e-1, -3.2278e-4, -1.2166e-5, -3.3923e-5],
                xyz1: atoms[0].xyz,
                xyz2: atoms[1].xyz,
            },
            ExchangeRecord {
                tag1: atoms[0].tag.clone(),
                tag2: atoms[0].tag.clone(),
                ruc: Vector3::new(1, 0, -2),
                iso: 1.0 / 3.0,
                dm: Vector3::new(-0.027065, 5.0079, 1.2495),
                s: [0.1, 0.2, 0.3, 0.4, std::f64::consts::PI],
                xyz1: atoms[0].xyz,
                xyz2: atoms[0].xyz,
            },
        ];
        ExchangeFile {
            comments: vec!["kset = [4, 4, 1]".to_string()],
            length_unit: LengthUnit::Angstrom,
            cell: Matrix3::new(3.79, 0.0, 0.0, -1.895, 3.282, 0.0, 0.0, 0.0, 20.0),
            atoms,
            energy_unit: EnergyUnit::MilliElectronVolt,
            exchange,
            onsite: vec![OnsiteRecord {
                tag: "3Fe(l:All)".to_string(),
                k: [0.16339, 0.16068, 0.0, 0.0, 0.0, 1e-17],
            }],
        }
    }

    fn write_string(file: &ExchangeFile, options: &MagnopyOptions) -> String {
        let mut buffer = Vec::new();
        MagnopyFile::write_to(file, options, &mut buffer).unwrap();
        String::from_utf8(buffer).unwrap()
    }

    fn read_str(text: &str) -> Result<ExchangeFile, ExchangeFileError> {
        MagnopyFile::read_from(&mut BufReader::new(text.as_bytes()))
    }

    #[test]
    fn default_precision_round_trips_exactly() {
        let original = sample();
        let options = MagnopyOptions {
            precision: None,
            comments: true,
        };
        let text = write_string(&original, &options);
        let parsed = read_str(&text).unwrap();
        assert_eq!(parsed, original);
    }

    #[test]
    fn round_trip_through_a_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("exchange.magnopy.txt");
        let original = sample();
        MagnopyFile::write_to_path(&original, &MagnopyOptions::default(), &path).unwrap();
        let parsed = MagnopyFile::read_from_path(&path).unwrap();
        assert_eq!(parsed.exchange, original.exchange);
        assert_eq!(parsed.onsite, original.onsite);
        assert!(parsed.comments.is_empty());
    }

    #[test]
    fn fixed_precision_rounds_values() {
        let options = MagnopyOptions {
            precision: Some(3),
            comments: false,
        };
        let text = write_string(&sample(), &options);
        assert!(text.contains("isotropic -82.085\n"));
        assert!(text.contains("exchange m\n"));
        assert!(text.contains("cell a\n"));
    }

    #[test]
    fn pair_positions_come_from_the_atoms_section() {
        let text = "cell a\n1 0 0\n0 1 0\n0 0 1\natoms a\nFe4 0 0 1.5\nFe5 0 0 -1.5\n\
                    exchange m\nFe4 Fe5 1 0 0\nisotropic 2\ndmi 0 0 0\nsymmetric 0 0 0 0 0\n";
        let parsed = read_str(text).unwrap();
        let record = &parsed.exchange[0];
        assert_eq!(record.xyz1, Vector3::new(0.0, 0.0, 1.5));
        assert_eq!(record.xyz2, Vector3::new(0.0, 0.0, -1.5));
        assert_eq!(record.ruc, Vector3::new(1, 0, 0));
        assert!(parsed.onsite.is_empty());
    }

    #[test]
    fn parse_errors_report_the_line() {
        let text = "cell a\n1 0 0\n0 1 0\n0 0 1\natoms a\nFe4 0 0 0\nexchange m\n\
                    Fe4 Fe4 1 0 0\nisotropic x\n";
        match read_str(text).unwrap_err() {
            ExchangeFileError::Parse { line, kind } => {
                assert_eq!(line, 9);
                assert_eq!(
                    kind,
                    ParseErrorKind::InvalidNumber {
                        value: "x".to_string()
                    }
                );
            }
            other => panic!("unexpected error: {other}"),
        }

        let unknown = "cell a\n1 0 0\n0 1 0\n0 0 1\natoms a\nexchange m\nFe4 Fe4 1 0 0\n";
        assert!(matches!(
            read_str(unknown).unwrap_err(),
            ExchangeFileError::Parse {
                line: 7,
                kind: ParseErrorKind::UnknownAtom { .. }
            }
        ));

        let bad_unit = "cell q\n";
        assert!(matches!(
            read_str(bad_unit).unwrap_err(),
            ExchangeFileError::Parse {
                line: 1,
                kind: ParseErrorKind::UnknownUnit { .. }
            }
        ));
    }

    #[test]
    fn missing_sections_are_reported() {
        let text = "cell a\n1 0 0\n0 1 0\n0 0 1\natoms a\n";
        assert!(matches!(
            read_str(text).unwrap_err(),
            ExchangeFileError::MissingSection("exchange")
        ));
    }
}
