//! Tight-binding models described by a TOML file plus a CSV table of matrix elements.
//!
//! ```toml
//! energy-unit = "eV"
//! cell = [[20.0, 0.0, 0.0], [0.0, 20.0, 0.0], [0.0, 0.0, 20.0]]
//! orthogonal = true
//! matrix-elements = "dimer.csv"
//!
//! [[atoms]]
//! tag = "Fe"
//! position = [0.0, 0.0, 0.0]
//! orbitals = [{ name = "s", l = 0 }]
//! ```
//!
//! The table has the header `r1,r2,r3,row,col,h_re,h_im` and optionally `s_re,s_im`.
//! Rows and columns index the interleaved spin-orbital basis.

use super::traits::HamiltonianSource;
use crate::core::hamiltonian::{Hamiltonian, HamiltonianError, LatticeBlock};
use crate::core::models::layout::{Atom, Layout, Orbital};
use crate::core::units::EnergyUnit;
use nalgebra::{DMatrix, Matrix3, Vector3};
use num_complex::Complex64;
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Invalid model file: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Invalid matrix-element table {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("Matrix element on record {record} is out of range: ({row}, {col}) in a {dim}x{dim} basis")]
    IndexOutOfRange {
        record: usize,
        row: usize,
        col: usize,
        dim: usize,
    },
    #[error("Matrix element ({row}, {col}) at offset {offset:?} is given twice (record {record})")]
    DuplicateElement {
        record: usize,
        offset: [i32; 3],
        row: usize,
        col: usize,
    },
    #[error("Non-orthogonal model is missing overlap values on record {record}")]
    MissingOverlap { record: usize },
    #[error("Model has no atoms")]
    NoAtoms,
    #[error(transparent)]
    Hamiltonian(#[from] HamiltonianError),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct ModelFile {
    #[serde(default)]
    energy_unit: EnergyUnit,
    cell: [[f64; 3]; 3],
    #[serde(default = "default_orthogonal")]
    orthogonal: bool,
    matrix_elements: PathBuf,
    atoms: Vec<AtomEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct AtomEntry {
    tag: String,
    position: [f64; 3],
    orbitals: Vec<Orbital>,
}

#[derive(Debug, Deserialize)]
struct Element {
    r1: i32,
    r2: i32,
    r3: i32,
    row: usize,
    col: usize,
    h_re: f64,
    h_im: f64,
    #[serde(default)]
    s_re: Option<f64>,
    #[serde(default)]
    s_im: Option<f64>,
}

fn default_orthogonal() -> bool {
    true
}

pub struct TightBindingModel;

impl HamiltonianSource for TightBindingModel {
    type Error = ModelError;

    fn read_from(reader: &mut impl BufRead, base_dir: &Path) -> Result<Hamiltonian, Self::Error> {
        let mut text = String::new();
        reader.read_to_string(&mut text)?;
        let model: ModelFile = toml::from_str(&text)?;
        if model.atoms.is_empty() {
            return Err(ModelError::NoAtoms);
        }

        let [a1, a2, a3] = model.cell;
        let cell = Matrix3::from_rows(&[
            Vector3::from(a1).transpose(),
            Vector3::from(a2).transpose(),
            Vector3::from(a3).transpose(),
        ]);
        let atoms = model
            .atoms
            .into_iter()
            .map(|entry| Atom {
                tag: entry.tag,
                position: Vector3::from(entry.position),
                orbitals: entry.orbitals,
            })
            .collect();
        let layout = Layout::new(cell, atoms);

        let table_path = base_dir.join(&model.matrix_elements);
        let table = File::open(&table_path)?;
        let blocks = read_elements(
            BufReader::new(table),
            &table_path,
            layout.n_spin_orbitals(),
            model.orthogonal,
        )?;
        debug!(
            path = %table_path.display(),
            blocks = blocks.len(),
            "Matrix elements loaded."
        );

        Ok(Hamiltonian::new(layout, blocks, model.energy_unit)?)
    }
}

fn read_elements(
    reader: impl Read,
    path: &Path,
    dim: usize,
    orthogonal: bool,
) -> Result<Vec<LatticeBlock>, ModelError> {
    let mut blocks: BTreeMap<[i32; 3], (DMatrix<Complex64>, DMatrix<Complex64>)> =
        BTreeMap::new();
    let mut seen = HashSet::new();
    let mut csv_reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);

    for (index, result) in csv_reader.deserialize::<Element>().enumerate() {
        let record = index + 1;
        let element = result.map_err(|source| ModelError::Csv {
            path: path.to_path_buf(),
            source,
        })?;
        if element.row >= dim || element.col >= dim {
            return Err(ModelError::IndexOutOfRange {
                record,
                row: element.row,
                col: element.col,
                dim,
            });
        }
        let offset = [element.r1, element.r2, element.r3];
        if !seen.insert((offset, element.row, element.col)) {
            return Err(ModelError::DuplicateElement {
                record,
                offset,
                row: element.row,
                col: element.col,
            });
        }

        let (h, s) = blocks
            .entry(offset)
            .or_insert_with(|| (DMatrix::zeros(dim, dim), DMatrix::zeros(dim, dim)));
        h[(element.row, element.col)] = Complex64::new(element.h_re, element.h_im);
        if !orthogonal {
            let s_re = element.s_re.ok_or(ModelError::MissingOverlap { record })?;
            s[(element.row, element.col)] = Complex64::new(s_re, element.s_im.unwrap_or(0.0));
        }
    }

    if orthogonal {
        let (_, s) = blocks
            .entry([0, 0, 0])
            .or_insert_with(|| (DMatrix::zeros(dim, dim), DMatrix::zeros(dim, dim)));
        *s = DMatrix::identity(dim, dim);
    }

    Ok(blocks
        .into_iter()
        .map(|(offset, (h, s))| LatticeBlock {
            offset: Vector3::from(offset),
            h,
            s,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    const MODEL: &str = r#"
energy-unit = "meV"
cell = [[1.0, 0.0, 0.0], [0.0, 10.0, 0.0], [0.0, 0.0, 10.0]]
matrix-elements = "chain.csv"

[[atoms]]
tag = "Fe"
position = [0.0, 0.0, 0.0]
orbitals = [{ name = "s", l = 0 }]
"#;

    const CHAIN: &str = "r1,r2,r3,row,col,h_re,h_im
0,0,0,0,0,-1.0,0.0
0,0,0,1,1,1.0,0.0
1,0,0,0,0,0.5,0.0
1,0,0,1,1,0.5,0.0
-1,0,0,0,0,0.5,0.0
-1,0,0,1,1,0.5,0.0
";

    fn write_model(model: &str, table: &str) -> tempfile::TempDir {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("model.toml"), model).unwrap();
        fs::write(dir.path().join("chain.csv"), table).unwrap();
        dir
    }

    #[test]
    fn reads_an_orthogonal_chain() {
        let dir = write_model(MODEL, CHAIN);
        let ham = TightBindingModel::read_from_path(dir.path().join("model.toml")).unwrap();
        assert_eq!(ham.unit(), EnergyUnit::MilliElectronVolt);
        assert_eq!(ham.layout().n_spin_orbitals(), 2);
        assert_eq!(ham.offsets().len(), 3);

        let values = ham.eigenvalues(&Vector3::zeros()).unwrap();
        assert!((values[0] - 0.0).abs() < 1e-12);
        assert!((values[1] - 2.0).abs() < 1e-12);
    }

    #[test]
    fn non_orthogonal_models_need_overlap_columns() {
        let model = MODEL.replace("matrix-elements", "orthogonal = false\nmatrix-elements");
        let dir = write_model(&model, CHAIN);
        let err = TightBindingModel::read_from_path(dir.path().join("model.toml")).unwrap_err();
        assert!(matches!(err, ModelError::MissingOverlap { record: 1 }));
    }

    #[test]
    fn table_errors_are_reported() {
        let dir = write_model(MODEL, "r1,r2,r3,row,col,h_re,h_im\n0,0,0,0,5,1.0,0.0\n");
        let err = TightBindingModel::read_from_path(dir.path().join("model.toml")).unwrap_err();
        assert!(matches!(
            err,
            ModelError::IndexOutOfRange { record: 1, col: 5, dim: 2, .. }
        ));

        let dir = write_model(
            MODEL,
            "r1,r2,r3,row,col,h_re,h_im\n0,0,0,0,0,1.0,0.0\n0,0,0,0,0,2.0,0.0\n",
        );
        let err = TightBindingModel::read_from_path(dir.path().join("model.toml")).unwrap_err();
        assert!(matches!(err, ModelError::DuplicateElement { record: 2, .. }));

        let dir = write_model(MODEL, "r1,r2,r3,row,col,h_re,h_im\n1,0,0,0,0,1.0,0.0\n");
        let err = TightBindingModel::read_from_path(dir.path().join("model.toml")).unwrap_err();
        assert!(matches!(
            err,
            ModelError::Hamiltonian(HamiltonianError::MissingPartner { .. })
        ));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let model = format!("{MODEL}\nspin = 2\n");
        let dir = write_model(&model, CHAIN);
        let err = TightBindingModel::read_from_path(dir.path().join("model.toml")).unwrap_err();
        assert!(matches!(err, ModelError::Toml(_)));
    }
}
