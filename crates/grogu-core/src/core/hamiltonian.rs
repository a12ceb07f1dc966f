//! # Hamiltonian
//!
//! Real-space tight-binding Hamiltonian `H(R)` and overlap `S(R)` in the interleaved
//! spin-orbital basis, indexed by integer supercell offsets `R`.
//!
//! ## Exchange field
//!
//! On construction every block is split with the time-reversal operator
//! `T = (I ⊗ iσy) K` into a symmetric part `H_TRS` and a breaking part `H_TRB`. The
//! 2×2 spin blocks of `H_TRB` define the exchange field `h_α = Tr(B σ_α) / 2`, which is
//! what rotates when the magnetization is turned towards a reference orientation.
//!
//! ## Bloch sums
//!
//! `Hk = Σ_R H(R) e^{i 2π k·R}` with `k` in fractional reciprocal coordinates. Offsets are
//! kept in lexicographic order so every sum is evaluated in the same order.

use super::models::layout::Layout;
use super::spin::{kron_identity, pauli, rot_m_a2b, spin_components, spin_compose};
use super::units::EnergyUnit;
use nalgebra::{Cholesky, DMatrix, DVector, Matrix3, SymmetricEigen, Vector3};
use num_complex::Complex64;
use std::collections::HashMap;
use std::f64::consts::PI;
use thiserror::Error;
use tracing::{debug, warn};

const HALF: Complex64 = Complex64::new(0.5, 0.0);
const SCALAR_EXCHANGE_TOLERANCE: f64 = 1e-12;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum HamiltonianError {
    #[error("The Hamiltonian has no home-cell block at offset [0, 0, 0]")]
    MissingHomeCell,
    #[error("Offset {offset:?} appears more than once")]
    DuplicateOffset { offset: [i32; 3] },
    #[error("Offset {offset:?} has no partner block at the opposite offset")]
    MissingPartner { offset: [i32; 3] },
    #[error("Block at offset {offset:?} is {rows}x{cols}, expected {expected}x{expected}")]
    DimensionMismatch {
        offset: [i32; 3],
        rows: usize,
        cols: usize,
        expected: usize,
    },
    #[error("The overlap matrix is not positive definite at k = {k:?}")]
    OverlapNotPositiveDefinite { k: [f64; 3] },
}

/// Hamiltonian and overlap blocks coupling the home cell to the cell at `offset`.
#[derive(Debug, Clone, PartialEq)]
pub struct LatticeBlock {
    pub offset: Vector3<i32>,
    pub h: DMatrix<Complex64>,
    pub s: DMatrix<Complex64>,
}

#[derive(Debug, Clone)]
pub struct Hamiltonian {
    layout: Layout,
    unit: EnergyUnit,
    offsets: Vec<Vector3<i32>>,
    h: Vec<DMatrix<Complex64>>,
    s: Vec<DMatrix<Complex64>>,
    home: usize,
    trs: Vec<DMatrix<Complex64>>,
    exchange_field: Vec<[DMatrix<Complex64>; 3]>,
}

impl Hamiltonian {
    /// Builds the Hamiltonian, symmetrizing `H(R) ← (H(R) + H(-R)†) / 2` (and `S` alike).
    pub fn new(
        layout: Layout,
        mut blocks: Vec<LatticeBlock>,
        unit: EnergyUnit,
    ) -> Result<Self, HamiltonianError> {
        let dim = layout.n_spin_orbitals();
        blocks.sort_by_key(|b| offset_key(&b.offset));

        let mut index = HashMap::with_capacity(blocks.len());
        for (i, block) in blocks.iter().enumerate() {
            let key = offset_key(&block.offset);
            for m in [&block.h, &block.s] {
                if m.nrows() != dim || m.ncols() != dim {
                    return Err(HamiltonianError::DimensionMismatch {
                        offset: key,
                        rows: m.nrows(),
                        cols: m.ncols(),
                        expected: dim,
                    });
                }
            }
            if index.insert(key, i).is_some() {
                return Err(HamiltonianError::DuplicateOffset { offset: key });
            }
        }
        let home = *index
            .get(&[0, 0, 0])
            .ok_or(HamiltonianError::MissingHomeCell)?;

        let mut h = Vec::with_capacity(blocks.len());
        let mut s = Vec::with_capacity(blocks.len());
        for block in &blocks {
            let key = offset_key(&block.offset);
            let partner = *index
                .get(&offset_key(&(-block.offset)))
                .ok_or(HamiltonianError::MissingPartner { offset: key })?;
            h.push((&block.h + blocks[partner].h.adjoint()) * HALF);
            s.push((&block.s + blocks[partner].s.adjoint()) * HALF);
        }

        let offsets: Vec<_> = blocks.iter().map(|b| b.offset).collect();
        let (trs, exchange_field) = split_time_reversal(&h, &offsets);
        debug!(
            blocks = offsets.len(),
            dimension = dim,
            "Hamiltonian assembled and split into time-reversal parts."
        );

        Ok(Self {
            layout,
            unit,
            offsets,
            h,
            s,
            home,
            trs,
            exchange_field,
        })
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn unit(&self) -> EnergyUnit {
        self.unit
    }

    /// Supercell offsets in lexicographic order.
    pub fn offsets(&self) -> &[Vector3<i32>] {
        &self.offsets
    }

    pub fn dimension(&self) -> usize {
        self.layout.n_spin_orbitals()
    }

    /// Symmetrized home-cell Hamiltonian block.
    pub fn home_block(&self) -> &DMatrix<Complex64> {
        &self.h[self.home]
    }

    /// Bloch Hamiltonian and overlap in the frame the Hamiltonian was given in.
    pub fn build_hk(&self, k: &Vector3<f64>) -> (DMatrix<Complex64>, DMatrix<Complex64>) {
        (
            bloch_sum(&self.offsets, &self.h, k),
            bloch_sum(&self.offsets, &self.s, k),
        )
    }

    /// Eigenvalues of `Hk x = ε Sk x`, ascending.
    pub fn eigenvalues(&self, k: &Vector3<f64>) -> Result<DVector<f64>, HamiltonianError> {
        let (hk, sk) = self.build_hk(k);
        let not_positive = || HamiltonianError::OverlapNotPositiveDefinite { k: [k.x, k.y, k.z] };

        let n = sk.nrows();
        let cholesky = Cholesky::new(sk).ok_or_else(not_positive)?;
        let l_inv = cholesky
            .l()
            .solve_lower_triangular(&DMatrix::identity(n, n))
            .ok_or_else(not_positive)?;
        let reduced = &l_inv * hk * l_inv.adjoint();
        let reduced = (&reduced + reduced.adjoint()) * HALF;

        let mut values: Vec<f64> = SymmetricEigen::new(reduced).eigenvalues.iter().copied().collect();
        values.sort_by(f64::total_cmp);
        Ok(DVector::from_vec(values))
    }

    /// Lowest band energy over a set of k-points.
    pub fn min_eigenvalue<'k, I>(&self, kpoints: I) -> Result<f64, HamiltonianError>
    where
        I: IntoIterator<Item = &'k Vector3<f64>>,
    {
        let mut lowest = f64::INFINITY;
        for k in kpoints {
            if let Some(&value) = self.eigenvalues(k)?.as_slice().first() {
                lowest = lowest.min(value);
            }
        }
        Ok(lowest)
    }

    /// Copy with the exchange field rotated by the minimal rotation taking `scf_orientation`
    /// onto `orientation`. Orbital structure and the time-reversal-symmetric part are untouched.
    pub fn rotated(
        &self,
        scf_orientation: &Vector3<f64>,
        orientation: &Vector3<f64>,
    ) -> RotatedHamiltonian<'_> {
        let rotation = rot_m_a2b(scf_orientation, orientation);
        let fields: Vec<_> = self
            .exchange_field
            .iter()
            .map(|field| exchange_matrix(&rotate_field(&rotation, field)))
            .collect();
        let h = self
            .trs
            .iter()
            .zip(fields.iter())
            .map(|(trs, field)| trs + field)
            .collect();

        RotatedHamiltonian {
            base: self,
            orientation: orientation.normalize(),
            h,
            exchange_home: fields[self.home].clone(),
        }
    }
}

/// A [`Hamiltonian`] with its exchange field turned towards one reference orientation.
#[derive(Debug, Clone)]
pub struct RotatedHamiltonian<'a> {
    base: &'a Hamiltonian,
    orientation: Vector3<f64>,
    h: Vec<DMatrix<Complex64>>,
    exchange_home: DMatrix<Complex64>,
}

impl RotatedHamiltonian<'_> {
    pub fn orientation(&self) -> &Vector3<f64> {
        &self.orientation
    }

    pub fn build_hk(&self, k: &Vector3<f64>) -> (DMatrix<Complex64>, DMatrix<Complex64>) {
        (
            bloch_sum(&self.base.offsets, &self.h, k),
            bloch_sum(&self.base.offsets, &self.base.s, k),
        )
    }

    /// Rotated home-cell exchange field `Σ_α h'_α ⊗ σ_α` over the whole basis.
    pub fn exchange_field(&self) -> &DMatrix<Complex64> {
        &self.exchange_home
    }
}

/// `e^{i 2π k·R}`.
pub fn bloch_phase(k: &Vector3<f64>, offset: &Vector3<i32>) -> Complex64 {
    Complex64::cis(2.0 * PI * k.dot(&offset.cast::<f64>()))
}

fn bloch_sum(
    offsets: &[Vector3<i32>],
    blocks: &[DMatrix<Complex64>],
    k: &Vector3<f64>,
) -> DMatrix<Complex64> {
    let n = blocks.first().map_or(0, |b| b.nrows());
    let mut sum = DMatrix::zeros(n, n);
    for (offset, block) in offsets.iter().zip(blocks) {
        sum += block * bloch_phase(k, offset);
    }
    sum
}

/// Square block of `matrix` on `indices`.
pub fn onsite_projection(matrix: &DMatrix<Complex64>, indices: &[usize]) -> DMatrix<Complex64> {
    DMatrix::from_fn(indices.len(), indices.len(), |r, c| {
        matrix[(indices[r], indices[c])]
    })
}

/// Block of a Bloch matrix between `rows` in the home cell and `cols` in the cell at `ruc`:
/// `M[rows, cols] e^{-i 2π k·ruc}`. Summed with k-weights it yields the real-space block.
pub fn pair_projection(
    matrix: &DMatrix<Complex64>,
    rows: &[usize],
    cols: &[usize],
    k: &Vector3<f64>,
    ruc: &Vector3<i32>,
) -> DMatrix<Complex64> {
    let phase = bloch_phase(k, ruc).conj();
    DMatrix::from_fn(rows.len(), cols.len(), |r, c| {
        matrix[(rows[r], cols[c])] * phase
    })
}

fn offset_key(offset: &Vector3<i32>) -> [i32; 3] {
    [offset.x, offset.y, offset.z]
}

/// `(H_TRS, exchange field)` for every block.
fn split_time_reversal(
    h: &[DMatrix<Complex64>],
    offsets: &[Vector3<i32>],
) -> (Vec<DMatrix<Complex64>>, Vec<[DMatrix<Complex64>; 3]>) {
    let mut trs = Vec::with_capacity(h.len());
    let mut fields = Vec::with_capacity(h.len());
    for (block, offset) in h.iter().zip(offsets) {
        let sigma_y = kron_identity(block.nrows() / 2, &pauli()[1]);
        let reversed = &sigma_y * block.conjugate() * &sigma_y;
        trs.push((block + &reversed) * HALF);

        let [scalar, x, y, z] = spin_components(&((block - &reversed) * HALF));
        let residual = scalar.iter().map(|c| c.norm()).fold(0.0, f64::max);
        if residual > SCALAR_EXCHANGE_TOLERANCE {
            warn!(
                offset = ?offset_key(offset),
                residual,
                "Time-reversal breaking part has a non-zero scalar component."
            );
        }
        fields.push([x, y, z]);
    }
    (trs, fields)
}

fn rotate_field(
    rotation: &Matrix3<f64>,
    field: &[DMatrix<Complex64>; 3],
) -> [DMatrix<Complex64>; 3] {
    std::array::from_fn(|a| {
        let mut rotated = DMatrix::zeros(field[0].nrows(), field[0].ncols());
        for (b, component) in field.iter().enumerate() {
            rotated += component * Complex64::from(rotation[(a, b)]);
        }
        rotated
    })
}

fn exchange_matrix(field: &[DMatrix<Complex64>; 3]) -> DMatrix<Complex64> {
    let n = field[0].nrows();
    spin_compose(&[
        DMatrix::zeros(n, n),
        field[0].clone(),
        field[1].clone(),
        field[2].clone(),
    ])
}
