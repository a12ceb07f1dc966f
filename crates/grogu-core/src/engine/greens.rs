//! Accumulation of projected Green's functions over the k-set for every contour point.
//!
//! For one reference orientation and one batch of targets the result is, per projection
//! slot and contour point, `Σ_k w_k P[G_k(z)]`, summed in k order. Both solver modes
//! produce the same additions in the same order, so their results agree bit for bit.

use super::config::SolverMode;
use super::error::EngineError;
use super::progress::{Progress, ProgressReporter};
use crate::core::contour::{Contour, ContourPoint};
use crate::core::hamiltonian::{RotatedHamiltonian, pair_projection};
use crate::core::kspace::{KPoint, KSpace};
use crate::core::models::entity::MagneticEntity;
use crate::core::models::pair::Pair;
use nalgebra::{DMatrix, Vector3};
use num_complex::Complex64;
use tracing::debug;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Entity or pair, by index into the owning list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Target {
    Entity(usize),
    Pair(usize),
}

/// Rows of the home cell against columns of the cell at `ruc`.
struct Slot<'a> {
    rows: &'a [usize],
    cols: &'a [usize],
    ruc: Vector3<i32>,
}

/// `[slot][contour point]`.
type Blocks = Vec<Vec<DMatrix<Complex64>>>;

pub(crate) struct GreensSolver<'a, 'h> {
    pub rotated: &'a [RotatedHamiltonian<'h>],
    pub kspace: &'a KSpace,
    pub contour: &'a Contour,
    pub mode: SolverMode,
    /// Contour points inverted together in sequential mode.
    pub max_g_per_loop: usize,
}

impl GreensSolver<'_, '_> {
    /// Fills `greens`, `gij` and `gji` of every target for every orientation.
    pub(crate) fn accumulate(
        &self,
        entities: &mut [MagneticEntity],
        pairs: &mut [Pair],
        targets: &[Target],
        reporter: &ProgressReporter,
    ) -> Result<(), EngineError> {
        let mut per_orientation = Vec::with_capacity(self.rotated.len());
        {
            let slots = build_slots(entities, pairs, targets);
            for orientation in 0..self.rotated.len() {
                per_orientation.push(self.accumulate_orientation(orientation, &slots, reporter)?);
                debug!(
                    orientation,
                    targets = targets.len(),
                    "Green's functions accumulated."
                );
            }
        }

        for blocks in per_orientation {
            let mut blocks = blocks.into_iter();
            for target in targets {
                match *target {
                    Target::Entity(e) => {
                        let g = blocks.next().ok_or_else(slot_mismatch)?;
                        entities[e].greens.push(g);
                    }
                    Target::Pair(p) => {
                        let gij = blocks.next().ok_or_else(slot_mismatch)?;
                        let gji = blocks.next().ok_or_else(slot_mismatch)?;
                        pairs[p].gij.push(gij);
                        pairs[p].gji.push(gji);
                    }
                }
            }
        }
        Ok(())
    }

    fn accumulate_orientation(
        &self,
        orientation: usize,
        slots: &[Slot<'_>],
        reporter: &ProgressReporter,
    ) -> Result<Blocks, EngineError> {
        let n_energies = self.contour.len();
        let mut acc: Blocks = slots
            .iter()
            .map(|s| vec![DMatrix::zeros(s.rows.len(), s.cols.len()); n_energies])
            .collect();

        match self.mode {
            SolverMode::Parallel => {
                for chunk in self.kspace.points().chunks(k_chunk_size()) {
                    #[cfg(not(feature = "parallel"))]
                    let iterator = chunk.iter();

                    #[cfg(feature = "parallel")]
                    let iterator = chunk.par_iter();

                    let contributions: Vec<Result<Blocks, EngineError>> = iterator
                        .map(|point| self.k_contribution(orientation, point, slots))
                        .collect();

                    for contribution in contributions {
                        for (acc_slot, slot_blocks) in acc.iter_mut().zip(contribution?) {
                            for (a, b) in acc_slot.iter_mut().zip(slot_blocks) {
                                *a += b;
                            }
                        }
                        reporter.report(Progress::TaskIncrement);
                    }
                }
            }
            SolverMode::Sequential => {
                let rotated = &self.rotated[orientation];
                for point in self.kspace.points() {
                    let (hk, sk) = rotated.build_hk(&point.k);
                    let weight = Complex64::from(point.weight);
                    let batch = self.max_g_per_loop.max(1);

                    for (chunk_index, chunk) in self.contour.points().chunks(batch).enumerate() {
                        #[cfg(not(feature = "parallel"))]
                        let iterator = chunk.iter();

                        #[cfg(feature = "parallel")]
                        let iterator = chunk.par_iter();

                        let greens: Vec<Result<DMatrix<Complex64>, EngineError>> = iterator
                            .map(|cp| self.invert(orientation, point, &hk, &sk, cp))
                            .collect();

                        for (offset, g) in greens.into_iter().enumerate() {
                            let g = g?;
                            let e = chunk_index * batch + offset;
                            for (slot, acc_slot) in slots.iter().zip(acc.iter_mut()) {
                                acc_slot[e] += project(&g, slot, &point.k) * weight;
                            }
                        }
                    }
                    reporter.report(Progress::TaskIncrement);
                }
            }
        }
        Ok(acc)
    }

    /// Weighted projections of every contour point at one k-point.
    fn k_contribution(
        &self,
        orientation: usize,
        point: &KPoint,
        slots: &[Slot<'_>],
    ) -> Result<Blocks, EngineError> {
        let (hk, sk) = self.rotated[orientation].build_hk(&point.k);
        let weight = Complex64::from(point.weight);
        let mut blocks: Blocks = slots
            .iter()
            .map(|_| Vec::with_capacity(self.contour.len()))
            .collect();

        for cp in self.contour.points() {
            let g = self.invert(orientation, point, &hk, &sk, cp)?;
            for (slot, slot_blocks) in slots.iter().zip(blocks.iter_mut()) {
                slot_blocks.push(project(&g, slot, &point.k) * weight);
            }
        }
        Ok(blocks)
    }

    fn invert(
        &self,
        orientation: usize,
        point: &KPoint,
        hk: &DMatrix<Complex64>,
        sk: &DMatrix<Complex64>,
        cp: &ContourPoint,
    ) -> Result<DMatrix<Complex64>, EngineError> {
        greens_function(hk, sk, cp.energy).ok_or(EngineError::Numerical {
            orientation,
            k: [point.k.x, point.k.y, point.k.z],
            energy: cp.energy,
        })
    }
}

/// `(z Sk - Hk)⁻¹`, or `None` when the matrix is singular or the inverse is not finite.
pub fn greens_function(
    hk: &DMatrix<Complex64>,
    sk: &DMatrix<Complex64>,
    z: Complex64,
) -> Option<DMatrix<Complex64>> {
    let resolvent = sk * z - hk;
    resolvent
        .lu()
        .try_inverse()
        .filter(|g| g.iter().all(|c| c.re.is_finite() && c.im.is_finite()))
}

fn project(g: &DMatrix<Complex64>, slot: &Slot<'_>, k: &Vector3<f64>) -> DMatrix<Complex64> {
    pair_projection(g, slot.rows, slot.cols, k, &slot.ruc)
}

fn build_slots<'a>(
    entities: &'a [MagneticEntity],
    pairs: &'a [Pair],
    targets: &[Target],
) -> Vec<Slot<'a>> {
    let mut slots = Vec::with_capacity(2 * targets.len());
    for target in targets {
        match *target {
            Target::Entity(e) => {
                let spin_box = entities[e].spin_box();
                slots.push(Slot {
                    rows: spin_box,
                    cols: spin_box,
                    ruc: Vector3::zeros(),
                });
            }
            Target::Pair(p) => {
                let pair = &pairs[p];
                let i = entities[pair.ai()].spin_box();
                let j = entities[pair.aj()].spin_box();
                slots.push(Slot {
                    rows: i,
                    cols: j,
                    ruc: *pair.ruc(),
                });
                slots.push(Slot {
                    rows: j,
                    cols: i,
                    ruc: -*pair.ruc(),
                });
            }
        }
    }
    slots
}

fn slot_mismatch() -> EngineError {
    EngineError::Internal("projection slots do not match the batch targets".to_string())
}

#[cfg(feature = "parallel")]
fn k_chunk_size() -> usize {
    rayon::current_num_threads().max(1)
}

#[cfg(not(feature = "parallel"))]
fn k_chunk_size() -> usize {
    1
}
