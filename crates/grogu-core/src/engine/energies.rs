//! Second-order energy changes under small spin rotations.
//!
//! Rotating the exchange field of an entity by a small angle `θ` about `u` perturbs the
//! Hamiltonian by `θ V1 + θ² V2` with `V1 = i/2 [H_xc, τ_u]` and
//! `V2 = 1/8 [[τ_u, H_xc], τ_u]`. The contour integrals below are the `θ²` coefficients
//! of the grand potential.

use super::config::ReferenceOrientation;
use crate::core::contour::Contour;
use crate::core::hamiltonian::{RotatedHamiltonian, onsite_projection};
use crate::core::models::entity::MagneticEntity;
use crate::core::models::pair::Pair;
use crate::core::spin::{commutator, tau_u};
use nalgebra::DMatrix;
use num_complex::Complex64;
use std::f64::consts::PI;

const HALF_I: Complex64 = Complex64::new(0.0, 0.5);
const EIGHTH: Complex64 = Complex64::new(0.125, 0.0);
const HALF: Complex64 = Complex64::new(0.5, 0.0);

/// Probe index pairs of a pair energy, in output order `[vv, vw, wv, ww]`.
pub const PAIR_PROBES: [(usize, usize); 4] = [(0, 0), (0, 1), (1, 0), (1, 1)];

/// Fills `vu1` and `vu2` of `entity` for every orientation and probe direction.
pub(crate) fn compute_perturbations(
    entity: &mut MagneticEntity,
    rotated: &[RotatedHamiltonian<'_>],
    orientations: &[ReferenceOrientation],
) {
    let n_orbitals = entity.orbitals().len();
    let mut vu1 = Vec::with_capacity(orientations.len());
    let mut vu2 = Vec::with_capacity(orientations.len());

    for (hamiltonian, orientation) in rotated.iter().zip(orientations) {
        let h_xc = onsite_projection(hamiltonian.exchange_field(), entity.spin_box());
        let (first, second): (Vec<_>, Vec<_>) = orientation
            .probe_directions()
            .iter()
            .map(|u| {
                let tu = tau_u(u, n_orbitals);
                let v1 = commutator(&h_xc, &tu) * HALF_I;
                let v2 = commutator(&commutator(&tu, &h_xc), &tu) * EIGHTH;
                (v1, v2)
            })
            .unzip();
        vu1.push(first);
        vu2.push(second);
    }
    entity.vu1 = vu1;
    entity.vu2 = vu2;
}

/// `E_o[u] = -1/π Im Σ_z w_z Tr[V2 G + ½ V1 G V1 G]`, `[orientation][probe]`.
pub(crate) fn entity_energies(entity: &MagneticEntity, contour: &Contour) -> Vec<Vec<f64>> {
    entity
        .greens
        .iter()
        .zip(entity.vu1.iter().zip(&entity.vu2))
        .map(|(greens, (vu1, vu2))| {
            vu1.iter()
                .zip(vu2)
                .map(|(v1, v2)| {
                    let integral = integrate(contour, greens, |g| {
                        let first = v1 * g;
                        (v2 * g).trace() + (&first * &first).trace() * HALF
                    });
                    -integral.im / PI
                })
                .collect()
        })
        .collect()
}

/// `E_o[a, b] = -1/π Im Σ_z w_z Tr[V_i,a G_ij V_j,b G_ji]`, `[orientation][vv, vw, wv, ww]`.
pub(crate) fn pair_energies(
    pair: &Pair,
    first: &MagneticEntity,
    second: &MagneticEntity,
    contour: &Contour,
) -> Vec<[f64; 4]> {
    pair.gij
        .iter()
        .zip(&pair.gji)
        .enumerate()
        .map(|(o, (gij, gji))| {
            PAIR_PROBES.map(|(a, b)| {
                let vi = &first.vu1[o][a];
                let vj = &second.vu1[o][b];
                let integral: Complex64 = contour
                    .points()
                    .iter()
                    .zip(gij.iter().zip(gji))
                    .map(|(point, (g_ij, g_ji))| {
                        point.weight * (vi * g_ij * vj * g_ji).trace()
                    })
                    .sum();
                -integral.im / PI
            })
        })
        .collect()
}

fn integrate<F>(contour: &Contour, greens: &[DMatrix<Complex64>], f: F) -> Complex64
where
    F: Fn(&DMatrix<Complex64>) -> Complex64,
{
    contour
        .points()
        .iter()
        .zip(greens)
        .map(|(point, g)| point.weight * f(g))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::entity::EntitySpec;
    use crate::testing::{DimerParams, dimer};
    use nalgebra::Vector3;

    #[test]
    fn perturbations_vanish_along_the_quantization_axis() {
        let ham = dimer(&DimerParams::default());
        let rotated = vec![ham.rotated(&Vector3::z(), &Vector3::z())];
        let along_axis = ReferenceOrientation::new(Vector3::z(), Vector3::z(), Vector3::x());
        let mut entity = MagneticEntity::new(ham.layout(), &EntitySpec::atom(0)).unwrap();
        compute_perturbations(&mut entity, &rotated, &[along_axis]);

        assert_eq!(entity.vu1.len(), 1);
        assert_eq!(entity.vu1[0].len(), 3);
        assert!(entity.vu1[0][0].iter().all(|c| c.norm() < 1e-15));
        assert!(entity.vu1[0][1].iter().any(|c| c.norm() > 0.1));
    }

    #[test]
    fn first_order_perturbation_is_the_field_derivative() {
        let params = DimerParams::default();
        let ham = dimer(&params);
        let rotated = vec![ham.rotated(&Vector3::z(), &Vector3::z())];
        let orientation = ReferenceOrientation::defaults()[2];
        let mut entity = MagneticEntity::new(ham.layout(), &EntitySpec::atom(0)).unwrap();
        compute_perturbations(&mut entity, &rotated, &[orientation]);

        // H_xc = -Δ σz; rotating about x gives dH/dθ = -Δ (x × z)·σ = Δ σy.
        let v1 = &entity.vu1[0][0];
        assert!((v1[(0, 1)] - Complex64::new(0.0, -params.delta)).norm() < 1e-12);
        assert!((v1[(1, 0)] - Complex64::new(0.0, params.delta)).norm() < 1e-12);

        // Second order: Δ/2 σz.
        let v2 = &entity.vu2[0][0];
        assert!((v2[(0, 0)] - Complex64::from(0.5 * params.delta)).norm() < 1e-12);
        assert!((v2[(1, 1)] + Complex64::from(0.5 * params.delta)).norm() < 1e-12);
    }
}
