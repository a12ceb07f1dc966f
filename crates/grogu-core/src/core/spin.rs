//! Spin-frame utilities: Pauli algebra, rotations of the spin quantization axis, and the
//! spin-orbital operators used to probe exchange through rotation derivatives.
//!
//! All spin-orbital matrices use the interleaved basis: index `2 * orbital + spin`.

use nalgebra::{DMatrix, Matrix2, Matrix3, Rotation3, Vector3};
use num_complex::Complex64;

const I: Complex64 = Complex64::new(0.0, 1.0);
const ONE: Complex64 = Complex64::new(1.0, 0.0);
const ZERO: Complex64 = Complex64::new(0.0, 0.0);

/// Returns the Pauli matrices `[σx, σy, σz]`.
pub fn pauli() -> [Matrix2<Complex64>; 3] {
    [
        Matrix2::new(ZERO, ONE, ONE, ZERO),
        Matrix2::new(ZERO, -I, I, ZERO),
        Matrix2::new(ONE, ZERO, ZERO, -ONE),
    ]
}

/// Returns `[1, σx, σy, σz]`, the basis used by [`spin_components`] and [`spin_compose`].
fn spin_basis() -> [Matrix2<Complex64>; 4] {
    let [sx, sy, sz] = pauli();
    [Matrix2::identity(), sx, sy, sz]
}

pub fn commutator(a: &DMatrix<Complex64>, b: &DMatrix<Complex64>) -> DMatrix<Complex64> {
    a * b - b * a
}

/// Skew-symmetric matrix `[v]×` such that `cross_m(v) * w == v × w`.
pub fn cross_m(v: &Vector3<f64>) -> Matrix3<f64> {
    Matrix3::new(0.0, -v.z, v.y, v.z, 0.0, -v.x, -v.y, v.x, 0.0)
}

/// Rotation by `theta` radians about `axis` (Rodrigues' formula).
///
/// The axis is normalized internally; a zero axis yields the identity.
pub fn rot_m(theta: f64, axis: &Vector3<f64>) -> Matrix3<f64> {
    let Some(u) = axis.try_normalize(0.0) else {
        return Matrix3::identity();
    };
    let k = cross_m(&u);
    Matrix3::identity() * theta.cos() + k * theta.sin() + (u * u.transpose()) * (1.0 - theta.cos())
}

/// Minimal-angle rotation taking the direction of `a` onto the direction of `b`.
///
/// The rotation axis is `a × b`, so nothing rolls about the target axis. Antiparallel inputs
/// rotate by π about an axis perpendicular to `a`.
pub fn rot_m_a2b(a: &Vector3<f64>, b: &Vector3<f64>) -> Matrix3<f64> {
    if a.norm() == 0.0 || b.norm() == 0.0 {
        return Matrix3::identity();
    }
    match Rotation3::rotation_between(a, b) {
        Some(rotation) => rotation.into_inner(),
        None => {
            let helper = if a.x.abs() < 0.9 * a.norm() {
                Vector3::x()
            } else {
                Vector3::y()
            };
            rot_m(std::f64::consts::PI, &a.cross(&helper))
        }
    }
}

/// Spin-1/2 operator `exp(-i θ/2 n·σ)` for the rotation [`rot_m`]`(theta, axis)`.
pub fn su2_rotation(theta: f64, axis: &Vector3<f64>) -> Matrix2<Complex64> {
    let n_sigma = pauli_along(axis);
    Matrix2::identity() * Complex64::from((0.5 * theta).cos()) - n_sigma * (I * (0.5 * theta).sin())
}

/// `u·σ` for the normalized direction of `u`.
pub fn pauli_along(u: &Vector3<f64>) -> Matrix2<Complex64> {
    let u = u.try_normalize(0.0).unwrap_or_else(Vector3::zeros);
    let [sx, sy, sz] = pauli();
    sx * Complex64::from(u.x) + sy * Complex64::from(u.y) + sz * Complex64::from(u.z)
}

/// Embeds a 2×2 spin block as `I_n ⊗ block` in the interleaved spin-orbital basis.
pub fn kron_identity(n_orbitals: usize, block: &Matrix2<Complex64>) -> DMatrix<Complex64> {
    let dim = 2 * n_orbitals;
    DMatrix::from_fn(dim, dim, |r, c| {
        if r / 2 == c / 2 {
            block[(r % 2, c % 2)]
        } else {
            ZERO
        }
    })
}

/// Spin operator along `u` over `n_orbitals` orbitals: `I_n ⊗ (u·σ)/|u|`.
pub fn tau_u(u: &Vector3<f64>, n_orbitals: usize) -> DMatrix<Complex64> {
    kron_identity(n_orbitals, &pauli_along(u))
}

/// Splits a spin-orbital matrix into orbital matrices `[h0, hx, hy, hz]` with
/// `M = h0 ⊗ 1 + Σ hα ⊗ σα`, where `hα[a, b] = Tr(M_ab σα) / 2`.
pub fn spin_components(m: &DMatrix<Complex64>) -> [DMatrix<Complex64>; 4] {
    let n = m.nrows() / 2;
    let basis = spin_basis();
    basis.map(|sigma| {
        DMatrix::from_fn(n, n, |a, b| {
            let mut acc = ZERO;
            for s in 0..2 {
                for t in 0..2 {
                    acc += m[(2 * a + s, 2 * b + t)] * sigma[(t, s)];
                }
            }
            acc * 0.5
        })
    })
}

/// Inverse of [`spin_components`].
pub fn spin_compose(components: &[DMatrix<Complex64>; 4]) -> DMatrix<Complex64> {
    let n = components[0].nrows();
    let basis = spin_basis();
    DMatrix::from_fn(2 * n, 2 * n, |r, c| {
        let (a, s) = (r / 2, r % 2);
        let (b, t) = (c / 2, c % 2);
        components
            .iter()
            .zip(basis.iter())
            .map(|(h, sigma)| h[(a, b)] * sigma[(s, t)])
            .sum()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Unit;

    const TOLERANCE: f64 = 1e-12;

    fn max_abs(m: &DMatrix<Complex64>) -> f64 {
        m.iter().map(|c| c.norm()).fold(0.0, f64::max)
    }

    fn to_dynamic(m: &Matrix2<Complex64>) -> DMatrix<Complex64> {
        DMatrix::from_fn(2, 2, |r, c| m[(r, c)])
    }

    #[test]
    fn commutator_of_matrix_with_itself_vanishes() {
        let a = DMatrix::from_fn(4, 4, |r, c| Complex64::new(r as f64 + 0.3, c as f64 - 1.7));
        assert!(max_abs(&commutator(&a, &a)) < TOLERANCE);
    }

    #[test]
    fn commutator_of_pauli_matrices_follows_su2_algebra() {
        let [sx, sy, sz] = pauli();
        let result = commutator(&to_dynamic(&sx), &to_dynamic(&sy));
        let expected = to_dynamic(&sz) * (I * 2.0);
        assert!(max_abs(&(result.clone() - expected)) < TOLERANCE);
        assert!(max_abs(&result) > 1.0);
    }

    #[test]
    fn cross_m_reproduces_cross_product() {
        let v = Vector3::new(0.3, -1.2, 2.5);
        let w = Vector3::new(-0.7, 0.4, 1.1);
        assert!((cross_m(&v) * w - v.cross(&w)).norm() < TOLERANCE);
    }

    #[test]
    fn rot_m_matches_axis_angle_rotation() {
        let axis = Vector3::new(1.0, 2.0, -0.5);
        let theta = 0.83;
        let reference = Rotation3::from_axis_angle(&Unit::new_normalize(axis), theta);
        assert!((rot_m(theta, &axis) - reference.into_inner()).norm() < TOLERANCE);
    }

    #[test]
    fn rot_m_a2b_of_identical_axes_is_identity() {
        for a in [Vector3::x(), Vector3::new(0.2, -0.4, 0.9).normalize()] {
            assert!((rot_m_a2b(&a, &a) - Matrix3::identity()).norm() < TOLERANCE);
        }
    }

    #[test]
    fn rot_m_a2b_maps_a_onto_b_without_roll() {
        let a = Vector3::new(0.0, 0.0, 1.0);
        let b = Vector3::new(1.0, 1.0, 0.0).normalize();
        let r = rot_m_a2b(&a, &b);
        assert!((r * a - b).norm() < TOLERANCE);
        let axis = a.cross(&b);
        assert!((r * axis - axis).norm() < TOLERANCE);
        assert!((r.determinant() - 1.0).abs() < TOLERANCE);
    }

    #[test]
    fn rot_m_a2b_handles_antiparallel_axes() {
        let a = Vector3::z();
        let r = rot_m_a2b(&a, &(-a));
        assert!((r * a + a).norm() < TOLERANCE);
        assert!((r.determinant() - 1.0).abs() < TOLERANCE);
    }

    #[test]
    fn su2_rotation_is_consistent_with_rot_m() {
        let axis = Vector3::new(0.4, -0.1, 0.7);
        let theta = 1.3;
        let u = su2_rotation(theta, &axis);
        let r = rot_m(theta, &axis);
        let a = Vector3::new(0.6, 0.8, 0.0);
        let rotated = u * pauli_along(&a) * u.adjoint();
        let expected = pauli_along(&(r * a));
        assert!(max_abs(&to_dynamic(&(rotated - expected))) < TOLERANCE);
    }

    #[test]
    fn tau_u_squares_to_identity() {
        let tau = tau_u(&Vector3::new(1.0, -2.0, 0.5), 3);
        let square = &tau * &tau;
        assert!(max_abs(&(square - DMatrix::identity(6, 6))) < TOLERANCE);
    }

    #[test]
    fn spin_components_invert_spin_compose() {
        let m = DMatrix::from_fn(4, 4, |r, c| {
            Complex64::new((r * 3 + c) as f64 * 0.1, (r as f64 - c as f64) * 0.25)
        });
        let rebuilt = spin_compose(&spin_components(&m));
        assert!(max_abs(&(rebuilt - m)) < TOLERANCE);
    }
}
