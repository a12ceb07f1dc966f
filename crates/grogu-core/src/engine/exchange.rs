//! Combination of per-orientation energies into exchange and anisotropy tensors.
//!
//! A spin along `o` rotated by `θ` about `u` tilts along `t(u) = u × o`, so the pair
//! energies probe `t(a)ᵀ J t(b)` and the entity energies probe `t(u)ᵀ K t(u)` up to an
//! orientation dependent constant. `Kzz` is fixed to zero since only differences of
//! diagonal elements are observable.

use super::config::{ConfigError, ReferenceOrientation, SpinModel};
use super::energies::PAIR_PROBES;
use crate::core::models::entity::AnisotropyTensor;
use crate::core::models::pair::ExchangeTensor;
use nalgebra::{DMatrix, DVector, Matrix3, SVD, Vector3};

const RANK_TOLERANCE: f64 = 1e-10;

/// Anisotropy unknowns `[Kxx, Kyy, Kxy, Kxz, Kyz]`, followed by one offset per orientation.
const ANISOTROPY_TERMS: usize = 5;

pub(crate) struct OrientationCombiner {
    model: SpinModel,
    pair_fit: Option<Fit>,
    entity_fit: Option<Fit>,
}

struct Fit {
    design: DMatrix<f64>,
    pseudo_inverse: DMatrix<f64>,
}

impl Fit {
    fn new(design: DMatrix<f64>, what: &str) -> Result<Self, ConfigError> {
        let unknowns = design.ncols();
        let svd = SVD::new(design.clone(), true, true);
        if svd.rank(RANK_TOLERANCE) < unknowns {
            return Err(ConfigError::InvalidParameter {
                name: "ref_xcf_orientations",
                reason: format!("the orientations do not determine the {}", what),
            });
        }
        let pseudo_inverse =
            svd.pseudo_inverse(RANK_TOLERANCE)
                .map_err(|reason| ConfigError::InvalidParameter {
                    name: "ref_xcf_orientations",
                    reason: reason.to_string(),
                })?;
        Ok(Self {
            design,
            pseudo_inverse,
        })
    }

    /// Least-squares solution and the largest residual.
    fn solve(&self, observed: &DVector<f64>) -> (DVector<f64>, f64) {
        let solution = &self.pseudo_inverse * observed;
        let residual = (&self.design * &solution - observed).amax();
        (solution, residual)
    }
}

impl OrientationCombiner {
    pub(crate) fn new(
        model: SpinModel,
        orientations: &[ReferenceOrientation],
    ) -> Result<Self, ConfigError> {
        match model {
            SpinModel::GeneralisedGrogu => {
                if orientations != ReferenceOrientation::defaults().as_slice() {
                    return Err(ConfigError::InvalidParameter {
                        name: "spin_model",
                        reason: "generalised-grogu needs exactly the default x, y and z orientations"
                            .to_string(),
                    });
                }
                Ok(Self {
                    model,
                    pair_fit: None,
                    entity_fit: None,
                })
            }
            SpinModel::GeneralisedFit => Ok(Self {
                model,
                pair_fit: Some(Fit::new(pair_design(orientations), "exchange tensor")?),
                entity_fit: Some(Fit::new(
                    entity_design(orientations),
                    "anisotropy tensor",
                )?),
            }),
        }
    }

    /// Exchange tensor from pair energies `[orientation][vv, vw, wv, ww]`.
    pub(crate) fn exchange(&self, energies: &[[f64; 4]]) -> ExchangeTensor {
        let j = match (&self.model, &self.pair_fit) {
            (SpinModel::GeneralisedFit, Some(fit)) => {
                let observed = DVector::from_iterator(
                    energies.len() * 4,
                    energies.iter().flat_map(|e| e.iter().copied()),
                );
                let (solution, _) = fit.solve(&observed);
                Matrix3::from_fn(|p, q| solution[3 * p + q])
            }
            _ => closed_form_exchange(energies),
        };
        ExchangeTensor::from_matrix(j)
    }

    /// Anisotropy tensor from entity energies `[orientation][v, w, (v+w)/√2]`.
    pub(crate) fn anisotropy(&self, energies: &[Vec<f64>]) -> AnisotropyTensor {
        match (&self.model, &self.entity_fit) {
            (SpinModel::GeneralisedFit, Some(fit)) => {
                let observed = DVector::from_iterator(
                    fit.design.nrows(),
                    energies.iter().flat_map(|e| e.iter().copied()),
                );
                let (s, residual) = fit.solve(&observed);
                AnisotropyTensor {
                    k: Matrix3::new(s[0], s[2], s[3], s[2], s[1], s[4], s[3], s[4], 0.0),
                    consistency: Some(residual),
                }
            }
            _ => closed_form_anisotropy(energies),
        }
    }
}

fn pair_design(orientations: &[ReferenceOrientation]) -> DMatrix<f64> {
    let mut design = DMatrix::zeros(4 * orientations.len(), 9);
    for (o, orientation) in orientations.iter().enumerate() {
        let tilts = orientation.vw.map(|u| orientation.tilt(&u));
        for (r, (a, b)) in PAIR_PROBES.iter().enumerate() {
            for p in 0..3 {
                for q in 0..3 {
                    design[(4 * o + r, 3 * p + q)] = tilts[*a][p] * tilts[*b][q];
                }
            }
        }
    }
    design
}

fn entity_design(orientations: &[ReferenceOrientation]) -> DMatrix<f64> {
    let n = orientations.len();
    let mut design = DMatrix::zeros(3 * n, ANISOTROPY_TERMS + n);
    for (o, orientation) in orientations.iter().enumerate() {
        for (r, u) in orientation.probe_directions().iter().enumerate() {
            let t: Vector3<f64> = orientation.tilt(u);
            let row = 3 * o + r;
            design[(row, 0)] = t.x * t.x;
            design[(row, 1)] = t.y * t.y;
            design[(row, 2)] = 2.0 * t.x * t.y;
            design[(row, 3)] = 2.0 * t.x * t.z;
            design[(row, 4)] = 2.0 * t.y * t.z;
            design[(row, ANISOTROPY_TERMS + o)] = 1.0;
        }
    }
    design
}

/// Orientations `x`, `y`, `z` probed by `[y, z]`, `[x, z]` and `[x, y]`.
fn closed_form_exchange(e: &[[f64; 4]]) -> Matrix3<f64> {
    let (ex, ey, ez) = (&e[0], &e[1], &e[2]);
    let (vv, vw, wv, ww) = (0, 1, 2, 3);

    let jxx = 0.5 * (ey[ww] + ez[ww]);
    let jyy = 0.5 * (ex[ww] + ez[vv]);
    let jzz = 0.5 * (ex[vv] + ey[vv]);
    Matrix3::new(
        jxx, -ez[wv], -ey[wv], //
        -ez[vw], jyy, -ex[wv], //
        -ey[vw], -ex[vw], jzz,
    )
}

fn closed_form_anisotropy(e: &[Vec<f64>]) -> AnisotropyTensor {
    let (ex, ey, ez) = (&e[0], &e[1], &e[2]);
    let (v, w, vw) = (0, 1, 2);

    let kxx = ey[w] - ey[v];
    let kyy = ex[w] - ex[v];
    let kxy = 0.5 * (ez[v] + ez[w]) - ez[vw];
    let kxz = 0.5 * (ey[v] + ey[w]) - ey[vw];
    let kyz = 0.5 * (ex[v] + ex[w]) - ex[vw];
    AnisotropyTensor {
        k: Matrix3::new(kxx, kxy, kxz, kxy, kyy, kyz, kxz, kyz, 0.0),
        consistency: Some(ez[w] - ez[v] - (kxx - kyy)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOLERANCE: f64 = 1e-12;

    fn synthetic_pair(orientations: &[ReferenceOrientation], j: &Matrix3<f64>) -> Vec<[f64; 4]> {
        orientations
            .iter()
            .map(|o| {
                let t = o.vw.map(|u| o.tilt(&u));
                PAIR_PROBES.map(|(a, b)| t[a].dot(&(j * t[b])))
            })
            .collect()
    }

    fn synthetic_entity(
        orientations: &[ReferenceOrientation],
        k: &Matrix3<f64>,
        offsets: &[f64],
    ) -> Vec<Vec<f64>> {
        orientations
            .iter()
            .zip(offsets)
            .map(|(o, c)| {
                o.probe_directions()
                    .iter()
                    .map(|u| {
                        let t = o.tilt(u);
                        t.dot(&(k * t)) + c
                    })
                    .collect()
            })
            .collect()
    }

    fn sample_j() -> Matrix3<f64> {
        Matrix3::new(1.0, 0.3, -0.2, -0.1, 0.8, 0.05, 0.4, -0.25, 1.2)
    }

    fn sample_k() -> Matrix3<f64> {
        Matrix3::new(0.3, 0.02, -0.04, 0.02, -0.1, 0.07, -0.04, 0.07, 0.0)
    }

    #[test]
    fn both_models_recover_an_exact_exchange_tensor() {
        let orientations = ReferenceOrientation::defaults();
        let energies = synthetic_pair(&orientations, &sample_j());
        for model in [SpinModel::GeneralisedGrogu, SpinModel::GeneralisedFit] {
            let combiner = OrientationCombiner::new(model, &orientations).unwrap();
            let tensor = combiner.exchange(&energies);
            assert!((tensor.j - sample_j()).amax() < TOLERANCE, "{model}");
        }
    }

    #[test]
    fn both_models_recover_an_exact_anisotropy_tensor() {
        let orientations = ReferenceOrientation::defaults();
        let energies = synthetic_entity(&orientations, &sample_k(), &[0.5, -1.0, 2.0]);
        for model in [SpinModel::GeneralisedGrogu, SpinModel::GeneralisedFit] {
            let combiner = OrientationCombiner::new(model, &orientations).unwrap();
            let tensor = combiner.anisotropy(&energies);
            assert!((tensor.k - sample_k()).amax() < TOLERANCE, "{model}");
            assert!(tensor.consistency.unwrap().abs() < TOLERANCE);
        }
    }

    #[test]
    fn the_fit_accepts_extra_orientations() {
        let s = std::f64::consts::FRAC_1_SQRT_2;
        let mut orientations = ReferenceOrientation::defaults();
        orientations.push(ReferenceOrientation::new(
            Vector3::new(s, s, 0.0),
            Vector3::new(-s, s, 0.0),
            Vector3::z(),
        ));
        let combiner = OrientationCombiner::new(SpinModel::GeneralisedFit, &orientations).unwrap();

        let energies = synthetic_pair(&orientations, &sample_j());
        assert!((combiner.exchange(&energies).j - sample_j()).amax() < 1e-10);

        let energies = synthetic_entity(&orientations, &sample_k(), &[0.1, 0.2, 0.3, 0.4]);
        assert!((combiner.anisotropy(&energies).k - sample_k()).amax() < 1e-10);
    }

    #[test]
    fn underdetermined_orientations_are_rejected() {
        let single = [ReferenceOrientation::defaults()[2]];
        assert!(matches!(
            OrientationCombiner::new(SpinModel::GeneralisedFit, &single),
            Err(ConfigError::InvalidParameter {
                name: "ref_xcf_orientations",
                ..
            })
        ));
        assert!(OrientationCombiner::new(SpinModel::GeneralisedGrogu, &single).is_err());
    }

    #[test]
    fn closed_form_reports_inconsistent_data() {
        let orientations = ReferenceOrientation::defaults();
        let mut energies = synthetic_entity(&orientations, &sample_k(), &[0.0, 0.0, 0.0]);
        energies[2][1] += 0.01;
        let combiner =
            OrientationCombiner::new(SpinModel::GeneralisedGrogu, &orientations).unwrap();
        let consistency = combiner.anisotropy(&energies).consistency.unwrap();
        assert!((consistency - 0.01).abs() < 1e-12);
    }
}
