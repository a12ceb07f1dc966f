use nalgebra::Vector3;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum KSpaceError {
    #[error("k-mesh dimension along axis {axis} must be at least 1")]
    EmptyDimension { axis: usize },
    #[error("A custom k-set needs at least one point")]
    NoPoints,
    #[error("Custom k-set has {points} points but {weights} weights")]
    WeightCountMismatch { points: usize, weights: usize },
    #[error("Custom k-set weights must be non-negative with a positive sum")]
    InvalidWeights,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KPoint {
    /// Fractional reciprocal coordinates.
    pub k: Vector3<f64>,
    pub weight: f64,
}

/// Weighted Brillouin-zone sampling with weights summing to one.
#[derive(Debug, Clone, PartialEq)]
pub struct KSpace {
    dimensions: Option<[usize; 3]>,
    points: Vec<KPoint>,
}

impl KSpace {
    /// Uniform Γ-centred mesh.
    ///
    /// Along an axis with `n` divisions the coordinates are `m / n` for
    /// `m = ⌊-n/2⌋ + 1 ..= ⌊n/2⌋`. Points are ordered with the second axis outermost, then
    /// the first, then the third.
    pub fn build(dimensions: [usize; 3]) -> Result<Self, KSpaceError> {
        if let Some(axis) = dimensions.iter().position(|&n| n == 0) {
            return Err(KSpaceError::EmptyDimension { axis });
        }

        let [kx, ky, kz] = dimensions.map(axis_coordinates);
        let total = dimensions.iter().product::<usize>();
        let weight = 1.0 / total as f64;

        let mut points = Vec::with_capacity(total);
        for &y in &ky {
            for &x in &kx {
                for &z in &kz {
                    points.push(KPoint {
                        k: Vector3::new(x, y, z),
                        weight,
                    });
                }
            }
        }

        Ok(Self {
            dimensions: Some(dimensions),
            points,
        })
    }

    /// Custom k-set. Weights default to uniform and are renormalized to sum to one.
    pub fn from_points(
        kpoints: Vec<Vector3<f64>>,
        weights: Option<Vec<f64>>,
    ) -> Result<Self, KSpaceError> {
        if kpoints.is_empty() {
            return Err(KSpaceError::NoPoints);
        }
        let weights = weights.unwrap_or_else(|| vec![1.0; kpoints.len()]);
        if weights.len() != kpoints.len() {
            return Err(KSpaceError::WeightCountMismatch {
                points: kpoints.len(),
                weights: weights.len(),
            });
        }
        let total: f64 = weights.iter().sum();
        if weights.iter().any(|&w| w < 0.0 || !w.is_finite()) || !(total > 0.0) {
            return Err(KSpaceError::InvalidWeights);
        }

        let points = kpoints
            .into_iter()
            .zip(weights)
            .map(|(k, w)| KPoint {
                k,
                weight: w / total,
            })
            .collect();
        Ok(Self {
            dimensions: None,
            points,
        })
    }

    pub fn gamma() -> Self {
        Self {
            dimensions: Some([1, 1, 1]),
            points: vec![KPoint {
                k: Vector3::zeros(),
                weight: 1.0,
            }],
        }
    }

    /// Mesh dimensions, `None` for custom k-sets.
    pub fn dimensions(&self) -> Option<[usize; 3]> {
        self.dimensions
    }

    pub fn points(&self) -> &[KPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

fn axis_coordinates(n: usize) -> Vec<f64> {
    let n = n as i64;
    let start = (-n).div_euclid(2) + 1;
    let end = n.div_euclid(2);
    (start..=end).map(|m| m as f64 / n as f64).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weights_sum_to_one_for_any_mesh() {
        for dims in [[1, 1, 1], [2, 3, 1], [4, 4, 4], [5, 1, 7]] {
            let kspace = KSpace::build(dims).unwrap();
            let total: f64 = kspace.points().iter().map(|p| p.weight).sum();
            assert!((total - 1.0).abs() < 1e-12);
            assert_eq!(kspace.len(), dims.iter().product::<usize>());
        }
    }

    #[test]
    fn unit_mesh_is_gamma_only() {
        let kspace = KSpace::build([1, 1, 1]).unwrap();
        assert_eq!(kspace, KSpace::gamma());
    }

    #[test]
    fn axis_coordinates_are_gamma_centred() {
        assert_eq!(axis_coordinates(1), vec![0.0]);
        assert_eq!(axis_coordinates(2), vec![0.0, 0.5]);
        assert_eq!(axis_coordinates(3), vec![-1.0 / 3.0, 0.0, 1.0 / 3.0]);
        assert_eq!(axis_coordinates(4), vec![-0.25, 0.0, 0.25, 0.5]);
    }

    #[test]
    fn mesh_order_runs_second_axis_outermost() {
        let kspace = KSpace::build([2, 2, 1]).unwrap();
        let ks: Vec<_> = kspace.points().iter().map(|p| p.k).collect();
        assert_eq!(
            ks,
            vec![
                Vector3::new(0.0, 0.0, 0.0),
                Vector3::new(0.5, 0.0, 0.0),
                Vector3::new(0.0, 0.5, 0.0),
                Vector3::new(0.5, 0.5, 0.0),
            ]
        );
    }

    #[test]
    fn zero_dimension_is_rejected() {
        assert_eq!(
            KSpace::build([3, 0, 1]),
            Err(KSpaceError::EmptyDimension { axis: 1 })
        );
    }

    #[test]
    fn custom_weights_are_normalized() {
        let kspace = KSpace::from_points(
            vec![Vector3::zeros(), Vector3::new(0.5, 0.0, 0.0)],
            Some(vec![1.0, 3.0]),
        )
        .unwrap();
        assert_eq!(kspace.points()[0].weight, 0.25);
        assert_eq!(kspace.points()[1].weight, 0.75);
        assert!(kspace.dimensions().is_none());
    }

    #[test]
    fn malformed_custom_sets_are_rejected() {
        assert_eq!(KSpace::from_points(vec![], None), Err(KSpaceError::NoPoints));
        assert_eq!(
            KSpace::from_points(vec![Vector3::zeros()], Some(vec![1.0, 2.0])),
            Err(KSpaceError::WeightCountMismatch {
                points: 1,
                weights: 2
            })
        );
        assert_eq!(
            KSpace::from_points(vec![Vector3::zeros()], Some(vec![0.0])),
            Err(KSpaceError::InvalidWeights)
        );
    }
}
