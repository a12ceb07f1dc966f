//! Complex-energy integration contour.
//!
//! The path is the upper half of the circle whose diameter is `[emin, emax]` on the real
//! axis, traversed from `emin` to `emax`. Gauss-Legendre nodes are laid out in an
//! exponentially stretched variable so that samples crowd towards `emax` (the Fermi
//! level), where the integrands vary fastest. The real-axis endpoints are never sampled.
//!
//! With this orientation `Σ wᵢ f(zᵢ)` approximates `∫ f(z) dz` along the path, and
//! `-1/π Im Σ wᵢ / (zᵢ - ε)` is one for a pole `emin < ε < emax` and zero outside.

use num_complex::Complex64;
use std::f64::consts::PI;
use thiserror::Error;

const NEWTON_TOLERANCE: f64 = 1e-15;
const NEWTON_MAX_ITERATIONS: usize = 100;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ContourError {
    #[error("Contour upper bound {emax} must be greater than the lower bound {emin}")]
    InvalidBounds { emin: f64, emax: f64 },
    #[error("Contour parameter '{name}' must be positive (got {value})")]
    NonPositive { name: &'static str, value: f64 },
    #[error("No lower contour bound was given and no eigenvalue estimate is available")]
    MissingLowerBound,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ContourParams {
    /// Number of sample points along the path.
    pub eset: usize,
    /// Stretching parameter; larger values push more samples towards `emax`.
    pub esetp: f64,
    /// Lower bound before shifting. `None` uses the lowest band energy.
    pub emin: Option<f64>,
    pub emax: f64,
    pub emin_shift: f64,
    pub emax_shift: f64,
}

impl Default for ContourParams {
    fn default() -> Self {
        Self {
            eset: 100,
            esetp: 600.0,
            emin: None,
            emax: 0.0,
            emin_shift: -5.0,
            emax_shift: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContourPoint {
    pub energy: Complex64,
    pub weight: Complex64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Contour {
    emin: f64,
    emax: f64,
    esetp: f64,
    points: Vec<ContourPoint>,
}

impl Contour {
    /// Builds the contour. `eigenvalue_hint` stands in for `params.emin` when that is unset;
    /// both shifts are applied afterwards.
    pub fn build(params: &ContourParams, eigenvalue_hint: Option<f64>) -> Result<Self, ContourError> {
        if params.eset == 0 {
            return Err(ContourError::NonPositive {
                name: "eset",
                value: 0.0,
            });
        }
        if !(params.esetp > 0.0 && params.esetp.is_finite()) {
            return Err(ContourError::NonPositive {
                name: "esetp",
                value: params.esetp,
            });
        }

        let base_emin = params
            .emin
            .or(eigenvalue_hint)
            .ok_or(ContourError::MissingLowerBound)?;
        let emin = base_emin + params.emin_shift;
        let emax = params.emax + params.emax_shift;
        if !(emax > emin) {
            return Err(ContourError::InvalidBounds { emin, emax });
        }

        let points = semicircle_points(emin, emax, params.eset, params.esetp);
        Ok(Self {
            emin,
            emax,
            esetp: params.esetp,
            points,
        })
    }

    pub fn emin(&self) -> f64 {
        self.emin
    }

    pub fn emax(&self) -> f64 {
        self.emax
    }

    pub fn eset(&self) -> usize {
        self.points.len()
    }

    pub fn esetp(&self) -> f64 {
        self.esetp
    }

    pub fn points(&self) -> &[ContourPoint] {
        &self.points
    }

    #[cfg(test)]
    pub(crate) fn points_mut(&mut self) -> &mut [ContourPoint] {
        &mut self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Quadrature of `f` along the path.
    pub fn integrate<F>(&self, mut f: F) -> Complex64
    where
        F: FnMut(Complex64) -> Complex64,
    {
        self.points.iter().map(|p| p.weight * f(p.energy)).sum()
    }
}

fn semicircle_points(emin: f64, emax: f64, eset: usize, esetp: f64) -> Vec<ContourPoint> {
    let (nodes, node_weights) = gauss_legendre(eset);

    let radius = 0.5 * (emax - emin);
    let center = 0.5 * (emax + emin);
    let y1 = -(1.0 + PI * esetp).ln();
    let y2 = 0.0;
    let half_span = 0.5 * (y2 - y1);
    let midpoint = 0.5 * (y2 + y1);
    let i = Complex64::new(0.0, 1.0);

    nodes
        .iter()
        .zip(node_weights.iter())
        .map(|(&x, &wl)| {
            let y = half_span * x + midpoint;
            let phi = ((-y).exp() - 1.0) / esetp;
            let offset = Complex64::from_polar(radius, phi);
            let energy = center + offset;
            let weight = -half_span * (-y).exp() / esetp * i * offset * wl;
            ContourPoint { energy, weight }
        })
        .collect()
}

/// Gauss-Legendre nodes (ascending) and weights on `[-1, 1]`.
pub fn gauss_legendre(n: usize) -> (Vec<f64>, Vec<f64>) {
    let mut nodes = vec![0.0; n];
    let mut weights = vec![0.0; n];

    for i in 0..n.div_ceil(2) {
        let mut x = (PI * (i as f64 + 0.75) / (n as f64 + 0.5)).cos();
        for _ in 0..NEWTON_MAX_ITERATIONS {
            let (p, dp) = legendre(n, x);
            let dx = p / dp;
            x -= dx;
            if dx.abs() < NEWTON_TOLERANCE {
                break;
            }
        }
        let (_, dp) = legendre(n, x);
        let w = 2.0 / ((1.0 - x * x) * dp * dp);

        nodes[n - 1 - i] = x;
        nodes[i] = -x;
        weights[n - 1 - i] = w;
        weights[i] = w;
    }

    (nodes, weights)
}

/// `(P_n(x), P_n'(x))` through the three-term recurrence. Requires `n >= 1`.
fn legendre(n: usize, x: f64) -> (f64, f64) {
    let mut p_prev = 1.0;
    let mut p = x;
    for k in 1..n {
        let k = k as f64;
        let p_next = ((2.0 * k + 1.0) * x * p - k * p_prev) / (k + 1.0);
        p_prev = p;
        p = p_next;
    }
    let dp = n as f64 * (x * p - p_prev) / (x * x - 1.0);
    (p, dp)
}
