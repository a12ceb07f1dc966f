use super::entity::{MagneticEntity, SelectionError};
use super::layout::Layout;
use nalgebra::{DMatrix, Matrix3, Vector3};
use num_complex::Complex64;

/// Bilinear exchange between two spins, `E = e_i·J·e_j`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExchangeTensor {
    pub j: Matrix3<f64>,
    /// Isotropic part, `Tr J / 3`.
    pub iso: f64,
    /// Dzyaloshinskii-Moriya vector of the antisymmetric part.
    pub dm: Vector3<f64>,
    /// Symmetric traceless part.
    pub s: Matrix3<f64>,
}

impl ExchangeTensor {
    pub fn from_matrix(j: Matrix3<f64>) -> Self {
        let iso = j.trace() / 3.0;
        let dm = Vector3::new(
            0.5 * (j[(1, 2)] - j[(2, 1)]),
            0.5 * (j[(2, 0)] - j[(0, 2)]),
            0.5 * (j[(0, 1)] - j[(1, 0)]),
        );
        let s = (j + j.transpose()) * 0.5 - Matrix3::identity() * iso;
        Self { j, iso, dm, s }
    }

    /// Rebuilds the tensor from `iso`, `dm` and `[Sxx, Syy, Sxy, Sxz, Syz]`.
    pub fn from_parts(iso: f64, dm: Vector3<f64>, s: [f64; 5]) -> Self {
        let szz = -(s[0] + s[1]);
        let symmetric = Matrix3::new(s[0], s[2], s[3], s[2], s[1], s[4], s[3], s[4], szz);
        let antisymmetric = Matrix3::new(0.0, dm.z, -dm.y, -dm.z, 0.0, dm.x, dm.y, -dm.x, 0.0);
        let j = Matrix3::identity() * iso + symmetric + antisymmetric;
        Self {
            j,
            iso,
            dm,
            s: symmetric,
        }
    }

    /// `[Sxx, Syy, Sxy, Sxz, Syz]`.
    pub fn s_components(&self) -> [f64; 5] {
        let s = &self.s;
        [s[(0, 0)], s[(1, 1)], s[(0, 1)], s[(0, 2)], s[(1, 2)]]
    }
}

/// Bond request between two entities, by index into an entity list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PairSpec {
    pub ai: usize,
    pub aj: usize,
    pub ruc: Vector3<i32>,
}

impl PairSpec {
    pub fn new(ai: usize, aj: usize, ruc: [i32; 3]) -> Self {
        Self {
            ai,
            aj,
            ruc: Vector3::from(ruc),
        }
    }
}

/// Exchange bond between entity `ai` in the home cell and entity `aj` translated by `ruc`.
///
/// Entities are referenced by index into the owning entity list.
#[derive(Debug, Clone)]
pub struct Pair {
    ai: usize,
    aj: usize,
    ruc: Vector3<i32>,
    tag1: String,
    tag2: String,
    xyz1: Vector3<f64>,
    xyz2: Vector3<f64>,
    distance: f64,
    /// Accumulated `G(i0, jR)` and `G(jR, i0)`, `[orientation][contour point]`.
    pub(crate) gij: Vec<Vec<DMatrix<Complex64>>>,
    pub(crate) gji: Vec<Vec<DMatrix<Complex64>>>,
    energies: Vec<[f64; 4]>,
    exchange: Option<ExchangeTensor>,
}

impl Pair {
    pub fn new(
        entities: &[MagneticEntity],
        layout: &Layout,
        ai: usize,
        aj: usize,
        ruc: Vector3<i32>,
    ) -> Result<Self, SelectionError> {
        let lookup = |index: usize| {
            entities.get(index).ok_or(SelectionError::EntityOutOfRange {
                index,
                count: entities.len(),
            })
        };
        let first = lookup(ai)?;
        let second = lookup(aj)?;
        let xyz1 = *first.xyz();
        let xyz2 = *second.xyz();
        let distance = (xyz2 + layout.lattice_translation(&ruc) - xyz1).norm();

        Ok(Self {
            ai,
            aj,
            ruc,
            tag1: first.tag().to_string(),
            tag2: second.tag().to_string(),
            xyz1,
            xyz2,
            distance,
            gij: Vec::new(),
            gji: Vec::new(),
            energies: Vec::new(),
            exchange: None,
        })
    }

    pub fn ai(&self) -> usize {
        self.ai
    }

    pub fn aj(&self) -> usize {
        self.aj
    }

    pub fn ruc(&self) -> &Vector3<i32> {
        &self.ruc
    }

    pub fn tag1(&self) -> &str {
        &self.tag1
    }

    pub fn tag2(&self) -> &str {
        &self.tag2
    }

    /// Home-cell position of the first entity.
    pub fn xyz1(&self) -> &Vector3<f64> {
        &self.xyz1
    }

    /// Home-cell position of the second entity, without the `ruc` translation.
    pub fn xyz2(&self) -> &Vector3<f64> {
        &self.xyz2
    }

    /// Bond length including the lattice translation.
    pub fn distance(&self) -> f64 {
        self.distance
    }

    /// An entity paired with itself in the home cell.
    pub fn is_self_pair(&self) -> bool {
        self.ai == self.aj && self.ruc == Vector3::zeros()
    }

    /// Mixed second-order energies `[orientation][vv, vw, wv, ww]`, empty before a solve.
    pub fn energies(&self) -> &[[f64; 4]] {
        &self.energies
    }

    pub fn exchange(&self) -> Option<&ExchangeTensor> {
        self.exchange.as_ref()
    }

    pub(crate) fn set_energies(&mut self, energies: Vec<[f64; 4]>) {
        self.energies = energies;
    }

    pub(crate) fn set_exchange(&mut self, exchange: ExchangeTensor) {
        self.exchange = Some(exchange);
    }

    pub(crate) fn clear_intermediates(&mut self) {
        self.gij = Vec::new();
        self.gji = Vec::new();
    }
}
