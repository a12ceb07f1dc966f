use crate::core::contour::ContourParams;
use crate::core::kspace::KSpace;
use crate::core::models::entity::{EntitySpec, ShellSelection};
use crate::core::models::pair::PairSpec;
use nalgebra::Vector3;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

const ORTHOGONALITY_TOLERANCE: f64 = 1e-8;

#[derive(Debug, Error, PartialEq, Clone)]
pub enum ConfigError {
    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),
    #[error("Invalid value for '{name}': {reason}")]
    InvalidParameter { name: &'static str, reason: String },
}

fn invalid(name: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidParameter {
        name,
        reason: reason.into(),
    }
}

/// How the Green's functions of one batch are evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SolverMode {
    /// All contour points of a k-point together, k-points spread over the thread pool.
    #[default]
    Parallel,
    /// One k-point at a time, at most `max_g_per_loop` inversions alive at once.
    Sequential,
}

impl FromStr for SolverMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "parallel" => Ok(SolverMode::Parallel),
            "sequential" => Ok(SolverMode::Sequential),
            _ => Err(format!(
                "unknown solver '{}', expected 'Parallel' or 'Sequential'",
                s
            )),
        }
    }
}

impl fmt::Display for SolverMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SolverMode::Parallel => "Parallel",
            SolverMode::Sequential => "Sequential",
        })
    }
}

/// How per-orientation energies are combined into tensors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SpinModel {
    /// Least-squares fit over any determining set of orientations.
    #[default]
    GeneralisedFit,
    /// Closed-form combination of the three Cartesian orientations.
    GeneralisedGrogu,
}

impl FromStr for SpinModel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "generalised-fit" => Ok(SpinModel::GeneralisedFit),
            "generalised-grogu" => Ok(SpinModel::GeneralisedGrogu),
            _ => Err(format!(
                "unknown spin model '{}', expected 'generalised-fit' or 'generalised-grogu'",
                s
            )),
        }
    }
}

impl fmt::Display for SpinModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SpinModel::GeneralisedFit => "generalised-fit",
            SpinModel::GeneralisedGrogu => "generalised-grogu",
        })
    }
}

/// A quantization axis `o` and the two transverse rotation axes probed around it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReferenceOrientation {
    pub o: Vector3<f64>,
    pub vw: [Vector3<f64>; 2],
}

impl ReferenceOrientation {
    pub fn new(o: Vector3<f64>, v: Vector3<f64>, w: Vector3<f64>) -> Self {
        Self { o, vw: [v, w] }
    }

    /// `x` probed by `[y, z]`, `y` by `[x, z]` and `z` by `[x, y]`.
    pub fn defaults() -> Vec<Self> {
        let (x, y, z) = (Vector3::x(), Vector3::y(), Vector3::z());
        vec![Self::new(x, y, z), Self::new(y, x, z), Self::new(z, x, y)]
    }

    /// `[v, w, (v + w)/√2]`.
    pub fn probe_directions(&self) -> [Vector3<f64>; 3] {
        let [v, w] = self.vw;
        [v, w, (v + w) / std::f64::consts::SQRT_2]
    }

    /// Direction a spin along `o` tilts to when rotated about `u`.
    pub fn tilt(&self, u: &Vector3<f64>) -> Vector3<f64> {
        u.cross(&self.o)
    }

    fn normalized(&self) -> Result<Self, ConfigError> {
        let unit = |v: &Vector3<f64>| {
            v.try_normalize(0.0)
                .ok_or_else(|| invalid("ref_xcf_orientations", "axes must be non-zero"))
        };
        let o = unit(&self.o)?;
        let v = unit(&self.vw[0])?;
        let w = unit(&self.vw[1])?;
        if o.dot(&v).abs() > ORTHOGONALITY_TOLERANCE || o.dot(&w).abs() > ORTHOGONALITY_TOLERANCE
        {
            return Err(invalid(
                "ref_xcf_orientations",
                format!("probe directions must be perpendicular to {:?}", [o.x, o.y, o.z]),
            ));
        }
        Ok(Self::new(o, v, w))
    }
}

/// Picks atoms for range-based setup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AtomSelector {
    Index(usize),
    Species(String),
}

/// Orbital selection applied to every entity created by range-based setup.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EntityTemplate {
    pub l: Option<ShellSelection>,
    pub orb: Option<Vec<usize>>,
}

/// An explicitly requested entity, given as a selection or as a tag.
#[derive(Debug, Clone, PartialEq)]
pub enum EntityRequest {
    Spec(EntitySpec),
    Tag(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum SystemSetup {
    Explicit {
        entities: Vec<EntityRequest>,
        pairs: Vec<PairSpec>,
    },
    FromRange {
        radius: f64,
        /// Empty selects every atom.
        atomic_subset: Vec<AtomSelector>,
        kwargs_for_mag_ent: EntityTemplate,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExchangeConfig {
    pub kspace: KSpace,
    pub contour: ContourParams,
    pub scf_orientation: Vector3<f64>,
    pub ref_orientations: Vec<ReferenceOrientation>,
    pub setup: SystemSetup,
    pub include_self_pairs: bool,
    /// `None` puts every entity and pair in one batch.
    pub max_pairs_per_loop: Option<usize>,
    /// `None` inverts all contour points of a k-point at once.
    pub max_g_per_loop: Option<usize>,
    pub solver: SolverMode,
    pub spin_model: SpinModel,
    pub low_memory_mode: bool,
}

#[derive(Default)]
pub struct ExchangeConfigBuilder {
    kset: Option<[usize; 3]>,
    kspace: Option<KSpace>,
    contour: Option<ContourParams>,
    scf_orientation: Option<Vector3<f64>>,
    ref_orientations: Option<Vec<ReferenceOrientation>>,
    setup: Option<SystemSetup>,
    include_self_pairs: Option<bool>,
    max_pairs_per_loop: Option<usize>,
    max_g_per_loop: Option<usize>,
    solver: Option<SolverMode>,
    spin_model: Option<SpinModel>,
    low_memory_mode: Option<bool>,
}

impl ExchangeConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Uniform mesh dimensions; ignored when [`Self::kspace`] is given.
    pub fn kset(mut self, kset: [usize; 3]) -> Self {
        self.kset = Some(kset);
        self
    }
    pub fn kspace(mut self, kspace: KSpace) -> Self {
        self.kspace = Some(kspace);
        self
    }
    pub fn contour(mut self, params: ContourParams) -> Self {
        self.contour = Some(params);
        self
    }
    pub fn scf_orientation(mut self, orientation: Vector3<f64>) -> Self {
        self.scf_orientation = Some(orientation);
        self
    }
    pub fn ref_orientations(mut self, orientations: Vec<ReferenceOrientation>) -> Self {
        self.ref_orientations = Some(orientations);
        self
    }
    pub fn setup(mut self, setup: SystemSetup) -> Self {
        self.setup = Some(setup);
        self
    }
    pub fn include_self_pairs(mut self, include: bool) -> Self {
        self.include_self_pairs = Some(include);
        self
    }
    pub fn max_pairs_per_loop(mut self, n: usize) -> Self {
        self.max_pairs_per_loop = Some(n);
        self
    }
    pub fn max_g_per_loop(mut self, n: usize) -> Self {
        self.max_g_per_loop = Some(n);
        self
    }
    pub fn solver(mut self, solver: SolverMode) -> Self {
        self.solver = Some(solver);
        self
    }
    pub fn spin_model(mut self, model: SpinModel) -> Self {
        self.spin_model = Some(model);
        self
    }
    pub fn low_memory_mode(mut self, enabled: bool) -> Self {
        self.low_memory_mode = Some(enabled);
        self
    }

    pub fn build(self) -> Result<ExchangeConfig, ConfigError> {
        let setup = self.setup.ok_or(ConfigError::MissingParameter("setup"))?;
        validate_setup(&setup)?;

        let kspace = match (self.kspace, self.kset) {
            (Some(kspace), _) => kspace,
            (None, kset) => KSpace::build(kset.unwrap_or([1, 1, 1]))
                .map_err(|e| invalid("kset", e.to_string()))?,
        };

        let contour = self.contour.unwrap_or_default();
        if contour.eset == 0 {
            return Err(invalid("eset", "must be at least 1"));
        }
        if !(contour.esetp > 0.0) {
            return Err(invalid("esetp", "must be positive"));
        }
        if let Some(emin) = contour.emin {
            let (lo, hi) = (emin + contour.emin_shift, contour.emax + contour.emax_shift);
            if !(hi > lo) {
                return Err(invalid(
                    "emax",
                    format!("shifted bounds [{lo}, {hi}] enclose no energies"),
                ));
            }
        }

        let scf_orientation = self
            .scf_orientation
            .unwrap_or_else(Vector3::z)
            .try_normalize(0.0)
            .ok_or_else(|| invalid("scf_xcf_orientation", "must be non-zero"))?;

        let ref_orientations = self
            .ref_orientations
            .unwrap_or_else(ReferenceOrientation::defaults)
            .iter()
            .map(ReferenceOrientation::normalized)
            .collect::<Result<Vec<_>, _>>()?;
        if ref_orientations.is_empty() {
            return Err(invalid("ref_xcf_orientations", "at least one is required"));
        }

        let spin_model = self.spin_model.unwrap_or_default();
        if spin_model == SpinModel::GeneralisedGrogu
            && ref_orientations != ReferenceOrientation::defaults()
        {
            return Err(invalid(
                "spin_model",
                "generalised-grogu needs exactly the default x, y and z orientations",
            ));
        }

        for (name, limit) in [
            ("max_pairs_per_loop", self.max_pairs_per_loop),
            ("max_g_per_loop", self.max_g_per_loop),
        ] {
            if limit == Some(0) {
                return Err(invalid(name, "must be at least 1"));
            }
        }

        Ok(ExchangeConfig {
            kspace,
            contour,
            scf_orientation,
            ref_orientations,
            setup,
            include_self_pairs: self.include_self_pairs.unwrap_or(false),
            max_pairs_per_loop: self.max_pairs_per_loop,
            max_g_per_loop: self.max_g_per_loop,
            solver: self.solver.unwrap_or_default(),
            spin_model,
            low_memory_mode: self.low_memory_mode.unwrap_or(true),
        })
    }
}

fn validate_setup(setup: &SystemSetup) -> Result<(), ConfigError> {
    match setup {
        SystemSetup::Explicit { entities, .. } => {
            if entities.is_empty() {
                return Err(invalid("magnetic_entities", "at least one entity is required"));
            }
            for request in entities {
                if let EntityRequest::Spec(spec) = request {
                    if spec.l.is_some() && spec.orb.is_some() {
                        return Err(invalid(
                            "magnetic_entities",
                            "an entity may select by 'l' or by 'orb', not both",
                        ));
                    }
                }
            }
        }
        SystemSetup::FromRange {
            radius,
            kwargs_for_mag_ent,
            ..
        } => {
            if !(*radius >= 0.0 && radius.is_finite()) {
                return Err(invalid("radius", "must be a finite, non-negative distance"));
            }
            if kwargs_for_mag_ent.l.is_some() && kwargs_for_mag_ent.orb.is_some() {
                return Err(invalid(
                    "kwargs_for_mag_ent",
                    "select by 'l' or by 'orb', not both",
                ));
            }
        }
    }
    Ok(())
}
