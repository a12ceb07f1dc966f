use crate::core::contour::Contour;
use crate::core::hamiltonian::{Hamiltonian, RotatedHamiltonian};
use crate::core::io::magnopy::ExchangeFile;
use crate::core::kspace::KSpace;
use crate::core::models::entity::MagneticEntity;
use crate::core::models::layout::Layout;
use crate::core::models::pair::Pair;
use crate::core::units::EnergyUnit;
use crate::engine::config::ExchangeConfig;
use crate::engine::energies::{compute_perturbations, entity_energies, pair_energies};
use crate::engine::error::EngineError;
use crate::engine::exchange::OrientationCombiner;
use crate::engine::greens::{GreensSolver, Target};
use crate::engine::progress::{Progress, ProgressReporter};
use crate::engine::setup::setup_system;
use tracing::{debug, info, instrument, warn};

/// Solved entities and pairs together with the sampling they were solved on.
#[derive(Debug, Clone)]
pub struct ExchangeResult {
    pub layout: Layout,
    pub entities: Vec<MagneticEntity>,
    pub pairs: Vec<Pair>,
    pub contour: Contour,
    pub kspace: KSpace,
    pub energy_unit: EnergyUnit,
    /// Run parameters, one `key = value` line each.
    pub parameters: Vec<String>,
}

impl ExchangeResult {
    /// Interchange representation; the run parameters become the file comments.
    pub fn to_exchange_file(&self) -> ExchangeFile {
        let mut file =
            ExchangeFile::from_parts(&self.layout, &self.entities, &self.pairs, self.energy_unit);
        file.comments = self.parameters.clone();
        file
    }
}

#[instrument(skip_all, name = "exchange_workflow")]
pub fn run(
    hamiltonian: &Hamiltonian,
    config: &ExchangeConfig,
    reporter: &ProgressReporter,
) -> Result<ExchangeResult, EngineError> {
    // === Phase 1: Magnetic entities and pairs ===
    let (mut entities, mut pairs) =
        reporter.phase("System Setup", || setup_system(hamiltonian, config))?;
    let combiner = OrientationCombiner::new(config.spin_model, &config.ref_orientations)?;

    // === Phase 2: Energy contour ===
    let contour = reporter.phase("Energy Contour", || build_contour(hamiltonian, config))?;

    // === Phase 3: Rotated Hamiltonians and perturbations ===
    reporter.report(Progress::PhaseStart {
        name: "Reference Orientations",
    });
    let rotated: Vec<RotatedHamiltonian<'_>> = config
        .ref_orientations
        .iter()
        .map(|orientation| hamiltonian.rotated(&config.scf_orientation, &orientation.o))
        .collect();
    for entity in entities.iter_mut() {
        compute_perturbations(entity, &rotated, &config.ref_orientations);
    }
    info!(
        orientations = rotated.len(),
        "Built rotated Hamiltonians and perturbations."
    );
    reporter.report(Progress::PhaseFinish);

    // === Phase 4: Green's functions and energies ===
    let targets: Vec<Target> = (0..entities.len())
        .map(Target::Entity)
        .chain((0..pairs.len()).map(Target::Pair))
        .collect();
    let batch_size = clamp_limit(config.max_pairs_per_loop, targets.len(), "max_pairs_per_loop");
    let max_g_per_loop = clamp_limit(config.max_g_per_loop, contour.len(), "max_g_per_loop");

    let solver = GreensSolver {
        rotated: &rotated,
        kspace: &config.kspace,
        contour: &contour,
        mode: config.solver,
        max_g_per_loop,
    };
    let n_batches = targets.len().div_ceil(batch_size);
    info!(
        targets = targets.len(),
        batches = n_batches,
        kpoints = config.kspace.len(),
        energies = contour.len(),
        solver = %config.solver,
        "Starting Green's function integration."
    );

    reporter.report(Progress::PhaseStart {
        name: "Green's Functions",
    });
    reporter.report(Progress::TaskStart {
        total_steps: (n_batches * rotated.len() * config.kspace.len()) as u64,
    });
    for (index, batch) in targets.chunks(batch_size).enumerate() {
        solver.accumulate(&mut entities, &mut pairs, batch, reporter)?;
        evaluate_batch(
            &mut entities,
            &mut pairs,
            batch,
            &contour,
            &combiner,
            config.low_memory_mode,
        );
        debug!(batch = index, size = batch.len(), "Batch evaluated.");
    }
    reporter.report(Progress::TaskFinish);
    reporter.report(Progress::PhaseFinish);

    if config.low_memory_mode {
        for entity in entities.iter_mut() {
            entity.clear_intermediates();
        }
    }

    // === Phase 5: Results ===
    info!(
        entities = entities.len(),
        pairs = pairs.len(),
        "Exchange workflow complete."
    );
    Ok(ExchangeResult {
        layout: hamiltonian.layout().clone(),
        parameters: describe(config, &contour),
        entities,
        pairs,
        contour,
        kspace: config.kspace.clone(),
        energy_unit: hamiltonian.unit(),
    })
}

fn build_contour(hamiltonian: &Hamiltonian, config: &ExchangeConfig) -> Result<Contour, EngineError> {
    let hint = match config.contour.emin {
        Some(_) => None,
        None => {
            let lowest = hamiltonian.min_eigenvalue(config.kspace.points().iter().map(|p| &p.k))?;
            info!(lowest, "Lower contour bound taken from the band minimum.");
            Some(lowest)
        }
    };
    let contour = Contour::build(&config.contour, hint)?;
    info!(
        emin = contour.emin(),
        emax = contour.emax(),
        eset = contour.len(),
        "Energy contour ready."
    );
    Ok(contour)
}

/// `None` means no limit; larger values than the problem size are clamped.
fn clamp_limit(limit: Option<usize>, size: usize, name: &'static str) -> usize {
    let size = size.max(1);
    match limit {
        None => size,
        Some(n) if n > size => {
            warn!(
                limit = n,
                clamped = size,
                "{} exceeds the problem size and was clamped.",
                name
            );
            size
        }
        Some(n) => n.max(1),
    }
}

fn evaluate_batch(
    entities: &mut [MagneticEntity],
    pairs: &mut [Pair],
    batch: &[Target],
    contour: &Contour,
    combiner: &OrientationCombiner,
    low_memory_mode: bool,
) {
    for target in batch {
        match *target {
            Target::Entity(e) => {
                let entity = &mut entities[e];
                let energies = entity_energies(entity, contour);
                entity.set_anisotropy(combiner.anisotropy(&energies));
                entity.set_energies(energies);
                if low_memory_mode {
                    // Perturbations stay until every pair has used them.
                    entity.greens = Vec::new();
                }
            }
            Target::Pair(p) => {
                let pair = &mut pairs[p];
                let energies = pair_energies(pair, &entities[pair.ai()], &entities[pair.aj()], contour);
                pair.set_exchange(combiner.exchange(&energies));
                pair.set_energies(energies);
                if low_memory_mode {
                    pair.clear_intermediates();
                }
            }
        }
    }
}

fn describe(config: &ExchangeConfig, contour: &Contour) -> Vec<String> {
    let mut lines = Vec::new();
    match config.kspace.dimensions() {
        Some([x, y, z]) => lines.push(format!("kset = [{x}, {y}, {z}]")),
        None => lines.push(format!("kpoints = {}", config.kspace.len())),
    }
    lines.push(format!("eset = {}", contour.len()));
    lines.push(format!("esetp = {}", contour.esetp()));
    lines.push(format!("emin = {}", contour.emin()));
    lines.push(format!("emax = {}", contour.emax()));
    let o = &config.scf_orientation;
    lines.push(format!("scf-xcf-orientation = [{}, {}, {}]", o.x, o.y, o.z));
    lines.push(format!(
        "ref-xcf-orientations = {}",
        config.ref_orientations.len()
    ));
    lines.push(format!("spin-model = {}", config.spin_model));
    lines.push(format!("solver = {}", config.solver));
    lines
}
