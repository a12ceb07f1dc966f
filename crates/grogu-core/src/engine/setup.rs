use super::config::{AtomSelector, EntityRequest, EntityTemplate, ExchangeConfig, SystemSetup};
use super::error::EngineError;
use crate::core::hamiltonian::Hamiltonian;
use crate::core::io::tag::decipher;
use crate::core::models::entity::{EntitySpec, MagneticEntity, SelectionError};
use crate::core::models::layout::Layout;
use crate::core::models::pair::{Pair, PairSpec};
use crate::engine::config::ConfigError;
use itertools::iproduct;
use nalgebra::Vector3;
use tracing::{debug, info, instrument, warn};

/// Resolves the configured setup into entities and the pairs between them.
#[instrument(skip_all, name = "system_setup")]
pub fn setup_system(
    hamiltonian: &Hamiltonian,
    config: &ExchangeConfig,
) -> Result<(Vec<MagneticEntity>, Vec<Pair>), EngineError> {
    let (entities, pairs) = match &config.setup {
        SystemSetup::Explicit { entities, pairs } => {
            setup_explicit(hamiltonian.layout(), entities, pairs, config.include_self_pairs)?
        }
        SystemSetup::FromRange {
            radius,
            atomic_subset,
            kwargs_for_mag_ent,
        } => setup_from_range(
            hamiltonian,
            *radius,
            atomic_subset,
            kwargs_for_mag_ent,
            config.include_self_pairs,
        )?,
    };
    info!(
        entities = entities.len(),
        pairs = pairs.len(),
        "Magnetic entities and pairs resolved."
    );
    Ok((entities, pairs))
}

fn setup_explicit(
    layout: &Layout,
    requests: &[EntityRequest],
    pair_specs: &[PairSpec],
    include_self_pairs: bool,
) -> Result<(Vec<MagneticEntity>, Vec<Pair>), EngineError> {
    let entities = requests
        .iter()
        .map(|request| {
            let spec = match request {
                EntityRequest::Spec(spec) => spec.clone(),
                EntityRequest::Tag(tag) => decipher(tag)?,
            };
            Ok(MagneticEntity::new(layout, &spec)?)
        })
        .collect::<Result<Vec<_>, EngineError>>()?;

    let mut pairs = Vec::with_capacity(pair_specs.len());
    for spec in pair_specs {
        let pair = Pair::new(&entities, layout, spec.ai, spec.aj, spec.ruc)?;
        if pair.is_self_pair() && !include_self_pairs {
            warn!(
                entity = pair.tag1(),
                "Dropping self-pair; it carries no inter-entity exchange."
            );
            continue;
        }
        pairs.push(pair);
    }
    Ok((entities, pairs))
}

fn setup_from_range(
    hamiltonian: &Hamiltonian,
    radius: f64,
    atomic_subset: &[AtomSelector],
    template: &EntityTemplate,
    include_self_pairs: bool,
) -> Result<(Vec<MagneticEntity>, Vec<Pair>), EngineError> {
    let layout = hamiltonian.layout();
    let atoms = select_atoms(layout, atomic_subset)?;

    let mut entities = Vec::with_capacity(atoms.len());
    for atom in atoms {
        let spec = EntitySpec {
            atom: vec![atom],
            l: template.l.clone().map(|shell| vec![shell]),
            orb: template.orb.clone().map(|orbitals| vec![orbitals]),
        };
        match MagneticEntity::new(layout, &spec) {
            Ok(entity) => entities.push(entity),
            Err(SelectionError::EmptySelection { atom }) => {
                warn!(atom, "Skipping atom without orbitals in the requested selection.");
            }
            Err(e) => return Err(e.into()),
        }
    }
    if entities.is_empty() {
        return Err(ConfigError::InvalidParameter {
            name: "atomic_subset",
            reason: "no atom yields a magnetic entity".to_string(),
        }
        .into());
    }

    let n = entities.len();
    let mut pairs = Vec::new();
    for (i, j, offset) in iproduct!(0..n, 0..n, hamiltonian.offsets().iter()) {
        if !keeps_bond(i, j, offset, include_self_pairs) {
            continue;
        }
        let pair = Pair::new(&entities, layout, i, j, *offset)?;
        if pair.distance() <= radius {
            pairs.push(pair);
        }
    }
    debug!(
        radius,
        offsets = hamiltonian.offsets().len(),
        pairs = pairs.len(),
        "Pairs enumerated from supercell offsets."
    );
    Ok((entities, pairs))
}

/// Keeps one of the two equivalent orientations `(i, j, R)` and `(j, i, -R)` of every bond.
fn keeps_bond(i: usize, j: usize, offset: &Vector3<i32>, include_self_pairs: bool) -> bool {
    let key = [offset.x, offset.y, offset.z];
    match i.cmp(&j) {
        std::cmp::Ordering::Less => true,
        std::cmp::Ordering::Greater => false,
        std::cmp::Ordering::Equal => key > [0, 0, 0] || (include_self_pairs && key == [0, 0, 0]),
    }
}

fn select_atoms(layout: &Layout, subset: &[AtomSelector]) -> Result<Vec<usize>, EngineError> {
    if subset.is_empty() {
        return Ok((0..layout.n_atoms()).collect());
    }

    let mut selected = vec![false; layout.n_atoms()];
    for selector in subset {
        match selector {
            AtomSelector::Index(index) => {
                let slot = selected
                    .get_mut(*index)
                    .ok_or(SelectionError::AtomOutOfRange {
                        index: *index,
                        count: layout.n_atoms(),
                    })?;
                *slot = true;
            }
            AtomSelector::Species(species) => {
                let mut found = false;
                for (slot, atom) in selected.iter_mut().zip(layout.atoms()) {
                    if &atom.tag == species {
                        *slot = true;
                        found = true;
                    }
                }
                if !found {
                    return Err(ConfigError::InvalidParameter {
                        name: "atomic_subset",
                        reason: format!("no atom of species '{}'", species),
                    }
                    .into());
                }
            }
        }
    }
    Ok(selected
        .iter()
        .enumerate()
        .filter_map(|(i, &keep)| keep.then_some(i))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::entity::ShellSelection;
    use crate::engine::config::ExchangeConfigBuilder;
    use crate::testing::{DimerParams, chain, dimer};

    fn range_config(radius: f64, include_self_pairs: bool) -> ExchangeConfig {
        ExchangeConfigBuilder::new()
            .setup(SystemSetup::FromRange {
                radius,
                atomic_subset: Vec::new(),
                kwargs_for_mag_ent: EntityTemplate {
                    l: Some(ShellSelection::All),
                    orb: None,
                },
            })
            .include_self_pairs(include_self_pairs)
            .build()
            .unwrap()
    }

    #[test]
    fn range_setup_on_a_chain_keeps_one_direction_per_bond() {
        let ham = chain(1.0, 0.5, 0.0);
        let (entities, pairs) = setup_system(&ham, &range_config(1.5, false)).unwrap();
        assert_eq!(entities.len(), 1);
        assert_eq!(entities[0].tag(), "0Fe(l:All)");
        assert_eq!(pairs.len(), 1);
        assert_eq!(*pairs[0].ruc(), Vector3::new(1, 0, 0));
        assert!((pairs[0].distance() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn range_setup_respects_the_radius_and_order() {
        let ham = dimer(&DimerParams::default());
        let (entities, pairs) = setup_system(&ham, &range_config(0.5, false)).unwrap();
        assert_eq!(entities.len(), 2);
        assert!(pairs.is_empty());

        let (_, pairs) = setup_system(&ham, &range_config(1.0, true)).unwrap();
        let ids: Vec<_> = pairs.iter().map(|p| (p.ai(), p.aj())).collect();
        assert_eq!(ids, vec![(0, 0), (0, 1), (1, 1)]);
    }

    #[test]
    fn atomic_subset_filters_by_species_and_index() {
        let layout = dimer(&DimerParams::default()).layout().clone();
        assert_eq!(
            select_atoms(&layout, &[AtomSelector::Index(1)]).unwrap(),
            vec![1]
        );
        assert_eq!(
            select_atoms(&layout, &[AtomSelector::Species("Fe".to_string())]).unwrap(),
            vec![0, 1]
        );
        assert!(select_atoms(&layout, &[AtomSelector::Species("Te".to_string())]).is_err());
        assert!(matches!(
            select_atoms(&layout, &[AtomSelector::Index(5)]).unwrap_err(),
            EngineError::Selection(SelectionError::AtomOutOfRange { index: 5, count: 2 })
        ));
    }

    #[test]
    fn explicit_setup_drops_self_pairs_unless_requested() {
        let ham = dimer(&DimerParams::default());
        let setup = SystemSetup::Explicit {
            entities: vec![
                EntityRequest::Spec(EntitySpec::atom(0)),
                EntityRequest::Tag("1Fe(o:0)".to_string()),
            ],
            pairs: vec![PairSpec::new(0, 1, [0, 0, 0]), PairSpec::new(1, 1, [0, 0, 0])],
        };
        let build = |include| {
            ExchangeConfigBuilder::new()
                .setup(setup.clone())
                .include_self_pairs(include)
                .build()
                .unwrap()
        };

        let (entities, pairs) = setup_system(&ham, &build(false)).unwrap();
        assert_eq!(entities[1].tag(), "1Fe(o:0)");
        assert_eq!(pairs.len(), 1);

        let (_, pairs) = setup_system(&ham, &build(true)).unwrap();
        assert_eq!(pairs.len(), 2);
        assert!(pairs[1].is_self_pair());
    }

    #[test]
    fn explicit_setup_reports_bad_selections() {
        let ham = dimer(&DimerParams::default());
        let config = |entities, pairs| {
            ExchangeConfigBuilder::new()
                .setup(SystemSetup::Explicit { entities, pairs })
                .build()
                .unwrap()
        };

        let err = setup_system(
            &ham,
            &config(vec![EntityRequest::Spec(EntitySpec::atom(7))], Vec::new()),
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::Selection(_)));

        let err = setup_system(
            &ham,
            &config(vec![EntityRequest::Tag("0Fe(a:0)".to_string())], Vec::new()),
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::Tag(_)));

        let err = setup_system(
            &ham,
            &config(
                vec![EntityRequest::Spec(EntitySpec::atom(0))],
                vec![PairSpec::new(0, 3, [0, 0, 0])],
            ),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Selection(SelectionError::EntityOutOfRange { index: 3, .. })
        ));
    }
}
