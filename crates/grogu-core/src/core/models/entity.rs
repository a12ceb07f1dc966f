use super::layout::Layout;
use nalgebra::{DMatrix, Matrix3, Vector3};
use num_complex::Complex64;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SelectionError {
    #[error("A magnetic entity needs at least one atom")]
    NoAtoms,
    #[error("Atom index {index} is out of range (the layout has {count} atoms)")]
    AtomOutOfRange { index: usize, count: usize },
    #[error("Orbital {index} is out of range for atom {atom} ({count} orbitals)")]
    OrbitalOutOfRange {
        atom: usize,
        index: usize,
        count: usize,
    },
    #[error("The selection for atom {atom} matches no orbitals")]
    EmptySelection { atom: usize },
    #[error("Give either an 'l' or an 'orb' selection, not both")]
    ConflictingSelection,
    #[error("Selection lists {given} entries for {atoms} atoms")]
    LengthMismatch { given: usize, atoms: usize },
    #[error("Magnetic entity index {index} is out of range ({count} entities)")]
    EntityOutOfRange { index: usize, count: usize },
}

/// Angular-momentum channels selected on one atom.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellSelection {
    All,
    Channels(Vec<usize>),
}

/// Structured selection of a magnetic entity: atoms plus, per atom, either shells or orbitals.
///
/// `l` and `orb` hold one entry per atom, or a single entry shared by every atom.
/// Orbital indices in `orb` are local to their atom.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EntitySpec {
    pub atom: Vec<usize>,
    pub l: Option<Vec<ShellSelection>>,
    pub orb: Option<Vec<Vec<usize>>>,
}

impl EntitySpec {
    pub fn atom(index: usize) -> Self {
        Self {
            atom: vec![index],
            ..Self::default()
        }
    }

    pub fn with_l(mut self, channels: Vec<usize>) -> Self {
        self.l = Some(vec![ShellSelection::Channels(channels)]);
        self
    }

    pub fn with_orb(mut self, orbitals: Vec<usize>) -> Self {
        self.orb = Some(vec![orbitals]);
        self
    }
}

/// Onsite anisotropy tensor `K`, in the model `E = e·K·e` with the `Kzz = 0` gauge.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnisotropyTensor {
    pub k: Matrix3<f64>,
    /// Residual of the redundant orientation check, when the model provides one.
    pub consistency: Option<f64>,
}

impl AnisotropyTensor {
    /// `[Kxx, Kyy, Kzz, Kxy, Kxz, Kyz]`.
    pub fn components(&self) -> [f64; 6] {
        let k = &self.k;
        [
            k[(0, 0)],
            k[(1, 1)],
            k[(2, 2)],
            k[(0, 1)],
            k[(0, 2)],
            k[(1, 2)],
        ]
    }

    pub fn from_components(c: [f64; 6]) -> Self {
        let k = Matrix3::new(c[0], c[3], c[4], c[3], c[1], c[5], c[4], c[5], c[2]);
        Self {
            k,
            consistency: None,
        }
    }
}

/// A group of orbitals treated as one classical spin.
#[derive(Debug, Clone)]
pub struct MagneticEntity {
    spec: EntitySpec,
    atoms: Vec<usize>,
    orbitals: Vec<usize>,
    spin_box: Vec<usize>,
    tag: String,
    xyz: Vector3<f64>,
    /// Accumulated onsite Green's functions, `[orientation][contour point]`.
    pub(crate) greens: Vec<Vec<DMatrix<Complex64>>>,
    /// First- and second-order perturbations, `[orientation][probe direction]`.
    pub(crate) vu1: Vec<Vec<DMatrix<Complex64>>>,
    pub(crate) vu2: Vec<Vec<DMatrix<Complex64>>>,
    energies: Vec<Vec<f64>>,
    anisotropy: Option<AnisotropyTensor>,
}

impl MagneticEntity {
    pub fn new(layout: &Layout, spec: &EntitySpec) -> Result<Self, SelectionError> {
        if spec.atom.is_empty() {
            return Err(SelectionError::NoAtoms);
        }
        if spec.l.is_some() && spec.orb.is_some() {
            return Err(SelectionError::ConflictingSelection);
        }
        let n_atoms = spec.atom.len();
        let mut normalized = EntitySpec {
            atom: spec.atom.clone(),
            l: spec.l.as_ref().map(|_| Vec::with_capacity(n_atoms)),
            orb: spec.orb.as_ref().map(|_| Vec::with_capacity(n_atoms)),
        };
        // Parts naming the same atom are merged: `(atom, orbital range start, local orbitals)`.
        let mut selected: Vec<(usize, usize, Vec<usize>)> = Vec::with_capacity(n_atoms);
        let mut parts = Vec::with_capacity(n_atoms);
        let mut xyz = Vector3::zeros();

        for (position, &atom_index) in spec.atom.iter().enumerate() {
            let atom = layout
                .atom(atom_index)
                .ok_or(SelectionError::AtomOutOfRange {
                    index: atom_index,
                    count: layout.n_atoms(),
                })?;
            let range = layout
                .orbital_range(atom_index)
                .ok_or(SelectionError::AtomOutOfRange {
                    index: atom_index,
                    count: layout.n_atoms(),
                })?;
            let count = range.len();

            let (local, selector): (Vec<usize>, String) = match (&spec.l, &spec.orb) {
                (Some(shells), None) => {
                    let shell = per_atom(shells, position, n_atoms)?.clone();
                    let local = match &shell {
                        ShellSelection::All => (0..count).collect(),
                        ShellSelection::Channels(channels) => (0..count)
                            .filter(|&i| channels.contains(&atom.orbitals[i].l))
                            .collect(),
                    };
                    let selector = format!("l:{}", format_shell(&shell));
                    if let Some(l) = normalized.l.as_mut() {
                        l.push(shell);
                    }
                    (local, selector)
                }
                (None, Some(orbs)) => {
                    let requested = per_atom(orbs, position, n_atoms)?.clone();
                    if let Some(&index) = requested.iter().find(|&&i| i >= count) {
                        return Err(SelectionError::OrbitalOutOfRange {
                            atom: atom_index,
                            index,
                            count,
                        });
                    }
                    let mut local = requested.clone();
                    local.sort_unstable();
                    local.dedup();
                    let selector = format!("o:{}", join_dashed(&requested));
                    if let Some(orb) = normalized.orb.as_mut() {
                        orb.push(requested);
                    }
                    (local, selector)
                }
                _ => ((0..count).collect(), "l:All".to_string()),
            };

            if local.is_empty() {
                return Err(SelectionError::EmptySelection { atom: atom_index });
            }
            parts.push(format!("{}{}({})", atom_index, atom.tag, selector));
            match selected.iter_mut().find(|(a, _, _)| *a == atom_index) {
                Some((_, _, merged)) => merged.extend(local),
                None => {
                    xyz += atom.position;
                    selected.push((atom_index, range.start, local));
                }
            }
        }

        let atoms: Vec<usize> = selected.iter().map(|(a, _, _)| *a).collect();
        let mut orbitals = Vec::new();
        for (_, start, mut local) in selected {
            local.sort_unstable();
            local.dedup();
            orbitals.extend(local.iter().map(|i| start + i));
        }
        let spin_box = orbitals.iter().flat_map(|&o| [2 * o, 2 * o + 1]).collect();
        Ok(Self {
            spec: normalized,
            orbitals,
            spin_box,
            tag: parts.join("--"),
            xyz: xyz / atoms.len() as f64,
            atoms,
            greens: Vec::new(),
            vu1: Vec::new(),
            vu2: Vec::new(),
            energies: Vec::new(),
            anisotropy: None,
        })
    }

    /// The selection with per-atom lists expanded.
    pub fn spec(&self) -> &EntitySpec {
        &self.spec
    }

    /// Distinct atoms, in order of first appearance.
    pub fn atoms(&self) -> &[usize] {
        &self.atoms
    }

    /// Global orbital indices.
    pub fn orbitals(&self) -> &[usize] {
        &self.orbitals
    }

    /// Spin-orbital indices in the Hamiltonian basis.
    pub fn spin_box(&self) -> &[usize] {
        &self.spin_box
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Mean position of the entity's atoms.
    pub fn xyz(&self) -> &Vector3<f64> {
        &self.xyz
    }

    /// Second-order energies `[orientation][probe]`, empty before a solve.
    pub fn energies(&self) -> &[Vec<f64>] {
        &self.energies
    }

    pub fn anisotropy(&self) -> Option<&AnisotropyTensor> {
        self.anisotropy.as_ref()
    }

    pub(crate) fn set_energies(&mut self, energies: Vec<Vec<f64>>) {
        self.energies = energies;
    }

    pub(crate) fn set_anisotropy(&mut self, anisotropy: AnisotropyTensor) {
        self.anisotropy = Some(anisotropy);
    }

    pub(crate) fn clear_intermediates(&mut self) {
        self.greens = Vec::new();
        self.vu1 = Vec::new();
        self.vu2 = Vec::new();
    }
}

fn per_atom<T>(entries: &[T], position: usize, atoms: usize) -> Result<&T, SelectionError> {
    match entries.len() {
        1 => Ok(&entries[0]),
        n if n == atoms => Ok(&entries[position]),
        n => Err(SelectionError::LengthMismatch { given: n, atoms }),
    }
}

fn format_shell(shell: &ShellSelection) -> String {
    match shell {
        ShellSelection::All => "All".to_string(),
        ShellSelection::Channels(channels) => join_dashed(channels),
    }
}

fn join_dashed(values: &[usize]) -> String {
    values
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join("-")
}
