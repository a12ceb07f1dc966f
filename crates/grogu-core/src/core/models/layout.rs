use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};
use std::ops::Range;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Orbital {
    pub name: String,
    /// Angular momentum quantum number of the shell this orbital belongs to.
    pub l: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Atom {
    /// Species label, e.g. `"Fe"`.
    pub tag: String,
    /// Cartesian position in Å.
    pub position: Vector3<f64>,
    pub orbitals: Vec<Orbital>,
}

/// Lattice cell and orbital layout of a Hamiltonian basis.
///
/// Orbitals are numbered consecutively atom after atom; the spin-orbital basis doubles
/// every orbital index as `2 * orbital + spin`.
#[derive(Debug, Clone, PartialEq)]
pub struct Layout {
    cell: Matrix3<f64>,
    atoms: Vec<Atom>,
    first_orbital: Vec<usize>,
    n_orbitals: usize,
}

impl Layout {
    /// `cell` holds the lattice vectors as rows.
    pub fn new(cell: Matrix3<f64>, atoms: Vec<Atom>) -> Self {
        let mut first_orbital = Vec::with_capacity(atoms.len());
        let mut n_orbitals = 0;
        for atom in &atoms {
            first_orbital.push(n_orbitals);
            n_orbitals += atom.orbitals.len();
        }
        Self {
            cell,
            atoms,
            first_orbital,
            n_orbitals,
        }
    }

    pub fn cell(&self) -> &Matrix3<f64> {
        &self.cell
    }

    pub fn atoms(&self) -> &[Atom] {
        &self.atoms
    }

    pub fn atom(&self, index: usize) -> Option<&Atom> {
        self.atoms.get(index)
    }

    pub fn n_atoms(&self) -> usize {
        self.atoms.len()
    }

    pub fn n_orbitals(&self) -> usize {
        self.n_orbitals
    }

    /// Dimension of the spin-orbital basis.
    pub fn n_spin_orbitals(&self) -> usize {
        2 * self.n_orbitals
    }

    /// Global orbital indices of an atom.
    pub fn orbital_range(&self, atom: usize) -> Option<Range<usize>> {
        let start = *self.first_orbital.get(atom)?;
        Some(start..start + self.atoms[atom].orbitals.len())
    }

    /// Cartesian vector of the integer lattice translation `offset`.
    pub fn lattice_translation(&self, offset: &Vector3<i32>) -> Vector3<f64> {
        self.cell.transpose() * offset.cast::<f64>()
    }

    /// Index of the atom sitting at `position` within `tolerance` Å.
    pub fn find_atom_at(&self, position: &Vector3<f64>, tolerance: f64) -> Option<usize> {
        self.atoms
            .iter()
            .position(|atom| (atom.position - position).norm() <= tolerance)
    }
}
