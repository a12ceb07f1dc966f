//! Small tight-binding models shared by the unit tests.

use crate::core::hamiltonian::{Hamiltonian, LatticeBlock};
use crate::core::models::layout::{Atom, Layout, Orbital};
use crate::core::spin::{kron_identity, pauli, pauli_along};
use crate::core::units::EnergyUnit;
use nalgebra::{DMatrix, Matrix2, Matrix3, Vector3};
use num_complex::Complex64;

/// Two single-orbital atoms one unit apart in a large, isolated cell.
#[derive(Debug, Clone)]
pub struct DimerParams {
    /// Onsite exchange splitting, `-delta (axis·σ)`.
    pub delta: f64,
    pub hopping: f64,
    /// Spin-dependent hopping `i soc σz`.
    pub soc: f64,
    pub axis: Vector3<f64>,
}

impl Default for DimerParams {
    fn default() -> Self {
        Self {
            delta: 1.0,
            hopping: 0.5,
            soc: 0.0,
            axis: Vector3::z(),
        }
    }
}

fn s_atom(tag: &str, position: Vector3<f64>) -> Atom {
    Atom {
        tag: tag.to_string(),
        position,
        orbitals: vec![Orbital {
            name: "s".to_string(),
            l: 0,
        }],
    }
}

fn hopping_block(hopping: f64, soc: f64) -> Matrix2<Complex64> {
    Matrix2::identity() * Complex64::from(hopping) + pauli()[2] * Complex64::new(0.0, soc)
}

pub fn dimer_layout() -> Layout {
    Layout::new(
        Matrix3::identity() * 20.0,
        vec![
            s_atom("Fe", Vector3::zeros()),
            s_atom("Fe", Vector3::new(1.0, 0.0, 0.0)),
        ],
    )
}

pub fn dimer(params: &DimerParams) -> Hamiltonian {
    let onsite = pauli_along(&params.axis) * Complex64::from(-params.delta);
    let hop = hopping_block(params.hopping, params.soc);

    let mut h = kron_identity(2, &onsite);
    for s in 0..2 {
        for t in 0..2 {
            h[(s, 2 + t)] = hop[(s, t)];
            h[(2 + s, t)] = hop[(t, s)].conj();
        }
    }
    let blocks = vec![LatticeBlock {
        offset: Vector3::zeros(),
        h,
        s: DMatrix::identity(4, 4),
    }];
    Hamiltonian::new(dimer_layout(), blocks, EnergyUnit::ElectronVolt)
        .expect("dimer blocks are well formed")
}

/// One single-orbital atom per cell, coupled to its neighbours along x.
pub fn chain(delta: f64, hopping: f64, soc: f64) -> Hamiltonian {
    let layout = Layout::new(
        Matrix3::new(1.0, 0.0, 0.0, 0.0, 10.0, 0.0, 0.0, 0.0, 10.0),
        vec![s_atom("Fe", Vector3::zeros())],
    );
    let hop = hopping_block(hopping, soc);
    let forward = DMatrix::from_fn(2, 2, |r, c| hop[(r, c)]);
    let blocks = vec![
        LatticeBlock {
            offset: Vector3::new(-1, 0, 0),
            h: forward.adjoint(),
            s: DMatrix::zeros(2, 2),
        },
        LatticeBlock {
            offset: Vector3::zeros(),
            h: kron_identity(1, &pauli()[2]) * Complex64::from(-delta),
            s: DMatrix::identity(2, 2),
        },
        LatticeBlock {
            offset: Vector3::new(1, 0, 0),
            h: forward,
            s: DMatrix::zeros(2, 2),
        },
    ];
    Hamiltonian::new(layout, blocks, EnergyUnit::ElectronVolt)
        .expect("chain blocks are well formed")
}

/// `n ≥ 3` single-orbital atoms on a circle with unit nearest-neighbour distance, in one
/// isolated cell. Atom `i` hops to `i + 1 (mod n)` with the same block as [`chain`], so the
/// ring at Γ is the chain sampled on `n` k-points.
pub fn ring(n: usize, delta: f64, hopping: f64, soc: f64) -> Hamiltonian {
    assert!(n >= 3, "a ring needs at least three sites");
    let radius = 0.5 / (std::f64::consts::PI / n as f64).sin();
    let atoms = (0..n)
        .map(|i| {
            let phi = 2.0 * std::f64::consts::PI * i as f64 / n as f64;
            s_atom("Fe", Vector3::new(radius * phi.cos(), radius * phi.sin(), 0.0))
        })
        .collect();
    let layout = Layout::new(Matrix3::identity() * 20.0, atoms);

    let hop = hopping_block(hopping, soc);
    let mut h = kron_identity(n, &pauli()[2]) * Complex64::from(-delta);
    for i in 0..n {
        let j = (i + 1) % n;
        for s in 0..2 {
            for t in 0..2 {
                h[(2 * i + s, 2 * j + t)] = hop[(s, t)];
                h[(2 * j + t, 2 * i + s)] = hop[(s, t)].conj();
            }
        }
    }
    let blocks = vec![LatticeBlock {
        offset: Vector3::zeros(),
        h,
        s: DMatrix::identity(2 * n, 2 * n),
    }];
    Hamiltonian::new(layout, blocks, EnergyUnit::ElectronVolt).expect("ring blocks are well formed")
}
