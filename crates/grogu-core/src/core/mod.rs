//! # Core Module
//!
//! Stateless building blocks of the exchange calculation.
//!
//! - [`hamiltonian`] - Real-space Hamiltonian, its time-reversal split and Bloch sums
//! - [`contour`] - Complex energy contour with Gauss-Legendre weights
//! - [`kspace`] - Brillouin-zone sampling
//! - [`spin`] - Pauli algebra and rotations
//! - [`models`] - Layout, magnetic entities and pairs
//! - [`io`] - Model loading, exchange files and entity tags
//! - [`units`] - Energy and length unit tags

pub mod contour;
pub mod hamiltonian;
pub mod io;
pub mod kspace;
pub mod models;
pub mod spin;
pub mod units;
