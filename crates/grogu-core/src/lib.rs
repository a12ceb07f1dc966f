//! # grogu
//!
//! Magnetic exchange and anisotropy tensors from tight-binding Hamiltonians, computed with
//! the magnetic force theorem on a complex energy contour.
//!
//! ## Architectural Philosophy
//!
//! The library keeps a strict three-layer architecture:
//!
//! - **[`core`]: The Foundation.** Stateless numerics and data models: spin-frame rotations,
//!   the energy contour, k-point sampling, the real-space `Hamiltonian`, magnetic entities and
//!   pairs, and the readers and writers for models, tags and exchange files.
//!
//! - **[`engine`]: The Logic Core.** Configuration, system setup, the Green's function
//!   contour × k-loop with its batching policy, and the combination of per-orientation
//!   energies into exchange and anisotropy tensors.
//!
//! - **[`workflows`]: The Public API.** [`workflows::exchange::run`] executes a complete
//!   calculation and returns an `ExchangeResult`.

pub mod core;
pub mod engine;
pub mod workflows;

#[cfg(test)]
mod testing;
