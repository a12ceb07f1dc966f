//! # Engine Module
//!
//! The stateful part of an exchange calculation.
//!
//! ## Overview
//!
//! The engine turns a [`crate::core::hamiltonian::Hamiltonian`] and an immutable
//! [`config::ExchangeConfig`] into solved magnetic entities and pairs. It resolves the
//! requested entities and pairs, accumulates projected Green's functions over the energy
//! contour and the k-set for every reference orientation, evaluates the second-order
//! energies, and combines them into tensors.
//!
//! ## Architecture
//!
//! - **Configuration** ([`config`]) - Builder, solver mode, spin model and reference orientations
//! - **System Setup** ([`setup`]) - Explicit and range-based entity and pair resolution
//! - **Progress Monitoring** ([`progress`]) - Event stream for front ends
//! - **Error Handling** ([`error`]) - Configuration and numerical failures
//!
//! The contour × k-loop, the perturbation energies and the orientation combination are
//! internal and driven by [`crate::workflows::exchange::run`].

pub mod config;
pub(crate) mod energies;
pub mod error;
pub(crate) mod exchange;
pub(crate) mod greens;
pub mod progress;
pub mod setup;
