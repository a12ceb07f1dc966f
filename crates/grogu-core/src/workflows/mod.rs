//! # Workflows Module
//!
//! High-level entry points that run a complete calculation.
//!
//! - **Exchange Workflow** ([`exchange`]) - Resolves magnetic entities and pairs, integrates
//!   the Green's function over the energy contour and the k-set for every reference
//!   orientation, and combines the resulting energies into exchange and anisotropy tensors.

pub mod exchange;
