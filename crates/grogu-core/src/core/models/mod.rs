//! # Core Models Module
//!
//! Data structures describing what is being solved for: the orbital [`layout`] of the
//! basis, the magnetic [`entity`] groups of orbitals treated as classical spins, and the
//! exchange [`pair`]s between them.
//!
//! Entities and pairs carry their solver intermediates and results. Pairs refer to
//! their entities by index into the owning entity list.

pub mod entity;
pub mod layout;
pub mod pair;
