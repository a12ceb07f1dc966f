//! Reading and writing the files around a calculation.
//!
//! Models come in through the [`traits::HamiltonianSource`] trait and exchange parameters
//! leave through [`traits::ExchangeFormat`]. The [`tag`] module translates the compact
//! entity tags used in exchange files back into selections.

pub mod magnopy;
pub mod model;
pub mod tag;
pub mod traits;
