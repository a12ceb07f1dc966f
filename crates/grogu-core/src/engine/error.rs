use thiserror::Error;

use super::config::ConfigError;
use crate::core::contour::ContourError;
use crate::core::hamiltonian::HamiltonianError;
use crate::core::io::tag::TagError;
use crate::core::kspace::KSpaceError;
use crate::core::models::entity::SelectionError;
use num_complex::Complex64;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Invalid contour: {0}")]
    Contour(#[from] ContourError),

    #[error("Invalid k-point set: {0}")]
    KSpace(#[from] KSpaceError),

    #[error("Invalid Hamiltonian: {0}")]
    Hamiltonian(#[from] HamiltonianError),

    #[error("Invalid magnetic entity or pair: {0}")]
    Selection(#[from] SelectionError),

    #[error("Malformed tag: {0}")]
    Tag(#[from] TagError),

    #[error(
        "Green's function inversion failed for reference orientation {orientation} at k = {k:?}, E = {energy}"
    )]
    Numerical {
        orientation: usize,
        k: [f64; 3],
        energy: Complex64,
    },

    #[error("Internal logic error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Errors caused by the inputs rather than by the numerics.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            EngineError::Config(_)
                | EngineError::Contour(_)
                | EngineError::KSpace(_)
                | EngineError::Hamiltonian(_)
                | EngineError::Selection(_)
                | EngineError::Tag(_)
        )
    }

    pub fn is_numerical(&self) -> bool {
        matches!(self, EngineError::Numerical { .. })
    }
}
