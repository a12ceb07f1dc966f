use grogu::core::io::{magnopy::ExchangeFileError, model::ModelError};
use grogu::engine::error::EngineError;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, CliError>;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("Exchange calculation failed: {0}")]
    Exchange(#[from] EngineError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to parse run file '{path}': {source}", path = path.display())]
    RunFile {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Failed to load model '{path}': {source}", path = path.display())]
    Model {
        path: PathBuf,
        #[source]
        source: ModelError,
    },

    #[error("Failed to write exchange file '{path}': {source}", path = path.display())]
    Output {
        path: PathBuf,
        #[source]
        source: ExchangeFileError,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid argument: {0}")]
    Argument(String),

    /// Startup failures (logger, thread pool).
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
