use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Configuration(String),
    /// The version-control backend could not produce a diff.
    #[error("version control error: {0}")]
    SourceUnavailable(String),
    /// The completion endpoint could not be reached or answered with an error.
    #[error("language model error: {0}")]
    TransportUnavailable(String),
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type AppResult<T> = Result<T, AppError>;
