//! Error kinds for every failure the engine reports back to callers.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Malformed options or genome files, sensor-count mismatches and the like.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A structural invariant of a genome or network no longer holds. Fatal
    /// for the trial that observes it.
    #[error("invariant violated: {0}")]
    Invariant(String),

    /// External cancellation (signal or caller request) observed between
    /// generations.
    #[error("trial cancelled")]
    Cancelled,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialize(String),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialize(e.to_string())
    }
}

impl From<bincode::error::EncodeError> for Error {
    fn from(e: bincode::error::EncodeError) -> Self {
        Error::Serialize(e.to_string())
    }
}

impl From<bincode::error::DecodeError> for Error {
    fn from(e: bincode::error::DecodeError) -> Self {
        Error::Serialize(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
