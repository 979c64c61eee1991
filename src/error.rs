//! Error types shared by every module of the crate.

use thiserror::Error;

/// Result type for flyvis operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for flyvis operations
#[derive(Error, Debug)]
pub enum Error {
    /// A tensor or array does not have the shape an operation requires
    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    /// A key is not present in an auto-dereferencing namespace
    #[error("Missing attribute: {0}")]
    MissingKey(String),

    /// A namespace entry exists but holds a different kind of value
    #[error("Attribute '{key}' is not a {expected}")]
    TypeMismatch { key: String, expected: &'static str },

    /// A cell type is not part of the connectome
    #[error("Unknown cell type: {0}")]
    UnknownCellType(String),

    /// The stimulus buffer was released and must be rebuilt with `zero`
    #[error("Stimulus buffer released; call zero() before writing")]
    BufferReleased,

    /// Handles that are aggregated together do not share a connectome layout
    #[error("Connectome mismatch: {0}")]
    ConnectomeMismatch(String),

    #[error("Missing column: {0}")]
    MissingColumn(String),

    #[error("Missing validation loss for network '{0}'")]
    MissingValidationLoss(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Ensemble is empty")]
    EmptyEnsemble,

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Tensor data could not be read back from the backend
    #[error("Tensor data error: {0}")]
    Tensor(String),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<bincode::Error> for Error {
    fn from(err: bincode::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<ndarray::ShapeError> for Error {
    fn from(err: ndarray::ShapeError) -> Self {
        Error::ShapeMismatch(err.to_string())
    }
}
