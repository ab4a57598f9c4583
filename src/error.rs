//! Error types for the MSTGCN library

use thiserror::Error;

/// Result type alias for this crate
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the library
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid model configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Tensor shape does not match what a layer expects
    #[error("Shape mismatch: expected {expected}, got {got}")]
    ShapeMismatch { expected: String, got: String },

    /// Time-varying connectivity length differs from the number of time steps
    #[error("Connectivity has {got} edge lists but the signal has {expected} time steps")]
    ConnectivityLength { expected: usize, got: usize },

    /// Edge refers to a node that does not exist
    #[error("Edge references node {node} but the graph has {num_nodes} nodes")]
    NodeOutOfRange { node: usize, num_nodes: usize },

    /// Largest Laplacian eigenvalue could not be estimated
    #[error("Spectral estimation failed: {0}")]
    SpectralEstimation(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    TomlDe(#[from] toml::de::Error),

    /// TOML serialization error
    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),
}

impl Error {
    /// Build a shape mismatch error from anything printable
    pub fn shape(expected: impl std::fmt::Debug, got: impl std::fmt::Debug) -> Self {
        Error::ShapeMismatch {
            expected: format!("{:?}", expected),
            got: format!("{:?}", got),
        }
    }

    /// Whether the error comes from the input given to a forward pass
    /// rather than from the model itself
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            Error::ShapeMismatch { .. }
                | Error::ConnectivityLength { .. }
                | Error::NodeOutOfRange { .. }
        )
    }
}
