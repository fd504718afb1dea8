//! Error types for the fit engine.

use thiserror::Error;

/// Errors raised by distributions, likelihoods and the MCMC driver.
///
/// Configuration problems (`Config`, `MissingParameter`) are raised before a
/// run starts and are fatal for that run. Rejected Monte Carlo proposals are
/// never reported as errors.
#[derive(Error, Debug)]
pub enum FitError {
    /// Malformed axis definition (non-increasing edges, no bins, ...).
    #[error("invalid axis: {0}")]
    InvalidAxis(String),

    /// Shapes or binnings of two objects differ.
    #[error("dimension mismatch: {0}")]
    DimensionMismatch(String),

    /// A bin coordinate or flat index is outside the grid.
    #[error("index {index} out of range (size {size})")]
    IndexOutOfRange { index: usize, size: usize },

    /// An observable name is not part of the distribution.
    #[error("unknown observable '{0}'")]
    UnknownObservable(String),

    /// A template or data distribution does not share the likelihood's axes.
    #[error("axes mismatch: {0}")]
    AxesMismatch(String),

    /// An operation needs state that has not been set yet.
    #[error("not configured: {0}")]
    NotConfigured(String),

    /// The observed data of a likelihood may only be set once.
    #[error("data distribution already set")]
    DataAlreadySet,

    /// A parameter value, bound or sigma is missing.
    #[error("missing parameter '{0}'")]
    MissingParameter(String),

    /// Invalid run or model configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialisation error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV writing error
    #[cfg(feature = "csv")]
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, FitError>;
