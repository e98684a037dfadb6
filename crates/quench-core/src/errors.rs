//! Error types for QUENCH.

use thiserror::Error;

/// Unified error type for all QUENCH operations.
#[derive(Error, Debug)]
pub enum QuenchError {
    /// Model configuration errors (duplicate field names, bad grid sizes,
    /// stepping before `prepare_problem`).
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// A field name that matches nothing registered with the evolver.
    #[error("Unknown field '{name}'")]
    UnknownField { name: String },

    /// Compute-backend errors (buffer length mismatch, transform failure,
    /// CUDA/cuFFT/cuRAND failures on the device path).
    #[error("Backend error in {context}: {message}")]
    BackendError { context: String, message: String },

    /// Mathematical/numerical errors (e.g. NaN, non-finite propagator).
    #[error("Numerical error: {0}")]
    NumericalError(String),

    /// I/O errors (output directory, field snapshot files).
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Generic errors (fallback)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl QuenchError {
    /// Creates a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        QuenchError::ConfigError(message.into())
    }

    /// Creates an unknown-field error.
    pub fn unknown_field(name: impl Into<String>) -> Self {
        QuenchError::UnknownField { name: name.into() }
    }

    /// Creates a backend error with context.
    pub fn backend(context: impl Into<String>, message: impl Into<String>) -> Self {
        QuenchError::BackendError {
            context: context.into(),
            message: message.into(),
        }
    }

    /// Creates a numerical error.
    pub fn numerical(message: impl Into<String>) -> Self {
        QuenchError::NumericalError(message.into())
    }

    /// Creates an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        QuenchError::Internal(message.into())
    }
}

/// Result type alias for QUENCH operations.
pub type Result<T> = std::result::Result<T, QuenchError>;
