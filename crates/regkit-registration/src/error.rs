//! Error types for registration operations.
//!
//! Non-convergence is not an error: it is reported through
//! [`StopReason`](crate::optimizer::StopReason).

use regkit_core::GeometryError;
use thiserror::Error;

/// Main error type for registration operations.
#[derive(Error, Debug)]
pub enum RegistrationError {
    /// Inputs that cannot be registered together (e.g. dimension mismatch).
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Degenerate image or transform-domain geometry.
    #[error("Invalid geometry: {0}")]
    InvalidGeometry(#[from] GeometryError),

    /// Mask that does not match the reference image or selects nothing.
    #[error("Invalid mask: {0}")]
    InvalidMask(String),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Error in metric computation.
    #[error("Metric error: {0}")]
    Metric(String),

    /// Error in optimizer operation.
    #[error("Optimizer error: {0}")]
    Optimizer(String),

    /// Error in transform operation.
    #[error("Transform error: {0}")]
    Transform(String),

    /// Numerical instability detected.
    #[error("Numerical instability: {0}")]
    NumericalInstability(String),
}

/// Result type for registration operations.
pub type Result<T> = std::result::Result<T, RegistrationError>;

impl RegistrationError {
    /// Create an invalid input error.
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create an invalid mask error.
    pub fn invalid_mask(msg: impl Into<String>) -> Self {
        Self::InvalidMask(msg.into())
    }

    /// Create an invalid configuration error.
    pub fn invalid_configuration(msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration(msg.into())
    }

    /// Create a metric error.
    pub fn metric(msg: impl Into<String>) -> Self {
        Self::Metric(msg.into())
    }

    /// Create an optimizer error.
    pub fn optimizer(msg: impl Into<String>) -> Self {
        Self::Optimizer(msg.into())
    }

    /// Create a transform error.
    pub fn transform(msg: impl Into<String>) -> Self {
        Self::Transform(msg.into())
    }

    /// Create a numerical instability error.
    pub fn numerical_instability(msg: impl Into<String>) -> Self {
        Self::NumericalInstability(msg.into())
    }
}
