//! Error types for image geometry and transform reconstruction.

use thiserror::Error;

/// Geometry and transform-metadata errors raised by `regkit-core`.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GeometryError {
    /// Spacing component is zero, negative or not finite.
    #[error("Invalid spacing along axis {axis}: {value}")]
    InvalidSpacing { axis: usize, value: f64 },

    /// Image has no samples along an axis.
    #[error("Empty extent along axis {axis}")]
    EmptyExtent { axis: usize },

    /// Direction cosines are not orthonormal.
    #[error("Direction matrix is not orthonormal")]
    NonOrthonormalDirection,

    /// A transform domain with zero physical length.
    #[error("Degenerate transform domain: {0}")]
    DegenerateDomain(String),

    /// Tensor data does not match the declared geometry.
    #[error("Shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    /// Serialized transform does not match the requested transform.
    #[error("Transform record mismatch: {0}")]
    RecordMismatch(String),
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, GeometryError>;

impl GeometryError {
    /// Create a degenerate domain error.
    pub fn degenerate_domain(msg: impl Into<String>) -> Self {
        Self::DegenerateDomain(msg.into())
    }

    /// Create a record mismatch error.
    pub fn record_mismatch(msg: impl Into<String>) -> Self {
        Self::RecordMismatch(msg.into())
    }
}
