//! Serializable transform records.

use serde::{Deserialize, Serialize};

use crate::error::{GeometryError, Result};

/// Transform family of a [`TransformRecord`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransformKind {
    Affine,
    BSpline,
}

impl std::fmt::Display for TransformKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransformKind::Affine => write!(f, "affine"),
            TransformKind::BSpline => write!(f, "bspline"),
        }
    }
}

/// Persisted form of a parametric transform.
///
/// `parameters` are the optimized values, `fixed_parameters` the metadata the
/// transform needs to be rebuilt (affine centre, B-spline grid layout).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformRecord {
    pub kind: TransformKind,
    pub dimension: usize,
    pub parameters: Vec<f64>,
    pub fixed_parameters: Vec<f64>,
}

impl TransformRecord {
    /// Fail unless the record holds a `kind` transform of `dimension` axes.
    pub fn check(&self, kind: TransformKind, dimension: usize) -> Result<()> {
        if self.kind != kind {
            return Err(GeometryError::record_mismatch(format!(
                "expected {} transform, got {}",
                kind, self.kind
            )));
        }
        if self.dimension != dimension {
            return Err(GeometryError::record_mismatch(format!(
                "expected {}D transform, got {}D",
                dimension, self.dimension
            )));
        }
        Ok(())
    }
}
