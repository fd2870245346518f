//! Spatial types for points, vectors, spacing and direction matrices.
//!
//! All types are nalgebra statics in `f64`; tensors only appear once
//! coordinates are batched for the backend.

use nalgebra::{Point as NaPoint, SMatrix, SVector};

pub type Point<const D: usize> = NaPoint<f64, D>;
pub type Vector<const D: usize> = SVector<f64, D>;
pub type Spacing<const D: usize> = SVector<f64, D>;
pub type Direction<const D: usize> = SMatrix<f64, D, D>;

pub type Point2 = Point<2>;
pub type Point3 = Point<3>;
pub type Vector2 = Vector<2>;
pub type Vector3 = Vector<3>;
pub type Spacing2 = Spacing<2>;
pub type Spacing3 = Spacing<3>;
pub type Direction2 = Direction<2>;
pub type Direction3 = Direction<3>;

/// Tolerance used when checking that a direction matrix is orthonormal.
pub const ORTHONORMAL_TOLERANCE: f64 = 1e-6;

/// Check that `direction * direction^T` is the identity.
pub fn is_orthonormal<const D: usize>(direction: &Direction<D>) -> bool {
    let product = direction * direction.transpose();
    let identity = Direction::<D>::identity();
    (0..D).all(|i| (0..D).all(|j| (product[(i, j)] - identity[(i, j)]).abs() < ORTHONORMAL_TOLERANCE))
}

/// Flatten a direction matrix in row-major order.
pub fn direction_to_row_major<const D: usize>(direction: &Direction<D>) -> Vec<f64> {
    let mut out = Vec::with_capacity(D * D);
    for r in 0..D {
        for c in 0..D {
            out.push(direction[(r, c)]);
        }
    }
    out
}

/// Build a direction matrix from row-major values. `values` must hold `D * D` entries.
pub fn direction_from_row_major<const D: usize>(values: &[f64]) -> Direction<D> {
    Direction::<D>::from_fn(|r, c| values[r * D + c])
}
