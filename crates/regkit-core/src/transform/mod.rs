//! Transform types and operations.
//!
//! This module provides transform traits and implementations
//! for spatial coordinate transformations.

pub mod affine;
pub mod bspline;
pub mod record;
pub mod trait_;

pub use affine::AffineTransform;
pub use bspline::{bspline_mesh_size, BSplineTransform, SPLINE_ORDER};
pub use record::{TransformKind, TransformRecord};
pub use trait_::{parameter_tensor, ParametricTransform, Transform};
