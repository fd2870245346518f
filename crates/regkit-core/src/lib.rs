//! Core image, geometry and transform types for regkit.
//!
//! Images are burn tensors with physical metadata; transforms map batches of
//! physical points and expose their parameters as flat tensors so they can
//! be optimized with autodiff.

pub mod error;
pub mod filter;
pub mod image;
pub mod interpolation;
pub mod spatial;
pub mod transform;

pub use error::{GeometryError, Result};
pub use filter::ResampleImageFilter;
pub use image::{Image, ImageGeometry, Pixel, PixelType};
pub use interpolation::{Interpolator, LinearInterpolator};
pub use spatial::{Direction, Point, Spacing, Vector};
pub use transform::{AffineTransform, BSplineTransform, ParametricTransform, Transform, TransformKind, TransformRecord};
