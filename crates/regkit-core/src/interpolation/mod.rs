//! Interpolation types and operations.
//!
//! This module provides interpolation traits and implementations
//! for sampling values at continuous coordinates.

pub mod bounds;
pub mod linear;
pub mod trait_;

pub use bounds::inside_buffer_mask;
pub use linear::LinearInterpolator;
pub use trait_::Interpolator;
