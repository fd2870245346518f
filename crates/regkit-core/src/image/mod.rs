//! Image types and operations.
//!
//! This module provides the Image type and related functionality
//! for representing medical images with physical metadata.

pub mod image;
pub mod geometry;
pub mod grid;
pub mod pixel;

pub use image::{index_to_physical_tensor, physical_to_index_tensor, Image};
pub use geometry::ImageGeometry;
pub use grid::{index_grid, linear_to_index, sample_grid};
pub use pixel::{Pixel, PixelType};
