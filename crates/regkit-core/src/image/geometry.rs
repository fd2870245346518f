//! Image geometry: the sampling grid of an image in physical space.
//!
//! Geometry describes how image indices map to physical coordinates.
//! Sizes are given per physical axis (x first), which is the reverse of the
//! tensor dimension order used for pixel data.

use crate::error::{GeometryError, Result};
use crate::spatial::{is_orthonormal, Direction, Point, Spacing, Vector};

/// Size, origin, spacing and direction of an image grid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImageGeometry<const D: usize> {
    /// Number of samples along each physical axis.
    size: [usize; D],
    /// Physical coordinate of the first pixel (index 0, 0, ...).
    origin: Point<D>,
    /// Physical distance between pixels along each axis.
    spacing: Spacing<D>,
    /// Orientation of the image axes (columns are axis directions).
    direction: Direction<D>,
}

impl<const D: usize> ImageGeometry<D> {
    /// Create new image geometry. Call [`validate`](Self::validate) before relying on it.
    pub fn new(size: [usize; D], origin: Point<D>, spacing: Spacing<D>, direction: Direction<D>) -> Self {
        Self {
            size,
            origin,
            spacing,
            direction,
        }
    }

    /// Geometry with zero origin, unit spacing and identity direction.
    pub fn with_size(size: [usize; D]) -> Self {
        Self::new(size, Point::origin(), Spacing::repeat(1.0), Direction::identity())
    }

    pub fn size(&self) -> [usize; D] {
        self.size
    }

    pub fn origin(&self) -> &Point<D> {
        &self.origin
    }

    pub fn spacing(&self) -> &Spacing<D> {
        &self.spacing
    }

    pub fn direction(&self) -> &Direction<D> {
        &self.direction
    }

    /// Tensor dimensions of the pixel buffer (`[.., y, x]`).
    pub fn tensor_shape(&self) -> [usize; D] {
        let mut shape = self.size;
        shape.reverse();
        shape
    }

    /// Total number of pixels/voxels.
    pub fn num_voxels(&self) -> usize {
        self.size.iter().product()
    }

    /// Check the geometry invariants: nonempty extent, strictly positive
    /// finite spacing and orthonormal direction cosines.
    pub fn validate(&self) -> Result<()> {
        for axis in 0..D {
            if self.size[axis] == 0 {
                return Err(GeometryError::EmptyExtent { axis });
            }
            let value = self.spacing[axis];
            if !(value.is_finite() && value > 0.0) {
                return Err(GeometryError::InvalidSpacing { axis, value });
            }
        }
        if !is_orthonormal(&self.direction) {
            return Err(GeometryError::NonOrthonormalDirection);
        }
        Ok(())
    }

    /// Physical length covered by the samples along each axis (`size * spacing`).
    pub fn physical_extent(&self) -> [f64; D] {
        std::array::from_fn(|i| self.size[i] as f64 * self.spacing[i])
    }

    /// Convert a continuous index to a physical point.
    ///
    /// `point = origin + Direction * (index * spacing)`
    pub fn continuous_index_to_physical(&self, index: &Point<D>) -> Point<D> {
        let scaled = Vector::<D>::from_fn(|i, _| index[i] * self.spacing[i]);
        self.origin + self.direction * scaled
    }

    /// Convert a physical point to a continuous index.
    ///
    /// `index = (Direction^T * (point - origin)) / spacing`; the direction is
    /// orthonormal so its transpose is its inverse.
    pub fn physical_to_continuous_index(&self, point: &Point<D>) -> Point<D> {
        let rotated = self.direction.transpose() * (*point - self.origin);
        Point::from(Vector::<D>::from_fn(|i, _| rotated[i] / self.spacing[i]))
    }

    /// Centre of the bounding box spanned by the first and last voxel centres.
    pub fn physical_center(&self) -> Point<D> {
        let mid = Point::from(Vector::<D>::from_fn(|i, _| (self.size[i] as f64 - 1.0) / 2.0));
        self.continuous_index_to_physical(&mid)
    }

    /// Physical positions of the `2^D` corner voxel centres.
    pub fn corners(&self) -> Vec<Point<D>> {
        (0..(1usize << D))
            .map(|mask| {
                let index = Point::from(Vector::<D>::from_fn(|i, _| {
                    if mask & (1 << i) != 0 {
                        (self.size[i] as f64 - 1.0).max(0.0)
                    } else {
                        0.0
                    }
                }));
                self.continuous_index_to_physical(&index)
            })
            .collect()
    }

    /// Whether `other` describes the same grid within `tolerance` (physical units).
    pub fn is_same_grid(&self, other: &Self, tolerance: f64) -> bool {
        if self.size != other.size {
            return false;
        }
        let close = |a: f64, b: f64| (a - b).abs() <= tolerance;
        (0..D).all(|i| {
            close(self.origin[i], other.origin[i])
                && close(self.spacing[i], other.spacing[i])
                && (0..D).all(|j| close(self.direction[(i, j)], other.direction[(i, j)]))
        })
    }
}
