//! Image type with physical metadata and coordinate transformations.
//!
//! An [`Image`] pairs a float tensor with the [`ImageGeometry`] that places it
//! in physical space, and remembers the [`PixelType`] it was built from.

use burn::tensor::backend::Backend;
use burn::tensor::{ElementConversion, Shape, Tensor, TensorData};

use super::geometry::ImageGeometry;
use super::pixel::{Pixel, PixelType};
use crate::error::{GeometryError, Result};
use crate::spatial::{Direction, Point, Spacing};

/// Image with physical metadata.
///
/// # Type Parameters
/// * `B` - The backend (CPU or GPU) for tensor operations
/// * `D` - The dimensionality of the image (2 or 3)
///
/// # Coordinate Systems
/// * **Index Space**: continuous indices `(x, y, z)`, x varying fastest
/// * **Physical Space**: continuous coordinates in mm or other units
///
/// The data tensor is laid out `[z, y, x]` (`[y, x]` in 2D), so its shape is
/// the reversed geometry size.
///
/// # Examples
/// ```rust
/// use regkit_core::Image;
/// use regkit_core::spatial::{Point3, Spacing3, Direction3};
/// use burn::tensor::Tensor;
/// use burn_ndarray::NdArray;
///
/// type Backend = NdArray<f32>;
///
/// let device = Default::default();
/// let data = Tensor::<Backend, 3>::zeros([10, 10, 10], &device);
/// let image = Image::new(data, Point3::origin(), Spacing3::repeat(1.0), Direction3::identity());
/// assert_eq!(image.size(), [10, 10, 10]);
/// ```
#[derive(Debug, Clone)]
pub struct Image<B: Backend, const D: usize> {
    /// The pixel data, potentially on GPU.
    data: Tensor<B, D>,
    /// Placement of the pixel grid in physical space.
    geometry: ImageGeometry<D>,
    /// Numeric type of the pixels the image was built from.
    pixel_type: PixelType,
}

impl<B: Backend, const D: usize> Image<B, D> {
    /// Create a new float image with the given data and metadata.
    ///
    /// The geometry size is taken from the tensor shape.
    pub fn new(data: Tensor<B, D>, origin: Point<D>, spacing: Spacing<D>, direction: Direction<D>) -> Self {
        let mut size: [usize; D] = data.dims();
        size.reverse();
        Self {
            data,
            geometry: ImageGeometry::new(size, origin, spacing, direction),
            pixel_type: PixelType::Float32,
        }
    }

    /// Create an image from a tensor and an explicit geometry.
    ///
    /// Fails when the tensor shape does not match `geometry.tensor_shape()`.
    pub fn from_geometry(data: Tensor<B, D>, geometry: ImageGeometry<D>, pixel_type: PixelType) -> Result<Self> {
        let actual: [usize; D] = data.dims();
        let expected = geometry.tensor_shape();
        if actual != expected {
            return Err(GeometryError::ShapeMismatch {
                expected: expected.to_vec(),
                actual: actual.to_vec(),
            });
        }
        Ok(Self {
            data,
            geometry,
            pixel_type,
        })
    }

    /// Build an image from pixel values in x-fastest order.
    ///
    /// The values are cast to the float working type; the pixel type is kept
    /// so resampled output can be converted back.
    pub fn from_pixels<T: Pixel>(pixels: &[T], geometry: &ImageGeometry<D>, device: &B::Device) -> Result<Self> {
        if pixels.len() != geometry.num_voxels() {
            return Err(GeometryError::ShapeMismatch {
                expected: geometry.tensor_shape().to_vec(),
                actual: vec![pixels.len()],
            });
        }
        let values: Vec<f32> = pixels.iter().map(|&p| p.to_f32()).collect();
        let data = Tensor::<B, D>::from_data(TensorData::new(values, Shape::new(geometry.tensor_shape())), device);
        Ok(Self {
            data,
            geometry: *geometry,
            pixel_type: T::PIXEL_TYPE,
        })
    }

    /// Get the image data tensor.
    pub fn data(&self) -> &Tensor<B, D> {
        &self.data
    }

    pub fn geometry(&self) -> &ImageGeometry<D> {
        &self.geometry
    }

    pub fn pixel_type(&self) -> PixelType {
        self.pixel_type
    }

    /// Get the origin (physical coordinate of first pixel).
    pub fn origin(&self) -> &Point<D> {
        self.geometry.origin()
    }

    /// Get the spacing (physical distance between pixels).
    pub fn spacing(&self) -> &Spacing<D> {
        self.geometry.spacing()
    }

    /// Get the direction (orientation matrix).
    pub fn direction(&self) -> &Direction<D> {
        self.geometry.direction()
    }

    /// Tensor shape (`[z, y, x]`).
    pub fn shape(&self) -> [usize; D] {
        self.data.dims()
    }

    /// Number of pixels along each physical axis (`[x, y, z]`).
    pub fn size(&self) -> [usize; D] {
        self.geometry.size()
    }

    pub fn device(&self) -> B::Device {
        self.data.device()
    }

    /// Assemble an image whose tensor is known to match `geometry`.
    pub(crate) fn from_parts(data: Tensor<B, D>, geometry: ImageGeometry<D>, pixel_type: PixelType) -> Self {
        Self {
            data,
            geometry,
            pixel_type,
        }
    }

    /// Pixel values in x-fastest order.
    pub fn to_vec(&self) -> Vec<f32> {
        self.data.to_data().iter::<f32>().collect()
    }

    /// Smallest and largest pixel value.
    pub fn min_max(&self) -> (f64, f64) {
        let flat = self.data.clone().flatten::<1>(0, D - 1);
        let min = flat.clone().min().into_scalar().elem::<f64>();
        let max = flat.max().into_scalar().elem::<f64>();
        (min, max)
    }

    /// Convert a continuous physical point to a continuous index.
    pub fn transform_physical_point_to_continuous_index(&self, point: &Point<D>) -> Point<D> {
        self.geometry.physical_to_continuous_index(point)
    }

    /// Convert a continuous index to a physical point.
    pub fn transform_continuous_index_to_physical_point(&self, index: &Point<D>) -> Point<D> {
        self.geometry.continuous_index_to_physical(index)
    }

    /// Centre of the bounding box of the voxel centres.
    pub fn physical_center(&self) -> Point<D> {
        self.geometry.physical_center()
    }

    /// Batch transform physical points to continuous indices using tensors.
    ///
    /// # Arguments
    /// * `points` - A tensor of shape `[Batch, D]` containing physical points
    ///
    /// # Returns
    /// A tensor of shape `[Batch, D]` containing continuous indices
    pub fn world_to_index_tensor(&self, points: Tensor<B, 2>) -> Tensor<B, 2> {
        physical_to_index_tensor(points, self.origin(), self.spacing(), self.direction())
    }

    /// Batch transform continuous indices to physical points using tensors.
    ///
    /// # Arguments
    /// * `indices` - A tensor of shape `[Batch, D]` containing continuous indices
    ///
    /// # Returns
    /// A tensor of shape `[Batch, D]` containing physical points
    pub fn index_to_world_tensor(&self, indices: Tensor<B, 2>) -> Tensor<B, 2> {
        index_to_physical_tensor(indices, self.origin(), self.spacing(), self.direction())
    }
}

/// Map `[Batch, D]` physical points into the continuous index space of a
/// grid with the given origin, spacing and orthonormal direction.
pub fn physical_to_index_tensor<B: Backend, const D: usize>(
    points: Tensor<B, 2>,
    origin: &Point<D>,
    spacing: &Spacing<D>,
    direction: &Direction<D>,
) -> Tensor<B, 2> {
    let device = points.device();
    let origin_tensor = point_row::<B, D>(origin, &device);

    // I = (P - O) @ T with T[r, c] = (Dir^-1)[c, r] / S[c]; Dir is
    // orthonormal so (Dir^-1)[c, r] = Dir[r, c].
    let mut t_data = Vec::with_capacity(D * D);
    for r in 0..D {
        for c in 0..D {
            t_data.push((direction[(r, c)] / spacing[c]) as f32);
        }
    }
    let t_tensor = Tensor::<B, 2>::from_data(TensorData::new(t_data, Shape::new([D, D])), &device);

    (points - origin_tensor).matmul(t_tensor)
}

/// Map `[Batch, D]` continuous indices of a grid to physical points.
pub fn index_to_physical_tensor<B: Backend, const D: usize>(
    indices: Tensor<B, 2>,
    origin: &Point<D>,
    spacing: &Spacing<D>,
    direction: &Direction<D>,
) -> Tensor<B, 2> {
    let device = indices.device();
    let origin_tensor = point_row::<B, D>(origin, &device);

    // P = O + I @ M with M[r, c] = S[r] * Dir[c, r]
    let mut m_data = Vec::with_capacity(D * D);
    for r in 0..D {
        for c in 0..D {
            m_data.push((spacing[r] * direction[(c, r)]) as f32);
        }
    }
    let m_tensor = Tensor::<B, 2>::from_data(TensorData::new(m_data, Shape::new([D, D])), &device);

    indices.matmul(m_tensor) + origin_tensor
}

/// A point as a `[1, D]` row tensor.
pub(crate) fn point_row<B: Backend, const D: usize>(point: &Point<D>, device: &B::Device) -> Tensor<B, 2> {
    let values: Vec<f32> = (0..D).map(|i| point[i] as f32).collect();
    Tensor::<B, 2>::from_data(TensorData::new(values, Shape::new([1, D])), device)
}
