//! Affine transform implementation.
//!
//! This module provides an affine transform (linear transformation + translation).

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

use super::record::TransformKind;
use super::trait_::{parameter_tensor, ParametricTransform, Transform};
use crate::error::{GeometryError, Result};
use crate::image::image::point_row;
use crate::image::ImageGeometry;
use crate::spatial::{Point, Vector};

/// Affine Transform (Linear transformation + Translation).
///
/// Represents a general affine transformation with a fixed center:
/// T(x) = A(x - c) + c + t
///
/// where:
/// * A is a D×D matrix (linear transformation: rotation, scale, shear)
/// * t is a D-dimensional translation vector
/// * c is a D-dimensional fixed center of rotation/scaling
///
/// Parameters are the entries of A in row-major order followed by t; the
/// centre is the only fixed parameter.
#[derive(Debug, Clone)]
pub struct AffineTransform<B: Backend, const D: usize> {
    parameters: Tensor<B, 1>, // [D * D + D]
    center: Point<D>,
}

impl<B: Backend, const D: usize> AffineTransform<B, D> {
    /// Create a new affine transform.
    ///
    /// # Arguments
    /// * `matrix` - Tensor of shape `[D, D]` containing the linear transformation matrix
    /// * `translation` - Tensor of shape `[D]` containing the translation vector
    /// * `center` - Fixed center
    pub fn new(matrix: Tensor<B, 2>, translation: Tensor<B, 1>, center: Point<D>) -> Self {
        let parameters = Tensor::cat(vec![matrix.reshape([D * D]), translation], 0);
        Self { parameters, center }
    }

    /// Create an identity affine transform around `center`.
    pub fn identity(center: Point<D>, device: &B::Device) -> Self {
        Self::from_translation(Vector::zeros(), center, device)
    }

    /// Identity matrix with a pure translation.
    pub fn from_translation(translation: Vector<D>, center: Point<D>, device: &B::Device) -> Self {
        let mut values = vec![0.0f64; D * D + D];
        for i in 0..D {
            values[i * (D + 1)] = 1.0;
            values[D * D + i] = translation[i];
        }
        Self {
            parameters: parameter_tensor(&values, device),
            center,
        }
    }

    /// Geometry-centred initialization.
    ///
    /// The centre is the reference image centre and the translation maps it
    /// onto the moving image centre; intensities are not consulted.
    pub fn centered_on(reference: &ImageGeometry<D>, moving: &ImageGeometry<D>, device: &B::Device) -> Self {
        let center = reference.physical_center();
        let translation = moving.physical_center() - center;
        Self::from_translation(translation, center, device)
    }

    /// Get the transformation matrix `[D, D]`.
    pub fn matrix(&self) -> Tensor<B, 2> {
        self.parameters.clone().narrow(0, 0, D * D).reshape([D, D])
    }

    /// Get the translation vector `[D]`.
    pub fn translation(&self) -> Tensor<B, 1> {
        self.parameters.clone().narrow(0, D * D, D)
    }

    /// Get the center of rotation.
    pub fn center(&self) -> &Point<D> {
        &self.center
    }
}

impl<B: Backend, const D: usize> Transform<B, D> for AffineTransform<B, D> {
    fn transform_points(&self, points: Tensor<B, 2>) -> Tensor<B, 2> {
        // Row vector notation for [N, D] inputs:
        // y = (x - c) @ A^T + c + t
        let c = point_row::<B, D>(&self.center, &points.device());
        let t = self.translation().reshape([1, D]);

        let centered = points - c.clone();
        centered.matmul(self.matrix().transpose()) + c + t
    }
}

impl<B: Backend, const D: usize> ParametricTransform<B, D> for AffineTransform<B, D> {
    const KIND: TransformKind = TransformKind::Affine;

    fn parameters(&self) -> Tensor<B, 1> {
        self.parameters.clone()
    }

    fn fixed_parameters(&self) -> Vec<f64> {
        self.center.iter().copied().collect()
    }

    fn with_parameters(&self, parameters: Tensor<B, 1>) -> Self {
        Self {
            parameters,
            center: self.center,
        }
    }

    fn from_parameters(parameters: Tensor<B, 1>, fixed_parameters: &[f64]) -> Result<Self> {
        let count = parameters.dims()[0];
        if count != D * D + D {
            return Err(GeometryError::record_mismatch(format!(
                "affine transform needs {} parameters, got {}",
                D * D + D,
                count
            )));
        }
        if fixed_parameters.len() != D {
            return Err(GeometryError::record_mismatch(format!(
                "affine transform needs {} fixed parameters, got {}",
                D,
                fixed_parameters.len()
            )));
        }
        let center = Point::from(Vector::<D>::from_fn(|i, _| fixed_parameters[i]));
        Ok(Self { parameters, center })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spatial::{Point2, Point3, Spacing2};
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    fn values(tensor: Tensor<TestBackend, 2>) -> Vec<f32> {
        tensor.into_data().iter::<f32>().collect()
    }

    #[test]
    fn test_affine_transform_identity() {
        let device = Default::default();
        let transform = AffineTransform::<TestBackend, 3>::identity(Point3::new(4.0, -1.0, 2.0), &device);

        let points = Tensor::<TestBackend, 2>::from_floats([[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]], &device);

        let slice = values(transform.transform_points(points));
        assert_eq!(slice, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert_eq!(transform.num_parameters(), 12);
    }

    #[test]
    fn test_affine_transform_translation_with_center() {
        let device = Default::default();
        let matrix = Tensor::<TestBackend, 2>::eye(2, &device);
        let translation = Tensor::<TestBackend, 1>::from_floats([1.0, 1.0], &device);
        let transform = AffineTransform::<TestBackend, 2>::new(matrix, translation, Point2::new(10.0, 10.0));

        // T(c) = c + t
        let points = Tensor::<TestBackend, 2>::from_floats([[10.0, 10.0]], &device);
        let slice = values(transform.transform_points(points));

        assert_eq!(slice, vec![11.0, 11.0]);
    }

    #[test]
    fn test_affine_transform_scale_with_center() {
        let device = Default::default();
        let matrix = Tensor::<TestBackend, 2>::eye(2, &device) * 2.0;
        let translation = Tensor::<TestBackend, 1>::zeros([2], &device);
        let transform = AffineTransform::<TestBackend, 2>::new(matrix, translation, Point2::new(1.0, 1.0));

        // x - c = [1, 0], A(x - c) = [2, 0], + c = [3, 1]
        let points = Tensor::<TestBackend, 2>::from_floats([[2.0, 1.0]], &device);
        let slice = values(transform.transform_points(points));

        assert!((slice[0] - 3.0).abs() < 1e-6);
        assert!((slice[1] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_parameter_layout_is_row_major() {
        let device = Default::default();
        // Shear: x' = x + 0.5 y
        let matrix = Tensor::<TestBackend, 2>::from_floats([[1.0, 0.5], [0.0, 1.0]], &device);
        let translation = Tensor::<TestBackend, 1>::from_floats([0.0, 3.0], &device);
        let transform = AffineTransform::<TestBackend, 2>::new(matrix, translation, Point2::origin());

        assert_eq!(transform.parameter_values(), vec![1.0, 0.5, 0.0, 1.0, 0.0, 3.0]);

        let points = Tensor::<TestBackend, 2>::from_floats([[2.0, 4.0]], &device);
        assert_eq!(values(transform.transform_points(points)), vec![4.0, 7.0]);
    }

    #[test]
    fn test_centered_initialization() {
        let device = Default::default();
        let reference = ImageGeometry::<2>::with_size([11, 11]);
        let moving = ImageGeometry::new(
            [21, 11],
            Point2::new(-2.0, 3.0),
            Spacing2::new(0.5, 1.0),
            crate::spatial::Direction2::identity(),
        );
        let transform = AffineTransform::<TestBackend, 2>::centered_on(&reference, &moving, &device);

        assert_eq!(transform.center(), &Point2::new(5.0, 5.0));
        // Moving centre (3, 8) - reference centre (5, 5)
        let params = transform.parameter_values();
        assert!((params[4] + 2.0).abs() < 1e-6);
        assert!((params[5] - 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_with_parameters_leaves_template_untouched() {
        let device = Default::default();
        let template = AffineTransform::<TestBackend, 2>::identity(Point2::origin(), &device);
        let candidate = template.with_parameters(parameter_tensor(&[2.0, 0.0, 0.0, 2.0, 1.0, 1.0], &device));

        assert_eq!(template.parameter_values(), vec![1.0, 0.0, 0.0, 1.0, 0.0, 0.0]);
        assert_eq!(candidate.parameter_values(), vec![2.0, 0.0, 0.0, 2.0, 1.0, 1.0]);
    }

    #[test]
    fn test_record_roundtrip() {
        let device = Default::default();
        let transform = AffineTransform::<TestBackend, 3>::from_translation(
            Vector::<3>::new(5.0, 0.0, -1.0),
            Point3::new(1.0, 2.0, 3.0),
            &device,
        );
        let record = transform.to_record();
        assert_eq!(record.fixed_parameters, vec![1.0, 2.0, 3.0]);

        let restored = AffineTransform::<TestBackend, 3>::from_record(&record, &device).unwrap();
        assert_eq!(restored.parameter_values(), transform.parameter_values());
        assert_eq!(restored.center(), transform.center());
    }

    #[test]
    fn test_from_parameters_rejects_wrong_length() {
        let device = Default::default();
        let result =
            AffineTransform::<TestBackend, 2>::from_parameters(parameter_tensor(&[1.0; 5], &device), &[0.0, 0.0]);
        assert!(matches!(result, Err(GeometryError::RecordMismatch(_))));
    }
}
