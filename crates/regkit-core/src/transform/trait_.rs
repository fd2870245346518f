//! Transform traits for spatial coordinate transformations.

use burn::tensor::backend::Backend;
use burn::tensor::{Shape, Tensor, TensorData};

use super::record::{TransformKind, TransformRecord};
use crate::error::{GeometryError, Result};

/// Transform trait for spatial coordinate transformations.
///
/// Maps points from one physical space to another.
///
/// # Type Parameters
/// * `B` - The Burn backend
/// * `D` - The spatial dimensionality (2 or 3)
pub trait Transform<B: Backend, const D: usize> {
    /// Apply transform to a batch of points.
    ///
    /// # Arguments
    /// * `points` - Tensor of shape `[Batch, D]` containing the input points
    ///
    /// # Returns
    /// Tensor of shape `[Batch, D]` containing the transformed points
    fn transform_points(&self, points: Tensor<B, 2>) -> Tensor<B, 2>;
}

/// A transform driven by a flat parameter vector.
///
/// Optimizers only ever see the flat vector: they build a candidate with
/// [`with_parameters`](Self::with_parameters) and leave the template alone.
pub trait ParametricTransform<B: Backend, const D: usize>: Transform<B, D> + Clone + Sized {
    /// Family tag used in [`TransformRecord`]s.
    const KIND: TransformKind;

    /// Flat parameter tensor `[num_parameters]`.
    fn parameters(&self) -> Tensor<B, 1>;

    /// Metadata that is not optimized.
    fn fixed_parameters(&self) -> Vec<f64>;

    /// Fresh transform sharing this transform's fixed parameters.
    ///
    /// `parameters` must hold [`num_parameters`](Self::num_parameters) values.
    fn with_parameters(&self, parameters: Tensor<B, 1>) -> Self;

    /// Rebuild a transform from both parameter sets.
    fn from_parameters(parameters: Tensor<B, 1>, fixed_parameters: &[f64]) -> Result<Self>;

    fn num_parameters(&self) -> usize {
        self.parameters().dims()[0]
    }

    /// Parameters copied to the host.
    fn parameter_values(&self) -> Vec<f64> {
        self.parameters().into_data().iter::<f64>().collect()
    }

    fn to_record(&self) -> TransformRecord {
        TransformRecord {
            kind: Self::KIND,
            dimension: D,
            parameters: self.parameter_values(),
            fixed_parameters: self.fixed_parameters(),
        }
    }

    fn from_record(record: &TransformRecord, device: &B::Device) -> Result<Self> {
        record.check(Self::KIND, D)?;
        if record.parameters.is_empty() {
            return Err(GeometryError::record_mismatch("record has no parameters"));
        }
        Self::from_parameters(parameter_tensor(&record.parameters, device), &record.fixed_parameters)
    }
}

/// Upload a host parameter vector as a `[len]` tensor.
pub fn parameter_tensor<B: Backend>(values: &[f64], device: &B::Device) -> Tensor<B, 1> {
    let data: Vec<f32> = values.iter().map(|&v| v as f32).collect();
    Tensor::<B, 1>::from_data(TensorData::new(data, Shape::new([values.len()])), device)
}
