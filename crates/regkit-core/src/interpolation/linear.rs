//! Linear interpolation implementation.
//!
//! This module provides multilinear interpolation (bilinear for 2D,
//! trilinear for 3D).

use burn::tensor::backend::Backend;
use burn::tensor::{Int, Tensor};
use serde::{Deserialize, Serialize};

use super::trait_::Interpolator;

/// Linear Interpolator.
///
/// Neighbours outside the buffer are clamped to the border, so callers that
/// need a fill value combine the result with
/// [`inside_buffer_mask`](super::inside_buffer_mask).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct LinearInterpolator;

impl LinearInterpolator {
    /// Create a new linear interpolator.
    pub fn new() -> Self {
        Self
    }
}

/// Clamped lower/upper neighbour and fractional weight along one axis.
struct AxisStencil<B: Backend> {
    lower: Tensor<B, 1, Int>,
    upper: Tensor<B, 1, Int>,
    weight: Tensor<B, 1>,
}

impl<B: Backend> Interpolator<B> for LinearInterpolator {
    fn interpolate<const D: usize>(&self, data: &Tensor<B, D>, indices: Tensor<B, 2>) -> Tensor<B, 1> {
        let shape: [usize; D] = data.dims();
        let batch_size = indices.dims()[0];
        let device = indices.device();

        // Tensor dims are [.., Y, X]; index columns are (x, y, ..).
        let size: [usize; D] = std::array::from_fn(|axis| shape[D - 1 - axis]);
        let mut strides = [1i32; D];
        for axis in 1..D {
            strides[axis] = strides[axis - 1] * size[axis - 1] as i32;
        }

        let stencils: Vec<AxisStencil<B>> = (0..D)
            .map(|axis| {
                let coord = indices.clone().narrow(1, axis, 1).squeeze::<1>(1);
                let floor = coord.clone().floor();
                let weight = coord - floor.clone();
                let max = (size[axis] - 1) as f64;
                AxisStencil {
                    lower: floor.clone().clamp(0.0, max).int(),
                    upper: (floor + 1.0).clamp(0.0, max).int(),
                    weight,
                }
            })
            .collect();

        // Pre-flatten data once to avoid repeated reshaping
        let flat_data = data.clone().reshape([size.iter().product::<usize>()]);
        let one = Tensor::<B, 1>::ones([batch_size], &device);

        let mut result = Tensor::<B, 1>::zeros([batch_size], &device);
        for corner in 0..(1usize << D) {
            let mut flat_index = Tensor::<B, 1, Int>::zeros([batch_size], &device);
            let mut corner_weight = one.clone();
            for (axis, stencil) in stencils.iter().enumerate() {
                if corner & (1 << axis) != 0 {
                    flat_index = flat_index + stencil.upper.clone() * strides[axis];
                    corner_weight = corner_weight * stencil.weight.clone();
                } else {
                    flat_index = flat_index + stencil.lower.clone() * strides[axis];
                    corner_weight = corner_weight * (one.clone() - stencil.weight.clone());
                }
            }
            result = result + flat_data.clone().gather(0, flat_index) * corner_weight;
        }
        result
    }
}
