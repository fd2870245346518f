use std::ops::Range;

use burn::tensor::backend::Backend;
use burn::tensor::{Shape, Tensor, TensorData};

/// Convert a linear voxel index to a multi-index `[x, y, z]` (x varies fastest).
pub fn linear_to_index<const D: usize>(linear: usize, size: [usize; D]) -> [usize; D] {
    let mut rest = linear;
    std::array::from_fn(|axis| {
        let value = rest % size[axis];
        rest /= size[axis];
        value
    })
}

/// Generate continuous indices for a contiguous range of linear voxel indices.
///
/// Returns a tensor of shape `[N, D]` where N is the length of `range`; the
/// columns are `(x, y, z)` in the same order as physical axes.
///
/// # Arguments
/// * `size` - The image size `[x, y, z]`
/// * `range` - Linear indices to emit (use `0..num_voxels` for the full grid)
/// * `device` - The device to create the tensor on
pub fn index_grid<B, const D: usize>(size: [usize; D], range: Range<usize>, device: &B::Device) -> Tensor<B, 2>
where
    B: Backend,
{
    let count = range.len();
    let mut grid = Vec::with_capacity(count * D);
    for linear in range {
        grid.extend(linear_to_index(linear, size).iter().map(|&i| i as f32));
    }

    Tensor::<B, 2>::from_data(TensorData::new(grid, Shape::new([count, D])), device)
}

/// Generate continuous indices for an arbitrary set of linear voxel indices.
///
/// Returns a tensor of shape `[linear.len(), D]`.
pub fn sample_grid<B, const D: usize>(size: [usize; D], linear: &[usize], device: &B::Device) -> Tensor<B, 2>
where
    B: Backend,
{
    let mut grid = Vec::with_capacity(linear.len() * D);
    for &l in linear {
        grid.extend(linear_to_index(l, size).iter().map(|&i| i as f32));
    }

    Tensor::<B, 2>::from_data(TensorData::new(grid, Shape::new([linear.len(), D])), device)
}
