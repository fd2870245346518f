//! Histogram computation utilities for Mutual Information metrics.
//!
//! Differentiable soft histogramming using Gaussian Parzen windows.

use burn::tensor::backend::Backend;
use burn::tensor::{Int, Tensor};
use regkit_core::filter::CHUNK_SIZE;

const EPSILON: f64 = 1e-10;

/// Joint histogram calculator using Parzen windowing.
#[derive(Clone, Debug, PartialEq)]
pub struct ParzenJointHistogram {
    /// Number of histogram bins per axis
    pub num_bins: usize,
    /// Parzen window sigma, in bins
    pub parzen_sigma: f64,
}

/// Intensity interval mapped onto the bins of one histogram axis.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct IntensityRange {
    pub min: f64,
    pub max: f64,
}

impl IntensityRange {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Width of the interval; constant images get a unit span.
    fn span(&self) -> f64 {
        let span = self.max - self.min;
        if span > EPSILON {
            span
        } else {
            1.0
        }
    }
}

impl ParzenJointHistogram {
    /// Create a new Parzen joint histogram calculator.
    pub fn new(num_bins: usize, parzen_sigma: f64) -> Self {
        Self { num_bins, parzen_sigma }
    }

    /// Map intensities to continuous bin coordinates in `[0, num_bins - 1]`.
    pub fn bin_coordinates<B: Backend>(&self, values: Tensor<B, 1>, range: IntensityRange) -> Tensor<B, 1> {
        let last = (self.num_bins - 1) as f64;
        values
            .sub_scalar(range.min)
            .div_scalar(range.span())
            .mul_scalar(last)
            .clamp(0.0, last)
    }

    /// Gaussian window weights `[N, Bins]`:
    /// W[i, b] = exp(-0.5 * ((c[i] - b) / sigma)^2)
    fn window_weights<B: Backend>(&self, coordinates: Tensor<B, 1>) -> Tensor<B, 2> {
        let device = coordinates.device();
        let [n] = coordinates.dims();
        let bins = Tensor::<B, 1, Int>::arange(0..self.num_bins as i64, &device)
            .float()
            .reshape([1, self.num_bins]);
        let sigma_sq = self.parzen_sigma * self.parzen_sigma;

        let diff = coordinates.reshape([n, 1]) - bins;
        (diff.powf_scalar(2.0) * (-0.5 / sigma_sq)).exp()
    }

    /// Soft joint histogram `[Bins, Bins]` of bin coordinates.
    ///
    /// `weights` scales each sample's contribution (0 drops the sample).
    /// Rows index fixed bins, columns moving bins.
    pub fn joint_histogram<B: Backend>(
        &self,
        fixed: Tensor<B, 1>,
        moving: Tensor<B, 1>,
        weights: Tensor<B, 1>,
    ) -> Tensor<B, 2> {
        let device = fixed.device();
        let [n] = fixed.dims();

        let mut joint = Tensor::<B, 2>::zeros([self.num_bins, self.num_bins], &device);
        let mut start = 0;
        while start < n {
            let end = usize::min(start + CHUNK_SIZE, n);
            let len = end - start;

            let w_fixed = self.window_weights(fixed.clone().slice([start..end]))
                * weights.clone().slice([start..end]).reshape([len, 1]);
            let w_moving = self.window_weights(moving.clone().slice([start..end]));

            joint = joint + w_fixed.transpose().matmul(w_moving);
            start = end;
        }
        joint
    }

    /// Negative mutual information of a joint histogram.
    ///
    /// MI = H(F) + H(M) - H(F, M), with the marginals taken from the joint
    /// distribution.
    pub fn negative_mutual_information<B: Backend>(&self, joint: Tensor<B, 2>) -> Tensor<B, 1> {
        let total = joint.clone().sum().add_scalar(EPSILON).reshape([1, 1]);
        let p_joint = joint / total;
        let p_fixed = p_joint.clone().sum_dim(1);
        let p_moving = p_joint.clone().sum_dim(0);

        let h_joint = Self::entropy(p_joint);
        let h_fixed = Self::entropy(p_fixed);
        let h_moving = Self::entropy(p_moving);

        h_joint - h_fixed - h_moving
    }

    /// Shannon entropy of a distribution.
    pub fn entropy<B: Backend>(p: Tensor<B, 2>) -> Tensor<B, 1> {
        let log_p = p.clone().add_scalar(EPSILON).log();
        (p * log_p).sum().neg()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::tensor::ElementConversion;
    use burn_ndarray::NdArray;

    type B = NdArray<f32>;

    fn scalar(t: Tensor<B, 1>) -> f64 {
        t.into_scalar().elem::<f64>()
    }

    #[test]
    fn test_bin_coordinates() {
        let device = Default::default();
        let histogram = ParzenJointHistogram::new(11, 1.0);
        let values = Tensor::<B, 1>::from_floats([0.0, 50.0, 100.0, 150.0], &device);
        let coords: Vec<f32> = histogram
            .bin_coordinates(values, IntensityRange::new(0.0, 100.0))
            .into_data()
            .iter::<f32>()
            .collect();
        assert_eq!(coords, vec![0.0, 5.0, 10.0, 10.0]);
    }

    #[test]
    fn test_joint_histogram_mass_and_weights() {
        let device = Default::default();
        let histogram = ParzenJointHistogram::new(8, 0.5);
        let fixed = Tensor::<B, 1>::from_floats([1.0, 3.0, 5.0], &device);
        let moving = Tensor::<B, 1>::from_floats([1.0, 3.0, 5.0], &device);

        let full = histogram.joint_histogram(fixed.clone(), moving.clone(), Tensor::ones([3], &device));
        let dropped = histogram.joint_histogram(fixed, moving, Tensor::from_floats([1.0, 1.0, 0.0], &device));

        let full_mass = full.sum().into_scalar().elem::<f64>();
        let dropped_mass = dropped.sum().into_scalar().elem::<f64>();
        assert!((dropped_mass / full_mass - 2.0 / 3.0).abs() < 1e-3);
    }

    #[test]
    fn test_mutual_information_prefers_dependence() {
        let device = Default::default();
        let histogram = ParzenJointHistogram::new(16, 0.5);
        let n = 256;
        let fixed: Vec<f32> = (0..n).map(|i| (i % 16) as f32).collect();
        let related: Vec<f32> = fixed.iter().map(|v| 15.0 - v).collect();
        let unrelated: Vec<f32> = (0..n).map(|i| ((i / 16) % 16) as f32).collect();

        let f = Tensor::<B, 1>::from_floats(fixed.as_slice(), &device);
        let ones = Tensor::<B, 1>::ones([n], &device);
        let mi_related = histogram.negative_mutual_information(histogram.joint_histogram(
            f.clone(),
            Tensor::from_floats(related.as_slice(), &device),
            ones.clone(),
        ));
        let mi_unrelated = histogram.negative_mutual_information(histogram.joint_histogram(
            f,
            Tensor::from_floats(unrelated.as_slice(), &device),
            ones,
        ));

        // Lower (more negative) loss means more shared information.
        assert!(scalar(mi_related) < scalar(mi_unrelated) - 0.5);
    }
}
