//! Validation utilities for registration operations.
//!
//! Inputs and configuration are checked before any optimization starts so
//! that a bad call fails fast with a typed error.

use burn::tensor::backend::Backend;
use regkit_core::{Image, ImageGeometry};

use crate::error::{RegistrationError, Result};

/// Physical tolerance used when comparing a mask grid with the reference grid.
pub const GRID_TOLERANCE: f64 = 1e-6;

/// Validate learning rate.
pub fn validate_learning_rate(lr: f64) -> Result<()> {
    if !lr.is_finite() || lr <= 0.0 {
        return Err(RegistrationError::invalid_configuration(format!(
            "Learning rate must be positive, got {}",
            lr
        )));
    }

    if lr < 1e-10 {
        return Err(RegistrationError::invalid_configuration(format!(
            "Learning rate too small: {}",
            lr
        )));
    }

    Ok(())
}

/// Validate iteration count.
pub fn validate_iterations(iterations: usize) -> Result<()> {
    if iterations == 0 {
        return Err(RegistrationError::invalid_configuration("Iterations must be positive"));
    }

    if iterations > 1_000_000 {
        return Err(RegistrationError::invalid_configuration(format!(
            "Iterations too large: {}",
            iterations
        )));
    }

    Ok(())
}

/// Validate the histogram size of mutual information.
pub fn validate_histogram_bins(num_bins: usize) -> Result<()> {
    if num_bins < 2 {
        return Err(RegistrationError::invalid_configuration(format!(
            "Number of bins must be at least 2, got {}",
            num_bins
        )));
    }

    if num_bins > 1024 {
        return Err(RegistrationError::invalid_configuration(format!(
            "Number of bins too large: {}",
            num_bins
        )));
    }

    Ok(())
}

pub fn validate_parzen_sigma(sigma: f64) -> Result<()> {
    if !sigma.is_finite() || sigma <= 0.0 {
        return Err(RegistrationError::invalid_configuration(format!(
            "Parzen sigma must be positive, got {}",
            sigma
        )));
    }
    Ok(())
}

/// Validate L-BFGS history size.
pub fn validate_lbfgs_history_size(history_size: usize) -> Result<()> {
    if history_size < 1 {
        return Err(RegistrationError::invalid_configuration("L-BFGS history size must be at least 1"));
    }

    if history_size > 100 {
        return Err(RegistrationError::invalid_configuration(format!(
            "L-BFGS history size too large: {}",
            history_size
        )));
    }

    Ok(())
}

/// Validate the metric sampling fraction, which must lie in `(0, 1]`.
pub fn validate_sampling_percentage(percentage: f64) -> Result<()> {
    if !(percentage > 0.0 && percentage <= 1.0) {
        return Err(RegistrationError::invalid_configuration(format!(
            "Sampling percentage must be in (0, 1], got {}",
            percentage
        )));
    }
    Ok(())
}

/// Validate a non-negative threshold.
pub fn validate_tolerance(name: &str, value: f64) -> Result<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(RegistrationError::invalid_configuration(format!(
            "{} must be finite and non-negative, got {}",
            name, value
        )));
    }
    Ok(())
}

pub fn validate_window_size(window: usize) -> Result<()> {
    if window == 0 {
        return Err(RegistrationError::invalid_configuration(
            "Convergence window size must be at least 1",
        ));
    }
    Ok(())
}

/// Validate optional box bounds.
pub fn validate_bounds(lower: Option<f64>, upper: Option<f64>) -> Result<()> {
    for bound in [lower, upper].into_iter().flatten() {
        if bound.is_nan() {
            return Err(RegistrationError::invalid_configuration("Bounds must not be NaN"));
        }
    }
    if let (Some(lower), Some(upper)) = (lower, upper) {
        if lower > upper {
            return Err(RegistrationError::invalid_configuration(format!(
                "Lower bound ({}) exceeds upper bound ({})",
                lower, upper
            )));
        }
    }
    Ok(())
}

/// Validate the geometry of an input image.
pub fn validate_image<B: Backend, const D: usize>(image: &Image<B, D>) -> Result<()> {
    image.geometry().validate()?;
    Ok(())
}

/// Validate a sampling mask against the reference grid.
pub fn validate_mask<B: Backend, const D: usize>(reference: &ImageGeometry<D>, mask: &Image<B, D>) -> Result<()> {
    if mask.size() != reference.size() {
        return Err(RegistrationError::invalid_mask(format!(
            "mask size {:?} does not match reference size {:?}",
            mask.size(),
            reference.size()
        )));
    }
    if !mask.geometry().is_same_grid(reference, GRID_TOLERANCE) {
        return Err(RegistrationError::invalid_mask(
            "mask origin, spacing or direction differs from the reference image",
        ));
    }
    Ok(())
}

/// Reject non-finite cost values and gradients.
pub fn validate_finite(what: &str, values: &[f64]) -> Result<()> {
    if let Some(index) = values.iter().position(|v| !v.is_finite()) {
        return Err(RegistrationError::numerical_instability(format!(
            "{} has a non-finite entry at index {}",
            what, index
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::tensor::Tensor;
    use burn_ndarray::NdArray;
    use regkit_core::{Direction, Point, Spacing};

    type B = NdArray<f32>;

    #[test]
    fn test_validate_learning_rate() {
        assert!(validate_learning_rate(0.01).is_ok());
        assert!(validate_learning_rate(25.0).is_ok());
        assert!(validate_learning_rate(0.0).is_err());
        assert!(validate_learning_rate(-0.01).is_err());
        assert!(validate_learning_rate(1e-11).is_err());
        assert!(validate_learning_rate(f64::NAN).is_err());
    }

    #[test]
    fn test_validate_iterations() {
        assert!(validate_iterations(100).is_ok());
        assert!(validate_iterations(0).is_err());
        assert!(validate_iterations(2_000_000).is_err());
    }

    #[test]
    fn test_validate_histogram_and_history() {
        assert!(validate_histogram_bins(50).is_ok());
        assert!(validate_histogram_bins(1).is_err());
        assert!(validate_lbfgs_history_size(5).is_ok());
        assert!(validate_lbfgs_history_size(0).is_err());
        assert!(validate_lbfgs_history_size(101).is_err());
    }

    #[test]
    fn test_validate_sampling_percentage() {
        assert!(validate_sampling_percentage(0.01).is_ok());
        assert!(validate_sampling_percentage(1.0).is_ok());
        assert!(validate_sampling_percentage(0.0).is_err());
        assert!(validate_sampling_percentage(1.5).is_err());
        assert!(validate_sampling_percentage(f64::NAN).is_err());
    }

    #[test]
    fn test_validate_bounds() {
        assert!(validate_bounds(None, None).is_ok());
        assert!(validate_bounds(Some(-1.0), Some(1.0)).is_ok());
        assert!(validate_bounds(Some(2.0), Some(1.0)).is_err());
        assert!(validate_bounds(Some(f64::NAN), None).is_err());
    }

    #[test]
    fn test_validate_mask() {
        let device = Default::default();
        let reference = ImageGeometry::<2>::with_size([4, 3]);
        let good = Image::<B, 2>::new(
            Tensor::ones([3, 4], &device),
            Point::origin(),
            Spacing::repeat(1.0),
            Direction::identity(),
        );
        assert!(validate_mask(&reference, &good).is_ok());

        let wrong_size = Image::<B, 2>::new(
            Tensor::ones([4, 4], &device),
            Point::origin(),
            Spacing::repeat(1.0),
            Direction::identity(),
        );
        assert!(matches!(
            validate_mask(&reference, &wrong_size),
            Err(RegistrationError::InvalidMask(_))
        ));

        let shifted = Image::<B, 2>::new(
            Tensor::ones([3, 4], &device),
            Point::<2>::new(0.5, 0.0),
            Spacing::repeat(1.0),
            Direction::identity(),
        );
        assert!(matches!(
            validate_mask(&reference, &shifted),
            Err(RegistrationError::InvalidMask(_))
        ));
    }

    #[test]
    fn test_validate_finite() {
        assert!(validate_finite("gradient", &[0.0, 1.0]).is_ok());
        assert!(matches!(
            validate_finite("gradient", &[0.0, f64::INFINITY]),
            Err(RegistrationError::NumericalInstability(_))
        ));
    }
}
