//! Dimension-erased registration.
//!
//! Callers that only learn the dimensionality at runtime (e.g. after reading
//! a file) wrap images in [`AnyImage`] and persist transforms as
//! [`TransformRecord`]s.

use burn::tensor::backend::{AutodiffBackend, Backend};
use regkit_core::{AffineTransform, BSplineTransform, Image, ParametricTransform, TransformKind, TransformRecord};

use crate::config::{AffineRegistrationConfig, DeformableRegistrationConfig, RegistrationOptions};
use crate::error::{RegistrationError, Result};
use crate::registration::{apply_affine, apply_deformation, estimate_affine, estimate_deformation, RegistrationOutcome};

/// A 2D or 3D image.
#[derive(Debug, Clone)]
pub enum AnyImage<B: Backend> {
    Two(Image<B, 2>),
    Three(Image<B, 3>),
}

impl<B: Backend> AnyImage<B> {
    pub fn dimension(&self) -> usize {
        match self {
            Self::Two(_) => 2,
            Self::Three(_) => 3,
        }
    }

    pub fn as_2d(&self) -> Option<&Image<B, 2>> {
        match self {
            Self::Two(image) => Some(image),
            Self::Three(_) => None,
        }
    }

    pub fn as_3d(&self) -> Option<&Image<B, 3>> {
        match self {
            Self::Three(image) => Some(image),
            Self::Two(_) => None,
        }
    }
}

impl<B: Backend> From<Image<B, 2>> for AnyImage<B> {
    fn from(image: Image<B, 2>) -> Self {
        Self::Two(image)
    }
}

impl<B: Backend> From<Image<B, 3>> for AnyImage<B> {
    fn from(image: Image<B, 3>) -> Self {
        Self::Three(image)
    }
}

fn dimension_mismatch(what: &str, expected: usize, actual: usize) -> RegistrationError {
    RegistrationError::invalid_input(format!(
        "{} is {}D but the reference image is {}D",
        what, actual, expected
    ))
}

/// Pick the mask variant matching `D`.
fn mask_2d<B: Backend>(mask: Option<&AnyImage<B>>) -> Result<Option<&Image<B, 2>>> {
    mask.map(|mask| mask.as_2d().ok_or_else(|| dimension_mismatch("mask", 2, mask.dimension())))
        .transpose()
}

fn mask_3d<B: Backend>(mask: Option<&AnyImage<B>>) -> Result<Option<&Image<B, 3>>> {
    mask.map(|mask| mask.as_3d().ok_or_else(|| dimension_mismatch("mask", 3, mask.dimension())))
        .transpose()
}

/// [`estimate_affine`] for images of either dimensionality.
pub fn estimate_affine_any<B: AutodiffBackend>(
    reference: &AnyImage<B>,
    moving: &AnyImage<B>,
    mask: Option<&AnyImage<B>>,
    config: &AffineRegistrationConfig,
    options: &RegistrationOptions,
) -> Result<RegistrationOutcome<TransformRecord>> {
    match (reference, moving) {
        (AnyImage::Two(reference), AnyImage::Two(moving)) => {
            let outcome = estimate_affine(reference, moving, mask_2d(mask)?, config, options)?;
            Ok(outcome.map(|transform| transform.to_record()))
        }
        (AnyImage::Three(reference), AnyImage::Three(moving)) => {
            let outcome = estimate_affine(reference, moving, mask_3d(mask)?, config, options)?;
            Ok(outcome.map(|transform| transform.to_record()))
        }
        _ => Err(dimension_mismatch("moving image", reference.dimension(), moving.dimension())),
    }
}

/// [`estimate_deformation`] for images of either dimensionality.
pub fn estimate_deformation_any<B: AutodiffBackend>(
    reference: &AnyImage<B>,
    moving: &AnyImage<B>,
    mask: Option<&AnyImage<B>>,
    config: &DeformableRegistrationConfig,
    options: &RegistrationOptions,
) -> Result<RegistrationOutcome<TransformRecord>> {
    match (reference, moving) {
        (AnyImage::Two(reference), AnyImage::Two(moving)) => {
            let outcome = estimate_deformation(reference, moving, mask_2d(mask)?, config, options)?;
            Ok(outcome.map(|transform| transform.to_record()))
        }
        (AnyImage::Three(reference), AnyImage::Three(moving)) => {
            let outcome = estimate_deformation(reference, moving, mask_3d(mask)?, config, options)?;
            Ok(outcome.map(|transform| transform.to_record()))
        }
        _ => Err(dimension_mismatch("moving image", reference.dimension(), moving.dimension())),
    }
}

/// Resample `image` onto its own grid through a persisted transform of
/// either kind.
pub fn apply_any<B: Backend>(image: &AnyImage<B>, record: &TransformRecord) -> Result<AnyImage<B>> {
    if record.dimension != image.dimension() {
        return Err(RegistrationError::invalid_input(format!(
            "{}D transform cannot be applied to a {}D image",
            record.dimension,
            image.dimension()
        )));
    }
    match image {
        AnyImage::Two(image) => apply_record(image, record).map(AnyImage::Two),
        AnyImage::Three(image) => apply_record(image, record).map(AnyImage::Three),
    }
}

fn apply_record<B: Backend, const D: usize>(image: &Image<B, D>, record: &TransformRecord) -> Result<Image<B, D>> {
    let device = image.device();
    match record.kind {
        TransformKind::Affine => {
            let transform = AffineTransform::<B, D>::from_record(record, &device)?;
            Ok(apply_affine(image, &transform))
        }
        TransformKind::BSpline => {
            let transform = BSplineTransform::<B, D>::from_record(record, &device)?;
            Ok(apply_deformation(image, &transform))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::Autodiff;
    use burn_ndarray::NdArray;
    use regkit_core::{ImageGeometry, Point};

    type B = Autodiff<NdArray<f32>>;

    fn image_2d() -> AnyImage<B> {
        let device = Default::default();
        let pixels: Vec<f32> = (0..64).map(|i| i as f32).collect();
        Image::<B, 2>::from_pixels(&pixels, &ImageGeometry::with_size([8, 8]), &device)
            .unwrap()
            .into()
    }

    fn image_3d() -> AnyImage<B> {
        let device = Default::default();
        let pixels: Vec<f32> = (0..64).map(|i| i as f32).collect();
        Image::<B, 3>::from_pixels(&pixels, &ImageGeometry::with_size([4, 4, 4]), &device)
            .unwrap()
            .into()
    }

    #[test]
    fn test_dimension_mismatch_is_invalid_input() {
        let result = estimate_affine_any(
            &image_2d(),
            &image_3d(),
            None,
            &AffineRegistrationConfig::new(),
            &RegistrationOptions::new(),
        );
        assert!(matches!(result, Err(RegistrationError::InvalidInput(_))));

        let result = estimate_deformation_any(
            &image_3d(),
            &image_3d(),
            Some(&image_2d()),
            &DeformableRegistrationConfig::new(),
            &RegistrationOptions::new(),
        );
        assert!(matches!(result, Err(RegistrationError::InvalidInput(_))));
    }

    #[test]
    fn test_apply_record_of_wrong_dimension() {
        let device = Default::default();
        let transform = AffineTransform::<B, 3>::identity(Point::origin(), &device);
        let result = apply_any(&image_2d(), &transform.to_record());
        assert!(matches!(result, Err(RegistrationError::InvalidInput(_))));
    }

    #[test]
    fn test_apply_identity_record() {
        let device = Default::default();
        let image = image_2d();
        let transform = AffineTransform::<B, 2>::identity(Point::origin(), &device);
        let output = apply_any(&image, &transform.to_record()).unwrap();

        let (Some(output), Some(input)) = (output.as_2d(), image.as_2d()) else {
            panic!("expected 2D images");
        };
        for (a, b) in output.to_vec().iter().zip(input.to_vec()) {
            assert!((a - b).abs() < 1e-4);
        }
    }
}
