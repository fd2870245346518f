//! Intensity-based image registration.
//!
//! [`estimate_affine`] and [`estimate_deformation`] find the transform that
//! maps reference physical points onto a moving image; [`apply_affine`] and
//! [`apply_deformation`] resample an image through it. [`any`] offers the
//! same operations for images whose dimensionality is only known at runtime.

pub mod any;
pub mod config;
pub mod cost;
pub mod error;
pub mod metric;
pub mod optimizer;
pub mod progress;
pub mod registration;
pub mod sampling;
pub mod scales;
pub mod validation;

pub use any::{apply_any, estimate_affine_any, estimate_deformation_any, AnyImage};
pub use config::{
    AffineRegistrationConfig, DeformableRegistrationConfig, ParameterProfile, RegistrationOptions,
    DEFAULT_SAMPLING_SEED,
};
pub use error::{RegistrationError, Result};
pub use optimizer::{OptimizationReport, StopReason};
pub use progress::{
    ConsoleProgressCallback, HistoryCallback, ProgressCallback, ProgressInfo, ProgressRun, ProgressTracker,
};
pub use registration::{
    apply_affine, apply_deformation, estimate_affine, estimate_deformation, resample_onto, RegistrationOutcome,
};
