//! Metric implementations.
//!
//! Similarity metrics evaluated on sampled reference voxels.

pub mod histogram;
pub mod mse;
pub mod mutual_information;
pub mod trait_;

pub use histogram::{IntensityRange, ParzenJointHistogram};
pub use mse::MeanSquares;
pub use mutual_information::MutualInformation;
pub use trait_::{sample_moving, FixedSamples, Metric, MetricEvaluation, MovingSamples};
