pub mod resample;

pub use resample::{ResampleImageFilter, CHUNK_SIZE};
