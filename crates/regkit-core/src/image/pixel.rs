//! Pixel numeric types.
//!
//! Image data always lives in a float tensor; the pixel type records what the
//! caller handed in so resampled output can be quantized back to it.

use serde::{Deserialize, Serialize};

/// Numeric type of the samples an image was created from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PixelType {
    UInt8,
    Int8,
    UInt16,
    Int16,
    UInt32,
    Int32,
    Float32,
    Float64,
}

impl PixelType {
    /// Whether samples of this type are integers.
    pub fn is_integer(&self) -> bool {
        !matches!(self, PixelType::Float32 | PixelType::Float64)
    }

    /// Representable range for integer types, `None` for floats.
    pub fn integer_range(&self) -> Option<(f64, f64)> {
        match self {
            PixelType::UInt8 => Some((u8::MIN as f64, u8::MAX as f64)),
            PixelType::Int8 => Some((i8::MIN as f64, i8::MAX as f64)),
            PixelType::UInt16 => Some((u16::MIN as f64, u16::MAX as f64)),
            PixelType::Int16 => Some((i16::MIN as f64, i16::MAX as f64)),
            PixelType::UInt32 => Some((u32::MIN as f64, u32::MAX as f64)),
            PixelType::Int32 => Some((i32::MIN as f64, i32::MAX as f64)),
            PixelType::Float32 | PixelType::Float64 => None,
        }
    }
}

/// Scalar sample types accepted by [`Image::from_pixels`](super::Image::from_pixels).
pub trait Pixel: Copy + Send + Sync + 'static {
    const PIXEL_TYPE: PixelType;

    fn to_f32(self) -> f32;
}

macro_rules! impl_pixel {
    ($($t:ty => $variant:ident),* $(,)?) => {
        $(
            impl Pixel for $t {
                const PIXEL_TYPE: PixelType = PixelType::$variant;

                #[inline]
                fn to_f32(self) -> f32 {
                    self as f32
                }
            }
        )*
    };
}

impl_pixel! {
    u8 => UInt8,
    i8 => Int8,
    u16 => UInt16,
    i16 => Int16,
    u32 => UInt32,
    i32 => Int32,
    f32 => Float32,
    f64 => Float64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_classification() {
        assert!(PixelType::UInt8.is_integer());
        assert!(PixelType::Int32.is_integer());
        assert!(!PixelType::Float32.is_integer());
    }

    #[test]
    fn test_integer_range() {
        assert_eq!(PixelType::UInt8.integer_range(), Some((0.0, 255.0)));
        assert_eq!(PixelType::Int16.integer_range(), Some((-32768.0, 32767.0)));
        assert_eq!(PixelType::Float64.integer_range(), None);
    }

    #[test]
    fn test_pixel_conversion() {
        assert_eq!(<u16 as Pixel>::PIXEL_TYPE, PixelType::UInt16);
        assert_eq!(200u8.to_f32(), 200.0);
        assert_eq!((-3i16).to_f32(), -3.0);
    }
}
