use alloc::format;

use crate::BitmapError;

/// Broad color model of a pixel format.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColorModel {
    /// Pixel values are palette indices.
    Indexed,
    /// Pixel values are direct color values.
    TrueColor,
}

/// Storage format of a pixel buffer.
///
/// The closed set of formats the engine stores in memory:
///
/// | format     | bits | layout                                   |
/// |------------|------|------------------------------------------|
/// | `Indexed1` | 1    | palette indices, 8 pixels/byte, MSB first |
/// | `Indexed4` | 4    | palette indices, 2 pixels/byte, MSB first |
/// | `Indexed8` | 8    | palette indices, 1 pixel/byte             |
/// | `Rgb555`   | 16   | little-endian `X1R5G5B5` words            |
/// | `Rgb888`   | 24   | R, G, B bytes                             |
/// | `Rgba8888` | 32   | R, G, B, A bytes                          |
#[non_exhaustive]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    Indexed1,
    Indexed4,
    Indexed8,
    Rgb555,
    Rgb888,
    Rgba8888,
}

impl PixelFormat {
    /// Resolve a (bit depth, color model) pair to a storage format.
    ///
    /// Fails with [`BitmapError::UnsupportedPixelFormat`] for combinations
    /// outside the closed set above.
    pub fn from_parts(bits_per_pixel: u8, model: ColorModel) -> Result<Self, BitmapError> {
        match (model, bits_per_pixel) {
            (ColorModel::Indexed, 1) => Ok(Self::Indexed1),
            (ColorModel::Indexed, 4) => Ok(Self::Indexed4),
            (ColorModel::Indexed, 8) => Ok(Self::Indexed8),
            (ColorModel::TrueColor, 16) => Ok(Self::Rgb555),
            (ColorModel::TrueColor, 24) => Ok(Self::Rgb888),
            (ColorModel::TrueColor, 32) => Ok(Self::Rgba8888),
            _ => Err(BitmapError::UnsupportedPixelFormat(format!(
                "{bits_per_pixel}-bit {model:?} is not a storable format"
            ))),
        }
    }

    pub fn bits_per_pixel(self) -> u8 {
        match self {
            Self::Indexed1 => 1,
            Self::Indexed4 => 4,
            Self::Indexed8 => 8,
            Self::Rgb555 => 16,
            Self::Rgb888 => 24,
            Self::Rgba8888 => 32,
        }
    }

    pub fn color_model(self) -> ColorModel {
        if self.is_indexed() {
            ColorModel::Indexed
        } else {
            ColorModel::TrueColor
        }
    }

    pub fn is_indexed(self) -> bool {
        matches!(self, Self::Indexed1 | Self::Indexed4 | Self::Indexed8)
    }

    /// Whether the format carries an alpha channel directly.
    ///
    /// Indexed formats carry alpha through their palette entries, not
    /// through the pixel storage itself.
    pub fn has_alpha(self) -> bool {
        matches!(self, Self::Rgba8888)
    }

    /// Maximum palette length for indexed formats; 0 for truecolor.
    pub fn palette_capacity(self) -> usize {
        if self.is_indexed() {
            1usize << self.bits_per_pixel()
        } else {
            0
        }
    }
}

/// Expand a 5-bit channel to 8 bits (replicating the top bits).
#[inline]
pub(crate) fn expand5(v: u8) -> u8 {
    (v << 3) | (v >> 2)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_parts_rejects_invalid_combinations() {
        assert!(PixelFormat::from_parts(16, ColorModel::Indexed).is_err());
        assert!(PixelFormat::from_parts(24, ColorModel::Indexed).is_err());
        assert!(PixelFormat::from_parts(8, ColorModel::TrueColor).is_err());
        assert!(PixelFormat::from_parts(2, ColorModel::Indexed).is_err());
    }

    #[test]
    fn palette_capacity() {
        assert_eq!(PixelFormat::Indexed1.palette_capacity(), 2);
        assert_eq!(PixelFormat::Indexed4.palette_capacity(), 16);
        assert_eq!(PixelFormat::Indexed8.palette_capacity(), 256);
        assert_eq!(PixelFormat::Rgb888.palette_capacity(), 0);
    }

    #[test]
    fn expand5_covers_range() {
        assert_eq!(expand5(0), 0);
        assert_eq!(expand5(31), 255);
    }
}
