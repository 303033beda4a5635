use alloc::vec;
use alloc::vec::Vec;

use crate::limits::Limits;
use crate::pixel::PixelFormat;
use crate::BitmapError;

/// Raw scanline-aligned pixel storage.
///
/// Rows are stored **top-down**: scanline 0 is the top row of the image.
/// Each row occupies `stride` bytes, where `stride` is the packed row
/// length rounded up to a 4-byte boundary. Sub-byte indexed formats pack
/// pixels MSB-first within each byte.
///
/// There is no implicit resizing; changing dimensions means allocating a
/// new buffer and copying.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    format: PixelFormat,
    stride: u32,
    data: Vec<u8>,
}

/// Row stride for a width/format pair: packed bits rounded up to whole
/// bytes, then up to a 4-byte boundary. `None` on arithmetic overflow.
pub(crate) fn stride_for(width: u32, format: PixelFormat) -> Option<u32> {
    let bits = (width as u64).checked_mul(u64::from(format.bits_per_pixel()))?;
    let bytes = bits.div_ceil(8);
    let padded = bytes.checked_add(3)? & !3;
    u32::try_from(padded).ok()
}

/// Store a palette index into a packed row at pixel `x` (MSB-first for
/// sub-byte formats). Callers guarantee `format` is indexed.
pub(crate) fn pack_index(row: &mut [u8], format: PixelFormat, x: usize, index: u8) {
    match format {
        PixelFormat::Indexed1 => {
            let shift = 7 - (x % 8);
            row[x / 8] = (row[x / 8] & !(1 << shift)) | ((index & 0x01) << shift);
        }
        PixelFormat::Indexed4 => {
            let shift = 4 * (1 - (x % 2));
            row[x / 2] = (row[x / 2] & !(0x0F << shift)) | ((index & 0x0F) << shift);
        }
        _ => row[x] = index,
    }
}

impl PixelBuffer {
    /// Allocate a zero-initialized buffer.
    ///
    /// Fails with [`BitmapError::OutOfMemory`] if the total size exceeds
    /// the `limits` ceiling or overflows.
    pub fn allocate(
        width: u32,
        height: u32,
        format: PixelFormat,
        limits: &Limits,
    ) -> Result<Self, BitmapError> {
        limits.check_dimensions(width, height)?;

        let stride = stride_for(width, format).ok_or(BitmapError::OutOfMemory {
            requested: u64::MAX,
            limit: limits.max_alloc_bytes.unwrap_or(u64::MAX),
        })?;
        let total = (stride as u64).checked_mul(u64::from(height)).ok_or(
            BitmapError::OutOfMemory {
                requested: u64::MAX,
                limit: limits.max_alloc_bytes.unwrap_or(u64::MAX),
            },
        )?;
        let total = usize::try_from(total).map_err(|_| BitmapError::OutOfMemory {
            requested: total,
            limit: limits.max_alloc_bytes.unwrap_or(u64::MAX),
        })?;
        limits.check_alloc(total)?;

        Ok(Self {
            width,
            height,
            format,
            stride,
            data: vec![0u8; total],
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// Byte length of one scanline, including row-end padding.
    pub fn stride(&self) -> u32 {
        self.stride
    }

    /// Packed bytes per row, excluding the 4-byte-alignment padding.
    pub fn row_bytes(&self) -> usize {
        ((self.width as usize) * usize::from(self.format.bits_per_pixel())).div_ceil(8)
    }

    /// The whole pixel block, `stride * height` bytes.
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Bounded view of row `y` (stride bytes).
    ///
    /// Fails with [`BitmapError::IndexOutOfRange`] for `y >= height`.
    pub fn scanline(&self, y: u32) -> Result<&[u8], BitmapError> {
        if y >= self.height {
            return Err(BitmapError::IndexOutOfRange {
                x: 0,
                y,
                width: self.width,
                height: self.height,
            });
        }
        let start = y as usize * self.stride as usize;
        Ok(&self.data[start..start + self.stride as usize])
    }

    pub fn scanline_mut(&mut self, y: u32) -> Result<&mut [u8], BitmapError> {
        if y >= self.height {
            return Err(BitmapError::IndexOutOfRange {
                x: 0,
                y,
                width: self.width,
                height: self.height,
            });
        }
        let start = y as usize * self.stride as usize;
        let stride = self.stride as usize;
        Ok(&mut self.data[start..start + stride])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stride_is_padded_to_four_bytes() {
        // 5 px * 24 bpp = 15 bytes -> 16
        assert_eq!(stride_for(5, PixelFormat::Rgb888), Some(16));
        // 3 px * 1 bpp = 1 byte -> 4
        assert_eq!(stride_for(3, PixelFormat::Indexed1), Some(4));
        // 6 px * 4 bpp = 3 bytes -> 4
        assert_eq!(stride_for(6, PixelFormat::Indexed4), Some(4));
        // 2 px * 16 bpp = 4 bytes -> 4
        assert_eq!(stride_for(2, PixelFormat::Rgb555), Some(4));
    }

    #[test]
    fn allocate_zero_initializes() {
        let buf = PixelBuffer::allocate(3, 2, PixelFormat::Rgb888, &Limits::default()).unwrap();
        assert_eq!(buf.stride(), 12);
        assert!(buf.bytes().iter().all(|&b| b == 0));
        assert_eq!(buf.bytes().len(), 24);
    }

    #[test]
    fn allocate_respects_ceiling() {
        let limits = Limits {
            max_alloc_bytes: Some(8),
            ..Default::default()
        };
        let err = PixelBuffer::allocate(100, 100, PixelFormat::Rgba8888, &limits).unwrap_err();
        assert!(matches!(err, BitmapError::OutOfMemory { .. }));
    }

    #[test]
    fn scanline_bounds() {
        let buf = PixelBuffer::allocate(4, 2, PixelFormat::Indexed8, &Limits::default()).unwrap();
        assert!(buf.scanline(1).is_ok());
        assert!(matches!(
            buf.scanline(2),
            Err(BitmapError::IndexOutOfRange { y: 2, .. })
        ));
    }
}
