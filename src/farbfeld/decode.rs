use alloc::string::ToString;

use crate::bitmap::Bitmap;
use crate::buffer::PixelBuffer;
use crate::limits::Limits;
use crate::metadata::Metadata;
use crate::pixel::PixelFormat;
use crate::reader::Reader;
use crate::BitmapError;

/// Decode a farbfeld image into an `Rgba8888` bitmap.
pub fn decode(data: &[u8], limits: &Limits) -> Result<Bitmap, BitmapError> {
    let mut r = Reader::new(data);
    if r.bytes(8)? != b"farbfeld" {
        return Err(BitmapError::CorruptData(
            "missing farbfeld signature".to_string(),
        ));
    }
    let width = r.u32_be()?;
    let height = r.u32_be()?;
    if width == 0 || height == 0 {
        return Err(BitmapError::CorruptData(
            "farbfeld dimensions are zero".to_string(),
        ));
    }
    limits.check_dimensions(width, height)?;

    let mut buffer = PixelBuffer::allocate(width, height, PixelFormat::Rgba8888, limits)?;
    for y in 0..height {
        let src = r.bytes(width as usize * 8)?;
        let dst = buffer.scanline_mut(y)?;
        // Big-endian u16 samples; keeping the high byte narrows to 8 bits.
        for (sample, slot) in src.chunks_exact(2).zip(dst.iter_mut()) {
            *slot = sample[0];
        }
    }

    Bitmap::from_parts(buffer, None, Metadata::new())
}
