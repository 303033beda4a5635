use alloc::format;
use alloc::string::ToString;

use crate::bitmap::Bitmap;
use crate::buffer::PixelBuffer;
use crate::limits::Limits;
use crate::metadata::Metadata;
use crate::palette::Palette;
use crate::pixel::PixelFormat;
use crate::reader::Reader;
use crate::BitmapError;

/// Decode a binary PNM image: P5 to `Indexed8` over a gray ramp, P6 to
/// `Rgb888`.
pub fn decode(data: &[u8], limits: &Limits) -> Result<Bitmap, BitmapError> {
    let mut r = Reader::new(data);
    let magic = r.bytes(2)?;
    let gray = match magic {
        b"P5" => true,
        b"P6" => false,
        _ => {
            return Err(BitmapError::CorruptData(
                "missing PNM magic number".to_string(),
            ))
        }
    };

    let width = read_number(&mut r)?;
    let height = read_number(&mut r)?;
    let maxval = read_number(&mut r)?;
    if width == 0 || height == 0 {
        return Err(BitmapError::CorruptData(
            "PNM dimensions are zero".to_string(),
        ));
    }
    if maxval == 0 {
        return Err(BitmapError::CorruptData("PNM maxval is zero".to_string()));
    }
    if maxval > 255 {
        return Err(BitmapError::UnsupportedPixelFormat(format!(
            "PNM maxval {maxval} exceeds 8-bit samples"
        )));
    }
    // Exactly one whitespace byte separates the header from the raster.
    let sep = r.u8()?;
    if !sep.is_ascii_whitespace() {
        return Err(BitmapError::CorruptData(
            "PNM header not terminated by whitespace".to_string(),
        ));
    }
    limits.check_dimensions(width, height)?;

    let scale = |v: u8| -> u8 {
        if maxval == 255 {
            v
        } else {
            ((u32::from(v) * 255 + maxval / 2) / maxval) as u8
        }
    };

    if gray {
        let mut buffer = PixelBuffer::allocate(width, height, PixelFormat::Indexed8, limits)?;
        for y in 0..height {
            let src = r.bytes(width as usize)?;
            let dst = buffer.scanline_mut(y)?;
            for (slot, &v) in dst[..width as usize].iter_mut().zip(src) {
                *slot = scale(v);
            }
        }
        let palette = Palette::gray_ramp(256);
        Bitmap::from_parts(buffer, Some(palette), Metadata::new())
    } else {
        let mut buffer = PixelBuffer::allocate(width, height, PixelFormat::Rgb888, limits)?;
        for y in 0..height {
            let src = r.bytes(width as usize * 3)?;
            let dst = buffer.scanline_mut(y)?;
            for (slot, &v) in dst[..width as usize * 3].iter_mut().zip(src) {
                *slot = scale(v);
            }
        }
        Bitmap::from_parts(buffer, None, Metadata::new())
    }
}

/// Read one ASCII decimal, skipping whitespace and `#` comments.
fn read_number(r: &mut Reader<'_>) -> Result<u32, BitmapError> {
    loop {
        let b = r.u8()?;
        if b == b'#' {
            while r.u8()? != b'\n' {}
        } else if b.is_ascii_digit() {
            let mut value = u32::from(b - b'0');
            while !r.is_empty() {
                let d = r.u8()?;
                if !d.is_ascii_digit() {
                    r.seek(r.position() - 1)?;
                    break;
                }
                value = value
                    .checked_mul(10)
                    .and_then(|v| v.checked_add(u32::from(d - b'0')))
                    .ok_or_else(|| {
                        BitmapError::CorruptData("PNM header value overflow".to_string())
                    })?;
            }
            return Ok(value);
        } else if !b.is_ascii_whitespace() {
            return Err(BitmapError::CorruptData(format!(
                "unexpected byte {b:#04x} in PNM header"
            )));
        }
    }
}
