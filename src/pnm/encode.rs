use alloc::vec;
use alloc::vec::Vec;

use rgb::RGBA8;

use crate::bitmap::Bitmap;
use crate::pixel::PixelFormat;
use crate::BitmapError;

/// Encode a bitmap as binary PNM.
///
/// `Indexed8` bitmaps whose palette is the full 256-entry gray ramp are
/// written as P5 graymaps (indices are the gray values); everything else
/// becomes a P6 pixmap with alpha dropped.
pub fn encode(bitmap: &Bitmap) -> Result<Vec<u8>, BitmapError> {
    if bitmap.format() == PixelFormat::Rgb555 {
        return Err(BitmapError::UnsupportedPixelFormat(
            "Rgb555 has no PNM representation".into(),
        ));
    }
    let width = bitmap.width();
    let height = bitmap.height();

    let gray = bitmap.format() == PixelFormat::Indexed8
        && bitmap
            .palette()
            .is_some_and(|p| p.len() == 256 && p.is_gray_ramp());

    let mut out = Vec::new();
    let magic: &[u8] = if gray { b"P5" } else { b"P6" };
    out.extend_from_slice(magic);
    out.extend_from_slice(format_header(width, height).as_bytes());

    if gray {
        for y in 0..height {
            let row = bitmap.buffer().scanline(y)?;
            out.extend_from_slice(&row[..width as usize]);
        }
    } else {
        let mut row = vec![RGBA8::new(0, 0, 0, 0); width as usize];
        for y in 0..height {
            bitmap.row_rgba(y, &mut row)?;
            for px in &row {
                out.extend_from_slice(&[px.r, px.g, px.b]);
            }
        }
    }

    Ok(out)
}

fn format_header(width: u32, height: u32) -> alloc::string::String {
    alloc::format!("\n{width} {height}\n255\n")
}
