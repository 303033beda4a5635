use alloc::format;
use alloc::vec::Vec;

use crate::bitmap::Bitmap;
use crate::metadata::MetadataValue;
use crate::pixel::PixelFormat;
use crate::BitmapError;

/// Encode a bitmap as an uncompressed top-left-origin TGA.
///
/// `Indexed8` over a full gray ramp becomes a grayscale image (type 3);
/// other `Indexed8` bitmaps become color-mapped (type 1); truecolor
/// formats become type 2. `Indexed1`/`Indexed4` have no TGA pixel layout
/// and are rejected.
pub fn encode(bitmap: &Bitmap) -> Result<Vec<u8>, BitmapError> {
    let width = bitmap.width();
    let height = bitmap.height();
    if width > u32::from(u16::MAX) || height > u32::from(u16::MAX) {
        return Err(BitmapError::CorruptData(format!(
            "{width}x{height} exceeds TGA's 16-bit dimensions"
        )));
    }

    let format = bitmap.format();
    let gray = format == PixelFormat::Indexed8
        && bitmap
            .palette()
            .is_some_and(|p| p.len() == 256 && p.is_gray_ramp());

    let (image_type, pixel_depth, colormap) = match format {
        PixelFormat::Indexed8 if gray => (3u8, 8u8, None),
        PixelFormat::Indexed8 => {
            let palette = bitmap.palette().expect("indexed bitmap has palette");
            // 32-bit entries only when some entry actually uses alpha.
            let entry_size = if palette.has_transparency() { 32 } else { 24 };
            (1, 8, Some((palette, entry_size)))
        }
        PixelFormat::Rgb555 => (2, 16, None),
        PixelFormat::Rgb888 => (2, 24, None),
        PixelFormat::Rgba8888 => (2, 32, None),
        PixelFormat::Indexed1 | PixelFormat::Indexed4 => {
            return Err(BitmapError::UnsupportedPixelFormat(format!(
                "{format:?} has no TGA pixel layout"
            )));
        }
    };

    let image_id: &[u8] = match bitmap.metadata().get("image-id") {
        Ok(MetadataValue::Text(text)) if text.len() <= 255 => text.as_bytes(),
        Ok(MetadataValue::Binary(bytes)) if bytes.len() <= 255 => bytes,
        _ => &[],
    };

    let mut out = Vec::new();
    out.push(image_id.len() as u8);
    out.push(u8::from(colormap.is_some()));
    out.push(image_type);
    // Color map specification.
    out.extend_from_slice(&0u16.to_le_bytes()); // first entry index
    let (map_length, entry_size) = match &colormap {
        Some((palette, size)) => (palette.len() as u16, *size),
        None => (0, 0),
    };
    out.extend_from_slice(&map_length.to_le_bytes());
    out.push(entry_size);
    // Image specification.
    out.extend_from_slice(&0u16.to_le_bytes()); // x origin
    out.extend_from_slice(&0u16.to_le_bytes()); // y origin
    out.extend_from_slice(&(width as u16).to_le_bytes());
    out.extend_from_slice(&(height as u16).to_le_bytes());
    out.push(pixel_depth);
    let alpha_bits = if format == PixelFormat::Rgba8888 { 8 } else { 0 };
    out.push(0x20 | alpha_bits); // top-left origin

    out.extend_from_slice(image_id);

    if let Some((palette, entry_size)) = colormap {
        for entry in palette.entries() {
            if entry_size == 32 {
                out.extend_from_slice(&[entry.b, entry.g, entry.r, entry.a]);
            } else {
                out.extend_from_slice(&[entry.b, entry.g, entry.r]);
            }
        }
    }

    for y in 0..height {
        let row = bitmap.buffer().scanline(y)?;
        match format {
            PixelFormat::Indexed8 => out.extend_from_slice(&row[..width as usize]),
            PixelFormat::Rgb555 => out.extend_from_slice(&row[..width as usize * 2]),
            PixelFormat::Rgb888 => {
                for x in 0..width as usize {
                    out.extend_from_slice(&[row[x * 3 + 2], row[x * 3 + 1], row[x * 3]]);
                }
            }
            PixelFormat::Rgba8888 => {
                for x in 0..width as usize {
                    out.extend_from_slice(&[
                        row[x * 4 + 2],
                        row[x * 4 + 1],
                        row[x * 4],
                        row[x * 4 + 3],
                    ]);
                }
            }
            _ => unreachable!("rejected above"),
        }
    }

    Ok(out)
}
