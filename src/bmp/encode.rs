use alloc::vec::Vec;

use crate::bitmap::Bitmap;
use crate::metadata::MetadataValue;
use crate::pixel::PixelFormat;
use crate::BitmapError;

// 72 DPI in pixels per meter, the conventional default.
const DEFAULT_RESOLUTION: i32 = 2835;

/// Encode a bitmap as an uncompressed BMP with a 40-byte
/// `BITMAPINFOHEADER`. Rows are written bottom-up; palette alpha is
/// dropped (BMP palette entries have no alpha).
pub fn encode(bitmap: &Bitmap) -> Result<Vec<u8>, BitmapError> {
    let width = bitmap.width();
    let height = bitmap.height();
    let stride = bitmap.buffer().stride() as usize;
    let bpp = u16::from(bitmap.format().bits_per_pixel());

    let palette_len = bitmap.palette().map_or(0, |p| p.len());
    let pixel_offset = 14 + 40 + palette_len * 4;
    let pixel_data_size = stride * height as usize;
    let file_size = pixel_offset + pixel_data_size;

    let mut out = Vec::with_capacity(file_size);

    // File header.
    out.extend_from_slice(b"BM");
    out.extend_from_slice(&(file_size as u32).to_le_bytes());
    out.extend_from_slice(&[0u8; 4]);
    out.extend_from_slice(&(pixel_offset as u32).to_le_bytes());

    // BITMAPINFOHEADER.
    let (res_x, res_y) = resolution(bitmap);
    out.extend_from_slice(&40u32.to_le_bytes());
    out.extend_from_slice(&(width as i32).to_le_bytes());
    out.extend_from_slice(&(height as i32).to_le_bytes()); // positive = bottom-up
    out.extend_from_slice(&1u16.to_le_bytes()); // planes
    out.extend_from_slice(&bpp.to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes()); // BI_RGB
    out.extend_from_slice(&(pixel_data_size as u32).to_le_bytes());
    out.extend_from_slice(&res_x.to_le_bytes());
    out.extend_from_slice(&res_y.to_le_bytes());
    out.extend_from_slice(&(palette_len as u32).to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes()); // important colors

    if let Some(palette) = bitmap.palette() {
        for entry in palette.entries() {
            out.extend_from_slice(&[entry.b, entry.g, entry.r, 0]);
        }
    }

    for y in (0..height).rev() {
        let row = bitmap.buffer().scanline(y)?;
        match bitmap.format() {
            // Indexed and 555 rows already match the file layout,
            // 4-byte alignment included.
            PixelFormat::Indexed1
            | PixelFormat::Indexed4
            | PixelFormat::Indexed8
            | PixelFormat::Rgb555 => out.extend_from_slice(row),
            PixelFormat::Rgb888 => {
                for x in 0..width as usize {
                    out.extend_from_slice(&[row[x * 3 + 2], row[x * 3 + 1], row[x * 3]]);
                }
                out.resize(out.len() + stride - width as usize * 3, 0);
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
        }
    }

    Ok(out)
}

fn resolution(bitmap: &Bitmap) -> (i32, i32) {
    let read = |key: &str| match bitmap.metadata().get(key) {
        Ok(MetadataValue::Int(v)) => i32::try_from(*v).unwrap_or(DEFAULT_RESOLUTION),
        _ => DEFAULT_RESOLUTION,
    };
    (read("resolution-x"), read("resolution-y"))
}
