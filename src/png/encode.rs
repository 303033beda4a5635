use alloc::format;
use alloc::vec::Vec;

use miniz_oxide::deflate::compress_to_vec_zlib;

use crate::bitmap::Bitmap;
use crate::metadata::MetadataValue;
use crate::pixel::PixelFormat;
use crate::BitmapError;

use super::filter::filter_row_adaptive;
use super::{write_chunk, SIGNATURE};

const COMPRESSION_LEVEL: u8 = 6;

/// Encode a PNG file. Indexed formats become color type 3 at their own
/// bit depth, `Rgb888` type 2 and `Rgba8888` type 6; `Rgb555` has no
/// PNG representation.
pub fn encode(bitmap: &Bitmap) -> Result<Vec<u8>, BitmapError> {
    let format = bitmap.format();
    let (color_type, bit_depth, channels) = match format {
        PixelFormat::Indexed1 => (3u8, 1u8, 1usize),
        PixelFormat::Indexed4 => (3, 4, 1),
        PixelFormat::Indexed8 => (3, 8, 1),
        PixelFormat::Rgb888 => (2, 8, 3),
        PixelFormat::Rgba8888 => (6, 8, 4),
        PixelFormat::Rgb555 => {
            return Err(BitmapError::UnsupportedPixelFormat(format!(
                "{format:?} cannot be written as PNG"
            )))
        }
    };

    let mut out = Vec::new();
    out.extend_from_slice(&SIGNATURE);

    let mut ihdr = Vec::with_capacity(13);
    ihdr.extend_from_slice(&bitmap.width().to_be_bytes());
    ihdr.extend_from_slice(&bitmap.height().to_be_bytes());
    ihdr.extend_from_slice(&[bit_depth, color_type, 0, 0, 0]);
    write_chunk(&mut out, b"IHDR", &ihdr);

    if color_type == 3 {
        // from_parts guarantees indexed bitmaps carry a palette.
        let palette = bitmap.palette().ok_or_else(|| {
            BitmapError::CorruptData("indexed bitmap without palette".into())
        })?;
        let mut plte = Vec::with_capacity(palette.len() * 3);
        for entry in palette.entries() {
            plte.extend_from_slice(&[entry.r, entry.g, entry.b]);
        }
        write_chunk(&mut out, b"PLTE", &plte);
        if palette.has_transparency() {
            let trns: Vec<u8> = palette.entries().iter().map(|e| e.a).collect();
            write_chunk(&mut out, b"tRNS", &trns);
        }
    }

    write_phys(&mut out, bitmap);

    let raw = filtered_stream(bitmap, channels, color_type)?;
    let idat = compress_to_vec_zlib(&raw, COMPRESSION_LEVEL);
    write_chunk(&mut out, b"IDAT", &idat);

    write_text(&mut out, bitmap);
    write_chunk(&mut out, b"IEND", &[]);
    Ok(out)
}

/// Build the filtered scanline stream. Indexed rows are already packed
/// the way PNG expects, so they take the None filter verbatim;
/// truecolor rows get the adaptive per-row choice.
fn filtered_stream(
    bitmap: &Bitmap,
    channels: usize,
    color_type: u8,
) -> Result<Vec<u8>, BitmapError> {
    let buffer = bitmap.buffer();
    let row_bytes = buffer.row_bytes();
    let mut raw = Vec::with_capacity((1 + row_bytes) * buffer.height() as usize);

    if color_type == 3 {
        for y in 0..buffer.height() {
            raw.push(0);
            raw.extend_from_slice(&buffer.scanline(y)?[..row_bytes]);
        }
        return Ok(raw);
    }

    let bpp = channels;
    let mut previous: Option<Vec<u8>> = None;
    for y in 0..buffer.height() {
        let current = &buffer.scanline(y)?[..row_bytes];
        filter_row_adaptive(current, previous.as_deref(), bpp, &mut raw);
        previous = Some(current.to_vec());
    }
    Ok(raw)
}

fn write_phys(out: &mut Vec<u8>, bitmap: &Bitmap) {
    let res = |key: &str| match bitmap.metadata().get(key) {
        Ok(MetadataValue::Int(v)) => u32::try_from(*v).ok(),
        _ => None,
    };
    let (Some(x), Some(y)) = (res("resolution-x"), res("resolution-y")) else {
        return;
    };
    let mut phys = Vec::with_capacity(9);
    phys.extend_from_slice(&x.to_be_bytes());
    phys.extend_from_slice(&y.to_be_bytes());
    phys.push(1); // pixels per meter
    write_chunk(out, b"pHYs", &phys);
}

fn write_text(out: &mut Vec<u8>, bitmap: &Bitmap) {
    for (key, value) in bitmap.metadata().iter() {
        let MetadataValue::Text(text) = value else {
            continue;
        };
        if key.is_empty() || key.len() > 79 || key.bytes().any(|b| b == 0) {
            continue;
        }
        if text.bytes().any(|b| b == 0) {
            continue;
        }
        let mut data = Vec::with_capacity(key.len() + 1 + text.len());
        data.extend_from_slice(key.as_bytes());
        data.push(0);
        data.extend_from_slice(text.as_bytes());
        write_chunk(out, b"tEXt", &data);
    }
}
