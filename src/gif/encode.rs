use alloc::format;
use alloc::vec::Vec;

use crate::bitmap::Bitmap;
use crate::metadata::MetadataValue;
use crate::BitmapError;

use super::lzw;
use super::{COMMENT_LABEL, EXTENSION_INTRODUCER, GRAPHIC_CONTROL_LABEL, IMAGE_SEPARATOR, TRAILER};

/// Encode an indexed bitmap as a single-frame GIF89a.
///
/// Truecolor bitmaps are rejected; callers quantize first. The color
/// table is the palette padded with black to the next power of two (GIF
/// table sizes are 2, 4, 8 .. 256). A palette entry with alpha below 128
/// becomes the frame's transparent index.
pub fn encode(bitmap: &Bitmap) -> Result<Vec<u8>, BitmapError> {
    let palette = bitmap.palette().ok_or_else(|| {
        BitmapError::UnsupportedPixelFormat(format!(
            "GIF stores indexed pixels only, not {:?}",
            bitmap.format()
        ))
    })?;
    let width = bitmap.width();
    let height = bitmap.height();
    if width > u32::from(u16::MAX) || height > u32::from(u16::MAX) {
        return Err(BitmapError::CorruptData(format!(
            "{width}x{height} exceeds GIF's 16-bit dimensions"
        )));
    }

    let size_flag = table_size_flag(palette.len());
    let table_len = 2usize << size_flag;
    let transparent = palette.entries().iter().position(|e| e.a < 128);

    let mut out = Vec::new();
    out.extend_from_slice(b"GIF89a");

    // Logical screen descriptor, global color table present.
    out.extend_from_slice(&(width as u16).to_le_bytes());
    out.extend_from_slice(&(height as u16).to_le_bytes());
    out.push(0x80 | (size_flag << 4) | size_flag);
    out.push(0); // background color index
    out.push(0); // pixel aspect ratio

    for entry in palette.entries() {
        out.extend_from_slice(&[entry.r, entry.g, entry.b]);
    }
    for _ in palette.len()..table_len {
        out.extend_from_slice(&[0, 0, 0]);
    }

    if let Ok(value) = bitmap.metadata().get("comment") {
        let bytes: &[u8] = match value {
            MetadataValue::Text(text) => text.as_bytes(),
            MetadataValue::Binary(data) => data,
            _ => &[],
        };
        if !bytes.is_empty() {
            out.push(EXTENSION_INTRODUCER);
            out.push(COMMENT_LABEL);
            write_sub_blocks(&mut out, bytes);
        }
    }

    if let Some(index) = transparent {
        out.push(EXTENSION_INTRODUCER);
        out.push(GRAPHIC_CONTROL_LABEL);
        out.push(4); // block size
        out.push(0x01); // transparent color flag
        out.extend_from_slice(&0u16.to_le_bytes()); // delay
        out.push(index as u8);
        out.push(0); // terminator
    }

    // Image descriptor: full frame, no local table, not interlaced.
    out.push(IMAGE_SEPARATOR);
    out.extend_from_slice(&0u16.to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes());
    out.extend_from_slice(&(width as u16).to_le_bytes());
    out.extend_from_slice(&(height as u16).to_le_bytes());
    out.push(0);

    let indices = unpack_indices(bitmap)?;
    let min_code_size = (size_flag + 1).max(2);
    let compressed = lzw::compress(&indices, min_code_size);
    out.push(min_code_size);
    write_sub_blocks(&mut out, &compressed);

    out.push(TRAILER);
    Ok(out)
}

/// GIF size flag n encodes a table of `2 << n` entries.
fn table_size_flag(len: usize) -> u8 {
    let mut flag = 0u8;
    while (2usize << flag) < len {
        flag += 1;
    }
    flag
}

/// One index per byte, top-down, sub-byte formats unpacked.
fn unpack_indices(bitmap: &Bitmap) -> Result<Vec<u8>, BitmapError> {
    let width = bitmap.width() as usize;
    let mut out = Vec::with_capacity(width * bitmap.height() as usize);
    for y in 0..bitmap.height() {
        for x in 0..bitmap.width() {
            out.push(bitmap.palette_index_at(x, y)?);
        }
    }
    Ok(out)
}

fn write_sub_blocks(out: &mut Vec<u8>, data: &[u8]) {
    for chunk in data.chunks(255) {
        out.push(chunk.len() as u8);
        out.extend_from_slice(chunk);
    }
    out.push(0);
}
