use alloc::string::{String, ToString};
use alloc::vec;
use alloc::vec::Vec;

use rgb::RGBA8;

use crate::bitmap::Bitmap;
use crate::buffer::PixelBuffer;
use crate::limits::Limits;
use crate::metadata::{Metadata, MetadataValue};
use crate::palette::Palette;
use crate::pixel::PixelFormat;
use crate::reader::Reader;
use crate::BitmapError;

use super::lzw;
use super::{COMMENT_LABEL, EXTENSION_INTRODUCER, GRAPHIC_CONTROL_LABEL, IMAGE_SEPARATOR, TRAILER};

/// Decode the first frame of a GIF into an `Indexed8` bitmap.
///
/// The file must be well-formed through the trailer byte; a stream cut
/// off mid-way is corrupt even if the first frame already decoded.
pub fn decode(data: &[u8], limits: &Limits) -> Result<Bitmap, BitmapError> {
    let mut r = Reader::new(data);
    let signature = r.bytes(6)?;
    if signature != b"GIF87a" && signature != b"GIF89a" {
        return Err(BitmapError::CorruptData(
            "missing GIF signature".to_string(),
        ));
    }

    // Logical screen descriptor.
    let _screen_width = r.u16_le()?;
    let _screen_height = r.u16_le()?;
    let flags = r.u8()?;
    let _background_index = r.u8()?;
    let _aspect_ratio = r.u8()?;

    let global_table = if flags & 0x80 != 0 {
        Some(read_color_table(&mut r, flags & 0x07)?)
    } else {
        None
    };

    let mut transparent_index: Option<u8> = None;
    let mut comment: Option<Vec<u8>> = None;
    let mut frame: Option<Bitmap> = None;

    loop {
        match r.u8()? {
            EXTENSION_INTRODUCER => {
                let label = r.u8()?;
                match label {
                    GRAPHIC_CONTROL_LABEL => {
                        let block_size = r.u8()?;
                        if block_size != 4 {
                            return Err(BitmapError::CorruptData(alloc::format!(
                                "graphic control block of size {block_size}"
                            )));
                        }
                        let gce_flags = r.u8()?;
                        let _delay = r.u16_le()?;
                        let index = r.u8()?;
                        if r.u8()? != 0 {
                            return Err(BitmapError::CorruptData(
                                "unterminated graphic control block".to_string(),
                            ));
                        }
                        if gce_flags & 0x01 != 0 && frame.is_none() {
                            transparent_index = Some(index);
                        }
                    }
                    COMMENT_LABEL => {
                        let text = collect_sub_blocks(&mut r)?;
                        if comment.is_none() {
                            comment = Some(text);
                        }
                    }
                    _ => {
                        // Application and plain-text extensions carry
                        // nothing a still image needs.
                        skip_sub_blocks(&mut r)?;
                    }
                }
            }
            IMAGE_SEPARATOR => {
                let decoded = decode_frame(
                    &mut r,
                    global_table.as_deref(),
                    transparent_index.take(),
                    limits,
                )?;
                if frame.is_none() {
                    frame = Some(decoded);
                }
            }
            TRAILER => break,
            other => {
                return Err(BitmapError::CorruptData(alloc::format!(
                    "unknown GIF block {other:#04x}"
                )));
            }
        }
    }

    let mut bitmap = frame.ok_or_else(|| {
        BitmapError::CorruptData("GIF contains no image data".to_string())
    })?;
    if let Some(bytes) = comment {
        let value = match String::from_utf8(bytes) {
            Ok(text) => MetadataValue::Text(text),
            Err(e) => MetadataValue::Binary(e.into_bytes()),
        };
        bitmap.metadata_mut().set("comment", value);
    }
    Ok(bitmap)
}

fn read_color_table(r: &mut Reader<'_>, size_flag: u8) -> Result<Vec<RGBA8>, BitmapError> {
    let len = 2usize << size_flag;
    let raw = r.bytes(len * 3)?;
    Ok(raw
        .chunks_exact(3)
        .map(|c| RGBA8::new(c[0], c[1], c[2], 255))
        .collect())
}

fn decode_frame(
    r: &mut Reader<'_>,
    global_table: Option<&[RGBA8]>,
    transparent_index: Option<u8>,
    limits: &Limits,
) -> Result<Bitmap, BitmapError> {
    // Image descriptor.
    let _x_offset = r.u16_le()?;
    let _y_offset = r.u16_le()?;
    let width = u32::from(r.u16_le()?);
    let height = u32::from(r.u16_le()?);
    let flags = r.u8()?;
    if width == 0 || height == 0 {
        return Err(BitmapError::CorruptData(
            "GIF frame dimensions are zero".to_string(),
        ));
    }
    limits.check_dimensions(width, height)?;

    let local_table = if flags & 0x80 != 0 {
        Some(read_color_table(r, flags & 0x07)?)
    } else {
        None
    };
    let interlaced = flags & 0x40 != 0;

    let mut entries = match (local_table, global_table) {
        (Some(local), _) => local,
        (None, Some(global)) => global.to_vec(),
        (None, None) => {
            return Err(BitmapError::CorruptData(
                "GIF frame has no color table".to_string(),
            ));
        }
    };
    if let Some(idx) = transparent_index {
        if let Some(entry) = entries.get_mut(usize::from(idx)) {
            entry.a = 0;
        }
    }

    let min_code_size = r.u8()?;
    let compressed = collect_sub_blocks(r)?;
    let pixel_count = width as usize * height as usize;
    let indices = lzw::decompress(&compressed, min_code_size, pixel_count)?;

    let indices = if interlaced {
        deinterlace(&indices, width as usize, height as usize)
    } else {
        indices
    };

    let table_len = entries.len();
    let mut buffer = PixelBuffer::allocate(width, height, PixelFormat::Indexed8, limits)?;
    for y in 0..height {
        let src = &indices[y as usize * width as usize..][..width as usize];
        if let Some(&bad) = src.iter().find(|&&idx| usize::from(idx) >= table_len) {
            return Err(BitmapError::CorruptData(alloc::format!(
                "palette index {bad} out of range (color table has {table_len} entries)"
            )));
        }
        buffer.scanline_mut(y)?[..width as usize].copy_from_slice(src);
    }

    let palette = Palette::from_entries(entries, PixelFormat::Indexed8)?;
    Bitmap::from_parts(buffer, Some(palette), Metadata::new())
}

fn collect_sub_blocks(r: &mut Reader<'_>) -> Result<Vec<u8>, BitmapError> {
    let mut out = Vec::new();
    loop {
        let size = r.u8()?;
        if size == 0 {
            return Ok(out);
        }
        out.extend_from_slice(r.bytes(usize::from(size))?);
    }
}

fn skip_sub_blocks(r: &mut Reader<'_>) -> Result<(), BitmapError> {
    loop {
        let size = r.u8()?;
        if size == 0 {
            return Ok(());
        }
        r.skip(usize::from(size))?;
    }
}

/// Reorder interlaced rows (passes at strides 8/8/4/2 starting at rows
/// 0/4/2/1) into sequential order.
fn deinterlace(data: &[u8], width: usize, height: usize) -> Vec<u8> {
    let mut output = vec![0u8; width * height];
    let mut src_row = 0;
    for (start, step) in [(0, 8), (4, 8), (2, 4), (1, 2)] {
        for y in (start..height).step_by(step) {
            output[y * width..(y + 1) * width]
                .copy_from_slice(&data[src_row * width..(src_row + 1) * width]);
            src_row += 1;
        }
    }
    output
}
