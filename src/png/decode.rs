use alloc::format;
use alloc::string::{String, ToString};
use alloc::vec::Vec;

use miniz_oxide::inflate::decompress_to_vec_zlib_with_limit;
use rgb::RGBA8;

use crate::bitmap::Bitmap;
use crate::buffer::{pack_index, PixelBuffer};
use crate::limits::Limits;
use crate::metadata::{Metadata, MetadataValue};
use crate::palette::Palette;
use crate::pixel::PixelFormat;
use crate::reader::Reader;
use crate::BitmapError;

use super::filter::{unfilter_row, FilterType};
use super::{crc32, ADAM7_PASSES, SIGNATURE};

const COLOR_GRAY: u8 = 0;
const COLOR_RGB: u8 = 2;
const COLOR_INDEXED: u8 = 3;
const COLOR_GRAY_ALPHA: u8 = 4;
const COLOR_RGBA: u8 = 6;

struct Ihdr {
    width: u32,
    height: u32,
    bit_depth: u8,
    color_type: u8,
    interlaced: bool,
}

impl Ihdr {
    fn channels(&self) -> usize {
        match self.color_type {
            COLOR_GRAY | COLOR_INDEXED => 1,
            COLOR_GRAY_ALPHA => 2,
            COLOR_RGB => 3,
            _ => 4,
        }
    }

    /// Packed bytes in a `width`-pixel filtered row.
    fn row_bytes(&self, width: usize) -> usize {
        (width * self.channels() * usize::from(self.bit_depth)).div_ceil(8)
    }

    /// Bytes per pixel for filter purposes (at least 1).
    fn filter_bpp(&self) -> usize {
        (self.channels() * usize::from(self.bit_depth)).div_ceil(8)
    }
}

/// Decode a PNG file. Every chunk's CRC is verified before its payload
/// is trusted.
pub fn decode(data: &[u8], limits: &Limits) -> Result<Bitmap, BitmapError> {
    let mut r = Reader::new(data);
    if r.bytes(8)? != &SIGNATURE {
        return Err(BitmapError::CorruptData(
            "missing PNG signature".to_string(),
        ));
    }

    let mut ihdr: Option<Ihdr> = None;
    let mut plte: Option<Vec<RGBA8>> = None;
    let mut trns: Option<Vec<u8>> = None;
    let mut idat: Vec<u8> = Vec::new();
    let mut metadata = Metadata::new();
    let mut seen_iend = false;

    while !r.is_empty() {
        let length = r.u32_be()? as usize;
        let kind: [u8; 4] = r.array()?;
        let payload = r.bytes(length)?;
        let stored_crc = r.u32_be()?;
        if crc32(&[&kind, payload]) != stored_crc {
            return Err(BitmapError::CorruptData(format!(
                "CRC mismatch in {} chunk",
                chunk_name(&kind)
            )));
        }

        match &kind {
            b"IHDR" => {
                if ihdr.is_some() {
                    return Err(BitmapError::CorruptData("duplicate IHDR".to_string()));
                }
                ihdr = Some(parse_ihdr(payload)?);
            }
            b"PLTE" => {
                if length % 3 != 0 || length == 0 {
                    return Err(BitmapError::CorruptData(format!(
                        "PLTE length {length} is not a multiple of 3"
                    )));
                }
                plte = Some(
                    payload
                        .chunks_exact(3)
                        .map(|c| RGBA8::new(c[0], c[1], c[2], 255))
                        .collect(),
                );
            }
            b"tRNS" => trns = Some(payload.to_vec()),
            b"IDAT" => idat.extend_from_slice(payload),
            b"tEXt" => parse_text(payload, &mut metadata),
            b"pHYs" => parse_phys(payload, &mut metadata)?,
            b"IEND" => {
                seen_iend = true;
                break;
            }
            other => {
                // Uppercase first letter marks a critical chunk we would
                // be wrong to skip.
                if other[0] & 0x20 == 0 {
                    return Err(BitmapError::CorruptData(format!(
                        "unsupported critical chunk {}",
                        chunk_name(other)
                    )));
                }
            }
        }
    }

    if !seen_iend {
        return Err(BitmapError::CorruptData("missing IEND chunk".to_string()));
    }
    let ihdr = ihdr.ok_or_else(|| BitmapError::CorruptData("missing IHDR chunk".to_string()))?;
    if idat.is_empty() {
        return Err(BitmapError::CorruptData("missing IDAT data".to_string()));
    }
    limits.check_dimensions(ihdr.width, ihdr.height)?;

    let (format, palette) = storage(&ihdr, plte, trns)?;

    let expected = expected_raw_size(&ihdr)?;
    limits.check_alloc(expected)?;
    let mut raw = decompress_to_vec_zlib_with_limit(&idat, expected).map_err(|e| {
        BitmapError::CorruptData(format!("zlib stream failed to inflate: {e:?}"))
    })?;
    if raw.len() != expected {
        return Err(BitmapError::CorruptData(format!(
            "decompressed {} bytes, expected {expected}",
            raw.len()
        )));
    }

    let mut buffer = PixelBuffer::allocate(ihdr.width, ihdr.height, format, limits)?;
    decode_passes(&ihdr, format, &mut raw, &mut buffer)?;

    if let Some(pal) = &palette {
        validate_indices(&buffer, pal)?;
    }
    Bitmap::from_parts(buffer, palette, metadata)
}

fn chunk_name(kind: &[u8; 4]) -> String {
    kind.iter().map(|&b| b as char).collect()
}

fn parse_ihdr(payload: &[u8]) -> Result<Ihdr, BitmapError> {
    if payload.len() != 13 {
        return Err(BitmapError::CorruptData(format!(
            "IHDR length {} instead of 13",
            payload.len()
        )));
    }
    let width = u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]);
    let height = u32::from_be_bytes([payload[4], payload[5], payload[6], payload[7]]);
    let bit_depth = payload[8];
    let color_type = payload[9];
    let compression = payload[10];
    let filter = payload[11];
    let interlace = payload[12];

    if width == 0 || height == 0 {
        return Err(BitmapError::CorruptData(
            "PNG dimensions are zero".to_string(),
        ));
    }
    if compression != 0 || filter != 0 {
        return Err(BitmapError::CorruptData(format!(
            "unknown compression/filter method {compression}/{filter}"
        )));
    }
    if interlace > 1 {
        return Err(BitmapError::CorruptData(format!(
            "unknown interlace method {interlace}"
        )));
    }
    let legal = match color_type {
        COLOR_GRAY => matches!(bit_depth, 1 | 2 | 4 | 8 | 16),
        COLOR_INDEXED => matches!(bit_depth, 1 | 2 | 4 | 8),
        COLOR_RGB | COLOR_GRAY_ALPHA | COLOR_RGBA => matches!(bit_depth, 8 | 16),
        _ => false,
    };
    if !legal {
        return Err(BitmapError::CorruptData(format!(
            "illegal color type {color_type} / bit depth {bit_depth} pair"
        )));
    }

    Ok(Ihdr {
        width,
        height,
        bit_depth,
        color_type,
        interlaced: interlace == 1,
    })
}

/// Map IHDR onto a storage format, building the palette for indexed and
/// grayscale images. A grayscale tRNS zeroes the named ramp entry's
/// alpha; truecolor tRNS is dropped because the RGB surfaces carry no
/// alpha for it to land in.
fn storage(
    ihdr: &Ihdr,
    plte: Option<Vec<RGBA8>>,
    trns: Option<Vec<u8>>,
) -> Result<(PixelFormat, Option<Palette>), BitmapError> {
    match ihdr.color_type {
        COLOR_GRAY => {
            let (format, levels) = match ihdr.bit_depth {
                1 => (PixelFormat::Indexed1, 2),
                2 => (PixelFormat::Indexed4, 4),
                4 => (PixelFormat::Indexed4, 16),
                _ => (PixelFormat::Indexed8, 256),
            };
            let mut ramp = Palette::gray_ramp(levels);
            if let Some(bytes) = trns {
                if bytes.len() != 2 {
                    return Err(BitmapError::CorruptData(format!(
                        "tRNS length {} on a grayscale image",
                        bytes.len()
                    )));
                }
                let sample = usize::from(u16::from_be_bytes([bytes[0], bytes[1]]));
                // 16-bit samples narrow to their high byte, like pixels.
                let index = if ihdr.bit_depth == 16 {
                    sample >> 8
                } else {
                    sample
                };
                if index >= levels {
                    return Err(BitmapError::CorruptData(format!(
                        "tRNS gray level {sample} exceeds bit depth {}",
                        ihdr.bit_depth
                    )));
                }
                ramp.entries_mut()[index].a = 0;
            }
            Ok((format, Some(ramp)))
        }
        COLOR_INDEXED => {
            let mut entries = plte.ok_or_else(|| {
                BitmapError::CorruptData("indexed PNG without PLTE".to_string())
            })?;
            let format = match ihdr.bit_depth {
                1 => PixelFormat::Indexed1,
                2 | 4 => PixelFormat::Indexed4,
                _ => PixelFormat::Indexed8,
            };
            if entries.len() > 1usize << ihdr.bit_depth {
                return Err(BitmapError::CorruptData(format!(
                    "PLTE of {} entries at bit depth {}",
                    entries.len(),
                    ihdr.bit_depth
                )));
            }
            if let Some(alphas) = trns {
                if alphas.len() > entries.len() {
                    return Err(BitmapError::CorruptData(format!(
                        "tRNS covers {} entries, PLTE has {}",
                        alphas.len(),
                        entries.len()
                    )));
                }
                for (entry, alpha) in entries.iter_mut().zip(alphas) {
                    entry.a = alpha;
                }
            }
            Ok((format, Some(Palette::from_entries(entries, format)?)))
        }
        COLOR_RGB => Ok((PixelFormat::Rgb888, None)),
        _ => Ok((PixelFormat::Rgba8888, None)),
    }
}

fn pass_dims(ihdr: &Ihdr, start: (usize, usize), step: (usize, usize)) -> (usize, usize) {
    let w = (ihdr.width as usize).saturating_sub(start.0).div_ceil(step.0);
    let h = (ihdr.height as usize).saturating_sub(start.1).div_ceil(step.1);
    (w, h)
}

fn expected_raw_size(ihdr: &Ihdr) -> Result<usize, BitmapError> {
    let passes: &[(usize, usize, usize, usize)] = if ihdr.interlaced {
        &ADAM7_PASSES
    } else {
        &[(0, 0, 1, 1)]
    };
    let mut total = 0u64;
    for &(sx, sy, dx, dy) in passes {
        let (w, h) = pass_dims(ihdr, (sx, sy), (dx, dy));
        if w == 0 || h == 0 {
            continue;
        }
        total = total
            .checked_add(h as u64 * (1 + ihdr.row_bytes(w) as u64))
            .ok_or(BitmapError::OutOfMemory {
                requested: u64::MAX,
                limit: u64::MAX,
            })?;
    }
    usize::try_from(total).map_err(|_| BitmapError::OutOfMemory {
        requested: total,
        limit: u64::MAX,
    })
}

fn decode_passes(
    ihdr: &Ihdr,
    format: PixelFormat,
    raw: &mut [u8],
    buffer: &mut PixelBuffer,
) -> Result<(), BitmapError> {
    let passes: &[(usize, usize, usize, usize)] = if ihdr.interlaced {
        &ADAM7_PASSES
    } else {
        &[(0, 0, 1, 1)]
    };
    let bpp = ihdr.filter_bpp();
    let mut offset = 0usize;

    for &(start_x, start_y, step_x, step_y) in passes {
        let (w, h) = pass_dims(ihdr, (start_x, start_y), (step_x, step_y));
        if w == 0 || h == 0 {
            continue;
        }
        let rb = ihdr.row_bytes(w);
        let mut prev_start: Option<usize> = None;
        for row_i in 0..h {
            let filter = FilterType::from_u8(raw[offset])?;
            let row_start = offset + 1;
            let (before, rest) = raw.split_at_mut(row_start);
            let current = &mut rest[..rb];
            let previous = prev_start.map(|s| &before[s..s + rb]);
            unfilter_row(filter, current, previous, bpp);

            let y = (start_y + row_i * step_y) as u32;
            write_pass_row(ihdr, format, current, w, start_x, step_x, buffer.scanline_mut(y)?);

            prev_start = Some(row_start);
            offset = row_start + rb;
        }
    }
    Ok(())
}

/// Place one unfiltered pass row into the destination scanline,
/// narrowing 16-bit samples to their high byte.
fn write_pass_row(
    ihdr: &Ihdr,
    format: PixelFormat,
    row: &[u8],
    w: usize,
    start_x: usize,
    step_x: usize,
    dst: &mut [u8],
) {
    let depth = usize::from(ihdr.bit_depth);
    for i in 0..w {
        let x = start_x + i * step_x;
        match ihdr.color_type {
            COLOR_GRAY | COLOR_INDEXED => {
                let value = match depth {
                    1 | 2 | 4 => {
                        let bit = i * depth;
                        (row[bit / 8] >> (8 - depth - (bit % 8))) & ((1 << depth) - 1) as u8
                    }
                    8 => row[i],
                    _ => row[i * 2],
                };
                pack_index(dst, format, x, value);
            }
            COLOR_RGB => {
                let s = if depth == 8 { 1 } else { 2 };
                dst[x * 3] = row[i * 3 * s];
                dst[x * 3 + 1] = row[(i * 3 + 1) * s];
                dst[x * 3 + 2] = row[(i * 3 + 2) * s];
            }
            COLOR_GRAY_ALPHA => {
                let s = if depth == 8 { 1 } else { 2 };
                let g = row[i * 2 * s];
                let a = row[(i * 2 + 1) * s];
                dst[x * 4..x * 4 + 4].copy_from_slice(&[g, g, g, a]);
            }
            _ => {
                let s = if depth == 8 { 1 } else { 2 };
                dst[x * 4] = row[i * 4 * s];
                dst[x * 4 + 1] = row[(i * 4 + 1) * s];
                dst[x * 4 + 2] = row[(i * 4 + 2) * s];
                dst[x * 4 + 3] = row[(i * 4 + 3) * s];
            }
        }
    }
}

fn parse_text(payload: &[u8], metadata: &mut Metadata) {
    let Some(split) = payload.iter().position(|&b| b == 0) else {
        return;
    };
    let (keyword, value) = (&payload[..split], &payload[split + 1..]);
    if keyword.is_empty() || keyword.len() > 79 {
        return;
    }
    let Ok(key) = core::str::from_utf8(keyword) else {
        return;
    };
    let value = match String::from_utf8(value.to_vec()) {
        Ok(text) => MetadataValue::Text(text),
        Err(e) => MetadataValue::Binary(e.into_bytes()),
    };
    metadata.set(key, value);
}

fn parse_phys(payload: &[u8], metadata: &mut Metadata) -> Result<(), BitmapError> {
    if payload.len() != 9 {
        return Err(BitmapError::CorruptData(format!(
            "pHYs length {} instead of 9",
            payload.len()
        )));
    }
    let x = u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]);
    let y = u32::from_be_bytes([payload[4], payload[5], payload[6], payload[7]]);
    // Unit 1 is pixels per meter; unit 0 is a bare aspect ratio, which
    // has no resolution meaning.
    if payload[8] == 1 {
        metadata.set("resolution-x", MetadataValue::Int(i64::from(x)));
        metadata.set("resolution-y", MetadataValue::Int(i64::from(y)));
    }
    Ok(())
}

fn validate_indices(buffer: &PixelBuffer, palette: &Palette) -> Result<(), BitmapError> {
    if palette.len() == buffer.format().palette_capacity() {
        return Ok(());
    }
    for y in 0..buffer.height() {
        let row = buffer.scanline(y)?;
        for x in 0..buffer.width() as usize {
            let idx = match buffer.format() {
                PixelFormat::Indexed1 => (row[x / 8] >> (7 - (x % 8))) & 0x01,
                PixelFormat::Indexed4 => (row[x / 2] >> (4 * (1 - (x % 2)))) & 0x0F,
                _ => row[x],
            };
            if usize::from(idx) >= palette.len() {
                return Err(BitmapError::CorruptData(format!(
                    "palette index {idx} out of range (palette has {} entries)",
                    palette.len()
                )));
            }
        }
    }
    Ok(())
}
