use alloc::format;
use alloc::string::ToString;
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

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Compression {
    Rgb,
    Rle8,
    Rle4,
    Bitfields,
}

impl Compression {
    fn from_u32(num: u32) -> Result<Self, BitmapError> {
        match num {
            0 => Ok(Self::Rgb),
            1 => Ok(Self::Rle8),
            2 => Ok(Self::Rle4),
            3 | 6 => Ok(Self::Bitfields), // 6 = BI_ALPHABITFIELDS
            other => Err(BitmapError::CorruptData(format!(
                "unsupported BMP compression scheme {other}"
            ))),
        }
    }
}

struct Header {
    width: u32,
    height: u32,
    top_down: bool,
    bpp: u16,
    compression: Compression,
    bitfields: [u32; 4],
    palette: Vec<RGBA8>,
    pixel_offset: usize,
    resolution: Option<(i32, i32)>,
}

/// Decode a BMP file into a bitmap.
pub fn decode(data: &[u8], limits: &Limits) -> Result<Bitmap, BitmapError> {
    let header = parse_header(data)?;
    limits.check_dimensions(header.width, header.height)?;

    let format = storage_format(&header)?;
    let mut buffer = PixelBuffer::allocate(header.width, header.height, format, limits)?;

    let mut pixels = Reader::new(data);
    pixels.seek(header.pixel_offset)?;
    match header.compression {
        Compression::Rle4 | Compression::Rle8 => {
            decode_rle(&header, &mut pixels, &mut buffer)?;
        }
        Compression::Rgb | Compression::Bitfields => {
            decode_uncompressed(&header, format, &mut pixels, &mut buffer)?;
        }
    }

    let palette = if format.is_indexed() {
        validate_indices(&header, &buffer)?;
        Some(Palette::from_entries(header.palette, format)?)
    } else {
        None
    };

    let mut metadata = Metadata::new();
    if let Some((x, y)) = header.resolution {
        metadata.set("resolution-x", MetadataValue::Int(i64::from(x)));
        metadata.set("resolution-y", MetadataValue::Int(i64::from(y)));
    }

    Bitmap::from_parts(buffer, palette, metadata)
}

fn parse_header(data: &[u8]) -> Result<Header, BitmapError> {
    let mut r = Reader::new(data);

    if r.bytes(2)? != b"BM" {
        return Err(BitmapError::CorruptData("missing BM signature".to_string()));
    }
    let _file_size = r.u32_le()?;
    r.skip(4)?; // reserved
    let pixel_offset = r.u32_le()? as usize;
    let ihsize = r.u32_le()?;

    let (width_raw, height_raw, planes, bpp);
    let mut compression = Compression::Rgb;
    let mut has_alpha_mask = false;
    let mut bitfields = [0u32; 4];
    let mut resolution = None;
    let mut colors_used = 0u32;

    match ihsize {
        12 => {
            // OS/2 BMPv1
            width_raw = u32::from(r.u16_le()?);
            height_raw = u32::from(r.u16_le()?);
            planes = r.u16_le()?;
            bpp = r.u16_le()?;
        }
        16 | 40 | 52 | 56 | 64 | 108 | 124 => {
            width_raw = r.u32_le()?;
            height_raw = r.u32_le()?;
            planes = r.u16_le()?;
            bpp = r.u16_le()?;
            if ihsize >= 40 {
                let raw = r.u32_le()?;
                compression = Compression::from_u32(raw)?;
                has_alpha_mask = raw == 6;
            }
            if ihsize > 16 {
                let _image_size = r.u32_le()?;
                let res_x = r.u32_le()? as i32;
                let res_y = r.u32_le()? as i32;
                if res_x < 0 || res_y < 0 {
                    return Err(BitmapError::CorruptData(format!(
                        "negative BMP resolution {res_x}x{res_y}"
                    )));
                }
                if res_x != 0 || res_y != 0 {
                    resolution = Some((res_x, res_y));
                }
                colors_used = r.u32_le()?;
                let _important = r.u32_le()?;

                // Masks live in the header for v2+ (ihsize >= 52), or
                // directly after a 40-byte header with BI_BITFIELDS;
                // BI_ALPHABITFIELDS appends a fourth mask there.
                if ihsize >= 52 || compression == Compression::Bitfields {
                    bitfields[0] = r.u32_le()?;
                    bitfields[1] = r.u32_le()?;
                    bitfields[2] = r.u32_le()?;
                }
                if ihsize > 52 || has_alpha_mask {
                    bitfields[3] = r.u32_le()?;
                }
            }
        }
        other => {
            return Err(BitmapError::CorruptData(format!(
                "unknown BMP info header size {other}"
            )));
        }
    }

    if planes != 1 {
        return Err(BitmapError::CorruptData(format!(
            "BMP planes field is {planes}, expected 1"
        )));
    }
    let top_down = (height_raw as i32) < 0;
    let height = (height_raw as i32).unsigned_abs();
    let width = width_raw;
    if width == 0 || height == 0 {
        return Err(BitmapError::CorruptData(
            "BMP dimensions are zero".to_string(),
        ));
    }
    if top_down && matches!(compression, Compression::Rle4 | Compression::Rle8) {
        return Err(BitmapError::CorruptData(
            "RLE compression with top-down row order".to_string(),
        ));
    }
    match (compression, bpp) {
        (Compression::Rle4, b) if b != 4 => {
            return Err(BitmapError::CorruptData(format!("RLE4 with {b}-bit depth")))
        }
        (Compression::Rle8, b) if b != 8 => {
            return Err(BitmapError::CorruptData(format!("RLE8 with {b}-bit depth")))
        }
        (Compression::Bitfields, b) if b != 16 && b != 32 => {
            return Err(BitmapError::CorruptData(format!(
                "bitfields with {b}-bit depth"
            )))
        }
        _ => {}
    }

    let palette = if bpp <= 8 {
        read_palette(&mut r, ihsize, bpp, colors_used, pixel_offset)?
    } else {
        Vec::new()
    };

    if pixel_offset < r.position() || pixel_offset > data.len() {
        return Err(BitmapError::CorruptData(format!(
            "BMP pixel data offset {pixel_offset} out of range"
        )));
    }

    Ok(Header {
        width,
        height,
        top_down,
        bpp,
        compression,
        bitfields,
        palette,
        pixel_offset,
        resolution,
    })
}

fn read_palette(
    r: &mut Reader<'_>,
    ihsize: u32,
    bpp: u16,
    colors_used: u32,
    pixel_offset: usize,
) -> Result<Vec<RGBA8>, BitmapError> {
    let capacity = 1u32 << bpp;
    if colors_used > capacity {
        return Err(BitmapError::CorruptData(format!(
            "BMP palette count {colors_used} exceeds {bpp}-bit capacity {capacity}"
        )));
    }
    // OS/2 palettes pack 3 bytes per entry, Windows palettes 4.
    let entry_size = if ihsize == 12 { 3 } else { 4 };
    let room = pixel_offset.saturating_sub(r.position()) / entry_size;
    let colors = if colors_used != 0 {
        colors_used as usize
    } else {
        (capacity as usize).min(room)
    };
    if colors == 0 || colors > room {
        return Err(BitmapError::CorruptData(format!(
            "BMP palette of {colors} entries does not fit before pixel data"
        )));
    }
    let mut palette = Vec::with_capacity(colors);
    for _ in 0..colors {
        // Entries are B, G, R(, reserved); palette alpha is not a BMP
        // concept, so entries come out opaque.
        if entry_size == 3 {
            let [b, g, red] = r.array::<3>()?;
            palette.push(RGBA8::new(red, g, b, 255));
        } else {
            let [b, g, red, _] = r.array::<4>()?;
            palette.push(RGBA8::new(red, g, b, 255));
        }
    }
    Ok(palette)
}

fn storage_format(header: &Header) -> Result<PixelFormat, BitmapError> {
    match header.bpp {
        1 => Ok(PixelFormat::Indexed1),
        4 => Ok(PixelFormat::Indexed4),
        8 => Ok(PixelFormat::Indexed8),
        16 => {
            if is_plain_555(header) {
                Ok(PixelFormat::Rgb555)
            } else if header.bitfields[3] != 0 {
                Ok(PixelFormat::Rgba8888)
            } else {
                Ok(PixelFormat::Rgb888)
            }
        }
        24 => Ok(PixelFormat::Rgb888),
        32 => Ok(PixelFormat::Rgba8888),
        other => Err(BitmapError::UnsupportedPixelFormat(format!(
            "{other}-bit BMP"
        ))),
    }
}

/// Whether a 16-bit file is stock X1R5G5B5 (no masks, or masks spelling
/// exactly 5-5-5), which maps byte-for-byte onto `Rgb555` storage.
fn is_plain_555(header: &Header) -> bool {
    header.compression == Compression::Rgb
        || (header.bitfields[..3] == [0x7C00, 0x03E0, 0x001F] && header.bitfields[3] == 0)
}

fn decode_uncompressed(
    header: &Header,
    format: PixelFormat,
    r: &mut Reader<'_>,
    buffer: &mut PixelBuffer,
) -> Result<(), BitmapError> {
    let width = header.width as usize;
    // BMP rows are 4-byte aligned, the same as buffer rows.
    let in_stride = (width * usize::from(header.bpp)).div_ceil(8).div_ceil(4) * 4;

    for i in 0..header.height {
        let y = if header.top_down {
            i
        } else {
            header.height - 1 - i
        };
        let src = r.bytes(in_stride)?;
        let dst = buffer.scanline_mut(y)?;
        match header.bpp {
            // Sub-byte and 8-bit indexed rows are MSB-first packed, which
            // is the buffer's own layout.
            1 | 4 | 8 => dst.copy_from_slice(src),
            16 => {
                if format == PixelFormat::Rgb555 {
                    dst[..width * 2].copy_from_slice(&src[..width * 2]);
                } else {
                    unpack_bitfield_row(header, format, src, dst, 2);
                }
            }
            24 => {
                for x in 0..width {
                    dst[x * 3] = src[x * 3 + 2];
                    dst[x * 3 + 1] = src[x * 3 + 1];
                    dst[x * 3 + 2] = src[x * 3];
                }
            }
            32 => {
                if header.compression == Compression::Bitfields {
                    unpack_bitfield_row(header, format, src, dst, 4);
                } else {
                    for x in 0..width {
                        dst[x * 4] = src[x * 4 + 2];
                        dst[x * 4 + 1] = src[x * 4 + 1];
                        dst[x * 4 + 2] = src[x * 4];
                        dst[x * 4 + 3] = src[x * 4 + 3];
                    }
                }
            }
            _ => unreachable!("storage_format rejected this depth"),
        }
    }
    Ok(())
}

// Bitfield scale tables: multiply an n-bit value into 8 bits.
const MUL_TABLE: [u32; 9] = [0, 0xff, 0x55, 0x49, 0x11, 0x21, 0x41, 0x81, 0x01];
const SHIFT_TABLE: [i32; 9] = [0, 0, 0, 1, 0, 2, 4, 6, 0];

fn shift_signed(mut v: u32, shift: i32, mut bits: u32) -> u32 {
    if shift < 0 {
        v <<= -shift;
    } else {
        v >>= shift;
    }
    bits = bits.clamp(0, 8);
    v >>= 8 - bits;
    (v.wrapping_mul(MUL_TABLE[bits as usize])) >> SHIFT_TABLE[bits as usize]
}

fn unpack_bitfield_row(
    header: &Header,
    format: PixelFormat,
    src: &[u8],
    dst: &mut [u8],
    in_bytes: usize,
) {
    let [mr, mg, mb, ma] = header.bitfields;
    let rshift = (32u32.wrapping_sub(mr.leading_zeros())).wrapping_sub(8) as i32;
    let gshift = (32u32.wrapping_sub(mg.leading_zeros())).wrapping_sub(8) as i32;
    let bshift = (32u32.wrapping_sub(mb.leading_zeros())).wrapping_sub(8) as i32;
    let ashift = (32u32.wrapping_sub(ma.leading_zeros())).wrapping_sub(8) as i32;

    let out_bytes = usize::from(format.bits_per_pixel()) / 8;
    for x in 0..header.width as usize {
        let v = if in_bytes == 2 {
            u32::from(u16::from_le_bytes([src[x * 2], src[x * 2 + 1]]))
        } else {
            u32::from_le_bytes([src[x * 4], src[x * 4 + 1], src[x * 4 + 2], src[x * 4 + 3]])
        };
        let out = &mut dst[x * out_bytes..(x + 1) * out_bytes];
        out[0] = shift_signed(v & mr, rshift, mr.count_ones()) as u8;
        out[1] = shift_signed(v & mg, gshift, mg.count_ones()) as u8;
        out[2] = shift_signed(v & mb, bshift, mb.count_ones()) as u8;
        if out_bytes == 4 {
            out[3] = if ma == 0 {
                255
            } else {
                shift_signed(v & ma, ashift, ma.count_ones()) as u8
            };
        }
    }
}

/// Decode RLE4/RLE8 into one index per byte (top-down), then pack into
/// the buffer's row layout.
fn decode_rle(
    header: &Header,
    r: &mut Reader<'_>,
    buffer: &mut PixelBuffer,
) -> Result<(), BitmapError> {
    let width = header.width as usize;
    let height = header.height as usize;
    let mut indices = vec![0u8; width * height];
    // RLE streams start at the bottom-left of the image.
    let mut line = height as i32 - 1;
    let mut pos = 0usize;
    let four_bit = header.compression == Compression::Rle4;

    loop {
        let count = r.u8()?;
        if count == 0 {
            let code = r.u8()?;
            match code {
                0 => {
                    // End of line. Encoders commonly emit one after the
                    // final (top) row too, directly before the
                    // end-of-bitmap marker; anything else past the last
                    // row is corrupt.
                    line -= 1;
                    pos = 0;
                    if line < 0 {
                        if r.array::<2>()? == [0x00, 0x01] {
                            break;
                        }
                        return Err(BitmapError::CorruptData(
                            "RLE line underflow".to_string(),
                        ));
                    }
                }
                1 => break, // end of bitmap
                2 => {
                    let dx = r.u8()?;
                    let dy = r.u8()?;
                    pos += usize::from(dx);
                    line -= i32::from(dy);
                    if line < 0 || pos > width {
                        return Err(BitmapError::CorruptData(
                            "RLE delta out of bounds".to_string(),
                        ));
                    }
                }
                n => {
                    // Absolute mode: n literal indices, padded to a
                    // 16-bit boundary in the stream.
                    let n = usize::from(n);
                    if pos + n > width {
                        return Err(BitmapError::CorruptData(
                            "RLE absolute run past row end".to_string(),
                        ));
                    }
                    let row_start = line as usize * width;
                    if four_bit {
                        let stream_bytes = n.div_ceil(2);
                        let src = r.bytes(stream_bytes)?;
                        for (i, slot) in indices[row_start + pos..row_start + pos + n]
                            .iter_mut()
                            .enumerate()
                        {
                            let byte = src[i / 2];
                            *slot = if i % 2 == 0 { byte >> 4 } else { byte & 0x0F };
                        }
                        if stream_bytes % 2 == 1 {
                            r.skip(1)?;
                        }
                    } else {
                        r.read_into(&mut indices[row_start + pos..row_start + pos + n])?;
                        if n % 2 == 1 {
                            r.skip(1)?;
                        }
                    }
                    pos += n;
                }
            }
        } else {
            let n = usize::from(count);
            if pos + n > width {
                return Err(BitmapError::CorruptData(
                    "RLE run past row end".to_string(),
                ));
            }
            let value = r.u8()?;
            let row_start = line as usize * width;
            if four_bit {
                for (i, slot) in indices[row_start + pos..row_start + pos + n]
                    .iter_mut()
                    .enumerate()
                {
                    *slot = if i % 2 == 0 { value >> 4 } else { value & 0x0F };
                }
            } else {
                indices[row_start + pos..row_start + pos + n].fill(value);
            }
            pos += n;
        }
    }

    for y in 0..header.height {
        let row = &indices[y as usize * width..(y as usize + 1) * width];
        let dst = buffer.scanline_mut(y)?;
        if four_bit {
            for (x, &idx) in row.iter().enumerate() {
                let shift = 4 * (1 - (x % 2));
                dst[x / 2] |= (idx & 0x0F) << shift;
            }
        } else {
            dst[..width].copy_from_slice(row);
        }
    }
    Ok(())
}

/// Every stored index must name an existing palette entry.
fn validate_indices(header: &Header, buffer: &PixelBuffer) -> Result<(), BitmapError> {
    let colors = header.palette.len();
    if colors == 1usize << header.bpp {
        return Ok(()); // full-capacity palette, any index is valid
    }
    let width = header.width as usize;
    for y in 0..header.height {
        let row = buffer.scanline(y)?;
        for x in 0..width {
            let idx = match header.bpp {
                1 => (row[x / 8] >> (7 - (x % 8))) & 0x01,
                4 => (row[x / 2] >> (4 * (1 - (x % 2)))) & 0x0F,
                _ => row[x],
            };
            if usize::from(idx) >= colors {
                return Err(BitmapError::CorruptData(format!(
                    "palette index {idx} out of range (palette has {colors} entries)"
                )));
            }
        }
    }
    Ok(())
}
