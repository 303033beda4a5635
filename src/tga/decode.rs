use alloc::format;
use alloc::string::{String, ToString};
use alloc::vec;
use alloc::vec::Vec;

use rgb::RGBA8;

use crate::bitmap::Bitmap;
use crate::buffer::PixelBuffer;
use crate::limits::Limits;
use crate::metadata::{Metadata, MetadataValue};
use crate::palette::Palette;
use crate::pixel::{expand5, PixelFormat};
use crate::reader::Reader;
use crate::BitmapError;

#[derive(Clone, Copy, PartialEq, Eq)]
enum ImageKind {
    ColorMapped,
    TrueColor,
    Grayscale,
}

struct Header {
    kind: ImageKind,
    rle: bool,
    width: u32,
    height: u32,
    pixel_depth: u8,
    top_origin: bool,
    image_id: Vec<u8>,
    palette: Option<Vec<RGBA8>>,
}

/// Decode a TGA file.
///
/// Color-mapped images keep their palette (`Indexed8`), grayscale images
/// become `Indexed8` over a gray ramp, truecolor maps to `Rgb555`,
/// `Rgb888` or `Rgba8888` by depth.
pub fn decode(data: &[u8], limits: &Limits) -> Result<Bitmap, BitmapError> {
    let mut r = Reader::new(data);
    let header = parse_header(&mut r)?;
    limits.check_dimensions(header.width, header.height)?;

    let format = storage_format(&header)?;
    let mut buffer = PixelBuffer::allocate(header.width, header.height, format, limits)?;

    let bytes_per_pixel = usize::from(header.pixel_depth.div_ceil(8));
    let pixel_count = header.width as usize * header.height as usize;
    let raw = if header.rle {
        decode_rle(&mut r, pixel_count, bytes_per_pixel)?
    } else {
        r.bytes(pixel_count * bytes_per_pixel)?.to_vec()
    };

    fill_buffer(&header, format, &raw, bytes_per_pixel, &mut buffer)?;

    let palette = match format {
        PixelFormat::Indexed8 => Some(match header.palette {
            Some(entries) => Palette::from_entries(entries, format)?,
            None => Palette::gray_ramp(256),
        }),
        _ => None,
    };
    if let Some(pal) = &palette {
        validate_indices(&buffer, pal)?;
    }

    let mut metadata = Metadata::new();
    if !header.image_id.is_empty() {
        match String::from_utf8(header.image_id) {
            Ok(text) => metadata.set("image-id", MetadataValue::Text(text)),
            Err(e) => metadata.set("image-id", MetadataValue::Binary(e.into_bytes())),
        }
    }

    Bitmap::from_parts(buffer, palette, metadata)
}

fn parse_header(r: &mut Reader<'_>) -> Result<Header, BitmapError> {
    let id_length = r.u8()?;
    let colormap_type = r.u8()?;
    let image_type = r.u8()?;

    let (kind, rle) = match image_type {
        1 => (ImageKind::ColorMapped, false),
        2 => (ImageKind::TrueColor, false),
        3 => (ImageKind::Grayscale, false),
        9 => (ImageKind::ColorMapped, true),
        10 => (ImageKind::TrueColor, true),
        11 => (ImageKind::Grayscale, true),
        other => {
            return Err(BitmapError::CorruptData(format!(
                "unknown TGA image type {other}"
            )))
        }
    };
    if colormap_type > 1 {
        return Err(BitmapError::CorruptData(format!(
            "unknown TGA color map type {colormap_type}"
        )));
    }
    if (kind == ImageKind::ColorMapped) != (colormap_type == 1) {
        return Err(BitmapError::CorruptData(
            "TGA color map presence does not match image type".to_string(),
        ));
    }

    let first_entry = r.u16_le()?;
    let map_length = r.u16_le()?;
    let map_entry_size = r.u8()?;
    let _x_origin = r.u16_le()?;
    let _y_origin = r.u16_le()?;
    let width = u32::from(r.u16_le()?);
    let height = u32::from(r.u16_le()?);
    let pixel_depth = r.u8()?;
    let descriptor = r.u8()?;

    if width == 0 || height == 0 {
        return Err(BitmapError::CorruptData(
            "TGA dimensions are zero".to_string(),
        ));
    }
    if descriptor & 0x10 != 0 {
        return Err(BitmapError::UnsupportedPixelFormat(
            "right-to-left TGA pixel order".to_string(),
        ));
    }
    let top_origin = descriptor & 0x20 != 0;

    let image_id = r.bytes(usize::from(id_length))?.to_vec();

    let palette = if colormap_type == 1 {
        let total = usize::from(first_entry) + usize::from(map_length);
        if total > 256 || pixel_depth != 8 {
            return Err(BitmapError::UnsupportedPixelFormat(format!(
                "TGA color map of {total} entries at {pixel_depth}-bit indices"
            )));
        }
        let mut entries = vec![RGBA8::new(0, 0, 0, 255); total];
        for entry in entries.iter_mut().skip(usize::from(first_entry)) {
            *entry = read_map_entry(r, map_entry_size)?;
        }
        Some(entries)
    } else {
        None
    };

    Ok(Header {
        kind,
        rle,
        width,
        height,
        pixel_depth,
        top_origin,
        image_id,
        palette,
    })
}

fn read_map_entry(r: &mut Reader<'_>, entry_size: u8) -> Result<RGBA8, BitmapError> {
    match entry_size {
        15 | 16 => {
            let word = r.u16_le()?;
            Ok(RGBA8::new(
                expand5(((word >> 10) & 0x1F) as u8),
                expand5(((word >> 5) & 0x1F) as u8),
                expand5((word & 0x1F) as u8),
                255,
            ))
        }
        24 => {
            let [b, g, red] = r.array::<3>()?;
            Ok(RGBA8::new(red, g, b, 255))
        }
        32 => {
            let [b, g, red, a] = r.array::<4>()?;
            Ok(RGBA8::new(red, g, b, a))
        }
        other => Err(BitmapError::UnsupportedPixelFormat(format!(
            "{other}-bit TGA color map entries"
        ))),
    }
}

fn storage_format(header: &Header) -> Result<PixelFormat, BitmapError> {
    match (header.kind, header.pixel_depth) {
        (ImageKind::ColorMapped, 8) => Ok(PixelFormat::Indexed8),
        (ImageKind::Grayscale, 8) => Ok(PixelFormat::Indexed8),
        (ImageKind::TrueColor, 15 | 16) => Ok(PixelFormat::Rgb555),
        (ImageKind::TrueColor, 24) => Ok(PixelFormat::Rgb888),
        (ImageKind::TrueColor, 32) => Ok(PixelFormat::Rgba8888),
        (_, depth) => Err(BitmapError::UnsupportedPixelFormat(format!(
            "{depth}-bit TGA pixel depth"
        ))),
    }
}

/// Expand RLE packets into a flat pixel array.
///
/// High bit set: a run of `(count & 0x7F) + 1` copies of one pixel.
/// Clear: that many literal pixels follow.
fn decode_rle(
    r: &mut Reader<'_>,
    pixel_count: usize,
    bytes_per_pixel: usize,
) -> Result<Vec<u8>, BitmapError> {
    let mut out = Vec::with_capacity(pixel_count * bytes_per_pixel);
    while out.len() < pixel_count * bytes_per_pixel {
        let packet = r.u8()?;
        let count = usize::from(packet & 0x7F) + 1;
        if out.len() + count * bytes_per_pixel > pixel_count * bytes_per_pixel {
            return Err(BitmapError::CorruptData(
                "TGA RLE packet overruns image".to_string(),
            ));
        }
        if packet & 0x80 != 0 {
            let pixel = r.bytes(bytes_per_pixel)?;
            for _ in 0..count {
                out.extend_from_slice(pixel);
            }
        } else {
            out.extend_from_slice(r.bytes(count * bytes_per_pixel)?);
        }
    }
    Ok(out)
}

fn fill_buffer(
    header: &Header,
    format: PixelFormat,
    raw: &[u8],
    bytes_per_pixel: usize,
    buffer: &mut PixelBuffer,
) -> Result<(), BitmapError> {
    let width = header.width as usize;
    for i in 0..header.height {
        // Default TGA origin is bottom-left.
        let y = if header.top_origin {
            i
        } else {
            header.height - 1 - i
        };
        let src = &raw[i as usize * width * bytes_per_pixel..][..width * bytes_per_pixel];
        let dst = buffer.scanline_mut(y)?;
        match format {
            PixelFormat::Indexed8 => dst[..width].copy_from_slice(src),
            // ARGB1555 little-endian words share the X1R5G5B5 bit layout.
            PixelFormat::Rgb555 => dst[..width * 2].copy_from_slice(src),
            PixelFormat::Rgb888 => {
                for x in 0..width {
                    dst[x * 3] = src[x * 3 + 2];
                    dst[x * 3 + 1] = src[x * 3 + 1];
                    dst[x * 3 + 2] = src[x * 3];
                }
            }
            PixelFormat::Rgba8888 => {
                for x in 0..width {
                    dst[x * 4] = src[x * 4 + 2];
                    dst[x * 4 + 1] = src[x * 4 + 1];
                    dst[x * 4 + 2] = src[x * 4];
                    dst[x * 4 + 3] = src[x * 4 + 3];
                }
            }
            _ => unreachable!("storage_format never yields sub-byte formats"),
        }
    }
    Ok(())
}

fn validate_indices(buffer: &PixelBuffer, palette: &Palette) -> Result<(), BitmapError> {
    if palette.len() == 256 {
        return Ok(());
    }
    for y in 0..buffer.height() {
        let row = buffer.scanline(y)?;
        for &idx in &row[..buffer.width() as usize] {
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
