use alloc::format;

use rgb::RGBA8;

use crate::buffer::PixelBuffer;
use crate::limits::Limits;
use crate::metadata::Metadata;
use crate::palette::Palette;
use crate::pixel::{expand5, PixelFormat};
use crate::BitmapError;

/// The in-memory bitmap handle: one pixel buffer, a palette iff the format
/// is indexed, and a metadata model.
///
/// A `Bitmap` exclusively owns its storage. Handles are created by a
/// decoder or [`Bitmap::new`], transformed by the conversion engine, and
/// release their memory exactly once when dropped. They are `Send` but not
/// internally synchronized: one logical owner at a time.
#[derive(Clone, Debug, PartialEq)]
pub struct Bitmap {
    buffer: PixelBuffer,
    palette: Option<Palette>,
    metadata: Metadata,
}

impl Bitmap {
    /// Allocate a zeroed bitmap. Indexed formats start with an
    /// opaque-black palette at full capacity.
    pub fn new(width: u32, height: u32, format: PixelFormat) -> Result<Self, BitmapError> {
        Self::new_with_limits(width, height, format, &Limits::default())
    }

    pub fn new_with_limits(
        width: u32,
        height: u32,
        format: PixelFormat,
        limits: &Limits,
    ) -> Result<Self, BitmapError> {
        let buffer = PixelBuffer::allocate(width, height, format, limits)?;
        let palette = if format.is_indexed() {
            Some(Palette::filled_black(format)?)
        } else {
            None
        };
        Ok(Self {
            buffer,
            palette,
            metadata: Metadata::new(),
        })
    }

    /// Assemble a handle from parts, checking the palette invariant:
    /// present iff indexed, and no longer than the format's capacity.
    pub fn from_parts(
        buffer: PixelBuffer,
        palette: Option<Palette>,
        metadata: Metadata,
    ) -> Result<Self, BitmapError> {
        let format = buffer.format();
        match (&palette, format.is_indexed()) {
            (Some(pal), true) => {
                if pal.len() > format.palette_capacity() {
                    return Err(BitmapError::UnsupportedPixelFormat(format!(
                        "palette of {} entries exceeds {format:?} capacity",
                        pal.len()
                    )));
                }
            }
            (None, false) => {}
            (Some(_), false) => {
                return Err(BitmapError::UnsupportedPixelFormat(format!(
                    "{format:?} bitmap cannot carry a palette"
                )));
            }
            (None, true) => {
                return Err(BitmapError::UnsupportedPixelFormat(format!(
                    "{format:?} bitmap requires a palette"
                )));
            }
        }
        Ok(Self {
            buffer,
            palette,
            metadata,
        })
    }

    pub fn width(&self) -> u32 {
        self.buffer.width()
    }

    pub fn height(&self) -> u32 {
        self.buffer.height()
    }

    pub fn format(&self) -> PixelFormat {
        self.buffer.format()
    }

    pub fn buffer(&self) -> &PixelBuffer {
        &self.buffer
    }

    pub fn buffer_mut(&mut self) -> &mut PixelBuffer {
        &mut self.buffer
    }

    pub fn palette(&self) -> Option<&Palette> {
        self.palette.as_ref()
    }

    pub fn palette_mut(&mut self) -> Option<&mut Palette> {
        self.palette.as_mut()
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn metadata_mut(&mut self) -> &mut Metadata {
        &mut self.metadata
    }

    /// Replace buffer and palette in one step (the conversion engine's
    /// commit). The caller guarantees the pair already satisfies the
    /// palette invariant; metadata is untouched.
    pub(crate) fn replace_storage(&mut self, buffer: PixelBuffer, palette: Option<Palette>) {
        self.buffer = buffer;
        self.palette = palette;
    }

    fn check_bounds(&self, x: u32, y: u32) -> Result<(), BitmapError> {
        if x >= self.width() || y >= self.height() {
            return Err(BitmapError::IndexOutOfRange {
                x,
                y,
                width: self.width(),
                height: self.height(),
            });
        }
        Ok(())
    }

    /// Raw palette index at (x, y). Fails with `UnsupportedPixelFormat`
    /// for truecolor bitmaps and `IndexOutOfRange` outside the bounds.
    pub fn palette_index_at(&self, x: u32, y: u32) -> Result<u8, BitmapError> {
        self.check_bounds(x, y)?;
        let row = self.buffer.scanline(y)?;
        let x = x as usize;
        match self.format() {
            PixelFormat::Indexed1 => Ok((row[x / 8] >> (7 - (x % 8))) & 0x01),
            PixelFormat::Indexed4 => Ok((row[x / 2] >> (4 * (1 - (x % 2)))) & 0x0F),
            PixelFormat::Indexed8 => Ok(row[x]),
            other => Err(BitmapError::UnsupportedPixelFormat(format!(
                "{other:?} bitmap has no palette indices"
            ))),
        }
    }

    /// Store a raw palette index at (x, y). The index must name an
    /// existing palette entry.
    pub fn set_palette_index(&mut self, x: u32, y: u32, index: u8) -> Result<(), BitmapError> {
        self.check_bounds(x, y)?;
        let pal_len = match &self.palette {
            Some(p) => p.len(),
            None => {
                return Err(BitmapError::UnsupportedPixelFormat(format!(
                    "{:?} bitmap has no palette indices",
                    self.format()
                )))
            }
        };
        if usize::from(index) >= pal_len {
            return Err(BitmapError::IndexOutOfRange {
                x: u32::from(index),
                y: 0,
                width: pal_len as u32,
                height: 1,
            });
        }
        let format = self.format();
        let row = self.buffer.scanline_mut(y)?;
        let x = x as usize;
        match format {
            PixelFormat::Indexed1 => {
                let shift = 7 - (x % 8);
                let byte = &mut row[x / 8];
                *byte = (*byte & !(1 << shift)) | ((index & 0x01) << shift);
            }
            PixelFormat::Indexed4 => {
                let shift = 4 * (1 - (x % 2));
                let byte = &mut row[x / 2];
                *byte = (*byte & !(0x0F << shift)) | ((index & 0x0F) << shift);
            }
            PixelFormat::Indexed8 => row[x] = index,
            // Unreachable: pal_len check above already rejected truecolor.
            _ => unreachable!(),
        }
        Ok(())
    }

    /// Color at (x, y). Indexed bitmaps read through the palette; 555
    /// channels are expanded by bit replication. Fails immediately with
    /// [`BitmapError::IndexOutOfRange`] outside the bounds (no clamping).
    pub fn get_pixel(&self, x: u32, y: u32) -> Result<RGBA8, BitmapError> {
        self.check_bounds(x, y)?;
        match self.format() {
            PixelFormat::Indexed1 | PixelFormat::Indexed4 | PixelFormat::Indexed8 => {
                let idx = self.palette_index_at(x, y)?;
                let pal = self.palette.as_ref().expect("indexed bitmap has palette");
                pal.get(idx).ok_or_else(|| {
                    BitmapError::CorruptData(format!(
                        "pixel ({x}, {y}) references palette entry {idx} of {}",
                        pal.len()
                    ))
                })
            }
            PixelFormat::Rgb555 => {
                let row = self.buffer.scanline(y)?;
                let off = x as usize * 2;
                let word = u16::from_le_bytes([row[off], row[off + 1]]);
                Ok(RGBA8::new(
                    expand5(((word >> 10) & 0x1F) as u8),
                    expand5(((word >> 5) & 0x1F) as u8),
                    expand5((word & 0x1F) as u8),
                    255,
                ))
            }
            PixelFormat::Rgb888 => {
                let row = self.buffer.scanline(y)?;
                let off = x as usize * 3;
                Ok(RGBA8::new(row[off], row[off + 1], row[off + 2], 255))
            }
            PixelFormat::Rgba8888 => {
                let row = self.buffer.scanline(y)?;
                let off = x as usize * 4;
                Ok(RGBA8::new(row[off], row[off + 1], row[off + 2], row[off + 3]))
            }
        }
    }

    /// Write a color at (x, y). Indexed bitmaps store the nearest palette
    /// entry; `Rgb555` truncates channels to 5 bits; `Rgb888` drops alpha.
    pub fn set_pixel(&mut self, x: u32, y: u32, color: RGBA8) -> Result<(), BitmapError> {
        self.check_bounds(x, y)?;
        match self.format() {
            PixelFormat::Indexed1 | PixelFormat::Indexed4 | PixelFormat::Indexed8 => {
                let idx = self
                    .palette
                    .as_ref()
                    .expect("indexed bitmap has palette")
                    .nearest(color);
                self.set_palette_index(x, y, idx)
            }
            PixelFormat::Rgb555 => {
                let word = (u16::from(color.r >> 3) << 10)
                    | (u16::from(color.g >> 3) << 5)
                    | u16::from(color.b >> 3);
                let row = self.buffer.scanline_mut(y)?;
                let off = x as usize * 2;
                row[off..off + 2].copy_from_slice(&word.to_le_bytes());
                Ok(())
            }
            PixelFormat::Rgb888 => {
                let row = self.buffer.scanline_mut(y)?;
                let off = x as usize * 3;
                row[off] = color.r;
                row[off + 1] = color.g;
                row[off + 2] = color.b;
                Ok(())
            }
            PixelFormat::Rgba8888 => {
                let row = self.buffer.scanline_mut(y)?;
                let off = x as usize * 4;
                row[off] = color.r;
                row[off + 1] = color.g;
                row[off + 2] = color.b;
                row[off + 3] = color.a;
                Ok(())
            }
        }
    }

    /// Fill `out` (length == width) with row `y` expanded to RGBA.
    pub(crate) fn row_rgba(&self, y: u32, out: &mut [RGBA8]) -> Result<(), BitmapError> {
        debug_assert_eq!(out.len(), self.width() as usize);
        let row = self.buffer.scanline(y)?;
        match self.format() {
            PixelFormat::Indexed1 | PixelFormat::Indexed4 | PixelFormat::Indexed8 => {
                let pal = self.palette.as_ref().expect("indexed bitmap has palette");
                let bpp = self.format().bits_per_pixel() as usize;
                for (x, slot) in out.iter_mut().enumerate() {
                    let idx = match bpp {
                        1 => (row[x / 8] >> (7 - (x % 8))) & 0x01,
                        4 => (row[x / 2] >> (4 * (1 - (x % 2)))) & 0x0F,
                        _ => row[x],
                    };
                    *slot = pal.get(idx).ok_or_else(|| {
                        BitmapError::CorruptData(format!(
                            "pixel ({x}, {y}) references palette entry {idx} of {}",
                            pal.len()
                        ))
                    })?;
                }
                Ok(())
            }
            PixelFormat::Rgb555 => {
                for (x, slot) in out.iter_mut().enumerate() {
                    let off = x * 2;
                    let word = u16::from_le_bytes([row[off], row[off + 1]]);
                    *slot = RGBA8::new(
                        expand5(((word >> 10) & 0x1F) as u8),
                        expand5(((word >> 5) & 0x1F) as u8),
                        expand5((word & 0x1F) as u8),
                        255,
                    );
                }
                Ok(())
            }
            PixelFormat::Rgb888 => {
                for (x, slot) in out.iter_mut().enumerate() {
                    let off = x * 3;
                    *slot = RGBA8::new(row[off], row[off + 1], row[off + 2], 255);
                }
                Ok(())
            }
            PixelFormat::Rgba8888 => {
                for (x, slot) in out.iter_mut().enumerate() {
                    let off = x * 4;
                    *slot = RGBA8::new(row[off], row[off + 1], row[off + 2], row[off + 3]);
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    #[test]
    fn pixel_roundtrip_truecolor() {
        let mut bmp = Bitmap::new(2, 2, PixelFormat::Rgba8888).unwrap();
        let c = RGBA8::new(1, 2, 3, 4);
        bmp.set_pixel(1, 0, c).unwrap();
        assert_eq!(bmp.get_pixel(1, 0).unwrap(), c);
        assert_eq!(bmp.get_pixel(0, 0).unwrap(), RGBA8::new(0, 0, 0, 0));
    }

    #[test]
    fn pixel_bounds_fail_fast() {
        let bmp = Bitmap::new(3, 2, PixelFormat::Rgb888).unwrap();
        assert!(matches!(
            bmp.get_pixel(3, 0),
            Err(BitmapError::IndexOutOfRange { x: 3, .. })
        ));
        assert!(matches!(
            bmp.get_pixel(0, 2),
            Err(BitmapError::IndexOutOfRange { y: 2, .. })
        ));
    }

    #[test]
    fn indexed_set_pixel_maps_to_nearest() {
        let mut bmp = Bitmap::new(2, 1, PixelFormat::Indexed4).unwrap();
        let pal = Palette::from_entries(
            vec![RGBA8::new(0, 0, 0, 255), RGBA8::new(255, 0, 0, 255)],
            PixelFormat::Indexed4,
        )
        .unwrap();
        bmp.replace_storage(
            PixelBuffer::allocate(2, 1, PixelFormat::Indexed4, &Limits::default()).unwrap(),
            Some(pal),
        );
        bmp.set_pixel(0, 0, RGBA8::new(250, 10, 10, 255)).unwrap();
        assert_eq!(bmp.palette_index_at(0, 0).unwrap(), 1);
        assert_eq!(bmp.get_pixel(0, 0).unwrap(), RGBA8::new(255, 0, 0, 255));
    }

    #[test]
    fn sub_byte_index_packing() {
        let mut bmp = Bitmap::new(10, 1, PixelFormat::Indexed1).unwrap();
        bmp.set_palette_index(0, 0, 1).unwrap();
        bmp.set_palette_index(9, 0, 1).unwrap();
        assert_eq!(bmp.palette_index_at(0, 0).unwrap(), 1);
        assert_eq!(bmp.palette_index_at(1, 0).unwrap(), 0);
        assert_eq!(bmp.palette_index_at(9, 0).unwrap(), 1);
        // MSB-first packing: pixel 0 is the top bit of byte 0.
        assert_eq!(bmp.buffer().scanline(0).unwrap()[0], 0b1000_0000);
    }

    #[test]
    fn from_parts_enforces_palette_invariant() {
        let buf = PixelBuffer::allocate(1, 1, PixelFormat::Rgb888, &Limits::default()).unwrap();
        let pal = Palette::gray_ramp(2);
        assert!(Bitmap::from_parts(buf, Some(pal), Metadata::new()).is_err());

        let buf = PixelBuffer::allocate(1, 1, PixelFormat::Indexed8, &Limits::default()).unwrap();
        assert!(Bitmap::from_parts(buf, None, Metadata::new()).is_err());
    }
}
