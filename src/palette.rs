use alloc::format;
use alloc::vec::Vec;

use rgb::RGBA8;

use crate::pixel::PixelFormat;
use crate::BitmapError;

/// Ordered color table for indexed pixel formats.
///
/// At most `2^bits_per_pixel` entries. Entries carry alpha: formats that
/// cannot store palette transparency (BMP) drop it silently on encode.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Palette {
    entries: Vec<RGBA8>,
}

impl Palette {
    /// Build a palette, enforcing the capacity of the indexed format it
    /// will accompany.
    pub fn from_entries(entries: Vec<RGBA8>, format: PixelFormat) -> Result<Self, BitmapError> {
        let cap = format.palette_capacity();
        if cap == 0 {
            return Err(BitmapError::UnsupportedPixelFormat(format!(
                "{format:?} does not take a palette"
            )));
        }
        if entries.len() > cap {
            return Err(BitmapError::UnsupportedPixelFormat(format!(
                "palette of {} entries exceeds {format:?} capacity {cap}",
                entries.len()
            )));
        }
        Ok(Self { entries })
    }

    /// Opaque-black palette filling the format's full capacity.
    pub fn filled_black(format: PixelFormat) -> Result<Self, BitmapError> {
        let cap = format.palette_capacity();
        if cap == 0 {
            return Err(BitmapError::UnsupportedPixelFormat(format!(
                "{format:?} does not take a palette"
            )));
        }
        Ok(Self {
            entries: alloc::vec![RGBA8::new(0, 0, 0, 255); cap],
        })
    }

    /// Evenly spaced opaque gray ramp with `len` entries (0 -> black,
    /// last -> white). Used when mapping grayscale sources onto indexed
    /// storage.
    pub fn gray_ramp(len: usize) -> Self {
        debug_assert!((2..=256).contains(&len));
        let entries = (0..len)
            .map(|i| {
                let v = (i * 255 / (len - 1)) as u8;
                RGBA8::new(v, v, v, 255)
            })
            .collect();
        Self { entries }
    }

    /// Whether this palette is exactly the gray ramp of its own length.
    pub fn is_gray_ramp(&self) -> bool {
        self.entries.len() >= 2 && *self == Self::gray_ramp(self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: u8) -> Option<RGBA8> {
        self.entries.get(usize::from(index)).copied()
    }

    pub fn entries(&self) -> &[RGBA8] {
        &self.entries
    }

    pub fn entries_mut(&mut self) -> &mut [RGBA8] {
        &mut self.entries
    }

    /// Index of the nearest entry by squared RGBA distance.
    ///
    /// Deterministic: ties break to the lowest palette index.
    pub fn nearest(&self, color: RGBA8) -> u8 {
        let mut best_idx = 0usize;
        let mut best_dist = u32::MAX;
        for (i, entry) in self.entries.iter().enumerate() {
            let dr = i32::from(color.r) - i32::from(entry.r);
            let dg = i32::from(color.g) - i32::from(entry.g);
            let db = i32::from(color.b) - i32::from(entry.b);
            let da = i32::from(color.a) - i32::from(entry.a);
            let dist = (dr * dr + dg * dg + db * db + da * da) as u32;
            if dist < best_dist {
                best_dist = dist;
                best_idx = i;
                if dist == 0 {
                    break;
                }
            }
        }
        best_idx as u8
    }

    /// Whether any entry is not fully opaque.
    pub fn has_transparency(&self) -> bool {
        self.entries.iter().any(|e| e.a != 255)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacity_enforced() {
        let entries = alloc::vec![RGBA8::new(0, 0, 0, 255); 3];
        assert!(Palette::from_entries(entries, PixelFormat::Indexed1).is_err());
    }

    #[test]
    fn nearest_breaks_ties_to_lowest_index() {
        // Two identical entries: the first must win.
        let pal = Palette::from_entries(
            alloc::vec![
                RGBA8::new(10, 10, 10, 255),
                RGBA8::new(10, 10, 10, 255),
                RGBA8::new(200, 200, 200, 255),
            ],
            PixelFormat::Indexed8,
        )
        .unwrap();
        assert_eq!(pal.nearest(RGBA8::new(12, 12, 12, 255)), 0);
        // Equidistant between entry 0 (0) and entry 2 (20): lowest index wins.
        let pal = Palette::from_entries(
            alloc::vec![
                RGBA8::new(0, 0, 0, 255),
                RGBA8::new(100, 100, 100, 255),
                RGBA8::new(20, 20, 20, 255),
            ],
            PixelFormat::Indexed8,
        )
        .unwrap();
        assert_eq!(pal.nearest(RGBA8::new(10, 10, 10, 255)), 0);
    }

    #[test]
    fn gray_ramp_endpoints() {
        let ramp = Palette::gray_ramp(256);
        assert_eq!(ramp.get(0).unwrap(), RGBA8::new(0, 0, 0, 255));
        assert_eq!(ramp.get(255).unwrap(), RGBA8::new(255, 255, 255, 255));
        assert!(ramp.is_gray_ramp());
    }
}
