/// Resource ceilings for decode and allocation paths.
///
/// All fields default to `None` (no limit). Exceeding any ceiling is
/// reported as [`BitmapError::OutOfMemory`].
///
/// [`BitmapError::OutOfMemory`]: crate::BitmapError::OutOfMemory
#[derive(Clone, Debug, Default)]
pub struct Limits {
    pub max_width: Option<u64>,
    pub max_height: Option<u64>,
    /// Maximum pixel count (width * height).
    pub max_pixels: Option<u64>,
    /// Maximum bytes for a single pixel-buffer allocation.
    pub max_alloc_bytes: Option<u64>,
}

impl Limits {
    /// Check dimensions against the ceilings.
    pub(crate) fn check_dimensions(&self, width: u32, height: u32) -> Result<(), crate::BitmapError> {
        if let Some(max_w) = self.max_width {
            if u64::from(width) > max_w {
                return Err(crate::BitmapError::OutOfMemory {
                    requested: u64::from(width),
                    limit: max_w,
                });
            }
        }
        if let Some(max_h) = self.max_height {
            if u64::from(height) > max_h {
                return Err(crate::BitmapError::OutOfMemory {
                    requested: u64::from(height),
                    limit: max_h,
                });
            }
        }
        if let Some(max_px) = self.max_pixels {
            let pixels = u64::from(width) * u64::from(height);
            if pixels > max_px {
                return Err(crate::BitmapError::OutOfMemory {
                    requested: pixels,
                    limit: max_px,
                });
            }
        }
        Ok(())
    }

    /// Check that a single allocation stays within the byte ceiling.
    pub(crate) fn check_alloc(&self, bytes: usize) -> Result<(), crate::BitmapError> {
        if let Some(max_bytes) = self.max_alloc_bytes {
            if bytes as u64 > max_bytes {
                return Err(crate::BitmapError::OutOfMemory {
                    requested: bytes as u64,
                    limit: max_bytes,
                });
            }
        }
        Ok(())
    }
}
