use alloc::vec;
use alloc::vec::Vec;

use rgb::RGBA8;

use crate::bitmap::Bitmap;
use crate::BitmapError;

/// Encode a bitmap as farbfeld. Any pixel format is accepted; samples
/// expand from 8 to 16 bits with `v * 257` so that 0 maps to 0 and 255
/// to 65535.
pub fn encode(bitmap: &Bitmap) -> Result<Vec<u8>, BitmapError> {
    let width = bitmap.width();
    let height = bitmap.height();

    let total = 16 + width as usize * height as usize * 8;
    let mut out = Vec::with_capacity(total);
    out.extend_from_slice(b"farbfeld");
    out.extend_from_slice(&width.to_be_bytes());
    out.extend_from_slice(&height.to_be_bytes());

    let mut row = vec![RGBA8::new(0, 0, 0, 0); width as usize];
    for y in 0..height {
        bitmap.row_rgba(y, &mut row)?;
        for px in &row {
            for sample in [px.r, px.g, px.b, px.a] {
                out.extend_from_slice(&(u16::from(sample) * 257).to_be_bytes());
            }
        }
    }

    Ok(out)
}
