//! Windows/OS2 BMP codec.
//!
//! Decodes OS/2 v1 (12-byte) and Windows (16..=124-byte) info headers,
//! bit depths 1/4/8/16/24/32, RLE4/RLE8 compression, and bitfield masks.
//! Palettized files stay indexed: the palette is preserved instead of
//! being expanded to truecolor. The encoder always writes an
//! uncompressed file with a 40-byte `BITMAPINFOHEADER`.

mod decode;
mod encode;

use crate::registry::{FormatDescriptor, FormatId};

pub use decode::decode;
pub use encode::encode;

pub(crate) const DESCRIPTOR: FormatDescriptor = FormatDescriptor {
    id: FormatId::Bmp,
    signatures: &[b"BM"],
    extensions: &["bmp", "dib"],
    decode,
    encode,
};
