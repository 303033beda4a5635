//! Truevision TGA codec.
//!
//! Decodes color-mapped (type 1/9), truecolor (type 2/10) and grayscale
//! (type 3/11) images, uncompressed or RLE-packed, with either row
//! origin. TGA has no magic signature, so the format is reachable only
//! by extension or id, never by content sniffing. The encoder writes
//! uncompressed top-left-origin files.

mod decode;
mod encode;

use crate::registry::{FormatDescriptor, FormatId};

pub use decode::decode;
pub use encode::encode;

pub(crate) const DESCRIPTOR: FormatDescriptor = FormatDescriptor {
    id: FormatId::Tga,
    signatures: &[],
    extensions: &["tga", "icb", "vda", "vst"],
    decode,
    encode,
};
