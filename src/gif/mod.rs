//! GIF codec (GIF87a/GIF89a, first frame only).
//!
//! GIF is inherently palette-based, so decoding always yields `Indexed8`
//! and the encoder only accepts indexed bitmaps. A transparent color
//! index from a graphic control extension becomes a zero-alpha palette
//! entry, and comment extensions map to the `comment` metadata key.

mod decode;
mod encode;
mod lzw;

use crate::registry::{FormatDescriptor, FormatId};

pub use decode::decode;
pub use encode::encode;

pub(crate) const DESCRIPTOR: FormatDescriptor = FormatDescriptor {
    id: FormatId::Gif,
    signatures: &[b"GIF87a", b"GIF89a"],
    extensions: &["gif"],
    decode,
    encode,
};

pub(crate) const EXTENSION_INTRODUCER: u8 = 0x21;
pub(crate) const IMAGE_SEPARATOR: u8 = 0x2C;
pub(crate) const TRAILER: u8 = 0x3B;
pub(crate) const GRAPHIC_CONTROL_LABEL: u8 = 0xF9;
pub(crate) const COMMENT_LABEL: u8 = 0xFE;
