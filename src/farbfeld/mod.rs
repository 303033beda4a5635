//! Farbfeld codec.
//!
//! Farbfeld is 16 header bytes (`farbfeld`, then big-endian width and
//! height) followed by big-endian RGBA16 pixels. Storage here is 8-bit,
//! so decoding narrows each sample to its high byte and encoding expands
//! with `v * 257`.

mod decode;
mod encode;

use crate::registry::{FormatDescriptor, FormatId};

pub use decode::decode;
pub use encode::encode;

pub(crate) const DESCRIPTOR: FormatDescriptor = FormatDescriptor {
    id: FormatId::Farbfeld,
    signatures: &[b"farbfeld"],
    extensions: &["ff"],
    decode,
    encode,
};
