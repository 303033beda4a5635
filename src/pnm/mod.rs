//! Binary PNM (netpbm) codec: P5 graymaps and P6 pixmaps with
//! `maxval <= 255`.
//!
//! Graymaps decode to `Indexed8` with a 256-entry gray-ramp palette, so
//! they survive a round trip without being promoted to truecolor.

mod decode;
mod encode;

use crate::registry::{FormatDescriptor, FormatId};

pub use decode::decode;
pub use encode::encode;

pub(crate) const DESCRIPTOR: FormatDescriptor = FormatDescriptor {
    id: FormatId::Pnm,
    signatures: &[b"P5", b"P6"],
    extensions: &["pnm", "pgm", "ppm"],
    decode,
    encode,
};
