//! # dibkit
//!
//! Multi-format bitmap codec engine with a palette-aware pixel model.
//!
//! Every decoder produces the same in-memory shape: a [`Bitmap`] owning a
//! stride-aligned [`PixelBuffer`], an optional [`Palette`] (mandatory for
//! indexed formats), and a [`Metadata`] tag map. Encoders take that shape
//! back out, so any decoded image can be re-encoded in any format the
//! target's pixel model allows — and [`convert`] bridges the gaps, with
//! optional ordered or error-diffusion dithering.
//!
//! ## Supported formats
//!
//! - **BMP** (`bmp` feature) — 1/4/8/16/24/32-bit, RLE4/RLE8, bitfields,
//!   OS/2 and Windows headers
//! - **PNG** (`png` feature) — all five color types, 1–16 bit, Adam7,
//!   tEXt and pHYs
//! - **GIF** (`gif` feature) — 87a/89a, first frame, transparency, comments
//! - **TGA** (`tga` feature) — color-mapped, truecolor, grayscale, RLE
//! - **PNM** (`pnm` feature) — binary P5/P6, maxval ≤ 255
//! - **farbfeld** (`farbfeld` feature) — 16-bit RGBA, narrowed to 8
//!
//! Indexed images stay indexed: decoding an 8-bit paletted BMP gives you
//! the original indices and color table, not a flattened RGBA copy.
//!
//! ## Non-goals
//!
//! - Animation (GIF and PNG decode to their first/only frame)
//! - Color management and ICC profiles
//! - Scaling, cropping, or any geometry transform
//!
//! ## Usage
//!
//! ```no_run
//! use dibkit::{load, save, convert, DitherMode, FormatId, PixelFormat};
//!
//! let data: &[u8] = &[]; // your BMP/PNG/GIF/TGA/PNM/farbfeld bytes
//!
//! // Sniff the format and decode in one step.
//! let bitmap = load(data)?;
//! println!("{}x{} {:?}", bitmap.width(), bitmap.height(), bitmap.format());
//!
//! // Quantize to a 16-color image with Floyd-Steinberg dithering,
//! // then write it back out as a BMP.
//! let indexed = convert(&bitmap, PixelFormat::Indexed4, DitherMode::ErrorDiffusion)?;
//! let bmp = save(&indexed, FormatId::Bmp)?;
//! # let _ = bmp;
//! # Ok::<(), dibkit::BitmapError>(())
//! ```

#![cfg_attr(not(feature = "std"), no_std)]
#![forbid(unsafe_code)]

extern crate alloc;

mod bitmap;
mod buffer;
mod convert;
mod error;
mod limits;
mod metadata;
mod palette;
mod pixel;
mod reader;
mod registry;

#[cfg(feature = "bmp")]
pub mod bmp;

#[cfg(feature = "farbfeld")]
pub mod farbfeld;

#[cfg(feature = "gif")]
pub mod gif;

#[cfg(feature = "png")]
pub mod png;

#[cfg(feature = "pnm")]
pub mod pnm;

#[cfg(feature = "tga")]
pub mod tga;

use alloc::vec::Vec;

// Re-exports
pub use bitmap::Bitmap;
pub use buffer::PixelBuffer;
pub use convert::{build_palette, convert, convert_with_palette, DitherMode};
pub use error::BitmapError;
pub use limits::Limits;
pub use metadata::{Metadata, MetadataValue};
pub use palette::Palette;
pub use pixel::{ColorModel, PixelFormat};
pub use registry::{DecodeFn, EncodeFn, FormatDescriptor, FormatId, Registry};
pub use rgb::RGBA8;

/// Sniff the format of `data` against the built-in registry and decode it
/// with default [`Limits`].
pub fn load(data: &[u8]) -> Result<Bitmap, BitmapError> {
    load_with_limits(data, &Limits::default())
}

/// Like [`load`], with caller-supplied resource ceilings.
pub fn load_with_limits(data: &[u8], limits: &Limits) -> Result<Bitmap, BitmapError> {
    let registry = Registry::builtin();
    let descriptor = registry.detect(data)?;
    (descriptor.decode)(data, limits)
}

/// Encode `bitmap` in the given format using the built-in registry.
///
/// Fails with [`BitmapError::UnknownFormat`] when the format's feature is
/// not compiled in.
pub fn save(bitmap: &Bitmap, format: FormatId) -> Result<Vec<u8>, BitmapError> {
    let registry = Registry::builtin();
    let descriptor = registry.by_id(format)?;
    (descriptor.encode)(bitmap)
}
