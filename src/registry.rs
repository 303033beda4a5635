use alloc::vec::Vec;

use crate::bitmap::Bitmap;
use crate::limits::Limits;
use crate::BitmapError;

/// Identifier of a built-in or registered file format.
#[non_exhaustive]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FormatId {
    Bmp,
    Png,
    Gif,
    Tga,
    Farbfeld,
    Pnm,
}

pub type DecodeFn = fn(&[u8], &Limits) -> Result<Bitmap, BitmapError>;
pub type EncodeFn = fn(&Bitmap) -> Result<Vec<u8>, BitmapError>;

/// Static description of one format plugin: how to recognize it and the
/// decode/encode entry points.
#[derive(Clone, Copy, Debug)]
pub struct FormatDescriptor {
    pub id: FormatId,
    /// Magic byte prefixes checked against the start of a stream. Formats
    /// with no reliable signature (TGA) leave this empty and are reachable
    /// only by extension or id.
    pub signatures: &'static [&'static [u8]],
    /// Lowercase file extensions, without the dot.
    pub extensions: &'static [&'static str],
    pub decode: DecodeFn,
    pub encode: EncodeFn,
}

impl FormatDescriptor {
    fn matches_signature(&self, data: &[u8]) -> bool {
        self.signatures.iter().any(|sig| data.starts_with(sig))
    }
}

/// Ordered collection of format plugins.
///
/// Detection walks the registry in registration order and stops at the
/// first signature match, so registration order is the tie-break for
/// overlapping signatures.
#[derive(Clone, Debug)]
pub struct Registry {
    formats: Vec<FormatDescriptor>,
}

impl Registry {
    /// Empty registry. Useful for callers that want full control over
    /// which formats are reachable.
    pub fn empty() -> Self {
        Self {
            formats: Vec::new(),
        }
    }

    /// Registry holding every format compiled into the crate.
    ///
    /// Signature-bearing formats come first; TGA (no signature) is last.
    pub fn builtin() -> Self {
        let mut reg = Self::empty();
        #[cfg(feature = "png")]
        reg.register(crate::png::DESCRIPTOR)
            .expect("builtin formats are distinct");
        #[cfg(feature = "bmp")]
        reg.register(crate::bmp::DESCRIPTOR)
            .expect("builtin formats are distinct");
        #[cfg(feature = "gif")]
        reg.register(crate::gif::DESCRIPTOR)
            .expect("builtin formats are distinct");
        #[cfg(feature = "farbfeld")]
        reg.register(crate::farbfeld::DESCRIPTOR)
            .expect("builtin formats are distinct");
        #[cfg(feature = "pnm")]
        reg.register(crate::pnm::DESCRIPTOR)
            .expect("builtin formats are distinct");
        #[cfg(feature = "tga")]
        reg.register(crate::tga::DESCRIPTOR)
            .expect("builtin formats are distinct");
        reg
    }

    /// Append a format. Fails with [`BitmapError::DuplicateFormat`] if the
    /// id is already registered.
    pub fn register(&mut self, descriptor: FormatDescriptor) -> Result<(), BitmapError> {
        if self.formats.iter().any(|f| f.id == descriptor.id) {
            return Err(BitmapError::DuplicateFormat(descriptor.id));
        }
        self.formats.push(descriptor);
        Ok(())
    }

    /// Identify the format of `data` by signature sniffing.
    ///
    /// First registered match wins; [`BitmapError::UnknownFormat`] if no
    /// signature matches.
    pub fn detect(&self, data: &[u8]) -> Result<&FormatDescriptor, BitmapError> {
        self.formats
            .iter()
            .find(|f| !f.signatures.is_empty() && f.matches_signature(data))
            .ok_or(BitmapError::UnknownFormat)
    }

    /// Look up a format by file extension (case-insensitive, no dot).
    pub fn by_extension(&self, ext: &str) -> Result<&FormatDescriptor, BitmapError> {
        self.formats
            .iter()
            .find(|f| f.extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
            .ok_or(BitmapError::UnknownFormat)
    }

    pub fn by_id(&self, id: FormatId) -> Result<&FormatDescriptor, BitmapError> {
        self.formats
            .iter()
            .find(|f| f.id == id)
            .ok_or(BitmapError::UnknownFormat)
    }

    /// Registered formats, in registration order.
    pub fn formats(&self) -> &[FormatDescriptor] {
        &self.formats
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::builtin()
    }
}
