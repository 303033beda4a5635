use alloc::string::String;

use crate::registry::FormatId;

/// Errors from decoding, encoding, conversion, and handle access.
///
/// Every operation in the crate is total: it returns either a valid result
/// or exactly one of these variants. No partially-decoded bitmap ever
/// escapes to the caller.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum BitmapError {
    /// No registered format matched the signature or extension.
    #[error("unknown format: no registered codec matched")]
    UnknownFormat,

    /// Structural violation: malformed header, truncated stream,
    /// checksum mismatch, or a length field contradicting the data.
    #[error("corrupt data: {0}")]
    CorruptData(String),

    /// The handle's pixel format is not representable in the target
    /// format or operation without explicit prior conversion.
    #[error("unsupported pixel format: {0}")]
    UnsupportedPixelFormat(String),

    /// Allocation would exceed the configured ceiling (or overflows).
    #[error("allocation of {requested} bytes exceeds limit {limit}")]
    OutOfMemory { requested: u64, limit: u64 },

    /// Pixel or scanline access outside the bitmap bounds.
    #[error("index ({x}, {y}) out of range for {width}x{height} bitmap")]
    IndexOutOfRange {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
    },

    /// Metadata lookup miss.
    #[error("metadata key not found: {0}")]
    KeyNotFound(String),

    /// A descriptor with this id is already registered.
    #[error("format {0:?} is already registered")]
    DuplicateFormat(FormatId),
}
