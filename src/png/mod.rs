//! PNG codec.
//!
//! Decodes all five color types at every legal bit depth (16-bit samples
//! narrow to 8), with Adam7 interlacing and per-chunk CRC verification.
//! Indexed and grayscale images stay indexed: grayscale gets a generated
//! gray-ramp palette at the matching depth, and a grayscale tRNS level
//! turns transparent through its ramp entry. The encoder writes color
//! types 2, 3 and 6; `Rgb555` has no PNG layout and is rejected.

mod decode;
mod encode;
mod filter;

use alloc::vec::Vec;

use crate::registry::{FormatDescriptor, FormatId};

pub use decode::decode;
pub use encode::encode;

pub(crate) const DESCRIPTOR: FormatDescriptor = FormatDescriptor {
    id: FormatId::Png,
    signatures: &[&SIGNATURE],
    extensions: &["png"],
    decode,
    encode,
};

pub(crate) const SIGNATURE: [u8; 8] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

/// Adam7 pass parameters: (start_x, start_y, step_x, step_y).
pub(crate) const ADAM7_PASSES: [(usize, usize, usize, usize); 7] = [
    (0, 0, 8, 8),
    (4, 0, 8, 8),
    (0, 4, 4, 8),
    (2, 0, 4, 4),
    (0, 2, 2, 4),
    (1, 0, 2, 2),
    (0, 1, 1, 2),
];

const CRC_TABLE: [u32; 256] = {
    let mut table = [0u32; 256];
    let mut n = 0;
    while n < 256 {
        let mut c = n as u32;
        let mut k = 0;
        while k < 8 {
            if c & 1 != 0 {
                c = 0xEDB8_8320 ^ (c >> 1);
            } else {
                c >>= 1;
            }
            k += 1;
        }
        table[n] = c;
        n += 1;
    }
    table
};

pub(crate) fn crc32(chunks: &[&[u8]]) -> u32 {
    let mut crc = 0xFFFF_FFFFu32;
    for data in chunks {
        for &byte in *data {
            let idx = ((crc ^ u32::from(byte)) & 0xFF) as usize;
            crc = CRC_TABLE[idx] ^ (crc >> 8);
        }
    }
    crc ^ 0xFFFF_FFFF
}

pub(crate) fn write_chunk(out: &mut Vec<u8>, kind: &[u8; 4], data: &[u8]) {
    out.extend_from_slice(&(data.len() as u32).to_be_bytes());
    out.extend_from_slice(kind);
    out.extend_from_slice(data);
    out.extend_from_slice(&crc32(&[kind, data]).to_be_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crc_matches_reference_value() {
        // CRC-32 of "IEND" as in every PNG's closing chunk.
        assert_eq!(crc32(&[b"IEND"]), 0xAE42_6082);
        assert_eq!(crc32(&[b"IE", b"ND"]), 0xAE42_6082);
    }
}
