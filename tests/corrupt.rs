//! Hostile-input behavior: truncation, checksum damage, bad signatures,
//! and out-of-range palette references must all surface as typed errors,
//! never as panics or partial bitmaps. Plus hand-built stream layouts
//! the encoders never emit but the decoders must handle.

use dibkit::*;

/// An Indexed8 gray-ramp bitmap every encoder accepts.
fn gray_sample() -> Bitmap {
    let palette = Palette::gray_ramp(256);
    let buffer = PixelBuffer::allocate(4, 3, PixelFormat::Indexed8, &Limits::default()).unwrap();
    let mut bmp = Bitmap::from_parts(buffer, Some(palette), Metadata::new()).unwrap();
    for y in 0..3 {
        for x in 0..4 {
            bmp.set_palette_index(x, y, (x * 64 + y * 16) as u8).unwrap();
        }
    }
    bmp
}

#[test]
fn truncation_is_corrupt_data_for_every_format() {
    let sample = gray_sample();
    for descriptor in Registry::builtin().formats() {
        let encoded = (descriptor.encode)(&sample).unwrap();
        let truncated = &encoded[..encoded.len() - 1];
        let result = (descriptor.decode)(truncated, &Limits::default());
        assert!(
            matches!(result, Err(BitmapError::CorruptData(_))),
            "{:?}: {result:?}",
            descriptor.id
        );
    }
}

#[test]
fn unknown_bytes_are_unknown_format() {
    assert!(matches!(load(&[0u8; 64]), Err(BitmapError::UnknownFormat)));
    assert!(matches!(load(&[]), Err(BitmapError::UnknownFormat)));
}

#[test]
fn png_crc_damage_is_detected() {
    let encoded = save(&gray_sample(), FormatId::Png).unwrap();
    let mut damaged = encoded.clone();
    // Flip one bit inside the IHDR payload (signature 8 + length 4 + kind 4).
    damaged[16] ^= 0x01;
    let err = load(&damaged).unwrap_err();
    assert!(matches!(err, BitmapError::CorruptData(_)), "{err:?}");
}

#[test]
fn gif_missing_trailer_is_corrupt() {
    let mut encoded = save(&gray_sample(), FormatId::Gif).unwrap();
    assert_eq!(encoded.pop(), Some(0x3B));
    assert!(matches!(
        load(&encoded),
        Err(BitmapError::CorruptData(_))
    ));
}

#[test]
fn bmp_palette_index_out_of_range_is_corrupt() {
    let palette = Palette::from_entries(
        vec![RGBA8::new(0, 0, 0, 255), RGBA8::new(255, 255, 255, 255)],
        PixelFormat::Indexed8,
    )
    .unwrap();
    let buffer = PixelBuffer::allocate(4, 1, PixelFormat::Indexed8, &Limits::default()).unwrap();
    let bmp = Bitmap::from_parts(buffer, Some(palette), Metadata::new()).unwrap();
    let mut encoded = save(&bmp, FormatId::Bmp).unwrap();
    // Pixel data starts after the 54-byte headers and two palette entries.
    let pixel_offset = 54 + 2 * 4;
    encoded[pixel_offset] = 5;
    assert!(matches!(
        load(&encoded),
        Err(BitmapError::CorruptData(_))
    ));
}

#[test]
fn bmp_rle_run_past_row_end_is_corrupt() {
    let bmp = gray_sample();
    let mut encoded = save(&bmp, FormatId::Bmp).unwrap();
    // Rewrite the header as RLE8 and replace the pixel data with a run
    // that overflows the 4-pixel row.
    encoded[30..34].copy_from_slice(&1u32.to_le_bytes());
    let pixel_offset = 54 + 256 * 4;
    encoded.truncate(pixel_offset);
    encoded.extend_from_slice(&[0xFF, 0x00, 0x00, 0x01]);
    assert!(matches!(
        load(&encoded),
        Err(BitmapError::CorruptData(_))
    ));
}

#[test]
fn pnm_maxval_above_255_is_unsupported() {
    let encoded = b"P6\n2 1\n65535\n\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00";
    assert!(matches!(
        load(encoded),
        Err(BitmapError::UnsupportedPixelFormat(_))
    ));
}

#[test]
fn tga_truncated_colormap_is_corrupt() {
    let sample = gray_sample();
    let encoded = save(&sample, FormatId::Tga).unwrap();
    // Cut inside the header/colormap region.
    let result = tga::decode(&encoded[..10], &Limits::default());
    assert!(matches!(result, Err(BitmapError::CorruptData(_))));
}

#[test]
fn farbfeld_zero_dimensions_are_corrupt() {
    let mut encoded = save(&gray_sample(), FormatId::Farbfeld).unwrap();
    encoded[8..12].copy_from_slice(&0u32.to_be_bytes());
    assert!(matches!(
        load(&encoded),
        Err(BitmapError::CorruptData(_))
    ));
}

#[test]
fn limits_bound_decoding() {
    let encoded = save(&gray_sample(), FormatId::Png).unwrap();
    let limits = Limits {
        max_width: Some(2),
        ..Default::default()
    };
    let err = load_with_limits(&encoded, &limits).unwrap_err();
    assert!(matches!(err, BitmapError::OutOfMemory { .. }), "{err:?}");
}

// ── Hand-built BMP layouts ───────────────────────────────────────────

/// 2x2 RLE8 file with an end-of-line marker after every row, including
/// the last one before end-of-bitmap. Common encoder output.
#[test]
fn bmp_rle_trailing_end_of_line_is_accepted() {
    let mut file = Vec::new();
    file.extend_from_slice(b"BM");
    file.extend_from_slice(&72u32.to_le_bytes()); // file size
    file.extend_from_slice(&[0; 4]); // reserved
    file.extend_from_slice(&62u32.to_le_bytes()); // pixel data offset
    file.extend_from_slice(&40u32.to_le_bytes()); // info header size
    file.extend_from_slice(&2u32.to_le_bytes()); // width
    file.extend_from_slice(&2u32.to_le_bytes()); // height
    file.extend_from_slice(&1u16.to_le_bytes()); // planes
    file.extend_from_slice(&8u16.to_le_bytes()); // bpp
    file.extend_from_slice(&1u32.to_le_bytes()); // RLE8
    file.extend_from_slice(&[0; 12]); // image size, resolution
    file.extend_from_slice(&2u32.to_le_bytes()); // colors used
    file.extend_from_slice(&[0; 4]); // colors important
    file.extend_from_slice(&[0, 0, 0, 0, 255, 255, 255, 0]); // BGRX palette
    // Bottom row, EOL, top row, EOL, end-of-bitmap.
    file.extend_from_slice(&[2, 0, 0, 0, 2, 1, 0, 0, 0, 1]);

    let decoded = load(&file).unwrap();
    assert_eq!(decoded.format(), PixelFormat::Indexed8);
    assert_eq!(decoded.palette_index_at(0, 0).unwrap(), 1);
    assert_eq!(decoded.palette_index_at(1, 1).unwrap(), 0);
}

/// 1x1 32-bit BI_ALPHABITFIELDS file: four masks follow the 40-byte
/// header, and the alpha mask must reach the decoded pixel.
#[test]
fn bmp_alpha_bitfields_reads_the_fourth_mask() {
    let mut file = Vec::new();
    file.extend_from_slice(b"BM");
    file.extend_from_slice(&74u32.to_le_bytes()); // file size
    file.extend_from_slice(&[0; 4]); // reserved
    file.extend_from_slice(&70u32.to_le_bytes()); // pixel data offset
    file.extend_from_slice(&40u32.to_le_bytes()); // info header size
    file.extend_from_slice(&1u32.to_le_bytes()); // width
    file.extend_from_slice(&1u32.to_le_bytes()); // height
    file.extend_from_slice(&1u16.to_le_bytes()); // planes
    file.extend_from_slice(&32u16.to_le_bytes()); // bpp
    file.extend_from_slice(&6u32.to_le_bytes()); // BI_ALPHABITFIELDS
    file.extend_from_slice(&[0; 20]); // image size, resolution, colors
    file.extend_from_slice(&0x00FF_0000u32.to_le_bytes()); // red mask
    file.extend_from_slice(&0x0000_FF00u32.to_le_bytes()); // green mask
    file.extend_from_slice(&0x0000_00FFu32.to_le_bytes()); // blue mask
    file.extend_from_slice(&0xFF00_0000u32.to_le_bytes()); // alpha mask
    file.extend_from_slice(&[3, 2, 1, 0x80]); // one BGRA pixel

    let decoded = load(&file).unwrap();
    assert_eq!(decoded.format(), PixelFormat::Rgba8888);
    assert_eq!(decoded.get_pixel(0, 0).unwrap(), RGBA8::new(1, 2, 3, 0x80));
}

// ── Hand-built PNG streams ───────────────────────────────────────────

fn crc32(data: &[u8]) -> u32 {
    let mut crc = 0xFFFF_FFFFu32;
    for &byte in data {
        crc ^= u32::from(byte);
        for _ in 0..8 {
            crc = if crc & 1 != 0 {
                0xEDB8_8320 ^ (crc >> 1)
            } else {
                crc >> 1
            };
        }
    }
    crc ^ 0xFFFF_FFFF
}

fn chunk(out: &mut Vec<u8>, kind: &[u8; 4], data: &[u8]) {
    out.extend_from_slice(&(data.len() as u32).to_be_bytes());
    out.extend_from_slice(kind);
    out.extend_from_slice(data);
    let mut crc_input = kind.to_vec();
    crc_input.extend_from_slice(data);
    out.extend_from_slice(&crc32(&crc_input).to_be_bytes());
}

/// 2x2 grayscale Adam7 PNG with pixels 10/20/30/40. Pass 1 holds (0,0),
/// pass 6 holds (1,0), pass 7 holds the bottom row.
#[test]
fn interlaced_png_decodes_in_pass_order() {
    let mut ihdr = Vec::new();
    ihdr.extend_from_slice(&2u32.to_be_bytes());
    ihdr.extend_from_slice(&2u32.to_be_bytes());
    ihdr.extend_from_slice(&[8, 0, 0, 0, 1]); // 8-bit gray, interlaced

    let raw = [0u8, 10, 0, 20, 0, 30, 40];
    // Stored-block zlib stream wrapping `raw`.
    let mut idat = vec![0x78, 0x01, 0x01, 0x07, 0x00, 0xF8, 0xFF];
    idat.extend_from_slice(&raw);
    idat.extend_from_slice(&[0x00, 0xF7, 0x00, 0x65]); // adler32

    let mut png = vec![0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];
    chunk(&mut png, b"IHDR", &ihdr);
    chunk(&mut png, b"IDAT", &idat);
    chunk(&mut png, b"IEND", &[]);

    let decoded = load(&png).unwrap();
    assert_eq!(decoded.format(), PixelFormat::Indexed8);
    assert!(decoded.palette().unwrap().is_gray_ramp());
    assert_eq!(decoded.palette_index_at(0, 0).unwrap(), 10);
    assert_eq!(decoded.palette_index_at(1, 0).unwrap(), 20);
    assert_eq!(decoded.palette_index_at(0, 1).unwrap(), 30);
    assert_eq!(decoded.palette_index_at(1, 1).unwrap(), 40);
}

/// 2x1 8-bit grayscale with a tRNS chunk naming gray level 0x10: the
/// matching ramp entry decodes with zero alpha, the rest stay opaque.
#[test]
fn grayscale_png_trns_zeroes_the_named_ramp_entry() {
    let mut ihdr = Vec::new();
    ihdr.extend_from_slice(&2u32.to_be_bytes());
    ihdr.extend_from_slice(&1u32.to_be_bytes());
    ihdr.extend_from_slice(&[8, 0, 0, 0, 0]); // 8-bit gray

    let raw = [0u8, 0x10, 0x20];
    let mut idat = vec![0x78, 0x01, 0x01, 0x03, 0x00, 0xFC, 0xFF];
    idat.extend_from_slice(&raw);
    idat.extend_from_slice(&[0x00, 0x43, 0x00, 0x31]); // adler32

    let mut png = vec![0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];
    chunk(&mut png, b"IHDR", &ihdr);
    chunk(&mut png, b"tRNS", &[0x00, 0x10]);
    chunk(&mut png, b"IDAT", &idat);
    chunk(&mut png, b"IEND", &[]);

    let decoded = load(&png).unwrap();
    let palette = decoded.palette().unwrap();
    assert_eq!(palette.get(0x10).unwrap(), RGBA8::new(0x10, 0x10, 0x10, 0));
    assert_eq!(palette.get(0x20).unwrap().a, 255);
}
