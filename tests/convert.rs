//! Conversion engine scenarios that cross format boundaries: quantize,
//! encode, decode, and expand back without losing the original colors.

use dibkit::*;

const QUAD: [RGBA8; 4] = [
    RGBA8::new(255, 0, 0, 255),
    RGBA8::new(0, 255, 0, 255),
    RGBA8::new(0, 0, 255, 255),
    RGBA8::new(255, 255, 255, 255),
];

fn quad_bitmap() -> Bitmap {
    let mut bmp = Bitmap::new(2, 2, PixelFormat::Rgb888).unwrap();
    bmp.set_pixel(0, 0, QUAD[0]).unwrap();
    bmp.set_pixel(1, 0, QUAD[1]).unwrap();
    bmp.set_pixel(0, 1, QUAD[2]).unwrap();
    bmp.set_pixel(1, 1, QUAD[3]).unwrap();
    bmp
}

fn gradient(w: u32, h: u32) -> Bitmap {
    let mut bmp = Bitmap::new(w, h, PixelFormat::Rgb888).unwrap();
    for y in 0..h {
        for x in 0..w {
            let v = ((x * 255) / (w - 1).max(1)) as u8;
            bmp.set_pixel(x, y, RGBA8::new(v, v / 2, 255 - v, 255))
                .unwrap();
        }
    }
    bmp
}

/// Four unique colors fit a 16-entry palette exactly, so quantizing,
/// writing to BMP, reading back, and expanding recovers every pixel.
#[test]
fn quantize_encode_decode_expand_recovers_colors() {
    let original = quad_bitmap();
    let indexed = convert(&original, PixelFormat::Indexed4, DitherMode::None).unwrap();
    // Exact palette, first-seen order: row 0 left to right, then row 1.
    assert_eq!(indexed.palette().unwrap().entries(), &QUAD);

    let decoded = load(&save(&indexed, FormatId::Bmp).unwrap()).unwrap();
    let expanded = convert(&decoded, PixelFormat::Rgb888, DitherMode::None).unwrap();
    assert_eq!(expanded.buffer().bytes(), original.buffer().bytes());
}

#[test]
fn conversion_is_idempotent() {
    let source = gradient(16, 8);
    for mode in [
        DitherMode::None,
        DitherMode::Ordered,
        DitherMode::ErrorDiffusion,
    ] {
        for target in [
            PixelFormat::Indexed1,
            PixelFormat::Indexed8,
            PixelFormat::Rgb555,
        ] {
            let once = convert(&source, target, mode).unwrap();
            let twice = convert(&once, target, mode).unwrap();
            assert_eq!(once, twice, "{target:?} / {mode:?}");
        }
    }
}

#[test]
fn dithering_is_deterministic_and_changes_output() {
    let source = gradient(32, 8);
    let flat = convert(&source, PixelFormat::Indexed1, DitherMode::None).unwrap();
    let ordered = convert(&source, PixelFormat::Indexed1, DitherMode::Ordered).unwrap();
    let diffused = convert(&source, PixelFormat::Indexed1, DitherMode::ErrorDiffusion).unwrap();
    assert_ne!(flat.buffer().bytes(), ordered.buffer().bytes());
    assert_ne!(flat.buffer().bytes(), diffused.buffer().bytes());

    let ordered_again = convert(&source, PixelFormat::Indexed1, DitherMode::Ordered).unwrap();
    assert_eq!(ordered.buffer().bytes(), ordered_again.buffer().bytes());
}

#[test]
fn caller_palette_drives_quantization() {
    let palette = Palette::from_entries(
        vec![RGBA8::new(0, 0, 0, 255), RGBA8::new(255, 255, 255, 255)],
        PixelFormat::Indexed1,
    )
    .unwrap();
    let converted = convert_with_palette(
        &quad_bitmap(),
        PixelFormat::Indexed1,
        palette.clone(),
        DitherMode::None,
    )
    .unwrap();
    assert_eq!(converted.palette().unwrap().entries(), palette.entries());
    // White maps to white, pure primaries to whichever endpoint is nearer.
    assert_eq!(
        converted.get_pixel(1, 1).unwrap(),
        RGBA8::new(255, 255, 255, 255)
    );
}

#[test]
fn alpha_survives_between_alpha_capable_endpoints_only() {
    let mut source = Bitmap::new(2, 1, PixelFormat::Rgba8888).unwrap();
    source.set_pixel(0, 0, RGBA8::new(10, 20, 30, 0)).unwrap();
    source.set_pixel(1, 0, RGBA8::new(10, 20, 30, 255)).unwrap();

    // Indexed palettes carry alpha.
    let indexed = convert(&source, PixelFormat::Indexed8, DitherMode::None).unwrap();
    assert_eq!(indexed.get_pixel(0, 0).unwrap().a, 0);
    assert_eq!(indexed.get_pixel(1, 0).unwrap().a, 255);

    // Rgb888 drops it silently.
    let opaque = convert(&source, PixelFormat::Rgb888, DitherMode::None).unwrap();
    assert_eq!(opaque.get_pixel(0, 0).unwrap().a, 255);
}

#[test]
fn metadata_is_carried_verbatim() {
    let mut source = gradient(4, 4);
    source
        .metadata_mut()
        .set("comment", MetadataValue::Text("keep me".into()));
    let converted = convert(&source, PixelFormat::Indexed8, DitherMode::Ordered).unwrap();
    assert_eq!(converted.metadata(), source.metadata());
}

#[test]
fn median_cut_handles_more_colors_than_capacity() {
    let source = gradient(64, 2);
    let indexed = convert(&source, PixelFormat::Indexed4, DitherMode::None).unwrap();
    assert!(indexed.palette().unwrap().len() <= 16);
    // Every pixel must reference a real entry.
    for y in 0..2 {
        for x in 0..64 {
            indexed.get_pixel(x, y).unwrap();
        }
    }
}
