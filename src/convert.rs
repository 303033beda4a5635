//! Pixel format conversion: truecolor depth changes, palette generation,
//! indexed rendering, and dithering.
//!
//! Conversion is pure: the source bitmap is read, never mutated, and the
//! in-place variant only commits after the whole result exists. Identical
//! inputs always produce identical outputs (palette generation and
//! nearest-color matching are fully deterministic).

use alloc::collections::BTreeMap;
use alloc::format;
use alloc::vec;
use alloc::vec::Vec;

use rgb::RGBA8;

use crate::bitmap::Bitmap;
use crate::buffer::PixelBuffer;
use crate::limits::Limits;
use crate::palette::Palette;
use crate::pixel::PixelFormat;
use crate::BitmapError;

/// Dithering applied when a conversion loses color resolution.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DitherMode {
    /// Plain nearest-color quantization.
    #[default]
    None,
    /// Ordered dithering with a 4x4 Bayer matrix.
    Ordered,
    /// Floyd-Steinberg error diffusion, rows left to right.
    ErrorDiffusion,
}

const BAYER4: [[i32; 4]; 4] = [
    [0, 8, 2, 10],
    [12, 4, 14, 6],
    [3, 11, 1, 9],
    [15, 5, 13, 7],
];

impl Bitmap {
    /// Convert to `target`, producing a new bitmap. Metadata is cloned.
    pub fn convert(&self, target: PixelFormat, dither: DitherMode) -> Result<Bitmap, BitmapError> {
        convert(self, target, dither)
    }

    /// Convert to an indexed `target` using the caller's palette instead
    /// of a generated one.
    pub fn convert_with_palette(
        &self,
        target: PixelFormat,
        palette: Palette,
        dither: DitherMode,
    ) -> Result<Bitmap, BitmapError> {
        convert_with_palette(self, target, palette, dither)
    }

    /// In-place variant of [`Bitmap::convert`]. The whole result is
    /// computed before anything is committed, so on error the bitmap is
    /// left exactly as it was.
    pub fn convert_in_place(
        &mut self,
        target: PixelFormat,
        dither: DitherMode,
    ) -> Result<(), BitmapError> {
        *self = convert(self, target, dither)?;
        Ok(())
    }
}

/// Convert `src` to `target`.
///
/// Indexed targets get a generated palette: the exact source colors in
/// first-seen order when they fit the target's capacity, otherwise a
/// median-cut reduction. Alpha survives only when both source and target
/// can carry it (directly or through palette entries).
pub fn convert(
    src: &Bitmap,
    target: PixelFormat,
    dither: DitherMode,
) -> Result<Bitmap, BitmapError> {
    if target == src.format() {
        return Ok(src.clone());
    }
    if target.is_indexed() {
        let palette = build_palette(src, target.palette_capacity())?;
        return convert_with_palette(src, target, palette, dither);
    }
    let buffer = render_truecolor(src, target, dither)?;
    Bitmap::from_parts(buffer, None, src.metadata().clone())
}

/// Convert `src` to an indexed `target` through `palette`.
///
/// Every pixel maps to its nearest palette entry (ties to the lowest
/// index), shaped by `dither`.
pub fn convert_with_palette(
    src: &Bitmap,
    target: PixelFormat,
    palette: Palette,
    dither: DitherMode,
) -> Result<Bitmap, BitmapError> {
    if !target.is_indexed() {
        return Err(BitmapError::UnsupportedPixelFormat(format!(
            "{target:?} does not take a palette"
        )));
    }
    if palette.len() > target.palette_capacity() {
        return Err(BitmapError::UnsupportedPixelFormat(format!(
            "palette of {} entries exceeds {target:?} capacity",
            palette.len()
        )));
    }
    let buffer = render_indexed(src, target, &palette, dither)?;
    Bitmap::from_parts(buffer, Some(palette), src.metadata().clone())
}

/// Generate a palette for `src` with at most `capacity` entries.
///
/// If the source holds no more than `capacity` distinct colors, the
/// palette is exactly those colors in first-seen scan order. Otherwise a
/// median-cut reduction over the distinct colors (weighted by frequency)
/// picks `capacity` representatives.
pub fn build_palette(src: &Bitmap, capacity: usize) -> Result<Palette, BitmapError> {
    let mut seen: BTreeMap<[u8; 4], u32> = BTreeMap::new();
    let mut order: Vec<RGBA8> = Vec::new();
    let mut row = vec![RGBA8::new(0, 0, 0, 0); src.width() as usize];
    for y in 0..src.height() {
        src.row_rgba(y, &mut row)?;
        for &px in &row {
            let count = seen.entry([px.r, px.g, px.b, px.a]).or_insert(0);
            if *count == 0 {
                order.push(px);
            }
            *count += 1;
        }
    }
    let entries = if order.is_empty() {
        vec![RGBA8::new(0, 0, 0, 255)]
    } else if order.len() <= capacity {
        order
    } else {
        let weighted: Vec<(RGBA8, u32)> = order
            .into_iter()
            .map(|c| (c, seen[&[c.r, c.g, c.b, c.a]]))
            .collect();
        median_cut(weighted, capacity)
    };
    Palette::from_entries(entries, smallest_indexed_for(capacity))
}

fn smallest_indexed_for(capacity: usize) -> PixelFormat {
    if capacity <= 2 {
        PixelFormat::Indexed1
    } else if capacity <= 16 {
        PixelFormat::Indexed4
    } else {
        PixelFormat::Indexed8
    }
}

/// Median-cut color reduction over distinct colors with frequencies.
///
/// Deterministic: boxes split along the channel with the widest range,
/// colors ordered by stable sort, and each box resolves to its weighted
/// mean color.
fn median_cut(colors: Vec<(RGBA8, u32)>, max_colors: usize) -> Vec<RGBA8> {
    debug_assert!(max_colors >= 1);
    let mut boxes: Vec<Vec<(RGBA8, u32)>> = vec![colors];
    while boxes.len() < max_colors {
        // Widest single-channel range wins; earlier box wins ties.
        let mut pick: Option<(usize, usize, u8)> = None;
        for (i, b) in boxes.iter().enumerate() {
            if b.len() < 2 {
                continue;
            }
            for ch in 0..4 {
                let (min, max) = channel_range(b, ch);
                let spread = max - min;
                if pick.map_or(spread > 0, |(_, _, best)| spread > best) {
                    pick = Some((i, ch, spread));
                }
            }
        }
        let Some((idx, ch, _)) = pick else { break };
        let mut b = boxes.swap_remove(idx);
        b.sort_by_key(|(c, _)| channel(*c, ch));
        let total: u64 = b.iter().map(|(_, n)| u64::from(*n)).sum();
        let mut acc = 0u64;
        let mut split = b.len() / 2;
        for (i, (_, n)) in b.iter().enumerate() {
            acc += u64::from(*n);
            if acc * 2 >= total {
                split = (i + 1).min(b.len() - 1).max(1);
                break;
            }
        }
        let rest = b.split_off(split);
        boxes.push(b);
        boxes.push(rest);
    }
    let mut out: Vec<RGBA8> = boxes.iter().map(|b| box_mean(b)).collect();
    out.truncate(max_colors);
    out
}

fn channel(c: RGBA8, ch: usize) -> u8 {
    match ch {
        0 => c.r,
        1 => c.g,
        2 => c.b,
        _ => c.a,
    }
}

fn channel_range(colors: &[(RGBA8, u32)], ch: usize) -> (u8, u8) {
    let mut min = u8::MAX;
    let mut max = u8::MIN;
    for (c, _) in colors {
        let v = channel(*c, ch);
        min = min.min(v);
        max = max.max(v);
    }
    (min, max)
}

fn box_mean(colors: &[(RGBA8, u32)]) -> RGBA8 {
    let mut sum = [0u64; 4];
    let mut total = 0u64;
    for (c, n) in colors {
        let n64 = u64::from(*n);
        sum[0] += u64::from(c.r) * n64;
        sum[1] += u64::from(c.g) * n64;
        sum[2] += u64::from(c.b) * n64;
        sum[3] += u64::from(c.a) * n64;
        total += n64;
    }
    if total == 0 {
        return RGBA8::new(0, 0, 0, 255);
    }
    let avg = |s: u64| ((s + total / 2) / total) as u8;
    RGBA8::new(avg(sum[0]), avg(sum[1]), avg(sum[2]), avg(sum[3]))
}

fn clamp8(v: i32) -> u8 {
    v.clamp(0, 255) as u8
}

fn bayer_bias(x: usize, y: u32, spread: i32) -> [i32; 3] {
    let m = BAYER4[(y % 4) as usize][x % 4];
    let bias = ((m * 2 - 15) * spread) / 32;
    [bias, bias, bias]
}

/// Per-channel quantization step of an indexed target. A palette of
/// `len` entries resolves roughly cbrt(len) levels per channel, and the
/// ordered bias has to span the gap between neighboring levels or it
/// never moves a pixel (a 2-entry palette needs a step of 255, not 8).
fn quant_step(len: usize) -> i32 {
    let mut levels = 2usize;
    while levels * levels * levels < len {
        levels += 1;
    }
    255 / (levels as i32 - 1)
}

fn render_indexed(
    src: &Bitmap,
    target: PixelFormat,
    palette: &Palette,
    dither: DitherMode,
) -> Result<PixelBuffer, BitmapError> {
    let width = src.width() as usize;
    let mut buffer = PixelBuffer::allocate(src.width(), src.height(), target, &Limits::default())?;
    let mut row = vec![RGBA8::new(0, 0, 0, 0); width];

    // Floyd-Steinberg carry rows, one i32 triple per pixel.
    let mut err_cur = vec![[0i32; 3]; width];
    let mut err_next = vec![[0i32; 3]; width];

    // Cache exact matches; distinct colors are usually few.
    let mut exact: BTreeMap<[u8; 4], u8> = BTreeMap::new();
    let step = quant_step(palette.len());

    for y in 0..src.height() {
        src.row_rgba(y, &mut row)?;
        if dither == DitherMode::ErrorDiffusion {
            core::mem::swap(&mut err_cur, &mut err_next);
            err_next.iter_mut().for_each(|e| *e = [0; 3]);
        }
        let out = buffer.scanline_mut(y)?;
        for (x, &px) in row.iter().enumerate() {
            let idx = match dither {
                DitherMode::None => *exact
                    .entry([px.r, px.g, px.b, px.a])
                    .or_insert_with(|| palette.nearest(px)),
                DitherMode::Ordered => {
                    let bias = bayer_bias(x, y, step);
                    palette.nearest(RGBA8::new(
                        clamp8(i32::from(px.r) + bias[0]),
                        clamp8(i32::from(px.g) + bias[1]),
                        clamp8(i32::from(px.b) + bias[2]),
                        px.a,
                    ))
                }
                DitherMode::ErrorDiffusion => {
                    let want = [
                        i32::from(px.r) + err_cur[x][0],
                        i32::from(px.g) + err_cur[x][1],
                        i32::from(px.b) + err_cur[x][2],
                    ];
                    let adjusted =
                        RGBA8::new(clamp8(want[0]), clamp8(want[1]), clamp8(want[2]), px.a);
                    let idx = palette.nearest(adjusted);
                    let got = palette.get(idx).unwrap_or(RGBA8::new(0, 0, 0, 255));
                    let err = [
                        want[0] - i32::from(got.r),
                        want[1] - i32::from(got.g),
                        want[2] - i32::from(got.b),
                    ];
                    diffuse(&mut err_cur, &mut err_next, x, width, err);
                    idx
                }
            };
            crate::buffer::pack_index(out, target, x, idx);
        }
    }
    Ok(buffer)
}

fn render_truecolor(
    src: &Bitmap,
    target: PixelFormat,
    dither: DitherMode,
) -> Result<PixelBuffer, BitmapError> {
    let width = src.width() as usize;
    let mut buffer = PixelBuffer::allocate(src.width(), src.height(), target, &Limits::default())?;
    let mut row = vec![RGBA8::new(0, 0, 0, 0); width];

    let mut err_cur = vec![[0i32; 3]; width];
    let mut err_next = vec![[0i32; 3]; width];
    // Dithering only changes anything when the target loses resolution.
    let lossy = target == PixelFormat::Rgb555;

    for y in 0..src.height() {
        src.row_rgba(y, &mut row)?;
        if lossy && dither == DitherMode::ErrorDiffusion {
            core::mem::swap(&mut err_cur, &mut err_next);
            err_next.iter_mut().for_each(|e| *e = [0; 3]);
        }
        let out = buffer.scanline_mut(y)?;
        for (x, &px) in row.iter().enumerate() {
            match target {
                PixelFormat::Rgb555 => {
                    let mut want = [i32::from(px.r), i32::from(px.g), i32::from(px.b)];
                    match dither {
                        DitherMode::None => {}
                        DitherMode::Ordered => {
                            let bias = bayer_bias(x, y, 8);
                            for (w, b) in want.iter_mut().zip(bias) {
                                *w += b;
                            }
                        }
                        DitherMode::ErrorDiffusion => {
                            for (w, e) in want.iter_mut().zip(err_cur[x]) {
                                *w += e;
                            }
                        }
                    }
                    let quant = want.map(|w| clamp8(w) >> 3);
                    if dither == DitherMode::ErrorDiffusion {
                        let err = [
                            want[0] - i32::from(crate::pixel::expand5(quant[0])),
                            want[1] - i32::from(crate::pixel::expand5(quant[1])),
                            want[2] - i32::from(crate::pixel::expand5(quant[2])),
                        ];
                        diffuse(&mut err_cur, &mut err_next, x, width, err);
                    }
                    let word = (u16::from(quant[0]) << 10)
                        | (u16::from(quant[1]) << 5)
                        | u16::from(quant[2]);
                    out[x * 2..x * 2 + 2].copy_from_slice(&word.to_le_bytes());
                }
                PixelFormat::Rgb888 => {
                    out[x * 3] = px.r;
                    out[x * 3 + 1] = px.g;
                    out[x * 3 + 2] = px.b;
                }
                PixelFormat::Rgba8888 => {
                    // Alpha survives only when the source carries it; the
                    // row expansion already filled 255 otherwise.
                    out[x * 4] = px.r;
                    out[x * 4 + 1] = px.g;
                    out[x * 4 + 2] = px.b;
                    out[x * 4 + 3] = px.a;
                }
                _ => unreachable!("indexed targets take the palette path"),
            }
        }
    }
    Ok(buffer)
}

/// Floyd-Steinberg weights: 7/16 right, 3/16 below-left, 5/16 below,
/// 1/16 below-right.
fn diffuse(
    err_cur: &mut [[i32; 3]],
    err_next: &mut [[i32; 3]],
    x: usize,
    width: usize,
    err: [i32; 3],
) {
    for ch in 0..3 {
        let e = err[ch];
        if x + 1 < width {
            err_cur[x + 1][ch] += e * 7 / 16;
            err_next[x + 1][ch] += e / 16;
        }
        if x > 0 {
            err_next[x - 1][ch] += e * 3 / 16;
        }
        err_next[x][ch] += e * 5 / 16;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn four_color_2x2() -> Bitmap {
        let mut bmp = Bitmap::new(2, 2, PixelFormat::Rgb888).unwrap();
        bmp.set_pixel(0, 0, RGBA8::new(255, 0, 0, 255)).unwrap();
        bmp.set_pixel(1, 0, RGBA8::new(0, 255, 0, 255)).unwrap();
        bmp.set_pixel(0, 1, RGBA8::new(0, 0, 255, 255)).unwrap();
        bmp.set_pixel(1, 1, RGBA8::new(255, 255, 255, 255)).unwrap();
        bmp
    }

    #[test]
    fn exact_palette_in_first_seen_order() {
        let src = four_color_2x2();
        let indexed = src.convert(PixelFormat::Indexed4, DitherMode::None).unwrap();
        let pal = indexed.palette().unwrap();
        assert_eq!(pal.len(), 4);
        assert_eq!(pal.get(0).unwrap(), RGBA8::new(255, 0, 0, 255));
        assert_eq!(pal.get(1).unwrap(), RGBA8::new(0, 255, 0, 255));
        assert_eq!(pal.get(2).unwrap(), RGBA8::new(0, 0, 255, 255));
        assert_eq!(pal.get(3).unwrap(), RGBA8::new(255, 255, 255, 255));
        // Every pixel survives the trip back to truecolor untouched.
        let back = indexed.convert(PixelFormat::Rgb888, DitherMode::None).unwrap();
        for y in 0..2 {
            for x in 0..2 {
                assert_eq!(back.get_pixel(x, y).unwrap(), src.get_pixel(x, y).unwrap());
            }
        }
    }

    #[test]
    fn conversion_is_deterministic() {
        let src = four_color_2x2();
        let a = src.convert(PixelFormat::Indexed1, DitherMode::ErrorDiffusion).unwrap();
        let b = src.convert(PixelFormat::Indexed1, DitherMode::ErrorDiffusion).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn same_format_is_identity() {
        let src = four_color_2x2();
        let out = src.convert(PixelFormat::Rgb888, DitherMode::None).unwrap();
        assert_eq!(out, src);
    }

    #[test]
    fn median_cut_reduces_to_capacity() {
        let mut bmp = Bitmap::new(16, 16, PixelFormat::Rgb888).unwrap();
        for y in 0..16 {
            for x in 0..16 {
                bmp.set_pixel(x, y, RGBA8::new((x * 16) as u8, (y * 16) as u8, 0, 255))
                    .unwrap();
            }
        }
        let indexed = bmp.convert(PixelFormat::Indexed4, DitherMode::None).unwrap();
        assert_eq!(indexed.format(), PixelFormat::Indexed4);
        assert!(indexed.palette().unwrap().len() <= 16);
    }

    #[test]
    fn alpha_survives_only_between_alpha_endpoints() {
        let mut src = Bitmap::new(1, 1, PixelFormat::Rgba8888).unwrap();
        src.set_pixel(0, 0, RGBA8::new(10, 20, 30, 40)).unwrap();
        let opaque = src.convert(PixelFormat::Rgb888, DitherMode::None).unwrap();
        let back = opaque.convert(PixelFormat::Rgba8888, DitherMode::None).unwrap();
        assert_eq!(back.get_pixel(0, 0).unwrap(), RGBA8::new(10, 20, 30, 255));
    }

    #[test]
    fn in_place_keeps_metadata() {
        let mut bmp = four_color_2x2();
        bmp.metadata_mut()
            .set("comment", crate::MetadataValue::Int(7));
        bmp.convert_in_place(PixelFormat::Rgba8888, DitherMode::None)
            .unwrap();
        assert_eq!(bmp.format(), PixelFormat::Rgba8888);
        assert!(bmp.metadata().contains_key("comment"));
    }

    #[test]
    fn caller_palette_is_respected() {
        let src = four_color_2x2();
        let pal = Palette::from_entries(
            vec![RGBA8::new(0, 0, 0, 255), RGBA8::new(255, 255, 255, 255)],
            PixelFormat::Indexed1,
        )
        .unwrap();
        let out = src
            .convert_with_palette(PixelFormat::Indexed1, pal, DitherMode::None)
            .unwrap();
        // White pixel maps exactly; saturated primaries go to one of the
        // two entries deterministically.
        assert_eq!(out.get_pixel(1, 1).unwrap(), RGBA8::new(255, 255, 255, 255));
    }

    #[test]
    fn ordered_bias_spans_a_two_entry_palette() {
        // Uniform mid-gray against black/white must break into a pattern:
        // half the Bayer cells push above the midpoint, half below.
        let mut bmp = Bitmap::new(4, 4, PixelFormat::Rgb888).unwrap();
        for y in 0..4 {
            for x in 0..4 {
                bmp.set_pixel(x, y, RGBA8::new(128, 128, 128, 255)).unwrap();
            }
        }
        let pal = Palette::from_entries(
            vec![RGBA8::new(0, 0, 0, 255), RGBA8::new(255, 255, 255, 255)],
            PixelFormat::Indexed1,
        )
        .unwrap();
        let out = bmp
            .convert_with_palette(PixelFormat::Indexed1, pal, DitherMode::Ordered)
            .unwrap();
        let mut counts = [0usize; 2];
        for y in 0..4 {
            for x in 0..4 {
                counts[usize::from(out.palette_index_at(x, y).unwrap())] += 1;
            }
        }
        assert_eq!(counts, [8, 8]);
    }

    #[test]
    fn rgb555_roundtrip_is_stable() {
        let src = four_color_2x2();
        let lo = src.convert(PixelFormat::Rgb555, DitherMode::None).unwrap();
        let up = lo.convert(PixelFormat::Rgb888, DitherMode::None).unwrap();
        let lo2 = up.convert(PixelFormat::Rgb555, DitherMode::None).unwrap();
        assert_eq!(lo.buffer().bytes(), lo2.buffer().bytes());
    }
}
