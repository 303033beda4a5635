//! PNG scanline filters (filter method 0).

use alloc::format;
use alloc::vec;

use crate::BitmapError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum FilterType {
    None,
    Sub,
    Up,
    Average,
    Paeth,
}

impl FilterType {
    pub(crate) fn from_u8(value: u8) -> Result<Self, BitmapError> {
        match value {
            0 => Ok(Self::None),
            1 => Ok(Self::Sub),
            2 => Ok(Self::Up),
            3 => Ok(Self::Average),
            4 => Ok(Self::Paeth),
            other => Err(BitmapError::CorruptData(format!(
                "unknown PNG filter type {other}"
            ))),
        }
    }

    fn to_u8(self) -> u8 {
        match self {
            Self::None => 0,
            Self::Sub => 1,
            Self::Up => 2,
            Self::Average => 3,
            Self::Paeth => 4,
        }
    }
}

pub(crate) fn unfilter_row(
    filter: FilterType,
    current: &mut [u8],
    previous: Option<&[u8]>,
    bpp: usize,
) {
    match filter {
        FilterType::None => {}
        FilterType::Sub => {
            for i in bpp..current.len() {
                current[i] = current[i].wrapping_add(current[i - bpp]);
            }
        }
        FilterType::Up => {
            if let Some(prev) = previous {
                for i in 0..current.len() {
                    current[i] = current[i].wrapping_add(prev[i]);
                }
            }
        }
        FilterType::Average => {
            for i in 0..current.len() {
                let left = if i >= bpp {
                    u16::from(current[i - bpp])
                } else {
                    0
                };
                let above = previous.map_or(0, |p| u16::from(p[i]));
                current[i] = current[i].wrapping_add(((left + above) / 2) as u8);
            }
        }
        FilterType::Paeth => {
            for i in 0..current.len() {
                let a = if i >= bpp { current[i - bpp] } else { 0 };
                let b = previous.map_or(0, |p| p[i]);
                let c = if i >= bpp {
                    previous.map_or(0, |p| p[i - bpp])
                } else {
                    0
                };
                current[i] = current[i].wrapping_add(paeth_predictor(a, b, c));
            }
        }
    }
}

fn filter_row(
    filter: FilterType,
    current: &[u8],
    previous: Option<&[u8]>,
    bpp: usize,
    output: &mut [u8],
) {
    match filter {
        FilterType::None => output.copy_from_slice(current),
        FilterType::Sub => {
            for i in 0..current.len() {
                let left = if i >= bpp { current[i - bpp] } else { 0 };
                output[i] = current[i].wrapping_sub(left);
            }
        }
        FilterType::Up => {
            for i in 0..current.len() {
                output[i] = current[i].wrapping_sub(previous.map_or(0, |p| p[i]));
            }
        }
        FilterType::Average => {
            for i in 0..current.len() {
                let left = if i >= bpp {
                    u16::from(current[i - bpp])
                } else {
                    0
                };
                let above = previous.map_or(0, |p| u16::from(p[i]));
                output[i] = current[i].wrapping_sub(((left + above) / 2) as u8);
            }
        }
        FilterType::Paeth => {
            for i in 0..current.len() {
                let a = if i >= bpp { current[i - bpp] } else { 0 };
                let b = previous.map_or(0, |p| p[i]);
                let c = if i >= bpp {
                    previous.map_or(0, |p| p[i - bpp])
                } else {
                    0
                };
                output[i] = current[i].wrapping_sub(paeth_predictor(a, b, c));
            }
        }
    }
}

fn paeth_predictor(a: u8, b: u8, c: u8) -> u8 {
    let pa = (i16::from(b) - i16::from(c)).abs();
    let pb = (i16::from(a) - i16::from(c)).abs();
    let pc = (i16::from(a) + i16::from(b) - 2 * i16::from(c)).abs();
    if pa <= pb && pa <= pc {
        a
    } else if pb <= pc {
        b
    } else {
        c
    }
}

/// Filter a row with whichever filter yields the smallest sum of
/// absolute residuals, appending the filter byte and filtered data.
pub(crate) fn filter_row_adaptive(
    current: &[u8],
    previous: Option<&[u8]>,
    bpp: usize,
    out: &mut alloc::vec::Vec<u8>,
) {
    let mut best = vec![0u8; current.len()];
    let mut best_filter = FilterType::None;
    let mut best_score = u64::MAX;
    let mut candidate = vec![0u8; current.len()];
    for filter in [
        FilterType::None,
        FilterType::Sub,
        FilterType::Up,
        FilterType::Average,
        FilterType::Paeth,
    ] {
        filter_row(filter, current, previous, bpp, &mut candidate);
        let score: u64 = candidate
            .iter()
            .map(|&b| u64::from((b as i8).unsigned_abs()))
            .sum();
        if score < best_score {
            best_score = score;
            best_filter = filter;
            core::mem::swap(&mut best, &mut candidate);
        }
    }
    out.push(best_filter.to_u8());
    out.extend_from_slice(&best);
}
