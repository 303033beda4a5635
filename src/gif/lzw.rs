//! GIF-variant LZW with variable code widths (3 to 12 bits).

use alloc::collections::BTreeMap;
use alloc::string::ToString;
use alloc::vec;
use alloc::vec::Vec;

use crate::BitmapError;

const MAX_TABLE: usize = 4096;

/// Decompress an LZW stream into exactly `expected` bytes.
///
/// Anything that does not line up is corrupt: a code beyond the table, a
/// stream ending before `expected` bytes, or output overrunning it.
pub(crate) fn decompress(
    data: &[u8],
    min_code_size: u8,
    expected: usize,
) -> Result<Vec<u8>, BitmapError> {
    if !(2..=8).contains(&min_code_size) {
        return Err(BitmapError::CorruptData(alloc::format!(
            "invalid LZW minimum code size {min_code_size}"
        )));
    }
    let clear_code = 1u16 << min_code_size;
    let eoi_code = clear_code + 1;

    let mut output = Vec::with_capacity(expected);
    let mut table: Vec<Vec<u8>> = Vec::with_capacity(MAX_TABLE);
    init_table(&mut table, clear_code);
    let mut code_size = u32::from(min_code_size) + 1;
    let mut prev_code: Option<u16> = None;

    let mut bit_pos = 0usize;
    loop {
        if bit_pos + code_size as usize > data.len() * 8 {
            return Err(BitmapError::CorruptData(
                "LZW stream ended without end-of-information".to_string(),
            ));
        }
        let code = read_code(data, bit_pos, code_size);
        bit_pos += code_size as usize;

        if code == clear_code {
            init_table(&mut table, clear_code);
            code_size = u32::from(min_code_size) + 1;
            prev_code = None;
            continue;
        }
        if code == eoi_code {
            break;
        }

        let entry = if usize::from(code) < table.len() {
            table[usize::from(code)].clone()
        } else if usize::from(code) == table.len() {
            // KwKwK case: only valid right after a known code.
            let prev = prev_code.ok_or_else(|| {
                BitmapError::CorruptData("LZW code references empty table".to_string())
            })?;
            let mut entry = table[usize::from(prev)].clone();
            entry.push(entry[0]);
            entry
        } else {
            return Err(BitmapError::CorruptData(alloc::format!(
                "LZW code {code} out of range (table size {})",
                table.len()
            )));
        };

        if output.len() + entry.len() > expected {
            return Err(BitmapError::CorruptData(
                "LZW output exceeds image size".to_string(),
            ));
        }
        output.extend_from_slice(&entry);

        if let Some(prev) = prev_code {
            if table.len() < MAX_TABLE {
                let mut new_entry = table[usize::from(prev)].clone();
                new_entry.push(entry[0]);
                table.push(new_entry);
                if table.len() == (1 << code_size) && code_size < 12 {
                    code_size += 1;
                }
            }
        }
        prev_code = Some(code);

        if output.len() == expected {
            break;
        }
    }

    if output.len() != expected {
        return Err(BitmapError::CorruptData(alloc::format!(
            "LZW stream produced {} of {expected} pixels",
            output.len()
        )));
    }
    Ok(output)
}

fn init_table(table: &mut Vec<Vec<u8>>, clear_code: u16) {
    table.clear();
    for i in 0..=clear_code + 1 {
        if i < clear_code {
            table.push(vec![i as u8]);
        } else {
            table.push(Vec::new()); // clear and EOI placeholders
        }
    }
}

/// LSB-first code extraction.
fn read_code(data: &[u8], bit_pos: usize, code_size: u32) -> u16 {
    let mut code = 0u16;
    let mut bits_read = 0u32;
    while bits_read < code_size {
        let bit_idx = bit_pos + bits_read as usize;
        let byte = data[bit_idx / 8];
        let take = (8 - (bit_idx % 8) as u32).min(code_size - bits_read);
        let mask = ((1u16 << take) - 1) as u8;
        let value = (byte >> (bit_idx % 8)) & mask;
        code |= u16::from(value) << bits_read;
        bits_read += take;
    }
    code
}

/// Compress `data` with the GIF LZW variant.
pub(crate) fn compress(data: &[u8], min_code_size: u8) -> Vec<u8> {
    let clear_code = 1u16 << min_code_size;
    let eoi_code = clear_code + 1;

    let mut output = Vec::new();
    let mut bit_buffer = 0u32;
    let mut bits_in_buffer = 0u32;

    let mut write_code = |output: &mut Vec<u8>, code: u16, code_size: u32| {
        bit_buffer |= u32::from(code) << bits_in_buffer;
        bits_in_buffer += code_size;
        while bits_in_buffer >= 8 {
            output.push((bit_buffer & 0xFF) as u8);
            bit_buffer >>= 8;
            bits_in_buffer -= 8;
        }
    };

    // Strings are keyed as (prefix code, appended byte) so the table
    // stays allocation-light.
    let mut table: BTreeMap<(u16, u8), u16> = BTreeMap::new();
    let mut next_code = eoi_code + 1;
    let mut code_size = u32::from(min_code_size) + 1;

    write_code(&mut output, clear_code, code_size);

    let mut iter = data.iter();
    let Some(&first) = iter.next() else {
        write_code(&mut output, eoi_code, code_size);
        if bits_in_buffer > 0 {
            output.push((bit_buffer & 0xFF) as u8);
        }
        return output;
    };
    let mut current = u16::from(first);

    for &byte in iter {
        if let Some(&code) = table.get(&(current, byte)) {
            current = code;
            continue;
        }
        write_code(&mut output, current, code_size);
        if next_code < MAX_TABLE as u16 {
            table.insert((current, byte), next_code);
            next_code += 1;
            if u32::from(next_code) > (1 << code_size) && code_size < 12 {
                code_size += 1;
            }
        } else {
            write_code(&mut output, clear_code, code_size);
            table.clear();
            next_code = eoi_code + 1;
            code_size = u32::from(min_code_size) + 1;
        }
        current = u16::from(byte);
    }

    write_code(&mut output, current, code_size);
    write_code(&mut output, eoi_code, code_size);
    if bits_in_buffer > 0 {
        output.push((bit_buffer & 0xFF) as u8);
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_small() {
        let data = [0u8, 1, 1, 0, 2, 2, 2, 3, 0, 1];
        let packed = compress(&data, 2);
        let unpacked = decompress(&packed, 2, data.len()).unwrap();
        assert_eq!(unpacked, data);
    }

    #[test]
    fn roundtrip_long_runs_grow_code_width() {
        // Enough repetition to push the table past several width bumps.
        let mut data = Vec::new();
        for i in 0..4096usize {
            data.push((i % 7) as u8);
            data.push((i % 3) as u8);
        }
        let packed = compress(&data, 3);
        let unpacked = decompress(&packed, 3, data.len()).unwrap();
        assert_eq!(unpacked, data);
    }

    #[test]
    fn truncated_stream_is_corrupt() {
        let data = [0u8, 1, 2, 3, 0, 1, 2, 3];
        let mut packed = compress(&data, 2);
        packed.truncate(packed.len() / 2);
        assert!(matches!(
            decompress(&packed, 2, data.len()),
            Err(BitmapError::CorruptData(_))
        ));
    }
}
