//! Strict byte cursor shared by the decoders.
//!
//! Every read past the end of the input is a hard
//! [`BitmapError::CorruptData`]; truncated files never decode partially.

use alloc::string::ToString;

use crate::BitmapError;

pub(crate) fn eof() -> BitmapError {
    BitmapError::CorruptData("unexpected end of data".to_string())
}

pub(crate) struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub(crate) fn position(&self) -> usize {
        self.pos
    }

    pub(crate) fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    pub(crate) fn seek(&mut self, pos: usize) -> Result<(), BitmapError> {
        if pos > self.data.len() {
            return Err(eof());
        }
        self.pos = pos;
        Ok(())
    }

    pub(crate) fn skip(&mut self, n: usize) -> Result<(), BitmapError> {
        let new_pos = self.pos.checked_add(n).ok_or_else(eof)?;
        self.seek(new_pos)
    }

    pub(crate) fn u8(&mut self) -> Result<u8, BitmapError> {
        let b = *self.data.get(self.pos).ok_or_else(eof)?;
        self.pos += 1;
        Ok(b)
    }

    pub(crate) fn u16_le(&mut self) -> Result<u16, BitmapError> {
        Ok(u16::from_le_bytes(self.array()?))
    }

    pub(crate) fn u32_le(&mut self) -> Result<u32, BitmapError> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    pub(crate) fn u32_be(&mut self) -> Result<u32, BitmapError> {
        Ok(u32::from_be_bytes(self.array()?))
    }

    pub(crate) fn array<const N: usize>(&mut self) -> Result<[u8; N], BitmapError> {
        let mut buf = [0u8; N];
        buf.copy_from_slice(self.bytes(N)?);
        Ok(buf)
    }

    pub(crate) fn bytes(&mut self, n: usize) -> Result<&'a [u8], BitmapError> {
        let end = self.pos.checked_add(n).ok_or_else(eof)?;
        if end > self.data.len() {
            return Err(eof());
        }
        let out = &self.data[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    pub(crate) fn read_into(&mut self, buf: &mut [u8]) -> Result<(), BitmapError> {
        let src = self.bytes(buf.len())?;
        buf.copy_from_slice(src);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_advance() {
        let mut r = Reader::new(&[1, 2, 3, 4, 5]);
        assert_eq!(r.u8().unwrap(), 1);
        assert_eq!(r.u16_le().unwrap(), 0x0302);
        assert_eq!(r.position(), 3);
        assert_eq!(r.remaining(), 2);
    }

    #[test]
    fn truncation_is_corrupt_data() {
        let mut r = Reader::new(&[1]);
        assert!(matches!(r.u32_be(), Err(BitmapError::CorruptData(_))));
        assert!(matches!(r.skip(2), Err(BitmapError::CorruptData(_))));
    }
}
