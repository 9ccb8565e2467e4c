//! Big-endian cursor over class-file bytes

use super::error::{ClassFormatError, ClassFormatResult};

pub struct ByteReader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, offset: 0 }
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.offset
    }

    pub fn take(&mut self, n: usize) -> ClassFormatResult<&'a [u8]> {
        if self.remaining() < n {
            return Err(ClassFormatError::Truncated { offset: self.offset, needed: n - self.remaining() });
        }
        let slice = &self.bytes[self.offset..self.offset + n];
        self.offset += n;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> ClassFormatResult<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub fn u8(&mut self) -> ClassFormatResult<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn u16(&mut self) -> ClassFormatResult<u16> {
        Ok(u16::from_be_bytes(self.array()?))
    }

    pub fn u32(&mut self) -> ClassFormatResult<u32> {
        Ok(u32::from_be_bytes(self.array()?))
    }

    pub fn i32(&mut self) -> ClassFormatResult<i32> {
        Ok(i32::from_be_bytes(self.array()?))
    }

    pub fn i64(&mut self) -> ClassFormatResult<i64> {
        Ok(i64::from_be_bytes(self.array()?))
    }

    pub fn f32(&mut self) -> ClassFormatResult<f32> {
        Ok(f32::from_bits(self.u32()?))
    }

    pub fn f64(&mut self) -> ClassFormatResult<f64> {
        Ok(f64::from_bits(u64::from_be_bytes(self.array()?)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reads_big_endian() {
        let mut reader = ByteReader::new(&[0xCA, 0xFE, 0xBA, 0xBE, 0x00, 0x32, 0x07]);
        assert_eq!(reader.u32(), Ok(0xCAFEBABE));
        assert_eq!(reader.u16(), Ok(50));
        assert_eq!(reader.u8(), Ok(7));
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn test_truncation_reports_offset() {
        let mut reader = ByteReader::new(&[0x00, 0x01, 0x02]);
        reader.u8().unwrap();
        assert_eq!(reader.u32(), Err(ClassFormatError::Truncated { offset: 1, needed: 2 }));
    }
}
