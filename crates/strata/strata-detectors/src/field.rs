// Little-endian unsigned field at a fixed byte offset.
//
// Every wire and record layout in this crate is described as a list of these,
// so a layout change is a constant change, checked by the const asserts next to
// each layout.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    pub offset: usize,
    pub width: usize,
}

impl Field {
    pub const fn new(offset: usize, width: usize) -> Self {
        assert!(width >= 1 && width <= 8, "field width must be 1..=8 bytes");
        Self { offset, width }
    }

    /// First byte past the field.
    pub const fn end(&self) -> usize {
        self.offset + self.width
    }

    /// # Panics
    /// Panics if `bytes` is shorter than [`Field::end`]; layouts check lengths first.
    #[inline]
    pub fn read(&self, bytes: &[u8]) -> u64 {
        let mut buf = [0u8; 8];
        buf[..self.width].copy_from_slice(&bytes[self.offset..self.end()]);
        u64::from_le_bytes(buf)
    }

    /// Writes the low `width` bytes of `value`.
    #[inline]
    pub fn write(&self, bytes: &mut [u8], value: u64) {
        bytes[self.offset..self.end()].copy_from_slice(&value.to_le_bytes()[..self.width]);
    }

    #[inline]
    pub fn read_f64(&self, bytes: &[u8]) -> f64 {
        f64::from_bits(self.read(bytes))
    }

    #[inline]
    pub fn write_f64(&self, bytes: &mut [u8], value: f64) {
        self.write(bytes, value.to_bits());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_little_endian() {
        let bytes = [0xFF, 0x34, 0x12, 0x00];
        assert_eq!(Field::new(1, 2).read(&bytes), 0x1234);
        assert_eq!(Field::new(0, 1).read(&bytes), 0xFF);
    }

    #[test]
    fn write_truncates_to_width() {
        let mut bytes = [0u8; 4];
        Field::new(1, 2).write(&mut bytes, 0xABCD_1234);
        assert_eq!(bytes, [0x00, 0x34, 0x12, 0x00]);
    }

    #[test]
    fn f64_fields_keep_bits() {
        let mut bytes = [0u8; 8];
        let f = Field::new(0, 8);
        f.write_f64(&mut bytes, 12345.0);
        assert_eq!(f.read_f64(&bytes), 12345.0);
    }
}
