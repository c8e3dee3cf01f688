//! Raw byte sequence payload access.
//!
//! NAL unit payloads are stored with emulation prevention bytes inserted.
//! [`remove_emulation_prevention`] recovers the RBSP and [`RbspReader`]
//! reads fixed-width and Exp-Golomb fields from it, reporting the name of
//! the field that ran out of bits.

use std::io::Cursor;

use bitstream_io::{BigEndian, BitRead, BitReader};

use crate::error::BitstreamErrorKind;

/// Result of reading syntax elements; the caller attaches the unit offset.
pub type ParseResult<T> = std::result::Result<T, BitstreamErrorKind>;

/// Strip `0x03` bytes that follow two zero bytes.
pub fn remove_emulation_prevention(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    let mut zeros = 0usize;
    for &byte in data {
        if zeros >= 2 && byte == 0x03 {
            zeros = 0;
            continue;
        }
        if byte == 0 {
            zeros += 1;
        } else {
            zeros = 0;
        }
        out.push(byte);
    }
    out
}

/// Insert emulation prevention bytes so the payload contains no start code.
pub fn add_emulation_prevention(rbsp: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(rbsp.len() + rbsp.len() / 64);
    let mut zeros = 0usize;
    for &byte in rbsp {
        if zeros >= 2 && byte <= 0x03 {
            out.push(0x03);
            zeros = 0;
        }
        if byte == 0 {
            zeros += 1;
        } else {
            zeros = 0;
        }
        out.push(byte);
    }
    out
}

/// Bit reader over an RBSP with a position counter.
pub struct RbspReader<'a> {
    bits: BitReader<Cursor<&'a [u8]>, BigEndian>,
    position: u64,
    len: u64,
    /// Bit index of the `rbsp_stop_one_bit`, if any.
    stop_bit: Option<u64>,
}

impl<'a> RbspReader<'a> {
    pub fn new(rbsp: &'a [u8]) -> Self {
        let stop_bit = rbsp.iter().rposition(|&b| b != 0).map(|i| {
            let byte = rbsp[i];
            i as u64 * 8 + 7 - byte.trailing_zeros() as u64
        });
        Self {
            bits: BitReader::endian(Cursor::new(rbsp), BigEndian),
            position: 0,
            len: rbsp.len() as u64 * 8,
            stop_bit,
        }
    }

    /// Bits consumed so far.
    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn bits_left(&self) -> u64 {
        self.len - self.position
    }

    /// Read an unsigned `n`-bit field, `n <= 32`.
    pub fn u(&mut self, n: u32, field: &'static str) -> ParseResult<u32> {
        if n == 0 {
            return Ok(0);
        }
        if self.bits_left() < n as u64 {
            return Err(BitstreamErrorKind::Truncated { field });
        }
        let value = self
            .bits
            .read::<u32>(n)
            .map_err(|_| BitstreamErrorKind::Truncated { field })?;
        self.position += n as u64;
        Ok(value)
    }

    pub fn flag(&mut self, field: &'static str) -> ParseResult<bool> {
        if self.bits_left() == 0 {
            return Err(BitstreamErrorKind::Truncated { field });
        }
        let bit = self
            .bits
            .read_bit()
            .map_err(|_| BitstreamErrorKind::Truncated { field })?;
        self.position += 1;
        Ok(bit)
    }

    pub fn skip(&mut self, n: u64, field: &'static str) -> ParseResult<()> {
        if self.bits_left() < n {
            return Err(BitstreamErrorKind::Truncated { field });
        }
        let mut left = n;
        while left > 0 {
            let step = left.min(u32::MAX as u64) as u32;
            self.bits
                .skip(step)
                .map_err(|_| BitstreamErrorKind::Truncated { field })?;
            left -= step as u64;
        }
        self.position += n;
        Ok(())
    }

    /// Unsigned Exp-Golomb, `ue(v)`.
    pub fn ue(&mut self, field: &'static str) -> ParseResult<u32> {
        let mut leading_zeros = 0u32;
        while !self.flag(field)? {
            leading_zeros += 1;
            if leading_zeros > 31 {
                return Err(BitstreamErrorKind::ExpGolombOverflow { field });
            }
        }
        let suffix = self.u(leading_zeros, field)? as u64;
        let value = (1u64 << leading_zeros) - 1 + suffix;
        u32::try_from(value).map_err(|_| BitstreamErrorKind::ExpGolombOverflow { field })
    }

    /// Signed Exp-Golomb, `se(v)`.
    pub fn se(&mut self, field: &'static str) -> ParseResult<i32> {
        let k = self.ue(field)? as i64;
        let value = if k % 2 == 1 { (k + 1) / 2 } else { -(k / 2) };
        Ok(value as i32)
    }

    /// `ue(v)` with an inclusive upper bound.
    pub fn ue_max(&mut self, field: &'static str, max: u32) -> ParseResult<u32> {
        let value = self.ue(field)?;
        if value > max {
            return Err(BitstreamErrorKind::OutOfRange {
                field,
                value: value as u64,
            });
        }
        Ok(value)
    }

    /// Whether syntax data remains before the trailing stop bit.
    pub fn more_rbsp_data(&self) -> bool {
        match self.stop_bit {
            Some(stop) => self.position < stop,
            None => false,
        }
    }
}

/// Number of bits needed to code values in `0..count`, i.e. `Ceil(Log2(count))`.
pub fn ceil_log2(count: u32) -> u32 {
    if count <= 1 {
        0
    } else {
        32 - (count - 1).leading_zeros()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remove_emulation_prevention() {
        let input = [0x00, 0x00, 0x03, 0x01, 0x00, 0x00, 0x03, 0x02];
        assert_eq!(
            remove_emulation_prevention(&input),
            vec![0x00, 0x00, 0x01, 0x00, 0x00, 0x02]
        );
        // A 0x03 not preceded by two zeros stays.
        assert_eq!(remove_emulation_prevention(&[0, 3, 0, 3]), vec![0, 3, 0, 3]);
    }

    #[test]
    fn test_add_emulation_prevention() {
        let rbsp = [0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0xFF];
        let escaped = add_emulation_prevention(&rbsp);
        assert_eq!(
            escaped,
            vec![0x00, 0x00, 0x03, 0x01, 0x00, 0x00, 0x03, 0x00, 0x00, 0xFF]
        );
        assert_eq!(remove_emulation_prevention(&escaped), rbsp.to_vec());
    }

    #[test]
    fn test_exp_golomb() {
        // 1 | 010 | 011 | 00100 | 00101 -> ue 0, 1, 2, 3, 4
        // packed: 1010 0110 0100 0010 1000 0000
        let data = [0b1010_0110, 0b0100_0010, 0b1000_0000];
        let mut r = RbspReader::new(&data);
        assert_eq!(r.ue("a").unwrap(), 0);
        assert_eq!(r.ue("b").unwrap(), 1);
        assert_eq!(r.ue("c").unwrap(), 2);
        assert_eq!(r.ue("d").unwrap(), 3);
        assert_eq!(r.ue("e").unwrap(), 4);
        assert_eq!(r.position(), 17);
    }

    #[test]
    fn test_signed_exp_golomb() {
        // ue 1 -> +1, ue 2 -> -1, ue 3 -> +2
        let data = [0b0100_1100, 0b1000_0000];
        let mut r = RbspReader::new(&data);
        assert_eq!(r.se("a").unwrap(), 1);
        assert_eq!(r.se("b").unwrap(), -1);
        assert_eq!(r.se("c").unwrap(), 2);
    }

    #[test]
    fn test_exp_golomb_overflow() {
        let data = [0u8; 8];
        let mut r = RbspReader::new(&data);
        assert_eq!(
            r.ue("slice_type"),
            Err(BitstreamErrorKind::ExpGolombOverflow { field: "slice_type" })
        );
    }

    #[test]
    fn test_truncated_field() {
        let data = [0xFF];
        let mut r = RbspReader::new(&data);
        assert_eq!(r.u(6, "x").unwrap(), 0x3F);
        assert_eq!(
            r.u(4, "level_idc"),
            Err(BitstreamErrorKind::Truncated { field: "level_idc" })
        );
        // Failed read leaves the position untouched.
        assert_eq!(r.position(), 6);
    }

    #[test]
    fn test_more_rbsp_data() {
        // one flag, then stop bit
        let data = [0b1100_0000];
        let mut r = RbspReader::new(&data);
        assert!(r.more_rbsp_data());
        r.flag("f").unwrap();
        assert!(!r.more_rbsp_data());
    }

    #[test]
    fn test_ceil_log2() {
        assert_eq!(ceil_log2(1), 0);
        assert_eq!(ceil_log2(2), 1);
        assert_eq!(ceil_log2(3), 2);
        assert_eq!(ceil_log2(510), 9);
        assert_eq!(ceil_log2(512), 9);
        assert_eq!(ceil_log2(513), 10);
    }
}
