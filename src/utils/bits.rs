use crate::error::{DemuxError, Result};

/// A bit-level reader for packed big-endian header fields.
///
/// PES flag bytes and PTS/DTS timestamps are read through this type so that
/// field widths in the decoder match the widths in ISO/IEC 13818-1.
///
/// Example:
/// ```
/// use tsdemux::utils::BitReader;
///
/// let data = [0b10110011];
/// let mut reader = BitReader::new(&data);
///
/// assert_eq!(reader.read_bit().unwrap(), true);   // 1
/// assert_eq!(reader.read_bits(3).unwrap(), 0b011); // 011
/// ```
pub struct BitReader<'a> {
    data: &'a [u8],
    byte_offset: usize,
    bit_offset: u8,
}

impl<'a> BitReader<'a> {
    /// Creates a new BitReader from a byte slice
    pub fn new(data: &'a [u8]) -> Self {
        BitReader {
            data,
            byte_offset: 0,
            bit_offset: 0,
        }
    }

    /// Reads a single bit from the stream.
    /// Returns true for 1, false for 0.
    ///
    /// Returns error if end of data is reached.
    pub fn read_bit(&mut self) -> Result<bool> {
        if self.byte_offset >= self.data.len() {
            return Err(DemuxError::Bitstream("reached end of data".into()));
        }

        let bit = (self.data[self.byte_offset] >> (7 - self.bit_offset)) & 1;
        self.bit_offset += 1;

        if self.bit_offset == 8 {
            self.bit_offset = 0;
            self.byte_offset += 1;
        }

        Ok(bit == 1)
    }

    /// Reads n bits and returns them as a number.
    /// The bits are interpreted as big-endian.
    ///
    /// Returns error if n > 32 or end of data is reached.
    pub fn read_bits(&mut self, n: u32) -> Result<u32> {
        if n > 32 {
            return Err(DemuxError::Bitstream(format!("too many bits requested: {}", n)));
        }
        if (n as usize) > self.available_bits() {
            return Err(DemuxError::Bitstream(format!(
                "requested {} bits, {} available",
                n,
                self.available_bits()
            )));
        }

        let mut value = 0u32;
        let n = n as usize;

        for i in 0..n {
            let bit = self.read_bit()?;
            if bit {
                value |= 1 << (n - 1 - i);
            }
        }

        Ok(value)
    }

    /// Reads a single bit that must be set, as used by MPEG marker bits.
    pub fn read_marker(&mut self) -> Result<bool> {
        self.read_bit()
    }

    /// Skips n bits in the stream.
    pub fn skip_bits(&mut self, n: u32) -> Result<()> {
        if (n as usize) > self.available_bits() {
            return Err(DemuxError::Bitstream(format!("cannot skip {} bits", n)));
        }
        for _ in 0..n {
            self.read_bit()?;
        }
        Ok(())
    }

    /// Returns number of bits available to read.
    pub fn available_bits(&self) -> usize {
        (self.data.len().saturating_sub(self.byte_offset)) * 8 - self.bit_offset as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use quickcheck_macros::quickcheck;

    #[test]
    fn test_read_bits() {
        // Simple pattern within a byte
        let data = [0b10110011];
        let mut reader = BitReader::new(&data);
        assert_eq!(reader.read_bits(3).unwrap(), 0b101);
        assert_eq!(reader.read_bits(5).unwrap(), 0b10011);

        // Cross-byte boundary
        let data = [0b10110011, 0b01011010];
        let mut reader = BitReader::new(&data);
        assert_eq!(reader.read_bits(3).unwrap(), 0b101);
        assert_eq!(reader.read_bits(8).unwrap(), 0b10011010);

        // Reading zero bits
        let data = [0b10101010];
        let mut reader = BitReader::new(&data);
        assert_eq!(reader.read_bits(0).unwrap(), 0);

        // Error on too many bits
        let data = [0xFF];
        let mut reader = BitReader::new(&data);
        assert!(reader.read_bits(33).is_err());

        // Cross multiple byte boundaries
        let data = [0b10110011, 0b11001100, 0b10101010];
        let mut reader = BitReader::new(&data);
        assert_eq!(reader.read_bits(20).unwrap(), 0b10110011110011001010);
    }

    #[test]
    fn test_timestamp_layout() {
        // PTS 0x1_0000_0001 packed as 0010 | 100 | 1, 15 zero bits | 1, 000000000000001 | 1
        let data = [0x29, 0x00, 0x01, 0x00, 0x03];
        let mut reader = BitReader::new(&data);
        assert_eq!(reader.read_bits(4).unwrap(), 0b0010);
        assert_eq!(reader.read_bits(3).unwrap(), 0b100);
        assert!(reader.read_marker().unwrap());
        assert_eq!(reader.read_bits(15).unwrap(), 0);
        assert!(reader.read_marker().unwrap());
        assert_eq!(reader.read_bits(15).unwrap(), 1);
        assert!(reader.read_marker().unwrap());
        assert_eq!(reader.available_bits(), 0);
    }

    #[test]
    fn test_error_cases() {
        // Reading past end of data
        let data = [0xFF];
        let mut reader = BitReader::new(&data);
        reader.read_bits(8).unwrap();
        assert!(reader.read_bit().is_err());

        // Over-long read leaves the reader untouched
        let data = [0xFF];
        let mut reader = BitReader::new(&data);
        assert!(reader.read_bits(9).is_err());
        assert_eq!(reader.available_bits(), 8);

        // Skipping within and past the data
        let data = [0xFF, 0x00];
        let mut reader = BitReader::new(&data);
        reader.skip_bits(3).unwrap();
        assert_eq!(reader.bit_offset, 3);
        assert_eq!(reader.byte_offset, 0);
        reader.skip_bits(5).unwrap();
        assert_eq!(reader.byte_offset, 1);
        assert!(reader.skip_bits(9).is_err());
        reader.skip_bits(8).unwrap();
        assert_eq!(reader.available_bits(), 0);
    }

    #[quickcheck]
    fn prop_read_bits_matches_manual(data: Vec<u8>, n: u8) -> bool {
        if data.is_empty() {
            return true;
        }

        let mut reader = BitReader::new(&data);
        let n = n % 32;

        match reader.read_bits(n as u32) {
            Ok(result) => {
                let mut expected = 0u32;
                for i in 0..n as usize {
                    let byte_idx = i / 8;
                    let bit_idx = 7 - (i % 8);
                    if byte_idx >= data.len() {
                        return false;
                    }
                    let bit = (data[byte_idx] >> bit_idx) & 1;
                    expected |= (bit as u32) << (n as usize - 1 - i);
                }
                result == expected
            }
            Err(_) => (n as usize) > data.len() * 8,
        }
    }
}
