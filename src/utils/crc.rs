//! CRC-32/MPEG-2 as used by PSI sections (ISO/IEC 13818-1 Annex A).
//!
//! Polynomial 0x04C11DB7, initial value 0xFFFFFFFF, no reflection and no
//! final XOR.

const POLYNOMIAL: u32 = 0x04C1_1DB7;

/// Byte-wise lookup table, built at compile time.
static TABLE: [u32; 256] = build_table();

const fn build_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut byte = 0;
    while byte < 256 {
        let mut crc = (byte as u32) << 24;
        let mut bit = 0;
        while bit < 8 {
            let carry = crc & 0x8000_0000 != 0;
            crc <<= 1;
            if carry {
                crc ^= POLYNOMIAL;
            }
            bit += 1;
        }
        table[byte] = crc;
        byte += 1;
    }
    table
}

/// MPEG-2 CRC32 calculator used for PSI section validation and encoding.
///
/// Running the calculator over a whole section including its trailing CRC
/// field yields zero when the section is intact.
#[derive(Debug, Clone, Copy, Default)]
pub struct Crc32Mpeg2;

impl Crc32Mpeg2 {
    pub fn new() -> Self {
        Self
    }

    /// Checksum of `data`.
    ///
    /// ```
    /// use tsdemux::utils::Crc32Mpeg2;
    ///
    /// let crc = Crc32Mpeg2::new();
    /// assert_eq!(crc.calculate(b"123456789"), 0x0376_E6E7);
    /// ```
    pub fn calculate(&self, data: &[u8]) -> u32 {
        data.iter().fold(0xFFFF_FFFF, |crc, &byte| {
            (crc << 8) ^ TABLE[((crc >> 24) as u8 ^ byte) as usize]
        })
    }
}
