//! # Utility Functions and Types
//!
//! Helpers shared by the PSI and PES decoders:
//!
//! - Bit-level reading for packed header fields
//! - CRC-32/MPEG-2 calculation for PSI section validation
//!
//! ## Bit Operations
//!
//! ```rust
//! use tsdemux::utils::BitReader;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let data = vec![0b10110011u8];
//! let mut reader = BitReader::new(&data);
//!
//! let value = reader.read_bits(3)?; // Reads first 3 bits (101)
//! assert_eq!(value, 0b101);
//! # Ok(())
//! # }
//! ```
//!
//! ## CRC Calculation
//!
//! ```rust
//! use tsdemux::utils::Crc32Mpeg2;
//!
//! let crc = Crc32Mpeg2::new();
//! assert_eq!(crc.calculate(&[0x01, 0x01]), 0xD66FB816);
//! ```

/// Bitstream reading utilities
pub mod bits;

/// CRC calculation implementations
pub mod crc;

pub use bits::BitReader;
pub use crc::Crc32Mpeg2;
