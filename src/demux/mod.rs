//! # MPEG Transport Stream Demultiplexing
//!
//! Turns batches of transport stream packets into decoded units:
//!
//! - PAT and PMT sections, with the PAT feeding a [`ProgramMap`]
//! - PES packets with their optional header and PTS/DTS timestamps
//!
//! Packets are grouped by PID. Each PID is classified as PSI (reserved PSI
//! PIDs and PMT PIDs the program map knows about) or PES (payload opens with
//! the `00 00 01` start code), and its payloads are reassembled into
//! complete units before decoding. The conditional access PID is ignored.
//!
//! ## Batch processing
//!
//! ```rust
//! use bytes::{BufMut, BytesMut};
//! use tsdemux::demux::{process, Packet, PatProgram, PatSection, ProgramMap, PsiTable};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let pat = PatSection {
//!     transport_stream_id: 1,
//!     version: 0,
//!     current_next: true,
//!     network_pid: None,
//!     programs: vec![PatProgram { program_number: 1, pmt_pid: 0x1000 }],
//! };
//! let mut payload = BytesMut::new();
//! payload.put_u8(0); // pointer field
//! pat.write_section(&mut payload)?;
//!
//! let mut program_map = ProgramMap::new();
//! let data = process(&[Packet::new(0, true, payload.freeze())], None, &mut program_map)?;
//!
//! assert_eq!(data[0].as_psi(), Some(&PsiTable::Pat(pat)));
//! assert_eq!(program_map.get(0x1000), Some(1));
//! # Ok(())
//! # }
//! ```
//!
//! ## Streaming
//!
//! [`Dispatcher`] treats every batch as self-contained. A [`Session`] keeps
//! partial units between calls, so units may span batch boundaries.

/// PID classification
pub mod classify;

/// Batch processing and the caller override hook
pub mod dispatcher;

/// Raw 188-byte packet framing
pub mod packet;

/// PES packet decoding and encoding
pub mod pes;

/// PMT PID to program number mapping
pub mod program_map;

/// PAT/PMT section decoding and encoding
pub mod psi;

/// Per-PID unit reassembly
pub mod reassembler;

/// Cross-batch demultiplexing
pub mod session;

/// Core types and constants
pub mod types;


pub use classify::{classify, is_pes, is_psi, PayloadKind};
pub use dispatcher::{process, BatchOverride, Dispatcher, OverrideOutput};
pub use packet::parse_packets;
pub use pes::{PesData, PesOptionalHeader};
pub use program_map::{ProgramMap, SharedProgramMap};
pub use psi::{PatProgram, PatSection, PmtSection, PmtStream, PsiTable};
pub use reassembler::Reassembler;
pub use session::Session;
pub use types::{Data, DataPayload, Decoded, Packet, PacketHeader};
