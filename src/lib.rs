#![doc(html_root_url = "https://docs.rs/tsdemux/0.1.0")]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(rustdoc::missing_crate_level_docs)]

//! # tsdemux - MPEG Transport Stream demultiplexer
//!
//! `tsdemux` turns MPEG transport stream packets into decoded PSI tables and
//! PES packets. It tracks the program map announced by the PAT, so PMT PIDs
//! are recognised as soon as the PAT that lists them has been decoded.
//!
//! ## Features
//!
//! - 188-byte packet framing with adaptation field skipping
//! - PAT and PMT section decoding with CRC-32/MPEG-2 verification
//! - PES decoding, including the optional header and PTS/DTS timestamps
//! - Reassembly of units split over several packets, per PID
//! - Batch processing with a caller override hook, or a streaming
//!   [`Session`](demux::Session) that carries partial units across batches
//!
//! ## Quick Start
//!
//! ```rust
//! use tsdemux::demux::{parse_packets, Session};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let raw: Vec<u8> = Vec::new(); // a multiple of 188 bytes read from a capture
//! let packets = parse_packets(&raw)?;
//!
//! let mut session = Session::new();
//! for data in session.feed(&packets, None)? {
//!     println!("PID {}: {:?}", data.pid, data.payload);
//! }
//! for data in session.flush()? {
//!     println!("PID {}: {:?}", data.pid, data.payload);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Overview
//!
//! - `demux`: classification, reassembly and decoding of transport stream
//!   payloads
//! - `config`: engine settings loaded from the environment or a file
//! - `error`: error type and result alias
//! - `utils`: bit reading and CRC calculation

/// Engine configuration
pub mod config;

/// Transport stream demultiplexing
pub mod demux;

/// Error types and utilities
pub mod error;

/// Common utilities and helper functions
pub mod utils;

pub use config::DemuxConfig;
pub use error::{DemuxError, Result};
