//! Streaming demultiplexing across consecutive batches.

use super::dispatcher::{demux_groups, run_override, BatchEnd, BatchOverride, Overridden};
use super::program_map::ProgramMap;
use super::reassembler::Reassembler;
use super::types::{Data, Packet};
use crate::config::DemuxConfig;
use crate::error::Result;

/// Owns a program map and per-PID reassembly state, so units and PAT
/// knowledge survive from one [`feed`](Session::feed) to the next.
///
/// ```
/// use tsdemux::demux::{Packet, Session};
///
/// let mut session = Session::new();
/// let head = Packet::new(0x100, true, vec![0x00, 0x00, 0x01, 0xE0, 0x00, 0x05, 0x80, 0x00, 0x00]);
/// assert!(session.feed(&[head], None).unwrap().is_empty());
///
/// let tail = Packet::new(0x100, false, vec![0xAB, 0xCD]);
/// let data = session.feed(&[tail], None).unwrap();
/// assert_eq!(data[0].as_pes().unwrap().payload.as_ref(), &[0xAB, 0xCD]);
/// ```
#[derive(Debug, Default)]
pub struct Session {
    config: DemuxConfig,
    program_map: ProgramMap,
    reassembler: Reassembler,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: DemuxConfig) -> Self {
        Self::with_program_map(config, ProgramMap::new())
    }

    /// Starts from an already known program map.
    pub fn with_program_map(config: DemuxConfig, program_map: ProgramMap) -> Self {
        Self {
            reassembler: Reassembler::new(&config),
            config,
            program_map,
        }
    }

    pub fn config(&self) -> &DemuxConfig {
        &self.config
    }

    pub fn program_map(&self) -> &ProgramMap {
        &self.program_map
    }

    pub fn program_map_mut(&mut self) -> &mut ProgramMap {
        &mut self.program_map
    }

    /// Number of PIDs with a unit still being accumulated.
    pub fn pending_units(&self) -> usize {
        self.reassembler.pending()
    }

    /// Decodes the units completed by `packets`. Partial units stay
    /// buffered; unbounded PES units complete on their next unit start or on
    /// [`flush`](Session::flush).
    pub fn feed(
        &mut self,
        packets: &[Packet],
        batch_override: Option<&mut dyn BatchOverride>,
    ) -> Result<Vec<Data>> {
        let mut out = match run_override(packets, batch_override)? {
            Overridden::Done(data) => return Ok(data),
            Overridden::Continue(data) => data,
        };

        demux_groups(
            packets,
            &mut self.program_map,
            &mut self.reassembler,
            BatchEnd::Carry,
            &mut out,
        )?;
        log::trace!(
            "fed {} packets, {} units out, {} pending",
            packets.len(),
            out.len(),
            self.reassembler.pending()
        );
        Ok(out)
    }

    /// Completes every unbounded PES unit still buffered, in PID order.
    /// Partial PSI sections and bounded PES packets stay buffered.
    pub fn flush(&mut self) -> Result<Vec<Data>> {
        self.reassembler.complete_all_unbounded()
    }

    /// Forgets buffered units and the program map.
    pub fn reset(&mut self) {
        log::debug!(
            "session reset, dropping {} pending units",
            self.reassembler.pending()
        );
        self.reassembler.clear();
        self.program_map.reset();
    }
}
