//! Per-PID accumulation of payload fragments into complete units.
//!
//! A PID is idle until a packet with `payload_unit_start` arrives, then
//! accumulates every following payload on that PID. After each append the
//! matching decoder is offered the buffer: PSI sections complete from their
//! own length field, bounded PES packets from their packet length. Unbounded
//! PES packets (length zero) complete on the next unit start, or when the
//! owner calls [`Reassembler::complete_unbounded`].

use super::classify::PayloadKind;
use super::pes;
use super::program_map::ProgramMap;
use super::psi;
use super::types::{Data, Decoded, Packet};
use crate::config::DemuxConfig;
use crate::error::{DemuxError, Result};
use bytes::{Buf, BytesMut};
use std::collections::HashMap;

#[derive(Debug)]
struct PendingUnit {
    kind: PayloadKind,
    buf: BytesMut,
}

#[derive(Debug)]
pub struct Reassembler {
    units: HashMap<u16, PendingUnit>,
    max_unit_size: usize,
    verify_crc: bool,
}

impl Default for Reassembler {
    fn default() -> Self {
        Self::new(&DemuxConfig::default())
    }
}

impl Reassembler {
    pub fn new(config: &DemuxConfig) -> Self {
        Self {
            units: HashMap::new(),
            max_unit_size: config.max_unit_size,
            verify_crc: config.verify_crc,
        }
    }

    /// Kind of the unit currently accumulating on `pid`, if any.
    pub fn open_kind(&self, pid: u16) -> Option<PayloadKind> {
        self.units.get(&pid).map(|unit| unit.kind)
    }

    /// Bytes buffered for `pid`.
    pub fn buffered(&self, pid: u16) -> usize {
        self.units.get(&pid).map_or(0, |unit| unit.buf.len())
    }

    /// Number of PIDs with a unit in progress.
    pub fn pending(&self) -> usize {
        self.units.len()
    }

    /// Feeds one packet of a PID already classified as `kind`, appending
    /// every unit it completes to `out`.
    pub fn push(
        &mut self,
        kind: PayloadKind,
        packet: &Packet,
        program_map: &mut ProgramMap,
        out: &mut Vec<Data>,
    ) -> Result<()> {
        self.accept(kind, packet, packet.is_unit_start(), program_map, out)
    }

    /// Like [`push`](Self::push), but opens a new unit with `packet` even
    /// when its header does not flag a unit start.
    pub fn push_unit_start(
        &mut self,
        kind: PayloadKind,
        packet: &Packet,
        program_map: &mut ProgramMap,
        out: &mut Vec<Data>,
    ) -> Result<()> {
        self.accept(kind, packet, true, program_map, out)
    }

    fn accept(
        &mut self,
        kind: PayloadKind,
        packet: &Packet,
        unit_start: bool,
        program_map: &mut ProgramMap,
        out: &mut Vec<Data>,
    ) -> Result<()> {
        let pid = packet.pid();
        if unit_start {
            match kind {
                PayloadKind::Psi => self.start_psi(pid, &packet.payload, program_map, out)?,
                PayloadKind::Pes => self.start_pes(pid, &packet.payload, out)?,
            }
        } else {
            let Some(unit) = self.units.get_mut(&pid) else {
                log::trace!("PID {}: dropping fragment without unit start", pid);
                return Ok(());
            };
            if unit.kind != kind {
                log::warn!(
                    "PID {}: reclassified from {:?} to {:?}, dropping {} buffered bytes",
                    pid,
                    unit.kind,
                    kind,
                    unit.buf.len()
                );
                self.units.remove(&pid);
                return Ok(());
            }
            unit.buf.extend_from_slice(&packet.payload);
        }

        if self.buffered(pid) > self.max_unit_size {
            log::warn!(
                "PID {}: unit exceeds {} bytes, discarding",
                pid,
                self.max_unit_size
            );
            self.units.remove(&pid);
            return Ok(());
        }

        self.drain(pid, program_map, out)
    }

    fn start_psi(
        &mut self,
        pid: u16,
        payload: &[u8],
        program_map: &mut ProgramMap,
        out: &mut Vec<Data>,
    ) -> Result<()> {
        let Some(&pointer) = payload.first() else {
            self.drop_stale(pid);
            return Ok(());
        };
        let start = 1 + pointer as usize;
        if start > payload.len() {
            self.units.remove(&pid);
            return Err(DemuxError::MalformedSection(format!(
                "pointer field {} beyond payload of {} bytes",
                pointer,
                payload.len()
            )));
        }

        // Bytes before the pointer target close the section already open.
        if let Some(unit) = self.units.get_mut(&pid) {
            if unit.kind == PayloadKind::Psi {
                unit.buf.extend_from_slice(&payload[1..start]);
                self.drain(pid, program_map, out)?;
            }
            self.drop_stale(pid);
        }

        self.units.insert(
            pid,
            PendingUnit {
                kind: PayloadKind::Psi,
                buf: BytesMut::from(&payload[start..]),
            },
        );
        Ok(())
    }

    fn start_pes(&mut self, pid: u16, payload: &[u8], out: &mut Vec<Data>) -> Result<()> {
        if self.open_kind(pid) == Some(PayloadKind::Pes) {
            if let Some(data) = self.complete_unbounded(pid)? {
                out.push(data);
            }
        }
        self.drop_stale(pid);

        self.units.insert(
            pid,
            PendingUnit {
                kind: PayloadKind::Pes,
                buf: BytesMut::from(payload),
            },
        );
        Ok(())
    }

    /// Drops the unit a new unit start interrupted. A PSI unit whose
    /// sections all decoded is not stale, only waiting for more.
    fn drop_stale(&mut self, pid: u16) {
        if let Some(stale) = self.units.remove(&pid) {
            if stale.kind == PayloadKind::Psi && stale.buf.is_empty() {
                return;
            }
            log::warn!(
                "PID {}: new unit start, discarding {} bytes of an unfinished {:?} unit",
                pid,
                stale.buf.len(),
                stale.kind
            );
        }
    }

    /// Offers the buffered bytes of `pid` to its decoder.
    fn drain(&mut self, pid: u16, program_map: &mut ProgramMap, out: &mut Vec<Data>) -> Result<()> {
        let Some(unit) = self.units.get_mut(&pid) else {
            return Ok(());
        };

        let done = match unit.kind {
            PayloadKind::Psi => match psi::decode_sections(&unit.buf, program_map, self.verify_crc) {
                Ok(run) => {
                    log::trace!("PID {}: {} PSI tables decoded", pid, run.tables.len());
                    out.extend(run.tables.into_iter().map(|table| Data::psi(pid, table)));
                    unit.buf.advance(run.consumed);
                    run.finished
                }
                Err(err) => {
                    self.units.remove(&pid);
                    return Err(err);
                }
            },
            PayloadKind::Pes => {
                if pes::declared_unit_size(&unit.buf).is_none() {
                    return Ok(());
                }
                match pes::decode(&unit.buf) {
                    Ok(Decoded::Incomplete) => false,
                    Ok(Decoded::Complete { value, consumed }) => {
                        if consumed < unit.buf.len() {
                            log::debug!(
                                "PID {}: {} bytes after bounded PES packet ignored",
                                pid,
                                unit.buf.len() - consumed
                            );
                        }
                        log::trace!("PID {}: PES packet of {} bytes", pid, consumed);
                        out.push(Data::pes(pid, value));
                        true
                    }
                    Err(err) => {
                        self.units.remove(&pid);
                        return Err(err);
                    }
                }
            }
        };

        if done {
            self.units.remove(&pid);
        }
        Ok(())
    }

    /// Completes an unbounded PES unit on `pid` with whatever has been
    /// buffered. Bounded and PSI units are left untouched.
    pub fn complete_unbounded(&mut self, pid: u16) -> Result<Option<Data>> {
        match self.units.get(&pid) {
            Some(unit)
                if unit.kind == PayloadKind::Pes
                    && unit.buf.len() >= pes::PES_FIXED_HEADER_SIZE
                    && pes::declared_unit_size(&unit.buf).is_none() => {}
            _ => return Ok(None),
        }

        let Some(unit) = self.units.remove(&pid) else {
            return Ok(None);
        };
        match pes::decode(&unit.buf)? {
            Decoded::Complete { value, .. } => {
                log::trace!("PID {}: unbounded PES packet of {} bytes", pid, unit.buf.len());
                Ok(Some(Data::pes(pid, value)))
            }
            Decoded::Incomplete => {
                log::warn!(
                    "PID {}: unbounded PES packet ended inside its header, discarding",
                    pid
                );
                Ok(None)
            }
        }
    }

    /// Completes every unbounded PES unit, in PID order.
    pub fn complete_all_unbounded(&mut self) -> Result<Vec<Data>> {
        let mut pids: Vec<u16> = self
            .units
            .iter()
            .filter(|(_, unit)| unit.kind == PayloadKind::Pes)
            .map(|(&pid, _)| pid)
            .collect();
        pids.sort_unstable();

        let mut out = Vec::new();
        for pid in pids {
            if let Some(data) = self.complete_unbounded(pid).map_err(|err| err.at_pid(pid))? {
                out.push(data);
            }
        }
        Ok(out)
    }

    /// Drops whatever is buffered for `pid`.
    pub fn discard(&mut self, pid: u16) {
        if let Some(unit) = self.units.remove(&pid).filter(|unit| !unit.buf.is_empty()) {
            log::debug!(
                "PID {}: discarding {} bytes of an incomplete {:?} unit",
                pid,
                unit.buf.len(),
                unit.kind
            );
        }
    }

    pub fn clear(&mut self) {
        self.units.clear();
    }
}
