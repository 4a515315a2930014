//! Batch entry point: groups packets by PID and routes each group to PSI or
//! PES reassembly.

use super::classify::{classify, PayloadKind};
use super::program_map::ProgramMap;
use super::reassembler::Reassembler;
use super::types::{Data, Packet, PID_CAT};
use crate::config::DemuxConfig;
use crate::error::Result;
use std::collections::HashMap;

/// What a [`BatchOverride`] produced for a batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OverrideOutput {
    pub data: Vec<Data>,
    /// When set, `data` is the whole result and default processing is skipped.
    pub skip_default: bool,
}

impl OverrideOutput {
    /// Replaces default processing with `data`.
    pub fn skip(data: Vec<Data>) -> Self {
        Self {
            data,
            skip_default: true,
        }
    }

    /// Emits `data` ahead of the default output.
    pub fn prepend(data: Vec<Data>) -> Self {
        Self {
            data,
            skip_default: false,
        }
    }
}

/// Caller hook that sees every batch before default processing.
///
/// Any `FnMut(&[Packet]) -> Result<OverrideOutput>` closure implements it.
pub trait BatchOverride {
    fn apply(&mut self, packets: &[Packet]) -> Result<OverrideOutput>;
}

impl<F> BatchOverride for F
where
    F: FnMut(&[Packet]) -> Result<OverrideOutput>,
{
    fn apply(&mut self, packets: &[Packet]) -> Result<OverrideOutput> {
        self(packets)
    }
}

/// Decodes self-contained batches. Units still open when a batch ends are
/// finished (unbounded PES) or dropped; nothing carries into the next call.
#[derive(Debug, Clone, Default)]
pub struct Dispatcher {
    config: DemuxConfig,
}

impl Dispatcher {
    pub fn new(config: DemuxConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DemuxConfig {
        &self.config
    }

    /// Decodes one batch.
    ///
    /// PIDs are processed in the order they first appear, and a PAT decoded
    /// early in the batch already classifies the PMT PIDs seen after it.
    /// The first decoding failure aborts the batch; its error carries the
    /// PID.
    pub fn process(
        &self,
        packets: &[Packet],
        batch_override: Option<&mut dyn BatchOverride>,
        program_map: &mut ProgramMap,
    ) -> Result<Vec<Data>> {
        let mut out = match run_override(packets, batch_override)? {
            Overridden::Done(data) => return Ok(data),
            Overridden::Continue(data) => data,
        };

        let mut reassembler = Reassembler::new(&self.config);
        demux_groups(packets, program_map, &mut reassembler, BatchEnd::Finish, &mut out)?;
        Ok(out)
    }
}

/// Decodes one batch with the default configuration.
pub fn process(
    packets: &[Packet],
    batch_override: Option<&mut dyn BatchOverride>,
    program_map: &mut ProgramMap,
) -> Result<Vec<Data>> {
    Dispatcher::default().process(packets, batch_override, program_map)
}

pub(crate) enum Overridden {
    Done(Vec<Data>),
    Continue(Vec<Data>),
}

pub(crate) fn run_override(
    packets: &[Packet],
    batch_override: Option<&mut dyn BatchOverride>,
) -> Result<Overridden> {
    let Some(hook) = batch_override else {
        return Ok(Overridden::Continue(Vec::new()));
    };
    let output = hook.apply(packets)?;
    log::debug!(
        "override produced {} units, skip_default={}",
        output.data.len(),
        output.skip_default
    );
    if output.skip_default {
        Ok(Overridden::Done(output.data))
    } else {
        Ok(Overridden::Continue(output.data))
    }
}

/// What happens to units still open at the end of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BatchEnd {
    /// Complete unbounded PES units, drop the rest.
    Finish,
    /// Leave everything buffered for the next batch.
    Carry,
}

pub(crate) fn demux_groups(
    packets: &[Packet],
    program_map: &mut ProgramMap,
    reassembler: &mut Reassembler,
    end: BatchEnd,
    out: &mut Vec<Data>,
) -> Result<()> {
    for (pid, group) in group_by_pid(packets) {
        if pid == PID_CAT {
            log::trace!("skipping {} CAT packets", group.len());
            continue;
        }

        // A self-contained batch may carry a PID whose packets never flag a
        // unit start; its first packet then opens the unit.
        let implicit_start = end == BatchEnd::Finish
            && reassembler.open_kind(pid).is_none()
            && !group.iter().any(|packet| packet.is_unit_start());
        let prefix = if implicit_start {
            group.first().map(|packet| &packet.payload[..])
        } else {
            group
                .iter()
                .find(|packet| packet.is_unit_start())
                .map(|packet| &packet.payload[..])
        };
        let Some(kind) = classify(pid, program_map, prefix).or_else(|| reassembler.open_kind(pid))
        else {
            log::trace!("PID {}: {} unclassified packets dropped", pid, group.len());
            continue;
        };

        let before = out.len();
        demux_group(pid, kind, &group, implicit_start, program_map, reassembler, end, out)
            .map_err(|err| err.at_pid(pid))?;
        log::debug!(
            "PID {}: {} packets as {:?}, {} units",
            pid,
            group.len(),
            kind,
            out.len() - before
        );
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn demux_group(
    pid: u16,
    kind: PayloadKind,
    group: &[&Packet],
    implicit_start: bool,
    program_map: &mut ProgramMap,
    reassembler: &mut Reassembler,
    end: BatchEnd,
    out: &mut Vec<Data>,
) -> Result<()> {
    for (i, packet) in group.iter().enumerate() {
        if i == 0 && implicit_start {
            reassembler.push_unit_start(kind, packet, program_map, out)?;
        } else {
            reassembler.push(kind, packet, program_map, out)?;
        }
    }
    if end == BatchEnd::Finish {
        if let Some(data) = reassembler.complete_unbounded(pid)? {
            out.push(data);
        }
        reassembler.discard(pid);
    }
    Ok(())
}

/// Splits a batch into per-PID groups, ordered by first appearance.
fn group_by_pid(packets: &[Packet]) -> Vec<(u16, Vec<&Packet>)> {
    let mut index: HashMap<u16, usize> = HashMap::new();
    let mut groups: Vec<(u16, Vec<&Packet>)> = Vec::new();
    for packet in packets {
        let pid = packet.pid();
        let slot = *index.entry(pid).or_insert_with(|| {
            groups.push((pid, Vec::new()));
            groups.len() - 1
        });
        groups[slot].1.push(packet);
    }
    groups
}
