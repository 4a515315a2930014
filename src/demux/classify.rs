//! Decides what a PID carries.
//!
//! PSI is recognised from protocol knowledge alone (reserved PIDs plus PMT
//! PIDs learned from the PAT). PES is recognised by sniffing the start code,
//! and is only consulted when the PSI check fails.

use super::program_map::ProgramMap;
use super::types::{PES_START_CODE, PSI_PIDS};

/// Payload family of a PID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PayloadKind {
    Psi,
    Pes,
}

/// True for the reserved PSI PIDs and for PIDs the program map knows as PMT carriers.
pub fn is_psi(pid: u16, program_map: &ProgramMap) -> bool {
    PSI_PIDS.contains(&pid) || program_map.contains(pid)
}

/// True when the payload opens with the PES start code prefix `00 00 01`.
pub fn is_pes(payload: &[u8]) -> bool {
    payload.len() >= PES_START_CODE.len() && payload[..PES_START_CODE.len()] == PES_START_CODE
}

/// Classifies a PID. PSI takes precedence; `prefix` is only sniffed when the
/// PID is not PSI. `None` means the PID is of no interest.
pub fn classify(pid: u16, program_map: &ProgramMap, prefix: Option<&[u8]>) -> Option<PayloadKind> {
    if is_psi(pid, program_map) {
        Some(PayloadKind::Psi)
    } else if prefix.is_some_and(is_pes) {
        Some(PayloadKind::Pes)
    } else {
        None
    }
}
