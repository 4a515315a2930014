use bytes::Bytes;

use super::pes::PesData;
use super::psi::PsiTable;

// PIDs
pub const PID_PAT: u16 = 0x0000;
pub const PID_CAT: u16 = 0x0001;
pub const PID_NIT: u16 = 0x0010;
pub const PID_SDT: u16 = 0x0011;
pub const PID_EIT: u16 = 0x0012;
pub const PID_RST: u16 = 0x0013;
pub const PID_TDT: u16 = 0x0014;
pub const PID_NULL: u16 = 0x1FFF;
pub const PID_MAX: u16 = 0x1FFF;

/// PIDs whose payload is always PSI, whatever the program map says.
pub const PSI_PIDS: [u16; 8] = [PID_PAT, PID_NIT, PID_SDT, PID_EIT, PID_RST, PID_TDT, 0x001E, 0x001F];

// Table IDs
pub const TABLE_ID_PAT: u8 = 0x00;
pub const TABLE_ID_PMT: u8 = 0x02;
pub const TABLE_ID_STUFFING: u8 = 0xFF;

// Stream IDs without the PES optional header
pub const STREAM_ID_PROGRAM_STREAM_MAP: u8 = 0xBC;
pub const STREAM_ID_PADDING: u8 = 0xBE;
pub const STREAM_ID_PRIVATE_2: u8 = 0xBF;
pub const STREAM_ID_ECM: u8 = 0xF0;
pub const STREAM_ID_EMM: u8 = 0xF1;
pub const STREAM_ID_DSMCC: u8 = 0xF2;
pub const STREAM_ID_H222_TYPE_E: u8 = 0xF8;
pub const STREAM_ID_PROGRAM_STREAM_DIRECTORY: u8 = 0xFF;

// Constants
pub const PES_START_CODE: [u8; 3] = [0x00, 0x00, 0x01];
pub const TS_PACKET_SIZE: usize = 188;
pub const TS_HEADER_SIZE: usize = 4;
pub const TS_SYNC_BYTE: u8 = 0x47;
pub const PTS_HZ: u64 = 90_000;

/// Decoded transport packet header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketHeader {
    pub transport_error: bool,
    pub payload_unit_start: bool,
    pub transport_priority: bool,
    pub pid: u16,
    pub scrambling_control: u8,
    pub adaptation_field_exists: bool,
    pub contains_payload: bool,
    pub continuity_counter: u8,
}

impl Default for PacketHeader {
    fn default() -> Self {
        Self {
            transport_error: false,
            payload_unit_start: false,
            transport_priority: false,
            pid: 0,
            scrambling_control: 0,
            adaptation_field_exists: false,
            contains_payload: true,
            continuity_counter: 0,
        }
    }
}

/// A transport packet as handed to the engine: parsed header plus the raw
/// payload that follows the header and any adaptation field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub header: PacketHeader,
    pub payload: Bytes,
}

impl Packet {
    pub fn new(pid: u16, payload_unit_start: bool, payload: impl Into<Bytes>) -> Self {
        Self {
            header: PacketHeader {
                pid,
                payload_unit_start,
                ..Default::default()
            },
            payload: payload.into(),
        }
    }

    pub fn pid(&self) -> u16 {
        self.header.pid
    }

    pub fn is_unit_start(&self) -> bool {
        self.header.payload_unit_start
    }
}

/// One decoded unit: either a PES frame or a PSI table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataPayload {
    Pes(PesData),
    Psi(PsiTable),
}

/// Engine output, tagged with the PID the unit arrived on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Data {
    pub pid: u16,
    pub payload: DataPayload,
}

impl Data {
    pub fn pes(pid: u16, pes: PesData) -> Self {
        Self {
            pid,
            payload: DataPayload::Pes(pes),
        }
    }

    pub fn psi(pid: u16, table: PsiTable) -> Self {
        Self {
            pid,
            payload: DataPayload::Psi(table),
        }
    }

    pub fn as_pes(&self) -> Option<&PesData> {
        match &self.payload {
            DataPayload::Pes(pes) => Some(pes),
            DataPayload::Psi(_) => None,
        }
    }

    pub fn as_psi(&self) -> Option<&PsiTable> {
        match &self.payload {
            DataPayload::Psi(table) => Some(table),
            DataPayload::Pes(_) => None,
        }
    }
}

/// Result of offering a buffer to a decoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded<T> {
    /// A whole unit was decoded from the first `consumed` bytes.
    Complete { value: T, consumed: usize },
    /// More bytes are needed before the unit can be decoded.
    Incomplete,
}

/// Converts 90 kHz ticks to wall-clock time.
pub fn pts_to_time(pts: u64) -> std::time::Duration {
    let secs = std::time::Duration::from_secs(pts / PTS_HZ);
    secs + std::time::Duration::from_nanos((pts % PTS_HZ) * 1_000_000_000 / PTS_HZ)
}
