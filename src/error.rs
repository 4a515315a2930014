use thiserror::Error;

#[derive(Error, Debug)]
pub enum DemuxError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid packet: {0}")]
    InvalidPacket(String),

    #[error("malformed PSI section: {0}")]
    MalformedSection(String),

    #[error("CRC32 mismatch: expected 0x{expected:08x}, calculated 0x{calculated:08x}")]
    CrcMismatch { expected: u32, calculated: u32 },

    #[error("malformed PES packet: {0}")]
    MalformedPes(String),

    #[error("bitstream error: {0}")]
    Bitstream(String),

    #[error("override error: {0}")]
    Override(String),

    #[error("PID {pid}: {source}")]
    Pid {
        pid: u16,
        #[source]
        source: Box<DemuxError>,
    },
}

impl DemuxError {
    /// Attaches the PID whose unit failed to decode.
    pub fn at_pid(self, pid: u16) -> Self {
        match self {
            DemuxError::Pid { .. } => self,
            other => DemuxError::Pid {
                pid,
                source: Box::new(other),
            },
        }
    }

    /// PID the error was raised for, if it was raised while decoding a unit.
    pub fn pid(&self) -> Option<u16> {
        match self {
            DemuxError::Pid { pid, .. } => Some(*pid),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, DemuxError>;
