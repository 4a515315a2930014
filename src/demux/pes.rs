use super::types::*;
use crate::error::{DemuxError, Result};
use crate::utils::BitReader;
use bytes::{BufMut, Bytes, BytesMut};
use std::time::Duration;

/// Size of start code, stream id and packet length.
pub const PES_FIXED_HEADER_SIZE: usize = 6;
/// Size of the fixed part of the optional header (two flag bytes and the
/// header data length).
pub const PES_OPTIONAL_HEADER_SIZE: usize = 3;

const TIMESTAMP_SIZE: usize = 5;
const PTS_ONLY_PREFIX: u32 = 0b0010;
const PTS_WITH_DTS_PREFIX: u32 = 0b0011;
const DTS_PREFIX: u32 = 0b0001;

/// Flags of the PES optional header, as found after the packet length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PesOptionalHeader {
    /// Control field for scrambling mode
    pub scrambling_control: u8,
    /// Priority flag for the packet
    pub priority: bool,
    /// Data alignment indicator
    pub data_alignment: bool,
    /// Copyright indicator
    pub copyright: bool,
    /// Original/copy indicator
    pub original: bool,
    /// Flags indicating presence of PTS/DTS fields (`0b10` PTS, `0b11` both)
    pub pts_dts_flags: u8,
    /// ESCR (Extended System Clock Reference) flag
    pub escr_flag: bool,
    /// Elementary Stream rate flag
    pub es_rate_flag: bool,
    /// DSM trick mode flag
    pub dsm_trick_mode_flag: bool,
    /// Additional copy info flag
    pub additional_copy_info_flag: bool,
    /// CRC flag
    pub crc_flag: bool,
    /// Extension flag
    pub extension_flag: bool,
    /// Length of the header data following this field
    pub header_data_length: u8,
}

impl Default for PesOptionalHeader {
    fn default() -> Self {
        Self {
            scrambling_control: 0,
            priority: false,
            data_alignment: false,
            copyright: false,
            original: false,
            pts_dts_flags: 0,
            escr_flag: false,
            es_rate_flag: false,
            dsm_trick_mode_flag: false,
            additional_copy_info_flag: false,
            crc_flag: false,
            extension_flag: false,
            header_data_length: 0,
        }
    }
}

/// A decoded Packetized Elementary Stream packet.
///
/// Timestamps are raw 33-bit values in 90 kHz ticks; either may be absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PesData {
    /// Stream identifier indicating content type (video/audio/etc.)
    pub stream_id: u8,
    /// Declared PES packet length; zero means unbounded
    pub packet_length: u16,
    /// Optional header flags, absent for stream ids that do not carry one
    pub header: Option<PesOptionalHeader>,
    /// Presentation Time Stamp (33 bits)
    pub pts: Option<u64>,
    /// Decoding Time Stamp (33 bits)
    pub dts: Option<u64>,
    /// Elementary stream bytes following the header
    pub payload: Bytes,
}

/// Whether packets of `stream_id` carry the optional PES header.
pub fn has_optional_header(stream_id: u8) -> bool {
    !matches!(
        stream_id,
        STREAM_ID_PROGRAM_STREAM_MAP
            | STREAM_ID_PADDING
            | STREAM_ID_PRIVATE_2
            | STREAM_ID_ECM
            | STREAM_ID_EMM
            | STREAM_ID_DSMCC
            | STREAM_ID_H222_TYPE_E
            | STREAM_ID_PROGRAM_STREAM_DIRECTORY
    )
}

/// Byte size of the unit starting at `buf` when the header declares a
/// non-zero packet length. `None` while the length is unknown or unbounded.
pub fn declared_unit_size(buf: &[u8]) -> Option<usize> {
    if buf.len() < PES_FIXED_HEADER_SIZE {
        return None;
    }
    match u16::from_be_bytes([buf[4], buf[5]]) {
        0 => None,
        length => Some(PES_FIXED_HEADER_SIZE + length as usize),
    }
}

/// Decodes the PES packet at the start of `buf`.
///
/// A bounded packet (non-zero length) is `Incomplete` until all of its bytes
/// are buffered and consumes exactly its declared size. An unbounded packet
/// takes the whole buffer, so callers only offer it once the unit has ended.
pub fn decode(buf: &[u8]) -> Result<Decoded<PesData>> {
    if buf.len() < PES_FIXED_HEADER_SIZE {
        return Ok(Decoded::Incomplete);
    }
    if buf[..3] != PES_START_CODE {
        return Err(DemuxError::MalformedPes(format!(
            "bad start code prefix {:02x} {:02x} {:02x}",
            buf[0], buf[1], buf[2]
        )));
    }

    let stream_id = buf[3];
    let packet_length = u16::from_be_bytes([buf[4], buf[5]]);
    let bounded = packet_length != 0;
    let unit = match declared_unit_size(buf) {
        Some(size) if buf.len() < size => return Ok(Decoded::Incomplete),
        Some(size) => &buf[..size],
        None => buf,
    };

    let mut pes = PesData {
        stream_id,
        packet_length,
        header: None,
        pts: None,
        dts: None,
        payload: Bytes::new(),
    };

    let mut payload_start = PES_FIXED_HEADER_SIZE;
    let marked = unit.len() > PES_FIXED_HEADER_SIZE && unit[PES_FIXED_HEADER_SIZE] & 0xC0 == 0x80;
    if has_optional_header(stream_id) && marked {
        let header_end = PES_FIXED_HEADER_SIZE + PES_OPTIONAL_HEADER_SIZE;
        if unit.len() < header_end {
            return short_header(bounded, "optional header");
        }
        let header = parse_optional_header(&unit[PES_FIXED_HEADER_SIZE..header_end])?;
        let data_end = header_end + header.header_data_length as usize;
        if unit.len() < data_end {
            return short_header(bounded, "header data");
        }

        let (pts, dts) = parse_timestamps(&header, &unit[header_end..data_end])?;
        pes.pts = pts;
        pes.dts = dts;
        pes.header = Some(header);
        payload_start = data_end;
    }

    pes.payload = Bytes::copy_from_slice(&unit[payload_start..]);
    Ok(Decoded::Complete {
        value: pes,
        consumed: unit.len(),
    })
}

fn short_header(bounded: bool, what: &str) -> Result<Decoded<PesData>> {
    if bounded {
        Err(DemuxError::MalformedPes(format!(
            "{} overruns declared packet length",
            what
        )))
    } else {
        Ok(Decoded::Incomplete)
    }
}

fn parse_optional_header(data: &[u8]) -> Result<PesOptionalHeader> {
    let mut reader = BitReader::new(data);
    reader.skip_bits(2)?; // '10' marker, checked by the caller
    Ok(PesOptionalHeader {
        scrambling_control: reader.read_bits(2)? as u8,
        priority: reader.read_bit()?,
        data_alignment: reader.read_bit()?,
        copyright: reader.read_bit()?,
        original: reader.read_bit()?,
        pts_dts_flags: reader.read_bits(2)? as u8,
        escr_flag: reader.read_bit()?,
        es_rate_flag: reader.read_bit()?,
        dsm_trick_mode_flag: reader.read_bit()?,
        additional_copy_info_flag: reader.read_bit()?,
        crc_flag: reader.read_bit()?,
        extension_flag: reader.read_bit()?,
        header_data_length: reader.read_bits(8)? as u8,
    })
}

fn parse_timestamps(
    header: &PesOptionalHeader,
    data: &[u8],
) -> Result<(Option<u64>, Option<u64>)> {
    let needed = match header.pts_dts_flags {
        0b00 => return Ok((None, None)),
        0b01 => {
            return Err(DemuxError::MalformedPes(
                "forbidden PTS_DTS_flags value 01".into(),
            ))
        }
        0b10 => TIMESTAMP_SIZE,
        _ => 2 * TIMESTAMP_SIZE,
    };
    if data.len() < needed {
        return Err(DemuxError::MalformedPes(format!(
            "header data length {} too short for timestamps",
            data.len()
        )));
    }

    if header.pts_dts_flags == 0b10 {
        let pts = read_timestamp(&data[..TIMESTAMP_SIZE], PTS_ONLY_PREFIX)?;
        Ok((Some(pts), None))
    } else {
        let pts = read_timestamp(&data[..TIMESTAMP_SIZE], PTS_WITH_DTS_PREFIX)?;
        let dts = read_timestamp(&data[TIMESTAMP_SIZE..needed], DTS_PREFIX)?;
        Ok((Some(pts), Some(dts)))
    }
}

/// Reads a 33-bit timestamp spread over 5 bytes as
/// `prefix(4) ts[32..30](3) 1 ts[29..15](15) 1 ts[14..0](15) 1`.
fn read_timestamp(data: &[u8], prefix: u32) -> Result<u64> {
    let mut reader = BitReader::new(data);
    let found = reader.read_bits(4)?;
    if found != prefix {
        return Err(DemuxError::MalformedPes(format!(
            "timestamp prefix {:04b}, expected {:04b}",
            found, prefix
        )));
    }

    let high = reader.read_bits(3)? as u64;
    check_marker(&mut reader)?;
    let mid = reader.read_bits(15)? as u64;
    check_marker(&mut reader)?;
    let low = reader.read_bits(15)? as u64;
    check_marker(&mut reader)?;

    Ok(high << 30 | mid << 15 | low)
}

fn check_marker(reader: &mut BitReader<'_>) -> Result<()> {
    if reader.read_marker()? {
        Ok(())
    } else {
        Err(DemuxError::MalformedPes("timestamp marker bit not set".into()))
    }
}

impl PesData {
    /// Creates an unbounded PES packet with the specified stream ID and payload.
    ///
    /// Stream ids that carry an optional header get one with no flags set.
    pub fn new(stream_id: u8, payload: impl Into<Bytes>) -> Self {
        Self {
            stream_id,
            packet_length: 0,
            header: has_optional_header(stream_id).then(PesOptionalHeader::default),
            pts: None,
            dts: None,
            payload: payload.into(),
        }
    }

    /// Sets the Presentation Time Stamp, in 90 kHz ticks. Ignored for
    /// stream ids without an optional header.
    pub fn with_pts(mut self, pts: u64) -> Self {
        if self.header.is_some() {
            self.pts = Some(pts & 0x1_FFFF_FFFF);
            self.sync_timestamp_flags();
        }
        self
    }

    /// Sets the Decoding Time Stamp, in 90 kHz ticks. A DTS only travels
    /// with a PTS, so this is ignored until [`with_pts`](Self::with_pts)
    /// has been called.
    pub fn with_dts(mut self, dts: u64) -> Self {
        if self.pts.is_some() {
            self.dts = Some(dts & 0x1_FFFF_FFFF);
            self.sync_timestamp_flags();
        }
        self
    }

    /// Declares the packet length from the current header and payload,
    /// turning an unbounded packet into a bounded one.
    pub fn bounded(mut self) -> Result<Self> {
        let length = self.len() - PES_FIXED_HEADER_SIZE;
        self.packet_length = u16::try_from(length).map_err(|_| {
            DemuxError::MalformedPes(format!("{} bytes do not fit a bounded PES packet", length))
        })?;
        Ok(self)
    }

    fn sync_timestamp_flags(&mut self) {
        if let Some(header) = self.header.as_mut() {
            let (flags, length) = match (self.pts, self.dts) {
                (Some(_), Some(_)) => (0b11, 2 * TIMESTAMP_SIZE),
                (Some(_), None) => (0b10, TIMESTAMP_SIZE),
                _ => (0b00, 0),
            };
            header.pts_dts_flags = flags;
            header.header_data_length = length as u8;
        }
    }

    /// Presentation time as a duration, if a PTS is present.
    pub fn pts_time(&self) -> Option<Duration> {
        self.pts.map(pts_to_time)
    }

    /// Decoding time as a duration, if a DTS is present.
    pub fn dts_time(&self) -> Option<Duration> {
        self.dts.map(pts_to_time)
    }

    /// Total encoded size in bytes: fixed header, optional header and payload.
    pub fn len(&self) -> usize {
        let header = self
            .header
            .as_ref()
            .map(|h| PES_OPTIONAL_HEADER_SIZE + h.header_data_length as usize)
            .unwrap_or(0);
        PES_FIXED_HEADER_SIZE + header + self.payload.len()
    }

    /// Writes the complete PES packet to a BytesMut buffer.
    ///
    /// Header data beyond the timestamps is written as stuffing bytes.
    pub fn write_to(&self, buf: &mut BytesMut) -> Result<()> {
        buf.put_slice(&PES_START_CODE);
        buf.put_u8(self.stream_id);
        buf.put_u16(self.packet_length);

        let Some(header) = &self.header else {
            buf.extend_from_slice(&self.payload);
            return Ok(());
        };

        let mut flags = 0x80u8;
        flags |= (header.scrambling_control & 0x03) << 4;
        if header.priority {
            flags |= 0x08;
        }
        if header.data_alignment {
            flags |= 0x04;
        }
        if header.copyright {
            flags |= 0x02;
        }
        if header.original {
            flags |= 0x01;
        }
        buf.put_u8(flags);

        let mut flags2 = (header.pts_dts_flags & 0x03) << 6;
        if header.escr_flag {
            flags2 |= 0x20;
        }
        if header.es_rate_flag {
            flags2 |= 0x10;
        }
        if header.dsm_trick_mode_flag {
            flags2 |= 0x08;
        }
        if header.additional_copy_info_flag {
            flags2 |= 0x04;
        }
        if header.crc_flag {
            flags2 |= 0x02;
        }
        if header.extension_flag {
            flags2 |= 0x01;
        }
        buf.put_u8(flags2);
        buf.put_u8(header.header_data_length);

        let mut written = 0;
        match (header.pts_dts_flags, self.pts, self.dts) {
            (0b00, _, _) => {}
            (0b10, Some(pts), _) => {
                write_timestamp(buf, PTS_ONLY_PREFIX, pts);
                written = TIMESTAMP_SIZE;
            }
            (0b11, Some(pts), Some(dts)) => {
                write_timestamp(buf, PTS_WITH_DTS_PREFIX, pts);
                write_timestamp(buf, DTS_PREFIX, dts);
                written = 2 * TIMESTAMP_SIZE;
            }
            (flags, _, _) => {
                return Err(DemuxError::MalformedPes(format!(
                    "PTS_DTS_flags {:02b} do not match the timestamps present",
                    flags
                )))
            }
        }
        let stuffing = (header.header_data_length as usize)
            .checked_sub(written)
            .ok_or_else(|| {
                DemuxError::MalformedPes("header data length shorter than timestamps".into())
            })?;
        buf.put_bytes(0xFF, stuffing);

        buf.extend_from_slice(&self.payload);
        Ok(())
    }
}

/// Writes a 33-bit timestamp with its 4-bit prefix and marker bits.
fn write_timestamp(buf: &mut BytesMut, prefix: u32, ts: u64) {
    let ts = ts & 0x1_FFFF_FFFF;

    // Prefix, 3 MSB of timestamp and marker
    buf.put_u8((prefix as u8) << 4 | ((ts >> 29) & 0x0E) as u8 | 0x01);

    // Middle 15 bits and marker
    buf.put_u16((((ts >> 14) & 0xFFFE) | 0x01) as u16);

    // Final 15 bits and marker
    buf.put_u16((((ts << 1) & 0xFFFE) | 0x01) as u16);
}
