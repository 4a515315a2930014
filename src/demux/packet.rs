//! Framing helper turning raw 188-byte transport packets into [`Packet`]s.
//!
//! Only the fixed header is decoded and the adaptation field is skipped; the
//! engine does not look at PCR or continuity counters.

use super::types::*;
use crate::error::{DemuxError, Result};
use bytes::Bytes;

impl PacketHeader {
    /// Decodes the 4-byte transport packet header.
    pub fn parse(data: &[u8]) -> Result<PacketHeader> {
        if data.len() < TS_HEADER_SIZE {
            return Err(DemuxError::InvalidPacket("TS packet too short".into()));
        }

        if data[0] != TS_SYNC_BYTE {
            return Err(DemuxError::InvalidPacket(format!(
                "invalid sync byte 0x{:02x}",
                data[0]
            )));
        }

        Ok(PacketHeader {
            transport_error: (data[1] & 0x80) != 0,
            payload_unit_start: (data[1] & 0x40) != 0,
            transport_priority: (data[1] & 0x20) != 0,
            pid: (((data[1] & 0x1F) as u16) << 8) | data[2] as u16,
            scrambling_control: (data[3] >> 6) & 0x03,
            adaptation_field_exists: (data[3] & 0x20) != 0,
            contains_payload: (data[3] & 0x10) != 0,
            continuity_counter: data[3] & 0x0F,
        })
    }
}

impl Packet {
    /// Parses one 188-byte packet. The payload is empty when the packet
    /// carries an adaptation field only.
    pub fn parse(data: &[u8]) -> Result<Packet> {
        if data.len() != TS_PACKET_SIZE {
            return Err(DemuxError::InvalidPacket(format!(
                "expected {} bytes, got {}",
                TS_PACKET_SIZE,
                data.len()
            )));
        }

        let header = PacketHeader::parse(data)?;
        let mut payload_offset = TS_HEADER_SIZE;
        if header.adaptation_field_exists {
            payload_offset += 1 + data[TS_HEADER_SIZE] as usize;
            if payload_offset > TS_PACKET_SIZE {
                return Err(DemuxError::InvalidPacket(
                    "adaptation field overruns packet".into(),
                ));
            }
        }

        let payload = if header.contains_payload {
            Bytes::copy_from_slice(&data[payload_offset..])
        } else {
            Bytes::new()
        };

        Ok(Packet { header, payload })
    }
}

/// Splits a byte buffer of back-to-back 188-byte packets into [`Packet`]s.
pub fn parse_packets(data: &[u8]) -> Result<Vec<Packet>> {
    if data.len() % TS_PACKET_SIZE != 0 {
        return Err(DemuxError::InvalidPacket(format!(
            "buffer of {} bytes is not a multiple of {}",
            data.len(),
            TS_PACKET_SIZE
        )));
    }
    data.chunks_exact(TS_PACKET_SIZE).map(Packet::parse).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_ts_header() {
        let data = [
            0x47, // Sync byte
            0x41, // Payload unit start indicator set, PID high bits
            0x00, // PID low bits
            0x1A, // Payload only, continuity counter 10
        ];

        let header = PacketHeader::parse(&data).unwrap();
        assert!(header.payload_unit_start);
        assert!(!header.transport_error);
        assert_eq!(header.pid, 0x100);
        assert!(header.contains_payload);
        assert!(!header.adaptation_field_exists);
        assert_eq!(header.continuity_counter, 10);
    }

    #[test]
    fn test_bad_sync_byte() {
        let data = [0x48, 0x40, 0x00, 0x10];
        assert!(matches!(
            PacketHeader::parse(&data),
            Err(DemuxError::InvalidPacket(_))
        ));
    }

    #[test]
    fn test_parse_with_adaptation_field() {
        let mut data = vec![0xFFu8; TS_PACKET_SIZE];
        data[0] = 0x47;
        data[1] = 0x40;
        data[2] = 0x21;
        data[3] = 0x30; // Adaptation field + payload
        data[4] = 7; // Adaptation field length
        data[5] = 0x00;
        data[12] = 0x00;
        data[13] = 0x00;
        data[14] = 0x01;

        let packet = Packet::parse(&data).unwrap();
        assert_eq!(packet.pid(), 0x21);
        assert!(packet.is_unit_start());
        assert_eq!(packet.payload.len(), TS_PACKET_SIZE - 12);
        assert_eq!(&packet.payload[..3], &PES_START_CODE);
    }

    #[test]
    fn test_adaptation_only_has_empty_payload() {
        let mut data = vec![0xFFu8; TS_PACKET_SIZE];
        data[0] = 0x47;
        data[1] = 0x00;
        data[2] = 0x21;
        data[3] = 0x20;
        data[4] = 183;

        let packet = Packet::parse(&data).unwrap();
        assert!(packet.payload.is_empty());
    }

    #[test]
    fn test_parse_packets_rejects_partial_buffer() {
        let data = vec![0x47u8; TS_PACKET_SIZE + 1];
        assert!(parse_packets(&data).is_err());
    }
}
