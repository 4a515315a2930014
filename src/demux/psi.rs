//! Program-Specific Information sections.
//!
//! Sections are decoded from buffers that start at a table id (the pointer
//! field is handled by the caller). PAT and PMT are modelled; every other
//! table id is consumed and skipped.

use super::program_map::ProgramMap;
use super::types::{Decoded, TABLE_ID_PAT, TABLE_ID_PMT, TABLE_ID_STUFFING};
use crate::error::{DemuxError, Result};
use crate::utils::Crc32Mpeg2;
use bytes::{BufMut, Bytes, BytesMut};

/// Bytes before `section_length` starts counting.
pub const SECTION_HEADER_SIZE: usize = 3;
/// Largest `section_length` any section may declare.
pub const MAX_SECTION_LENGTH: usize = 4093;
/// Largest `section_length` of a PAT or PMT section.
pub const MAX_PSI_SECTION_LENGTH: usize = 1021;

const SYNTAX_HEADER_SIZE: usize = 5;
const CRC_SIZE: usize = 4;

const CRC: Crc32Mpeg2 = Crc32Mpeg2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatProgram {
    pub program_number: u16,
    pub pmt_pid: u16,
}

/// Program Association Table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatSection {
    pub transport_stream_id: u16,
    pub version: u8,
    pub current_next: bool,
    /// PID announced under the reserved program number 0.
    pub network_pid: Option<u16>,
    pub programs: Vec<PatProgram>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PmtStream {
    pub stream_type: u8,
    pub elementary_pid: u16,
    /// Raw ES descriptors, not decoded.
    pub es_info: Bytes,
}

/// Program Map Table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PmtSection {
    pub program_number: u16,
    pub version: u8,
    pub current_next: bool,
    pub pcr_pid: u16,
    /// Raw program descriptors, not decoded.
    pub program_info: Bytes,
    pub streams: Vec<PmtStream>,
}

/// A decoded PSI table, discriminated by table id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PsiTable {
    Pat(PatSection),
    Pmt(PmtSection),
}

impl PsiTable {
    pub fn table_id(&self) -> u8 {
        match self {
            PsiTable::Pat(_) => TABLE_ID_PAT,
            PsiTable::Pmt(_) => TABLE_ID_PMT,
        }
    }
}

/// Fields of the long-form section header shared by PAT and PMT.
struct SyntaxSection<'a> {
    table_id_extension: u16,
    version: u8,
    current_next: bool,
    body: &'a [u8],
}

/// Total byte size of the section at the start of `buf`, once its
/// 3-byte header is available.
pub fn section_size(buf: &[u8]) -> Option<usize> {
    if buf.len() < SECTION_HEADER_SIZE {
        return None;
    }
    let section_length = (u16::from_be_bytes([buf[1], buf[2]]) & 0x0FFF) as usize;
    Some(SECTION_HEADER_SIZE + section_length)
}

/// Decodes the section at the start of `buf` without touching any routing
/// state. Returns `Complete { value: None, .. }` for table ids that are not
/// modelled.
pub fn parse_section(buf: &[u8], verify_crc: bool) -> Result<Decoded<Option<PsiTable>>> {
    let total = match section_size(buf) {
        Some(total) => total,
        None => return Ok(Decoded::Incomplete),
    };
    let section_length = total - SECTION_HEADER_SIZE;
    if section_length > MAX_SECTION_LENGTH {
        return Err(DemuxError::MalformedSection(format!(
            "section_length {} exceeds {}",
            section_length, MAX_SECTION_LENGTH
        )));
    }
    if buf.len() < total {
        return Ok(Decoded::Incomplete);
    }

    let section = &buf[..total];
    let table = match section[0] {
        TABLE_ID_PAT => Some(PsiTable::Pat(parse_pat(section, verify_crc)?)),
        TABLE_ID_PMT => Some(PsiTable::Pmt(parse_pmt(section, verify_crc)?)),
        table_id => {
            log::trace!("skipping unsupported table id 0x{:02x}", table_id);
            None
        }
    };

    Ok(Decoded::Complete {
        value: table,
        consumed: total,
    })
}

/// Decodes one section and, for a PAT, routes every announced PMT PID in
/// `program_map` before returning the table.
pub fn decode_section(
    buf: &[u8],
    program_map: &mut ProgramMap,
    verify_crc: bool,
) -> Result<Decoded<Option<PsiTable>>> {
    let decoded = parse_section(buf, verify_crc)?;
    if let Decoded::Complete {
        value: Some(PsiTable::Pat(pat)),
        ..
    } = &decoded
    {
        for program in &pat.programs {
            program_map.set(program.pmt_pid, program.program_number);
        }
    }
    Ok(decoded)
}

/// Sections decoded from one buffer by [`decode_sections`].
#[derive(Debug, Default)]
pub struct SectionRun {
    pub tables: Vec<PsiTable>,
    /// Bytes taken by complete sections.
    pub consumed: usize,
    /// Stuffing was reached; nothing else belongs to the unit.
    pub finished: bool,
}

/// Decodes back-to-back sections from `buf` until stuffing, end of data, or
/// a section that is still incomplete.
///
/// Only stuffing finishes the unit. When the data runs out right after a
/// section, the next packet may still carry another section of the same
/// unit.
pub fn decode_sections(
    buf: &[u8],
    program_map: &mut ProgramMap,
    verify_crc: bool,
) -> Result<SectionRun> {
    let mut run = SectionRun::default();
    loop {
        let rest = &buf[run.consumed..];
        match rest.first() {
            None => return Ok(run),
            Some(&TABLE_ID_STUFFING) => {
                run.finished = true;
                return Ok(run);
            }
            Some(_) => {}
        }
        match decode_section(rest, program_map, verify_crc)? {
            Decoded::Incomplete => return Ok(run),
            Decoded::Complete { value, consumed } => {
                run.consumed += consumed;
                run.tables.extend(value);
            }
        }
    }
}

fn parse_syntax_section(section: &[u8], verify_crc: bool) -> Result<SyntaxSection<'_>> {
    let table_id = section[0];
    if section[1] & 0x80 == 0 {
        return Err(DemuxError::MalformedSection(format!(
            "table 0x{:02x} without section_syntax_indicator",
            table_id
        )));
    }

    let section_length = section.len() - SECTION_HEADER_SIZE;
    if section_length < SYNTAX_HEADER_SIZE + CRC_SIZE {
        return Err(DemuxError::MalformedSection(format!(
            "section_length {} too short for table 0x{:02x}",
            section_length, table_id
        )));
    }
    if section_length > MAX_PSI_SECTION_LENGTH {
        return Err(DemuxError::MalformedSection(format!(
            "section_length {} exceeds {} for table 0x{:02x}",
            section_length, MAX_PSI_SECTION_LENGTH, table_id
        )));
    }

    let crc_offset = section.len() - CRC_SIZE;
    if verify_crc {
        let expected = u32::from_be_bytes([
            section[crc_offset],
            section[crc_offset + 1],
            section[crc_offset + 2],
            section[crc_offset + 3],
        ]);
        let calculated = CRC.calculate(&section[..crc_offset]);
        if expected != calculated {
            return Err(DemuxError::CrcMismatch {
                expected,
                calculated,
            });
        }
    }

    Ok(SyntaxSection {
        table_id_extension: u16::from_be_bytes([section[3], section[4]]),
        version: (section[5] >> 1) & 0x1F,
        current_next: section[5] & 0x01 != 0,
        body: &section[SECTION_HEADER_SIZE + SYNTAX_HEADER_SIZE..crc_offset],
    })
}

fn parse_pat(section: &[u8], verify_crc: bool) -> Result<PatSection> {
    let syntax = parse_syntax_section(section, verify_crc)?;
    if syntax.body.len() % 4 != 0 {
        return Err(DemuxError::MalformedSection(format!(
            "PAT program loop of {} bytes is not a multiple of 4",
            syntax.body.len()
        )));
    }

    let mut pat = PatSection {
        transport_stream_id: syntax.table_id_extension,
        version: syntax.version,
        current_next: syntax.current_next,
        network_pid: None,
        programs: Vec::with_capacity(syntax.body.len() / 4),
    };
    for entry in syntax.body.chunks_exact(4) {
        let program_number = u16::from_be_bytes([entry[0], entry[1]]);
        let pid = u16::from_be_bytes([entry[2], entry[3]]) & 0x1FFF;
        if program_number == 0 {
            pat.network_pid = Some(pid);
        } else {
            pat.programs.push(PatProgram {
                program_number,
                pmt_pid: pid,
            });
        }
    }
    Ok(pat)
}

fn parse_pmt(section: &[u8], verify_crc: bool) -> Result<PmtSection> {
    let syntax = parse_syntax_section(section, verify_crc)?;
    let body = syntax.body;
    if body.len() < 4 {
        return Err(DemuxError::MalformedSection(
            "PMT too short for PCR PID and program info length".into(),
        ));
    }

    let pcr_pid = u16::from_be_bytes([body[0], body[1]]) & 0x1FFF;
    let program_info_length = (u16::from_be_bytes([body[2], body[3]]) & 0x03FF) as usize;
    let mut pos = 4;
    if pos + program_info_length > body.len() {
        return Err(DemuxError::MalformedSection(format!(
            "program_info_length {} overruns PMT",
            program_info_length
        )));
    }
    let program_info = Bytes::copy_from_slice(&body[pos..pos + program_info_length]);
    pos += program_info_length;

    let mut streams = Vec::new();
    while pos < body.len() {
        if pos + 5 > body.len() {
            return Err(DemuxError::MalformedSection(format!(
                "{} trailing bytes in PMT stream loop",
                body.len() - pos
            )));
        }
        let stream_type = body[pos];
        let elementary_pid = u16::from_be_bytes([body[pos + 1], body[pos + 2]]) & 0x1FFF;
        let es_info_length = (u16::from_be_bytes([body[pos + 3], body[pos + 4]]) & 0x03FF) as usize;
        pos += 5;

        if pos + es_info_length > body.len() {
            return Err(DemuxError::MalformedSection(format!(
                "ES_info_length {} overruns PMT for PID {}",
                es_info_length, elementary_pid
            )));
        }
        streams.push(PmtStream {
            stream_type,
            elementary_pid,
            es_info: Bytes::copy_from_slice(&body[pos..pos + es_info_length]),
        });
        pos += es_info_length;
    }

    Ok(PmtSection {
        program_number: syntax.table_id_extension,
        version: syntax.version,
        current_next: syntax.current_next,
        pcr_pid,
        program_info,
        streams,
    })
}

fn write_syntax_section(
    buf: &mut BytesMut,
    table_id: u8,
    table_id_extension: u16,
    version: u8,
    current_next: bool,
    body: &[u8],
) -> Result<()> {
    let section_length = SYNTAX_HEADER_SIZE + body.len() + CRC_SIZE;
    if section_length > MAX_PSI_SECTION_LENGTH {
        return Err(DemuxError::MalformedSection(format!(
            "section_length {} exceeds {}",
            section_length, MAX_PSI_SECTION_LENGTH
        )));
    }

    let start = buf.len();
    buf.put_u8(table_id);
    buf.put_u16(0xB000 | section_length as u16);
    buf.put_u16(table_id_extension);
    buf.put_u8(0xC0 | (version & 0x1F) << 1 | current_next as u8);
    buf.put_u8(0); // section_number
    buf.put_u8(0); // last_section_number
    buf.put_slice(body);

    let crc_val = CRC.calculate(&buf[start..]);
    buf.put_u32(crc_val);
    Ok(())
}

impl PatSection {
    /// Writes the table as one section, CRC included, without pointer field.
    pub fn write_section(&self, buf: &mut BytesMut) -> Result<()> {
        let mut body = BytesMut::with_capacity(4 * (self.programs.len() + 1));
        if let Some(network_pid) = self.network_pid {
            body.put_u16(0);
            body.put_u16(0xE000 | (network_pid & 0x1FFF));
        }
        for program in &self.programs {
            body.put_u16(program.program_number);
            body.put_u16(0xE000 | (program.pmt_pid & 0x1FFF));
        }
        write_syntax_section(
            buf,
            TABLE_ID_PAT,
            self.transport_stream_id,
            self.version,
            self.current_next,
            &body,
        )
    }
}

impl PmtSection {
    /// Writes the table as one section, CRC included, without pointer field.
    pub fn write_section(&self, buf: &mut BytesMut) -> Result<()> {
        let mut body = BytesMut::new();
        body.put_u16(0xE000 | (self.pcr_pid & 0x1FFF));
        body.put_u16(0xF000 | (self.program_info.len() as u16 & 0x03FF));
        body.put_slice(&self.program_info);
        for stream in &self.streams {
            body.put_u8(stream.stream_type);
            body.put_u16(0xE000 | (stream.elementary_pid & 0x1FFF));
            body.put_u16(0xF000 | (stream.es_info.len() as u16 & 0x03FF));
            body.put_slice(&stream.es_info);
        }
        write_syntax_section(
            buf,
            TABLE_ID_PMT,
            self.program_number,
            self.version,
            self.current_next,
            &body,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample_pat() -> PatSection {
        PatSection {
            transport_stream_id: 1,
            version: 3,
            current_next: true,
            network_pid: Some(0x10),
            programs: vec![
                PatProgram {
                    program_number: 1,
                    pmt_pid: 0x100,
                },
                PatProgram {
                    program_number: 2,
                    pmt_pid: 0x200,
                },
            ],
        }
    }

    fn sample_pmt() -> PmtSection {
        PmtSection {
            program_number: 1,
            version: 0,
            current_next: true,
            pcr_pid: 0x101,
            program_info: Bytes::from_static(&[0x05, 0x04, b'H', b'D', b'M', b'V']),
            streams: vec![
                PmtStream {
                    stream_type: 0x1B,
                    elementary_pid: 0x101,
                    es_info: Bytes::new(),
                },
                PmtStream {
                    stream_type: 0x0F,
                    elementary_pid: 0x102,
                    es_info: Bytes::from_static(&[0x0A, 0x04, b'e', b'n', b'g', 0x00]),
                },
            ],
        }
    }

    fn encode(table: &PsiTable) -> BytesMut {
        let mut buf = BytesMut::new();
        match table {
            PsiTable::Pat(pat) => pat.write_section(&mut buf).unwrap(),
            PsiTable::Pmt(pmt) => pmt.write_section(&mut buf).unwrap(),
        }
        buf
    }

    #[test]
    fn test_parse_pat_bytes() {
        // Hand-assembled PAT: program 1 on PID 0x1000
        let mut section = vec![
            0x00, // Table ID
            0xB0, 0x0D, // Syntax indicator + section length 13
            0x00, 0x01, // Transport stream ID
            0xC1, // Version 0, current
            0x00, 0x00, // Section numbers
            0x00, 0x01, 0xF0, 0x00, // Program 1 -> PID 0x1000
        ];
        let crc_val = Crc32Mpeg2::new().calculate(&section);
        section.extend_from_slice(&crc_val.to_be_bytes());

        let decoded = parse_section(&section, true).unwrap();
        let Decoded::Complete { value, consumed } = decoded else {
            panic!("expected a complete section");
        };
        assert_eq!(consumed, 16);
        assert_eq!(
            value,
            Some(PsiTable::Pat(PatSection {
                transport_stream_id: 1,
                version: 0,
                current_next: true,
                network_pid: None,
                programs: vec![PatProgram {
                    program_number: 1,
                    pmt_pid: 0x1000,
                }],
            }))
        );
    }

    #[test]
    fn test_pat_updates_program_map() {
        let pat = PsiTable::Pat(sample_pat());
        let buf = encode(&pat);
        let mut pm = ProgramMap::new();

        let decoded = decode_section(&buf, &mut pm, true).unwrap();
        assert_eq!(
            decoded,
            Decoded::Complete {
                value: Some(pat),
                consumed: buf.len(),
            }
        );
        assert_eq!(pm.get(0x100), Some(1));
        assert_eq!(pm.get(0x200), Some(2));
        // Network PID is not a PMT carrier
        assert!(!pm.contains(0x10));
    }

    #[test]
    fn test_pmt_decode() {
        let pmt = PsiTable::Pmt(sample_pmt());
        let buf = encode(&pmt);
        let mut pm = ProgramMap::new();
        let decoded = decode_section(&buf, &mut pm, true).unwrap();
        assert_eq!(
            decoded,
            Decoded::Complete {
                value: Some(pmt),
                consumed: buf.len(),
            }
        );
        assert!(pm.is_empty());
    }

    #[test]
    fn test_truncated_section_is_incomplete() {
        let buf = encode(&PsiTable::Pmt(sample_pmt()));
        for cut in [0, 1, 2, 3, buf.len() / 2, buf.len() - 1] {
            assert_eq!(parse_section(&buf[..cut], true).unwrap(), Decoded::Incomplete);
        }
    }

    #[test]
    fn test_crc_mismatch() {
        let mut buf = encode(&PsiTable::Pat(sample_pat()));
        let last = buf.len() - 1;
        buf[last] ^= 0xFF;
        assert!(matches!(
            parse_section(&buf, true),
            Err(DemuxError::CrcMismatch { .. })
        ));
        // Skipping verification accepts the section
        assert!(matches!(
            parse_section(&buf, false),
            Ok(Decoded::Complete { value: Some(_), .. })
        ));
    }

    #[test]
    fn test_misaligned_pat_is_malformed() {
        // Section length 15: one program entry plus two stray bytes
        let section = [
            0x00, 0xB0, 0x0F, 0x00, 0x01, 0xC1, 0x00, 0x00, 0x00, 0x01, 0xE1, 0x00, 0xAA, 0xBB,
            0x00, 0x00, 0x00, 0x00,
        ];
        assert!(matches!(
            parse_section(&section, false),
            Err(DemuxError::MalformedSection(_))
        ));
    }

    #[test]
    fn test_pmt_es_info_overrun_is_malformed() {
        let section = [
            0x02, 0xB0, 0x12, // section length 18
            0x00, 0x01, 0xC1, 0x00, 0x00, // syntax header
            0xE1, 0x01, 0xF0, 0x00, // PCR PID, no program info
            0x1B, 0xE1, 0x01, 0xF0, 0x09, // ES info length 9 > remaining
            0x00, 0x00, 0x00, 0x00, // CRC (unchecked)
        ];
        assert!(matches!(
            parse_section(&section, false),
            Err(DemuxError::MalformedSection(_))
        ));
    }

    #[test]
    fn test_short_syntax_section_is_malformed() {
        let section = [0x00, 0xB0, 0x04, 0x00, 0x01, 0xC1, 0x00];
        assert!(matches!(
            parse_section(&section, false),
            Err(DemuxError::MalformedSection(_))
        ));
    }

    #[test]
    fn test_unsupported_table_is_skipped() {
        // SDT-like table id with an opaque body
        let section = [0x42, 0xF0, 0x03, 0x01, 0x02, 0x03, 0xEE];
        assert_eq!(
            parse_section(&section, true).unwrap(),
            Decoded::Complete {
                value: None,
                consumed: 6,
            }
        );
    }

    #[test]
    fn test_decode_sections_until_stuffing() {
        let pat = PsiTable::Pat(sample_pat());
        let pmt = PsiTable::Pmt(sample_pmt());

        let mut buf = BytesMut::new();
        buf.extend_from_slice(&encode(&pat));
        buf.put_slice(&[0x42, 0xF0, 0x01, 0x00]); // unsupported table
        buf.extend_from_slice(&encode(&pmt));
        let sections = buf.len();
        buf.put_slice(&[0xFF; 12]);

        let mut pm = ProgramMap::new();
        let run = decode_sections(&buf, &mut pm, true).unwrap();
        assert_eq!(run.tables, vec![pat, pmt]);
        assert_eq!(run.consumed, sections);
        assert!(run.finished);
        assert_eq!(pm.get(0x200), Some(2));
    }

    #[test]
    fn test_decode_sections_keeps_unit_open_at_end_of_data() {
        let pat = encode(&PsiTable::Pat(sample_pat()));
        let mut pm = ProgramMap::new();

        let run = decode_sections(&pat, &mut pm, true).unwrap();
        assert_eq!(run.tables.len(), 1);
        assert_eq!(run.consumed, pat.len());
        assert!(!run.finished);

        let run = decode_sections(&[], &mut pm, true).unwrap();
        assert!(run.tables.is_empty());
        assert!(!run.finished);
    }

    #[test]
    fn test_decode_sections_stops_at_partial_section() {
        let pat = encode(&PsiTable::Pat(sample_pat()));
        let pmt = encode(&PsiTable::Pmt(sample_pmt()));
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&pat);
        buf.extend_from_slice(&pmt[..10]);

        let mut pm = ProgramMap::new();
        let run = decode_sections(&buf, &mut pm, true).unwrap();
        assert_eq!(run.tables.len(), 1);
        assert_eq!(run.consumed, pat.len());
        assert!(!run.finished);
    }
}
