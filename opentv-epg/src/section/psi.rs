//! Private section header parsing and section reassembly.

use crate::error::RecordError;

/// Long-form private section header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PsiHeader {
    /// Table ID.
    pub table_id: u8,
    /// Section length (12 bits).
    pub section_length: u16,
    /// Table ID extension (channel id or bouquet id for OpenTV tables).
    pub table_id_extension: u16,
    /// Version number (5 bits).
    pub version_number: u8,
    /// Current/next indicator.
    pub current_next_indicator: bool,
    /// Section number.
    pub section_number: u8,
    /// Last section number.
    pub last_section_number: u8,
}

/// A parsed long-form section.
#[derive(Debug, Clone)]
pub struct PsiSection<'a> {
    /// Section header.
    pub header: PsiHeader,
    /// Section body (after header, before CRC).
    pub data: &'a [u8],
    /// CRC32 value.
    pub crc32: u32,
    raw: &'a [u8],
}

impl<'a> PsiSection<'a> {
    /// Header size of a long-form section.
    pub const HEADER_SIZE: usize = 8;

    /// Parse a long-form section starting at the table id.
    pub fn parse(data: &'a [u8]) -> Result<Self, RecordError> {
        if data.len() < 3 {
            return Err(RecordError::malformed(0, "section too short for header"));
        }

        let table_id = data[0];
        let section_syntax_indicator = data[1] & 0x80 != 0;
        let section_length = ((data[1] as u16 & 0x0F) << 8) | data[2] as u16;

        if !section_syntax_indicator {
            return Err(RecordError::malformed(1, "short-form section"));
        }
        if section_length < 9 {
            return Err(RecordError::malformed(1, "section length too small"));
        }

        let total_length = 3 + section_length as usize;
        if data.len() < total_length {
            return Err(RecordError::malformed(2, "incomplete section data"));
        }

        let header = PsiHeader {
            table_id,
            section_length,
            table_id_extension: ((data[3] as u16) << 8) | data[4] as u16,
            version_number: (data[5] >> 1) & 0x1F,
            current_next_indicator: data[5] & 0x01 != 0,
            section_number: data[6],
            last_section_number: data[7],
        };

        let crc_offset = total_length - 4;
        let crc32 = ((data[crc_offset] as u32) << 24)
            | ((data[crc_offset + 1] as u32) << 16)
            | ((data[crc_offset + 2] as u32) << 8)
            | (data[crc_offset + 3] as u32);

        Ok(PsiSection {
            header,
            data: &data[Self::HEADER_SIZE..crc_offset],
            crc32,
            raw: &data[..total_length],
        })
    }

    /// Verify the CRC32 of the section.
    pub fn verify_crc(&self) -> bool {
        crc32_mpeg2(&self.raw[..self.raw.len() - 4]) == self.crc32
    }

    /// Get the total section length including header and CRC.
    pub fn total_length(&self) -> usize {
        self.raw.len()
    }
}

/// Reassembles sections for one PID from TS packet payloads.
///
/// A payload may finish one section and start several more; every completed
/// section is returned by [`SectionAssembler::push`].
#[derive(Debug, Default)]
pub struct SectionAssembler {
    buffer: Vec<u8>,
    last_cc: Option<u8>,
    synced: bool,
}

impl SectionAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop any partially collected section.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.synced = false;
    }

    /// Feed one packet payload. Returns the sections it completed.
    pub fn push(&mut self, payload: &[u8], cc: u8, payload_unit_start: bool) -> Vec<Vec<u8>> {
        if let Some(last) = self.last_cc {
            if cc == last {
                // Duplicate packet
                return Vec::new();
            }
            if cc != (last + 1) & 0x0F {
                self.clear();
            }
        }
        self.last_cc = Some(cc);

        if payload_unit_start {
            let Some(&pointer) = payload.first() else {
                return Vec::new();
            };
            let pointer = pointer as usize;
            let start = 1 + pointer;
            if start > payload.len() {
                self.clear();
                return Vec::new();
            }

            if self.synced {
                // Tail of the previous section
                self.buffer.extend_from_slice(&payload[1..start]);
            }
            let mut sections = self.take_complete();

            self.buffer.clear();
            self.buffer.extend_from_slice(&payload[start..]);
            self.synced = true;
            sections.extend(self.take_complete());
            sections
        } else if self.synced {
            self.buffer.extend_from_slice(payload);
            self.take_complete()
        } else {
            Vec::new()
        }
    }

    fn take_complete(&mut self) -> Vec<Vec<u8>> {
        let mut sections = Vec::new();

        loop {
            // 0xFF marks stuffing after the last section in a packet
            if self.buffer.first().map_or(true, |&b| b == 0xFF) {
                if !self.buffer.is_empty() {
                    self.buffer.clear();
                    self.synced = false;
                }
                break;
            }
            if self.buffer.len() < 3 {
                break;
            }
            let total = 3 + (((self.buffer[1] as usize & 0x0F) << 8) | self.buffer[2] as usize);
            if self.buffer.len() < total {
                break;
            }
            sections.push(self.buffer.drain(..total).collect());
        }

        sections
    }
}

/// Calculate CRC32 for MPEG-2 (polynomial 0x04C11DB7).
pub fn crc32_mpeg2(data: &[u8]) -> u32 {
    static CRC_TABLE: [u32; 256] = {
        let mut table = [0u32; 256];
        let mut i = 0;
        while i < 256 {
            let mut crc = (i as u32) << 24;
            let mut j = 0;
            while j < 8 {
                if crc & 0x80000000 != 0 {
                    crc = (crc << 1) ^ 0x04C11DB7;
                } else {
                    crc <<= 1;
                }
                j += 1;
            }
            table[i] = crc;
            i += 1;
        }
        table
    };

    let mut crc = 0xFFFFFFFFu32;
    for &byte in data {
        let index = ((crc >> 24) ^ byte as u32) as usize;
        crc = (crc << 8) ^ CRC_TABLE[index];
    }
    crc
}
