//! OpenTV private section decoding.
//!
//! This module turns raw private sections into typed tables and records.
//!
//! # Supported Tables
//! - BAT (Bouquet Association Table) - PID 0x0011, OpenTV channel descriptors
//! - OpenTV titles - PIDs 0x30-0x37, table ids 0xA0-0xA3
//! - OpenTV summaries - PIDs 0x40-0x47, table ids 0xA8-0xAB
//!
//! Every record carries an explicit length prefix. Callers always move to the
//! next sibling using the declared length, never from where a decoder stopped,
//! so one broken record cannot desynchronize the rest of a section.

mod bat;
mod descriptors;
mod packet;
mod psi;
mod summary;
mod title;

use bytes::Bytes;
use chrono::{DateTime, Duration, NaiveDate, Utc};

use crate::error::RecordError;

pub use bat::{BatTable, BatTransportStream};
pub use descriptors::{
    parse_descriptor_loop, BouquetNameDescriptor, ChannelGroupDescriptor, OpenTvChannelDescriptor,
    OpenTvChannelEntry,
};
pub use packet::{TsPacket, TsPacketIterator, TS_PACKET_SIZE, SYNC_BYTE};
pub use psi::{crc32_mpeg2, PsiHeader, PsiSection, SectionAssembler};
pub use summary::{decode_summary_record, SummaryRecord, SummarySection};
pub use title::{decode_title_record, TitleRecord, TitleSection};

#[cfg(test)]
pub(crate) use bat::fixtures as bat_fixtures;

/// Well-known PIDs for OpenTV EPG carousels.
pub mod pid {
    /// Bouquet Association Table PID (shared with SDT).
    pub const BAT: u16 = 0x0011;
    /// First OpenTV title PID.
    pub const TITLE_FIRST: u16 = 0x0030;
    /// Last OpenTV title PID.
    pub const TITLE_LAST: u16 = 0x0037;
    /// First OpenTV summary PID.
    pub const SUMMARY_FIRST: u16 = 0x0040;
    /// Last OpenTV summary PID.
    pub const SUMMARY_LAST: u16 = 0x0047;
}

/// Table IDs used by OpenTV EPG carousels.
pub mod table_id {
    /// Bouquet Association Section.
    pub const BAT: u8 = 0x4A;
    /// First OpenTV title table.
    pub const TITLE_FIRST: u8 = 0xA0;
    /// Last OpenTV title table.
    pub const TITLE_LAST: u8 = 0xA3;
    /// First OpenTV summary table.
    pub const SUMMARY_FIRST: u8 = 0xA8;
    /// Last OpenTV summary table.
    pub const SUMMARY_LAST: u8 = 0xAB;

    pub fn is_title(table_id: u8) -> bool {
        (TITLE_FIRST..=TITLE_LAST).contains(&table_id)
    }

    pub fn is_summary(table_id: u8) -> bool {
        (SUMMARY_FIRST..=SUMMARY_LAST).contains(&table_id)
    }
}

/// Descriptor tags found in the BAT.
pub mod descriptor_tag {
    /// Bouquet name descriptor (0x47).
    pub const BOUQUET_NAME: u8 = 0x47;
    /// OpenTV channel descriptor (0xB1).
    pub const OPENTV_CHANNEL: u8 = 0xB1;
    /// OpenTV channel-group descriptor (0xB2).
    pub const CHANNEL_GROUP: u8 = 0xB2;
}

/// Record tags inside title and summary records.
pub mod record_tag {
    /// Compressed event name.
    pub const TITLE_NAME: u8 = 0xB5;
    /// Title flag word.
    pub const TITLE_FLAGS: u8 = 0xB6;
    /// Title category id.
    pub const TITLE_CATEGORY: u8 = 0xB7;
    /// Compressed short description.
    pub const SHORT_DESCRIPTION: u8 = 0xB9;
    /// Compressed extended description.
    pub const EXTENDED_DESCRIPTION: u8 = 0xBB;
    /// Series link id.
    pub const SERIES_LINK: u8 = 0xC1;
}

/// A raw section as handed over by the section delivery collaborator.
#[derive(Debug, Clone)]
pub struct Section {
    /// PID the section arrived on.
    pub pid: u16,
    /// Table id (first byte of the section).
    pub table_id: u8,
    /// Arrival time.
    pub received_at: DateTime<Utc>,
    /// Section bytes starting at the table id, including the CRC.
    pub data: Bytes,
}

impl Section {
    /// Wrap raw section bytes. Returns `None` for an empty buffer.
    pub fn new(pid: u16, data: Bytes, received_at: DateTime<Utc>) -> Option<Self> {
        let table_id = *data.first()?;
        Some(Self {
            pid,
            table_id,
            received_at,
            data,
        })
    }
}

/// Where a record was carried, kept with every fragment for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct SectionOrigin {
    pub pid: u16,
    pub table_id: u8,
    pub received_at: DateTime<Utc>,
}

impl From<&Section> for SectionOrigin {
    fn from(section: &Section) -> Self {
        Self {
            pid: section.pid,
            table_id: section.table_id,
            received_at: section.received_at,
        }
    }
}

/// An unrecognized tagged record, preserved verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UndefinedRecord {
    pub tag: u8,
    pub data: Vec<u8>,
}

/// Read a big-endian u16 at `offset`.
pub(crate) fn be_u16(data: &[u8], offset: usize) -> Result<u16, RecordError> {
    match data.get(offset..offset + 2) {
        Some(b) => Ok(((b[0] as u16) << 8) | b[1] as u16),
        None => Err(RecordError::malformed(offset, "truncated 16-bit field")),
    }
}

/// Read a 12-bit length that follows 4 reserved bits.
pub(crate) fn length12(data: &[u8], offset: usize) -> Result<usize, RecordError> {
    be_u16(data, offset).map(|v| (v & 0x0FFF) as usize)
}

/// Write a 12-bit length with the reserved bits set.
pub(crate) fn put_length12(out: &mut Vec<u8>, length: usize) {
    let v = 0xF000 | (length as u16 & 0x0FFF);
    out.extend_from_slice(&v.to_be_bytes());
}

/// Split a tag/length record stream into `(tag, body, offset)` items.
///
/// The stream must end exactly at `end`.
pub(crate) fn tagged_records(
    data: &[u8],
    start: usize,
    end: usize,
) -> Result<Vec<(u8, &[u8], usize)>, RecordError> {
    let mut records = Vec::new();
    let mut offset = start;

    while offset < end {
        if offset + 2 > end {
            return Err(RecordError::malformed(offset, "truncated record header"));
        }
        let tag = data[offset];
        let length = data[offset + 1] as usize;
        let body_start = offset + 2;
        if body_start + length > end {
            return Err(RecordError::malformed(offset, "record overruns its parent"));
        }
        records.push((tag, &data[body_start..body_start + length], offset));
        offset = body_start + length;
    }

    Ok(records)
}

/// Decode a run of sibling records.
///
/// `extent` reads a record's declared size; `decode` decodes it. A decode
/// failure is collected and the cursor still advances by the declared size.
/// When the declared size itself cannot be read, or runs past the end of
/// `data`, one error is collected and the rest of the run is lost.
pub(crate) fn decode_siblings<T>(
    data: &[u8],
    start: usize,
    extent: impl Fn(&[u8], usize) -> Result<usize, RecordError>,
    decode: impl Fn(&[u8], usize) -> Result<(T, usize), RecordError>,
) -> (Vec<T>, Vec<RecordError>) {
    let mut values = Vec::new();
    let mut errors = Vec::new();
    let mut offset = start;

    while offset < data.len() {
        let next = match extent(data, offset) {
            Ok(next) => next,
            Err(e) => {
                errors.push(e);
                break;
            }
        };

        if next > data.len() {
            errors.push(RecordError::malformed(offset, "declared length past section end"));
            break;
        }

        match decode(data, offset) {
            Ok((value, _)) => values.push(value),
            Err(e) => errors.push(e),
        }
        offset = next;
    }

    (values, errors)
}

/// Convert a Modified Julian Date to a calendar date.
pub fn mjd_to_date(mjd: u16) -> NaiveDate {
    // MJD 0 is 1858-11-17
    NaiveDate::from_ymd_opt(1858, 11, 17)
        .map(|epoch| epoch + Duration::days(mjd as i64))
        .unwrap_or(NaiveDate::MIN)
}

/// Convert a calendar date to a Modified Julian Date.
pub fn date_to_mjd(date: NaiveDate) -> u16 {
    let epoch = NaiveDate::from_ymd_opt(1858, 11, 17).unwrap_or(NaiveDate::MIN);
    (date - epoch).num_days().clamp(0, u16::MAX as i64) as u16
}
