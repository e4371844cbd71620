//! OpenTV title table decoding.
//!
//! ```text
//! base_date(16, MJD)
//! repeated:
//!   event_id(16) start_offset(16) duration(16) reserved(4) records_length(12)
//!   records: tag(8) length(8) body
//! ```
//!
//! Start offsets and durations count 2-second units from 00:00 UTC of the
//! base date.

use chrono::{DateTime, Duration, NaiveDate, Utc};

use super::psi::PsiSection;
use super::{be_u16, decode_siblings, length12, mjd_to_date, put_length12, record_tag, table_id};
use super::{tagged_records, UndefinedRecord};
use crate::error::RecordError;

/// One decoded title record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TitleRecord {
    pub event_id: u16,
    /// Start, in 2-second units from the base date.
    pub start_offset: u16,
    /// Duration, in 2-second units.
    pub duration: u16,
    /// Compressed event name.
    pub name: Vec<u8>,
    pub flags: Option<u16>,
    pub category: Option<u8>,
    pub undefined: Vec<UndefinedRecord>,
}

impl TitleRecord {
    /// Fixed header size before the tagged records.
    pub const HEADER_SIZE: usize = 8;

    pub fn start_time(&self, base_date: NaiveDate) -> DateTime<Utc> {
        base_date.and_time(chrono::NaiveTime::MIN).and_utc()
            + Duration::seconds(self.start_offset as i64 * 2)
    }

    pub fn duration(&self) -> Duration {
        Duration::seconds(self.duration as i64 * 2)
    }

    /// Encode back to wire form.
    pub fn encode(&self) -> Vec<u8> {
        let mut records = Vec::new();
        push_record(&mut records, record_tag::TITLE_NAME, &self.name);
        if let Some(flags) = self.flags {
            push_record(&mut records, record_tag::TITLE_FLAGS, &flags.to_be_bytes());
        }
        if let Some(category) = self.category {
            push_record(&mut records, record_tag::TITLE_CATEGORY, &[category]);
        }
        for u in &self.undefined {
            push_record(&mut records, u.tag, &u.data);
        }

        let mut out = Vec::with_capacity(Self::HEADER_SIZE + records.len());
        out.extend_from_slice(&self.event_id.to_be_bytes());
        out.extend_from_slice(&self.start_offset.to_be_bytes());
        out.extend_from_slice(&self.duration.to_be_bytes());
        put_length12(&mut out, records.len());
        out.extend_from_slice(&records);
        out
    }
}

pub(crate) fn push_record(out: &mut Vec<u8>, tag: u8, body: &[u8]) {
    let body = &body[..body.len().min(u8::MAX as usize)];
    out.push(tag);
    out.push(body.len() as u8);
    out.extend_from_slice(body);
}

/// Offset of the record following the title record at `offset`, from its
/// declared length.
pub fn title_record_extent(data: &[u8], offset: usize) -> Result<usize, RecordError> {
    if offset + TitleRecord::HEADER_SIZE > data.len() {
        return Err(RecordError::malformed(offset, "truncated title header"));
    }
    Ok(offset + TitleRecord::HEADER_SIZE + length12(data, offset + 6)?)
}

/// Decode the title record at `offset`. Returns the record and the offset of
/// the next sibling.
pub fn decode_title_record(data: &[u8], offset: usize) -> Result<(TitleRecord, usize), RecordError> {
    let end = title_record_extent(data, offset)?;
    if end > data.len() {
        return Err(RecordError::malformed(offset + 6, "title records past section end"));
    }

    let mut record = TitleRecord {
        event_id: be_u16(data, offset)?,
        start_offset: be_u16(data, offset + 2)?,
        duration: be_u16(data, offset + 4)?,
        name: Vec::new(),
        flags: None,
        category: None,
        undefined: Vec::new(),
    };

    let mut has_name = false;
    for (tag, body, at) in tagged_records(data, offset + TitleRecord::HEADER_SIZE, end)? {
        match tag {
            record_tag::TITLE_NAME => {
                record.name = body.to_vec();
                has_name = true;
            }
            record_tag::TITLE_FLAGS => {
                if body.len() != 2 {
                    return Err(RecordError::malformed(at, "flags record must be 2 bytes"));
                }
                record.flags = Some(((body[0] as u16) << 8) | body[1] as u16);
            }
            record_tag::TITLE_CATEGORY => {
                if body.len() != 1 {
                    return Err(RecordError::malformed(at, "category record must be 1 byte"));
                }
                record.category = Some(body[0]);
            }
            _ => record.undefined.push(UndefinedRecord {
                tag,
                data: body.to_vec(),
            }),
        }
    }

    if !has_name {
        return Err(RecordError::malformed(offset, "title record has no name"));
    }

    Ok((record, end))
}

/// A decoded title section.
#[derive(Debug, Clone)]
pub struct TitleSection {
    /// OpenTV channel id (table id extension).
    pub channel_id: u16,
    pub version_number: u8,
    pub base_date: NaiveDate,
    pub records: Vec<TitleRecord>,
    /// Records that were skipped.
    pub errors: Vec<RecordError>,
}

impl TitleSection {
    pub fn parse(section: &PsiSection) -> Result<Self, RecordError> {
        if !table_id::is_title(section.header.table_id) {
            return Err(RecordError::malformed(0, "not a title section"));
        }

        let data = section.data;
        let base_date = mjd_to_date(be_u16(data, 0)?);
        let (records, errors) = decode_siblings(data, 2, title_record_extent, decode_title_record);

        Ok(Self {
            channel_id: section.header.table_id_extension,
            version_number: section.header.version_number,
            base_date,
            records,
            errors,
        })
    }
}
