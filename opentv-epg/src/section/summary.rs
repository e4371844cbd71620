//! OpenTV summary table decoding.
//!
//! ```text
//! base_date(16, MJD)
//! repeated:
//!   event_id(16) reserved(4) records_length(12)
//!   records: tag(8) length(8) body
//! ```

use chrono::NaiveDate;

use super::psi::PsiSection;
use super::title::push_record;
use super::{be_u16, decode_siblings, length12, mjd_to_date, put_length12, record_tag, table_id};
use super::{tagged_records, UndefinedRecord};
use crate::error::RecordError;

/// One decoded summary record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryRecord {
    pub event_id: u16,
    /// Compressed short description.
    pub short_description: Vec<u8>,
    /// Compressed extended description.
    pub extended_description: Option<Vec<u8>>,
    pub series_link: Option<u16>,
    pub undefined: Vec<UndefinedRecord>,
}

impl SummaryRecord {
    pub const HEADER_SIZE: usize = 4;

    pub fn encode(&self) -> Vec<u8> {
        let mut records = Vec::new();
        push_record(&mut records, record_tag::SHORT_DESCRIPTION, &self.short_description);
        if let Some(extended) = &self.extended_description {
            push_record(&mut records, record_tag::EXTENDED_DESCRIPTION, extended);
        }
        if let Some(link) = self.series_link {
            push_record(&mut records, record_tag::SERIES_LINK, &link.to_be_bytes());
        }
        for u in &self.undefined {
            push_record(&mut records, u.tag, &u.data);
        }

        let mut out = Vec::with_capacity(Self::HEADER_SIZE + records.len());
        out.extend_from_slice(&self.event_id.to_be_bytes());
        put_length12(&mut out, records.len());
        out.extend_from_slice(&records);
        out
    }
}

pub fn summary_record_extent(data: &[u8], offset: usize) -> Result<usize, RecordError> {
    if offset + SummaryRecord::HEADER_SIZE > data.len() {
        return Err(RecordError::malformed(offset, "truncated summary header"));
    }
    Ok(offset + SummaryRecord::HEADER_SIZE + length12(data, offset + 2)?)
}

/// Decode the summary record at `offset`. Returns the record and the offset
/// of the next sibling.
pub fn decode_summary_record(
    data: &[u8],
    offset: usize,
) -> Result<(SummaryRecord, usize), RecordError> {
    let end = summary_record_extent(data, offset)?;
    if end > data.len() {
        return Err(RecordError::malformed(offset + 2, "summary records past section end"));
    }

    let event_id = be_u16(data, offset)?;
    let mut short_description = None;
    let mut extended_description = None;
    let mut series_link = None;
    let mut undefined = Vec::new();

    for (tag, body, at) in tagged_records(data, offset + SummaryRecord::HEADER_SIZE, end)? {
        match tag {
            record_tag::SHORT_DESCRIPTION => short_description = Some(body.to_vec()),
            record_tag::EXTENDED_DESCRIPTION => extended_description = Some(body.to_vec()),
            record_tag::SERIES_LINK => {
                series_link = Some(
                    be_u16(body, 0)
                        .map_err(|_| RecordError::malformed(at, "series link must be 2 bytes"))?,
                );
            }
            _ => undefined.push(UndefinedRecord {
                tag,
                data: body.to_vec(),
            }),
        }
    }

    let short_description = short_description
        .ok_or_else(|| RecordError::malformed(offset, "summary record has no description"))?;

    Ok((
        SummaryRecord {
            event_id,
            short_description,
            extended_description,
            series_link,
            undefined,
        },
        end,
    ))
}

/// A decoded summary section.
#[derive(Debug, Clone)]
pub struct SummarySection {
    /// OpenTV channel id (table id extension).
    pub channel_id: u16,
    pub version_number: u8,
    pub base_date: NaiveDate,
    pub records: Vec<SummaryRecord>,
    /// Records that were skipped.
    pub errors: Vec<RecordError>,
}

impl SummarySection {
    pub fn parse(section: &PsiSection) -> Result<Self, RecordError> {
        if !table_id::is_summary(section.header.table_id) {
            return Err(RecordError::malformed(0, "not a summary section"));
        }

        let data = section.data;
        let base_date = mjd_to_date(be_u16(data, 0)?);
        let (records, errors) =
            decode_siblings(data, 2, summary_record_extent, decode_summary_record);

        Ok(Self {
            channel_id: section.header.table_id_extension,
            version_number: section.header.version_number,
            base_date,
            records,
            errors,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::section::testutil::long_section;

    fn sample(event_id: u16) -> SummaryRecord {
        SummaryRecord {
            event_id,
            short_description: vec![0x12, 0x34],
            extended_description: Some(vec![0x56]),
            series_link: Some(0x0777),
            undefined: Vec::new(),
        }
    }

    #[test]
    fn test_decode_summary_record() {
        let bytes = sample(5).encode();
        let (record, next) = decode_summary_record(&bytes, 0).unwrap();
        assert_eq!(record, sample(5));
        assert_eq!(next, bytes.len());
    }

    #[test]
    fn test_short_description_required() {
        let mut bytes = sample(5).encode();
        bytes[4] = 0xEE; // retag the short description
        let err = decode_summary_record(&bytes, 0).unwrap_err();
        assert_eq!(err, RecordError::malformed(0, "summary record has no description"));
    }

    #[test]
    fn test_bad_series_link() {
        let mut bytes = sample(5).encode();
        // series link record starts after short (2+2) and extended (2+1)
        let link_at = 4 + 4 + 3;
        assert_eq!(bytes[link_at], record_tag::SERIES_LINK);
        bytes[link_at + 1] = 1;
        bytes.remove(link_at + 3);
        let len = bytes.len() - 4;
        bytes[2] = 0xF0 | (len >> 8) as u8;
        bytes[3] = len as u8;
        assert!(decode_summary_record(&bytes, 0).is_err());
    }

    #[test]
    fn test_parse_summary_section() {
        let mut body = vec![0xEB, 0x96]; // MJD 60310
        body.extend_from_slice(&sample(1).encode());
        body.extend_from_slice(&sample(2).encode());

        let raw = long_section(0xA8, 0x0BB8, &body);
        let section = PsiSection::parse(&raw).unwrap();
        let summaries = SummarySection::parse(&section).unwrap();

        assert_eq!(summaries.channel_id, 0x0BB8);
        assert_eq!(summaries.base_date, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        assert_eq!(summaries.records.len(), 2);
        assert!(summaries.errors.is_empty());

        let raw = long_section(0xA0, 0x0BB8, &body);
        let section = PsiSection::parse(&raw).unwrap();
        assert!(SummarySection::parse(&section).is_err());
    }
}
