//! Fragments as kept by the store.

use chrono::{DateTime, Duration, NaiveDate, Timelike, Utc};

use crate::section::{SectionOrigin, SummaryRecord, TitleRecord, UndefinedRecord};

/// The title half of a programme.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TitleFragment {
    pub event_id: u16,
    pub start_time: DateTime<Utc>,
    pub duration: Duration,
    /// Compressed name bytes, expanded at synthesis.
    pub name: Vec<u8>,
    pub category: Option<u8>,
    pub flags: Option<u16>,
    pub undefined: Vec<UndefinedRecord>,
    pub origin: SectionOrigin,
}

impl TitleFragment {
    pub fn from_record(record: &TitleRecord, base_date: NaiveDate, origin: SectionOrigin) -> Self {
        Self {
            event_id: record.event_id,
            start_time: record.start_time(base_date),
            duration: record.duration(),
            name: record.name.clone(),
            category: record.category,
            flags: record.flags,
            undefined: record.undefined.clone(),
            origin,
        }
    }

    /// Broadcasters only schedule on whole minutes; anything else points at
    /// a corrupt timestamp.
    pub fn has_suspect_start(&self) -> bool {
        self.start_time.second() != 0
    }

    pub fn end_time(&self) -> DateTime<Utc> {
        self.start_time + self.duration
    }
}

/// The description half of a programme.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryFragment {
    pub event_id: u16,
    /// Compressed short description.
    pub short_description: Vec<u8>,
    pub extended_description: Option<Vec<u8>>,
    pub series_link: Option<u16>,
    pub undefined: Vec<UndefinedRecord>,
    pub origin: SectionOrigin,
}

impl SummaryFragment {
    pub fn from_record(record: &SummaryRecord, origin: SectionOrigin) -> Self {
        Self {
            event_id: record.event_id,
            short_description: record.short_description.clone(),
            extended_description: record.extended_description.clone(),
            series_link: record.series_link,
            undefined: record.undefined.clone(),
            origin,
        }
    }
}
