//! Per-group section decoding.

use std::collections::BTreeMap;
use std::sync::Arc;

use log::{debug, trace};
use serde::Serialize;

use super::{GroupCounters, TableGroup};
use crate::channel::ChannelRegistry;
use crate::config::DiagnosticsConfig;
use crate::error::RecordError;
use crate::section::{
    table_id, BatTable, PsiSection, Section, SectionOrigin, SummarySection, TitleSection,
    UndefinedRecord,
};
use crate::store::{InsertOutcome, SummaryFragment, SummaryStore, TitleFragment, TitleStore};
use crate::text::Dictionary;

/// Decodes the sections of one table group into its fragment container.
pub trait GroupCollector: Send {
    fn group(&self) -> TableGroup;

    /// Decode one section. Failures are logged and counted, never returned.
    fn process(&mut self, section: &Section);

    /// Total fragments held; the convergence measure.
    fn fragment_count(&self) -> usize;

    fn counters(&self) -> &GroupCounters;
}

/// What every collector needs besides its own container.
#[derive(Debug, Clone)]
pub struct SectionContext {
    pub dictionary: Arc<Dictionary>,
    pub diagnostics: DiagnosticsConfig,
    pub verify_crc: bool,
}

impl SectionContext {
    /// Expand compressed text for diagnostic output.
    fn text(&self, bytes: &[u8]) -> String {
        self.dictionary
            .decode(bytes)
            .unwrap_or_else(|e| format!("<{}>", e))
    }

    /// Parse the PSI header, checking the CRC when configured.
    fn open<'a>(
        &self,
        group: TableGroup,
        section: &'a Section,
        counters: &mut GroupCounters,
    ) -> Option<PsiSection<'a>> {
        counters.sections += 1;

        let psi = match PsiSection::parse(&section.data) {
            Ok(psi) => psi,
            Err(e) => {
                counters.ignored_sections += 1;
                debug!(
                    "[Acquisition] {} group: bad section on PID 0x{:04X} table 0x{:02X}: {}",
                    group, section.pid, section.table_id, e
                );
                return None;
            }
        };

        if self.verify_crc && !psi.verify_crc() {
            counters.crc_errors += 1;
            debug!(
                "[Acquisition] {} group: CRC mismatch on PID 0x{:04X} table 0x{:02X}",
                group, section.pid, section.table_id
            );
            return None;
        }

        Some(psi)
    }

    fn log_undefined(&self, section: &Section, event_id: u16, undefined: &[UndefinedRecord], counters: &mut GroupCounters) {
        for record in undefined {
            *counters.undefined_records.entry(record.tag).or_insert(0) += 1;
            if self.diagnostics.log_undefined_records {
                debug!(
                    "[Acquisition] Undefined record 0x{:02X} on PID 0x{:04X} table 0x{:02X} event {}: {:02X?}",
                    record.tag, section.pid, section.table_id, event_id, record.data
                );
            }
        }
    }
}

fn log_malformed(group: TableGroup, section: &Section, errors: &[RecordError], counters: &mut GroupCounters) {
    counters.malformed_records += errors.len() as u64;
    for e in errors {
        debug!(
            "[Acquisition] {} group: skipped record on PID 0x{:04X} table 0x{:02X}: {}",
            group, section.pid, section.table_id, e
        );
    }
}

fn count_outcome(outcome: InsertOutcome, counters: &mut GroupCounters) {
    match outcome {
        InsertOutcome::Inserted => counters.inserted += 1,
        InsertOutcome::Duplicate => counters.duplicates += 1,
        InsertOutcome::Suspect => counters.suspect_start_times += 1,
    }
}

/// Fills the channel registry from bouquet association sections.
pub struct BouquetCollector {
    registry: ChannelRegistry,
    context: SectionContext,
    counters: GroupCounters,
}

impl BouquetCollector {
    pub fn new(registry: ChannelRegistry, context: SectionContext) -> Self {
        Self {
            registry,
            context,
            counters: GroupCounters::default(),
        }
    }

    pub fn registry(&self) -> &ChannelRegistry {
        &self.registry
    }

    pub fn into_registry(self) -> ChannelRegistry {
        self.registry
    }

    fn log_channel_data(&self, bat: &BatTable) {
        for ts in &bat.transport_streams {
            for group in &ts.channel_groups {
                let description = if group.description.is_empty() {
                    String::new()
                } else {
                    self.context.text(&group.description)
                };
                debug!(
                    "[Bouquet] {} TS {}: channel group type {} flags 0x{:02X} id {:?} \"{}\"",
                    bat.bouquet_id, ts.transport_stream_id, group.group_type, group.flags,
                    group.group_id, description
                );
            }
            for descriptor in &ts.channel_descriptors {
                for entry in &descriptor.channels {
                    debug!(
                        "[Bouquet] {} region {}: onid {} tsid {} sid {} channel {} type {} number {} flags 0x{:04X}",
                        bat.bouquet_id,
                        descriptor.region_code,
                        ts.original_network_id,
                        ts.transport_stream_id,
                        entry.service_id,
                        entry.channel_id,
                        entry.channel_type,
                        entry.user_number,
                        entry.flags
                    );
                }
            }
        }
    }
}

impl GroupCollector for BouquetCollector {
    fn group(&self) -> TableGroup {
        TableGroup::Bouquet
    }

    fn process(&mut self, section: &Section) {
        // The bouquet PID also carries SDT sections
        if section.table_id != table_id::BAT {
            self.counters.sections += 1;
            self.counters.ignored_sections += 1;
            return;
        }
        let Some(psi) = self.context.open(TableGroup::Bouquet, section, &mut self.counters) else {
            return;
        };

        let bat = match BatTable::parse(&psi) {
            Ok(bat) => bat,
            Err(e) => {
                self.counters.ignored_sections += 1;
                debug!("[Bouquet] Dropping BAT section on PID 0x{:04X}: {}", section.pid, e);
                return;
            }
        };
        log_malformed(TableGroup::Bouquet, section, &bat.errors, &mut self.counters);

        if self.context.diagnostics.log_channel_data {
            self.log_channel_data(&bat);
        }

        let added = self.registry.ingest_bat(&bat);
        self.counters.inserted += added as u64;
        self.counters.duplicates = self.registry.counters().duplicates;
        if added > 0 {
            debug!(
                "[Bouquet] Bouquet {} section {}: {} new channel(s), {} total",
                bat.bouquet_id,
                psi.header.section_number,
                added,
                self.registry.len()
            );
        }
    }

    fn fragment_count(&self) -> usize {
        self.registry.len()
    }

    fn counters(&self) -> &GroupCounters {
        &self.counters
    }
}

/// Merges title sections into a [`TitleStore`].
pub struct TitleCollector {
    registry: Arc<ChannelRegistry>,
    store: TitleStore,
    context: SectionContext,
    counters: GroupCounters,
}

impl TitleCollector {
    pub fn new(registry: Arc<ChannelRegistry>, store: TitleStore, context: SectionContext) -> Self {
        Self {
            registry,
            store,
            context,
            counters: GroupCounters::default(),
        }
    }

    pub fn store(&self) -> &TitleStore {
        &self.store
    }

    pub fn into_store(self) -> TitleStore {
        self.store
    }
}

impl GroupCollector for TitleCollector {
    fn group(&self) -> TableGroup {
        TableGroup::Titles
    }

    fn process(&mut self, section: &Section) {
        let Some(psi) = self.context.open(TableGroup::Titles, section, &mut self.counters) else {
            return;
        };
        let titles = match TitleSection::parse(&psi) {
            Ok(titles) => titles,
            Err(e) => {
                self.counters.ignored_sections += 1;
                trace!("[Titles] Dropping section on PID 0x{:04X}: {}", section.pid, e);
                return;
            }
        };
        log_malformed(TableGroup::Titles, section, &titles.errors, &mut self.counters);

        let channel = match self.registry.find_by_channel_table_id(titles.channel_id) {
            Some(channel) => channel,
            None => {
                self.counters.unknown_channel += titles.records.len() as u64;
                trace!("[Titles] No channel for channel id {}", titles.channel_id);
                return;
            }
        };

        let origin = SectionOrigin::from(section);
        for record in &titles.records {
            self.context
                .log_undefined(section, record.event_id, &record.undefined, &mut self.counters);

            let fragment = TitleFragment::from_record(record, titles.base_date, origin);
            let start_time = fragment.start_time;
            let outcome = self.store.add_title(channel, fragment);
            if outcome != InsertOutcome::Duplicate && self.context.diagnostics.log_titles {
                debug!(
                    "[Titles] Channel {} event {} {} ({}s) category {:?} flags {:?}: {}",
                    titles.channel_id,
                    record.event_id,
                    start_time,
                    record.duration as u32 * 2,
                    record.category,
                    record.flags,
                    self.context.text(&record.name)
                );
            }
            count_outcome(outcome, &mut self.counters);
        }
    }

    fn fragment_count(&self) -> usize {
        self.store.fragment_count()
    }

    fn counters(&self) -> &GroupCounters {
        &self.counters
    }
}

/// Merges summary sections into a [`SummaryStore`].
pub struct SummaryCollector {
    registry: Arc<ChannelRegistry>,
    store: SummaryStore,
    context: SectionContext,
    counters: GroupCounters,
}

impl SummaryCollector {
    pub fn new(registry: Arc<ChannelRegistry>, store: SummaryStore, context: SectionContext) -> Self {
        Self {
            registry,
            store,
            context,
            counters: GroupCounters::default(),
        }
    }

    pub fn store(&self) -> &SummaryStore {
        &self.store
    }

    pub fn into_store(self) -> SummaryStore {
        self.store
    }
}

impl GroupCollector for SummaryCollector {
    fn group(&self) -> TableGroup {
        TableGroup::Summaries
    }

    fn process(&mut self, section: &Section) {
        let Some(psi) = self.context.open(TableGroup::Summaries, section, &mut self.counters) else {
            return;
        };
        let summaries = match SummarySection::parse(&psi) {
            Ok(summaries) => summaries,
            Err(e) => {
                self.counters.ignored_sections += 1;
                trace!("[Summaries] Dropping section on PID 0x{:04X}: {}", section.pid, e);
                return;
            }
        };
        log_malformed(TableGroup::Summaries, section, &summaries.errors, &mut self.counters);

        let channel = match self.registry.find_by_channel_table_id(summaries.channel_id) {
            Some(channel) => channel,
            None => {
                self.counters.unknown_channel += summaries.records.len() as u64;
                trace!("[Summaries] No channel for channel id {}", summaries.channel_id);
                return;
            }
        };

        let origin = SectionOrigin::from(section);
        let diagnostics = self.context.diagnostics;
        for record in &summaries.records {
            self.context
                .log_undefined(section, record.event_id, &record.undefined, &mut self.counters);

            let outcome = self
                .store
                .add_summary(channel, SummaryFragment::from_record(record, origin));
            if outcome == InsertOutcome::Inserted {
                if diagnostics.log_descriptions {
                    debug!(
                        "[Summaries] Channel {} event {}: {}",
                        summaries.channel_id,
                        record.event_id,
                        self.context.text(&record.short_description)
                    );
                }
                if let (true, Some(extended)) =
                    (diagnostics.log_extended_descriptions, &record.extended_description)
                {
                    debug!(
                        "[Summaries] Channel {} event {} extended: {}",
                        summaries.channel_id,
                        record.event_id,
                        self.context.text(extended)
                    );
                }
            }
            count_outcome(outcome, &mut self.counters);
        }
    }

    fn fragment_count(&self) -> usize {
        self.store.fragment_count()
    }

    fn counters(&self) -> &GroupCounters {
        &self.counters
    }
}

/// Sections seen for one (PID, table id).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TableCount {
    pub pid: u16,
    pub table_id: u8,
    pub sections: u64,
}

/// Counts sections per (PID, table id) on the diagnostic PIDs.
#[derive(Default)]
pub struct DiagnosticCollector {
    tables: BTreeMap<(u16, u8), u64>,
    counters: GroupCounters,
}

impl DiagnosticCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tables(&self) -> Vec<TableCount> {
        self.tables
            .iter()
            .map(|(&(pid, table_id), &sections)| TableCount {
                pid,
                table_id,
                sections,
            })
            .collect()
    }
}

impl GroupCollector for DiagnosticCollector {
    fn group(&self) -> TableGroup {
        TableGroup::Diagnostic
    }

    fn process(&mut self, section: &Section) {
        self.counters.sections += 1;
        let count = self.tables.entry((section.pid, section.table_id)).or_insert(0);
        if *count == 0 {
            self.counters.inserted += 1;
            let known = section.table_id == table_id::BAT
                || table_id::is_title(section.table_id)
                || table_id::is_summary(section.table_id);
            if !known {
                debug!(
                    "[Diagnostic] Unknown table 0x{:02X} on PID 0x{:04X} ({} bytes)",
                    section.table_id,
                    section.pid,
                    section.data.len()
                );
            }
        }
        *count += 1;
    }

    /// Distinct (PID, table id) pairs; converges once no new table shows up.
    fn fragment_count(&self) -> usize {
        self.tables.len()
    }

    fn counters(&self) -> &GroupCounters {
        &self.counters
    }
}

#[cfg(test)]
pub(crate) mod testutil {
    use bytes::Bytes;
    use chrono::{NaiveDate, Utc};

    use super::*;
    use crate::channel::{ChannelAttributes, ChannelKey};
    use crate::section::testutil::long_section;
    use crate::section::{date_to_mjd, SummaryRecord, TitleRecord};
    use crate::text::testutil::{ascii_dictionary, encode};

    pub fn base_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
    }

    pub fn context() -> SectionContext {
        SectionContext {
            dictionary: Arc::new(ascii_dictionary()),
            diagnostics: DiagnosticsConfig {
                log_titles: true,
                log_descriptions: true,
                log_extended_descriptions: true,
                log_undefined_records: true,
                log_channel_data: true,
            },
            verify_crc: true,
        }
    }

    /// A registry with channel ids 1001 and 1002.
    pub fn registry() -> Arc<ChannelRegistry> {
        let mut registry = ChannelRegistry::default();
        for (sid, channel_id) in [(4101, 1001), (4102, 1002)] {
            registry.register(
                ChannelKey::new(2, 2004, sid, channel_id),
                0x1000,
                50,
                ChannelAttributes::default(),
            );
        }
        Arc::new(registry)
    }

    /// Title record starting `minutes` after midnight on the base date.
    pub fn title_record(event_id: u16, minutes: u16, duration_minutes: u16, name: &str) -> TitleRecord {
        TitleRecord {
            event_id,
            start_offset: minutes * 30,
            duration: duration_minutes * 30,
            name: encode(name),
            flags: None,
            category: None,
            undefined: Vec::new(),
        }
    }

    pub fn summary_record(event_id: u16, description: &str) -> SummaryRecord {
        SummaryRecord {
            event_id,
            short_description: encode(description),
            extended_description: None,
            series_link: None,
            undefined: Vec::new(),
        }
    }

    pub fn title_section(channel_id: u16, records: &[TitleRecord]) -> Section {
        let mut body = date_to_mjd(base_date()).to_be_bytes().to_vec();
        for record in records {
            body.extend_from_slice(&record.encode());
        }
        raw_section(0x30, table_id::TITLE_FIRST, channel_id, &body)
    }

    pub fn summary_section(channel_id: u16, records: &[SummaryRecord]) -> Section {
        let mut body = date_to_mjd(base_date()).to_be_bytes().to_vec();
        for record in records {
            body.extend_from_slice(&record.encode());
        }
        raw_section(0x40, table_id::SUMMARY_FIRST, channel_id, &body)
    }

    pub fn raw_section(pid: u16, table_id: u8, extension: u16, body: &[u8]) -> Section {
        let data = long_section(table_id, extension, body);
        Section::new(pid, Bytes::from(data), Utc::now()).unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::testutil::*;
    use super::*;
    use crate::section::bat_fixtures::{bat_body, Entry};
    use crate::section::UndefinedRecord;

    #[test]
    fn test_title_collector_merges_and_counts() {
        let mut collector = TitleCollector::new(registry(), TitleStore::new(false), context());

        let mut with_tag = title_record(2, 19 * 60, 60, "Later");
        with_tag.undefined.push(UndefinedRecord { tag: 0xF1, data: vec![1] });
        let section = title_section(1001, &[title_record(1, 18 * 60, 60, "News"), with_tag]);

        collector.process(&section);
        collector.process(&section);
        collector.process(&title_section(4242, &[title_record(9, 0, 30, "Lost")]));

        assert_eq!(collector.fragment_count(), 2);
        let counters = collector.counters();
        assert_eq!(counters.sections, 3);
        assert_eq!(counters.inserted, 2);
        assert_eq!(counters.duplicates, 2);
        assert_eq!(counters.unknown_channel, 1);
        assert_eq!(counters.undefined_records.get(&0xF1), Some(&2));

        let store = collector.into_store();
        let channel = registry().find_by_channel_table_id(1001).unwrap();
        assert_eq!(store.titles(channel)[0].event_id, 1);
    }

    #[test]
    fn test_bad_crc_dropped_when_verifying() {
        let mut collector = TitleCollector::new(registry(), TitleStore::new(false), context());
        let section = title_section(1001, &[title_record(1, 60, 30, "News")]);
        let mut data = section.data.to_vec();
        let last = data.len() - 1;
        data[last] ^= 0xFF;
        let corrupt = Section::new(section.pid, bytes::Bytes::from(data), section.received_at).unwrap();

        collector.process(&corrupt);
        assert_eq!(collector.counters().crc_errors, 1);
        assert_eq!(collector.fragment_count(), 0);
    }

    #[test]
    fn test_summary_collector() {
        let mut collector = SummaryCollector::new(registry(), SummaryStore::new(), context());
        let section = summary_section(
            1002,
            &[summary_record(5, "First."), summary_record(3, "Second."), summary_record(5, "Again.")],
        );
        collector.process(&section);

        assert_eq!(collector.fragment_count(), 2);
        assert_eq!(collector.counters().duplicates, 1);
        let channel = registry().find_by_channel_table_id(1002).unwrap();
        assert_eq!(collector.store().summaries(channel)[0].event_id, 3);
    }

    #[test]
    fn test_wrong_table_in_group_is_ignored() {
        let mut collector = SummaryCollector::new(registry(), SummaryStore::new(), context());
        collector.process(&title_section(1002, &[title_record(1, 60, 30, "x")]));
        assert_eq!(collector.counters().ignored_sections, 1);
        assert_eq!(collector.fragment_count(), 0);
    }

    #[test]
    fn test_bouquet_collector() {
        let body = bat_body(
            "Sky UK",
            2004,
            2,
            50,
            &[
                Entry { service_id: 4101, channel_id: 1001, user_number: 101, flags: 0 },
                Entry { service_id: 4102, channel_id: 1002, user_number: 102, flags: 0 },
            ],
        );
        let mut collector = BouquetCollector::new(ChannelRegistry::default(), context());
        collector.process(&raw_section(0x11, table_id::BAT, 0x1000, &body));
        collector.process(&raw_section(0x11, table_id::BAT, 0x1000, &body));
        collector.process(&raw_section(0x11, 0x42, 1, &[0xF0, 0x00]));

        assert_eq!(collector.fragment_count(), 2);
        assert_eq!(collector.counters().inserted, 2);
        assert_eq!(collector.counters().duplicates, 2);
        assert_eq!(collector.counters().ignored_sections, 1);
        assert!(collector.into_registry().find_by_channel_table_id(1002).is_some());
    }

    #[test]
    fn test_diagnostic_collector() {
        let mut collector = DiagnosticCollector::new();
        collector.process(&raw_section(0x50, 0x90, 1, &[]));
        collector.process(&raw_section(0x50, 0x90, 2, &[]));
        collector.process(&raw_section(0x51, 0xA0, 1, &[]));

        assert_eq!(collector.fragment_count(), 2);
        let tables = collector.tables();
        assert_eq!(tables[0], TableCount { pid: 0x50, table_id: 0x90, sections: 2 });
        assert_eq!(tables[1].pid, 0x51);
    }
}
