//! Per-session statistics.
//!
//! Collected by the session and returned with its outcome; nothing here is
//! process-wide.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use log::info;
use serde::Serialize;

use crate::acquisition::{GroupReport, TableCount, TableGroup};
use crate::channel::RegistryCounters;

/// Synthesis counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SynthesisStats {
    pub entries_emitted: u64,
    pub entries_outside_window: u64,
    pub titles_stitched: u64,
    /// Titles without a matching summary.
    pub summaries_missing: u64,
    pub text_decode_errors: u64,
    /// Category id missing from the category table -> occurrences.
    pub undefined_categories: BTreeMap<u8, u64>,
    pub gaps: u64,
    pub overlaps: u64,
}

impl SynthesisStats {
    pub fn record_undefined_category(&mut self, id: u8) {
        *self.undefined_categories.entry(id).or_insert(0) += 1;
    }
}

/// Statistics of one frequency's session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionStats {
    pub frequency: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub channels: RegistryCounters,
    pub groups: Vec<GroupReport>,
    pub diagnostic_tables: Vec<TableCount>,
    pub synthesis: SynthesisStats,
}

impl SessionStats {
    pub fn new(frequency: &str, started_at: DateTime<Utc>) -> Self {
        Self {
            frequency: frequency.to_string(),
            started_at,
            finished_at: None,
            channels: RegistryCounters::default(),
            groups: Vec::new(),
            diagnostic_tables: Vec::new(),
            synthesis: SynthesisStats::default(),
        }
    }

    pub fn group(&self, group: TableGroup) -> Option<&GroupReport> {
        self.groups.iter().find(|g| g.group == group)
    }

    /// Title and summary fragments newly seen this session.
    pub fn usage_count(&self) -> usize {
        [TableGroup::Titles, TableGroup::Summaries]
            .iter()
            .filter_map(|g| self.group(*g))
            .map(|g| g.usage_count)
            .sum()
    }

    /// Malformed records across all groups.
    pub fn malformed_records(&self) -> u64 {
        self.groups.iter().map(|g| g.counters.malformed_records).sum()
    }

    pub fn log_summary(&self) {
        info!(
            "[Session] {}: channels {} registered, {} filtered, {} duplicate",
            self.frequency, self.channels.registered, self.channels.filtered, self.channels.duplicates
        );
        for group in &self.groups {
            info!(
                "[Session] {}: {} group {:?} after {} wake(s): {} section(s), {} fragment(s) ({} new), {} duplicate(s), {} malformed, {} suspect",
                self.frequency,
                group.group,
                group.state,
                group.wake_cycles,
                group.counters.sections,
                group.fragments,
                group.usage_count,
                group.counters.duplicates,
                group.counters.malformed_records,
                group.counters.suspect_start_times
            );
        }
        let s = &self.synthesis;
        info!(
            "[Session] {}: {} entries emitted, {} outside window, {} stitched, {} gap(s), {} overlap(s), {} text error(s), {} undefined categor(ies)",
            self.frequency,
            s.entries_emitted,
            s.entries_outside_window,
            s.titles_stitched,
            s.gaps,
            s.overlaps,
            s.text_decode_errors,
            s.undefined_categories.len()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::{AcquisitionState, GroupCounters};

    fn report(group: TableGroup, usage_count: usize, malformed: u64) -> GroupReport {
        GroupReport {
            group,
            state: AcquisitionState::Converged,
            wake_cycles: 3,
            fragments: usage_count,
            usage_count,
            counters: GroupCounters {
                malformed_records: malformed,
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_usage_count_counts_titles_and_summaries() {
        let mut stats = SessionStats::new("11778V", Utc::now());
        stats.groups.push(report(TableGroup::Bouquet, 40, 1));
        stats.groups.push(report(TableGroup::Titles, 100, 0));
        stats.groups.push(report(TableGroup::Summaries, 80, 2));

        assert_eq!(stats.usage_count(), 180);
        assert_eq!(stats.malformed_records(), 3);
        assert_eq!(stats.group(TableGroup::Titles).unwrap().wake_cycles, 3);
        assert!(stats.group(TableGroup::Diagnostic).is_none());
    }

    #[test]
    fn test_undefined_categories() {
        let mut stats = SynthesisStats::default();
        stats.record_undefined_category(0x99);
        stats.record_undefined_category(0x99);
        assert_eq!(stats.undefined_categories.get(&0x99), Some(&2));
    }
}
