//! Guide synthesis.
//!
//! Runs after every acquisition loop of a frequency has stopped. Walks each
//! channel's title list in start-time order, joins the matching summary and
//! produces finished [`EpgEntry`] records. The registry and the store are
//! only read.

mod flags;
mod heuristics;
mod repair;

pub use flags::{AudioQuality, ContentFlags};
pub use heuristics::{apply_rules, ExtractedField, ExtractedFields, ExtractionRule, Locale};
pub use repair::{extract_subtitle, stitch_title, tidy};

use chrono::{DateTime, Utc};
use log::{debug, trace};
use serde::Serialize;

use crate::channel::{Channel, ChannelRegistry};
use crate::config::{EpgWindow, GuideConfig};
use crate::reference::ReferenceTables;
use crate::stats::SynthesisStats;
use crate::store::{FragmentStore, SummaryFragment, TitleFragment};
use crate::text::Dictionary;

/// A finished program entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EpgEntry {
    pub original_network_id: u16,
    pub transport_stream_id: u16,
    pub service_id: u16,
    pub channel_id: u16,
    pub event_id: u16,
    pub start_time: DateTime<Utc>,
    pub duration_secs: i64,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub episode_subtitle: Option<String>,
    pub short_description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extended_description: Option<String>,
    pub category: Option<String>,
    pub category_id: Option<u8>,
    pub season: Option<u32>,
    pub episode: Option<u32>,
    pub year: Option<u16>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub directors: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub cast: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub writers: Vec<String>,
    /// Label of the parental rating nibble.
    pub rating: Option<String>,
    pub flags: Option<ContentFlags>,
    pub series_link: Option<u16>,
}

impl EpgEntry {
    pub fn end_time(&self) -> DateTime<Utc> {
        self.start_time + chrono::Duration::seconds(self.duration_secs)
    }
}

/// Entries of one channel in start-time order.
#[derive(Debug, Clone, Serialize)]
pub struct ChannelSchedule {
    pub channel: Channel,
    pub entries: Vec<EpgEntry>,
}

pub struct Synthesizer<'a> {
    dictionary: &'a Dictionary,
    reference: &'a dyn ReferenceTables,
    window: EpgWindow,
    locale: Locale,
    stitch_titles: bool,
    preserve_original_text: bool,
    custom_category_override: bool,
    extract_subtitle: bool,
}

impl<'a> Synthesizer<'a> {
    pub fn new(
        config: &GuideConfig,
        dictionary: &'a Dictionary,
        reference: &'a dyn ReferenceTables,
        window: EpgWindow,
    ) -> Self {
        let locale = Locale::from_country(&config.country);
        Self {
            dictionary,
            reference,
            window,
            locale,
            stitch_titles: config.stitch_titles,
            preserve_original_text: config.preserve_original_text,
            custom_category_override: config.custom_category_override,
            extract_subtitle: config
                .extract_episode_subtitle
                .unwrap_or_else(|| locale.extracts_subtitle()),
        }
    }

    pub fn locale(&self) -> Locale {
        self.locale
    }

    /// Build the schedules of every channel that has an entry inside the
    /// window, in registration order.
    pub fn run(
        &self,
        registry: &ChannelRegistry,
        store: &FragmentStore,
        stats: &mut SynthesisStats,
    ) -> Vec<ChannelSchedule> {
        let mut schedules = Vec::new();

        for (channel_ref, channel) in registry.iter() {
            let mut entries: Vec<EpgEntry> = Vec::new();
            for title in store.titles.titles(channel_ref) {
                // Fragments outside the window stay in the store
                if !self.window.contains(title.start_time) {
                    stats.entries_outside_window += 1;
                    continue;
                }

                let summary = store.summaries.find(channel_ref, title.event_id);
                let entry = self.synthesize(channel, title, summary, stats);

                if let Some(previous) = entries.last() {
                    let previous_end = previous.end_time();
                    if entry.start_time > previous_end {
                        stats.gaps += 1;
                        debug!(
                            "[Synthesis] {}: gap of {}s before event {} at {}",
                            channel.key,
                            (entry.start_time - previous_end).num_seconds(),
                            entry.event_id,
                            entry.start_time
                        );
                    } else if entry.start_time < previous_end {
                        stats.overlaps += 1;
                        debug!(
                            "[Synthesis] {}: event {} at {} overlaps event {} by {}s",
                            channel.key,
                            entry.event_id,
                            entry.start_time,
                            previous.event_id,
                            (previous_end - entry.start_time).num_seconds()
                        );
                    }
                }
                entries.push(entry);
            }

            if entries.is_empty() {
                continue;
            }
            stats.entries_emitted += entries.len() as u64;
            schedules.push(ChannelSchedule {
                channel: channel.clone(),
                entries,
            });
        }

        schedules
    }

    fn decode(&self, bytes: &[u8], what: &str, event_id: u16, stats: &mut SynthesisStats) -> String {
        match self.dictionary.decode(bytes) {
            Ok(text) => text,
            Err(e) => {
                stats.text_decode_errors += 1;
                debug!("[Synthesis] Event {}: cannot decode {}: {}", event_id, what, e);
                String::new()
            }
        }
    }

    /// One title plus at most one summary into an entry.
    pub fn synthesize(
        &self,
        channel: &Channel,
        title: &TitleFragment,
        summary: Option<&SummaryFragment>,
        stats: &mut SynthesisStats,
    ) -> EpgEntry {
        let event_id = title.event_id;
        let mut name = self.decode(&title.name, "title", event_id, stats);

        let (mut description, extended_description) = match summary {
            Some(summary) => {
                let short = self.decode(&summary.short_description, "description", event_id, stats);
                let extended = summary
                    .extended_description
                    .as_ref()
                    .map(|bytes| self.decode(bytes, "extended description", event_id, stats));
                (short, extended)
            }
            None => {
                stats.summaries_missing += 1;
                (String::new(), None)
            }
        };

        if self.stitch_titles {
            if let Some((stitched, remaining)) = stitch_title(&name, &description) {
                trace!("[Synthesis] Event {}: stitched title \"{}\"", event_id, stitched);
                stats.titles_stitched += 1;
                name = stitched;
                description = remaining;
            }
        }

        let flags = title.flags.map(ContentFlags::from_word);
        if let Some(flags) = &flags {
            if !self.preserve_original_text {
                description = flags.strip_markers(&description);
            }
        }
        let rating = flags
            .filter(|f| f.rating != 0)
            .and_then(|f| self.reference.rating(f.rating))
            .map(str::to_string);

        let category = self.category(title.category, &name, &description, stats);

        let (fields, remaining) =
            apply_rules(self.locale.rules(), &description, !self.preserve_original_text);
        description = remaining;

        let mut episode_subtitle = None;
        if self.extract_subtitle {
            if let Some((subtitle, remaining)) = extract_subtitle(&description) {
                episode_subtitle = Some(subtitle);
                if !self.preserve_original_text {
                    description = remaining;
                }
            }
        }

        EpgEntry {
            original_network_id: channel.key.original_network_id,
            transport_stream_id: channel.key.transport_stream_id,
            service_id: channel.key.service_id,
            channel_id: channel.key.channel_id,
            event_id,
            start_time: title.start_time,
            duration_secs: title.duration.num_seconds(),
            title: name,
            episode_subtitle,
            short_description: description,
            extended_description,
            category,
            category_id: title.category,
            season: fields.season,
            episode: fields.episode,
            year: fields.year,
            directors: fields.directors,
            cast: fields.cast,
            writers: fields.writers,
            rating,
            flags,
            series_link: summary.and_then(|s| s.series_link),
        }
    }

    /// Numeric category first; custom phrases when it is missing or when
    /// they override it.
    fn category(
        &self,
        id: Option<u8>,
        title: &str,
        description: &str,
        stats: &mut SynthesisStats,
    ) -> Option<String> {
        let numeric = id.and_then(|id| {
            let name = self.reference.category(id);
            if name.is_none() {
                stats.record_undefined_category(id);
            }
            name
        });

        if numeric.is_none() || self.custom_category_override {
            if let Some(custom) = self.reference.custom_category(title, description) {
                return Some(custom.to_string());
            }
        }
        numeric.map(str::to_string)
    }
}
